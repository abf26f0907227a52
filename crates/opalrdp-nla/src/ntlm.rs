//! NTLMv2 ([MS-NLMP]) — the three-message exchange, the v2 response
//! computation, the key ladder and message sealing.

use opalrdp_core::{ReadCursor, WriteCursor};
use rand::RngCore as _;
use tracing::debug;

use crate::crypto::{
    derive_subkey, hmac_md5, md4, sha256, Rc4, CLIENT_SEALING_MAGIC, CLIENT_SIGNING_MAGIC, SERVER_SEALING_MAGIC,
    SERVER_SIGNING_MAGIC,
};
use crate::{NlaCredentials, NlaError, NlaErrorExt as _, NlaResult};

const SIGNATURE: &[u8; 8] = b"NTLMSSP\0";

const MESSAGE_TYPE_NEGOTIATE: u32 = 1;
const MESSAGE_TYPE_CHALLENGE: u32 = 2;
const MESSAGE_TYPE_AUTHENTICATE: u32 = 3;

// Negotiate flags.
const NTLMSSP_NEGOTIATE_UNICODE: u32 = 0x0000_0001;
const NTLMSSP_REQUEST_TARGET: u32 = 0x0000_0004;
const NTLMSSP_NEGOTIATE_SIGN: u32 = 0x0000_0010;
const NTLMSSP_NEGOTIATE_SEAL: u32 = 0x0000_0020;
const NTLMSSP_NEGOTIATE_NTLM: u32 = 0x0000_0200;
const NTLMSSP_NEGOTIATE_ALWAYS_SIGN: u32 = 0x0000_8000;
const NTLMSSP_NEGOTIATE_EXTENDED_SESSION_SECURITY: u32 = 0x0008_0000;
const NTLMSSP_NEGOTIATE_TARGET_INFO: u32 = 0x0080_0000;
const NTLMSSP_NEGOTIATE_VERSION: u32 = 0x0200_0000;
const NTLMSSP_NEGOTIATE_128: u32 = 0x2000_0000;
const NTLMSSP_NEGOTIATE_KEY_EXCH: u32 = 0x4000_0000;
const NTLMSSP_NEGOTIATE_56: u32 = 0x8000_0000;

const NEGOTIATE_FLAGS: u32 = NTLMSSP_NEGOTIATE_UNICODE
    | NTLMSSP_REQUEST_TARGET
    | NTLMSSP_NEGOTIATE_SIGN
    | NTLMSSP_NEGOTIATE_SEAL
    | NTLMSSP_NEGOTIATE_NTLM
    | NTLMSSP_NEGOTIATE_ALWAYS_SIGN
    | NTLMSSP_NEGOTIATE_EXTENDED_SESSION_SECURITY
    | NTLMSSP_NEGOTIATE_TARGET_INFO
    | NTLMSSP_NEGOTIATE_VERSION
    | NTLMSSP_NEGOTIATE_128
    | NTLMSSP_NEGOTIATE_KEY_EXCH
    | NTLMSSP_NEGOTIATE_56;

// VERSION structure: Windows 6.1 build 7601, NTLM revision 15.
const VERSION: [u8; 8] = [0x06, 0x01, 0xB1, 0x1D, 0x00, 0x00, 0x00, 0x0F];

pub const AV_ID_EOL: u16 = 0x0000;
pub const AV_ID_TIMESTAMP: u16 = 0x0007;
pub const AV_ID_CHANNEL_BINDINGS: u16 = 0x000A;

const MESSAGE_SIGNATURE_SIZE: usize = 16;
const MESSAGE_SIGNATURE_VERSION: u32 = 1;

/// Attribute-value pair of the CHALLENGE target info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvPair {
    pub id: u16,
    pub value: Vec<u8>,
}

pub(crate) fn decode_av_pairs(data: &[u8]) -> NlaResult<Vec<AvPair>> {
    let mut cursor = ReadCursor::new(data);
    let mut pairs = Vec::new();

    loop {
        if cursor.len() < 4 {
            // No explicit terminator; treat the end of data as EOL.
            break;
        }

        let id = cursor.read_u16();
        let length = usize::from(cursor.read_u16());

        if id == AV_ID_EOL {
            break;
        }

        if cursor.len() < length {
            return Err(NlaError::auth_failed("AvPair", "truncated target info"));
        }

        pairs.push(AvPair {
            id,
            value: cursor.read_slice(length).to_vec(),
        });
    }

    Ok(pairs)
}

pub(crate) fn encode_av_pairs(pairs: &[AvPair]) -> Vec<u8> {
    let mut out = Vec::new();

    for pair in pairs {
        out.extend_from_slice(&pair.id.to_le_bytes());
        out.extend_from_slice(&(pair.value.len() as u16).to_le_bytes());
        out.extend_from_slice(&pair.value);
    }

    // MsvAvEOL
    out.extend_from_slice(&[0, 0, 0, 0]);

    out
}

fn utf16le(value: &str) -> Vec<u8> {
    value.encode_utf16().flat_map(|unit| unit.to_le_bytes()).collect()
}

/// NTOWFv2: `HMAC-MD5(MD4(UTF-16LE(password)), UTF-16LE(UPPER(user) || domain))`.
pub(crate) fn ntowf_v2(username: &str, password: &str, domain: &str) -> [u8; 16] {
    let key = md4(&utf16le(password));

    let mut identity = username.to_uppercase();
    identity.push_str(domain);

    hmac_md5(&key, &utf16le(&identity))
}

/// NTLMv2_CLIENT_CHALLENGE ("temp" in [MS-NLMP] 3.3.2).
pub(crate) fn build_temp(timestamp: u64, client_challenge: &[u8; 8], av_pairs: &[u8]) -> Vec<u8> {
    let mut temp = Vec::with_capacity(28 + av_pairs.len() + 4);

    temp.push(0x01); // RespType
    temp.push(0x01); // HiRespType
    temp.extend_from_slice(&[0u8; 6]);
    temp.extend_from_slice(&timestamp.to_le_bytes());
    temp.extend_from_slice(client_challenge);
    temp.extend_from_slice(&[0u8; 4]);
    temp.extend_from_slice(av_pairs);
    temp.extend_from_slice(&[0u8; 4]);

    temp
}

struct MessageField {
    length: u16,
    offset: u32,
}

impl MessageField {
    fn read(cursor: &mut ReadCursor<'_>) -> Self {
        let length = cursor.read_u16();
        let _max_length = cursor.read_u16();
        let offset = cursor.read_u32();

        Self { length, offset }
    }

    fn extract<'a>(&self, message: &'a [u8]) -> NlaResult<&'a [u8]> {
        let start = self.offset as usize;
        let end = start + usize::from(self.length);

        message
            .get(start..end)
            .ok_or_else(|| NlaError::auth_failed("ChallengeMessage", "field out of bounds"))
    }
}

fn write_field(cursor: &mut WriteCursor<'_>, length: usize, offset: usize) {
    cursor.write_u16(length as u16);
    cursor.write_u16(length as u16);
    cursor.write_u32(offset as u32);
}

/// The parsed CHALLENGE_MESSAGE pieces the client needs.
#[derive(Debug)]
pub(crate) struct ChallengeMessage {
    pub(crate) server_challenge: [u8; 8],
    pub(crate) target_info: Vec<u8>,
}

pub(crate) fn parse_challenge(message: &[u8]) -> NlaResult<ChallengeMessage> {
    if message.len() < 48 || &message[..8] != SIGNATURE {
        return Err(NlaError::auth_failed("ChallengeMessage", "bad NTLMSSP signature"));
    }

    let mut cursor = ReadCursor::new(&message[8..]);

    let message_type = cursor.read_u32();
    if message_type != MESSAGE_TYPE_CHALLENGE {
        return Err(NlaError::auth_failed("ChallengeMessage", "unexpected message type"));
    }

    let _target_name = MessageField::read(&mut cursor);
    let _flags = cursor.read_u32();
    let server_challenge = cursor.read_array::<8>();
    let _reserved = cursor.read_array::<8>();
    let target_info_field = MessageField::read(&mut cursor);

    let target_info = target_info_field.extract(message)?.to_vec();

    Ok(ChallengeMessage {
        server_challenge,
        target_info,
    })
}

/// The NTLM security context: builds the three messages and carries the
/// signing/sealing state used by CredSSP afterwards.
///
/// Keys are immutable once `authenticate` succeeds; only the RC4 stream
/// positions and sequence numbers advance.
pub struct NtlmContext {
    credentials: NlaCredentials,
    channel_binding_token: [u8; 32],
    negotiate_message: Vec<u8>,
    challenge_message: Vec<u8>,
    client_signing_key: [u8; 16],
    server_signing_key: [u8; 16],
    seal_client: Option<Rc4>,
    seal_server: Option<Rc4>,
    send_seq: u32,
    recv_seq: u32,
}

impl NtlmContext {
    /// `peer_cert_der` is the DER of the TLS peer certificate; its SHA-256
    /// becomes the channel binding token (RFC 5929 tls-server-end-point).
    pub fn new(credentials: NlaCredentials, peer_cert_der: &[u8]) -> Self {
        Self {
            credentials,
            channel_binding_token: sha256(peer_cert_der),
            negotiate_message: Vec::new(),
            challenge_message: Vec::new(),
            client_signing_key: [0; 16],
            server_signing_key: [0; 16],
            seal_client: None,
            seal_server: None,
            send_seq: 0,
            recv_seq: 0,
        }
    }

    pub fn channel_binding_token(&self) -> &[u8; 32] {
        &self.channel_binding_token
    }

    /// Builds the NEGOTIATE_MESSAGE.
    pub fn negotiate(&mut self) -> Vec<u8> {
        // No domain or workstation in the negotiate payload.
        let mut message = vec![0u8; 40];
        let mut cursor = WriteCursor::new(&mut message);

        cursor.write_slice(SIGNATURE);
        cursor.write_u32(MESSAGE_TYPE_NEGOTIATE);
        cursor.write_u32(NEGOTIATE_FLAGS);
        write_field(&mut cursor, 0, 40); // DomainName
        write_field(&mut cursor, 0, 40); // Workstation
        cursor.write_slice(&VERSION);

        self.negotiate_message = message.clone();
        message
    }

    /// Consumes the CHALLENGE_MESSAGE and builds the AUTHENTICATE_MESSAGE.
    pub fn authenticate(&mut self, challenge_message: &[u8], workstation: &str) -> NlaResult<Vec<u8>> {
        let mut client_challenge = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut client_challenge);

        let mut exported_session_key = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut exported_session_key);

        self.authenticate_with(challenge_message, workstation, client_challenge, exported_session_key)
    }

    /// Deterministic core of [`Self::authenticate`]; the randoms are injected
    /// so the computation is testable.
    pub fn authenticate_with(
        &mut self,
        challenge_message: &[u8],
        workstation: &str,
        client_challenge: [u8; 8],
        exported_session_key: [u8; 16],
    ) -> NlaResult<Vec<u8>> {
        self.challenge_message = challenge_message.to_vec();

        let challenge = parse_challenge(challenge_message)?;
        let mut av_pairs = decode_av_pairs(&challenge.target_info)?;

        // The timestamp comes from the server when it sent one.
        let timestamp = av_pairs
            .iter()
            .find(|pair| pair.id == AV_ID_TIMESTAMP)
            .and_then(|pair| pair.value.get(..8))
            .map(|bytes| u64::from_le_bytes(bytes.try_into().expect("8 bytes")))
            .unwrap_or(0);

        // Channel binding rides as an AVPair before the terminator.
        av_pairs.push(AvPair {
            id: AV_ID_CHANNEL_BINDINGS,
            value: self.channel_binding_token.to_vec(),
        });

        let av_pairs_bytes = encode_av_pairs(&av_pairs);

        let domain = self.credentials.domain.clone().unwrap_or_default();
        let ntowf = ntowf_v2(&self.credentials.username, &self.credentials.password, &domain);

        let temp = build_temp(timestamp, &client_challenge, &av_pairs_bytes);

        let mut proof_input = Vec::with_capacity(8 + temp.len());
        proof_input.extend_from_slice(&challenge.server_challenge);
        proof_input.extend_from_slice(&temp);
        let nt_proof_str = hmac_md5(&ntowf, &proof_input);

        let mut nt_challenge_response = Vec::with_capacity(16 + temp.len());
        nt_challenge_response.extend_from_slice(&nt_proof_str);
        nt_challenge_response.extend_from_slice(&temp);

        // With a server timestamp present the LM response is zeroed.
        let lm_challenge_response = [0u8; 24];

        let session_base_key = hmac_md5(&ntowf, &nt_proof_str);
        let encrypted_session_key = Rc4::new(&session_base_key).process(&exported_session_key);

        debug!("NTLMv2 response computed");

        let message = self.build_authenticate_message(
            &domain,
            workstation,
            &lm_challenge_response,
            &nt_challenge_response,
            &encrypted_session_key,
            &exported_session_key,
        );

        self.derive_keys(&exported_session_key);

        Ok(message)
    }

    fn build_authenticate_message(
        &mut self,
        domain: &str,
        workstation: &str,
        lm_response: &[u8],
        nt_response: &[u8],
        encrypted_session_key: &[u8],
        exported_session_key: &[u8; 16],
    ) -> Vec<u8> {
        const HEADER_SIZE: usize = 88; // up to and including the MIC
        const MIC_OFFSET: usize = 72;

        let domain_bytes = utf16le(domain);
        let user_bytes = utf16le(&self.credentials.username);
        let workstation_bytes = utf16le(workstation);

        let domain_offset = HEADER_SIZE;
        let user_offset = domain_offset + domain_bytes.len();
        let workstation_offset = user_offset + user_bytes.len();
        let lm_offset = workstation_offset + workstation_bytes.len();
        let nt_offset = lm_offset + lm_response.len();
        let key_offset = nt_offset + nt_response.len();
        let total_size = key_offset + encrypted_session_key.len();

        let mut message = vec![0u8; total_size];
        let mut cursor = WriteCursor::new(&mut message);

        cursor.write_slice(SIGNATURE);
        cursor.write_u32(MESSAGE_TYPE_AUTHENTICATE);
        write_field(&mut cursor, lm_response.len(), lm_offset);
        write_field(&mut cursor, nt_response.len(), nt_offset);
        write_field(&mut cursor, domain_bytes.len(), domain_offset);
        write_field(&mut cursor, user_bytes.len(), user_offset);
        write_field(&mut cursor, workstation_bytes.len(), workstation_offset);
        write_field(&mut cursor, encrypted_session_key.len(), key_offset);
        cursor.write_u32(NEGOTIATE_FLAGS);
        cursor.write_slice(&VERSION);
        cursor.write_slice(&[0u8; 16]); // MIC, patched below
        cursor.write_slice(&domain_bytes);
        cursor.write_slice(&user_bytes);
        cursor.write_slice(&workstation_bytes);
        cursor.write_slice(lm_response);
        cursor.write_slice(nt_response);
        cursor.write_slice(encrypted_session_key);

        // MIC = HMAC-MD5(ExportedSessionKey, NEGOTIATE || CHALLENGE || AUTHENTICATE)
        // computed with the MIC field zeroed, then patched in.
        let mut mic_input =
            Vec::with_capacity(self.negotiate_message.len() + self.challenge_message.len() + message.len());
        mic_input.extend_from_slice(&self.negotiate_message);
        mic_input.extend_from_slice(&self.challenge_message);
        mic_input.extend_from_slice(&message);

        let mic = hmac_md5(exported_session_key, &mic_input);
        message[MIC_OFFSET..MIC_OFFSET + 16].copy_from_slice(&mic);

        message
    }

    fn derive_keys(&mut self, exported_session_key: &[u8; 16]) {
        self.client_signing_key = derive_subkey(exported_session_key, CLIENT_SIGNING_MAGIC);
        self.server_signing_key = derive_subkey(exported_session_key, SERVER_SIGNING_MAGIC);
        self.seal_client = Some(Rc4::new(&derive_subkey(exported_session_key, CLIENT_SEALING_MAGIC)));
        self.seal_server = Some(Rc4::new(&derive_subkey(exported_session_key, SERVER_SEALING_MAGIC)));
    }

    /// Seals an outbound CredSSP payload: `signature(16) || RC4(payload)`.
    pub fn seal(&mut self, payload: &[u8]) -> NlaResult<Vec<u8>> {
        let seal = self
            .seal_client
            .as_mut()
            .ok_or_else(|| NlaError::general("sealing before authentication"))?;

        let seq = self.send_seq;
        self.send_seq += 1;

        let sealed = seal.process(payload);

        let mut checksum_input = Vec::with_capacity(4 + payload.len());
        checksum_input.extend_from_slice(&seq.to_le_bytes());
        checksum_input.extend_from_slice(payload);
        let checksum = hmac_md5(&self.client_signing_key, &checksum_input);

        // The checksum is encrypted with the same keystream, after the payload.
        let encrypted_checksum = seal.process(&checksum[..8]);

        let mut out = Vec::with_capacity(MESSAGE_SIGNATURE_SIZE + sealed.len());
        out.extend_from_slice(&MESSAGE_SIGNATURE_VERSION.to_le_bytes());
        out.extend_from_slice(&encrypted_checksum);
        out.extend_from_slice(&seq.to_le_bytes());
        out.extend_from_slice(&sealed);

        Ok(out)
    }

    /// Opens an inbound sealed payload and verifies its signature.
    pub fn unseal(&mut self, message: &[u8]) -> NlaResult<Vec<u8>> {
        if message.len() < MESSAGE_SIGNATURE_SIZE {
            return Err(NlaError::auth_failed("unseal", "sealed message too short"));
        }

        let seal = self
            .seal_server
            .as_mut()
            .ok_or_else(|| NlaError::general("unsealing before authentication"))?;

        let (signature, sealed) = message.split_at(MESSAGE_SIGNATURE_SIZE);

        let seq = self.recv_seq;
        self.recv_seq += 1;

        let payload = seal.process(sealed);
        let checksum = seal.process(&signature[4..12]);

        let mut checksum_input = Vec::with_capacity(4 + payload.len());
        checksum_input.extend_from_slice(&seq.to_le_bytes());
        checksum_input.extend_from_slice(&payload);
        let expected = hmac_md5(&self.server_signing_key, &checksum_input);

        if checksum != expected[..8] {
            return Err(NlaError::auth_failed("unseal", "message signature mismatch"));
        }

        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Values from the NTLMv2 computation example of [MS-NLMP] 4.2.4.
    const SERVER_CHALLENGE: [u8; 8] = [0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF];
    const CLIENT_CHALLENGE: [u8; 8] = [0xAA; 8];

    fn reference_target_info() -> Vec<u8> {
        // NbDomainName "Domain", NbComputerName "Server", EOL.
        let pairs = [
            AvPair {
                id: 0x0002,
                value: utf16le("Domain"),
            },
            AvPair {
                id: 0x0001,
                value: utf16le("Server"),
            },
        ];
        encode_av_pairs(&pairs)
    }

    #[test]
    fn ntowf_v2_reference_vector() {
        let key = ntowf_v2("User", "Password", "Domain");
        assert_eq!(
            key,
            [
                0x0C, 0x86, 0x8A, 0x40, 0x3B, 0xFD, 0x7A, 0x93, 0xA3, 0x00, 0x1E, 0xF2, 0x2E, 0xF0, 0x2E, 0x3F
            ]
        );
    }

    #[test]
    fn nt_proof_str_reference_vector() {
        let ntowf = ntowf_v2("User", "Password", "Domain");
        let temp = build_temp(0, &CLIENT_CHALLENGE, &reference_target_info());

        let mut input = Vec::new();
        input.extend_from_slice(&SERVER_CHALLENGE);
        input.extend_from_slice(&temp);
        let proof = hmac_md5(&ntowf, &input);

        assert_eq!(
            proof,
            [
                0x68, 0xCD, 0x0A, 0xB8, 0x51, 0xE5, 0x1C, 0x96, 0xAA, 0xBC, 0x92, 0x7B, 0xEB, 0xEF, 0x6A, 0x1C
            ]
        );
    }

    #[test]
    fn session_base_key_reference_vector() {
        let ntowf = ntowf_v2("User", "Password", "Domain");
        let temp = build_temp(0, &CLIENT_CHALLENGE, &reference_target_info());

        let mut input = Vec::new();
        input.extend_from_slice(&SERVER_CHALLENGE);
        input.extend_from_slice(&temp);
        let proof = hmac_md5(&ntowf, &input);
        let session_base_key = hmac_md5(&ntowf, &proof);

        assert_eq!(
            session_base_key,
            [
                0x8D, 0xE4, 0x0C, 0xCA, 0xDB, 0xC1, 0x4A, 0x82, 0xF1, 0x5C, 0xB0, 0xAD, 0x0D, 0xE9, 0x5C, 0xA3
            ]
        );
    }

    fn challenge_message(target_info: &[u8]) -> Vec<u8> {
        let mut message = vec![0u8; 56 + target_info.len()];
        let mut cursor = WriteCursor::new(&mut message);

        cursor.write_slice(SIGNATURE);
        cursor.write_u32(MESSAGE_TYPE_CHALLENGE);
        write_field(&mut cursor, 0, 56); // TargetName
        cursor.write_u32(NEGOTIATE_FLAGS);
        cursor.write_slice(&SERVER_CHALLENGE);
        cursor.write_slice(&[0u8; 8]); // Reserved
        write_field(&mut cursor, target_info.len(), 56);
        cursor.write_slice(&VERSION);
        cursor.write_slice(target_info);

        message
    }

    fn context(cert_der: &[u8]) -> NtlmContext {
        NtlmContext::new(
            NlaCredentials {
                username: "User".to_owned(),
                password: "Password".to_owned(),
                domain: Some("Domain".to_owned()),
            },
            cert_der,
        )
    }

    fn extract_av_pairs_from_authenticate(message: &[u8]) -> Vec<AvPair> {
        // NtChallengeResponse field is the second field block (offset 20).
        let mut cursor = ReadCursor::new(&message[12..]);
        let _lm = MessageField::read(&mut cursor);
        let nt = MessageField::read(&mut cursor);
        let nt_response = nt.extract(message).unwrap();

        // temp starts after the 16-byte proof; av pairs start at offset 28 of temp.
        let temp = &nt_response[16..];
        let av_pairs = &temp[28..temp.len() - 4];
        decode_av_pairs(av_pairs).unwrap()
    }

    #[test]
    fn authenticate_contains_channel_binding_av_pair() {
        let mut context = context(b"certificate-der");
        let _ = context.negotiate();

        let message = context
            .authenticate_with(
                &challenge_message(&reference_target_info()),
                "WORKSTATION",
                CLIENT_CHALLENGE,
                [0x55; 16],
            )
            .unwrap();

        let pairs = extract_av_pairs_from_authenticate(&message);
        let binding = pairs.iter().find(|pair| pair.id == AV_ID_CHANNEL_BINDINGS).unwrap();

        assert_eq!(binding.value, sha256(b"certificate-der"));
    }

    #[test]
    fn different_certificates_produce_different_bindings() {
        let mut first = context(b"certificate-one");
        let mut second = context(b"certificate-two");

        let _ = first.negotiate();
        let _ = second.negotiate();

        let challenge = challenge_message(&reference_target_info());

        let message_one = first
            .authenticate_with(&challenge, "W", CLIENT_CHALLENGE, [0x55; 16])
            .unwrap();
        let message_two = second
            .authenticate_with(&challenge, "W", CLIENT_CHALLENGE, [0x55; 16])
            .unwrap();

        let binding_one = extract_av_pairs_from_authenticate(&message_one)
            .into_iter()
            .find(|pair| pair.id == AV_ID_CHANNEL_BINDINGS)
            .unwrap();
        let binding_two = extract_av_pairs_from_authenticate(&message_two)
            .into_iter()
            .find(|pair| pair.id == AV_ID_CHANNEL_BINDINGS)
            .unwrap();

        assert_ne!(binding_one.value, binding_two.value);
    }

    #[test]
    fn seal_unseal_are_symmetric_between_directions() {
        // Pair two contexts by flipping one side's directional keys.
        let challenge = challenge_message(&reference_target_info());

        let mut client = context(b"cert");
        let _ = client.negotiate();
        let _ = client
            .authenticate_with(&challenge, "W", CLIENT_CHALLENGE, [0x55; 16])
            .unwrap();

        let mut server = context(b"cert");
        let _ = server.negotiate();
        let _ = server
            .authenticate_with(&challenge, "W", CLIENT_CHALLENGE, [0x55; 16])
            .unwrap();
        // Make "server" speak the server direction.
        core::mem::swap(&mut server.client_signing_key, &mut server.server_signing_key);
        core::mem::swap(&mut server.seal_client, &mut server.seal_server);

        let sealed = server.seal(b"public-key-bytes").unwrap();
        let opened = client.unseal(&sealed).unwrap();

        assert_eq!(opened, b"public-key-bytes");
    }

    #[test]
    fn tampered_sealed_message_is_rejected() {
        let challenge = challenge_message(&reference_target_info());

        let mut client = context(b"cert");
        let _ = client.negotiate();
        let _ = client
            .authenticate_with(&challenge, "W", CLIENT_CHALLENGE, [0x55; 16])
            .unwrap();

        let mut server = context(b"cert");
        let _ = server.negotiate();
        let _ = server
            .authenticate_with(&challenge, "W", CLIENT_CHALLENGE, [0x55; 16])
            .unwrap();
        core::mem::swap(&mut server.client_signing_key, &mut server.server_signing_key);
        core::mem::swap(&mut server.seal_client, &mut server.seal_server);

        let mut sealed = server.seal(b"payload").unwrap();
        *sealed.last_mut().unwrap() ^= 0xFF;

        assert!(client.unseal(&sealed).is_err());
    }
}
