//! CredSSP ([MS-CSSP]): TSRequest framing over the TLS stream and the
//! client-side authentication sequence.

use opalrdp_core::{ReadCursor, WriteBuf, WriteCursor};
use opalrdp_pdu::PduHint;
use tracing::debug;

use crate::der;
use crate::ntlm::NtlmContext;
use crate::{NlaCredentials, NlaError, NlaErrorExt as _, NlaResult};

const CREDSSP_VERSION: u32 = 2;

/// TSRequest: the single ASN.1 structure CredSSP exchanges in both
/// directions.
///
/// ```asn1
/// TSRequest ::= SEQUENCE {
///     version      [0] INTEGER,
///     negoTokens   [1] NegoData      OPTIONAL,
///     authInfo     [2] OCTET STRING  OPTIONAL,
///     pubKeyAuth   [3] OCTET STRING  OPTIONAL,
///     errorCode    [4] INTEGER       OPTIONAL
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TsRequest {
    pub version: u32,
    pub nego_token: Option<Vec<u8>>,
    pub auth_info: Option<Vec<u8>>,
    pub pub_key_auth: Option<Vec<u8>>,
    pub error_code: Option<u32>,
}

impl TsRequest {
    pub fn with_nego_token(token: Vec<u8>) -> Self {
        Self {
            version: CREDSSP_VERSION,
            nego_token: Some(token),
            ..Self::default()
        }
    }

    /// Reads the total frame length from the first few bytes of the outer
    /// SEQUENCE header, so the transport knows how much to accumulate.
    pub fn read_length(bytes: &[u8]) -> Option<usize> {
        if bytes.len() < 2 {
            return None;
        }

        let first_length_byte = bytes[1];

        if first_length_byte & 0x80 == 0 {
            return Some(2 + usize::from(first_length_byte));
        }

        let count = usize::from(first_length_byte & 0x7F);
        if count == 0 || count > 4 || bytes.len() < 2 + count {
            return None;
        }

        let mut length = 0usize;
        for byte in &bytes[2..2 + count] {
            length = (length << 8) | usize::from(*byte);
        }

        Some(2 + count + length)
    }

    fn nego_tokens_inner_size(token: &[u8]) -> usize {
        // negoToken [0] OCTET STRING, inside SEQUENCE, inside SEQUENCE OF.
        let token_field = der::sizeof_tagged(der::sizeof_octet_string(token.len()));
        let inner_sequence = der::sizeof_tagged(token_field);
        der::sizeof_tagged(inner_sequence)
    }

    fn fields_size(&self) -> usize {
        let mut size = der::sizeof_tagged(der::sizeof_integer(self.version));

        if let Some(token) = &self.nego_token {
            size += der::sizeof_tagged(Self::nego_tokens_inner_size(token));
        }
        if let Some(auth_info) = &self.auth_info {
            size += der::sizeof_tagged(der::sizeof_octet_string(auth_info.len()));
        }
        if let Some(pub_key_auth) = &self.pub_key_auth {
            size += der::sizeof_tagged(der::sizeof_octet_string(pub_key_auth.len()));
        }

        size
    }

    pub fn size(&self) -> usize {
        der::sizeof_tagged(self.fields_size())
    }

    pub fn encode(&self, buf: &mut WriteBuf) -> NlaResult<usize> {
        let size = self.size();
        let dst = buf.unfilled_to(size);
        let mut cursor = WriteCursor::new(dst);

        self.encode_cursor(&mut cursor).map_err(NlaError::encode)?;

        debug_assert_eq!(cursor.pos(), size);
        buf.advance(size);

        Ok(size)
    }

    fn encode_cursor(&self, dst: &mut WriteCursor<'_>) -> opalrdp_core::EncodeResult<()> {
        der::write_sequence_tag(dst, self.fields_size())?;

        // version [0]
        der::write_context_tag(dst, 0, der::sizeof_integer(self.version))?;
        der::write_integer(dst, self.version)?;

        // negoTokens [1]
        if let Some(token) = &self.nego_token {
            let token_field = der::sizeof_tagged(der::sizeof_octet_string(token.len()));
            let inner_sequence = der::sizeof_tagged(token_field);

            der::write_context_tag(dst, 1, der::sizeof_tagged(inner_sequence))?;
            der::write_sequence_tag(dst, inner_sequence)?;
            der::write_sequence_tag(dst, token_field)?;
            der::write_context_tag(dst, 0, der::sizeof_octet_string(token.len()))?;
            der::write_octet_string(dst, token)?;
        }

        // authInfo [2]
        if let Some(auth_info) = &self.auth_info {
            der::write_context_tag(dst, 2, der::sizeof_octet_string(auth_info.len()))?;
            der::write_octet_string(dst, auth_info)?;
        }

        // pubKeyAuth [3]
        if let Some(pub_key_auth) = &self.pub_key_auth {
            der::write_context_tag(dst, 3, der::sizeof_octet_string(pub_key_auth.len()))?;
            der::write_octet_string(dst, pub_key_auth)?;
        }

        Ok(())
    }

    pub fn decode(input: &[u8]) -> NlaResult<Self> {
        let mut cursor = ReadCursor::new(input);

        (|| -> opalrdp_core::DecodeResult<Self> {
            der::read_sequence_tag(&mut cursor)?;

            let mut request = Self::default();

            while let Some(tag) = der::peek_tag(&mut cursor) {
                match tag {
                    0xA0 => {
                        der::read_context_tag(&mut cursor, 0)?;
                        request.version = der::read_integer(&mut cursor)?;
                    }
                    0xA1 => {
                        der::read_context_tag(&mut cursor, 1)?;
                        der::read_sequence_tag(&mut cursor)?;
                        der::read_sequence_tag(&mut cursor)?;
                        der::read_context_tag(&mut cursor, 0)?;
                        request.nego_token = Some(der::read_octet_string(&mut cursor)?);
                    }
                    0xA2 => {
                        der::read_context_tag(&mut cursor, 2)?;
                        request.auth_info = Some(der::read_octet_string(&mut cursor)?);
                    }
                    0xA3 => {
                        der::read_context_tag(&mut cursor, 3)?;
                        request.pub_key_auth = Some(der::read_octet_string(&mut cursor)?);
                    }
                    0xA4 => {
                        der::read_context_tag(&mut cursor, 4)?;
                        request.error_code = Some(der::read_integer(&mut cursor)?);
                    }
                    _ => break,
                }
            }

            Ok(request)
        })()
        .map_err(NlaError::decode)
    }
}

/// TSCredentials wrapping TSPasswordCreds, sent sealed as the last CredSSP
/// message.
fn encode_ts_credentials(credentials: &NlaCredentials) -> NlaResult<Vec<u8>> {
    fn utf16le(value: &str) -> Vec<u8> {
        value.encode_utf16().flat_map(|unit| unit.to_le_bytes()).collect()
    }

    let domain = utf16le(credentials.domain.as_deref().unwrap_or(""));
    let username = utf16le(&credentials.username);
    let password = utf16le(&credentials.password);

    // TSPasswordCreds ::= SEQUENCE { [0] domainName, [1] userName, [2] password }
    let password_fields = der::sizeof_tagged(der::sizeof_octet_string(domain.len()))
        + der::sizeof_tagged(der::sizeof_octet_string(username.len()))
        + der::sizeof_tagged(der::sizeof_octet_string(password.len()));
    let password_creds_size = der::sizeof_tagged(password_fields);

    // TSCredentials ::= SEQUENCE { [0] credType INTEGER, [1] credentials OCTET STRING }
    let cred_fields = der::sizeof_tagged(der::sizeof_integer(1))
        + der::sizeof_tagged(der::sizeof_octet_string(password_creds_size));
    let total = der::sizeof_tagged(cred_fields);

    let mut out = vec![0u8; total];
    let mut dst = WriteCursor::new(&mut out);

    (|| -> opalrdp_core::EncodeResult<()> {
        der::write_sequence_tag(&mut dst, cred_fields)?;
        der::write_context_tag(&mut dst, 0, der::sizeof_integer(1))?;
        der::write_integer(&mut dst, 1)?; // credType: password
        der::write_context_tag(&mut dst, 1, der::sizeof_octet_string(password_creds_size))?;

        // The octet string content is itself DER: TSPasswordCreds.
        der::write_octet_string_header(&mut dst, password_creds_size)?;
        der::write_sequence_tag(&mut dst, password_fields)?;
        der::write_context_tag(&mut dst, 0, der::sizeof_octet_string(domain.len()))?;
        der::write_octet_string(&mut dst, &domain)?;
        der::write_context_tag(&mut dst, 1, der::sizeof_octet_string(username.len()))?;
        der::write_octet_string(&mut dst, &username)?;
        der::write_context_tag(&mut dst, 2, der::sizeof_octet_string(password.len()))?;
        der::write_octet_string(&mut dst, &password)?;

        Ok(())
    })()
    .map_err(NlaError::encode)?;

    Ok(out)
}

/// Transport hint for TSRequest frames (DER framing, not TPKT).
#[derive(Clone, Copy, Debug)]
pub struct CredsspTsRequestHint;

pub const CREDSSP_TS_REQUEST_HINT: CredsspTsRequestHint = CredsspTsRequestHint;

impl PduHint for CredsspTsRequestHint {
    fn find_size(&self, bytes: &[u8]) -> opalrdp_core::DecodeResult<Option<usize>> {
        Ok(TsRequest::read_length(bytes))
    }
}

#[derive(Debug, PartialEq, Eq)]
enum CredsspState {
    SendNegotiate,
    WaitChallenge,
    WaitPubKeyAuth,
    Finished,
}

/// Client-side CredSSP sequence (spec flow: NTLM negotiate/challenge/
/// authenticate, then pubKeyAuth verification, then TSCredentials).
///
/// Driven like the connector sequences: the caller reads a frame when
/// [`Self::next_pdu_hint`] says so, then calls [`Self::step`].
pub struct CredsspSequence {
    state: CredsspState,
    context: NtlmContext,
    credentials: NlaCredentials,
    /// The server TLS leaf public key (DER content of subjectPublicKey).
    server_public_key: Vec<u8>,
    workstation: String,
}

impl CredsspSequence {
    pub fn new(
        credentials: NlaCredentials,
        peer_cert_der: &[u8],
        server_public_key: Vec<u8>,
        workstation: impl Into<String>,
    ) -> Self {
        Self {
            state: CredsspState::SendNegotiate,
            context: NtlmContext::new(credentials.clone(), peer_cert_der),
            credentials,
            server_public_key,
            workstation: workstation.into(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == CredsspState::Finished
    }

    pub fn next_pdu_hint(&self) -> Option<&dyn PduHint> {
        match self.state {
            CredsspState::SendNegotiate => None,
            CredsspState::WaitChallenge | CredsspState::WaitPubKeyAuth => Some(&CREDSSP_TS_REQUEST_HINT),
            CredsspState::Finished => None,
        }
    }

    /// Advances the sequence. `input` is empty when no PDU was expected.
    /// Returns the number of bytes written into `output`.
    pub fn step(&mut self, input: &[u8], output: &mut WriteBuf) -> NlaResult<usize> {
        match self.state {
            CredsspState::SendNegotiate => {
                let token = self.context.negotiate();

                debug!("CredSSP: sending NTLM NEGOTIATE");

                let written = TsRequest::with_nego_token(token).encode(output)?;
                self.state = CredsspState::WaitChallenge;
                Ok(written)
            }

            CredsspState::WaitChallenge => {
                let request = TsRequest::decode(input)?;
                let challenge = request
                    .nego_token
                    .ok_or_else(|| NlaError::auth_failed("CredSSP", "server sent no NTLM challenge"))?;

                debug!("CredSSP: received NTLM CHALLENGE");

                let authenticate = self.context.authenticate(&challenge, &self.workstation)?;

                // pubKeyAuth: the server TLS public key, sealed.
                let pub_key_auth = self.context.seal(&self.server_public_key)?;

                let reply = TsRequest {
                    version: CREDSSP_VERSION,
                    nego_token: Some(authenticate),
                    pub_key_auth: Some(pub_key_auth),
                    ..TsRequest::default()
                };

                debug!("CredSSP: sending NTLM AUTHENTICATE + pubKeyAuth");

                let written = reply.encode(output)?;
                self.state = CredsspState::WaitPubKeyAuth;
                Ok(written)
            }

            CredsspState::WaitPubKeyAuth => {
                let request = TsRequest::decode(input)?;

                if let Some(error_code) = request.error_code {
                    let _ = error_code;
                    return Err(NlaError::auth_failed("CredSSP", "server reported an error"));
                }

                let pub_key_auth = request
                    .pub_key_auth
                    .ok_or_else(|| NlaError::auth_failed("CredSSP", "server sent no pubKeyAuth"))?;

                let echoed = self.context.unseal(&pub_key_auth)?;

                // The server proves possession by echoing the key with its
                // first octet incremented.
                let mut expected = self.server_public_key.clone();
                if let Some(first) = expected.first_mut() {
                    *first = first.wrapping_add(1);
                }

                if echoed != expected {
                    return Err(NlaError::auth_failed("CredSSP", "server public key mismatch"));
                }

                debug!("CredSSP: pubKeyAuth verified, sending credentials");

                let ts_credentials = encode_ts_credentials(&self.credentials)?;
                let auth_info = self.context.seal(&ts_credentials)?;

                let reply = TsRequest {
                    version: CREDSSP_VERSION,
                    auth_info: Some(auth_info),
                    ..TsRequest::default()
                };

                let written = reply.encode(output)?;
                self.state = CredsspState::Finished;
                Ok(written)
            }

            CredsspState::Finished => Err(NlaError::general("CredSSP sequence is finished")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ts_request_round_trip() {
        let request = TsRequest {
            version: 2,
            nego_token: Some(vec![1, 2, 3, 4]),
            auth_info: None,
            pub_key_auth: Some(vec![9; 40]),
            error_code: None,
        };

        let mut buf = WriteBuf::new();
        let written = request.encode(&mut buf).unwrap();
        assert_eq!(written, request.size());

        let decoded = TsRequest::decode(buf.filled()).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn read_length_matches_encoded_size() {
        let request = TsRequest::with_nego_token(vec![0xAB; 300]);

        let mut buf = WriteBuf::new();
        request.encode(&mut buf).unwrap();

        assert_eq!(TsRequest::read_length(buf.filled()), Some(buf.filled_len()));
    }

    #[test]
    fn read_length_needs_more_bytes() {
        assert_eq!(TsRequest::read_length(&[0x30]), None);
        assert_eq!(TsRequest::read_length(&[0x30, 0x82, 0x01]), None);
    }
}
