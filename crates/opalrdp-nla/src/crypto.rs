//! NTLM crypto primitives: HMAC-MD5, MD4, the MD5 sub-key ladder and RC4.

use hmac::{Hmac, Mac as _};
use md4::Md4;
use md5::{Digest as _, Md5};

pub(crate) fn md4(data: &[u8]) -> [u8; 16] {
    let mut hasher = Md4::new();
    md4::Digest::update(&mut hasher, data);
    md4::Digest::finalize(hasher).into()
}

pub(crate) fn md5(data: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(data);
    hasher.finalize().into()
}

pub(crate) fn hmac_md5(key: &[u8], data: &[u8]) -> [u8; 16] {
    let mut mac = <Hmac<Md5>>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

pub(crate) fn sha256(data: &[u8]) -> [u8; 32] {
    use sha2::{Digest as _, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Derives an NTLM signing or sealing sub-key:
/// `MD5(ExportedSessionKey || magic)`.
pub(crate) fn derive_subkey(exported_session_key: &[u8; 16], magic: &[u8]) -> [u8; 16] {
    let mut input = Vec::with_capacity(exported_session_key.len() + magic.len());
    input.extend_from_slice(exported_session_key);
    input.extend_from_slice(magic);
    md5(&input)
}

pub(crate) const CLIENT_SIGNING_MAGIC: &[u8] = b"session key to client-to-server signing key magic constant\0";
pub(crate) const SERVER_SIGNING_MAGIC: &[u8] = b"session key to server-to-client signing key magic constant\0";
pub(crate) const CLIENT_SEALING_MAGIC: &[u8] = b"session key to client-to-server sealing key magic constant\0";
pub(crate) const SERVER_SEALING_MAGIC: &[u8] = b"session key to server-to-client sealing key magic constant\0";

/// RC4 keystream cipher.
///
/// The reference stacks hand-roll RC4 as well; it only survives here because
/// NTLM requires it, keyed per direction and reused across messages.
pub(crate) struct Rc4 {
    state: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4 {
    pub(crate) fn new(key: &[u8]) -> Self {
        let mut state = [0u8; 256];
        for (i, byte) in state.iter_mut().enumerate() {
            *byte = i as u8;
        }

        let mut j = 0u8;
        for i in 0..256 {
            j = j
                .wrapping_add(state[i])
                .wrapping_add(key[i % key.len()]);
            state.swap(i, usize::from(j));
        }

        Self { state, i: 0, j: 0 }
    }

    pub(crate) fn process(&mut self, data: &[u8]) -> Vec<u8> {
        data.iter()
            .map(|byte| {
                self.i = self.i.wrapping_add(1);
                self.j = self.j.wrapping_add(self.state[usize::from(self.i)]);
                self.state.swap(usize::from(self.i), usize::from(self.j));
                let k = self.state[usize::from(
                    self.state[usize::from(self.i)].wrapping_add(self.state[usize::from(self.j)]),
                )];
                byte ^ k
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rc4_known_vector() {
        // RFC 6229-style vector: key "Key", plaintext "Plaintext".
        let mut rc4 = Rc4::new(b"Key");
        let out = rc4.process(b"Plaintext");
        assert_eq!(out, [0xBB, 0xF3, 0x16, 0xE8, 0xD9, 0x40, 0xAF, 0x0A, 0xD3]);
    }

    #[test]
    fn rc4_is_symmetric() {
        let mut enc = Rc4::new(b"secret");
        let mut dec = Rc4::new(b"secret");

        let sealed = enc.process(b"hello world");
        let opened = dec.process(&sealed);
        assert_eq!(opened, b"hello world");
    }

    #[test]
    fn md4_known_vector() {
        // RFC 1320 test vector: MD4("abc")
        assert_eq!(
            md4(b"abc"),
            [
                0xA4, 0x48, 0x01, 0x7A, 0xAF, 0x21, 0xD8, 0x52, 0x5F, 0xC1, 0x0A, 0xE8, 0x7A, 0xA6, 0x72, 0x9D
            ]
        );
    }

    #[test]
    fn hmac_md5_known_vector() {
        // RFC 2202 test case 2.
        let digest = hmac_md5(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(
            digest,
            [
                0x75, 0x0C, 0x78, 0x3E, 0x6A, 0xB0, 0xB5, 0x03, 0xEA, 0xA8, 0x6E, 0x31, 0x0A, 0x5D, 0xB7, 0x38
            ]
        );
    }
}
