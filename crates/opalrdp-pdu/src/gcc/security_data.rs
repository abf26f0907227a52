//! TS_UD_CS_SEC and TS_UD_SC_SEC1.
//!
//! With enhanced security (TLS / CredSSP) the legacy encryption negotiation
//! is vestigial: the client advertises no methods and the server answers with
//! level NONE.

use bitflags::bitflags;
use opalrdp_core::{
    cast_length, ensure_fixed_part_size, ensure_size, invalid_field_err, Decode, DecodeResult, Encode, EncodeResult,
    ReadCursor, WriteCursor,
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct EncryptionMethod: u32 {
        const BIT_40 = 0x0000_0001;
        const BIT_128 = 0x0000_0002;
        const BIT_56 = 0x0000_0008;
        const FIPS = 0x0000_0010;
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EncryptionLevel(pub u32);

impl EncryptionLevel {
    pub const NONE: Self = Self(0);
    pub const LOW: Self = Self(1);
    pub const CLIENT_COMPATIBLE: Self = Self(2);
    pub const HIGH: Self = Self(3);
    pub const FIPS: Self = Self(4);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSecurityData {
    pub encryption_methods: EncryptionMethod,
    pub ext_encryption_methods: u32,
}

impl ClientSecurityData {
    const NAME: &'static str = "ClientSecurityData";

    const FIXED_PART_SIZE: usize = 4 /* encryptionMethods */ + 4 /* extEncryptionMethods */;

    pub fn no_security() -> Self {
        Self {
            encryption_methods: EncryptionMethod::empty(),
            ext_encryption_methods: 0,
        }
    }
}

impl Encode for ClientSecurityData {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u32(self.encryption_methods.bits());
        dst.write_u32(self.ext_encryption_methods);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for ClientSecurityData {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let encryption_methods = EncryptionMethod::from_bits(src.read_u32())
            .ok_or_else(|| invalid_field_err!("encryptionMethods", "invalid encryption methods"))?;
        let ext_encryption_methods = src.read_u32();

        Ok(Self {
            encryption_methods,
            ext_encryption_methods,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSecurityData {
    pub encryption_method: EncryptionMethod,
    pub encryption_level: EncryptionLevel,
    pub server_random: Option<Vec<u8>>,
    pub server_cert: Vec<u8>,
}

impl ServerSecurityData {
    const NAME: &'static str = "ServerSecurityData";

    const FIXED_PART_SIZE: usize = 4 /* encryptionMethod */ + 4 /* encryptionLevel */;

    pub fn no_security() -> Self {
        Self {
            encryption_method: EncryptionMethod::empty(),
            encryption_level: EncryptionLevel::NONE,
            server_random: None,
            server_cert: Vec::new(),
        }
    }
}

impl Encode for ServerSecurityData {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u32(self.encryption_method.bits());
        dst.write_u32(self.encryption_level.0);

        if self.encryption_method.is_empty() && self.encryption_level == EncryptionLevel::NONE {
            // serverRandomLen and serverCertLen are omitted entirely.
            return Ok(());
        }

        let random_len = self.server_random.as_ref().map(|r| r.len()).unwrap_or(0);
        dst.write_u32(cast_length!(Self::NAME, "serverRandomLen", random_len)?);
        dst.write_u32(cast_length!(Self::NAME, "serverCertLen", self.server_cert.len())?);

        if let Some(random) = &self.server_random {
            dst.write_slice(random);
        }
        dst.write_slice(&self.server_cert);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        if self.encryption_method.is_empty() && self.encryption_level == EncryptionLevel::NONE {
            Self::FIXED_PART_SIZE
        } else {
            Self::FIXED_PART_SIZE
                + 8
                + self.server_random.as_ref().map(|r| r.len()).unwrap_or(0)
                + self.server_cert.len()
        }
    }
}

impl<'de> Decode<'de> for ServerSecurityData {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let encryption_method = EncryptionMethod::from_bits(src.read_u32())
            .ok_or_else(|| invalid_field_err!("encryptionMethod", "invalid encryption method"))?;
        let encryption_level = EncryptionLevel(src.read_u32());

        if src.is_empty() {
            return Ok(Self {
                encryption_method,
                encryption_level,
                server_random: None,
                server_cert: Vec::new(),
            });
        }

        ensure_size!(in: src, size: 8);
        let random_len: usize = cast_length!(Self::NAME, "serverRandomLen", src.read_u32())?;
        let cert_len: usize = cast_length!(Self::NAME, "serverCertLen", src.read_u32())?;

        ensure_size!(in: src, size: random_len + cert_len);
        let server_random = if random_len > 0 {
            Some(src.read_slice(random_len).to_vec())
        } else {
            None
        };
        let server_cert = src.read_slice(cert_len).to_vec();

        Ok(Self {
            encryption_method,
            encryption_level,
            server_random,
            server_cert,
        })
    }
}
