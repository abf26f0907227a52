//! Licensing PDUs ([MS-RDPELE]), reduced to what a license-less client needs.
//!
//! The client never stores a license: the server either answers the
//! connection with a Licensing Error Message carrying STATUS_VALID_CLIENT, or
//! runs the full issuance exchange, which we do not participate in. Anything
//! other than a valid-client grant is surfaced as an error by the connector.

use opalrdp_core::{
    ensure_fixed_part_size, ensure_size, invalid_field_err, Decode, DecodeResult, Encode, EncodeResult, ReadCursor,
    WriteCursor,
};

use crate::rdp::headers::{BasicSecurityHeader, BasicSecurityHeaderFlags};

pub const PREAMBLE_VERSION_3_0: u8 = 0x03;

const PREAMBLE_SIZE: usize = 4;
const ERROR_MESSAGE_FIXED_SIZE: usize = 4 /* errorCode */ + 4 /* stateTransition */ + 4 /* blob header */;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LicenseMessageType(pub u8);

impl LicenseMessageType {
    pub const LICENSE_REQUEST: Self = Self(0x01);
    pub const PLATFORM_CHALLENGE: Self = Self(0x02);
    pub const NEW_LICENSE: Self = Self(0x03);
    pub const UPGRADE_LICENSE: Self = Self(0x04);
    pub const LICENSE_INFO: Self = Self(0x12);
    pub const NEW_LICENSE_REQUEST: Self = Self(0x13);
    pub const PLATFORM_CHALLENGE_RESPONSE: Self = Self(0x15);
    pub const ERROR_ALERT: Self = Self(0xFF);
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LicenseErrorCode(pub u32);

impl LicenseErrorCode {
    pub const INVALID_SERVER_CERTIFICATE: Self = Self(0x0000_0001);
    pub const NO_LICENSE: Self = Self(0x0000_0002);
    pub const INVALID_MAC: Self = Self(0x0000_0003);
    pub const INVALID_SCOPE: Self = Self(0x0000_0004);
    pub const NO_LICENSE_SERVER: Self = Self(0x0000_0006);
    pub const STATUS_VALID_CLIENT: Self = Self(0x0000_0007);
    pub const INVALID_CLIENT: Self = Self(0x0000_0008);
}

/// Licensing preamble (LICENSE_PREAMBLE).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicensePreamble {
    pub message_type: LicenseMessageType,
    pub flags: u8,
    pub message_size: u16,
}

impl LicensePreamble {
    const NAME: &'static str = "LicensePreamble";

    const FIXED_PART_SIZE: usize = PREAMBLE_SIZE;
}

impl Encode for LicensePreamble {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u8(self.message_type.0);
        dst.write_u8(self.flags | PREAMBLE_VERSION_3_0);
        dst.write_u16(self.message_size);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for LicensePreamble {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let message_type = LicenseMessageType(src.read_u8());
        let flags = src.read_u8();
        let message_size = src.read_u16();

        if usize::from(message_size) < PREAMBLE_SIZE {
            return Err(invalid_field_err!("wMsgSize", "message size smaller than preamble"));
        }

        Ok(Self {
            message_type,
            flags,
            message_size,
        })
    }
}

/// A server licensing message, seen through the eyes of a client that only
/// ever accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerLicensePdu {
    /// LICENSE_ERROR_MESSAGE; STATUS_VALID_CLIENT is the usual no-op grant.
    ErrorAlert {
        error_code: LicenseErrorCode,
        state_transition: u32,
    },
    /// Any message of the issuance exchange, carried opaque.
    OtherMessage {
        message_type: LicenseMessageType,
        data: Vec<u8>,
    },
}

impl ServerLicensePdu {
    const NAME: &'static str = "ServerLicensePdu";

    /// Whether this message concludes licensing in the client's favor.
    pub fn is_valid_client(&self) -> bool {
        matches!(
            self,
            Self::ErrorAlert {
                error_code: LicenseErrorCode::STATUS_VALID_CLIENT,
                ..
            }
        ) || matches!(
            self,
            Self::OtherMessage {
                message_type: LicenseMessageType::NEW_LICENSE,
                ..
            }
        )
    }
}

impl<'de> Decode<'de> for ServerLicensePdu {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        let security_header = BasicSecurityHeader::decode(src)?;
        if !security_header.flags.contains(BasicSecurityHeaderFlags::LICENSE_PKT) {
            return Err(invalid_field_err!("securityHeader", "LICENSE_PKT flag is missing"));
        }

        let preamble = LicensePreamble::decode(src)?;
        let body_size = usize::from(preamble.message_size) - PREAMBLE_SIZE;
        ensure_size!(in: src, size: body_size);

        match preamble.message_type {
            LicenseMessageType::ERROR_ALERT => {
                if body_size < ERROR_MESSAGE_FIXED_SIZE {
                    return Err(invalid_field_err!("wMsgSize", "truncated licensing error message"));
                }

                let error_code = LicenseErrorCode(src.read_u32());
                let state_transition = src.read_u32();
                // bBlob: wBlobType + wBlobLen + data, irrelevant to the outcome.
                let _ = src.read_slice(body_size - 8);

                Ok(Self::ErrorAlert {
                    error_code,
                    state_transition,
                })
            }
            message_type => Ok(Self::OtherMessage {
                message_type,
                data: src.read_slice(body_size).to_vec(),
            }),
        }
    }
}

impl Encode for ServerLicensePdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        BasicSecurityHeader {
            flags: BasicSecurityHeaderFlags::LICENSE_PKT,
        }
        .encode(dst)?;

        match self {
            Self::ErrorAlert {
                error_code,
                state_transition,
            } => {
                LicensePreamble {
                    message_type: LicenseMessageType::ERROR_ALERT,
                    flags: 0,
                    message_size: (PREAMBLE_SIZE + ERROR_MESSAGE_FIXED_SIZE) as u16,
                }
                .encode(dst)?;

                dst.write_u32(error_code.0);
                dst.write_u32(*state_transition);
                dst.write_u16(0x0004); // wBlobType: BB_ERROR_BLOB
                dst.write_u16(0); // wBlobLen
            }
            Self::OtherMessage { message_type, data } => {
                LicensePreamble {
                    message_type: *message_type,
                    flags: 0,
                    message_size: (PREAMBLE_SIZE + data.len()) as u16,
                }
                .encode(dst)?;

                dst.write_slice(data);
            }
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        BasicSecurityHeader::FIXED_PART_SIZE
            + PREAMBLE_SIZE
            + match self {
                Self::ErrorAlert { .. } => ERROR_MESSAGE_FIXED_SIZE,
                Self::OtherMessage { data, .. } => data.len(),
            }
    }
}

#[cfg(test)]
mod tests {
    use opalrdp_core::{decode, encode_vec};

    use super::*;

    #[test]
    fn valid_client_error_alert_round_trip() {
        let pdu = ServerLicensePdu::ErrorAlert {
            error_code: LicenseErrorCode::STATUS_VALID_CLIENT,
            state_transition: 2, // ST_NO_TRANSITION
        };

        assert!(pdu.is_valid_client());

        let encoded = encode_vec(&pdu).unwrap();
        let decoded: ServerLicensePdu = decode(&encoded).unwrap();
        assert_eq!(decoded, pdu);
    }

    #[test]
    fn license_request_is_not_a_grant() {
        let pdu = ServerLicensePdu::OtherMessage {
            message_type: LicenseMessageType::LICENSE_REQUEST,
            data: vec![0; 16],
        };

        assert!(!pdu.is_valid_client());
    }
}
