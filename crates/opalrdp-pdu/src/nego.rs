//! Connection Initiation: the RDP negotiation structures riding in the
//! X.224 Connection Request / Connection Confirm variable header part.

use bitflags::bitflags;
use opalrdp_core::{
    ensure_size, invalid_field_err, unexpected_message_type_err, DecodeResult, EncodeResult, ReadCursor, WriteCursor,
};

use crate::tpdu::{TpduCode, TpduHeader};
use crate::tpkt::TpktHeader;
use crate::x224::X224Pdu;

// Message types of the RDP_NEG_* trailer.
const TYPE_NEG_REQ: u8 = 0x01;
const TYPE_NEG_RSP: u8 = 0x02;
const TYPE_NEG_FAILURE: u8 = 0x03;

/// Every RDP_NEG_* structure is exactly eight bytes:
/// type, flags, length and one 32-bit value.
const NEG_BLOCK_SIZE: usize = 8;

bitflags! {
    /// Security protocols a client can offer and a server can select.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct SecurityProtocol: u32 {
        const RDP = 0x0000_0000;
        const SSL = 0x0000_0001;
        const HYBRID = 0x0000_0002;
        const RDSTLS = 0x0000_0004;
        const HYBRID_EX = 0x0000_0008;
    }
}

impl SecurityProtocol {
    /// No enhanced-security bit set: legacy RC4 transport encryption.
    pub fn is_standard_rdp_security(self) -> bool {
        self.is_empty()
    }
}

impl core::fmt::Display for SecurityProtocol {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_standard_rdp_security() {
            f.write_str("RDP")
        } else {
            core::fmt::Debug::fmt(self, f)
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct RequestFlags: u8 {
        const RESTRICTED_ADMIN_MODE_REQUIRED = 0x01;
        const REDIRECTED_AUTHENTICATION_MODE_REQUIRED = 0x02;
        const CORRELATION_INFO_PRESENT = 0x08;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct ResponseFlags: u8 {
        const EXTENDED_CLIENT_DATA_SUPPORTED = 0x01;
        const DYNVC_GFX_PROTOCOL_SUPPORTED = 0x02;
        const RDP_NEG_RSP_RESERVED = 0x04;
        const RESTRICTED_ADMIN_MODE_SUPPORTED = 0x08;
        const REDIRECTED_AUTHENTICATION_MODE_SUPPORTED = 0x10;
    }
}

/// RDP_NEG_FAILURE code.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FailureCode(u32);

impl FailureCode {
    pub const SSL_REQUIRED_BY_SERVER: Self = Self(1);
    pub const SSL_NOT_ALLOWED_BY_SERVER: Self = Self(2);
    pub const SSL_CERT_NOT_ON_SERVER: Self = Self(3);
    pub const INCONSISTENT_FLAGS: Self = Self(4);
    pub const HYBRID_REQUIRED_BY_SERVER: Self = Self(5);
    pub const SSL_WITH_USER_AUTH_REQUIRED_BY_SERVER: Self = Self(6);

    pub fn description(self) -> &'static str {
        match self.0 {
            1 => "TLS required by server",
            2 => "TLS not allowed by server",
            3 => "no TLS certificate on server",
            4 => "inconsistent negotiation flags",
            5 => "NLA required by server",
            6 => "TLS with user authentication required by server",
            _ => "unknown negotiation failure",
        }
    }
}

impl From<u32> for FailureCode {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<FailureCode> for u32 {
    fn from(value: FailureCode) -> Self {
        value.0
    }
}

/// The `Cookie: mstshash=` routing cookie, CRLF-terminated on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie(pub String);

impl Cookie {
    const PREFIX: &'static [u8] = b"Cookie: mstshash=";
    const TERMINATOR: &'static [u8] = b"\r\n";

    fn read(src: &mut ReadCursor<'_>) -> DecodeResult<Option<Self>> {
        let rest = src.remaining();

        if !rest.starts_with(Self::PREFIX) {
            return Ok(None);
        }

        let value = &rest[Self::PREFIX.len()..];
        let end = value
            .windows(Self::TERMINATOR.len())
            .position(|window| window == Self::TERMINATOR)
            .ok_or_else(|| invalid_field_err!("cookie", "unterminated routing cookie"))?;

        let identifier = core::str::from_utf8(&value[..end])
            .map_err(|_| invalid_field_err!("cookie", "identifier is not valid UTF-8"))?
            .to_owned();

        src.advance(Self::PREFIX.len() + end + Self::TERMINATOR.len());

        Ok(Some(Self(identifier)))
    }

    fn write(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(ctx: "Cookie", in: dst, size: self.wire_len());

        dst.write_slice(Self::PREFIX);
        dst.write_slice(self.0.as_bytes());
        dst.write_slice(Self::TERMINATOR);

        Ok(())
    }

    fn wire_len(&self) -> usize {
        Self::PREFIX.len() + self.0.len() + Self::TERMINATOR.len()
    }
}

/// Reads the eight-byte RDP_NEG trailer: `(type, flags, value)`.
fn read_neg_block(src: &mut ReadCursor<'_>) -> (u8, u8, u32) {
    let message_type = src.read_u8();
    let flags = src.read_u8();
    let _length = src.read_u16();
    let value = src.read_u32();

    (message_type, flags, value)
}

fn write_neg_block(dst: &mut WriteCursor<'_>, message_type: u8, flags: u8, value: u32) {
    dst.write_u8(message_type);
    dst.write_u8(flags);
    dst.write_u16(NEG_BLOCK_SIZE as u16);
    dst.write_u32(value);
}

/// The client's opening move: an optional routing cookie plus the offered
/// security protocols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRequest {
    pub cookie: Option<Cookie>,
    pub flags: RequestFlags,
    pub protocol: SecurityProtocol,
}

impl<'de> X224Pdu<'de> for ConnectionRequest {
    const X224_NAME: &'static str = "Connection Request";

    const TPDU_CODE: TpduCode = TpduCode::ConnectionRequest;

    fn x224_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        if let Some(cookie) = &self.cookie {
            cookie.write(dst)?;
        }

        // A bare request (no trailer) means standard RDP security only.
        if !self.protocol.is_standard_rdp_security() {
            write_neg_block(dst, TYPE_NEG_REQ, self.flags.bits(), self.protocol.bits());
        }

        Ok(())
    }

    fn x224_body_decode(src: &mut ReadCursor<'de>, _: &TpktHeader, tpdu: &TpduHeader) -> DecodeResult<Self> {
        let mut remaining = tpdu.variable_part_size();
        ensure_size!(ctx: Self::X224_NAME, in: src, size: remaining);

        let before = src.len();
        let cookie = Cookie::read(src)?;
        remaining = remaining
            .checked_sub(before - src.len())
            .ok_or_else(|| invalid_field_err!("li", "cookie extends past the header"))?;

        if remaining < NEG_BLOCK_SIZE {
            return Ok(Self {
                cookie,
                flags: RequestFlags::empty(),
                protocol: SecurityProtocol::RDP,
            });
        }

        let (message_type, flags, value) = read_neg_block(src);

        if message_type != TYPE_NEG_REQ {
            return Err(unexpected_message_type_err!(message_type));
        }

        let flags = RequestFlags::from_bits_truncate(flags);

        if flags.contains(RequestFlags::CORRELATION_INFO_PRESENT) {
            return Err(invalid_field_err!("flags", "correlation info is not supported"));
        }

        Ok(Self {
            cookie,
            flags,
            protocol: SecurityProtocol::from_bits_truncate(value),
        })
    }

    fn tpdu_header_variable_part_size(&self) -> usize {
        let cookie = self.cookie.as_ref().map(Cookie::wire_len).unwrap_or(0);
        let trailer = if self.protocol.is_standard_rdp_security() {
            0
        } else {
            NEG_BLOCK_SIZE
        };

        cookie + trailer
    }

    fn tpdu_user_data_size(&self) -> usize {
        0
    }
}

/// The server's answer: a selected protocol, or a failure code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionConfirm {
    Response {
        flags: ResponseFlags,
        protocol: SecurityProtocol,
    },
    Failure {
        code: FailureCode,
    },
}

impl<'de> X224Pdu<'de> for ConnectionConfirm {
    const X224_NAME: &'static str = "Connection Confirm";

    const TPDU_CODE: TpduCode = TpduCode::ConnectionConfirm;

    fn x224_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        match self {
            Self::Response { flags, protocol } => {
                write_neg_block(dst, TYPE_NEG_RSP, flags.bits(), protocol.bits());
            }
            Self::Failure { code } => {
                write_neg_block(dst, TYPE_NEG_FAILURE, 0, u32::from(*code));
            }
        }

        Ok(())
    }

    fn x224_body_decode(src: &mut ReadCursor<'de>, _: &TpktHeader, tpdu: &TpduHeader) -> DecodeResult<Self> {
        let variable_part = tpdu.variable_part_size();

        if variable_part == 0 {
            // Pre-5.1 servers answer without a trailer: RC4 or nothing.
            return Ok(Self::Response {
                flags: ResponseFlags::empty(),
                protocol: SecurityProtocol::RDP,
            });
        }

        ensure_size!(ctx: Self::X224_NAME, in: src, size: variable_part.max(NEG_BLOCK_SIZE));

        let (message_type, flags, value) = read_neg_block(src);

        match message_type {
            TYPE_NEG_RSP => Ok(Self::Response {
                flags: ResponseFlags::from_bits_truncate(flags),
                protocol: SecurityProtocol::from_bits_truncate(value),
            }),
            TYPE_NEG_FAILURE => Ok(Self::Failure {
                code: FailureCode::from(value),
            }),
            other => Err(unexpected_message_type_err!(other)),
        }
    }

    fn tpdu_header_variable_part_size(&self) -> usize {
        NEG_BLOCK_SIZE
    }

    fn tpdu_user_data_size(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use opalrdp_core::{decode, encode_vec};

    use crate::x224::X224;

    use super::*;

    #[test]
    fn request_with_cookie_round_trips() {
        let request = ConnectionRequest {
            cookie: Some(Cookie("alice".to_owned())),
            flags: RequestFlags::empty(),
            protocol: SecurityProtocol::HYBRID | SecurityProtocol::SSL,
        };

        let frame = encode_vec(&X224(request.clone())).unwrap();

        // The TPKT length must cover the whole frame.
        assert_eq!(usize::from(u16::from_be_bytes([frame[2], frame[3]])), frame.len());

        let parsed: X224<ConnectionRequest> = decode(&frame).unwrap();
        assert_eq!(parsed.0, request);
    }

    #[test]
    fn request_without_trailer_means_standard_security() {
        let request = ConnectionRequest {
            cookie: None,
            flags: RequestFlags::empty(),
            protocol: SecurityProtocol::RDP,
        };

        let frame = encode_vec(&X224(request.clone())).unwrap();
        // Nothing but TPKT + TPDU headers.
        assert_eq!(frame.len(), 4 + 7);

        let parsed: X224<ConnectionRequest> = decode(&frame).unwrap();
        assert_eq!(parsed.0, request);
    }

    #[test]
    fn failure_code_round_trips() {
        let confirm = ConnectionConfirm::Failure {
            code: FailureCode::HYBRID_REQUIRED_BY_SERVER,
        };

        let frame = encode_vec(&X224(confirm.clone())).unwrap();
        let parsed: X224<ConnectionConfirm> = decode(&frame).unwrap();
        assert_eq!(parsed.0, confirm);
    }

    #[test]
    fn unterminated_cookie_is_rejected() {
        // Cookie prefix with no CRLF before the frame ends.
        let mut frame = vec![0x03, 0x00, 0x00, 0x00, 0x00, 0xE0, 0x00, 0x00, 0x00, 0x00, 0x00];
        frame.extend_from_slice(b"Cookie: mstshash=alice");
        frame[3] = frame.len() as u8;
        frame[4] = (frame.len() - 5) as u8; // li

        assert!(decode::<X224<ConnectionRequest>>(&frame).is_err());
    }
}
