//! X.224 class-0 TPDU headers (ITU-T X.224 section 13).
//!
//! Only the "simple class" subset RDP relies on is modeled: Connection
//! Request, Connection Confirm and Data. The LI octet counts the header
//! bytes that follow it (fixed and variable parts), never the user data.

use opalrdp_core::{
    ensure_size, invalid_field_err, unexpected_message_type_err, DecodeResult, EncodeResult, ReadCursor, WriteCursor,
};

use crate::tpkt::TpktHeader;

/// End-of-TSDU mark carried by every Data TPDU.
const EOT: u8 = 0x80;

/// TPDU codes of the class-0 subset.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TpduCode {
    ConnectionRequest = 0xE0,
    ConnectionConfirm = 0xD0,
    DisconnectRequest = 0x80,
    Data = 0xF0,
    Error = 0x70,
}

impl TpduCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0xE0 => Some(Self::ConnectionRequest),
            0xD0 => Some(Self::ConnectionConfirm),
            0x80 => Some(Self::DisconnectRequest),
            0xF0 => Some(Self::Data),
            0x70 => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Length of the fixed header part: LI, the code octet, then either the
    /// EOT mark (Data) or DST-REF/SRC-REF/class (everything else).
    pub fn fixed_header_len(self) -> usize {
        match self {
            Self::Data => TpduHeader::DATA_FIXED_PART_SIZE,
            _ => TpduHeader::NOT_DATA_FIXED_PART_SIZE,
        }
    }
}

/// The header that follows the TPKT preamble.
#[derive(Debug, PartialEq, Eq)]
pub struct TpduHeader {
    /// Length indicator: header bytes after this octet, user data excluded.
    pub li: u8,
    pub code: TpduCode,
}

impl TpduHeader {
    pub const DATA_FIXED_PART_SIZE: usize = 3;
    pub const NOT_DATA_FIXED_PART_SIZE: usize = 7;

    pub const NAME: &'static str = "TpduHeader";

    pub fn read(src: &mut ReadCursor<'_>, tpkt: &TpktHeader) -> DecodeResult<Self> {
        ensure_size!(ctx: Self::NAME, in: src, size: 2);

        let li = src.read_u8();
        let code_octet = src.read_u8();

        // LI = 255 announces an X.224 extension nothing speaks in practice.
        if li == u8::MAX {
            return Err(invalid_field_err!("li", "reserved length indicator"));
        }

        // The header must fit inside the TPKT that carries it.
        if usize::from(li) + 1 + TpktHeader::SIZE > tpkt.packet_length() {
            return Err(invalid_field_err!("li", "header does not fit in the TPKT"));
        }

        let code =
            TpduCode::from_u8(code_octet).ok_or_else(|| unexpected_message_type_err!(code_octet))?;

        let remaining_fixed = code.fixed_header_len() - 2;
        ensure_size!(ctx: Self::NAME, in: src, size: remaining_fixed);
        src.advance(remaining_fixed); // EOT, or DST-REF + SRC-REF + class 0

        Ok(Self { li, code })
    }

    pub fn write(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.code.fixed_header_len());

        dst.write_u8(self.li);
        dst.write_u8(self.code.as_u8());

        match self.code {
            TpduCode::Data => dst.write_u8(EOT),
            _ => {
                dst.write_u16(0); // DST-REF
                dst.write_u16(0); // SRC-REF
                dst.write_u8(0); // class 0, no options
            }
        }

        Ok(())
    }

    pub fn fixed_part_size(&self) -> usize {
        self.code.fixed_header_len()
    }

    pub fn variable_part_size(&self) -> usize {
        self.size() - self.fixed_part_size()
    }

    /// Whole header length: the LI octet plus everything LI counts.
    pub fn size(&self) -> usize {
        usize::from(self.li) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_header_round_trip() {
        let header = TpduHeader {
            li: 2,
            code: TpduCode::Data,
        };

        let mut buf = [0u8; 3];
        header.write(&mut WriteCursor::new(&mut buf)).unwrap();
        assert_eq!(buf, [0x02, 0xF0, 0x80]);

        let tpkt = TpktHeader { packet_length: 12 };
        let parsed = TpduHeader::read(&mut ReadCursor::new(&buf), &tpkt).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn oversized_li_is_rejected() {
        let tpkt = TpktHeader { packet_length: 8 };
        // LI claims 14 header bytes, but the TPKT is only 8 bytes long.
        let buf = [0x0E, 0xE0, 0, 0, 0, 0, 0];
        assert!(TpduHeader::read(&mut ReadCursor::new(&buf), &tpkt).is_err());
    }

    #[test]
    fn unknown_code_is_rejected() {
        let tpkt = TpktHeader { packet_length: 12 };
        let buf = [0x02, 0x42, 0x80];
        assert!(TpduHeader::read(&mut ReadCursor::new(&buf), &tpkt).is_err());
    }
}
