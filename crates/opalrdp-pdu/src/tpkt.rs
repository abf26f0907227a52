use opalrdp_core::{
    ensure_fixed_part_size, read_padding, unsupported_version_err, write_padding, DecodeResult, EncodeResult,
    ReadCursor, WriteCursor,
};

/// TPKT header (ITU-T T.123)
///
/// ```diagram
/// +-------------+-------------+-------------+-------------+
/// |  version=3  |  reserved   |        length (BE)        |
/// +-------------+-------------+-------------+-------------+
/// ```
///
/// `length` covers the whole packet including these four bytes, so the
/// maximum X.224 TPDU carried inside a TPKT is 65531 bytes long.
#[derive(PartialEq, Eq, Debug)]
pub struct TpktHeader {
    /// Length of the entire packet in octets, including this header.
    pub packet_length: u16,
}

impl TpktHeader {
    pub const VERSION: u8 = 3;

    pub const SIZE: usize = 4;

    pub const NAME: &'static str = "TpktHeader";

    const FIXED_PART_SIZE: usize = Self::SIZE;

    pub fn read(src: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let version = src.read_u8();

        if version != Self::VERSION {
            return Err(unsupported_version_err!(version));
        }

        read_padding!(src, 1);

        let packet_length = src.read_u16_be();

        Ok(Self { packet_length })
    }

    pub fn write(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u8(Self::VERSION);

        write_padding!(dst, 1);

        dst.write_u16_be(self.packet_length);

        Ok(())
    }

    pub fn packet_length(&self) -> usize {
        usize::from(self.packet_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_is_identity() {
        let header = TpktHeader { packet_length: 19 };

        let mut buf = [0u8; TpktHeader::SIZE];
        header.write(&mut WriteCursor::new(&mut buf)).unwrap();
        assert_eq!(buf, [0x03, 0x00, 0x00, 0x13]);

        let parsed = TpktHeader::read(&mut ReadCursor::new(&buf)).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn read_rejects_bad_version() {
        let buf = [0x02, 0x00, 0x00, 0x0B];
        assert!(TpktHeader::read(&mut ReadCursor::new(&buf)).is_err());
    }
}
