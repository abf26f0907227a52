//! Static virtual channel data framing.
//!
//! A channel message longer than [`CHANNEL_CHUNK_LENGTH`] is cut into
//! chunks, each prefixed by a CHANNEL_PDU_HEADER whose `length` repeats the
//! size of the whole uncompressed message. FIRST and LAST flags bracket the
//! sequence; the receiver concatenates until LAST.

use bitflags::bitflags;
use opalrdp_core::{ensure_size, DecodeResult, EncodeResult, ReadCursor, WriteCursor};

/// Largest data chunk carried by a single CHANNEL_PDU.
pub const CHANNEL_CHUNK_LENGTH: usize = 1600;

pub const CHANNEL_PDU_HEADER_SIZE: usize = 8;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct ChannelControlFlags: u32 {
        const FLAG_FIRST = 0x0000_0001;
        const FLAG_LAST = 0x0000_0002;
        const FLAG_SHOW_PROTOCOL = 0x0000_0010;
        const FLAG_SUSPEND = 0x0000_0020;
        const FLAG_RESUME = 0x0000_0040;
        const FLAG_SHADOW_PERSISTENT = 0x0000_0080;
        const PACKET_COMPRESSED = 0x0020_0000;
        const PACKET_AT_FRONT = 0x0040_0000;
        const PACKET_FLUSHED = 0x0080_0000;
        const COMPRESSION_TYPE_MASK = 0x000F_0000;
    }
}

/// CHANNEL_PDU_HEADER.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPduHeader {
    /// Size of the complete message this chunk belongs to, header excluded.
    pub length: u32,
    pub flags: ChannelControlFlags,
}

impl ChannelPduHeader {
    pub const NAME: &'static str = "ChannelPduHeader";

    /// Header for a chunk at position `index` of `count`.
    pub fn for_chunk(total_length: u32, index: usize, count: usize) -> Self {
        let mut flags = ChannelControlFlags::empty();

        if index == 0 {
            flags |= ChannelControlFlags::FLAG_FIRST;
        }
        if index + 1 == count {
            flags |= ChannelControlFlags::FLAG_LAST;
        }

        Self {
            length: total_length,
            flags,
        }
    }

    pub fn read(src: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        ensure_size!(ctx: Self::NAME, in: src, size: CHANNEL_PDU_HEADER_SIZE);

        Ok(Self {
            length: src.read_u32(),
            flags: ChannelControlFlags::from_bits_truncate(src.read_u32()),
        })
    }

    pub fn write(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: CHANNEL_PDU_HEADER_SIZE);

        dst.write_u32(self.length);
        dst.write_u32(self.flags.bits());

        Ok(())
    }

    /// The header as raw bytes, for callers assembling chunks by hand.
    pub fn to_bytes(&self) -> [u8; CHANNEL_PDU_HEADER_SIZE] {
        let mut bytes = [0u8; CHANNEL_PDU_HEADER_SIZE];
        bytes[..4].copy_from_slice(&self.length.to_le_bytes());
        bytes[4..].copy_from_slice(&self.flags.bits().to_le_bytes());
        bytes
    }

    pub fn is_first(&self) -> bool {
        self.flags.contains(ChannelControlFlags::FLAG_FIRST)
    }

    pub fn is_last(&self) -> bool {
        self.flags.contains(ChannelControlFlags::FLAG_LAST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let header = ChannelPduHeader {
            length: 4200,
            flags: ChannelControlFlags::FLAG_FIRST,
        };

        let bytes = header.to_bytes();
        assert_eq!(bytes, [0x68, 0x10, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00]);

        let parsed = ChannelPduHeader::read(&mut ReadCursor::new(&bytes)).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn single_chunk_gets_both_bracket_flags() {
        let header = ChannelPduHeader::for_chunk(10, 0, 1);
        assert!(header.is_first());
        assert!(header.is_last());

        let middle = ChannelPduHeader::for_chunk(10, 1, 3);
        assert!(!middle.is_first());
        assert!(!middle.is_last());
    }
}
