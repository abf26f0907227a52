use bitflags::bitflags;
use opalrdp_core::{ensure_fixed_part_size, Decode, DecodeResult, Encode, EncodeResult, ReadCursor, WriteCursor};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct VirtualChannelFlags: u32 {
        const NO_COMPRESSION = 0;
        const COMPRESSION_SERVER_TO_CLIENT = 1;
        const COMPRESSION_CLIENT_TO_SERVER_8K = 2;
    }
}

/// TS_VIRTUALCHANNEL_CAPABILITYSET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualChannel {
    pub flags: VirtualChannelFlags,
    /// Server-side chunk size; ignored when sent by the client.
    pub chunk_size: Option<u32>,
}

impl VirtualChannel {
    const NAME: &'static str = "VirtualChannel";

    const FIXED_PART_SIZE: usize = 4 /* flags */;
}

impl Encode for VirtualChannel {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u32(self.flags.bits());

        if let Some(chunk_size) = self.chunk_size {
            dst.write_u32(chunk_size);
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.chunk_size.map(|_| 4).unwrap_or(0)
    }
}

impl<'de> Decode<'de> for VirtualChannel {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let flags = VirtualChannelFlags::from_bits_truncate(src.read_u32());

        let chunk_size = if src.len() >= 4 { Some(src.read_u32()) } else { None };

        Ok(Self { flags, chunk_size })
    }
}
