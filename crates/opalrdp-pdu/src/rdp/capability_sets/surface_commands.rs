use bitflags::bitflags;
use opalrdp_core::{
    ensure_fixed_part_size, read_padding, write_padding, Decode, DecodeResult, Encode, EncodeResult, ReadCursor,
    WriteCursor,
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct CmdFlags: u32 {
        const SET_SURFACE_BITS = 0x02;
        const FRAME_MARKER = 0x10;
        const STREAM_SURFACE_BITS = 0x40;
    }
}

/// TS_SURFCMDS_CAPABILITYSET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceCommands {
    pub flags: CmdFlags,
}

impl SurfaceCommands {
    const NAME: &'static str = "SurfaceCommands";

    const FIXED_PART_SIZE: usize = 4 /* cmdFlags */ + 4 /* reserved */;
}

impl Encode for SurfaceCommands {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u32(self.flags.bits());
        write_padding!(dst, 4);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for SurfaceCommands {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let flags = CmdFlags::from_bits_truncate(src.read_u32());
        read_padding!(src, 4);

        Ok(Self { flags })
    }
}
