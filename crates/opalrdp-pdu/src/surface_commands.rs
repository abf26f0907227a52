//! Surface commands carried in FastPath updates ([MS-RDPBCGR] surface
//! commands plus the create/delete/fill subset of [MS-RDPEGFX]).

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive as _, ToPrimitive as _};
use opalrdp_core::{
    cast_length, ensure_fixed_part_size, ensure_size, invalid_field_err, unexpected_message_type_err, Decode,
    DecodeResult, Encode, EncodeResult, ReadCursor, WriteCursor,
};

use crate::geometry::InclusiveRectangle;

pub const SURFACE_COMMAND_HEADER_SIZE: usize = 2;

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u16)]
pub enum SurfaceCommandType {
    SetSurfaceBits = 0x0001,
    FrameMarker = 0x0004,
    StreamSurfaceBits = 0x0006,
    CreateSurface = 0x0009,
    DeleteSurface = 0x000A,
    SolidFill = 0x000B,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u16)]
pub enum FrameAction {
    Begin = 0x0000,
    End = 0x0001,
}

/// One surface command; a FastPath surface-commands update carries a
/// back-to-back sequence of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCommand<'a> {
    SetSurfaceBits(SurfaceBitsPdu<'a>),
    StreamSurfaceBits(SurfaceBitsPdu<'a>),
    CreateSurface(CreateSurfacePdu),
    DeleteSurface(DeleteSurfacePdu),
    SolidFill(SolidFillPdu),
    FrameMarker(FrameMarkerPdu),
}

impl SurfaceCommand<'_> {
    const NAME: &'static str = "SurfaceCommand";

    pub fn command_type(&self) -> SurfaceCommandType {
        match self {
            Self::SetSurfaceBits(_) => SurfaceCommandType::SetSurfaceBits,
            Self::StreamSurfaceBits(_) => SurfaceCommandType::StreamSurfaceBits,
            Self::CreateSurface(_) => SurfaceCommandType::CreateSurface,
            Self::DeleteSurface(_) => SurfaceCommandType::DeleteSurface,
            Self::SolidFill(_) => SurfaceCommandType::SolidFill,
            Self::FrameMarker(_) => SurfaceCommandType::FrameMarker,
        }
    }

    fn body_size(&self) -> usize {
        match self {
            Self::SetSurfaceBits(pdu) | Self::StreamSurfaceBits(pdu) => pdu.size(),
            Self::CreateSurface(pdu) => pdu.size(),
            Self::DeleteSurface(pdu) => pdu.size(),
            Self::SolidFill(pdu) => pdu.size(),
            Self::FrameMarker(pdu) => pdu.size(),
        }
    }
}

impl Encode for SurfaceCommand<'_> {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u16(self.command_type().to_u16().unwrap_or(0));

        match self {
            Self::SetSurfaceBits(pdu) | Self::StreamSurfaceBits(pdu) => pdu.encode(dst),
            Self::CreateSurface(pdu) => pdu.encode(dst),
            Self::DeleteSurface(pdu) => pdu.encode(dst),
            Self::SolidFill(pdu) => pdu.encode(dst),
            Self::FrameMarker(pdu) => pdu.encode(dst),
        }
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        SURFACE_COMMAND_HEADER_SIZE + self.body_size()
    }
}

impl<'de> Decode<'de> for SurfaceCommand<'de> {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_size!(ctx: Self::NAME, in: src, size: SURFACE_COMMAND_HEADER_SIZE);

        let cmd_type = src.read_u16();
        let cmd_type = SurfaceCommandType::from_u16(cmd_type)
            .ok_or_else(|| unexpected_message_type_err!(cmd_type as u8))?;

        match cmd_type {
            SurfaceCommandType::SetSurfaceBits => Ok(Self::SetSurfaceBits(SurfaceBitsPdu::decode(src)?)),
            SurfaceCommandType::StreamSurfaceBits => Ok(Self::StreamSurfaceBits(SurfaceBitsPdu::decode(src)?)),
            SurfaceCommandType::CreateSurface => Ok(Self::CreateSurface(CreateSurfacePdu::decode(src)?)),
            SurfaceCommandType::DeleteSurface => Ok(Self::DeleteSurface(DeleteSurfacePdu::decode(src)?)),
            SurfaceCommandType::SolidFill => Ok(Self::SolidFill(SolidFillPdu::decode(src)?)),
            SurfaceCommandType::FrameMarker => Ok(Self::FrameMarker(FrameMarkerPdu::decode(src)?)),
        }
    }
}

/// TS_SURFCMD_SET_SURF_BITS / TS_SURFCMD_STREAM_SURF_BITS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceBitsPdu<'a> {
    pub destination: InclusiveRectangle,
    pub extended_bitmap_data: ExtendedBitmapDataPdu<'a>,
}

impl SurfaceBitsPdu<'_> {
    const NAME: &'static str = "SurfaceBitsPdu";
}

impl Encode for SurfaceBitsPdu<'_> {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        self.destination.encode(dst)?;
        self.extended_bitmap_data.encode(dst)?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        InclusiveRectangle::ENCODED_SIZE + self.extended_bitmap_data.size()
    }
}

impl<'de> Decode<'de> for SurfaceBitsPdu<'de> {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        let destination = InclusiveRectangle::decode(src)?;
        let extended_bitmap_data = ExtendedBitmapDataPdu::decode(src)?;

        Ok(Self {
            destination,
            extended_bitmap_data,
        })
    }
}

/// TS_BITMAP_DATA_EX.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedBitmapDataPdu<'a> {
    pub bpp: u8,
    pub codec_id: u8,
    pub width: u16,
    pub height: u16,
    pub data: &'a [u8],
}

impl ExtendedBitmapDataPdu<'_> {
    const NAME: &'static str = "ExtendedBitmapDataPdu";

    const FIXED_PART_SIZE: usize = 1 /* bpp */ + 1 /* flags */ + 1 /* reserved */ + 1 /* codecId */
        + 2 /* width */ + 2 /* height */ + 4 /* bitmapDataLength */;
}

impl Encode for ExtendedBitmapDataPdu<'_> {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u8(self.bpp);
        dst.write_u8(0); // flags: no EX_COMPRESSED_BITMAP_HEADER_PRESENT
        dst.write_u8(0); // reserved
        dst.write_u8(self.codec_id);
        dst.write_u16(self.width);
        dst.write_u16(self.height);
        dst.write_u32(cast_length!(Self::NAME, "bitmapDataLength", self.data.len())?);
        dst.write_slice(self.data);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.data.len()
    }
}

impl<'de> Decode<'de> for ExtendedBitmapDataPdu<'de> {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let bpp = src.read_u8();
        let flags = src.read_u8();
        if flags != 0 {
            return Err(invalid_field_err!("flags", "extended compressed bitmap header unsupported"));
        }
        let _reserved = src.read_u8();
        let codec_id = src.read_u8();
        let width = src.read_u16();
        let height = src.read_u16();
        let data_length: usize = cast_length!(Self::NAME, "bitmapDataLength", src.read_u32())?;

        ensure_size!(in: src, size: data_length);
        let data = src.read_slice(data_length);

        Ok(Self {
            bpp,
            codec_id,
            width,
            height,
            data,
        })
    }
}

/// RDPGFX_CREATE_SURFACE-shaped command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSurfacePdu {
    pub surface_id: u16,
    pub width: u16,
    pub height: u16,
    pub pixel_format: u8,
}

impl CreateSurfacePdu {
    const NAME: &'static str = "CreateSurfacePdu";

    const FIXED_PART_SIZE: usize = 2 /* surfaceId */ + 2 /* width */ + 2 /* height */ + 1 /* pixelFormat */;
}

impl Encode for CreateSurfacePdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u16(self.surface_id);
        dst.write_u16(self.width);
        dst.write_u16(self.height);
        dst.write_u8(self.pixel_format);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for CreateSurfacePdu {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        Ok(Self {
            surface_id: src.read_u16(),
            width: src.read_u16(),
            height: src.read_u16(),
            pixel_format: src.read_u8(),
        })
    }
}

/// RDPGFX_DELETE_SURFACE-shaped command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteSurfacePdu {
    pub surface_id: u16,
}

impl DeleteSurfacePdu {
    const NAME: &'static str = "DeleteSurfacePdu";

    const FIXED_PART_SIZE: usize = 2 /* surfaceId */;
}

impl Encode for DeleteSurfacePdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u16(self.surface_id);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for DeleteSurfacePdu {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        Ok(Self {
            surface_id: src.read_u16(),
        })
    }
}

/// RDPGFX_SOLIDFILL-shaped command. The fill color is 32-bit XRGB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolidFillPdu {
    pub surface_id: u16,
    pub color: u32,
    pub rectangles: Vec<InclusiveRectangle>,
}

impl SolidFillPdu {
    const NAME: &'static str = "SolidFillPdu";

    const FIXED_PART_SIZE: usize = 2 /* surfaceId */ + 4 /* fillPixel */ + 2 /* rectCount */;
}

impl Encode for SolidFillPdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u16(self.surface_id);
        dst.write_u32(self.color);
        dst.write_u16(cast_length!(Self::NAME, "rectCount", self.rectangles.len())?);

        for rectangle in &self.rectangles {
            rectangle.encode(dst)?;
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.rectangles.len() * InclusiveRectangle::ENCODED_SIZE
    }
}

impl<'de> Decode<'de> for SolidFillPdu {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let surface_id = src.read_u16();
        let color = src.read_u32();
        let rect_count = usize::from(src.read_u16());

        ensure_size!(in: src, size: rect_count * InclusiveRectangle::ENCODED_SIZE);

        let mut rectangles = Vec::with_capacity(rect_count);
        for _ in 0..rect_count {
            rectangles.push(InclusiveRectangle::decode(src)?);
        }

        Ok(Self {
            surface_id,
            color,
            rectangles,
        })
    }
}

/// TS_FRAME_MARKER.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMarkerPdu {
    pub frame_action: FrameAction,
    pub frame_id: Option<u32>,
}

impl FrameMarkerPdu {
    const NAME: &'static str = "FrameMarkerPdu";

    const FIXED_PART_SIZE: usize = 2 /* frameAction */;
}

impl Encode for FrameMarkerPdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u16(self.frame_action.to_u16().unwrap_or(0));

        if let Some(frame_id) = self.frame_id {
            dst.write_u32(frame_id);
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.frame_id.map(|_| 4).unwrap_or(0)
    }
}

impl<'de> Decode<'de> for FrameMarkerPdu {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let frame_action = FrameAction::from_u16(src.read_u16())
            .ok_or_else(|| invalid_field_err!("frameAction", "invalid frame action"))?;

        // Some servers omit the frame ID on Begin markers.
        let frame_id = if src.len() >= 4 { Some(src.read_u32()) } else { None };

        Ok(Self { frame_action, frame_id })
    }
}
