//! FastPath output framing (TS_FP_UPDATE_PDU) and the update payloads
//! dispatched by the active stage.

use bit_field::BitField as _;
use bitflags::bitflags;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive as _, ToPrimitive as _};
use opalrdp_core::{
    cast_length, ensure_fixed_part_size, ensure_size, invalid_field_err, invalid_field_err_with_source, Decode,
    DecodeResult, Encode, EncodeResult, ReadCursor, WriteCursor,
};

use crate::bitmap::{BitmapUpdateData, CachedBitmapUpdate};
use crate::per;
use crate::surface_commands::{SurfaceCommand, SURFACE_COMMAND_HEADER_SIZE};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct EncryptionFlags: u8 {
        const SECURE_CHECKSUM = 0x1;
        const ENCRYPTED = 0x2;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct Compression: u8 {
        const COMPRESSION_USED = 0x2;
    }
}

/// TS_FP_UPDATE_PDU header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastPathHeader {
    pub flags: EncryptionFlags,
    pub data_length: usize,
    forced_long_length: bool,
}

impl FastPathHeader {
    const NAME: &'static str = "FastPathHeader";

    const FIXED_PART_SIZE: usize = 1 /* fpOutputHeader */;

    pub fn new(flags: EncryptionFlags, data_length: usize) -> Self {
        Self {
            flags,
            data_length,
            forced_long_length: false,
        }
    }

    fn minimal_size(&self) -> usize {
        Self::FIXED_PART_SIZE + per::sizeof_length(self.data_length as u16)
    }
}

impl Encode for FastPathHeader {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        let mut header = 0u8;
        header.set_bits(0..2, 0); // fast-path action
        header.set_bits(6..8, self.flags.bits());
        dst.write_u8(header);

        let length = self.data_length + self.size();
        let length = u16::try_from(length).map_err(|_| invalid_field_err!("length", "FastPath PDU is too big"))?;

        if self.forced_long_length {
            // Keep the same non-minimal layout as received.
            per::write_long_length(dst, length);
        } else {
            per::write_length(dst, length);
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        if self.forced_long_length {
            Self::FIXED_PART_SIZE + per::U16_SIZE
        } else {
            self.minimal_size()
        }
    }
}

impl<'de> Decode<'de> for FastPathHeader {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let header = src.read_u8();
        let flags = EncryptionFlags::from_bits_truncate(header.get_bits(6..8));

        let (length, sizeof_length) =
            per::read_length(src).map_err(|e| invalid_field_err_with_source(Self::NAME, "length", "PER", e))?;

        if usize::from(length) < sizeof_length + Self::FIXED_PART_SIZE {
            return Err(invalid_field_err!("length", "FastPath PDU length smaller than header"));
        }

        let data_length = usize::from(length) - sizeof_length - Self::FIXED_PART_SIZE;
        // Detects a non-minimal length encoding.
        let forced_long_length = per::sizeof_length(length) != sizeof_length;

        Ok(FastPathHeader {
            flags,
            data_length,
            forced_long_length,
        })
    }
}

/// TS_FP_UPDATE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastPathUpdatePdu<'a> {
    pub fragmentation: Fragmentation,
    pub update_code: UpdateCode,
    pub compression_flags: Option<u8>,
    pub data: &'a [u8],
}

impl FastPathUpdatePdu<'_> {
    const NAME: &'static str = "FastPathUpdatePdu";

    const FIXED_PART_SIZE: usize = 1 /* updateHeader */;
}

impl Encode for FastPathUpdatePdu<'_> {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        let mut header = 0u8;
        header.set_bits(0..4, self.update_code.to_u8().unwrap_or(0));
        header.set_bits(4..6, self.fragmentation.to_u8().unwrap_or(0));
        if self.compression_flags.is_some() {
            header.set_bits(6..8, Compression::COMPRESSION_USED.bits());
        }
        dst.write_u8(header);

        if let Some(compression_flags) = self.compression_flags {
            dst.write_u8(compression_flags);
        }

        dst.write_u16(cast_length!(Self::NAME, "size", self.data.len())?);
        dst.write_slice(self.data);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let compression_flags_size = if self.compression_flags.is_some() { 1 } else { 0 };

        Self::FIXED_PART_SIZE + compression_flags_size + 2 /* size */ + self.data.len()
    }
}

impl<'de> Decode<'de> for FastPathUpdatePdu<'de> {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let header = src.read_u8();

        let update_code = header.get_bits(0..4);
        let update_code =
            UpdateCode::from_u8(update_code).ok_or_else(|| invalid_field_err!("updateCode", "invalid update code"))?;

        let fragmentation = header.get_bits(4..6);
        let fragmentation = Fragmentation::from_u8(fragmentation)
            .ok_or_else(|| invalid_field_err!("fragmentation", "invalid fragmentation"))?;

        let compression = Compression::from_bits_truncate(header.get_bits(6..8));

        let compression_flags = if compression.contains(Compression::COMPRESSION_USED) {
            ensure_size!(in: src, size: 1);
            Some(src.read_u8())
        } else {
            None
        };

        ensure_size!(in: src, size: 2);
        let data_length = usize::from(src.read_u16());
        ensure_size!(in: src, size: data_length);
        let data = src.read_slice(data_length);

        Ok(Self {
            fragmentation,
            update_code,
            compression_flags,
            data,
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum UpdateCode {
    Orders = 0x0,
    Bitmap = 0x1,
    Palette = 0x2,
    Synchronize = 0x3,
    SurfaceCommands = 0x4,
    HiddenPointer = 0x5,
    DefaultPointer = 0x6,
    CachedBitmap = 0x7,
    PositionPointer = 0x8,
    ColorPointer = 0x9,
    CachedPointer = 0xA,
    NewPointer = 0xB,
    LargePointer = 0xC,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum Fragmentation {
    Single = 0x0,
    Last = 0x1,
    First = 0x2,
    Next = 0x3,
}

/// Decoded TS_FP_UPDATE payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FastPathUpdate<'a> {
    Bitmap(BitmapUpdateData<'a>),
    CachedBitmap(CachedBitmapUpdate),
    SurfaceCommands(Vec<SurfaceCommand<'a>>),
}

impl<'a> FastPathUpdate<'a> {
    const NAME: &'static str = "FastPathUpdate";

    /// Decodes the payload for the given update code.
    ///
    /// Returns `Ok(None)` for codes this client does not process (orders,
    /// palette, pointers); the caller logs and drops those.
    pub fn decode_with_code(src: &'a [u8], code: UpdateCode) -> DecodeResult<Option<Self>> {
        let mut cursor = ReadCursor::<'a>::new(src);

        match code {
            UpdateCode::Bitmap => Ok(Some(Self::Bitmap(BitmapUpdateData::decode(&mut cursor)?))),
            UpdateCode::CachedBitmap => Ok(Some(Self::CachedBitmap(CachedBitmapUpdate::decode(&mut cursor)?))),
            UpdateCode::SurfaceCommands => {
                let mut commands = Vec::with_capacity(1);
                while cursor.len() >= SURFACE_COMMAND_HEADER_SIZE {
                    commands.push(SurfaceCommand::decode(&mut cursor)?);
                }

                Ok(Some(Self::SurfaceCommands(commands)))
            }
            _ => Ok(None),
        }
    }

    pub fn as_short_name(&self) -> &str {
        match self {
            Self::Bitmap(_) => "Bitmap",
            Self::CachedBitmap(_) => "Cached Bitmap",
            Self::SurfaceCommands(_) => "Surface Commands",
        }
    }
}

#[cfg(test)]
mod tests {
    use opalrdp_core::{decode, encode_vec};

    use super::*;

    #[test]
    fn header_length_covers_whole_frame() {
        let header = FastPathHeader::new(EncryptionFlags::empty(), 200);

        let encoded = encode_vec(&header).unwrap();
        // 200 bytes of data and a 3-byte header need the long length form.
        assert_eq!(encoded.len(), 3);

        let decoded: FastPathHeader = decode(&encoded).unwrap();
        assert_eq!(decoded.data_length, 200);
        assert_eq!(decoded.size(), 3);
    }

    #[test]
    fn update_pdu_round_trip() {
        let data = [1u8, 2, 3, 4];
        let pdu = FastPathUpdatePdu {
            fragmentation: Fragmentation::Single,
            update_code: UpdateCode::Bitmap,
            compression_flags: None,
            data: &data,
        };

        let encoded = encode_vec(&pdu).unwrap();
        let decoded: FastPathUpdatePdu<'_> = decode(&encoded).unwrap();
        assert_eq!(decoded, pdu);
    }
}
