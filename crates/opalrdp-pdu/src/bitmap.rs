//! Bitmap and cached-bitmap update payloads of the FastPath output path.

use core::fmt::{self, Debug};

use bitflags::bitflags;
use opalrdp_core::{
    cast_length, ensure_fixed_part_size, ensure_size, invalid_field_err, Decode, DecodeResult, Encode, EncodeResult,
    ReadCursor, WriteCursor,
};

use crate::geometry::InclusiveRectangle;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct BitmapFlags: u16 {
        const BITMAP_UPDATE_TYPE = 0x0001;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct Compression: u16 {
        const BITMAP_COMPRESSION = 0x0001;
        /// The rectangle carries a cache placement block after the length
        /// field: the decoded bitmap is stored in the client-side cache under
        /// that address in addition to being drawn.
        const BITMAP_CACHE_PLACEMENT = 0x0002;
        const NO_BITMAP_COMPRESSION_HDR = 0x0400;
    }
}

/// Cache address attached to a bitmap rectangle: where the decoded bitmap is
/// stored, and the content key that deduplicates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePlacement {
    pub cache_id: u8,
    pub cache_index: u16,
    pub key1: u32,
    pub key2: u32,
}

impl CachePlacement {
    const SIZE: usize = 1 /* cacheId */ + 1 /* pad */ + 2 /* cacheIndex */ + 4 /* key1 */ + 4 /* key2 */;

    fn write(&self, dst: &mut WriteCursor<'_>) {
        dst.write_u8(self.cache_id);
        dst.write_u8(0); // pad
        dst.write_u16(self.cache_index);
        dst.write_u32(self.key1);
        dst.write_u32(self.key2);
    }

    fn read(src: &mut ReadCursor<'_>) -> Self {
        let cache_id = src.read_u8();
        let _pad = src.read_u8();
        let cache_index = src.read_u16();
        let key1 = src.read_u32();
        let key2 = src.read_u32();

        Self {
            cache_id,
            cache_index,
            key1,
            key2,
        }
    }
}

/// TS_UPDATE_BITMAP_DATA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitmapUpdateData<'a> {
    pub rectangles: Vec<BitmapData<'a>>,
}

impl BitmapUpdateData<'_> {
    const NAME: &'static str = "BitmapUpdateData";

    const FIXED_PART_SIZE: usize = 2 /* updateType */ + 2 /* numberRectangles */;
}

impl Encode for BitmapUpdateData<'_> {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u16(BitmapFlags::BITMAP_UPDATE_TYPE.bits());
        dst.write_u16(cast_length!(Self::NAME, "numberRectangles", self.rectangles.len())?);

        for bitmap_data in self.rectangles.iter() {
            bitmap_data.encode(dst)?;
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        self.rectangles
            .iter()
            .fold(Self::FIXED_PART_SIZE, |size, new| size + new.size())
    }
}

impl<'de> Decode<'de> for BitmapUpdateData<'de> {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let update_type = BitmapFlags::from_bits_truncate(src.read_u16());
        if !update_type.contains(BitmapFlags::BITMAP_UPDATE_TYPE) {
            return Err(invalid_field_err!("updateType", "invalid update type"));
        }

        let rectangles_number = usize::from(src.read_u16());
        let mut rectangles = Vec::with_capacity(rectangles_number);

        for _ in 0..rectangles_number {
            rectangles.push(BitmapData::decode(src)?);
        }

        Ok(Self { rectangles })
    }
}

/// TS_BITMAP_DATA.
///
/// The destination rectangle is authoritative: `width`/`height` describe the
/// source bitmap, which may exceed the destination.
#[derive(Clone, PartialEq, Eq)]
pub struct BitmapData<'a> {
    pub rectangle: InclusiveRectangle,
    pub width: u16,
    pub height: u16,
    pub bits_per_pixel: u16,
    pub compression_flags: Compression,
    pub cache_placement: Option<CachePlacement>,
    pub bitmap_data: &'a [u8],
}

impl BitmapData<'_> {
    const NAME: &'static str = "BitmapData";

    const FIXED_PART_SIZE: usize =
        InclusiveRectangle::ENCODED_SIZE + 2 /* width */ + 2 /* height */ + 2 /* bpp */ + 2 /* flags */ + 2 /* length */;

    pub fn is_compressed(&self) -> bool {
        self.compression_flags.contains(Compression::BITMAP_COMPRESSION)
    }

    fn placement_size(&self) -> usize {
        self.cache_placement.map(|_| CachePlacement::SIZE).unwrap_or(0)
    }
}

impl Encode for BitmapData<'_> {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        let mut flags = self.compression_flags | Compression::NO_BITMAP_COMPRESSION_HDR;
        if self.cache_placement.is_some() {
            flags |= Compression::BITMAP_CACHE_PLACEMENT;
        }

        self.rectangle.encode(dst)?;
        dst.write_u16(self.width);
        dst.write_u16(self.height);
        dst.write_u16(self.bits_per_pixel);
        dst.write_u16(flags.bits());
        dst.write_u16(cast_length!(
            Self::NAME,
            "bitmapLength",
            self.bitmap_data.len() + self.placement_size()
        )?);
        if let Some(placement) = &self.cache_placement {
            placement.write(dst);
        }
        dst.write_slice(self.bitmap_data);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.placement_size() + self.bitmap_data.len()
    }
}

impl<'de> Decode<'de> for BitmapData<'de> {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let rectangle = InclusiveRectangle::decode(src)?;
        let width = src.read_u16();
        let height = src.read_u16();
        let bits_per_pixel = src.read_u16();
        let compression_flags = Compression::from_bits_truncate(src.read_u16());

        let encoded_bitmap_data_length = usize::from(src.read_u16());
        ensure_size!(in: src, size: encoded_bitmap_data_length);

        let mut data_length = encoded_bitmap_data_length;

        let cache_placement = if compression_flags.contains(Compression::BITMAP_CACHE_PLACEMENT) {
            if data_length < CachePlacement::SIZE {
                return Err(invalid_field_err!("bitmapLength", "smaller than the cache placement block"));
            }

            data_length -= CachePlacement::SIZE;
            Some(CachePlacement::read(src))
        } else {
            None
        };

        // TS_CD_HEADER is only present for compressed data without
        // NO_BITMAP_COMPRESSION_HDR; it repeats sizes we already know.
        if compression_flags.contains(Compression::BITMAP_COMPRESSION)
            && !compression_flags.contains(Compression::NO_BITMAP_COMPRESSION_HDR)
        {
            const COMPRESSED_DATA_HEADER_SIZE: usize = 8;

            if data_length < COMPRESSED_DATA_HEADER_SIZE {
                return Err(invalid_field_err!("bitmapLength", "smaller than the compression header"));
            }

            src.advance(COMPRESSED_DATA_HEADER_SIZE);
            data_length -= COMPRESSED_DATA_HEADER_SIZE;
        }

        let bitmap_data = src.read_slice(data_length);

        Ok(BitmapData {
            rectangle,
            width,
            height,
            bits_per_pixel,
            compression_flags,
            cache_placement,
            bitmap_data,
        })
    }
}

impl Debug for BitmapData<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitmapData")
            .field("rectangle", &self.rectangle)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bits_per_pixel", &self.bits_per_pixel)
            .field("compression_flags", &self.compression_flags)
            .field("bitmap_data.len()", &self.bitmap_data.len())
            .finish()
    }
}

/// Cached-bitmap update: replays a previously decoded bitmap out of the
/// client-side cache.
///
/// Lookup runs by `(cache_id, cache_index)` first and by the content key
/// `(key1, key2)` second. A miss is recoverable; the server resends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedBitmapUpdate {
    pub cache_id: u8,
    pub cache_index: u16,
    pub key1: u32,
    pub key2: u32,
    pub dest_left: u16,
    pub dest_top: u16,
}

impl CachedBitmapUpdate {
    const NAME: &'static str = "CachedBitmapUpdate";

    const FIXED_PART_SIZE: usize = 1 /* cacheId */ + 1 /* pad */ + 2 /* cacheIndex */
        + 4 /* key1 */ + 4 /* key2 */ + 2 /* destLeft */ + 2 /* destTop */;
}

impl Encode for CachedBitmapUpdate {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u8(self.cache_id);
        dst.write_u8(0); // pad
        dst.write_u16(self.cache_index);
        dst.write_u32(self.key1);
        dst.write_u32(self.key2);
        dst.write_u16(self.dest_left);
        dst.write_u16(self.dest_top);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for CachedBitmapUpdate {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let cache_id = src.read_u8();
        let _pad = src.read_u8();
        let cache_index = src.read_u16();
        let key1 = src.read_u32();
        let key2 = src.read_u32();
        let dest_left = src.read_u16();
        let dest_top = src.read_u16();

        Ok(Self {
            cache_id,
            cache_index,
            key1,
            key2,
            dest_left,
            dest_top,
        })
    }
}

#[cfg(test)]
mod tests {
    use opalrdp_core::{decode, encode_vec};

    use super::*;

    #[test]
    fn cache_placement_round_trip() {
        let payload = [0x42u8; 8];
        let update = BitmapData {
            rectangle: InclusiveRectangle {
                left: 0,
                top: 0,
                right: 1,
                bottom: 3,
            },
            width: 2,
            height: 4,
            bits_per_pixel: 8,
            compression_flags: Compression::NO_BITMAP_COMPRESSION_HDR,
            cache_placement: Some(CachePlacement {
                cache_id: 0,
                cache_index: 7,
                key1: 0xAABB_CCDD,
                key2: 0x1122_3344,
            }),
            bitmap_data: &payload,
        };

        let encoded = encode_vec(&update).unwrap();
        let decoded: BitmapData<'_> = decode(&encoded).unwrap();
        assert_eq!(decoded.cache_placement, update.cache_placement);
        assert_eq!(decoded.bitmap_data, payload);
    }

    #[test]
    fn bitmap_update_round_trip() {
        let payload = [0xAAu8; 16];
        let update = BitmapUpdateData {
            rectangles: vec![BitmapData {
                rectangle: InclusiveRectangle {
                    left: 0,
                    top: 0,
                    right: 3,
                    bottom: 3,
                },
                width: 4,
                height: 4,
                bits_per_pixel: 8,
                compression_flags: Compression::NO_BITMAP_COMPRESSION_HDR,
                cache_placement: None,
                bitmap_data: &payload,
            }],
        };

        let encoded = encode_vec(&update).unwrap();
        let decoded: BitmapUpdateData<'_> = decode(&encoded).unwrap();
        assert_eq!(decoded.rectangles.len(), 1);
        assert_eq!(decoded.rectangles[0].bitmap_data, payload);
    }

    #[test]
    fn cached_bitmap_round_trip() {
        let update = CachedBitmapUpdate {
            cache_id: 0,
            cache_index: 7,
            key1: 0xAABB_CCDD,
            key2: 0x1122_3344,
            dest_left: 10,
            dest_top: 20,
        };

        let encoded = encode_vec(&update).unwrap();
        let decoded: CachedBitmapUpdate = decode(&encoded).unwrap();
        assert_eq!(decoded, update);
    }
}
