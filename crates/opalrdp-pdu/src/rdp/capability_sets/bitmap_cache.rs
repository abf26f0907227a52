//! TS_BITMAPCACHE_CAPABILITYSET_REV2.

use bitflags::bitflags;
use opalrdp_core::{
    ensure_fixed_part_size, read_padding, write_padding, Decode, DecodeResult, Encode, EncodeResult, ReadCursor,
    WriteCursor,
};

pub const BITMAP_CACHE_V2_CELL_COUNT: usize = 5;

const CELL_INFO_SIZE: usize = 4;
const PADDING_SIZE: usize = 12;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct CacheFlags: u16 {
        const PERSISTENT_KEYS_EXPECTED = 0x0001;
        const ALLOW_CACHE_WAITING_LIST = 0x0002;
    }
}

/// BITMAPCACHE_CELL_CACHE_INFO: the entry count plus the persistent-key bit.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct CellInfo {
    pub num_entries: u32,
    pub is_cache_persistent: bool,
}

impl CellInfo {
    fn to_u32(self) -> u32 {
        (self.num_entries & 0x7FFF_FFFF) | (u32::from(self.is_cache_persistent) << 31)
    }

    fn from_u32(value: u32) -> Self {
        Self {
            num_entries: value & 0x7FFF_FFFF,
            is_cache_persistent: value >> 31 != 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitmapCacheRev2 {
    pub cache_flags: CacheFlags,
    pub num_cell_caches: u8,
    pub cell_caches: [CellInfo; BITMAP_CACHE_V2_CELL_COUNT],
}

impl BitmapCacheRev2 {
    const NAME: &'static str = "BitmapCacheRev2";

    const FIXED_PART_SIZE: usize =
        2 /* cacheFlags */ + 1 /* pad */ + 1 /* numCellCaches */ + BITMAP_CACHE_V2_CELL_COUNT * CELL_INFO_SIZE + PADDING_SIZE;

    /// The client cache layout with per-cell entry counts, non-persistent.
    pub fn with_cell_entries(entries: &[u32]) -> Self {
        let mut cell_caches = [CellInfo::default(); BITMAP_CACHE_V2_CELL_COUNT];

        for (cell, count) in cell_caches.iter_mut().zip(entries.iter()) {
            cell.num_entries = *count;
        }

        Self {
            cache_flags: CacheFlags::empty(),
            num_cell_caches: entries.len().min(BITMAP_CACHE_V2_CELL_COUNT) as u8,
            cell_caches,
        }
    }
}

impl Encode for BitmapCacheRev2 {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u16(self.cache_flags.bits());
        write_padding!(dst, 1);
        dst.write_u8(self.num_cell_caches);

        for cell in &self.cell_caches {
            dst.write_u32(cell.to_u32());
        }

        write_padding!(dst, PADDING_SIZE);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for BitmapCacheRev2 {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let cache_flags = CacheFlags::from_bits_truncate(src.read_u16());
        read_padding!(src, 1);
        let num_cell_caches = src.read_u8();

        let mut cell_caches = [CellInfo::default(); BITMAP_CACHE_V2_CELL_COUNT];
        for cell in cell_caches.iter_mut() {
            *cell = CellInfo::from_u32(src.read_u32());
        }

        read_padding!(src, PADDING_SIZE);

        Ok(Self {
            cache_flags,
            num_cell_caches,
            cell_caches,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_info_packs_persistent_bit() {
        let cell = CellInfo {
            num_entries: 600,
            is_cache_persistent: true,
        };

        assert_eq!(cell.to_u32(), 600 | 0x8000_0000);
        assert_eq!(CellInfo::from_u32(cell.to_u32()), cell);
    }

    #[test]
    fn with_cell_entries_sets_count() {
        let capset = BitmapCacheRev2::with_cell_entries(&[600, 300, 100]);
        assert_eq!(capset.num_cell_caches, 3);
        assert_eq!(capset.cell_caches[0].num_entries, 600);
        assert_eq!(capset.cell_caches[1].num_entries, 300);
        assert_eq!(capset.cell_caches[2].num_entries, 100);
        assert_eq!(capset.cell_caches[3].num_entries, 0);
    }
}
