use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive as _, ToPrimitive as _};
use opalrdp_core::{
    ensure_fixed_part_size, invalid_field_err, read_padding, write_padding, Decode, DecodeResult, Encode, EncodeResult,
    ReadCursor, WriteCursor,
};

pub const GLYPH_CACHE_NUM: usize = 10;

const CACHE_DEFINITION_SIZE: usize = 4;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct CacheDefinition {
    pub entries: u16,
    pub max_cell_size: u16,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u16)]
pub enum GlyphSupportLevel {
    None = 0,
    Partial = 1,
    Full = 2,
    Encode = 3,
}

/// TS_GLYPHCACHE_CAPABILITYSET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphCache {
    pub glyph_cache: [CacheDefinition; GLYPH_CACHE_NUM],
    pub frag_cache: CacheDefinition,
    pub glyph_support_level: GlyphSupportLevel,
}

impl GlyphCache {
    const NAME: &'static str = "GlyphCache";

    const FIXED_PART_SIZE: usize =
        GLYPH_CACHE_NUM * CACHE_DEFINITION_SIZE + CACHE_DEFINITION_SIZE + 2 /* supportLevel */ + 2 /* pad */;
}

impl Default for GlyphCache {
    fn default() -> Self {
        Self {
            glyph_cache: [CacheDefinition::default(); GLYPH_CACHE_NUM],
            frag_cache: CacheDefinition::default(),
            glyph_support_level: GlyphSupportLevel::None,
        }
    }
}

impl Encode for GlyphCache {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        for cache in &self.glyph_cache {
            dst.write_u16(cache.entries);
            dst.write_u16(cache.max_cell_size);
        }
        dst.write_u16(self.frag_cache.entries);
        dst.write_u16(self.frag_cache.max_cell_size);
        dst.write_u16(self.glyph_support_level.to_u16().unwrap_or(0));
        write_padding!(dst, 2);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for GlyphCache {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let mut glyph_cache = [CacheDefinition::default(); GLYPH_CACHE_NUM];
        for cache in glyph_cache.iter_mut() {
            cache.entries = src.read_u16();
            cache.max_cell_size = src.read_u16();
        }

        let frag_cache = CacheDefinition {
            entries: src.read_u16(),
            max_cell_size: src.read_u16(),
        };
        let glyph_support_level = GlyphSupportLevel::from_u16(src.read_u16())
            .ok_or_else(|| invalid_field_err!("glyphSupportLevel", "invalid glyph support level"))?;
        read_padding!(src, 2);

        Ok(Self {
            glyph_cache,
            frag_cache,
            glyph_support_level,
        })
    }
}
