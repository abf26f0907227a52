//! Demand Active / Confirm Active PDUs and the capability sets the client
//! advertises. Server capability sets with no counterpart here are carried as
//! raw blobs so the exchange round-trips regardless of what the server sends.

use opalrdp_core::{
    cast_length, ensure_fixed_part_size, ensure_size, invalid_field_err, read_padding, write_padding, Decode,
    DecodeResult, Encode, EncodeResult, ReadCursor, WriteCursor,
};

mod bitmap;
mod bitmap_cache;
mod general;
mod glyph_cache;
mod input;
mod offscreen_bitmap_cache;
mod order;
mod pointer;
mod sound;
mod surface_commands;
mod virtual_channel;

pub use self::bitmap::{Bitmap, BitmapDrawingFlags};
pub use self::bitmap_cache::{BitmapCacheRev2, CacheFlags, CellInfo, BITMAP_CACHE_V2_CELL_COUNT};
pub use self::general::{General, GeneralExtraFlags, MajorPlatformType, MinorPlatformType, PROTOCOL_VER};
pub use self::glyph_cache::{CacheDefinition, GlyphCache, GlyphSupportLevel, GLYPH_CACHE_NUM};
pub use self::input::{Input, InputFlags};
pub use self::offscreen_bitmap_cache::OffscreenBitmapCache;
pub use self::order::{Order, OrderFlags, OrderSupportIndex};
pub use self::pointer::Pointer;
pub use self::sound::{Sound, SoundFlags};
pub use self::surface_commands::{CmdFlags, SurfaceCommands};
pub use self::virtual_channel::{VirtualChannel, VirtualChannelFlags};

pub const SERVER_CHANNEL_ID: u16 = 0x03EA;

const SOURCE_DESCRIPTOR_LENGTH_FIELD_SIZE: usize = 2;
const COMBINED_CAPABILITIES_LENGTH_FIELD_SIZE: usize = 2;
const NUMBER_CAPABILITIES_FIELD_SIZE: usize = 2;
const PADDING_SIZE: usize = 2;
const SESSION_ID_FIELD_SIZE: usize = 4;
const ORIGINATOR_ID_FIELD_SIZE: usize = 2;
const CAPABILITY_HEADER_SIZE: usize = 4;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CapabilitySetType(pub u16);

impl CapabilitySetType {
    pub const GENERAL: Self = Self(0x0001);
    pub const BITMAP: Self = Self(0x0002);
    pub const ORDER: Self = Self(0x0003);
    pub const POINTER: Self = Self(0x0008);
    pub const SOUND: Self = Self(0x000C);
    pub const INPUT: Self = Self(0x000D);
    pub const GLYPH_CACHE: Self = Self(0x0010);
    pub const OFFSCREEN_BITMAP_CACHE: Self = Self(0x0011);
    pub const BITMAP_CACHE_REV2: Self = Self(0x0013);
    pub const VIRTUAL_CHANNEL: Self = Self(0x0014);
    pub const SURFACE_COMMANDS: Self = Self(0x001C);
}

/// One capability set of a Demand Active / Confirm Active PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilitySet {
    General(General),
    Bitmap(Bitmap),
    Order(Order),
    BitmapCacheRev2(BitmapCacheRev2),
    Pointer(Pointer),
    Sound(Sound),
    Input(Input),
    GlyphCache(GlyphCache),
    OffscreenBitmapCache(OffscreenBitmapCache),
    VirtualChannel(VirtualChannel),
    SurfaceCommands(SurfaceCommands),
    /// Anything we do not interpret, preserved byte-for-byte.
    Unknown { capset_type: u16, data: Vec<u8> },
}

impl CapabilitySet {
    const NAME: &'static str = "CapabilitySet";

    const FIXED_PART_SIZE: usize = CAPABILITY_HEADER_SIZE;

    fn capset_type(&self) -> u16 {
        match self {
            Self::General(_) => CapabilitySetType::GENERAL.0,
            Self::Bitmap(_) => CapabilitySetType::BITMAP.0,
            Self::Order(_) => CapabilitySetType::ORDER.0,
            Self::BitmapCacheRev2(_) => CapabilitySetType::BITMAP_CACHE_REV2.0,
            Self::Pointer(_) => CapabilitySetType::POINTER.0,
            Self::Sound(_) => CapabilitySetType::SOUND.0,
            Self::Input(_) => CapabilitySetType::INPUT.0,
            Self::GlyphCache(_) => CapabilitySetType::GLYPH_CACHE.0,
            Self::OffscreenBitmapCache(_) => CapabilitySetType::OFFSCREEN_BITMAP_CACHE.0,
            Self::VirtualChannel(_) => CapabilitySetType::VIRTUAL_CHANNEL.0,
            Self::SurfaceCommands(_) => CapabilitySetType::SURFACE_COMMANDS.0,
            Self::Unknown { capset_type, .. } => *capset_type,
        }
    }

    fn body_size(&self) -> usize {
        match self {
            Self::General(c) => c.size(),
            Self::Bitmap(c) => c.size(),
            Self::Order(c) => c.size(),
            Self::BitmapCacheRev2(c) => c.size(),
            Self::Pointer(c) => c.size(),
            Self::Sound(c) => c.size(),
            Self::Input(c) => c.size(),
            Self::GlyphCache(c) => c.size(),
            Self::OffscreenBitmapCache(c) => c.size(),
            Self::VirtualChannel(c) => c.size(),
            Self::SurfaceCommands(c) => c.size(),
            Self::Unknown { data, .. } => data.len(),
        }
    }
}

impl Encode for CapabilitySet {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u16(self.capset_type());
        dst.write_u16(cast_length!(
            Self::NAME,
            "lengthCapability",
            self.body_size() + CAPABILITY_HEADER_SIZE
        )?);

        match self {
            Self::General(c) => c.encode(dst),
            Self::Bitmap(c) => c.encode(dst),
            Self::Order(c) => c.encode(dst),
            Self::BitmapCacheRev2(c) => c.encode(dst),
            Self::Pointer(c) => c.encode(dst),
            Self::Sound(c) => c.encode(dst),
            Self::Input(c) => c.encode(dst),
            Self::GlyphCache(c) => c.encode(dst),
            Self::OffscreenBitmapCache(c) => c.encode(dst),
            Self::VirtualChannel(c) => c.encode(dst),
            Self::SurfaceCommands(c) => c.encode(dst),
            Self::Unknown { data, .. } => {
                dst.write_slice(data);
                Ok(())
            }
        }
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        CAPABILITY_HEADER_SIZE + self.body_size()
    }
}

impl<'de> Decode<'de> for CapabilitySet {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let capset_type = src.read_u16();
        let length = usize::from(src.read_u16());

        if length < CAPABILITY_HEADER_SIZE {
            return Err(invalid_field_err!("lengthCapability", "capability too small"));
        }

        let body_length = length - CAPABILITY_HEADER_SIZE;
        ensure_size!(in: src, size: body_length);
        let body = src.read_slice(body_length);
        let mut body_cursor = ReadCursor::new(body);

        let capset = match CapabilitySetType(capset_type) {
            CapabilitySetType::GENERAL => Self::General(General::decode(&mut body_cursor)?),
            CapabilitySetType::BITMAP => Self::Bitmap(Bitmap::decode(&mut body_cursor)?),
            CapabilitySetType::ORDER => Self::Order(Order::decode(&mut body_cursor)?),
            CapabilitySetType::BITMAP_CACHE_REV2 => Self::BitmapCacheRev2(BitmapCacheRev2::decode(&mut body_cursor)?),
            CapabilitySetType::POINTER => Self::Pointer(Pointer::decode(&mut body_cursor)?),
            CapabilitySetType::SOUND => Self::Sound(Sound::decode(&mut body_cursor)?),
            CapabilitySetType::INPUT => Self::Input(Input::decode(&mut body_cursor)?),
            CapabilitySetType::GLYPH_CACHE => Self::GlyphCache(GlyphCache::decode(&mut body_cursor)?),
            CapabilitySetType::OFFSCREEN_BITMAP_CACHE => {
                Self::OffscreenBitmapCache(OffscreenBitmapCache::decode(&mut body_cursor)?)
            }
            CapabilitySetType::VIRTUAL_CHANNEL => Self::VirtualChannel(VirtualChannel::decode(&mut body_cursor)?),
            CapabilitySetType::SURFACE_COMMANDS => Self::SurfaceCommands(SurfaceCommands::decode(&mut body_cursor)?),
            _ => Self::Unknown {
                capset_type,
                data: body.to_vec(),
            },
        };

        Ok(capset)
    }
}

/// TS_DEMAND_ACTIVE_PDU body shared by Demand Active and Confirm Active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemandActive {
    pub source_descriptor: String,
    pub capability_sets: Vec<CapabilitySet>,
}

impl DemandActive {
    const NAME: &'static str = "DemandActive";
}

impl Encode for DemandActive {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        let combined_length = self.capability_sets.iter().map(|c| c.size()).sum::<usize>()
            + NUMBER_CAPABILITIES_FIELD_SIZE
            + PADDING_SIZE;

        // The source descriptor is ANSI and includes its null terminator.
        dst.write_u16(cast_length!(
            Self::NAME,
            "lengthSourceDescriptor",
            self.source_descriptor.len() + 1
        )?);
        dst.write_u16(cast_length!(Self::NAME, "lengthCombinedCapabilities", combined_length)?);
        dst.write_slice(self.source_descriptor.as_bytes());
        dst.write_u8(0);
        dst.write_u16(cast_length!(Self::NAME, "numberCapabilities", self.capability_sets.len())?);
        write_padding!(dst, 2);

        for capability_set in &self.capability_sets {
            capability_set.encode(dst)?;
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        SOURCE_DESCRIPTOR_LENGTH_FIELD_SIZE
            + COMBINED_CAPABILITIES_LENGTH_FIELD_SIZE
            + self.source_descriptor.len() + 1
            + NUMBER_CAPABILITIES_FIELD_SIZE
            + PADDING_SIZE
            + self.capability_sets.iter().map(|c| c.size()).sum::<usize>()
    }
}

impl<'de> Decode<'de> for DemandActive {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_size!(in: src, size: 4);

        let source_descriptor_length = usize::from(src.read_u16());
        let _combined_capabilities_length = usize::from(src.read_u16());

        ensure_size!(in: src, size: source_descriptor_length);
        let source_descriptor = core::str::from_utf8(src.read_slice(source_descriptor_length))
            .map_err(|_| invalid_field_err!("sourceDescriptor", "not valid UTF-8"))?
            .trim_end_matches('\0')
            .to_owned();

        ensure_size!(in: src, size: NUMBER_CAPABILITIES_FIELD_SIZE + PADDING_SIZE);
        let capability_count = usize::from(src.read_u16());
        read_padding!(src, 2);

        let mut capability_sets = Vec::with_capacity(capability_count);
        for _ in 0..capability_count {
            capability_sets.push(CapabilitySet::decode(src)?);
        }

        Ok(Self {
            source_descriptor,
            capability_sets,
        })
    }
}

/// Server Demand Active PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDemandActive {
    pub pdu: DemandActive,
}

impl ServerDemandActive {
    const NAME: &'static str = "ServerDemandActive";

    const FIXED_PART_SIZE: usize = SESSION_ID_FIELD_SIZE;
}

impl Encode for ServerDemandActive {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        self.pdu.encode(dst)?;
        dst.write_u32(0); // sessionId, ignored by the client

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.pdu.size()
    }
}

impl<'de> Decode<'de> for ServerDemandActive {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        let pdu = DemandActive::decode(src)?;

        ensure_size!(in: src, size: 4);
        let _session_id = src.read_u32();

        Ok(Self { pdu })
    }
}

/// Client Confirm Active PDU.
///
/// `originator_id` is taken from the server's `pduSource`; in practice this
/// is always [`SERVER_CHANNEL_ID`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfirmActive {
    pub originator_id: u16,
    pub pdu: DemandActive,
}

impl ClientConfirmActive {
    const NAME: &'static str = "ClientConfirmActive";

    const FIXED_PART_SIZE: usize = ORIGINATOR_ID_FIELD_SIZE;
}

impl Encode for ClientConfirmActive {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u16(self.originator_id);

        self.pdu.encode(dst)
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.pdu.size()
    }
}

impl<'de> Decode<'de> for ClientConfirmActive {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let originator_id = src.read_u16();
        let pdu = DemandActive::decode(src)?;

        Ok(Self { originator_id, pdu })
    }
}

#[cfg(test)]
mod tests {
    use opalrdp_core::{decode, encode_vec};

    use super::*;

    #[test]
    fn unknown_capability_set_round_trips() {
        let capset = CapabilitySet::Unknown {
            capset_type: 0x1E,
            data: vec![1, 2, 3, 4, 5],
        };

        let encoded = encode_vec(&capset).unwrap();
        assert_eq!(encoded.len(), 4 + 5);

        let decoded: CapabilitySet = decode(&encoded).unwrap();
        assert_eq!(decoded, capset);
    }

    #[test]
    fn demand_active_round_trip() {
        let pdu = DemandActive {
            source_descriptor: "RDP".to_owned(),
            capability_sets: vec![
                CapabilitySet::General(General::default()),
                CapabilitySet::Sound(Sound {
                    flags: SoundFlags::BEEPS,
                }),
            ],
        };

        let encoded = encode_vec(&pdu).unwrap();
        let decoded: DemandActive = decode(&encoded).unwrap();
        assert_eq!(decoded, pdu);
    }
}
