//! TS_UD_CS_CORE and TS_UD_SC_CORE.

use bitflags::bitflags;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive as _, ToPrimitive as _};
use opalrdp_core::{
    ensure_fixed_part_size, ensure_size, invalid_field_err, Decode, DecodeResult, Encode, EncodeResult, ReadCursor,
    WriteCursor,
};

use crate::nego::SecurityProtocol;
use crate::utf16;

const CLIENT_NAME_SIZE: usize = 32;
const IME_FILE_NAME_SIZE: usize = 64;
const DIG_PRODUCT_ID_SIZE: usize = 64;

/// RDP protocol version carried in the core blocks.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RdpVersion(pub u32);

impl RdpVersion {
    pub const V4: Self = Self(0x0008_0001);
    pub const V5_PLUS: Self = Self(0x0008_0004);
    pub const V10: Self = Self(0x0008_0005);
    pub const V10_1: Self = Self(0x0008_0006);
    pub const V10_2: Self = Self(0x0008_0007);
    pub const V10_3: Self = Self(0x0008_0008);
    pub const V10_4: Self = Self(0x0008_0009);
    pub const V10_5: Self = Self(0x0008_000A);
    pub const V10_6: Self = Self(0x0008_000B);
    pub const V10_7: Self = Self(0x0008_000C);
}

impl From<u32> for RdpVersion {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<RdpVersion> for u32 {
    fn from(value: RdpVersion) -> Self {
        value.0
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u16)]
pub enum ClientColorDepth {
    Bpp4 = 0xCA00,
    Bpp8 = 0xCA01,
    Bpp16_555 = 0xCA02,
    Bpp16_565 = 0xCA03,
    Bpp24 = 0xCA04,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u16)]
pub enum HighColorDepth {
    Bpp4 = 4,
    Bpp8 = 8,
    Bpp15 = 15,
    Bpp16 = 16,
    Bpp24 = 24,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u16)]
pub enum SecureAccessSequence {
    Del = 0xAA03,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum KeyboardType {
    IbmPcXt = 1,
    OlivettiIco = 2,
    IbmPcAt = 3,
    IbmEnhanced = 4,
    Nokia1050 = 5,
    Nokia9140 = 6,
    Japanese = 7,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum ConnectionType {
    NotUsed = 0,
    Modem = 1,
    BroadbandLow = 2,
    Satellite = 3,
    BroadbandHigh = 4,
    Wan = 5,
    Lan = 6,
    AutoDetect = 7,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct SupportedColorDepths: u16 {
        const BPP24 = 0x01;
        const BPP16 = 0x02;
        const BPP15 = 0x04;
        const BPP32 = 0x08;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct ClientEarlyCapabilityFlags: u16 {
        const SUPPORT_ERR_INFO_PDU = 0x0001;
        const WANT_32_BPP_SESSION = 0x0002;
        const SUPPORT_STATUS_INFO_PDU = 0x0004;
        const STRONG_ASYMMETRIC_KEYS = 0x0008;
        const VALID_CONNECTION_TYPE = 0x0020;
        const SUPPORT_MONITOR_LAYOUT_PDU = 0x0040;
        const SUPPORT_NET_CHAR_AUTODETECT = 0x0080;
        const SUPPORT_DYN_VC_GFX_PROTOCOL = 0x0100;
        const SUPPORT_DYNAMIC_TIME_ZONE = 0x0200;
        const SUPPORT_HEARTBEAT_PDU = 0x0400;
        const SUPPORT_SKIP_CHANNELJOIN = 0x0800;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct ServerEarlyCapabilityFlags: u32 {
        const EDGE_ACTIONS_SUPPORTED_V1 = 0x0000_0001;
        const DYNAMIC_DST_SUPPORTED = 0x0000_0002;
        const EDGE_ACTIONS_SUPPORTED_V2 = 0x0000_0004;
        const SKIP_CHANNELJOIN_SUPPORTED = 0x0000_0008;
    }
}

/// TS_UD_CS_CORE.
///
/// The mandatory fields stop at `ime_file_name`; everything later is part of
/// the optional trailing block and must be emitted in order, without holes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCoreData {
    pub version: RdpVersion,
    pub desktop_width: u16,
    pub desktop_height: u16,
    pub color_depth: ClientColorDepth,
    pub sec_access_sequence: SecureAccessSequence,
    pub keyboard_layout: u32,
    pub client_build: u32,
    pub client_name: String,
    pub keyboard_type: KeyboardType,
    pub keyboard_subtype: u32,
    pub keyboard_functional_keys_count: u32,
    pub ime_file_name: String,
    pub optional_data: ClientCoreOptionalData,
}

impl ClientCoreData {
    const NAME: &'static str = "ClientCoreData";

    const FIXED_PART_SIZE: usize = 4 /* version */ + 2 /* width */ + 2 /* height */ + 2 /* colorDepth */
        + 2 /* sasSequence */ + 4 /* keyboardLayout */ + 4 /* clientBuild */ + CLIENT_NAME_SIZE
        + 4 /* keyboardType */ + 4 /* keyboardSubType */ + 4 /* keyboardFunctionKey */ + IME_FILE_NAME_SIZE;
}

impl Encode for ClientCoreData {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u32(self.version.into());
        dst.write_u16(self.desktop_width);
        dst.write_u16(self.desktop_height);
        dst.write_u16(self.color_depth.to_u16().unwrap_or(0xCA01));
        dst.write_u16(self.sec_access_sequence.to_u16().unwrap_or(0xAA03));
        dst.write_u32(self.keyboard_layout);
        dst.write_u32(self.client_build);
        utf16::write_fixed_utf16(dst, &self.client_name, CLIENT_NAME_SIZE);
        dst.write_u32(self.keyboard_type.to_u32().unwrap_or(4));
        dst.write_u32(self.keyboard_subtype);
        dst.write_u32(self.keyboard_functional_keys_count);
        utf16::write_fixed_utf16(dst, &self.ime_file_name, IME_FILE_NAME_SIZE);

        self.optional_data.encode(dst)
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.optional_data.size()
    }
}

impl<'de> Decode<'de> for ClientCoreData {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let version = RdpVersion::from(src.read_u32());
        let desktop_width = src.read_u16();
        let desktop_height = src.read_u16();
        let color_depth = ClientColorDepth::from_u16(src.read_u16())
            .ok_or_else(|| invalid_field_err!("colorDepth", "invalid color depth"))?;
        let sec_access_sequence = SecureAccessSequence::from_u16(src.read_u16())
            .ok_or_else(|| invalid_field_err!("sasSequence", "invalid secure access sequence"))?;
        let keyboard_layout = src.read_u32();
        let client_build = src.read_u32();
        let client_name = utf16::read_fixed_utf16(src, CLIENT_NAME_SIZE)
            .map_err(|_| invalid_field_err!("clientName", "not valid UTF-16"))?;
        let keyboard_type = KeyboardType::from_u32(src.read_u32())
            .ok_or_else(|| invalid_field_err!("keyboardType", "invalid keyboard type"))?;
        let keyboard_subtype = src.read_u32();
        let keyboard_functional_keys_count = src.read_u32();
        let ime_file_name = utf16::read_fixed_utf16(src, IME_FILE_NAME_SIZE)
            .map_err(|_| invalid_field_err!("imeFileName", "not valid UTF-16"))?;

        let optional_data = ClientCoreOptionalData::decode(src)?;

        Ok(Self {
            version,
            desktop_width,
            desktop_height,
            color_depth,
            sec_access_sequence,
            keyboard_layout,
            client_build,
            client_name,
            keyboard_type,
            keyboard_subtype,
            keyboard_functional_keys_count,
            ime_file_name,
            optional_data,
        })
    }
}

/// Optional trailing part of TS_UD_CS_CORE.
///
/// Encoding stops at the first `None`; later fields cannot be present when an
/// earlier one is absent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClientCoreOptionalData {
    pub post_beta2_color_depth: Option<ClientColorDepth>,
    pub client_product_id: Option<u16>,
    pub serial_number: Option<u32>,
    pub high_color_depth: Option<HighColorDepth>,
    pub supported_color_depths: Option<SupportedColorDepths>,
    pub early_capability_flags: Option<ClientEarlyCapabilityFlags>,
    pub dig_product_id: Option<String>,
    pub connection_type: Option<ConnectionType>,
    pub server_selected_protocol: Option<SecurityProtocol>,
    pub desktop_physical_width: Option<u32>,
    pub desktop_physical_height: Option<u32>,
    pub desktop_orientation: Option<u16>,
    pub desktop_scale_factor: Option<u32>,
    pub device_scale_factor: Option<u32>,
}

impl ClientCoreOptionalData {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        macro_rules! emit {
            ($field:expr, $write:expr) => {
                match $field {
                    Some(value) => {
                        #[allow(clippy::redundant_closure_call)]
                        $write(value)
                    }
                    None => return Ok(()),
                }
            };
        }

        emit!(self.post_beta2_color_depth, |v: ClientColorDepth| dst
            .write_u16(v.to_u16().unwrap_or(0xCA01)));
        emit!(self.client_product_id, |v| dst.write_u16(v));
        emit!(self.serial_number, |v| dst.write_u32(v));
        emit!(self.high_color_depth, |v: HighColorDepth| dst
            .write_u16(v.to_u16().unwrap_or(24)));
        emit!(self.supported_color_depths, |v: SupportedColorDepths| dst
            .write_u16(v.bits()));
        emit!(self.early_capability_flags, |v: ClientEarlyCapabilityFlags| dst
            .write_u16(v.bits()));
        emit!(self.dig_product_id.as_deref(), |v| utf16::write_fixed_utf16(
            dst,
            v,
            DIG_PRODUCT_ID_SIZE
        ));
        match self.connection_type {
            Some(value) => {
                dst.write_u8(value.to_u8().unwrap_or(0));
                dst.write_u8(0); // pad1octet
            }
            None => return Ok(()),
        }
        emit!(self.server_selected_protocol, |v: SecurityProtocol| dst
            .write_u32(v.bits()));
        emit!(self.desktop_physical_width, |v| dst.write_u32(v));
        emit!(self.desktop_physical_height, |v| dst.write_u32(v));
        emit!(self.desktop_orientation, |v| dst.write_u16(v));
        emit!(self.desktop_scale_factor, |v| dst.write_u32(v));
        emit!(self.device_scale_factor, |v| dst.write_u32(v));

        Ok(())
    }

    fn size(&self) -> usize {
        let mut size = 0;

        macro_rules! add {
            ($field:expr, $n:expr) => {
                if $field.is_some() {
                    size += $n;
                } else {
                    return size;
                }
            };
        }

        add!(self.post_beta2_color_depth, 2);
        add!(self.client_product_id, 2);
        add!(self.serial_number, 4);
        add!(self.high_color_depth, 2);
        add!(self.supported_color_depths, 2);
        add!(self.early_capability_flags, 2);
        add!(self.dig_product_id, DIG_PRODUCT_ID_SIZE);
        add!(self.connection_type, 2);
        add!(self.server_selected_protocol, 4);
        add!(self.desktop_physical_width, 4);
        add!(self.desktop_physical_height, 4);
        add!(self.desktop_orientation, 2);
        add!(self.desktop_scale_factor, 4);
        add!(self.device_scale_factor, 4);

        size
    }

    fn decode(src: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        let mut this = Self::default();

        macro_rules! take {
            ($n:expr) => {
                if src.len() < $n {
                    return Ok(this);
                }
            };
        }

        take!(2);
        this.post_beta2_color_depth = Some(
            ClientColorDepth::from_u16(src.read_u16())
                .ok_or_else(|| invalid_field_err!("postBeta2ColorDepth", "invalid color depth"))?,
        );

        take!(2);
        this.client_product_id = Some(src.read_u16());

        take!(4);
        this.serial_number = Some(src.read_u32());

        take!(2);
        this.high_color_depth = Some(
            HighColorDepth::from_u16(src.read_u16())
                .ok_or_else(|| invalid_field_err!("highColorDepth", "invalid color depth"))?,
        );

        take!(2);
        this.supported_color_depths = Some(SupportedColorDepths::from_bits_truncate(src.read_u16()));

        take!(2);
        this.early_capability_flags = Some(ClientEarlyCapabilityFlags::from_bits_truncate(src.read_u16()));

        take!(DIG_PRODUCT_ID_SIZE);
        this.dig_product_id = Some(
            utf16::read_fixed_utf16(src, DIG_PRODUCT_ID_SIZE)
                .map_err(|_| invalid_field_err!("digProductId", "not valid UTF-16"))?,
        );

        take!(2);
        this.connection_type = Some(
            ConnectionType::from_u8(src.read_u8())
                .ok_or_else(|| invalid_field_err!("connectionType", "invalid connection type"))?,
        );
        src.advance(1); // pad1octet

        take!(4);
        this.server_selected_protocol = Some(SecurityProtocol::from_bits_truncate(src.read_u32()));

        take!(4);
        this.desktop_physical_width = Some(src.read_u32());

        take!(4);
        this.desktop_physical_height = Some(src.read_u32());

        take!(2);
        this.desktop_orientation = Some(src.read_u16());

        take!(4);
        this.desktop_scale_factor = Some(src.read_u32());

        take!(4);
        this.device_scale_factor = Some(src.read_u32());

        Ok(this)
    }
}

/// TS_UD_SC_CORE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCoreData {
    pub version: RdpVersion,
    pub optional_data: ServerCoreOptionalData,
}

impl ServerCoreData {
    const NAME: &'static str = "ServerCoreData";

    const FIXED_PART_SIZE: usize = 4 /* version */;
}

impl Encode for ServerCoreData {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u32(self.version.into());

        if let Some(protocols) = self.optional_data.client_requested_protocols {
            dst.write_u32(protocols.bits());
        }
        if let Some(flags) = self.optional_data.early_capability_flags {
            dst.write_u32(flags.bits());
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let mut size = Self::FIXED_PART_SIZE;
        if self.optional_data.client_requested_protocols.is_some() {
            size += 4;
        }
        if self.optional_data.early_capability_flags.is_some() {
            size += 4;
        }
        size
    }
}

impl<'de> Decode<'de> for ServerCoreData {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let version = RdpVersion::from(src.read_u32());

        let mut optional_data = ServerCoreOptionalData::default();

        if src.len() >= 4 {
            optional_data.client_requested_protocols = Some(SecurityProtocol::from_bits_truncate(src.read_u32()));
        }
        if src.len() >= 4 {
            optional_data.early_capability_flags = Some(ServerEarlyCapabilityFlags::from_bits_truncate(src.read_u32()));
        }

        Ok(Self { version, optional_data })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerCoreOptionalData {
    pub client_requested_protocols: Option<SecurityProtocol>,
    pub early_capability_flags: Option<ServerEarlyCapabilityFlags>,
}

#[cfg(test)]
mod tests {
    use opalrdp_core::{decode, encode_vec};

    use super::*;

    fn client_core_data() -> ClientCoreData {
        ClientCoreData {
            version: RdpVersion::V5_PLUS,
            desktop_width: 1920,
            desktop_height: 1080,
            color_depth: ClientColorDepth::Bpp8,
            sec_access_sequence: SecureAccessSequence::Del,
            keyboard_layout: 0x409,
            client_build: 18363,
            client_name: "OPAL-TEST".to_owned(),
            keyboard_type: KeyboardType::IbmEnhanced,
            keyboard_subtype: 0,
            keyboard_functional_keys_count: 12,
            ime_file_name: String::new(),
            optional_data: ClientCoreOptionalData::default(),
        }
    }

    #[test]
    fn mandatory_part_round_trip() {
        let data = client_core_data();

        let encoded = encode_vec(&data).unwrap();
        assert_eq!(encoded.len(), ClientCoreData::FIXED_PART_SIZE);

        let decoded: ClientCoreData = decode(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn optional_part_stops_at_first_absent_field() {
        let mut data = client_core_data();
        data.optional_data.post_beta2_color_depth = Some(ClientColorDepth::Bpp8);
        data.optional_data.client_product_id = Some(1);
        data.optional_data.serial_number = Some(0);
        // high_color_depth is None: encoding must stop here.

        let encoded = encode_vec(&data).unwrap();
        assert_eq!(encoded.len(), ClientCoreData::FIXED_PART_SIZE + 2 + 2 + 4);

        let decoded: ClientCoreData = decode(&encoded).unwrap();
        assert_eq!(decoded, data);
    }
}
