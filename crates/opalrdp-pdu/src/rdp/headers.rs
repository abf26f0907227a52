//! The envelopes around every slow-path RDP PDU: the basic security header,
//! the share control header and the share data header nested inside it.

use bitflags::bitflags;
use opalrdp_core::{
    cast_length, ensure_size, invalid_field_err, other_err, Decode, DecodeResult, Encode, EncodeResult, ReadCursor,
    WriteCursor,
};

use crate::rdp::capability_sets::{ClientConfirmActive, ServerDemandActive};
use crate::rdp::finalization::{ControlPdu, FontPdu, MonitorLayoutPdu, SynchronizePdu};
use crate::rdp::server_error_info::ServerSetErrorInfoPdu;

pub const BASIC_SECURITY_HEADER_SIZE: usize = 4;

/// shareControlHeader: totalLength + pduType/version + pduSource + shareId.
const SHARE_CONTROL_HEADER_LEN: usize = 2 + 2 + 2 + 4;

/// shareDataHeader after the share id: pad, streamId, uncompressedLength,
/// pduType2, compressedType, compressedLength.
const SHARE_DATA_PREFIX_LEN: usize = 1 + 1 + 2 + 1 + 1 + 2;

/// Version nibble-pattern carried alongside the share control PDU type.
const SHARE_PROTOCOL_VERSION: u16 = 0x0010;
const SHARE_TYPE_MASK: u16 = 0x000F;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct BasicSecurityHeaderFlags: u16 {
        const EXCHANGE_PKT = 0x0001;
        const TRANSPORT_REQ = 0x0002;
        const TRANSPORT_RSP = 0x0004;
        const ENCRYPT = 0x0008;
        const RESET_SEQNO = 0x0010;
        const IGNORE_SEQNO = 0x0020;
        const INFO_PKT = 0x0040;
        const LICENSE_PKT = 0x0080;
        const LICENSE_ENCRYPT_CS = 0x0100;
        const LICENSE_ENCRYPT_SC = 0x0200;
        const REDIRECTION_PKT = 0x0400;
        const SECURE_CHECKSUM = 0x0800;
        const AUTODETECT_REQ = 0x1000;
        const AUTODETECT_RSP = 0x2000;
        const HEARTBEAT = 0x4000;
        const FLAGSHI_VALID = 0x8000;
    }
}

/// TS_SECURITY_HEADER. With enhanced security the flags are all that is
/// left of it; no MAC ever follows because RC4 transport encryption is never
/// negotiated by this client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicSecurityHeader {
    pub flags: BasicSecurityHeaderFlags,
}

impl BasicSecurityHeader {
    const NAME: &'static str = "BasicSecurityHeader";

    pub const FIXED_PART_SIZE: usize = BASIC_SECURITY_HEADER_SIZE;
}

impl Encode for BasicSecurityHeader {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: Self::FIXED_PART_SIZE);

        dst.write_u16(self.flags.bits());
        dst.write_u16(0); // flagsHi, unused without FLAGSHI_VALID

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for BasicSecurityHeader {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_size!(ctx: Self::NAME, in: src, size: Self::FIXED_PART_SIZE);

        let flags = BasicSecurityHeaderFlags::from_bits(src.read_u16())
            .ok_or_else(|| invalid_field_err!("flags", "unknown security header flag"))?;
        src.advance(2); // flagsHi

        Ok(Self { flags })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StreamPriority {
    Undefined,
    Low,
    Medium,
    High,
}

impl StreamPriority {
    fn as_u8(self) -> u8 {
        match self {
            Self::Undefined => 0,
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 4,
        }
    }

    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Undefined),
            1 => Some(Self::Low),
            2 => Some(Self::Medium),
            4 => Some(Self::High),
            _ => None,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct CompressionFlags: u8 {
        const COMPRESSED = 0x20;
        const AT_FRONT = 0x40;
        const FLUSHED = 0x80;
    }
}

const COMPRESSION_TYPE_MASK: u8 = 0x0F;

/// Everything a share control header can wrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareControlPdu {
    ServerDemandActive(ServerDemandActive),
    ClientConfirmActive(ClientConfirmActive),
    Data(ShareDataHeader),
    ServerDeactivateAll(ServerDeactivateAll),
}

impl ShareControlPdu {
    const NAME: &'static str = "ShareControlPdu";

    // TS_SHARECONTROLHEADER pduType values.
    const TYPE_DEMAND_ACTIVE: u16 = 0x1;
    const TYPE_CONFIRM_ACTIVE: u16 = 0x3;
    const TYPE_DEACTIVATE_ALL: u16 = 0x6;
    const TYPE_DATA: u16 = 0x7;

    pub fn as_short_name(&self) -> &str {
        match self {
            Self::ServerDemandActive(_) => "Server Demand Active PDU",
            Self::ClientConfirmActive(_) => "Client Confirm Active PDU",
            Self::Data(_) => "Data PDU",
            Self::ServerDeactivateAll(_) => "Server Deactivate All PDU",
        }
    }

    fn type_value(&self) -> u16 {
        match self {
            Self::ServerDemandActive(_) => Self::TYPE_DEMAND_ACTIVE,
            Self::ClientConfirmActive(_) => Self::TYPE_CONFIRM_ACTIVE,
            Self::Data(_) => Self::TYPE_DATA,
            Self::ServerDeactivateAll(_) => Self::TYPE_DEACTIVATE_ALL,
        }
    }

    fn decode_body(type_value: u16, src: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        match type_value {
            Self::TYPE_DEMAND_ACTIVE => Ok(Self::ServerDemandActive(ServerDemandActive::decode(src)?)),
            Self::TYPE_CONFIRM_ACTIVE => Ok(Self::ClientConfirmActive(ClientConfirmActive::decode(src)?)),
            Self::TYPE_DATA => Ok(Self::Data(ShareDataHeader::decode(src)?)),
            Self::TYPE_DEACTIVATE_ALL => Ok(Self::ServerDeactivateAll(ServerDeactivateAll::decode(src)?)),
            _ => Err(invalid_field_err(Self::NAME, "pduType", "unknown share control type")),
        }
    }
}

impl Encode for ShareControlPdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        match self {
            Self::ServerDemandActive(pdu) => pdu.encode(dst),
            Self::ClientConfirmActive(pdu) => pdu.encode(dst),
            Self::Data(header) => header.encode(dst),
            Self::ServerDeactivateAll(pdu) => pdu.encode(dst),
        }
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        match self {
            Self::ServerDemandActive(pdu) => pdu.size(),
            Self::ClientConfirmActive(pdu) => pdu.size(),
            Self::Data(header) => header.size(),
            Self::ServerDeactivateAll(pdu) => pdu.size(),
        }
    }
}

/// TS_SHARECONTROLHEADER plus its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareControlHeader {
    pub share_control_pdu: ShareControlPdu,
    pub pdu_source: u16,
    pub share_id: u32,
}

impl ShareControlHeader {
    const NAME: &'static str = "ShareControlHeader";
}

impl Encode for ShareControlHeader {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        dst.write_u16(cast_length!(Self::NAME, "totalLength", self.size())?);
        dst.write_u16(SHARE_PROTOCOL_VERSION | self.share_control_pdu.type_value());
        dst.write_u16(self.pdu_source);
        dst.write_u32(self.share_id);

        self.share_control_pdu.encode(dst)
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        SHARE_CONTROL_HEADER_LEN + self.share_control_pdu.size()
    }
}

impl<'de> Decode<'de> for ShareControlHeader {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_size!(ctx: Self::NAME, in: src, size: SHARE_CONTROL_HEADER_LEN);

        let total_length = usize::from(src.read_u16());
        let type_and_version = src.read_u16();
        let pdu_source = src.read_u16();
        let share_id = src.read_u32();

        if type_and_version & !SHARE_TYPE_MASK != SHARE_PROTOCOL_VERSION {
            return Err(invalid_field_err!("pduType", "unsupported share protocol version"));
        }

        let type_value = type_and_version & SHARE_TYPE_MASK;
        let share_control_pdu = ShareControlPdu::decode_body(type_value, src)?;

        let header = Self {
            share_control_pdu,
            pdu_source,
            share_id,
        };

        // Data PDUs from some Windows builds carry trailing padding that the
        // total length includes but the body does not; swallow it.
        if type_value == ShareControlPdu::TYPE_DATA && total_length > header.size() {
            let padding = total_length - header.size();
            ensure_size!(ctx: Self::NAME, in: src, size: padding);
            src.advance(padding);
        }

        Ok(header)
    }
}

/// Everything a share data header can wrap (the client-relevant subset; the
/// long tail of pointer/order/sound PDUs is rejected as unsupported).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareDataPdu {
    Synchronize(SynchronizePdu),
    Control(ControlPdu),
    FontList(FontPdu),
    FontMap(FontPdu),
    MonitorLayout(MonitorLayoutPdu),
    ServerSetErrorInfo(ServerSetErrorInfoPdu),
    ShutdownRequest,
    ShutdownDenied,
    FrameAcknowledge(FrameAcknowledgePdu),
    /// Logon notifications; carried opaque, the session only logs them.
    SaveSessionInfo(Vec<u8>),
}

impl ShareDataPdu {
    const NAME: &'static str = "ShareDataPdu";

    // TS_SHAREDATAHEADER pduType2 values.
    const TYPE_SYNCHRONIZE: u8 = 0x1F;
    const TYPE_CONTROL: u8 = 0x14;
    const TYPE_FONT_LIST: u8 = 0x27;
    const TYPE_FONT_MAP: u8 = 0x28;
    const TYPE_MONITOR_LAYOUT: u8 = 0x37;
    const TYPE_SET_ERROR_INFO: u8 = 0x2F;
    const TYPE_SHUTDOWN_REQUEST: u8 = 0x24;
    const TYPE_SHUTDOWN_DENIED: u8 = 0x25;
    const TYPE_FRAME_ACKNOWLEDGE: u8 = 0x38;
    const TYPE_SAVE_SESSION_INFO: u8 = 0x26;

    pub fn as_short_name(&self) -> &str {
        match self {
            Self::Synchronize(_) => "Synchronize PDU",
            Self::Control(_) => "Control PDU",
            Self::FontList(_) => "Font List PDU",
            Self::FontMap(_) => "Font Map PDU",
            Self::MonitorLayout(_) => "Monitor Layout PDU",
            Self::ServerSetErrorInfo(_) => "Server Set Error Info PDU",
            Self::ShutdownRequest => "Shutdown Request PDU",
            Self::ShutdownDenied => "Shutdown Denied PDU",
            Self::FrameAcknowledge(_) => "Frame Acknowledge PDU",
            Self::SaveSessionInfo(_) => "Save Session Info PDU",
        }
    }

    fn type_value(&self) -> u8 {
        match self {
            Self::Synchronize(_) => Self::TYPE_SYNCHRONIZE,
            Self::Control(_) => Self::TYPE_CONTROL,
            Self::FontList(_) => Self::TYPE_FONT_LIST,
            Self::FontMap(_) => Self::TYPE_FONT_MAP,
            Self::MonitorLayout(_) => Self::TYPE_MONITOR_LAYOUT,
            Self::ServerSetErrorInfo(_) => Self::TYPE_SET_ERROR_INFO,
            Self::ShutdownRequest => Self::TYPE_SHUTDOWN_REQUEST,
            Self::ShutdownDenied => Self::TYPE_SHUTDOWN_DENIED,
            Self::FrameAcknowledge(_) => Self::TYPE_FRAME_ACKNOWLEDGE,
            Self::SaveSessionInfo(_) => Self::TYPE_SAVE_SESSION_INFO,
        }
    }

    fn decode_body(type_value: u8, src: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        match type_value {
            Self::TYPE_SYNCHRONIZE => Ok(Self::Synchronize(SynchronizePdu::decode(src)?)),
            Self::TYPE_CONTROL => Ok(Self::Control(ControlPdu::decode(src)?)),
            Self::TYPE_FONT_LIST => Ok(Self::FontList(FontPdu::decode(src)?)),
            Self::TYPE_FONT_MAP => Ok(Self::FontMap(FontPdu::decode(src)?)),
            Self::TYPE_MONITOR_LAYOUT => Ok(Self::MonitorLayout(MonitorLayoutPdu::decode(src)?)),
            Self::TYPE_SET_ERROR_INFO => Ok(Self::ServerSetErrorInfo(ServerSetErrorInfoPdu::decode(src)?)),
            Self::TYPE_SHUTDOWN_REQUEST => Ok(Self::ShutdownRequest),
            Self::TYPE_SHUTDOWN_DENIED => Ok(Self::ShutdownDenied),
            Self::TYPE_FRAME_ACKNOWLEDGE => Ok(Self::FrameAcknowledge(FrameAcknowledgePdu::decode(src)?)),
            Self::TYPE_SAVE_SESSION_INFO => Ok(Self::SaveSessionInfo(src.read_remaining().to_vec())),
            _ => Err(other_err(Self::NAME, "unsupported share data PDU type")),
        }
    }
}

impl Encode for ShareDataPdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        match self {
            Self::Synchronize(pdu) => pdu.encode(dst),
            Self::Control(pdu) => pdu.encode(dst),
            Self::FontList(pdu) | Self::FontMap(pdu) => pdu.encode(dst),
            Self::MonitorLayout(pdu) => pdu.encode(dst),
            Self::ServerSetErrorInfo(pdu) => pdu.encode(dst),
            Self::ShutdownRequest | Self::ShutdownDenied => Ok(()),
            Self::FrameAcknowledge(pdu) => pdu.encode(dst),
            Self::SaveSessionInfo(raw) => {
                ensure_size!(ctx: Self::NAME, in: dst, size: raw.len());
                dst.write_slice(raw);
                Ok(())
            }
        }
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        match self {
            Self::Synchronize(pdu) => pdu.size(),
            Self::Control(pdu) => pdu.size(),
            Self::FontList(pdu) | Self::FontMap(pdu) => pdu.size(),
            Self::MonitorLayout(pdu) => pdu.size(),
            Self::ServerSetErrorInfo(pdu) => pdu.size(),
            Self::ShutdownRequest | Self::ShutdownDenied => 0,
            Self::FrameAcknowledge(pdu) => pdu.size(),
            Self::SaveSessionInfo(raw) => raw.len(),
        }
    }
}

/// TS_SHAREDATAHEADER plus its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareDataHeader {
    pub share_data_pdu: ShareDataPdu,
    pub stream_priority: StreamPriority,
    pub compression_flags: CompressionFlags,
}

impl ShareDataHeader {
    const NAME: &'static str = "ShareDataHeader";
}

impl Encode for ShareDataHeader {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        if !self.compression_flags.is_empty() {
            return Err(other_err(Self::NAME, "bulk compression is not implemented"));
        }

        // uncompressedLength counts the body plus the three trailing header
        // fields, a quirk carried over from the capture format.
        let uncompressed_length = self.share_data_pdu.size() + 4;

        dst.write_u8(0); // pad1
        dst.write_u8(self.stream_priority.as_u8());
        dst.write_u16(cast_length!(Self::NAME, "uncompressedLength", uncompressed_length)?);
        dst.write_u8(self.share_data_pdu.type_value());
        dst.write_u8(0); // compressedType
        dst.write_u16(0); // compressedLength

        self.share_data_pdu.encode(dst)
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        SHARE_DATA_PREFIX_LEN + self.share_data_pdu.size()
    }
}

impl<'de> Decode<'de> for ShareDataHeader {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_size!(ctx: Self::NAME, in: src, size: SHARE_DATA_PREFIX_LEN);

        src.advance(1); // pad1
        let stream_priority = StreamPriority::from_u8(src.read_u8())
            .ok_or_else(|| invalid_field_err!("streamId", "unknown stream priority"))?;
        src.advance(2); // uncompressedLength, implied by the framing
        let type_value = src.read_u8();
        let compression = src.read_u8();
        src.advance(2); // compressedLength

        let compression_flags = CompressionFlags::from_bits_truncate(compression & !COMPRESSION_TYPE_MASK);
        let share_data_pdu = ShareDataPdu::decode_body(type_value, src)?;

        Ok(Self {
            share_data_pdu,
            stream_priority,
            compression_flags,
        })
    }
}

/// TS_FRAME_ACKNOWLEDGE_PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameAcknowledgePdu {
    pub frame_id: u32,
}

impl FrameAcknowledgePdu {
    const NAME: &'static str = "FrameAcknowledgePdu";
}

impl Encode for FrameAcknowledgePdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: 4);

        dst.write_u32(self.frame_id);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        4
    }
}

impl<'de> Decode<'de> for FrameAcknowledgePdu {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_size!(ctx: Self::NAME, in: src, size: 4);

        Ok(Self {
            frame_id: src.read_u32(),
        })
    }
}

/// Server Deactivate All PDU; the body is a source descriptor nobody reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDeactivateAll;

impl ServerDeactivateAll {
    const NAME: &'static str = "ServerDeactivateAll";
}

impl Encode for ServerDeactivateAll {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        dst.write_u16(1); // lengthSourceDescriptor
        dst.write_u8(0); // sourceDescriptor

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        3
    }
}

impl<'de> Decode<'de> for ServerDeactivateAll {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_size!(ctx: Self::NAME, in: src, size: 2);
        let descriptor_length = usize::from(src.read_u16());

        ensure_size!(ctx: Self::NAME, in: src, size: descriptor_length);
        src.advance(descriptor_length);

        Ok(Self)
    }
}

#[cfg(test)]
mod tests {
    use opalrdp_core::{decode, encode_vec};

    use super::*;

    #[test]
    fn share_data_envelope_round_trip() {
        let header = ShareControlHeader {
            share_control_pdu: ShareControlPdu::Data(ShareDataHeader {
                share_data_pdu: ShareDataPdu::Synchronize(SynchronizePdu { target_user_id: 1007 }),
                stream_priority: StreamPriority::Medium,
                compression_flags: CompressionFlags::empty(),
            }),
            pdu_source: 1007,
            share_id: 0x103EA,
        };

        let encoded = encode_vec(&header).unwrap();

        // totalLength leads the header and covers everything.
        assert_eq!(usize::from(u16::from_le_bytes([encoded[0], encoded[1]])), encoded.len());

        let parsed: ShareControlHeader = decode(&encoded).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn trailing_padding_on_data_pdus_is_swallowed() {
        let header = ShareControlHeader {
            share_control_pdu: ShareControlPdu::Data(ShareDataHeader {
                share_data_pdu: ShareDataPdu::ShutdownDenied,
                stream_priority: StreamPriority::Medium,
                compression_flags: CompressionFlags::empty(),
            }),
            pdu_source: 1007,
            share_id: 1,
        };

        let mut encoded = encode_vec(&header).unwrap();
        // Stretch totalLength over two bytes of padding, as some servers do.
        encoded.extend_from_slice(&[0, 0]);
        let total = encoded.len() as u16;
        encoded[..2].copy_from_slice(&total.to_le_bytes());

        let parsed: ShareControlHeader = decode(&encoded).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn wrong_share_version_is_rejected() {
        let header = ShareControlHeader {
            share_control_pdu: ShareControlPdu::ServerDeactivateAll(ServerDeactivateAll),
            pdu_source: 0x03EA,
            share_id: 1,
        };

        let mut encoded = encode_vec(&header).unwrap();
        encoded[3] = 0x02; // clobber the version nibble-pattern

        assert!(decode::<ShareControlHeader>(&encoded).is_err());
    }
}
