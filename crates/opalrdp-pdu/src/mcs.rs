//! T.125 MCS, as profiled by [MS-RDPBCGR].
//!
//! Two encodings live side by side: the connect phase
//! (Connect-Initial / Connect-Response, BER, carrying the GCC conference
//! blocks) and the domain PDUs (PER) that carry every byte of the session
//! afterwards. Only the client-relevant subset is modeled; tokens, merges
//! and the rest of the multipoint machinery are out.

use std::borrow::Cow;

use opalrdp_core::{
    cast_length, ensure_size, invalid_field_err, invalid_field_err_with_source, unexpected_message_type_err, Decode,
    DecodeError, DecodeResult, Encode, EncodeResult, ReadCursor, WriteCursor,
};

use crate::gcc::conference_create::{ConferenceCreateRequest, ConferenceCreateResponse};
use crate::gcc::ClientGccBlocks;
use crate::tpdu::{TpduCode, TpduHeader};
use crate::tpkt::TpktHeader;
use crate::x224::X224Pdu;
use crate::{ber, per};

// DomainMCSPDU application tags, carried in the top six bits of the first
// byte of every domain PDU.
const TAG_ERECT_DOMAIN_REQUEST: u8 = 1;
const TAG_DISCONNECT_PROVIDER_ULTIMATUM: u8 = 8;
const TAG_ATTACH_USER_REQUEST: u8 = 10;
const TAG_ATTACH_USER_CONFIRM: u8 = 11;
const TAG_CHANNEL_JOIN_REQUEST: u8 = 14;
const TAG_CHANNEL_JOIN_CONFIRM: u8 = 15;
const TAG_SEND_DATA_REQUEST: u8 = 25;
const TAG_SEND_DATA_INDICATION: u8 = 26;

// BER application tags of the connect phase.
const TAG_CONNECT_INITIAL: u8 = 101;
const TAG_CONNECT_RESPONSE: u8 = 102;

/// The MCS `Result` enumeration has sixteen variants; 0 is rt-successful.
const RESULT_VARIANTS: u8 = 16;

/// User ids hand-delivered by Attach-User Confirm start here (T.125 §7).
const USER_ID_BASE: u16 = 1001;

/// dataPriority = high, segmentation = begin | end, packed the way every RDP
/// peer sends it.
const PRIORITY_AND_SEGMENTATION: u8 = 0x70;

fn per_err<T>(ctx: &'static str, field: &'static str) -> impl FnOnce(per::PerError) -> T
where
    T: opalrdp_core::InvalidFieldErr + opalrdp_core::WithSource,
{
    move |e| invalid_field_err_with_source(ctx, field, "malformed PER value", e)
}

/// Reads the leading CHOICE byte and insists on `expected`, discarding the
/// low option bits.
fn expect_domain_tag(src: &mut ReadCursor<'_>, expected: u8, ctx: &'static str) -> DecodeResult<()> {
    ensure_size!(ctx: ctx, in: src, size: 1);
    let tag = src.read_u8() >> 2;

    if tag == expected {
        Ok(())
    } else {
        Err(unexpected_message_type_err(ctx, tag))
    }
}

fn write_domain_tag(dst: &mut WriteCursor<'_>, tag: u8, option_bits: u8) {
    dst.write_u8((tag << 2) | option_bits)
}

/// Wires a domain PDU's `parse`/`write`/`encoded_len` triple into the X.224
/// framing machinery.
macro_rules! domain_pdu {
    ($ty:ident, $label:literal) => {
        impl<'de> X224Pdu<'de> for $ty {
            const X224_NAME: &'static str = $label;

            const TPDU_CODE: TpduCode = TpduCode::Data;

            fn x224_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
                self.write(dst)
            }

            fn x224_body_decode(src: &mut ReadCursor<'de>, _: &TpktHeader, _: &TpduHeader) -> DecodeResult<Self> {
                Self::parse(src)
            }

            fn tpdu_header_variable_part_size(&self) -> usize {
                0
            }

            fn tpdu_user_data_size(&self) -> usize {
                self.encoded_len()
            }
        }
    };
    ($ty:ident<'de>, $label:literal) => {
        impl<'de> X224Pdu<'de> for $ty<'de> {
            const X224_NAME: &'static str = $label;

            const TPDU_CODE: TpduCode = TpduCode::Data;

            fn x224_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
                self.write(dst)
            }

            fn x224_body_decode(src: &mut ReadCursor<'de>, _: &TpktHeader, _: &TpduHeader) -> DecodeResult<Self> {
                Self::parse(src)
            }

            fn tpdu_header_variable_part_size(&self) -> usize {
                0
            }

            fn tpdu_user_data_size(&self) -> usize {
                self.encoded_len()
            }
        }
    };
}

// -- Erect Domain / Attach User --------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErectDomainPdu {
    pub sub_height: u32,
    pub sub_interval: u32,
}

domain_pdu!(ErectDomainPdu, "MCS Erect Domain Request");

impl ErectDomainPdu {
    const LABEL: &'static str = "ErectDomainPdu";

    fn write(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        write_domain_tag(dst, TAG_ERECT_DOMAIN_REQUEST, 0);
        per::write_u32(dst, self.sub_height);
        per::write_u32(dst, self.sub_interval);

        Ok(())
    }

    fn parse(src: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        expect_domain_tag(src, TAG_ERECT_DOMAIN_REQUEST, Self::LABEL)?;

        Ok(Self {
            sub_height: per::read_u32(src).map_err(per_err(Self::LABEL, "subHeight"))?,
            sub_interval: per::read_u32(src).map_err(per_err(Self::LABEL, "subInterval"))?,
        })
    }

    fn encoded_len(&self) -> usize {
        per::CHOICE_SIZE + per::sizeof_u32(self.sub_height) + per::sizeof_u32(self.sub_interval)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachUserRequest;

domain_pdu!(AttachUserRequest, "MCS Attach User Request");

impl AttachUserRequest {
    const LABEL: &'static str = "AttachUserRequest";

    fn write(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        write_domain_tag(dst, TAG_ATTACH_USER_REQUEST, 0);
        Ok(())
    }

    fn parse(src: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        expect_domain_tag(src, TAG_ATTACH_USER_REQUEST, Self::LABEL)?;
        Ok(Self)
    }

    fn encoded_len(&self) -> usize {
        per::CHOICE_SIZE
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachUserConfirm {
    pub result: u8,
    /// The user id the server attached us under; the `initiator` of every
    /// Send Data Request from here on.
    pub initiator_id: u16,
}

domain_pdu!(AttachUserConfirm, "MCS Attach User Confirm");

impl AttachUserConfirm {
    const LABEL: &'static str = "AttachUserConfirm";

    // Option bit 0b10: the optional initiator field is present.
    fn write(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        write_domain_tag(dst, TAG_ATTACH_USER_CONFIRM, 0b10);
        per::write_enum(dst, self.result);
        per::write_u16(dst, self.initiator_id, USER_ID_BASE).map_err(per_err(Self::LABEL, "initiator"))?;

        Ok(())
    }

    fn parse(src: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        expect_domain_tag(src, TAG_ATTACH_USER_CONFIRM, Self::LABEL)?;

        let result = per::read_enum(src, RESULT_VARIANTS).map_err(per_err(Self::LABEL, "result"))?;
        let initiator_id = per::read_u16(src, USER_ID_BASE).map_err(per_err(Self::LABEL, "initiator"))?;

        Ok(Self { result, initiator_id })
    }

    fn encoded_len(&self) -> usize {
        per::CHOICE_SIZE + per::ENUM_SIZE + per::U16_SIZE
    }
}

// -- Channel Join ----------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelJoinRequest {
    pub initiator_id: u16,
    pub channel_id: u16,
}

domain_pdu!(ChannelJoinRequest, "MCS Channel Join Request");

impl ChannelJoinRequest {
    const LABEL: &'static str = "ChannelJoinRequest";

    fn write(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        write_domain_tag(dst, TAG_CHANNEL_JOIN_REQUEST, 0);
        per::write_u16(dst, self.initiator_id, USER_ID_BASE).map_err(per_err(Self::LABEL, "initiator"))?;
        per::write_u16(dst, self.channel_id, 0).map_err(per_err(Self::LABEL, "channelId"))?;

        Ok(())
    }

    fn parse(src: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        expect_domain_tag(src, TAG_CHANNEL_JOIN_REQUEST, Self::LABEL)?;

        Ok(Self {
            initiator_id: per::read_u16(src, USER_ID_BASE).map_err(per_err(Self::LABEL, "initiator"))?,
            channel_id: per::read_u16(src, 0).map_err(per_err(Self::LABEL, "channelId"))?,
        })
    }

    fn encoded_len(&self) -> usize {
        per::CHOICE_SIZE + 2 * per::U16_SIZE
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelJoinConfirm {
    pub result: u8,
    pub initiator_id: u16,
    pub requested_channel_id: u16,
    pub channel_id: u16,
}

domain_pdu!(ChannelJoinConfirm, "MCS Channel Join Confirm");

impl ChannelJoinConfirm {
    const LABEL: &'static str = "ChannelJoinConfirm";

    fn write(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        // Option bit 0b10: the joined channel id is present.
        write_domain_tag(dst, TAG_CHANNEL_JOIN_CONFIRM, 0b10);
        per::write_enum(dst, self.result);
        per::write_u16(dst, self.initiator_id, USER_ID_BASE).map_err(per_err(Self::LABEL, "initiator"))?;
        per::write_u16(dst, self.requested_channel_id, 0).map_err(per_err(Self::LABEL, "requested"))?;
        per::write_u16(dst, self.channel_id, 0).map_err(per_err(Self::LABEL, "channelId"))?;

        Ok(())
    }

    fn parse(src: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        expect_domain_tag(src, TAG_CHANNEL_JOIN_CONFIRM, Self::LABEL)?;

        Ok(Self {
            result: per::read_enum(src, RESULT_VARIANTS).map_err(per_err(Self::LABEL, "result"))?,
            initiator_id: per::read_u16(src, USER_ID_BASE).map_err(per_err(Self::LABEL, "initiator"))?,
            requested_channel_id: per::read_u16(src, 0).map_err(per_err(Self::LABEL, "requested"))?,
            channel_id: per::read_u16(src, 0).map_err(per_err(Self::LABEL, "channelId"))?,
        })
    }

    fn encoded_len(&self) -> usize {
        per::CHOICE_SIZE + per::ENUM_SIZE + 3 * per::U16_SIZE
    }
}

// -- Send Data -------------------------------------------------------------
//
// Requests (client to server) and indications (server to client) share one
// body shape; only the tag differs.

fn write_send_data(
    dst: &mut WriteCursor<'_>,
    tag: u8,
    initiator_id: u16,
    channel_id: u16,
    data: &[u8],
    ctx: &'static str,
) -> EncodeResult<()> {
    write_domain_tag(dst, tag, 0);
    per::write_u16(dst, initiator_id, USER_ID_BASE).map_err(per_err(ctx, "initiator"))?;
    per::write_u16(dst, channel_id, 0).map_err(per_err(ctx, "channelId"))?;
    dst.write_u8(PRIORITY_AND_SEGMENTATION);
    per::write_length(dst, cast_length!(ctx, "userDataLength", data.len())?);
    dst.write_slice(data);

    Ok(())
}

fn parse_send_data<'de>(src: &mut ReadCursor<'de>, tag: u8, ctx: &'static str) -> DecodeResult<(u16, u16, &'de [u8])> {
    expect_domain_tag(src, tag, ctx)?;

    let initiator_id = per::read_u16(src, USER_ID_BASE).map_err(per_err(ctx, "initiator"))?;
    let channel_id = per::read_u16(src, 0).map_err(per_err(ctx, "channelId"))?;

    ensure_size!(ctx: ctx, in: src, size: 1);
    src.advance(1); // dataPriority + segmentation, irrelevant on receive

    let (data_length, _) = per::read_length(src).map_err(per_err(ctx, "userDataLength"))?;

    ensure_size!(ctx: ctx, in: src, size: usize::from(data_length));
    let data = src.read_slice(usize::from(data_length));

    Ok((initiator_id, channel_id, data))
}

fn send_data_encoded_len(data_len: usize) -> usize {
    per::CHOICE_SIZE
        + 2 * per::U16_SIZE
        + 1
        + per::sizeof_length(u16::try_from(data_len).unwrap_or(u16::MAX))
        + data_len
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendDataRequest<'a> {
    pub initiator_id: u16,
    pub channel_id: u16,
    pub user_data: Cow<'a, [u8]>,
}

domain_pdu!(SendDataRequest<'de>, "MCS Send Data Request");

impl<'a> SendDataRequest<'a> {
    const LABEL: &'static str = "SendDataRequest";

    fn write(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        write_send_data(
            dst,
            TAG_SEND_DATA_REQUEST,
            self.initiator_id,
            self.channel_id,
            &self.user_data,
            Self::LABEL,
        )
    }

    fn parse(src: &mut ReadCursor<'a>) -> DecodeResult<Self> {
        let (initiator_id, channel_id, data) = parse_send_data(src, TAG_SEND_DATA_REQUEST, Self::LABEL)?;

        Ok(Self {
            initiator_id,
            channel_id,
            user_data: Cow::Borrowed(data),
        })
    }

    fn encoded_len(&self) -> usize {
        send_data_encoded_len(self.user_data.len())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendDataIndication<'a> {
    pub initiator_id: u16,
    pub channel_id: u16,
    pub user_data: Cow<'a, [u8]>,
}

domain_pdu!(SendDataIndication<'de>, "MCS Send Data Indication");

impl<'a> SendDataIndication<'a> {
    const LABEL: &'static str = "SendDataIndication";

    fn write(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        write_send_data(
            dst,
            TAG_SEND_DATA_INDICATION,
            self.initiator_id,
            self.channel_id,
            &self.user_data,
            Self::LABEL,
        )
    }

    fn parse(src: &mut ReadCursor<'a>) -> DecodeResult<Self> {
        let (initiator_id, channel_id, data) = parse_send_data(src, TAG_SEND_DATA_INDICATION, Self::LABEL)?;

        Ok(Self {
            initiator_id,
            channel_id,
            user_data: Cow::Borrowed(data),
        })
    }

    fn encoded_len(&self) -> usize {
        send_data_encoded_len(self.user_data.len())
    }
}

// -- Disconnect ------------------------------------------------------------

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum DisconnectReason {
    DomainDisconnected = 0,
    ProviderInitiated = 1,
    TokenPurged = 2,
    UserRequested = 3,
    ChannelPurged = 4,
}

impl DisconnectReason {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::DomainDisconnected),
            1 => Some(Self::ProviderInitiated),
            2 => Some(Self::TokenPurged),
            3 => Some(Self::UserRequested),
            4 => Some(Self::ChannelPurged),
            _ => None,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::DomainDisconnected => "domain disconnected",
            Self::ProviderInitiated => "server-initiated disconnect",
            Self::TokenPurged => "token purged",
            Self::UserRequested => "user-requested disconnect",
            Self::ChannelPurged => "channel purged",
        }
    }
}

impl core::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.description())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DisconnectProviderUltimatum {
    pub reason: DisconnectReason,
}

domain_pdu!(DisconnectProviderUltimatum, "MCS Disconnect Provider Ultimatum");

impl DisconnectProviderUltimatum {
    const LABEL: &'static str = "DisconnectProviderUltimatum";

    pub fn from_reason(reason: DisconnectReason) -> Self {
        Self { reason }
    }

    // The three-bit reason straddles the byte boundary: two bits ride in the
    // tag byte's option positions, the third is the top bit of a second byte.
    fn write(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        let reason = self.reason.as_u8();

        write_domain_tag(dst, TAG_DISCONNECT_PROVIDER_ULTIMATUM, reason >> 1);
        dst.write_u8(reason << 7);

        Ok(())
    }

    fn parse(src: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        ensure_size!(ctx: Self::LABEL, in: src, size: 2);

        let first = src.read_u8();
        let second = src.read_u8();

        if first >> 2 != TAG_DISCONNECT_PROVIDER_ULTIMATUM {
            return Err(unexpected_message_type_err(Self::LABEL, first >> 2));
        }

        let reason = ((first & 0b11) << 1) | (second >> 7);

        Ok(Self {
            reason: DisconnectReason::from_u8(reason)
                .ok_or_else(|| invalid_field_err(Self::LABEL, "reason", "unknown disconnect reason"))?,
        })
    }

    fn encoded_len(&self) -> usize {
        2
    }
}

// -- Demultiplexing --------------------------------------------------------

/// Any domain PDU; what the active stage and the connect helpers pull apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum McsMessage<'a> {
    ErectDomainRequest(ErectDomainPdu),
    AttachUserRequest(AttachUserRequest),
    AttachUserConfirm(AttachUserConfirm),
    ChannelJoinRequest(ChannelJoinRequest),
    ChannelJoinConfirm(ChannelJoinConfirm),
    SendDataRequest(SendDataRequest<'a>),
    SendDataIndication(SendDataIndication<'a>),
    DisconnectProviderUltimatum(DisconnectProviderUltimatum),
}

impl McsMessage<'_> {
    const LABEL: &'static str = "McsMessage";

    pub fn name(&self) -> &'static str {
        match self {
            Self::ErectDomainRequest(_) => ErectDomainPdu::LABEL,
            Self::AttachUserRequest(_) => AttachUserRequest::LABEL,
            Self::AttachUserConfirm(_) => AttachUserConfirm::LABEL,
            Self::ChannelJoinRequest(_) => ChannelJoinRequest::LABEL,
            Self::ChannelJoinConfirm(_) => ChannelJoinConfirm::LABEL,
            Self::SendDataRequest(_) => SendDataRequest::LABEL,
            Self::SendDataIndication(_) => SendDataIndication::LABEL,
            Self::DisconnectProviderUltimatum(_) => DisconnectProviderUltimatum::LABEL,
        }
    }
}

impl<'de> X224Pdu<'de> for McsMessage<'de> {
    const X224_NAME: &'static str = "MCS Domain PDU";

    const TPDU_CODE: TpduCode = TpduCode::Data;

    fn x224_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        match self {
            Self::ErectDomainRequest(pdu) => pdu.write(dst),
            Self::AttachUserRequest(pdu) => pdu.write(dst),
            Self::AttachUserConfirm(pdu) => pdu.write(dst),
            Self::ChannelJoinRequest(pdu) => pdu.write(dst),
            Self::ChannelJoinConfirm(pdu) => pdu.write(dst),
            Self::SendDataRequest(pdu) => pdu.write(dst),
            Self::SendDataIndication(pdu) => pdu.write(dst),
            Self::DisconnectProviderUltimatum(pdu) => pdu.write(dst),
        }
    }

    fn x224_body_decode(src: &mut ReadCursor<'de>, _: &TpktHeader, _: &TpduHeader) -> DecodeResult<Self> {
        ensure_size!(ctx: Self::LABEL, in: src, size: 1);

        let message = match src.peek_u8() >> 2 {
            TAG_ERECT_DOMAIN_REQUEST => Self::ErectDomainRequest(ErectDomainPdu::parse(src)?),
            TAG_ATTACH_USER_REQUEST => Self::AttachUserRequest(AttachUserRequest::parse(src)?),
            TAG_ATTACH_USER_CONFIRM => Self::AttachUserConfirm(AttachUserConfirm::parse(src)?),
            TAG_CHANNEL_JOIN_REQUEST => Self::ChannelJoinRequest(ChannelJoinRequest::parse(src)?),
            TAG_CHANNEL_JOIN_CONFIRM => Self::ChannelJoinConfirm(ChannelJoinConfirm::parse(src)?),
            TAG_SEND_DATA_REQUEST => Self::SendDataRequest(SendDataRequest::parse(src)?),
            TAG_SEND_DATA_INDICATION => Self::SendDataIndication(SendDataIndication::parse(src)?),
            TAG_DISCONNECT_PROVIDER_ULTIMATUM => {
                Self::DisconnectProviderUltimatum(DisconnectProviderUltimatum::parse(src)?)
            }
            unknown => return Err(unexpected_message_type_err(Self::LABEL, unknown)),
        };

        Ok(message)
    }

    fn tpdu_header_variable_part_size(&self) -> usize {
        0
    }

    fn tpdu_user_data_size(&self) -> usize {
        match self {
            Self::ErectDomainRequest(pdu) => pdu.encoded_len(),
            Self::AttachUserRequest(pdu) => pdu.encoded_len(),
            Self::AttachUserConfirm(pdu) => pdu.encoded_len(),
            Self::ChannelJoinRequest(pdu) => pdu.encoded_len(),
            Self::ChannelJoinConfirm(pdu) => pdu.encoded_len(),
            Self::SendDataRequest(pdu) => pdu.encoded_len(),
            Self::SendDataIndication(pdu) => pdu.encoded_len(),
            Self::DisconnectProviderUltimatum(pdu) => pdu.encoded_len(),
        }
    }
}

// -- Connect phase ---------------------------------------------------------
//
// Connect-Initial ::= [APPLICATION 101] IMPLICIT SEQUENCE {
//     callingDomainSelector OCTET STRING, calledDomainSelector OCTET STRING,
//     upwardFlag BOOLEAN, targetParameters DomainParameters,
//     minimumParameters DomainParameters, maximumParameters DomainParameters,
//     userData OCTET STRING }
//
// Connect-Response ::= [APPLICATION 102] IMPLICIT SEQUENCE {
//     result Result, calledConnectId INTEGER, domainParameters
//     DomainParameters, userData OCTET STRING }
//
// The user data octet strings hold the GCC conference blocks.

/// DomainParameters negotiation triple. RDP clients send a fixed target and
/// bracket it with equally fixed minimum/maximum sets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DomainParameters {
    pub max_channel_ids: u32,
    pub max_user_ids: u32,
    pub max_token_ids: u32,
    pub num_priorities: u32,
    pub min_throughput: u32,
    pub max_height: u32,
    pub max_mcs_pdu_size: u32,
    pub protocol_version: u32,
}

impl DomainParameters {
    const LABEL: &'static str = "DomainParameters";

    fn with_limits(max_channel_ids: u32, max_user_ids: u32, max_token_ids: u32, max_mcs_pdu_size: u32) -> Self {
        Self {
            max_channel_ids,
            max_user_ids,
            max_token_ids,
            num_priorities: 1,
            min_throughput: 0,
            max_height: 1,
            max_mcs_pdu_size,
            protocol_version: 2,
        }
    }

    pub fn target() -> Self {
        Self::with_limits(34, 2, 0, 65535)
    }

    pub fn min() -> Self {
        Self::with_limits(1, 1, 1, 1056)
    }

    pub fn max() -> Self {
        Self::with_limits(65535, 64535, 65535, 65535)
    }

    fn content_len(&self) -> usize {
        [
            self.max_channel_ids,
            self.max_user_ids,
            self.max_token_ids,
            self.num_priorities,
            self.min_throughput,
            self.max_height,
            self.max_mcs_pdu_size,
            self.protocol_version,
        ]
        .iter()
        .map(|&value| ber::sizeof_integer(value))
        .sum()
    }
}

impl Encode for DomainParameters {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(ctx: Self::LABEL, in: dst, size: self.size());

        ber::write_sequence_tag(dst, cast_length!(Self::LABEL, "length", self.content_len())?)?;
        for value in [
            self.max_channel_ids,
            self.max_user_ids,
            self.max_token_ids,
            self.num_priorities,
            self.min_throughput,
            self.max_height,
            self.max_mcs_pdu_size,
            self.protocol_version,
        ] {
            ber::write_integer(dst, value)?;
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::LABEL
    }

    fn size(&self) -> usize {
        let content = self.content_len();
        content + ber::sizeof_sequence_tag(content as u16)
    }
}

impl<'de> Decode<'de> for DomainParameters {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ber::read_sequence_tag(src)?;

        let mut values = [0u32; 8];
        for value in values.iter_mut() {
            *value = ber::read_integer(src)? as u32;
        }

        let [max_channel_ids, max_user_ids, max_token_ids, num_priorities, min_throughput, max_height, max_mcs_pdu_size, protocol_version] =
            values;

        Ok(Self {
            max_channel_ids,
            max_user_ids,
            max_token_ids,
            num_priorities,
            min_throughput,
            max_height,
            max_mcs_pdu_size,
            protocol_version,
        })
    }
}

/// Client MCS Connect Initial.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectInitial {
    pub conference_create_request: ConferenceCreateRequest,
    pub calling_domain_selector: Vec<u8>,
    pub called_domain_selector: Vec<u8>,
    pub upward_flag: bool,
    pub target_parameters: DomainParameters,
    pub min_parameters: DomainParameters,
    pub max_parameters: DomainParameters,
}

impl ConnectInitial {
    const LABEL: &'static str = "ConnectInitial";

    pub fn with_gcc_blocks(gcc_blocks: ClientGccBlocks) -> Self {
        Self {
            conference_create_request: ConferenceCreateRequest { gcc_blocks },
            // Both selectors are the one-byte "domain 1" value everyone uses.
            calling_domain_selector: vec![0x01],
            called_domain_selector: vec![0x01],
            upward_flag: true,
            target_parameters: DomainParameters::target(),
            min_parameters: DomainParameters::min(),
            max_parameters: DomainParameters::max(),
        }
    }

    fn content_len(&self) -> usize {
        ber::sizeof_octet_string(self.calling_domain_selector.len() as u16)
            + ber::sizeof_octet_string(self.called_domain_selector.len() as u16)
            + ber::SIZEOF_BOOL
            + self.target_parameters.size()
            + self.min_parameters.size()
            + self.max_parameters.size()
            + ber::sizeof_octet_string(self.conference_create_request.size() as u16)
    }
}

impl Encode for ConnectInitial {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(ctx: Self::LABEL, in: dst, size: self.size());

        ber::write_application_tag(dst, TAG_CONNECT_INITIAL, cast_length!(Self::LABEL, "length", self.content_len())?)?;
        ber::write_octet_string(dst, &self.calling_domain_selector)?;
        ber::write_octet_string(dst, &self.called_domain_selector)?;
        ber::write_bool(dst, self.upward_flag)?;
        self.target_parameters.encode(dst)?;
        self.min_parameters.encode(dst)?;
        self.max_parameters.encode(dst)?;
        ber::write_octet_string_tag(dst, cast_length!(Self::LABEL, "userDataLength", self.conference_create_request.size())?)?;
        self.conference_create_request.encode(dst)
    }

    fn name(&self) -> &'static str {
        Self::LABEL
    }

    fn size(&self) -> usize {
        let content = self.content_len();
        content + ber::sizeof_application_tag(TAG_CONNECT_INITIAL, content as u16)
    }
}

impl<'de> Decode<'de> for ConnectInitial {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ber::read_application_tag(src, TAG_CONNECT_INITIAL)?;

        let calling_domain_selector = ber::read_octet_string(src)?;
        let called_domain_selector = ber::read_octet_string(src)?;
        let upward_flag = ber::read_bool(src)?;
        let target_parameters = DomainParameters::decode(src)?;
        let min_parameters = DomainParameters::decode(src)?;
        let max_parameters = DomainParameters::decode(src)?;
        let _user_data_length = ber::read_octet_string_tag(src)?;

        Ok(Self {
            conference_create_request: ConferenceCreateRequest::decode(src)?,
            calling_domain_selector,
            called_domain_selector,
            upward_flag,
            target_parameters,
            min_parameters,
            max_parameters,
        })
    }
}

/// Server MCS Connect Response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectResponse {
    pub conference_create_response: ConferenceCreateResponse,
    pub called_connect_id: u32,
    pub domain_parameters: DomainParameters,
}

impl ConnectResponse {
    const LABEL: &'static str = "ConnectResponse";

    fn content_len(&self) -> usize {
        ber::SIZEOF_ENUMERATED
            + ber::sizeof_integer(self.called_connect_id)
            + self.domain_parameters.size()
            + ber::sizeof_octet_string(self.conference_create_response.size() as u16)
    }
}

impl Encode for ConnectResponse {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(ctx: Self::LABEL, in: dst, size: self.size());

        ber::write_application_tag(dst, TAG_CONNECT_RESPONSE, cast_length!(Self::LABEL, "length", self.content_len())?)?;
        ber::write_enumerated(dst, 0)?; // rt-successful
        ber::write_integer(dst, self.called_connect_id)?;
        self.domain_parameters.encode(dst)?;
        ber::write_octet_string_tag(dst, cast_length!(Self::LABEL, "userDataLength", self.conference_create_response.size())?)?;
        self.conference_create_response.encode(dst)
    }

    fn name(&self) -> &'static str {
        Self::LABEL
    }

    fn size(&self) -> usize {
        let content = self.content_len();
        content + ber::sizeof_application_tag(TAG_CONNECT_RESPONSE, content as u16)
    }
}

impl<'de> Decode<'de> for ConnectResponse {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ber::read_application_tag(src, TAG_CONNECT_RESPONSE)?;
        ber::read_enumerated(src, RESULT_VARIANTS)?;

        let called_connect_id = ber::read_integer(src)? as u32;
        let domain_parameters = DomainParameters::decode(src)?;
        let _user_data_length = ber::read_octet_string_tag(src)?;

        Ok(Self {
            conference_create_response: ConferenceCreateResponse::decode(src)?,
            called_connect_id,
            domain_parameters,
        })
    }
}

#[cfg(test)]
mod tests {
    use opalrdp_core::{decode, encode_vec};

    use crate::x224::X224;

    use super::*;

    #[test]
    fn channel_join_request_round_trip() {
        let pdu = ChannelJoinRequest {
            initiator_id: 1007,
            channel_id: 1003,
        };

        let frame = encode_vec(&X224(pdu.clone())).unwrap();
        let parsed: X224<ChannelJoinRequest> = decode(&frame).unwrap();
        assert_eq!(parsed.0, pdu);
    }

    #[test]
    fn send_data_request_carries_its_payload() {
        let pdu = SendDataRequest {
            initiator_id: 1007,
            channel_id: 1003,
            user_data: Cow::Owned(vec![0xDE, 0xAD, 0xBE, 0xEF]),
        };

        let frame = encode_vec(&X224(pdu)).unwrap();
        assert_eq!(usize::from(u16::from_be_bytes([frame[2], frame[3]])), frame.len());

        let parsed: X224<SendDataRequest<'_>> = decode(&frame).unwrap();
        assert_eq!(parsed.0.initiator_id, 1007);
        assert_eq!(parsed.0.channel_id, 1003);
        assert_eq!(parsed.0.user_data.as_ref(), [0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn send_data_demultiplexes_as_mcs_message() {
        let frame = encode_vec(&X224(SendDataIndication {
            initiator_id: 1002,
            channel_id: 1003,
            user_data: Cow::Owned(vec![1, 2, 3]),
        }))
        .unwrap();

        let parsed: X224<McsMessage<'_>> = decode(&frame).unwrap();
        let McsMessage::SendDataIndication(indication) = parsed.0 else {
            panic!("expected a Send Data Indication");
        };
        assert_eq!(indication.user_data.as_ref(), [1, 2, 3]);
    }

    #[test]
    fn disconnect_ultimatum_reason_bit_split() {
        let pdu = DisconnectProviderUltimatum::from_reason(DisconnectReason::UserRequested);

        let frame = encode_vec(&X224(pdu)).unwrap();
        // The canonical rn-user-requested encoding.
        assert_eq!(&frame[frame.len() - 2..], [0x21, 0x80]);

        let parsed: X224<DisconnectProviderUltimatum> = decode(&frame).unwrap();
        assert_eq!(parsed.0.reason, DisconnectReason::UserRequested);
    }

    #[test]
    fn attach_user_confirm_applies_user_id_base() {
        let pdu = AttachUserConfirm {
            result: 0,
            initiator_id: 1007,
        };

        let frame = encode_vec(&X224(pdu)).unwrap();
        // 1007 is stored as the offset 6 from the user id base.
        assert_eq!(&frame[frame.len() - 2..], [0x00, 0x06]);

        let parsed: X224<AttachUserConfirm> = decode(&frame).unwrap();
        assert_eq!(parsed.0.initiator_id, 1007);
    }

    #[test]
    fn truncated_send_data_is_rejected() {
        let frame = encode_vec(&X224(SendDataIndication {
            initiator_id: 1002,
            channel_id: 1003,
            user_data: Cow::Owned(vec![9; 64]),
        }))
        .unwrap();

        // Cut the frame short of the advertised user data.
        assert!(decode::<X224<SendDataIndication<'_>>>(&frame[..frame.len() - 10]).is_err());
    }
}
