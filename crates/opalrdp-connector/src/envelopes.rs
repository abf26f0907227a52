//! Helpers wrapping RDP-layer PDUs into their MCS / X.224 / TPKT envelopes,
//! and unwrapping incoming Send Data Indications. Shared with the session
//! crate, which speaks the same envelopes during the active stage.

use std::borrow::Cow;

use opalrdp_core::{decode, encode_buf, encode_vec, Encode, WriteBuf};
use opalrdp_pdu::rdp::headers::{
    CompressionFlags, ShareControlHeader, ShareControlPdu, ShareDataHeader, ShareDataPdu, StreamPriority,
};
use opalrdp_pdu::x224::{X224, X224Data};
use opalrdp_pdu::mcs;

use crate::{ConnectorError, ConnectorErrorExt as _, ConnectorResult};

/// Encodes `x224_msg` as the payload of an X.224 Data TPDU.
pub fn encode_x224_packet<T: Encode>(x224_msg: &T, buf: &mut WriteBuf) -> ConnectorResult<usize> {
    let x224_msg_buf = encode_vec(x224_msg).map_err(ConnectorError::encode)?;

    let pdu = X224Data {
        data: Cow::Owned(x224_msg_buf),
    };

    let written = encode_buf(&X224(pdu), buf).map_err(ConnectorError::encode)?;

    Ok(written)
}

/// Decodes the payload of an X.224 Data TPDU as `T`.
pub fn decode_x224_packet<'de, T: opalrdp_core::Decode<'de>>(src: &'de [u8]) -> ConnectorResult<T> {
    let x224_payload: X224<X224Data<'de>> = decode(src).map_err(ConnectorError::decode)?;

    let Cow::Borrowed(payload) = x224_payload.0.data else {
        unreachable!("X224Data always borrows on decode")
    };

    decode(payload).map_err(ConnectorError::decode)
}

/// Encodes `user_msg` inside an MCS Send Data Request.
pub fn encode_send_data_request<T: Encode>(
    initiator_id: u16,
    channel_id: u16,
    user_msg: &T,
    buf: &mut WriteBuf,
) -> ConnectorResult<usize> {
    let user_data = encode_vec(user_msg).map_err(ConnectorError::encode)?;

    let pdu = mcs::SendDataRequest {
        initiator_id,
        channel_id,
        user_data: Cow::Owned(user_data),
    };

    let written = encode_buf(&X224(pdu), buf).map_err(ConnectorError::encode)?;

    Ok(written)
}

/// Encodes raw channel bytes inside an MCS Send Data Request.
pub fn encode_send_data_request_raw(
    initiator_id: u16,
    channel_id: u16,
    user_data: &[u8],
    buf: &mut WriteBuf,
) -> ConnectorResult<usize> {
    let pdu = mcs::SendDataRequest {
        initiator_id,
        channel_id,
        user_data: Cow::Borrowed(user_data),
    };

    let written = encode_buf(&X224(pdu), buf).map_err(ConnectorError::encode)?;

    Ok(written)
}

#[derive(Debug, Clone, Copy)]
pub struct SendDataIndicationCtx<'a> {
    pub initiator_id: u16,
    pub channel_id: u16,
    pub user_data: &'a [u8],
}

impl<'a> SendDataIndicationCtx<'a> {
    pub fn decode_user_data<T: opalrdp_core::Decode<'a>>(&self) -> ConnectorResult<T> {
        decode(self.user_data).map_err(ConnectorError::decode)
    }
}

/// Unwraps a whole frame down to the MCS Send Data Indication it carries.
pub fn decode_send_data_indication(src: &[u8]) -> ConnectorResult<SendDataIndicationCtx<'_>> {
    let mcs_msg = decode::<X224<mcs::McsMessage<'_>>>(src).map_err(ConnectorError::decode)?.0;

    match mcs_msg {
        mcs::McsMessage::SendDataIndication(msg) => {
            let Cow::Borrowed(user_data) = msg.user_data else {
                unreachable!("SendDataIndication always borrows on decode")
            };

            Ok(SendDataIndicationCtx {
                initiator_id: msg.initiator_id,
                channel_id: msg.channel_id,
                user_data,
            })
        }
        mcs::McsMessage::DisconnectProviderUltimatum(msg) => Err(reason_err!(
            "SendDataIndication",
            "received disconnect provider ultimatum: {}",
            msg.reason,
        )),
        unexpected => Err(reason_err!(
            "SendDataIndication",
            "unexpected MCS message: {}",
            unexpected.name(),
        )),
    }
}

/// Encodes a share control PDU in its full envelope.
pub fn encode_share_control(
    initiator_id: u16,
    channel_id: u16,
    share_id: u32,
    pdu: ShareControlPdu,
    buf: &mut WriteBuf,
) -> ConnectorResult<usize> {
    let share_control_header = ShareControlHeader {
        share_control_pdu: pdu,
        pdu_source: initiator_id,
        share_id,
    };

    encode_send_data_request(initiator_id, channel_id, &share_control_header, buf)
}

#[derive(Debug, Clone)]
pub struct ShareControlCtx {
    pub initiator_id: u16,
    pub channel_id: u16,
    pub share_id: u32,
    pub pdu_source: u16,
    pub pdu: ShareControlPdu,
}

pub fn decode_share_control(ctx: SendDataIndicationCtx<'_>) -> ConnectorResult<ShareControlCtx> {
    let user_msg = ctx.decode_user_data::<ShareControlHeader>()?;

    Ok(ShareControlCtx {
        initiator_id: ctx.initiator_id,
        channel_id: ctx.channel_id,
        share_id: user_msg.share_id,
        pdu_source: user_msg.pdu_source,
        pdu: user_msg.share_control_pdu,
    })
}

/// Encodes a share data PDU in its full envelope.
pub fn encode_share_data(
    initiator_id: u16,
    channel_id: u16,
    share_id: u32,
    pdu: ShareDataPdu,
    buf: &mut WriteBuf,
) -> ConnectorResult<usize> {
    let share_data_header = ShareDataHeader {
        share_data_pdu: pdu,
        stream_priority: StreamPriority::Medium,
        compression_flags: CompressionFlags::empty(),
    };

    encode_share_control(
        initiator_id,
        channel_id,
        share_id,
        ShareControlPdu::Data(share_data_header),
        buf,
    )
}

#[derive(Debug, Clone)]
pub struct ShareDataCtx {
    pub initiator_id: u16,
    pub channel_id: u16,
    pub share_id: u32,
    pub pdu_source: u16,
    pub pdu: ShareDataPdu,
}

pub fn decode_share_data(ctx: SendDataIndicationCtx<'_>) -> ConnectorResult<ShareDataCtx> {
    let ctx = decode_share_control(ctx)?;

    let ShareControlPdu::Data(share_data_header) = ctx.pdu else {
        return Err(general_err!("expected a share data header"));
    };

    Ok(ShareDataCtx {
        initiator_id: ctx.initiator_id,
        channel_id: ctx.channel_id,
        share_id: ctx.share_id,
        pdu_source: ctx.pdu_source,
        pdu: share_data_header.share_data_pdu,
    })
}
