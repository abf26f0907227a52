//! Slow-path (X.224) traffic during the active stage: static channel
//! demultiplexing, dynamic channel tunneling and the IO channel.

use opalrdp_core::{decode, encode_vec, WriteBuf};
use opalrdp_dvc::DrdynvcClient;
use opalrdp_pdu::mcs::{DisconnectProviderUltimatum, DisconnectReason, McsMessage};
use opalrdp_pdu::x224::X224;
use opalrdp_pdu::rdp::headers::{ShareControlPdu, ShareDataPdu};
use opalrdp_pdu::rdp::server_error_info::{ErrorInfo, ProtocolIndependentCode, ServerSetErrorInfoPdu};
use opalrdp_svc::{chunkify, StaticChannelSet, SvcMessage};

use opalrdp_connector::envelopes::{self, SendDataIndicationCtx};

use crate::{session_general_err, session_reason_err, SessionError, SessionErrorExt as _, SessionResult};

/// What the caller must do with the result of processing one slow-path frame.
#[derive(Debug, Clone)]
pub enum ProcessorOutput {
    /// Encoded bytes to send to the server.
    ResponseFrame(Vec<u8>),
    /// Graceful disconnect; the caller closes the connection.
    Disconnect(DisconnectReason),
}

pub struct Processor {
    static_channels: StaticChannelSet,
    user_channel_id: u16,
    io_channel_id: u16,
    share_id: u32,
    drdynvc_channel_id: Option<u16>,
}

impl Processor {
    pub fn new(static_channels: StaticChannelSet, user_channel_id: u16, io_channel_id: u16, share_id: u32) -> Self {
        let drdynvc_channel_id = static_channels.drdynvc_channel_id();

        Self {
            static_channels,
            user_channel_id,
            io_channel_id,
            share_id,
            drdynvc_channel_id,
        }
    }

    pub fn user_channel_id(&self) -> u16 {
        self.user_channel_id
    }

    pub fn io_channel_id(&self) -> u16 {
        self.io_channel_id
    }

    pub fn share_id(&self) -> u32 {
        self.share_id
    }

    /// Processes one slow-path frame. Outputs must be handled in order.
    pub fn process(&mut self, frame: &[u8]) -> SessionResult<Vec<ProcessorOutput>> {
        let mcs_msg = decode::<X224<McsMessage<'_>>>(frame).map_err(SessionError::decode)?.0;

        match mcs_msg {
            McsMessage::SendDataIndication(msg) => {
                let user_data = match msg.user_data {
                    std::borrow::Cow::Borrowed(data) => data,
                    std::borrow::Cow::Owned(_) => unreachable!("SendDataIndication always borrows on decode"),
                };

                self.process_send_data_indication(SendDataIndicationCtx {
                    initiator_id: msg.initiator_id,
                    channel_id: msg.channel_id,
                    user_data,
                })
            }
            McsMessage::DisconnectProviderUltimatum(msg) => {
                debug!(reason = %msg.reason, "Server disconnect ultimatum");
                Ok(vec![ProcessorOutput::Disconnect(msg.reason)])
            }
            unexpected => Err(session_reason_err!(
                "X224",
                "unexpected MCS message: {}",
                unexpected.name()
            )),
        }
    }

    fn process_send_data_indication(&mut self, ctx: SendDataIndicationCtx<'_>) -> SessionResult<Vec<ProcessorOutput>> {
        let channel_id = ctx.channel_id;

        if channel_id == self.io_channel_id {
            self.process_io_channel(ctx)
        } else {
            // Static virtual channel traffic: reassemble chunks, then hand
            // the whole message to the channel.
            let Some(complete) = self
                .static_channels
                .reassemble(channel_id, ctx.user_data)
                .map_err(SessionError::decode)?
            else {
                return Ok(Vec::new());
            };

            let Some(channel) = self.static_channels.get_by_channel_id_mut(channel_id) else {
                warn!(channel_id, "Data on an unknown static channel dropped");
                return Ok(Vec::new());
            };

            let responses = match channel.process(&complete) {
                Ok(responses) => responses,
                Err(e) => {
                    // Handler failures never terminate the session.
                    error!(channel_id, error = %e.report(), "Static channel handler failed");
                    return Ok(Vec::new());
                }
            };

            if responses.is_empty() {
                return Ok(Vec::new());
            }

            let frame = self.encode_svc_messages(channel_id, &responses)?;
            Ok(vec![ProcessorOutput::ResponseFrame(frame)])
        }
    }

    fn process_io_channel(&mut self, ctx: SendDataIndicationCtx<'_>) -> SessionResult<Vec<ProcessorOutput>> {
        let share_ctx = envelopes::decode_share_control(ctx).map_err(SessionError::connector)?;

        match share_ctx.pdu {
            ShareControlPdu::ServerDeactivateAll(_) => {
                // Deactivation-reactivation is not implemented; treat it as a
                // server-initiated end of session.
                debug!("Server Deactivate All received, ending session");
                Ok(vec![ProcessorOutput::Disconnect(DisconnectReason::ProviderInitiated)])
            }
            ShareControlPdu::Data(header) => self.process_share_data(header.share_data_pdu),
            unexpected => Err(session_reason_err!(
                "IO channel",
                "unexpected share control PDU: {}",
                unexpected.as_short_name()
            )),
        }
    }

    fn process_share_data(&mut self, pdu: ShareDataPdu) -> SessionResult<Vec<ProcessorOutput>> {
        match pdu {
            ShareDataPdu::SaveSessionInfo(_) => {
                debug!("Save Session Info PDU received");
                Ok(Vec::new())
            }
            ShareDataPdu::ServerSetErrorInfo(ServerSetErrorInfoPdu(ErrorInfo::ProtocolIndependentCode(
                ProtocolIndependentCode::None,
            ))) => {
                debug!("Server error info: none");
                Ok(Vec::new())
            }
            ShareDataPdu::ServerSetErrorInfo(ServerSetErrorInfoPdu(error_info)) => {
                if let Some(reason) = error_info_to_graceful_disconnect_reason(&error_info) {
                    debug!(%reason, "Server-side graceful disconnect");
                    Ok(vec![ProcessorOutput::Disconnect(reason)])
                } else {
                    Err(session_reason_err!("ServerSetErrorInfo", "{}", error_info.description()))
                }
            }
            ShareDataPdu::ShutdownDenied => {
                debug!("Shutdown denied; sending disconnect ultimatum");

                let ultimatum = McsMessage::DisconnectProviderUltimatum(DisconnectProviderUltimatum::from_reason(
                    DisconnectReason::UserRequested,
                ));

                let encoded = encode_vec(&X224(ultimatum)).map_err(SessionError::encode)?;

                Ok(vec![
                    ProcessorOutput::ResponseFrame(encoded),
                    ProcessorOutput::Disconnect(DisconnectReason::UserRequested),
                ])
            }
            other => {
                debug!(pdu = other.as_short_name(), "Unhandled IO channel PDU ignored");
                Ok(Vec::new())
            }
        }
    }

    /// Encodes application data for the named dynamic channel, whole frame.
    pub fn encode_dynamic(&mut self, output: &mut WriteBuf, channel_name: &str, data: &[u8]) -> SessionResult<()> {
        let drdynvc_channel_id = self
            .drdynvc_channel_id
            .ok_or_else(|| session_general_err!("the drdynvc static channel is not connected"))?;

        let drdynvc = self
            .static_channels
            .get_by_type_mut::<DrdynvcClient>()
            .and_then(|channel| channel.as_any_mut().downcast_mut::<DrdynvcClient>())
            .ok_or_else(|| session_general_err!("the drdynvc static channel is not attached"))?;

        let messages = drdynvc
            .encode_data_by_name(channel_name, data)
            .ok_or_else(|| session_reason_err!("DVC", "no open dynamic channel named {channel_name}"))?;

        let frame = self.encode_svc_messages(drdynvc_channel_id, &messages)?;
        output.write_slice(&frame);

        Ok(())
    }

    /// Encodes a share data PDU for the IO channel, whole frame.
    pub fn encode_static(&self, output: &mut WriteBuf, pdu: ShareDataPdu) -> SessionResult<usize> {
        envelopes::encode_share_data(self.user_channel_id, self.io_channel_id, self.share_id, pdu, output)
            .map_err(SessionError::connector)
    }

    /// Chunks SVC messages and wraps each chunk in its MCS envelope.
    fn encode_svc_messages(&self, channel_id: u16, messages: &[SvcMessage]) -> SessionResult<Vec<u8>> {
        let mut buf = WriteBuf::new();

        for message in messages {
            for chunk in chunkify(message).map_err(SessionError::encode)? {
                envelopes::encode_send_data_request_raw(self.user_channel_id, channel_id, &chunk, &mut buf)
                    .map_err(SessionError::connector)?;
            }
        }

        Ok(buf.into_inner())
    }
}

/// Maps an error info code to a graceful disconnect reason, when it is one.
pub fn error_info_to_graceful_disconnect_reason(error_info: &ErrorInfo) -> Option<DisconnectReason> {
    let ErrorInfo::ProtocolIndependentCode(code) = error_info else {
        return None;
    };

    match code {
        ProtocolIndependentCode::RpcInitiatedDisconnect
        | ProtocolIndependentCode::RpcInitiatedLogoff
        | ProtocolIndependentCode::DisconnectedByOtherConnection => Some(DisconnectReason::ProviderInitiated),
        ProtocolIndependentCode::RpcInitiatedDisconnectByUser | ProtocolIndependentCode::LogoffByUser => {
            Some(DisconnectReason::UserRequested)
        }
        _ => None,
    }
}
