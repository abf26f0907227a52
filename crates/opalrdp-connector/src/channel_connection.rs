//! MCS channel connection: Erect Domain, Attach User, then one Channel Join
//! round per channel.

use std::collections::HashSet;
use std::mem;

use opalrdp_core::{encode_buf, WriteBuf};
use opalrdp_pdu::x224::X224;
use opalrdp_pdu::{mcs, PduHint};

use crate::{ConnectorError, ConnectorErrorExt as _, ConnectorResult, Sequence, State, Written};

#[derive(Default, Debug)]
#[non_exhaustive]
pub enum ChannelConnectionState {
    #[default]
    Consumed,

    SendErectDomainRequest,
    SendAttachUserRequest,
    WaitAttachUserConfirm,
    SendChannelJoinRequest {
        user_channel_id: u16,
        join_channel_ids: HashSet<u16>,
    },
    WaitChannelJoinConfirm {
        user_channel_id: u16,
        remaining_channel_ids: HashSet<u16>,
    },
    AllJoined {
        user_channel_id: u16,
    },
}

impl State for ChannelConnectionState {
    fn name(&self) -> &'static str {
        match self {
            Self::Consumed => "Consumed",
            Self::SendErectDomainRequest => "SendErectDomainRequest",
            Self::SendAttachUserRequest => "SendAttachUserRequest",
            Self::WaitAttachUserConfirm => "WaitAttachUserConfirm",
            Self::SendChannelJoinRequest { .. } => "SendChannelJoinRequest",
            Self::WaitChannelJoinConfirm { .. } => "WaitChannelJoinConfirm",
            Self::AllJoined { .. } => "AllJoined",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::AllJoined { .. })
    }

    fn as_any(&self) -> &dyn core::any::Any {
        self
    }
}

#[derive(Debug)]
pub struct ChannelConnectionSequence {
    pub state: ChannelConnectionState,
    channel_ids: HashSet<u16>,
}

impl ChannelConnectionSequence {
    pub fn new(io_channel_id: u16, channel_ids: Vec<u16>) -> Self {
        let mut channel_ids: HashSet<u16> = channel_ids.into_iter().collect();

        // The I/O channel is joined like any other.
        channel_ids.insert(io_channel_id);

        Self {
            state: ChannelConnectionState::SendErectDomainRequest,
            channel_ids,
        }
    }
}

impl Sequence for ChannelConnectionSequence {
    fn next_pdu_hint(&self) -> Option<&dyn PduHint> {
        match self.state {
            ChannelConnectionState::Consumed => None,
            ChannelConnectionState::SendErectDomainRequest => None,
            ChannelConnectionState::SendAttachUserRequest => None,
            ChannelConnectionState::WaitAttachUserConfirm => Some(&opalrdp_pdu::X224_HINT),
            ChannelConnectionState::SendChannelJoinRequest { .. } => None,
            ChannelConnectionState::WaitChannelJoinConfirm { .. } => Some(&opalrdp_pdu::X224_HINT),
            ChannelConnectionState::AllJoined { .. } => None,
        }
    }

    fn state(&self) -> &dyn State {
        &self.state
    }

    fn step(&mut self, input: &[u8], output: &mut WriteBuf) -> ConnectorResult<Written> {
        let (written, next_state) = match mem::take(&mut self.state) {
            ChannelConnectionState::Consumed => {
                return Err(general_err!("channel connection sequence state is consumed (this is a bug)"))
            }

            ChannelConnectionState::SendErectDomainRequest => {
                let erect_domain_request = mcs::ErectDomainPdu {
                    sub_height: 0,
                    sub_interval: 0,
                };

                debug!(message = ?erect_domain_request, "Send");

                let written = encode_buf(&X224(erect_domain_request), output).map_err(ConnectorError::encode)?;

                (
                    Written::from_size(written)?,
                    ChannelConnectionState::SendAttachUserRequest,
                )
            }

            ChannelConnectionState::SendAttachUserRequest => {
                let attach_user_request = mcs::AttachUserRequest;

                debug!(message = ?attach_user_request, "Send");

                let written = encode_buf(&X224(attach_user_request), output).map_err(ConnectorError::encode)?;

                (
                    Written::from_size(written)?,
                    ChannelConnectionState::WaitAttachUserConfirm,
                )
            }

            ChannelConnectionState::WaitAttachUserConfirm => {
                let attach_user_confirm = opalrdp_core::decode::<X224<mcs::AttachUserConfirm>>(input)
                    .map_err(ConnectorError::decode)?
                    .0;

                let user_channel_id = attach_user_confirm.initiator_id;

                debug!(message = ?attach_user_confirm, user_channel_id, "Received");

                // The user channel is joined as well.
                let mut join_channel_ids = mem::take(&mut self.channel_ids);
                join_channel_ids.insert(user_channel_id);

                (
                    Written::Nothing,
                    ChannelConnectionState::SendChannelJoinRequest {
                        user_channel_id,
                        join_channel_ids,
                    },
                )
            }

            // All join requests go out in a single batch, as modern clients do.
            ChannelConnectionState::SendChannelJoinRequest {
                user_channel_id,
                join_channel_ids,
            } => {
                let mut total_written: usize = 0;

                debug_assert!(!join_channel_ids.is_empty());

                for channel_id in join_channel_ids.iter().copied() {
                    let channel_join_request = mcs::ChannelJoinRequest {
                        initiator_id: user_channel_id,
                        channel_id,
                    };

                    debug!(message = ?channel_join_request, "Send");

                    let written = encode_buf(&X224(channel_join_request), output).map_err(ConnectorError::encode)?;

                    total_written += written;
                }

                (
                    Written::from_size(total_written)?,
                    ChannelConnectionState::WaitChannelJoinConfirm {
                        user_channel_id,
                        remaining_channel_ids: join_channel_ids,
                    },
                )
            }

            ChannelConnectionState::WaitChannelJoinConfirm {
                user_channel_id,
                mut remaining_channel_ids,
            } => {
                let channel_join_confirm = opalrdp_core::decode::<X224<mcs::ChannelJoinConfirm>>(input)
                    .map_err(ConnectorError::decode)?
                    .0;

                debug!(message = ?channel_join_confirm, "Received");

                if channel_join_confirm.initiator_id != user_channel_id {
                    warn!(
                        channel_join_confirm.initiator_id,
                        user_channel_id, "Inconsistent initiator ID in MCS Channel Join Confirm",
                    );
                }

                let is_expected = remaining_channel_ids.remove(&channel_join_confirm.requested_channel_id);

                if !is_expected {
                    return Err(reason_err!(
                        "ChannelJoinConfirm",
                        "unexpected requested channel id: got {}, expected one of {:?}",
                        channel_join_confirm.requested_channel_id,
                        remaining_channel_ids,
                    ));
                }

                // A join confirmed under a different id would invalidate every
                // id the client recorded at Basic Settings Exchange.
                if channel_join_confirm.requested_channel_id != channel_join_confirm.channel_id {
                    return Err(reason_err!(
                        "ChannelJoinConfirm",
                        "channel joined with a different id than requested: requested {}, got {}",
                        channel_join_confirm.requested_channel_id,
                        channel_join_confirm.channel_id,
                    ));
                }

                let next_state = if remaining_channel_ids.is_empty() {
                    ChannelConnectionState::AllJoined { user_channel_id }
                } else {
                    ChannelConnectionState::WaitChannelJoinConfirm {
                        user_channel_id,
                        remaining_channel_ids,
                    }
                };

                (Written::Nothing, next_state)
            }

            ChannelConnectionState::AllJoined { .. } => return Err(general_err!("all channels are already joined")),
        };

        self.state = next_state;

        Ok(written)
    }
}
