//! Capability exchange followed by connection finalization.

use std::mem;

use opalrdp_core::WriteBuf;
use opalrdp_pdu::rdp::capability_sets::{self, CapabilitySet};
use opalrdp_pdu::rdp::headers::ShareControlPdu;

use crate::envelopes;
use crate::{Config, ConnectionFinalizationSequence, ConnectorError, ConnectorErrorKind, ConnectorResult, DesktopSize, Sequence, State, Written};

#[derive(Default, Debug)]
#[non_exhaustive]
pub enum ConnectionActivationState {
    #[default]
    Consumed,

    CapabilitiesExchange {
        io_channel_id: u16,
        user_channel_id: u16,
    },
    ConnectionFinalization {
        io_channel_id: u16,
        user_channel_id: u16,
        share_id: u32,
        desktop_size: DesktopSize,
        connection_finalization: ConnectionFinalizationSequence,
    },
    Finalized {
        io_channel_id: u16,
        user_channel_id: u16,
        share_id: u32,
        desktop_size: DesktopSize,
    },
}

impl State for ConnectionActivationState {
    fn name(&self) -> &'static str {
        match self {
            Self::Consumed => "Consumed",
            Self::CapabilitiesExchange { .. } => "CapabilitiesExchange",
            Self::ConnectionFinalization { .. } => "ConnectionFinalization",
            Self::Finalized { .. } => "Finalized",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized { .. })
    }

    fn as_any(&self) -> &dyn core::any::Any {
        self
    }
}

/// Drives the Demand Active / Confirm Active round and the finalization
/// PDUs that follow it.
#[derive(Debug)]
pub struct ConnectionActivationSequence {
    pub state: ConnectionActivationState,
    config: Config,
}

impl ConnectionActivationSequence {
    pub fn new(config: Config, io_channel_id: u16, user_channel_id: u16) -> Self {
        Self {
            state: ConnectionActivationState::CapabilitiesExchange {
                io_channel_id,
                user_channel_id,
            },
            config,
        }
    }
}

impl Sequence for ConnectionActivationSequence {
    fn next_pdu_hint(&self) -> Option<&dyn opalrdp_pdu::PduHint> {
        match &self.state {
            ConnectionActivationState::Consumed => None,
            ConnectionActivationState::Finalized { .. } => None,
            ConnectionActivationState::CapabilitiesExchange { .. } => Some(&opalrdp_pdu::X224_HINT),
            ConnectionActivationState::ConnectionFinalization {
                connection_finalization,
                ..
            } => connection_finalization.next_pdu_hint(),
        }
    }

    fn state(&self) -> &dyn State {
        &self.state
    }

    fn step(&mut self, input: &[u8], output: &mut WriteBuf) -> ConnectorResult<Written> {
        let (written, next_state) = match mem::take(&mut self.state) {
            ConnectionActivationState::Consumed | ConnectionActivationState::Finalized { .. } => {
                return Err(general_err!("activation sequence state is finalized or consumed (this is a bug)"));
            }

            ConnectionActivationState::CapabilitiesExchange {
                io_channel_id,
                user_channel_id,
            } => {
                debug!("Capabilities Exchange");

                let ctx = envelopes::decode_send_data_indication(input)?;
                let share_control_ctx = envelopes::decode_share_control(ctx)?;

                debug!(message = ?share_control_ctx.pdu, "Received");

                if share_control_ctx.channel_id != io_channel_id {
                    warn!(
                        io_channel_id,
                        share_control_ctx.channel_id, "Unexpected channel ID for received Share Control PDU"
                    );
                }

                let share_id = share_control_ctx.share_id;

                let capability_sets =
                    if let ShareControlPdu::ServerDemandActive(server_demand_active) = share_control_ctx.pdu {
                        server_demand_active.pdu.capability_sets
                    } else {
                        return Err(general_err!("unexpected Share Control PDU (expected Server Demand Active)"));
                    };

                // The server must speak FastPath output and surface commands
                // are negotiated; General is the one set that cannot be absent.
                if !capability_sets
                    .iter()
                    .any(|c| matches!(c, CapabilitySet::General(_)))
                {
                    return Err(ConnectorError::new(
                        "capabilities exchange",
                        ConnectorErrorKind::Capability("General"),
                    ));
                }

                // The server answers with the final desktop size; prefer it
                // over what we requested.
                let desktop_size = capability_sets
                    .iter()
                    .find_map(|c| match c {
                        CapabilitySet::Bitmap(b) => Some(DesktopSize {
                            width: b.desktop_width,
                            height: b.desktop_height,
                        }),
                        _ => None,
                    })
                    .unwrap_or(self.config.desktop_size);

                let client_confirm_active = ShareControlPdu::ClientConfirmActive(create_client_confirm_active(
                    &self.config,
                    share_control_ctx.pdu_source,
                    desktop_size,
                ));

                debug!(message = ?client_confirm_active, share_id, "Send");

                let written = envelopes::encode_share_control(
                    user_channel_id,
                    io_channel_id,
                    share_id,
                    client_confirm_active,
                    output,
                )?;

                (
                    Written::from_size(written)?,
                    ConnectionActivationState::ConnectionFinalization {
                        io_channel_id,
                        user_channel_id,
                        share_id,
                        desktop_size,
                        connection_finalization: ConnectionFinalizationSequence::new(
                            io_channel_id,
                            user_channel_id,
                            share_id,
                        ),
                    },
                )
            }

            ConnectionActivationState::ConnectionFinalization {
                io_channel_id,
                user_channel_id,
                share_id,
                desktop_size,
                mut connection_finalization,
            } => {
                debug!("Connection Finalization");

                let written = connection_finalization.step(input, output)?;

                let next_state = if !connection_finalization.state.is_terminal() {
                    ConnectionActivationState::ConnectionFinalization {
                        io_channel_id,
                        user_channel_id,
                        share_id,
                        desktop_size,
                        connection_finalization,
                    }
                } else {
                    ConnectionActivationState::Finalized {
                        io_channel_id,
                        user_channel_id,
                        share_id,
                        desktop_size,
                    }
                };

                (written, next_state)
            }
        };

        self.state = next_state;

        Ok(written)
    }
}

fn create_client_confirm_active(
    config: &Config,
    originator_id: u16,
    desktop_size: DesktopSize,
) -> capability_sets::ClientConfirmActive {
    use opalrdp_pdu::rdp::capability_sets::{
        Bitmap, BitmapCacheRev2, BitmapDrawingFlags, CmdFlags, DemandActive, General, GeneralExtraFlags, GlyphCache,
        Input, InputFlags, OffscreenBitmapCache, Order, OrderFlags, Pointer, Sound, SoundFlags, SurfaceCommands,
        VirtualChannel, VirtualChannelFlags,
    };

    let capability_sets = vec![
        CapabilitySet::General(General {
            major_platform_type: config.platform,
            extra_flags: GeneralExtraFlags::FASTPATH_OUTPUT_SUPPORTED | GeneralExtraFlags::NO_BITMAP_COMPRESSION_HDR,
            ..General::default()
        }),
        CapabilitySet::Bitmap(Bitmap {
            pref_bits_per_pix: config.color_depth as u16,
            desktop_width: desktop_size.width,
            desktop_height: desktop_size.height,
            desktop_resize_flag: true,
            drawing_flags: BitmapDrawingFlags::ALLOW_SKIP_ALPHA,
        }),
        CapabilitySet::Order(Order::new(
            OrderFlags::NEGOTIATE_ORDER_SUPPORT | OrderFlags::ZERO_BOUNDS_DELTAS_SUPPORT,
        )),
        CapabilitySet::Pointer(Pointer {
            color_pointer_cache_size: 32,
            pointer_cache_size: 32,
        }),
        CapabilitySet::Input(Input {
            input_flags: InputFlags::SCANCODES
                | InputFlags::MOUSEX
                | InputFlags::FASTPATH_INPUT
                | InputFlags::UNICODE
                | InputFlags::FASTPATH_INPUT_2
                | InputFlags::TS_MOUSE_HWHEEL,
            keyboard_layout: config.keyboard_layout,
            keyboard_type: 4, // IBM enhanced
            keyboard_subtype: config.keyboard_subtype,
            keyboard_function_key: config.keyboard_functional_keys_count,
            keyboard_ime_filename: config.ime_file_name.clone(),
        }),
        CapabilitySet::BitmapCacheRev2(BitmapCacheRev2::with_cell_entries(&config.bitmap_cache_entries)),
        CapabilitySet::OffscreenBitmapCache(OffscreenBitmapCache {
            is_supported: true,
            cache_size: 7680,
            cache_entries: 100,
        }),
        CapabilitySet::Sound(Sound {
            flags: SoundFlags::BEEPS,
        }),
        CapabilitySet::GlyphCache(GlyphCache::default()),
        CapabilitySet::VirtualChannel(VirtualChannel {
            flags: VirtualChannelFlags::NO_COMPRESSION,
            chunk_size: Some(0), // ignored for client-to-server
        }),
        CapabilitySet::SurfaceCommands(SurfaceCommands {
            flags: CmdFlags::SET_SURFACE_BITS | CmdFlags::STREAM_SURFACE_BITS | CmdFlags::FRAME_MARKER,
        }),
    ];

    capability_sets::ClientConfirmActive {
        originator_id,
        pdu: DemandActive {
            source_descriptor: "OPALRDP".to_owned(),
            capability_sets,
        },
    }
}
