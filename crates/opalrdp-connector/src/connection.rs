//! The client connection sequence, phase by phase.
//!
//! [`ClientConnector`] owns the overall state; each phase lives in its own
//! method and either produces bytes for the transport, consumes a frame the
//! caller read, or both. TLS upgrade and CredSSP are holes the caller fills:
//! the connector parks in a dedicated state until told they are done.

use core::mem;

use opalrdp_core::{encode_buf, WriteBuf};
use opalrdp_pdu::x224::X224;
use opalrdp_pdu::{gcc, mcs, nego, rdp, PduHint};
use opalrdp_svc::StaticChannelSet;

use crate::channel_connection::{ChannelConnectionSequence, ChannelConnectionState};
use crate::connection_activation::{ConnectionActivationSequence, ConnectionActivationState};
use crate::envelopes;
use crate::license_exchange::LicenseExchangeSequence;
use crate::{
    Config, ConnectorError, ConnectorErrorExt as _, ConnectorErrorKind, ConnectorResult, DesktopSize, Sequence, State,
    Written,
};

/// Everything the active stage needs once the connection sequence completes.
#[derive(Debug)]
pub struct ConnectionResult {
    pub io_channel_id: u16,
    pub user_channel_id: u16,
    pub share_id: u32,
    pub static_channels: StaticChannelSet,
    pub desktop_size: DesktopSize,
}

#[derive(Default, Debug)]
#[non_exhaustive]
pub enum ClientConnectorState {
    #[default]
    Consumed,

    ConnectionInitiationSendRequest,
    ConnectionInitiationWaitConfirm {
        requested_protocol: nego::SecurityProtocol,
    },
    /// Parked: the caller upgrades the transport to TLS, then calls
    /// [`ClientConnector::mark_security_upgrade_as_done`].
    EnhancedSecurityUpgrade {
        selected_protocol: nego::SecurityProtocol,
    },
    /// Parked: the caller runs CredSSP over the TLS stream (HYBRID only),
    /// then calls [`ClientConnector::mark_credssp_as_done`].
    Credssp {
        selected_protocol: nego::SecurityProtocol,
    },
    BasicSettingsExchangeSendInitial {
        selected_protocol: nego::SecurityProtocol,
    },
    BasicSettingsExchangeWaitResponse,
    ChannelConnection {
        io_channel_id: u16,
        channel_connection: ChannelConnectionSequence,
    },
    SecureSettingsExchange {
        io_channel_id: u16,
        user_channel_id: u16,
    },
    LicensingExchange {
        io_channel_id: u16,
        user_channel_id: u16,
        license_exchange: LicenseExchangeSequence,
    },
    CapabilitiesExchange {
        connection_activation: ConnectionActivationSequence,
    },
    ConnectionFinalization {
        connection_activation: ConnectionActivationSequence,
    },
    Connected {
        result: ConnectionResult,
    },
}

impl State for ClientConnectorState {
    fn name(&self) -> &'static str {
        match self {
            Self::Consumed => "Consumed",
            Self::ConnectionInitiationSendRequest => "ConnectionInitiationSendRequest",
            Self::ConnectionInitiationWaitConfirm { .. } => "ConnectionInitiationWaitConfirm",
            Self::EnhancedSecurityUpgrade { .. } => "EnhancedSecurityUpgrade",
            Self::Credssp { .. } => "Credssp",
            Self::BasicSettingsExchangeSendInitial { .. } => "BasicSettingsExchangeSendInitial",
            Self::BasicSettingsExchangeWaitResponse { .. } => "BasicSettingsExchangeWaitResponse",
            Self::ChannelConnection { .. } => "ChannelConnection",
            Self::SecureSettingsExchange { .. } => "SecureSettingsExchange",
            Self::LicensingExchange { .. } => "LicensingExchange",
            Self::CapabilitiesExchange { .. } => "CapabilitiesExchange",
            Self::ConnectionFinalization { .. } => "ConnectionFinalization",
            Self::Connected { .. } => "Connected",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    fn as_any(&self) -> &dyn core::any::Any {
        self
    }
}

/// The transition every phase method produces.
type Transition = ConnectorResult<(Written, ClientConnectorState)>;

#[derive(Debug)]
pub struct ClientConnector {
    pub config: Config,
    pub state: ClientConnectorState,
    pub static_channels: StaticChannelSet,
}

impl ClientConnector {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: ClientConnectorState::ConnectionInitiationSendRequest,
            static_channels: StaticChannelSet::new(),
        }
    }

    #[must_use]
    pub fn with_static_channel<T>(mut self, channel: T) -> Self
    where
        T: opalrdp_svc::StaticVirtualChannel + 'static,
    {
        self.static_channels.insert(channel);
        self
    }

    pub fn attach_static_channel<T>(&mut self, channel: T)
    where
        T: opalrdp_svc::StaticVirtualChannel + 'static,
    {
        self.static_channels.insert(channel);
    }

    pub fn should_perform_security_upgrade(&self) -> bool {
        matches!(self.state, ClientConnectorState::EnhancedSecurityUpgrade { .. })
    }

    /// # Panics
    ///
    /// Panics when called outside the [`ClientConnectorState::EnhancedSecurityUpgrade`] state.
    pub fn mark_security_upgrade_as_done(&mut self) {
        assert!(self.should_perform_security_upgrade());
        self.step(&[], &mut WriteBuf::new()).expect("transition to next state");
        debug_assert!(!self.should_perform_security_upgrade());
    }

    pub fn should_perform_credssp(&self) -> bool {
        matches!(self.state, ClientConnectorState::Credssp { .. })
    }

    /// # Panics
    ///
    /// Panics when called outside the [`ClientConnectorState::Credssp`] state.
    pub fn mark_credssp_as_done(&mut self) {
        assert!(self.should_perform_credssp());
        let written = self.step(&[], &mut WriteBuf::new()).expect("transition to next state");
        debug_assert!(!self.should_perform_credssp());
        debug_assert!(written.is_nothing());
    }

    //== Phase 1: Connection Initiation ==//

    /// Offers the security protocols the configuration allows.
    fn send_connection_request(&self, output: &mut WriteBuf) -> Transition {
        debug!("Connection Initiation");

        let mut offered = nego::SecurityProtocol::empty();

        if self.config.enable_tls {
            offered |= nego::SecurityProtocol::SSL;
        }
        if self.config.enable_credssp {
            offered |= nego::SecurityProtocol::HYBRID;
        }

        if offered.is_standard_rdp_security() {
            return Err(reason_err!("Initiation", "standard RDP security is not supported"));
        }

        let request = nego::ConnectionRequest {
            cookie: Some(nego::Cookie(self.config.credentials.username.clone())),
            flags: nego::RequestFlags::empty(),
            protocol: offered,
        };

        debug!(message = ?request, "Send");

        let written = encode_buf(&X224(request), output).map_err(ConnectorError::encode)?;

        Ok((
            Written::from_size(written)?,
            ClientConnectorState::ConnectionInitiationWaitConfirm {
                requested_protocol: offered,
            },
        ))
    }

    /// Checks the server's pick against what was offered; anything else is a
    /// downgrade and fails without retry.
    fn handle_connection_confirm(&self, requested: nego::SecurityProtocol, input: &[u8]) -> Transition {
        let confirm = opalrdp_core::decode::<X224<nego::ConnectionConfirm>>(input)
            .map_err(ConnectorError::decode)?
            .0;

        debug!(message = ?confirm, "Received");

        let selected = match confirm {
            nego::ConnectionConfirm::Response { flags, protocol } => {
                info!(?protocol, ?flags, "Server confirmed connection");
                protocol
            }
            nego::ConnectionConfirm::Failure { code } => {
                error!(?code, "Connection failure");
                return Err(ConnectorError::new(
                    "negotiation failure",
                    ConnectorErrorKind::Negotiation(code),
                ));
            }
        };

        if !selected.intersects(requested) {
            return Err(reason_err!(
                "Initiation",
                "offered {requested} but the server selected {selected}",
            ));
        }

        Ok((
            Written::Nothing,
            ClientConnectorState::EnhancedSecurityUpgrade {
                selected_protocol: selected,
            },
        ))
    }

    //== Phase 2: Basic Settings Exchange ==//

    fn send_connect_initial(&self, selected_protocol: nego::SecurityProtocol, output: &mut WriteBuf) -> Transition {
        debug!("Basic Settings Exchange");

        let gcc_blocks = build_gcc_blocks(&self.config, selected_protocol, &self.static_channels)?;
        let connect_initial = mcs::ConnectInitial::with_gcc_blocks(gcc_blocks);

        debug!(message = ?connect_initial, "Send");

        let written = envelopes::encode_x224_packet(&connect_initial, output)?;

        Ok((
            Written::from_size(written)?,
            ClientConnectorState::BasicSettingsExchangeWaitResponse,
        ))
    }

    /// Records the channel ids the server assigned; they are immutable for
    /// the rest of the session.
    fn handle_connect_response(&mut self, input: &[u8]) -> Transition {
        let connect_response: mcs::ConnectResponse = envelopes::decode_x224_packet(input)?;

        debug!(message = ?connect_response, "Received");

        let network = connect_response.conference_create_response.gcc_blocks.network;
        let io_channel_id = network.io_channel;
        let assigned_ids = network.channel_ids;

        debug!(?assigned_ids, io_channel_id);

        let advertised: Vec<_> = self.static_channels.type_ids().collect();
        for (type_id, channel_id) in advertised.into_iter().zip(assigned_ids.iter().copied()) {
            self.static_channels.attach_channel_id(type_id, channel_id);
        }

        Ok((
            Written::Nothing,
            ClientConnectorState::ChannelConnection {
                io_channel_id,
                channel_connection: ChannelConnectionSequence::new(io_channel_id, assigned_ids),
            },
        ))
    }

    //== Phase 3: Channel Connection (sub-sequence) ==//

    fn drive_channel_connection(
        &mut self,
        io_channel_id: u16,
        mut channel_connection: ChannelConnectionSequence,
        input: &[u8],
        output: &mut WriteBuf,
    ) -> Transition {
        debug!("Channel Connection");

        let written = channel_connection.step(input, output)?;

        let next_state = match channel_connection.state {
            ChannelConnectionState::AllJoined { user_channel_id } => ClientConnectorState::SecureSettingsExchange {
                io_channel_id,
                user_channel_id,
            },
            _ => ClientConnectorState::ChannelConnection {
                io_channel_id,
                channel_connection,
            },
        };

        Ok((written, next_state))
    }

    //== Phase 4: Secure Settings Exchange ==//

    /// Client Info PDU, then the monitor layout when one is configured.
    fn send_secure_settings(&self, io_channel_id: u16, user_channel_id: u16, output: &mut WriteBuf) -> Transition {
        debug!("Secure Settings Exchange");

        let client_info = build_client_info(&self.config);

        debug!("Send Client Info PDU");

        let mut written = envelopes::encode_send_data_request(user_channel_id, io_channel_id, &client_info, output)?;

        if !self.config.monitors.is_empty() {
            debug!("Send Monitor Layout PDU");

            written += envelopes::encode_share_data(
                user_channel_id,
                io_channel_id,
                0,
                rdp::headers::ShareDataPdu::MonitorLayout(rdp::finalization::MonitorLayoutPdu {
                    monitors: self.config.monitors.clone(),
                }),
                output,
            )?;
        }

        Ok((
            Written::from_size(written)?,
            ClientConnectorState::LicensingExchange {
                io_channel_id,
                user_channel_id,
                license_exchange: LicenseExchangeSequence::new(io_channel_id),
            },
        ))
    }

    //== Phase 5: Licensing (sub-sequence) ==//

    fn drive_licensing(
        &mut self,
        io_channel_id: u16,
        user_channel_id: u16,
        mut license_exchange: LicenseExchangeSequence,
        input: &[u8],
        output: &mut WriteBuf,
    ) -> Transition {
        debug!("Licensing Exchange");

        let written = license_exchange.step(input, output)?;

        let next_state = if license_exchange.state.is_terminal() {
            ClientConnectorState::CapabilitiesExchange {
                connection_activation: ConnectionActivationSequence::new(
                    self.config.clone(),
                    io_channel_id,
                    user_channel_id,
                ),
            }
        } else {
            ClientConnectorState::LicensingExchange {
                io_channel_id,
                user_channel_id,
                license_exchange,
            }
        };

        Ok((written, next_state))
    }

    //== Phases 6-7: Capabilities + Finalization (sub-sequence) ==//

    fn drive_activation(
        &mut self,
        mut connection_activation: ConnectionActivationSequence,
        input: &[u8],
        output: &mut WriteBuf,
    ) -> Transition {
        let written = connection_activation.step(input, output)?;

        let next_state = match connection_activation.state {
            ConnectionActivationState::ConnectionFinalization { .. } => {
                ClientConnectorState::ConnectionFinalization { connection_activation }
            }
            ConnectionActivationState::Finalized {
                io_channel_id,
                user_channel_id,
                share_id,
                desktop_size,
            } => ClientConnectorState::Connected {
                result: ConnectionResult {
                    io_channel_id,
                    user_channel_id,
                    share_id,
                    static_channels: mem::take(&mut self.static_channels),
                    desktop_size,
                },
            },
            _ => return Err(general_err!("activation reached an impossible state (this is a bug)")),
        };

        Ok((written, next_state))
    }
}

impl Sequence for ClientConnector {
    fn next_pdu_hint(&self) -> Option<&dyn PduHint> {
        match &self.state {
            ClientConnectorState::ConnectionInitiationWaitConfirm { .. }
            | ClientConnectorState::BasicSettingsExchangeWaitResponse { .. } => Some(&opalrdp_pdu::X224_HINT),
            ClientConnectorState::ChannelConnection { channel_connection, .. } => channel_connection.next_pdu_hint(),
            ClientConnectorState::LicensingExchange { license_exchange, .. } => license_exchange.next_pdu_hint(),
            ClientConnectorState::CapabilitiesExchange { connection_activation }
            | ClientConnectorState::ConnectionFinalization { connection_activation } => {
                connection_activation.next_pdu_hint()
            }
            _ => None,
        }
    }

    fn state(&self) -> &dyn State {
        &self.state
    }

    fn step(&mut self, input: &[u8], output: &mut WriteBuf) -> ConnectorResult<Written> {
        let (written, next_state) = match mem::take(&mut self.state) {
            ClientConnectorState::Consumed => {
                return Err(general_err!("connector state is consumed (this is a bug)"))
            }

            ClientConnectorState::ConnectionInitiationSendRequest => self.send_connection_request(output)?,
            ClientConnectorState::ConnectionInitiationWaitConfirm { requested_protocol } => {
                self.handle_connection_confirm(requested_protocol, input)?
            }

            // The two parked states advance as soon as the caller reports the
            // out-of-band work finished.
            ClientConnectorState::EnhancedSecurityUpgrade { selected_protocol } => {
                let next_state = if selected_protocol.intersects(nego::SecurityProtocol::HYBRID) {
                    debug!("Begin NLA using CredSSP");
                    ClientConnectorState::Credssp { selected_protocol }
                } else {
                    debug!("CredSSP not selected, skipping NLA");
                    ClientConnectorState::BasicSettingsExchangeSendInitial { selected_protocol }
                };

                (Written::Nothing, next_state)
            }
            ClientConnectorState::Credssp { selected_protocol } => (
                Written::Nothing,
                ClientConnectorState::BasicSettingsExchangeSendInitial { selected_protocol },
            ),

            ClientConnectorState::BasicSettingsExchangeSendInitial { selected_protocol } => {
                self.send_connect_initial(selected_protocol, output)?
            }
            ClientConnectorState::BasicSettingsExchangeWaitResponse => self.handle_connect_response(input)?,

            ClientConnectorState::ChannelConnection {
                io_channel_id,
                channel_connection,
            } => self.drive_channel_connection(io_channel_id, channel_connection, input, output)?,

            ClientConnectorState::SecureSettingsExchange {
                io_channel_id,
                user_channel_id,
            } => self.send_secure_settings(io_channel_id, user_channel_id, output)?,

            ClientConnectorState::LicensingExchange {
                io_channel_id,
                user_channel_id,
                license_exchange,
            } => self.drive_licensing(io_channel_id, user_channel_id, license_exchange, input, output)?,

            ClientConnectorState::CapabilitiesExchange { connection_activation }
            | ClientConnectorState::ConnectionFinalization { connection_activation } => {
                self.drive_activation(connection_activation, input, output)?
            }

            ClientConnectorState::Connected { .. } => return Err(general_err!("already connected")),
        };

        self.state = next_state;

        Ok(written)
    }
}

/// Assembles the GCC conference blocks from the configuration.
fn build_gcc_blocks(
    config: &Config,
    selected_protocol: nego::SecurityProtocol,
    static_channels: &StaticChannelSet,
) -> ConnectorResult<gcc::ClientGccBlocks> {
    use opalrdp_pdu::gcc::{
        ClientColorDepth, ClientCoreData, ClientCoreOptionalData, ClientEarlyCapabilityFlags, ClientMonitorData,
        ClientMonitorExtendedData, ClientNetworkData, ClientSecurityData, HighColorDepth, KeyboardType, MonitorFlags,
        RdpVersion, SecureAccessSequence, SupportedColorDepths,
    };

    let (high_color_depth, supported_color_depths) = match config.color_depth {
        8 => (HighColorDepth::Bpp8, SupportedColorDepths::empty()),
        15 => (HighColorDepth::Bpp15, SupportedColorDepths::BPP15),
        16 => (HighColorDepth::Bpp16, SupportedColorDepths::BPP16),
        24 => (HighColorDepth::Bpp24, SupportedColorDepths::BPP24),
        32 => (
            HighColorDepth::Bpp24,
            SupportedColorDepths::BPP32 | SupportedColorDepths::BPP24 | SupportedColorDepths::BPP16,
        ),
        depth => return Err(reason_err!("GCC", "unsupported color depth: {depth}")),
    };

    if !config.monitors.is_empty() {
        let primary_count = config
            .monitors
            .iter()
            .filter(|monitor| monitor.flags.contains(MonitorFlags::PRIMARY))
            .count();

        if primary_count != 1 {
            return Err(reason_err!(
                "GCC",
                "monitor layout needs exactly one primary monitor, got {primary_count}"
            ));
        }
    }

    let mut early_capability_flags = ClientEarlyCapabilityFlags::VALID_CONNECTION_TYPE
        | ClientEarlyCapabilityFlags::SUPPORT_ERR_INFO_PDU
        | ClientEarlyCapabilityFlags::STRONG_ASYMMETRIC_KEYS;

    if config.color_depth == 32 {
        early_capability_flags |= ClientEarlyCapabilityFlags::WANT_32_BPP_SESSION;
    }
    if !config.monitors.is_empty() {
        early_capability_flags |= ClientEarlyCapabilityFlags::SUPPORT_MONITOR_LAYOUT_PDU;
    }

    let channels: Vec<_> = static_channels.values().map(opalrdp_svc::make_channel_definition).collect();

    let core = ClientCoreData {
        version: RdpVersion::V5_PLUS,
        desktop_width: config.desktop_size.width,
        desktop_height: config.desktop_size.height,
        // Superseded by the optional high color depth below.
        color_depth: ClientColorDepth::Bpp8,
        sec_access_sequence: SecureAccessSequence::Del,
        keyboard_layout: config.keyboard_layout,
        client_build: config.client_build,
        client_name: config.client_name.chars().take(15).collect(),
        keyboard_type: KeyboardType::IbmEnhanced,
        keyboard_subtype: config.keyboard_subtype,
        keyboard_functional_keys_count: config.keyboard_functional_keys_count,
        ime_file_name: config.ime_file_name.clone(),
        optional_data: ClientCoreOptionalData {
            post_beta2_color_depth: Some(ClientColorDepth::Bpp8),
            client_product_id: Some(1),
            serial_number: Some(0),
            high_color_depth: Some(high_color_depth),
            supported_color_depths: Some(supported_color_depths),
            early_capability_flags: Some(early_capability_flags),
            dig_product_id: Some(config.dig_product_id.clone()),
            connection_type: Some(gcc::ConnectionType::Lan),
            server_selected_protocol: Some(selected_protocol),
            ..ClientCoreOptionalData::default()
        },
    };

    Ok(gcc::ClientGccBlocks {
        core,
        security: ClientSecurityData::no_security(),
        network: (!channels.is_empty()).then_some(ClientNetworkData { channels }),
        monitor: (!config.monitors.is_empty()).then(|| ClientMonitorData {
            monitors: config.monitors.clone(),
        }),
        monitor_extended: (!config.monitors.is_empty()).then(|| ClientMonitorExtendedData {
            monitors: config.monitors.clone(),
        }),
        multi_transport: None,
    })
}

/// Assembles the Client Info PDU from the configuration.
fn build_client_info(config: &Config) -> rdp::ClientInfoPdu {
    use opalrdp_pdu::rdp::client_info::{
        AddressFamily, ClientInfo, ClientInfoFlags, Credentials, ExtendedClientInfo, TimezoneInfo,
    };

    let mut flags = ClientInfoFlags::MOUSE
        | ClientInfoFlags::MOUSE_HAS_WHEEL
        | ClientInfoFlags::UNICODE
        | ClientInfoFlags::DISABLE_CTRL_ALT_DEL
        | ClientInfoFlags::LOGON_NOTIFY
        | ClientInfoFlags::LOGON_ERRORS
        | ClientInfoFlags::ENABLE_WINDOWS_KEY
        | ClientInfoFlags::MAXIMIZE_SHELL;

    if config.autologon {
        flags |= ClientInfoFlags::AUTOLOGON;
    }
    if config.compression {
        flags |= ClientInfoFlags::COMPRESSION;
    }

    let address_family = if config.client_address.contains(':') {
        AddressFamily::INet6
    } else {
        AddressFamily::INet
    };

    rdp::ClientInfoPdu::new(ClientInfo {
        credentials: Credentials {
            username: config.credentials.username.clone(),
            password: config.credentials.password.clone(),
            domain: config.credentials.domain.clone(),
        },
        code_page: 0, // superseded by the core data keyboard layout
        flags,
        alternate_shell: String::new(),
        work_dir: String::new(),
        extra_info: ExtendedClientInfo {
            address_family,
            address: config.client_address.clone(),
            dir: config.client_dir.clone(),
            timezone: TimezoneInfo::default(),
            session_id: 0,
            performance_flags: config.performance_flags,
        },
    })
}

#[cfg(test)]
mod tests {
    use opalrdp_core::encode_vec;

    use super::*;
    use crate::Credentials;

    fn connector() -> ClientConnector {
        ClientConnector::new(Config::new(Credentials {
            username: "alice".to_owned(),
            password: "hunter2".to_owned(),
            domain: None,
        }))
    }

    fn confirm_frame(protocol: nego::SecurityProtocol) -> Vec<u8> {
        encode_vec(&X224(nego::ConnectionConfirm::Response {
            flags: nego::ResponseFlags::empty(),
            protocol,
        }))
        .unwrap()
    }

    #[test]
    fn first_step_sends_connection_request() {
        let mut connector = connector();
        let mut buf = WriteBuf::new();

        assert!(connector.next_pdu_hint().is_none());

        let written = connector.step_no_input(&mut buf).unwrap();
        assert!(written.size().is_some());

        // TPKT version byte leads the first frame.
        assert_eq!(buf.filled()[0], 0x03);
        assert_eq!(connector.state.name(), "ConnectionInitiationWaitConfirm");
    }

    #[test]
    fn negotiation_failure_is_terminal() {
        let mut connector = connector();
        let mut buf = WriteBuf::new();
        connector.step_no_input(&mut buf).unwrap();

        let failure = encode_vec(&X224(nego::ConnectionConfirm::Failure {
            code: nego::FailureCode::SSL_REQUIRED_BY_SERVER,
        }))
        .unwrap();

        buf.clear();
        let error = connector.step(&failure, &mut buf).unwrap_err();
        assert!(matches!(error.kind(), ConnectorErrorKind::Negotiation(_)));
    }

    #[test]
    fn protocol_downgrade_is_rejected() {
        let mut connector = connector();
        connector.config.enable_tls = false; // offer HYBRID only
        let mut buf = WriteBuf::new();
        connector.step_no_input(&mut buf).unwrap();

        buf.clear();
        assert!(connector
            .step(&confirm_frame(nego::SecurityProtocol::SSL), &mut buf)
            .is_err());
    }

    #[test]
    fn hybrid_selection_parks_for_credssp() {
        let mut connector = connector();
        let mut buf = WriteBuf::new();
        connector.step_no_input(&mut buf).unwrap();

        buf.clear();
        connector
            .step(&confirm_frame(nego::SecurityProtocol::HYBRID), &mut buf)
            .unwrap();
        assert!(connector.should_perform_security_upgrade());

        connector.mark_security_upgrade_as_done();
        assert!(connector.should_perform_credssp());

        connector.mark_credssp_as_done();
        assert_eq!(connector.state.name(), "BasicSettingsExchangeSendInitial");
    }

    #[test]
    fn ssl_selection_skips_credssp() {
        let mut connector = connector();
        let mut buf = WriteBuf::new();
        connector.step_no_input(&mut buf).unwrap();

        buf.clear();
        connector
            .step(&confirm_frame(nego::SecurityProtocol::SSL), &mut buf)
            .unwrap();

        connector.mark_security_upgrade_as_done();
        assert!(!connector.should_perform_credssp());
        assert_eq!(connector.state.name(), "BasicSettingsExchangeSendInitial");
    }
}
