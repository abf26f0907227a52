//! Scripted happy-path run of the whole connection sequence, checking the
//! state machine, the channel id bookkeeping and the share id.

use opalrdp_connector::{
    ClientConnector, ClientConnectorState, Config, ConnectionResult, Credentials, Sequence as _, State as _,
};
use opalrdp_core::{encode_vec, WriteBuf};
use opalrdp_pdu::rdp::capability_sets::{Bitmap, BitmapDrawingFlags, CapabilitySet, DemandActive, General, ServerDemandActive};
use opalrdp_pdu::rdp::finalization::{ControlAction, ControlPdu, FontPdu, SynchronizePdu};
use opalrdp_pdu::rdp::headers::{
    CompressionFlags, ShareControlHeader, ShareControlPdu, ShareDataHeader, ShareDataPdu, StreamPriority,
};
use opalrdp_pdu::rdp::server_license::{LicenseErrorCode, ServerLicensePdu};
use opalrdp_pdu::{gcc, mcs, nego};
use opalrdp_svc::NoopChannel;
use opalrdp_testsuite::{send_data_indication_frame, x224_frame};

const IO_CHANNEL_ID: u16 = 1003;
const USER_CHANNEL_ID: u16 = 1007;
const SERVER_CHANNEL_ID: u16 = 0x03EA;
const SHARE_ID: u32 = 0x103EA;

fn test_config() -> Config {
    Config::new(Credentials {
        username: "alice".to_owned(),
        password: "hunter2".to_owned(),
        domain: Some("CONTOSO".to_owned()),
    })
}

fn connection_confirm_frame() -> Vec<u8> {
    encode_vec(&opalrdp_pdu::x224::X224(nego::ConnectionConfirm::Response {
        flags: nego::ResponseFlags::empty(),
        protocol: nego::SecurityProtocol::HYBRID,
    }))
    .unwrap()
}

fn connect_response_frame(channel_ids: Vec<u16>) -> Vec<u8> {
    let response = mcs::ConnectResponse {
        conference_create_response: gcc::conference_create::ConferenceCreateResponse {
            user_id: USER_CHANNEL_ID,
            gcc_blocks: gcc::ServerGccBlocks {
                core: gcc::ServerCoreData {
                    version: gcc::RdpVersion::V10,
                    optional_data: gcc::ServerCoreOptionalData::default(),
                },
                network: gcc::ServerNetworkData {
                    io_channel: IO_CHANNEL_ID,
                    channel_ids,
                },
                security: gcc::ServerSecurityData::no_security(),
                multi_transport: None,
            },
        },
        called_connect_id: 0,
        domain_parameters: mcs::DomainParameters::target(),
    };

    x224_frame(&response)
}

fn attach_user_confirm_frame() -> Vec<u8> {
    encode_vec(&opalrdp_pdu::x224::X224(mcs::AttachUserConfirm {
        result: 0,
        initiator_id: USER_CHANNEL_ID,
    }))
    .unwrap()
}

fn channel_join_confirm_frame(channel_id: u16) -> Vec<u8> {
    encode_vec(&opalrdp_pdu::x224::X224(mcs::ChannelJoinConfirm {
        result: 0,
        initiator_id: USER_CHANNEL_ID,
        requested_channel_id: channel_id,
        channel_id,
    }))
    .unwrap()
}

fn license_grant_frame() -> Vec<u8> {
    let license = ServerLicensePdu::ErrorAlert {
        error_code: LicenseErrorCode::STATUS_VALID_CLIENT,
        state_transition: 2,
    };

    send_data_indication_frame(SERVER_CHANNEL_ID, IO_CHANNEL_ID, &encode_vec(&license).unwrap())
}

fn demand_active_frame() -> Vec<u8> {
    let demand_active = ShareControlHeader {
        share_control_pdu: ShareControlPdu::ServerDemandActive(ServerDemandActive {
            pdu: DemandActive {
                source_descriptor: "RDP".to_owned(),
                capability_sets: vec![
                    CapabilitySet::General(General::default()),
                    CapabilitySet::Bitmap(Bitmap {
                        pref_bits_per_pix: 24,
                        desktop_width: 1024,
                        desktop_height: 768,
                        desktop_resize_flag: false,
                        drawing_flags: BitmapDrawingFlags::empty(),
                    }),
                ],
            },
        }),
        pdu_source: SERVER_CHANNEL_ID,
        share_id: SHARE_ID,
    };

    send_data_indication_frame(SERVER_CHANNEL_ID, IO_CHANNEL_ID, &encode_vec(&demand_active).unwrap())
}

fn share_data_frame(pdu: ShareDataPdu) -> Vec<u8> {
    let header = ShareControlHeader {
        share_control_pdu: ShareControlPdu::Data(ShareDataHeader {
            share_data_pdu: pdu,
            stream_priority: StreamPriority::Medium,
            compression_flags: CompressionFlags::empty(),
        }),
        pdu_source: SERVER_CHANNEL_ID,
        share_id: SHARE_ID,
    };

    send_data_indication_frame(SERVER_CHANNEL_ID, IO_CHANNEL_ID, &encode_vec(&header).unwrap())
}

fn finalization_response_frames() -> Vec<Vec<u8>> {
    vec![
        share_data_frame(ShareDataPdu::Synchronize(SynchronizePdu { target_user_id: 0 })),
        share_data_frame(ShareDataPdu::Control(ControlPdu {
            action: ControlAction::Cooperate,
            grant_id: 0,
            control_id: 0,
        })),
        share_data_frame(ShareDataPdu::Control(ControlPdu {
            action: ControlAction::GrantedControl,
            grant_id: USER_CHANNEL_ID,
            control_id: u32::from(SERVER_CHANNEL_ID),
        })),
        share_data_frame(ShareDataPdu::FontMap(FontPdu::default())),
    ]
}

/// Rank of each connector phase; used to check the phase indicator never
/// moves backwards.
fn phase_rank(name: &str) -> usize {
    [
        "ConnectionInitiationSendRequest",
        "ConnectionInitiationWaitConfirm",
        "EnhancedSecurityUpgrade",
        "Credssp",
        "BasicSettingsExchangeSendInitial",
        "BasicSettingsExchangeWaitResponse",
        "ChannelConnection",
        "SecureSettingsExchange",
        "LicensingExchange",
        "CapabilitiesExchange",
        "ConnectionFinalization",
        "Connected",
    ]
    .iter()
    .position(|candidate| *candidate == name)
    .unwrap_or_else(|| panic!("unknown connector state: {name}"))
}

/// Drives `connector` against the scripted server frames until it connects.
fn drive(mut connector: ClientConnector, mut server_frames: std::collections::VecDeque<Vec<u8>>) -> ConnectionResult {
    let mut buf = WriteBuf::new();
    let mut previous_rank = phase_rank(connector.state.name());

    loop {
        if matches!(connector.state, ClientConnectorState::Connected { .. }) {
            break;
        }

        if connector.should_perform_security_upgrade() {
            connector.mark_security_upgrade_as_done();
        } else if connector.should_perform_credssp() {
            connector.mark_credssp_as_done();
        } else {
            buf.clear();

            if let Some(hint) = connector.next_pdu_hint() {
                let frame = server_frames.pop_front().expect("scripted server frame available");

                // The hint must delimit exactly the frame the server sent.
                let hinted = hint.find_size(&frame).unwrap().expect("hint resolves a full frame");
                assert_eq!(hinted, frame.len());

                connector.step(&frame, &mut buf).expect("connector step");
            } else {
                connector.step_no_input(&mut buf).expect("connector step");
            }
        }

        // The phase indicator never moves backwards.
        let rank = phase_rank(connector.state.name());
        assert!(rank >= previous_rank, "connector state moved backwards");
        previous_rank = rank;
    }

    let ClientConnectorState::Connected { result } = connector.state else {
        unreachable!()
    };

    assert!(server_frames.is_empty(), "all scripted frames must be consumed");

    result
}

#[test]
fn handshake_happy_path_reaches_connected() {
    let connector = ClientConnector::new(test_config())
        .with_static_channel(NoopChannel::new(gcc::ChannelName::from_utf8("opaltst").unwrap()));

    let static_channel_ids = vec![1004];

    let mut frames = std::collections::VecDeque::new();
    frames.push_back(connection_confirm_frame());
    frames.push_back(connect_response_frame(static_channel_ids.clone()));
    frames.push_back(attach_user_confirm_frame());
    for channel_id in [IO_CHANNEL_ID, 1004, USER_CHANNEL_ID] {
        frames.push_back(channel_join_confirm_frame(channel_id));
    }
    frames.push_back(license_grant_frame());
    frames.push_back(demand_active_frame());
    frames.extend(finalization_response_frames());

    let result = drive(connector, frames);

    assert_eq!(result.io_channel_id, IO_CHANNEL_ID);
    assert_eq!(result.user_channel_id, USER_CHANNEL_ID);
    assert_eq!(result.share_id, SHARE_ID);

    // The server's bitmap capability wins over the requested size.
    assert_eq!(result.desktop_size.width, 1024);
    assert_eq!(result.desktop_size.height, 768);

    // Channel-id stability: the id recorded at Basic Settings Exchange is
    // the one attached to the channel after all joins.
    assert_eq!(result.static_channels.get_channel_id_by_type::<NoopChannel>(), Some(1004));
}

#[test]
fn missing_license_grant_is_terminal() {
    let connector = ClientConnector::new(test_config());

    let mut frames = std::collections::VecDeque::new();
    frames.push_back(connection_confirm_frame());
    frames.push_back(connect_response_frame(Vec::new()));
    frames.push_back(attach_user_confirm_frame());
    for channel_id in [IO_CHANNEL_ID, USER_CHANNEL_ID] {
        frames.push_back(channel_join_confirm_frame(channel_id));
    }

    // Licensing error instead of a grant.
    let license = ServerLicensePdu::ErrorAlert {
        error_code: LicenseErrorCode::NO_LICENSE_SERVER,
        state_transition: 2,
    };
    frames.push_back(send_data_indication_frame(
        SERVER_CHANNEL_ID,
        IO_CHANNEL_ID,
        &encode_vec(&license).unwrap(),
    ));

    let mut connector = connector;
    let mut buf = WriteBuf::new();
    let mut error = None;

    while error.is_none() {
        if connector.should_perform_security_upgrade() {
            connector.mark_security_upgrade_as_done();
            continue;
        }
        if connector.should_perform_credssp() {
            connector.mark_credssp_as_done();
            continue;
        }

        buf.clear();

        let step = if connector.next_pdu_hint().is_some() {
            let frame = frames.pop_front().expect("scripted frame");
            connector.step(&frame, &mut buf)
        } else {
            connector.step_no_input(&mut buf)
        };

        error = step.err();
    }

    let error = error.unwrap();
    assert!(matches!(
        error.kind(),
        opalrdp_connector::ConnectorErrorKind::Licensing
    ));
}
