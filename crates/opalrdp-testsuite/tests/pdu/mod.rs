//! Wire vectors for the framing layers.

use opalrdp_core::{decode, encode_vec};
use opalrdp_pdu::mcs;
use opalrdp_pdu::x224::X224;

/// The Erect Domain Request frame as seen in captures of real connections.
const ERECT_DOMAIN_FRAME: [u8; 12] = [
    0x03, 0x00, 0x00, 0x0C, // TPKT
    0x02, 0xF0, 0x80, // X.224 Data
    0x04, // ErectDomainRequest CHOICE
    0x01, 0x00, // subHeight = 0
    0x01, 0x00, // subInterval = 0
];

/// The Attach User Request frame.
const ATTACH_USER_FRAME: [u8; 8] = [
    0x03, 0x00, 0x00, 0x08, // TPKT
    0x02, 0xF0, 0x80, // X.224 Data
    0x28, // AttachUserRequest CHOICE
];

#[test]
fn erect_domain_request_matches_reference_frame() {
    let pdu = mcs::ErectDomainPdu {
        sub_height: 0,
        sub_interval: 0,
    };

    let encoded = encode_vec(&X224(pdu.clone())).unwrap();
    assert_eq!(encoded, ERECT_DOMAIN_FRAME);

    let decoded: X224<mcs::ErectDomainPdu> = decode(&encoded).unwrap();
    assert_eq!(decoded.0, pdu);
}

#[test]
fn attach_user_request_matches_reference_frame() {
    let encoded = encode_vec(&X224(mcs::AttachUserRequest)).unwrap();
    assert_eq!(encoded, ATTACH_USER_FRAME);
}

#[test]
fn tpkt_length_always_equals_frame_length() {
    // Several PDUs of different sizes; the TPKT length field must equal the
    // number of emitted bytes each time.
    let frames = [
        encode_vec(&X224(mcs::AttachUserRequest)).unwrap(),
        encode_vec(&X224(mcs::ChannelJoinRequest {
            initiator_id: 1007,
            channel_id: 1003,
        }))
        .unwrap(),
        encode_vec(&X224(mcs::SendDataRequest {
            initiator_id: 1007,
            channel_id: 1003,
            user_data: std::borrow::Cow::Owned(vec![0xAB; 300]),
        }))
        .unwrap(),
    ];

    for frame in &frames {
        let tpkt_length = usize::from(u16::from_be_bytes([frame[2], frame[3]]));
        assert_eq!(tpkt_length, frame.len());
    }
}

#[test]
fn find_size_discriminates_fastpath_and_x224() {
    use opalrdp_pdu::{find_size, Action};

    let x224 = find_size(&ERECT_DOMAIN_FRAME).unwrap().unwrap();
    assert_eq!(x224.action, Action::X224);
    assert_eq!(x224.length, 12);

    // FastPath frame: action bits 00, short length 5.
    let fastpath = find_size(&[0x00, 0x05, 0xAA, 0xBB, 0xCC]).unwrap().unwrap();
    assert_eq!(fastpath.action, Action::FastPath);
    assert_eq!(fastpath.length, 5);

    // Long-form FastPath length.
    let long = find_size(&[0x00, 0x81, 0x00]).unwrap().unwrap();
    assert_eq!(long.length, 0x100);

    // Not enough bytes yet.
    assert!(find_size(&[0x03, 0x00]).unwrap().is_none());
}

#[test]
fn gcc_blocks_survive_connect_initial_round_trip() {
    use opalrdp_pdu::gcc::*;
    use opalrdp_pdu::nego::SecurityProtocol;

    let blocks = ClientGccBlocks {
        core: ClientCoreData {
            version: RdpVersion::V5_PLUS,
            desktop_width: 1280,
            desktop_height: 720,
            color_depth: ClientColorDepth::Bpp8,
            sec_access_sequence: SecureAccessSequence::Del,
            keyboard_layout: 0x409,
            client_build: 2600,
            client_name: "TESTBOX".to_owned(),
            keyboard_type: KeyboardType::IbmEnhanced,
            keyboard_subtype: 0,
            keyboard_functional_keys_count: 12,
            ime_file_name: String::new(),
            optional_data: ClientCoreOptionalData {
                post_beta2_color_depth: Some(ClientColorDepth::Bpp8),
                client_product_id: Some(1),
                serial_number: Some(0),
                high_color_depth: Some(HighColorDepth::Bpp24),
                supported_color_depths: Some(SupportedColorDepths::BPP24),
                early_capability_flags: Some(ClientEarlyCapabilityFlags::SUPPORT_ERR_INFO_PDU),
                dig_product_id: Some(String::new()),
                connection_type: Some(ConnectionType::Lan),
                server_selected_protocol: Some(SecurityProtocol::HYBRID),
                ..ClientCoreOptionalData::default()
            },
        },
        security: ClientSecurityData::no_security(),
        network: Some(ClientNetworkData {
            channels: vec![
                ChannelDef {
                    name: ChannelName::from_utf8("cliprdr").unwrap(),
                    options: ChannelOptions::INITIALIZED | ChannelOptions::ENCRYPT_RDP,
                },
                ChannelDef {
                    name: ChannelName::from_utf8("drdynvc").unwrap(),
                    options: ChannelOptions::INITIALIZED | ChannelOptions::ENCRYPT_RDP,
                },
            ],
        }),
        monitor: None,
        monitor_extended: None,
        multi_transport: None,
    };

    let connect_initial = opalrdp_pdu::mcs::ConnectInitial::with_gcc_blocks(blocks.clone());

    let encoded = encode_vec(&connect_initial).unwrap();
    assert_eq!(encoded.len(), opalrdp_core::size(&connect_initial));

    let decoded: opalrdp_pdu::mcs::ConnectInitial = decode(&encoded).unwrap();
    assert_eq!(decoded.conference_create_request.gcc_blocks, blocks);
}
