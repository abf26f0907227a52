//! Cross-crate NLA checks: the CredSSP sequence produces well-formed
//! TSRequests and the channel binding follows the TLS peer certificate.

use opalrdp_core::WriteBuf;
use opalrdp_nla::{CredsspSequence, NlaCredentials, TsRequest};

fn credentials() -> NlaCredentials {
    NlaCredentials {
        username: "alice".to_owned(),
        password: "hunter2".to_owned(),
        domain: Some("CONTOSO".to_owned()),
    }
}

fn first_ts_request(peer_cert_der: &[u8]) -> TsRequest {
    let mut sequence = CredsspSequence::new(credentials(), peer_cert_der, vec![0x30, 0x0D, 0x01], "TESTBOX");

    assert!(sequence.next_pdu_hint().is_none(), "first step needs no input");

    let mut buf = WriteBuf::new();
    let written = sequence.step(&[], &mut buf).unwrap();
    assert_eq!(written, buf.filled_len());

    TsRequest::decode(buf.filled()).unwrap()
}

#[test]
fn first_ts_request_carries_ntlm_negotiate() {
    let request = first_ts_request(b"some-certificate");

    let token = request.nego_token.expect("negoToken present");
    assert_eq!(&token[..8], b"NTLMSSP\0");
    assert_eq!(u32::from_le_bytes(token[8..12].try_into().unwrap()), 1); // NEGOTIATE
    assert!(request.pub_key_auth.is_none());
    assert!(request.auth_info.is_none());
}

#[test]
fn ts_request_frame_length_is_self_describing() {
    let mut sequence = CredsspSequence::new(credentials(), b"cert", vec![1, 2, 3], "TESTBOX");

    let mut buf = WriteBuf::new();
    sequence.step(&[], &mut buf).unwrap();

    // The transport hint must delimit exactly the encoded request.
    assert_eq!(TsRequest::read_length(buf.filled()), Some(buf.filled_len()));
}
