//! Shared helpers for the OpalRDP integration tests.

use opalrdp_core::{encode_vec, Encode, WriteBuf};

/// Encodes `pdu` as the payload of an X.224 Data TPDU (TPKT framing
/// included), the way a server would frame it.
pub fn x224_frame<T: Encode>(pdu: &T) -> Vec<u8> {
    let mut buf = WriteBuf::new();
    opalrdp_connector::envelopes::encode_x224_packet(pdu, &mut buf).expect("encode X.224 frame");
    buf.into_inner()
}

/// Wraps `user_data` in an MCS Send Data Indication frame on `channel_id`,
/// the way a server would send it.
pub fn send_data_indication_frame(initiator_id: u16, channel_id: u16, user_data: &[u8]) -> Vec<u8> {
    use std::borrow::Cow;

    let pdu = opalrdp_pdu::mcs::SendDataIndication {
        initiator_id,
        channel_id,
        user_data: Cow::Borrowed(user_data),
    };

    encode_vec(&opalrdp_pdu::x224::X224(pdu)).expect("encode Send Data Indication")
}
