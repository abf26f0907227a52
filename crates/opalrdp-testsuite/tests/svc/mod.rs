//! Fragmented static virtual channel delivery (the clipboard channel).

use std::sync::mpsc;

use opalrdp_pdu::vc::{ChannelControlFlags, ChannelPduHeader};
use opalrdp_svc::cliprdr::{ClipboardHandler, ClipboardMessage, CliprdrChannel};
use opalrdp_svc::{StaticChannelSet, SvcMessage};

struct Recorder(mpsc::Sender<(u16, Vec<u8>)>);

impl ClipboardHandler for Recorder {
    fn on_message(&mut self, message: ClipboardMessage<'_>) -> Vec<SvcMessage> {
        self.0.send((message.msg_type, message.data.to_vec())).unwrap();
        Vec::new()
    }
}

fn chunk(total: u32, flags: ChannelControlFlags, payload: &[u8]) -> Vec<u8> {
    let header = ChannelPduHeader { length: total, flags };

    let mut data = header.to_bytes().to_vec();
    data.extend_from_slice(payload);
    data
}

#[test]
fn fragmented_clipboard_message_is_delivered_once() {
    const CHANNEL_ID: u16 = 1004;

    let (tx, rx) = mpsc::channel();

    let mut channels = StaticChannelSet::new();
    channels.insert(CliprdrChannel::new(Box::new(Recorder(tx))));
    channels.attach_channel_id(std::any::TypeId::of::<CliprdrChannel>(), CHANNEL_ID);

    // A clipboard message split over three chunks: header + payload parts.
    let mut message = Vec::new();
    message.extend_from_slice(&2u16.to_le_bytes()); // msgType
    message.extend_from_slice(&0u16.to_le_bytes()); // msgFlags
    message.extend_from_slice(&6u32.to_le_bytes()); // dataLen
    message.extend_from_slice(&[0xA1, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6]);

    let total = message.len() as u32;
    let (p1, rest) = message.split_at(5);
    let (p2, p3) = rest.split_at(4);

    let chunks = [
        chunk(total, ChannelControlFlags::FLAG_FIRST, p1),
        chunk(total, ChannelControlFlags::empty(), p2),
        chunk(total, ChannelControlFlags::FLAG_LAST, p3),
    ];

    for (i, data) in chunks.iter().enumerate() {
        let complete = channels.reassemble(CHANNEL_ID, data).unwrap();

        match complete {
            Some(complete) => {
                assert_eq!(i, 2, "only the LAST chunk completes the message");
                let channel = channels.get_by_channel_id_mut(CHANNEL_ID).unwrap();
                channel.process(&complete).unwrap();
            }
            None => assert!(i < 2),
        }
    }

    // Exactly one delivery whose bytes are P1 || P2 || P3.
    let (msg_type, data) = rx.try_recv().unwrap();
    assert_eq!(msg_type, 2);
    assert_eq!(data, [0xA1, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6]);
    assert!(rx.try_recv().is_err());
}
