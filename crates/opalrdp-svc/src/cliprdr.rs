//! Clipboard channel transport (`cliprdr`).
//!
//! Only the CLIPRDR_HEADER framing lives here; clipboard semantics belong to
//! the registered [`ClipboardHandler`].

use core::fmt;

use opalrdp_core::{
    cast_length, ensure_fixed_part_size, ensure_size, DecodeResult, Encode, EncodeResult, ReadCursor, WriteCursor,
};
use opalrdp_pdu::gcc::ChannelName;
use tracing::{debug, error};

use crate::{impl_as_any, StaticVirtualChannel, SvcMessage};

pub const CHANNEL_NAME: ChannelName = ChannelName::from_static(b"cliprdr\0");

/// CLIPRDR_HEADER plus the message payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardMessage<'a> {
    pub msg_type: u16,
    pub msg_flags: u16,
    pub data: &'a [u8],
}

impl<'a> ClipboardMessage<'a> {
    const NAME: &'static str = "ClipboardMessage";

    const FIXED_PART_SIZE: usize = 2 /* msgType */ + 2 /* msgFlags */ + 4 /* dataLen */;

    pub fn decode(src: &mut ReadCursor<'a>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let msg_type = src.read_u16();
        let msg_flags = src.read_u16();
        let data_len: usize = cast_length!(Self::NAME, "dataLen", src.read_u32())?;

        ensure_size!(in: src, size: data_len);
        let data = src.read_slice(data_len);

        Ok(Self {
            msg_type,
            msg_flags,
            data,
        })
    }
}

impl Encode for ClipboardMessage<'_> {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u16(self.msg_type);
        dst.write_u16(self.msg_flags);
        dst.write_u32(cast_length!(Self::NAME, "dataLen", self.data.len())?);
        dst.write_slice(self.data);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.data.len()
    }
}

/// Application-side clipboard handler.
///
/// Invoked on the session reader task with a borrowed message; the payload
/// slice must be copied if retained. Must not block.
pub trait ClipboardHandler: Send {
    /// Handles one clipboard message, optionally returning messages to send
    /// back on the channel.
    fn on_message(&mut self, message: ClipboardMessage<'_>) -> Vec<SvcMessage>;
}

/// The `cliprdr` static channel: decodes the header and forwards to the
/// registered handler.
pub struct CliprdrChannel {
    handler: Box<dyn ClipboardHandler>,
}

impl CliprdrChannel {
    pub fn new(handler: Box<dyn ClipboardHandler>) -> Self {
        Self { handler }
    }
}

impl fmt::Debug for CliprdrChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CliprdrChannel").finish_non_exhaustive()
    }
}

impl_as_any!(CliprdrChannel);

impl StaticVirtualChannel for CliprdrChannel {
    fn channel_name(&self) -> ChannelName {
        CHANNEL_NAME
    }

    fn process(&mut self, payload: &[u8]) -> DecodeResult<Vec<SvcMessage>> {
        let mut cursor = ReadCursor::new(payload);
        let message = match ClipboardMessage::decode(&mut cursor) {
            Ok(message) => message,
            Err(e) => {
                error!(error = %e, "Malformed clipboard message dropped");
                return Ok(Vec::new());
            }
        };

        debug!(msg_type = message.msg_type, len = message.data.len(), "Clipboard message");

        Ok(self.handler.on_message(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        seen: std::sync::mpsc::Sender<(u16, Vec<u8>)>,
    }

    impl ClipboardHandler for Recorder {
        fn on_message(&mut self, message: ClipboardMessage<'_>) -> Vec<SvcMessage> {
            self.seen.send((message.msg_type, message.data.to_vec())).unwrap();
            Vec::new()
        }
    }

    #[test]
    fn header_is_decoded_and_payload_forwarded() {
        let (tx, rx) = std::sync::mpsc::channel();
        let mut channel = CliprdrChannel::new(Box::new(Recorder { seen: tx }));

        // msgType=2 (format list), msgFlags=0, dataLen=3
        let payload = [0x02, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00, 0xA, 0xB, 0xC];
        channel.process(&payload).unwrap();

        assert_eq!(rx.try_recv().unwrap(), (2, vec![0xA, 0xB, 0xC]));
    }
}
