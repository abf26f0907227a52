//! The `drdynvc` static channel processor and its per-channel state machine.

use core::fmt;
use std::collections::BTreeMap;

use opalrdp_core::{encode_vec, DecodeResult, ReadCursor};
use opalrdp_pdu::gcc::ChannelName;
use opalrdp_svc::{impl_as_any, StaticVirtualChannel, SvcMessage};
use tracing::{debug, warn};

use crate::complete_data::CompleteData;
use crate::pdu::{ClientPdu, ServerPdu, DVC_CREATION_STATUS_OK};

const OPEN_STATUS_OK: u32 = 0x0000_0000;
const OPEN_STATUS_NO_CHANNEL: u32 = 0xC000_0001;

/// Largest DVC data payload per frame, keeping the whole drdynvc message
/// within one static channel chunk.
const DATA_MAX_PAYLOAD: usize = 1590;

/// Lifecycle of one dynamic channel. The state only ever advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DvcChannelState {
    Requested,
    Opening,
    Open,
    Closed,
}

/// Application-side handler for one dynamic channel name.
///
/// All callbacks run on the session reader task and receive borrowed
/// payloads; copy anything that must outlive the call. Must not block.
pub trait DvcHandler: Send {
    fn on_channel_created(&mut self, _channel_id: u32) {}

    fn on_channel_opened(&mut self, _channel_id: u32) {}

    fn on_channel_closed(&mut self, _channel_id: u32) {}

    /// Handles one complete (reassembled) message; returns payloads to send
    /// back on the same channel.
    fn on_data_received(&mut self, _channel_id: u32, _data: &[u8]) -> Vec<Vec<u8>> {
        Vec::new()
    }
}

/// Fallback handler bound to channel names nobody registered; swallows
/// everything so unknown server-initiated channels do not break the session.
#[derive(Debug, Default)]
pub struct NoopDvcHandler;

impl DvcHandler for NoopDvcHandler {}

#[derive(Debug)]
struct DynamicChannel {
    name: String,
    state: DvcChannelState,
    reassembly: CompleteData,
}

/// DRDYNVC static channel (Remote Desktop Protocol: Dynamic Virtual Channel
/// Extension), client side.
pub struct DrdynvcClient {
    handlers: BTreeMap<String, Box<dyn DvcHandler>>,
    fallback: Box<dyn DvcHandler>,
    channels: BTreeMap<u32, DynamicChannel>,
    by_name: BTreeMap<String, u32>,
}

impl fmt::Debug for DrdynvcClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DrdynvcClient([")?;

        for (i, (id, channel)) in self.channels.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}:{}({:?})", id, channel.name, channel.state)?;
        }

        write!(f, "])")
    }
}

impl DrdynvcClient {
    pub const NAME: ChannelName = ChannelName::from_static(b"drdynvc\0");

    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
            fallback: Box::new(NoopDvcHandler),
            channels: BTreeMap::new(),
            by_name: BTreeMap::new(),
        }
    }

    /// Registers `handler` for channels created under `name`.
    pub fn register_handler(&mut self, name: impl Into<String>, handler: Box<dyn DvcHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    #[must_use]
    pub fn with_handler(mut self, name: impl Into<String>, handler: Box<dyn DvcHandler>) -> Self {
        self.register_handler(name, handler);
        self
    }

    pub fn channel_state(&self, channel_id: u32) -> Option<DvcChannelState> {
        self.channels.get(&channel_id).map(|channel| channel.state)
    }

    pub fn channel_id_by_name(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    /// Encodes application data for the named channel as DVC data frames,
    /// fragmenting when it exceeds one frame.
    pub fn encode_data_by_name(&self, name: &str, data: &[u8]) -> Option<Vec<SvcMessage>> {
        let channel_id = self.channel_id_by_name(name)?;

        let channel = self.channels.get(&channel_id)?;
        if channel.state != DvcChannelState::Open {
            warn!(channel_id, name, "Refusing to send on a channel that is not open");
            return None;
        }

        let mut messages = Vec::new();

        if data.len() <= DATA_MAX_PAYLOAD {
            messages.push(encode_client_pdu(&ClientPdu::DataFirstLast { channel_id, data }));
        } else {
            let mut chunks = data.chunks(DATA_MAX_PAYLOAD).peekable();

            let first = chunks.next().expect("data is non-empty");
            messages.push(encode_client_pdu(&ClientPdu::DataFirst {
                channel_id,
                total_length: data.len() as u32,
                data: first,
            }));

            while let Some(chunk) = chunks.next() {
                let pdu = if chunks.peek().is_none() {
                    ClientPdu::DataLast { channel_id, data: chunk }
                } else {
                    ClientPdu::Data { channel_id, data: chunk }
                };
                messages.push(encode_client_pdu(&pdu));
            }
        }

        Some(messages)
    }

    fn handler_for(&mut self, name: &str) -> &mut dyn DvcHandler {
        match self.handlers.get_mut(name) {
            Some(handler) => handler.as_mut(),
            None => self.fallback.as_mut(),
        }
    }

    fn deliver(&mut self, channel_id: u32, name: String, payload: Vec<u8>) -> Vec<SvcMessage> {
        let responses = self.handler_for(&name).on_data_received(channel_id, &payload);

        responses
            .iter()
            .flat_map(|data| {
                self.encode_data_by_name(&name, data)
                    .unwrap_or_default()
            })
            .collect()
    }
}

impl_as_any!(DrdynvcClient);

impl Default for DrdynvcClient {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticVirtualChannel for DrdynvcClient {
    fn channel_name(&self) -> ChannelName {
        DrdynvcClient::NAME
    }

    fn process(&mut self, payload: &[u8]) -> DecodeResult<Vec<SvcMessage>> {
        let pdu = ServerPdu::decode(&mut ReadCursor::new(payload))?;
        let mut responses = Vec::new();

        match pdu {
            ServerPdu::CreateRequest {
                channel_id,
                channel_name,
            } => {
                debug!(channel_id, name = %channel_name, "DVC create request");

                let known = self.handlers.contains_key(&channel_name);
                if !known {
                    debug!(name = %channel_name, "No DVC handler registered, using no-op handler");
                }

                self.channels.insert(
                    channel_id,
                    DynamicChannel {
                        name: channel_name.clone(),
                        state: DvcChannelState::Opening,
                        reassembly: CompleteData::new(),
                    },
                );
                self.by_name.insert(channel_name.clone(), channel_id);

                // Every create succeeds; the no-op handler absorbs unknown
                // names rather than refusing the channel.
                responses.push(encode_client_pdu(&ClientPdu::CreateResponse {
                    channel_id,
                    creation_status: DVC_CREATION_STATUS_OK,
                }));

                self.handler_for(&channel_name).on_channel_created(channel_id);
            }
            ServerPdu::OpenRequest { channel_id } => {
                debug!(channel_id, "DVC open request");

                let status = match self.channels.get_mut(&channel_id) {
                    Some(channel) if channel.state == DvcChannelState::Opening => {
                        channel.state = DvcChannelState::Open;
                        OPEN_STATUS_OK
                    }
                    Some(channel) => {
                        warn!(channel_id, state = ?channel.state, "DVC open request out of sequence");
                        OPEN_STATUS_NO_CHANNEL
                    }
                    None => {
                        warn!(channel_id, "DVC open request for an unknown channel");
                        OPEN_STATUS_NO_CHANNEL
                    }
                };

                responses.push(encode_client_pdu(&ClientPdu::OpenResponse { channel_id, status }));

                if status == OPEN_STATUS_OK {
                    let name = self.channels[&channel_id].name.clone();
                    self.handler_for(&name).on_channel_opened(channel_id);
                }
            }
            ServerPdu::CloseRequest { channel_id } => {
                debug!(channel_id, "DVC close request");

                responses.push(encode_client_pdu(&ClientPdu::CloseResponse { channel_id }));

                if let Some(mut channel) = self.channels.remove(&channel_id) {
                    channel.state = DvcChannelState::Closed;
                    self.by_name.remove(&channel.name);
                    self.handler_for(&channel.name.clone()).on_channel_closed(channel_id);
                }
            }
            ServerPdu::DataFirst {
                channel_id,
                total_length,
                data,
            } => {
                if let Some((name, complete)) = self.feed(channel_id, |channel| {
                    channel.reassembly.process_data_first(total_length as usize, data)
                }) {
                    responses.extend(self.deliver(channel_id, name, complete));
                }
            }
            ServerPdu::Data { channel_id, data } => {
                let _ = self.feed(channel_id, |channel| channel.reassembly.process_data(data));
            }
            ServerPdu::DataLast { channel_id, data } => {
                if let Some((name, complete)) =
                    self.feed(channel_id, |channel| channel.reassembly.process_data_last(data))
                {
                    responses.extend(self.deliver(channel_id, name, complete));
                }
            }
            ServerPdu::DataFirstLast { channel_id, data } => {
                if let Some((name, complete)) = self.feed(channel_id, |_| Some(data.to_vec())) {
                    responses.extend(self.deliver(channel_id, name, complete));
                }
            }
        }

        Ok(responses)
    }

    fn is_drdynvc(&self) -> bool {
        true
    }
}

impl DrdynvcClient {
    /// Runs `op` against an open channel's reassembler, returning the channel
    /// name and the complete message when one is produced.
    fn feed(
        &mut self,
        channel_id: u32,
        op: impl FnOnce(&mut DynamicChannel) -> Option<Vec<u8>>,
    ) -> Option<(String, Vec<u8>)> {
        match self.channels.get_mut(&channel_id) {
            Some(channel) if channel.state == DvcChannelState::Open => {
                let name = channel.name.clone();
                op(channel).map(|complete| (name, complete))
            }
            Some(channel) => {
                warn!(channel_id, state = ?channel.state, "DVC data on a channel that is not open, dropped");
                None
            }
            None => {
                warn!(channel_id, "DVC data for an unknown channel, dropped");
                None
            }
        }
    }
}

fn encode_client_pdu(pdu: &ClientPdu<'_>) -> SvcMessage {
    SvcMessage::new(encode_vec(pdu).expect("sized DVC client PDU always encodes"))
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Created(u32),
        Opened(u32),
        Closed(u32),
        Data(u32, Vec<u8>),
    }

    struct Recorder(mpsc::Sender<Event>);

    impl DvcHandler for Recorder {
        fn on_channel_created(&mut self, channel_id: u32) {
            self.0.send(Event::Created(channel_id)).unwrap();
        }

        fn on_channel_opened(&mut self, channel_id: u32) {
            self.0.send(Event::Opened(channel_id)).unwrap();
        }

        fn on_channel_closed(&mut self, channel_id: u32) {
            self.0.send(Event::Closed(channel_id)).unwrap();
        }

        fn on_data_received(&mut self, channel_id: u32, data: &[u8]) -> Vec<Vec<u8>> {
            self.0.send(Event::Data(channel_id, data.to_vec())).unwrap();
            Vec::new()
        }
    }

    fn create_request(channel_id: u8, name: &str) -> Vec<u8> {
        let mut payload = vec![0x10, channel_id];
        payload.extend_from_slice(name.as_bytes());
        payload.push(0);
        payload
    }

    #[test]
    fn full_channel_lifecycle() {
        let (tx, rx) = mpsc::channel();
        let mut client = DrdynvcClient::new().with_handler("FOO", Box::new(Recorder(tx)));

        // CREATE_REQ(id=42, name="FOO") -> CREATE_RSP(success)
        let responses = client.process(&create_request(42, "FOO")).unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].data(), [0x20, 42, 0, 0, 0, 0]);
        assert_eq!(rx.try_recv().unwrap(), Event::Created(42));
        assert_eq!(client.channel_state(42), Some(DvcChannelState::Opening));

        // OPEN_REQ(42) -> OPEN_RSP(success)
        let responses = client.process(&[0x30, 42]).unwrap();
        assert_eq!(responses[0].data(), [0x40, 42, 0, 0, 0, 0]);
        assert_eq!(rx.try_recv().unwrap(), Event::Opened(42));
        assert_eq!(client.channel_state(42), Some(DvcChannelState::Open));

        // Two DATA_FIRST_LAST frames -> two handler invocations
        client.process(&[0xA0, 42, 1, 2, 3]).unwrap();
        client.process(&[0xA0, 42, 4, 5]).unwrap();
        assert_eq!(rx.try_recv().unwrap(), Event::Data(42, vec![1, 2, 3]));
        assert_eq!(rx.try_recv().unwrap(), Event::Data(42, vec![4, 5]));

        // CLOSE_REQ(42) -> CLOSE_RSP + OnChannelClosed
        let responses = client.process(&[0x50, 42]).unwrap();
        assert_eq!(responses[0].data(), [0x60, 42]);
        assert_eq!(rx.try_recv().unwrap(), Event::Closed(42));
        assert_eq!(client.channel_state(42), None);
    }

    #[test]
    fn fragmented_data_is_reassembled() {
        let (tx, rx) = mpsc::channel();
        let mut client = DrdynvcClient::new().with_handler("BAR", Box::new(Recorder(tx)));

        client.process(&create_request(7, "BAR")).unwrap();
        client.process(&[0x30, 7]).unwrap();
        let _ = rx.try_recv();
        let _ = rx.try_recv();

        // DATA_FIRST(total=5, [1,2]) + DATA([3]) + DATA_LAST([4,5])
        client.process(&[0x70, 7, 5, 0, 0, 0, 1, 2]).unwrap();
        client.process(&[0x80, 7, 3]).unwrap();
        client.process(&[0x90, 7, 4, 5]).unwrap();

        assert_eq!(rx.try_recv().unwrap(), Event::Data(7, vec![1, 2, 3, 4, 5]));
    }

    #[test]
    fn unknown_channel_name_gets_noop_handler() {
        let mut client = DrdynvcClient::new();

        let responses = client.process(&create_request(9, "MYSTERY")).unwrap();
        // Create still succeeds.
        assert_eq!(responses[0].data(), [0x20, 9, 0, 0, 0, 0]);

        client.process(&[0x30, 9]).unwrap();
        // Data on the channel is swallowed without error.
        let responses = client.process(&[0xA0, 9, 1, 2, 3]).unwrap();
        assert!(responses.is_empty());
    }

    #[test]
    fn data_before_open_is_dropped() {
        let (tx, rx) = mpsc::channel();
        let mut client = DrdynvcClient::new().with_handler("FOO", Box::new(Recorder(tx)));

        client.process(&create_request(5, "FOO")).unwrap();
        let _ = rx.try_recv();

        client.process(&[0xA0, 5, 1, 2]).unwrap();
        assert!(rx.try_recv().is_err());
    }
}
