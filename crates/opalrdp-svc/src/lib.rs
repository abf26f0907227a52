#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod cliprdr;
pub mod rdpdr;

use core::any::{Any, TypeId};
use core::fmt;
use std::collections::BTreeMap;

use opalrdp_core::{cast_length, DecodeResult, EncodeResult};
use opalrdp_pdu::gcc::{ChannelDef, ChannelName, ChannelOptions};
use opalrdp_pdu::vc::{ChannelPduHeader, CHANNEL_CHUNK_LENGTH, CHANNEL_PDU_HEADER_SIZE};
use tracing::warn;

pub type StaticChannelId = u16;

/// A message to send on a static virtual channel; chunked into CHANNEL_PDUs
/// before hitting the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SvcMessage {
    data: Vec<u8>,
}

impl SvcMessage {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl From<Vec<u8>> for SvcMessage {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

pub trait AsAny {
    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

#[macro_export]
macro_rules! impl_as_any {
    ($type:ty) => {
        impl $crate::AsAny for $type {
            fn as_any(&self) -> &dyn core::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn core::any::Any {
                self
            }
        }
    };
}

/// A static virtual channel.
///
/// Static channels are created once during Basic Settings Exchange and
/// identified by the server-assigned channel id for the rest of the session.
/// `process` receives whole reassembled messages on the reader task and must
/// not block; long work belongs on the handler's own worker.
pub trait StaticVirtualChannel: AsAny + fmt::Debug + Send {
    /// The name advertised in the Channel Definition Structure.
    fn channel_name(&self) -> ChannelName;

    /// The options advertised in the Channel Definition Structure.
    fn channel_options(&self) -> ChannelOptions {
        ChannelOptions::INITIALIZED | ChannelOptions::ENCRYPT_RDP | ChannelOptions::COMPRESS_RDP
    }

    /// Processes one complete (reassembled) channel message and returns the
    /// messages to send back, if any.
    fn process(&mut self, payload: &[u8]) -> DecodeResult<Vec<SvcMessage>>;

    #[doc(hidden)]
    fn is_drdynvc(&self) -> bool {
        false
    }
}

opalrdp_core::assert_obj_safe!(StaticVirtualChannel);

/// Builds the CHANNEL_DEF for a channel.
pub fn make_channel_definition(channel: &dyn StaticVirtualChannel) -> ChannelDef {
    ChannelDef {
        name: channel.channel_name(),
        options: channel.channel_options(),
    }
}

/// The set of static channels attached to a session, indexed by Rust type and
/// by the channel id the server assigned during Basic Settings Exchange.
#[derive(Debug, Default)]
pub struct StaticChannelSet {
    channels: BTreeMap<TypeId, Box<dyn StaticVirtualChannel>>,
    to_channel_id: BTreeMap<TypeId, StaticChannelId>,
    to_type_id: BTreeMap<StaticChannelId, TypeId>,
    reassemblers: BTreeMap<StaticChannelId, ChunkReassembler>,
}

impl StaticChannelSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: StaticVirtualChannel + 'static>(&mut self, channel: T) -> Option<Box<dyn StaticVirtualChannel>> {
        self.channels.insert(TypeId::of::<T>(), Box::new(channel))
    }

    pub fn get_by_type<T: StaticVirtualChannel + 'static>(&self) -> Option<&dyn StaticVirtualChannel> {
        self.channels.get(&TypeId::of::<T>()).map(|boxed| boxed.as_ref())
    }

    pub fn get_by_type_mut<T: StaticVirtualChannel + 'static>(&mut self) -> Option<&mut (dyn StaticVirtualChannel + 'static)> {
        match self.channels.get_mut(&TypeId::of::<T>()) {
            Some(boxed) => Some(boxed.as_mut()),
            None => None,
        }
    }

    pub fn get_by_channel_id_mut(&mut self, channel_id: StaticChannelId) -> Option<&mut (dyn StaticVirtualChannel + 'static)> {
        let type_id = self.to_type_id.get(&channel_id).copied()?;
        match self.channels.get_mut(&type_id) {
            Some(boxed) => Some(boxed.as_mut()),
            None => None,
        }
    }

    pub fn attach_channel_id(&mut self, type_id: TypeId, channel_id: StaticChannelId) -> Option<StaticChannelId> {
        self.to_type_id.insert(channel_id, type_id);
        self.to_channel_id.insert(type_id, channel_id)
    }

    pub fn get_channel_id_by_type<T: StaticVirtualChannel + 'static>(&self) -> Option<StaticChannelId> {
        self.to_channel_id.get(&TypeId::of::<T>()).copied()
    }

    pub fn drdynvc_channel_id(&self) -> Option<StaticChannelId> {
        self.channels
            .iter()
            .find(|(_, channel)| channel.is_drdynvc())
            .and_then(|(type_id, _)| self.to_channel_id.get(type_id).copied())
    }

    pub fn type_ids(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.channels.keys().copied()
    }

    pub fn values(&self) -> impl Iterator<Item = &dyn StaticVirtualChannel> {
        self.channels.values().map(|boxed| boxed.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Feeds one CHANNEL_PDU chunk for `channel_id` into the per-channel
    /// reassembler; returns the complete message once the LAST chunk lands.
    pub fn reassemble(&mut self, channel_id: StaticChannelId, payload: &[u8]) -> DecodeResult<Option<Vec<u8>>> {
        let mut cursor = opalrdp_core::ReadCursor::new(payload);
        let header = ChannelPduHeader::read(&mut cursor)?;
        let chunk = cursor.remaining();

        let reassembler = self.reassemblers.entry(channel_id).or_default();

        Ok(reassembler.process(&header, chunk))
    }
}

/// Reassembles FIRST..LAST chunk sequences into whole channel messages.
#[derive(Debug, Default)]
pub struct ChunkReassembler {
    buffer: Vec<u8>,
    total_length: usize,
    in_progress: bool,
}

impl ChunkReassembler {
    pub fn process(&mut self, header: &ChannelPduHeader, chunk: &[u8]) -> Option<Vec<u8>> {
        if header.is_first() {
            if self.in_progress {
                warn!("Incomplete static channel message dropped by a new FIRST chunk");
            }

            self.buffer.clear();
            self.total_length = header.length as usize;
            self.in_progress = true;
        } else if !self.in_progress {
            warn!("Static channel chunk without a FIRST chunk, dropped");
            return None;
        }

        self.buffer.extend_from_slice(chunk);

        if self.buffer.len() > self.total_length {
            warn!(
                received = self.buffer.len(),
                expected = self.total_length,
                "Static channel message longer than advertised, dropped"
            );
            self.in_progress = false;
            self.buffer.clear();
            return None;
        }

        if header.is_last() {
            self.in_progress = false;
            Some(core::mem::take(&mut self.buffer))
        } else {
            None
        }
    }
}

/// Splits `message` into CHANNEL_PDU chunks ready for MCS transport.
pub fn chunkify(message: &SvcMessage) -> EncodeResult<Vec<Vec<u8>>> {
    let total_length: u32 = cast_length!("chunkify", "totalLength", message.data().len())?;

    // An empty message still travels as one (empty) chunk.
    let chunk_count = message.data().len().div_ceil(CHANNEL_CHUNK_LENGTH).max(1);

    let mut chunks = Vec::with_capacity(chunk_count);

    for index in 0..chunk_count {
        let offset = index * CHANNEL_CHUNK_LENGTH;
        let chunk_data = &message.data()[offset..(offset + CHANNEL_CHUNK_LENGTH).min(message.data().len())];

        let header = ChannelPduHeader::for_chunk(total_length, index, chunk_count);

        let mut chunk = Vec::with_capacity(CHANNEL_PDU_HEADER_SIZE + chunk_data.len());
        chunk.extend_from_slice(&header.to_bytes());
        chunk.extend_from_slice(chunk_data);
        chunks.push(chunk);
    }

    Ok(chunks)
}

/// A placeholder channel: accepts anything, answers nothing.
///
/// Bound to channels the application registered no handler for, so unknown
/// traffic never breaks the session.
#[derive(Debug)]
pub struct NoopChannel {
    name: ChannelName,
}

impl NoopChannel {
    pub fn new(name: ChannelName) -> Self {
        Self { name }
    }
}

impl_as_any!(NoopChannel);

impl StaticVirtualChannel for NoopChannel {
    fn channel_name(&self) -> ChannelName {
        self.name.clone()
    }

    fn process(&mut self, _payload: &[u8]) -> DecodeResult<Vec<SvcMessage>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(length: u32, index: usize, count: usize) -> ChannelPduHeader {
        ChannelPduHeader::for_chunk(length, index, count)
    }

    #[test]
    fn single_chunk_message_is_delivered_whole() {
        let mut reassembler = ChunkReassembler::default();

        let out = reassembler.process(&header(3, 0, 1), &[1, 2, 3]);

        assert_eq!(out, Some(vec![1, 2, 3]));
    }

    #[test]
    fn fragmented_message_concatenates_in_order() {
        let mut reassembler = ChunkReassembler::default();

        assert_eq!(reassembler.process(&header(6, 0, 3), &[1, 2]), None);
        assert_eq!(reassembler.process(&header(6, 1, 3), &[3, 4]), None);
        let out = reassembler.process(&header(6, 2, 3), &[5, 6]);

        assert_eq!(out, Some(vec![1, 2, 3, 4, 5, 6]));
    }

    #[test]
    fn chunkify_round_trips_through_reassembler() {
        let message = SvcMessage::new(vec![0xAB; CHANNEL_CHUNK_LENGTH * 2 + 10]);
        let chunks = chunkify(&message).unwrap();
        assert_eq!(chunks.len(), 3);

        let mut set = StaticChannelSet::new();
        let mut complete = None;
        for chunk in &chunks {
            complete = set.reassemble(42, chunk).unwrap();
        }

        assert_eq!(complete.unwrap(), message.data());
    }

    #[test]
    fn chunk_without_first_is_dropped() {
        let mut reassembler = ChunkReassembler::default();

        // A LAST chunk of a three-chunk message, with no FIRST before it.
        let out = reassembler.process(&header(4, 2, 3), &[1, 2, 3, 4]);
        assert_eq!(out, None);
    }
}
