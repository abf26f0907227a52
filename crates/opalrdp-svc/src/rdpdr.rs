//! Device redirection channel transport (`rdpdr`).
//!
//! Decodes the RDPDR_HEADER and hands the body to the registered
//! [`DeviceHandler`]; drive/printer/port semantics are the handler's concern.

use core::fmt;

use opalrdp_core::{ensure_fixed_part_size, ensure_size, DecodeResult, Encode, EncodeResult, ReadCursor, WriteCursor};
use opalrdp_pdu::gcc::ChannelName;
use tracing::{debug, error};

use crate::{impl_as_any, StaticVirtualChannel, SvcMessage};

pub const CHANNEL_NAME: ChannelName = ChannelName::from_static(b"rdpdr\0\0\0");

/// RDPDR_HEADER plus the packet body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMessage<'a> {
    pub component_id: u16,
    pub packet_id: u16,
    pub data: &'a [u8],
}

impl<'a> DeviceMessage<'a> {
    const NAME: &'static str = "DeviceMessage";

    const FIXED_PART_SIZE: usize = 2 /* componentId */ + 2 /* packetId */;

    pub fn decode(src: &mut ReadCursor<'a>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let component_id = src.read_u16();
        let packet_id = src.read_u16();
        let data = src.read_remaining();

        Ok(Self {
            component_id,
            packet_id,
            data,
        })
    }
}

impl Encode for DeviceMessage<'_> {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u16(self.component_id);
        dst.write_u16(self.packet_id);
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

/// Application-side device redirection handler.
///
/// Invoked on the session reader task with a borrowed message; the payload
/// slice must be copied if retained. Must not block.
pub trait DeviceHandler: Send {
    fn on_message(&mut self, message: DeviceMessage<'_>) -> Vec<SvcMessage>;
}

/// The `rdpdr` static channel.
pub struct RdpdrChannel {
    handler: Box<dyn DeviceHandler>,
}

impl RdpdrChannel {
    pub fn new(handler: Box<dyn DeviceHandler>) -> Self {
        Self { handler }
    }
}

impl fmt::Debug for RdpdrChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RdpdrChannel").finish_non_exhaustive()
    }
}

impl_as_any!(RdpdrChannel);

impl StaticVirtualChannel for RdpdrChannel {
    fn channel_name(&self) -> ChannelName {
        CHANNEL_NAME
    }

    fn process(&mut self, payload: &[u8]) -> DecodeResult<Vec<SvcMessage>> {
        let mut cursor = ReadCursor::new(payload);
        let message = match DeviceMessage::decode(&mut cursor) {
            Ok(message) => message,
            Err(e) => {
                error!(error = %e, "Malformed device redirection message dropped");
                return Ok(Vec::new());
            }
        };

        debug!(
            component_id = message.component_id,
            packet_id = message.packet_id,
            "Device redirection message"
        );

        Ok(self.handler.on_message(message))
    }
}
