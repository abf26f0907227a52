use opalrdp_connector::ConnectionResult;
use opalrdp_core::WriteBuf;
use opalrdp_graphics::bitmap_cache::CacheStats;
use opalrdp_pdu::mcs::DisconnectReason;
use opalrdp_pdu::Action;

use crate::{fast_path, x224, BitmapProcessor, SessionResult};

/// The active stage: dispatches incoming frames to the FastPath bitmap
/// pipeline or the slow-path channel machinery, and encodes outbound
/// traffic.
pub struct ActiveStage {
    x224_processor: x224::Processor,
    fast_path_processor: fast_path::Processor,
}

/// Ordered side effects of processing one frame.
#[derive(Debug)]
pub enum ActiveStageOutput {
    /// Bytes to write to the transport.
    ResponseFrame(Vec<u8>),
    /// Clean end of session.
    Terminate(DisconnectReason),
}

impl ActiveStage {
    pub fn new(connection_result: ConnectionResult, bitmap_cache_entries: [u32; 3]) -> Self {
        let x224_processor = x224::Processor::new(
            connection_result.static_channels,
            connection_result.user_channel_id,
            connection_result.io_channel_id,
            connection_result.share_id,
        );

        let fast_path_processor = fast_path::ProcessorBuilder {
            user_channel_id: connection_result.user_channel_id,
            io_channel_id: connection_result.io_channel_id,
            share_id: connection_result.share_id,
            bitmap_cache_entries,
        }
        .build();

        Self {
            x224_processor,
            fast_path_processor,
        }
    }

    /// Processes one incoming frame. The returned outputs must be handled in
    /// order; display updates are delivered through `processor` along the way.
    pub fn process(
        &mut self,
        processor: &mut dyn BitmapProcessor,
        action: Action,
        frame: &[u8],
    ) -> SessionResult<Vec<ActiveStageOutput>> {
        match action {
            Action::FastPath => {
                let mut output = WriteBuf::new();
                self.fast_path_processor.process(processor, frame, &mut output)?;

                if output.is_empty() {
                    Ok(Vec::new())
                } else {
                    Ok(vec![ActiveStageOutput::ResponseFrame(output.into_inner())])
                }
            }
            Action::X224 => {
                let outputs = self.x224_processor.process(frame)?;

                Ok(outputs
                    .into_iter()
                    .map(|output| match output {
                        x224::ProcessorOutput::ResponseFrame(frame) => ActiveStageOutput::ResponseFrame(frame),
                        x224::ProcessorOutput::Disconnect(reason) => ActiveStageOutput::Terminate(reason),
                    })
                    .collect())
            }
        }
    }

    /// Encodes a whole frame carrying `data` on the named dynamic channel.
    pub fn encode_dynamic(&mut self, output: &mut WriteBuf, channel_name: &str, data: &[u8]) -> SessionResult<()> {
        self.x224_processor.encode_dynamic(output, channel_name, data)
    }

    /// Encodes a whole frame carrying a share data PDU on the IO channel.
    pub fn encode_static(
        &self,
        output: &mut WriteBuf,
        pdu: opalrdp_pdu::rdp::headers::ShareDataPdu,
    ) -> SessionResult<usize> {
        self.x224_processor.encode_static(output, pdu)
    }

    /// Snapshot of the bitmap cache statistics, one entry per tier.
    pub fn bitmap_cache_stats(&self) -> Vec<CacheStats> {
        self.fast_path_processor.bitmap_cache_stats()
    }
}
