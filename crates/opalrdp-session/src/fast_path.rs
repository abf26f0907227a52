//! FastPath output processing: the bitmap pipeline.
//!
//! Every decoded rectangle ends up at the [`BitmapProcessor`] as a tightly
//! packed, top-down region. Decoder failures and cache misses drop the
//! affected rectangle and keep the session alive; the server resends.

use opalrdp_core::{decode, WriteBuf};
use opalrdp_graphics::bitmap_cache::{BitmapCache, CacheStats, CachedBitmap};
use opalrdp_graphics::offscreen::{OffscreenSurface, OffscreenSurfaceRegistry};
use opalrdp_graphics::rdp6::BitmapStreamDecoder;
use opalrdp_graphics::rle;
use opalrdp_pdu::bitmap::{BitmapData, CachedBitmapUpdate};
use opalrdp_pdu::fast_path::{FastPathHeader, FastPathUpdate, FastPathUpdatePdu, Fragmentation};
use opalrdp_pdu::rdp::headers::{FrameAcknowledgePdu, ShareDataPdu};
use opalrdp_pdu::surface_commands::{FrameAction, SurfaceBitsPdu, SurfaceCommand};

use crate::{session_reason_err, BitmapProcessor, BitmapRegion, SessionError, SessionErrorExt as _, SessionResult};

/// Codec id of raw (uncompressed) surface bits.
const SURFACE_CODEC_NONE: u8 = 0;

/// The offscreen registry limits advertised in the capability exchange.
const OFFSCREEN_MAX_ENTRIES: usize = 100;
const OFFSCREEN_MAX_BYTES: usize = 7680 * 1024;

pub struct Processor {
    complete_data: CompleteData,
    rdp6_decoder: BitmapStreamDecoder,
    bitmap_cache: BitmapCache,
    offscreen: OffscreenSurfaceRegistry,
    user_channel_id: u16,
    io_channel_id: u16,
    share_id: u32,
    decode_buffer: Vec<u8>,
}

pub struct ProcessorBuilder {
    pub user_channel_id: u16,
    pub io_channel_id: u16,
    pub share_id: u32,
    pub bitmap_cache_entries: [u32; 3],
}

impl ProcessorBuilder {
    pub fn build(self) -> Processor {
        let capacities: Vec<usize> = self.bitmap_cache_entries.iter().map(|&n| n as usize).collect();

        Processor {
            complete_data: CompleteData::new(),
            rdp6_decoder: BitmapStreamDecoder::default(),
            bitmap_cache: BitmapCache::new(&capacities),
            offscreen: OffscreenSurfaceRegistry::new(OFFSCREEN_MAX_ENTRIES, OFFSCREEN_MAX_BYTES),
            user_channel_id: self.user_channel_id,
            io_channel_id: self.io_channel_id,
            share_id: self.share_id,
            decode_buffer: Vec::new(),
        }
    }
}

impl Processor {
    /// Processes one FastPath frame, invoking `processor` for every decoded
    /// rectangle and writing any response PDUs (frame acknowledges) into
    /// `output`.
    pub fn process(
        &mut self,
        processor: &mut dyn BitmapProcessor,
        mut input: &[u8],
        output: &mut WriteBuf,
    ) -> SessionResult<()> {
        let mut cursor = opalrdp_core::ReadCursor::new(input);
        let header: FastPathHeader = opalrdp_core::decode_cursor(&mut cursor).map_err(SessionError::decode)?;
        trace!(?header, "Received FastPath frame");

        input = cursor.remaining();

        let update_pdu: FastPathUpdatePdu<'_> = decode(input).map_err(SessionError::decode)?;

        if update_pdu.compression_flags.is_some() {
            warn!("Compressed FastPath update dropped (bulk compression is not negotiated)");
            return Ok(());
        }

        let Some(data) = self
            .complete_data
            .process_data(update_pdu.data, update_pdu.fragmentation)
        else {
            return Ok(());
        };

        match FastPathUpdate::decode_with_code(&data, update_pdu.update_code) {
            Ok(Some(FastPathUpdate::Bitmap(bitmap_update))) => {
                trace!(rectangles = bitmap_update.rectangles.len(), "Bitmap update");

                for update in &bitmap_update.rectangles {
                    // A malformed rectangle is dropped, not fatal.
                    if let Err(e) = self.process_bitmap_rectangle(processor, update) {
                        warn!(error = %e.report(), "Invalid bitmap rectangle dropped");
                    }
                }
            }
            Ok(Some(FastPathUpdate::CachedBitmap(cached))) => {
                self.process_cached_bitmap(processor, &cached);
            }
            Ok(Some(FastPathUpdate::SurfaceCommands(commands))) => {
                trace!(commands = commands.len(), "Surface commands");

                for command in &commands {
                    self.process_surface_command(processor, command, output)?;
                }
            }
            Ok(None) => {
                debug!(code = ?update_pdu.update_code, "Unsupported FastPath update dropped");
            }
            Err(e) => {
                warn!(error = %e.report(), "Malformed FastPath update dropped");
            }
        }

        Ok(())
    }

    pub fn bitmap_cache_stats(&self) -> Vec<CacheStats> {
        self.bitmap_cache.stats()
    }

    fn process_bitmap_rectangle(
        &mut self,
        processor: &mut dyn BitmapProcessor,
        update: &BitmapData<'_>,
    ) -> SessionResult<()> {
        let dest_width = update.rectangle.width();
        let dest_height = update.rectangle.height();

        let (out_bpp, top_down) = if update.is_compressed() {
            if update.bits_per_pixel == 32 {
                // 32-bpp compressed rectangles use the RDP6 color-plane
                // stream, decoded to RGB24; planes are stored top-down.
                self.decode_buffer.clear();
                self.rdp6_decoder
                    .decode_bitmap_stream_to_rgb24(
                        update.bitmap_data,
                        &mut self.decode_buffer,
                        usize::from(update.width),
                        usize::from(update.height),
                    )
                    .map_err(|e| session_reason_err!("rdp6", "{e}"))?;

                (24u8, true)
            } else {
                rle::decompress(
                    update.bitmap_data,
                    &mut self.decode_buffer,
                    update.width,
                    update.height,
                    update.bits_per_pixel,
                )
                .map_err(|e| session_reason_err!("rle", "{e}"))?;

                (update.bits_per_pixel as u8, false)
            }
        } else {
            // Raw bitmaps: bottom-up, rows padded to four bytes.
            let row_bytes = usize::from(update.width) * bytes_per_pixel(update.bits_per_pixel);
            let stride = (row_bytes + 3) & !3;
            let expected = stride * usize::from(update.height);

            if update.bitmap_data.len() < expected {
                return Err(session_reason_err!(
                    "bitmap",
                    "raw bitmap too short: {} < {expected}",
                    update.bitmap_data.len()
                ));
            }

            self.decode_buffer.clear();
            self.decode_buffer.reserve(row_bytes * usize::from(update.height));
            for row in update.bitmap_data.chunks_exact(stride) {
                self.decode_buffer.extend_from_slice(&row[..row_bytes]);
            }

            (update.bits_per_pixel as u8, false)
        };

        let pixel_bytes = bytes_per_pixel(u16::from(out_bpp));
        let src_row_bytes = usize::from(update.width) * pixel_bytes;

        let mut bitmap = if top_down {
            core::mem::take(&mut self.decode_buffer)
        } else {
            flip_vertical(&self.decode_buffer, src_row_bytes)
        };

        // The destination rectangle is authoritative; crop the source down
        // to it when the advertised bitmap is larger.
        bitmap = crop(
            bitmap,
            src_row_bytes,
            usize::from(dest_width) * pixel_bytes,
            usize::from(update.height),
            usize::from(dest_height),
        );

        if let Some(placement) = update.cache_placement {
            self.bitmap_cache.insert(
                placement.cache_id,
                placement.cache_index,
                (placement.key1, placement.key2),
                CachedBitmap {
                    width: dest_width,
                    height: dest_height,
                    bpp: out_bpp,
                    data: bitmap.clone(),
                },
            );
        }

        processor.process_region(BitmapRegion {
            x: update.rectangle.left,
            y: update.rectangle.top,
            width: dest_width,
            height: dest_height,
            bpp: out_bpp,
            data: &bitmap,
        });

        // Reclaim the allocation for the next rectangle.
        self.decode_buffer = bitmap;

        Ok(())
    }

    fn process_cached_bitmap(&mut self, processor: &mut dyn BitmapProcessor, cached: &CachedBitmapUpdate) {
        match self
            .bitmap_cache
            .lookup(cached.cache_id, cached.cache_index, (cached.key1, cached.key2))
        {
            Some(entry) => {
                processor.process_region(BitmapRegion {
                    x: cached.dest_left,
                    y: cached.dest_top,
                    width: entry.width,
                    height: entry.height,
                    bpp: entry.bpp,
                    data: &entry.data,
                });
            }
            None => {
                // Recoverable: the server resends the bitmap on a miss.
                warn!(
                    cache_id = cached.cache_id,
                    cache_index = cached.cache_index,
                    key1 = format_args!("{:#010X}", cached.key1),
                    key2 = format_args!("{:#010X}", cached.key2),
                    "Bitmap cache miss, rectangle dropped"
                );
            }
        }
    }

    fn process_surface_command(
        &mut self,
        processor: &mut dyn BitmapProcessor,
        command: &SurfaceCommand<'_>,
        output: &mut WriteBuf,
    ) -> SessionResult<()> {
        match command {
            SurfaceCommand::SetSurfaceBits(bits) | SurfaceCommand::StreamSurfaceBits(bits) => {
                self.process_surface_bits(processor, bits);
            }
            SurfaceCommand::CreateSurface(create) => {
                trace!(surface_id = create.surface_id, "Create surface");

                let pixel_bytes = bytes_per_pixel(u16::from(create.pixel_format));
                self.offscreen.create(OffscreenSurface {
                    surface_id: create.surface_id,
                    width: create.width,
                    height: create.height,
                    bpp: create.pixel_format,
                    pixels: vec![0; usize::from(create.width) * usize::from(create.height) * pixel_bytes],
                });
            }
            SurfaceCommand::DeleteSurface(delete) => {
                trace!(surface_id = delete.surface_id, "Delete surface");

                if !self.offscreen.delete(delete.surface_id) {
                    warn!(surface_id = delete.surface_id, "Delete of an unknown offscreen surface");
                }
            }
            SurfaceCommand::SolidFill(fill) => {
                self.process_solid_fill(processor, fill);
            }
            SurfaceCommand::FrameMarker(marker) => {
                trace!(action = ?marker.frame_action, frame_id = marker.frame_id, "Frame marker");

                if marker.frame_action == FrameAction::End {
                    opalrdp_connector::envelopes::encode_share_data(
                        self.user_channel_id,
                        self.io_channel_id,
                        self.share_id,
                        ShareDataPdu::FrameAcknowledge(FrameAcknowledgePdu {
                            frame_id: marker.frame_id.unwrap_or(0),
                        }),
                        output,
                    )
                    .map_err(SessionError::connector)?;
                }
            }
        }

        Ok(())
    }

    fn process_surface_bits(&mut self, processor: &mut dyn BitmapProcessor, bits: &SurfaceBitsPdu<'_>) {
        let data = &bits.extended_bitmap_data;

        if data.codec_id != SURFACE_CODEC_NONE {
            warn!(codec_id = data.codec_id, "Surface bits with an unsupported codec dropped");
            return;
        }

        let pixel_bytes = bytes_per_pixel(u16::from(data.bpp));
        let src_row_bytes = usize::from(data.width) * pixel_bytes;

        if data.data.len() < src_row_bytes * usize::from(data.height) {
            warn!("Surface bits shorter than advertised, dropped");
            return;
        }

        let dest_width = bits.destination.width();
        let dest_height = bits.destination.height();

        let cropped = crop(
            data.data.to_vec(),
            src_row_bytes,
            usize::from(dest_width) * pixel_bytes,
            usize::from(data.height),
            usize::from(dest_height),
        );

        processor.process_region(BitmapRegion {
            x: bits.destination.left,
            y: bits.destination.top,
            width: dest_width,
            height: dest_height,
            bpp: data.bpp,
            data: &cropped,
        });
    }

    fn process_solid_fill(&mut self, processor: &mut dyn BitmapProcessor, fill: &opalrdp_pdu::surface_commands::SolidFillPdu) {
        if let Some(surface) = self.offscreen.get_mut(fill.surface_id) {
            if surface.width == 0 || surface.height == 0 {
                return;
            }

            let pixel_bytes = bytes_per_pixel(u16::from(surface.bpp));
            let pixel = &fill.color.to_le_bytes()[..pixel_bytes];
            let surface_width = usize::from(surface.width);

            for rectangle in &fill.rectangles {
                for y in rectangle.top..=rectangle.bottom.min(surface.height - 1) {
                    for x in rectangle.left..=rectangle.right.min(surface.width - 1) {
                        let offset = (usize::from(y) * surface_width + usize::from(x)) * pixel_bytes;
                        surface.pixels[offset..offset + pixel_bytes].copy_from_slice(pixel);
                    }
                }
            }
        } else {
            // Unregistered ids target the primary surface: emit filled
            // regions directly.
            for rectangle in &fill.rectangles {
                let width = rectangle.width();
                let height = rectangle.height();
                let pixel = fill.color.to_le_bytes();
                let filled: Vec<u8> = core::iter::repeat(&pixel[..3])
                    .take(usize::from(width) * usize::from(height))
                    .flatten()
                    .copied()
                    .collect();

                processor.process_region(BitmapRegion {
                    x: rectangle.left,
                    y: rectangle.top,
                    width,
                    height,
                    bpp: 24,
                    data: &filled,
                });
            }
        }
    }
}

fn bytes_per_pixel(bpp: u16) -> usize {
    match bpp {
        8 => 1,
        15 | 16 => 2,
        24 => 3,
        _ => 4,
    }
}

/// Reverses row order (the wire sends bitmaps bottom-up).
fn flip_vertical(data: &[u8], row_bytes: usize) -> Vec<u8> {
    if row_bytes == 0 {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(data.len());
    for row in data.chunks_exact(row_bytes).rev() {
        out.extend_from_slice(row);
    }
    out
}

/// Crops a top-down bitmap from `src_row_bytes` x `src_rows` down to
/// `dest_row_bytes` x `dest_rows`, top-left anchored. No-op when the source
/// already matches.
fn crop(data: Vec<u8>, src_row_bytes: usize, dest_row_bytes: usize, src_rows: usize, dest_rows: usize) -> Vec<u8> {
    if src_row_bytes == dest_row_bytes && src_rows == dest_rows {
        return data;
    }

    let mut out = Vec::with_capacity(dest_row_bytes * dest_rows);
    for row in data.chunks_exact(src_row_bytes).take(dest_rows) {
        out.extend_from_slice(&row[..dest_row_bytes.min(row.len())]);
    }
    out
}

/// FastPath update fragment reassembly (Single / First / Next / Last).
#[derive(Debug, PartialEq)]
struct CompleteData {
    fragmented_data: Option<Vec<u8>>,
}

impl CompleteData {
    fn new() -> Self {
        Self { fragmented_data: None }
    }

    fn process_data(&mut self, data: &[u8], fragmentation: Fragmentation) -> Option<Vec<u8>> {
        match fragmentation {
            Fragmentation::Single => {
                self.check_data_is_empty();

                Some(data.to_vec())
            }
            Fragmentation::First => {
                self.check_data_is_empty();

                self.fragmented_data = Some(data.to_vec());

                None
            }
            Fragmentation::Next => {
                self.append_data(data);

                None
            }
            Fragmentation::Last => {
                self.append_data(data);

                self.fragmented_data.take()
            }
        }
    }

    fn check_data_is_empty(&mut self) {
        if self.fragmented_data.is_some() {
            warn!("Skipping an incomplete fragmented FastPath update");
            self.fragmented_data = None;
        }
    }

    fn append_data(&mut self, data: &[u8]) {
        if let Some(fragmented_data) = self.fragmented_data.as_mut() {
            fragmented_data.extend_from_slice(data);
        } else {
            warn!("Fragmented FastPath continuation without a First fragment");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Collector {
        regions: Vec<(u16, u16, u16, u16, u8, Vec<u8>)>,
    }

    impl BitmapProcessor for Collector {
        fn process_region(&mut self, region: BitmapRegion<'_>) {
            self.regions
                .push((region.x, region.y, region.width, region.height, region.bpp, region.data.to_vec()));
        }
    }

    fn processor() -> Processor {
        ProcessorBuilder {
            user_channel_id: 1007,
            io_channel_id: 1003,
            share_id: 0x103EA,
            bitmap_cache_entries: [600, 300, 100],
        }
        .build()
    }

    fn bitmap_rect(placement: Option<opalrdp_pdu::bitmap::CachePlacement>) -> Vec<u8> {
        use opalrdp_core::encode_vec;
        use opalrdp_pdu::bitmap::Compression;
        use opalrdp_pdu::geometry::InclusiveRectangle;

        // 4x4, 8 bpp, raw (bottom-up, stride 4); distinct first/last rows.
        let mut data = vec![0x11u8; 16];
        data[..4].copy_from_slice(&[1, 2, 3, 4]); // bottom row on the wire

        let rect = BitmapData {
            rectangle: InclusiveRectangle {
                left: 10,
                top: 20,
                right: 13,
                bottom: 23,
            },
            width: 4,
            height: 4,
            bits_per_pixel: 8,
            compression_flags: Compression::NO_BITMAP_COMPRESSION_HDR,
            cache_placement: placement,
            bitmap_data: &data,
        };

        encode_vec(&rect).unwrap()
    }

    #[test]
    fn raw_bitmap_is_flipped_and_delivered() {
        let mut processor = processor();
        let mut collector = Collector::default();

        let encoded = bitmap_rect(None);
        let rect: BitmapData<'_> = opalrdp_core::decode(&encoded).unwrap();

        processor.process_bitmap_rectangle(&mut collector, &rect).unwrap();

        let (x, y, w, h, bpp, data) = &collector.regions[0];
        assert_eq!((*x, *y, *w, *h, *bpp), (10, 20, 4, 4, 8));
        // The wire bottom row must come out last.
        assert_eq!(&data[12..], &[1, 2, 3, 4]);
    }

    #[test]
    fn cached_rectangle_replays_identical_bytes() {
        let mut processor = processor();
        let mut collector = Collector::default();

        let placement = opalrdp_pdu::bitmap::CachePlacement {
            cache_id: 0,
            cache_index: 7,
            key1: 0xAABB_CCDD,
            key2: 0x1122_3344,
        };

        let encoded = bitmap_rect(Some(placement));
        let rect: BitmapData<'_> = opalrdp_core::decode(&encoded).unwrap();
        processor.process_bitmap_rectangle(&mut collector, &rect).unwrap();

        processor.process_cached_bitmap(
            &mut collector,
            &CachedBitmapUpdate {
                cache_id: 0,
                cache_index: 7,
                key1: 0xAABB_CCDD,
                key2: 0x1122_3344,
                dest_left: 10,
                dest_top: 20,
            },
        );

        assert_eq!(collector.regions.len(), 2);
        assert_eq!(collector.regions[0].5, collector.regions[1].5, "cache hit must be byte-identical");
        assert_eq!((collector.regions[1].0, collector.regions[1].1), (10, 20));

        let stats = processor.bitmap_cache_stats();
        assert_eq!(stats[0].hits, 1);
    }

    #[test]
    fn cache_miss_is_not_fatal() {
        let mut processor = processor();
        let mut collector = Collector::default();

        processor.process_cached_bitmap(
            &mut collector,
            &CachedBitmapUpdate {
                cache_id: 0,
                cache_index: 99,
                key1: 1,
                key2: 2,
                dest_left: 0,
                dest_top: 0,
            },
        );

        assert!(collector.regions.is_empty());
    }

    #[test]
    fn destination_rectangle_is_authoritative() {
        use opalrdp_pdu::bitmap::Compression;
        use opalrdp_pdu::geometry::InclusiveRectangle;

        let mut processor = processor();
        let mut collector = Collector::default();

        // Source 4x4, destination only 2x2.
        let data = vec![0x22u8; 16];
        let rect = BitmapData {
            rectangle: InclusiveRectangle {
                left: 0,
                top: 0,
                right: 1,
                bottom: 1,
            },
            width: 4,
            height: 4,
            bits_per_pixel: 8,
            compression_flags: Compression::NO_BITMAP_COMPRESSION_HDR,
            cache_placement: None,
            bitmap_data: &data,
        };

        processor.process_bitmap_rectangle(&mut collector, &rect).unwrap();

        let (_, _, w, h, _, data) = &collector.regions[0];
        assert_eq!((*w, *h), (2, 2));
        assert_eq!(data.len(), 4);
    }
}
