//! RDP6_BITMAP_STREAM decoding ([MS-RDPEGDI] 2.2.2.5.1).
//!
//! The stream carries 8-bpp color planes (optionally RLE-compressed and
//! chroma-subsampled) preceded by a one-byte header:
//!
//! ```diagram
//! 7 6 5 4 3 2 1 0
//! ~~~ | | | ~~~~~
//!  |  | | |   +-- CLL (color loss level)
//!  |  | | +------ CS  (chroma subsampling)
//!  |  | +-------- RLE (planes are RLE-compressed)
//!  |  +---------- NA  (no alpha plane)
//!  +------------- reserved
//! ```
//!
//! CLL of zero selects raw RGB planes; a non-zero CLL selects AYCoCg with
//! chroma values shifted right by `CLL - 1` at encode time. Unlike the
//! interleaved RLE codec, the color planes are stored top-down.

use thiserror::Error;

use crate::rdp6::rle::{decompress_8bpp_plane, PlaneRleError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BitmapDecodeError {
    #[error("RDP6 bitmap stream is empty")]
    Empty,
    #[error("failed to decompress an RLE color plane: {0}")]
    Rle(#[from] PlaneRleError),
    #[error("color plane data is too short for the advertised image size")]
    InvalidUncompressedDataSize,
}

/// Decoder for RDP6 bitmap stream payloads, producing tightly packed RGB24.
///
/// Holds the plane scratch buffer across bitmaps to avoid reallocating for
/// every rectangle of a session.
#[derive(Debug, Default)]
pub struct BitmapStreamDecoder {
    planes_buffer: Vec<u8>,
}

struct Header {
    color_loss_level: u8,
    chroma_subsampling: bool,
    rle: bool,
    use_alpha: bool,
}

impl Header {
    fn parse(byte: u8) -> Self {
        Self {
            color_loss_level: byte & 0x07,
            chroma_subsampling: byte & 0x08 != 0,
            rle: byte & 0x10 != 0,
            use_alpha: byte & 0x20 == 0,
        }
    }
}

struct PlaneGeometry {
    width: usize,
    height: usize,
    chroma_width: usize,
    chroma_height: usize,
}

impl PlaneGeometry {
    fn new(width: usize, height: usize, subsampled: bool) -> Self {
        // Subsampled chroma planes are half-size, rounded up so odd edges
        // keep their single source column/row.
        let (chroma_width, chroma_height) = if subsampled {
            ((width + 1) / 2, (height + 1) / 2)
        } else {
            (width, height)
        };

        Self {
            width,
            height,
            chroma_width,
            chroma_height,
        }
    }

    fn full_plane_size(&self) -> usize {
        self.width * self.height
    }

    fn chroma_plane_size(&self) -> usize {
        self.chroma_width * self.chroma_height
    }

    fn planes_size(&self) -> usize {
        self.full_plane_size() + 2 * self.chroma_plane_size()
    }
}

impl BitmapStreamDecoder {
    /// Decodes `src` into `dst` as RGB24, top-down.
    pub fn decode_bitmap_stream_to_rgb24(
        &mut self,
        src: &[u8],
        dst: &mut Vec<u8>,
        image_width: usize,
        image_height: usize,
    ) -> Result<(), BitmapDecodeError> {
        let (header_byte, payload) = src.split_first().ok_or(BitmapDecodeError::Empty)?;
        let header = Header::parse(*header_byte);

        let geometry = PlaneGeometry::new(image_width, image_height, header.chroma_subsampling);

        self.planes_buffer.clear();
        self.planes_buffer.resize(geometry.planes_size(), 0);

        if header.rle {
            self.decompress_planes(payload, &header, &geometry)?;
        } else {
            self.copy_raw_planes(payload, &header, &geometry)?;
        }

        dst.reserve(geometry.full_plane_size() * 3);

        if header.color_loss_level == 0 {
            self.write_rgb_planes(dst, &geometry);
        } else {
            self.write_aycocg_planes(dst, &header, &geometry);
        }

        Ok(())
    }

    fn decompress_planes(
        &mut self,
        payload: &[u8],
        header: &Header,
        geometry: &PlaneGeometry,
    ) -> Result<(), BitmapDecodeError> {
        let mut offset = 0;

        if header.use_alpha {
            // The alpha plane is decoded only to advance the stream.
            let mut discard = vec![0; geometry.full_plane_size()];
            offset += decompress_8bpp_plane(payload, &mut discard, geometry.width, geometry.height)?;
        }

        let full = geometry.full_plane_size();
        let chroma = geometry.chroma_plane_size();

        let (luma_plane, chroma_planes) = self.planes_buffer.split_at_mut(full);
        let (co_plane, cg_plane) = chroma_planes.split_at_mut(chroma);

        offset += decompress_8bpp_plane(&payload[offset..], luma_plane, geometry.width, geometry.height)?;
        offset += decompress_8bpp_plane(&payload[offset..], co_plane, geometry.chroma_width, geometry.chroma_height)?;
        decompress_8bpp_plane(&payload[offset..], cg_plane, geometry.chroma_width, geometry.chroma_height)?;

        Ok(())
    }

    fn copy_raw_planes(
        &mut self,
        payload: &[u8],
        header: &Header,
        geometry: &PlaneGeometry,
    ) -> Result<(), BitmapDecodeError> {
        let alpha_size = if header.use_alpha { geometry.full_plane_size() } else { 0 };

        let expected = alpha_size + geometry.planes_size();
        if payload.len() < expected {
            return Err(BitmapDecodeError::InvalidUncompressedDataSize);
        }

        self.planes_buffer
            .copy_from_slice(&payload[alpha_size..alpha_size + geometry.planes_size()]);

        Ok(())
    }

    fn write_rgb_planes(&self, dst: &mut Vec<u8>, geometry: &PlaneGeometry) {
        let full = geometry.full_plane_size();

        let r_plane = &self.planes_buffer[..full];
        let g_plane = &self.planes_buffer[full..full * 2];
        let b_plane = &self.planes_buffer[full * 2..full * 3];

        for i in 0..full {
            dst.extend_from_slice(&[r_plane[i], g_plane[i], b_plane[i]]);
        }
    }

    fn write_aycocg_planes(&self, dst: &mut Vec<u8>, header: &Header, geometry: &PlaneGeometry) {
        let chroma_shift = u32::from(header.color_loss_level - 1);
        let sample_shift = usize::from(header.chroma_subsampling);

        let full = geometry.full_plane_size();
        let chroma = geometry.chroma_plane_size();

        let y_plane = &self.planes_buffer[..full];
        let co_plane = &self.planes_buffer[full..full + chroma];
        let cg_plane = &self.planes_buffer[full + chroma..full + chroma * 2];

        for (idx, y) in y_plane.iter().copied().enumerate() {
            // Supersample by index mapping: each chroma sample covers a
            // 2x2 block when subsampling is on.
            let chroma_row = (idx / geometry.width) >> sample_shift;
            let chroma_col = (idx % geometry.width) >> sample_shift;
            let chroma_idx = chroma_row * geometry.chroma_width + chroma_col;

            let co = i16::from((co_plane[chroma_idx] << chroma_shift) as i8);
            let cg = i16::from((cg_plane[chroma_idx] << chroma_shift) as i8);

            let (r, g, b) = ycocg_to_rgb(i16::from(y), co, cg);

            // R and B are swapped on the wire when no alpha plane is present
            // (3.1.9.1.2 of [MS-RDPEGDI]).
            if header.use_alpha {
                dst.extend_from_slice(&[r, g, b]);
            } else {
                dst.extend_from_slice(&[b, g, r]);
            }
        }
    }
}

fn ycocg_to_rgb(y: i16, co: i16, cg: i16) -> (u8, u8, u8) {
    let clamp = |v: i16| v.clamp(0, 255) as u8;

    let r = clamp(y + co - cg);
    let g = clamp(y + cg);
    let b = clamp(y - co - cg);

    (r, g, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_rgb_planes_are_interleaved() {
        // Header: CLL=0, no CS, no RLE, NA set (0x20); 2x1 image.
        let src = [
            0x20, // header
            10, 11, // R plane
            20, 21, // G plane
            30, 31, // B plane
        ];

        let mut decoder = BitmapStreamDecoder::default();
        let mut dst = Vec::new();
        decoder.decode_bitmap_stream_to_rgb24(&src, &mut dst, 2, 1).unwrap();

        assert_eq!(dst, vec![10, 20, 30, 11, 21, 31]);
    }

    #[test]
    fn truncated_raw_planes_are_rejected() {
        let src = [0x20, 1, 2, 3];

        let mut decoder = BitmapStreamDecoder::default();
        let mut dst = Vec::new();
        let result = decoder.decode_bitmap_stream_to_rgb24(&src, &mut dst, 2, 1);

        assert_eq!(result, Err(BitmapDecodeError::InvalidUncompressedDataSize));
    }

    #[test]
    fn ycocg_identity_for_grey() {
        // Co = Cg = 0 must decode to R = G = B = Y.
        assert_eq!(ycocg_to_rgb(128, 0, 0), (128, 128, 128));
        assert_eq!(ycocg_to_rgb(300, 0, 0), (255, 255, 255));
    }
}
