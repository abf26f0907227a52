//! Per-plane RLE decompression for the RDP6 bitmap stream
//! ([MS-RDPEGDI] 2.2.2.5.1.1).
//!
//! Every scanline is encoded independently as segments of raw bytes followed
//! by a run of the last raw byte; scanlines after the first carry vertical
//! deltas rather than values.

use thiserror::Error;

/// Maximum decoded segment size: two special run modes top out at
/// 32 + 15 bytes, regular segments at 15 raw + 15 run.
const MAX_SEGMENT_SIZE: usize = 47;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlaneRleError {
    #[error("RLE plane data is truncated")]
    Truncated,
    #[error("invalid RLE segment control byte")]
    InvalidSegmentHeader,
    #[error("decoded segment overruns its scanline")]
    SegmentOverrunsScanline,
}

struct SegmentDecoder {
    last_byte: u8,
    buffer: [u8; MAX_SEGMENT_SIZE],
    len: usize,
}

impl SegmentDecoder {
    fn new() -> Self {
        Self {
            last_byte: 0,
            buffer: [0; MAX_SEGMENT_SIZE],
            len: 0,
        }
    }

    /// Decodes one segment out of `src`, returning how many input bytes were
    /// consumed. The decoded bytes sit in `self.buffer[..self.len]`.
    fn next_segment(&mut self, src: &[u8]) -> Result<usize, PlaneRleError> {
        let control = *src.first().ok_or(PlaneRleError::Truncated)?;

        if control == 0 {
            return Err(PlaneRleError::InvalidSegmentHeader);
        }

        let run_field = usize::from(control & 0x0F);
        let raw_field = usize::from(control >> 4);

        // Run fields of 1 and 2 are length extensions, not real runs.
        let (run_length, raw_count) = match run_field {
            1 => (16 + raw_field, 0),
            2 => (32 + raw_field, 0),
            _ => (run_field, raw_field),
        };

        if src.len() < 1 + raw_count {
            return Err(PlaneRleError::Truncated);
        }

        self.buffer[..raw_count].copy_from_slice(&src[1..1 + raw_count]);

        if raw_count > 0 {
            self.last_byte = self.buffer[raw_count - 1];
        }

        self.len = raw_count + run_length;
        self.buffer[raw_count..self.len].fill(self.last_byte);

        Ok(1 + raw_count)
    }
}

fn decode_scanline(decoder: &mut SegmentDecoder, src: &[u8], dst: &mut [u8]) -> Result<usize, PlaneRleError> {
    let width = dst.len();
    let mut decoded = 0;
    let mut read = 0;

    decoder.last_byte = 0;

    while decoded < width {
        read += decoder.next_segment(&src[read.min(src.len())..])?;

        if decoded + decoder.len > width {
            return Err(PlaneRleError::SegmentOverrunsScanline);
        }

        dst[decoded..decoded + decoder.len].copy_from_slice(&decoder.buffer[..decoder.len]);
        decoded += decoder.len;
    }

    Ok(read)
}

/// Undoes the vertical delta transformation of [MS-RDPEGDI] 3.1.9.2.3:
/// an odd encoded byte `e` is the negative delta `-(e + 1) / 2`, an even one
/// the positive delta `e / 2`, relative to the byte above.
fn resolve_scanline_delta(prev_line: &[u8], current: &mut [u8]) {
    for (dst, above) in current.iter_mut().zip(prev_line.iter()) {
        let encoded = *dst;

        let delta = if encoded % 2 == 1 {
            255u8.wrapping_sub((encoded.wrapping_sub(1)) >> 1)
        } else {
            encoded >> 1
        };

        *dst = above.wrapping_add(delta);
    }
}

/// Decompresses one 8-bpp color plane of `width * height` bytes into `dst`.
///
/// Returns the number of bytes consumed from `src`, so the caller can locate
/// the next plane.
pub fn decompress_8bpp_plane(src: &[u8], dst: &mut [u8], width: usize, height: usize) -> Result<usize, PlaneRleError> {
    debug_assert!(dst.len() >= width * height);

    let mut decoder = SegmentDecoder::new();
    let mut read = 0;

    read += decode_scanline(&mut decoder, src, &mut dst[..width])?;

    for row in 1..height {
        let (prev, rest) = dst[(row - 1) * width..].split_at_mut(width);
        let current = &mut rest[..width];

        read += decode_scanline(&mut decoder, &src[read..], current)?;
        resolve_scanline_delta(prev, current);
    }

    Ok(read)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_segment_is_copied() {
        // control 0x40: 4 raw bytes, no run
        let src = [0x40, 1, 2, 3, 4];
        let mut dst = [0u8; 4];

        let read = decompress_8bpp_plane(&src, &mut dst, 4, 1).unwrap();
        assert_eq!(read, 5);
        assert_eq!(dst, [1, 2, 3, 4]);
    }

    #[test]
    fn run_repeats_last_raw_byte() {
        // control 0x13: 1 raw byte, run of 3
        let src = [0x13, 9];
        let mut dst = [0u8; 4];

        decompress_8bpp_plane(&src, &mut dst, 4, 1).unwrap();
        assert_eq!(dst, [9, 9, 9, 9]);
    }

    #[test]
    fn second_scanline_applies_deltas() {
        // Line 1: raw [10, 10]; line 2: deltas [2, 3] -> +1, -2
        let src = [0x20, 10, 10, 0x20, 2, 3];
        let mut dst = [0u8; 4];

        decompress_8bpp_plane(&src, &mut dst, 2, 2).unwrap();
        assert_eq!(dst, [10, 10, 11, 8]);
    }

    #[test]
    fn run_at_scanline_start_repeats_zero() {
        // control 0x03: no raw bytes, run of 3 -> last byte resets to 0 per line
        let src = [0x03];
        let mut dst = [0u8; 3];

        decompress_8bpp_plane(&src, &mut dst, 3, 1).unwrap();
        assert_eq!(dst, [0, 0, 0]);
    }

    #[test]
    fn overrunning_segment_is_rejected() {
        let src = [0x40, 1, 2, 3, 4];
        let mut dst = [0u8; 2];

        let result = decompress_8bpp_plane(&src, &mut dst, 2, 1);
        assert_eq!(result, Err(PlaneRleError::SegmentOverrunsScanline));
    }
}
