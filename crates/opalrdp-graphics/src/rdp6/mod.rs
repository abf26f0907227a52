//! RDP 6.0 bitmap stream codec (color-plane encoding of [MS-RDPEGDI]),
//! decode side.

mod bitmap_stream;
mod rle;

pub use self::bitmap_stream::{BitmapDecodeError, BitmapStreamDecoder};
pub use self::rle::{decompress_8bpp_plane, PlaneRleError};
