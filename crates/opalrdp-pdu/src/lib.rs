#![cfg_attr(doc, doc = include_str!("../README.md"))]

use opalrdp_core::{unexpected_message_type_err, DecodeResult};

pub mod bitmap;
pub mod fast_path;
pub mod gcc;
pub mod geometry;
pub mod input;
pub mod mcs;
pub mod nego;
pub mod rdp;
pub mod surface_commands;
pub mod tpdu;
pub mod tpkt;
pub mod utf16;
pub mod vc;
pub mod x224;

pub(crate) mod ber;
pub(crate) mod per;

/// What the low two bits of the first byte of a frame say about its framing.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum Action {
    FastPath = 0x00,
    X224 = 0x03,
}

impl Action {
    pub fn from_fp_output_header(first_byte: u8) -> Result<Self, u8> {
        match first_byte & 0b11 {
            0x00 => Ok(Self::FastPath),
            0x03 => Ok(Self::X224),
            other => Err(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PduInfo {
    pub action: Action,
    pub length: usize,
}

/// Determines the framing and total length of the next frame from its first
/// few bytes, without consuming anything.
///
/// `Ok(None)` means the answer needs more bytes than `bytes` holds.
pub fn find_size(bytes: &[u8]) -> DecodeResult<Option<PduInfo>> {
    let Some(&first) = bytes.first() else {
        return Ok(None);
    };

    let action =
        Action::from_fp_output_header(first).map_err(|bits| unexpected_message_type_err!(bits))?;

    let length = match action {
        Action::X224 => tpkt_frame_length(bytes),
        Action::FastPath => fast_path_frame_length(bytes),
    };

    Ok(length.map(|length| PduInfo { action, length }))
}

/// Total length of a TPKT frame, from the big-endian length field at
/// offset 2.
fn tpkt_frame_length(bytes: &[u8]) -> Option<usize> {
    if bytes.len() < tpkt::TpktHeader::SIZE {
        return None;
    }

    Some(usize::from(u16::from_be_bytes([bytes[2], bytes[3]])))
}

/// Total length of a FastPath frame: one or two length bytes follow the
/// header byte, with the high bit of the first selecting the long form.
fn fast_path_frame_length(bytes: &[u8]) -> Option<usize> {
    match *bytes.get(1)? {
        a if a & 0x80 != 0 => {
            let b = *bytes.get(2)?;
            Some((usize::from(a & 0x7F) << 8) | usize::from(b))
        }
        a => Some(usize::from(a)),
    }
}

/// Tells a transport how many bytes the next expected PDU occupies.
pub trait PduHint: Send + Sync + core::fmt::Debug + 'static {
    fn find_size(&self, bytes: &[u8]) -> DecodeResult<Option<usize>>;
}

opalrdp_core::assert_obj_safe!(PduHint);

/// Hint for phases that exchange X.224 (TPKT) frames only.
#[derive(Clone, Copy, Debug)]
pub struct X224Hint;

pub const X224_HINT: X224Hint = X224Hint;

impl PduHint for X224Hint {
    fn find_size(&self, bytes: &[u8]) -> DecodeResult<Option<usize>> {
        match find_size(bytes)? {
            Some(info) => {
                debug_assert_eq!(info.action, Action::X224);
                Ok(Some(info.length))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tpkt_frames_are_sized_from_the_header() {
        let frame = [0x03, 0x00, 0x01, 0x10, 0xAA];
        let info = find_size(&frame).unwrap().unwrap();
        assert_eq!(info.action, Action::X224);
        assert_eq!(info.length, 0x110);
    }

    #[test]
    fn fast_path_short_and_long_lengths() {
        let short = find_size(&[0x00, 0x7F]).unwrap().unwrap();
        assert_eq!(short.action, Action::FastPath);
        assert_eq!(short.length, 0x7F);

        let long = find_size(&[0x00, 0x81, 0x02]).unwrap().unwrap();
        assert_eq!(long.length, 0x102);
    }

    #[test]
    fn partial_headers_ask_for_more() {
        assert!(find_size(&[]).unwrap().is_none());
        assert!(find_size(&[0x03, 0x00]).unwrap().is_none());
        assert!(find_size(&[0x00, 0x80]).unwrap().is_none());
    }

    #[test]
    fn unknown_action_bits_are_rejected() {
        assert!(find_size(&[0x01, 0x00]).is_err());
    }
}
