//! TPKT + TPDU framing glue.
//!
//! A type that models the body of one X.224 message implements [`X224Pdu`];
//! wrapping a value in [`X224`] turns it into a full on-wire frame.

use std::borrow::Cow;

use opalrdp_core::{
    cast_length, ensure_size, invalid_field_err, unexpected_message_type_err, Decode, DecodeResult, Encode,
    EncodeResult, ReadCursor, WriteCursor,
};

use crate::tpdu::{TpduCode, TpduHeader};
use crate::tpkt::TpktHeader;

/// Number of user-data bytes following a TPDU header, derived from the TPKT
/// length.
pub fn payload_length(tpkt: &TpktHeader, tpdu: &TpduHeader) -> usize {
    tpkt.packet_length() - TpktHeader::SIZE - tpdu.size()
}

/// Body of an X.224 message of a fixed TPDU code.
pub trait X224Pdu<'de>: Sized {
    const X224_NAME: &'static str;

    const TPDU_CODE: TpduCode;

    fn x224_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()>;

    fn x224_body_decode(src: &mut ReadCursor<'de>, tpkt: &TpktHeader, tpdu: &TpduHeader) -> DecodeResult<Self>;

    /// Bytes this body contributes to the TPDU header's variable part
    /// (counted by LI).
    fn tpdu_header_variable_part_size(&self) -> usize;

    /// Bytes this body contributes after the TPDU header (not counted by LI).
    fn tpdu_user_data_size(&self) -> usize;
}

/// Frames an [`X224Pdu`] body with its TPKT and TPDU headers.
///
/// Encoding `X224(body)` emits the whole frame; decoding yields the body
/// back in field `.0`.
pub struct X224<T>(pub T);

impl<'de, T> Encode for X224<T>
where
    T: X224Pdu<'de>,
{
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        let frame_length = self.size();
        ensure_size!(ctx: T::X224_NAME, in: dst, size: frame_length);

        let header_length = T::TPDU_CODE.fixed_header_len() + self.0.tpdu_header_variable_part_size();

        let tpkt = TpktHeader {
            packet_length: cast_length!(T::X224_NAME, "length", frame_length)?,
        };
        let tpdu = TpduHeader {
            li: cast_length!(T::X224_NAME, "li", header_length - 1)?,
            code: T::TPDU_CODE,
        };

        tpkt.write(dst)?;
        tpdu.write(dst)?;
        self.0.x224_body_encode(dst)
    }

    fn name(&self) -> &'static str {
        T::X224_NAME
    }

    fn size(&self) -> usize {
        TpktHeader::SIZE
            + T::TPDU_CODE.fixed_header_len()
            + self.0.tpdu_header_variable_part_size()
            + self.0.tpdu_user_data_size()
    }
}

impl<'de, T> Decode<'de> for X224<T>
where
    T: X224Pdu<'de>,
{
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        let tpkt = TpktHeader::read(src)?;
        ensure_size!(ctx: T::X224_NAME, in: src, size: tpkt.packet_length().saturating_sub(TpktHeader::SIZE));

        let tpdu = TpduHeader::read(src, &tpkt)?;

        if tpdu.code != T::TPDU_CODE {
            return Err(unexpected_message_type_err!(tpdu.code.as_u8()));
        }

        if tpdu.size() < tpdu.fixed_part_size() {
            return Err(invalid_field_err!("li", "shorter than the fixed header part"));
        }

        T::x224_body_decode(src, &tpkt, &tpdu).map(X224)
    }
}

/// An X.224 Data TPDU with an opaque payload, for layers that do their own
/// body framing (MCS Connect, CredSSP relaying and the like).
pub struct X224Data<'a> {
    pub data: Cow<'a, [u8]>,
}

impl<'de> X224Pdu<'de> for X224Data<'de> {
    const X224_NAME: &'static str = "X.224 Data";

    const TPDU_CODE: TpduCode = TpduCode::Data;

    fn x224_body_encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(ctx: Self::X224_NAME, in: dst, size: self.data.len());
        dst.write_slice(&self.data);
        Ok(())
    }

    fn x224_body_decode(src: &mut ReadCursor<'de>, tpkt: &TpktHeader, tpdu: &TpduHeader) -> DecodeResult<Self> {
        let length = payload_length(tpkt, tpdu);
        ensure_size!(ctx: Self::X224_NAME, in: src, size: length);

        Ok(Self {
            data: Cow::Borrowed(src.read_slice(length)),
        })
    }

    fn tpdu_header_variable_part_size(&self) -> usize {
        0
    }

    fn tpdu_user_data_size(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use opalrdp_core::{decode, encode_vec};

    use super::*;

    #[test]
    fn data_frame_round_trip() {
        let frame = encode_vec(&X224(X224Data {
            data: Cow::Borrowed(&[0xDE, 0xAD]),
        }))
        .unwrap();

        assert_eq!(frame, [0x03, 0x00, 0x00, 0x09, 0x02, 0xF0, 0x80, 0xDE, 0xAD]);

        let parsed: X224<X224Data<'_>> = decode(&frame).unwrap();
        assert_eq!(parsed.0.data.as_ref(), [0xDE, 0xAD]);
    }

    #[test]
    fn wrong_tpdu_code_is_rejected() {
        // A Connection Confirm frame fed to the Data decoder.
        let frame = [0x03, 0x00, 0x00, 0x0B, 0x06, 0xD0, 0x00, 0x00, 0x00, 0x00, 0x00];
        assert!(decode::<X224<X224Data<'_>>>(&frame).is_err());
    }
}
