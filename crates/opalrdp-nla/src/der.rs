//! The DER subset needed for CredSSP TSRequest structures: definite-length
//! sequences, context tags, octet strings and small integers. Shaped after
//! the BER module of the MCS layer, with DER's minimal length encoding.

use opalrdp_core::{ensure_size, invalid_field_err, DecodeResult, EncodeResult, ReadCursor, WriteCursor};

const TAG_INTEGER: u8 = 0x02;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_CONTEXT: u8 = 0xA0;

pub(crate) fn sizeof_length(length: usize) -> usize {
    if length < 0x80 {
        1
    } else if length <= 0xFF {
        2
    } else if length <= 0xFFFF {
        3
    } else {
        5
    }
}

pub(crate) fn write_length(dst: &mut WriteCursor<'_>, length: usize) -> EncodeResult<()> {
    ensure_size!(ctx: "der::write_length", in: dst, size: sizeof_length(length));

    if length < 0x80 {
        dst.write_u8(length as u8);
    } else if length <= 0xFF {
        dst.write_u8(0x81);
        dst.write_u8(length as u8);
    } else if length <= 0xFFFF {
        dst.write_u8(0x82);
        dst.write_u16_be(length as u16);
    } else {
        dst.write_u8(0x84);
        dst.write_u32_be(length as u32);
    }

    Ok(())
}

pub(crate) fn read_length(src: &mut ReadCursor<'_>) -> DecodeResult<usize> {
    let ctx = "der::read_length";

    ensure_size!(ctx: ctx, in: src, size: 1);
    let first = src.read_u8();

    if first & 0x80 == 0 {
        return Ok(usize::from(first));
    }

    let count = usize::from(first & 0x7F);
    if count == 0 || count > 4 {
        return Err(invalid_field_err(ctx, "length", "unsupported DER length form"));
    }

    ensure_size!(ctx: ctx, in: src, size: count);
    let mut length = 0usize;
    for _ in 0..count {
        length = (length << 8) | usize::from(src.read_u8());
    }

    Ok(length)
}

pub(crate) fn sizeof_tagged(inner: usize) -> usize {
    1 + sizeof_length(inner) + inner
}

pub(crate) fn write_sequence_tag(dst: &mut WriteCursor<'_>, inner_length: usize) -> EncodeResult<()> {
    ensure_size!(ctx: "der::write_sequence_tag", in: dst, size: 1);
    dst.write_u8(TAG_SEQUENCE);
    write_length(dst, inner_length)
}

pub(crate) fn read_sequence_tag(src: &mut ReadCursor<'_>) -> DecodeResult<usize> {
    expect_tag(src, TAG_SEQUENCE, "SEQUENCE")
}

pub(crate) fn write_context_tag(dst: &mut WriteCursor<'_>, tagnum: u8, inner_length: usize) -> EncodeResult<()> {
    ensure_size!(ctx: "der::write_context_tag", in: dst, size: 1);
    dst.write_u8(TAG_CONTEXT | tagnum);
    write_length(dst, inner_length)
}

pub(crate) fn read_context_tag(src: &mut ReadCursor<'_>, tagnum: u8) -> DecodeResult<usize> {
    expect_tag(src, TAG_CONTEXT | tagnum, "context tag")
}

/// Peeks at the next tag byte, if any.
pub(crate) fn peek_tag(src: &mut ReadCursor<'_>) -> Option<u8> {
    src.try_peek_u8().ok()
}

fn expect_tag(src: &mut ReadCursor<'_>, expected: u8, what: &'static str) -> DecodeResult<usize> {
    let ctx = "der::expect_tag";

    ensure_size!(ctx: ctx, in: src, size: 1);
    let tag = src.read_u8();

    if tag != expected {
        return Err(invalid_field_err(ctx, "tag", what));
    }

    read_length(src)
}

pub(crate) fn sizeof_octet_string(length: usize) -> usize {
    sizeof_tagged(length)
}

/// Writes just the OCTET STRING tag and length; the caller emits the content.
pub(crate) fn write_octet_string_header(dst: &mut WriteCursor<'_>, length: usize) -> EncodeResult<()> {
    ensure_size!(ctx: "der::write_octet_string_header", in: dst, size: 1);
    dst.write_u8(TAG_OCTET_STRING);
    write_length(dst, length)
}

pub(crate) fn write_octet_string(dst: &mut WriteCursor<'_>, value: &[u8]) -> EncodeResult<()> {
    ensure_size!(ctx: "der::write_octet_string", in: dst, size: 1);
    dst.write_u8(TAG_OCTET_STRING);
    write_length(dst, value.len())?;
    ensure_size!(ctx: "der::write_octet_string", in: dst, size: value.len());
    dst.write_slice(value);
    Ok(())
}

pub(crate) fn read_octet_string(src: &mut ReadCursor<'_>) -> DecodeResult<Vec<u8>> {
    let length = expect_tag(src, TAG_OCTET_STRING, "OCTET STRING")?;
    ensure_size!(ctx: "der::read_octet_string", in: src, size: length);
    Ok(src.read_slice(length).to_vec())
}

pub(crate) fn sizeof_integer(value: u32) -> usize {
    1 + 1 + integer_content_length(value)
}

fn integer_content_length(value: u32) -> usize {
    // One content octet per 7 leading-zero-free bits, plus a sign octet when
    // the top bit of the first content octet would be set.
    match value {
        0..=0x7F => 1,
        0x80..=0x7FFF => 2,
        0x8000..=0x7F_FFFF => 3,
        0x80_0000..=0x7FFF_FFFF => 4,
        _ => 5,
    }
}

pub(crate) fn write_integer(dst: &mut WriteCursor<'_>, value: u32) -> EncodeResult<()> {
    let content = integer_content_length(value);

    ensure_size!(ctx: "der::write_integer", in: dst, size: 2 + content);

    dst.write_u8(TAG_INTEGER);
    dst.write_u8(content as u8);

    for i in (0..content).rev() {
        dst.write_u8((u64::from(value) >> (8 * i)) as u8);
    }

    Ok(())
}

pub(crate) fn read_integer(src: &mut ReadCursor<'_>) -> DecodeResult<u32> {
    let length = expect_tag(src, TAG_INTEGER, "INTEGER")?;

    if length == 0 || length > 5 {
        return Err(invalid_field_err("der::read_integer", "length", "invalid integer length"));
    }

    ensure_size!(ctx: "der::read_integer", in: src, size: length);

    let mut value = 0u64;
    for _ in 0..length {
        value = (value << 8) | u64::from(src.read_u8());
    }

    Ok(value as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_forms() {
        for (length, expected) in [(0x7F, vec![0x7F]), (0x80, vec![0x81, 0x80]), (0x1234, vec![0x82, 0x12, 0x34])] {
            let mut buf = vec![0u8; expected.len()];
            write_length(&mut WriteCursor::new(&mut buf), length).unwrap();
            assert_eq!(buf, expected);

            let read = read_length(&mut ReadCursor::new(&buf)).unwrap();
            assert_eq!(read, length);
        }
    }

    #[test]
    fn integer_gets_sign_octet() {
        // 0x82 would look negative without the leading zero octet.
        let mut buf = [0u8; 4];
        write_integer(&mut WriteCursor::new(&mut buf), 0x82).unwrap();
        assert_eq!(buf, [0x02, 0x02, 0x00, 0x82]);

        assert_eq!(read_integer(&mut ReadCursor::new(&buf)).unwrap(), 0x82);
    }

    #[test]
    fn octet_string_round_trip() {
        let mut buf = vec![0u8; sizeof_octet_string(3)];
        write_octet_string(&mut WriteCursor::new(&mut buf), &[1, 2, 3]).unwrap();

        let read = read_octet_string(&mut ReadCursor::new(&buf)).unwrap();
        assert_eq!(read, vec![1, 2, 3]);
    }
}
