//! The tiny subset of BER needed by the MCS Connect-Initial / Connect-Response
//! exchange (T.125).

use opalrdp_core::{
    ensure_size, invalid_field_err, DecodeResult, EncodeResult, ReadCursor, WriteCursor,
};

#[repr(u8)]
#[allow(unused)]
pub(crate) enum Pc {
    Primitive = 0x00,
    Construct = 0x20,
}

#[repr(u8)]
#[allow(unused)]
enum Class {
    Universal = 0x00,
    Application = 0x40,
    ContextSpecific = 0x80,
    Private = 0xC0,
}

#[repr(u8)]
enum Tag {
    Boolean = 0x01,
    Integer = 0x02,
    OctetString = 0x04,
    Enumerated = 0x0A,
    Sequence = 0x10,
}

pub(crate) const SIZEOF_ENUMERATED: usize = 3;
pub(crate) const SIZEOF_BOOL: usize = 3;

const TAG_MASK: u8 = 0x1F;

pub(crate) fn sizeof_application_tag(tagnum: u8, length: u16) -> usize {
    let tag_len = if tagnum > 0x1E { 2 } else { 1 };

    sizeof_length(length) + tag_len
}

pub(crate) fn sizeof_sequence_tag(length: u16) -> usize {
    1 + sizeof_length(length)
}

pub(crate) fn sizeof_octet_string(length: u16) -> usize {
    1 + sizeof_length(length) + usize::from(length)
}

pub(crate) fn sizeof_integer(value: u32) -> usize {
    if value < 0x0000_0080 {
        3
    } else if value < 0x0000_8000 {
        4
    } else if value < 0x0080_0000 {
        5
    } else {
        6
    }
}

pub(crate) fn write_sequence_tag(dst: &mut WriteCursor<'_>, length: u16) -> EncodeResult<usize> {
    write_universal_tag(dst, Tag::Sequence, Pc::Construct)?;

    write_length(dst, length).map(|length| length + 1)
}

pub(crate) fn read_sequence_tag(src: &mut ReadCursor<'_>) -> DecodeResult<u16> {
    ensure_size!(ctx: "ber::read_sequence_tag", in: src, size: 1);
    let identifier = src.read_u8();

    if identifier != Class::Universal as u8 | Pc::Construct as u8 | (TAG_MASK & Tag::Sequence as u8) {
        Err(invalid_field_err!("identifier", "invalid sequence tag identifier"))
    } else {
        read_length(src)
    }
}

pub(crate) fn write_application_tag(dst: &mut WriteCursor<'_>, tagnum: u8, length: u16) -> EncodeResult<usize> {
    ensure_size!(ctx: "ber::write_application_tag", in: dst, size: sizeof_application_tag(tagnum, length));

    let taglen = if tagnum > 0x1E {
        dst.write_u8(Class::Application as u8 | Pc::Construct as u8 | TAG_MASK);
        dst.write_u8(tagnum);
        2
    } else {
        dst.write_u8(Class::Application as u8 | Pc::Construct as u8 | (TAG_MASK & tagnum));
        1
    };

    write_length(dst, length).map(|length| length + taglen)
}

pub(crate) fn read_application_tag(src: &mut ReadCursor<'_>, tagnum: u8) -> DecodeResult<u16> {
    let ctx = "ber::read_application_tag";

    ensure_size!(ctx: ctx, in: src, size: 1);
    let identifier = src.read_u8();

    if tagnum > 0x1E {
        if identifier != Class::Application as u8 | Pc::Construct as u8 | TAG_MASK {
            return Err(invalid_field_err(ctx, "identifier", "invalid long application tag"));
        }

        ensure_size!(ctx: ctx, in: src, size: 1);
        if src.read_u8() != tagnum {
            return Err(invalid_field_err(ctx, "tagnum", "unexpected application tag number"));
        }
    } else if identifier != Class::Application as u8 | Pc::Construct as u8 | (TAG_MASK & tagnum) {
        return Err(invalid_field_err(ctx, "identifier", "invalid short application tag"));
    }

    read_length(src)
}

pub(crate) fn write_enumerated(dst: &mut WriteCursor<'_>, enumerated: u8) -> EncodeResult<usize> {
    let mut size = write_universal_tag(dst, Tag::Enumerated, Pc::Primitive)?;
    size += write_length(dst, 1)?;

    ensure_size!(ctx: "ber::write_enumerated", in: dst, size: 1);
    dst.write_u8(enumerated);

    Ok(size + 1)
}

pub(crate) fn read_enumerated(src: &mut ReadCursor<'_>, count: u8) -> DecodeResult<u8> {
    let ctx = "ber::read_enumerated";

    read_universal_tag(src, Tag::Enumerated, Pc::Primitive)?;

    let length = read_length(src)?;
    if length != 1 {
        return Err(invalid_field_err(ctx, "length", "invalid enumerated length"));
    }

    ensure_size!(ctx: ctx, in: src, size: 1);
    let enumerated = src.read_u8();

    if enumerated == u8::MAX || enumerated + 1 > count {
        return Err(invalid_field_err(ctx, "enumerated", "invalid enumerated value"));
    }

    Ok(enumerated)
}

pub(crate) fn write_integer(dst: &mut WriteCursor<'_>, value: u32) -> EncodeResult<usize> {
    write_universal_tag(dst, Tag::Integer, Pc::Primitive)?;

    ensure_size!(ctx: "ber::write_integer", in: dst, size: sizeof_integer(value) - 1);

    if value < 0x0000_0080 {
        write_length(dst, 1)?;
        dst.write_u8(value as u8);
        Ok(3)
    } else if value < 0x0000_8000 {
        write_length(dst, 2)?;
        dst.write_u16_be(value as u16);
        Ok(4)
    } else if value < 0x0080_0000 {
        write_length(dst, 3)?;
        dst.write_u8((value >> 16) as u8);
        dst.write_u16_be((value & 0xFFFF) as u16);
        Ok(5)
    } else {
        write_length(dst, 4)?;
        dst.write_u32_be(value);
        Ok(6)
    }
}

pub(crate) fn read_integer(src: &mut ReadCursor<'_>) -> DecodeResult<u64> {
    let ctx = "ber::read_integer";

    read_universal_tag(src, Tag::Integer, Pc::Primitive)?;

    let length = usize::from(read_length(src)?);

    ensure_size!(ctx: ctx, in: src, size: length);

    match length {
        1 => Ok(u64::from(src.read_u8())),
        2 => Ok(u64::from(src.read_u16_be())),
        3 => {
            let hi = src.read_u8();
            let lo = src.read_u16_be();
            Ok((u64::from(hi) << 16) + u64::from(lo))
        }
        4 => Ok(u64::from(src.read_u32_be())),
        8 => Ok(src.read_u64_be()),
        _ => Err(invalid_field_err(ctx, "length", "invalid integer length")),
    }
}

pub(crate) fn write_bool(dst: &mut WriteCursor<'_>, value: bool) -> EncodeResult<usize> {
    let mut size = write_universal_tag(dst, Tag::Boolean, Pc::Primitive)?;
    size += write_length(dst, 1)?;

    ensure_size!(ctx: "ber::write_bool", in: dst, size: 1);
    dst.write_u8(if value { 0xFF } else { 0x00 });

    Ok(size + 1)
}

pub(crate) fn read_bool(src: &mut ReadCursor<'_>) -> DecodeResult<bool> {
    let ctx = "ber::read_bool";

    read_universal_tag(src, Tag::Boolean, Pc::Primitive)?;
    let length = read_length(src)?;

    if length != 1 {
        return Err(invalid_field_err(ctx, "length", "invalid boolean length"));
    }

    ensure_size!(ctx: ctx, in: src, size: 1);
    Ok(src.read_u8() != 0)
}

pub(crate) fn write_octet_string(dst: &mut WriteCursor<'_>, value: &[u8]) -> EncodeResult<usize> {
    let tag_size = write_octet_string_tag(dst, value.len() as u16)?;

    ensure_size!(ctx: "ber::write_octet_string", in: dst, size: value.len());
    dst.write_slice(value);

    Ok(tag_size + value.len())
}

pub(crate) fn write_octet_string_tag(dst: &mut WriteCursor<'_>, length: u16) -> EncodeResult<usize> {
    write_universal_tag(dst, Tag::OctetString, Pc::Primitive)?;
    write_length(dst, length).map(|length| length + 1)
}

pub(crate) fn read_octet_string(src: &mut ReadCursor<'_>) -> DecodeResult<Vec<u8>> {
    let length = usize::from(read_octet_string_tag(src)?);

    ensure_size!(ctx: "ber::read_octet_string", in: src, size: length);
    Ok(src.read_slice(length).to_vec())
}

pub(crate) fn read_octet_string_tag(src: &mut ReadCursor<'_>) -> DecodeResult<u16> {
    read_universal_tag(src, Tag::OctetString, Pc::Primitive)?;
    read_length(src)
}

fn write_universal_tag(dst: &mut WriteCursor<'_>, tag: Tag, pc: Pc) -> EncodeResult<usize> {
    ensure_size!(ctx: "ber::write_universal_tag", in: dst, size: 1);

    let identifier = Class::Universal as u8 | pc as u8 | (TAG_MASK & tag as u8);
    dst.write_u8(identifier);

    Ok(1)
}

fn read_universal_tag(src: &mut ReadCursor<'_>, tag: Tag, pc: Pc) -> DecodeResult<()> {
    ensure_size!(ctx: "ber::read_universal_tag", in: src, size: 1);

    let identifier = src.read_u8();

    if identifier != Class::Universal as u8 | pc as u8 | (TAG_MASK & tag as u8) {
        Err(invalid_field_err!("identifier", "invalid universal tag identifier"))
    } else {
        Ok(())
    }
}

fn write_length(dst: &mut WriteCursor<'_>, length: u16) -> EncodeResult<usize> {
    ensure_size!(ctx: "ber::write_length", in: dst, size: sizeof_length(length));

    if length > 0xFF {
        dst.write_u8(0x80 | 2);
        dst.write_u16_be(length);
        Ok(3)
    } else if length > 0x7F {
        dst.write_u8(0x80 | 1);
        dst.write_u8(length as u8);
        Ok(2)
    } else {
        dst.write_u8(length as u8);
        Ok(1)
    }
}

fn read_length(src: &mut ReadCursor<'_>) -> DecodeResult<u16> {
    let ctx = "ber::read_length";

    ensure_size!(ctx: ctx, in: src, size: 1);
    let byte = src.read_u8();

    if byte & 0x80 != 0 {
        let length = byte & !0x80;

        ensure_size!(ctx: ctx, in: src, size: usize::from(length));

        match length {
            1 => Ok(u16::from(src.read_u8())),
            2 => Ok(src.read_u16_be()),
            _ => Err(invalid_field_err(ctx, "length", "long form too long")),
        }
    } else {
        Ok(u16::from(byte))
    }
}

pub(crate) fn sizeof_length(length: u16) -> usize {
    if length > 0xFF {
        3
    } else if length > 0x7F {
        2
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_tag_round_trip() {
        let mut buf = [0u8; 4];
        let written = write_sequence_tag(&mut WriteCursor::new(&mut buf), 0x100).unwrap();
        assert_eq!(written, 4);
        assert_eq!(buf, [0x30, 0x82, 0x01, 0x00]);

        let length = read_sequence_tag(&mut ReadCursor::new(&buf)).unwrap();
        assert_eq!(length, 0x100);
    }

    #[test]
    fn application_tag_long_form() {
        let mut buf = [0u8; 3];
        write_application_tag(&mut WriteCursor::new(&mut buf), 0x65, 0x10).unwrap();
        assert_eq!(buf, [0x7F, 0x65, 0x10]);

        let length = read_application_tag(&mut ReadCursor::new(&buf), 0x65).unwrap();
        assert_eq!(length, 0x10);
    }

    #[test]
    fn integer_sizes() {
        for (value, expected) in [(0x7Fu32, 3usize), (0x7FFF, 4), (0x7F_FFFF, 5), (0xFFFF_FFFF, 6)] {
            let mut buf = [0u8; 8];
            let written = write_integer(&mut WriteCursor::new(&mut buf), value).unwrap();
            assert_eq!(written, expected);
            assert_eq!(sizeof_integer(value), expected);

            let read = read_integer(&mut ReadCursor::new(&buf)).unwrap();
            assert_eq!(read, u64::from(value));
        }
    }

    #[test]
    fn bool_encoding_uses_ff() {
        let mut buf = [0u8; 3];
        write_bool(&mut WriteCursor::new(&mut buf), true).unwrap();
        assert_eq!(buf, [0x01, 0x01, 0xFF]);
        assert!(read_bool(&mut ReadCursor::new(&buf)).unwrap());
    }
}
