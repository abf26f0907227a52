//! UTF-16LE string helpers for the RDP-layer fields.

use std::string::FromUtf16Error;

use opalrdp_core::{ReadCursor, WriteCursor};

/// Reads a null-terminated UTF-16LE string out of a raw byte payload.
pub fn read_utf16_string(utf16_payload: &[u8], utf16_size_hint: Option<usize>) -> Result<String, FromUtf16Error> {
    let mut trimmed_utf16: Vec<u16> = if let Some(size_hint) = utf16_size_hint {
        Vec::with_capacity(size_hint)
    } else {
        Vec::with_capacity(utf16_payload.len() / 2)
    };

    for chunk in utf16_payload.chunks_exact(2) {
        let code_unit = u16::from_le_bytes([chunk[0], chunk[1]]);

        if code_unit == 0 {
            break;
        }

        trimmed_utf16.push(code_unit);
    }

    String::from_utf16(&trimmed_utf16)
}

/// Number of bytes taken by `utf8` re-encoded as UTF-16LE plus a null terminator.
pub fn null_terminated_utf16_encoded_len(utf8: &str) -> usize {
    utf8.encode_utf16().count() * 2 + 2
}

/// Writes `value` as UTF-16LE into a fixed-size field of `total_size` bytes,
/// truncating as needed and zero-filling the rest (terminator included).
pub fn write_fixed_utf16(dst: &mut WriteCursor<'_>, value: &str, total_size: usize) {
    debug_assert_eq!(total_size % 2, 0);

    let capacity = total_size / 2 - 1;
    let mut written = 0;

    for code_unit in value.encode_utf16().take(capacity) {
        dst.write_u16(code_unit);
        written += 1;
    }

    for _ in written..capacity + 1 {
        dst.write_u16(0);
    }
}

/// Reads a fixed-size UTF-16LE field of `total_size` bytes.
pub fn read_fixed_utf16(src: &mut ReadCursor<'_>, total_size: usize) -> Result<String, FromUtf16Error> {
    let payload = src.read_slice(total_size);
    read_utf16_string(payload, Some(total_size / 2))
}

/// Writes `value` as a null-terminated UTF-16LE string (variable size).
pub fn write_utf16_with_terminator(dst: &mut WriteCursor<'_>, value: &str) {
    for code_unit in value.encode_utf16() {
        dst.write_u16(code_unit);
    }
    dst.write_u16(0);
}

/// Encodes `value` as UTF-16LE bytes, without terminator.
pub fn to_utf16_bytes(value: &str) -> Vec<u8> {
    value
        .encode_utf16()
        .flat_map(|code_unit| code_unit.to_le_bytes())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_field_is_zero_filled_and_round_trips() {
        let mut buf = [0xAAu8; 32];
        write_fixed_utf16(&mut WriteCursor::new(&mut buf), "opal", 32);

        assert_eq!(&buf[..10], [b'o', 0, b'p', 0, b'a', 0, b'l', 0, 0, 0]);
        assert!(buf[10..].iter().all(|b| *b == 0));

        let read = read_fixed_utf16(&mut ReadCursor::new(&buf), 32).unwrap();
        assert_eq!(read, "opal");
    }

    #[test]
    fn fixed_field_truncates_long_input() {
        let mut buf = [0u8; 8];
        write_fixed_utf16(&mut WriteCursor::new(&mut buf), "abcdef", 8);

        let read = read_fixed_utf16(&mut ReadCursor::new(&buf), 8).unwrap();
        assert_eq!(read, "abc");
    }
}
