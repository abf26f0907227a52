//! US-QWERTY code point to scancode mapping for text input.

use crate::Scancode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyMapping {
    pub scancode: Scancode,
    pub shift: bool,
}

fn mapping(code: u8, shift: bool) -> Option<KeyMapping> {
    Some(KeyMapping {
        scancode: Scancode::from_u8(false, code),
        shift,
    })
}

/// Looks up the scancode producing `ch` on a US-QWERTY layout.
///
/// Returns `None` for code points the layout cannot produce; callers skip
/// those.
pub fn lookup(ch: char) -> Option<KeyMapping> {
    match ch {
        'a' | 'A' => mapping(0x1E, ch.is_ascii_uppercase()),
        'b' | 'B' => mapping(0x30, ch.is_ascii_uppercase()),
        'c' | 'C' => mapping(0x2E, ch.is_ascii_uppercase()),
        'd' | 'D' => mapping(0x20, ch.is_ascii_uppercase()),
        'e' | 'E' => mapping(0x12, ch.is_ascii_uppercase()),
        'f' | 'F' => mapping(0x21, ch.is_ascii_uppercase()),
        'g' | 'G' => mapping(0x22, ch.is_ascii_uppercase()),
        'h' | 'H' => mapping(0x23, ch.is_ascii_uppercase()),
        'i' | 'I' => mapping(0x17, ch.is_ascii_uppercase()),
        'j' | 'J' => mapping(0x24, ch.is_ascii_uppercase()),
        'k' | 'K' => mapping(0x25, ch.is_ascii_uppercase()),
        'l' | 'L' => mapping(0x26, ch.is_ascii_uppercase()),
        'm' | 'M' => mapping(0x32, ch.is_ascii_uppercase()),
        'n' | 'N' => mapping(0x31, ch.is_ascii_uppercase()),
        'o' | 'O' => mapping(0x18, ch.is_ascii_uppercase()),
        'p' | 'P' => mapping(0x19, ch.is_ascii_uppercase()),
        'q' | 'Q' => mapping(0x10, ch.is_ascii_uppercase()),
        'r' | 'R' => mapping(0x13, ch.is_ascii_uppercase()),
        's' | 'S' => mapping(0x1F, ch.is_ascii_uppercase()),
        't' | 'T' => mapping(0x14, ch.is_ascii_uppercase()),
        'u' | 'U' => mapping(0x16, ch.is_ascii_uppercase()),
        'v' | 'V' => mapping(0x2F, ch.is_ascii_uppercase()),
        'w' | 'W' => mapping(0x11, ch.is_ascii_uppercase()),
        'x' | 'X' => mapping(0x2D, ch.is_ascii_uppercase()),
        'y' | 'Y' => mapping(0x15, ch.is_ascii_uppercase()),
        'z' | 'Z' => mapping(0x2C, ch.is_ascii_uppercase()),

        '1' => mapping(0x02, false),
        '2' => mapping(0x03, false),
        '3' => mapping(0x04, false),
        '4' => mapping(0x05, false),
        '5' => mapping(0x06, false),
        '6' => mapping(0x07, false),
        '7' => mapping(0x08, false),
        '8' => mapping(0x09, false),
        '9' => mapping(0x0A, false),
        '0' => mapping(0x0B, false),

        '!' => mapping(0x02, true),
        '@' => mapping(0x03, true),
        '#' => mapping(0x04, true),
        '$' => mapping(0x05, true),
        '%' => mapping(0x06, true),
        '^' => mapping(0x07, true),
        '&' => mapping(0x08, true),
        '*' => mapping(0x09, true),
        '(' => mapping(0x0A, true),
        ')' => mapping(0x0B, true),

        '-' => mapping(0x0C, false),
        '_' => mapping(0x0C, true),
        '=' => mapping(0x0D, false),
        '+' => mapping(0x0D, true),
        '[' => mapping(0x1A, false),
        '{' => mapping(0x1A, true),
        ']' => mapping(0x1B, false),
        '}' => mapping(0x1B, true),
        '\\' => mapping(0x2B, false),
        '|' => mapping(0x2B, true),
        ';' => mapping(0x27, false),
        ':' => mapping(0x27, true),
        '\'' => mapping(0x28, false),
        '"' => mapping(0x28, true),
        '`' => mapping(0x29, false),
        '~' => mapping(0x29, true),
        ',' => mapping(0x33, false),
        '<' => mapping(0x33, true),
        '.' => mapping(0x34, false),
        '>' => mapping(0x34, true),
        '/' => mapping(0x35, false),
        '?' => mapping(0x35, true),

        ' ' => mapping(0x39, false),
        '\t' => mapping(0x0F, false),
        '\n' => mapping(0x1C, false),

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letters_map_with_shift_for_uppercase() {
        let lower = lookup('a').unwrap();
        let upper = lookup('A').unwrap();

        assert_eq!(lower.scancode, upper.scancode);
        assert!(!lower.shift);
        assert!(upper.shift);
    }

    #[test]
    fn shifted_digits_map_to_digit_row() {
        assert_eq!(lookup('!').unwrap().scancode, lookup('1').unwrap().scancode);
        assert!(lookup('!').unwrap().shift);
    }

    #[test]
    fn unmapped_characters_return_none() {
        assert!(lookup('é').is_none());
        assert!(lookup('\u{1F600}').is_none());
    }
}
