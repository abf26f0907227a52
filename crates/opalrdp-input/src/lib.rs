#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod layout;

use bitvec::array::BitArray;
use bitvec::BitArr;
use opalrdp_pdu::input::fast_path::{FastPathInputEvent, KeyboardFlags, SynchronizeFlags};
use opalrdp_pdu::input::mouse::{MousePdu, MouseXPdu, PointerFlags, PointerXFlags};
use smallvec::SmallVec;

/// Keyboard scan code, with the extended-key prefix tracked separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Scancode {
    code: u8,
    extended: bool,
}

impl Scancode {
    pub const fn from_u8(extended: bool, code: u8) -> Self {
        Self { code, extended }
    }

    pub const fn from_u16(scancode: u16) -> Self {
        let extended = scancode & 0xE000 == 0xE000;
        let code = scancode as u8;

        Self { code, extended }
    }

    pub fn as_idx(self) -> usize {
        if self.extended {
            usize::from(self.code) + 256
        } else {
            usize::from(self.code)
        }
    }

    pub fn as_u16(self) -> u16 {
        if self.extended {
            u16::from(self.code) | 0xE000
        } else {
            u16::from(self.code)
        }
    }

    fn keyboard_flags(self) -> KeyboardFlags {
        if self.extended {
            KeyboardFlags::EXTENDED
        } else {
            KeyboardFlags::empty()
        }
    }
}

impl From<u16> for Scancode {
    fn from(code: u16) -> Self {
        Self::from_u16(code)
    }
}

/// Modifier keys bracketed around a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyModifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl KeyModifiers {
    pub const SHIFT: Self = Self {
        shift: true,
        ctrl: false,
        alt: false,
        meta: false,
    };

    pub fn is_empty(self) -> bool {
        !(self.shift || self.ctrl || self.alt || self.meta)
    }

    /// Modifier scancodes in press order; release order is the reverse.
    fn scancodes(self) -> SmallVec<[Scancode; 4]> {
        let mut scancodes = SmallVec::new();

        if self.shift {
            scancodes.push(Scancode::from_u8(false, 0x2A)); // left shift
        }
        if self.ctrl {
            scancodes.push(Scancode::from_u8(false, 0x1D)); // left ctrl
        }
        if self.alt {
            scancodes.push(Scancode::from_u8(false, 0x38)); // left alt
        }
        if self.meta {
            scancodes.push(Scancode::from_u8(true, 0x5B)); // left windows key
        }

        scancodes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MouseButton {
    Left = 0,
    Middle = 1,
    Right = 2,
    /// Typically browser back.
    X1 = 3,
    /// Typically browser forward.
    X2 = 4,
}

impl MouseButton {
    pub fn as_idx(self) -> usize {
        self as usize
    }

    pub fn from_idx(idx: usize) -> Option<Self> {
        match idx {
            0 => Some(Self::Left),
            1 => Some(Self::Middle),
            2 => Some(Self::Right),
            3 => Some(Self::X1),
            4 => Some(Self::X2),
            _ => None,
        }
    }
}

enum MouseButtonFlags {
    Button(PointerFlags),
    Pointer(PointerXFlags),
}

impl From<MouseButton> for MouseButtonFlags {
    fn from(value: MouseButton) -> Self {
        match value {
            MouseButton::Left => Self::Button(PointerFlags::LEFT_BUTTON),
            MouseButton::Middle => Self::Button(PointerFlags::MIDDLE_BUTTON_OR_WHEEL),
            MouseButton::Right => Self::Button(PointerFlags::RIGHT_BUTTON),
            MouseButton::X1 => Self::Pointer(PointerXFlags::BUTTON1),
            MouseButton::X2 => Self::Pointer(PointerXFlags::BUTTON2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MousePosition {
    pub x: u16,
    pub y: u16,
}

pub type KeyboardState = BitArr!(for 512);
pub type MouseButtonsState = BitArr!(for 5);

/// In-memory database of the current keyboard and mouse state.
///
/// Mutated only by the input encoder; every emitted event corresponds to an
/// actual state change.
pub struct Database {
    keyboard: KeyboardState,
    mouse_buttons: MouseButtonsState,
    mouse_position: MousePosition,
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    pub fn new() -> Self {
        Self {
            keyboard: BitArray::ZERO,
            mouse_buttons: BitArray::ZERO,
            mouse_position: MousePosition { x: 0, y: 0 },
        }
    }

    pub fn is_key_pressed(&self, scancode: Scancode) -> bool {
        self.keyboard.get(scancode.as_idx()).as_deref().copied().unwrap_or(false)
    }

    pub fn mouse_position(&self) -> MousePosition {
        self.mouse_position
    }

    /// Full press of `key` bracketed by `modifiers`:
    /// press(m) for each modifier, press(key), release(key), release(m) in
    /// reverse order. One event per returned element; the transport emits
    /// each as its own PDU.
    pub fn key_press(&mut self, key: Scancode, modifiers: KeyModifiers) -> SmallVec<[FastPathInputEvent; 6]> {
        let mut events = SmallVec::new();

        let modifier_scancodes = modifiers.scancodes();

        for modifier in &modifier_scancodes {
            events.push(self.key_transition(*modifier, true));
        }

        events.push(self.key_transition(key, true));
        events.push(self.key_transition(key, false));

        for modifier in modifier_scancodes.iter().rev() {
            events.push(self.key_transition(*modifier, false));
        }

        events
    }

    /// A single key transition (down or up).
    pub fn key(&mut self, key: Scancode, down: bool) -> FastPathInputEvent {
        self.key_transition(key, down)
    }

    fn key_transition(&mut self, key: Scancode, down: bool) -> FastPathInputEvent {
        self.keyboard.set(key.as_idx(), down);

        let mut flags = key.keyboard_flags();
        if !down {
            flags |= KeyboardFlags::RELEASE;
        }

        FastPathInputEvent::KeyboardEvent(flags, key.code)
    }

    pub fn mouse_button(&mut self, button: MouseButton, down: bool) -> FastPathInputEvent {
        self.mouse_buttons.set(button.as_idx(), down);

        let position = self.mouse_position;

        match MouseButtonFlags::from(button) {
            MouseButtonFlags::Button(flags) => FastPathInputEvent::MouseEvent(MousePdu {
                flags: if down { flags | PointerFlags::DOWN } else { flags },
                number_of_wheel_rotation_units: 0,
                x_position: position.x,
                y_position: position.y,
            }),
            MouseButtonFlags::Pointer(flags) => FastPathInputEvent::MouseEventEx(MouseXPdu {
                flags: if down { flags | PointerXFlags::DOWN } else { flags },
                x_position: position.x,
                y_position: position.y,
            }),
        }
    }

    /// Moves the tracked pointer without emitting an event; button and wheel
    /// events are stamped with this position.
    pub fn set_mouse_position(&mut self, position: MousePosition) {
        self.mouse_position = position;
    }

    pub fn mouse_move(&mut self, position: MousePosition) -> FastPathInputEvent {
        self.mouse_position = position;

        FastPathInputEvent::MouseEvent(MousePdu {
            flags: PointerFlags::MOVE,
            number_of_wheel_rotation_units: 0,
            x_position: position.x,
            y_position: position.y,
        })
    }

    /// Wheel rotation; `vertical` selects the wheel, the delta is clamped to
    /// the wire's signed 9-bit range.
    pub fn wheel(&mut self, delta: i16, vertical: bool) -> FastPathInputEvent {
        let position = self.mouse_position;

        FastPathInputEvent::MouseEvent(MousePdu {
            flags: if vertical {
                PointerFlags::VERTICAL_WHEEL
            } else {
                PointerFlags::HORIZONTAL_WHEEL
            },
            number_of_wheel_rotation_units: delta.clamp(-255, 255),
            x_position: position.x,
            y_position: position.y,
        })
    }

    /// Lock-key synchronization event.
    pub fn synchronize(scroll_lock: bool, num_lock: bool, caps_lock: bool, kana_lock: bool) -> FastPathInputEvent {
        let mut flags = SynchronizeFlags::empty();

        if scroll_lock {
            flags |= SynchronizeFlags::SCROLL_LOCK;
        }
        if num_lock {
            flags |= SynchronizeFlags::NUM_LOCK;
        }
        if caps_lock {
            flags |= SynchronizeFlags::CAPS_LOCK;
        }
        if kana_lock {
            flags |= SynchronizeFlags::KANA_LOCK;
        }

        FastPathInputEvent::SyncEvent(flags)
    }

    /// Events for typing `text`: each mapped code point becomes a bracketed
    /// press; code points without a mapping are skipped.
    pub fn string_press(&mut self, text: &str) -> Vec<FastPathInputEvent> {
        let mut events = Vec::new();

        for ch in text.chars() {
            let Some(mapping) = layout::lookup(ch) else {
                continue;
            };

            let modifiers = if mapping.shift {
                KeyModifiers::SHIFT
            } else {
                KeyModifiers::default()
            };

            events.extend(self.key_press(mapping.scancode, modifiers));
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_press(event: &FastPathInputEvent, code: u8) -> bool {
        matches!(event, FastPathInputEvent::KeyboardEvent(flags, c) if *c == code && !flags.contains(KeyboardFlags::RELEASE))
    }

    fn is_release(event: &FastPathInputEvent, code: u8) -> bool {
        matches!(event, FastPathInputEvent::KeyboardEvent(flags, c) if *c == code && flags.contains(KeyboardFlags::RELEASE))
    }

    #[test]
    fn key_press_brackets_modifiers_in_reverse_release_order() {
        let mut database = Database::new();

        let events = database.key_press(
            Scancode::from_u8(false, 0x1E), // A
            KeyModifiers {
                shift: true,
                ctrl: true,
                ..KeyModifiers::default()
            },
        );

        assert_eq!(events.len(), 6);
        assert!(is_press(&events[0], 0x2A)); // shift down
        assert!(is_press(&events[1], 0x1D)); // ctrl down
        assert!(is_press(&events[2], 0x1E)); // key down
        assert!(is_release(&events[3], 0x1E)); // key up
        assert!(is_release(&events[4], 0x1D)); // ctrl up, reverse order
        assert!(is_release(&events[5], 0x2A)); // shift up
    }

    #[test]
    fn down_and_up_counts_match_per_key() {
        let mut database = Database::new();

        let events = database.key_press(
            Scancode::from_u8(false, 0x1E),
            KeyModifiers {
                shift: true,
                alt: true,
                meta: true,
                ..KeyModifiers::default()
            },
        );

        let mut downs = std::collections::HashMap::new();
        let mut ups = std::collections::HashMap::new();

        for event in &events {
            if let FastPathInputEvent::KeyboardEvent(flags, code) = event {
                if flags.contains(KeyboardFlags::RELEASE) {
                    *ups.entry(*code).or_insert(0) += 1;
                } else {
                    *downs.entry(*code).or_insert(0) += 1;
                }
            }
        }

        assert_eq!(downs, ups);
    }

    #[test]
    fn string_press_shifts_uppercase_only() {
        let mut database = Database::new();

        // "Aa": shift down, A down, A up, shift up, a down, a up.
        let events = database.string_press("Aa");

        assert_eq!(events.len(), 6);
        assert!(is_press(&events[0], 0x2A));
        assert!(is_press(&events[1], 0x1E));
        assert!(is_release(&events[2], 0x1E));
        assert!(is_release(&events[3], 0x2A));
        assert!(is_press(&events[4], 0x1E));
        assert!(is_release(&events[5], 0x1E));
    }

    #[test]
    fn unmapped_code_points_are_skipped() {
        let mut database = Database::new();

        let events = database.string_press("\u{1F600}a");
        assert_eq!(events.len(), 2); // only 'a'
    }

    #[test]
    fn wheel_delta_is_clamped() {
        let mut database = Database::new();

        let event = database.wheel(-1000, true);
        if let FastPathInputEvent::MouseEvent(pdu) = event {
            assert_eq!(pdu.number_of_wheel_rotation_units, -255);
            assert!(pdu.flags.contains(PointerFlags::VERTICAL_WHEEL));
        } else {
            panic!("expected a mouse event");
        }
    }

    #[test]
    fn extended_button_uses_pointer_x_event() {
        let mut database = Database::new();

        let event = database.mouse_button(MouseButton::X2, true);
        assert!(matches!(event, FastPathInputEvent::MouseEventEx(_)));
    }
}
