use bitflags::bitflags;
use opalrdp_core::{ensure_fixed_part_size, Decode, DecodeResult, Encode, EncodeResult, ReadCursor, WriteCursor};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct PointerFlags: u16 {
        const WHEEL_NEGATIVE = 0x0100;
        const VERTICAL_WHEEL = 0x0200;
        const HORIZONTAL_WHEEL = 0x0400;
        const MOVE = 0x0800;
        const LEFT_BUTTON = 0x1000;
        const RIGHT_BUTTON = 0x2000;
        const MIDDLE_BUTTON_OR_WHEEL = 0x4000;
        const DOWN = 0x8000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct PointerXFlags: u16 {
        const BUTTON1 = 0x0001;
        const BUTTON2 = 0x0002;
        const DOWN = 0x8000;
    }
}

/// TS_FP_POINTER_EVENT.
///
/// The wheel delta rides in the low byte of the flags field, its sign in
/// `WHEEL_NEGATIVE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MousePdu {
    pub flags: PointerFlags,
    pub number_of_wheel_rotation_units: i16,
    pub x_position: u16,
    pub y_position: u16,
}

impl MousePdu {
    const NAME: &'static str = "MousePdu";

    const FIXED_PART_SIZE: usize = 2 /* flags */ + 2 /* x */ + 2 /* y */;
}

impl Encode for MousePdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        // The low byte carries the wheel magnitude; the sign travels as the
        // WHEEL_NEGATIVE flag. Deltas beyond one byte saturate.
        let delta = self.number_of_wheel_rotation_units;
        let magnitude = u16::from(delta.unsigned_abs().min(0xFF) as u8);
        let sign_bit = if delta < 0 { PointerFlags::WHEEL_NEGATIVE.bits() } else { 0 };

        dst.write_u16(self.flags.bits() | sign_bit | magnitude);
        dst.write_u16(self.x_position);
        dst.write_u16(self.y_position);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for MousePdu {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let flags_raw = src.read_u16();

        let flags = PointerFlags::from_bits_truncate(flags_raw & 0xFF00);

        let magnitude = i16::from(flags_raw as u8); // the low byte

        let number_of_wheel_rotation_units = if flags.contains(PointerFlags::WHEEL_NEGATIVE) {
            -magnitude
        } else {
            magnitude
        };

        let x_position = src.read_u16();
        let y_position = src.read_u16();

        Ok(Self {
            flags,
            number_of_wheel_rotation_units,
            x_position,
            y_position,
        })
    }
}

/// TS_FP_POINTERX_EVENT for the extended buttons (X1/X2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MouseXPdu {
    pub flags: PointerXFlags,
    pub x_position: u16,
    pub y_position: u16,
}

impl MouseXPdu {
    const NAME: &'static str = "MouseXPdu";

    const FIXED_PART_SIZE: usize = 2 /* flags */ + 2 /* x */ + 2 /* y */;
}

impl Encode for MouseXPdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u16(self.flags.bits());
        dst.write_u16(self.x_position);
        dst.write_u16(self.y_position);

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for MouseXPdu {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let flags = PointerXFlags::from_bits_truncate(src.read_u16());
        let x_position = src.read_u16();
        let y_position = src.read_u16();

        Ok(Self {
            flags,
            x_position,
            y_position,
        })
    }
}

#[cfg(test)]
mod tests {
    use opalrdp_core::{decode, encode_vec};

    use super::*;

    #[test]
    fn negative_wheel_delta_sets_sign_bit() {
        let pdu = MousePdu {
            flags: PointerFlags::VERTICAL_WHEEL,
            number_of_wheel_rotation_units: -120,
            x_position: 10,
            y_position: 20,
        };

        let encoded = encode_vec(&pdu).unwrap();
        let flags = u16::from_le_bytes([encoded[0], encoded[1]]);
        assert_ne!(flags & PointerFlags::WHEEL_NEGATIVE.bits(), 0);
        assert_eq!(flags & 0xFF, 120, "the low byte carries the magnitude");

        let decoded: MousePdu = decode(&encoded).unwrap();
        assert_eq!(decoded.number_of_wheel_rotation_units, -120);
    }

    #[test]
    fn positive_wheel_delta_round_trips() {
        let pdu = MousePdu {
            flags: PointerFlags::VERTICAL_WHEEL,
            number_of_wheel_rotation_units: 120,
            x_position: 0,
            y_position: 0,
        };

        let encoded = encode_vec(&pdu).unwrap();
        let decoded: MousePdu = decode(&encoded).unwrap();
        assert_eq!(decoded.number_of_wheel_rotation_units, 120);
        assert!(!decoded.flags.contains(PointerFlags::WHEEL_NEGATIVE));
    }

    #[test]
    fn oversized_wheel_delta_saturates() {
        let pdu = MousePdu {
            flags: PointerFlags::VERTICAL_WHEEL,
            number_of_wheel_rotation_units: -1000,
            x_position: 0,
            y_position: 0,
        };

        let encoded = encode_vec(&pdu).unwrap();
        let decoded: MousePdu = decode(&encoded).unwrap();
        assert_eq!(decoded.number_of_wheel_rotation_units, -255);
    }
}
