//! TS_FP_INPUT_PDU and its events.

use bit_field::BitField as _;
use bitflags::bitflags;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive as _, ToPrimitive as _};
use opalrdp_core::{
    cast_length, ensure_fixed_part_size, ensure_size, invalid_field_err, invalid_field_err_with_source, other_err,
    Decode, DecodeResult, Encode, EncodeResult, ReadCursor, WriteCursor,
};

use crate::fast_path::EncryptionFlags;
use crate::input::mouse::{MousePdu, MouseXPdu};
use crate::per;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct KeyboardFlags: u8 {
        const RELEASE = 0x01;
        const EXTENDED = 0x02;
        const EXTENDED1 = 0x04;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct SynchronizeFlags: u8 {
        const SCROLL_LOCK = 0x01;
        const NUM_LOCK = 0x02;
        const CAPS_LOCK = 0x04;
        const KANA_LOCK = 0x08;
    }
}

/// TS_FP_INPUT_PDU header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastPathInputHeader {
    pub flags: EncryptionFlags,
    pub data_length: usize,
    pub num_events: u8,
}

impl FastPathInputHeader {
    const NAME: &'static str = "FastPathInputHeader";

    const FIXED_PART_SIZE: usize = 1 /* fpInputHeader */;
}

impl Encode for FastPathInputHeader {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        let mut header = 0u8;
        header.set_bits(0..2, 0); // fast-path action
        if self.num_events < 16 {
            header.set_bits(2..6, self.num_events);
        }
        header.set_bits(6..8, self.flags.bits());
        dst.write_u8(header);

        per::write_length(dst, cast_length!(Self::NAME, "length", self.data_length + self.size())?);

        if self.num_events >= 16 {
            dst.write_u8(self.num_events);
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let num_events_length: usize = if self.num_events < 16 { 0 } else { 1 };
        let length_field = per::sizeof_length((self.data_length + 2 + num_events_length) as u16);

        Self::FIXED_PART_SIZE + length_field + num_events_length
    }
}

impl<'de> Decode<'de> for FastPathInputHeader {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let header = src.read_u8();
        let flags = EncryptionFlags::from_bits_truncate(header.get_bits(6..8));
        let mut num_events = header.get_bits(2..6);

        let (length, sizeof_length) =
            per::read_length(src).map_err(|e| invalid_field_err_with_source(Self::NAME, "length", "PER", e))?;

        if !flags.is_empty() {
            return Err(invalid_field_err!("flags", "FastPath input encryption not supported"));
        }

        let num_events_length = if num_events == 0 {
            ensure_size!(in: src, size: 1);
            num_events = src.read_u8();
            1
        } else {
            0
        };

        let data_length = usize::from(length)
            .checked_sub(sizeof_length + 1 + num_events_length)
            .ok_or_else(|| invalid_field_err!("length", "FastPath input length smaller than header"))?;

        Ok(FastPathInputHeader {
            flags,
            data_length,
            num_events,
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum FastPathInputEventType {
    ScanCode = 0x0,
    Mouse = 0x1,
    MouseX = 0x2,
    Sync = 0x3,
    Unicode = 0x4,
}

/// One TS_FP_INPUT_EVENT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FastPathInputEvent {
    KeyboardEvent(KeyboardFlags, u8),
    UnicodeKeyboardEvent(KeyboardFlags, u16),
    MouseEvent(MousePdu),
    MouseEventEx(MouseXPdu),
    SyncEvent(SynchronizeFlags),
}

impl FastPathInputEvent {
    const NAME: &'static str = "FastPathInputEvent";

    const FIXED_PART_SIZE: usize = 1 /* eventHeader */;
}

impl Encode for FastPathInputEvent {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        let (flags, code) = match self {
            Self::KeyboardEvent(flags, _) => (flags.bits(), FastPathInputEventType::ScanCode),
            Self::UnicodeKeyboardEvent(flags, _) => (flags.bits(), FastPathInputEventType::Unicode),
            Self::MouseEvent(_) => (0, FastPathInputEventType::Mouse),
            Self::MouseEventEx(_) => (0, FastPathInputEventType::MouseX),
            Self::SyncEvent(flags) => (flags.bits(), FastPathInputEventType::Sync),
        };

        let mut header = 0u8;
        header.set_bits(0..5, flags);
        header.set_bits(5..8, code.to_u8().unwrap_or(0));
        dst.write_u8(header);

        match self {
            Self::KeyboardEvent(_, code) => dst.write_u8(*code),
            Self::UnicodeKeyboardEvent(_, code) => dst.write_u16(*code),
            Self::MouseEvent(pdu) => pdu.encode(dst)?,
            Self::MouseEventEx(pdu) => pdu.encode(dst)?,
            Self::SyncEvent(_) => {}
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
            + match self {
                Self::KeyboardEvent(_, _) => 1,
                Self::UnicodeKeyboardEvent(_, _) => 2,
                Self::MouseEvent(pdu) => pdu.size(),
                Self::MouseEventEx(pdu) => pdu.size(),
                Self::SyncEvent(_) => 0,
            }
    }
}

impl<'de> Decode<'de> for FastPathInputEvent {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let header = src.read_u8();
        let flags = header.get_bits(0..5);
        let code = header.get_bits(5..8);
        let code = FastPathInputEventType::from_u8(code)
            .ok_or_else(|| invalid_field_err!("eventCode", "unsupported input event code"))?;

        let event = match code {
            FastPathInputEventType::ScanCode => {
                ensure_size!(in: src, size: 1);
                let key_code = src.read_u8();
                let flags = KeyboardFlags::from_bits(flags)
                    .ok_or_else(|| invalid_field_err!("eventFlags", "invalid keyboard flags"))?;
                Self::KeyboardEvent(flags, key_code)
            }
            FastPathInputEventType::Unicode => {
                ensure_size!(in: src, size: 2);
                let code_unit = src.read_u16();
                let flags = KeyboardFlags::from_bits(flags)
                    .ok_or_else(|| invalid_field_err!("eventFlags", "invalid keyboard flags"))?;
                Self::UnicodeKeyboardEvent(flags, code_unit)
            }
            FastPathInputEventType::Mouse => Self::MouseEvent(MousePdu::decode(src)?),
            FastPathInputEventType::MouseX => Self::MouseEventEx(MouseXPdu::decode(src)?),
            FastPathInputEventType::Sync => {
                let flags = SynchronizeFlags::from_bits(flags)
                    .ok_or_else(|| invalid_field_err!("eventFlags", "invalid synchronize flags"))?;
                Self::SyncEvent(flags)
            }
        };

        Ok(event)
    }
}

/// A whole TS_FP_INPUT_PDU.
///
/// This client always emits one event per PDU; the encoder nevertheless
/// handles arbitrary batches (and the >15 events header extension).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastPathInput(pub Vec<FastPathInputEvent>);

impl FastPathInput {
    const NAME: &'static str = "FastPathInput";
}

impl Encode for FastPathInput {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        if self.0.is_empty() {
            return Err(other_err(Self::NAME, "empty FastPath input"));
        }

        ensure_size!(in: dst, size: self.size());

        let data_length = self.0.iter().map(Encode::size).sum::<usize>();
        let header = FastPathInputHeader {
            num_events: self.0.len() as u8,
            flags: EncryptionFlags::empty(),
            data_length,
        };
        header.encode(dst)?;

        for event in self.0.iter() {
            event.encode(dst)?;
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let data_length = self.0.iter().map(Encode::size).sum::<usize>();
        let header = FastPathInputHeader {
            num_events: self.0.len() as u8,
            flags: EncryptionFlags::empty(),
            data_length,
        };
        header.size() + data_length
    }
}

impl<'de> Decode<'de> for FastPathInput {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        let header = FastPathInputHeader::decode(src)?;
        let events = (0..header.num_events)
            .map(|_| FastPathInputEvent::decode(src))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self(events))
    }
}

#[cfg(test)]
mod tests {
    use opalrdp_core::{decode, encode_vec};

    use super::*;

    #[test]
    fn single_key_press_round_trip() {
        let pdu = FastPathInput(vec![FastPathInputEvent::KeyboardEvent(KeyboardFlags::empty(), 0x1E)]);

        let encoded = encode_vec(&pdu).unwrap();
        // action/numEvents byte, length byte, event header, key code
        assert_eq!(encoded.len(), 4);

        let decoded: FastPathInput = decode(&encoded).unwrap();
        assert_eq!(decoded, pdu);
    }

    #[test]
    fn sync_event_has_no_payload() {
        let pdu = FastPathInput(vec![FastPathInputEvent::SyncEvent(SynchronizeFlags::NUM_LOCK)]);

        let encoded = encode_vec(&pdu).unwrap();
        let decoded: FastPathInput = decode(&encoded).unwrap();
        assert_eq!(decoded, pdu);
    }
}
