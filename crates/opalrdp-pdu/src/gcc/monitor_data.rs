//! TS_UD_CS_MONITOR and TS_UD_CS_MONITOR_EX.

use bitflags::bitflags;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive as _, ToPrimitive as _};
use opalrdp_core::{
    cast_length, ensure_fixed_part_size, ensure_size, invalid_field_err, Decode, DecodeResult, Encode, EncodeResult,
    ReadCursor, WriteCursor,
};

pub const MONITOR_COUNT_MAX: usize = 16;

const MONITOR_SIZE: usize = 4 * 4 + 4;
const MONITOR_ATTRIBUTES_SIZE: usize = 4 * 5;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct MonitorFlags: u32 {
        const PRIMARY = 0x0000_0001;
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum MonitorOrientation {
    Landscape = 0,
    Portrait = 90,
    LandscapeFlipped = 180,
    PortraitFlipped = 270,
}

/// One monitor of the client layout.
///
/// Carries both the TS_MONITOR_DEF rectangle and the extended attributes; the
/// two GCC blocks below each serialize their own half.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Monitor {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub flags: MonitorFlags,
    pub orientation: MonitorOrientation,
    pub physical_width_mm: u32,
    pub physical_height_mm: u32,
    pub desktop_scale_factor: u32,
    pub device_scale_factor: u32,
}

/// TS_UD_CS_MONITOR: the monitor rectangles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientMonitorData {
    pub monitors: Vec<Monitor>,
}

impl ClientMonitorData {
    const NAME: &'static str = "ClientMonitorData";

    const FIXED_PART_SIZE: usize = 4 /* flags */ + 4 /* monitorCount */;
}

impl Encode for ClientMonitorData {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u32(0); // flags, unused
        dst.write_u32(cast_length!(Self::NAME, "monitorCount", self.monitors.len())?);

        for monitor in self.monitors.iter().take(MONITOR_COUNT_MAX) {
            dst.write_i32(monitor.left);
            dst.write_i32(monitor.top);
            dst.write_i32(monitor.right);
            dst.write_i32(monitor.bottom);
            dst.write_u32(monitor.flags.bits());
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.monitors.len() * MONITOR_SIZE
    }
}

impl<'de> Decode<'de> for ClientMonitorData {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let _flags = src.read_u32();
        let monitor_count: usize = cast_length!(Self::NAME, "monitorCount", src.read_u32())?;

        if monitor_count > MONITOR_COUNT_MAX {
            return Err(invalid_field_err!("monitorCount", "too many monitors"));
        }

        ensure_size!(in: src, size: monitor_count * MONITOR_SIZE);

        let mut monitors = Vec::with_capacity(monitor_count);
        for _ in 0..monitor_count {
            monitors.push(Monitor {
                left: src.read_i32(),
                top: src.read_i32(),
                right: src.read_i32(),
                bottom: src.read_i32(),
                flags: MonitorFlags::from_bits_truncate(src.read_u32()),
                orientation: MonitorOrientation::Landscape,
                physical_width_mm: 0,
                physical_height_mm: 0,
                desktop_scale_factor: 0,
                device_scale_factor: 0,
            });
        }

        Ok(Self { monitors })
    }
}

/// TS_UD_CS_MONITOR_EX: orientation, physical size and scale per monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientMonitorExtendedData {
    pub monitors: Vec<Monitor>,
}

impl ClientMonitorExtendedData {
    const NAME: &'static str = "ClientMonitorExtendedData";

    const FIXED_PART_SIZE: usize = 4 /* flags */ + 4 /* monitorAttributeSize */ + 4 /* monitorCount */;
}

impl Encode for ClientMonitorExtendedData {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        dst.write_u32(0); // flags, unused
        dst.write_u32(MONITOR_ATTRIBUTES_SIZE as u32);
        dst.write_u32(cast_length!(Self::NAME, "monitorCount", self.monitors.len())?);

        for monitor in self.monitors.iter().take(MONITOR_COUNT_MAX) {
            dst.write_u32(monitor.physical_width_mm);
            dst.write_u32(monitor.physical_height_mm);
            dst.write_u32(monitor.orientation.to_u32().unwrap_or(0));
            dst.write_u32(monitor.desktop_scale_factor);
            dst.write_u32(monitor.device_scale_factor);
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.monitors.len() * MONITOR_ATTRIBUTES_SIZE
    }
}

impl<'de> Decode<'de> for ClientMonitorExtendedData {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let _flags = src.read_u32();
        let attribute_size: usize = cast_length!(Self::NAME, "monitorAttributeSize", src.read_u32())?;
        if attribute_size != MONITOR_ATTRIBUTES_SIZE {
            return Err(invalid_field_err!("monitorAttributeSize", "unexpected attribute size"));
        }

        let monitor_count: usize = cast_length!(Self::NAME, "monitorCount", src.read_u32())?;
        if monitor_count > MONITOR_COUNT_MAX {
            return Err(invalid_field_err!("monitorCount", "too many monitors"));
        }

        ensure_size!(in: src, size: monitor_count * MONITOR_ATTRIBUTES_SIZE);

        let mut monitors = Vec::with_capacity(monitor_count);
        for _ in 0..monitor_count {
            let physical_width_mm = src.read_u32();
            let physical_height_mm = src.read_u32();
            let orientation = MonitorOrientation::from_u32(src.read_u32())
                .ok_or_else(|| invalid_field_err!("orientation", "invalid monitor orientation"))?;
            let desktop_scale_factor = src.read_u32();
            let device_scale_factor = src.read_u32();

            monitors.push(Monitor {
                left: 0,
                top: 0,
                right: 0,
                bottom: 0,
                flags: MonitorFlags::empty(),
                orientation,
                physical_width_mm,
                physical_height_mm,
                desktop_scale_factor,
                device_scale_factor,
            });
        }

        Ok(Self { monitors })
    }
}
