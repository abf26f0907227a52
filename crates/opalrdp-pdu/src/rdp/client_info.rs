//! TS_INFO_PACKET and TS_EXTENDED_INFO_PACKET.

use bitflags::bitflags;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive as _, ToPrimitive as _};
use opalrdp_core::{
    cast_length, ensure_fixed_part_size, ensure_size, invalid_field_err, read_padding, write_padding, Decode,
    DecodeResult, Encode, EncodeResult, ReadCursor, WriteCursor,
};

use crate::utf16;

const TIMEZONE_INFO_SIZE: usize = 172;
const TIMEZONE_NAME_SIZE: usize = 64;
const SYSTEM_TIME_SIZE: usize = 16;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct ClientInfoFlags: u32 {
        const MOUSE = 0x0000_0001;
        const DISABLE_CTRL_ALT_DEL = 0x0000_0002;
        const AUTOLOGON = 0x0000_0008;
        const UNICODE = 0x0000_0010;
        const MAXIMIZE_SHELL = 0x0000_0020;
        const LOGON_NOTIFY = 0x0000_0040;
        const COMPRESSION = 0x0000_0080;
        const ENABLE_WINDOWS_KEY = 0x0000_0100;
        const REMOTE_CONSOLE_AUDIO = 0x0000_2000;
        const FORCE_ENCRYPTED_CS_PDU = 0x0000_4000;
        const RAIL = 0x0000_8000;
        const LOGON_ERRORS = 0x0001_0000;
        const MOUSE_HAS_WHEEL = 0x0002_0000;
        const PASSWORD_IS_SC_PIN = 0x0004_0000;
        const NO_AUDIO_PLAYBACK = 0x0008_0000;
        const USING_SAVED_CREDS = 0x0010_0000;
        const AUDIO_CAPTURE = 0x0020_0000;
        const VIDEO_DISABLE = 0x0040_0000;
        const HIDEF_RAIL_SUPPORTED = 0x0200_0000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct PerformanceFlags: u32 {
        const DISABLE_WALLPAPER = 0x0000_0001;
        const DISABLE_FULLWINDOWDRAG = 0x0000_0002;
        const DISABLE_MENUANIMATIONS = 0x0000_0004;
        const DISABLE_THEMING = 0x0000_0008;
        const DISABLE_CURSOR_SHADOW = 0x0000_0020;
        const DISABLE_CURSORSETTINGS = 0x0000_0040;
        const ENABLE_FONT_SMOOTHING = 0x0000_0080;
        const ENABLE_DESKTOP_COMPOSITION = 0x0000_0100;
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u16)]
pub enum AddressFamily {
    INet = 0x0002,
    INet6 = 0x0017,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub domain: Option<String>,
}

/// TS_TIME_ZONE_INFORMATION: a fixed 172-byte blob. The SYSTEMTIME
/// transition dates are always written zeroed, which Windows treats as "no
/// automatic DST transition".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimezoneInfo {
    pub bias: i32,
    pub standard_name: String,
    pub standard_bias: i32,
    pub daylight_name: String,
    pub daylight_bias: i32,
}

impl Default for TimezoneInfo {
    fn default() -> Self {
        Self {
            bias: 0,
            standard_name: "UTC".to_owned(),
            standard_bias: 0,
            daylight_name: "UTC".to_owned(),
            daylight_bias: 0,
        }
    }
}

impl TimezoneInfo {
    fn write(&self, dst: &mut WriteCursor<'_>) {
        dst.write_i32(self.bias);
        utf16::write_fixed_utf16(dst, &self.standard_name, TIMEZONE_NAME_SIZE);
        write_padding!(dst, SYSTEM_TIME_SIZE); // StandardDate
        dst.write_i32(self.standard_bias);
        utf16::write_fixed_utf16(dst, &self.daylight_name, TIMEZONE_NAME_SIZE);
        write_padding!(dst, SYSTEM_TIME_SIZE); // DaylightDate
        dst.write_i32(self.daylight_bias);
    }

    fn read(src: &mut ReadCursor<'_>) -> DecodeResult<Self> {
        let bias = src.read_i32();
        let standard_name = utf16::read_fixed_utf16(src, TIMEZONE_NAME_SIZE)
            .map_err(|_| invalid_field_err!("standardName", "not valid UTF-16"))?;
        read_padding!(src, SYSTEM_TIME_SIZE);
        let standard_bias = src.read_i32();
        let daylight_name = utf16::read_fixed_utf16(src, TIMEZONE_NAME_SIZE)
            .map_err(|_| invalid_field_err!("daylightName", "not valid UTF-16"))?;
        read_padding!(src, SYSTEM_TIME_SIZE);
        let daylight_bias = src.read_i32();

        Ok(Self {
            bias,
            standard_name,
            standard_bias,
            daylight_name,
            daylight_bias,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedClientInfo {
    pub address_family: AddressFamily,
    pub address: String,
    pub dir: String,
    pub timezone: TimezoneInfo,
    pub session_id: u32,
    pub performance_flags: PerformanceFlags,
}

impl ExtendedClientInfo {
    fn size(&self) -> usize {
        2 /* clientAddressFamily */
            + 2 /* cbClientAddress */ + utf16::null_terminated_utf16_encoded_len(&self.address)
            + 2 /* cbClientDir */ + utf16::null_terminated_utf16_encoded_len(&self.dir)
            + TIMEZONE_INFO_SIZE
            + 4 /* clientSessionId */
            + 4 /* performanceFlags */
    }
}

/// TS_INFO_PACKET. Strings are always emitted in Unicode; the ANSI variant
/// is not produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub credentials: Credentials,
    /// Ignored by the server when the keyboard layout of the core data is set.
    pub code_page: u32,
    pub flags: ClientInfoFlags,
    pub alternate_shell: String,
    pub work_dir: String,
    pub extra_info: ExtendedClientInfo,
}

impl ClientInfo {
    const NAME: &'static str = "ClientInfo";

    const FIXED_PART_SIZE: usize = 4 /* codePage */ + 4 /* flags */ + 2 * 5 /* cb fields */;
}

impl Encode for ClientInfo {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        let domain = self.credentials.domain.as_deref().unwrap_or("");

        dst.write_u32(self.code_page);
        dst.write_u32((self.flags | ClientInfoFlags::UNICODE).bits());

        // The cb* fields exclude the mandatory null terminator.
        dst.write_u16(cast_length!(Self::NAME, "cbDomain", utf16::to_utf16_bytes(domain).len())?);
        dst.write_u16(cast_length!(
            Self::NAME,
            "cbUserName",
            utf16::to_utf16_bytes(&self.credentials.username).len()
        )?);
        dst.write_u16(cast_length!(
            Self::NAME,
            "cbPassword",
            utf16::to_utf16_bytes(&self.credentials.password).len()
        )?);
        dst.write_u16(cast_length!(
            Self::NAME,
            "cbAlternateShell",
            utf16::to_utf16_bytes(&self.alternate_shell).len()
        )?);
        dst.write_u16(cast_length!(
            Self::NAME,
            "cbWorkingDir",
            utf16::to_utf16_bytes(&self.work_dir).len()
        )?);

        utf16::write_utf16_with_terminator(dst, domain);
        utf16::write_utf16_with_terminator(dst, &self.credentials.username);
        utf16::write_utf16_with_terminator(dst, &self.credentials.password);
        utf16::write_utf16_with_terminator(dst, &self.alternate_shell);
        utf16::write_utf16_with_terminator(dst, &self.work_dir);

        let extra = &self.extra_info;
        dst.write_u16(extra.address_family.to_u16().unwrap_or(0x0002));
        // Unlike the cb* fields above, these two include the terminator.
        dst.write_u16(cast_length!(
            Self::NAME,
            "cbClientAddress",
            utf16::null_terminated_utf16_encoded_len(&extra.address)
        )?);
        utf16::write_utf16_with_terminator(dst, &extra.address);
        dst.write_u16(cast_length!(
            Self::NAME,
            "cbClientDir",
            utf16::null_terminated_utf16_encoded_len(&extra.dir)
        )?);
        utf16::write_utf16_with_terminator(dst, &extra.dir);
        extra.timezone.write(dst);
        dst.write_u32(extra.session_id);
        dst.write_u32(extra.performance_flags.bits());

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let domain = self.credentials.domain.as_deref().unwrap_or("");

        Self::FIXED_PART_SIZE
            + utf16::null_terminated_utf16_encoded_len(domain)
            + utf16::null_terminated_utf16_encoded_len(&self.credentials.username)
            + utf16::null_terminated_utf16_encoded_len(&self.credentials.password)
            + utf16::null_terminated_utf16_encoded_len(&self.alternate_shell)
            + utf16::null_terminated_utf16_encoded_len(&self.work_dir)
            + self.extra_info.size()
    }
}

impl<'de> Decode<'de> for ClientInfo {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        let code_page = src.read_u32();
        let flags = ClientInfoFlags::from_bits_truncate(src.read_u32());

        let cb_domain = usize::from(src.read_u16());
        let cb_username = usize::from(src.read_u16());
        let cb_password = usize::from(src.read_u16());
        let cb_alternate_shell = usize::from(src.read_u16());
        let cb_work_dir = usize::from(src.read_u16());

        let mut read_string = |src: &mut ReadCursor<'de>, cb: usize, field: &'static str| -> DecodeResult<String> {
            ensure_size!(ctx: Self::NAME, in: src, size: cb + 2);
            let value = utf16::read_utf16_string(src.read_slice(cb), None)
                .map_err(|_| invalid_field_err(Self::NAME, field, "not valid UTF-16"))?;
            read_padding!(src, 2); // null terminator
            Ok(value)
        };

        let domain = read_string(src, cb_domain, "domain")?;
        let username = read_string(src, cb_username, "userName")?;
        let password = read_string(src, cb_password, "password")?;
        let alternate_shell = read_string(src, cb_alternate_shell, "alternateShell")?;
        let work_dir = read_string(src, cb_work_dir, "workingDir")?;

        ensure_size!(in: src, size: 4);
        let address_family = AddressFamily::from_u16(src.read_u16())
            .ok_or_else(|| invalid_field_err!("clientAddressFamily", "invalid address family"))?;
        let cb_address = usize::from(src.read_u16());
        ensure_size!(in: src, size: cb_address);
        let address = utf16::read_utf16_string(src.read_slice(cb_address), None)
            .map_err(|_| invalid_field_err!("clientAddress", "not valid UTF-16"))?;

        ensure_size!(in: src, size: 2);
        let cb_dir = usize::from(src.read_u16());
        ensure_size!(in: src, size: cb_dir);
        let dir = utf16::read_utf16_string(src.read_slice(cb_dir), None)
            .map_err(|_| invalid_field_err!("clientDir", "not valid UTF-16"))?;

        ensure_size!(in: src, size: TIMEZONE_INFO_SIZE + 8);
        let timezone = TimezoneInfo::read(src)?;
        let session_id = src.read_u32();
        let performance_flags = PerformanceFlags::from_bits_truncate(src.read_u32());

        Ok(Self {
            credentials: Credentials {
                username,
                password,
                domain: if domain.is_empty() { None } else { Some(domain) },
            },
            code_page,
            flags,
            alternate_shell,
            work_dir,
            extra_info: ExtendedClientInfo {
                address_family,
                address,
                dir,
                timezone,
                session_id,
                performance_flags,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use opalrdp_core::{decode, encode_vec};

    use super::*;

    #[test]
    fn client_info_round_trip() {
        let info = ClientInfo {
            credentials: Credentials {
                username: "alice".to_owned(),
                password: "hunter2".to_owned(),
                domain: Some("CONTOSO".to_owned()),
            },
            code_page: 0,
            flags: ClientInfoFlags::MOUSE | ClientInfoFlags::UNICODE | ClientInfoFlags::LOGON_ERRORS,
            alternate_shell: String::new(),
            work_dir: String::new(),
            extra_info: ExtendedClientInfo {
                address_family: AddressFamily::INet,
                address: "192.168.1.100".to_owned(),
                dir: "C:\\Windows\\System32\\mstscax.dll".to_owned(),
                timezone: TimezoneInfo::default(),
                session_id: 0,
                performance_flags: PerformanceFlags::DISABLE_WALLPAPER,
            },
        };

        let encoded = encode_vec(&info).unwrap();
        assert_eq!(encoded.len(), info.size());

        let decoded: ClientInfo = decode(&encoded).unwrap();
        assert_eq!(decoded, info);
    }
}
