//! GCC conference user-data blocks exchanged inside MCS Connect-Initial /
//! Connect-Response (the [MS-RDPBCGR] profile of T.124).

use opalrdp_core::{
    cast_length, decode, ensure_fixed_part_size, ensure_size, invalid_field_err, Decode, DecodeErrorKind, DecodeResult,
    Encode, EncodeResult, ReadCursor, WriteCursor,
};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

pub mod conference_create;

mod core_data;
mod monitor_data;
mod multi_transport_data;
mod network_data;
mod security_data;

pub use self::core_data::{
    ClientColorDepth, ClientCoreData, ClientCoreOptionalData, ClientEarlyCapabilityFlags, ConnectionType,
    HighColorDepth, KeyboardType, RdpVersion, SecureAccessSequence, ServerCoreData, ServerCoreOptionalData,
    ServerEarlyCapabilityFlags, SupportedColorDepths,
};
pub use self::monitor_data::{ClientMonitorData, ClientMonitorExtendedData, Monitor, MonitorFlags, MonitorOrientation};
pub use self::multi_transport_data::{MultiTransportChannelData, MultiTransportFlags};
pub use self::network_data::{ChannelDef, ChannelName, ChannelOptions, ClientNetworkData, ServerNetworkData};
pub use self::security_data::{ClientSecurityData, EncryptionLevel, EncryptionMethod, ServerSecurityData};

macro_rules! user_header_try {
    ($e:expr) => {
        match $e {
            Ok(user_header) => user_header,
            Err(e) if matches!(e.kind(), DecodeErrorKind::NotEnoughBytes { .. }) => break,
            Err(e) => return Err(e),
        }
    };
}

const USER_DATA_HEADER_SIZE: usize = 4;

/// Client MCS Connect Initial user-data blocks.
///
/// CORE and SECURITY are mandatory; the rest is attached on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientGccBlocks {
    pub core: ClientCoreData,
    pub security: ClientSecurityData,
    pub network: Option<ClientNetworkData>,
    pub monitor: Option<ClientMonitorData>,
    pub monitor_extended: Option<ClientMonitorExtendedData>,
    pub multi_transport: Option<MultiTransportChannelData>,
}

impl ClientGccBlocks {
    const NAME: &'static str = "ClientGccBlocks";

    pub fn channel_names(&self) -> Option<Vec<ChannelDef>> {
        self.network.as_ref().map(|network| network.channels.clone())
    }
}

impl Encode for ClientGccBlocks {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_size!(in: dst, size: self.size());

        UserDataHeader::encode(dst, ClientGccType::CoreData.as_u16(), &self.core)?;
        UserDataHeader::encode(dst, ClientGccType::SecurityData.as_u16(), &self.security)?;

        if let Some(ref network) = self.network {
            UserDataHeader::encode(dst, ClientGccType::NetworkData.as_u16(), network)?;
        }
        if let Some(ref monitor) = self.monitor {
            UserDataHeader::encode(dst, ClientGccType::MonitorData.as_u16(), monitor)?;
        }
        if let Some(ref monitor_extended) = self.monitor_extended {
            UserDataHeader::encode(dst, ClientGccType::MonitorExtendedData.as_u16(), monitor_extended)?;
        }
        if let Some(ref multi_transport) = self.multi_transport {
            UserDataHeader::encode(dst, ClientGccType::MultiTransportChannelData.as_u16(), multi_transport)?;
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let mut size = self.core.size() + self.security.size() + USER_DATA_HEADER_SIZE * 2;

        if let Some(ref network) = self.network {
            size += network.size() + USER_DATA_HEADER_SIZE;
        }
        if let Some(ref monitor) = self.monitor {
            size += monitor.size() + USER_DATA_HEADER_SIZE;
        }
        if let Some(ref monitor_extended) = self.monitor_extended {
            size += monitor_extended.size() + USER_DATA_HEADER_SIZE;
        }
        if let Some(ref multi_transport) = self.multi_transport {
            size += multi_transport.size() + USER_DATA_HEADER_SIZE;
        }

        size
    }
}

impl<'de> Decode<'de> for ClientGccBlocks {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        let mut core = None;
        let mut security = None;
        let mut network = None;
        let mut monitor = None;
        let mut monitor_extended = None;
        let mut multi_transport = None;

        loop {
            let (ty, cur) = user_header_try!(UserDataHeader::decode(src));

            match ty {
                ClientGccType::CoreData => core = Some(decode(cur)?),
                ClientGccType::SecurityData => security = Some(decode(cur)?),
                ClientGccType::NetworkData => network = Some(decode(cur)?),
                ClientGccType::MonitorData => monitor = Some(decode(cur)?),
                ClientGccType::MonitorExtendedData => monitor_extended = Some(decode(cur)?),
                ClientGccType::MultiTransportChannelData => multi_transport = Some(decode(cur)?),
                ClientGccType::ClusterData | ClientGccType::MessageChannelData => {}
            };
        }

        Ok(Self {
            core: core.ok_or_else(|| invalid_field_err!("core", "required GCC core block is absent"))?,
            security: security.ok_or_else(|| invalid_field_err!("security", "required GCC security block is absent"))?,
            network,
            monitor,
            monitor_extended,
            multi_transport,
        })
    }
}

/// Server MCS Connect Response user-data blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerGccBlocks {
    pub core: ServerCoreData,
    pub network: ServerNetworkData,
    pub security: ServerSecurityData,
    pub multi_transport: Option<MultiTransportChannelData>,
}

impl ServerGccBlocks {
    const NAME: &'static str = "ServerGccBlocks";
}

impl Encode for ServerGccBlocks {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        UserDataHeader::encode(dst, ServerGccType::CoreData.as_u16(), &self.core)?;
        UserDataHeader::encode(dst, ServerGccType::NetworkData.as_u16(), &self.network)?;
        UserDataHeader::encode(dst, ServerGccType::SecurityData.as_u16(), &self.security)?;

        if let Some(ref multi_transport) = self.multi_transport {
            UserDataHeader::encode(dst, ServerGccType::MultiTransportChannelData.as_u16(), multi_transport)?;
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        let mut size = self.core.size() + self.network.size() + self.security.size() + USER_DATA_HEADER_SIZE * 3;

        if let Some(ref multi_transport) = self.multi_transport {
            size += multi_transport.size() + USER_DATA_HEADER_SIZE;
        }

        size
    }
}

impl<'de> Decode<'de> for ServerGccBlocks {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        let mut core = None;
        let mut network = None;
        let mut security = None;
        let mut multi_transport = None;

        loop {
            let (ty, cur) = user_header_try!(UserDataHeader::decode(src));

            match ty {
                ServerGccType::CoreData => core = Some(decode(cur)?),
                ServerGccType::NetworkData => network = Some(decode(cur)?),
                ServerGccType::SecurityData => security = Some(decode(cur)?),
                ServerGccType::MultiTransportChannelData => multi_transport = Some(decode(cur)?),
                ServerGccType::MessageChannelData => {}
            };
        }

        Ok(Self {
            core: core.ok_or_else(|| invalid_field_err!("core", "required GCC core block is absent"))?,
            network: network.ok_or_else(|| invalid_field_err!("network", "required GCC network block is absent"))?,
            security: security.ok_or_else(|| invalid_field_err!("security", "required GCC security block is absent"))?,
            multi_transport,
        })
    }
}

#[repr(u16)]
#[derive(Debug, Copy, Clone, FromPrimitive)]
pub enum ClientGccType {
    CoreData = 0xC001,
    SecurityData = 0xC002,
    NetworkData = 0xC003,
    ClusterData = 0xC004,
    MonitorData = 0xC005,
    MessageChannelData = 0xC006,
    MonitorExtendedData = 0xC008,
    MultiTransportChannelData = 0xC00A,
}

impl ClientGccType {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

#[repr(u16)]
#[derive(Debug, Copy, Clone, FromPrimitive)]
pub enum ServerGccType {
    CoreData = 0x0C01,
    SecurityData = 0x0C02,
    NetworkData = 0x0C03,
    MessageChannelData = 0x0C04,
    MultiTransportChannelData = 0x0C08,
}

impl ServerGccType {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// TS_UD_HEADER prefixing every user-data block.
#[derive(Debug)]
pub struct UserDataHeader;

impl UserDataHeader {
    const NAME: &'static str = "UserDataHeader";

    const FIXED_PART_SIZE: usize = 2 /* blockType */ + 2 /* blockLen */;

    pub fn encode<T, B>(dst: &mut WriteCursor<'_>, block_type: T, block: &B) -> EncodeResult<()>
    where
        T: Into<u16>,
        B: Encode,
    {
        ensure_fixed_part_size!(in: dst);

        dst.write_u16(block_type.into());
        dst.write_u16(cast_length!(Self::NAME, "blockLen", block.size() + USER_DATA_HEADER_SIZE)?);
        block.encode(dst)?;

        Ok(())
    }

    pub fn decode<'de, T>(src: &mut ReadCursor<'de>) -> DecodeResult<(T, &'de [u8])>
    where
        T: FromPrimitive,
    {
        ensure_fixed_part_size!(in: src);

        let block_type =
            T::from_u16(src.read_u16()).ok_or_else(|| invalid_field_err!("blockType", "invalid GCC block type"))?;
        let block_length: usize = cast_length!(Self::NAME, "blockLen", src.read_u16())?;

        if block_length <= USER_DATA_HEADER_SIZE {
            return Err(invalid_field_err!("blockLen", "invalid user data header length"));
        }

        let len = block_length - USER_DATA_HEADER_SIZE;
        ensure_size!(in: src, size: len);

        Ok((block_type, src.read_slice(len)))
    }
}
