//! Server Set Error Info PDU.

use opalrdp_core::{ensure_fixed_part_size, Decode, DecodeResult, Encode, EncodeResult, ReadCursor, WriteCursor};

/// Subset of the protocol-independent error codes a server reports on the IO
/// channel. Some of them are part of the graceful disconnect procedure rather
/// than actual failures.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ProtocolIndependentCode {
    None,
    RpcInitiatedDisconnect,
    RpcInitiatedLogoff,
    IdleTimeout,
    LogonTimeout,
    DisconnectedByOtherConnection,
    OutOfMemory,
    ServerDeniedConnection,
    ServerInsufficientPrivileges,
    ServerFreshCredentialsRequired,
    RpcInitiatedDisconnectByUser,
    LogoffByUser,
}

impl ProtocolIndependentCode {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0x0000_0000 => Some(Self::None),
            0x0000_0001 => Some(Self::RpcInitiatedDisconnect),
            0x0000_0002 => Some(Self::RpcInitiatedLogoff),
            0x0000_0003 => Some(Self::IdleTimeout),
            0x0000_0004 => Some(Self::LogonTimeout),
            0x0000_0005 => Some(Self::DisconnectedByOtherConnection),
            0x0000_0006 => Some(Self::OutOfMemory),
            0x0000_0007 => Some(Self::ServerDeniedConnection),
            0x0000_0009 => Some(Self::ServerInsufficientPrivileges),
            0x0000_000A => Some(Self::ServerFreshCredentialsRequired),
            0x0000_000B => Some(Self::RpcInitiatedDisconnectByUser),
            0x0000_000C => Some(Self::LogoffByUser),
            _ => None,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::None => "no error",
            Self::RpcInitiatedDisconnect => "administrator-initiated disconnect",
            Self::RpcInitiatedLogoff => "administrator-initiated logoff",
            Self::IdleTimeout => "idle timeout reached",
            Self::LogonTimeout => "logon timeout reached",
            Self::DisconnectedByOtherConnection => "replaced by another connection",
            Self::OutOfMemory => "server out of memory",
            Self::ServerDeniedConnection => "server denied the connection",
            Self::ServerInsufficientPrivileges => "insufficient privileges",
            Self::ServerFreshCredentialsRequired => "fresh credentials required",
            Self::RpcInitiatedDisconnectByUser => "user-initiated disconnect",
            Self::LogoffByUser => "user-initiated logoff",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorInfo {
    ProtocolIndependentCode(ProtocolIndependentCode),
    Raw(u32),
}

impl ErrorInfo {
    pub fn from_u32(value: u32) -> Self {
        match ProtocolIndependentCode::from_u32(value) {
            Some(code) => Self::ProtocolIndependentCode(code),
            None => Self::Raw(value),
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Self::ProtocolIndependentCode(code) => match code {
                ProtocolIndependentCode::None => 0x0000_0000,
                ProtocolIndependentCode::RpcInitiatedDisconnect => 0x0000_0001,
                ProtocolIndependentCode::RpcInitiatedLogoff => 0x0000_0002,
                ProtocolIndependentCode::IdleTimeout => 0x0000_0003,
                ProtocolIndependentCode::LogonTimeout => 0x0000_0004,
                ProtocolIndependentCode::DisconnectedByOtherConnection => 0x0000_0005,
                ProtocolIndependentCode::OutOfMemory => 0x0000_0006,
                ProtocolIndependentCode::ServerDeniedConnection => 0x0000_0007,
                ProtocolIndependentCode::ServerInsufficientPrivileges => 0x0000_0009,
                ProtocolIndependentCode::ServerFreshCredentialsRequired => 0x0000_000A,
                ProtocolIndependentCode::RpcInitiatedDisconnectByUser => 0x0000_000B,
                ProtocolIndependentCode::LogoffByUser => 0x0000_000C,
            },
            Self::Raw(value) => value,
        }
    }

    pub fn description(self) -> String {
        match self {
            Self::ProtocolIndependentCode(code) => code.description().to_owned(),
            Self::Raw(value) => format!("server error info code {value:#010X}"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ServerSetErrorInfoPdu(pub ErrorInfo);

impl ServerSetErrorInfoPdu {
    const NAME: &'static str = "ServerSetErrorInfoPdu";

    const FIXED_PART_SIZE: usize = 4 /* errorInfo */;
}

impl Encode for ServerSetErrorInfoPdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> EncodeResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u32(self.0.as_u32());

        Ok(())
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for ServerSetErrorInfoPdu {
    fn decode(src: &mut ReadCursor<'de>) -> DecodeResult<Self> {
        ensure_fixed_part_size!(in: src);

        Ok(Self(ErrorInfo::from_u32(src.read_u32())))
    }
}
