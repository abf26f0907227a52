#![cfg_attr(doc, doc = include_str!("../README.md"))]

#[macro_use]
extern crate tracing;

#[macro_use]
mod macros;

pub mod envelopes;

mod channel_connection;
mod connection;
mod connection_activation;
mod connection_finalization;
mod license_exchange;

use core::any::Any;
use core::fmt;

pub use self::channel_connection::{ChannelConnectionSequence, ChannelConnectionState};
pub use self::connection::{ClientConnector, ClientConnectorState, ConnectionResult};
pub use self::connection_activation::{ConnectionActivationSequence, ConnectionActivationState};
pub use self::connection_finalization::{ConnectionFinalizationSequence, ConnectionFinalizationState};
pub use self::license_exchange::{LicenseExchangeSequence, LicenseExchangeState};

use opalrdp_core::WriteBuf;
use opalrdp_pdu::gcc::Monitor;
use opalrdp_pdu::nego::FailureCode;
use opalrdp_pdu::rdp::capability_sets::MajorPlatformType;
use opalrdp_pdu::rdp::client_info::PerformanceFlags;
use opalrdp_pdu::PduHint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesktopSize {
    pub width: u16,
    pub height: u16,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub domain: Option<String>,
}

/// Everything the connection sequence needs to know up front.
#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    pub desktop_size: DesktopSize,
    /// Requested color depth: 8, 15, 16, 24 or 32 bits per pixel.
    pub color_depth: u32,
    /// TLS without NLA (`PROTOCOL_SSL`).
    pub enable_tls: bool,
    /// TLS + CredSSP (`PROTOCOL_HYBRID`).
    pub enable_credssp: bool,
    pub client_build: u32,
    /// Truncated to 15 characters on the wire.
    pub client_name: String,
    pub keyboard_layout: u32,
    pub keyboard_subtype: u32,
    pub keyboard_functional_keys_count: u32,
    pub ime_file_name: String,
    pub dig_product_id: String,
    pub client_dir: String,
    pub platform: MajorPlatformType,
    pub performance_flags: PerformanceFlags,
    /// The client IP address reported in the Client Info PDU.
    pub client_address: String,
    pub autologon: bool,
    /// Bitmap cache tier capacities advertised in the capability exchange.
    pub bitmap_cache_entries: [u32; 3],
    /// Advertise bulk compression support. Decoding compressed PDUs is not
    /// implemented, so this stays off unless the integrator knows better.
    pub compression: bool,
    /// Monitor layout; empty means single-monitor implied by `desktop_size`.
    /// When non-empty, exactly one monitor must carry the PRIMARY flag.
    pub monitors: Vec<Monitor>,
}

impl Config {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            desktop_size: DesktopSize {
                width: 1920,
                height: 1080,
            },
            color_depth: 24,
            enable_tls: true,
            enable_credssp: true,
            client_build: 0,
            client_name: "opalrdp".to_owned(),
            keyboard_layout: 0x0000_0409, // en-US
            keyboard_subtype: 0,
            keyboard_functional_keys_count: 12,
            ime_file_name: String::new(),
            dig_product_id: String::new(),
            client_dir: "C:\\Windows\\System32\\mstscax.dll".to_owned(),
            platform: MajorPlatformType::Unspecified,
            performance_flags: PerformanceFlags::DISABLE_WALLPAPER | PerformanceFlags::DISABLE_MENUANIMATIONS,
            client_address: "0.0.0.0".to_owned(),
            autologon: false,
            bitmap_cache_entries: [600, 300, 100],
            compression: false,
            monitors: Vec::new(),
        }
    }
}

/// A state of one of the connection sequences, for progress reporting.
pub trait State: Send + fmt::Debug + 'static {
    fn name(&self) -> &'static str;
    fn is_terminal(&self) -> bool;
    fn as_any(&self) -> &dyn Any;
}

opalrdp_core::assert_obj_safe!(State);

impl State for () {
    fn name(&self) -> &'static str {
        "()"
    }

    fn is_terminal(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// How much a sequence step wrote into the output buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Written {
    Nothing,
    Size(core::num::NonZeroUsize),
}

impl Written {
    #[inline]
    pub fn from_size(value: usize) -> ConnectorResult<Self> {
        core::num::NonZeroUsize::new(value)
            .map(Self::Size)
            .ok_or_else(|| general_err!("invalid written length (can't be zero)"))
    }

    #[inline]
    pub fn is_nothing(self) -> bool {
        matches!(self, Self::Nothing)
    }

    #[inline]
    pub fn size(self) -> Option<usize> {
        if let Self::Size(size) = self {
            Some(size.get())
        } else {
            None
        }
    }
}

/// A sans-IO sub-sequence: the caller reads the frame described by
/// [`Sequence::next_pdu_hint`] (when any) and passes it to [`Sequence::step`],
/// then writes whatever landed in the output buffer.
pub trait Sequence: Send {
    fn next_pdu_hint(&self) -> Option<&dyn PduHint>;

    fn state(&self) -> &dyn State;

    fn step(&mut self, input: &[u8], output: &mut WriteBuf) -> ConnectorResult<Written>;

    fn step_no_input(&mut self, output: &mut WriteBuf) -> ConnectorResult<Written> {
        self.step(&[], output)
    }
}

opalrdp_core::assert_obj_safe!(Sequence);

pub type ConnectorResult<T> = Result<T, ConnectorError>;

pub type ConnectorError = opalrdp_core::Error<ConnectorErrorKind>;

#[non_exhaustive]
#[derive(Debug)]
pub enum ConnectorErrorKind {
    Encode(opalrdp_core::EncodeError),
    Decode(opalrdp_core::DecodeError),
    /// The server refused every offered protocol or selected one the client
    /// did not offer.
    Negotiation(FailureCode),
    /// NLA failure.
    Auth(opalrdp_nla::NlaError),
    /// The licensing exchange ended without a usable grant.
    Licensing,
    /// A required capability is absent from the server capability sets.
    Capability(&'static str),
    Reason(String),
    AccessDenied,
    General,
    Custom,
}

impl fmt::Display for ConnectorErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            Self::Encode(_) => write!(f, "encode error"),
            Self::Decode(_) => write!(f, "decode error"),
            Self::Negotiation(code) => write!(f, "negotiation failure: {}", code.description()),
            Self::Auth(_) => write!(f, "authentication failure"),
            Self::Licensing => write!(f, "licensing failure"),
            Self::Capability(name) => write!(f, "required capability absent: {name}"),
            Self::Reason(description) => write!(f, "reason: {description}"),
            Self::AccessDenied => write!(f, "access denied"),
            Self::General => write!(f, "general error"),
            Self::Custom => write!(f, "custom error"),
        }
    }
}

impl std::error::Error for ConnectorErrorKind {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self {
            Self::Encode(e) => Some(e),
            Self::Decode(e) => Some(e),
            Self::Auth(e) => Some(e),
            _ => None,
        }
    }
}

pub trait ConnectorErrorExt {
    fn encode(error: opalrdp_core::EncodeError) -> Self;
    fn decode(error: opalrdp_core::DecodeError) -> Self;
    fn auth(error: opalrdp_nla::NlaError) -> Self;
    fn general(context: &'static str) -> Self;
    fn reason(context: &'static str, reason: impl Into<String>) -> Self;
    fn custom<E>(context: &'static str, e: E) -> Self
    where
        E: std::error::Error + Sync + Send + 'static;
}

impl ConnectorErrorExt for ConnectorError {
    fn encode(error: opalrdp_core::EncodeError) -> Self {
        Self::new("encode error", ConnectorErrorKind::Encode(error))
    }

    fn decode(error: opalrdp_core::DecodeError) -> Self {
        Self::new("decode error", ConnectorErrorKind::Decode(error))
    }

    fn auth(error: opalrdp_nla::NlaError) -> Self {
        Self::new("CredSSP", ConnectorErrorKind::Auth(error))
    }

    fn general(context: &'static str) -> Self {
        Self::new(context, ConnectorErrorKind::General)
    }

    fn reason(context: &'static str, reason: impl Into<String>) -> Self {
        Self::new(context, ConnectorErrorKind::Reason(reason.into()))
    }

    fn custom<E>(context: &'static str, e: E) -> Self
    where
        E: std::error::Error + Sync + Send + 'static,
    {
        Self::new(context, ConnectorErrorKind::Custom).with_source(e)
    }
}

pub trait ConnectorResultExt {
    #[must_use]
    fn with_context(self, context: &'static str) -> Self;
}

impl<T> ConnectorResultExt for ConnectorResult<T> {
    fn with_context(self, context: &'static str) -> Self {
        self.map_err(|mut e| {
            e.context = context;
            e
        })
    }
}
