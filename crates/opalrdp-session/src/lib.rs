#![cfg_attr(doc, doc = include_str!("../README.md"))]

#[macro_use]
extern crate tracing;

pub mod fast_path;
pub mod x224;

mod active_stage;

use core::fmt;

pub use active_stage::{ActiveStage, ActiveStageOutput};

pub type SessionResult<T> = Result<T, SessionError>;

pub type SessionError = opalrdp_core::Error<SessionErrorKind>;

#[non_exhaustive]
#[derive(Debug)]
pub enum SessionErrorKind {
    Encode(opalrdp_core::EncodeError),
    Decode(opalrdp_core::DecodeError),
    Connector(opalrdp_connector::ConnectorError),
    Reason(String),
    General,
}

impl fmt::Display for SessionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SessionErrorKind::Encode(_) => write!(f, "encode error"),
            SessionErrorKind::Decode(_) => write!(f, "decode error"),
            SessionErrorKind::Connector(_) => write!(f, "connector error"),
            SessionErrorKind::Reason(description) => write!(f, "reason: {description}"),
            SessionErrorKind::General => write!(f, "general error"),
        }
    }
}

impl std::error::Error for SessionErrorKind {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self {
            SessionErrorKind::Encode(e) => Some(e),
            SessionErrorKind::Decode(e) => Some(e),
            SessionErrorKind::Connector(e) => Some(e),
            _ => None,
        }
    }
}

pub trait SessionErrorExt {
    fn encode(error: opalrdp_core::EncodeError) -> Self;
    fn decode(error: opalrdp_core::DecodeError) -> Self;
    fn connector(error: opalrdp_connector::ConnectorError) -> Self;
    fn general(context: &'static str) -> Self;
    fn reason(context: &'static str, reason: impl Into<String>) -> Self;
}

impl SessionErrorExt for SessionError {
    fn encode(error: opalrdp_core::EncodeError) -> Self {
        Self::new("encode error", SessionErrorKind::Encode(error))
    }

    fn decode(error: opalrdp_core::DecodeError) -> Self {
        Self::new("decode error", SessionErrorKind::Decode(error))
    }

    fn connector(error: opalrdp_connector::ConnectorError) -> Self {
        Self::new("envelope error", SessionErrorKind::Connector(error))
    }

    fn general(context: &'static str) -> Self {
        Self::new(context, SessionErrorKind::General)
    }

    fn reason(context: &'static str, reason: impl Into<String>) -> Self {
        Self::new(context, SessionErrorKind::Reason(reason.into()))
    }
}

macro_rules! session_general_err {
    ( $context:expr $(,)? ) => {{
        <$crate::SessionError as $crate::SessionErrorExt>::general($context)
    }};
}

macro_rules! session_reason_err {
    ( $context:expr, $($arg:tt)* ) => {{
        <$crate::SessionError as $crate::SessionErrorExt>::reason($context, format!($($arg)*))
    }};
}

pub(crate) use {session_general_err, session_reason_err};

/// One decoded display region handed to the consumer.
///
/// Rows are top-down and tightly packed at `bpp`. The slice borrows from
/// session-internal buffers: copy it to keep it beyond the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitmapRegion<'a> {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    pub bpp: u8,
    pub data: &'a [u8],
}

/// Consumer of decoded display updates.
///
/// Invoked on the session reader task, in arrival order. Implementations
/// must not block on anything that requires the reader to make progress;
/// long work belongs on the consumer's own worker.
pub trait BitmapProcessor: Send {
    fn process_region(&mut self, region: BitmapRegion<'_>);
}

opalrdp_core::assert_obj_safe!(BitmapProcessor);
