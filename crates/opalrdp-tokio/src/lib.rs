#![cfg_attr(doc, doc = include_str!("../README.md"))]

#[macro_use]
extern crate tracing;

mod connect;
mod framed;
mod session;

use core::fmt;

pub use connect::{connect_begin, connect_finalize, perform_credssp, single_sequence_step};
pub use framed::Framed;
pub use session::{Session, SessionBuilder, SessionOptions};

pub type ClientResult<T> = Result<T, ClientError>;

pub type ClientError = opalrdp_core::Error<ClientErrorKind>;

#[non_exhaustive]
#[derive(Debug)]
pub enum ClientErrorKind {
    /// TCP or TLS I/O failure. Terminal.
    Io(std::io::Error),
    /// Failure during the connection sequence (negotiation, auth,
    /// licensing, capabilities). Terminal.
    Connector(opalrdp_connector::ConnectorError),
    /// Failure during the active stage. Terminal.
    Session(opalrdp_session::SessionError),
    Encode(opalrdp_core::EncodeError),
    /// A configured timeout elapsed.
    Timeout,
    /// Cooperative cancellation; a clean termination.
    Cancelled,
    General,
}

impl fmt::Display for ClientErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(_) => write!(f, "transport I/O error"),
            Self::Connector(_) => write!(f, "connection sequence error"),
            Self::Session(_) => write!(f, "session error"),
            Self::Encode(_) => write!(f, "encode error"),
            Self::Timeout => write!(f, "timed out"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::General => write!(f, "general error"),
        }
    }
}

impl std::error::Error for ClientErrorKind {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Connector(e) => Some(e),
            Self::Session(e) => Some(e),
            Self::Encode(e) => Some(e),
            _ => None,
        }
    }
}

pub trait ClientErrorExt {
    fn io(error: std::io::Error) -> Self;
    fn connector(error: opalrdp_connector::ConnectorError) -> Self;
    fn session(error: opalrdp_session::SessionError) -> Self;
    fn encode(error: opalrdp_core::EncodeError) -> Self;
    fn cancelled(context: &'static str) -> Self;
    fn general(context: &'static str) -> Self;
    /// Whether this error is the cooperative-cancellation outcome.
    fn is_cancelled(&self) -> bool;
}

impl ClientErrorExt for ClientError {
    fn io(error: std::io::Error) -> Self {
        Self::new("transport", ClientErrorKind::Io(error))
    }

    fn connector(error: opalrdp_connector::ConnectorError) -> Self {
        Self::new("connector", ClientErrorKind::Connector(error))
    }

    fn session(error: opalrdp_session::SessionError) -> Self {
        Self::new("session", ClientErrorKind::Session(error))
    }

    fn encode(error: opalrdp_core::EncodeError) -> Self {
        Self::new("encode", ClientErrorKind::Encode(error))
    }

    fn cancelled(context: &'static str) -> Self {
        Self::new(context, ClientErrorKind::Cancelled)
    }

    fn general(context: &'static str) -> Self {
        Self::new(context, ClientErrorKind::General)
    }

    fn is_cancelled(&self) -> bool {
        matches!(self.kind(), ClientErrorKind::Cancelled)
    }
}
