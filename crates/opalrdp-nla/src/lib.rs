#![cfg_attr(doc, doc = include_str!("../README.md"))]

mod credssp;
mod crypto;
mod der;
mod ntlm;

use core::fmt;

pub use credssp::{CredsspSequence, CredsspTsRequestHint, TsRequest, CREDSSP_TS_REQUEST_HINT};
pub use ntlm::{AvPair, NtlmContext, AV_ID_CHANNEL_BINDINGS, AV_ID_EOL, AV_ID_TIMESTAMP};

pub type NlaResult<T> = Result<T, NlaError>;

pub type NlaError = opalrdp_core::Error<NlaErrorKind>;

#[non_exhaustive]
#[derive(Debug)]
pub enum NlaErrorKind {
    Encode(opalrdp_core::EncodeError),
    Decode(opalrdp_core::DecodeError),
    /// Authentication failed: bad credentials, channel-binding mismatch,
    /// public key mismatch or MIC mismatch. Always terminal.
    AuthFailed(&'static str),
    MissingChannelBinding,
    General,
}

impl fmt::Display for NlaErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encode(_) => write!(f, "encode error"),
            Self::Decode(_) => write!(f, "decode error"),
            Self::AuthFailed(reason) => write!(f, "authentication failed: {reason}"),
            Self::MissingChannelBinding => write!(f, "TLS channel binding is missing"),
            Self::General => write!(f, "general error"),
        }
    }
}

impl std::error::Error for NlaErrorKind {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Encode(e) => Some(e),
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

pub trait NlaErrorExt {
    fn encode(error: opalrdp_core::EncodeError) -> Self;
    fn decode(error: opalrdp_core::DecodeError) -> Self;
    fn auth_failed(context: &'static str, reason: &'static str) -> Self;
    fn general(context: &'static str) -> Self;
}

impl NlaErrorExt for NlaError {
    fn encode(error: opalrdp_core::EncodeError) -> Self {
        Self::new("encode error", NlaErrorKind::Encode(error))
    }

    fn decode(error: opalrdp_core::DecodeError) -> Self {
        Self::new("decode error", NlaErrorKind::Decode(error))
    }

    fn auth_failed(context: &'static str, reason: &'static str) -> Self {
        Self::new(context, NlaErrorKind::AuthFailed(reason))
    }

    fn general(context: &'static str) -> Self {
        Self::new(context, NlaErrorKind::General)
    }
}

/// Credentials for the NTLM exchange.
#[derive(Debug, Clone)]
pub struct NlaCredentials {
    pub username: String,
    pub password: String,
    pub domain: Option<String>,
}
