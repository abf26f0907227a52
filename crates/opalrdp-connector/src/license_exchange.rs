//! Licensing exchange, accept-only.
//!
//! The client never holds or requests a license: it reads the server's
//! licensing traffic on the I/O channel and completes once the server grants
//! STATUS_VALID_CLIENT (or issues a new license we have no use for). A
//! genuine licensing error is terminal.

use std::mem;

use opalrdp_core::WriteBuf;
use opalrdp_pdu::rdp::server_license::ServerLicensePdu;
use opalrdp_pdu::PduHint;

use crate::envelopes;
use crate::{ConnectorError, ConnectorErrorKind, ConnectorResult, Sequence, State, Written};

#[derive(Default, Debug)]
#[non_exhaustive]
pub enum LicenseExchangeState {
    #[default]
    Consumed,

    WaitLicense,
    LicenseExchanged,
}

impl State for LicenseExchangeState {
    fn name(&self) -> &'static str {
        match self {
            Self::Consumed => "Consumed",
            Self::WaitLicense => "WaitLicense",
            Self::LicenseExchanged => "LicenseExchanged",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::LicenseExchanged)
    }

    fn as_any(&self) -> &dyn core::any::Any {
        self
    }
}

#[derive(Debug)]
pub struct LicenseExchangeSequence {
    pub state: LicenseExchangeState,
    pub io_channel_id: u16,
}

impl LicenseExchangeSequence {
    pub fn new(io_channel_id: u16) -> Self {
        Self {
            state: LicenseExchangeState::WaitLicense,
            io_channel_id,
        }
    }
}

impl Sequence for LicenseExchangeSequence {
    fn next_pdu_hint(&self) -> Option<&dyn PduHint> {
        match self.state {
            LicenseExchangeState::Consumed => None,
            LicenseExchangeState::WaitLicense => Some(&opalrdp_pdu::X224_HINT),
            LicenseExchangeState::LicenseExchanged => None,
        }
    }

    fn state(&self) -> &dyn State {
        &self.state
    }

    fn step(&mut self, input: &[u8], _output: &mut WriteBuf) -> ConnectorResult<Written> {
        let next_state = match mem::take(&mut self.state) {
            LicenseExchangeState::Consumed => {
                return Err(general_err!("license exchange sequence state is consumed (this is a bug)"))
            }

            LicenseExchangeState::WaitLicense => {
                let ctx = envelopes::decode_send_data_indication(input)?;
                let license_pdu = ctx.decode_user_data::<ServerLicensePdu>()?;

                debug!(message = ?license_pdu, "Received");

                match &license_pdu {
                    pdu if pdu.is_valid_client() => {
                        info!("Server granted licensing (valid client)");
                        LicenseExchangeState::LicenseExchanged
                    }
                    ServerLicensePdu::ErrorAlert { error_code, .. } => {
                        error!(code = error_code.0, "Server rejected the licensing exchange");
                        return Err(ConnectorError::new("license exchange", ConnectorErrorKind::Licensing));
                    }
                    ServerLicensePdu::OtherMessage { message_type, .. } => {
                        // A full issuance exchange would start here; this
                        // client does not participate.
                        error!(message_type = message_type.0, "Unsupported licensing exchange requested");
                        return Err(ConnectorError::new("license exchange", ConnectorErrorKind::Licensing));
                    }
                }
            }

            LicenseExchangeState::LicenseExchanged => return Err(general_err!("licensing already finished")),
        };

        self.state = next_state;

        Ok(Written::Nothing)
    }
}
