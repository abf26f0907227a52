//! Drives the connector sequence over a [`Framed`] transport.

use opalrdp_connector::{ClientConnector, ClientConnectorState, ConnectionResult, ConnectorResult};
use opalrdp_core::WriteBuf;
use opalrdp_nla::CredsspSequence;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::framed::Framed;

/// Runs the sequence until the transport must be upgraded to TLS.
pub async fn connect_begin<S>(framed: &mut Framed<S>, connector: &mut ClientConnector) -> ConnectorResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = WriteBuf::new();

    info!("Begin connection procedure");

    while !connector.should_perform_security_upgrade() {
        single_sequence_step(framed, connector, &mut buf).await?;
    }

    Ok(())
}

/// Runs the CredSSP exchange over the (upgraded) transport.
pub async fn perform_credssp<S>(framed: &mut Framed<S>, credssp: &mut CredsspSequence) -> ConnectorResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = WriteBuf::new();

    while !credssp.is_done() {
        buf.clear();

        let input = if let Some(hint) = credssp.next_pdu_hint() {
            debug!(hint = ?hint, "Wait for TSRequest");

            Some(
                framed
                    .read_by_hint(hint)
                    .await
                    .map_err(|e| opalrdp_connector::custom_err!("read frame by hint", e))?,
            )
        } else {
            None
        };

        let written = credssp
            .step(input.as_deref().unwrap_or(&[]), &mut buf)
            .map_err(opalrdp_connector::ConnectorErrorExt::auth)?;

        if written > 0 {
            framed
                .write_all(buf.filled())
                .await
                .map_err(|e| opalrdp_connector::custom_err!("write all", e))?;
        }
    }

    Ok(())
}

/// Runs the remaining sequence until the connection result is produced.
pub async fn connect_finalize<S>(
    framed: &mut Framed<S>,
    mut connector: ClientConnector,
) -> ConnectorResult<ConnectionResult>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = WriteBuf::new();

    let result = loop {
        single_sequence_step(framed, &mut connector, &mut buf).await?;

        if let ClientConnectorState::Connected { result } = connector.state {
            break result;
        }
    };

    info!("Connected with success");

    Ok(result)
}

/// One read/step/write round of any connector sequence.
pub async fn single_sequence_step<S>(
    framed: &mut Framed<S>,
    sequence: &mut dyn opalrdp_connector::Sequence,
    buf: &mut WriteBuf,
) -> ConnectorResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    buf.clear();

    let written = if let Some(next_pdu_hint) = sequence.next_pdu_hint() {
        debug!(
            state = sequence.state().name(),
            hint = ?next_pdu_hint,
            "Wait for PDU"
        );

        let pdu = framed
            .read_by_hint(next_pdu_hint)
            .await
            .map_err(|e| opalrdp_connector::custom_err!("read frame by hint", e))?;

        trace!(length = pdu.len(), "PDU received");

        sequence.step(&pdu, buf)?
    } else {
        sequence.step_no_input(buf)?
    };

    if let Some(response_len) = written.size() {
        debug_assert_eq!(buf.filled_len(), response_len);
        let response = buf.filled();
        trace!(response_len, "Send response");
        framed
            .write_all(response)
            .await
            .map_err(|e| opalrdp_connector::custom_err!("write all", e))?;
    }

    Ok(())
}
