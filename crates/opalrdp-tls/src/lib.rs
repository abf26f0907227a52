#![cfg_attr(doc, doc = include_str!("../README.md"))]

use std::io;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt as _};
use x509_cert::der::Decode as _;

pub type TlsStream<S> = tokio_rustls::client::TlsStream<S>;

/// The material captured from the TLS handshake for NLA.
#[derive(Debug, Clone)]
pub struct PeerCertificate {
    /// The whole leaf certificate, DER. SHA-256 of this is the channel
    /// binding token (RFC 5929 tls-server-end-point).
    pub der: Vec<u8>,
    /// Content of the certificate's `subjectPublicKey` BIT STRING, used by
    /// the CredSSP pubKeyAuth round.
    pub public_key: Vec<u8>,
}

/// Upgrades `stream` to TLS, accepting any server certificate and capturing
/// the peer certificate for channel binding.
pub async fn upgrade<S>(stream: S, server_name: &str) -> io::Result<(TlsStream<S>, PeerCertificate)>
where
    S: Unpin + AsyncRead + AsyncWrite,
{
    let mut tls_stream = {
        let mut config = tokio_rustls::rustls::client::ClientConfig::builder()
            .with_safe_defaults()
            .with_custom_certificate_verifier(std::sync::Arc::new(danger::NoCertificateVerification))
            .with_no_client_auth();

        // TLS session resumption is not supported by CredSSP.
        config.resumption = tokio_rustls::rustls::client::Resumption::disabled();

        let config = std::sync::Arc::new(config);

        let server_name = server_name
            .try_into()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "invalid server name"))?;

        tokio_rustls::TlsConnector::from(config).connect(server_name, stream).await?
    };

    tls_stream.flush().await?;

    let peer_certificate = {
        let cert = tls_stream
            .get_ref()
            .1
            .peer_certificates()
            .and_then(|certificates| certificates.first())
            .ok_or_else(|| io::Error::other("peer certificate is missing"))?;

        let der = cert.0.clone();
        let public_key = extract_tls_server_public_key(&der)?;

        PeerCertificate { der, public_key }
    };

    Ok((tls_stream, peer_certificate))
}

/// Extracts the content of the `subjectPublicKey` BIT STRING from a DER
/// certificate.
pub fn extract_tls_server_public_key(cert_der: &[u8]) -> io::Result<Vec<u8>> {
    let cert = x509_cert::Certificate::from_der(cert_der)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let public_key = cert
        .tbs_certificate
        .subject_public_key_info
        .subject_public_key
        .as_bytes()
        .ok_or_else(|| io::Error::other("subject public key has unused bits"))?;

    Ok(public_key.to_vec())
}

mod danger {
    use std::time::SystemTime;

    use tokio_rustls::rustls::client::{ServerCertVerified, ServerCertVerifier};
    use tokio_rustls::rustls::{Certificate, Error, ServerName};

    pub(super) struct NoCertificateVerification;

    impl ServerCertVerifier for NoCertificateVerification {
        fn verify_server_cert(
            &self,
            _end_entity: &Certificate,
            _intermediates: &[Certificate],
            _server_name: &ServerName,
            _scts: &mut dyn Iterator<Item = &[u8]>,
            _ocsp_response: &[u8],
            _now: SystemTime,
        ) -> Result<ServerCertVerified, Error> {
            Ok(ServerCertVerified::assertion())
        }
    }
}
