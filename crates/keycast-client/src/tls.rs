//! TLS connector for client sessions.
//!
//! KeyCast servers present a self-signed certificate generated on first run,
//! so the client cannot chain-validate against a public root store. The
//! connector instead accepts any server certificate; TLS here provides
//! transport encryption, not server identity.

use std::sync::Arc;

use rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use thiserror::Error;
use tokio_rustls::TlsConnector;

/// Error type for TLS connector construction.
#[derive(Debug, Error)]
pub enum TlsError {
    /// The server address could not be used as a TLS server name.
    #[error("invalid TLS server name {0:?}")]
    InvalidServerName(String),
}

/// Certificate verifier that accepts any server certificate.
///
/// Encryption without authentication: the session password is the only
/// identity check between peers on the LAN.
#[derive(Debug)]
struct AcceptAnyServerCert;

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ED25519,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
        ]
    }
}

/// Builds a [`TlsConnector`] that trusts any server certificate.
pub fn connector() -> TlsConnector {
    let config = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

/// Converts a host string (IP literal or hostname) to a rustls
/// [`ServerName`] suitable for `TlsConnector::connect`.
pub fn server_name(host: &str) -> Result<ServerName<'static>, TlsError> {
    ServerName::try_from(host.to_string()).map_err(|_| TlsError::InvalidServerName(host.to_string()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_name_accepts_ip_literal() {
        assert!(server_name("192.168.1.5").is_ok());
    }

    #[test]
    fn test_server_name_accepts_hostname() {
        assert!(server_name("workstation.local").is_ok());
    }

    #[test]
    fn test_server_name_rejects_garbage() {
        assert!(server_name("not a host name").is_err());
    }

    #[test]
    fn test_connector_builds() {
        // Construction exercises the verifier wiring.
        let _ = connector();
    }
}
