//! Self-signed TLS identity for the session listener.
//!
//! On first start the server mints a self-signed certificate (CN "KeyCast",
//! SANs `localhost`/`127.0.0.1`) and persists it next to the config file as
//! `keycast.crt` / `keycast.key`. Later starts reuse the persisted pair so
//! clients see a stable identity across restarts; if either file is missing
//! or unparseable a fresh pair is generated and written over it.
//!
//! Clients do not verify this certificate (see `keycast-client::tls`), so TLS
//! here provides transport encryption, not server authentication.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio_rustls::TlsAcceptor;
use tracing::{info, warn};

/// Error type for TLS identity operations.
#[derive(Debug, Error)]
pub enum TlsError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Certificate generation failed.
    #[error("certificate generation failed: {0}")]
    Generate(#[from] rcgen::Error),

    /// The PEM material could not be parsed.
    #[error("invalid PEM material: {0}")]
    InvalidPem(String),

    /// The key file contained no usable private key.
    #[error("no private key found in PEM")]
    MissingKey,

    /// rustls rejected the certificate/key pair.
    #[error("TLS configuration rejected: {0}")]
    Config(#[from] rustls::Error),
}

const CERT_FILE: &str = "keycast.crt";
const KEY_FILE: &str = "keycast.key";
const VALIDITY_DAYS: i64 = 3650;

/// Certificate validity anchored at generation time, ten years long.
fn validity_window() -> (time::OffsetDateTime, time::OffsetDateTime) {
    let not_before = time::OffsetDateTime::now_utc();
    (not_before, not_before + time::Duration::days(VALIDITY_DAYS))
}

/// A certificate/key pair in PEM form, ready to build an acceptor from.
#[derive(Debug, Clone)]
pub struct TlsIdentity {
    cert_pem: String,
    key_pem: String,
}

impl TlsIdentity {
    /// Loads the persisted identity from `dir`, generating and persisting a
    /// fresh one when the files are absent or unusable.
    ///
    /// # Errors
    ///
    /// Returns [`TlsError`] when generation or persistence fails; a failed
    /// load alone is recovered from by regenerating.
    pub fn load_or_generate(dir: &Path) -> Result<Self, TlsError> {
        let cert_path = dir.join(CERT_FILE);
        let key_path = dir.join(KEY_FILE);

        match Self::load(&cert_path, &key_path) {
            Ok(identity) => {
                info!("loaded TLS identity from {}", cert_path.display());
                Ok(identity)
            }
            Err(e) => {
                warn!("no usable TLS identity ({e}), generating a new one");
                let identity = Self::generate()?;
                identity.persist(dir)?;
                info!("generated TLS identity at {}", cert_path.display());
                Ok(identity)
            }
        }
    }

    /// Loads and validates a persisted PEM pair.
    fn load(cert_path: &Path, key_path: &Path) -> Result<Self, TlsError> {
        let cert_pem = std::fs::read_to_string(cert_path).map_err(|source| TlsError::Io {
            path: cert_path.to_path_buf(),
            source,
        })?;
        let key_pem = std::fs::read_to_string(key_path).map_err(|source| TlsError::Io {
            path: key_path.to_path_buf(),
            source,
        })?;

        let identity = Self { cert_pem, key_pem };
        // Parse eagerly so corrupt files trigger regeneration now rather than
        // a handshake failure later.
        identity.parse_certs()?;
        identity.parse_key()?;
        Ok(identity)
    }

    /// Mints a fresh self-signed certificate valid for ten years.
    fn generate() -> Result<Self, TlsError> {
        let mut params = rcgen::CertificateParams::new(vec![
            "localhost".to_string(),
            "127.0.0.1".to_string(),
        ])?;
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, "KeyCast");
        let (not_before, not_after) = validity_window();
        params.not_before = not_before;
        params.not_after = not_after;

        let key_pair = rcgen::KeyPair::generate()?;
        let cert = params.self_signed(&key_pair)?;

        Ok(Self {
            cert_pem: cert.pem(),
            key_pem: key_pair.serialize_pem(),
        })
    }

    /// Writes the PEM pair into `dir`, creating the directory if needed.
    fn persist(&self, dir: &Path) -> Result<(), TlsError> {
        std::fs::create_dir_all(dir).map_err(|source| TlsError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let cert_path = dir.join(CERT_FILE);
        std::fs::write(&cert_path, &self.cert_pem).map_err(|source| TlsError::Io {
            path: cert_path,
            source,
        })?;
        let key_path = dir.join(KEY_FILE);
        std::fs::write(&key_path, &self.key_pem).map_err(|source| TlsError::Io {
            path: key_path,
            source,
        })?;
        Ok(())
    }

    fn parse_certs(&self) -> Result<Vec<rustls::pki_types::CertificateDer<'static>>, TlsError> {
        let certs: Vec<_> = rustls_pemfile::certs(&mut self.cert_pem.as_bytes())
            .collect::<Result<_, _>>()
            .map_err(|e| TlsError::InvalidPem(e.to_string()))?;
        if certs.is_empty() {
            return Err(TlsError::InvalidPem("no certificates in PEM".to_string()));
        }
        Ok(certs)
    }

    fn parse_key(&self) -> Result<rustls::pki_types::PrivateKeyDer<'static>, TlsError> {
        rustls_pemfile::private_key(&mut self.key_pem.as_bytes())
            .map_err(|e| TlsError::InvalidPem(e.to_string()))?
            .ok_or(TlsError::MissingKey)
    }

    /// Builds a [`TlsAcceptor`] for the session listener.
    ///
    /// # Errors
    ///
    /// Returns [`TlsError::Config`] if rustls rejects the pair.
    pub fn acceptor(&self) -> Result<TlsAcceptor, TlsError> {
        let certs = self.parse_certs()?;
        let key = self.parse_key()?;

        let config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)?;

        Ok(TlsAcceptor::from(Arc::new(config)))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("keycast_tls_test_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_validity_window_starts_now_and_spans_ten_years() {
        let before = time::OffsetDateTime::now_utc();
        let (not_before, not_after) = validity_window();
        let after = time::OffsetDateTime::now_utc();

        // Anchored at generation time, never a fixed date.
        assert!(not_before >= before && not_before <= after);
        assert_eq!(not_after - not_before, time::Duration::days(3650));
    }

    #[test]
    fn test_generate_produces_parseable_pem_pair() {
        let identity = TlsIdentity::generate().expect("generate");
        assert!(!identity.parse_certs().unwrap().is_empty());
        identity.parse_key().expect("key must parse");
    }

    #[test]
    fn test_acceptor_builds_from_generated_identity() {
        let identity = TlsIdentity::generate().expect("generate");
        identity.acceptor().expect("acceptor must build");
    }

    #[test]
    fn test_load_or_generate_persists_and_reloads_same_identity() {
        let dir = temp_dir();

        let first = TlsIdentity::load_or_generate(&dir).expect("first call");
        assert!(dir.join(CERT_FILE).exists());
        assert!(dir.join(KEY_FILE).exists());

        let second = TlsIdentity::load_or_generate(&dir).expect("second call");
        assert_eq!(
            first.cert_pem, second.cert_pem,
            "persisted identity must be reused, not regenerated"
        );

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_corrupt_cert_file_triggers_regeneration() {
        let dir = temp_dir();

        let first = TlsIdentity::load_or_generate(&dir).expect("first call");
        std::fs::write(dir.join(CERT_FILE), "not a certificate").unwrap();

        let second = TlsIdentity::load_or_generate(&dir).expect("recovery call");
        assert_ne!(first.cert_pem, second.cert_pem);
        second.acceptor().expect("regenerated identity must work");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_key_file_triggers_regeneration() {
        let dir = temp_dir();

        TlsIdentity::load_or_generate(&dir).expect("first call");
        std::fs::remove_file(dir.join(KEY_FILE)).unwrap();

        let identity = TlsIdentity::load_or_generate(&dir).expect("recovery call");
        identity.parse_key().expect("fresh key must parse");

        std::fs::remove_dir_all(&dir).ok();
    }
}
