//! TLS material sourced from environment variables
//!
//! Each service has three variables holding PEM text:
//! `{SERVICE}_CERT`, `{SERVICE}_KEY` and `{SERVICE}_CA`, where `{SERVICE}`
//! is the service name uppercased with `-` and `.` replaced by `_`.
//!
//! Loading fails closed: a missing variable or unparseable PEM is an error,
//! never a partially-populated credential.

use crate::deploy::EnvSource;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::RootCertStore;
use rustls_pemfile::{certs, private_key};
use std::io::BufReader;
use std::sync::Arc;
use thiserror::Error;

pub const CERT_SUFFIX: &str = "_CERT";
pub const KEY_SUFFIX: &str = "_KEY";
pub const CA_SUFFIX: &str = "_CA";

/// Errors that can occur while loading credential material
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("missing certificate: variable {0} is not set")]
    MissingCert(String),

    #[error("missing private key: variable {0} is not set")]
    MissingKey(String),

    #[error("missing CA bundle: variable {0} is not set")]
    MissingCa(String),

    #[error("failed to parse {var}: {reason}")]
    Parse { var: String, reason: String },

    #[error("peer-pinned credentials for {0} need a service name")]
    MissingService(String),
}

/// Discriminant of [`CredentialError`], for callers that branch on the failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialErrorKind {
    MissingCert,
    MissingKey,
    MissingCa,
    Parse,
    MissingService,
}

impl CredentialError {
    pub fn kind(&self) -> CredentialErrorKind {
        match self {
            CredentialError::MissingCert(_) => CredentialErrorKind::MissingCert,
            CredentialError::MissingKey(_) => CredentialErrorKind::MissingKey,
            CredentialError::MissingCa(_) => CredentialErrorKind::MissingCa,
            CredentialError::Parse { .. } => CredentialErrorKind::Parse,
            CredentialError::MissingService(_) => CredentialErrorKind::MissingService,
        }
    }

    fn parse(var: &str, reason: impl Into<String>) -> Self {
        CredentialError::Parse {
            var: var.to_string(),
            reason: reason.into(),
        }
    }
}

/// Prefix of the credential variables for a service
///
/// `orders-api` becomes `ORDERS_API`.
pub fn env_prefix(service_name: &str) -> String {
    service_name
        .chars()
        .map(|c| match c {
            '-' | '.' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

pub fn cert_var(service_name: &str) -> String {
    format!("{}{}", env_prefix(service_name), CERT_SUFFIX)
}

pub fn key_var(service_name: &str) -> String {
    format!("{}{}", env_prefix(service_name), KEY_SUFFIX)
}

pub fn ca_var(service_name: &str) -> String {
    format!("{}{}", env_prefix(service_name), CA_SUFFIX)
}

/// A parsed certificate chain and its private key
///
/// The PEM text is retained for handing to the transport layer; the pair has
/// already been validated by building a rustls config from it.
#[derive(Clone)]
pub struct CertificateMaterial {
    cert_pem: String,
    key_pem: String,
    subject: String,
    not_after: i64,
}

impl CertificateMaterial {
    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    pub fn key_pem(&self) -> &str {
        &self.key_pem
    }

    /// Subject distinguished name of the leaf certificate
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Expiry of the leaf certificate, as a Unix timestamp
    pub fn not_after(&self) -> i64 {
        self.not_after
    }

    /// Build the tonic identity presented during the handshake
    pub fn identity(&self) -> tonic::transport::Identity {
        tonic::transport::Identity::from_pem(&self.cert_pem, &self.key_pem)
    }
}

impl std::fmt::Debug for CertificateMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateMaterial")
            .field("subject", &self.subject)
            .field("not_after", &self.not_after)
            .finish_non_exhaustive()
    }
}

/// A parsed CA bundle
#[derive(Clone)]
pub struct CaBundle {
    pem: String,
    roots: Arc<RootCertStore>,
}

impl CaBundle {
    pub fn pem(&self) -> &str {
        &self.pem
    }

    /// Number of trust anchors in the bundle
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn roots(&self) -> Arc<RootCertStore> {
        Arc::clone(&self.roots)
    }

    pub fn certificate(&self) -> tonic::transport::Certificate {
        tonic::transport::Certificate::from_pem(&self.pem)
    }
}

impl std::fmt::Debug for CaBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaBundle")
            .field("anchors", &self.roots.len())
            .finish()
    }
}

/// Load and validate `{SERVICE}_CERT` and `{SERVICE}_KEY`
pub fn load_certificate(
    env: &impl EnvSource,
    service_name: &str,
) -> Result<CertificateMaterial, CredentialError> {
    let cert_var = cert_var(service_name);
    let key_var = key_var(service_name);

    let cert_pem = env
        .get(&cert_var)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| CredentialError::MissingCert(cert_var.clone()))?;
    let key_pem = env
        .get(&key_var)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| CredentialError::MissingKey(key_var.clone()))?;

    let chain = parse_certificates(&cert_var, &cert_pem)?;

    let (subject, not_after) = {
        let (_, leaf) = x509_parser::parse_x509_certificate(chain[0].as_ref())
            .map_err(|e| CredentialError::parse(&cert_var, format!("invalid X.509: {}", e)))?;
        (
            leaf.subject().to_string(),
            leaf.validity().not_after.timestamp(),
        )
    };

    let key = private_key(&mut BufReader::new(key_pem.as_bytes()))
        .map_err(|e| CredentialError::parse(&key_var, format!("invalid PEM: {}", e)))?
        .ok_or_else(|| CredentialError::parse(&key_var, "no private key found"))?;

    verify_key_pair(chain, key).map_err(|reason| CredentialError::parse(&key_var, reason))?;

    Ok(CertificateMaterial {
        cert_pem,
        key_pem,
        subject,
        not_after,
    })
}

/// Load and validate `{SERVICE}_CA`
pub fn load_ca(env: &impl EnvSource, service_name: &str) -> Result<CaBundle, CredentialError> {
    let ca_var = ca_var(service_name);

    let pem = env
        .get(&ca_var)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| CredentialError::MissingCa(ca_var.clone()))?;

    let mut roots = RootCertStore::empty();
    for cert in parse_certificates(&ca_var, &pem)? {
        roots
            .add(cert)
            .map_err(|e| CredentialError::parse(&ca_var, format!("rejected CA certificate: {}", e)))?;
    }

    Ok(CaBundle {
        pem,
        roots: Arc::new(roots),
    })
}

/// Parse every certificate in a PEM document, failing on the first bad block
fn parse_certificates(
    var: &str,
    pem: &str,
) -> Result<Vec<CertificateDer<'static>>, CredentialError> {
    let chain = certs(&mut BufReader::new(pem.as_bytes()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CredentialError::parse(var, format!("invalid PEM: {}", e)))?;

    if chain.is_empty() {
        return Err(CredentialError::parse(var, "no certificate found"));
    }

    Ok(chain)
}

/// Confirm the key is usable with the chain by building a server config from it
fn verify_key_pair(
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<(), String> {
    rustls::ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| format!("failed to set protocol versions: {}", e))?
        .with_no_client_auth()
        .with_single_cert(chain, key)
        .map_err(|e| format!("certificate and key do not form a usable pair: {}", e))?;

    Ok(())
}
