//! Development PKI for exercising peer-pinned mTLS locally
//!
//! Generates a self-signed CA and one leaf certificate for a service. The
//! leaf carries both server and client auth usages, so the same triple can
//! be used by the service's server and by its callers.
//!
//! ## Certificate Chain
//! ```text
//! Self-signed CA ({service}-dev-ca)
//!     └── Leaf cert ({service}, SANs from dns_names)
//! ```

use super::material::{ca_var, cert_var, key_var};
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose, SanType,
};
use std::collections::HashMap;
use thiserror::Error;

/// Default validity period for the CA certificate (1 year)
pub const CA_VALIDITY_DAYS: u32 = 365;

/// Default validity period for the leaf certificate (90 days)
pub const LEAF_VALIDITY_DAYS: u32 = 90;

/// Errors that can occur during certificate generation
#[derive(Debug, Error)]
pub enum PkiError {
    #[error("Failed to generate certificate: {0}")]
    Generation(#[from] rcgen::Error),

    #[error("Invalid DNS name {name}: {reason}")]
    InvalidDnsName { name: String, reason: String },
}

/// Generated CA plus leaf certificate for one service
#[derive(Clone)]
pub struct ServiceBundle {
    pub service_name: String,
    /// PEM-encoded CA certificate
    pub ca_cert_pem: String,
    /// PEM-encoded leaf certificate
    pub cert_pem: String,
    /// PEM-encoded leaf private key
    pub key_pem: String,
}

impl ServiceBundle {
    /// The bundle as the environment variables the credential loader reads
    pub fn env_vars(&self) -> HashMap<String, String> {
        HashMap::from([
            (cert_var(&self.service_name), self.cert_pem.clone()),
            (key_var(&self.service_name), self.key_pem.clone()),
            (ca_var(&self.service_name), self.ca_cert_pem.clone()),
        ])
    }

    /// Shell `export` lines for the three variables
    pub fn shell_exports(&self) -> String {
        [
            (cert_var(&self.service_name), &self.cert_pem),
            (key_var(&self.service_name), &self.key_pem),
            (ca_var(&self.service_name), &self.ca_cert_pem),
        ]
        .iter()
        .map(|(name, pem)| format!("export {}='{}'\n", name, pem.trim_end()))
        .collect()
    }
}

fn generate_ca(service_name: &str) -> Result<(Certificate, KeyPair), PkiError> {
    let mut params = CertificateParams::default();

    params
        .distinguished_name
        .push(DnType::CommonName, format!("{}-dev-ca", service_name));
    params
        .distinguished_name
        .push(DnType::OrganizationName, "deploykit");

    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];

    let now = time::OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + time::Duration::days(CA_VALIDITY_DAYS as i64);

    let key_pair = KeyPair::generate()?;
    let cert = params.self_signed(&key_pair)?;

    Ok((cert, key_pair))
}

fn generate_leaf(
    ca_cert: &Certificate,
    ca_key: &KeyPair,
    service_name: &str,
    dns_names: &[String],
) -> Result<(String, String), PkiError> {
    let mut params = CertificateParams::default();

    params
        .distinguished_name
        .push(DnType::CommonName, service_name);
    params
        .distinguished_name
        .push(DnType::OrganizationName, "deploykit");

    params.subject_alt_names = dns_names
        .iter()
        .map(|name| {
            name.clone()
                .try_into()
                .map(SanType::DnsName)
                .map_err(|e: rcgen::Error| PkiError::InvalidDnsName {
                    name: name.clone(),
                    reason: e.to_string(),
                })
        })
        .collect::<Result<_, _>>()?;

    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ServerAuth,
        ExtendedKeyUsagePurpose::ClientAuth,
    ];

    let now = time::OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + time::Duration::days(LEAF_VALIDITY_DAYS as i64);

    let key_pair = KeyPair::generate()?;
    let cert = params.signed_by(&key_pair, ca_cert, ca_key)?;

    Ok((cert.pem(), key_pair.serialize_pem()))
}

/// Generate a CA and a leaf certificate for `service_name`
///
/// # Arguments
/// * `service_name` - Service identifier, also the leaf common name
/// * `dns_names` - Subject alternative names of the leaf (e.g. "localhost")
pub fn generate_service_bundle(
    service_name: &str,
    dns_names: &[String],
) -> Result<ServiceBundle, PkiError> {
    let (ca_cert, ca_key) = generate_ca(service_name)?;
    let (cert_pem, key_pem) = generate_leaf(&ca_cert, &ca_key, service_name, dns_names)?;

    Ok(ServiceBundle {
        service_name: service_name.to_string(),
        ca_cert_pem: ca_cert.pem(),
        cert_pem,
        key_pem,
    })
}
