//! Transport credentials for clients and servers
//!
//! Development mode always gets plaintext. Release modes branch on the
//! configured [`CredentialStrategy`]:
//!
//! | Strategy            | Client                             | Server                      |
//! |---------------------|------------------------------------|-----------------------------|
//! | `PeerPinned`        | own cert/key + service CA          | own cert/key, client cert required |
//! | `PlatformIdentity`  | system roots + bearer token        | plaintext behind platform TLS edge |

use super::material::{load_ca, load_certificate, CaBundle, CertificateMaterial, CredentialError};
use crate::deploy::{CredentialStrategy, DeployConfig, EnvSource};
use tonic::transport::{ClientTlsConfig, ServerTlsConfig};

/// Credentials used to dial a peer
#[derive(Debug, Clone)]
pub enum ClientCredentials {
    /// No authentication, no encryption (development)
    Insecure,
    /// Mutual TLS against a privately pinned CA
    PeerPinned {
        identity: CertificateMaterial,
        ca: CaBundle,
        domain: String,
    },
    /// TLS against the system roots; calls carry an identity token
    PlatformIdentity { domain: String },
}

impl ClientCredentials {
    pub fn is_encrypted(&self) -> bool {
        !matches!(self, ClientCredentials::Insecure)
    }

    /// Whether calls on this channel must carry a bearer identity token
    pub fn uses_identity_token(&self) -> bool {
        matches!(self, ClientCredentials::PlatformIdentity { .. })
    }

    /// Server name verified during the handshake
    pub fn domain(&self) -> Option<&str> {
        match self {
            ClientCredentials::Insecure => None,
            ClientCredentials::PeerPinned { domain, .. }
            | ClientCredentials::PlatformIdentity { domain } => Some(domain),
        }
    }

    /// Build the tonic TLS config, `None` for plaintext
    pub fn tls_config(&self) -> Option<ClientTlsConfig> {
        match self {
            ClientCredentials::Insecure => None,
            ClientCredentials::PeerPinned {
                identity,
                ca,
                domain,
            } => Some(
                ClientTlsConfig::new()
                    .ca_certificate(ca.certificate())
                    .identity(identity.identity())
                    .domain_name(domain.clone()),
            ),
            ClientCredentials::PlatformIdentity { domain } => Some(
                ClientTlsConfig::new()
                    .with_native_roots()
                    .domain_name(domain.clone()),
            ),
        }
    }
}

/// Credentials used to accept connections
#[derive(Debug, Clone)]
pub enum ServerCredentials {
    /// No authentication, no encryption (development)
    Insecure,
    /// TLS with a mandatory client certificate signed by the service CA
    MutualTls {
        identity: CertificateMaterial,
        client_ca: CaBundle,
    },
    /// Plaintext; the hosting platform terminates TLS and authenticates callers
    PlatformTerminated,
}

impl ServerCredentials {
    pub fn is_encrypted(&self) -> bool {
        matches!(self, ServerCredentials::MutualTls { .. })
    }

    pub fn requires_client_cert(&self) -> bool {
        matches!(self, ServerCredentials::MutualTls { .. })
    }

    /// Build the tonic TLS config, `None` when the server listens in plaintext
    pub fn tls_config(&self) -> Option<ServerTlsConfig> {
        match self {
            ServerCredentials::MutualTls {
                identity,
                client_ca,
            } => Some(
                ServerTlsConfig::new()
                    .identity(identity.identity())
                    .client_ca_root(client_ca.certificate()),
            ),
            ServerCredentials::Insecure | ServerCredentials::PlatformTerminated => None,
        }
    }
}

/// Resolve the credentials for dialing `host`
///
/// `service_name` selects the cert/key/CA triple and is required under the
/// peer-pinned strategy.
pub fn client_credentials(
    config: &DeployConfig,
    env: &impl EnvSource,
    host: &str,
    service_name: Option<&str>,
) -> Result<ClientCredentials, CredentialError> {
    if !config.is_release() {
        return Ok(ClientCredentials::Insecure);
    }

    let domain = tls_domain(host);

    match config.strategy() {
        CredentialStrategy::PeerPinned => {
            let service_name = service_name
                .ok_or_else(|| CredentialError::MissingService(host.to_string()))?;
            let identity = load_certificate(env, service_name)?;
            let ca = load_ca(env, service_name)?;

            Ok(ClientCredentials::PeerPinned {
                identity,
                ca,
                domain,
            })
        }
        CredentialStrategy::PlatformIdentity => Ok(ClientCredentials::PlatformIdentity { domain }),
    }
}

/// Resolve the credentials for serving `service_name`
pub fn server_credentials(
    config: &DeployConfig,
    env: &impl EnvSource,
    service_name: &str,
) -> Result<ServerCredentials, CredentialError> {
    if !config.is_release() {
        return Ok(ServerCredentials::Insecure);
    }

    match config.strategy() {
        CredentialStrategy::PeerPinned => {
            let identity = load_certificate(env, service_name)?;
            let client_ca = load_ca(env, service_name)?;

            Ok(ServerCredentials::MutualTls {
                identity,
                client_ca,
            })
        }
        CredentialStrategy::PlatformIdentity => Ok(ServerCredentials::PlatformTerminated),
    }
}

/// Host name to verify for `host`, which may carry a scheme and a port
pub fn tls_domain(host: &str) -> String {
    let host = host
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(host);
    let host = host.split('/').next().unwrap_or(host);

    if let Some(inner) = host.strip_prefix('[') {
        // [::1]:443
        return inner.split(']').next().unwrap_or(inner).to_string();
    }

    // A bare IPv6 address has several colons and no port
    match host.rsplit_once(':') {
        Some((name, port))
            if !name.contains(':')
                && !port.is_empty()
                && port.chars().all(|c| c.is_ascii_digit()) =>
        {
            name.to_string()
        }
        _ => host.to_string(),
    }
}
