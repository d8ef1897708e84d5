//! Credential provider
//!
//! Loads TLS material from the environment, builds client and server
//! transport credentials for the configured deployment mode, and supplies
//! identity tokens for platform-authenticated calls.

mod expiry;
mod material;
pub mod pki;
mod token;
mod transport;

pub use expiry::{refresh_deadline, Clock, SystemClock};
pub use material::{
    ca_var, cert_var, env_prefix, key_var, load_ca, load_certificate, CaBundle,
    CertificateMaterial, CredentialError, CredentialErrorKind,
};
pub use token::{
    jwt_expiry, BearerToken, MetadataTokenSource, StaticTokenSource, TokenError, TokenSource,
    DEFAULT_METADATA_HOST, METADATA_HOST_VAR,
};
pub use transport::{
    client_credentials, server_credentials, tls_domain, ClientCredentials, ServerCredentials,
};

#[cfg(test)]
#[path = "material_test.rs"]
mod material_tests;

#[cfg(test)]
#[path = "transport_test.rs"]
mod transport_tests;

#[cfg(test)]
#[path = "token_test.rs"]
mod token_tests;

#[cfg(test)]
#[path = "pki_test.rs"]
mod pki_tests;
