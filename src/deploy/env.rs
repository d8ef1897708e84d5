//! Deployment mode resolution
//!
//! `ENV` selects one of `dev`, `staging` or `prod`. An unset variable means
//! `dev`; anything else is rejected so a typo can never silently disable TLS.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Variable selecting the deployment mode
pub const ENV_VAR: &str = "ENV";

/// Variable selecting the release credential strategy
pub const STRATEGY_VAR: &str = "CREDENTIAL_STRATEGY";

/// Errors raised while resolving the deployment configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvError {
    #[error("unrecognized value for variable 'ENV': '{0}'")]
    UnrecognizedMode(String),

    #[error("unrecognized value for variable 'CREDENTIAL_STRATEGY': '{0}'")]
    UnrecognizedStrategy(String),
}

/// Read access to environment variables
///
/// Components take an `EnvSource` instead of calling `std::env` directly,
/// so tests can inject variables without touching the process environment.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;
}

/// The real process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

impl<E: EnvSource + ?Sized> EnvSource for &E {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }
}

/// Deployment mode of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeploymentMode {
    /// Local mode: insecure transport, no identity tokens
    #[default]
    Development,
    Staging,
    Production,
}

impl DeploymentMode {
    /// Staging and production require real TLS material and identity tokens
    pub fn is_release(self) -> bool {
        matches!(self, DeploymentMode::Staging | DeploymentMode::Production)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeploymentMode::Development => "dev",
            DeploymentMode::Staging => "staging",
            DeploymentMode::Production => "prod",
        }
    }
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentMode {
    type Err = EnvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev" => Ok(DeploymentMode::Development),
            "staging" => Ok(DeploymentMode::Staging),
            "prod" => Ok(DeploymentMode::Production),
            other => Err(EnvError::UnrecognizedMode(other.to_string())),
        }
    }
}

/// How release deployments authenticate RPC traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialStrategy {
    /// System root CAs for the server, plus a per-call bearer identity token
    #[default]
    PlatformIdentity,
    /// Every service holds its own cert/key/CA triple; servers demand client certs
    PeerPinned,
}

impl FromStr for CredentialStrategy {
    type Err = EnvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "platform-identity" => Ok(CredentialStrategy::PlatformIdentity),
            "peer-pinned" => Ok(CredentialStrategy::PeerPinned),
            other => Err(EnvError::UnrecognizedStrategy(other.to_string())),
        }
    }
}

/// Process-wide deployment configuration, resolved once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeployConfig {
    mode: DeploymentMode,
    strategy: CredentialStrategy,
}

impl DeployConfig {
    pub fn new(mode: DeploymentMode, strategy: CredentialStrategy) -> Self {
        Self { mode, strategy }
    }

    /// Local development configuration
    pub fn development() -> Self {
        Self::default()
    }

    /// Resolve the configuration from `ENV` and `CREDENTIAL_STRATEGY`
    pub fn from_env(env: &impl EnvSource) -> Result<Self, EnvError> {
        let mode = match env.get(ENV_VAR).filter(|v| !v.is_empty()) {
            Some(value) => value.parse()?,
            None => DeploymentMode::Development,
        };
        let strategy = match env.get(STRATEGY_VAR).filter(|v| !v.is_empty()) {
            Some(value) => value.parse()?,
            None => CredentialStrategy::default(),
        };

        Ok(Self { mode, strategy })
    }

    pub fn mode(&self) -> DeploymentMode {
        self.mode
    }

    pub fn strategy(&self) -> CredentialStrategy {
        self.strategy
    }

    pub fn is_release(&self) -> bool {
        self.mode.is_release()
    }
}
