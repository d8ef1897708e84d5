//! Deployment environment and configuration
//!
//! The deployment mode is resolved once at startup into a [`DeployConfig`]
//! and passed explicitly to every component that branches on it.

mod config;
mod env;

pub use config::{load_config, ConfigError, ConfigFile};
pub use env::{
    CredentialStrategy, DeployConfig, DeploymentMode, EnvError, EnvSource, ProcessEnv,
    ENV_VAR, STRATEGY_VAR,
};

#[cfg(test)]
#[path = "env_test.rs"]
mod env_tests;

#[cfg(test)]
#[path = "config_test.rs"]
mod config_tests;
