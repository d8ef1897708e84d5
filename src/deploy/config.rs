//! Layered YAML configuration
//!
//! A service ships several YAML documents: some apply everywhere, some only
//! to one deployment mode. Applicable documents are merged in order, later
//! keys overriding earlier ones, then deserialized into the caller's type.

use super::DeploymentMode;
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};
use thiserror::Error;

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse config file #{index}: {source}")]
    Parse {
        index: usize,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Merged config does not match the expected shape: {0}")]
    Shape(#[source] serde_yaml::Error),
}

/// One YAML document and the deployment mode it applies to
#[derive(Debug, Clone)]
pub struct ConfigFile {
    contents: String,
    scope: Option<DeploymentMode>,
}

impl ConfigFile {
    /// A document applied in every mode
    pub fn global(contents: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
            scope: None,
        }
    }

    /// A document applied only under `mode`
    pub fn for_mode(mode: DeploymentMode, contents: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
            scope: Some(mode),
        }
    }

    pub fn dev(contents: impl Into<String>) -> Self {
        Self::for_mode(DeploymentMode::Development, contents)
    }

    pub fn staging(contents: impl Into<String>) -> Self {
        Self::for_mode(DeploymentMode::Staging, contents)
    }

    pub fn prod(contents: impl Into<String>) -> Self {
        Self::for_mode(DeploymentMode::Production, contents)
    }

    fn applies_to(&self, mode: DeploymentMode) -> bool {
        self.scope.map_or(true, |scope| scope == mode)
    }
}

/// Merge every file applicable to `mode` and deserialize the result
pub fn load_config<T: DeserializeOwned>(
    mode: DeploymentMode,
    files: &[ConfigFile],
) -> Result<T, ConfigError> {
    let mut merged = Value::Mapping(Mapping::new());

    for (index, file) in files.iter().enumerate() {
        if !file.applies_to(mode) {
            continue;
        }

        let value: Value = serde_yaml::from_str(&file.contents)
            .map_err(|source| ConfigError::Parse { index, source })?;

        // An empty document parses as null and contributes nothing
        if !value.is_null() {
            merge(&mut merged, value);
        }
    }

    serde_yaml::from_value(merged).map_err(ConfigError::Shape)
}

/// Deep-merge `overlay` into `base`; mappings merge key by key, anything else replaces
fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base), Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
