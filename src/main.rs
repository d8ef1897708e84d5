//! `deploykit` health sidecar
//!
//! Serves `grpc.health.v1.Health` for a service whose readiness depends on
//! TCP reachability of its backing stores. Configuration comes from a YAML
//! file (plus an optional per-mode overlay) and the deployment environment.

use deploykit::deploy::{load_config, ConfigFile, DeployConfig, DeploymentMode, EnvSource, ProcessEnv};
use deploykit::health::{ServiceHealthMap, TcpProbe, DEFAULT_TCP_TIMEOUT};
use deploykit::server::{listen, new_server, serve, wait_for_signal};
use deploykit::telemetry::init_tracing;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Variable holding the path of the base config file
const CONFIG_VAR: &str = "DEPLOYKIT_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "deploykit.yaml";

/// Sidecar settings after merging the config files
#[derive(Debug, Deserialize)]
pub struct SidecarConfig {
    pub port: u16,
    pub service_name: String,
    /// Dependency key -> `host:port`
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub services: ServiceHealthMap,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

fn default_probe_timeout_ms() -> u64 {
    DEFAULT_TCP_TIMEOUT.as_millis() as u64
}

impl SidecarConfig {
    pub fn probe(&self) -> TcpProbe {
        TcpProbe::new(self.dependencies.clone())
            .with_timeout(Duration::from_millis(self.probe_timeout_ms))
    }
}

/// `deploykit.yaml` -> `deploykit.prod.yaml`
pub fn overlay_path(base: &Path, mode: DeploymentMode) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match base.extension() {
        Some(ext) => format!("{}.{}.{}", stem, mode, ext.to_string_lossy()),
        None => format!("{}.{}", stem, mode),
    };
    base.with_file_name(name)
}

/// Read the base file and, if present, the overlay for `mode`
pub fn read_config(base: &Path, mode: DeploymentMode) -> anyhow::Result<SidecarConfig> {
    let contents = std::fs::read_to_string(base)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {}", base.display(), e))?;
    let mut files = vec![ConfigFile::global(contents)];

    let overlay = overlay_path(base, mode);
    if overlay.exists() {
        let contents = std::fs::read_to_string(&overlay)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {}", overlay.display(), e))?;
        files.push(ConfigFile::for_mode(mode, contents));
    }

    Ok(load_config(mode, &files)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let deploy = DeployConfig::from_env(&ProcessEnv)?;

    init_tracing(deploy.mode())
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))?;

    info!(mode = %deploy.mode(), "Starting deploykit health sidecar");

    let path = ProcessEnv
        .get(CONFIG_VAR)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let settings = match read_config(Path::new(&path), deploy.mode()) {
        Ok(settings) => settings,
        Err(e) => {
            error!(path = %path, error = %e, "Failed to load configuration");
            return Err(e);
        }
    };

    info!(
        service = %settings.service_name,
        port = settings.port,
        dependencies = settings.dependencies.len(),
        services = settings.services.len(),
        "Configuration loaded"
    );

    let probe = Arc::new(settings.probe());
    let listener = listen(settings.port).await?;
    let (server, aggregator) = match new_server(
        &deploy,
        &ProcessEnv,
        &settings.service_name,
        settings.services,
        probe,
    ) {
        Ok(built) => built,
        Err(e) => {
            error!(error = %e, "Failed to configure gRPC server");
            return Err(e.into());
        }
    };

    let mut handle = serve(server.router(), listener)?;
    let refresher = tokio::spawn(aggregator.run(handle.subscribe()));

    let signal = wait_for_signal().await?;
    info!(signal, "Initiating graceful shutdown");

    handle.shutdown().await?;
    if let Err(e) = refresher.await {
        warn!(error = %e, "Health aggregator task failed");
    }

    info!("deploykit shut down gracefully");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
