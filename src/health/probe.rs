//! Dependency probes
//!
//! A probe reports, for every dependency it knows about, either success or
//! the error that made the dependency unusable. Each call produces a fresh
//! [`DependencyStatus`]; nothing carries over between cycles.

use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpStream;

/// Default connect timeout for [`TcpProbe`]
pub const DEFAULT_TCP_TIMEOUT: Duration = Duration::from_secs(2);

/// Per-dependency results of one probe run
#[derive(Debug, Default)]
pub struct DependencyStatus {
    results: BTreeMap<String, Option<anyhow::Error>>,
}

impl DependencyStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn healthy(mut self, key: impl Into<String>) -> Self {
        self.results.insert(key.into(), None);
        self
    }

    pub fn failed(mut self, key: impl Into<String>, error: impl Into<anyhow::Error>) -> Self {
        self.results.insert(key.into(), Some(error.into()));
        self
    }

    /// Record the outcome of checking `key`
    pub fn record<E>(&mut self, key: impl Into<String>, outcome: Result<(), E>)
    where
        E: Into<anyhow::Error>,
    {
        self.results.insert(key.into(), outcome.err().map(Into::into));
    }

    /// Whether `key` reported an error; absent keys did not fail
    pub fn is_failed(&self, key: &str) -> bool {
        matches!(self.results.get(key), Some(Some(_)))
    }

    pub fn all_healthy(&self) -> bool {
        self.results.values().all(Option::is_none)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &anyhow::Error)> {
        self.results
            .iter()
            .filter_map(|(key, err)| err.as_ref().map(|err| (key.as_str(), err)))
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Caller-supplied check of every external dependency
///
/// Probes bound their own latency; a slow probe only delays the next cycle.
#[async_trait]
pub trait DependencyProbe: Send + Sync {
    async fn probe(&self) -> DependencyStatus;
}

#[async_trait]
impl<F, Fut> DependencyProbe for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = DependencyStatus> + Send,
{
    async fn probe(&self) -> DependencyStatus {
        (self)().await
    }
}

/// Probe that checks TCP reachability of each dependency
#[derive(Debug, Clone, Deserialize)]
pub struct TcpProbe {
    /// Dependency key -> `host:port`
    targets: BTreeMap<String, String>,
    #[serde(default = "default_tcp_timeout", with = "millis")]
    timeout: Duration,
}

fn default_tcp_timeout() -> Duration {
    DEFAULT_TCP_TIMEOUT
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

impl TcpProbe {
    pub fn new(targets: BTreeMap<String, String>) -> Self {
        Self {
            targets,
            timeout: DEFAULT_TCP_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn targets(&self) -> &BTreeMap<String, String> {
        &self.targets
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl DependencyProbe for TcpProbe {
    async fn probe(&self) -> DependencyStatus {
        let checks = self.targets.iter().map(|(key, addr)| async move {
            let outcome = match tokio::time::timeout(self.timeout, TcpStream::connect(addr)).await
            {
                Ok(Ok(_stream)) => Ok(()),
                Ok(Err(e)) => Err(anyhow::anyhow!("connect to {} failed: {}", addr, e)),
                Err(_) => Err(anyhow::anyhow!(
                    "connect to {} timed out after {}ms",
                    addr,
                    self.timeout.as_millis()
                )),
            };
            (key.clone(), outcome)
        });

        let mut status = DependencyStatus::new();
        for (key, outcome) in join_all(checks).await {
            status.record(key, outcome);
        }
        status
    }
}
