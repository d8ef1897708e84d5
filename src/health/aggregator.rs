//! Periodic dependency-health aggregation
//!
//! One cycle:
//! 1. Run the probe for a fresh [`DependencyStatus`]
//! 2. Log every failed dependency
//! 3. Mark each exposed service `NotServing` if any of its dependencies failed
//! 4. Write the aggregate (under `""`) and per-service statuses to the registry
//!
//! The aggregate is `Serving` only if no dependency failed. A dependency a
//! service declares but the probe did not report counts as healthy.

use super::probe::{DependencyProbe, DependencyStatus};
use super::registry::{HealthRegistry, ServingStatus};
use crate::server::ShutdownSignal;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Delay between the start of two cycles
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// Registry key of the aggregate status
pub const ROOT_SERVICE: &str = "";

/// Exposed service name -> the dependency keys it relies on
///
/// Declared once at startup and never modified afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ServiceHealthMap {
    services: BTreeMap<String, BTreeSet<String>>,
}

impl ServiceHealthMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn service<I, S>(mut self, name: impl Into<String>, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.services.insert(
            name.into(),
            dependencies.into_iter().map(Into::into).collect(),
        );
        self
    }

    pub fn dependencies(&self, service: &str) -> Option<&BTreeSet<String>> {
        self.services.get(service)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.services.iter().map(|(name, deps)| (name.as_str(), deps))
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Statuses computed by one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub global: ServingStatus,
    pub services: BTreeMap<String, ServingStatus>,
}

impl HealthReport {
    /// Registry entries for this report, the aggregate first
    pub fn entries(&self) -> impl Iterator<Item = (&str, ServingStatus)> {
        std::iter::once((ROOT_SERVICE, self.global)).chain(
            self.services
                .iter()
                .map(|(name, status)| (name.as_str(), *status)),
        )
    }
}

/// Derive serving statuses from one probe result
pub fn evaluate(services: &ServiceHealthMap, status: &DependencyStatus) -> HealthReport {
    let global = ServingStatus::from_healthy(status.all_healthy());

    let services = services
        .iter()
        .map(|(name, deps)| {
            let healthy = !deps.iter().any(|dep| status.is_failed(dep));
            (name.to_string(), ServingStatus::from_healthy(healthy))
        })
        .collect();

    HealthReport { global, services }
}

/// Drives the health registry from a dependency probe
pub struct HealthAggregator {
    registry: HealthRegistry,
    services: ServiceHealthMap,
    probe: Arc<dyn DependencyProbe>,
    interval: Duration,
}

impl HealthAggregator {
    pub fn new(
        registry: HealthRegistry,
        services: ServiceHealthMap,
        probe: Arc<dyn DependencyProbe>,
    ) -> Self {
        Self {
            registry,
            services,
            probe,
            interval: REFRESH_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn registry(&self) -> &HealthRegistry {
        &self.registry
    }

    pub fn services(&self) -> &ServiceHealthMap {
        &self.services
    }

    /// Run exactly one probe-evaluate-publish pass
    pub async fn run_cycle(&self) -> HealthReport {
        let status = self.probe.probe().await;

        for (dependency, error) in status.failures() {
            warn!(dependency, error = %error, "Dependency check failed");
        }

        let report = evaluate(&self.services, &status);
        self.registry.apply(&report);

        debug!(
            global = ?report.global,
            dependencies = status.len(),
            failed = status.failures().count(),
            "Health statuses refreshed"
        );

        report
    }

    /// Refresh statuses every interval until `shutdown` fires
    ///
    /// The first cycle runs immediately. A slow probe delays the next tick
    /// rather than causing a burst of catch-up cycles.
    pub async fn run(self, mut shutdown: ShutdownSignal) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            services = self.services.len(),
            interval_secs = self.interval.as_secs_f64(),
            "Health aggregator started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
            }
        }

        info!("Health aggregator stopped");
    }
}
