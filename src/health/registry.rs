//! Serving status store read by the health-check endpoint

use super::aggregator::HealthReport;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Three-valued health state of a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ServingStatus {
    #[default]
    Unknown,
    Serving,
    NotServing,
}

impl ServingStatus {
    pub fn from_healthy(healthy: bool) -> Self {
        if healthy {
            ServingStatus::Serving
        } else {
            ServingStatus::NotServing
        }
    }
}

/// Shared map from service name to its last computed status
///
/// The empty name holds the aggregate status. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    statuses: Arc<RwLock<HashMap<String, ServingStatus>>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status of `service`, `Unknown` when nothing was recorded for it
    pub fn status(&self, service: &str) -> ServingStatus {
        self.statuses
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(service)
            .copied()
            .unwrap_or_default()
    }

    pub fn set_status(&self, service: impl Into<String>, status: ServingStatus) {
        self.statuses
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(service.into(), status);
    }

    /// Write every entry of a cycle's report under a single lock
    ///
    /// Readers see either the previous cycle or this one, never a mix.
    pub fn apply(&self, report: &HealthReport) {
        let mut statuses = self.statuses.write().unwrap_or_else(PoisonError::into_inner);
        for (service, status) in report.entries() {
            statuses.insert(service.to_string(), status);
        }
    }

    pub fn snapshot(&self) -> HashMap<String, ServingStatus> {
        self.statuses
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
