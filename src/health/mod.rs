//! Dependency-health aggregation
//!
//! Maps the errors reported by a dependency probe onto a serving status per
//! exposed service, refreshed on a fixed cadence and read by the gRPC
//! health-check endpoint.

mod aggregator;
mod probe;
mod registry;

pub use aggregator::{
    evaluate, HealthAggregator, HealthReport, ServiceHealthMap, REFRESH_INTERVAL, ROOT_SERVICE,
};
pub use probe::{DependencyProbe, DependencyStatus, TcpProbe, DEFAULT_TCP_TIMEOUT};
pub use registry::{HealthRegistry, ServingStatus};

#[cfg(test)]
#[path = "aggregator_test.rs"]
mod aggregator_tests;

#[cfg(test)]
#[path = "probe_test.rs"]
mod probe_tests;

#[cfg(test)]
#[path = "registry_test.rs"]
mod registry_tests;
