//! gRPC server bootstrap
//!
//! Binds the listener, applies the deployment's server credentials, attaches
//! the standard health-check service, and stops everything gracefully on
//! SIGTERM/SIGINT.

mod bootstrap;
mod health;
pub mod shutdown;

pub use bootstrap::{listen, new_server, serve, GrpcServer, ServerError, ServerHandle};
pub use health::HealthService;
pub use shutdown::{shutdown_channel, wait_for_signal, ShutdownController, ShutdownSignal};

#[cfg(test)]
#[path = "bootstrap_test.rs"]
mod bootstrap_tests;

#[cfg(test)]
#[path = "health_test.rs"]
mod health_tests;

#[cfg(test)]
#[path = "shutdown_test.rs"]
mod shutdown_tests;
