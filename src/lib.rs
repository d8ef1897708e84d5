//! Shared bootstrap layer for gRPC services
//!
//! - [`deploy`] - deployment mode, credential strategy and layered YAML config
//! - [`credentials`] - TLS material from the environment, identity tokens
//! - [`client`] - outbound channels and the per-call deadline/token wrapper
//! - [`server`] - listener, gRPC server with health endpoint, graceful shutdown
//! - [`health`] - dependency probes aggregated into per-service serving status
//! - [`telemetry`] - tracing setup and RPC outcome reporting

pub mod client;
pub mod credentials;
pub mod deploy;
pub mod health;
pub mod server;
pub mod telemetry;
