//! Tracing setup and RPC outcome reporting
//!
//! Development gets compact human-readable lines; release modes emit JSON
//! for the platform's log collector. `RUST_LOG` overrides the default
//! `info` filter in both.

use crate::deploy::DeploymentMode;
use tonic::{Code, Status};
use tracing::{debug, error, warn};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber for `mode`
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(
    mode: DeploymentMode,
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if mode.is_release() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .compact()
            .with_env_filter(filter)
            .try_init()
    }
}

/// Log level assigned to an RPC outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// OK is informational, `Unavailable` is a warning, anything else an error
pub fn severity(code: Code) -> Severity {
    match code {
        Code::Ok => Severity::Info,
        Code::Unavailable => Severity::Warning,
        _ => Severity::Error,
    }
}

/// Emit one event describing the outcome of a call to `service`
pub fn report_rpc<T>(service: &str, result: &Result<T, Status>) {
    let status = match result {
        Ok(_) => {
            debug!(service, code = ?Code::Ok, "gRPC call completed");
            return;
        }
        Err(status) => status,
    };

    match severity(status.code()) {
        Severity::Info => debug!(service, code = ?status.code(), "gRPC call completed"),
        Severity::Warning => warn!(
            service,
            code = ?status.code(),
            message = status.message(),
            "gRPC call failed"
        ),
        Severity::Error => error!(
            service,
            code = ?status.code(),
            message = status.message(),
            "gRPC call failed"
        ),
    }
}
