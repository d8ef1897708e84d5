//! Connection manager
//!
//! Opens and closes outbound gRPC channels with credentials for the
//! deployment mode, and wraps individual calls with a deadline and an
//! optional identity token.

mod connection;

pub use connection::{call, Connection, ConnectionError, ConnectionPlan, OpenOptions, CALL_TIMEOUT};

#[cfg(test)]
#[path = "connection_test.rs"]
mod connection_tests;
