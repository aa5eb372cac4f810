//! Error types used by the netvisor daemon.
//!
//! This module defines two main error enums:
//!
//! - [`ClientError`] — failures reported by the container runtime API.
//! - [`RuntimeError`] — errors raised by the daemon lifecycle itself.
//!
//! Reconciliation failures never escalate past the operation that hit them:
//! connect/disconnect/create/remove errors are logged and the surrounding
//! batch continues (see `engine`). The only error that terminates the process
//! with a non-zero code is [`RuntimeError::GraceExceeded`].

use std::time::Duration;

use thiserror::Error;

/// # Errors reported by the container runtime API.
///
/// Produced by [`RuntimeClient`](crate::runtime::RuntimeClient)
/// implementations. Benign conditions (a `409 Conflict` on network create)
/// are **not** errors; they surface as
/// [`CreateOutcome::AlreadyExists`](crate::runtime::CreateOutcome).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ClientError {
    /// Underlying Docker API call failed.
    #[error("runtime API error: {0}")]
    Api(#[from] bollard::errors::Error),

    /// The named network is unknown to the runtime.
    #[error("network {0:?} not found")]
    NetworkNotFound(String),

    /// The container id is unknown to the runtime.
    #[error("container {0:?} not found")]
    ContainerNotFound(String),

    /// The runtime returned a payload missing a required field.
    #[error("malformed runtime response: {0}")]
    Malformed(String),

    /// The lifecycle event feed ended unexpectedly.
    #[error("event stream closed")]
    EventStreamClosed,
}

impl ClientError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ClientError::Api(_) => "client_api",
            ClientError::NetworkNotFound(_) => "client_network_not_found",
            ClientError::ContainerNotFound(_) => "client_container_not_found",
            ClientError::Malformed(_) => "client_malformed_response",
            ClientError::EventStreamClosed => "client_event_stream_closed",
        }
    }
}

/// # Errors produced by the daemon lifecycle.
///
/// These represent failures of the process itself, not of any single
/// reconciliation. A reconciliation failure is logged and absorbed; a
/// [`RuntimeError::GraceExceeded`] maps to the forced non-zero exit code.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; the teardown pass was still in
    /// flight and had to be abandoned.
    #[error("shutdown grace period {grace:?} exceeded; forcing termination")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }
}
