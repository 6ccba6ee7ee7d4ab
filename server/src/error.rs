//! Error types for the server library

use std::io;
use thiserror::Error;

/// Failures that stop the server as a whole
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be opened
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Failures of a single request/response exchange
///
/// These never leave the worker that produced them.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// The client closed the connection before sending a request
    #[error("client disconnected before sending data")]
    PrematureDisconnect,

    #[error("request exceeds {limit} bytes")]
    RequestTooLarge { limit: usize },

    #[error("timed out waiting for client data")]
    TimedOut,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Failures while saving or loading statistics snapshots
#[derive(Debug, Error)]
pub enum StatsError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
