//! Server construction parameters
//!
//! The library never reads configuration sources on its own. Binaries map
//! their command line onto a [`ServerConfig`] and hand it to
//! [`Server::bind`](crate::network::Server::bind).

use shared::{DEFAULT_HOST, DEFAULT_MAX_CLIENTS, DEFAULT_PORT};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Runtime settings for one server run
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the listening socket binds to, e.g. `127.0.0.1:12345`
    pub bind_addr: String,
    /// Maximum number of concurrently admitted clients
    pub max_clients: usize,
    /// Upper bound on how long the accept loop waits before re-checking the stop flag
    pub poll_interval: Duration,
    /// How long a connection may wait for admission; `None` waits until shutdown
    pub acquire_timeout: Option<Duration>,
    /// Per-read limit during an exchange; `None` trusts the client to finish
    pub read_timeout: Option<Duration>,
    /// Number of processed requests kept for statistics dumps
    pub history_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("{}:{}", DEFAULT_HOST, DEFAULT_PORT),
            max_clients: DEFAULT_MAX_CLIENTS,
            poll_interval: Duration::from_millis(200),
            acquire_timeout: None,
            read_timeout: Some(Duration::from_secs(60)),
            history_limit: 1024,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: impl Into<String>, max_clients: usize) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            max_clients,
            ..Self::default()
        }
    }

    /// Checks the values that would make the server unusable
    pub fn validate(&self) -> Result<(), String> {
        if self.max_clients == 0 {
            return Err("max_clients must be at least 1".to_string());
        }
        if self.max_clients > Semaphore::MAX_PERMITS {
            return Err(format!(
                "max_clients must not exceed {}",
                Semaphore::MAX_PERMITS
            ));
        }
        if self.poll_interval.is_zero() {
            return Err("poll_interval must be greater than zero".to_string());
        }
        Ok(())
    }
}
