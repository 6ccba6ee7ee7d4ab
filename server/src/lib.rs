//! # Deduplication Server Library
//!
//! This library provides a bounded-concurrency TCP server. Each client gets
//! one request/response exchange: it sends a line of numbers and receives the
//! array back with duplicates removed. At most `max_clients` clients are
//! served at once; the rest wait at an admission gate until a slot frees up
//! or the server stops.
//!
//! ## Core Responsibilities
//!
//! ### Admission Control
//! The [`admission::AdmissionGate`] is a counting gate with cooperative
//! shutdown. Stopping the server wakes every queued client at once and denies
//! it without sending any data.
//!
//! ### Client Tracking
//! The [`registry::ClientRegistry`] assigns strictly increasing identifiers to
//! admitted clients and keeps their connection metadata until they leave.
//!
//! ### Guaranteed Cleanup
//! A worker that reached admission always deregisters its client and returns
//! its permit, whether the exchange succeeded, the client sent garbage, or
//! the connection dropped halfway.
//!
//! ## Module Organization
//!
//! ### Admission Module (`admission`)
//! - Permit accounting and waiting-client counter
//! - Optional acquire timeout
//! - Broadcast shutdown
//!
//! ### Registry Module (`registry`)
//! - Identifier allocation and lifetime served counter
//! - Copy-out snapshots for reporting
//!
//! ### Network Module (`network`)
//! - Listening socket and accept loop with bounded polling
//! - One worker task per accepted connection
//! - [`network::ServerHandle`] for stop requests and statistics
//!
//! ### Worker Module (`worker`)
//! - Admission, identifier message, request read, report or error reply
//!
//! ### Events and Statistics (`events`, `stats`)
//! - Structured lifecycle events written to the `log` facade and an optional
//!   subscriber channel
//! - JSON statistics snapshots
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Serve at most 3 clients at a time
//!     let server = Server::bind(ServerConfig::new("127.0.0.1:12345", 3)).await?;
//!     let handle = server.handle();
//!
//!     tokio::spawn(async move {
//!         tokio::signal::ctrl_c().await.ok();
//!         handle.stop();
//!     });
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod admission;
pub mod config;
pub mod error;
pub mod events;
pub mod network;
pub mod registry;
pub mod stats;
pub mod worker;

pub use admission::{Admission, AdmissionGate, AdmissionPermit, DenyReason};
pub use config::ServerConfig;
pub use error::{ExchangeError, ServerError, StatsError};
pub use events::{EventSink, ServerEvent};
pub use network::{Server, ServerHandle};
pub use registry::{ClientRegistry, ClientSession};
pub use stats::{ProcessingHistory, ServerStatistics};
