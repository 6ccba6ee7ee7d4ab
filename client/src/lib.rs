//! # Deduplication Client Library
//!
//! This library implements the client side of the deduplication protocol:
//!
//! 1. Connect to the server over TCP.
//! 2. Wait until the server admits the connection; the first line received
//!    is the client identifier. A server that stops while we wait closes the
//!    socket without sending anything.
//! 3. Send one line of whitespace separated numbers.
//! 4. Read the two-line report (or the error line) until the server closes
//!    the connection.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! The [`network::Client`] session type and its [`network::ClientError`].
//!
//! ### Input Module (`input`)
//! Local validation of request lines and random request generation.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::connect("127.0.0.1:12345").await?;
//!     let id = client.wait_for_admission().await?;
//!     println!("admitted as #{}", id);
//!
//!     let response = client.submit("1 2 2 3").await?;
//!     println!("{:?}", response);
//!     Ok(())
//! }
//! ```

pub mod input;
pub mod network;

pub use network::{Client, ClientError};
