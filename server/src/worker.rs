//! Per-connection unit of work
//!
//! A [`ConnectionWorker`] owns one accepted socket for its whole life:
//!
//! ```text
//! Waiting --(permit)--> Admitted --> Exchanging --> Completed
//!    \
//!     `--(shutdown / timeout)--> Denied
//! ```
//!
//! Cleanup after admission is tied to `AdmittedSession`: dropping it
//! deregisters the client and then releases the permit, so no exit path
//! (error, disconnect, panic) can shrink the server's capacity.

use crate::admission::{Admission, AdmissionPermit};
use crate::error::ExchangeError;
use crate::events::ServerEvent;
use crate::network::ServerShared;
use log::debug;
use shared::{encode_client_id, ProcessingResult, ERROR_RESPONSE, MAX_REQUEST_BYTES};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Lifecycle states of a connection worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Waiting,
    Admitted,
    Exchanging,
    Completed,
    Denied,
}

/// How a worker finished
#[derive(Debug)]
pub enum WorkerOutcome {
    /// Never admitted; nothing was sent
    Denied,
    /// Report sent for a valid request
    Served { client_id: u32 },
    /// Error line sent for a malformed request
    Rejected { client_id: u32 },
    /// Exchange aborted; cleanup still ran
    Failed {
        client_id: u32,
        error: ExchangeError,
    },
}

/// What the exchange sent back to the client
enum Reply {
    Report,
    InvalidData,
}

/// Registry entry plus permit of an admitted client
///
/// Fields drop after `Drop::drop`, so the registry entry is removed before
/// the permit returns to the gate.
struct AdmittedSession {
    shared: Arc<ServerShared>,
    client_id: u32,
    _permit: AdmissionPermit,
}

impl Drop for AdmittedSession {
    fn drop(&mut self) {
        self.shared.registry.deregister(self.client_id);
        self.shared.events.emit(ServerEvent::ClientDisconnected {
            client_id: self.client_id,
        });
    }
}

pub struct ConnectionWorker {
    stream: TcpStream,
    addr: SocketAddr,
    shared: Arc<ServerShared>,
    state: WorkerState,
}

impl ConnectionWorker {
    pub(crate) fn new(stream: TcpStream, addr: SocketAddr, shared: Arc<ServerShared>) -> Self {
        Self {
            stream,
            addr,
            shared,
            state: WorkerState::Waiting,
        }
    }

    fn transition(&mut self, next: WorkerState) {
        debug!("Worker for {}: {:?} -> {:?}", self.addr, self.state, next);
        self.state = next;
    }

    /// Runs the connection to completion
    pub async fn run(mut self) -> WorkerOutcome {
        self.shared
            .events
            .emit(ServerEvent::ClientWaiting { addr: self.addr });

        let permit = match self
            .shared
            .gate
            .acquire(self.shared.config.acquire_timeout)
            .await
        {
            Admission::Granted(permit) => permit,
            Admission::Denied(reason) => {
                self.transition(WorkerState::Denied);
                self.shared.events.emit(ServerEvent::ClientDenied {
                    addr: self.addr,
                    reason,
                });
                let _ = self.stream.shutdown().await;
                return WorkerOutcome::Denied;
            }
        };

        let client_id = self.shared.registry.register(self.addr);
        let session = AdmittedSession {
            shared: Arc::clone(&self.shared),
            client_id,
            _permit: permit,
        };
        self.transition(WorkerState::Admitted);
        self.shared.events.emit(ServerEvent::ClientAdmitted {
            client_id,
            addr: self.addr,
        });

        self.transition(WorkerState::Exchanging);
        let result = self.exchange(client_id).await;

        // Close the socket first, then deregister and release
        let _ = self.stream.shutdown().await;
        self.transition(WorkerState::Completed);
        let outcome = match result {
            Ok(Reply::Report) => WorkerOutcome::Served { client_id },
            Ok(Reply::InvalidData) => WorkerOutcome::Rejected { client_id },
            Err(error) => {
                self.shared.events.emit(ServerEvent::WorkerFailed {
                    client_id: Some(client_id),
                    reason: error.to_string(),
                });
                WorkerOutcome::Failed { client_id, error }
            }
        };
        drop(session);

        outcome
    }

    async fn exchange(&mut self, client_id: u32) -> Result<Reply, ExchangeError> {
        self.stream
            .write_all(encode_client_id(client_id).as_bytes())
            .await?;

        let request = match read_request(
            &mut self.stream,
            MAX_REQUEST_BYTES,
            self.shared.config.read_timeout,
        )
        .await
        {
            Ok(request) => request,
            Err(ExchangeError::RequestTooLarge { limit }) => {
                debug!("Client #{} exceeded the {} byte request limit", client_id, limit);
                return self.send_invalid_data(client_id).await;
            }
            Err(e) => return Err(e),
        };

        self.shared.events.emit(ServerEvent::DataReceived {
            client_id,
            data: request.trim().to_string(),
        });

        match shared::parse_values(&request) {
            Ok(values) => {
                let result = ProcessingResult::new(values);
                let response = format!("{}\n", result.report());
                self.stream.write_all(response.as_bytes()).await?;
                self.stream.flush().await?;

                self.shared.history.record(client_id, result);
                self.shared
                    .events
                    .emit(ServerEvent::ResponseSent { client_id });
                Ok(Reply::Report)
            }
            Err(e) => {
                debug!("Client #{} request rejected: {}", client_id, e);
                self.send_invalid_data(client_id).await
            }
        }
    }

    async fn send_invalid_data(&mut self, client_id: u32) -> Result<Reply, ExchangeError> {
        self.shared
            .events
            .emit(ServerEvent::InvalidData { client_id });
        self.stream
            .write_all(format!("{}\n", ERROR_RESPONSE).as_bytes())
            .await?;
        self.stream.flush().await?;
        Ok(Reply::InvalidData)
    }
}

/// Reads one request line of at most `limit` bytes
///
/// Stops at the first `\n` or at end of stream. End of stream before any
/// byte means the client left without asking anything.
pub(crate) async fn read_request<R>(
    reader: &mut R,
    limit: usize,
    read_timeout: Option<Duration>,
) -> Result<String, ExchangeError>
where
    R: AsyncRead + Unpin,
{
    let mut request = Vec::new();
    let mut buffer = [0u8; 1024];

    loop {
        let read = reader.read(&mut buffer);
        let len = match read_timeout {
            Some(duration) => tokio::time::timeout(duration, read)
                .await
                .map_err(|_| ExchangeError::TimedOut)??,
            None => read.await?,
        };

        if len == 0 {
            if request.is_empty() {
                return Err(ExchangeError::PrematureDisconnect);
            }
            break;
        }

        request.extend_from_slice(&buffer[..len]);
        if let Some(pos) = request.iter().position(|&b| b == b'\n') {
            request.truncate(pos);
            break;
        }
        if request.len() >= limit {
            return Err(ExchangeError::RequestTooLarge { limit });
        }
    }

    Ok(String::from_utf8_lossy(&request).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_request_stops_at_newline() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(b"1 2 3\nignored").await.unwrap();

        let request = read_request(&mut server, 4096, None).await.unwrap();
        assert_eq!(request, "1 2 3");
    }

    #[tokio::test]
    async fn test_read_request_accepts_end_of_stream() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(b"4 5").await.unwrap();
        drop(client);

        let request = read_request(&mut server, 4096, None).await.unwrap();
        assert_eq!(request, "4 5");
    }

    #[tokio::test]
    async fn test_read_request_reassembles_fragments() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let writer = tokio::spawn(async move {
            client.write_all(b"1.5 ").await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            client.write_all(b"2.5\n").await.unwrap();
            client
        });

        let request = read_request(&mut server, 4096, None).await.unwrap();
        assert_eq!(request, "1.5 2.5");
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_read_request_premature_disconnect() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);

        let result = read_request(&mut server, 4096, None).await;
        assert!(matches!(result, Err(ExchangeError::PrematureDisconnect)));
    }

    #[tokio::test]
    async fn test_read_request_too_large() {
        let (mut client, mut server) = tokio::io::duplex(8192);
        client.write_all(&[b'1'; 100]).await.unwrap();

        let result = read_request(&mut server, 64, None).await;
        assert!(matches!(
            result,
            Err(ExchangeError::RequestTooLarge { limit: 64 })
        ));
    }

    #[tokio::test]
    async fn test_read_request_timeout() {
        let (_client, mut server) = tokio::io::duplex(64);

        let result = read_request(&mut server, 4096, Some(Duration::from_millis(30))).await;
        assert!(matches!(result, Err(ExchangeError::TimedOut)));
    }
}
