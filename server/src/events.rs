//! Structured server events
//!
//! Every lifecycle step of the acceptor and the workers is described by a
//! [`ServerEvent`]. The [`EventSink`] writes each event to the `log` facade
//! and, when a subscriber channel was injected, forwards it there as well so
//! that an outer layer (console, dashboard, test) can render or assert on it.

use crate::admission::DenyReason;
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use tokio::sync::mpsc;

/// Lifecycle notifications emitted by the server
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Listening {
        addr: SocketAddr,
    },
    ConnectionAccepted {
        addr: SocketAddr,
    },
    ClientWaiting {
        addr: SocketAddr,
    },
    ClientAdmitted {
        client_id: u32,
        addr: SocketAddr,
    },
    ClientDenied {
        addr: SocketAddr,
        reason: DenyReason,
    },
    DataReceived {
        client_id: u32,
        data: String,
    },
    InvalidData {
        client_id: u32,
    },
    ResponseSent {
        client_id: u32,
    },
    ClientDisconnected {
        client_id: u32,
    },
    WorkerFailed {
        client_id: Option<u32>,
        reason: String,
    },
    ServerStopped,
}

/// Destination for [`ServerEvent`]s
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    subscriber: Option<mpsc::UnboundedSender<ServerEvent>>,
}

impl EventSink {
    pub fn new(subscriber: Option<mpsc::UnboundedSender<ServerEvent>>) -> Self {
        Self { subscriber }
    }

    /// Creates a sink together with the receiving end of its channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(Some(tx)), rx)
    }

    pub fn emit(&self, event: ServerEvent) {
        log_event(&event);

        if let Some(subscriber) = &self.subscriber {
            // A subscriber that went away must not disturb the server
            let _ = subscriber.send(event);
        }
    }
}

fn log_event(event: &ServerEvent) {
    match event {
        ServerEvent::Listening { addr } => info!("Server started on {}", addr),
        ServerEvent::ConnectionAccepted { addr } => info!("New connection from {}", addr),
        ServerEvent::ClientWaiting { addr } => {
            info!("Client {} waiting for server access", addr)
        }
        ServerEvent::ClientAdmitted { client_id, addr } => {
            info!("Client #{} from {} gained access to the server", client_id, addr)
        }
        ServerEvent::ClientDenied { addr, reason } => {
            info!("Client {} connection rejected: {}", addr, reason)
        }
        ServerEvent::DataReceived { client_id, data } => {
            info!("Received data from client #{}: {}", client_id, data)
        }
        ServerEvent::InvalidData { client_id } => {
            warn!("Client #{} sent invalid data format", client_id)
        }
        ServerEvent::ResponseSent { client_id } => debug!("Sent result to client #{}", client_id),
        ServerEvent::ClientDisconnected { client_id } => {
            info!("Connection with client #{} closed", client_id)
        }
        ServerEvent::WorkerFailed { client_id, reason } => match client_id {
            Some(id) => error!("Error handling client #{}: {}", id, reason),
            None => error!("Connection worker failed: {}", reason),
        },
        ServerEvent::ServerStopped => info!("Server stopped"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscriber() {
        let sink = EventSink::default();
        sink.emit(ServerEvent::ServerStopped);
    }

    #[test]
    fn test_emit_forwards_to_subscriber() {
        let (sink, mut rx) = EventSink::channel();
        let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();

        sink.emit(ServerEvent::ClientWaiting { addr });
        sink.emit(ServerEvent::ClientAdmitted { client_id: 1, addr });

        assert_eq!(rx.try_recv().unwrap(), ServerEvent::ClientWaiting { addr });
        assert_eq!(
            rx.try_recv().unwrap(),
            ServerEvent::ClientAdmitted { client_id: 1, addr }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_emit_survives_dropped_subscriber() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        sink.emit(ServerEvent::ResponseSent { client_id: 3 });
    }

    #[test]
    fn test_cloned_sinks_share_channel() {
        let (sink, mut rx) = EventSink::channel();
        let clone = sink.clone();

        sink.emit(ServerEvent::InvalidData { client_id: 1 });
        clone.emit(ServerEvent::ClientDisconnected { client_id: 1 });

        assert_eq!(rx.try_recv().unwrap(), ServerEvent::InvalidData { client_id: 1 });
        assert_eq!(
            rx.try_recv().unwrap(),
            ServerEvent::ClientDisconnected { client_id: 1 }
        );
    }
}
