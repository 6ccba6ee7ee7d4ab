//! Listening socket, accept loop and server handle

use crate::admission::AdmissionGate;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::events::{EventSink, ServerEvent};
use crate::registry::{ClientRegistry, ClientSession};
use crate::stats::{ProcessingHistory, ServerStatistics};
use crate::worker::{ConnectionWorker, WorkerOutcome};
use log::{debug, error, info};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinSet};

/// State shared by the acceptor, every worker and every handle
pub(crate) struct ServerShared {
    pub(crate) config: ServerConfig,
    pub(crate) gate: AdmissionGate,
    pub(crate) registry: ClientRegistry,
    pub(crate) history: ProcessingHistory,
    pub(crate) events: EventSink,
    stopping: AtomicBool,
}

impl ServerShared {
    fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }
}

/// Bounded-concurrency TCP server
///
/// Owns the listening socket. [`Server::run`] accepts connections and hands
/// each one to its own [`ConnectionWorker`] task; the admission bound is
/// enforced by the workers, not at accept time.
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    shared: Arc<ServerShared>,
}

impl Server {
    /// Binds the listening socket; failing to bind is fatal
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        Self::bind_with_events(config, EventSink::default()).await
    }

    /// Like [`Server::bind`], forwarding every [`ServerEvent`] to `events`
    pub async fn bind_with_events(
        config: ServerConfig,
        events: EventSink,
    ) -> Result<Self, ServerError> {
        config.validate().map_err(ServerError::Config)?;

        let listener = TcpListener::bind(&config.bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.bind_addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        events.emit(ServerEvent::Listening { addr: local_addr });

        let shared = Arc::new(ServerShared {
            gate: AdmissionGate::new(config.max_clients),
            registry: ClientRegistry::new(),
            history: ProcessingHistory::new(config.history_limit),
            events,
            stopping: AtomicBool::new(false),
            config,
        });

        Ok(Server {
            listener,
            local_addr,
            shared,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Runs the accept loop until [`ServerHandle::stop`] is called
    ///
    /// `accept` is polled with a bounded wait so the stop flag is seen within
    /// one poll interval. After the loop exits the listening socket is closed
    /// and in-flight workers are allowed to finish before this returns.
    pub async fn run(self) -> Result<(), ServerError> {
        let Server {
            listener,
            local_addr,
            shared,
        } = self;
        let poll_interval = shared.config.poll_interval;
        let mut workers: JoinSet<WorkerOutcome> = JoinSet::new();

        info!("Server waiting for connections...");

        while !shared.is_stopping() {
            tokio::select! {
                accepted = tokio::time::timeout(poll_interval, listener.accept()) => {
                    match accepted {
                        // Nothing pending; loop around to re-check the stop flag
                        Err(_) => {}
                        Ok(Ok((stream, addr))) => {
                            if shared.is_stopping() {
                                debug!("Dropping connection from {} accepted during shutdown", addr);
                                break;
                            }
                            shared.events.emit(ServerEvent::ConnectionAccepted { addr });
                            let worker = ConnectionWorker::new(stream, addr, Arc::clone(&shared));
                            workers.spawn(worker.run());
                        }
                        Ok(Err(e)) => {
                            if !shared.is_stopping() {
                                error!("Error accepting connection: {}", e);
                                tokio::time::sleep(Duration::from_millis(10)).await;
                            }
                        }
                    }
                }

                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    reap_worker(&shared, joined);
                }
            }
        }

        drop(listener);
        debug!("Listening socket on {} closed", local_addr);

        if !workers.is_empty() {
            info!("Waiting for {} connection worker(s) to finish", workers.len());
        }
        while let Some(joined) = workers.join_next().await {
            reap_worker(&shared, joined);
        }

        shared.events.emit(ServerEvent::ServerStopped);
        Ok(())
    }
}

fn reap_worker(shared: &ServerShared, joined: Result<WorkerOutcome, JoinError>) {
    match joined {
        Ok(outcome) => debug!("Connection worker finished: {:?}", outcome),
        Err(e) if e.is_panic() => shared.events.emit(ServerEvent::WorkerFailed {
            client_id: None,
            reason: format!("worker panicked: {}", e),
        }),
        Err(e) => debug!("Connection worker cancelled: {}", e),
    }
}

/// Cloneable control and observation handle for a running [`Server`]
#[derive(Clone)]
pub struct ServerHandle {
    shared: Arc<ServerShared>,
}

impl ServerHandle {
    /// Requests shutdown; idempotent
    ///
    /// Clients still waiting for admission are denied at once. Admitted
    /// clients finish their exchange. The accept loop notices the request
    /// within one poll interval and closes the listening socket.
    pub fn stop(&self) {
        if !self.shared.stopping.swap(true, Ordering::SeqCst) {
            info!("Shutting down server...");
        }
        self.shared.gate.shutdown();
    }

    /// True once [`ServerHandle::stop`] has been called
    pub fn is_stopping(&self) -> bool {
        self.shared.is_stopping()
    }

    /// Configured maximum of concurrently admitted clients
    pub fn capacity(&self) -> usize {
        self.shared.gate.capacity()
    }

    /// Permits not held by any client right now
    pub fn available_permits(&self) -> usize {
        self.shared.gate.available_permits()
    }

    /// Clients currently registered, never more than [`ServerHandle::capacity`]
    pub fn active_clients(&self) -> usize {
        self.shared.registry.len()
    }

    /// Connections blocked at the admission gate; best effort
    pub fn waiting_clients(&self) -> usize {
        self.shared.gate.waiting_count()
    }

    /// Clients admitted since the server started
    pub fn total_served(&self) -> u64 {
        self.shared.registry.total_served()
    }

    /// Active client identifier -> remote address
    pub fn clients(&self) -> BTreeMap<u32, SocketAddr> {
        self.shared.registry.snapshot()
    }

    /// Active sessions ordered by identifier, with admission times
    pub fn sessions(&self) -> Vec<ClientSession> {
        self.shared.registry.sessions()
    }

    /// Copy-out snapshot of counters, active clients and recent results
    pub fn statistics(&self) -> ServerStatistics {
        ServerStatistics {
            total_clients_served: self.total_served(),
            active_clients: self.active_clients(),
            waiting_clients: self.waiting_clients(),
            timestamp: shared::timestamp_millis(),
            clients: self
                .clients()
                .into_iter()
                .map(|(id, addr)| (id, addr.to_string()))
                .collect(),
            client_data: self.shared.history.snapshot(),
        }
    }
}
