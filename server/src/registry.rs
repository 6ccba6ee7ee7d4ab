//! Registry of admitted clients
//!
//! This module tracks every client that currently holds an admission permit:
//! - Identifier allocation (strictly increasing, starting at 1)
//! - Session metadata (remote address, admission time)
//! - Lifetime counter of clients served
//!
//! All methods take `&self`; the registry synchronizes internally, so workers
//! share it through an `Arc` without any outer lock.

use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

/// Metadata for one admitted client
#[derive(Debug, Clone)]
pub struct ClientSession {
    /// Unique identifier assigned at admission
    pub id: u32,
    /// Remote address of the connection
    pub addr: SocketAddr,
    /// Monotonic admission time, for measuring session length
    pub admitted_at: Instant,
    /// Wall-clock admission time in milliseconds since the Unix epoch
    pub admitted_at_ms: u64,
}

impl ClientSession {
    pub fn new(id: u32, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            admitted_at: Instant::now(),
            admitted_at_ms: shared::timestamp_millis(),
        }
    }
}

struct Sessions {
    clients: HashMap<u32, ClientSession>,
    next_client_id: u32,
}

/// Thread-safe mapping of client identifier to session
pub struct ClientRegistry {
    inner: RwLock<Sessions>,
    total_served: AtomicU64,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Sessions {
                clients: HashMap::new(),
                next_client_id: 1,
            }),
            total_served: AtomicU64::new(0),
        }
    }

    // A panicking holder cannot leave the map half-updated, so poisoning is ignored
    fn read(&self) -> RwLockReadGuard<'_, Sessions> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Sessions> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a newly admitted client and returns its identifier
    ///
    /// Identifiers are allocated under the write lock, so they are strictly
    /// increasing in call order even when workers register concurrently.
    pub fn register(&self, addr: SocketAddr) -> u32 {
        let mut sessions = self.write();
        let client_id = sessions.next_client_id;
        sessions.next_client_id += 1;
        sessions
            .clients
            .insert(client_id, ClientSession::new(client_id, addr));
        self.total_served.fetch_add(1, Ordering::SeqCst);

        debug!("Registered client #{} from {}", client_id, addr);
        client_id
    }

    /// Removes a client; returns false if it was already gone
    pub fn deregister(&self, client_id: u32) -> bool {
        let removed = self.write().clients.remove(&client_id);
        if let Some(session) = &removed {
            debug!(
                "Deregistered client #{} after {:?}",
                session.id,
                session.admitted_at.elapsed()
            );
        }
        removed.is_some()
    }

    /// Independent copy of identifier -> address for reporting
    pub fn snapshot(&self) -> BTreeMap<u32, SocketAddr> {
        self.read()
            .clients
            .iter()
            .map(|(id, session)| (*id, session.addr))
            .collect()
    }

    /// Copies of all active sessions ordered by identifier
    pub fn sessions(&self) -> Vec<ClientSession> {
        let mut sessions: Vec<ClientSession> = self.read().clients.values().cloned().collect();
        sessions.sort_by_key(|session| session.id);
        sessions
    }

    /// Number of clients ever registered; never decreases
    pub fn total_served(&self) -> u64 {
        self.total_served.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.read().clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().clients.is_empty()
    }
}
