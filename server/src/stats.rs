//! Server statistics snapshots
//!
//! A [`ServerStatistics`] value is a read-only picture of the server at one
//! instant: how many clients were ever served, how many are active and how
//! many are queued at the admission gate. It also carries the most recent
//! processed requests kept by [`ProcessingHistory`]. Snapshots serialize to
//! JSON so an outer layer can persist them on its own schedule.

use crate::error::StatsError;
use serde::{Deserialize, Serialize};
use shared::ProcessingResult;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

/// Bounded record of processed requests, keyed by client identifier
pub struct ProcessingHistory {
    records: Mutex<BTreeMap<u32, ProcessingResult>>,
    limit: usize,
}

impl ProcessingHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            limit,
        }
    }

    /// Stores a result, evicting the oldest identifiers beyond the limit
    pub fn record(&self, client_id: u32, result: ProcessingResult) {
        if self.limit == 0 {
            return;
        }

        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.insert(client_id, result);
        while records.len() > self.limit {
            records.pop_first();
        }
    }

    pub fn snapshot(&self) -> BTreeMap<u32, ProcessingResult> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Point-in-time view of the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerStatistics {
    /// Clients ever admitted during this run
    pub total_clients_served: u64,
    /// Clients currently holding a permit
    pub active_clients: usize,
    /// Connections blocked at the admission gate
    pub waiting_clients: usize,
    /// Milliseconds since the Unix epoch when the snapshot was taken
    pub timestamp: u64,
    /// Active client identifier -> remote address
    #[serde(default)]
    pub clients: BTreeMap<u32, String>,
    /// Recently processed requests
    #[serde(default)]
    pub client_data: BTreeMap<u32, ProcessingResult>,
}

impl ServerStatistics {
    /// Writes the snapshot as pretty-printed JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), StatsError> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, StatsError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn summary(&self) -> String {
        format!(
            "Active clients: {}, Waiting clients: {}, Total clients served: {}",
            self.active_clients, self.waiting_clients, self.total_clients_served
        )
    }
}
