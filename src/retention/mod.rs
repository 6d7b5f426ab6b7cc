//! Save/load passes between a daemon's retention data and the cache pool.

pub mod daemon;
pub mod synchronizer;

pub use daemon::RetentionDaemon;
pub use synchronizer::RetentionSynchronizer;

use crate::error::ItemFailureKind;
use crate::types::RetentionData;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One object that was dropped from a pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemFailure {
    pub key: String,
    pub kind: ItemFailureKind,
    pub reason: String,
}

/// What happened during one pass, independent of direction.
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    /// Pool entry the pass ran against.
    pub server: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub attempted: usize,
    pub failures: Vec<ItemFailure>,
}

impl PassReport {
    pub(crate) fn begin(server: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            server: server.to_string(),
            started_at,
            finished_at: started_at,
            attempted: 0,
            failures: Vec::new(),
        }
    }

    pub(crate) fn finish(&mut self) {
        self.finished_at = Utc::now();
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// True when no item was dropped.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failures_of(&self, kind: ItemFailureKind) -> impl Iterator<Item = &ItemFailure> {
        self.failures.iter().filter(move |f| f.kind == kind)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveReport {
    pub pass: PassReport,
    pub stored: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadStats {
    pub pass: PassReport,
    pub loaded: usize,
    /// Identities with no entry on the server. Not failures.
    pub absent: usize,
}

#[derive(Debug, Clone)]
pub struct LoadReport<T> {
    pub stats: LoadStats,
    pub data: RetentionData<T>,
}

impl<T> LoadReport<T> {
    pub fn into_parts(self) -> (RetentionData<T>, LoadStats) {
        (self.data, self.stats)
    }
}
