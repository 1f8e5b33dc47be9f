//! Per-table locks serializing create/recreate/drop sequences
//!
//! A statement sequence that rebuilds a table (CREATE, DESCRIBE, the
//! positional-column repair, DROP) holds the table's lock until it is done,
//! so a superseded load still running inside the engine never interleaves
//! with its successor.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Clone, Default)]
pub struct TableLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl TableLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, table_name: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(table_name.to_lowercase())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Wait until no other sequence is working on `table_name`
    pub async fn acquire(&self, table_name: &str) -> OwnedMutexGuard<()> {
        self.lock_for(table_name).lock_owned().await
    }

    /// The lock if it is free right now
    pub fn try_acquire(&self, table_name: &str) -> Option<OwnedMutexGuard<()>> {
        self.lock_for(table_name).try_lock_owned().ok()
    }
}
