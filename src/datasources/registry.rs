//! Data Source Registry - single source of truth for known data sources
//!
//! Every mutation replaces a whole record, keyed by id, under one write lock.
//! The loader and user actions (imports, removals) never write individual
//! fields of a shared record without holding that lock.

use crate::datasources::{DataSource, LoadingStatus, SchemaColumn, StatusTag};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;
use tracing::debug;

const EVENT_CAPACITY: usize = 256;

/// Change notifications for live status indicators
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Added { id: String },
    StatusChanged { id: String, status: StatusTag },
    Removed { id: String },
    Warning { id: String, message: String },
}

pub struct DataSourceRegistry {
    sources: RwLock<Vec<DataSource>>,
    events: broadcast::Sender<RegistryEvent>,
}

impl DataSourceRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            sources: RwLock::new(Vec::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<DataSource>> {
        self.sources.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<DataSource>> {
        self.sources.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: RegistryEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub fn snapshot(&self) -> Vec<DataSource> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn get(&self, id: &str) -> Option<DataSource> {
        self.read().iter().find(|s| s.id == id).cloned()
    }

    /// Find the source owning an engine table name (case-insensitive)
    pub fn find_by_table(&self, table_name: &str) -> Option<DataSource> {
        self.read()
            .iter()
            .find(|s| s.table_name.eq_ignore_ascii_case(table_name))
            .cloned()
    }

    /// Insert a source, or replace the record with the same id
    pub fn upsert(&self, source: DataSource) {
        let id = source.id.clone();
        let status = source.status.tag();
        let added = {
            let mut sources = self.write();
            match sources.iter_mut().find(|s| s.id == id) {
                Some(existing) => {
                    *existing = source;
                    false
                }
                None => {
                    sources.push(source);
                    true
                }
            }
        };

        if added {
            self.emit(RegistryEvent::Added { id: id.clone() });
        }
        self.emit(RegistryEvent::StatusChanged { id, status });
    }

    /// Apply `f` to a copy of the record and store the copy back atomically
    pub fn update<F>(&self, id: &str, f: F) -> Option<DataSource>
    where
        F: FnOnce(&mut DataSource),
    {
        let (updated, before) = {
            let mut sources = self.write();
            let slot = sources.iter_mut().find(|s| s.id == id)?;
            let before = slot.status.tag();
            let mut next = slot.clone();
            f(&mut next);
            *slot = next.clone();
            (next, before)
        };

        let after = updated.status.tag();
        if before != after || after == StatusTag::Loaded {
            self.emit(RegistryEvent::StatusChanged {
                id: id.to_string(),
                status: after,
            });
        }
        Some(updated)
    }

    pub fn set_status(&self, id: &str, status: LoadingStatus) -> bool {
        self.update(id, |source| source.status = status).is_some()
    }

    pub fn remove(&self, id: &str) -> Option<DataSource> {
        let removed = {
            let mut sources = self.write();
            let idx = sources.iter().position(|s| s.id == id)?;
            sources.remove(idx)
        };
        self.emit(RegistryEvent::Removed { id: id.to_string() });
        Some(removed)
    }

    pub fn warn(&self, id: &str, message: impl Into<String>) {
        self.emit(RegistryEvent::Warning {
            id: id.to_string(),
            message: message.into(),
        });
    }

    /// Merge the caller's desired list into the registry
    ///
    /// Sources seen for the first time are inserted; a caller-declared
    /// `loaded` status is not trusted and becomes `VerificationNeeded`.
    /// Known sources keep their current status and take the caller's
    /// descriptor fields.
    pub fn mount(&self, desired: &[DataSource]) {
        for declared in desired {
            let known = self
                .update(&declared.id, |current| {
                    current.name = declared.name.clone();
                    current.kind = declared.kind;
                    current.table_name = declared.table_name.clone();
                    current.data = declared.data.clone();
                    current.url = declared.url.clone();
                    current.column_order = declared.column_order.clone();
                    if declared.file_data.is_some() {
                        current.file_data = declared.file_data.clone();
                    }
                    if declared.file.is_some() {
                        current.file = declared.file.clone();
                    }
                })
                .is_some();

            if !known {
                let mut fresh = declared.clone();
                if fresh.is_loaded() {
                    debug!(source_id = %fresh.id, "declared loaded source needs verification");
                    fresh.status = LoadingStatus::VerificationNeeded;
                }
                self.upsert(fresh);
            }
        }
    }

    /// Table names and schemas of every loaded source
    pub fn schemas(&self) -> Vec<(String, Vec<SchemaColumn>)> {
        self.read()
            .iter()
            .filter_map(|s| s.schema().map(|schema| (s.table_name.clone(), schema.to_vec())))
            .collect()
    }
}

impl Default for DataSourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(table: &str) -> LoadingStatus {
        LoadingStatus::Loaded {
            schema: vec![SchemaColumn {
                name: format!("{}_id", table),
                data_type: "VARCHAR".into(),
                nullable: true,
            }],
        }
    }

    #[test]
    fn test_mount_demotes_declared_loaded() {
        let registry = DataSourceRegistry::new();
        registry.mount(&[DataSource::existing("people").with_id("p").with_status(loaded("people"))]);

        let source = registry.get("p").unwrap();
        assert_eq!(source.status, LoadingStatus::VerificationNeeded);
    }

    #[test]
    fn test_mount_keeps_status_of_known_sources() {
        let registry = DataSourceRegistry::new();
        registry.upsert(DataSource::existing("people").with_id("p").with_status(loaded("people")));

        registry.mount(&[DataSource::existing("people")
            .with_id("p")
            .with_name("People (renamed)")]);

        let source = registry.get("p").unwrap();
        assert!(source.is_loaded());
        assert_eq!(source.name, "People (renamed)");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_update_and_events() {
        let registry = DataSourceRegistry::new();
        let mut events = registry.subscribe();

        registry.upsert(DataSource::existing("orders").with_id("o"));
        assert!(registry.set_status("o", LoadingStatus::Loading));
        assert!(!registry.set_status("missing", LoadingStatus::Loading));
        registry.warn("o", "duplicate columns");
        registry.remove("o");

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert_eq!(
            seen,
            vec![
                RegistryEvent::Added { id: "o".into() },
                RegistryEvent::StatusChanged { id: "o".into(), status: StatusTag::Idle },
                RegistryEvent::StatusChanged { id: "o".into(), status: StatusTag::Loading },
                RegistryEvent::Warning { id: "o".into(), message: "duplicate columns".into() },
                RegistryEvent::Removed { id: "o".into() },
            ]
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_find_by_table_and_schemas() {
        let registry = DataSourceRegistry::new();
        registry.upsert(DataSource::existing("People").with_id("p").with_status(loaded("people")));
        registry.upsert(DataSource::existing("pending").with_id("x"));

        assert_eq!(registry.find_by_table("people").unwrap().id, "p");
        let schemas = registry.schemas();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0].0, "People");
    }
}
