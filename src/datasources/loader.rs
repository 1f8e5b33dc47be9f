//! Data Source Loader - reconciles the desired list into engine tables
//!
//! Each call to [`DataSourceLoader::reconcile`] is an operation with its own
//! id and cancellation token. Starting a new operation cancels the previous
//! one; the older loop notices before its next step (or while waiting out a
//! backoff delay) and exits without touching the registry again. Every
//! registry write made by the loop is checked against the current operation
//! id under one lock, so a superseded step can never overwrite the work of
//! its successor.

use crate::config::LoaderConfig;
use crate::datasources::fetch::{file_name_from_url, UrlFetcher};
use crate::datasources::import::FileImporter;
use crate::datasources::inline::{load_inline, resolve_columns};
use crate::datasources::{
    introspect, DataSource, DataSourceRegistry, FileBlob, FileMetadata, LoadingStatus, Origin,
    SchemaColumn, TableLocks,
};
use crate::engine::{quote_ident, AnalyticsEngine};
use crate::error::{Result, WorkbenchError};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Outcome of one reconciliation operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub op_id: u64,
    pub loaded: Vec<String>,
    pub failed: Vec<String>,
    pub skipped: Vec<String>,
    /// A newer operation took over before this one finished
    pub superseded: bool,
}

struct CurrentOp {
    id: u64,
    token: CancellationToken,
}

/// Memo entry for a source the loader verified itself
struct ConfirmedTable {
    table_name: String,
    confirmed_at: DateTime<Utc>,
}

struct LoaderState {
    /// Ids confirmed loaded in the engine
    confirmed: DashMap<String, ConfirmedTable>,
    op_seq: AtomicU64,
    current: Mutex<CurrentOp>,
    batch_loading: AtomicBool,
}

/// What a successful materialization produced
struct Materialized {
    schema: Vec<SchemaColumn>,
    file: Option<FileMetadata>,
}

#[derive(Clone)]
pub struct DataSourceLoader {
    engine: Arc<dyn AnalyticsEngine>,
    registry: Arc<DataSourceRegistry>,
    fetcher: Arc<dyn UrlFetcher>,
    importer: FileImporter,
    locks: TableLocks,
    config: LoaderConfig,
    state: Arc<LoaderState>,
}

impl DataSourceLoader {
    pub fn new(
        engine: Arc<dyn AnalyticsEngine>,
        registry: Arc<DataSourceRegistry>,
        fetcher: Arc<dyn UrlFetcher>,
        config: LoaderConfig,
    ) -> Self {
        let locks = TableLocks::new();
        let importer = FileImporter::new(engine.clone(), registry.clone(), locks.clone());
        Self {
            engine,
            registry,
            fetcher,
            importer,
            locks,
            config,
            state: Arc::new(LoaderState {
                confirmed: DashMap::new(),
                op_seq: AtomicU64::new(0),
                current: Mutex::new(CurrentOp {
                    id: 0,
                    token: CancellationToken::new(),
                }),
                batch_loading: AtomicBool::new(false),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<DataSourceRegistry> {
        &self.registry
    }

    pub fn importer(&self) -> &FileImporter {
        &self.importer
    }

    /// True while the current operation is still running
    pub fn is_batch_loading(&self) -> bool {
        self.state.batch_loading.load(Ordering::SeqCst)
    }

    pub fn is_confirmed(&self, id: &str) -> bool {
        self.state.confirmed.contains_key(id)
    }

    /// Evict a source from the confirmed-loaded memo
    pub fn forget(&self, id: &str) {
        self.state.confirmed.remove(id);
    }

    fn current(&self) -> MutexGuard<'_, CurrentOp> {
        self.state.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a new operation and cancel the previous one
    fn begin(&self) -> (u64, CancellationToken) {
        let mut current = self.current();
        current.token.cancel();

        let id = self.state.op_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();
        *current = CurrentOp {
            id,
            token: token.clone(),
        };
        self.state.batch_loading.store(true, Ordering::SeqCst);
        (id, token)
    }

    /// Run `f` only if `op_id` is still the current operation
    fn commit<F: FnOnce()>(&self, op_id: u64, f: F) -> bool {
        let current = self.current();
        if current.id != op_id {
            return false;
        }
        f();
        true
    }

    fn finish(&self, op_id: u64) {
        let current = self.current();
        if current.id == op_id {
            self.state.batch_loading.store(false, Ordering::SeqCst);
        }
    }

    /// Delay before the `index`-th processed source (0-based)
    pub fn backoff_delay(&self, index: u32) -> Duration {
        if index == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(index);
        let delay = self.config.backoff_base.saturating_mul(factor);
        match self.config.max_backoff {
            Some(max) => delay.min(max),
            None => delay,
        }
    }

    /// Reconcile in the background; the caller is not blocked
    pub fn spawn_reconcile(&self, desired: Vec<DataSource>) -> JoinHandle<LoadReport> {
        let loader = self.clone();
        tokio::spawn(async move { loader.reconcile(desired).await })
    }

    /// Bring every desired source to `loaded` or `failed`
    ///
    /// Never returns an error: per-source failures are recorded on the source.
    pub async fn reconcile(&self, desired: Vec<DataSource>) -> LoadReport {
        self.registry.mount(&desired);
        let (op_id, token) = self.begin();
        info!(op_id, sources = desired.len(), "starting data source reconciliation");

        let mut report = LoadReport {
            op_id,
            ..LoadReport::default()
        };
        let mut processed: u32 = 0;

        for declared in &desired {
            if token.is_cancelled() {
                report.superseded = true;
                break;
            }

            let Some(source) = self.registry.get(&declared.id) else {
                continue;
            };
            if self.is_confirmed(&source.id) && source.is_loaded() {
                debug!(op_id, source_id = %source.id, "already loaded, skipping");
                report.skipped.push(source.id.clone());
                continue;
            }

            let marked = self.commit(op_id, || {
                self.registry.set_status(&source.id, LoadingStatus::Loading);
            });
            if !marked {
                report.superseded = true;
                break;
            }

            let delay = self.backoff_delay(processed);
            if !delay.is_zero() {
                debug!(op_id, source_id = %source.id, delay_ms = delay.as_millis() as u64, "backing off");
                tokio::select! {
                    () = token.cancelled() => {
                        report.superseded = true;
                        break;
                    }
                    () = tokio::time::sleep(delay) => {}
                }
            }
            if token.is_cancelled() {
                report.superseded = true;
                break;
            }
            processed += 1;

            // A superseded run may still be rebuilding this table
            let table_guard = tokio::select! {
                () = token.cancelled() => {
                    report.superseded = true;
                    break;
                }
                guard = self.locks.acquire(&source.table_name) => guard,
            };
            let outcome = self.process_source(&source).await;
            drop(table_guard);
            if token.is_cancelled() {
                debug!(op_id, source_id = %source.id, "discarding result of superseded operation");
                report.superseded = true;
                break;
            }

            let committed = match outcome {
                Ok(materialized) => self.commit(op_id, || {
                    self.registry.update(&source.id, |s| {
                        if materialized.file.is_some() {
                            s.file = materialized.file;
                        }
                        s.status = LoadingStatus::Loaded {
                            schema: materialized.schema,
                        };
                    });
                    self.state.confirmed.insert(
                        source.id.clone(),
                        ConfirmedTable {
                            table_name: source.table_name.clone(),
                            confirmed_at: Utc::now(),
                        },
                    );
                    info!(op_id, source_id = %source.id, table = %source.table_name, "data source loaded");
                    report.loaded.push(source.id.clone());
                }),
                Err(e) => self.commit(op_id, || {
                    warn!(op_id, source_id = %source.id, table = %source.table_name, "data source failed: {}", e);
                    self.registry.set_status(
                        &source.id,
                        LoadingStatus::Failed {
                            error: e.to_string(),
                        },
                    );
                    self.forget(&source.id);
                    report.failed.push(source.id.clone());
                }),
            };
            if !committed {
                report.superseded = true;
                break;
            }
        }

        self.finish(op_id);
        info!(
            op_id,
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            superseded = report.superseded,
            "reconciliation finished"
        );
        report
    }

    async fn process_source(&self, source: &DataSource) -> Result<Materialized> {
        let engine = self.engine.as_ref();
        let table = source.table_name.as_str();

        match source.origin() {
            Origin::Inline { rows, column_order } => {
                let resolved = resolve_columns(rows, column_order);
                if !resolved.duplicates.is_empty() {
                    let message = format!(
                        "Duplicate columns {} in column order for table {}; keeping the first occurrence",
                        resolved.duplicates.join(", "),
                        table
                    );
                    warn!(source_id = %source.id, "{}", message);
                    self.registry.warn(&source.id, message);
                }

                load_inline(engine, table, &resolved.columns, rows).await?;
                let schema = introspect::table_columns(engine, table).await?;
                Ok(Materialized { schema, file: None })
            }
            Origin::Existing => {
                if !introspect::table_exists(engine, table).await? {
                    return Err(WorkbenchError::DataSourceLoad(format!(
                        "Table {} does not exist and no URL was provided to load it",
                        table
                    )));
                }
                let schema = introspect::table_columns(engine, table).await?;
                Ok(Materialized { schema, file: None })
            }
            Origin::Url(url) => {
                if introspect::table_exists(engine, table).await? {
                    debug!(source_id = %source.id, table = %table, "table already present, skipping fetch");
                    let schema = introspect::table_columns(engine, table).await?;
                    return Ok(Materialized { schema, file: None });
                }

                let fetched = self.fetcher.fetch(url).await?;
                let blob = FileBlob::new(file_name_from_url(url, &source.name), fetched.bytes)
                    .with_mime_type(fetched.content_type);
                let created = self.importer.materialize(&blob, table).await?;
                Ok(Materialized {
                    schema: created.schema,
                    file: Some(blob.metadata()),
                })
            }
            Origin::File(blob) => {
                let created = self.importer.materialize(blob, table).await?;
                Ok(Materialized {
                    schema: created.schema,
                    file: Some(blob.metadata()),
                })
            }
        }
    }

    /// Drop tables of confirmed sources that are no longer desired
    ///
    /// Each drop runs as its own task; a failed drop leaves that source in
    /// place and does not affect the others.
    pub fn cleanup_removed(&self, desired: &[DataSource]) -> Vec<JoinHandle<bool>> {
        let keep: HashSet<&str> = desired.iter().map(|s| s.id.as_str()).collect();
        let stale: Vec<String> = self
            .state
            .confirmed
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|id| !keep.contains(id.as_str()))
            .collect();

        stale
            .into_iter()
            .map(|id| {
                let loader = self.clone();
                tokio::spawn(async move { loader.drop_source(&id).await })
            })
            .collect()
    }

    async fn drop_source(&self, id: &str) -> bool {
        let memo = self
            .state
            .confirmed
            .get(id)
            .map(|entry| (entry.table_name.clone(), entry.confirmed_at));
        // The registry record may already be gone; the memo still knows the table
        let table_name = match (self.registry.get(id), &memo) {
            (Some(source), _) => source.table_name,
            (None, Some((table_name, _))) => table_name.clone(),
            (None, None) => return true,
        };

        let _guard = self.locks.acquire(&table_name).await;
        let sql = format!("DROP TABLE IF EXISTS {}", quote_ident(&table_name));
        match self.engine.query(&sql).await {
            Ok(_) => {
                self.registry.remove(id);
                self.forget(id);
                info!(
                    source_id = %id,
                    table = %table_name,
                    loaded_at = ?memo.map(|(_, at)| at),
                    "dropped table of removed data source"
                );
                true
            }
            Err(e) => {
                error!(source_id = %id, table = %table_name, "failed to drop table: {}", e);
                false
            }
        }
    }
}
