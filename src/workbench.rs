//! Workbench - the caller-facing surface
//!
//! Wires the registry, loader, query controller, completion snapshot and
//! optional SQL assistant around one engine, and exposes the user actions:
//! syncing the desired source list, importing files, selecting a source,
//! running insights, exporting results and dismissing failed sources.

use crate::completion::{CompletionItem, CompletionProvider};
use crate::config::WorkbenchConfig;
use crate::datasources::fetch::UrlFetcher;
use crate::datasources::{DataSource, DataSourceLoader, DataSourceRegistry, FileBlob, LoadReport, SchemaColumn};
use crate::engine::AnalyticsEngine;
use crate::error::{Result, WorkbenchError};
use crate::execution::export::{self, ExportFormat, ExportSelection};
use crate::execution::{
    ExecutionState, QueryController, QueryLog, QueryResult, SqlFormatter, SqlParserFormatter,
};
use crate::insights::{builtin_insights, InsightsQuery};
use crate::llm::{GenerationContext, SourceContext, SqlAssistant};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

type SchemaSnapshot = Vec<(String, Vec<SchemaColumn>)>;

pub struct Workbench {
    config: WorkbenchConfig,
    engine: Arc<dyn AnalyticsEngine>,
    registry: Arc<DataSourceRegistry>,
    loader: DataSourceLoader,
    controller: Arc<QueryController>,
    log: Arc<QueryLog>,
    insights: Vec<InsightsQuery>,
    assistant: Option<Arc<dyn SqlAssistant>>,
    completion: RwLock<(SchemaSnapshot, Arc<CompletionProvider>)>,
}

impl Workbench {
    pub fn new(engine: Arc<dyn AnalyticsEngine>, fetcher: Arc<dyn UrlFetcher>, config: WorkbenchConfig) -> Self {
        let registry = Arc::new(DataSourceRegistry::new());
        let loader = DataSourceLoader::new(engine.clone(), registry.clone(), fetcher, config.loader);
        let log = Arc::new(QueryLog::default());
        let formatter: Arc<dyn SqlFormatter> = Arc::new(SqlParserFormatter);
        let controller = Arc::new(QueryController::new(Some(engine.clone()), formatter, log.clone()));

        Self {
            config,
            engine,
            registry,
            loader,
            controller,
            log,
            insights: builtin_insights(),
            assistant: None,
            completion: RwLock::new((Vec::new(), Arc::new(CompletionProvider::new(Vec::new())))),
        }
    }

    /// In-memory DuckDB with HTTP fetching
    #[cfg(feature = "duckdb")]
    pub fn open_duckdb(config: WorkbenchConfig) -> Result<Self> {
        let engine = Arc::new(crate::engine::DuckDbEngine::open_in_memory()?);
        let fetcher = Arc::new(crate::datasources::HttpFetcher::new());
        Ok(Self::new(engine, fetcher, config))
    }

    pub fn with_assistant(mut self, assistant: Arc<dyn SqlAssistant>) -> Self {
        self.assistant = Some(assistant);
        self
    }

    pub fn with_insights(mut self, insights: Vec<InsightsQuery>) -> Self {
        self.insights = insights;
        self
    }

    pub fn config(&self) -> &WorkbenchConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<dyn AnalyticsEngine> {
        &self.engine
    }

    pub fn registry(&self) -> &Arc<DataSourceRegistry> {
        &self.registry
    }

    pub fn loader(&self) -> &DataSourceLoader {
        &self.loader
    }

    pub fn controller(&self) -> &Arc<QueryController> {
        &self.controller
    }

    pub fn query_log(&self) -> &Arc<QueryLog> {
        &self.log
    }

    pub fn insights(&self) -> &[InsightsQuery] {
        &self.insights
    }

    pub fn is_batch_loading(&self) -> bool {
        self.loader.is_batch_loading()
    }

    /// Reconcile the engine with `desired`
    ///
    /// With auto cleanup enabled, tables of sources no longer desired are
    /// dropped first.
    pub async fn sync_data_sources(&self, desired: Vec<DataSource>) -> LoadReport {
        if self.config.auto_cleanup {
            for handle in self.loader.cleanup_removed(&desired) {
                if let Err(e) = handle.await {
                    warn!("cleanup task failed: {}", e);
                }
            }
        }
        self.loader.reconcile(desired).await
    }

    /// Import a file as a new source, or refresh the source owning its table
    pub async fn import_file(&self, file: FileBlob) -> Result<DataSource> {
        let source = self.loader.importer().import(file, None).await?;
        info!(source_id = %source.id, table = %source.table_name, "file imported");
        Ok(source)
    }

    /// Re-import a file into an existing source
    pub async fn reimport_file(&self, source_id: &str, file: FileBlob) -> Result<DataSource> {
        self.loader.importer().import(file, Some(source_id)).await
    }

    /// Put a preview query for the source into the editor
    pub fn select_data_source(&self, source_id: &str) -> Result<String> {
        let source = self
            .registry
            .get(source_id)
            .ok_or_else(|| WorkbenchError::NotFound(source_id.to_string()))?;
        let sql = format!("SELECT * FROM {} LIMIT {}", source.table_name, self.config.select_limit);
        self.controller.set_query(sql.clone());
        Ok(sql)
    }

    pub async fn run(&self) -> ExecutionState {
        self.controller.run().await
    }

    pub async fn run_query(&self, sql: impl Into<String>) -> ExecutionState {
        self.controller.run_query(sql).await
    }

    pub async fn cancel(&self) -> bool {
        self.controller.cancel().await
    }

    pub fn format(&self) -> bool {
        self.controller.format()
    }

    /// Run an insight template against a source's table
    pub async fn run_insight(&self, insight_id: &str, source_id: &str) -> Result<ExecutionState> {
        let insight = self
            .insights
            .iter()
            .find(|i| i.id == insight_id)
            .ok_or_else(|| WorkbenchError::NotFound(insight_id.to_string()))?;
        let source = self
            .registry
            .get(source_id)
            .ok_or_else(|| WorkbenchError::NotFound(source_id.to_string()))?;

        let sql = insight.render_for(&source.table_name);
        Ok(self.controller.run_insight(insight.id.clone(), sql).await)
    }

    /// Export the current result; `None` when nothing has run yet
    pub fn export(&self, format: ExportFormat, selection: &ExportSelection) -> Result<Option<String>> {
        match self.controller.result() {
            Some(result) => export::export(&result, format, selection).map(Some),
            None => Ok(None),
        }
    }

    /// Write the current result to `path`; false when nothing has run yet
    pub fn export_to_file(&self, format: ExportFormat, selection: &ExportSelection, path: &Path) -> Result<bool> {
        match self.controller.result() {
            Some(result) => {
                export::export_to_file(&result, format, selection, path)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove a source whose load failed; other sources are left alone
    pub fn dismiss_failed_source(&self, source_id: &str) -> Option<DataSource> {
        let source = self.registry.get(source_id).filter(|s| s.is_failed())?;
        self.loader.forget(source_id);
        self.registry.remove(&source.id)
    }

    /// Completion snapshot for the current schemas, rebuilt when they change
    pub fn completion_provider(&self) -> Arc<CompletionProvider> {
        let schemas = self.registry.schemas();
        {
            let cached = self.completion.read().unwrap_or_else(PoisonError::into_inner);
            if cached.0 == schemas {
                return cached.1.clone();
            }
        }

        let provider = Arc::new(CompletionProvider::new(schemas.clone()));
        *self.completion.write().unwrap_or_else(PoisonError::into_inner) = (schemas, provider.clone());
        provider
    }

    pub fn completions(&self, text: &str, cursor: usize) -> Vec<CompletionItem> {
        self.completion_provider().complete(text, cursor)
    }

    /// Schema and sample rows of every loaded source, for the assistant
    pub async fn generation_context(&self, user_request: &str) -> GenerationContext {
        let mut data_sources = Vec::new();
        for source in self.registry.snapshot() {
            let Some(schema) = source.schema() else { continue };
            let sample_rows = match self
                .engine
                .query(&GenerationContext::sample_query(&source.table_name))
                .await
            {
                Ok(raw) => QueryResult::from_engine(raw, "", Default::default()).records(),
                Err(e) => {
                    warn!(table = %source.table_name, "failed to sample rows: {}", e);
                    Vec::new()
                }
            };
            data_sources.push(SourceContext {
                name: source.name.clone(),
                table_name: source.table_name.clone(),
                schema: schema.to_vec(),
                sample_rows,
            });
        }

        let current_query = Some(self.controller.query()).filter(|q| !q.trim().is_empty());
        GenerationContext {
            user_request: user_request.to_string(),
            data_sources,
            current_query,
        }
    }

    /// Ask the assistant for SQL answering `user_request`
    pub async fn generate_sql(&self, user_request: &str) -> Result<String> {
        let assistant = self
            .assistant
            .clone()
            .ok_or_else(|| WorkbenchError::Config("no SQL assistant configured".to_string()))?;
        let context = self.generation_context(user_request).await;
        assistant.generate_sql(&context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoaderConfig;
    use crate::datasources::fetch::mock::MockFetcher;
    use crate::datasources::Row;
    use crate::engine::mock::MockEngine;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    fn setup(engine: MockEngine, auto_cleanup: bool) -> (Workbench, Arc<MockEngine>) {
        let engine = Arc::new(engine);
        let config = WorkbenchConfig {
            auto_cleanup,
            loader: LoaderConfig {
                backoff_base: Duration::from_millis(1),
                max_backoff: None,
            },
            ..WorkbenchConfig::default()
        };
        (Workbench::new(engine.clone(), Arc::new(MockFetcher::new()), config), engine)
    }

    fn inline(table: &str) -> DataSource {
        let rows: Vec<Row> = vec![json!({"id": 1, "name": "Ada"}).as_object().cloned().unwrap()];
        DataSource::from_rows(table, rows).with_id(table)
    }

    #[tokio::test]
    async fn test_select_data_source_sets_preview_query() {
        let (workbench, _) = setup(MockEngine::new(), false);
        workbench.sync_data_sources(vec![inline("people")]).await;

        let sql = workbench.select_data_source("people").unwrap();
        assert_eq!(sql, "SELECT * FROM people LIMIT 100");
        assert_eq!(workbench.controller().query(), sql);
        assert!(matches!(
            workbench.select_data_source("missing"),
            Err(WorkbenchError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_auto_cleanup_drops_removed_sources() {
        let (workbench, engine) = setup(MockEngine::new(), true);
        workbench.sync_data_sources(vec![inline("a"), inline("b")]).await;
        assert!(engine.has_table("b"));

        workbench.sync_data_sources(vec![inline("a")]).await;
        assert!(!engine.has_table("b"));
        assert!(workbench.registry().get("b").is_none());
    }

    #[tokio::test]
    async fn test_removed_sources_kept_without_auto_cleanup() {
        let (workbench, engine) = setup(MockEngine::new(), false);
        workbench.sync_data_sources(vec![inline("a"), inline("b")]).await;
        workbench.sync_data_sources(vec![inline("a")]).await;
        assert!(engine.has_table("b"));
    }

    #[tokio::test]
    async fn test_dismiss_only_failed_sources() {
        let (workbench, _) = setup(MockEngine::new(), false);
        let missing = DataSource::existing("ghost").with_id("ghost");
        workbench.sync_data_sources(vec![inline("people"), missing]).await;

        assert!(workbench.dismiss_failed_source("people").is_none());
        assert!(workbench.dismiss_failed_source("ghost").is_some());
        assert_eq!(workbench.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_insight_runs_against_source_table() {
        let (workbench, engine) = setup(MockEngine::new(), false);
        workbench.sync_data_sources(vec![inline("customers")]).await;

        let state = workbench.run_insight("row_count", "customers").await.unwrap();
        assert_eq!(state, ExecutionState::Completed);
        assert_eq!(engine.queries_matching("SELECT COUNT(*) AS row_count FROM customers"), 1);
        assert_eq!(workbench.controller().active_insight().as_deref(), Some("row_count"));
        assert!(workbench.run_insight("nope", "customers").await.is_err());
    }

    #[tokio::test]
    async fn test_export_before_any_run_is_none() {
        let (workbench, _) = setup(MockEngine::new(), false);
        assert!(workbench.export(ExportFormat::Csv, &ExportSelection::all()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_completion_snapshot_follows_schemas() {
        let (workbench, _) = setup(MockEngine::new(), false);
        let before = workbench.completion_provider();
        assert!(before.table_names().is_empty());

        workbench.sync_data_sources(vec![inline("people")]).await;
        let after = workbench.completion_provider();
        assert_eq!(after.table_names(), vec!["people"]);
        assert!(Arc::ptr_eq(&after, &workbench.completion_provider()));

        let items = workbench.completions("SELECT na FROM people", 9);
        assert_eq!(items[0].label, "name");
    }

    struct EchoAssistant;

    #[async_trait]
    impl SqlAssistant for EchoAssistant {
        async fn generate_sql(&self, context: &GenerationContext) -> Result<String> {
            let tables: Vec<&str> = context.data_sources.iter().map(|s| s.table_name.as_str()).collect();
            Ok(format!("SELECT * FROM {}", tables.join(", ")))
        }
    }

    #[tokio::test]
    async fn test_generate_sql_uses_loaded_sources() {
        let (workbench, engine) = setup(MockEngine::new(), false);
        assert!(workbench.generate_sql("anything").await.is_err());

        let workbench = workbench.with_assistant(Arc::new(EchoAssistant));
        workbench.sync_data_sources(vec![inline("people")]).await;

        let sql = workbench.generate_sql("everyone").await.unwrap();
        assert_eq!(sql, "SELECT * FROM people");
        assert_eq!(engine.queries_matching("SELECT * FROM \"people\" LIMIT 5"), 1);
    }
}
