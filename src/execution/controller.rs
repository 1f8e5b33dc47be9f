//! Query Execution Controller
//!
//! Owns the text of the active query and the execution state machine:
//!
//! ```text
//! Idle | Completed | Error --run--> Running --> Completed | Error
//! Running --cancel--> Interrupting --> Idle
//! ```
//!
//! Engine failures are classified into [`SqlError`] and stored; they never
//! propagate to the caller. A cancelled run keeps going inside the engine
//! until it notices the interrupt, and whatever it returns is discarded.

use crate::engine::AnalyticsEngine;
use crate::execution::error_classifier::{classify_error, SqlError};
use crate::execution::formatter::SqlFormatter;
use crate::execution::query_log::{QueryLog, QueryLogEntry, QueryOutcome};
use crate::execution::result::QueryResult;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    Idle,
    Running,
    Completed,
    Error,
    Interrupting,
}

impl ExecutionState {
    /// States a new run may start from
    pub fn accepts_run(&self) -> bool {
        matches!(
            self,
            ExecutionState::Idle | ExecutionState::Completed | ExecutionState::Error
        )
    }
}

struct ControllerState {
    state: ExecutionState,
    query: String,
    result: Option<Arc<QueryResult>>,
    error: Option<SqlError>,
    format_error: Option<String>,
    /// Insight whose template produced the current query
    active_insight: Option<String>,
    /// Bumped on every run and cancel; a run only commits if unchanged
    generation: u64,
}

pub struct QueryController {
    engine: Option<Arc<dyn AnalyticsEngine>>,
    formatter: Arc<dyn SqlFormatter>,
    log: Arc<QueryLog>,
    inner: Mutex<ControllerState>,
    state_tx: watch::Sender<ExecutionState>,
}

impl QueryController {
    pub fn new(
        engine: Option<Arc<dyn AnalyticsEngine>>,
        formatter: Arc<dyn SqlFormatter>,
        log: Arc<QueryLog>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ExecutionState::Idle);
        Self {
            engine,
            formatter,
            log,
            inner: Mutex::new(ControllerState {
                state: ExecutionState::Idle,
                query: String::new(),
                result: None,
                error: None,
                format_error: None,
                active_insight: None,
                generation: 0,
            }),
            state_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, inner: &mut ControllerState, next: ExecutionState) {
        debug!(from = ?inner.state, to = ?next, "execution state change");
        inner.state = next;
        self.state_tx.send_replace(next);
    }

    pub fn subscribe(&self) -> watch::Receiver<ExecutionState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> ExecutionState {
        self.lock().state
    }

    pub fn query(&self) -> String {
        self.lock().query.clone()
    }

    pub fn set_query(&self, sql: impl Into<String>) {
        self.lock().query = sql.into();
    }

    /// `None` until a run completes; an empty result is `Some`
    pub fn result(&self) -> Option<Arc<QueryResult>> {
        self.lock().result.clone()
    }

    pub fn error(&self) -> Option<SqlError> {
        self.lock().error.clone()
    }

    pub fn format_error(&self) -> Option<String> {
        self.lock().format_error.clone()
    }

    pub fn active_insight(&self) -> Option<String> {
        self.lock().active_insight.clone()
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    pub fn can_run(&self) -> bool {
        let inner = self.lock();
        self.engine.is_some() && inner.state.accepts_run() && !inner.query.trim().is_empty()
    }

    /// Run the current query; returns the state the run settled in
    pub async fn run(&self) -> ExecutionState {
        self.execute(None).await
    }

    /// Replace the query and run it
    pub async fn run_query(&self, sql: impl Into<String>) -> ExecutionState {
        self.set_query(sql);
        self.execute(None).await
    }

    /// Run a query produced from an insight template
    pub async fn run_insight(&self, insight: impl Into<String>, sql: impl Into<String>) -> ExecutionState {
        self.set_query(sql);
        self.execute(Some(insight.into())).await
    }

    async fn execute(&self, insight: Option<String>) -> ExecutionState {
        let Some(engine) = self.engine.clone() else {
            warn!("run requested without an engine");
            return self.state();
        };

        let (sql, generation) = {
            let mut inner = self.lock();
            if !inner.state.accepts_run() || inner.query.trim().is_empty() {
                debug!(state = ?inner.state, "run ignored");
                return inner.state;
            }
            inner.error = None;
            inner.result = None;
            inner.active_insight = insight;
            inner.generation += 1;
            self.transition(&mut inner, ExecutionState::Running);
            (inner.query.clone(), inner.generation)
        };

        let started_at = Utc::now();
        let started = Instant::now();
        let outcome = engine.query(&sql).await;
        let elapsed = started.elapsed();

        let mut inner = self.lock();
        let mut entry = QueryLogEntry {
            id: Uuid::new_v4(),
            query: sql.clone(),
            started_at,
            duration_ms: elapsed.as_millis() as u64,
            outcome: QueryOutcome::Cancelled,
            rows: None,
            error: None,
        };

        if inner.generation != generation || inner.state != ExecutionState::Running {
            info!(duration_ms = entry.duration_ms, "discarding outcome of interrupted query");
            self.log.record(entry);
            return inner.state;
        }

        match outcome {
            Ok(raw) => {
                let result = QueryResult::from_engine(raw, &sql, elapsed);
                info!(rows = result.len(), duration_ms = result.execution_time_ms, "query completed");
                entry.outcome = QueryOutcome::Completed;
                entry.rows = Some(result.len());
                inner.result = Some(Arc::new(result));
                self.transition(&mut inner, ExecutionState::Completed);
            }
            Err(e) => {
                let error = classify_error(&e, Some(&sql));
                warn!(kind = %error.kind, "query failed: {}", error.message);
                entry.outcome = QueryOutcome::Failed;
                entry.error = Some(error.message.clone());
                inner.error = Some(error);
                self.transition(&mut inner, ExecutionState::Error);
            }
        }
        self.log.record(entry);
        inner.state
    }

    /// Interrupt the running query
    ///
    /// Returns false if nothing was running. The controller ends up `Idle`
    /// whether or not the engine accepted the interrupt.
    pub async fn cancel(&self) -> bool {
        {
            let mut inner = self.lock();
            if inner.state != ExecutionState::Running {
                return false;
            }
            inner.generation += 1;
            self.transition(&mut inner, ExecutionState::Interrupting);
        }

        if let Some(engine) = &self.engine {
            match engine.cancel_sent().await {
                Ok(true) => info!("query interrupt sent"),
                Ok(false) => warn!("engine reported nothing to interrupt"),
                Err(e) => warn!("failed to interrupt query: {}", e),
            }
        }

        let mut inner = self.lock();
        self.transition(&mut inner, ExecutionState::Idle);
        true
    }

    /// Pretty-print the current query in place
    ///
    /// Independent of execution state; a failure only sets `format_error`.
    pub fn format(&self) -> bool {
        let query = self.query();
        match self.formatter.format(&query) {
            Ok(formatted) => {
                let mut inner = self.lock();
                inner.query = formatted;
                inner.format_error = None;
                true
            }
            Err(e) => {
                debug!("format failed: {}", e);
                self.lock().format_error = Some(e.to_string());
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::MockEngine;
    use crate::engine::{CellValue, EngineColumn, EngineResult};
    use crate::execution::error_classifier::SqlErrorKind;
    use crate::execution::formatter::SqlParserFormatter;
    use std::time::Duration;

    fn one_row() -> EngineResult {
        EngineResult {
            columns: vec![EngineColumn {
                name: "n".into(),
                type_name: "Int32".into(),
                nullable: true,
            }],
            rows: vec![vec![CellValue::Integer(1)]],
        }
    }

    fn controller(engine: MockEngine) -> (Arc<QueryController>, Arc<QueryLog>) {
        let log = Arc::new(QueryLog::default());
        let controller = QueryController::new(Some(Arc::new(engine)), Arc::new(SqlParserFormatter), log.clone());
        (Arc::new(controller), log)
    }

    async fn wait_for(controller: &QueryController, state: ExecutionState) {
        for _ in 0..500 {
            if controller.state() == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("controller never reached {:?}", state);
    }

    #[tokio::test]
    async fn test_run_completes_with_result() {
        let (controller, log) = controller(MockEngine::new().respond("SELECT 1", one_row()));
        assert!(controller.result().is_none());

        let state = controller.run_query("SELECT 1 AS n").await;

        assert_eq!(state, ExecutionState::Completed);
        let result = controller.result().unwrap();
        assert_eq!(result.len(), 1);
        assert!(controller.error().is_none());
        assert_eq!(log.recent(1)[0].outcome, QueryOutcome::Completed);
    }

    #[tokio::test]
    async fn test_run_failure_is_classified() {
        let (controller, _) = controller(
            MockEngine::new().fail_on("SELEC 1", "Parser Error: syntax error at or near \"SELEC\"\n\nLINE 1: SELEC 1\n        ^"),
        );

        let state = controller.run_query("SELEC 1").await;

        assert_eq!(state, ExecutionState::Error);
        let error = controller.error().unwrap();
        assert_eq!(error.kind, SqlErrorKind::Syntax);
        assert_eq!(error.line, Some(1));
        assert_eq!(error.column, Some(1));
        assert!(controller.result().is_none());

        let retry = controller.run_query("SELECT 2").await;
        assert_eq!(retry, ExecutionState::Completed);
        assert!(controller.error().is_none());
    }

    #[tokio::test]
    async fn test_run_preconditions() {
        let (controller, _) = controller(MockEngine::new());
        assert!(!controller.can_run());
        assert_eq!(controller.run_query("   ").await, ExecutionState::Idle);

        let detached = QueryController::new(None, Arc::new(SqlParserFormatter), Arc::new(QueryLog::default()));
        detached.set_query("SELECT 1");
        assert!(!detached.can_run());
        assert_eq!(detached.run().await, ExecutionState::Idle);
    }

    #[tokio::test]
    async fn test_cancel_discards_outcome() {
        let (controller, log) = controller(MockEngine::new().with_slow_query("range(1000000000)"));

        let running = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.run_query("SELECT sum(i) FROM range(1000000000) t(i)").await })
        };
        wait_for(&controller, ExecutionState::Running).await;
        assert!(!controller.can_run());

        assert!(controller.cancel().await);
        assert_eq!(controller.state(), ExecutionState::Idle);

        assert_eq!(running.await.unwrap(), ExecutionState::Idle);
        assert!(controller.result().is_none());
        assert!(controller.error().is_none());
        assert_eq!(log.recent(1)[0].outcome, QueryOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_reaches_idle_when_engine_refuses() {
        let (controller, _) = controller(
            MockEngine::new()
                .with_slow_query("slow_table")
                .with_failing_cancel(),
        );
        let mut states = controller.subscribe();

        let running = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.run_query("SELECT * FROM slow_table").await })
        };
        wait_for(&controller, ExecutionState::Running).await;
        states.borrow_and_update();

        assert!(controller.cancel().await);
        assert_eq!(controller.state(), ExecutionState::Idle);
        assert_eq!(*states.borrow(), ExecutionState::Idle);
        running.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_only_while_running() {
        let (controller, _) = controller(MockEngine::new());
        assert!(!controller.cancel().await);
        assert_eq!(controller.state(), ExecutionState::Idle);
    }

    #[tokio::test]
    async fn test_format_is_independent_of_execution() {
        let (controller, _) = controller(MockEngine::new());
        controller.set_query("select  a from t");
        assert!(controller.format());
        assert_eq!(controller.query(), "SELECT a FROM t");

        controller.set_query("select from where");
        assert!(!controller.format());
        assert!(controller.format_error().is_some());
        assert_eq!(controller.query(), "select from where");
        assert_eq!(controller.state(), ExecutionState::Idle);
    }

    #[tokio::test]
    async fn test_insight_association_resets_on_plain_run() {
        let (controller, _) = controller(MockEngine::new());
        controller.run_insight("row_count", "SELECT COUNT(*) FROM customers").await;
        assert_eq!(controller.active_insight().as_deref(), Some("row_count"));

        controller.run_query("SELECT 1").await;
        assert!(controller.active_insight().is_none());
    }
}
