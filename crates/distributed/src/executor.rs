//! Concurrent query execution bounded by worker slots.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use rill_common::{EngineConfig, QueryId, Result, RillError};
use rill_execution::{ExecGraph, ExecState};
use tokio::sync::Semaphore;
use tracing::{error, info};

/// A graph ready to run together with its query state.
pub struct QueryTask {
    pub graph: ExecGraph,
    pub state: Arc<ExecState>,
}

#[derive(Debug, Clone)]
pub struct QuerySummary {
    pub query_id: QueryId,
    pub elapsed: Duration,
}

/// Runs independent queries on the blocking pool, at most `worker_slots` at a time.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    slots: Arc<Semaphore>,
}

impl QueryExecutor {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(config.worker_slots.max(1))),
        }
    }

    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Run one query to completion. The error is the query's first error.
    pub async fn run(&self, task: QueryTask) -> Result<QuerySummary> {
        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| RillError::Execution(format!("failed to acquire worker slot: {e}")))?;
        let query_id = task.state.query_id();
        let metrics = task.state.metrics().clone();
        info!(query_id = %query_id, "query started");
        let started = Instant::now();

        let joined = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let QueryTask { mut graph, state } = task;
            graph.execute(&state)
        })
        .await;
        let result = match joined {
            Ok(r) => r,
            Err(e) => Err(RillError::Execution(format!("query task failed to complete: {e}"))),
        };

        let elapsed = started.elapsed();
        match result {
            Ok(()) => {
                metrics.inc_query("succeeded");
                info!(query_id = %query_id, elapsed_ms = elapsed.as_millis() as u64, "query finished");
                Ok(QuerySummary { query_id, elapsed })
            }
            Err(e) => {
                metrics.inc_query("failed");
                error!(query_id = %query_id, error = %e, "query failed");
                Err(e)
            }
        }
    }

    /// Run `tasks` concurrently; results keep the input order.
    pub async fn run_all(&self, tasks: Vec<QueryTask>) -> Vec<Result<QuerySummary>> {
        join_all(tasks.into_iter().map(|t| self.run(t))).await
    }
}
