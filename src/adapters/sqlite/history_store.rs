//! SQLite implementation of the workflow history store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, SqlitePool};

use crate::domain::error::StoreError;
use crate::domain::ports::{HistoryEvent, HistoryEventKind, HistoryStore, RunStatus, WorkflowRun};

#[derive(Clone)]
pub struct SqliteHistoryStore {
    pool: SqlitePool,
}

impl SqliteHistoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[derive(FromRow)]
struct RunRow {
    workflow_id: String,
    task_queue: String,
    input: String,
    status: String,
    started_at: String,
    closed_at: Option<String>,
    result: Option<String>,
}

impl TryFrom<RunRow> for WorkflowRun {
    type Error = StoreError;

    fn try_from(row: RunRow) -> Result<Self, Self::Error> {
        Ok(WorkflowRun {
            workflow_id: row.workflow_id,
            task_queue: row.task_queue,
            input: serde_json::from_str(&row.input)?,
            status: RunStatus::from_str(&row.status).ok_or_else(|| {
                StoreError::ConstraintViolation(format!("bad run status {}", row.status))
            })?,
            started_at: parse_ts(&row.started_at)?,
            closed_at: row.closed_at.as_deref().map(parse_ts).transpose()?,
            result: row.result.as_deref().map(serde_json::from_str).transpose()?,
        })
    }
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, StoreError> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn register_run(&self, run: &WorkflowRun) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"INSERT INTO workflow_runs (workflow_id, task_queue, input, status, started_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(workflow_id) DO NOTHING"#,
        )
        .bind(&run.workflow_id)
        .bind(&run.task_queue)
        .bind(serde_json::to_string(&run.input)?)
        .bind(run.status.as_str())
        .bind(run.started_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_run(&self, workflow_id: &str) -> Result<Option<WorkflowRun>, StoreError> {
        let row: Option<RunRow> =
            sqlx::query_as("SELECT * FROM workflow_runs WHERE workflow_id = ?")
                .bind(workflow_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(WorkflowRun::try_from).transpose()
    }

    async fn list_open_runs(&self) -> Result<Vec<WorkflowRun>, StoreError> {
        let rows: Vec<RunRow> = sqlx::query_as(
            "SELECT * FROM workflow_runs WHERE status = 'running' ORDER BY started_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(WorkflowRun::try_from).collect()
    }

    async fn close_run(
        &self,
        workflow_id: &str,
        status: RunStatus,
        result: Option<&Value>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE workflow_runs SET status = ?, closed_at = ?, result = ? WHERE workflow_id = ?",
        )
        .bind(status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(result.map(serde_json::to_string).transpose()?)
        .bind(workflow_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_events(&self, workflow_id: &str) -> Result<Vec<HistoryEvent>, StoreError> {
        let rows: Vec<(i64, String, String, String, String)> = sqlx::query_as(
            "SELECT seq, kind, name, payload, recorded_at FROM workflow_events WHERE workflow_id = ? ORDER BY seq ASC",
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(seq, kind, name, payload, recorded_at)| {
                Ok(HistoryEvent {
                    seq: seq as u64,
                    kind: HistoryEventKind::from_str(&kind).ok_or_else(|| {
                        StoreError::ConstraintViolation(format!("bad event kind {kind}"))
                    })?,
                    name,
                    payload: serde_json::from_str(&payload)?,
                    recorded_at: parse_ts(&recorded_at)?,
                })
            })
            .collect()
    }

    async fn append_event(
        &self,
        workflow_id: &str,
        event: &HistoryEvent,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO workflow_events (workflow_id, seq, kind, name, payload, recorded_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(workflow_id)
        .bind(event.seq as i64)
        .bind(event.kind.as_str())
        .bind(&event.name)
        .bind(serde_json::to_string(&event.payload)?)
        .bind(event.recorded_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
