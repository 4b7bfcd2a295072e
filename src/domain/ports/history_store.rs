//! Workflow history store port.
//!
//! The durable record behind the workflow engine: one run row per workflow
//! id (the unique key that makes starts idempotent) and an append-only
//! event journal per run. Replay feeds recorded events back to the workflow
//! future instead of re-executing side effects.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::error::StoreError;

/// Lifecycle of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
    Terminated,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Terminated => "terminated",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            "terminated" => Some(Self::Terminated),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// One registered workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub workflow_id: String,
    pub task_queue: String,
    pub input: Value,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub result: Option<Value>,
}

impl WorkflowRun {
    pub fn new(workflow_id: impl Into<String>, task_queue: impl Into<String>, input: Value) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            task_queue: task_queue.into(),
            input,
            status: RunStatus::Running,
            started_at: Utc::now(),
            closed_at: None,
            result: None,
        }
    }
}

/// Kind of a journaled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryEventKind {
    /// An activity completed; payload is its serialized result.
    ActivityCompleted,
    /// An external signal arrived; payload is the signal record.
    SignalReceived,
    /// A deterministic timestamp was recorded.
    TimestampMarker,
}

impl HistoryEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ActivityCompleted => "activity_completed",
            Self::SignalReceived => "signal_received",
            Self::TimestampMarker => "timestamp_marker",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "activity_completed" => Some(Self::ActivityCompleted),
            "signal_received" => Some(Self::SignalReceived),
            "timestamp_marker" => Some(Self::TimestampMarker),
            _ => None,
        }
    }
}

/// One entry of a workflow's event journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEvent {
    /// Position in the journal, starting at 0.
    pub seq: u64,
    pub kind: HistoryEventKind,
    /// Activity or signal name; empty for markers.
    pub name: String,
    pub payload: Value,
    pub recorded_at: DateTime<Utc>,
}

/// Durable store of workflow runs and their histories.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Register a run. Returns false when a run with the same workflow id
    /// already exists (idempotent start).
    async fn register_run(&self, run: &WorkflowRun) -> Result<bool, StoreError>;

    async fn get_run(&self, workflow_id: &str) -> Result<Option<WorkflowRun>, StoreError>;

    /// Runs still marked running, e.g. for recovery after a restart.
    async fn list_open_runs(&self) -> Result<Vec<WorkflowRun>, StoreError>;

    /// Close a run with its terminal status and optional result.
    async fn close_run(
        &self,
        workflow_id: &str,
        status: RunStatus,
        result: Option<&Value>,
    ) -> Result<(), StoreError>;

    /// Load a run's journal in sequence order.
    async fn load_events(&self, workflow_id: &str) -> Result<Vec<HistoryEvent>, StoreError>;

    /// Append one event to a run's journal.
    async fn append_event(&self, workflow_id: &str, event: &HistoryEvent)
        -> Result<(), StoreError>;
}
