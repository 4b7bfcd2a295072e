//! Task domain model.
//!
//! A task is one tenant request moving through routing, planning, approval,
//! and delegated execution. Status mutations happen exclusively inside
//! workflow activities; terminal transitions are one-way.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Status of a task in the orchestration pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is persisted but no workflow has picked it up yet.
    Pending,
    /// The root agent is drafting an execution plan.
    Planning,
    /// Blocked on user feedback (clarification or plan approval).
    WaitingForInput,
    /// An agent is actively working the task.
    InProgress,
    /// The task is being retried across the escalation chain.
    Escalated,
    /// Task completed successfully.
    Completed,
    /// Task failed; `metadata.failure_reason` carries the cause.
    Failed,
    /// Task was cancelled by signal or deletion.
    Cancelled,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Planning => "planning",
            Self::WaitingForInput => "waiting_for_input",
            Self::InProgress => "in_progress",
            Self::Escalated => "escalated",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "planning" => Some(Self::Planning),
            "waiting_for_input" => Some(Self::WaitingForInput),
            "in_progress" => Some(Self::InProgress),
            "escalated" => Some(Self::Escalated),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Check if this is an active (non-terminal) state.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

/// Workflow phase mirrored onto the task for the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    Routing,
    Planning,
    Approval,
    Execution,
    Delegation,
    Completed,
}

impl Default for TaskPhase {
    fn default() -> Self {
        Self::Routing
    }
}

impl TaskPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Routing => "routing",
            Self::Planning => "planning",
            Self::Approval => "approval",
            Self::Execution => "execution",
            Self::Delegation => "delegation",
            Self::Completed => "completed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "routing" => Some(Self::Routing),
            "planning" => Some(Self::Planning),
            "approval" => Some(Self::Approval),
            "execution" => Some(Self::Execution),
            "delegation" => Some(Self::Delegation),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// Priority level for tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low = 1,
    Normal = 2,
    High = 3,
    Critical = 4,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Normal
    }
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "normal" | "medium" => Some(Self::Normal),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// A tenant task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub title: String,
    pub description: String,
    /// Hired-agent id currently responsible for the task.
    pub assigned_to: Option<Uuid>,
    pub status: TaskStatus,
    pub phase: TaskPhase,
    pub priority: TaskPriority,
    /// Free-form JSON: `last_progress_message`, `latest_plan_id`,
    /// `failure_reason`, `escalation_log`, ...
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new pending task for a tenant.
    pub fn new(customer_id: Uuid, description: impl Into<String>) -> Self {
        let description = description.into();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            customer_id,
            title: description.chars().take(255).collect(),
            description,
            assigned_to: None,
            status: TaskStatus::Pending,
            phase: TaskPhase::Routing,
            priority: TaskPriority::Normal,
            metadata: Map::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// The deterministic id of the orchestrator workflow that owns this task.
    pub fn orchestrator_workflow_id(&self) -> String {
        format!("orchestrator-{}", self.id)
    }

    /// Read a string field out of metadata.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// Author of a task comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorType {
    Customer,
    Ve,
    System,
}

impl AuthorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Ve => "ve",
            Self::System => "system",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "customer" => Some(Self::Customer),
            "ve" => Some(Self::Ve),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// Append-only log entry attached to a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub customer_id: Uuid,
    pub author_type: AuthorType,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn new(
        task_id: Uuid,
        customer_id: Uuid,
        author_type: AuthorType,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            customer_id,
            author_type,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// One entry of `metadata.escalation_log`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationAttempt {
    pub attempt: u32,
    pub ve_id: Uuid,
    pub status: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
        assert!(!TaskStatus::WaitingForInput.is_terminal());
    }

    #[test]
    fn status_round_trip() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Planning,
            TaskStatus::WaitingForInput,
            TaskStatus::InProgress,
            TaskStatus::Escalated,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Cancelled,
        ] {
            assert_eq!(TaskStatus::from_str(status.as_str()), Some(status));
        }
    }

    #[test]
    fn new_task_truncates_title() {
        let long = "x".repeat(600);
        let task = Task::new(Uuid::new_v4(), long.clone());
        assert_eq!(task.title.len(), 255);
        assert_eq!(task.description, long);
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[test]
    fn orchestrator_workflow_id_is_deterministic() {
        let task = Task::new(Uuid::new_v4(), "demo");
        assert_eq!(
            task.orchestrator_workflow_id(),
            format!("orchestrator-{}", task.id)
        );
    }
}
