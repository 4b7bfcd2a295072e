//! Task store port.
//!
//! Persistence contract for tasks, comments, plans, and hired agents. All
//! tenant-facing reads are filtered on `customer_id`; engine-internal reads
//! fetch by primary key and re-derive the tenant from the row.

use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::error::StoreError;
use crate::domain::models::{
    Comment, HiredAgent, MarketplaceAgent, Plan, PlanStatus, Task, TaskPhase, TaskPriority,
    TaskStatus,
};

/// Partial update applied to a task row.
///
/// `metadata` entries are merged key-by-key into the existing blob rather
/// than replacing it.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub phase: Option<TaskPhase>,
    pub priority: Option<TaskPriority>,
    /// `Some(None)` clears the assignment.
    pub assigned_to: Option<Option<Uuid>>,
    pub metadata: Map<String, Value>,
    /// Shorthand for `metadata.last_progress_message` (+ timestamp).
    pub progress_message: Option<String>,
}

impl TaskUpdate {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_phase(mut self, phase: TaskPhase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_assigned_to(mut self, ve_id: Option<Uuid>) -> Self {
        self.assigned_to = Some(ve_id);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_progress(mut self, message: impl Into<String>) -> Self {
        self.progress_message = Some(message.into());
        self
    }
}

/// Repository interface for the task plane.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a new task.
    async fn insert_task(&self, task: &Task) -> Result<(), StoreError>;

    /// Fetch a task by ID.
    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, StoreError>;

    /// Apply a partial update. Terminal statuses are one-way: updating a
    /// task already in a terminal state is a constraint violation.
    async fn update_task(&self, id: Uuid, update: TaskUpdate) -> Result<Task, StoreError>;

    /// List a tenant's tasks, newest first.
    async fn list_tasks(&self, customer_id: Uuid) -> Result<Vec<Task>, StoreError>;

    /// Append a comment to a task's log.
    async fn append_comment(&self, comment: &Comment) -> Result<(), StoreError>;

    /// List comments for a task in insertion order.
    async fn list_comments(&self, task_id: Uuid) -> Result<Vec<Comment>, StoreError>;

    /// Persist a drafted plan.
    async fn insert_plan(&self, plan: &Plan) -> Result<(), StoreError>;

    /// Fetch a plan by ID.
    async fn get_plan(&self, id: Uuid) -> Result<Option<Plan>, StoreError>;

    /// Move a plan between draft and approved.
    async fn set_plan_status(&self, id: Uuid, status: PlanStatus) -> Result<(), StoreError>;

    /// List the tenant's hired agents with catalog details joined in.
    async fn list_hired_agents(&self, customer_id: Uuid) -> Result<Vec<HiredAgent>, StoreError>;

    /// Persist a hire.
    async fn insert_hired_agent(&self, agent: &HiredAgent) -> Result<(), StoreError>;

    /// Remove a hire. Returns false when no matching row existed.
    async fn delete_hired_agent(&self, id: Uuid, customer_id: Uuid) -> Result<bool, StoreError>;

    /// Fetch a marketplace catalog entry.
    async fn get_marketplace_agent(
        &self,
        agent_type: &str,
    ) -> Result<Option<MarketplaceAgent>, StoreError>;

    /// Insert or replace a marketplace catalog entry.
    async fn upsert_marketplace_agent(&self, agent: &MarketplaceAgent) -> Result<(), StoreError>;
}
