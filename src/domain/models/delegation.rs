//! Delegation workflow inputs, status frame, and results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::decision::DecisionRecord;

/// Mutable workflow context threaded through delegation recursion.
///
/// This is carried inside workflow inputs (it is workflow state, not the
/// immutable request [`AgentContext`](super::context::AgentContext)).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DelegationContext {
    #[serde(default)]
    pub plan_approved: bool,
    #[serde(default)]
    pub user_feedback: Option<String>,
    #[serde(default)]
    pub delegation_chain: Vec<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    /// Anything else the caller attached at submission time.
    #[serde(default)]
    pub custom: Map<String, Value>,
}

/// Input to one `IntelligentDelegationWorkflow` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationInput {
    pub customer_id: Uuid,
    pub task_id: Uuid,
    pub task_description: String,
    pub current_agent_type: String,
    pub context: DelegationContext,
    pub delegation_depth: u32,
}

/// Terminal status of a delegation frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationOutcome {
    Completed,
    Failed,
    Cancelled,
}

impl DelegationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// How a completed frame produced its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationType {
    SelfExecution,
    FallbackExecution,
    ParallelExecution,
}

/// Terminal result of a delegation workflow frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationResult {
    pub status: DelegationOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handled_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegated_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegation_type: Option<DelegationType>,
    #[serde(default)]
    pub delegation_chain: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Per-child results of a parallel split, ordered by subtask index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children_results: Option<Vec<DelegationResult>>,
}

impl DelegationResult {
    pub fn failed(reason: impl Into<String>, chain: Vec<String>) -> Self {
        Self {
            status: DelegationOutcome::Failed,
            reason: Some(reason.into()),
            handled_by: None,
            delegated_by: None,
            delegation_type: None,
            delegation_chain: chain,
            result: None,
            children_results: None,
        }
    }

    pub fn cancelled(reason: impl Into<String>, chain: Vec<String>) -> Self {
        Self {
            status: DelegationOutcome::Cancelled,
            reason: Some(reason.into()),
            handled_by: None,
            delegated_by: None,
            delegation_type: None,
            delegation_chain: chain,
            result: None,
            children_results: None,
        }
    }
}

/// Queryable status frame of a running delegation workflow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DelegationStatus {
    pub current_agent: Option<String>,
    pub current_action: Option<String>,
    pub delegation_depth: u32,
    pub delegation_chain: Vec<String>,
    pub decisions_made: Vec<DecisionRecord>,
    pub paused: bool,
    pub cancelled: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub last_update: Option<DateTime<Utc>>,
}
