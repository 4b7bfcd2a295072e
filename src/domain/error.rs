//! Domain error types.
//!
//! Each enum covers one domain or infrastructure boundary. Classifier
//! helpers (`is_transient`, `is_permanent`) drive retry decisions in the
//! workflow engine and the gateway client.

use thiserror::Error;
use uuid::Uuid;

/// Errors related to task-plane operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Task with the given ID was not found.
    #[error("Task not found: {0}")]
    NotFound(Uuid),

    /// Task belongs to a different tenant than the caller.
    #[error("Task {0} is not owned by the requesting customer")]
    ForeignTenant(Uuid),

    /// Invalid status transition attempted.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    /// Tenant has no hired agents to route to.
    #[error("No virtual employees hired for customer {0}")]
    NoHiredAgents(Uuid),

    /// A task mutation raced with a terminal transition.
    #[error("Task {0} is already in a terminal state")]
    AlreadyTerminal(Uuid),
}

/// Errors from the persistence layer.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),

    #[error("Invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(#[from] chrono::ParseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Row not found")]
    RowNotFound,
}

impl StoreError {
    /// Returns true if this error is transient and could succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::QueryFailed(sqlx::Error::PoolTimedOut | sqlx::Error::Io(_))
        )
    }
}

/// Errors from the agent gateway client.
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    /// The gateway rejected or failed the request with an HTTP status.
    #[error("Gateway error {status}: {message}")]
    Status { status: u16, message: String },

    /// The gateway was unreachable.
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),

    /// The request timed out.
    #[error("Gateway timeout after {0} seconds")]
    Timeout(u64),

    /// The SSE stream ended without any agent output.
    #[error("Empty response from agent {0}")]
    EmptyResponse(String),

    /// The agent's structured response failed to parse.
    #[error("Unparseable agent response: {0}")]
    Unparseable(String),
}

impl GatewayError {
    /// Returns true if this error is transient and should be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::EmptyResponse(_) | Self::Unparseable(_) => false,
        }
    }
}

/// Errors from the tenant access fabric.
#[derive(Error, Debug, Clone)]
pub enum FabricError {
    /// Route or policy object was not found in the declarative store.
    #[error("Policy object not found: {0}")]
    NotFound(String),

    /// Delete protection refused the operation.
    #[error("Cannot delete agent {agent_type}: {customer_count} customers still have active access. Revoke access first.")]
    DeleteProtected {
        agent_type: String,
        customer_count: usize,
    },

    /// The declarative store rejected the write.
    #[error("Policy store error: {0}")]
    Store(String),

    /// A full-object replace was attempted where merge-patch is required.
    #[error("Full-object writes are prohibited on {0}; use merge-patch")]
    PutProhibited(String),
}

/// Errors from context construction and enforcement.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("customer_id must be a non-nil UUID")]
    NilCustomerId,

    #[error("user_id cannot be empty")]
    EmptyUserId,

    #[error("Forbidden: customer_id required for agent access")]
    MissingTenantId,

    #[error("Forbidden: invalid customer_id format: {0}")]
    MalformedTenantId(String),
}

/// Errors from the durable workflow engine.
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// An activity exhausted its retry policy.
    #[error("Activity {name} failed after {attempts} attempts: {source}")]
    ActivityFailed {
        name: String,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    /// The workflow was cancelled by signal or termination.
    #[error("Workflow {0} cancelled")]
    Cancelled(String),

    /// No run or handle exists for the given workflow id.
    #[error("Workflow not found: {0}")]
    NotFound(String),

    /// A child workflow closed in failure during a previous incarnation.
    #[error("Child workflow {workflow_id} failed: {reason}")]
    ChildFailed { workflow_id: String, reason: String },

    /// A recorded history event did not match the replaying code.
    #[error("History divergence in {workflow_id} at seq {seq}: expected {expected}, recorded {recorded}")]
    HistoryDivergence {
        workflow_id: String,
        seq: u64,
        expected: String,
        recorded: String,
    },

    /// The workflow history could not be loaded or appended.
    #[error("History store error: {0}")]
    History(#[from] StoreError),

    /// The delegation circuit breaker rejected the spawn.
    #[error("Delegation rejected: {0}")]
    BreakerRejected(String),
}

/// Errors surfaced by the configuration loader.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid max_depth: {0}. Must be between 1 and 32")]
    InvalidMaxDepth(u32),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Gateway base_url cannot be empty")]
    EmptyGatewayUrl,

    #[error("Invalid escalation max_attempts: {0}. Cannot be 0")]
    InvalidEscalationAttempts(u32),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}
