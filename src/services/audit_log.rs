//! Append-only audit log for security-relevant operations.
//!
//! Every fabric mutation, enforcement decision, and leakage block is
//! recorded here. Entries live in a bounded in-memory ring for querying and
//! are optionally mirrored to a JSONL file. Sink failures never fail the
//! operation being audited.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Event types recorded by the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    RouteCreated,
    PolicyCreated,
    AccessGranted,
    AccessRevoked,
    AccessGrantFailed,
    AccessRevokeFailed,
    RouteDeleted,
    RouteDeleteBlocked,
    RouteDeleteFailed,
    PolicyDeleted,
    AgentRequest,
    ContextViolation,
    LeakageBlocked,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RouteCreated => "route_created",
            Self::PolicyCreated => "policy_created",
            Self::AccessGranted => "access_granted",
            Self::AccessRevoked => "access_revoked",
            Self::AccessGrantFailed => "access_grant_failed",
            Self::AccessRevokeFailed => "access_revoke_failed",
            Self::RouteDeleted => "route_deleted",
            Self::RouteDeleteBlocked => "route_delete_blocked",
            Self::RouteDeleteFailed => "route_delete_failed",
            Self::PolicyDeleted => "policy_deleted",
            Self::AgentRequest => "agent_request",
            Self::ContextViolation => "context_violation",
            Self::LeakageBlocked => "leakage_blocked",
        }
    }
}

/// One audit record. Never mutated after logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub agent_type: String,
    pub customer_id: Option<Uuid>,
    pub success: bool,
    pub details: Map<String, Value>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType, agent_type: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            agent_type: agent_type.into(),
            customer_id: None,
            success: true,
            details: Map::new(),
        }
    }

    pub fn with_customer(mut self, customer_id: Uuid) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    pub fn failed(mut self) -> Self {
        self.success = false;
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }
}

/// Filter for querying the in-memory ring.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub event_type: Option<AuditEventType>,
    pub agent_type: Option<String>,
    pub customer_id: Option<Uuid>,
    pub limit: Option<usize>,
}

impl AuditFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event_type(mut self, event_type: AuditEventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    pub fn with_agent_type(mut self, agent_type: impl Into<String>) -> Self {
        self.agent_type = Some(agent_type.into());
        self
    }

    pub fn with_customer(mut self, customer_id: Uuid) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, event: &AuditEvent) -> bool {
        if let Some(event_type) = self.event_type {
            if event.event_type != event_type {
                return false;
            }
        }
        if let Some(ref agent_type) = self.agent_type {
            if &event.agent_type != agent_type {
                return false;
            }
        }
        if let Some(customer_id) = self.customer_id {
            if event.customer_id != Some(customer_id) {
                return false;
            }
        }
        true
    }
}

/// Append-only audit log service.
pub struct AuditLog {
    max_entries: usize,
    entries: RwLock<VecDeque<AuditEvent>>,
    sink: Option<Arc<Mutex<File>>>,
}

impl AuditLog {
    /// Create an in-memory log bounded to `max_entries`.
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            entries: RwLock::new(VecDeque::new()),
            sink: None,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(10_000)
    }

    /// Attach a JSONL file sink, creating parent directories as needed.
    pub fn with_file_sink(mut self, path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        self.sink = Some(Arc::new(Mutex::new(file)));
        Ok(self)
    }

    /// Record an event. Sink failures are logged and swallowed.
    pub async fn record(&self, event: AuditEvent) {
        let log_line = format!(
            "RBAC Event: {} | Agent: {}{}",
            event.event_type.as_str(),
            event.agent_type,
            event
                .customer_id
                .map(|c| format!(" | Customer: {c}"))
                .unwrap_or_default()
        );
        if event.success {
            tracing::info!(event_type = event.event_type.as_str(), "{log_line}");
        } else {
            tracing::error!(event_type = event.event_type.as_str(), "{log_line}");
        }

        if let Some(ref sink) = self.sink {
            if let Err(e) = Self::write_line(sink, &event) {
                tracing::warn!("Failed to write audit event to sink: {e}");
            }
        }

        let mut entries = self.entries.write().await;
        while entries.len() >= self.max_entries {
            entries.pop_front();
        }
        entries.push_back(event);
    }

    fn write_line(sink: &Arc<Mutex<File>>, event: &AuditEvent) -> anyhow::Result<()> {
        let json = serde_json::to_string(event)?;
        let mut file = sink
            .lock()
            .map_err(|e| anyhow::anyhow!("audit sink mutex poisoned: {e}"))?;
        writeln!(file, "{json}")?;
        Ok(())
    }

    /// Query recorded events, newest first.
    pub async fn query(&self, filter: AuditFilter) -> Vec<AuditEvent> {
        let entries = self.entries.read().await;
        let mut results: Vec<AuditEvent> = entries
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        if let Some(limit) = filter.limit {
            results.truncate(limit);
        }
        results
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
