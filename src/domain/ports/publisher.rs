//! Real-time publisher port.
//!
//! Fan-out of task state transitions to the UI push channel. Publishing is
//! best-effort: implementations log and swallow failures so a dead push
//! channel never fails a workflow activity.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

/// Best-effort publisher of task-plane events.
#[async_trait]
pub trait RealtimePublisher: Send + Sync {
    /// Publish a payload to a channel. Never fails.
    async fn publish(&self, channel: &str, payload: Value);
}

/// The channel that carries a tenant's task updates.
pub fn task_channel(customer_id: Uuid) -> String {
    format!("customer:{customer_id}:tasks")
}

/// Publisher that drops everything. Used when no push channel is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPublisher;

#[async_trait]
impl RealtimePublisher for NullPublisher {
    async fn publish(&self, _channel: &str, _payload: Value) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_name_embeds_tenant() {
        let id = Uuid::new_v4();
        assert_eq!(task_channel(id), format!("customer:{id}:tasks"));
    }
}
