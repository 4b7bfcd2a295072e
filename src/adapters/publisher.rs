//! Real-time publisher adapters.
//!
//! The production push channel is an external collaborator; these adapters
//! cover the contract: a tracing-backed publisher for deployments without a
//! push channel, and a broadcast publisher that fans out in-process (and
//! gives tests a way to observe published updates).

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::domain::ports::RealtimePublisher;

/// Publisher that logs every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingPublisher;

#[async_trait]
impl RealtimePublisher for TracingPublisher {
    async fn publish(&self, channel: &str, payload: Value) {
        tracing::debug!(channel, %payload, "realtime update");
    }
}

/// Publisher backed by a tokio broadcast channel.
pub struct BroadcastPublisher {
    sender: broadcast::Sender<(String, Value)>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to the fan-out stream.
    pub fn subscribe(&self) -> broadcast::Receiver<(String, Value)> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl RealtimePublisher for BroadcastPublisher {
    async fn publish(&self, channel: &str, payload: Value) {
        // Best-effort: no subscribers is not an error.
        if let Err(e) = self.sender.send((channel.to_string(), payload)) {
            tracing::debug!(channel, "no realtime subscribers: {e}");
        }
    }
}
