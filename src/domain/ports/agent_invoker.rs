//! Agent invocation port.
//!
//! Contract the workflow activities use to reach agents through the shared
//! gateway. Tenant identity and agent type are injected by the caller and
//! never taken from message payloads or agent responses.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::GatewayError;

/// One event of a streaming invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Agent chat text from a status update frame.
    Message(String),
    /// Structured output from an artifact frame.
    Artifact(String),
    /// Terminal error. At most one, always last.
    Error(String),
}

/// Final reply of a non-streaming invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReply {
    pub message: String,
    /// Set when the leakage detector replaced the payload.
    #[serde(default)]
    pub blocked: bool,
}

/// Client for the shared agent gateway.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    /// Invoke an agent and return the final concatenated text.
    ///
    /// Gateway-level failures surface as errors so the workflow retry policy
    /// can classify them. Successful replies are leakage-scanned before
    /// return.
    async fn invoke(
        &self,
        customer_id: Uuid,
        agent_type: &str,
        message: &str,
        session_id: Option<&str>,
    ) -> Result<AgentReply, GatewayError>;

    /// Invoke an agent and stream events as they arrive.
    ///
    /// Wire failures are delivered in-band as a single [`StreamEvent::Error`]
    /// followed by end-of-stream; this method itself never fails.
    async fn invoke_stream(
        &self,
        customer_id: Uuid,
        agent_type: &str,
        message: &str,
        session_id: Option<&str>,
    ) -> BoxStream<'static, StreamEvent>;
}
