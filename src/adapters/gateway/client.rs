//! HTTP client for the shared agent gateway.
//!
//! Speaks JSON-RPC 2.0 `message/stream` over POST and reads the SSE
//! response. Tenant identity and agent routing ride in headers
//! (`X-Customer-ID`, `Host: {agent_type}.local`) injected from the caller,
//! never from payloads or agent responses. Outbound text is leakage-scanned
//! before it is returned to the workflow.

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, HOST};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::time::Duration;
use uuid::Uuid;

use crate::adapters::gateway::sse::SseParser;
use crate::adapters::gateway::types::{decode_frame, stream_request};
use crate::domain::error::GatewayError;
use crate::domain::models::config::GatewayConfig;
use crate::domain::ports::{AgentInvoker, AgentReply, StreamEvent};
use crate::services::leakage_detector::{LeakageDetector, REDACTED_PLACEHOLDER};
use crate::services::peer_discovery::{format_team_context, PeerDiscovery};

/// Client for invoking agents through the gateway.
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
    timeout_secs: u64,
    detector: LeakageDetector,
    peers: Option<PeerDiscovery>,
}

impl GatewayClient {
    /// Build a client. When `peers` is provided, a team-context block
    /// listing delegation-allowed teammates is prepended to every message.
    pub fn new(config: &GatewayConfig, peers: Option<PeerDiscovery>) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout_secs: config.timeout_secs,
            detector: LeakageDetector::new(),
            peers,
        })
    }

    fn headers(customer_id: Uuid, agent_type: &str) -> Result<HeaderMap, GatewayError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            HOST,
            HeaderValue::from_str(&format!("{agent_type}.local"))
                .map_err(|e| GatewayError::Unavailable(e.to_string()))?,
        );
        headers.insert(
            "X-Customer-ID",
            HeaderValue::from_str(&customer_id.to_string())
                .map_err(|e| GatewayError::Unavailable(e.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        Ok(headers)
    }

    fn message_id(customer_id: Uuid, message: &str) -> String {
        let digest = Sha256::digest(message.as_bytes());
        format!("msg-{customer_id}-{:x}", digest)
            .chars()
            .take(52)
            .collect()
    }

    async fn enhanced_message(
        &self,
        customer_id: Uuid,
        agent_type: &str,
        message: &str,
    ) -> String {
        match &self.peers {
            Some(discovery) => match discovery.peers(customer_id, agent_type).await {
                Ok(peers) => {
                    format!("{}\n\nUser Request: {message}", format_team_context(&peers))
                }
                Err(e) => {
                    tracing::warn!("peer discovery failed, sending message without team context: {e}");
                    message.to_string()
                }
            },
            None => message.to_string(),
        }
    }

    async fn open_stream(
        &self,
        customer_id: Uuid,
        agent_type: &str,
        message: &str,
        session_id: Option<&str>,
    ) -> Result<reqwest::Response, GatewayError> {
        let context_id = session_id
            .map(str::to_owned)
            .unwrap_or_else(|| format!("ctx-{customer_id}"));
        let body = stream_request(
            &customer_id.to_string(),
            &Self::message_id(customer_id, message),
            &context_id,
            message,
        );

        let response = self
            .http
            .post(format!("{}/", self.base_url))
            .headers(Self::headers(customer_id, agent_type)?)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout(self.timeout_secs)
                } else {
                    GatewayError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                agent_type,
                customer_id = %customer_id,
                status = status.as_u16(),
                "agent gateway returned error: {}",
                body.chars().take(500).collect::<String>()
            );
            return Err(GatewayError::Status {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }
        Ok(response)
    }
}

struct StreamState {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    parser: SseParser,
    queue: VecDeque<StreamEvent>,
    done: bool,
    detector: LeakageDetector,
    customer_id: Uuid,
}

impl StreamState {
    fn redact(&self, text: String) -> String {
        let alerts = self.detector.scan(&text, self.customer_id);
        if LeakageDetector::should_block(&alerts) {
            REDACTED_PLACEHOLDER.to_string()
        } else {
            text
        }
    }

    fn enqueue_frames(&mut self, chunk: &[u8]) {
        let payloads = self.parser.feed(chunk);
        for payload in payloads {
            let frame = decode_frame(&payload);
            for text in frame.messages {
                let text = self.redact(text);
                self.queue.push_back(StreamEvent::Message(text));
            }
            for text in frame.artifacts {
                let text = self.redact(text);
                self.queue.push_back(StreamEvent::Artifact(text));
            }
            if frame.is_final {
                self.done = true;
            }
        }
    }
}

#[async_trait]
impl AgentInvoker for GatewayClient {
    async fn invoke(
        &self,
        customer_id: Uuid,
        agent_type: &str,
        message: &str,
        session_id: Option<&str>,
    ) -> Result<AgentReply, GatewayError> {
        tracing::info!(agent_type, customer_id = %customer_id, "invoking agent via gateway");

        let enhanced = self.enhanced_message(customer_id, agent_type, message).await;
        let response = self
            .open_stream(customer_id, agent_type, &enhanced, session_id)
            .await?;

        let mut body = response.bytes_stream();
        let mut parser = SseParser::new();
        let mut messages = String::new();
        let mut artifacts = String::new();

        'outer: while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| GatewayError::Unavailable(e.to_string()))?;
            for payload in parser.feed(&chunk) {
                let frame = decode_frame(&payload);
                for text in frame.messages {
                    messages.push_str(&text);
                }
                for text in frame.artifacts {
                    artifacts.push_str(&text);
                }
                if frame.is_final {
                    break 'outer;
                }
            }
        }

        let mut text = if messages.is_empty() { artifacts } else { messages };
        if text.is_empty() {
            text = "No response from agent".to_string();
        }

        let alerts = self.detector.scan(&text, customer_id);
        let blocked = LeakageDetector::should_block(&alerts);
        if blocked {
            tracing::error!(
                agent_type,
                customer_id = %customer_id,
                "BLOCKED LEAKAGE: agent response redacted before return"
            );
            text = REDACTED_PLACEHOLDER.to_string();
        }

        Ok(AgentReply {
            message: text,
            blocked,
        })
    }

    async fn invoke_stream(
        &self,
        customer_id: Uuid,
        agent_type: &str,
        message: &str,
        session_id: Option<&str>,
    ) -> BoxStream<'static, StreamEvent> {
        let enhanced = self.enhanced_message(customer_id, agent_type, message).await;
        let response = match self
            .open_stream(customer_id, agent_type, &enhanced, session_id)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return stream::iter(vec![StreamEvent::Error(e.to_string())]).boxed();
            }
        };

        let state = StreamState {
            body: response
                .bytes_stream()
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
                .boxed(),
            parser: SseParser::new(),
            queue: VecDeque::new(),
            done: false,
            detector: self.detector,
            customer_id,
        };

        stream::unfold(state, |mut state| async move {
            loop {
                if let Some(event) = state.queue.pop_front() {
                    return Some((event, state));
                }
                if state.done {
                    return None;
                }
                match state.body.next().await {
                    Some(Ok(chunk)) => state.enqueue_frames(&chunk),
                    Some(Err(e)) => {
                        state.done = true;
                        state.queue.push_back(StreamEvent::Error(e.to_string()));
                    }
                    None => state.done = true,
                }
            }
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_for(url: &str) -> GatewayClient {
        GatewayClient::new(
            &GatewayConfig {
                base_url: url.to_string(),
                timeout_secs: 5,
            },
            None,
        )
        .unwrap()
    }

    fn sse_body(texts: &[&str]) -> String {
        let mut body = String::new();
        for text in texts {
            body.push_str(&format!(
                "data: {{\"result\": {{\"status\": {{\"message\": {{\"role\": \"agent\", \"parts\": [{{\"kind\": \"text\", \"text\": \"{text}\"}}]}}}}, \"final\": false}}}}\n\n"
            ));
        }
        body.push_str("data: {\"result\": {\"final\": true}}\n\n");
        body
    }

    #[tokio::test]
    async fn invoke_concatenates_message_parts() {
        let mut server = mockito::Server::new_async().await;
        let customer = Uuid::new_v4();
        let mock = server
            .mock("POST", "/")
            .match_header("x-customer-id", customer.to_string().as_str())
            .match_header("accept", "text/event-stream")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(sse_body(&["Draft plan: ", "three posts"]))
            .create_async()
            .await;

        let client = client_for(&server.url());
        let reply = client
            .invoke(customer, "marketing-manager", "Write Q1 plan", None)
            .await
            .unwrap();

        assert_eq!(reply.message, "Draft plan: three posts");
        assert!(!reply.blocked);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn invoke_surfaces_gateway_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(503)
            .with_body("upstream unavailable")
            .create_async()
            .await;

        let client = client_for(&server.url());
        let err = client
            .invoke(Uuid::new_v4(), "marketing-manager", "hello", None)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Status { status: 503, .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn invoke_blocks_foreign_uuid_leak() {
        let mut server = mockito::Server::new_async().await;
        let customer = Uuid::new_v4();
        let foreign = Uuid::new_v4();
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body(sse_body(&[&format!("Other tenant: {foreign}")]))
            .create_async()
            .await;

        let client = client_for(&server.url());
        let reply = client
            .invoke(customer, "marketing-manager", "hello", None)
            .await
            .unwrap();
        assert!(reply.blocked);
        assert_eq!(reply.message, REDACTED_PLACEHOLDER);
    }

    #[tokio::test]
    async fn invoke_stream_emits_error_event_on_failure() {
        // Nothing listening on this port.
        let client = client_for("http://127.0.0.1:9");
        let events: Vec<StreamEvent> = client
            .invoke_stream(Uuid::new_v4(), "marketing-manager", "hello", None)
            .await
            .collect()
            .await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StreamEvent::Error(_)));
    }

    #[tokio::test]
    async fn invoke_stream_yields_messages_until_final() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body(sse_body(&["part one", "part two"]))
            .create_async()
            .await;

        let client = client_for(&server.url());
        let events: Vec<StreamEvent> = client
            .invoke_stream(Uuid::new_v4(), "marketing-manager", "hello", None)
            .await
            .collect()
            .await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Message("part one".to_string()),
                StreamEvent::Message("part two".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn empty_stream_reads_as_placeholder() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body("data: {\"result\": {\"final\": true}}\n\n")
            .create_async()
            .await;

        let client = client_for(&server.url());
        let reply = client
            .invoke(Uuid::new_v4(), "marketing-manager", "hello", None)
            .await
            .unwrap();
        assert_eq!(reply.message, "No response from agent");
    }
}
