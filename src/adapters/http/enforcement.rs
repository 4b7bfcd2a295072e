//! Context-enforcement middleware.
//!
//! First line of defense against data leakage: no request under
//! `/agents/{customer_id}/…` proceeds without a well-formed tenant id. The
//! id is validated against a strict UUID-v4 shape, attached to the request
//! together with a SHA-256 context hash, and every decision is audited.
//! Missing or malformed ids are rejected with 403.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use regex::Regex;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

use crate::services::audit_log::{AuditEvent, AuditEventType, AuditLog};

/// Strict UUID v4 shape (lowercase hex).
fn customer_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}$").unwrap()
    })
}

/// Tenant identity attached to enforced requests.
#[derive(Debug, Clone, Copy)]
pub struct TenantId(pub Uuid);

/// Per-request context hash, for audit correlation.
#[derive(Debug, Clone)]
pub struct ContextHash(pub String);

/// Shared state of the enforcement layer.
pub struct EnforcementState {
    pub audit: Arc<AuditLog>,
}

/// Compute the request context hash: `tenant|path|timestamp`.
pub fn context_hash(customer_id: &str, path: &str) -> String {
    let content = format!("{customer_id}|{path}|{}", Utc::now().to_rfc3339());
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

/// Extract the tenant segment from an `/agents/...` path.
pub fn extract_customer_segment(path: &str) -> Option<&str> {
    let mut parts = path.split('/').filter(|p| !p.is_empty());
    match parts.next() {
        Some("agents") => parts.next(),
        _ => None,
    }
}

/// Axum middleware enforcing tenant context on agent routes.
pub async fn enforce_agent_context(
    State(state): State<Arc<EnforcementState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let Some(raw_id) = extract_customer_segment(&path).map(str::to_owned) else {
        tracing::error!(path, "SECURITY VIOLATION: request missing customer_id");
        state
            .audit
            .record(
                AuditEvent::new(AuditEventType::ContextViolation, "unknown")
                    .with_detail("path", json!(path))
                    .with_detail("reason", json!("missing customer_id"))
                    .failed(),
            )
            .await;
        return (
            StatusCode::FORBIDDEN,
            "Forbidden: customer_id required for agent access",
        )
            .into_response();
    };

    if !customer_id_pattern().is_match(&raw_id) {
        tracing::error!(path, customer_id = raw_id, "SECURITY VIOLATION: invalid customer_id format");
        state
            .audit
            .record(
                AuditEvent::new(AuditEventType::ContextViolation, "unknown")
                    .with_detail("path", json!(path))
                    .with_detail("customer_id", json!(raw_id))
                    .with_detail("reason", json!("invalid customer_id format"))
                    .failed(),
            )
            .await;
        return (
            StatusCode::FORBIDDEN,
            "Forbidden: invalid customer_id format",
        )
            .into_response();
    }

    // The regex guarantees a parseable UUID.
    let customer_id = match Uuid::parse_str(&raw_id) {
        Ok(id) => id,
        Err(_) => {
            return (
                StatusCode::FORBIDDEN,
                "Forbidden: invalid customer_id format",
            )
                .into_response();
        }
    };

    let hash = context_hash(&raw_id, &path);
    request.extensions_mut().insert(TenantId(customer_id));
    request.extensions_mut().insert(ContextHash(hash.clone()));

    state
        .audit
        .record(
            AuditEvent::new(AuditEventType::AgentRequest, "gateway")
                .with_customer(customer_id)
                .with_detail("path", json!(path))
                .with_detail("method", json!(request.method().as_str()))
                .with_detail("context_hash", json!(hash)),
        )
        .await;

    next.run(request).await
}
