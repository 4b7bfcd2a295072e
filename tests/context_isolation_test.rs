//! Cross-tenant isolation: scoped memory, immutable context, and the
//! enforcement middleware over a live HTTP surface.

mod common;

use std::sync::Arc;
use uuid::Uuid;

use common::harness;
use veplane::adapters::http::{app, AppState, EnforcementState};
use veplane::adapters::memory::InMemoryVectorStore;
use veplane::domain::error::ContextError;
use veplane::domain::models::AgentContext;
use veplane::services::audit_log::{AuditEventType, AuditFilter, AuditLog};
use veplane::services::scoped_memory::ScopedMemory;

#[tokio::test]
async fn tenant_memory_never_leaks_across_customers() {
    let store = Arc::new(InMemoryVectorStore::new());
    let tenant_a = Uuid::new_v4();
    let tenant_b = Uuid::new_v4();

    let memory_a = ScopedMemory::new(store.clone(), tenant_a);
    memory_a.add("Revenue is $5,000,000").await.unwrap();

    // Tenant B's search over the same store comes back empty.
    let memory_b = ScopedMemory::new(store, tenant_b);
    let results = memory_b.search("revenue", 5).await.unwrap();
    assert!(results.is_empty());

    let own = memory_a.search("revenue", 5).await.unwrap();
    assert_eq!(own.len(), 1);
}

#[tokio::test]
async fn agent_context_is_validated_and_immutable() {
    let customer = Uuid::new_v4();
    let ctx = AgentContext::new(
        customer,
        "user@example.test",
        vec!["read_analytics".to_string()],
        None,
    )
    .unwrap();

    // Fields are read-only accessors; there is no API to rebind the tenant.
    assert_eq!(ctx.customer_id(), customer);
    assert!(ctx.has_permission("read_analytics"));

    assert_eq!(
        AgentContext::new(Uuid::nil(), "user", vec![], None).unwrap_err(),
        ContextError::NilCustomerId
    );
}

async fn serve_harness() -> (String, Arc<AuditLog>, common::Harness) {
    let h = harness().await;
    h.seed_team().await;

    let audit = Arc::new(AuditLog::with_defaults());
    let state = Arc::new(AppState {
        router: h.router.clone(),
        tasks: h.tasks.clone(),
        invoker: h.invoker.clone(),
        enforcement: Arc::new(EnforcementState {
            audit: audit.clone(),
        }),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app(state)).await.unwrap();
    });

    (format!("http://{addr}"), audit, h)
}

#[tokio::test]
async fn enforcement_rejects_missing_and_malformed_tenant_ids() {
    let (base, audit, _h) = serve_harness().await;
    let client = reqwest::Client::new();

    // Malformed id.
    let response = client
        .post(format!("{base}/agents/not-a-uuid/wellness"))
        .json(&serde_json::json!({"message": "hi"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    // Uppercase hex fails the strict shape.
    let response = client
        .post(format!(
            "{base}/agents/123E4567-E89B-42D3-A456-426614174000/wellness"
        ))
        .json(&serde_json::json!({"message": "hi"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    let violations = audit
        .query(AuditFilter::new().with_event_type(AuditEventType::ContextViolation))
        .await;
    assert_eq!(violations.len(), 2);
}

#[tokio::test]
async fn enforcement_passes_valid_tenants_through_to_the_agent() {
    let (base, audit, h) = serve_harness().await;
    let client = reqwest::Client::new();

    h.invoker
        .script("wellness", "execute", Ok("Take a walk."))
        .await;

    let customer = Uuid::new_v4();
    let response = client
        .post(format!("{base}/agents/{customer}/wellness"))
        .json(&serde_json::json!({"message": "any advice?"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Take a walk.");

    // Every enforced request is audited with a context hash.
    let requests = audit
        .query(AuditFilter::new().with_event_type(AuditEventType::AgentRequest))
        .await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].customer_id, Some(customer));
    let hash = requests[0].details["context_hash"].as_str().unwrap();
    assert_eq!(hash.len(), 64);
}

#[tokio::test]
async fn task_api_hides_foreign_tenants_tasks() {
    let (base, _audit, h) = serve_harness().await;
    let client = reqwest::Client::new();

    h.invoker
        .script(
            "system-orchestrator",
            "routing",
            Ok(r#"{"routing_info": {"primary_agent": "marketing-manager"}}"#),
        )
        .await;

    // Create a task as tenant A.
    let response = client
        .post(format!("{base}/api/tasks"))
        .header("X-Customer-ID", h.customer.to_string())
        .json(&serde_json::json!({"description": "private work"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let receipt: serde_json::Value = response.json().await.unwrap();
    let task_id = receipt["task_id"].as_str().unwrap().to_string();

    // Tenant B cannot read it.
    let foreign = client
        .get(format!("{base}/api/tasks/{task_id}"))
        .header("X-Customer-ID", Uuid::new_v4().to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(foreign.status(), 404);

    // The owner can.
    let own = client
        .get(format!("{base}/api/tasks/{task_id}"))
        .header("X-Customer-ID", h.customer.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(own.status(), 200);

    // Clean up the running workflow.
    let deleted = client
        .delete(format!("{base}/api/tasks/{task_id}"))
        .header("X-Customer-ID", h.customer.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), 204);
}
