//! Thin tenant-facing HTTP surface.
//!
//! Authentication lives in an external gateway; these handlers derive the
//! tenant from the `X-Customer-ID` header, verify ownership, and translate
//! requests into task-store mutations and workflow signals. Agent
//! invocation passes through the context-enforcement middleware.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, patch, post};
use axum::{middleware, Extension, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::adapters::http::enforcement::{enforce_agent_context, EnforcementState, TenantId};
use crate::domain::models::{DelegationContext, Task, TaskPriority};
use crate::domain::ports::{AgentInvoker, TaskStore, TaskUpdate};
use crate::engine::Signal;
use crate::services::task_router::TaskRouter;

/// Shared state behind the HTTP surface.
pub struct AppState {
    pub router: TaskRouter,
    pub tasks: Arc<dyn TaskStore>,
    pub invoker: Arc<dyn AgentInvoker>,
    pub enforcement: Arc<EnforcementState>,
}

/// Build the application router.
pub fn app(state: Arc<AppState>) -> Router {
    let agent_routes = Router::new()
        .route("/agents/{customer_id}/{agent_type}", post(invoke_agent))
        .layer(middleware::from_fn_with_state(
            state.enforcement.clone(),
            enforce_agent_context,
        ));

    Router::new()
        .route("/api/tasks", post(create_task))
        .route("/api/tasks/{id}", get(get_task))
        .route("/api/tasks/{id}", patch(patch_task))
        .route("/api/tasks/{id}", delete(delete_task))
        .route("/api/tasks/{id}/plan/approve", post(approve_plan))
        .route("/api/tasks/{id}/feedback", post(post_feedback))
        .route("/api/tasks/{id}/pause", post(pause_task))
        .route("/api/tasks/{id}/resume", post(resume_task))
        .merge(agent_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn tenant_from_headers(headers: &HeaderMap) -> Result<Uuid, Response> {
    headers
        .get("X-Customer-ID")
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .ok_or_else(|| {
            (
                StatusCode::FORBIDDEN,
                "Forbidden: customer_id required",
            )
                .into_response()
        })
}

async fn owned_task(
    state: &AppState,
    customer_id: Uuid,
    task_id: Uuid,
) -> Result<Task, Response> {
    match state.tasks.get_task(task_id).await {
        Ok(Some(task)) if task.customer_id == customer_id => Ok(task),
        Ok(Some(_)) | Ok(None) => {
            Err((StatusCode::NOT_FOUND, "task not found").into_response())
        }
        Err(e) => {
            tracing::error!("task lookup failed: {e}");
            Err((StatusCode::INTERNAL_SERVER_ERROR, "store error").into_response())
        }
    }
}

#[derive(Deserialize)]
struct CreateTaskBody {
    description: String,
    #[serde(default)]
    context: Option<DelegationContext>,
}

async fn create_task(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateTaskBody>,
) -> Response {
    let customer_id = match tenant_from_headers(&headers) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state
        .router
        .route(customer_id, &body.description, body.context, None)
        .await
    {
        Ok(receipt) => (StatusCode::CREATED, Json(json!(receipt))).into_response(),
        Err(e) => {
            tracing::error!("task routing failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": e.to_string()})))
                .into_response()
        }
    }
}

async fn get_task(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(task_id): Path<Uuid>,
) -> Response {
    let customer_id = match tenant_from_headers(&headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let task = match owned_task(&state, customer_id, task_id).await {
        Ok(task) => task,
        Err(response) => return response,
    };

    let delegation = state.router.delegation_status(task_id).await;
    Json(json!({ "task": task, "delegation_status": delegation })).into_response()
}

#[derive(Deserialize)]
struct PatchTaskBody {
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

async fn patch_task(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(task_id): Path<Uuid>,
    Json(body): Json<PatchTaskBody>,
) -> Response {
    let customer_id = match tenant_from_headers(&headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    if let Err(response) = owned_task(&state, customer_id, task_id).await {
        return response;
    }

    let mut update = TaskUpdate::default();
    if let Some(ref raw) = body.priority {
        match TaskPriority::from_str(raw) {
            Some(priority) => update = update.with_priority(priority),
            None => {
                return (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({"error": format!("unknown priority '{raw}'")})),
                )
                    .into_response();
            }
        }
    }
    if let Some(metadata) = body.metadata {
        update.metadata = metadata;
    }

    match state.tasks.update_task(task_id, update).await {
        Ok(task) => Json(json!({ "task": task })).into_response(),
        Err(e) => {
            tracing::error!("task patch failed: {e}");
            (StatusCode::CONFLICT, Json(json!({"error": e.to_string()}))).into_response()
        }
    }
}

async fn delete_task(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(task_id): Path<Uuid>,
) -> Response {
    let customer_id = match tenant_from_headers(&headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    if let Err(response) = owned_task(&state, customer_id, task_id).await {
        return response;
    }

    match state.router.cancel_task(task_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            tracing::error!("task cancellation failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "cancel failed").into_response()
        }
    }
}

async fn approve_plan(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(task_id): Path<Uuid>,
) -> Response {
    let customer_id = match tenant_from_headers(&headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    if let Err(response) = owned_task(&state, customer_id, task_id).await {
        return response;
    }

    match state.router.approve_plan(task_id).await {
        Ok(()) => Json(json!({"status": "approved"})).into_response(),
        Err(e) => {
            tracing::error!("plan approval failed: {e}");
            (StatusCode::CONFLICT, Json(json!({"error": e.to_string()}))).into_response()
        }
    }
}

#[derive(Deserialize)]
struct FeedbackBody {
    message: String,
}

async fn post_feedback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(task_id): Path<Uuid>,
    Json(body): Json<FeedbackBody>,
) -> Response {
    let customer_id = match tenant_from_headers(&headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    if let Err(response) = owned_task(&state, customer_id, task_id).await {
        return response;
    }

    match state
        .router
        .signal_task(task_id, Signal::ProvideFeedback(body.message))
        .await
    {
        Ok(()) => Json(json!({"status": "feedback_received"})).into_response(),
        Err(e) => (StatusCode::CONFLICT, Json(json!({"error": e.to_string()}))).into_response(),
    }
}

async fn pause_task(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(task_id): Path<Uuid>,
) -> Response {
    signal_endpoint(state, headers, task_id, Signal::PauseDelegation).await
}

async fn resume_task(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(task_id): Path<Uuid>,
) -> Response {
    signal_endpoint(state, headers, task_id, Signal::ResumeDelegation).await
}

async fn signal_endpoint(
    state: Arc<AppState>,
    headers: HeaderMap,
    task_id: Uuid,
    signal: Signal,
) -> Response {
    let customer_id = match tenant_from_headers(&headers) {
        Ok(id) => id,
        Err(response) => return response,
    };
    if let Err(response) = owned_task(&state, customer_id, task_id).await {
        return response;
    }

    let name = signal.name();
    match state.router.signal_task(task_id, signal).await {
        Ok(()) => Json(json!({ "status": name })).into_response(),
        Err(e) => (StatusCode::CONFLICT, Json(json!({"error": e.to_string()}))).into_response(),
    }
}

#[derive(Deserialize)]
struct InvokeBody {
    message: String,
    #[serde(default)]
    session_id: Option<String>,
}

/// Direct agent invocation, guarded by the enforcement middleware. The
/// tenant header sent to the gateway comes from the validated path segment.
async fn invoke_agent(
    State(state): State<Arc<AppState>>,
    Extension(TenantId(customer_id)): Extension<TenantId>,
    Path((_path_customer, agent_type)): Path<(String, String)>,
    Json(body): Json<InvokeBody>,
) -> Response {
    match state
        .invoker
        .invoke(customer_id, &agent_type, &body.message, body.session_id.as_deref())
        .await
    {
        Ok(reply) => Json(json!(reply)).into_response(),
        Err(e) => {
            tracing::error!(agent_type, "agent invocation failed: {e}");
            (StatusCode::BAD_GATEWAY, Json(json!({"error": e.to_string()}))).into_response()
        }
    }
}
