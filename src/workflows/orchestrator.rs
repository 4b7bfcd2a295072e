//! Orchestrator workflow.
//!
//! The durable root of every routed task: fetches the tenant's hired
//! agents, picks an initial agent via the routing activity, then hands off
//! to the intelligent delegation workflow and mirrors the final outcome
//! onto the task.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::error::WorkflowError;
use crate::domain::models::{
    DelegationContext, DelegationInput, DelegationOutcome, DelegationResult, HiredAgent,
    TaskPhase, TaskStatus,
};
use crate::domain::ports::TaskUpdate;
use crate::engine::{ActivityOptions, WorkflowCtx};
use crate::workflows::activities::{find_manager, Activities};

/// Input to the orchestrator workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorInput {
    pub customer_id: Uuid,
    pub task_id: Uuid,
    pub task_description: String,
    #[serde(default)]
    pub context: DelegationContext,
}

/// The deterministic workflow id for a task's root orchestration.
pub fn orchestrator_workflow_id(task_id: Uuid) -> String {
    format!("orchestrator-{task_id}")
}

/// The deterministic workflow id for a task's root delegation.
pub fn delegation_workflow_id(task_id: Uuid) -> String {
    format!("intelligent-delegation-{task_id}")
}

pub fn run(
    ctx: WorkflowCtx,
    acts: Arc<Activities>,
    input: OrchestratorInput,
) -> BoxFuture<'static, Result<DelegationResult, WorkflowError>> {
    async move {
        let OrchestratorInput {
            customer_id,
            task_id,
            task_description,
            context,
        } = input;

        update_status(&ctx, &acts, task_id, TaskStatus::InProgress, None,
            "Starting task analysis...".to_string())
            .await?;

        let ves: Vec<HiredAgent> = {
            let acts = acts.clone();
            ctx.activity(
                "get-customer-ves",
                ActivityOptions::new(Duration::from_secs(60)),
                move || {
                    let acts = acts.clone();
                    async move { acts.get_customer_ves(customer_id).await }
                },
            )
            .await?
        };

        if ves.is_empty() {
            update_status(&ctx, &acts, task_id, TaskStatus::Failed, None,
                "No virtual employees found".to_string())
                .await?;
            let result = DelegationResult::failed("No VEs found", Vec::new());
            finalize_task(&ctx, &acts, task_id, &result).await?;
            return Ok(result);
        }

        let routing = {
            let acts = acts.clone();
            let description = task_description.clone();
            let routing_context = context.clone();
            ctx.activity(
                "analyze-routing",
                ActivityOptions::new(Duration::from_secs(120)),
                move || {
                    let acts = acts.clone();
                    let description = description.clone();
                    let routing_context = routing_context.clone();
                    async move {
                        acts.analyze_routing(customer_id, &description, &routing_context)
                            .await
                    }
                },
            )
            .await?
        };

        // Map the routed agent onto a hired agent; fall back to the
        // highest-seniority manager, then the first hire.
        let initial_agent = routing
            .target_agent
            .as_ref()
            .and_then(|target| ves.iter().find(|a| &a.agent_type == target))
            .or_else(|| find_manager(&ves))
            .unwrap_or(&ves[0])
            .agent_type
            .clone();

        tracing::info!(
            task_id = %task_id,
            agent = %initial_agent,
            "orchestrator routing for intelligent delegation: {}",
            routing.reason
        );

        update_status(&ctx, &acts, task_id, TaskStatus::InProgress, Some(initial_agent.clone()),
            format!("Routing to {initial_agent}..."))
            .await?;

        let child_input = DelegationInput {
            customer_id,
            task_id,
            task_description,
            current_agent_type: initial_agent,
            context,
            delegation_depth: 0,
        };
        let acts_child = acts.clone();
        let child_id = delegation_workflow_id(task_id);
        let result: DelegationResult = ctx
            .child(&child_id, move |child_ctx| {
                crate::workflows::delegation::run(child_ctx, acts_child, child_input, 0)
            })
            .await?;

        // Mirror terminal delegation outcomes onto the task. The handle
        // path already completed it; failure and cancellation land here.
        finalize_task(&ctx, &acts, task_id, &result).await?;

        Ok(result)
    }
    .boxed()
}

async fn update_status(
    ctx: &WorkflowCtx,
    acts: &Arc<Activities>,
    task_id: Uuid,
    status: TaskStatus,
    agent_type: Option<String>,
    message: String,
) -> Result<(), WorkflowError> {
    let acts = acts.clone();
    ctx.activity(
        "update-task-status",
        ActivityOptions::new(Duration::from_secs(30)).with_attempts(2),
        move || {
            let acts = acts.clone();
            let agent_type = agent_type.clone();
            let message = message.clone();
            async move {
                acts.update_task_status(task_id, status, agent_type, Some(message))
                    .await
                    .map(|_| ())
            }
        },
    )
    .await
}

async fn finalize_task(
    ctx: &WorkflowCtx,
    acts: &Arc<Activities>,
    task_id: Uuid,
    result: &DelegationResult,
) -> Result<(), WorkflowError> {
    let (status, reason) = match result.status {
        DelegationOutcome::Completed => (TaskStatus::Completed, None),
        DelegationOutcome::Failed => (TaskStatus::Failed, result.reason.clone()),
        DelegationOutcome::Cancelled => (TaskStatus::Cancelled, result.reason.clone()),
    };

    let acts = acts.clone();
    ctx.activity(
        "finalize-task",
        ActivityOptions::new(Duration::from_secs(30)).with_attempts(2),
        move || {
            let acts = acts.clone();
            let reason = reason.clone();
            async move {
                let task = acts
                    .tasks
                    .get_task(task_id)
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("Task {task_id} not found"))?;

                // Terminal transitions are one-way; the handle path may have
                // already closed the task.
                let mut update = if task.status.is_terminal() {
                    TaskUpdate::default()
                } else {
                    TaskUpdate::status(status)
                };
                update = update.with_phase(TaskPhase::Completed);
                if let Some(reason) = reason {
                    if task.metadata_str("failure_reason").is_none() {
                        update = update.with_metadata("failure_reason", serde_json::json!(reason));
                    }
                }
                acts.tasks.update_task(task_id, update).await?;
                Ok(())
            }
        },
    )
    .await
}
