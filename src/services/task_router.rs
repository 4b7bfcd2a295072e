//! Task router: the entry point of the orchestration plane.
//!
//! Persists tasks and starts their durable workflows. Never invokes agents
//! itself. Workflow starts are idempotent: re-routing an existing task id
//! joins the running workflow instead of creating a duplicate.

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::models::{DelegationContext, Task, TaskStatus};
use crate::domain::ports::{TaskStore, TaskUpdate};
use crate::engine::{Signal, StartOutcome, WorkflowRunner};
use crate::workflows::{
    delegation_workflow_id, direct_assignment_workflow_id, orchestrator_workflow_id, Activities,
    DirectAssignmentInput, OrchestratorInput,
};

/// Receipt returned to the caller when a task is routed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteReceipt {
    pub task_id: Uuid,
    pub workflow_id: String,
    pub status: String,
}

/// Router over the durable workflow engine.
#[derive(Clone)]
pub struct TaskRouter {
    tasks: Arc<dyn TaskStore>,
    runner: WorkflowRunner,
    acts: Arc<Activities>,
}

impl TaskRouter {
    pub fn new(tasks: Arc<dyn TaskStore>, runner: WorkflowRunner, acts: Arc<Activities>) -> Self {
        Self {
            tasks,
            runner,
            acts,
        }
    }

    /// Route a tenant request through the orchestrator workflow.
    ///
    /// Creates the task when `task_id` is absent; re-entry with an existing
    /// id never creates a duplicate workflow run.
    pub async fn route(
        &self,
        customer_id: Uuid,
        description: &str,
        context: Option<DelegationContext>,
        task_id: Option<Uuid>,
    ) -> anyhow::Result<RouteReceipt> {
        let task_id = match task_id {
            Some(id) => id,
            None => {
                let task = Task::new(customer_id, description);
                self.tasks.insert_task(&task).await?;
                task.id
            }
        };

        let workflow_id = orchestrator_workflow_id(task_id);
        let input = OrchestratorInput {
            customer_id,
            task_id,
            task_description: description.to_string(),
            context: context.unwrap_or_default(),
        };

        let acts = self.acts.clone();
        let start = self
            .runner
            .start(
                &workflow_id,
                serde_json::to_value(&input)?,
                move |ctx| {
                    let fut = crate::workflows::orchestrator::run(ctx, acts, input);
                    async move {
                        let result = fut.await?;
                        Ok(serde_json::to_value(result)
                            .map_err(crate::domain::error::StoreError::from)?)
                    }
                    .boxed()
                },
            )
            .await;

        match start {
            Ok(outcome) => {
                if matches!(outcome, StartOutcome::AlreadyRunning) {
                    tracing::info!(%task_id, "orchestrator workflow already running");
                }
                tracing::info!(%task_id, workflow_id, "task routed");
                Ok(RouteReceipt {
                    task_id,
                    workflow_id,
                    status: "pending".to_string(),
                })
            }
            Err(e) => {
                // The task exists but its workflow could not start.
                let _ = self
                    .tasks
                    .update_task(
                        task_id,
                        TaskUpdate::status(TaskStatus::Failed)
                            .with_metadata("failure_reason", json!(e.to_string())),
                    )
                    .await;
                Err(e.into())
            }
        }
    }

    /// Assign a task directly to a chosen VE via the escalation workflow.
    pub async fn assign(
        &self,
        customer_id: Uuid,
        task_id: Uuid,
        ve_id: Uuid,
        description: &str,
    ) -> bool {
        let workflow_id = direct_assignment_workflow_id(task_id);
        let input = DirectAssignmentInput {
            customer_id,
            task_id,
            ve_id,
            task_description: description.to_string(),
        };

        let acts = self.acts.clone();
        let input_value = match serde_json::to_value(&input) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(%task_id, "assign failed to serialize input: {e}");
                return false;
            }
        };
        let start = self
            .runner
            .start(&workflow_id, input_value, move |ctx| {
                let fut = crate::workflows::direct_assignment::run(ctx, acts, input);
                async move {
                    let result = fut.await?;
                    Ok(serde_json::to_value(result)
                        .map_err(crate::domain::error::StoreError::from)?)
                }
                .boxed()
            })
            .await;

        match start {
            Ok(_) => {
                tracing::info!(%task_id, workflow_id, "direct assignment started");
                true
            }
            Err(e) => {
                tracing::error!(%task_id, "assign failed: {e}");
                false
            }
        }
    }

    /// Signal the task's delegation workflow.
    pub async fn signal_task(&self, task_id: Uuid, signal: Signal) -> anyhow::Result<()> {
        self.runner
            .signal(&delegation_workflow_id(task_id), signal)
            .await?;
        Ok(())
    }

    /// Approve the drafted plan and mark it approved in the store.
    pub async fn approve_plan(&self, task_id: Uuid) -> anyhow::Result<()> {
        if let Some(task) = self.tasks.get_task(task_id).await? {
            if let Some(plan_id) = task
                .metadata_str("latest_plan_id")
                .and_then(|raw| Uuid::parse_str(raw).ok())
            {
                self.tasks
                    .set_plan_status(plan_id, crate::domain::models::PlanStatus::Approved)
                    .await?;
            }
        }
        self.signal_task(task_id, Signal::ApprovePlan).await
    }

    /// Cancel a task: signal the delegation workflow, terminate every
    /// well-known workflow id, and close the task.
    pub async fn cancel_task(&self, task_id: Uuid) -> anyhow::Result<()> {
        let _ = self.signal_task(task_id, Signal::CancelDelegation).await;

        for workflow_id in [
            orchestrator_workflow_id(task_id),
            delegation_workflow_id(task_id),
            direct_assignment_workflow_id(task_id),
        ] {
            if let Err(e) = self.runner.terminate(&workflow_id).await {
                tracing::warn!(workflow_id, "terminate failed: {e}");
            }
        }

        if let Some(task) = self.tasks.get_task(task_id).await? {
            if !task.status.is_terminal() {
                self.tasks
                    .update_task(task_id, TaskUpdate::status(TaskStatus::Cancelled))
                    .await?;
            }
        }
        Ok(())
    }

    /// Query the live delegation status frame.
    pub async fn delegation_status(&self, task_id: Uuid) -> Option<Value> {
        self.runner
            .query_status(&delegation_workflow_id(task_id))
            .await
    }

    /// Query the live delegation chain.
    pub async fn delegation_chain(&self, task_id: Uuid) -> Option<Value> {
        self.delegation_status(task_id)
            .await
            .and_then(|status| status.get("delegation_chain").cloned())
    }

    /// Re-launch open top-level runs after a restart.
    pub async fn recover(&self) -> anyhow::Result<usize> {
        let open = self.runner.open_runs().await?;
        let mut resumed = 0;
        for run in open {
            if let Some(raw_id) = run.workflow_id.strip_prefix("orchestrator-") {
                let Ok(task_id) = Uuid::parse_str(raw_id) else {
                    continue;
                };
                let input: OrchestratorInput = match serde_json::from_value(run.input.clone()) {
                    Ok(input) => input,
                    Err(e) => {
                        tracing::error!(workflow_id = run.workflow_id, "bad stored input: {e}");
                        continue;
                    }
                };
                tracing::info!(task_id = %task_id, "recovering orchestrator workflow");
                self.route(
                    input.customer_id,
                    &input.task_description,
                    Some(input.context),
                    Some(task_id),
                )
                .await?;
                resumed += 1;
            } else if let Some(raw_id) = run.workflow_id.strip_prefix("direct-assignment-") {
                let Ok(_task_id) = Uuid::parse_str(raw_id) else {
                    continue;
                };
                let input: DirectAssignmentInput = match serde_json::from_value(run.input.clone()) {
                    Ok(input) => input,
                    Err(e) => {
                        tracing::error!(workflow_id = run.workflow_id, "bad stored input: {e}");
                        continue;
                    }
                };
                self.assign(input.customer_id, input.task_id, input.ve_id, &input.task_description)
                    .await;
                resumed += 1;
            }
            // Child delegation runs are re-entered by their parents.
        }
        Ok(resumed)
    }
}
