//! Direct assignment workflow with escalation.
//!
//! Used when a user pre-selects a VE for a task. The chosen VE is invoked
//! first; on failure the task escalates across the remaining hired agents
//! ordered manager → senior → junior, excluding every VE that already
//! failed, up to the configured attempt cap. Every attempt is logged into
//! `metadata.escalation_log`.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::error::WorkflowError;
use crate::domain::models::{AuthorType, EscalationAttempt, TaskPhase, TaskStatus};
use crate::domain::ports::TaskUpdate;
use crate::engine::{ActivityOptions, WorkflowCtx};
use crate::workflows::activities::{build_escalation_chain, Activities};

/// Input to the direct assignment workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectAssignmentInput {
    pub customer_id: Uuid,
    pub task_id: Uuid,
    pub ve_id: Uuid,
    pub task_description: String,
}

/// Terminal result of a direct assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentResult {
    pub status: String,
    pub escalation_attempts: u32,
    pub final_assigned_ve_id: Option<Uuid>,
    pub escalation_log: Vec<EscalationAttempt>,
}

/// The deterministic workflow id for a task's direct assignment.
pub fn direct_assignment_workflow_id(task_id: Uuid) -> String {
    format!("direct-assignment-{task_id}")
}

pub fn run(
    ctx: WorkflowCtx,
    acts: Arc<Activities>,
    input: DirectAssignmentInput,
) -> BoxFuture<'static, Result<AssignmentResult, WorkflowError>> {
    async move {
        let DirectAssignmentInput {
            customer_id,
            task_id,
            ve_id,
            task_description,
        } = input;

        let ves = {
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

        let Some(mut candidate) = ves.iter().find(|a| a.id == ve_id).cloned() else {
            let reason = format!("VE {ve_id} is not hired by customer {customer_id}");
            fail_task(&ctx, &acts, task_id, &reason, &[]).await?;
            return Ok(AssignmentResult {
                status: "failed".to_string(),
                escalation_attempts: 0,
                final_assigned_ve_id: None,
                escalation_log: Vec::new(),
            });
        };

        let max_attempts = acts.config.escalation.max_attempts;
        let mut log: Vec<EscalationAttempt> = Vec::new();
        let mut failed_ves: Vec<Uuid> = Vec::new();

        for attempt in 1..=max_attempts {
            if ctx.signal_state().cancelled {
                return Ok(AssignmentResult {
                    status: "cancelled".to_string(),
                    escalation_attempts: attempt - 1,
                    final_assigned_ve_id: None,
                    escalation_log: log,
                });
            }

            let status = if attempt == 1 {
                TaskStatus::InProgress
            } else {
                TaskStatus::Escalated
            };
            assign_candidate(&ctx, &acts, task_id, candidate.id, status, attempt, &candidate.persona_name)
                .await?;

            let invoke = {
                let acts = acts.clone();
                let agent_type = candidate.agent_type.clone();
                let message = task_description.clone();
                ctx.activity(
                    &format!("invoke-attempt-{attempt}"),
                    ActivityOptions::new(Duration::from_secs(600)).with_attempts(1),
                    move || {
                        let acts = acts.clone();
                        let agent_type = agent_type.clone();
                        let message = message.clone();
                        async move {
                            acts.invoke_agent(customer_id, &agent_type, &message, Some(task_id.to_string()))
                                .await
                        }
                    },
                )
                .await
            };

            match invoke {
                Ok(reply) => {
                    log.push(EscalationAttempt {
                        attempt,
                        ve_id: candidate.id,
                        status: "succeeded".to_string(),
                        reason: String::new(),
                        timestamp: ctx.now().await?,
                    });

                    let acts_save = acts.clone();
                    let message = reply.message.clone();
                    let log_json = serde_json::to_value(&log)
                        .map_err(crate::domain::error::StoreError::from)?;
                    ctx.activity(
                        "complete-assignment",
                        ActivityOptions::new(Duration::from_secs(30)).with_attempts(2),
                        move || {
                            let acts = acts_save.clone();
                            let message = message.clone();
                            let log_json = log_json.clone();
                            async move {
                                acts.tasks
                                    .update_task(
                                        task_id,
                                        TaskUpdate::default()
                                            .with_metadata("escalation_log", log_json),
                                    )
                                    .await?;
                                acts.save_task_result(
                                    task_id,
                                    &message,
                                    TaskStatus::Completed,
                                    AuthorType::Ve,
                                )
                                .await?;
                                acts.tasks
                                    .update_task(
                                        task_id,
                                        TaskUpdate::default().with_phase(TaskPhase::Completed),
                                    )
                                    .await?;
                                Ok(())
                            }
                        },
                    )
                    .await?;

                    return Ok(AssignmentResult {
                        status: "routed".to_string(),
                        escalation_attempts: attempt - 1,
                        final_assigned_ve_id: Some(candidate.id),
                        escalation_log: log,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        task_id = %task_id,
                        ve_id = %candidate.id,
                        attempt,
                        "assignment attempt failed: {e}"
                    );
                    failed_ves.push(candidate.id);
                    log.push(EscalationAttempt {
                        attempt,
                        ve_id: candidate.id,
                        status: "failed".to_string(),
                        reason: e.to_string(),
                        timestamp: ctx.now().await?,
                    });

                    let chain = build_escalation_chain(&ves, &failed_ves);
                    match chain.into_iter().next() {
                        Some(next) => candidate = next,
                        None => break,
                    }
                }
            }
        }

        let reason = format!(
            "All escalation attempts exhausted after {} tries",
            log.len()
        );
        fail_task(&ctx, &acts, task_id, &reason, &log).await?;
        Ok(AssignmentResult {
            status: "failed".to_string(),
            escalation_attempts: log.len() as u32,
            final_assigned_ve_id: None,
            escalation_log: log,
        })
    }
    .boxed()
}

async fn assign_candidate(
    ctx: &WorkflowCtx,
    acts: &Arc<Activities>,
    task_id: Uuid,
    ve_id: Uuid,
    status: TaskStatus,
    attempt: u32,
    persona: &str,
) -> Result<(), WorkflowError> {
    let acts = acts.clone();
    let message = if attempt == 1 {
        format!("{persona} is handling this task")
    } else {
        format!("Escalating to {persona} (attempt {attempt})")
    };
    ctx.activity(
        "assign-candidate",
        ActivityOptions::new(Duration::from_secs(30)).with_attempts(2),
        move || {
            let acts = acts.clone();
            let message = message.clone();
            async move {
                acts.tasks
                    .update_task(
                        task_id,
                        TaskUpdate::status(status)
                            .with_assigned_to(Some(ve_id))
                            .with_progress(message),
                    )
                    .await?;
                Ok(())
            }
        },
    )
    .await
}

async fn fail_task(
    ctx: &WorkflowCtx,
    acts: &Arc<Activities>,
    task_id: Uuid,
    reason: &str,
    log: &[EscalationAttempt],
) -> Result<(), WorkflowError> {
    let acts = acts.clone();
    let reason = reason.to_string();
    let log_json = serde_json::to_value(log).map_err(crate::domain::error::StoreError::from)?;
    ctx.activity(
        "fail-assignment",
        ActivityOptions::new(Duration::from_secs(30)).with_attempts(2),
        move || {
            let acts = acts.clone();
            let reason = reason.clone();
            let log_json = log_json.clone();
            async move {
                acts.tasks
                    .update_task(
                        task_id,
                        TaskUpdate::status(TaskStatus::Failed)
                            .with_phase(TaskPhase::Completed)
                            .with_metadata("failure_reason", json!(&reason))
                            .with_metadata("escalation_log", log_json)
                            .with_progress(reason.clone()),
                    )
                    .await?;
                Ok(())
            }
        },
    )
    .await
}
