//! Intelligent delegation workflow.
//!
//! A recursive, durable decision loop: each frame appends itself to the
//! delegation chain, lets the current agent decide (handle / delegate /
//! parallel / ask_clarification), and dispatches. Signals pause, resume,
//! cancel, approve the plan, or deliver feedback; queries expose the live
//! status frame. Depth and rate are bounded by the circuit breaker.

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::error::WorkflowError;
use crate::domain::models::{
    AuthorType, DecisionRecord, DelegationAction, DelegationInput, DelegationOutcome,
    DelegationResult, DelegationStatus, DelegationType, HiredAgent, TaskStatus,
};
use crate::engine::{ActivityOptions, WorkflowCtx};
use crate::workflows::activities::Activities;

fn short_opts() -> ActivityOptions {
    ActivityOptions::new(Duration::from_secs(30)).with_attempts(2)
}

fn status_value(status: &DelegationStatus) -> serde_json::Value {
    serde_json::to_value(status).unwrap_or(serde_json::Value::Null)
}

/// Run one delegation frame. Recursion happens through child workflows, so
/// the future is boxed.
pub fn run(
    ctx: WorkflowCtx,
    acts: Arc<Activities>,
    input: DelegationInput,
    retry_seq: u32,
) -> BoxFuture<'static, Result<DelegationResult, WorkflowError>> {
    async move {
        let DelegationInput {
            customer_id,
            task_id,
            task_description,
            current_agent_type,
            mut context,
            delegation_depth,
        } = input;

        let started = ctx.now().await?;
        let mut frame = DelegationStatus {
            current_agent: Some(current_agent_type.clone()),
            delegation_depth,
            delegation_chain: context.delegation_chain.clone(),
            start_time: Some(started),
            last_update: Some(started),
            ..DelegationStatus::default()
        };
        ctx.set_status(status_value(&frame)).await;

        tracing::info!(
            workflow_id = ctx.workflow_id(),
            agent = %current_agent_type,
            depth = delegation_depth,
            "starting delegation frame"
        );

        if ctx.signal_state().cancelled {
            return Ok(DelegationResult::cancelled(
                "Workflow cancelled by user",
                frame.delegation_chain,
            ));
        }

        // Depth guard: no agent is invoked past the cap.
        if delegation_depth > acts.config.delegation.max_depth {
            tracing::warn!(task_id = %task_id, "max delegation depth reached");
            return Ok(DelegationResult::failed(
                "Maximum delegation depth exceeded",
                context.delegation_chain.clone(),
            ));
        }

        // Interactive planning phase, root frame only.
        if delegation_depth == 0 && !context.plan_approved {
            acts_update(&ctx, &acts, task_id, TaskStatus::Planning, Some(current_agent_type.as_str()),
                format!("{current_agent_type} is drafting an execution plan..."))
                .await?;

            let plan = {
                let acts = acts.clone();
                let description = task_description.clone();
                let agent = current_agent_type.clone();
                let plan_context = context.clone();
                ctx.activity(
                    "create-task-plan",
                    ActivityOptions::new(Duration::from_secs(180)).with_attempts(2),
                    move || {
                        let acts = acts.clone();
                        let description = description.clone();
                        let agent = agent.clone();
                        let plan_context = plan_context.clone();
                        async move {
                            acts.create_task_plan(task_id, &description, &agent, &plan_context)
                                .await
                        }
                    },
                )
                .await?
            };

            if !plan.success {
                let error = plan.error.unwrap_or_else(|| "Unknown planning error".to_string());
                acts_update(&ctx, &acts, task_id, TaskStatus::Failed, Some(current_agent_type.as_str()),
                    format!("Planning Failed: {error}"))
                    .await?;
                return Ok(DelegationResult::failed(
                    format!("Planning failure: {error}"),
                    context.delegation_chain.clone(),
                ));
            }

            acts_update(&ctx, &acts, task_id, TaskStatus::Planning, Some(current_agent_type.as_str()),
                "Plan drafted. Waiting for approval.".to_string())
                .await?;

            tracing::info!(task_id = %task_id, "waiting for plan approval");
            let state = ctx.wait_until(|s| s.plan_approved || s.cancelled).await;
            if state.cancelled {
                return Ok(DelegationResult::cancelled(
                    "Workflow cancelled during planning",
                    context.delegation_chain.clone(),
                ));
            }

            context.plan_approved = true;
            context.user_feedback = Some("Plan approved by user.".to_string());

            acts_update(&ctx, &acts, task_id, TaskStatus::InProgress, Some(current_agent_type.as_str()),
                "Plan approved. Starting execution...".to_string())
                .await?;
        }

        // Every frame appends itself: at depth d the chain has d+1 entries.
        let mut chain = context.delegation_chain.clone();
        chain.push(current_agent_type.clone());
        context.delegation_chain = chain.clone();
        frame.delegation_chain = chain.clone();
        ctx.set_status(status_value(&frame)).await;

        // Team discovery.
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
            return Ok(DelegationResult::failed("No VEs available", chain));
        }
        let current_agent = ves
            .iter()
            .find(|a| a.agent_type == current_agent_type)
            .unwrap_or(&ves[0])
            .clone();

        // Decision step.
        frame.current_action = Some("analyzing".to_string());
        frame.last_update = Some(ctx.now().await?);
        let snapshot = ctx.signal_state();
        frame.paused = snapshot.paused;
        frame.cancelled = snapshot.cancelled;
        ctx.set_status(status_value(&frame)).await;

        acts_update(&ctx, &acts, task_id, TaskStatus::InProgress, Some(current_agent_type.as_str()),
            format!("{current_agent_type} is analyzing the task..."))
            .await?;

        let state = ctx.wait_until(|s| !s.paused || s.cancelled).await;
        if state.cancelled {
            return Ok(DelegationResult::cancelled("Workflow cancelled by user", chain));
        }

        let decision = {
            let acts = acts.clone();
            let agent = current_agent_type.clone();
            let description = task_description.clone();
            let decide_context = context.clone();
            let team = ves.clone();
            ctx.activity(
                "analyze-and-decide",
                ActivityOptions::new(Duration::from_secs(120)).with_attempts(2),
                move || {
                    let acts = acts.clone();
                    let agent = agent.clone();
                    let description = description.clone();
                    let decide_context = decide_context.clone();
                    let team = team.clone();
                    async move {
                        acts.analyze_and_decide(&agent, &description, &decide_context, customer_id, &team)
                            .await
                    }
                },
            )
            .await?
        };

        tracing::info!(
            agent = %current_agent_type,
            action = decision.action.as_str(),
            "agent decision: {}",
            decision.reason
        );

        frame.current_action = Some(decision.action.as_str().to_string());
        frame.decisions_made.push(DecisionRecord {
            agent: current_agent_type.clone(),
            action: decision.action,
            confidence: decision.confidence,
            reason: decision.reason.clone(),
            timestamp: ctx.now().await?,
        });
        ctx.set_status(status_value(&frame)).await;

        match decision.action {
            DelegationAction::Handle => {
                handle_directly(
                    &ctx,
                    &acts,
                    customer_id,
                    task_id,
                    &task_description,
                    &current_agent,
                    chain,
                    DelegationType::SelfExecution,
                )
                .await
            }

            DelegationAction::Delegate => {
                let Some(target) = decision.delegated_to.clone() else {
                    return handle_directly(
                        &ctx,
                        &acts,
                        customer_id,
                        task_id,
                        &task_description,
                        &current_agent,
                        chain,
                        DelegationType::FallbackExecution,
                    )
                    .await;
                };

                // Breaker gate before spawning the child.
                if let Some(reason) = breaker_gate(&ctx, &acts, customer_id, &target, delegation_depth + 1).await? {
                    tracing::warn!(task_id = %task_id, "delegation blocked, handling locally: {reason}");
                    return handle_directly(
                        &ctx,
                        &acts,
                        customer_id,
                        task_id,
                        &task_description,
                        &current_agent,
                        chain,
                        DelegationType::FallbackExecution,
                    )
                    .await;
                }

                acts_update(&ctx, &acts, task_id, TaskStatus::InProgress, Some(target.as_str()),
                    format!("Delegating to {target}..."))
                    .await?;

                let child_id = format!("delegation-{task_id}-{}", delegation_depth + 1);
                let child_input = DelegationInput {
                    customer_id,
                    task_id,
                    task_description: task_description.clone(),
                    current_agent_type: target,
                    context: context.clone(),
                    delegation_depth: delegation_depth + 1,
                };
                let acts_child = acts.clone();
                let mut result: DelegationResult = ctx
                    .child(&child_id, move |child_ctx| {
                        run(child_ctx, acts_child, child_input, 0)
                    })
                    .await?;

                result.delegated_by = Some(current_agent.persona_name.clone());
                Ok(result)
            }

            DelegationAction::Parallel => {
                let subtasks = decision.subtasks.clone().unwrap_or_default();
                if subtasks.is_empty() {
                    return handle_directly(
                        &ctx,
                        &acts,
                        customer_id,
                        task_id,
                        &task_description,
                        &current_agent,
                        chain,
                        DelegationType::FallbackExecution,
                    )
                    .await;
                }

                let mut children = Vec::new();
                let mut assigned_agents = Vec::new();
                for (index, subtask) in subtasks.iter().enumerate() {
                    let agent = subtask
                        .assigned_to
                        .clone()
                        .unwrap_or_else(|| current_agent_type.clone());
                    assigned_agents.push(agent.clone());

                    if let Some(reason) =
                        breaker_gate(&ctx, &acts, customer_id, &agent, delegation_depth + 1).await?
                    {
                        children.push(
                            async move {
                                Err::<DelegationResult, _>(WorkflowError::BreakerRejected(reason))
                            }
                            .boxed(),
                        );
                        continue;
                    }

                    let child_id =
                        format!("delegation-{task_id}-{}-p{index}", delegation_depth + 1);
                    let child_input = DelegationInput {
                        customer_id,
                        task_id,
                        task_description: subtask.description.clone(),
                        current_agent_type: agent,
                        context: context.clone(),
                        delegation_depth: delegation_depth + 1,
                    };
                    let acts_child = acts.clone();
                    let ctx_ref = &ctx;
                    children.push(
                        async move {
                            ctx_ref
                                .child(&child_id, move |child_ctx| {
                                    run(child_ctx, acts_child, child_input, 0)
                                })
                                .await
                        }
                        .boxed(),
                    );
                }

                acts_update(&ctx, &acts, task_id, TaskStatus::InProgress, Some(current_agent_type.as_str()),
                    format!("Splitting into {} parallel subtasks...", subtasks.len()))
                    .await?;

                // Siblings are unordered; this combination step is the only
                // synchronization point, ordered by subtask index.
                let outcomes = join_all(children).await;
                let children_results: Vec<DelegationResult> = outcomes
                    .into_iter()
                    .map(|outcome| match outcome {
                        Ok(result) => result,
                        Err(e) => DelegationResult::failed(e.to_string(), Vec::new()),
                    })
                    .collect();

                let all_failed = children_results
                    .iter()
                    .all(|r| r.status == DelegationOutcome::Failed);

                let mut combined_chain = chain.clone();
                combined_chain.extend(assigned_agents);

                if all_failed {
                    acts_update(&ctx, &acts, task_id, TaskStatus::Failed, Some(current_agent_type.as_str()),
                        "All parallel subtasks failed".to_string())
                        .await?;
                    return Ok(DelegationResult {
                        status: DelegationOutcome::Failed,
                        reason: Some("All parallel subtasks failed".to_string()),
                        handled_by: Some(current_agent.persona_name.clone()),
                        delegated_by: None,
                        delegation_type: Some(DelegationType::ParallelExecution),
                        delegation_chain: combined_chain,
                        result: None,
                        children_results: Some(children_results),
                    });
                }

                let summary = children_results
                    .iter()
                    .enumerate()
                    .map(|(i, r)| {
                        format!(
                            "Subtask {} ({}): {}",
                            i + 1,
                            r.handled_by.as_deref().unwrap_or("unassigned"),
                            match r.status {
                                DelegationOutcome::Completed =>
                                    r.result.clone().unwrap_or_else(|| "done".to_string()),
                                _ => format!("{} ({})", r.status.as_str(),
                                    r.reason.as_deref().unwrap_or("no reason")),
                            }
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n");

                save_result(&ctx, &acts, task_id, summary.clone(), TaskStatus::Completed, AuthorType::Ve).await?;

                Ok(DelegationResult {
                    status: DelegationOutcome::Completed,
                    reason: None,
                    handled_by: Some(current_agent.persona_name.clone()),
                    delegated_by: None,
                    delegation_type: Some(DelegationType::ParallelExecution),
                    delegation_chain: combined_chain,
                    result: Some(summary),
                    children_results: Some(children_results),
                })
            }

            DelegationAction::AskClarification => {
                tracing::info!(
                    agent = %current_agent_type,
                    "asking for clarification: {}",
                    decision.reason
                );

                acts_update(&ctx, &acts, task_id, TaskStatus::WaitingForInput, Some(current_agent_type.as_str()),
                    decision.reason.clone())
                    .await?;

                {
                    let acts = acts.clone();
                    let question = format!("**QUESTION:** {}", decision.reason);
                    ctx.activity("post-question", short_opts(), move || {
                        let acts = acts.clone();
                        let question = question.clone();
                        async move {
                            acts.append_comment(task_id, AuthorType::System, &question).await
                        }
                    })
                    .await?;
                }

                // Consume only feedback that arrives after this point. The
                // baseline is journaled so a replay with pre-applied signals
                // still sees the count that was current on first execution.
                let baseline = ctx.signal_state().feedback_count;
                let seen: u64 = ctx
                    .activity("feedback-baseline", short_opts(), move || async move {
                        Ok(baseline)
                    })
                    .await?;
                tracing::info!(task_id = %task_id, "workflow blocked, waiting for feedback");
                let state = ctx
                    .wait_until(|s| s.feedback_count > seen || s.cancelled)
                    .await;
                if state.cancelled {
                    return Ok(DelegationResult::cancelled(
                        "Workflow cancelled during feedback",
                        chain,
                    ));
                }

                context.user_feedback = state.last_feedback.clone();
                // The retry frame re-appends the agent itself; hand it the
                // chain as this frame received it.
                let mut retry_context = context.clone();
                retry_context
                    .delegation_chain
                    .truncate(chain.len().saturating_sub(1));

                acts_update(&ctx, &acts, task_id, TaskStatus::InProgress, Some(current_agent_type.as_str()),
                    "Feedback received, resuming analysis...".to_string())
                    .await?;

                let retry_id = format!(
                    "intelligent-delegation-{task_id}-retry-{}",
                    retry_seq + 1
                );
                let retry_input = DelegationInput {
                    customer_id,
                    task_id,
                    task_description: task_description.clone(),
                    current_agent_type: current_agent_type.clone(),
                    context: retry_context,
                    delegation_depth,
                };
                let acts_child = acts.clone();
                let next_retry = retry_seq + 1;
                ctx.child(&retry_id, move |child_ctx| {
                    run(child_ctx, acts_child, retry_input, next_retry)
                })
                .await
            }
        }
    }
    .boxed()
}

/// Status-update activity wrapper shared by every step.
async fn acts_update(
    ctx: &WorkflowCtx,
    acts: &Arc<Activities>,
    task_id: uuid::Uuid,
    status: TaskStatus,
    agent_type: Option<&str>,
    message: String,
) -> Result<(), WorkflowError> {
    let acts = acts.clone();
    let agent_type = agent_type.map(str::to_owned);
    ctx.activity("update-task-status", short_opts(), move || {
        let acts = acts.clone();
        let agent_type = agent_type.clone();
        let message = message.clone();
        async move {
            acts.update_task_status(task_id, status, agent_type, Some(message))
                .await
                .map(|_| ())
        }
    })
    .await
}

async fn save_result(
    ctx: &WorkflowCtx,
    acts: &Arc<Activities>,
    task_id: uuid::Uuid,
    message: String,
    status: TaskStatus,
    author: AuthorType,
) -> Result<(), WorkflowError> {
    let acts = acts.clone();
    ctx.activity("save-task-result", short_opts(), move || {
        let acts = acts.clone();
        let message = message.clone();
        async move { acts.save_task_result(task_id, &message, status, author).await }
    })
    .await
}

async fn breaker_gate(
    ctx: &WorkflowCtx,
    acts: &Arc<Activities>,
    customer_id: uuid::Uuid,
    agent_type: &str,
    depth: u32,
) -> Result<Option<String>, WorkflowError> {
    let acts = acts.clone();
    let workflow_id = ctx.workflow_id().to_string();
    let agent_type = agent_type.to_string();
    ctx.activity("circuit-breaker-check", short_opts(), move || {
        let acts = acts.clone();
        let workflow_id = workflow_id.clone();
        let agent_type = agent_type.clone();
        async move {
            acts.check_delegation_allowed(&workflow_id, customer_id, &agent_type, depth)
                .await
        }
    })
    .await
}

/// Direct execution: invoke the agent, persist the reply as a `ve` comment,
/// and complete the task.
#[allow(clippy::too_many_arguments)]
async fn handle_directly(
    ctx: &WorkflowCtx,
    acts: &Arc<Activities>,
    customer_id: uuid::Uuid,
    task_id: uuid::Uuid,
    task_description: &str,
    agent: &HiredAgent,
    chain: Vec<String>,
    delegation_type: DelegationType,
) -> Result<DelegationResult, WorkflowError> {
    acts_update(
        ctx,
        acts,
        task_id,
        TaskStatus::InProgress,
        Some(agent.agent_type.as_str()),
        format!("{} is working on this task", agent.persona_name),
    )
    .await?;

    let reply = {
        let acts = acts.clone();
        let agent_type = agent.agent_type.clone();
        let message = task_description.to_string();
        ctx.activity(
            "invoke-agent",
            ActivityOptions::new(Duration::from_secs(600)).with_attempts(2),
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
        .await?
    };

    save_result(ctx, acts, task_id, reply.message.clone(), TaskStatus::Completed, AuthorType::Ve)
        .await?;

    Ok(DelegationResult {
        status: DelegationOutcome::Completed,
        reason: None,
        handled_by: Some(agent.persona_name.clone()),
        delegated_by: None,
        delegation_type: Some(delegation_type),
        delegation_chain: chain,
        result: Some(reply.message),
        children_results: None,
    })
}
