//! Workflow activities.
//!
//! Activities are the only place workflows touch the outside world: the
//! task store, the agent gateway, the real-time publisher, and the circuit
//! breaker. Each is deterministic from the workflow's point of view because
//! the engine journals its result.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::sync::OnceLock;
use uuid::Uuid;

use crate::domain::models::config::Config;
use crate::domain::models::{
    AuthorType, Comment, DecisionMethod, DelegationAction, DelegationContext, DelegationDecision,
    HiredAgent, Plan, PlanStep, SeniorityTier, TaskStatus,
};
use crate::domain::ports::{task_channel, AgentInvoker, AgentReply, RealtimePublisher, TaskStore, TaskUpdate};
use crate::services::circuit_breaker::DelegationCircuitBreaker;

/// Shared dependencies injected into every activity.
pub struct Activities {
    pub tasks: Arc<dyn TaskStore>,
    pub invoker: Arc<dyn AgentInvoker>,
    pub publisher: Arc<dyn RealtimePublisher>,
    pub breaker: Arc<DelegationCircuitBreaker>,
    pub config: Config,
}

/// Result of the task-status activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub assigned_to_agent_type: Option<String>,
    pub assigned_to_ve_id: Option<Uuid>,
}

/// Result of the routing activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub target_agent: Option<String>,
    pub reason: String,
}

/// Result of the planning activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanOutcome {
    pub success: bool,
    pub plan_id: Option<Uuid>,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Activities {
    /// Update task status (and optionally assignment), merge the progress
    /// message into metadata, and publish the transition to the UI channel.
    pub async fn update_task_status(
        &self,
        task_id: Uuid,
        status: TaskStatus,
        assigned_agent_type: Option<String>,
        progress_message: Option<String>,
    ) -> anyhow::Result<StatusUpdate> {
        let task = self
            .tasks
            .get_task(task_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Task {task_id} not found"))?;

        // Terminal transitions are one-way. A sibling frame (or a cancel)
        // may have closed the task already; later updates are idempotent
        // no-ops rather than failures.
        if task.status.is_terminal() && task.status != status {
            tracing::debug!(
                task_id = %task_id,
                current = task.status.as_str(),
                requested = status.as_str(),
                "skipping status update on terminal task"
            );
            return Ok(StatusUpdate {
                task_id,
                status: task.status,
                assigned_to_agent_type: assigned_agent_type,
                assigned_to_ve_id: None,
            });
        }

        let mut assigned_ve_id = None;
        if let Some(ref agent_type) = assigned_agent_type {
            let hired = self.tasks.list_hired_agents(task.customer_id).await?;
            assigned_ve_id = hired
                .iter()
                .find(|a| &a.agent_type == agent_type)
                .map(|a| a.id);
        }

        let mut update = TaskUpdate::status(status);
        if let Some(ve_id) = assigned_ve_id {
            update = update.with_assigned_to(Some(ve_id));
        }
        if let Some(ref message) = progress_message {
            update = update.with_progress(message.clone());
        }
        let updated = self.tasks.update_task(task_id, update).await?;

        self.publisher
            .publish(
                &task_channel(task.customer_id),
                json!({
                    "type": "task_update",
                    "task_id": task_id,
                    "status": status.as_str(),
                    "assigned_to_agent_type": &assigned_agent_type,
                    "assigned_to_ve_id": assigned_ve_id,
                    "progress_message": &progress_message,
                    "updated_at": updated.updated_at.to_rfc3339(),
                }),
            )
            .await;

        tracing::info!(task_id = %task_id, status = status.as_str(), "task status updated");
        Ok(StatusUpdate {
            task_id,
            status,
            assigned_to_agent_type: assigned_agent_type,
            assigned_to_ve_id: assigned_ve_id,
        })
    }

    /// Persist a result comment and move the task to its terminal status.
    pub async fn save_task_result(
        &self,
        task_id: Uuid,
        message: &str,
        status: TaskStatus,
        author: AuthorType,
    ) -> anyhow::Result<()> {
        let task = self
            .tasks
            .get_task(task_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Task {task_id} not found"))?;

        if task.status != status {
            self.update_task_status(task_id, status, None, None).await?;
        }

        let snippet: String = message.chars().take(500).collect();
        self.tasks
            .append_comment(&Comment::new(
                task_id,
                task.customer_id,
                author,
                format!("Task {}. Result: {snippet}", status.as_str()),
            ))
            .await?;

        tracing::info!(task_id = %task_id, "task result saved");
        Ok(())
    }

    /// Append a free-form comment to the task log.
    pub async fn append_comment(
        &self,
        task_id: Uuid,
        author: AuthorType,
        content: &str,
    ) -> anyhow::Result<()> {
        let task = self
            .tasks
            .get_task(task_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Task {task_id} not found"))?;
        self.tasks
            .append_comment(&Comment::new(task_id, task.customer_id, author, content))
            .await?;
        Ok(())
    }

    /// Fetch the tenant's hired agents.
    pub async fn get_customer_ves(&self, customer_id: Uuid) -> anyhow::Result<Vec<HiredAgent>> {
        Ok(self.tasks.list_hired_agents(customer_id).await?)
    }

    /// Ask the system orchestrator agent to pick an initial agent; fall back
    /// to the keyword heuristic. Never fails the task outright.
    pub async fn analyze_routing(
        &self,
        customer_id: Uuid,
        task_description: &str,
        context: &DelegationContext,
    ) -> anyhow::Result<RoutingDecision> {
        let prompt = format!(
            "Please analyze this task and determine the best routing.\n\
             Task: {task_description}\n\
             Context: {}\n\n\
             Return JSON with 'routing_info' containing 'primary_agent'.",
            serde_json::to_string(context).unwrap_or_default()
        );

        let reply = self
            .invoker
            .invoke(
                customer_id,
                &self.config.routing.orchestrator_agent,
                &prompt,
                Some(format!("routing-{customer_id}").as_str()),
            )
            .await;

        match reply {
            Ok(AgentReply { message, .. }) => {
                if let Some(data) = extract_json_block(&message) {
                    let target = data
                        .pointer("/routing_info/primary_agent")
                        .or_else(|| data.pointer("/decision/target_agent"))
                        .and_then(Value::as_str)
                        .map(str::to_owned);
                    if target.is_some() {
                        let reason = data
                            .get("thought_process")
                            .and_then(Value::as_str)
                            .unwrap_or(&message)
                            .to_string();
                        return Ok(RoutingDecision {
                            target_agent: target,
                            reason,
                        });
                    }
                }
                Ok(RoutingDecision {
                    target_agent: Some(keyword_route(task_description, &self.config.routing.bootstrap_agent)),
                    reason: "Fallback routing used: orchestrator response unparseable".to_string(),
                })
            }
            Err(e) => {
                tracing::error!("routing via orchestrator failed: {e}");
                Ok(RoutingDecision {
                    target_agent: Some(keyword_route(task_description, &self.config.routing.bootstrap_agent)),
                    reason: format!("Fallback routing used due to error: {e}"),
                })
            }
        }
    }

    /// The deciding agent analyzes the task and picks a delegation strategy.
    ///
    /// Parse or validation failures are retried with a tightened prompt up to
    /// the configured budget, then fall back to handle with confidence 0.3.
    pub async fn analyze_and_decide(
        &self,
        agent_type: &str,
        task_description: &str,
        context: &DelegationContext,
        customer_id: Uuid,
        available_agents: &[HiredAgent],
    ) -> anyhow::Result<DelegationDecision> {
        let agent_list = available_agents
            .iter()
            .map(|a| {
                format!(
                    "- {} ({}): {}",
                    a.agent_type,
                    a.seniority.as_str(),
                    a.persona_name
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let base_prompt = format!(
            "You are a {agent_type} managing a task. Decide the delegation strategy.\n\
             TASK: {task_description}\n\n\
             CONTEXT:\n\
             - Priority: {}\n\
             - Due Date: {}\n\
             - User Feedback History: {}\n\n\
             AVAILABLE TEAM MEMBERS:\n{agent_list}\n\n\
             You can choose to:\n\
             - HANDLE: execute the task yourself\n\
             - DELEGATE: assign to ONE specialist\n\
             - PARALLEL: split among MULTIPLE team members\n\
             - ASK_CLARIFICATION: ask the user if key information is missing\n\n\
             Return JSON:\n\
             {{\"action\": \"handle\" | \"delegate\" | \"parallel\" | \"ask_clarification\",\n\
               \"delegated_to\": \"agent-type\" (if delegating),\n\
               \"subtasks\": [{{\"description\": \"...\", \"assigned_to\": \"agent-type\"}}] (if parallel),\n\
               \"reason\": \"...\", \"confidence\": 0.0-1.0}}",
            context.priority.as_deref().unwrap_or("medium"),
            context.due_date.as_deref().unwrap_or("Not specified"),
            context.user_feedback.as_deref().unwrap_or("None"),
        );

        let max_retries = self.config.delegation.decision_max_retries;
        let mut last_error = String::new();
        for attempt in 0..max_retries {
            let prompt = if attempt == 0 {
                base_prompt.clone()
            } else {
                // Tightened prompt after a validation failure.
                format!(
                    "{base_prompt}\n\nYour previous response was invalid: {last_error}.\n\
                     Respond with ONLY the JSON object, no prose."
                )
            };

            let reply = self
                .invoker
                .invoke(
                    customer_id,
                    agent_type,
                    &prompt,
                    Some(format!("delegation-{customer_id}").as_str()),
                )
                .await;

            match reply {
                Ok(AgentReply { message, .. }) => {
                    match parse_decision(&message, available_agents) {
                        Ok(decision) => {
                            tracing::info!(
                                agent_type,
                                action = decision.action.as_str(),
                                confidence = decision.confidence,
                                "delegation decision"
                            );
                            return Ok(decision);
                        }
                        Err(e) => {
                            tracing::warn!(agent_type, attempt, "decision validation failed: {e}");
                            last_error = e;
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(agent_type, attempt, "decision invocation failed: {e}");
                    last_error = e.to_string();
                }
            }
        }

        Ok(DelegationDecision::fallback(format!(
            "Error in delegation analysis, defaulting to self-execution: {last_error}"
        )))
    }

    /// Draft an execution plan via the assigned agent and persist it.
    pub async fn create_task_plan(
        &self,
        task_id: Uuid,
        task_description: &str,
        agent_type: &str,
        context: &DelegationContext,
    ) -> anyhow::Result<PlanOutcome> {
        let task = self
            .tasks
            .get_task(task_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Task {task_id} not found"))?;

        let prompt = format!(
            "Please create a detailed execution plan for this task.\n\
             Task: {task_description}\n\
             Context: {}\n\n\
             Return JSON with a 'plan' object containing:\n\
             - steps: list of {{\"output_type\", \"description\"}}\n\
             - timeline: string\n\
             - resources_needed: list of strings\n\
             - initial_thought: string",
            serde_json::to_string(context).unwrap_or_default()
        );

        let reply = match self
            .invoker
            .invoke(
                task.customer_id,
                agent_type,
                &prompt,
                Some(format!("plan-{task_id}").as_str()),
            )
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(task_id = %task_id, "plan drafting failed: {e}");
                return Ok(PlanOutcome {
                    success: false,
                    plan_id: None,
                    summary: String::new(),
                    error: Some(e.to_string()),
                });
            }
        };

        let (steps, timeline, resources, summary) = parse_plan(&reply.message);
        let plan = Plan::draft(task_id, task.customer_id, steps, timeline, resources);
        self.tasks.insert_plan(&plan).await?;

        self.tasks
            .update_task(
                task_id,
                TaskUpdate::default()
                    .with_phase(crate::domain::models::TaskPhase::Planning)
                    .with_metadata("latest_plan_id", json!(plan.id))
                    .with_progress(format!("Drafted execution plan: {summary}")),
            )
            .await?;

        self.tasks
            .append_comment(&Comment::new(
                task_id,
                task.customer_id,
                AuthorType::System,
                format!("Drafted execution plan: {summary}"),
            ))
            .await?;

        Ok(PlanOutcome {
            success: true,
            plan_id: Some(plan.id),
            summary,
            error: None,
        })
    }

    /// Invoke an agent through the gateway. Errors propagate so the engine's
    /// retry policy can classify them.
    pub async fn invoke_agent(
        &self,
        customer_id: Uuid,
        agent_type: &str,
        message: &str,
        session_id: Option<String>,
    ) -> anyhow::Result<AgentReply> {
        Ok(self
            .invoker
            .invoke(customer_id, agent_type, message, session_id.as_deref())
            .await?)
    }

    /// Circuit-breaker gate before a child delegation spawn. Returns the
    /// rejection reason, if any; rejections are never retried.
    pub async fn check_delegation_allowed(
        &self,
        workflow_id: &str,
        customer_id: Uuid,
        agent_type: &str,
        depth: u32,
    ) -> anyhow::Result<Option<String>> {
        match self
            .breaker
            .check_and_record(workflow_id, customer_id, agent_type, depth)
            .await
        {
            Ok(()) => Ok(None),
            Err(rejection) => {
                tracing::warn!(workflow_id, agent_type, depth, "delegation rejected: {rejection}");
                Ok(Some(rejection.to_string()))
            }
        }
    }
}

/// Keyword fallback when the orchestrator agent is unavailable.
pub fn keyword_route(task_description: &str, bootstrap_agent: &str) -> String {
    let description = task_description.to_lowercase();
    if ["code", "deploy", "server", "bug", "fix"]
        .iter()
        .any(|k| description.contains(k))
    {
        return "devops-manager".to_string();
    }
    if ["post", "write", "blog", "social"]
        .iter()
        .any(|k| description.contains(k))
    {
        return "marketing-manager".to_string();
    }
    bootstrap_agent.to_string()
}

/// Pull a JSON object out of an agent reply: fenced block first, then raw
/// parse, then outermost brace slice.
pub fn extract_json_block(content: &str) -> Option<Value> {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| Regex::new(r"(?s)```json\s*(\{.*?\})\s*```").unwrap());

    if let Some(captures) = fence.captures(content) {
        if let Ok(value) = serde_json::from_str(&captures[1]) {
            return Some(value);
        }
    }
    if let Ok(value) = serde_json::from_str::<Value>(content.trim()) {
        if value.is_object() {
            return Some(value);
        }
    }
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end > start {
        serde_json::from_str(&content[start..=end]).ok()
    } else {
        None
    }
}

/// Parse and validate a delegation decision from agent output.
fn parse_decision(
    content: &str,
    available_agents: &[HiredAgent],
) -> Result<DelegationDecision, String> {
    let data = extract_json_block(content).ok_or("no JSON object found in response")?;
    // Accept both a flat object and the nested {"decision": {...}} shape.
    let decision = data.get("decision").cloned().unwrap_or(data.clone());

    let action_str = decision
        .get("action")
        .and_then(Value::as_str)
        .ok_or("missing 'action' field")?;
    let action =
        DelegationAction::from_str(action_str).ok_or_else(|| format!("unknown action '{action_str}'"))?;

    let delegated_to = decision
        .get("delegated_to")
        .and_then(Value::as_str)
        .map(str::to_owned);
    if action == DelegationAction::Delegate {
        match &delegated_to {
            None => return Err("action is 'delegate' but 'delegated_to' is missing".to_string()),
            Some(target) if !available_agents.iter().any(|a| &a.agent_type == target) => {
                return Err(format!("'{target}' is not an available team member"));
            }
            _ => {}
        }
    }

    let subtasks: Option<Vec<crate::domain::models::SubtaskSpec>> = decision
        .get("subtasks")
        .filter(|v| !v.is_null())
        .map(|v| serde_json::from_value(v.clone()))
        .transpose()
        .map_err(|e| format!("invalid subtasks: {e}"))?;
    if action == DelegationAction::Parallel
        && subtasks.as_ref().map_or(true, |list| list.is_empty())
    {
        return Err("action is 'parallel' but 'subtasks' is empty".to_string());
    }

    let reason = decision
        .get("reason")
        .and_then(Value::as_str)
        .or_else(|| data.get("thought_process").and_then(Value::as_str))
        .unwrap_or("Agent decision")
        .to_string();
    let confidence = decision
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(0.5);

    Ok(DelegationDecision {
        action,
        delegated_to,
        subtasks,
        reason,
        confidence,
        method: DecisionMethod::Gateway,
    }
    .normalized())
}

/// Parse a drafted plan, falling back to a single-step plan built from the
/// raw content when the response is not valid JSON.
fn parse_plan(content: &str) -> (Vec<PlanStep>, String, Vec<String>, String) {
    let parsed = extract_json_block(content).map(|data| {
        data.get("plan").cloned().unwrap_or(data)
    });

    match parsed {
        Some(plan) => {
            let steps: Vec<PlanStep> = plan
                .get("steps")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default();
            let steps = if steps.is_empty() {
                vec![PlanStep {
                    output_type: "text".to_string(),
                    description: "Execute task based on user request".to_string(),
                }]
            } else {
                steps
            };
            let timeline = plan
                .get("timeline")
                .and_then(Value::as_str)
                .unwrap_or("1 hour")
                .to_string();
            let resources: Vec<String> = plan
                .get("resources_needed")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default();
            let summary = plan
                .get("initial_thought")
                .and_then(Value::as_str)
                .unwrap_or("Plan ready for review")
                .to_string();
            (steps, timeline, resources, summary)
        }
        None => (
            vec![PlanStep {
                output_type: "text".to_string(),
                description: "Execute task based on user request".to_string(),
            }],
            "unknown".to_string(),
            Vec::new(),
            content.chars().take(200).collect(),
        ),
    }
}

/// Pick the escalation order over hired agents: manager → senior → junior,
/// excluding already-failed VEs.
pub fn build_escalation_chain(agents: &[HiredAgent], failed: &[Uuid]) -> Vec<HiredAgent> {
    let mut chain: Vec<HiredAgent> = agents
        .iter()
        .filter(|a| !failed.contains(&a.id))
        .cloned()
        .collect();
    chain.sort_by(|a, b| b.seniority.cmp(&a.seniority));
    chain
}

/// Highest-seniority manager, if any.
pub fn find_manager(agents: &[HiredAgent]) -> Option<&HiredAgent> {
    agents
        .iter()
        .find(|a| a.seniority == SeniorityTier::Manager)
}
