//! End-to-end delegation scenarios over the durable engine.

mod common;

use futures::FutureExt;

use std::time::Duration;
use uuid::Uuid;

use common::{harness, wait_for};
use veplane::domain::error::GatewayError;
use veplane::domain::models::{
    AuthorType, DelegationContext, DelegationInput, PlanStatus, TaskStatus,
};
use veplane::engine::Signal;
use veplane::workflows::{delegation_workflow_id, orchestrator_workflow_id};

const DECIDE_HANDLE: &str =
    r#"{"action": "handle", "reason": "Within my expertise", "confidence": 0.9}"#;

#[tokio::test]
async fn single_tenant_happy_path() {
    let h = harness().await;
    h.seed_team().await;

    h.invoker
        .script(
            "system-orchestrator",
            "routing",
            Ok(r#"```json
{"routing_info": {"primary_agent": "marketing-manager"}, "thought_process": "marketing task"}
```"#),
        )
        .await;
    h.invoker
        .script(
            "marketing-manager",
            "plan",
            Ok(r#"{"plan": {"initial_thought": "Three pillars", "steps": [{"output_type": "text", "description": "Draft outline"}], "timeline": "2 days", "resources_needed": ["analytics"]}}"#),
        )
        .await;
    h.invoker
        .script("marketing-manager", "decide", Ok(DECIDE_HANDLE))
        .await;
    h.invoker
        .script("marketing-manager", "execute", Ok("Draft plan: three blog posts and a launch email."))
        .await;

    let receipt = h
        .router
        .route(h.customer, "Write Q1 marketing plan", None, None)
        .await
        .unwrap();
    assert_eq!(receipt.status, "pending");
    assert_eq!(receipt.workflow_id, orchestrator_workflow_id(receipt.task_id));

    // The workflow blocks on plan approval.
    wait_for("plan awaiting approval", Duration::from_secs(5), || async {
        h.tasks
            .get_task(receipt.task_id)
            .await
            .unwrap()
            .and_then(|t| t.metadata_str("last_progress_message").map(str::to_owned))
            .is_some_and(|m| m.contains("Waiting for approval"))
    })
    .await;

    h.router.approve_plan(receipt.task_id).await.unwrap();

    let result = h
        .runner
        .await_result(&receipt.workflow_id)
        .await
        .unwrap();
    assert_eq!(result["status"], "completed");
    assert_eq!(result["handled_by"], "Mara");
    assert_eq!(result["delegation_type"], "self_execution");
    assert_eq!(
        result["delegation_chain"],
        serde_json::json!(["marketing-manager"])
    );
    assert!(result["result"].as_str().unwrap().starts_with("Draft plan:"));

    let task = h.tasks.get_task(receipt.task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);

    // Plan summary + result comment at minimum.
    let comments = h.tasks.list_comments(receipt.task_id).await.unwrap();
    assert!(comments.len() >= 2);
    assert!(comments.iter().any(|c| c.author_type == AuthorType::Ve));

    // The drafted plan was approved in the store.
    let plan_id = task
        .metadata_str("latest_plan_id")
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .expect("latest_plan_id recorded");
    let plan = h.tasks.get_plan(plan_id).await.unwrap().unwrap();
    assert_eq!(plan.status, PlanStatus::Approved);
    assert!(!plan.steps.is_empty());
}

#[tokio::test]
async fn routing_falls_back_to_manager_when_orchestrator_is_down() {
    let h = harness().await;
    h.seed_team().await;

    h.invoker
        .script(
            "system-orchestrator",
            "routing",
            Err(GatewayError::Unavailable("connection refused".into())),
        )
        .await;
    // Keyword fallback lands on marketing-manager for "blog".
    h.invoker
        .script("marketing-manager", "decide", Ok(DECIDE_HANDLE))
        .await;

    let context = DelegationContext {
        plan_approved: true,
        ..DelegationContext::default()
    };
    let receipt = h
        .router
        .route(h.customer, "write a blog post about launch", Some(context), None)
        .await
        .unwrap();

    let result = h.runner.await_result(&receipt.workflow_id).await.unwrap();
    assert_eq!(result["status"], "completed");
    assert_eq!(result["delegation_chain"], serde_json::json!(["marketing-manager"]));
}

#[tokio::test]
async fn depth_guard_fails_without_invoking_agents() {
    let h = harness().await;
    h.seed_team().await;

    let task_id = Uuid::new_v4();
    let input = DelegationInput {
        customer_id: h.customer,
        task_id,
        task_description: "deep recursion".to_string(),
        current_agent_type: "marketing-manager".to_string(),
        context: DelegationContext {
            plan_approved: true,
            ..DelegationContext::default()
        },
        delegation_depth: h.config.delegation.max_depth + 1,
    };

    // Drive the delegation workflow directly at an illegal depth.
    let acts = std::sync::Arc::new(veplane::workflows::Activities {
        tasks: h.tasks.clone(),
        invoker: h.invoker.clone(),
        publisher: std::sync::Arc::new(veplane::adapters::publisher::TracingPublisher),
        breaker: std::sync::Arc::new(
            veplane::services::circuit_breaker::DelegationCircuitBreaker::new(
                h.config.delegation.clone(),
            ),
        ),
        config: h.config.clone(),
    });
    let workflow_id = delegation_workflow_id(task_id);
    h.runner
        .start(&workflow_id, serde_json::Value::Null, move |ctx| {
            let fut = veplane::workflows::delegation::run(ctx, acts, input, 0);
            async move {
                let result = fut.await?;
                Ok(serde_json::to_value(result).unwrap())
            }
            .boxed()
        })
        .await
        .unwrap();

    let result = h.runner.await_result(&workflow_id).await.unwrap();
    assert_eq!(result["status"], "failed");
    assert_eq!(result["reason"], "Maximum delegation depth exceeded");
    assert!(h.invoker.calls.lock().await.is_empty());
}

#[tokio::test]
async fn delegate_spawns_child_and_augments_result() {
    let h = harness().await;
    h.seed_team().await;

    h.invoker
        .script(
            "system-orchestrator",
            "routing",
            Ok(r#"{"routing_info": {"primary_agent": "marketing-manager"}}"#),
        )
        .await;
    h.invoker
        .script(
            "marketing-manager",
            "decide",
            Ok(r#"{"action": "delegate", "delegated_to": "content-writer", "reason": "Writer fits", "confidence": 0.85}"#),
        )
        .await;
    h.invoker
        .script("content-writer", "decide", Ok(DECIDE_HANDLE))
        .await;
    h.invoker
        .script("content-writer", "execute", Ok("Here is the copy."))
        .await;

    let context = DelegationContext {
        plan_approved: true,
        ..DelegationContext::default()
    };
    let receipt = h
        .router
        .route(h.customer, "write launch copy", Some(context), None)
        .await
        .unwrap();

    let result = h.runner.await_result(&receipt.workflow_id).await.unwrap();
    assert_eq!(result["status"], "completed");
    assert_eq!(result["handled_by"], "Casey");
    assert_eq!(result["delegated_by"], "Mara");
    assert_eq!(
        result["delegation_chain"],
        serde_json::json!(["marketing-manager", "content-writer"])
    );
}

#[tokio::test]
async fn parallel_split_with_one_failed_child_is_partial_success() {
    let h = harness().await;
    h.seed_team().await;

    h.invoker
        .script(
            "system-orchestrator",
            "routing",
            Ok(r#"{"routing_info": {"primary_agent": "marketing-manager"}}"#),
        )
        .await;
    h.invoker
        .script(
            "marketing-manager",
            "decide",
            Ok(r#"{"action": "parallel", "reason": "Split the campaign", "confidence": 0.8,
                 "subtasks": [
                    {"description": "Write the posts", "assigned_to": "content-writer"},
                    {"description": "Tune the keywords", "assigned_to": "seo-specialist"},
                    {"description": "Provision analytics", "assigned_to": "devops-manager"}
                 ]}"#),
        )
        .await;
    h.invoker
        .script("content-writer", "decide", Ok(DECIDE_HANDLE))
        .await;
    h.invoker
        .script("content-writer", "execute", Ok("Posts written."))
        .await;
    h.invoker
        .script("seo-specialist", "decide", Ok(DECIDE_HANDLE))
        .await;
    // The invoke activity retries once; both attempts fail.
    for _ in 0..2 {
        h.invoker
            .script(
                "seo-specialist",
                "execute",
                Err(GatewayError::Status {
                    status: 502,
                    message: "agent crashed".into(),
                }),
            )
            .await;
    }
    h.invoker
        .script("devops-manager", "decide", Ok(DECIDE_HANDLE))
        .await;
    h.invoker
        .script("devops-manager", "execute", Ok("Dashboards live."))
        .await;

    let context = DelegationContext {
        plan_approved: true,
        ..DelegationContext::default()
    };
    let receipt = h
        .router
        .route(h.customer, "run the campaign", Some(context), None)
        .await
        .unwrap();

    let result = h.runner.await_result(&receipt.workflow_id).await.unwrap();
    assert_eq!(result["status"], "completed");
    assert_eq!(result["delegation_type"], "parallel_execution");

    let children = result["children_results"].as_array().unwrap();
    assert_eq!(children.len(), 3);
    assert_eq!(children[0]["status"], "completed");
    assert_eq!(children[1]["status"], "failed");
    assert_eq!(children[2]["status"], "completed");

    let chain: Vec<String> =
        serde_json::from_value(result["delegation_chain"].clone()).unwrap();
    for agent in ["marketing-manager", "content-writer", "seo-specialist", "devops-manager"] {
        assert!(chain.contains(&agent.to_string()), "chain missing {agent}");
    }

    // Exactly the per-activity retry budget for the failing child.
    assert_eq!(h.invoker.call_count("seo-specialist", "execute").await, 2);
}

#[tokio::test]
async fn clarification_loop_resumes_with_feedback() {
    let h = harness().await;
    h.seed_team().await;

    h.invoker
        .script(
            "system-orchestrator",
            "routing",
            Ok(r#"{"routing_info": {"primary_agent": "marketing-manager"}}"#),
        )
        .await;
    h.invoker
        .script(
            "marketing-manager",
            "decide",
            Ok(r#"{"action": "ask_clarification", "reason": "Budget?", "confidence": 0.6}"#),
        )
        .await;
    h.invoker
        .script("marketing-manager", "decide", Ok(DECIDE_HANDLE))
        .await;
    h.invoker
        .script("marketing-manager", "execute", Ok("Campaign within $10k."))
        .await;

    let context = DelegationContext {
        plan_approved: true,
        ..DelegationContext::default()
    };
    let receipt = h
        .router
        .route(h.customer, "plan a campaign", Some(context), None)
        .await
        .unwrap();

    wait_for("task waiting for input", Duration::from_secs(5), || async {
        h.tasks
            .get_task(receipt.task_id)
            .await
            .unwrap()
            .is_some_and(|t| t.status == TaskStatus::WaitingForInput)
    })
    .await;

    let comments = h.tasks.list_comments(receipt.task_id).await.unwrap();
    assert!(comments
        .iter()
        .any(|c| c.content.contains("**QUESTION:** Budget?")));

    h.router
        .signal_task(receipt.task_id, Signal::ProvideFeedback("$10k".to_string()))
        .await
        .unwrap();

    let result = h.runner.await_result(&receipt.workflow_id).await.unwrap();
    assert_eq!(result["status"], "completed");
    // Depth did not change across the retry: chain is still one entry.
    assert_eq!(
        result["delegation_chain"],
        serde_json::json!(["marketing-manager"])
    );

    // The post-feedback decision saw the user's answer.
    assert!(h.invoker.saw_message_containing("$10k").await);
}

#[tokio::test]
async fn starting_the_same_orchestrator_twice_yields_a_single_run() {
    let h = harness().await;
    h.seed_team().await;

    h.invoker
        .script(
            "system-orchestrator",
            "routing",
            Ok(r#"{"routing_info": {"primary_agent": "marketing-manager"}}"#),
        )
        .await;
    h.invoker
        .script("marketing-manager", "decide", Ok(DECIDE_HANDLE))
        .await;

    let context = DelegationContext {
        plan_approved: true,
        ..DelegationContext::default()
    };
    let receipt = h
        .router
        .route(h.customer, "one task", Some(context.clone()), None)
        .await
        .unwrap();

    // Re-entry with the same task id joins the existing run.
    let second = h
        .router
        .route(h.customer, "one task", Some(context), Some(receipt.task_id))
        .await
        .unwrap();
    assert_eq!(second.workflow_id, receipt.workflow_id);

    h.runner.await_result(&receipt.workflow_id).await.unwrap();
    assert_eq!(h.invoker.call_count("system-orchestrator", "routing").await, 1);
}

#[tokio::test]
async fn cancel_during_planning_closes_everything() {
    let h = harness().await;
    h.seed_team().await;

    h.invoker
        .script(
            "system-orchestrator",
            "routing",
            Ok(r#"{"routing_info": {"primary_agent": "marketing-manager"}}"#),
        )
        .await;

    let receipt = h
        .router
        .route(h.customer, "soon to be cancelled", None, None)
        .await
        .unwrap();

    wait_for("plan awaiting approval", Duration::from_secs(5), || async {
        h.tasks
            .get_task(receipt.task_id)
            .await
            .unwrap()
            .and_then(|t| t.metadata_str("last_progress_message").map(str::to_owned))
            .is_some_and(|m| m.contains("Waiting for approval"))
    })
    .await;

    h.router.cancel_task(receipt.task_id).await.unwrap();

    wait_for("task cancelled", Duration::from_secs(5), || async {
        h.tasks
            .get_task(receipt.task_id)
            .await
            .unwrap()
            .is_some_and(|t| t.status == TaskStatus::Cancelled)
    })
    .await;
}

#[tokio::test]
async fn pause_blocks_the_decision_until_resume() {
    let h = harness().await;
    h.seed_team().await;

    h.invoker
        .script(
            "system-orchestrator",
            "routing",
            Ok(r#"{"routing_info": {"primary_agent": "marketing-manager"}}"#),
        )
        .await;
    h.invoker
        .script("marketing-manager", "decide", Ok(DECIDE_HANDLE))
        .await;

    let receipt = h
        .router
        .route(h.customer, "pause me", None, None)
        .await
        .unwrap();

    wait_for("plan awaiting approval", Duration::from_secs(5), || async {
        h.tasks
            .get_task(receipt.task_id)
            .await
            .unwrap()
            .and_then(|t| t.metadata_str("last_progress_message").map(str::to_owned))
            .is_some_and(|m| m.contains("Waiting for approval"))
    })
    .await;

    // Pause before approving: the workflow must not reach the decision.
    h.router
        .signal_task(receipt.task_id, Signal::PauseDelegation)
        .await
        .unwrap();
    h.router.approve_plan(receipt.task_id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.invoker.call_count("marketing-manager", "decide").await, 0);

    h.router
        .signal_task(receipt.task_id, Signal::ResumeDelegation)
        .await
        .unwrap();

    let result = h.runner.await_result(&receipt.workflow_id).await.unwrap();
    assert_eq!(result["status"], "completed");
}

#[tokio::test]
async fn no_hired_agents_fails_the_task() {
    let h = harness().await;
    // No team seeded.
    let receipt = h
        .router
        .route(h.customer, "anything", None, None)
        .await
        .unwrap();

    let result = h.runner.await_result(&receipt.workflow_id).await.unwrap();
    assert_eq!(result["status"], "failed");
    assert_eq!(result["reason"], "No VEs found");

    let task = h.tasks.get_task(receipt.task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
}

#[tokio::test]
async fn delegation_status_query_exposes_the_live_frame() {
    let h = harness().await;
    h.seed_team().await;

    h.invoker
        .script(
            "system-orchestrator",
            "routing",
            Ok(r#"{"routing_info": {"primary_agent": "marketing-manager"}}"#),
        )
        .await;

    let receipt = h
        .router
        .route(h.customer, "query me", None, None)
        .await
        .unwrap();

    wait_for("delegation frame visible", Duration::from_secs(5), || async {
        h.router.delegation_status(receipt.task_id).await.is_some()
    })
    .await;

    let status = h.router.delegation_status(receipt.task_id).await.unwrap();
    assert_eq!(status["current_agent"], "marketing-manager");
    assert_eq!(status["delegation_depth"], 0);

    h.router.cancel_task(receipt.task_id).await.unwrap();
}
