//! Direct assignment and escalation-chain behavior.

mod common;

use common::harness;
use veplane::domain::error::GatewayError;
use veplane::domain::models::{EscalationAttempt, TaskStatus};
use veplane::domain::models::Task;
use veplane::workflows::direct_assignment_workflow_id;

fn gateway_down() -> GatewayError {
    GatewayError::Status {
        status: 503,
        message: "agent timeout".into(),
    }
}

#[tokio::test]
async fn successful_first_attempt_does_not_escalate() {
    let h = harness().await;
    let team = h.seed_team().await;
    let writer = &team["content-writer"];

    let task = Task::new(h.customer, "Summarize the campaign results");
    h.tasks.insert_task(&task).await.unwrap();

    h.invoker
        .script("content-writer", "execute", Ok("Summary attached."))
        .await;

    assert!(
        h.router
            .assign(h.customer, task.id, writer.id, "Summarize the campaign results")
            .await
    );

    let result = h
        .runner
        .await_result(&direct_assignment_workflow_id(task.id))
        .await
        .unwrap();
    assert_eq!(result["status"], "routed");
    assert_eq!(result["escalation_attempts"], 0);
    assert_eq!(result["final_assigned_ve_id"], serde_json::json!(writer.id));

    let task = h.tasks.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.assigned_to, Some(writer.id));
}

#[tokio::test]
async fn failure_escalates_to_the_most_senior_remaining_ve() {
    let h = harness().await;
    let team = h.seed_team().await;
    let writer = &team["content-writer"];

    let task = Task::new(h.customer, "Ship the newsletter");
    h.tasks.insert_task(&task).await.unwrap();

    // First attempt (the chosen junior) fails; the chain picks a manager next.
    h.invoker
        .script("content-writer", "execute", Err(gateway_down()))
        .await;
    h.invoker
        .script("marketing-manager", "execute", Ok("Newsletter shipped."))
        .await;
    h.invoker
        .script("devops-manager", "execute", Ok("Newsletter shipped."))
        .await;

    h.router
        .assign(h.customer, task.id, writer.id, "Ship the newsletter")
        .await;

    let result = h
        .runner
        .await_result(&direct_assignment_workflow_id(task.id))
        .await
        .unwrap();
    assert_eq!(result["status"], "routed");
    assert_eq!(result["escalation_attempts"], 1);

    let log: Vec<EscalationAttempt> =
        serde_json::from_value(result["escalation_log"].clone()).unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].status, "failed");
    assert_eq!(log[0].ve_id, writer.id);
    assert_eq!(log[1].status, "succeeded");
    // The second attempt went to a manager-tier VE.
    let managers = [team["marketing-manager"].id, team["devops-manager"].id];
    assert!(managers.contains(&log[1].ve_id));
}

#[tokio::test]
async fn exhausted_escalation_fails_the_task_with_a_full_log() {
    let h = harness().await;
    let team = h.seed_team().await;
    let writer = &team["content-writer"];

    let task = Task::new(h.customer, "Impossible request");
    h.tasks.insert_task(&task).await.unwrap();

    // Every VE the chain can reach fails.
    for agent in ["content-writer", "marketing-manager", "devops-manager", "seo-specialist"] {
        h.invoker.script(agent, "execute", Err(gateway_down())).await;
    }

    h.router
        .assign(h.customer, task.id, writer.id, "Impossible request")
        .await;

    let result = h
        .runner
        .await_result(&direct_assignment_workflow_id(task.id))
        .await
        .unwrap();
    assert_eq!(result["status"], "failed");

    let task = h.tasks.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.metadata_str("failure_reason").is_some());

    let log: Vec<EscalationAttempt> =
        serde_json::from_value(task.metadata["escalation_log"].clone()).unwrap();
    assert_eq!(log.len(), 3);
    assert!(log.iter().all(|entry| entry.status == "failed"));

    // Every attempt targeted a distinct VE.
    let mut ids: Vec<_> = log.iter().map(|entry| entry.ve_id).collect();
    ids.dedup();
    assert_eq!(ids.len(), 3);
}

#[tokio::test]
async fn assigning_an_unhired_ve_fails_cleanly() {
    let h = harness().await;
    h.seed_team().await;

    let task = Task::new(h.customer, "Orphan assignment");
    h.tasks.insert_task(&task).await.unwrap();

    h.router
        .assign(h.customer, task.id, uuid::Uuid::new_v4(), "Orphan assignment")
        .await;

    let result = h
        .runner
        .await_result(&direct_assignment_workflow_id(task.id))
        .await
        .unwrap();
    assert_eq!(result["status"], "failed");
    assert_eq!(result["escalation_attempts"], 0);

    let task = h.tasks.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
}
