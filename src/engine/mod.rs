//! Durable workflow engine.
//!
//! A process-local engine with Temporal-shaped semantics: deterministic
//! workflow futures, journaled activities with timeout and retry, signals
//! mutating workflow-local state, read-only queries over status snapshots,
//! child workflows, idempotent starts, and history replay across restarts.

pub mod ctx;
pub mod runner;
pub mod signals;

pub use ctx::{ActivityOptions, WorkflowCtx};
pub use runner::{StartOutcome, WorkflowRunner};
pub use signals::{Signal, SignalState};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_test_pool, run_migrations, SqliteHistoryStore};
    use crate::domain::error::WorkflowError;
    use futures::FutureExt;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    async fn runner() -> (WorkflowRunner, Arc<SqliteHistoryStore>) {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let store = Arc::new(SqliteHistoryStore::new(pool));
        (WorkflowRunner::new(store.clone(), "task-routing"), store)
    }

    #[tokio::test]
    async fn activity_results_are_journaled_and_replayed() {
        let (runner, _) = runner().await;
        let calls = Arc::new(AtomicU32::new(0));

        let calls_a = calls.clone();
        runner
            .start("wf-journal", Value::Null, move |ctx| {
                async move {
                    let value: u32 = ctx
                        .activity("count", ActivityOptions::default(), || {
                            let calls = calls_a.clone();
                            async move { Ok(calls.fetch_add(1, Ordering::SeqCst) + 1) }
                        })
                        .await?;
                    Ok(json!({ "value": value }))
                }
                .boxed()
            })
            .await
            .unwrap();

        let first = runner.await_result("wf-journal").await.unwrap();
        assert_eq!(first["value"], 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Second start with the same id joins the closed run; the activity
        // does not execute again.
        let outcome = runner
            .start("wf-journal", Value::Null, move |_ctx| {
                async move { Ok(json!({})) }.boxed()
            })
            .await
            .unwrap();
        assert!(matches!(outcome, StartOutcome::AlreadyClosed(Some(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn replay_from_history_skips_executed_activities() {
        let (_, store) = runner().await;

        // First incarnation records one activity then "crashes".
        let runner1 = WorkflowRunner::new(store.clone(), "task-routing");
        let calls = Arc::new(AtomicU32::new(0));
        let calls_1 = calls.clone();
        runner1
            .start("wf-crash", Value::Null, move |ctx| {
                async move {
                    let _: u32 = ctx
                        .activity("step-one", ActivityOptions::default(), || {
                            let calls = calls_1.clone();
                            async move { Ok(calls.fetch_add(1, Ordering::SeqCst) + 1) }
                        })
                        .await?;
                    // Block forever: simulates a crash before completion.
                    ctx.wait_until(|s| s.cancelled).await;
                    Err(WorkflowError::Cancelled("wf-crash".to_string()))
                }
                .boxed()
            })
            .await
            .unwrap();
        // Give the first incarnation time to record step-one.
        tokio::time::sleep(Duration::from_millis(100)).await;
        runner1.terminate("wf-crash").await.unwrap();

        // Reopen the run so the new incarnation can resume it.
        sqlx_reopen(&store, "wf-crash").await;

        let runner2 = WorkflowRunner::new(store.clone(), "task-routing");
        let calls_2 = calls.clone();
        runner2
            .start("wf-crash", Value::Null, move |ctx| {
                async move {
                    let value: u32 = ctx
                        .activity("step-one", ActivityOptions::default(), || {
                            let calls = calls_2.clone();
                            async move { Ok(calls.fetch_add(1, Ordering::SeqCst) + 100) }
                        })
                        .await?;
                    Ok(json!({ "value": value }))
                }
                .boxed()
            })
            .await
            .unwrap();

        let result = runner2.await_result("wf-crash").await.unwrap();
        // The replayed value is the original, not a re-execution.
        assert_eq!(result["value"], 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// Emulate a crash: a crashed process leaves the run row 'running' with
    /// no live handle, which is the state recovery resumes from.
    async fn sqlx_reopen(store: &Arc<SqliteHistoryStore>, workflow_id: &str) {
        sqlx::query(
            "UPDATE workflow_runs SET status = 'running', closed_at = NULL, result = NULL WHERE workflow_id = ?",
        )
        .bind(workflow_id)
        .execute(store.pool())
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn activity_retries_then_fails() {
        let (runner, _) = runner().await;
        let calls = Arc::new(AtomicU32::new(0));
        let calls_a = calls.clone();

        runner
            .start("wf-retry", Value::Null, move |ctx| {
                async move {
                    let options = ActivityOptions {
                        start_to_close: Duration::from_secs(5),
                        max_attempts: 3,
                        initial_backoff: Duration::from_millis(1),
                    };
                    let result: Result<u32, _> = ctx
                        .activity("flaky", options, || {
                            let calls = calls_a.clone();
                            async move {
                                calls.fetch_add(1, Ordering::SeqCst);
                                anyhow::bail!("transient")
                            }
                        })
                        .await;
                    match result {
                        Ok(_) => Ok(json!({"ok": true})),
                        Err(e) => Err(e),
                    }
                }
                .boxed()
            })
            .await
            .unwrap();

        let result = runner.await_result("wf-retry").await.unwrap();
        assert_eq!(result["status"], "failed");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn signals_unblock_wait_until() {
        let (runner, _) = runner().await;
        runner
            .start("wf-signal", Value::Null, |ctx| {
                async move {
                    let state = ctx.wait_until(|s| s.plan_approved || s.cancelled).await;
                    Ok(json!({ "approved": state.plan_approved }))
                }
                .boxed()
            })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        runner.signal("wf-signal", Signal::ApprovePlan).await.unwrap();

        let result = runner.await_result("wf-signal").await.unwrap();
        assert_eq!(result["approved"], true);
    }

    #[tokio::test]
    async fn child_workflow_result_flows_to_parent() {
        let (runner, _) = runner().await;
        runner
            .start("wf-parent", Value::Null, |ctx| {
                async move {
                    let child: u32 = ctx
                        .child("wf-parent-child", |child_ctx| {
                            async move {
                                child_ctx
                                    .activity("child-work", ActivityOptions::default(), || async {
                                        Ok(41u32)
                                    })
                                    .await
                                    .map(|v: u32| v + 1)
                            }
                            .boxed()
                        })
                        .await?;
                    Ok(json!({ "child": child }))
                }
                .boxed()
            })
            .await
            .unwrap();

        let result = runner.await_result("wf-parent").await.unwrap();
        assert_eq!(result["child"], 42);
    }

    #[tokio::test]
    async fn terminate_closes_the_run() {
        let (runner, store) = runner().await;
        runner
            .start("wf-stuck", Value::Null, |ctx| {
                async move {
                    ctx.wait_until(|s| s.cancelled).await;
                    Ok(Value::Null)
                }
                .boxed()
            })
            .await
            .unwrap();

        assert!(runner.terminate("wf-stuck").await.unwrap());
        use crate::domain::ports::HistoryStore;
        let run = store.get_run("wf-stuck").await.unwrap().unwrap();
        assert!(run.status.is_closed());

        // Unknown ids are tolerated.
        assert!(!runner.terminate("wf-ghost").await.unwrap());
    }
}
