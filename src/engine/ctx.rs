//! Workflow execution context.
//!
//! All non-determinism inside a workflow flows through this context:
//! activities (with timeout + retry, journaled on completion), deterministic
//! timestamps (journaled markers), signal-state predicates, and child
//! workflows. On replay the context feeds recorded results back instead of
//! re-executing, so a workflow future re-derives identical decisions.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};

use crate::domain::error::WorkflowError;
use crate::domain::ports::{HistoryEvent, HistoryEventKind, HistoryStore};
use crate::engine::runner::WorkflowRunner;
use crate::engine::signals::SignalState;

/// Timeout and retry policy for one activity call.
#[derive(Debug, Clone)]
pub struct ActivityOptions {
    pub start_to_close: Duration,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            start_to_close: Duration::from_secs(30),
            max_attempts: 2,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

impl ActivityOptions {
    pub fn new(start_to_close: Duration) -> Self {
        Self {
            start_to_close,
            ..Self::default()
        }
    }

    pub fn with_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

pub(crate) struct CtxShared {
    pub workflow_id: String,
    pub store: Arc<dyn HistoryStore>,
    /// Recorded activity/marker events not yet consumed by replay.
    pub replay: Mutex<VecDeque<HistoryEvent>>,
    pub next_seq: Mutex<u64>,
    pub signal_tx: watch::Sender<SignalState>,
    pub status: Arc<RwLock<Value>>,
    pub runner: WorkflowRunner,
}

/// Handle a workflow future uses to interact with the engine.
#[derive(Clone)]
pub struct WorkflowCtx {
    pub(crate) shared: Arc<CtxShared>,
}

impl WorkflowCtx {
    pub fn workflow_id(&self) -> &str {
        &self.shared.workflow_id
    }

    /// Snapshot of the current signal state.
    pub fn signal_state(&self) -> SignalState {
        self.shared.signal_tx.borrow().clone()
    }

    /// Suspend until the signal state satisfies the predicate.
    pub async fn wait_until<F>(&self, pred: F) -> SignalState
    where
        F: Fn(&SignalState) -> bool,
    {
        let mut rx = self.shared.signal_tx.subscribe();
        loop {
            {
                let state = rx.borrow().clone();
                if pred(&state) {
                    return state;
                }
            }
            if rx.changed().await.is_err() {
                return rx.borrow().clone();
            }
        }
    }

    /// Publish the queryable status snapshot for this workflow.
    pub async fn set_status(&self, status: Value) {
        *self.shared.status.write().await = status;
    }

    // `next_seq` starts past every recorded event, so replayed events keep
    // their original positions and new events append after them.
    async fn pop_replay(&self, kind: HistoryEventKind) -> Option<HistoryEvent> {
        let mut replay = self.shared.replay.lock().await;
        if replay.front().map(|e| e.kind) == Some(kind) {
            replay.pop_front()
        } else {
            None
        }
    }

    async fn record(
        &self,
        kind: HistoryEventKind,
        name: &str,
        payload: Value,
    ) -> Result<(), WorkflowError> {
        let seq = {
            let mut next = self.shared.next_seq.lock().await;
            let seq = *next;
            *next += 1;
            seq
        };
        self.shared
            .store
            .append_event(
                &self.shared.workflow_id,
                &HistoryEvent {
                    seq,
                    kind,
                    name: name.to_string(),
                    payload,
                    recorded_at: Utc::now(),
                },
            )
            .await?;
        Ok(())
    }

    /// Deterministic "now": recorded on first execution, replayed afterward.
    pub async fn now(&self) -> Result<DateTime<Utc>, WorkflowError> {
        if let Some(event) = self.pop_replay(HistoryEventKind::TimestampMarker).await {
            let ts: DateTime<Utc> = serde_json::from_value(event.payload)
                .map_err(crate::domain::error::StoreError::from)?;
            return Ok(ts);
        }
        let now = Utc::now();
        self.record(
            HistoryEventKind::TimestampMarker,
            "now",
            serde_json::to_value(now).map_err(crate::domain::error::StoreError::from)?,
        )
        .await?;
        Ok(now)
    }

    /// Execute an activity with timeout and retry, journaling its result.
    ///
    /// On replay the recorded result is returned without re-executing; a
    /// name mismatch against the journal is a history divergence.
    pub async fn activity<T, F, Fut>(
        &self,
        name: &str,
        options: ActivityOptions,
        mut f: F,
    ) -> Result<T, WorkflowError>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        if let Some(event) = self.pop_replay(HistoryEventKind::ActivityCompleted).await {
            if event.name != name {
                return Err(WorkflowError::HistoryDivergence {
                    workflow_id: self.shared.workflow_id.clone(),
                    seq: event.seq,
                    expected: name.to_string(),
                    recorded: event.name,
                });
            }
            tracing::debug!(workflow_id = %self.shared.workflow_id, activity = name, "replaying activity result");
            let value: T = serde_json::from_value(event.payload)
                .map_err(crate::domain::error::StoreError::from)?;
            return Ok(value);
        }

        let mut backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(options.initial_backoff)
            .with_max_elapsed_time(None)
            .build();

        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = tokio::time::timeout(options.start_to_close, f()).await;
            match outcome {
                Ok(Ok(value)) => {
                    let payload = serde_json::to_value(&value)
                        .map_err(crate::domain::error::StoreError::from)?;
                    self.record(HistoryEventKind::ActivityCompleted, name, payload)
                        .await?;
                    return Ok(value);
                }
                Ok(Err(e)) => {
                    tracing::warn!(
                        workflow_id = %self.shared.workflow_id,
                        activity = name,
                        attempt,
                        "activity attempt failed: {e:#}"
                    );
                    if attempt >= options.max_attempts {
                        return Err(WorkflowError::ActivityFailed {
                            name: name.to_string(),
                            attempts: attempt,
                            source: e,
                        });
                    }
                }
                Err(_) => {
                    tracing::warn!(
                        workflow_id = %self.shared.workflow_id,
                        activity = name,
                        attempt,
                        "activity attempt timed out after {:?}",
                        options.start_to_close
                    );
                    if attempt >= options.max_attempts {
                        return Err(WorkflowError::ActivityFailed {
                            name: name.to_string(),
                            attempts: attempt,
                            source: anyhow::anyhow!(
                                "start_to_close timeout ({:?}) exceeded",
                                options.start_to_close
                            ),
                        });
                    }
                }
            }
            let delay = backoff
                .next_backoff()
                .unwrap_or(options.initial_backoff);
            tokio::time::sleep(delay).await;
        }
    }

    /// Run a child workflow under its own id and history, sharing this
    /// workflow's signal state (so cancellation and pause propagate), and
    /// await its result.
    pub async fn child<T>(
        &self,
        child_id: &str,
        f: impl FnOnce(WorkflowCtx) -> BoxFuture<'static, Result<T, WorkflowError>>,
    ) -> Result<T, WorkflowError>
    where
        T: Serialize + DeserializeOwned,
    {
        self.shared.runner.run_child(self, child_id, f).await
    }
}
