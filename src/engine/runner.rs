//! Workflow runner.
//!
//! Owns the live workflow instances of this process: idempotent start
//! against the durable run registry, signal delivery (journaled before
//! applied), read-only queries over status snapshots, termination, and
//! child-workflow execution under the parent's signal state.

use chrono::Utc;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::domain::error::WorkflowError;
use crate::domain::ports::{
    HistoryEvent, HistoryEventKind, HistoryStore, RunStatus, WorkflowRun,
};
use crate::engine::ctx::{CtxShared, WorkflowCtx};
use crate::engine::signals::{Signal, SignalState};

/// Outcome of a start request.
#[derive(Debug, Clone)]
pub enum StartOutcome {
    /// A new (or resumed) run was launched.
    Started,
    /// A live run with this id already exists; no duplicate was created.
    AlreadyRunning,
    /// The run already closed; its recorded result is returned.
    AlreadyClosed(Option<Value>),
}

struct Handle {
    shared: Arc<CtxShared>,
    result_tx: watch::Sender<Option<Value>>,
    join: Option<JoinHandle<()>>,
}

struct RunnerInner {
    store: Arc<dyn HistoryStore>,
    task_queue: String,
    handles: RwLock<HashMap<String, Handle>>,
}

/// Process-wide workflow runner.
#[derive(Clone)]
pub struct WorkflowRunner {
    inner: Arc<RunnerInner>,
}

impl WorkflowRunner {
    pub fn new(store: Arc<dyn HistoryStore>, task_queue: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                store,
                task_queue: task_queue.into(),
                handles: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Build a context for a run, pre-applying recorded signals and queueing
    /// recorded activity results for replay.
    async fn prepare_ctx(
        &self,
        workflow_id: &str,
        inherited_signals: Option<watch::Sender<SignalState>>,
    ) -> Result<(Arc<CtxShared>, u64), WorkflowError> {
        let events = self.inner.store.load_events(workflow_id).await?;
        let total = events.len() as u64;

        let mut replay = VecDeque::new();
        let mut recorded_signals = Vec::new();
        for event in events {
            match event.kind {
                HistoryEventKind::SignalReceived => {
                    if let Ok(signal) = serde_json::from_value::<Signal>(event.payload.clone()) {
                        recorded_signals.push(signal);
                    }
                }
                _ => replay.push_back(event),
            }
        }

        let signal_tx = match inherited_signals {
            Some(tx) => {
                for signal in &recorded_signals {
                    tx.send_modify(|state| state.apply(signal));
                }
                tx
            }
            None => {
                let mut state = SignalState::default();
                for signal in &recorded_signals {
                    state.apply(signal);
                }
                watch::channel(state).0
            }
        };

        let shared = Arc::new(CtxShared {
            workflow_id: workflow_id.to_string(),
            store: self.inner.store.clone(),
            replay: Mutex::new(replay),
            next_seq: Mutex::new(total),
            signal_tx,
            status: Arc::new(RwLock::new(Value::Null)),
            runner: self.clone(),
        });
        Ok((shared, total))
    }

    /// Start a workflow. Starting an id that is already running (or already
    /// closed) never creates a duplicate run.
    pub async fn start<F>(
        &self,
        workflow_id: &str,
        input: Value,
        f: F,
    ) -> Result<StartOutcome, WorkflowError>
    where
        F: FnOnce(WorkflowCtx) -> BoxFuture<'static, Result<Value, WorkflowError>>,
    {
        {
            let handles = self.inner.handles.read().await;
            if let Some(handle) = handles.get(workflow_id) {
                let closed = handle.result_tx.borrow().clone();
                return Ok(match closed {
                    Some(result) => StartOutcome::AlreadyClosed(Some(result)),
                    None => StartOutcome::AlreadyRunning,
                });
            }
        }

        let run = WorkflowRun::new(workflow_id, self.inner.task_queue.clone(), input);
        let created = self.inner.store.register_run(&run).await?;
        if !created {
            match self.inner.store.get_run(workflow_id).await? {
                Some(existing) if existing.status.is_closed() => {
                    return Ok(StartOutcome::AlreadyClosed(existing.result));
                }
                Some(_) => {
                    // Open run without a live handle: resume from history.
                    tracing::info!(workflow_id, "resuming open workflow run");
                }
                None => return Err(WorkflowError::NotFound(workflow_id.to_string())),
            }
        }

        let (shared, replayed) = self.prepare_ctx(workflow_id, None).await?;
        if replayed > 0 {
            tracing::info!(workflow_id, events = replayed, "replaying workflow history");
        }
        let ctx = WorkflowCtx {
            shared: shared.clone(),
        };
        let (result_tx, _) = watch::channel(None);

        let store = self.inner.store.clone();
        let runner = self.clone();
        let id = workflow_id.to_string();
        let tx = result_tx.clone();
        let fut = f(ctx);
        let join = tokio::spawn(async move {
            let outcome = fut.await;
            let (status, value) = match outcome {
                Ok(value) => (RunStatus::Completed, value),
                Err(WorkflowError::Cancelled(_)) => (
                    RunStatus::Cancelled,
                    serde_json::json!({ "status": "cancelled" }),
                ),
                Err(e) => {
                    tracing::error!(workflow_id = %id, "workflow failed: {e}");
                    (
                        RunStatus::Failed,
                        serde_json::json!({ "status": "failed", "reason": e.to_string() }),
                    )
                }
            };
            if let Err(e) = store.close_run(&id, status, Some(&value)).await {
                tracing::error!(workflow_id = %id, "failed to close workflow run: {e}");
            }
            let _ = tx.send(Some(value));
            runner.mark_closed(&id).await;
        });

        let mut handles = self.inner.handles.write().await;
        handles.insert(
            workflow_id.to_string(),
            Handle {
                shared,
                result_tx,
                join: Some(join),
            },
        );
        Ok(StartOutcome::Started)
    }

    async fn mark_closed(&self, workflow_id: &str) {
        let mut handles = self.inner.handles.write().await;
        if let Some(handle) = handles.get_mut(workflow_id) {
            handle.join = None;
        }
    }

    /// Deliver a signal: journal it on the target's history, then apply it
    /// to the live signal state.
    pub async fn signal(&self, workflow_id: &str, signal: Signal) -> Result<(), WorkflowError> {
        let handles = self.inner.handles.read().await;
        let handle = handles
            .get(workflow_id)
            .ok_or_else(|| WorkflowError::NotFound(workflow_id.to_string()))?;

        if handle.result_tx.borrow().is_some() {
            tracing::warn!(workflow_id, signal = signal.name(), "signal ignored: workflow closed");
            return Ok(());
        }

        let seq = {
            let mut next = handle.shared.next_seq.lock().await;
            let seq = *next;
            *next += 1;
            seq
        };
        self.inner
            .store
            .append_event(
                workflow_id,
                &HistoryEvent {
                    seq,
                    kind: HistoryEventKind::SignalReceived,
                    name: signal.name().to_string(),
                    payload: serde_json::to_value(&signal)
                        .map_err(crate::domain::error::StoreError::from)?,
                    recorded_at: Utc::now(),
                },
            )
            .await?;

        tracing::info!(workflow_id, signal = signal.name(), "signal received");
        handle.shared.signal_tx.send_modify(|state| state.apply(&signal));
        Ok(())
    }

    /// Read a workflow's status snapshot.
    pub async fn query_status(&self, workflow_id: &str) -> Option<Value> {
        let handles = self.inner.handles.read().await;
        let handle = handles.get(workflow_id)?;
        let status = handle.shared.status.read().await.clone();
        Some(status)
    }

    /// Await a workflow's terminal result.
    pub async fn await_result(&self, workflow_id: &str) -> Result<Value, WorkflowError> {
        let rx = {
            let handles = self.inner.handles.read().await;
            handles.get(workflow_id).map(|h| h.result_tx.subscribe())
        };

        if let Some(mut rx) = rx {
            loop {
                {
                    let value = rx.borrow().clone();
                    if let Some(value) = value {
                        return Ok(value);
                    }
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
        }

        match self.inner.store.get_run(workflow_id).await? {
            Some(run) if run.status.is_closed() => Ok(run.result.unwrap_or(Value::Null)),
            Some(_) => Err(WorkflowError::NotFound(format!(
                "{workflow_id} is open but has no live handle"
            ))),
            None => Err(WorkflowError::NotFound(workflow_id.to_string())),
        }
    }

    /// Terminate a run: abort its future (children die with it) and close
    /// the run row. Unknown ids return false.
    pub async fn terminate(&self, workflow_id: &str) -> Result<bool, WorkflowError> {
        let mut handles = self.inner.handles.write().await;
        let Some(handle) = handles.get_mut(workflow_id) else {
            // A run may exist without a live handle (e.g. before recovery).
            if let Some(run) = self.inner.store.get_run(workflow_id).await? {
                if !run.status.is_closed() {
                    self.inner
                        .store
                        .close_run(workflow_id, RunStatus::Terminated, None)
                        .await?;
                    return Ok(true);
                }
            }
            return Ok(false);
        };

        if let Some(join) = handle.join.take() {
            join.abort();
        }
        if handle.result_tx.borrow().is_none() {
            self.inner
                .store
                .close_run(workflow_id, RunStatus::Terminated, None)
                .await?;
            let _ = handle
                .result_tx
                .send(Some(serde_json::json!({ "status": "terminated" })));
        }
        tracing::info!(workflow_id, "workflow terminated");
        Ok(true)
    }

    /// Open runs from the durable registry, for recovery at worker startup.
    pub async fn open_runs(&self) -> Result<Vec<WorkflowRun>, WorkflowError> {
        Ok(self.inner.store.list_open_runs().await?)
    }

    /// Execute a child workflow inline under the parent's signal state.
    pub(crate) async fn run_child<T>(
        &self,
        parent: &WorkflowCtx,
        child_id: &str,
        f: impl FnOnce(WorkflowCtx) -> BoxFuture<'static, Result<T, WorkflowError>>,
    ) -> Result<T, WorkflowError>
    where
        T: Serialize + DeserializeOwned,
    {
        // A child that already closed replays from its run row.
        if let Some(run) = self.inner.store.get_run(child_id).await? {
            if run.status.is_closed() {
                return match run.status {
                    RunStatus::Completed => {
                        let value = run.result.unwrap_or(Value::Null);
                        serde_json::from_value(value)
                            .map_err(|e| crate::domain::error::StoreError::from(e).into())
                    }
                    RunStatus::Cancelled | RunStatus::Terminated => {
                        Err(WorkflowError::Cancelled(child_id.to_string()))
                    }
                    _ => Err(WorkflowError::ChildFailed {
                        workflow_id: child_id.to_string(),
                        reason: run
                            .result
                            .and_then(|v| v.get("reason").and_then(Value::as_str).map(str::to_owned))
                            .unwrap_or_else(|| "unknown".to_string()),
                    }),
                };
            }
        } else {
            let run = WorkflowRun::new(child_id, self.inner.task_queue.clone(), Value::Null);
            self.inner.store.register_run(&run).await?;
        }

        let (shared, _) = self
            .prepare_ctx(child_id, Some(parent.shared.signal_tx.clone()))
            .await?;
        let ctx = WorkflowCtx {
            shared: shared.clone(),
        };
        let (result_tx, _) = watch::channel(None);
        {
            let mut handles = self.inner.handles.write().await;
            handles.insert(
                child_id.to_string(),
                Handle {
                    shared,
                    result_tx: result_tx.clone(),
                    join: None,
                },
            );
        }

        let outcome = f(ctx).await;

        let (status, value) = match &outcome {
            Ok(value) => (
                RunStatus::Completed,
                serde_json::to_value(value).map_err(crate::domain::error::StoreError::from)?,
            ),
            Err(WorkflowError::Cancelled(_)) => (
                RunStatus::Cancelled,
                serde_json::json!({ "status": "cancelled" }),
            ),
            Err(e) => (
                RunStatus::Failed,
                serde_json::json!({ "status": "failed", "reason": e.to_string() }),
            ),
        };
        self.inner
            .store
            .close_run(child_id, status, Some(&value))
            .await?;
        let _ = result_tx.send(Some(value));
        {
            let mut handles = self.inner.handles.write().await;
            handles.remove(child_id);
        }

        outcome
    }
}
