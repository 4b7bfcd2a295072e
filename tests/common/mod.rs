//! Shared fixtures for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, BoxStream};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use veplane::adapters::publisher::TracingPublisher;
use veplane::adapters::sqlite::{create_test_pool, run_migrations, SqliteHistoryStore, SqliteTaskStore};
use veplane::domain::error::GatewayError;
use veplane::domain::models::{Config, HiredAgent, MarketplaceAgent, SeniorityTier};
use veplane::domain::ports::{AgentInvoker, AgentReply, StreamEvent, TaskStore};
use veplane::engine::WorkflowRunner;
use veplane::services::circuit_breaker::DelegationCircuitBreaker;
use veplane::services::task_router::TaskRouter;
use veplane::workflows::Activities;

/// What kind of prompt an invocation carries, inferred from its content.
pub fn prompt_kind(message: &str) -> &'static str {
    if message.contains("determine the best routing") {
        "routing"
    } else if message.contains("execution plan") {
        "plan"
    } else if message.contains("delegation strategy") {
        "decide"
    } else {
        "execute"
    }
}

/// Scripted gateway stand-in. Replies are queued per `(agent_type, kind)`;
/// unscripted invocations succeed with a generic reply.
pub struct FakeInvoker {
    scripts: Mutex<HashMap<String, VecDeque<Result<String, GatewayError>>>>,
    pub calls: Mutex<Vec<(String, String)>>,
}

impl FakeInvoker {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub async fn script(&self, agent_type: &str, kind: &str, reply: Result<&str, GatewayError>) {
        let mut scripts = self.scripts.lock().await;
        scripts
            .entry(format!("{agent_type}:{kind}"))
            .or_default()
            .push_back(reply.map(str::to_owned));
    }

    /// Count recorded calls of one kind for one agent.
    pub async fn call_count(&self, agent_type: &str, kind: &str) -> usize {
        let calls = self.calls.lock().await;
        calls
            .iter()
            .filter(|(agent, message)| agent == agent_type && prompt_kind(message) == kind)
            .count()
    }

    /// Find a recorded call whose message contains the needle.
    pub async fn saw_message_containing(&self, needle: &str) -> bool {
        let calls = self.calls.lock().await;
        calls.iter().any(|(_, message)| message.contains(needle))
    }
}

#[async_trait]
impl AgentInvoker for FakeInvoker {
    async fn invoke(
        &self,
        _customer_id: Uuid,
        agent_type: &str,
        message: &str,
        _session_id: Option<&str>,
    ) -> Result<AgentReply, GatewayError> {
        let kind = prompt_kind(message);
        self.calls
            .lock()
            .await
            .push((agent_type.to_string(), message.to_string()));

        let scripted = {
            let mut scripts = self.scripts.lock().await;
            scripts
                .get_mut(&format!("{agent_type}:{kind}"))
                .and_then(VecDeque::pop_front)
        };
        match scripted {
            Some(Ok(message)) => Ok(AgentReply {
                message,
                blocked: false,
            }),
            Some(Err(e)) => Err(e),
            None => Ok(AgentReply {
                message: "Done.".to_string(),
                blocked: false,
            }),
        }
    }

    async fn invoke_stream(
        &self,
        customer_id: Uuid,
        agent_type: &str,
        message: &str,
        session_id: Option<&str>,
    ) -> BoxStream<'static, StreamEvent> {
        let event = match self.invoke(customer_id, agent_type, message, session_id).await {
            Ok(reply) => StreamEvent::Message(reply.message),
            Err(e) => StreamEvent::Error(e.to_string()),
        };
        Box::pin(stream::iter(vec![event]))
    }
}

/// A fully wired orchestration plane over an in-memory database.
pub struct Harness {
    pub tasks: Arc<dyn TaskStore>,
    pub runner: WorkflowRunner,
    pub router: TaskRouter,
    pub invoker: Arc<FakeInvoker>,
    pub customer: Uuid,
    pub config: Config,
}

pub async fn harness() -> Harness {
    harness_with_config(Config::default()).await
}

pub async fn harness_with_config(config: Config) -> Harness {
    let pool = create_test_pool().await.expect("test pool");
    run_migrations(&pool).await.expect("migrations");

    let tasks: Arc<dyn TaskStore> = Arc::new(SqliteTaskStore::new(pool.clone()));
    let history = Arc::new(SqliteHistoryStore::new(pool));
    let invoker = Arc::new(FakeInvoker::new());
    let breaker = Arc::new(DelegationCircuitBreaker::new(config.delegation.clone()));

    let acts = Arc::new(Activities {
        tasks: tasks.clone(),
        invoker: invoker.clone(),
        publisher: Arc::new(TracingPublisher),
        breaker,
        config: config.clone(),
    });

    let runner = WorkflowRunner::new(history, config.engine.task_queue.clone());
    let router = TaskRouter::new(tasks.clone(), runner.clone(), acts);

    Harness {
        tasks,
        runner,
        router,
        invoker,
        customer: Uuid::new_v4(),
        config,
    }
}

impl Harness {
    /// Seed the marketplace catalog and hire a standard team.
    pub async fn seed_team(&self) -> HashMap<String, HiredAgent> {
        let catalog = [
            ("marketing-manager", "Mara", "Marketing", SeniorityTier::Manager, vec!["calendar"]),
            ("content-writer", "Casey", "Marketing", SeniorityTier::Junior, vec!["docs"]),
            ("seo-specialist", "Sage", "Marketing", SeniorityTier::Senior, vec!["analytics"]),
            ("devops-manager", "Devon", "Engineering", SeniorityTier::Manager, vec!["kubectl"]),
        ];

        let mut hired = HashMap::new();
        for (agent_type, persona, department, seniority, tools) in catalog {
            self.tasks
                .upsert_marketplace_agent(&MarketplaceAgent {
                    agent_type: agent_type.to_string(),
                    display_name: persona.to_string(),
                    department: department.to_string(),
                    seniority,
                    tools: tools.into_iter().map(str::to_owned).collect(),
                })
                .await
                .expect("seed catalog");

            let agent = HiredAgent {
                id: Uuid::new_v4(),
                customer_id: self.customer,
                agent_type: agent_type.to_string(),
                persona_name: persona.to_string(),
                status: "active".to_string(),
                created_at: Utc::now(),
                department: department.to_string(),
                seniority,
            };
            self.tasks.insert_hired_agent(&agent).await.expect("seed hire");
            hired.insert(agent_type.to_string(), agent);
        }
        hired
    }
}

/// Poll until a condition holds, or panic after the timeout.
pub async fn wait_for<F, Fut>(what: &str, timeout: Duration, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
