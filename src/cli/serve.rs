//! Worker wiring: build the service graph and run the HTTP surface.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::adapters::gateway::GatewayClient;
use crate::adapters::http::{app, AppState, EnforcementState};
use crate::adapters::policy_store::InMemoryPolicyStore;
use crate::adapters::publisher::BroadcastPublisher;
use crate::adapters::sqlite::{create_pool, run_migrations, PoolConfig, SqliteHistoryStore, SqliteTaskStore};
use crate::domain::models::config::Config;
use crate::domain::ports::{AgentInvoker, TaskStore};
use crate::engine::WorkflowRunner;
use crate::services::access_fabric::{AccessFabric, FabricSettings};
use crate::services::audit_log::AuditLog;
use crate::services::circuit_breaker::DelegationCircuitBreaker;
use crate::services::hiring::HiringService;
use crate::services::peer_discovery::PeerDiscovery;
use crate::services::task_router::TaskRouter;
use crate::workflows::Activities;

/// Everything the worker process holds.
pub struct Worker {
    pub router: TaskRouter,
    pub fabric: Arc<AccessFabric>,
    pub hiring: Arc<HiringService>,
    pub audit: Arc<AuditLog>,
    pub state: Arc<AppState>,
    pub config: Config,
}

/// Assemble the service graph from configuration.
pub async fn build_worker(config: Config) -> Result<Worker> {
    let database_url = format!("sqlite:{}", config.database.path);
    let pool = create_pool(
        &database_url,
        Some(PoolConfig {
            max_connections: config.database.max_connections,
            ..PoolConfig::default()
        }),
    )
    .await
    .context("Failed to connect to database")?;
    run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let tasks: Arc<dyn TaskStore> = Arc::new(SqliteTaskStore::new(pool.clone()));
    let history = Arc::new(SqliteHistoryStore::new(pool));

    let mut audit = AuditLog::with_defaults();
    if let Some(ref path) = config.logging.audit_file {
        audit = audit
            .with_file_sink(path)
            .context("Failed to open audit sink")?;
    }
    let audit = Arc::new(audit);

    // The declarative policy store is the cluster API in production; the
    // in-process store keeps single-node deployments and tests honest.
    let policy_store = Arc::new(InMemoryPolicyStore::new());
    let fabric = Arc::new(AccessFabric::new(
        policy_store,
        audit.clone(),
        FabricSettings {
            namespace: config.fabric.namespace.clone(),
            gateway_name: config.fabric.gateway_name.clone(),
            gateway_namespace: config.fabric.gateway_namespace.clone(),
        },
    ));

    let peers = PeerDiscovery::new(tasks.clone());
    let invoker: Arc<dyn AgentInvoker> = Arc::new(
        GatewayClient::new(&config.gateway, Some(peers))
            .context("Failed to build gateway client")?,
    );

    let publisher = Arc::new(BroadcastPublisher::default());
    let breaker = Arc::new(DelegationCircuitBreaker::new(config.delegation.clone()));

    let acts = Arc::new(Activities {
        tasks: tasks.clone(),
        invoker: invoker.clone(),
        publisher,
        breaker,
        config: config.clone(),
    });

    let runner = WorkflowRunner::new(history, config.engine.task_queue.clone());
    let router = TaskRouter::new(tasks.clone(), runner, acts);

    let state = Arc::new(AppState {
        router: router.clone(),
        tasks,
        invoker,
        enforcement: Arc::new(EnforcementState {
            audit: audit.clone(),
        }),
    });

    let hiring = Arc::new(HiringService::new(state.tasks.clone(), fabric.clone()));

    Ok(Worker {
        router,
        fabric,
        hiring,
        audit,
        state,
        config,
    })
}

/// Run the worker until shutdown.
pub async fn serve(config: Config, bind_override: Option<String>) -> Result<()> {
    let worker = build_worker(config).await?;

    let resumed = worker
        .router
        .recover()
        .await
        .context("Workflow recovery failed")?;
    if resumed > 0 {
        tracing::info!(resumed, "recovered open workflow runs");
    }

    let bind = bind_override.unwrap_or_else(|| worker.config.server.bind.clone());
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    tracing::info!(%bind, "veplane worker listening");

    axum::serve(listener, app(worker.state.clone()))
        .await
        .context("HTTP server failed")?;
    Ok(())
}
