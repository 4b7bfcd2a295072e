//! Embedded schema migrations.

use sqlx::SqlitePool;

use crate::domain::error::StoreError;

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "001_task_plane",
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            customer_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            assigned_to TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            phase TEXT NOT NULL DEFAULT 'routing',
            priority TEXT NOT NULL DEFAULT 'normal',
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            completed_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_tasks_customer ON tasks(customer_id);
        CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);

        CREATE TABLE IF NOT EXISTS task_comments (
            id TEXT PRIMARY KEY,
            task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
            customer_id TEXT NOT NULL,
            author_type TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_comments_task ON task_comments(task_id);

        CREATE TABLE IF NOT EXISTS task_plans (
            id TEXT PRIMARY KEY,
            task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
            customer_id TEXT NOT NULL,
            steps TEXT NOT NULL DEFAULT '[]',
            timeline TEXT NOT NULL DEFAULT '',
            resources TEXT NOT NULL DEFAULT '[]',
            status TEXT NOT NULL DEFAULT 'draft',
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_plans_task ON task_plans(task_id);
        "#,
    ),
    (
        "002_agents",
        r#"
        CREATE TABLE IF NOT EXISTS marketplace_agents (
            agent_type TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            department TEXT NOT NULL,
            seniority TEXT NOT NULL,
            tools TEXT NOT NULL DEFAULT '[]'
        );

        CREATE TABLE IF NOT EXISTS hired_agents (
            id TEXT PRIMARY KEY,
            customer_id TEXT NOT NULL,
            agent_type TEXT NOT NULL REFERENCES marketplace_agents(agent_type),
            persona_name TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            created_at TEXT NOT NULL,
            UNIQUE(customer_id, agent_type)
        );
        CREATE INDEX IF NOT EXISTS idx_hired_customer ON hired_agents(customer_id);
        "#,
    ),
    (
        "003_workflow_engine",
        r#"
        CREATE TABLE IF NOT EXISTS workflow_runs (
            workflow_id TEXT PRIMARY KEY,
            task_queue TEXT NOT NULL,
            input TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'running',
            started_at TEXT NOT NULL,
            closed_at TEXT,
            result TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_runs_status ON workflow_runs(status);

        CREATE TABLE IF NOT EXISTS workflow_events (
            workflow_id TEXT NOT NULL REFERENCES workflow_runs(workflow_id) ON DELETE CASCADE,
            seq INTEGER NOT NULL,
            kind TEXT NOT NULL,
            name TEXT NOT NULL DEFAULT '',
            payload TEXT NOT NULL DEFAULT 'null',
            recorded_at TEXT NOT NULL,
            PRIMARY KEY (workflow_id, seq)
        );
        "#,
    ),
];

/// Apply all pending migrations.
pub async fn run_migrations(pool: &SqlitePool) -> Result<usize, StoreError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .execute(pool)
    .await?;

    let mut applied = 0;
    for (name, sql) in MIGRATIONS {
        let exists: Option<(String,)> =
            sqlx::query_as("SELECT name FROM schema_migrations WHERE name = ?")
                .bind(name)
                .fetch_optional(pool)
                .await?;
        if exists.is_some() {
            continue;
        }

        let mut tx = pool.begin().await?;
        for statement in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::Migration(format!("{name}: {e}")))?;
        }
        sqlx::query("INSERT INTO schema_migrations (name) VALUES (?)")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(migration = name, "applied migration");
        applied += 1;
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::connection::create_test_pool;

    #[tokio::test]
    async fn migrations_apply_once() {
        let pool = create_test_pool().await.unwrap();
        let first = run_migrations(&pool).await.unwrap();
        assert_eq!(first, MIGRATIONS.len());
        let second = run_migrations(&pool).await.unwrap();
        assert_eq!(second, 0);
    }
}
