//! SQLite implementation of the task store port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::domain::error::StoreError;
use crate::domain::models::{
    AuthorType, Comment, HiredAgent, MarketplaceAgent, Plan, PlanStatus, PlanStep, SeniorityTier,
    Task, TaskPhase, TaskPriority, TaskStatus,
};
use crate::domain::ports::{TaskStore, TaskUpdate};

#[derive(Clone)]
pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct TaskRow {
    id: String,
    customer_id: String,
    title: String,
    description: String,
    assigned_to: Option<String>,
    status: String,
    phase: String,
    priority: String,
    metadata: String,
    created_at: String,
    updated_at: String,
    completed_at: Option<String>,
}

impl TryFrom<TaskRow> for Task {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        Ok(Task {
            id: Uuid::parse_str(&row.id)?,
            customer_id: Uuid::parse_str(&row.customer_id)?,
            title: row.title,
            description: row.description,
            assigned_to: row.assigned_to.as_deref().map(Uuid::parse_str).transpose()?,
            status: TaskStatus::from_str(&row.status)
                .ok_or_else(|| StoreError::ConstraintViolation(format!("bad status {}", row.status)))?,
            phase: TaskPhase::from_str(&row.phase)
                .ok_or_else(|| StoreError::ConstraintViolation(format!("bad phase {}", row.phase)))?,
            priority: TaskPriority::from_str(&row.priority)
                .ok_or_else(|| StoreError::ConstraintViolation(format!("bad priority {}", row.priority)))?,
            metadata: serde_json::from_str(&row.metadata)?,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
            completed_at: row.completed_at.as_deref().map(parse_ts).transpose()?,
        })
    }
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, StoreError> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

#[derive(FromRow)]
struct CommentRow {
    id: String,
    task_id: String,
    customer_id: String,
    author_type: String,
    content: String,
    created_at: String,
}

impl TryFrom<CommentRow> for Comment {
    type Error = StoreError;

    fn try_from(row: CommentRow) -> Result<Self, Self::Error> {
        Ok(Comment {
            id: Uuid::parse_str(&row.id)?,
            task_id: Uuid::parse_str(&row.task_id)?,
            customer_id: Uuid::parse_str(&row.customer_id)?,
            author_type: AuthorType::from_str(&row.author_type).ok_or_else(|| {
                StoreError::ConstraintViolation(format!("bad author_type {}", row.author_type))
            })?,
            content: row.content,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}

#[derive(FromRow)]
struct PlanRow {
    id: String,
    task_id: String,
    customer_id: String,
    steps: String,
    timeline: String,
    resources: String,
    status: String,
    created_at: String,
}

impl TryFrom<PlanRow> for Plan {
    type Error = StoreError;

    fn try_from(row: PlanRow) -> Result<Self, Self::Error> {
        let steps: Vec<PlanStep> = serde_json::from_str(&row.steps)?;
        Ok(Plan {
            id: Uuid::parse_str(&row.id)?,
            task_id: Uuid::parse_str(&row.task_id)?,
            customer_id: Uuid::parse_str(&row.customer_id)?,
            steps,
            timeline: row.timeline,
            resources: serde_json::from_str(&row.resources)?,
            status: PlanStatus::from_str(&row.status).ok_or_else(|| {
                StoreError::ConstraintViolation(format!("bad plan status {}", row.status))
            })?,
            created_at: parse_ts(&row.created_at)?,
        })
    }
}

#[derive(FromRow)]
struct HiredAgentRow {
    id: String,
    customer_id: String,
    agent_type: String,
    persona_name: String,
    status: String,
    created_at: String,
    department: String,
    seniority: String,
}

impl TryFrom<HiredAgentRow> for HiredAgent {
    type Error = StoreError;

    fn try_from(row: HiredAgentRow) -> Result<Self, Self::Error> {
        Ok(HiredAgent {
            id: Uuid::parse_str(&row.id)?,
            customer_id: Uuid::parse_str(&row.customer_id)?,
            agent_type: row.agent_type,
            persona_name: row.persona_name,
            status: row.status,
            created_at: parse_ts(&row.created_at)?,
            department: row.department,
            seniority: SeniorityTier::from_str(&row.seniority).ok_or_else(|| {
                StoreError::ConstraintViolation(format!("bad seniority {}", row.seniority))
            })?,
        })
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn insert_task(&self, task: &Task) -> Result<(), StoreError> {
        let metadata_json = serde_json::to_string(&task.metadata)?;
        sqlx::query(
            r#"INSERT INTO tasks (id, customer_id, title, description, assigned_to, status,
               phase, priority, metadata, created_at, updated_at, completed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(task.id.to_string())
        .bind(task.customer_id.to_string())
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.assigned_to.map(|id| id.to_string()))
        .bind(task.status.as_str())
        .bind(task.phase.as_str())
        .bind(task.priority.as_str())
        .bind(&metadata_json)
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .bind(task.completed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Task::try_from).transpose()
    }

    async fn update_task(&self, id: Uuid, update: TaskUpdate) -> Result<Task, StoreError> {
        let mut task = self.get_task(id).await?.ok_or(StoreError::RowNotFound)?;

        if task.status.is_terminal() {
            if let Some(new_status) = update.status {
                if new_status != task.status {
                    return Err(StoreError::ConstraintViolation(format!(
                        "task {id} is terminal ({}); cannot transition to {}",
                        task.status.as_str(),
                        new_status.as_str()
                    )));
                }
            }
        }

        if let Some(status) = update.status {
            task.status = status;
            if status.is_terminal() && task.completed_at.is_none() {
                task.completed_at = Some(Utc::now());
            }
        }
        if let Some(phase) = update.phase {
            task.phase = phase;
        }
        if let Some(priority) = update.priority {
            task.priority = priority;
        }
        if let Some(assigned_to) = update.assigned_to {
            task.assigned_to = assigned_to;
        }

        let mut metadata: Map<String, Value> = task.metadata.clone();
        for (key, value) in update.metadata {
            metadata.insert(key, value);
        }
        if let Some(message) = update.progress_message {
            metadata.insert("last_progress_message".to_string(), Value::String(message));
            metadata.insert(
                "last_progress_timestamp".to_string(),
                Value::String(Utc::now().to_rfc3339()),
            );
        }
        task.metadata = metadata;
        task.updated_at = Utc::now();

        let metadata_json = serde_json::to_string(&task.metadata)?;
        sqlx::query(
            r#"UPDATE tasks SET assigned_to = ?, status = ?, phase = ?, priority = ?, metadata = ?,
               updated_at = ?, completed_at = ? WHERE id = ?"#,
        )
        .bind(task.assigned_to.map(|v| v.to_string()))
        .bind(task.status.as_str())
        .bind(task.phase.as_str())
        .bind(task.priority.as_str())
        .bind(&metadata_json)
        .bind(task.updated_at.to_rfc3339())
        .bind(task.completed_at.map(|t| t.to_rfc3339()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(task)
    }

    async fn list_tasks(&self, customer_id: Uuid) -> Result<Vec<Task>, StoreError> {
        let rows: Vec<TaskRow> =
            sqlx::query_as("SELECT * FROM tasks WHERE customer_id = ? ORDER BY created_at DESC")
                .bind(customer_id.to_string())
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn append_comment(&self, comment: &Comment) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO task_comments (id, task_id, customer_id, author_type, content, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(comment.id.to_string())
        .bind(comment.task_id.to_string())
        .bind(comment.customer_id.to_string())
        .bind(comment.author_type.as_str())
        .bind(&comment.content)
        .bind(comment.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_comments(&self, task_id: Uuid) -> Result<Vec<Comment>, StoreError> {
        let rows: Vec<CommentRow> = sqlx::query_as(
            "SELECT * FROM task_comments WHERE task_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(task_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Comment::try_from).collect()
    }

    async fn insert_plan(&self, plan: &Plan) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO task_plans (id, task_id, customer_id, steps, timeline, resources, status, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(plan.id.to_string())
        .bind(plan.task_id.to_string())
        .bind(plan.customer_id.to_string())
        .bind(serde_json::to_string(&plan.steps)?)
        .bind(&plan.timeline)
        .bind(serde_json::to_string(&plan.resources)?)
        .bind(plan.status.as_str())
        .bind(plan.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_plan(&self, id: Uuid) -> Result<Option<Plan>, StoreError> {
        let row: Option<PlanRow> = sqlx::query_as("SELECT * FROM task_plans WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Plan::try_from).transpose()
    }

    async fn set_plan_status(&self, id: Uuid, status: PlanStatus) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE task_plans SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::RowNotFound);
        }
        Ok(())
    }

    async fn list_hired_agents(&self, customer_id: Uuid) -> Result<Vec<HiredAgent>, StoreError> {
        let rows: Vec<HiredAgentRow> = sqlx::query_as(
            r#"SELECT h.id, h.customer_id, h.agent_type, h.persona_name, h.status, h.created_at,
                      m.department, m.seniority
               FROM hired_agents h
               JOIN marketplace_agents m ON m.agent_type = h.agent_type
               WHERE h.customer_id = ?
               ORDER BY h.created_at ASC"#,
        )
        .bind(customer_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(HiredAgent::try_from).collect()
    }

    async fn insert_hired_agent(&self, agent: &HiredAgent) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO hired_agents (id, customer_id, agent_type, persona_name, status, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(agent.id.to_string())
        .bind(agent.customer_id.to_string())
        .bind(&agent.agent_type)
        .bind(&agent.persona_name)
        .bind(&agent.status)
        .bind(agent.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_hired_agent(&self, id: Uuid, customer_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM hired_agents WHERE id = ? AND customer_id = ?")
            .bind(id.to_string())
            .bind(customer_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_marketplace_agent(
        &self,
        agent_type: &str,
    ) -> Result<Option<MarketplaceAgent>, StoreError> {
        let row: Option<(String, String, String, String, String)> = sqlx::query_as(
            "SELECT agent_type, display_name, department, seniority, tools FROM marketplace_agents WHERE agent_type = ?",
        )
        .bind(agent_type)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(agent_type, display_name, department, seniority, tools)| {
            Ok(MarketplaceAgent {
                agent_type,
                display_name,
                department,
                seniority: SeniorityTier::from_str(&seniority).ok_or_else(|| {
                    StoreError::ConstraintViolation(format!("bad seniority {seniority}"))
                })?,
                tools: serde_json::from_str(&tools)?,
            })
        })
        .transpose()
    }

    async fn upsert_marketplace_agent(&self, agent: &MarketplaceAgent) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO marketplace_agents (agent_type, display_name, department, seniority, tools)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(agent_type) DO UPDATE SET
                   display_name = excluded.display_name,
                   department = excluded.department,
                   seniority = excluded.seniority,
                   tools = excluded.tools"#,
        )
        .bind(&agent.agent_type)
        .bind(&agent.display_name)
        .bind(&agent.department)
        .bind(agent.seniority.as_str())
        .bind(serde_json::to_string(&agent.tools)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{connection::create_test_pool, migrations::run_migrations};

    async fn store() -> SqliteTaskStore {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteTaskStore::new(pool)
    }

    #[tokio::test]
    async fn insert_and_get_round_trip() {
        let store = store().await;
        let task = Task::new(Uuid::new_v4(), "Write Q1 marketing plan");
        store.insert_task(&task).await.unwrap();

        let fetched = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(fetched.description, "Write Q1 marketing plan");
        assert_eq!(fetched.status, TaskStatus::Pending);
        assert_eq!(fetched.customer_id, task.customer_id);
    }

    #[tokio::test]
    async fn update_merges_metadata() {
        let store = store().await;
        let task = Task::new(Uuid::new_v4(), "demo");
        store.insert_task(&task).await.unwrap();

        store
            .update_task(
                task.id,
                TaskUpdate::default().with_metadata("a", serde_json::json!(1)),
            )
            .await
            .unwrap();
        let updated = store
            .update_task(
                task.id,
                TaskUpdate::status(TaskStatus::InProgress)
                    .with_priority(TaskPriority::High)
                    .with_metadata("b", serde_json::json!(2))
                    .with_progress("Starting task analysis..."),
            )
            .await
            .unwrap();

        assert_eq!(updated.metadata["a"], serde_json::json!(1));
        assert_eq!(updated.metadata["b"], serde_json::json!(2));
        assert_eq!(updated.priority, TaskPriority::High);
        assert_eq!(
            updated.metadata_str("last_progress_message"),
            Some("Starting task analysis...")
        );
    }

    #[tokio::test]
    async fn terminal_transitions_are_one_way() {
        let store = store().await;
        let task = Task::new(Uuid::new_v4(), "demo");
        store.insert_task(&task).await.unwrap();

        let done = store
            .update_task(task.id, TaskUpdate::status(TaskStatus::Completed))
            .await
            .unwrap();
        assert!(done.completed_at.is_some());

        let err = store
            .update_task(task.id, TaskUpdate::status(TaskStatus::InProgress))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation(_)));
    }

    #[tokio::test]
    async fn hired_agents_join_catalog_details() {
        let store = store().await;
        let customer = Uuid::new_v4();
        store
            .upsert_marketplace_agent(&MarketplaceAgent {
                agent_type: "marketing-manager".into(),
                display_name: "Marketing Manager".into(),
                department: "Marketing".into(),
                seniority: SeniorityTier::Manager,
                tools: vec!["calendar".into()],
            })
            .await
            .unwrap();
        store
            .insert_hired_agent(&HiredAgent {
                id: Uuid::new_v4(),
                customer_id: customer,
                agent_type: "marketing-manager".into(),
                persona_name: "Mara".into(),
                status: "active".into(),
                created_at: Utc::now(),
                department: String::new(),
                seniority: SeniorityTier::Junior,
            })
            .await
            .unwrap();

        let hired = store.list_hired_agents(customer).await.unwrap();
        assert_eq!(hired.len(), 1);
        assert_eq!(hired[0].department, "Marketing");
        assert_eq!(hired[0].seniority, SeniorityTier::Manager);

        // Another tenant sees nothing.
        assert!(store
            .list_hired_agents(Uuid::new_v4())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn comments_are_ordered() {
        let store = store().await;
        let task = Task::new(Uuid::new_v4(), "demo");
        store.insert_task(&task).await.unwrap();

        for (i, author) in [AuthorType::System, AuthorType::Ve].iter().enumerate() {
            store
                .append_comment(&Comment::new(
                    task.id,
                    task.customer_id,
                    *author,
                    format!("comment {i}"),
                ))
                .await
                .unwrap();
        }

        let comments = store.list_comments(task.id).await.unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].author_type, AuthorType::System);
    }

    #[tokio::test]
    async fn plan_status_round_trip() {
        let store = store().await;
        let task = Task::new(Uuid::new_v4(), "demo");
        store.insert_task(&task).await.unwrap();

        let plan = Plan::draft(
            task.id,
            task.customer_id,
            vec![PlanStep {
                output_type: "text".into(),
                description: "outline".into(),
            }],
            "1 hour",
            vec![],
        );
        store.insert_plan(&plan).await.unwrap();
        store
            .set_plan_status(plan.id, PlanStatus::Approved)
            .await
            .unwrap();

        let fetched = store.get_plan(plan.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, PlanStatus::Approved);
    }
}
