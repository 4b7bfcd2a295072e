//! Execution plan model.
//!
//! A plan is drafted by the root agent during the planning phase and must be
//! approved via the `approve_plan` signal before execution continues. At most
//! one non-terminal plan exists per task; the task references it through
//! `metadata.latest_plan_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Draft,
    Approved,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Approved => "approved",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "approved" => Some(Self::Approved),
            _ => None,
        }
    }
}

/// A single step in an execution plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    /// Kind of deliverable this step produces (e.g. "text", "document").
    pub output_type: String,
    pub description: String,
}

/// A drafted or approved execution plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub task_id: Uuid,
    pub customer_id: Uuid,
    pub steps: Vec<PlanStep>,
    pub timeline: String,
    pub resources: Vec<String>,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
}

impl Plan {
    pub fn draft(
        task_id: Uuid,
        customer_id: Uuid,
        steps: Vec<PlanStep>,
        timeline: impl Into<String>,
        resources: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            customer_id,
            steps,
            timeline: timeline.into(),
            resources,
            status: PlanStatus::Draft,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drafted_plan_starts_in_draft() {
        let plan = Plan::draft(
            Uuid::new_v4(),
            Uuid::new_v4(),
            vec![PlanStep {
                output_type: "text".into(),
                description: "Write the outline".into(),
            }],
            "1 hour",
            vec![],
        );
        assert_eq!(plan.status, PlanStatus::Draft);
        assert_eq!(plan.steps.len(), 1);
    }
}
