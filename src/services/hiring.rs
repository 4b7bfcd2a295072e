//! Hiring: the coupling between hired agents and the access fabric.
//!
//! Hiring a marketplace agent creates the tenant's handle and grants fabric
//! access in the same operation; unhiring deletes the handle and revokes.
//! A tenant holds at most one hire per agent type.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::error::{FabricError, StoreError};
use crate::domain::models::HiredAgent;
use crate::domain::ports::TaskStore;
use crate::services::access_fabric::AccessFabric;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HiringError {
    #[error("Unknown marketplace agent: {0}")]
    UnknownAgentType(String),

    #[error("Hired agent not found: {0}")]
    NotHired(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Fabric(#[from] FabricError),
}

/// Service managing the hire/unhire lifecycle.
pub struct HiringService {
    tasks: Arc<dyn TaskStore>,
    fabric: Arc<AccessFabric>,
}

impl HiringService {
    pub fn new(tasks: Arc<dyn TaskStore>, fabric: Arc<AccessFabric>) -> Self {
        Self { tasks, fabric }
    }

    /// Hire a marketplace agent for a tenant. Grants gateway access before
    /// the handle becomes visible; a failed grant leaves nothing behind.
    pub async fn hire(
        &self,
        customer_id: Uuid,
        agent_type: &str,
        persona_name: &str,
    ) -> Result<HiredAgent, HiringError> {
        let catalog = self
            .tasks
            .get_marketplace_agent(agent_type)
            .await?
            .ok_or_else(|| HiringError::UnknownAgentType(agent_type.to_string()))?;

        self.fabric
            .grant_customer_access(agent_type, customer_id)
            .await?;

        let agent = HiredAgent {
            id: Uuid::new_v4(),
            customer_id,
            agent_type: agent_type.to_string(),
            persona_name: persona_name.to_string(),
            status: "active".to_string(),
            created_at: Utc::now(),
            department: catalog.department,
            seniority: catalog.seniority,
        };
        if let Err(e) = self.tasks.insert_hired_agent(&agent).await {
            // Roll the grant back so access never outlives the handle.
            let _ = self
                .fabric
                .revoke_customer_access(agent_type, customer_id)
                .await;
            return Err(e.into());
        }

        tracing::info!(customer_id = %customer_id, agent_type, "agent hired");
        Ok(agent)
    }

    /// Unhire: delete the handle and revoke fabric access.
    pub async fn unhire(&self, customer_id: Uuid, ve_id: Uuid) -> Result<(), HiringError> {
        let hired = self.tasks.list_hired_agents(customer_id).await?;
        let agent = hired
            .into_iter()
            .find(|a| a.id == ve_id)
            .ok_or(HiringError::NotHired(ve_id))?;

        if !self.tasks.delete_hired_agent(ve_id, customer_id).await? {
            return Err(HiringError::NotHired(ve_id));
        }
        self.fabric
            .revoke_customer_access(&agent.agent_type, customer_id)
            .await?;

        tracing::info!(customer_id = %customer_id, agent_type = agent.agent_type, "agent unhired");
        Ok(())
    }
}
