//! Delegation peer discovery.
//!
//! Computes the set of teammates an agent may delegate to, applying role
//! rules over the tenant's hired agents:
//! - same department: managers delegate to anyone, seniors to juniors,
//!   juniors never upward;
//! - cross department: only to the other department's manager.
//!
//! The surviving peers are formatted into the team-context block the
//! invocation client prepends to every outbound message.

use std::sync::Arc;
use uuid::Uuid;

use crate::domain::error::StoreError;
use crate::domain::models::{HiredAgent, Peer, SeniorityTier};
use crate::domain::ports::TaskStore;

/// Service resolving delegation-allowed peers.
#[derive(Clone)]
pub struct PeerDiscovery {
    store: Arc<dyn TaskStore>,
}

impl PeerDiscovery {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    /// Delegation-allowed peers of `current_agent_type` within a tenant.
    pub async fn peers(
        &self,
        customer_id: Uuid,
        current_agent_type: &str,
    ) -> Result<Vec<Peer>, StoreError> {
        let hired = self.store.list_hired_agents(customer_id).await?;

        let current = hired
            .iter()
            .find(|a| a.agent_type == current_agent_type)
            .cloned();

        let mut peers = Vec::new();
        for candidate in &hired {
            if candidate.agent_type == current_agent_type {
                continue;
            }
            if let Some(ref me) = current {
                if !delegation_allowed(me, candidate) {
                    continue;
                }
            }

            let tools = self
                .store
                .get_marketplace_agent(&candidate.agent_type)
                .await?
                .map(|a| a.tools)
                .unwrap_or_default();

            peers.push(Peer {
                id: candidate.id,
                name: candidate.persona_name.clone(),
                agent_type: candidate.agent_type.clone(),
                role: format!(
                    "{} {}",
                    candidate.seniority.as_str(),
                    candidate.department
                ),
                department: candidate.department.clone(),
                tools,
            });
        }

        tracing::debug!(
            customer_id = %customer_id,
            current = current_agent_type,
            peer_count = peers.len(),
            "resolved delegation peers"
        );
        Ok(peers)
    }
}

/// Role rules for one candidate.
fn delegation_allowed(me: &HiredAgent, target: &HiredAgent) -> bool {
    let same_department = me.department.eq_ignore_ascii_case(&target.department);
    if same_department {
        match me.seniority {
            SeniorityTier::Manager => true,
            SeniorityTier::Senior => target.seniority == SeniorityTier::Junior,
            // Juniors never delegate upward; junior-to-junior stays allowed.
            SeniorityTier::Junior => target.seniority == SeniorityTier::Junior,
        }
    } else {
        target.seniority == SeniorityTier::Manager
    }
}

/// Format peers into the team-context block injected before user messages.
pub fn format_team_context(peers: &[Peer]) -> String {
    if peers.is_empty() {
        return "Your Team: No other agents available.".to_string();
    }

    let mut lines = vec!["Your Team (Hired Agents):".to_string()];
    for peer in peers {
        let tools = if peer.tools.is_empty() {
            "no tools".to_string()
        } else {
            peer.tools.join(", ")
        };
        lines.push(format!(
            "- {} (ID: {}, Role: {}, Tools: {})",
            peer.name, peer.id, peer.role, tools
        ));
    }
    lines.push(String::new());
    lines.push("If you need a capability you don't have, delegate to the teammate that does.".to_string());
    lines.join("\n")
}
