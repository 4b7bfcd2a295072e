//! Marketplace and hired-agent models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Seniority tier of a marketplace agent.
///
/// Ordering matters: escalation chains walk manager → senior → junior, and
/// delegation role rules compare tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeniorityTier {
    Junior = 1,
    Senior = 2,
    Manager = 3,
}

impl SeniorityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Junior => "junior",
            Self::Senior => "senior",
            Self::Manager => "manager",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "junior" => Some(Self::Junior),
            "senior" => Some(Self::Senior),
            "manager" => Some(Self::Manager),
            _ => None,
        }
    }
}

/// Platform-owned catalog entry describing a shareable agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceAgent {
    /// Stable slug, e.g. `marketing-manager`. Primary key of the catalog.
    pub agent_type: String,
    pub display_name: String,
    pub department: String,
    pub seniority: SeniorityTier,
    pub tools: Vec<String>,
}

/// A tenant's logical handle onto a marketplace agent.
///
/// Creating one grants fabric access; deleting one revokes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HiredAgent {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub agent_type: String,
    pub persona_name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    /// Catalog details, joined in by the store.
    pub department: String,
    pub seniority: SeniorityTier,
}

impl HiredAgent {
    pub fn is_manager(&self) -> bool {
        self.seniority == SeniorityTier::Manager
    }
}

/// A delegation-allowed teammate, as surfaced to the deciding agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Peer {
    pub id: Uuid,
    pub name: String,
    pub agent_type: String,
    pub role: String,
    pub department: String,
    pub tools: Vec<String>,
}
