//! Delegation circuit breaker.
//!
//! Process-wide guard against runaway delegation: bounds recursion depth,
//! per-customer delegation volume, and per-agent-type delegation rate inside
//! an hourly window. Consulted before every child workflow spawn.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::models::config::DelegationConfig;

/// Why a delegation was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerRejection {
    DepthExceeded { max_depth: u32 },
    CustomerLimitExceeded { max_per_hour: u32 },
    AgentRateExceeded { agent_type: String, max_per_hour: u32 },
}

impl std::fmt::Display for BreakerRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DepthExceeded { max_depth } => {
                write!(f, "Max delegation depth ({max_depth}) exceeded")
            }
            Self::CustomerLimitExceeded { max_per_hour } => {
                write!(f, "Customer delegation limit ({max_per_hour}/hour) exceeded")
            }
            Self::AgentRateExceeded {
                agent_type,
                max_per_hour,
            } => write!(
                f,
                "Agent rate limit ({max_per_hour}/hour) exceeded for {agent_type}"
            ),
        }
    }
}

/// Snapshot of the breaker's counters.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStats {
    pub active_workflows: usize,
    pub customer_counts: HashMap<Uuid, u32>,
    pub agent_rates: HashMap<String, usize>,
    pub reset_time: DateTime<Utc>,
}

#[derive(Debug)]
struct BreakerState {
    workflow_depths: HashMap<String, u32>,
    customer_counts: HashMap<Uuid, u32>,
    agent_timestamps: HashMap<String, Vec<DateTime<Utc>>>,
    reset_time: DateTime<Utc>,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            workflow_depths: HashMap::new(),
            customer_counts: HashMap::new(),
            agent_timestamps: HashMap::new(),
            reset_time: Utc::now(),
        }
    }

    fn reset(&mut self) {
        self.workflow_depths.clear();
        self.customer_counts.clear();
        self.agent_timestamps.clear();
        self.reset_time = Utc::now();
    }
}

/// Circuit breaker over delegation spawns.
pub struct DelegationCircuitBreaker {
    config: DelegationConfig,
    window: Duration,
    state: Mutex<BreakerState>,
}

impl DelegationCircuitBreaker {
    pub fn new(config: DelegationConfig) -> Self {
        Self {
            config,
            window: Duration::hours(1),
            state: Mutex::new(BreakerState::new()),
        }
    }

    /// Check whether a delegation is allowed and record it if so.
    ///
    /// Rejections are final for the caller; they are never retried.
    pub async fn check_and_record(
        &self,
        workflow_id: &str,
        customer_id: Uuid,
        agent_type: &str,
        delegation_depth: u32,
    ) -> Result<(), BreakerRejection> {
        let mut state = self.state.lock().await;

        let now = Utc::now();
        if now - state.reset_time > self.window {
            state.reset();
        }

        if delegation_depth > self.config.max_depth {
            return Err(BreakerRejection::DepthExceeded {
                max_depth: self.config.max_depth,
            });
        }

        let customer_count = state.customer_counts.get(&customer_id).copied().unwrap_or(0);
        if customer_count >= self.config.max_customer_per_hour {
            return Err(BreakerRejection::CustomerLimitExceeded {
                max_per_hour: self.config.max_customer_per_hour,
            });
        }

        let cutoff = now - self.window;
        let recent = state
            .agent_timestamps
            .get(agent_type)
            .map(|times| times.iter().filter(|t| **t > cutoff).count())
            .unwrap_or(0);
        if recent >= self.config.max_agent_per_hour as usize {
            return Err(BreakerRejection::AgentRateExceeded {
                agent_type: agent_type.to_string(),
                max_per_hour: self.config.max_agent_per_hour,
            });
        }

        state
            .workflow_depths
            .insert(workflow_id.to_string(), delegation_depth);
        state.customer_counts.insert(customer_id, customer_count + 1);
        state
            .agent_timestamps
            .entry(agent_type.to_string())
            .or_default()
            .push(now);

        Ok(())
    }

    /// Current counter snapshot.
    pub async fn stats(&self) -> BreakerStats {
        let state = self.state.lock().await;
        let cutoff = Utc::now() - self.window;
        BreakerStats {
            active_workflows: state.workflow_depths.len(),
            customer_counts: state.customer_counts.clone(),
            agent_rates: state
                .agent_timestamps
                .iter()
                .map(|(agent, times)| {
                    (
                        agent.clone(),
                        times.iter().filter(|t| **t > cutoff).count(),
                    )
                })
                .collect(),
            reset_time: state.reset_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(max_depth: u32, max_customer: u32, max_agent: u32) -> DelegationCircuitBreaker {
        DelegationCircuitBreaker::new(DelegationConfig {
            max_depth,
            max_customer_per_hour: max_customer,
            max_agent_per_hour: max_agent,
            decision_max_retries: 3,
        })
    }

    #[tokio::test]
    async fn allows_within_limits() {
        let b = breaker(5, 100, 50);
        let customer = Uuid::new_v4();
        assert!(b
            .check_and_record("wf-1", customer, "marketing-manager", 0)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn rejects_beyond_depth() {
        let b = breaker(5, 100, 50);
        let err = b
            .check_and_record("wf-1", Uuid::new_v4(), "marketing-manager", 6)
            .await
            .unwrap_err();
        assert_eq!(err, BreakerRejection::DepthExceeded { max_depth: 5 });
    }

    #[tokio::test]
    async fn rejects_customer_volume() {
        let b = breaker(5, 2, 50);
        let customer = Uuid::new_v4();
        b.check_and_record("wf-1", customer, "a", 0).await.unwrap();
        b.check_and_record("wf-2", customer, "b", 0).await.unwrap();
        let err = b
            .check_and_record("wf-3", customer, "c", 0)
            .await
            .unwrap_err();
        assert!(matches!(err, BreakerRejection::CustomerLimitExceeded { .. }));
    }

    #[tokio::test]
    async fn rejects_agent_rate() {
        let b = breaker(5, 100, 1);
        b.check_and_record("wf-1", Uuid::new_v4(), "devops-manager", 0)
            .await
            .unwrap();
        let err = b
            .check_and_record("wf-2", Uuid::new_v4(), "devops-manager", 0)
            .await
            .unwrap_err();
        assert!(matches!(err, BreakerRejection::AgentRateExceeded { .. }));
    }

    #[tokio::test]
    async fn stats_reflect_recordings() {
        let b = breaker(5, 100, 50);
        let customer = Uuid::new_v4();
        b.check_and_record("wf-1", customer, "devops-manager", 0)
            .await
            .unwrap();
        let stats = b.stats().await;
        assert_eq!(stats.active_workflows, 1);
        assert_eq!(stats.customer_counts[&customer], 1);
        assert_eq!(stats.agent_rates["devops-manager"], 1);
    }
}
