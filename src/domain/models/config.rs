//! Configuration model.
//!
//! Loaded by [`ConfigLoader`](crate::infrastructure::config::ConfigLoader)
//! with hierarchical merging (defaults → project yaml → local yaml → env).

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    pub delegation: DelegationConfig,
    pub escalation: EscalationConfig,
    pub routing: RoutingConfig,
    pub fabric: FabricConfig,
    pub engine: EngineConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// SQLite database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: ".veplane/veplane.db".to_string(),
            max_connections: 5,
        }
    }
}

/// Agent gateway client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Base URL of the shared agent gateway.
    pub base_url: String,
    /// HTTP-level timeout per invocation, in seconds.
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Delegation caps enforced by the circuit breaker and workflows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DelegationConfig {
    /// Maximum nesting of delegation workflows; root is depth 0.
    pub max_depth: u32,
    /// Per-customer delegations per hour.
    pub max_customer_per_hour: u32,
    /// Per-agent-type delegations per hour.
    pub max_agent_per_hour: u32,
    /// Validation retries before the decide activity falls back to handle.
    pub decision_max_retries: u32,
}

impl Default for DelegationConfig {
    fn default() -> Self {
        Self {
            max_depth: 5,
            max_customer_per_hour: 100,
            max_agent_per_hour: 50,
            decision_max_retries: 3,
        }
    }
}

/// Escalation chain settings for direct assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    pub max_attempts: u32,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

/// Routing activity settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Agent type consulted for routing decisions.
    pub orchestrator_agent: String,
    /// Agent type the keyword fallback defaults to.
    pub bootstrap_agent: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            orchestrator_agent: "system-orchestrator".to_string(),
            bootstrap_agent: "devops-manager".to_string(),
        }
    }
}

/// Tenant access fabric settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FabricConfig {
    /// Namespace routes and policies live in.
    pub namespace: String,
    pub gateway_name: String,
    pub gateway_namespace: String,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            namespace: "agents-system".to_string(),
            gateway_name: "agent-gateway".to_string(),
            gateway_namespace: "gateway-system".to_string(),
        }
    }
}

/// Workflow engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Logical task queue name recorded with each run.
    pub task_queue: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            task_queue: "task-routing".to_string(),
        }
    }
}

/// HTTP surface settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:7420".to_string(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `json` or `pretty`.
    pub format: String,
    /// Optional directory for rotating file output.
    pub dir: Option<String>,
    /// Optional path for the JSONL audit sink.
    pub audit_file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            dir: None,
            audit_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_caps() {
        let config = Config::default();
        assert_eq!(config.delegation.max_depth, 5);
        assert_eq!(config.delegation.max_customer_per_hour, 100);
        assert_eq!(config.delegation.max_agent_per_hour, 50);
        assert_eq!(config.escalation.max_attempts, 3);
        assert_eq!(config.gateway.timeout_secs, 60);
    }

    #[test]
    fn unknown_keys_are_ignored_on_deserialize() {
        let yaml = "delegation:\n  max_depth: 3\n  not_a_real_key: true\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.delegation.max_depth, 3);
    }
}
