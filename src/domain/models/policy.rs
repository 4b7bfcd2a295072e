//! Route and TrafficPolicy object shapes for the tenant access fabric.
//!
//! Each marketplace agent has exactly one Route (hostname routing to the
//! agent backend) and one sibling TrafficPolicy naming the tenants allowed
//! to traverse it. The policy's match expression is a pure function of its
//! `allowed_customers` annotation.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Match expression that can never be satisfied; applied when no customer
/// has access.
pub const DENY_ALL_EXPRESSION: &str =
    "request.headers['X-Customer-ID'] == 'deny-all-default'";

/// Annotation key holding the canonical JSON array of allowed customers.
pub const ALLOWED_CUSTOMERS_ANNOTATION: &str = "allowed_customers";

/// Name of the Route object for an agent type.
pub fn route_name(agent_type: &str) -> String {
    format!("agent-{agent_type}")
}

/// Name of the TrafficPolicy object paired with an agent's Route.
pub fn policy_name(agent_type: &str) -> String {
    format!("rbac-{agent_type}")
}

/// Hostname the gateway routes on for an agent type.
pub fn hostname(agent_type: &str) -> String {
    format!("{agent_type}.local")
}

/// Build the access match expression for a set of allowed customers.
///
/// Empty set ⇒ deny-all sentinel; non-empty ⇒ membership test over the ids.
pub fn access_expression(customer_ids: &[String]) -> String {
    if customer_ids.is_empty() {
        return DENY_ALL_EXPRESSION.to_string();
    }
    let list = customer_ids
        .iter()
        .map(|id| format!("'{id}'"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("request.headers['X-Customer-ID'] in [{list}]")
}

/// Build the Route object manifest for an agent backend.
pub fn route_object(agent_type: &str, namespace: &str, gateway_name: &str, gateway_namespace: &str) -> Value {
    json!({
        "metadata": {
            "name": route_name(agent_type),
            "namespace": namespace,
            "labels": {
                "app": "veplane",
                "agent-type": agent_type
            }
        },
        "spec": {
            "parentRefs": [
                { "name": gateway_name, "namespace": gateway_namespace }
            ],
            "hostnames": [hostname(agent_type)],
            "rules": [
                {
                    "backendRefs": [
                        { "name": agent_type, "namespace": namespace, "port": 8080 }
                    ]
                }
            ]
        }
    })
}

/// Build the default-deny TrafficPolicy manifest paired with a Route.
pub fn policy_object(agent_type: &str, namespace: &str) -> Value {
    json!({
        "metadata": {
            "name": policy_name(agent_type),
            "namespace": namespace,
            "labels": {
                "app": "veplane",
                "agent-type": agent_type
            },
            "annotations": {
                ALLOWED_CUSTOMERS_ANNOTATION: "[]"
            }
        },
        "spec": {
            "targetRefs": [
                { "kind": "Route", "name": route_name(agent_type) }
            ],
            "rbac": {
                "policy": {
                    "matchExpressions": [DENY_ALL_EXPRESSION]
                }
            }
        }
    })
}

/// Read the `allowed_customers` list out of a policy object.
///
/// A missing or malformed annotation reads as empty, matching deny-all.
pub fn allowed_customers(policy: &Value) -> Vec<String> {
    policy
        .pointer("/metadata/annotations/allowed_customers")
        .and_then(Value::as_str)
        .and_then(|raw| serde_json::from_str::<Vec<String>>(raw).ok())
        .unwrap_or_default()
}

/// Build the merge-patch body that sets the allowed list and rewrites the
/// derived expression in one write.
pub fn access_patch(customer_ids: &[String]) -> Value {
    let annotation =
        serde_json::to_string(customer_ids).unwrap_or_else(|_| "[]".to_string());
    json!({
        "metadata": {
            "annotations": {
                ALLOWED_CUSTOMERS_ANNOTATION: annotation
            }
        },
        "spec": {
            "rbac": {
                "policy": {
                    "matchExpressions": [access_expression(customer_ids)]
                }
            }
        }
    })
}

/// Summary returned by `create_agent_route`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteInfo {
    pub route_name: String,
    pub agent_type: String,
    pub hostname: String,
    pub backend: String,
    pub status: RouteStatus,
}

/// Outcome of an idempotent route create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    Created,
    Exists,
}
