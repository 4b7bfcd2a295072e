//! Tenant access fabric.
//!
//! Reconciles per-tenant access to shared agents through a Route +
//! TrafficPolicy pair in the declarative policy store. All policy mutation
//! is merge-patch; grant/revoke for one agent type runs inside a per-policy
//! critical section so concurrent list edits compose. Route deletion is
//! protected while any customer retains access.

use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::error::FabricError;
use crate::domain::models::policy::{
    access_patch, allowed_customers, hostname, policy_name, policy_object, route_name,
    route_object, RouteInfo, RouteStatus,
};
use crate::domain::ports::{CreateOutcome, PolicyStore};
use crate::services::audit_log::{AuditEvent, AuditEventType, AuditLog};

/// Settings for the fabric service.
#[derive(Debug, Clone)]
pub struct FabricSettings {
    /// Namespace routes and policies live in.
    pub namespace: String,
    pub gateway_name: String,
    pub gateway_namespace: String,
}

impl Default for FabricSettings {
    fn default() -> Self {
        Self {
            namespace: "agents-system".to_string(),
            gateway_name: "agent-gateway".to_string(),
            gateway_namespace: "gateway-system".to_string(),
        }
    }
}

/// Declarative RBAC reconciler for shared agents.
pub struct AccessFabric {
    store: Arc<dyn PolicyStore>,
    audit: Arc<AuditLog>,
    settings: FabricSettings,
    /// Per-agent-type critical sections for list edits.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AccessFabric {
    pub fn new(store: Arc<dyn PolicyStore>, audit: Arc<AuditLog>, settings: FabricSettings) -> Self {
        Self {
            store,
            audit,
            settings,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn policy_lock(&self, agent_type: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(agent_type.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Ensure the Route and default-deny Policy for an agent exist.
    ///
    /// Idempotent: objects that already exist are left untouched.
    pub async fn create_agent_route(&self, agent_type: &str) -> Result<RouteInfo, FabricError> {
        let ns = &self.settings.namespace;
        let route = route_object(
            agent_type,
            ns,
            &self.settings.gateway_name,
            &self.settings.gateway_namespace,
        );

        let route_outcome = self.store.create_route(ns, route).await?;
        if route_outcome == CreateOutcome::Created {
            self.audit
                .record(
                    AuditEvent::new(AuditEventType::RouteCreated, agent_type)
                        .with_detail("route_name", json!(route_name(agent_type)))
                        .with_detail("namespace", json!(ns)),
                )
                .await;
            tracing::info!(agent_type, namespace = %ns, "created agent route");
        } else {
            tracing::info!(agent_type, "route already exists");
        }

        let policy_outcome = self.store.create_policy(ns, policy_object(agent_type, ns)).await?;
        if policy_outcome == CreateOutcome::Created {
            self.audit
                .record(
                    AuditEvent::new(AuditEventType::PolicyCreated, agent_type)
                        .with_detail("policy_name", json!(policy_name(agent_type)))
                        .with_detail("mode", json!("deny_all"))
                        .with_detail("allowed_customers", json!([])),
                )
                .await;
            tracing::info!(agent_type, "created default-deny traffic policy");
        }

        Ok(RouteInfo {
            route_name: route_name(agent_type),
            agent_type: agent_type.to_string(),
            hostname: hostname(agent_type),
            backend: format!("{agent_type}.{ns}:8080"),
            status: if route_outcome == CreateOutcome::Created {
                RouteStatus::Created
            } else {
                RouteStatus::Exists
            },
        })
    }

    /// Grant a customer access to an agent.
    pub async fn grant_customer_access(
        &self,
        agent_type: &str,
        customer_id: Uuid,
    ) -> Result<(), FabricError> {
        let lock = self.policy_lock(agent_type).await;
        let _guard = lock.lock().await;

        let ns = &self.settings.namespace;
        let name = policy_name(agent_type);

        let result = async {
            let policy = self
                .store
                .get_policy(ns, &name)
                .await?
                .ok_or_else(|| FabricError::NotFound(name.clone()))?;

            let mut customers = allowed_customers(&policy);
            let id = customer_id.to_string();
            if customers.contains(&id) {
                tracing::info!(agent_type, customer_id = %customer_id, "customer already granted");
            } else {
                customers.push(id);
            }

            self.store
                .merge_patch_policy(ns, &name, access_patch(&customers))
                .await?;
            Ok::<usize, FabricError>(customers.len())
        }
        .await;

        match result {
            Ok(total) => {
                self.audit
                    .record(
                        AuditEvent::new(AuditEventType::AccessGranted, agent_type)
                            .with_customer(customer_id)
                            .with_detail("policy_name", json!(name))
                            .with_detail("total_customers", json!(total)),
                    )
                    .await;
                tracing::info!(agent_type, customer_id = %customer_id, total, "granted customer access");
                Ok(())
            }
            Err(e) => {
                self.audit
                    .record(
                        AuditEvent::new(AuditEventType::AccessGrantFailed, agent_type)
                            .with_customer(customer_id)
                            .with_detail("error", json!(e.to_string()))
                            .failed(),
                    )
                    .await;
                Err(e)
            }
        }
    }

    /// Revoke a customer's access to an agent.
    ///
    /// When the resulting list is empty the policy reverts to deny-all; the
    /// policy object itself is never deleted here.
    pub async fn revoke_customer_access(
        &self,
        agent_type: &str,
        customer_id: Uuid,
    ) -> Result<(), FabricError> {
        let lock = self.policy_lock(agent_type).await;
        let _guard = lock.lock().await;

        let ns = &self.settings.namespace;
        let name = policy_name(agent_type);

        let result = async {
            let policy = match self.store.get_policy(ns, &name).await? {
                Some(p) => p,
                // Already deleted; revoke is a no-op.
                None => return Ok::<Option<Vec<String>>, FabricError>(None),
            };

            let mut customers = allowed_customers(&policy);
            let id = customer_id.to_string();
            let before = customers.len();
            customers.retain(|c| c != &id);
            if customers.len() == before {
                tracing::warn!(agent_type, customer_id = %customer_id, "customer not in policy");
            }

            if customers.is_empty() {
                tracing::info!(agent_type, "no customers left, reverting to deny-all");
            }
            self.store
                .merge_patch_policy(ns, &name, access_patch(&customers))
                .await?;
            Ok(Some(customers))
        }
        .await;

        match result {
            Ok(None) => Ok(()),
            Ok(Some(remaining)) => {
                self.audit
                    .record(
                        AuditEvent::new(AuditEventType::AccessRevoked, agent_type)
                            .with_customer(customer_id)
                            .with_detail("policy_name", json!(name))
                            .with_detail("total_customers", json!(remaining.len()))
                            .with_detail("remaining_customers", json!(&remaining))
                            .with_detail("reverted_to_deny_all", json!(remaining.is_empty())),
                    )
                    .await;
                Ok(())
            }
            Err(e) => {
                self.audit
                    .record(
                        AuditEvent::new(AuditEventType::AccessRevokeFailed, agent_type)
                            .with_customer(customer_id)
                            .with_detail("error", json!(e.to_string()))
                            .failed(),
                    )
                    .await;
                Err(e)
            }
        }
    }

    /// Delete an agent's Route and Policy.
    ///
    /// Delete-protected: refuses while any customer still has access. The
    /// policy is removed before the route; a missing policy allows the route
    /// delete to proceed.
    pub async fn delete_agent_route(&self, agent_type: &str) -> Result<(), FabricError> {
        let lock = self.policy_lock(agent_type).await;
        let _guard = lock.lock().await;

        let ns = &self.settings.namespace;
        let p_name = policy_name(agent_type);
        let r_name = route_name(agent_type);

        if let Some(policy) = self.store.get_policy(ns, &p_name).await? {
            let customers = allowed_customers(&policy);
            if !customers.is_empty() {
                self.audit
                    .record(
                        AuditEvent::new(AuditEventType::RouteDeleteBlocked, agent_type)
                            .with_detail("reason", json!("Customers still have access"))
                            .with_detail("allowed_customers_count", json!(customers.len()))
                            .with_detail("customers", json!(&customers))
                            .failed(),
                    )
                    .await;
                return Err(FabricError::DeleteProtected {
                    agent_type: agent_type.to_string(),
                    customer_count: customers.len(),
                });
            }

            if self.store.delete_policy(ns, &p_name).await? {
                self.audit
                    .record(
                        AuditEvent::new(AuditEventType::PolicyDeleted, agent_type)
                            .with_detail("policy_name", json!(p_name)),
                    )
                    .await;
            }
        }

        match self.store.delete_route(ns, &r_name).await {
            Ok(_) => {
                self.audit
                    .record(
                        AuditEvent::new(AuditEventType::RouteDeleted, agent_type)
                            .with_detail("route_name", json!(r_name)),
                    )
                    .await;
                tracing::info!(agent_type, "deleted agent route");
                Ok(())
            }
            Err(e) => {
                self.audit
                    .record(
                        AuditEvent::new(AuditEventType::RouteDeleteFailed, agent_type)
                            .with_detail("error", json!(e.to_string()))
                            .failed(),
                    )
                    .await;
                Err(e)
            }
        }
    }

    /// Currently allowed customers for an agent.
    pub async fn allowed_customers(&self, agent_type: &str) -> Result<Vec<String>, FabricError> {
        let policy = self
            .store
            .get_policy(&self.settings.namespace, &policy_name(agent_type))
            .await?
            .ok_or_else(|| FabricError::NotFound(policy_name(agent_type)))?;
        Ok(allowed_customers(&policy))
    }

    /// List all agent routes in the fabric namespace.
    pub async fn list_agent_routes(&self) -> Result<Vec<serde_json::Value>, FabricError> {
        self.store.list_routes(&self.settings.namespace).await
    }
}
