//! Declarative policy store port.
//!
//! Abstracts the declarative key-value store holding Route and TrafficPolicy
//! objects (a Kubernetes CRD API in the reference environment). All policy
//! mutation goes through `merge_patch_policy` with RFC 7386 merge-patch
//! semantics, so concurrent writers compose per-field. The port exposes no
//! full-object replace.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::error::FabricError;

/// Outcome of an idempotent create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

/// Store of Route and TrafficPolicy objects.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn get_route(&self, namespace: &str, name: &str) -> Result<Option<Value>, FabricError>;

    /// Create a Route; an existing object of the same name is success.
    async fn create_route(&self, namespace: &str, body: Value)
        -> Result<CreateOutcome, FabricError>;

    /// Delete a Route. Returns false when the object was already gone.
    async fn delete_route(&self, namespace: &str, name: &str) -> Result<bool, FabricError>;

    async fn get_policy(&self, namespace: &str, name: &str) -> Result<Option<Value>, FabricError>;

    /// Create a TrafficPolicy; an existing object of the same name is success.
    async fn create_policy(
        &self,
        namespace: &str,
        body: Value,
    ) -> Result<CreateOutcome, FabricError>;

    /// Apply an RFC 7386 merge patch to a TrafficPolicy.
    ///
    /// Errors with [`FabricError::NotFound`] when the policy does not exist.
    async fn merge_patch_policy(
        &self,
        namespace: &str,
        name: &str,
        patch: Value,
    ) -> Result<(), FabricError>;

    /// Delete a TrafficPolicy. Returns false when the object was already gone.
    async fn delete_policy(&self, namespace: &str, name: &str) -> Result<bool, FabricError>;

    /// List Route objects in a namespace.
    async fn list_routes(&self, namespace: &str) -> Result<Vec<Value>, FabricError>;
}
