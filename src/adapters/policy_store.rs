//! In-memory declarative policy store.
//!
//! Stand-in for the cluster CRD API: namespaced Route and TrafficPolicy
//! objects with create/get/delete and RFC 7386 merge-patch. Patch and
//! full-write operations are counted so tests can assert that mutation is
//! merge-patch-only.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::domain::error::FabricError;
use crate::domain::ports::{CreateOutcome, PolicyStore};

/// Apply an RFC 7386 JSON merge patch to a target value in place.
pub fn json_merge_patch(target: &mut Value, patch: &Value) {
    match patch {
        Value::Object(patch_map) => {
            if !target.is_object() {
                *target = Value::Object(serde_json::Map::new());
            }
            if let Value::Object(target_map) = target {
                for (key, patch_value) in patch_map {
                    if patch_value.is_null() {
                        target_map.remove(key);
                    } else {
                        json_merge_patch(
                            target_map.entry(key.clone()).or_insert(Value::Null),
                            patch_value,
                        );
                    }
                }
            }
        }
        _ => *target = patch.clone(),
    }
}

fn object_name(body: &Value) -> Result<String, FabricError> {
    body.pointer("/metadata/name")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| FabricError::Store("object is missing metadata.name".to_string()))
}

fn key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

#[derive(Default)]
struct Objects {
    routes: HashMap<String, Value>,
    policies: HashMap<String, Value>,
}

/// In-memory [`PolicyStore`] with write-op accounting.
#[derive(Default)]
pub struct InMemoryPolicyStore {
    objects: RwLock<Objects>,
    patch_count: AtomicUsize,
    put_count: AtomicUsize,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of merge-patches issued against policies.
    pub fn patch_count(&self) -> usize {
        self.patch_count.load(Ordering::SeqCst)
    }

    /// Number of full-object policy replaces issued. Should stay zero.
    pub fn put_count(&self) -> usize {
        self.put_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PolicyStore for InMemoryPolicyStore {
    async fn get_route(&self, namespace: &str, name: &str) -> Result<Option<Value>, FabricError> {
        let objects = self.objects.read().await;
        Ok(objects.routes.get(&key(namespace, name)).cloned())
    }

    async fn create_route(
        &self,
        namespace: &str,
        body: Value,
    ) -> Result<CreateOutcome, FabricError> {
        let name = object_name(&body)?;
        let mut objects = self.objects.write().await;
        let k = key(namespace, &name);
        if objects.routes.contains_key(&k) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        objects.routes.insert(k, body);
        Ok(CreateOutcome::Created)
    }

    async fn delete_route(&self, namespace: &str, name: &str) -> Result<bool, FabricError> {
        let mut objects = self.objects.write().await;
        Ok(objects.routes.remove(&key(namespace, name)).is_some())
    }

    async fn get_policy(&self, namespace: &str, name: &str) -> Result<Option<Value>, FabricError> {
        let objects = self.objects.read().await;
        Ok(objects.policies.get(&key(namespace, name)).cloned())
    }

    async fn create_policy(
        &self,
        namespace: &str,
        body: Value,
    ) -> Result<CreateOutcome, FabricError> {
        let name = object_name(&body)?;
        let mut objects = self.objects.write().await;
        let k = key(namespace, &name);
        if objects.policies.contains_key(&k) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        objects.policies.insert(k, body);
        Ok(CreateOutcome::Created)
    }

    async fn merge_patch_policy(
        &self,
        namespace: &str,
        name: &str,
        patch: Value,
    ) -> Result<(), FabricError> {
        let mut objects = self.objects.write().await;
        let k = key(namespace, name);
        let policy = objects
            .policies
            .get_mut(&k)
            .ok_or_else(|| FabricError::NotFound(name.to_string()))?;
        json_merge_patch(policy, &patch);
        self.patch_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_policy(&self, namespace: &str, name: &str) -> Result<bool, FabricError> {
        let mut objects = self.objects.write().await;
        Ok(objects.policies.remove(&key(namespace, name)).is_some())
    }

    async fn list_routes(&self, namespace: &str) -> Result<Vec<Value>, FabricError> {
        let prefix = format!("{namespace}/");
        let objects = self.objects.read().await;
        Ok(objects
            .routes
            .iter()
            .filter(|(k, _)| k.starts_with(&prefix))
            .map(|(_, v)| v.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_patch_merges_nested_objects() {
        let mut target = json!({"metadata": {"annotations": {"a": "1"}}, "spec": {"x": 1}});
        json_merge_patch(
            &mut target,
            &json!({"metadata": {"annotations": {"b": "2"}}}),
        );
        assert_eq!(target["metadata"]["annotations"]["a"], "1");
        assert_eq!(target["metadata"]["annotations"]["b"], "2");
        assert_eq!(target["spec"]["x"], 1);
    }

    #[test]
    fn merge_patch_null_removes_key() {
        let mut target = json!({"a": 1, "b": 2});
        json_merge_patch(&mut target, &json!({"b": null}));
        assert_eq!(target, json!({"a": 1}));
    }

    #[test]
    fn merge_patch_replaces_arrays_wholesale() {
        let mut target = json!({"list": [1, 2]});
        json_merge_patch(&mut target, &json!({"list": [3]}));
        assert_eq!(target, json!({"list": [3]}));
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let store = InMemoryPolicyStore::new();
        let body = json!({"metadata": {"name": "agent-wellness"}});
        assert_eq!(
            store.create_route("ns", body.clone()).await.unwrap(),
            CreateOutcome::Created
        );
        assert_eq!(
            store.create_route("ns", body).await.unwrap(),
            CreateOutcome::AlreadyExists
        );
    }

    #[tokio::test]
    async fn patch_missing_policy_is_not_found() {
        let store = InMemoryPolicyStore::new();
        let err = store
            .merge_patch_policy("ns", "rbac-ghost", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, FabricError::NotFound(_)));
    }

    #[tokio::test]
    async fn patch_counter_increments() {
        let store = InMemoryPolicyStore::new();
        store
            .create_policy("ns", json!({"metadata": {"name": "rbac-x"}}))
            .await
            .unwrap();
        store
            .merge_patch_policy("ns", "rbac-x", json!({"spec": {"v": 1}}))
            .await
            .unwrap();
        assert_eq!(store.patch_count(), 1);
        assert_eq!(store.put_count(), 0);
    }
}
