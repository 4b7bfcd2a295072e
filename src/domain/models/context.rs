//! Immutable request context.
//!
//! An `AgentContext` is constructed once at request ingress and carried
//! through every agent-facing operation. All fields are private with
//! read-only accessors; immutability is enforced by the type system rather
//! than a runtime guard. Validation happens at construction.

use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::error::ContextError;

/// Tenant-scoped request context. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentContext {
    customer_id: Uuid,
    user_id: String,
    permissions: Arc<[String]>,
    session_id: Option<String>,
}

impl AgentContext {
    /// Build a context, validating the tenant identity.
    pub fn new(
        customer_id: Uuid,
        user_id: impl Into<String>,
        permissions: Vec<String>,
        session_id: Option<String>,
    ) -> Result<Self, ContextError> {
        if customer_id.is_nil() {
            return Err(ContextError::NilCustomerId);
        }
        let user_id = user_id.into();
        if user_id.is_empty() {
            return Err(ContextError::EmptyUserId);
        }
        Ok(Self {
            customer_id,
            user_id,
            permissions: permissions.into(),
            session_id,
        })
    }

    pub fn customer_id(&self) -> Uuid {
        self.customer_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn permissions(&self) -> &[String] {
        &self.permissions
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_nil_customer_id() {
        let err = AgentContext::new(Uuid::nil(), "user", vec![], None).unwrap_err();
        assert_eq!(err, ContextError::NilCustomerId);
    }

    #[test]
    fn rejects_empty_user_id() {
        let err = AgentContext::new(Uuid::new_v4(), "", vec![], None).unwrap_err();
        assert_eq!(err, ContextError::EmptyUserId);
    }

    #[test]
    fn fields_stable_after_construction() {
        let customer = Uuid::new_v4();
        let ctx = AgentContext::new(
            customer,
            "alice@example.test",
            vec!["read_analytics".into()],
            Some("sess-1".into()),
        )
        .unwrap();

        // Only read accessors exist; a clone observes identical fields.
        let copy = ctx.clone();
        assert_eq!(copy.customer_id(), customer);
        assert_eq!(copy.user_id(), "alice@example.test");
        assert!(copy.has_permission("read_analytics"));
        assert!(!copy.has_permission("write_content"));
        assert_eq!(copy.session_id(), Some("sess-1"));
        assert_eq!(copy, ctx);
    }
}
