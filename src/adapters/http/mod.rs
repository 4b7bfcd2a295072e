//! HTTP surface: context-enforcement middleware and task endpoints.

pub mod api;
pub mod enforcement;

pub use api::{app, AppState};
pub use enforcement::{context_hash, EnforcementState, TenantId};
