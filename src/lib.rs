//! Veplane - Virtual Employee Platform Control Plane
//!
//! The orchestration core for a multi-tenant virtual-employee platform:
//! - Durable task orchestration with signals, queries, and replay
//! - Intelligent agent-driven delegation (handle / delegate / parallel / clarify)
//! - Tenant access fabric over declarative Route + TrafficPolicy objects
//! - Context isolation: immutable request context, scoped memory, leakage scanning

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod engine;
pub mod infrastructure;
pub mod services;
pub mod workflows;

// Re-export key types for convenience
pub use domain::models::config::Config;
pub use infrastructure::config::ConfigLoader;
