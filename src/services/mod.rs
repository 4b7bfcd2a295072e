//! Services: the orchestration-plane business logic.

pub mod access_fabric;
pub mod audit_log;
pub mod circuit_breaker;
pub mod hiring;
pub mod leakage_detector;
pub mod peer_discovery;
pub mod scoped_memory;
pub mod task_router;

pub use access_fabric::{AccessFabric, FabricSettings};
pub use hiring::{HiringError, HiringService};
pub use audit_log::{AuditEvent, AuditEventType, AuditFilter, AuditLog};
pub use circuit_breaker::{BreakerRejection, BreakerStats, DelegationCircuitBreaker};
pub use leakage_detector::{AlertKind, AlertSeverity, LeakageAlert, LeakageDetector};
pub use peer_discovery::{format_team_context, PeerDiscovery};
pub use scoped_memory::ScopedMemory;
pub use task_router::{RouteReceipt, TaskRouter};
