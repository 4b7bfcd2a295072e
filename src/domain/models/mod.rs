//! Domain models.

pub mod agent;
pub mod config;
pub mod context;
pub mod decision;
pub mod delegation;
pub mod memory;
pub mod plan;
pub mod policy;
pub mod task;

pub use agent::{HiredAgent, MarketplaceAgent, Peer, SeniorityTier};
pub use config::Config;
pub use context::AgentContext;
pub use decision::{
    DecisionMethod, DecisionRecord, DelegationAction, DelegationDecision, SubtaskSpec,
};
pub use delegation::{
    DelegationContext, DelegationInput, DelegationOutcome, DelegationResult, DelegationStatus,
    DelegationType,
};
pub use memory::{MemoryFilter, MemoryItem};
pub use plan::{Plan, PlanStatus, PlanStep};
pub use policy::{RouteInfo, RouteStatus};
pub use task::{
    AuthorType, Comment, EscalationAttempt, Task, TaskPhase, TaskPriority, TaskStatus,
};
