//! Durable workflow definitions and their activities.

pub mod activities;
pub mod delegation;
pub mod direct_assignment;
pub mod orchestrator;

pub use activities::Activities;
pub use direct_assignment::{direct_assignment_workflow_id, DirectAssignmentInput};
pub use orchestrator::{delegation_workflow_id, orchestrator_workflow_id, OrchestratorInput};
