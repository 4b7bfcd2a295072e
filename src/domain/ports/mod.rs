//! Ports: async-trait interfaces between the domain and its adapters.

pub mod agent_invoker;
pub mod history_store;
pub mod policy_store;
pub mod publisher;
pub mod task_store;
pub mod vector_store;

pub use agent_invoker::{AgentInvoker, AgentReply, StreamEvent};
pub use history_store::{
    HistoryEvent, HistoryEventKind, HistoryStore, RunStatus, WorkflowRun,
};
pub use policy_store::{CreateOutcome, PolicyStore};
pub use publisher::{task_channel, NullPublisher, RealtimePublisher};
pub use task_store::{TaskStore, TaskUpdate};
pub use vector_store::VectorStore;
