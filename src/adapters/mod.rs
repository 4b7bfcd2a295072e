//! Adapters: concrete implementations of the domain ports.

pub mod gateway;
pub mod http;
pub mod memory;
pub mod policy_store;
pub mod publisher;
pub mod sqlite;

pub use gateway::GatewayClient;
pub use memory::InMemoryVectorStore;
pub use policy_store::InMemoryPolicyStore;
pub use publisher::{BroadcastPublisher, TracingPublisher};
