//! Domain layer: core models, ports, and error types.

pub mod error;
pub mod models;
pub mod ports;

pub use error::{
    ConfigError, ContextError, FabricError, GatewayError, StoreError, TaskError, WorkflowError,
};
