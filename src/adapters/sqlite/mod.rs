//! SQLite persistence adapters.

pub mod connection;
pub mod history_store;
pub mod migrations;
pub mod task_store;

pub use connection::{create_pool, create_test_pool, PoolConfig};
pub use history_store::SqliteHistoryStore;
pub use migrations::run_migrations;
pub use task_store::SqliteTaskStore;
