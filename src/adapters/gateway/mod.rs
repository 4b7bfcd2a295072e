//! Agent gateway client (JSON-RPC 2.0 + SSE).

pub mod client;
pub mod sse;
pub mod types;

pub use client::GatewayClient;
