//! Standalone adapter: one OpenAPI document served as MCP tools.

pub mod app;
pub mod config;
pub mod error;

pub use app::App;
pub use config::{AdapterConfig, SessionMode};
pub use error::{AdapterError, Result};
