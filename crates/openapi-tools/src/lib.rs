//! OpenAPI -> MCP tool engine.
//!
//! A [`registry::SpecificationRegistry`] reads, filters and resolves an OpenAPI document;
//! a [`tools::ToolRegistry`] compiles its operations into MCP tools; a
//! [`publish::PublishedTools`] serves them through a per-call filter chain, and
//! [`live_reload::LiveReload`] keeps the published set in step with the upstream document.

pub mod base_url;
pub mod chain;
pub mod composer;
pub mod config;
pub mod document;
pub mod error;
pub mod filter;
pub mod live_reload;
pub mod mock;
pub mod naming;
pub mod operation;
pub mod proxy;
pub mod publish;
pub mod reader;
pub mod registry;
pub mod resolver;
pub mod scopes;
pub mod tools;
pub mod walker;

pub use error::{OpenApiToolsError, Result};
