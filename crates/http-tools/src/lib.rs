//! Outbound HTTP plumbing shared by the `openapi-mcp` tool runtime.
//!
//! This crate knows nothing about `OpenAPI` documents. It turns an already-decomposed request
//! (path template, grouped parameters, optional JSON body) into a downstream HTTP call, and maps
//! HTTP method semantics onto MCP tool annotations.

pub mod config;
pub mod request;
pub mod runtime;
pub mod semantics;

pub use runtime::{HttpExecutor, HttpOutcome, HttpToolsError, Result};
