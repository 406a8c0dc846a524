//! HTTP method semantics mapped onto MCP `ToolAnnotations` (RFC 9110 safe/idempotent rules).

use reqwest::Method;
use rmcp::model::ToolAnnotations;

/// Annotations for a tool that proxies one HTTP operation.
///
/// `openWorldHint` is always `true`: every proxied call reaches an external system. Extension
/// methods get no other hints.
#[must_use]
pub fn annotations_for_method(method: &Method, title: Option<String>) -> ToolAnnotations {
    // (read_only, destructive, idempotent)
    let hints: (Option<bool>, Option<bool>, Option<bool>) = match method.as_str() {
        "GET" | "HEAD" | "OPTIONS" | "TRACE" => (Some(true), Some(false), Some(true)),
        "POST" => (Some(false), Some(false), Some(false)),
        "PUT" | "DELETE" => (Some(false), Some(true), Some(true)),
        // PATCH may or may not be idempotent.
        "PATCH" => (Some(false), Some(true), None),
        _ => (None, None, None),
    };

    ToolAnnotations {
        title,
        read_only_hint: hints.0,
        destructive_hint: hints.1,
        idempotent_hint: hints.2,
        open_world_hint: Some(true),
    }
}
