//! Terminal tool handler: forwards decomposed calls to the downstream API.

use crate::chain::CallContext;
use crate::composer::DecomposedArguments;
use crate::operation::{OperationRef, is_json_media_type};
use crate::tools::ToolHandler;
use async_trait::async_trait;
use openapi_mcp_http_tools::request::OutboundRequest;
use openapi_mcp_http_tools::{HttpExecutor, HttpOutcome};
use reqwest::StatusCode;
use rmcp::model::{CallToolResult, Content};
use serde_json::{Value, json};
use std::time::Instant;

pub const DEFAULT_SUCCESS_RESPONSE: &str = r#"{"message":"Tool call completed successfully"}"#;

#[derive(Debug, Clone)]
pub struct HttpToolHandler {
    executor: HttpExecutor,
    json_double_serialization_mitigation: bool,
}

impl HttpToolHandler {
    #[must_use]
    pub fn new(executor: HttpExecutor, json_double_serialization_mitigation: bool) -> Self {
        Self {
            executor,
            json_double_serialization_mitigation,
        }
    }

    async fn send(
        &self,
        operation: &OperationRef,
        request: &OutboundRequest,
        ctx: &CallContext,
    ) -> Option<HttpOutcome> {
        let outcome = self
            .executor
            .execute(request, ctx.authorization.as_deref())
            .await;
        let status = match &outcome {
            Ok(o) => o.status,
            Err(_) => StatusCode::BAD_GATEWAY,
        };
        metrics::counter!(
            "openapi_mcp_api_calls_total",
            "operation_id" => operation_label(operation),
            "status_code" => status.as_u16().to_string()
        )
        .increment(1);

        match outcome {
            Ok(o) => Some(o),
            Err(e) => {
                tracing::error!(
                    tool = %ctx.tool_name,
                    "Error while calling tool: {e}. Downstream request failed."
                );
                None
            }
        }
    }

    /// A retry request when a 400 may have been caused by JSON sent as strings.
    fn corrected(&self, outcome: &HttpOutcome, request: &OutboundRequest) -> Option<OutboundRequest> {
        if !self.json_double_serialization_mitigation || outcome.status != StatusCode::BAD_REQUEST {
            return None;
        }
        let body = request.body.as_ref()?;
        if !is_json_media_type(&body.content_type) {
            return None;
        }
        let content = correct_double_serialization(&body.content)?;
        tracing::info!("JSON double serialization detected and corrected.");
        let mut retry = request.clone();
        if let Some(b) = retry.body.as_mut() {
            b.content = content;
        }
        Some(retry)
    }
}

#[async_trait]
impl ToolHandler for HttpToolHandler {
    async fn handle(
        &self,
        operation: &OperationRef,
        arguments: DecomposedArguments,
        ctx: &CallContext,
    ) -> CallToolResult {
        metrics::counter!(
            "openapi_mcp_tool_calls_total",
            "tool_name" => ctx.tool_name.clone(),
            "operation_id" => operation_label(operation)
        )
        .increment(1);
        let started = Instant::now();

        let request = arguments.into_request(operation);
        let mut outcome = self.send(operation, &request, ctx).await;
        if let Some(retry) = outcome.as_ref().and_then(|o| self.corrected(o, &request)) {
            outcome = self.send(operation, &retry, ctx).await;
        }

        let result = match outcome {
            Some(o) => to_result(o),
            None => bad_gateway(),
        };
        metrics::histogram!(
            "openapi_mcp_tool_call_duration_seconds",
            "tool_name" => ctx.tool_name.clone(),
            "is_error" => result.is_error.unwrap_or(false).to_string()
        )
        .record(started.elapsed().as_secs_f64());
        result
    }
}

fn operation_label(operation: &OperationRef) -> String {
    operation
        .operation_id()
        .map_or_else(|| operation.label(), str::to_string)
}

fn to_result(outcome: HttpOutcome) -> CallToolResult {
    if outcome.is_error() {
        tracing::debug!(status = %outcome.status, "downstream API answered with an error status");
        return CallToolResult::error(vec![Content::text(outcome.body)]);
    }
    let body = if outcome.body.is_empty() {
        DEFAULT_SUCCESS_RESPONSE.to_string()
    } else {
        outcome.body
    };
    CallToolResult::success(vec![Content::text(body)])
}

fn bad_gateway() -> CallToolResult {
    let model = json!({
        "error": "Bad Gateway",
        "description": "The server received an invalid response from an upstream server.",
    });
    CallToolResult::error(vec![Content::text(model.to_string())])
}

/// Replace string values that hold a JSON object or array with the parsed value, recursively.
/// `None` if nothing changed.
#[must_use]
pub fn correct_double_serialization(value: &Value) -> Option<Value> {
    let corrected = unwrap_json_strings(value);
    (corrected != *value).then_some(corrected)
}

fn unwrap_json_strings(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), unwrap_json_strings(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(unwrap_json_strings).collect()),
        Value::String(s) => {
            let trimmed = s.trim();
            let looks_like_json = (trimmed.starts_with('{') && trimmed.ends_with('}'))
                || (trimmed.starts_with('[') && trimmed.ends_with(']'));
            if looks_like_json && let Ok(parsed) = serde_json::from_str::<Value>(trimmed) {
                return unwrap_json_strings(&parsed);
            }
            value.clone()
        }
        other => other.clone(),
    }
}
