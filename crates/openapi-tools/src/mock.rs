//! Serves tool calls from response examples in the document.

use crate::chain::{CallContext, Next, TERMINAL_ORDER, ToolCallFilter, ToolCallRequest};
use crate::error::Result;
use async_trait::async_trait;
use rmcp::model::{CallToolResult, Content};
use serde_json::{Map, Value};

pub const MISSING_EXAMPLE: &str = "Missing OpenAPI example for mocking";
const SUPPORTED_MEDIA_TYPE: &str = "application/json";

/// Answers every call with the first successful-response example instead of calling the API.
/// Inactive (pure pass-through) unless enabled.
#[derive(Debug, Clone, Copy)]
pub struct ToolResultMocker {
    enabled: bool,
}

impl ToolResultMocker {
    pub const ORDER: i32 = TERMINAL_ORDER - 1;

    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

#[async_trait]
impl ToolCallFilter for ToolResultMocker {
    fn order(&self) -> i32 {
        Self::ORDER
    }

    async fn filter(
        &self,
        ctx: &CallContext,
        request: ToolCallRequest,
        next: Next<'_>,
    ) -> Result<CallToolResult> {
        if !self.enabled {
            return next.run(ctx, request).await;
        }
        tracing::trace!(tool = %request.name, "mocking tool call");

        let Some(operation) = &ctx.operation else {
            tracing::error!(
                tool = %request.name,
                "Missing OpenAPI operation for tool, returning MCP error response"
            );
            return Ok(missing());
        };

        match operation.responses().and_then(pick_example) {
            Some(body) => Ok(CallToolResult::success(vec![Content::text(body)])),
            None => {
                tracing::error!(
                    tool = %request.name,
                    "Missing examples in OpenAPI operation {}, returning MCP error response",
                    operation.label()
                );
                Ok(missing())
            }
        }
    }
}

fn missing() -> CallToolResult {
    CallToolResult::error(vec![Content::text(MISSING_EXAMPLE)])
}

/// `default`, then `2XX`, then `200`..`299`; the first candidate with an example wins.
fn pick_example(responses: &Map<String, Value>) -> Option<String> {
    let fixed = ["default", "2XX", "2xx"].into_iter().map(str::to_string);
    let numbered = (200..300).map(|code: u16| code.to_string());
    fixed
        .chain(numbered)
        .filter_map(|key| responses.get(&key))
        .find_map(example_of)
}

fn example_of(response: &Value) -> Option<String> {
    let media = response
        .get("content")?
        .as_object()?
        .iter()
        .find(|(media_type, _)| media_type.contains(SUPPORTED_MEDIA_TYPE))
        .map(|(_, media)| media)?;

    let from_examples = media
        .get("examples")
        .and_then(Value::as_object)
        .and_then(|examples| {
            examples
                .values()
                .find_map(|e| e.get("value").filter(|v| !v.is_null()))
        });
    let example = from_examples.or_else(|| media.get("example").filter(|v| !v.is_null()))?;

    match serde_json::to_string(example) {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::warn!("Failed to serialize example into JSON: {e}");
            None
        }
    }
}
