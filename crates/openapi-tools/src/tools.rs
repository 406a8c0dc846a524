//! Compiles the current document into tool definitions.

use crate::chain::{CallContext, Next, TERMINAL_ORDER, ToolCallFilter, ToolCallRequest};
use crate::composer::{DecomposedArguments, InputSchemaComposer};
use crate::error::{OpenApiToolsError, Result};
use crate::naming::NamingStrategy;
use crate::operation::{OperationRef, collect_operations};
use crate::registry::SpecificationRegistry;
use async_trait::async_trait;
use openapi_mcp_http_tools::semantics::annotations_for_method;
use parking_lot::RwLock;
use rmcp::model::{CallToolResult, JsonObject, Tool};
use serde_json::{Value, json};
use std::sync::Arc;

/// What clients see of a tool. Equality is structural and drives live-reload diffing.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub title: String,
    pub description: Option<String>,
    pub input_schema: JsonObject,
}

/// Executes a decomposed call against the backing API.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(
        &self,
        operation: &OperationRef,
        arguments: DecomposedArguments,
        ctx: &CallContext,
    ) -> CallToolResult;
}

/// One compiled tool: its definition plus everything needed to serve a call.
pub struct RegisteredTool {
    pub definition: ToolDefinition,
    pub operation: Arc<OperationRef>,
    composer: Arc<InputSchemaComposer>,
    handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("definition", &self.definition)
            .field("operation", &self.operation.label())
            .finish_non_exhaustive()
    }
}

impl RegisteredTool {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// MCP view of the tool, annotated with HTTP method semantics.
    #[must_use]
    pub fn to_mcp_tool(&self) -> Tool {
        let d = &self.definition;
        let mut tool = Tool::new(
            d.name.clone(),
            d.description.clone().unwrap_or_default(),
            Arc::new(d.input_schema.clone()),
        );
        if d.description.is_none() {
            tool.description = None;
        }
        tool.title = Some(d.title.clone());
        tool.annotations = Some(annotations_for_method(
            &self.operation.method,
            Some(d.title.clone()),
        ));
        tool
    }

    /// Decompose the arguments and hand them to the handler.
    pub async fn invoke(&self, ctx: &CallContext, arguments: Option<&JsonObject>) -> CallToolResult {
        let decomposed = self.composer.decompose(&self.operation, arguments);
        self.handler.handle(&self.operation, decomposed, ctx).await
    }
}

#[async_trait]
impl ToolCallFilter for RegisteredTool {
    fn order(&self) -> i32 {
        TERMINAL_ORDER
    }

    async fn filter(
        &self,
        ctx: &CallContext,
        request: ToolCallRequest,
        _next: Next<'_>,
    ) -> Result<CallToolResult> {
        Ok(self.invoke(ctx, request.arguments.as_ref()).await)
    }
}

pub type ToolCatalog = Arc<Vec<Arc<RegisteredTool>>>;

pub struct ToolRegistry {
    specs: Arc<SpecificationRegistry>,
    naming: Box<dyn NamingStrategy>,
    composer: Arc<InputSchemaComposer>,
    handler: Arc<dyn ToolHandler>,
    prepend_summary_to_description: bool,
    cache: RwLock<ToolCatalog>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("cached", &self.cache.read().len())
            .finish_non_exhaustive()
    }
}

impl ToolRegistry {
    #[must_use]
    pub fn new(
        specs: Arc<SpecificationRegistry>,
        naming: Box<dyn NamingStrategy>,
        composer: InputSchemaComposer,
        handler: Arc<dyn ToolHandler>,
        prepend_summary_to_description: bool,
    ) -> Self {
        Self {
            specs,
            naming,
            composer: Arc::new(composer),
            handler,
            prepend_summary_to_description,
            cache: RwLock::new(Arc::new(Vec::new())),
        }
    }

    #[must_use]
    pub fn specs(&self) -> &Arc<SpecificationRegistry> {
        &self.specs
    }

    /// Build every tool from the current document and cache the result.
    ///
    /// # Errors
    ///
    /// Returns [`OpenApiToolsError::ToolRegistration`] for the first operation whose name
    /// cannot be determined; nothing is cached in that case.
    pub fn get_tools(&self) -> Result<ToolCatalog> {
        let document = self.specs.current();
        let tools = collect_operations(&document)
            .into_iter()
            .map(|operation| self.build(operation).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(tools = tools.len(), "built tool catalog");
        let tools = Arc::new(tools);
        *self.cache.write() = Arc::clone(&tools);
        Ok(tools)
    }

    /// The catalog produced by the last successful [`Self::get_tools`].
    #[must_use]
    pub fn cached_tools(&self) -> ToolCatalog {
        Arc::clone(&*self.cache.read())
    }

    fn build(&self, operation: OperationRef) -> Result<RegisteredTool> {
        let name = self
            .naming
            .name(&operation)
            .map_err(|e| OpenApiToolsError::ToolRegistration {
                method: operation.method.to_string(),
                path: operation.path.clone(),
                message: e.to_string(),
            })?;

        let title = operation
            .summary()
            .filter(|s| !s.trim().is_empty())
            .map_or_else(|| name.clone(), str::to_string);
        let description = self.description(&operation);
        let input_schema = match self.composer.compose(&operation) {
            Some(Value::Object(schema)) => schema,
            Some(other) => {
                return Err(OpenApiToolsError::ToolRegistration {
                    method: operation.method.to_string(),
                    path: operation.path.clone(),
                    message: format!("composed input schema is not an object: {other}"),
                });
            }
            None => empty_object_schema(),
        };
        tracing::debug!(tool = %name, operation = %operation.label(), "resolved tool");

        Ok(RegisteredTool {
            definition: ToolDefinition {
                name,
                title,
                description,
                input_schema,
            },
            operation: Arc::new(operation),
            composer: Arc::clone(&self.composer),
            handler: Arc::clone(&self.handler),
        })
    }

    fn description(&self, operation: &OperationRef) -> Option<String> {
        let summary = operation.summary().filter(|s| !s.trim().is_empty());
        let description = operation.description().filter(|s| !s.trim().is_empty());
        match (summary, description) {
            (Some(summary), Some(description)) if self.prepend_summary_to_description => {
                Some(format!("# {summary}\n\n{description}"))
            }
            (_, Some(description)) => Some(description.to_string()),
            (summary, None) => summary.map(str::to_string),
        }
    }
}

fn empty_object_schema() -> JsonObject {
    let mut schema = JsonObject::new();
    schema.insert("type".into(), json!("object"));
    schema.insert("properties".into(), json!({}));
    schema
}
