//! The tool set currently exposed to MCP clients.

use crate::chain::{CallContext, ToolCallFilter, ToolCallFilterChain, ToolCallRequest};
use crate::tools::RegisteredTool;
use async_trait::async_trait;
use parking_lot::RwLock;
use rmcp::model::{CallToolResult, Content, JsonObject, Tool};
use rmcp::service::{Peer, RoleServer};
use std::collections::HashMap;
use std::sync::Arc;

/// Live server as seen by the reload cycle.
#[async_trait]
pub trait ToolServer: Send + Sync {
    /// Publish `tool`, replacing any tool with the same name.
    fn add_tool(&self, tool: Arc<RegisteredTool>);

    /// `true` if a tool was removed.
    fn remove_tool(&self, name: &str) -> bool;

    async fn notify_tools_list_changed(&self);

    fn is_stateful(&self) -> bool;
}

struct Published {
    tool: Arc<RegisteredTool>,
    chain: ToolCallFilterChain,
}

enum Sessions {
    Stateful(RwLock<HashMap<String, Peer<RoleServer>>>),
    Stateless,
}

/// In-memory [`ToolServer`]. Every tool is served through its own filter chain built from
/// the shared interceptors.
pub struct PublishedTools {
    interceptors: Vec<Arc<dyn ToolCallFilter>>,
    tools: RwLock<Vec<Published>>,
    sessions: Sessions,
}

impl std::fmt::Debug for PublishedTools {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishedTools")
            .field("tools", &self.tools.read().len())
            .field("stateful", &self.is_stateful())
            .finish_non_exhaustive()
    }
}

impl PublishedTools {
    /// Sessions are tracked and told about catalog changes.
    #[must_use]
    pub fn stateful(interceptors: Vec<Arc<dyn ToolCallFilter>>) -> Self {
        Self::with_sessions(interceptors, Sessions::Stateful(RwLock::new(HashMap::new())))
    }

    /// Clients re-list on every request; nothing to notify.
    #[must_use]
    pub fn stateless(interceptors: Vec<Arc<dyn ToolCallFilter>>) -> Self {
        Self::with_sessions(interceptors, Sessions::Stateless)
    }

    fn with_sessions(interceptors: Vec<Arc<dyn ToolCallFilter>>, sessions: Sessions) -> Self {
        Self {
            interceptors,
            tools: RwLock::new(Vec::new()),
            sessions,
        }
    }

    /// Publish a whole catalog in order.
    pub fn publish_all<'a>(&self, tools: impl IntoIterator<Item = &'a Arc<RegisteredTool>>) {
        for tool in tools {
            self.add_tool(Arc::clone(tool));
        }
    }

    pub fn observe_peer(&self, session_id: &str, peer: Peer<RoleServer>) {
        if let Sessions::Stateful(peers) = &self.sessions {
            peers.write().insert(session_id.to_string(), peer);
        }
    }

    pub fn forget_peer(&self, session_id: &str) {
        if let Sessions::Stateful(peers) = &self.sessions {
            peers.write().remove(session_id);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }

    #[must_use]
    pub fn tool_names(&self) -> Vec<String> {
        self.tools
            .read()
            .iter()
            .map(|p| p.tool.name().to_string())
            .collect()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<RegisteredTool>> {
        self.tools
            .read()
            .iter()
            .find(|p| p.tool.name() == name)
            .map(|p| Arc::clone(&p.tool))
    }

    #[must_use]
    pub fn list_tools(&self) -> Vec<Tool> {
        self.tools.read().iter().map(|p| p.tool.to_mcp_tool()).collect()
    }

    /// Run `name` through its filter chain. The context gets the tool's name and operation.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
        mut ctx: CallContext,
    ) -> CallToolResult {
        let found = self
            .tools
            .read()
            .iter()
            .find(|p| p.tool.name() == name)
            .map(|p| (Arc::clone(&p.tool), p.chain.clone()));
        let Some((tool, chain)) = found else {
            tracing::warn!(tool = %name, "call for unknown tool");
            return CallToolResult::error(vec![Content::text(format!("Tool not found: {name}"))]);
        };

        ctx.tool_name = name.to_string();
        ctx.operation = Some(Arc::clone(&tool.operation));
        match chain.call(&ctx, ToolCallRequest::new(name, arguments)).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(tool = %name, "tool call failed: {e}");
                CallToolResult::error(vec![Content::text(e.to_string())])
            }
        }
    }
}

#[async_trait]
impl ToolServer for PublishedTools {
    fn add_tool(&self, tool: Arc<RegisteredTool>) {
        let terminal: Arc<dyn ToolCallFilter> = Arc::clone(&tool) as Arc<dyn ToolCallFilter>;
        let chain = ToolCallFilterChain::new(terminal, &self.interceptors);
        let entry = Published { tool, chain };
        let mut tools = self.tools.write();
        match tools.iter_mut().find(|p| p.tool.name() == entry.tool.name()) {
            Some(slot) => *slot = entry,
            None => tools.push(entry),
        }
    }

    fn remove_tool(&self, name: &str) -> bool {
        let mut tools = self.tools.write();
        let before = tools.len();
        tools.retain(|p| p.tool.name() != name);
        tools.len() != before
    }

    async fn notify_tools_list_changed(&self) {
        let Sessions::Stateful(peers) = &self.sessions else {
            return;
        };
        let snapshot: Vec<(String, Peer<RoleServer>)> = peers
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut dead: Vec<String> = Vec::new();
        for (session_id, peer) in snapshot {
            if let Err(e) = peer.notify_tool_list_changed().await {
                tracing::debug!(mcp_session_id = %session_id, error = %e, "failed to send tools list_changed");
                dead.push(session_id);
            }
        }

        if !dead.is_empty() {
            let mut map = peers.write();
            for id in dead {
                map.remove(&id);
            }
        }
    }

    fn is_stateful(&self) -> bool {
        matches!(self.sessions, Sessions::Stateful(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::InputSchemaComposer;
    use crate::mock::{MISSING_EXAMPLE, ToolResultMocker};
    use crate::naming::SanitizedOperationIdStrategy;
    use crate::tools::tests::{Echo, PETSTORE, specs_from};
    use crate::tools::{ToolCatalog, ToolHandler, ToolRegistry};
    use serde_json::json;

    async fn catalog() -> (tempfile::TempDir, ToolCatalog) {
        let (dir, specs) = specs_from(PETSTORE).await;
        let registry = ToolRegistry::new(
            specs,
            Box::new(SanitizedOperationIdStrategy),
            InputSchemaComposer::default(),
            Arc::new(Echo::default()) as Arc<dyn ToolHandler>,
            true,
        );
        let tools = registry.get_tools().unwrap();
        (dir, tools)
    }

    fn text(result: &CallToolResult) -> String {
        result.content[0].as_text().map(|t| t.text.clone()).unwrap_or_default()
    }

    #[tokio::test]
    async fn add_replaces_by_name_and_remove_reports() {
        let (_dir, tools) = catalog().await;
        let published = PublishedTools::stateless(Vec::new());
        published.publish_all(tools.iter());
        assert_eq!(published.tool_names(), vec!["listpets", "create_pet", "health"]);

        published.add_tool(Arc::clone(&tools[0]));
        assert_eq!(published.len(), 3);
        assert!(published.remove_tool("health"));
        assert!(!published.remove_tool("health"));
        assert_eq!(published.list_tools().len(), 2);
        assert!(!published.is_stateful());
        assert!(PublishedTools::stateful(Vec::new()).is_stateful());
    }

    #[tokio::test]
    async fn calls_go_through_the_chain() {
        let (_dir, tools) = catalog().await;
        let published = PublishedTools::stateless(Vec::new());
        published.publish_all(tools.iter());

        let result = published
            .call_tool("listpets", json!({"limit": 2}).as_object().cloned(), CallContext::default())
            .await;
        assert_eq!(text(&result), "GET /pets");

        let missing = published.call_tool("nope", None, CallContext::default()).await;
        assert_eq!(missing.is_error, Some(true));
        assert_eq!(text(&missing), "Tool not found: nope");
    }

    #[tokio::test]
    async fn mocker_sees_the_operation() {
        let (_dir, tools) = catalog().await;
        let mocker: Arc<dyn ToolCallFilter> = Arc::new(ToolResultMocker::new(true));
        let published = PublishedTools::stateful(vec![mocker]);
        published.publish_all(tools.iter());

        let result = published.call_tool("listpets", None, CallContext::default()).await;
        assert_eq!(text(&result), r#"[{"name":"Rex"}]"#);

        let result = published.call_tool("health", None, CallContext::default()).await;
        assert_eq!(text(&result), MISSING_EXAMPLE);

        // No sessions observed: notifying is a no-op.
        published.notify_tools_list_changed().await;
    }
}
