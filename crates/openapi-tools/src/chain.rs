//! Per-call interceptor chain.
//!
//! Interceptors run in ascending [`ToolCallFilter::order`] (ties keep registration order),
//! then the tool itself. Each link receives a [`Next`] it may call, skip or wrap.

use crate::error::{OpenApiToolsError, Result};
use crate::operation::OperationRef;
use async_trait::async_trait;
use rmcp::model::{CallToolResult, JsonObject};
use std::sync::Arc;

/// Order of the tool itself: always last.
pub const TERMINAL_ORDER: i32 = i32::MAX;

/// Per-call data threaded unchanged through the chain.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub session_id: Option<String>,
    pub client_info: Option<String>,
    /// `Authorization` value of the inbound RPC request, forwarded downstream.
    pub authorization: Option<String>,
    pub tool_name: String,
    pub operation: Option<Arc<OperationRef>>,
}

impl CallContext {
    #[must_use]
    pub fn for_tool(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallRequest {
    pub name: String,
    pub arguments: Option<JsonObject>,
}

impl ToolCallRequest {
    #[must_use]
    pub fn new(name: impl Into<String>, arguments: Option<JsonObject>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

#[async_trait]
pub trait ToolCallFilter: Send + Sync {
    /// Lower runs first.
    fn order(&self) -> i32 {
        0
    }

    /// Handle the call, usually by delegating to `next`.
    ///
    /// # Errors
    ///
    /// Propagates [`OpenApiToolsError::ChainExhausted`] from `next`.
    async fn filter(
        &self,
        ctx: &CallContext,
        request: ToolCallRequest,
        next: Next<'_>,
    ) -> Result<CallToolResult>;
}

/// The rest of the chain.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    remaining: &'a [Arc<dyn ToolCallFilter>],
}

impl Next<'_> {
    /// Invoke the next link.
    ///
    /// # Errors
    ///
    /// Returns [`OpenApiToolsError::ChainExhausted`] if no link is left.
    pub async fn run(self, ctx: &CallContext, request: ToolCallRequest) -> Result<CallToolResult> {
        let Some((link, rest)) = self.remaining.split_first() else {
            tracing::error!(
                tool = %request.name,
                "Tool call filter chain exhausted without any of the filters returning a response."
            );
            return Err(OpenApiToolsError::ChainExhausted(request.name));
        };
        link.filter(ctx, request, Next { remaining: rest }).await
    }
}

/// Interceptors followed by one terminal link.
#[derive(Clone)]
pub struct ToolCallFilterChain {
    links: Vec<Arc<dyn ToolCallFilter>>,
}

impl std::fmt::Debug for ToolCallFilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCallFilterChain")
            .field(
                "orders",
                &self.links.iter().map(|l| l.order()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ToolCallFilterChain {
    #[must_use]
    pub fn new(terminal: Arc<dyn ToolCallFilter>, interceptors: &[Arc<dyn ToolCallFilter>]) -> Self {
        let mut links = interceptors.to_vec();
        links.sort_by_key(|l| l.order());
        links.push(terminal);
        Self { links }
    }

    /// # Errors
    ///
    /// Returns [`OpenApiToolsError::ChainExhausted`] if every link delegated onwards.
    pub async fn call(&self, ctx: &CallContext, request: ToolCallRequest) -> Result<CallToolResult> {
        Next {
            remaining: &self.links,
        }
        .run(ctx, request)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use rmcp::model::Content;

    struct Recording {
        label: &'static str,
        order: i32,
        log: Arc<Mutex<Vec<&'static str>>>,
        short_circuit: bool,
        terminal: bool,
    }

    #[async_trait]
    impl ToolCallFilter for Recording {
        fn order(&self) -> i32 {
            self.order
        }

        async fn filter(
            &self,
            ctx: &CallContext,
            request: ToolCallRequest,
            next: Next<'_>,
        ) -> Result<CallToolResult> {
            self.log.lock().push(self.label);
            if self.short_circuit || self.terminal {
                return Ok(CallToolResult::success(vec![Content::text(self.label)]));
            }
            next.run(ctx, request).await
        }
    }

    fn link(
        label: &'static str,
        order: i32,
        log: &Arc<Mutex<Vec<&'static str>>>,
    ) -> Arc<dyn ToolCallFilter> {
        Arc::new(Recording {
            label,
            order,
            log: Arc::clone(log),
            short_circuit: false,
            terminal: false,
        })
    }

    fn text(result: &CallToolResult) -> String {
        result.content[0].as_text().map(|t| t.text.clone()).unwrap_or_default()
    }

    #[tokio::test]
    async fn runs_in_ascending_order_and_returns_terminal_result() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let terminal: Arc<dyn ToolCallFilter> = Arc::new(Recording {
            label: "tool",
            order: TERMINAL_ORDER,
            log: Arc::clone(&log),
            short_circuit: false,
            terminal: true,
        });
        let chain = ToolCallFilterChain::new(
            terminal,
            &[
                link("late", 100, &log),
                link("early", 0, &log),
                link("lowest", TERMINAL_ORDER, &log),
                link("early2", 0, &log),
            ],
        );

        let result = chain
            .call(&CallContext::for_tool("t"), ToolCallRequest::new("t", None))
            .await
            .unwrap();
        assert_eq!(text(&result), "tool");
        assert_eq!(*log.lock(), vec!["early", "early2", "late", "lowest", "tool"]);
    }

    #[tokio::test]
    async fn short_circuit_skips_the_rest() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let stop: Arc<dyn ToolCallFilter> = Arc::new(Recording {
            label: "mock",
            order: TERMINAL_ORDER - 1,
            log: Arc::clone(&log),
            short_circuit: true,
            terminal: false,
        });
        let chain = ToolCallFilterChain::new(link("tool", TERMINAL_ORDER, &log), &[
            stop,
            link("first", 0, &log),
        ]);
        let result = chain
            .call(&CallContext::for_tool("t"), ToolCallRequest::new("t", None))
            .await
            .unwrap();
        assert_eq!(text(&result), "mock");
        assert_eq!(*log.lock(), vec!["first", "mock"]);
    }

    #[tokio::test]
    async fn exhausted_chain_is_an_error() {
        let log = Arc::new(Mutex::new(Vec::new()));
        // A terminal that delegates onwards leaves nothing to answer.
        let chain = ToolCallFilterChain::new(link("pass", TERMINAL_ORDER, &log), &[]);
        let err = chain
            .call(&CallContext::for_tool("t"), ToolCallRequest::new("t", None))
            .await
            .unwrap_err();
        assert!(matches!(err, OpenApiToolsError::ChainExhausted(ref name) if name == "t"));
    }
}
