//! Wires the engine together for one configured document.

use crate::config::{AdapterConfig, SessionMode};
use crate::error::Result;
use openapi_mcp_http_tools::HttpExecutor;
use openapi_mcp_tools::base_url::resolve_api_base_url;
use openapi_mcp_tools::chain::ToolCallFilter;
use openapi_mcp_tools::composer::InputSchemaComposer;
use openapi_mcp_tools::document::SpecDocument;
use openapi_mcp_tools::live_reload::{LiveReload, spawn_scheduler};
use openapi_mcp_tools::mock::ToolResultMocker;
use openapi_mcp_tools::naming::naming_strategy;
use openapi_mcp_tools::proxy::HttpToolHandler;
use openapi_mcp_tools::publish::{PublishedTools, ToolServer};
use openapi_mcp_tools::registry::SpecificationRegistry;
use openapi_mcp_tools::scopes::ScopeDiscovery;
use openapi_mcp_tools::tools::ToolRegistry;
use parking_lot::RwLock;
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct App {
    config: AdapterConfig,
    tools: Arc<ToolRegistry>,
    published: Arc<PublishedTools>,
    scopes: Option<ScopeCache>,
}

/// Discovered scopes, recomputed whenever live reload swaps the document.
struct ScopeCache {
    discovery: ScopeDiscovery,
    last: RwLock<(Arc<SpecDocument>, Arc<BTreeSet<String>>)>,
}

impl ScopeCache {
    fn new(discovery: ScopeDiscovery, document: Arc<SpecDocument>) -> Self {
        let scopes = Arc::new(discovery.discover(&document));
        Self {
            discovery,
            last: RwLock::new((document, scopes)),
        }
    }

    fn for_document(&self, document: Arc<SpecDocument>) -> Arc<BTreeSet<String>> {
        {
            let last = self.last.read();
            if Arc::ptr_eq(&last.0, &document) {
                return Arc::clone(&last.1);
            }
        }
        let scopes = Arc::new(self.discovery.discover(&document));
        *self.last.write() = (document, Arc::clone(&scopes));
        scopes
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("spec", &self.config.engine.open_api_url)
            .field("published", &self.published)
            .finish_non_exhaustive()
    }
}

impl App {
    /// Load the document, compile the catalog and publish it.
    ///
    /// # Errors
    ///
    /// Fails if the document cannot be loaded, no base URL can be determined, or any
    /// operation cannot be compiled into a tool.
    pub async fn build(config: AdapterConfig) -> Result<Self> {
        let engine = &config.engine;
        let specs = Arc::new(SpecificationRegistry::from_config(engine).await?);
        let document = specs.current();

        let base_url =
            resolve_api_base_url(engine.api_base_url.as_ref(), &document, specs.location())?;
        tracing::info!(base_url = %base_url, "Resolved API base URL");
        let executor = HttpExecutor::new(&engine.http_client_config(), base_url)?;
        let handler = HttpToolHandler::new(
            executor,
            engine.tools.json_double_serialization_mitigation,
        );

        let tools = Arc::new(ToolRegistry::new(
            specs,
            naming_strategy(&engine.tools.naming)?,
            InputSchemaComposer::new(&engine.tools.schema),
            Arc::new(handler),
            engine.tools.prepend_summary_to_description,
        ));
        let catalog = tools.get_tools()?;

        let interceptors: Vec<Arc<dyn ToolCallFilter>> =
            vec![Arc::new(ToolResultMocker::new(engine.tools.mock))];
        let published = Arc::new(match config.session_mode {
            SessionMode::Stateful => PublishedTools::stateful(interceptors),
            SessionMode::Stateless => PublishedTools::stateless(interceptors),
        });
        published.publish_all(catalog.iter());
        tracing::info!(
            tools = published.len(),
            mock = engine.tools.mock,
            stateful = published.is_stateful(),
            "Published tools"
        );

        let scopes = engine.scope_discovery.enabled.then(|| {
            ScopeCache::new(ScopeDiscovery::new(&engine.scope_discovery), document)
        });

        Ok(Self {
            config,
            tools,
            published,
            scopes,
        })
    }

    #[must_use]
    pub fn published(&self) -> &Arc<PublishedTools> {
        &self.published
    }

    #[must_use]
    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Scopes a client should request for the current document; `None` when discovery is
    /// disabled.
    #[must_use]
    pub fn scopes(&self) -> Option<Arc<BTreeSet<String>>> {
        let cache = self.scopes.as_ref()?;
        Some(cache.for_document(self.tools.specs().current()))
    }

    /// `{"tools": [...], "scopes": [...]}` as served to clients.
    #[must_use]
    pub fn catalog_json(&self) -> Value {
        json!({
            "tools": self.published.list_tools(),
            "scopes": self.scopes().as_deref(),
        })
    }

    /// Spawn the live-reload scheduler; `None` when live reload is disabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the cron expression is invalid.
    pub fn start_live_reload(&self, cancel: &CancellationToken) -> Result<Option<JoinHandle<()>>> {
        let live_reload = &self.config.engine.live_reload;
        if !live_reload.enabled {
            tracing::debug!("Live reload disabled");
            return Ok(None);
        }
        let schedule = live_reload.schedule()?;
        let reload = Arc::new(LiveReload::new(
            Arc::clone(&self.tools),
            Arc::clone(&self.published) as Arc<dyn ToolServer>,
            live_reload.max_retries,
            cancel.clone(),
        ));
        tracing::info!(cron = %live_reload.cron_expression, "Live reload enabled");
        Ok(Some(spawn_scheduler(reload, schedule, cancel.clone())))
    }
}
