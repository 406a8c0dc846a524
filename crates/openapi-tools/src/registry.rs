//! Owner of the current, fully resolved document.

use crate::config::OpenApiMcpConfig;
use crate::document::SpecDocument;
use crate::error::{OpenApiToolsError, Result};
use crate::filter::OpenApiFilterChain;
use crate::reader::OpenApiReader;
use crate::resolver::{DocId, DocumentLoader, OpenApiResolver};
use parking_lot::RwLock;
use std::sync::Arc;

/// read -> filter -> resolve -> store.
///
/// Readers get a cheap `Arc` snapshot; a reload builds a new document and swaps it in, so a
/// concurrent reader sees either the old or the new document. Reloads are serialized.
#[derive(Debug)]
pub struct SpecificationRegistry {
    location: String,
    root: DocId,
    reader: OpenApiReader,
    filters: OpenApiFilterChain,
    document: RwLock<Arc<SpecDocument>>,
    reload_lock: tokio::sync::Mutex<()>,
}

impl SpecificationRegistry {
    /// Run the pipeline once and keep the result.
    ///
    /// # Errors
    ///
    /// Fails if the first load fails; a registry never exists without a document.
    pub async fn load(
        location: impl Into<String>,
        reader: OpenApiReader,
        filters: OpenApiFilterChain,
    ) -> Result<Self> {
        let location = location.into();
        let root = DocId::parse(&location)?;
        let document = compile(&location, &root, &reader, &filters).await?;
        Ok(Self {
            location,
            root,
            reader,
            filters,
            document: RwLock::new(Arc::new(document)),
            reload_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Registry for `config.openApiUrl` with the standard filter chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the first load fails.
    pub async fn from_config(config: &OpenApiMcpConfig) -> Result<Self> {
        let http = config.http_client_config();
        let mut builder = reqwest::Client::builder()
            .connect_timeout(http.connect_timeout())
            .timeout(http.connect_timeout() + http.read_timeout());
        if let Some(ua) = http.user_agent.as_deref().filter(|ua| !ua.trim().is_empty()) {
            builder = builder.user_agent(ua.to_string());
        }
        let client = builder
            .build()
            .map_err(|e| OpenApiToolsError::Config(format!("failed to build HTTP client: {e}")))?;
        let reader = OpenApiReader::new(DocumentLoader::new(client))
            .with_spec_hash(config.spec_hash.clone(), config.spec_hash_policy);
        let filters = OpenApiFilterChain::standard(config.filters.clone());
        Self::load(config.open_api_url.clone(), reader, filters).await
    }

    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    /// The document currently published.
    #[must_use]
    pub fn current(&self) -> Arc<SpecDocument> {
        Arc::clone(&*self.document.read())
    }

    /// `info.version` of the current document.
    #[must_use]
    pub fn version(&self) -> Option<String> {
        self.document.read().version().map(str::to_string)
    }

    /// Re-run the whole pipeline and replace the document.
    ///
    /// # Errors
    ///
    /// Returns the pipeline error; the previous document stays in place.
    pub async fn reload(&self) -> Result<()> {
        let _guard = self.reload_lock.lock().await;
        tracing::info!("Loading OpenAPI from {}.", self.root.display());
        let document = compile(&self.location, &self.root, &self.reader, &self.filters)
            .await
            .inspect_err(|e| self.log_failure(e))?;
        self.store(document);
        Ok(())
    }

    /// Fetch the document and, only if its `info.version` differs from `current_version`,
    /// filter, resolve and store it. `None` means "no known version" and always counts as
    /// updated. Returns whether the stored document was replaced.
    ///
    /// # Errors
    ///
    /// Returns the pipeline error; the previous document stays in place.
    pub async fn reload_if_updated(&self, current_version: Option<&str>) -> Result<bool> {
        let _guard = self.reload_lock.lock().await;
        let raw = self
            .reader
            .read(&self.location)
            .await
            .inspect_err(|e| self.log_failure(e))?;

        if let Some(current) = current_version
            && raw.version() == Some(current)
        {
            tracing::info!(version = %current, "No new OpenAPI found, skipping reload.");
            return Ok(false);
        }

        let document = finish(&self.root, &self.reader, &self.filters, raw)
            .await
            .inspect_err(|e| self.log_failure(e))?;
        self.store(document);
        Ok(true)
    }

    fn store(&self, document: SpecDocument) {
        tracing::info!(
            version = document.version().unwrap_or_default(),
            operations = document.operation_count(),
            "Successfully loaded OpenAPI from {}.",
            self.root.display()
        );
        *self.document.write() = Arc::new(document);
    }

    fn log_failure(&self, e: &OpenApiToolsError) {
        tracing::error!("Failed to load OpenAPI from {}: {}", self.root.display(), e);
    }
}

async fn compile(
    location: &str,
    root: &DocId,
    reader: &OpenApiReader,
    filters: &OpenApiFilterChain,
) -> Result<SpecDocument> {
    let raw = reader.read(location).await?;
    finish(root, reader, filters, raw).await
}

async fn finish(
    root: &DocId,
    reader: &OpenApiReader,
    filters: &OpenApiFilterChain,
    mut document: SpecDocument,
) -> Result<SpecDocument> {
    filters.apply(&mut document)?;
    OpenApiResolver::new(reader.loader())
        .resolve(root, document)
        .await
}
