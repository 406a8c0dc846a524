//! Document filters applied before reference resolution.

mod discriminator;
mod pattern;

pub use discriminator::DiscriminatorFlattener;
pub use pattern::PatternPropertyRemover;

use crate::document::SpecDocument;
use crate::error::{OpenApiToolsError, Result};
use std::collections::HashMap;

/// One transformation of the raw document.
pub trait OpenApiFilter: Send + Sync {
    /// Name used in logs, errors and the per-filter enable map.
    fn name(&self) -> &'static str;

    /// Rewrite the document in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be transformed; the whole pipeline run aborts.
    fn filter(&self, document: &mut SpecDocument) -> Result<()>;
}

/// Ordered filters with per-name toggles (filters are enabled unless switched off).
pub struct OpenApiFilterChain {
    filters: Vec<Box<dyn OpenApiFilter>>,
    enabled: HashMap<String, bool>,
}

impl std::fmt::Debug for OpenApiFilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenApiFilterChain")
            .field(
                "filters",
                &self.filters.iter().map(|flt| flt.name()).collect::<Vec<_>>(),
            )
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl OpenApiFilterChain {
    #[must_use]
    pub fn new(filters: Vec<Box<dyn OpenApiFilter>>, enabled: HashMap<String, bool>) -> Self {
        Self { filters, enabled }
    }

    /// The built-in filters, in application order.
    #[must_use]
    pub fn standard(enabled: HashMap<String, bool>) -> Self {
        Self::new(
            vec![
                Box::new(DiscriminatorFlattener),
                Box::new(PatternPropertyRemover),
            ],
            enabled,
        )
    }

    #[must_use]
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.get(name).copied().unwrap_or(true)
    }

    /// Apply every enabled filter in order.
    ///
    /// # Errors
    ///
    /// Returns [`OpenApiToolsError::Filter`] naming the first filter that failed.
    pub fn apply(&self, document: &mut SpecDocument) -> Result<()> {
        for filter in &self.filters {
            let name = filter.name();
            if !self.is_enabled(name) {
                tracing::debug!(filter = %name, "OpenAPI filter disabled, skipping");
                continue;
            }
            filter
                .filter(document)
                .map_err(|e| OpenApiToolsError::Filter {
                    filter: name.to_string(),
                    source: Box::new(e),
                })?;
            tracing::debug!(filter = %name, "OpenAPI filter applied");
        }
        Ok(())
    }
}
