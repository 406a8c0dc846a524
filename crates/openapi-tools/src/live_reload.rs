//! Keeps the published tool set in step with the upstream document.

use crate::error::Result;
use crate::publish::ToolServer;
use crate::tools::{ToolCatalog, ToolDefinition, ToolRegistry};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    ToolsUpdated { removed: usize, upserted: usize },
    NoChange,
    /// Every attempt failed; nothing was applied.
    Failure,
    /// Cancelled while backing off.
    Interrupted,
    /// Another cycle was still running.
    Skipped,
}

impl ReloadOutcome {
    fn status(self) -> &'static str {
        match self {
            Self::ToolsUpdated { .. } => "success_tools_updated",
            Self::NoChange => "success_no_change",
            Self::Failure | Self::Interrupted | Self::Skipped => "failure",
        }
    }
}

/// Records the cycle outcome on every exit path.
struct CycleTimer {
    started: Instant,
    outcome: ReloadOutcome,
}

impl Drop for CycleTimer {
    fn drop(&mut self) {
        let status = self.outcome.status();
        metrics::counter!("openapi_mcp_live_reload_executions_total", "status" => status)
            .increment(1);
        metrics::histogram!("openapi_mcp_live_reload_duration_seconds", "status" => status)
            .record(self.started.elapsed().as_secs_f64());
    }
}

/// Clears the running flag when the cycle ends.
struct Running<'a>(&'a AtomicBool);

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// What changed between two catalogs, by tool name.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CatalogDiff {
    pub removed: Vec<String>,
    /// New tools and tools whose definition changed.
    pub upserted: Vec<String>,
}

impl CatalogDiff {
    #[must_use]
    pub fn between(before: &ToolCatalog, after: &ToolCatalog) -> Self {
        let old: HashMap<&str, &ToolDefinition> =
            before.iter().map(|t| (t.name(), &t.definition)).collect();
        let new: HashMap<&str, &ToolDefinition> =
            after.iter().map(|t| (t.name(), &t.definition)).collect();

        let removed = before
            .iter()
            .map(|t| t.name())
            .filter(|name| !new.contains_key(name))
            .map(str::to_string)
            .collect();
        let upserted = after
            .iter()
            .filter(|t| old.get(t.name()) != Some(&&t.definition))
            .map(|t| t.name().to_string())
            .collect();
        Self { removed, upserted }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.upserted.is_empty()
    }
}

pub struct LiveReload {
    tools: Arc<ToolRegistry>,
    server: Arc<dyn ToolServer>,
    max_retries: u32,
    backoff_base: Duration,
    cancel: CancellationToken,
    running: AtomicBool,
}

impl std::fmt::Debug for LiveReload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveReload")
            .field("max_retries", &self.max_retries)
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl LiveReload {
    #[must_use]
    pub fn new(
        tools: Arc<ToolRegistry>,
        server: Arc<dyn ToolServer>,
        max_retries: u32,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            tools,
            server,
            max_retries: max_retries.max(1),
            backoff_base: Duration::from_secs(1),
            cancel,
            running: AtomicBool::new(false),
        }
    }

    /// Delay before the second attempt; doubles per attempt.
    #[must_use]
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// One reload cycle. Overlapping calls return [`ReloadOutcome::Skipped`].
    pub async fn run_cycle(&self) -> ReloadOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::info!("Live reload already in progress, skipping this run.");
            return ReloadOutcome::Skipped;
        }
        let _running = Running(&self.running);
        let mut timer = CycleTimer {
            started: Instant::now(),
            outcome: ReloadOutcome::Failure,
        };

        let before = self.tools.cached_tools();
        let version = catalog_version(&before).or_else(|| self.tools.specs().version());

        for attempt in 1..=self.max_retries {
            match self.attempt(version.as_deref(), &before).await {
                Ok(outcome) => {
                    timer.outcome = outcome;
                    return outcome;
                }
                Err(e) => {
                    tracing::error!(attempt, max_retries = self.max_retries, "Live reload attempt failed: {e}");
                }
            }
            if attempt < self.max_retries {
                let delay = self.backoff_base * 2u32.saturating_pow(attempt - 1);
                tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "Retrying live reload");
                tokio::select! {
                    () = self.cancel.cancelled() => {
                        tracing::warn!("Live reload interrupted during backoff.");
                        timer.outcome = ReloadOutcome::Interrupted;
                        return ReloadOutcome::Interrupted;
                    }
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
        tracing::error!(
            attempts = self.max_retries,
            "Live reload failed, keeping the published tools."
        );
        ReloadOutcome::Failure
    }

    async fn attempt(&self, version: Option<&str>, before: &ToolCatalog) -> Result<ReloadOutcome> {
        if !self.tools.specs().reload_if_updated(version).await? {
            return Ok(ReloadOutcome::NoChange);
        }
        let after = self.tools.get_tools()?;
        let diff = CatalogDiff::between(before, &after);

        for name in &diff.removed {
            self.server.remove_tool(name);
        }
        for tool in after.iter().filter(|t| diff.upserted.iter().any(|n| n == t.name())) {
            self.server.add_tool(Arc::clone(tool));
        }
        if !diff.is_empty() {
            self.server.notify_tools_list_changed().await;
        }

        tracing::info!(
            removed = diff.removed.len(),
            upserted = diff.upserted.len(),
            stateful = self.server.is_stateful(),
            "Published tools updated."
        );
        Ok(ReloadOutcome::ToolsUpdated {
            removed: diff.removed.len(),
            upserted: diff.upserted.len(),
        })
    }
}

/// Version of the document a catalog was built from.
fn catalog_version(catalog: &ToolCatalog) -> Option<String> {
    catalog
        .first()
        .and_then(|t| t.operation.document().version().map(str::to_string))
}

/// Runs a cycle at every fire time of `schedule` (UTC) until `cancel` fires.
pub fn spawn_scheduler(
    reload: Arc<LiveReload>,
    schedule: cron::Schedule,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                tracing::warn!("Live reload schedule has no upcoming fire time, stopping.");
                break;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tracing::debug!(next = %next, "Next live reload scheduled");
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(wait) => {}
            }
            let reload = Arc::clone(&reload);
            tokio::spawn(async move {
                reload.run_cycle().await;
            });
        }
        tracing::debug!("Live reload scheduler stopped.");
    })
}
