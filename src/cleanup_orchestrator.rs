//! Cleanup orchestration.
//!
//! Runs the type cleaners in dependency order:
//!
//! service accounts -> custom roles -> compute instances -> firewall rules -> networks
//!
//! Firewall rules are bound to networks, so every firewall delete is
//! dispatched before any network delete. A failing pass never stops the
//! passes after it; only cancellation does.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    cleanup_cleaner::TypeCleaner,
    cleanup_config::CleanupConfig,
    cleanup_deleter::ResourceDeleter,
    cleanup_types::{CleanupReport, PassReport, ResourceKind},
    gcp_backend::CloudBackend,
};

/// Default bound for a single backend call made by the deleter.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(8);

/// Owns the run configuration and drives all cleaner passes.
pub struct CleanupOrchestrator<B> {
    backend: B,
    cfg: CleanupConfig,
    call_timeout: Duration,
}

impl<B> CleanupOrchestrator<B>
where
    B: CloudBackend,
{
    /// Create an orchestrator for `cfg` on top of `backend`.
    #[must_use]
    pub const fn new(backend: B, cfg: CleanupConfig) -> Self {
        Self {
            backend,
            cfg,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Override the per-call timeout of deletes and operation polls.
    #[must_use]
    pub const fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Get a reference to the run configuration.
    #[must_use]
    pub const fn config(&self) -> &CleanupConfig {
        &self.cfg
    }

    /// Get a reference to the backend.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Consume the orchestrator and return the backend.
    #[must_use]
    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Run every pass in `ResourceKind::CLEANUP_ORDER`.
    ///
    /// Returns the per-type results. Passes that were skipped because of
    /// cancellation are absent from the report. The report is `interrupted`
    /// only if a pass was cut short or skipped; a cancel that lands after the
    /// last pass finished changes nothing.
    pub async fn run(&self, cancel: &CancellationToken) -> CleanupReport {
        let deleter = ResourceDeleter::new(
            &self.backend,
            self.cfg.dry_run(),
            self.call_timeout,
            self.cfg.operation_policy(),
        );

        let mut report = CleanupReport {
            project: self.cfg.project_id().to_string(),
            prefix: self.cfg.prefix().to_string(),
            dry_run: self.cfg.dry_run(),
            interrupted: false,
            passes: Vec::with_capacity(ResourceKind::CLEANUP_ORDER.len()),
        };

        for kind in ResourceKind::CLEANUP_ORDER {
            if cancel.is_cancelled() {
                warn!(%kind, "cleanup interrupted, skipping remaining passes");
                report.interrupted = true;
                break;
            }

            let result = TypeCleaner::new(kind)
                .run(&deleter, &self.backend, &self.cfg, cancel)
                .await;

            report.passes.push(PassReport { kind, result });
        }

        report.interrupted |= report.passes.iter().any(|p| p.result.cancelled);

        if report.dry_run {
            info!("Dry run complete. No resources were modified.");
        } else if report.interrupted {
            warn!("Cleanup interrupted.");
        } else {
            info!("Cleanup complete!");
        }

        report
    }
}
