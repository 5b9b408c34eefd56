//! Per-type cleanup pass.
//!
//! Unique responsibility: run Lister -> Filter -> Deleter for exactly one
//! resource type and account for every outcome in a `RunResult`.
//!
//! A pass never fails: listing errors end the pass with `aborted` set, delete
//! failures are counted and the next resource is processed. The "nothing
//! found" notice is only logged for a listing that ran to its end.

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    cleanup_config::CleanupConfig,
    cleanup_deleter::ResourceDeleter,
    cleanup_filter::{display_prefix, matches},
    cleanup_lister::{ListEvent, list},
    cleanup_types::{ResourceKind, RunResult},
    gcp_backend::CloudBackend,
};

/// Cleanup pass for one resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeCleaner {
    kind: ResourceKind,
}

impl TypeCleaner {
    /// Cleaner for `kind`.
    #[must_use]
    pub const fn new(kind: ResourceKind) -> Self {
        Self { kind }
    }

    /// Resource type handled by this cleaner.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Run the pass.
    ///
    /// Matching resources are deleted one after the other. The cancellation
    /// token is checked before each resource.
    pub async fn run<B>(
        &self,
        deleter: &ResourceDeleter<'_, B>,
        backend: &B,
        cfg: &CleanupConfig,
        cancel: &CancellationToken,
    ) -> RunResult
    where
        B: CloudBackend + ?Sized,
    {
        let kind = self.kind;
        let prefix = cfg.prefix();
        let mut result = RunResult::default();

        info!(section = kind.title(), "=== Cleaning up {} ===", kind.title());

        let mut listing = list(backend, kind, cfg.project_id());

        loop {
            if cancel.is_cancelled() {
                warn!(%kind, "cancelled, stopping {} cleanup", kind.plural());
                result.aborted = true;
                result.cancelled = true;
                break;
            }

            let Some(item) = listing.next().await else {
                break;
            };

            match item {
                Ok(ListEvent::Resource(resource)) => {
                    if !matches(kind, &resource.display_name, prefix) {
                        continue;
                    }
                    let outcome = deleter.delete(&resource).await;
                    result.record(&outcome);
                }
                Ok(ListEvent::ZoneSkipped { zone, error }) => {
                    error!(%kind, %zone, %error, "failed to list {} in zone {zone}", kind.plural());
                    result.listing_errors = result.listing_errors.saturating_add(1);
                }
                Err(e) => {
                    error!(%kind, error = %e, "failed to list {}", kind.plural());
                    result.aborted = true;
                    break;
                }
            }
        }

        if result.attempted == 0 && !result.aborted && !cfg.dry_run() {
            info!(
                %kind,
                "No {} found matching prefix: {}",
                kind.plural(),
                display_prefix(kind, prefix)
            );
        }

        info!(
            %kind,
            attempted = result.attempted,
            deleted = result.deleted,
            already_gone = result.already_gone,
            failed = result.failed,
            simulated = result.simulated,
            "{} pass finished",
            kind.title()
        );

        result
    }
}
