//! Resource deletion.
//!
//! Unique responsibility: issue one delete and classify what happened.
//!
//! The deleter never returns an error: every backend failure is folded into a
//! `DeletionOutcome`. In dry-run mode it returns before touching the backend.

use std::{
    future::Future,
    time::{Duration, Instant},
};

use tracing::{error, info, warn};

use crate::{
    cleanup_config::OperationPolicy,
    cleanup_types::{DeletionOutcome, ResourceDescriptor},
    gcp_backend::{BackendError, CloudBackend, Operation, OperationStatus},
};

/// Deletes resources one at a time.
pub struct ResourceDeleter<'a, B: ?Sized> {
    backend: &'a B,
    dry_run: bool,
    call_timeout: Duration,
    operations: OperationPolicy,
}

impl<'a, B> ResourceDeleter<'a, B>
where
    B: CloudBackend + ?Sized,
{
    /// Create a deleter.
    ///
    /// `call_timeout` bounds every individual backend call.
    #[must_use]
    pub const fn new(
        backend: &'a B,
        dry_run: bool,
        call_timeout: Duration,
        operations: OperationPolicy,
    ) -> Self {
        Self {
            backend,
            dry_run,
            call_timeout,
            operations,
        }
    }

    /// Delete one resource and classify the outcome.
    pub async fn delete(&self, resource: &ResourceDescriptor) -> DeletionOutcome {
        let name = resource.display_name.as_str();
        let zone = resource.scope.zone_name();

        if self.dry_run {
            info!(kind = %resource.kind, %name, zone, dry_run = true, "[DRY RUN] would delete {} {name}", resource.kind);
            return DeletionOutcome::WouldDelete;
        }

        let outcome = match self.bounded(self.backend.delete_resource(resource)).await {
            Ok(None) => DeletionOutcome::Deleted,
            Ok(Some(op)) => self.settle(&op).await,
            Err(e) if e.is_not_found() => DeletionOutcome::AlreadyGone,
            Err(e) => DeletionOutcome::Failed(e.to_string()),
        };

        match &outcome {
            DeletionOutcome::Deleted => {
                info!(kind = %resource.kind, %name, zone, "deleted {} {name}", resource.kind);
            }
            DeletionOutcome::AlreadyGone => {
                warn!(kind = %resource.kind, %name, zone, "{} not found (already deleted?): {name}", resource.kind);
            }
            DeletionOutcome::Failed(reason) => {
                error!(kind = %resource.kind, %name, zone, error = %reason, "failed to delete {} {name}", resource.kind);
            }
            DeletionOutcome::WouldDelete => {}
        }

        outcome
    }

    /// Apply the operation policy to an accepted delete.
    async fn settle(&self, op: &Operation) -> DeletionOutcome {
        let OperationPolicy::Wait {
            timeout,
            initial_backoff,
            max_backoff,
        } = self.operations
        else {
            return classify_status(&op.status).unwrap_or(DeletionOutcome::Deleted);
        };

        let deadline = Instant::now() + timeout;
        let mut backoff = initial_backoff;
        let mut status = op.status.clone();

        loop {
            if let Some(outcome) = classify_status(&status) {
                return outcome;
            }

            let now = Instant::now();
            if now >= deadline {
                return DeletionOutcome::Failed(format!(
                    "operation {} did not complete within {timeout:?}",
                    op.name
                ));
            }

            tokio::time::sleep(backoff.min(deadline - now)).await;
            backoff = backoff.saturating_mul(2).min(max_backoff);

            status = match self.bounded(self.backend.operation_status(op)).await {
                Ok(s) => s,
                Err(e) if e.is_not_found() => return DeletionOutcome::AlreadyGone,
                Err(e) => return DeletionOutcome::Failed(e.to_string()),
            };
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, BackendError>> + Send,
    ) -> Result<T, BackendError> {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .unwrap_or_else(|_| Err(BackendError::Timeout(self.call_timeout)))
    }
}

/// Terminal outcome of an operation status, `None` while it is still running.
fn classify_status(status: &OperationStatus) -> Option<DeletionOutcome> {
    match status {
        OperationStatus::Running => None,
        OperationStatus::Done => Some(DeletionOutcome::Deleted),
        OperationStatus::Failed { code, message } => {
            let err = BackendError::Operation {
                code: code.clone(),
                message: message.clone(),
            };
            if err.is_not_found() {
                Some(DeletionOutcome::AlreadyGone)
            } else {
                Some(DeletionOutcome::Failed(err.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_is_not_terminal() {
        assert_eq!(classify_status(&OperationStatus::Running), None);
        assert_eq!(classify_status(&OperationStatus::Done), Some(DeletionOutcome::Deleted));
    }

    #[test]
    fn operation_not_found_is_already_gone() {
        let status = OperationStatus::Failed {
            code: "RESOURCE_NOT_FOUND".to_string(),
            message: "The resource was not found".to_string(),
        };
        assert_eq!(classify_status(&status), Some(DeletionOutcome::AlreadyGone));
    }

    #[test]
    fn operation_in_use_is_failed() {
        let status = OperationStatus::Failed {
            code: "RESOURCE_IN_USE_BY_ANOTHER_RESOURCE".to_string(),
            message: "network is in use".to_string(),
        };
        assert!(matches!(classify_status(&status), Some(DeletionOutcome::Failed(m)) if m.contains("in use")));
    }
}
