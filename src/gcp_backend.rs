//! Cloud backend seam.
//!
//! Unique responsibility: define the calls the sweeper needs from a cloud
//! (paged listing, delete, operation status) and the error taxonomy those calls
//! produce, including the per-service "not found" classification.
//!
//! `GcpClient` implements this against the Google Cloud REST APIs; tests plug
//! in an in-memory backend.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::cleanup_types::{ResourceDescriptor, ResourceKind, Scope};

/// One page of a paged listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Items of this page.
    pub items: Vec<T>,
    /// Token for the next page; `None` (or empty) ends the listing.
    pub next_page_token: Option<String>,
}

impl<T> Page<T> {
    /// A final page.
    #[must_use]
    pub const fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_page_token: None,
        }
    }

    /// A page followed by another one.
    #[must_use]
    pub fn with_next(items: Vec<T>, token: impl Into<String>) -> Self {
        Self {
            items,
            next_page_token: Some(token.into()),
        }
    }
}

/// Handle of an asynchronous delete (compute operations).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// Operation name.
    pub name: String,
    /// URL used to poll the operation.
    pub self_link: String,
    /// Status at the time the handle was returned.
    pub status: OperationStatus,
}

/// Progress of an asynchronous operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    /// Not done yet (`PENDING` / `RUNNING`).
    Running,
    /// Finished successfully.
    Done,
    /// Finished with an error.
    Failed {
        /// Error code, e.g. `RESOURCE_NOT_FOUND`.
        code: String,
        /// Error message.
        message: String,
    },
}

/// Calls the sweeper makes against a cloud.
///
/// # Errors
///
/// Every call returns a `BackendError`; callers decide what a
/// not-found means through `BackendError::is_not_found`.
#[async_trait]
pub trait CloudBackend: Send + Sync {
    /// List one page of zone names of `project`.
    ///
    /// # Errors
    ///
    /// Returns an error if the zone listing fails.
    async fn list_zones(
        &self,
        project: String,
        page_token: Option<String>,
    ) -> Result<Page<String>, BackendError>;

    /// List one page of resources of `kind` within `scope`.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails; a not-found error means the
    /// scope itself does not exist.
    async fn list_resources(
        &self,
        kind: ResourceKind,
        scope: Scope,
        page_token: Option<String>,
    ) -> Result<Page<ResourceDescriptor>, BackendError>;

    /// Issue the delete for one resource.
    ///
    /// Returns the operation handle when the API is asynchronous.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete was rejected, including not-found.
    async fn delete_resource(
        &self,
        resource: &ResourceDescriptor,
    ) -> Result<Option<Operation>, BackendError>;

    /// Poll an operation returned by `delete_resource`.
    ///
    /// # Errors
    ///
    /// Returns an error if the status cannot be fetched.
    async fn operation_status(&self, operation: &Operation) -> Result<OperationStatus, BackendError>;
}

/// API family an error came from; not-found signaling differs per family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// IAM v1 (service accounts, roles).
    Iam,
    /// Compute Engine v1.
    Compute,
    /// GCE metadata server.
    Metadata,
}

/// Errors produced by backend calls.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Transport-level failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// Non-success response from an API.
    #[error("api error: status={status}, message={message}")]
    Api {
        /// API family.
        service: Service,
        /// HTTP status code.
        status: u16,
        /// Canonical status from the error envelope, e.g. `NOT_FOUND`.
        canonical: Option<String>,
        /// First `errors[].reason`, e.g. `notFound`.
        reason: Option<String>,
        /// Error message (or raw body when it is not an envelope).
        message: String,
    },
    /// Asynchronous operation finished with an error.
    #[error("operation failed: {code}: {message}")]
    Operation {
        /// Error code.
        code: String,
        /// Error message.
        message: String,
    },
    /// Response body could not be decoded.
    #[error("json error: {0}")]
    Json(String),
    /// A request URL could not be built.
    #[error("invalid url: {0}")]
    Url(String),
    /// No usable access token.
    #[error("auth error: {0}")]
    Auth(String),
    /// The call did not complete in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl BackendError {
    /// Build an API error from a status code and response body.
    ///
    /// Decodes the Google error envelope when present.
    #[must_use]
    pub fn from_response(service: Service, status: u16, body: &str) -> Self {
        let (canonical, reason, message) = serde_json::from_str::<ErrorEnvelope>(body).map_or_else(
            |_| (None, None, body.to_string()),
            |env| {
                (
                    env.error.status,
                    env.error.errors.into_iter().find_map(|e| e.reason),
                    env.error.message.unwrap_or_else(|| body.to_string()),
                )
            },
        );

        Self::Api {
            service,
            status,
            canonical,
            reason,
            message,
        }
    }

    /// Shorthand for a 404 from `service`.
    #[must_use]
    pub fn not_found(service: Service, message: impl Into<String>) -> Self {
        Self::Api {
            service,
            status: 404,
            canonical: Some("NOT_FOUND".to_string()),
            reason: Some("notFound".to_string()),
            message: message.into(),
        }
    }

    /// Shorthand for a plain API error.
    #[must_use]
    pub fn api(service: Service, status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            service,
            status,
            canonical: None,
            reason: None,
            message: message.into(),
        }
    }

    /// Whether the target of the call does not exist (any more).
    ///
    /// - Any service: HTTP 404.
    /// - IAM: canonical `NOT_FOUND`, or `FAILED_PRECONDITION` saying the
    ///   object is "already deleted" (soft-deleted roles).
    /// - Compute: `errors[].reason == "notFound"`, operation code
    ///   `RESOURCE_NOT_FOUND`.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Api { status: 404, .. } => true,
            Self::Api {
                service: Service::Iam,
                canonical: Some(canonical),
                message,
                ..
            } => {
                canonical == "NOT_FOUND"
                    || (canonical == "FAILED_PRECONDITION"
                        && message.to_ascii_lowercase().contains(ALREADY_DELETED))
            }
            Self::Api {
                service: Service::Compute,
                reason: Some(reason),
                ..
            } => reason == "notFound",
            Self::Operation { code, .. } => code == "RESOURCE_NOT_FOUND",
            _ => false,
        }
    }

    /// Whether retrying the same call may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Api { status, .. } => is_retryable_status(*status),
            Self::Timeout(_) => true,
            Self::Operation { .. } | Self::Json(_) | Self::Url(_) | Self::Auth(_) => false,
        }
    }
}

/// IAM wording for a delete on a soft-deleted object.
const ALREADY_DELETED: &str = "already deleted";

#[inline]
pub(crate) const fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 409 | 425 | 429 | 500 | 502 | 503 | 504)
}

// ============================================================================
// Google error envelope (internal)
// ============================================================================

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    reason: Option<String>,
}
