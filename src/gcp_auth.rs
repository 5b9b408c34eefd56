//! Access tokens for the Google Cloud REST APIs.
//!
//! Unique responsibility: hand out a bearer token for outgoing API calls.
//!
//! Two sources, in order:
//! - `GCP_ACCESS_TOKEN` (e.g. `gcloud auth print-access-token`), used as is.
//! - The GCE metadata server (default service account of the VM / Cloud Run
//!   service the sweeper runs on), cached until shortly before expiry.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::gcp_backend::{BackendError, Service};

/// Default metadata token endpoint.
pub const DEFAULT_METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Refresh this long before the metadata token expires.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Where tokens come from.
#[derive(Debug)]
pub enum TokenSource {
    /// A fixed token supplied by the operator.
    Static(String),
    /// The metadata server, with a cached token.
    Metadata {
        /// Token endpoint.
        url: String,
        /// Cached token and its refresh deadline.
        cache: Mutex<Option<CachedToken>>,
    },
}

/// A token fetched from the metadata server.
#[derive(Debug, Clone)]
pub struct CachedToken {
    token: String,
    refresh_at: Instant,
}

impl TokenSource {
    /// Pick the source: a static token if one is given, the metadata server otherwise.
    #[must_use]
    pub fn new(static_token: Option<String>, metadata_url: String) -> Self {
        static_token.map_or_else(
            || Self::Metadata {
                url: metadata_url,
                cache: Mutex::new(None),
            },
            Self::Static,
        )
    }

    /// Return a valid bearer token.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata server cannot be reached or answers
    /// without a token.
    pub async fn token(&self, http: &reqwest::Client) -> Result<String, BackendError> {
        match self {
            Self::Static(token) => Ok(token.clone()),
            Self::Metadata { url, cache } => {
                let mut guard = cache.lock().await;
                if let Some(cached) = guard.as_ref()
                    && Instant::now() < cached.refresh_at
                {
                    return Ok(cached.token.clone());
                }

                let fresh = fetch_metadata_token(http, url).await?;
                let token = fresh.token.clone();
                *guard = Some(fresh);
                drop(guard);
                Ok(token)
            }
        }
    }
}

async fn fetch_metadata_token(http: &reqwest::Client, url: &str) -> Result<CachedToken, BackendError> {
    let resp = http
        .get(url)
        .header("Metadata-Flavor", "Google")
        .send()
        .await
        .map_err(|e| BackendError::Auth(format!("metadata server unreachable: {e}")))?;

    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();

    if !status.is_success() {
        return Err(BackendError::from_response(Service::Metadata, status.as_u16(), &body));
    }

    let parsed: MetadataToken =
        serde_json::from_str(&body).map_err(|e| BackendError::Json(e.to_string()))?;

    if parsed.access_token.is_empty() {
        return Err(BackendError::Auth("metadata server returned an empty token".to_string()));
    }

    let lifetime = Duration::from_secs(parsed.expires_in).saturating_sub(EXPIRY_MARGIN);
    debug!(expires_in = parsed.expires_in, "fetched access token from metadata server");

    Ok(CachedToken {
        token: parsed.access_token,
        refresh_at: Instant::now() + lifetime,
    })
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_token_is_returned_verbatim() {
        let src = TokenSource::new(Some("ya29.abc".to_string()), DEFAULT_METADATA_TOKEN_URL.to_string());
        let http = reqwest::Client::new();
        let token = src.token(&http).await.unwrap_or_default();
        assert_eq!(token, "ya29.abc");
    }

    #[test]
    fn missing_static_token_falls_back_to_metadata() {
        let src = TokenSource::new(None, "http://127.0.0.1:1/token".to_string());
        assert!(matches!(src, TokenSource::Metadata { .. }));
    }

    #[test]
    fn metadata_payload_decodes() {
        let body = r#"{"access_token":"ya29.x","expires_in":3599,"token_type":"Bearer"}"#;
        let parsed: MetadataToken = serde_json::from_str(body).unwrap_or(MetadataToken {
            access_token: String::new(),
            expires_in: 0,
        });
        assert_eq!(parsed.access_token, "ya29.x");
        assert_eq!(parsed.expires_in, 3599);
    }
}
