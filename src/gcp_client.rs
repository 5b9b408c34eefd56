//! Google Cloud REST client.
//!
//! Unique responsibility: implement `CloudBackend` against the IAM v1 and
//! Compute Engine v1 REST APIs.
//!
//! API endpoints:
//! - GET    <https://iam.googleapis.com/v1/projects/{project}/serviceAccounts>
//! - GET    <https://iam.googleapis.com/v1/projects/{project}/roles?showDeleted=false>
//! - DELETE <https://iam.googleapis.com/v1/{name}>
//! - GET    <https://compute.googleapis.com/compute/v1/projects/{project}/zones>
//! - GET    <https://compute.googleapis.com/compute/v1/projects/{project}/zones/{zone}/instances>
//! - GET    <https://compute.googleapis.com/compute/v1/projects/{project}/global/firewalls>
//! - GET    <https://compute.googleapis.com/compute/v1/projects/{project}/global/networks>
//! - DELETE <https://compute.googleapis.com/compute/v1/{resource path}>
//! - GET    `{operation.selfLink}`
//! - Header: `Authorization: Bearer <token>`
//!
//! Listing calls are retried on transient failures; deletes are issued once so
//! the caller can classify the outcome.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, Url};
use serde::{Deserialize, de::DeserializeOwned};
use tracing::debug;

use crate::{
    cleanup_config::{ConfigError, env_or, optional_env, parse_u32_env, parse_u64_env},
    cleanup_types::{ResourceDescriptor, ResourceKind, Scope},
    gcp_auth::{DEFAULT_METADATA_TOKEN_URL, TokenSource},
    gcp_backend::{BackendError, CloudBackend, Operation, OperationStatus, Page, Service},
};

/// Configuration for the Google Cloud REST client.
#[derive(Clone, Debug)]
pub struct GcpClientConfig {
    /// Static bearer token.
    /// Env: `GCP_ACCESS_TOKEN` (optional; metadata server is used when unset)
    pub access_token: Option<String>,

    /// Metadata token endpoint.
    /// Env: `GCP_METADATA_URL` (default: the GCE metadata server)
    pub metadata_url: String,

    /// IAM API base URL.
    /// Env: `GCP_IAM_URL` (default: "<https://iam.googleapis.com/v1>")
    pub iam_url: String,

    /// Compute API base URL.
    /// Env: `GCP_COMPUTE_URL` (default: "<https://compute.googleapis.com/compute/v1>")
    pub compute_url: String,

    /// HTTP request timeout in milliseconds.
    /// Env: `GCP_HTTP_TIMEOUT_MS` (default: 8000)
    pub timeout_ms: u64,

    /// Maximum number of retry attempts for listing calls.
    /// Env: `GCP_HTTP_RETRY_MAX` (default: 2)
    pub retry_max: u32,

    /// Backoff time between retries in milliseconds.
    /// Env: `GCP_HTTP_RETRY_BACKOFF_MS` (default: 250)
    pub retry_backoff_ms: u64,

    /// Page size requested from listing endpoints.
    /// Env: `GCP_PAGE_SIZE` (default: 100)
    pub page_size: u32,

    /// User agent for HTTP requests.
    /// Env: `GCP_USER_AGENT` (default: "gcp-sweeper/0.1")
    pub user_agent: String,
}

impl GcpClientConfig {
    /// Load configuration from environment variables.
    ///
    /// In local dev, this will also attempt to load `.env` from the current directory.
    /// If `.env` is missing, it does not fail.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric environment variable is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            access_token: optional_env("GCP_ACCESS_TOKEN"),
            metadata_url: env_or("GCP_METADATA_URL", DEFAULT_METADATA_TOKEN_URL),
            iam_url: env_or("GCP_IAM_URL", "https://iam.googleapis.com/v1"),
            compute_url: env_or("GCP_COMPUTE_URL", "https://compute.googleapis.com/compute/v1"),
            timeout_ms: parse_u64_env("GCP_HTTP_TIMEOUT_MS", 8_000)?,
            retry_max: parse_u32_env("GCP_HTTP_RETRY_MAX", 2)?,
            retry_backoff_ms: parse_u64_env("GCP_HTTP_RETRY_BACKOFF_MS", 250)?,
            page_size: parse_u32_env("GCP_PAGE_SIZE", 100)?,
            user_agent: env_or("GCP_USER_AGENT", "gcp-sweeper/0.1"),
        })
    }

    /// Request timeout as a `Duration`.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn iam(&self, path: &str) -> String {
        format!("{}/{}", self.iam_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    fn compute(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.compute_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// REST client for the Google Cloud APIs the sweeper uses.
pub struct GcpClient {
    cfg: GcpClientConfig,
    http: reqwest::Client,
    tokens: TokenSource,
}

impl GcpClient {
    /// Create a new client from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(cfg: GcpClientConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout())
            .user_agent(cfg.user_agent.clone())
            .build()
            .map_err(BackendError::Http)?;

        let tokens = TokenSource::new(cfg.access_token.clone(), cfg.metadata_url.clone());

        Ok(Self { cfg, http, tokens })
    }

    /// Get a reference to the current configuration.
    #[must_use]
    pub const fn config(&self) -> &GcpClientConfig {
        &self.cfg
    }

    /// Build a listing URL with paging parameters.
    ///
    /// IAM pages with `pageSize`, Compute with `maxResults`.
    fn list_url(
        &self,
        service: Service,
        base: &str,
        page_token: Option<&str>,
        extra: &[(&str, &str)],
    ) -> Result<Url, BackendError> {
        let page_size = self.cfg.page_size.to_string();
        let mut params: Vec<(&str, &str)> = vec![(page_size_param(service), page_size.as_str())];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }
        params.extend_from_slice(extra);

        Url::parse_with_params(base, &params).map_err(|e| BackendError::Url(e.to_string()))
    }

    /// GET a JSON document with retry logic.
    async fn get_json<T: DeserializeOwned>(&self, service: Service, url: &Url) -> Result<T, BackendError> {
        let mut attempt: u32 = 0;
        let mut backoff = Duration::from_millis(self.cfg.retry_backoff_ms);

        loop {
            attempt = attempt.saturating_add(1);

            match self.send_once(service, Method::GET, url.as_str()).await {
                Ok(body) => {
                    return serde_json::from_str(&body).map_err(|e| BackendError::Json(e.to_string()));
                }
                Err(err) if attempt > self.cfg.retry_max || !err.is_transient() => return Err(err),
                Err(err) => {
                    debug!(%url, attempt, error = %err, "retrying listing call");
                }
            }

            tokio::time::sleep(backoff).await;
            backoff = next_backoff(backoff);
        }
    }

    /// Send one request and return the response body.
    async fn send_once(&self, service: Service, method: Method, url: &str) -> Result<String, BackendError> {
        let token = self.tokens.token(&self.http).await?;

        let resp = self
            .http
            .request(method, url)
            .bearer_auth(&token)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(BackendError::from_response(service, status.as_u16(), &body));
        }

        Ok(body)
    }

    async fn list_service_accounts(
        &self,
        project: &str,
        page_token: Option<&str>,
    ) -> Result<Page<ResourceDescriptor>, BackendError> {
        let base = self.cfg.iam(&format!("projects/{project}/serviceAccounts"));
        let url = self.list_url(Service::Iam, &base, page_token, &[])?;
        let resp: ServiceAccountList = self.get_json(Service::Iam, &url).await?;

        let items = resp
            .accounts
            .into_iter()
            .map(|sa| {
                ResourceDescriptor::new(
                    ResourceKind::ServiceAccount,
                    sa.name,
                    sa.email,
                    Scope::project(project),
                )
            })
            .collect();

        Ok(Page {
            items,
            next_page_token: resp.next_page_token,
        })
    }

    async fn list_custom_roles(
        &self,
        project: &str,
        page_token: Option<&str>,
    ) -> Result<Page<ResourceDescriptor>, BackendError> {
        let base = self.cfg.iam(&format!("projects/{project}/roles"));
        let url = self.list_url(Service::Iam, &base, page_token, &[("showDeleted", "false")])?;
        let resp: RoleList = self.get_json(Service::Iam, &url).await?;

        let items = resp
            .roles
            .into_iter()
            .filter(|r| !r.deleted)
            .map(|r| {
                let role_id = last_segment(&r.name).to_string();
                ResourceDescriptor::new(ResourceKind::CustomRole, r.name, role_id, Scope::project(project))
            })
            .collect();

        Ok(Page {
            items,
            next_page_token: resp.next_page_token,
        })
    }

    async fn list_compute(
        &self,
        kind: ResourceKind,
        scope: &Scope,
        page_token: Option<&str>,
    ) -> Result<Page<ResourceDescriptor>, BackendError> {
        let collection = compute_collection(kind, scope)?;
        let base = self.cfg.compute(&collection);
        let url = self.list_url(Service::Compute, &base, page_token, &[])?;
        let resp: ComputeList = self.get_json(Service::Compute, &url).await?;

        let items = resp
            .items
            .into_iter()
            .map(|item| {
                let id = format!("{collection}/{}", item.name);
                let descriptor = ResourceDescriptor::new(kind, id, item.name, scope.clone());
                match item.network {
                    Some(network) if kind == ResourceKind::Firewall => {
                        descriptor.with_network(last_segment(&network))
                    }
                    _ => descriptor,
                }
            })
            .collect();

        Ok(Page {
            items,
            next_page_token: resp.next_page_token,
        })
    }
}

#[async_trait]
impl CloudBackend for GcpClient {
    async fn list_zones(
        &self,
        project: String,
        page_token: Option<String>,
    ) -> Result<Page<String>, BackendError> {
        let base = self.cfg.compute(&format!("projects/{project}/zones"));
        let url = self.list_url(Service::Compute, &base, page_token.as_deref(), &[])?;
        let resp: ComputeList = self.get_json(Service::Compute, &url).await?;

        Ok(Page {
            items: resp.items.into_iter().map(|z| z.name).collect(),
            next_page_token: resp.next_page_token,
        })
    }

    async fn list_resources(
        &self,
        kind: ResourceKind,
        scope: Scope,
        page_token: Option<String>,
    ) -> Result<Page<ResourceDescriptor>, BackendError> {
        let page_token = page_token.as_deref();
        match kind {
            ResourceKind::ServiceAccount => {
                self.list_service_accounts(scope.project_id(), page_token).await
            }
            ResourceKind::CustomRole => self.list_custom_roles(scope.project_id(), page_token).await,
            ResourceKind::ComputeInstance | ResourceKind::Firewall | ResourceKind::Network => {
                self.list_compute(kind, &scope, page_token).await
            }
        }
    }

    async fn delete_resource(
        &self,
        resource: &ResourceDescriptor,
    ) -> Result<Option<Operation>, BackendError> {
        match resource.kind {
            ResourceKind::ServiceAccount | ResourceKind::CustomRole => {
                let url = self.cfg.iam(&resource.id);
                self.send_once(Service::Iam, Method::DELETE, &url).await?;
                Ok(None)
            }
            ResourceKind::ComputeInstance | ResourceKind::Firewall | ResourceKind::Network => {
                let url = self.cfg.compute(&resource.id);
                let body = self.send_once(Service::Compute, Method::DELETE, &url).await?;
                let op: ComputeOperation =
                    serde_json::from_str(&body).map_err(|e| BackendError::Json(e.to_string()))?;
                Ok(Some(op.into_operation()))
            }
        }
    }

    async fn operation_status(&self, operation: &Operation) -> Result<OperationStatus, BackendError> {
        let url = Url::parse(&operation.self_link).map_err(|e| BackendError::Url(e.to_string()))?;
        let op: ComputeOperation = self.get_json(Service::Compute, &url).await?;
        Ok(op.into_operation().status)
    }
}

// ============================================================================
// Response types (internal)
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceAccountList {
    #[serde(default)]
    accounts: Vec<ServiceAccount>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServiceAccount {
    name: String,
    email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoleList {
    #[serde(default)]
    roles: Vec<Role>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Role {
    name: String,
    #[serde(default)]
    deleted: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ComputeList {
    #[serde(default)]
    items: Vec<ComputeItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ComputeItem {
    name: String,
    network: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ComputeOperation {
    name: String,
    #[serde(default)]
    self_link: String,
    #[serde(default)]
    status: String,
    error: Option<ComputeOperationError>,
}

#[derive(Debug, Deserialize)]
struct ComputeOperationError {
    #[serde(default)]
    errors: Vec<ComputeOperationErrorItem>,
}

#[derive(Debug, Deserialize)]
struct ComputeOperationErrorItem {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl ComputeOperation {
    fn into_operation(self) -> Operation {
        let failure = self.error.and_then(|e| e.errors.into_iter().next());
        let status = match (self.status.as_str(), failure) {
            (_, Some(err)) => OperationStatus::Failed {
                code: err.code,
                message: err.message,
            },
            ("DONE", None) => OperationStatus::Done,
            _ => OperationStatus::Running,
        };

        Operation {
            name: self.name,
            self_link: self.self_link,
            status,
        }
    }
}

// ============================================================================
// Helper functions
// ============================================================================

fn compute_collection(kind: ResourceKind, scope: &Scope) -> Result<String, BackendError> {
    let project = scope.project_id();
    match (kind, scope.zone_name()) {
        (ResourceKind::ComputeInstance, Some(zone)) => {
            Ok(format!("projects/{project}/zones/{zone}/instances"))
        }
        (ResourceKind::Firewall, _) => Ok(format!("projects/{project}/global/firewalls")),
        (ResourceKind::Network, _) => Ok(format!("projects/{project}/global/networks")),
        _ => Err(BackendError::api(
            Service::Compute,
            400,
            format!("{kind} cannot be listed in scope {scope:?}"),
        )),
    }
}

const fn page_size_param(service: Service) -> &'static str {
    match service {
        Service::Iam => "pageSize",
        Service::Compute | Service::Metadata => "maxResults",
    }
}

fn last_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[inline]
fn next_backoff(current: Duration) -> Duration {
    // Exponential backoff capped at 5 seconds.
    let next = current.saturating_mul(2);
    next.min(Duration::from_secs(5))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> GcpClientConfig {
        GcpClientConfig {
            access_token: Some("token".to_string()),
            metadata_url: DEFAULT_METADATA_TOKEN_URL.to_string(),
            iam_url: "https://iam.example/v1/".to_string(),
            compute_url: "https://compute.example/compute/v1".to_string(),
            timeout_ms: 1_000,
            retry_max: 0,
            retry_backoff_ms: 1,
            page_size: 50,
            user_agent: "test".to_string(),
        }
    }

    #[test]
    fn urls_join_without_double_slashes() {
        let c = cfg();
        assert_eq!(
            c.iam("projects/demo/serviceAccounts/a@demo.iam.gserviceaccount.com"),
            "https://iam.example/v1/projects/demo/serviceAccounts/a@demo.iam.gserviceaccount.com"
        );
        assert_eq!(
            c.compute("/projects/demo/global/networks/privesc"),
            "https://compute.example/compute/v1/projects/demo/global/networks/privesc"
        );
    }

    fn query(url: &Url) -> Vec<(String, String)> {
        url.query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    fn pair(k: &str, v: &str) -> (String, String) {
        (k.to_string(), v.to_string())
    }

    #[test]
    fn list_url_carries_paging_params() {
        let client = GcpClient::new(cfg()).unwrap_or_else(|e| panic!("{e}"));

        let roles = client
            .list_url(
                Service::Iam,
                "https://iam.example/v1/projects/demo/roles",
                Some("tok/=="),
                &[("showDeleted", "false")],
            )
            .unwrap_or_else(|e| panic!("{e}"));
        let pairs = query(&roles);
        assert!(pairs.contains(&pair("pageSize", "50")));
        assert!(pairs.contains(&pair("pageToken", "tok/==")));
        assert!(pairs.contains(&pair("showDeleted", "false")));

        let zones = client
            .list_url(
                Service::Compute,
                "https://compute.example/compute/v1/projects/demo/zones",
                None,
                &[],
            )
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(query(&zones), vec![pair("maxResults", "50")]);
    }

    #[test]
    fn instances_require_a_zone() {
        assert!(compute_collection(ResourceKind::ComputeInstance, &Scope::project("demo")).is_err());
        assert_eq!(
            compute_collection(ResourceKind::ComputeInstance, &Scope::zone("demo", "us-east1-b"))
                .unwrap_or_default(),
            "projects/demo/zones/us-east1-b/instances"
        );
    }

    #[test]
    fn operation_status_mapping() {
        let running: ComputeOperation = serde_json::from_str(
            r#"{"name":"op-1","selfLink":"https://compute.example/op-1","status":"RUNNING"}"#,
        )
        .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(running.into_operation().status, OperationStatus::Running);

        let failed: ComputeOperation = serde_json::from_str(
            r#"{"name":"op-2","status":"DONE","error":{"errors":[{"code":"RESOURCE_NOT_FOUND","message":"gone"}]}}"#,
        )
        .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(
            failed.into_operation().status,
            OperationStatus::Failed {
                code: "RESOURCE_NOT_FOUND".to_string(),
                message: "gone".to_string()
            }
        );

        let done: ComputeOperation =
            serde_json::from_str(r#"{"name":"op-3","status":"DONE"}"#).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(done.into_operation().status, OperationStatus::Done);
    }

    #[test]
    fn list_payloads_decode_with_missing_fields() {
        let empty: ComputeList = serde_json::from_str("{}").unwrap_or_else(|e| panic!("{e}"));
        assert!(empty.items.is_empty());
        assert!(empty.next_page_token.is_none());

        let fw: ComputeList = serde_json::from_str(
            r#"{"items":[{"name":"privesc-allow-ssh","network":"https://www.googleapis.com/compute/v1/projects/demo/global/networks/privesc-net"}],"nextPageToken":"n1"}"#,
        )
        .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(fw.items[0].network.as_deref().map(last_segment), Some("privesc-net"));
        assert_eq!(fw.next_page_token.as_deref(), Some("n1"));
    }
}
