//! In-memory `CloudBackend` for integration tests.

#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet, VecDeque},
    io,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use gcp_sweeper::{
    BackendError, CloudBackend, Operation, OperationStatus, Page, ResourceDescriptor, ResourceKind,
    Scope, Service,
};
use tokio_util::sync::CancellationToken;
use tracing::subscriber::DefaultGuard;

pub const PROJECT: &str = "lab-project";

#[derive(Default)]
struct State {
    zones: Vec<String>,
    resources: Vec<ResourceDescriptor>,
    zone_errors: HashMap<String, u16>,
    kind_errors: HashMap<ResourceKind, u16>,
    delete_errors: HashMap<String, u16>,
    deleted: Vec<String>,
    operations: HashMap<String, VecDeque<OperationStatus>>,
    list_calls: usize,
    cancel_on_list: Option<(ResourceKind, CancellationToken)>,
}

/// Fake project: resources live in a vector, deletes remove them.
pub struct FakeBackend {
    state: Mutex<State>,
    page_size: usize,
    delete_delay: Option<Duration>,
    async_compute: bool,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            page_size: 100,
            delete_delay: None,
            async_compute: false,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_delete_delay(mut self, delay: Duration) -> Self {
        self.delete_delay = Some(delay);
        self
    }

    /// Compute deletes return a `Running` operation instead of nothing.
    pub fn with_async_compute(mut self) -> Self {
        self.async_compute = true;
        self
    }

    pub fn with_zones(self, zones: &[&str]) -> Self {
        self.lock().zones = zones.iter().map(ToString::to_string).collect();
        self
    }

    pub fn with(self, resource: ResourceDescriptor) -> Self {
        self.lock().resources.push(resource);
        self
    }

    pub fn failing_zone(self, zone: &str, status: u16) -> Self {
        self.lock().zone_errors.insert(zone.to_string(), status);
        self
    }

    pub fn failing_listing(self, kind: ResourceKind, status: u16) -> Self {
        self.lock().kind_errors.insert(kind, status);
        self
    }

    pub fn failing_delete(self, display_name: &str, status: u16) -> Self {
        self.lock()
            .delete_errors
            .insert(display_name.to_string(), status);
        self
    }

    /// Cancel `token` as soon as `kind` is listed.
    pub fn cancelling_on_list(self, kind: ResourceKind, token: CancellationToken) -> Self {
        self.lock().cancel_on_list = Some((kind, token));
        self
    }

    /// Statuses returned, in order, when the operation of `name` is polled.
    pub fn scripted_operation(self, name: &str, statuses: Vec<OperationStatus>) -> Self {
        self.lock()
            .operations
            .insert(operation_name(name), statuses.into());
        self
    }

    /// Display names of issued deletes, in call order.
    pub fn deleted(&self) -> Vec<String> {
        self.lock().deleted.clone()
    }

    pub fn remaining(&self) -> Vec<String> {
        self.lock()
            .resources
            .iter()
            .map(|r| r.display_name.clone())
            .collect()
    }

    pub fn list_calls(&self) -> usize {
        self.lock().list_calls
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl CloudBackend for FakeBackend {
    async fn list_zones(
        &self,
        _project: String,
        page_token: Option<String>,
    ) -> Result<Page<String>, BackendError> {
        let zones = self.lock().zones.clone();
        Ok(page_of(zones, page_token.as_deref(), self.page_size, |z| z.as_str()))
    }

    async fn list_resources(
        &self,
        kind: ResourceKind,
        scope: Scope,
        page_token: Option<String>,
    ) -> Result<Page<ResourceDescriptor>, BackendError> {
        let mut state = self.lock();
        state.list_calls += 1;

        if let Some((_, token)) = state.cancel_on_list.as_ref().filter(|(k, _)| *k == kind) {
            token.cancel();
        }

        if let Some(status) = state.kind_errors.get(&kind) {
            return Err(BackendError::api(service_of(kind), *status, "listing denied"));
        }
        if let Some(zone) = scope.zone_name()
            && let Some(status) = state.zone_errors.get(zone)
        {
            return Err(BackendError::api(
                Service::Compute,
                *status,
                format!("zone {zone} unavailable"),
            ));
        }

        let items = state
            .resources
            .iter()
            .filter(|r| r.kind == kind && r.scope == scope)
            .cloned()
            .collect();
        Ok(page_of(items, page_token.as_deref(), self.page_size, |r| r.id.as_str()))
    }

    async fn delete_resource(
        &self,
        resource: &ResourceDescriptor,
    ) -> Result<Option<Operation>, BackendError> {
        if let Some(delay) = self.delete_delay {
            tokio::time::sleep(delay).await;
        }

        let service = service_of(resource.kind);
        let mut state = self.lock();
        state.deleted.push(resource.display_name.clone());

        if let Some(status) = state.delete_errors.get(&resource.display_name) {
            return Err(BackendError::api(service, *status, "permission denied"));
        }

        let before = state.resources.len();
        state.resources.retain(|r| r.id != resource.id);
        if state.resources.len() == before {
            return Err(BackendError::not_found(
                service,
                format!("{} was not found", resource.id),
            ));
        }

        if self.async_compute && service == Service::Compute {
            let name = operation_name(&resource.display_name);
            return Ok(Some(Operation {
                self_link: format!("https://fake/operations/{name}"),
                name,
                status: OperationStatus::Running,
            }));
        }
        Ok(None)
    }

    async fn operation_status(&self, operation: &Operation) -> Result<OperationStatus, BackendError> {
        let mut state = self.lock();
        let status = state
            .operations
            .get_mut(&operation.name)
            .and_then(VecDeque::pop_front)
            .unwrap_or(OperationStatus::Done);
        Ok(status)
    }
}

fn operation_name(resource: &str) -> String {
    format!("operation-delete-{resource}")
}

fn service_of(kind: ResourceKind) -> Service {
    match kind {
        ResourceKind::ServiceAccount | ResourceKind::CustomRole => Service::Iam,
        _ => Service::Compute,
    }
}

/// Cursor paging: the token is the key of the first item of the next page,
/// so deletes between pages never shift the listing.
fn page_of<T>(mut items: Vec<T>, token: Option<&str>, page_size: usize, key: fn(&T) -> &str) -> Page<T> {
    items.sort_by(|a, b| key(a).cmp(key(b)));
    let start = token.map_or(0, |t| items.iter().take_while(|i| key(*i) < t).count());
    let mut rest = items.split_off(start);
    if rest.len() > page_size {
        let tail = rest.split_off(page_size);
        let next = key(&tail[0]).to_string();
        Page::with_next(rest, next)
    } else {
        Page::last(rest)
    }
}

// ============================================================================
// Log capture
// ============================================================================

/// Formatted `tracing` output of the current thread.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Send this thread's events to the capture until the guard is dropped.
    pub fn install(&self) -> DefaultGuard {
        let sink = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    /// Captured lines that contain `needle`.
    pub fn lines_with(&self, needle: &str) -> Vec<String> {
        let buf = self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        String::from_utf8_lossy(&buf)
            .lines()
            .filter(|l| l.contains(needle))
            .map(ToString::to_string)
            .collect()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// Descriptor helpers
// ============================================================================

pub fn service_account(account_id: &str) -> ResourceDescriptor {
    let email = format!("{account_id}@{PROJECT}.iam.gserviceaccount.com");
    ResourceDescriptor::new(
        ResourceKind::ServiceAccount,
        format!("projects/{PROJECT}/serviceAccounts/{email}"),
        email,
        Scope::project(PROJECT),
    )
}

pub fn custom_role(role_id: &str) -> ResourceDescriptor {
    ResourceDescriptor::new(
        ResourceKind::CustomRole,
        format!("projects/{PROJECT}/roles/{role_id}"),
        role_id,
        Scope::project(PROJECT),
    )
}

pub fn instance(zone: &str, name: &str) -> ResourceDescriptor {
    ResourceDescriptor::new(
        ResourceKind::ComputeInstance,
        format!("zones/{zone}/instances/{name}"),
        name,
        Scope::zone(PROJECT, zone),
    )
}

pub fn firewall(name: &str, network: &str) -> ResourceDescriptor {
    ResourceDescriptor::new(
        ResourceKind::Firewall,
        format!("firewalls/{name}"),
        name,
        Scope::project(PROJECT),
    )
    .with_network(network)
}

pub fn network(name: &str) -> ResourceDescriptor {
    ResourceDescriptor::new(
        ResourceKind::Network,
        format!("networks/{name}"),
        name,
        Scope::project(PROJECT),
    )
}

/// Names in `names` as a set, for order-insensitive comparisons.
pub fn set(names: &[String]) -> HashSet<&str> {
    names.iter().map(String::as_str).collect()
}
