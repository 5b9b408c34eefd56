//! Cleanup data model.
//!
//! Unique responsibility: describe what the sweeper sees (resource descriptors)
//! and what it did (deletion outcomes, per-type run results, the final report).
//!
//! Everything here is plain data: descriptors are immutable once listed,
//! `RunResult` is only mutated by the cleaner that owns it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The resource types the sweeper knows how to tear down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// IAM service account.
    ServiceAccount,
    /// Project-level custom IAM role.
    CustomRole,
    /// Compute Engine VM instance (zonal).
    ComputeInstance,
    /// VPC firewall rule.
    Firewall,
    /// VPC network.
    Network,
}

impl ResourceKind {
    /// Dependency order used by the orchestrator.
    ///
    /// Firewall rules are bound to networks, so they must go first.
    pub const CLEANUP_ORDER: [Self; 5] = [
        Self::ServiceAccount,
        Self::CustomRole,
        Self::ComputeInstance,
        Self::Firewall,
        Self::Network,
    ];

    /// Section title used in the run log.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::ServiceAccount => "Service Accounts",
            Self::CustomRole => "Custom IAM Roles",
            Self::ComputeInstance => "Compute Instances",
            Self::Firewall => "Firewall Rules",
            Self::Network => "VPC Networks",
        }
    }

    /// Singular noun used in per-resource log lines.
    #[must_use]
    pub const fn noun(self) -> &'static str {
        match self {
            Self::ServiceAccount => "service account",
            Self::CustomRole => "custom role",
            Self::ComputeInstance => "instance",
            Self::Firewall => "firewall rule",
            Self::Network => "network",
        }
    }

    /// Plural noun used in the "nothing found" notice.
    #[must_use]
    pub const fn plural(self) -> &'static str {
        match self {
            Self::ServiceAccount => "service accounts",
            Self::CustomRole => "custom roles",
            Self::ComputeInstance => "compute instances",
            Self::Firewall => "firewall rules",
            Self::Network => "VPC networks",
        }
    }

    /// Whether the listing API for this kind is partitioned by zone.
    #[must_use]
    pub const fn is_zonal(self) -> bool {
        matches!(self, Self::ComputeInstance)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.noun())
    }
}

/// Where a resource lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum Scope {
    /// Project-wide (IAM objects, global compute resources).
    Project {
        /// Project ID.
        project: String,
    },
    /// A single zone of a project.
    Zone {
        /// Project ID.
        project: String,
        /// Zone name, e.g. `us-central1-a`.
        zone: String,
    },
}

impl Scope {
    /// Project-wide scope.
    #[must_use]
    pub fn project(project: impl Into<String>) -> Self {
        Self::Project {
            project: project.into(),
        }
    }

    /// Zonal scope.
    #[must_use]
    pub fn zone(project: impl Into<String>, zone: impl Into<String>) -> Self {
        Self::Zone {
            project: project.into(),
            zone: zone.into(),
        }
    }

    /// Project ID of this scope.
    #[must_use]
    pub fn project_id(&self) -> &str {
        match self {
            Self::Project { project } | Self::Zone { project, .. } => project,
        }
    }

    /// Zone name, if zonal.
    #[must_use]
    pub fn zone_name(&self) -> Option<&str> {
        match self {
            Self::Project { .. } => None,
            Self::Zone { zone, .. } => Some(zone),
        }
    }
}

/// One listed resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Resource type.
    pub kind: ResourceKind,
    /// Fully-qualified resource path used for the delete call,
    /// e.g. `projects/p/zones/z/instances/vm-1`.
    pub id: String,
    /// Name used for prefix matching and logging.
    pub display_name: String,
    /// Where the resource lives.
    pub scope: Scope,
    /// Short name of the network a firewall rule is bound to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
}

impl ResourceDescriptor {
    /// Build a descriptor without network binding.
    #[must_use]
    pub fn new(
        kind: ResourceKind,
        id: impl Into<String>,
        display_name: impl Into<String>,
        scope: Scope,
    ) -> Self {
        Self {
            kind,
            id: id.into(),
            display_name: display_name.into(),
            scope,
            network: None,
        }
    }

    /// Attach the network a firewall rule belongs to.
    #[must_use]
    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }
}

/// Result of one delete attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionOutcome {
    /// The backend accepted (or completed) the delete.
    Deleted,
    /// The resource no longer existed.
    AlreadyGone,
    /// Any other failure, including timeouts.
    Failed(String),
    /// Dry run: the delete was not issued.
    WouldDelete,
}

/// Per-type counters accumulated during one cleaner pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// Matching resources a delete was attempted (or simulated) for.
    pub attempted: u64,
    /// Successful deletes.
    pub deleted: u64,
    /// Resources that were already gone.
    pub already_gone: u64,
    /// Failed deletes.
    pub failed: u64,
    /// Dry-run deletes that were only simulated.
    pub simulated: u64,
    /// Zones whose listing failed and were skipped.
    pub listing_errors: u64,
    /// The pass stopped early (listing failure or cancellation).
    pub aborted: bool,
    /// The pass stopped because the run was cancelled.
    #[serde(default)]
    pub cancelled: bool,
}

impl RunResult {
    /// Fold one outcome into the counters.
    pub const fn record(&mut self, outcome: &DeletionOutcome) {
        self.attempted = self.attempted.saturating_add(1);
        match outcome {
            DeletionOutcome::Deleted => self.deleted = self.deleted.saturating_add(1),
            DeletionOutcome::AlreadyGone => {
                self.already_gone = self.already_gone.saturating_add(1);
            }
            DeletionOutcome::Failed(_) => self.failed = self.failed.saturating_add(1),
            DeletionOutcome::WouldDelete => self.simulated = self.simulated.saturating_add(1),
        }
    }

    /// Whether anything went wrong in this pass.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        self.failed > 0 || self.listing_errors > 0 || self.aborted
    }
}

/// One entry of the final report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassReport {
    /// Resource type of the pass.
    pub kind: ResourceKind,
    /// Counters of the pass.
    #[serde(flatten)]
    pub result: RunResult,
}

/// Aggregate of all cleaner passes of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Project the run targeted.
    pub project: String,
    /// Prefix the run matched against.
    pub prefix: String,
    /// Whether the run was a dry run.
    pub dry_run: bool,
    /// The run was cancelled before all passes finished.
    pub interrupted: bool,
    /// Completed passes, in execution order.
    pub passes: Vec<PassReport>,
}

impl CleanupReport {
    /// Counters of a given pass, if it ran.
    #[must_use]
    pub fn result_for(&self, kind: ResourceKind) -> Option<&RunResult> {
        self.passes
            .iter()
            .find(|p| p.kind == kind)
            .map(|p| &p.result)
    }

    /// Sum of all pass counters.
    #[must_use]
    pub fn totals(&self) -> RunResult {
        self.passes.iter().fold(RunResult::default(), |mut acc, p| {
            acc.attempted = acc.attempted.saturating_add(p.result.attempted);
            acc.deleted = acc.deleted.saturating_add(p.result.deleted);
            acc.already_gone = acc.already_gone.saturating_add(p.result.already_gone);
            acc.failed = acc.failed.saturating_add(p.result.failed);
            acc.simulated = acc.simulated.saturating_add(p.result.simulated);
            acc.listing_errors = acc.listing_errors.saturating_add(p.result.listing_errors);
            acc.aborted |= p.result.aborted;
            acc.cancelled |= p.result.cancelled;
            acc
        })
    }

    /// Whether any deletion failed or any listing was degraded.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.passes.iter().any(|p| p.result.is_degraded())
    }
}
