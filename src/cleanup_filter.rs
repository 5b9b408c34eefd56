//! Prefix matching.
//!
//! Unique responsibility: decide whether a listed resource is in scope for
//! deletion. Pure string logic, no I/O.

use crate::cleanup_types::ResourceKind;

/// Service accounts whose local part starts with this are always swept,
/// whatever the configured prefix is.
pub const SERVICE_ACCOUNT_FALLBACK_PREFIX: &str = "test-";

/// Whether `display_name` of a resource of `kind` matches `prefix`.
///
/// - Service accounts: the local part of the email (before `@`) starts with
///   `prefix` or with `test-`.
/// - Custom roles: the role ID (last path segment) starts with `prefix_`.
/// - Instances, firewall rules, networks: the name starts with `prefix`.
#[must_use]
pub fn matches(kind: ResourceKind, display_name: &str, prefix: &str) -> bool {
    match kind {
        ResourceKind::ServiceAccount => {
            let account_id = display_name.split('@').next().unwrap_or(display_name);
            account_id.starts_with(prefix) || account_id.starts_with(SERVICE_ACCOUNT_FALLBACK_PREFIX)
        }
        ResourceKind::CustomRole => {
            let role_id = display_name.rsplit('/').next().unwrap_or(display_name);
            role_id
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('_'))
        }
        ResourceKind::ComputeInstance | ResourceKind::Firewall | ResourceKind::Network => {
            display_name.starts_with(prefix)
        }
    }
}

/// The prefix as shown in the "nothing found" notice for `kind`.
#[must_use]
pub fn display_prefix(kind: ResourceKind, prefix: &str) -> String {
    match kind {
        ResourceKind::CustomRole => format!("{prefix}_"),
        _ => prefix.to_string(),
    }
}
