//! GCP Sweeper - prefix-scoped teardown of Google Cloud test resources.
//!
//! A library and CLI that removes the resources a vulnerable-by-design lab
//! leaves behind when its Terraform state is lost:
//! - **Service accounts** whose ID starts with the prefix (or `test-`)
//! - **Custom IAM roles** whose ID starts with `prefix_`
//! - **Compute instances** in every zone of the project
//! - **Firewall rules**, then the **VPC networks** they are bound to
//!
//! Deletion is best-effort: already-deleted resources and individual failures
//! are counted and reported, never fatal.
//!
//! ## Quick Start
//!
//! Authentication comes from the environment. Create a `.env` file or export:
//!
//! ```text
//! GCP_ACCESS_TOKEN=$(gcloud auth print-access-token)
//! ```
//!
//! Without `GCP_ACCESS_TOKEN`, the GCE metadata server is used.
//!
//! ```ignore
//! use gcp_sweeper::{CleanupConfig, CleanupOrchestrator, GcpClient, GcpClientConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = GcpClient::new(GcpClientConfig::from_env()?)?;
//!     let cfg = CleanupConfig::new("my-project")?.with_dry_run(true);
//!
//!     let report = CleanupOrchestrator::new(client, cfg)
//!         .run(&CancellationToken::new())
//!         .await;
//!
//!     println!("{}", serde_json::to_string_pretty(&report)?);
//!     Ok(())
//! }
//! ```

// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy for strict discipline
#![deny(clippy::all)]                 // All standard Clippy lints
#![deny(clippy::pedantic)]            // Very strict Clippy lints
#![deny(clippy::nursery)]             // Experimental lints
#![deny(clippy::unwrap_used)]         // unwrap() is forbidden
#![deny(clippy::expect_used)]         // expect() is forbidden
#![deny(clippy::panic)]               // panic!() is forbidden
#![deny(clippy::print_stdout)]        // println!() is forbidden in production
#![deny(clippy::todo)]                // TODO is forbidden
#![deny(clippy::unimplemented)]       // unimplemented!() is forbidden
#![deny(clippy::missing_const_for_fn)] // Force const when possible
#![deny(clippy::unwrap_in_result)]    // unwrap() in Result is forbidden
#![deny(clippy::module_inception)]    // Module with same name as crate is forbidden
#![deny(clippy::redundant_clone)]     // Useless clones are forbidden
#![deny(clippy::shadow_unrelated)]    // Shadowing unrelated variables is forbidden
#![deny(clippy::too_many_arguments)]  // Limit function arguments
#![deny(clippy::cognitive_complexity)] // Limit cognitive complexity
#![cfg_attr(test, allow(clippy::panic))]

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Modules
// ============================================================================

/// Resource descriptors, outcomes and run results.
pub mod cleanup_types;

/// Run configuration and environment helpers.
pub mod cleanup_config;

/// Prefix matching rules per resource type.
pub mod cleanup_filter;

/// Lazy, pagination-transparent listing.
pub mod cleanup_lister;

/// Single-resource deletion and outcome classification.
pub mod cleanup_deleter;

/// One cleanup pass per resource type.
pub mod cleanup_cleaner;

/// Dependency-ordered execution of all passes.
pub mod cleanup_orchestrator;

/// Process exit codes of the binary.
pub mod exit_codes;

/// Backend trait and error taxonomy.
///
/// Implement `CloudBackend` to run the sweeper against something other than
/// the Google Cloud REST APIs.
pub mod gcp_backend;

/// Bearer tokens (static or metadata server).
pub mod gcp_auth;

/// Google Cloud IAM / Compute REST client.
pub mod gcp_client;

// ============================================================================
// Re-exports for convenience
// ============================================================================

pub use cleanup_cleaner::TypeCleaner;
pub use cleanup_config::{CleanupConfig, ConfigError, OperationPolicy};
pub use cleanup_deleter::ResourceDeleter;
pub use cleanup_filter::matches;
pub use cleanup_orchestrator::CleanupOrchestrator;
pub use cleanup_types::{
    CleanupReport, DeletionOutcome, ResourceDescriptor, ResourceKind, RunResult, Scope,
};
pub use gcp_backend::{BackendError, CloudBackend, Operation, OperationStatus, Page, Service};
pub use gcp_client::{GcpClient, GcpClientConfig};
