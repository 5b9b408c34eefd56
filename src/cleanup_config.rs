//! Run configuration.
//!
//! Unique responsibility: hold the immutable per-run settings (`CleanupConfig`)
//! and the environment parsing helpers shared by every `from_env()` constructor.
//!
//! The config is built once by the caller and passed by reference into every
//! component; nothing reads ambient globals after that.

use std::{env, time::Duration};

use thiserror::Error;

/// Default resource-name prefix.
pub const DEFAULT_PREFIX: &str = "privesc";

/// What to do with the asynchronous operation a compute delete returns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OperationPolicy {
    /// Only require that the delete request was accepted.
    #[default]
    FireAndForget,
    /// Poll the operation until it is done, with exponential backoff.
    Wait {
        /// Overall bound for one operation.
        timeout: Duration,
        /// First poll delay; doubled after each poll.
        initial_backoff: Duration,
        /// Upper bound for the poll delay.
        max_backoff: Duration,
    },
}

impl OperationPolicy {
    /// Build a `Wait` policy from environment variables.
    ///
    /// Env:
    /// - `SWEEPER_OPERATION_TIMEOUT_MS` (default: 120000)
    /// - `SWEEPER_POLL_INTERVAL_MS` (default: 1000)
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but not an unsigned integer.
    pub fn wait_from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let timeout_ms = parse_u64_env("SWEEPER_OPERATION_TIMEOUT_MS", 120_000)?;
        let poll_ms = parse_u64_env("SWEEPER_POLL_INTERVAL_MS", 1_000)?;

        Ok(Self::Wait {
            timeout: Duration::from_millis(timeout_ms),
            initial_backoff: Duration::from_millis(poll_ms.max(1)),
            max_backoff: Duration::from_secs(10),
        })
    }
}

/// Settings of one cleanup run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CleanupConfig {
    project_id: String,
    prefix: String,
    dry_run: bool,
    force: bool,
    operations: OperationPolicy,
}

impl CleanupConfig {
    /// Create a config for `project_id` with the default prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the project ID is empty.
    pub fn new(project_id: impl Into<String>) -> Result<Self, ConfigError> {
        let project_id = project_id.into().trim().to_string();
        if project_id.is_empty() {
            return Err(ConfigError::EmptyProject);
        }

        Ok(Self {
            project_id,
            prefix: DEFAULT_PREFIX.to_string(),
            dry_run: false,
            force: false,
            operations: OperationPolicy::default(),
        })
    }

    /// Override the match prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefix is empty: an empty prefix would match
    /// every resource in the project.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Result<Self, ConfigError> {
        let prefix = prefix.into();
        if prefix.is_empty() {
            return Err(ConfigError::EmptyPrefix);
        }
        self.prefix = prefix;
        Ok(self)
    }

    /// Enable or disable dry-run mode.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Skip the interactive confirmation.
    #[must_use]
    pub const fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Choose how compute operations are handled.
    #[must_use]
    pub const fn with_operation_policy(mut self, policy: OperationPolicy) -> Self {
        self.operations = policy;
        self
    }

    /// Target project.
    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Match prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether mutating calls are suppressed.
    #[must_use]
    pub const fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Whether the confirmation prompt is skipped.
    #[must_use]
    pub const fn force(&self) -> bool {
        self.force
    }

    /// Compute operation handling.
    #[must_use]
    pub const fn operation_policy(&self) -> OperationPolicy {
        self.operations
    }

    /// Whether the caller must ask before running.
    #[must_use]
    pub const fn needs_confirmation(&self) -> bool {
        !self.force && !self.dry_run
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Project ID missing or blank.
    #[error("project id must not be empty")]
    EmptyProject,
    /// Prefix is empty.
    #[error("prefix must not be empty")]
    EmptyPrefix,
    /// Invalid environment variable value.
    #[error("invalid env var {key}={value:?}: {reason}")]
    InvalidEnv {
        /// The environment variable key.
        key: &'static str,
        /// The environment variable value.
        value: String,
        /// The reason for invalidity.
        reason: &'static str,
    },
}

pub(crate) fn env_or(key: &'static str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

pub(crate) fn optional_env(key: &'static str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub(crate) fn parse_u64_env(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    env::var(key).map_or_else(
        |_| Ok(default),
        |v| {
            v.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnv {
                key,
                value: v,
                reason: "expected an unsigned integer",
            })
        },
    )
}

pub(crate) fn parse_u32_env(key: &'static str, default: u32) -> Result<u32, ConfigError> {
    env::var(key).map_or_else(
        |_| Ok(default),
        |v| {
            v.trim().parse::<u32>().map_err(|_| ConfigError::InvalidEnv {
                key,
                value: v,
                reason: "expected an unsigned integer",
            })
        },
    )
}
