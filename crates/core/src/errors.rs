//! Error types and handling
//!
//! This module provides domain-specific error types following the devcontainer
//! core specification (`§7 Error Handling Design`). Each subsystem gets its own
//! error enum so call sites can match on the failure mode that matters to them,
//! while `DeaconError` is the umbrella type that crosses module boundaries and
//! is what most public functions in this crate return.

use thiserror::Error;

/// Domain errors for the DevContainer CLI
#[derive(Error, Debug)]
pub enum DeaconError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigurationNotFound { path: String },

    /// Configuration file parsing error
    #[error("Failed to parse configuration file: {message}")]
    ConfigurationParse { message: String },

    /// Configuration file I/O error
    #[error("Failed to read configuration file: {source}")]
    ConfigurationIo {
        #[from]
        source: std::io::Error,
    },

    /// Configuration validation error
    #[error("Configuration validation error: {message}")]
    ConfigurationValidation { message: String },

    /// Feature not implemented
    #[error("Feature not implemented: {feature}")]
    NotImplemented { feature: String },

    /// Wraps a [`DockerError`] (container runtime driver shim)
    #[error(transparent)]
    Docker(#[from] DockerError),

    /// Wraps a [`FeatureError`] (feature fetch, dependency resolution, ordering)
    #[error(transparent)]
    Feature(#[from] FeatureError),

    /// Wraps a [`ConfigError`]
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Template-related errors
    #[error("Template error: {message}")]
    Template { message: String },

    /// Network-related errors
    #[error("Network error: {message}")]
    Network { message: String },

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Authentication errors
    #[error("Authentication error: {message}")]
    Authentication { message: String },

    /// Catch-all for conditions that should never surface structured data to the caller
    #[error("Internal error: {0}")]
    Internal(#[from] InternalError),

    /// Image or feature build failed; `stderr_tail` carries the last bytes of
    /// captured build output so the caller can show useful context without
    /// re-running the build.
    #[error("Build failed: {message}")]
    Build { message: String, stderr_tail: String },

    /// A lifecycle phase command exited non-zero; subsequent phases are skipped.
    #[error("Lifecycle execution failed: {0}")]
    Lifecycle(String),

    /// Free-form runtime failure (container driver calls, subprocess plumbing).
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// The request-scoped context was cancelled. This is not reported as an
    /// error to the caller on the goroutine/task responsible for agent
    /// injection (see §5); everywhere else it propagates like any other error.
    #[error("operation cancelled")]
    Cancelled,

    /// Wraps a [`TunnelTimeout`]: a tunnel readiness probe or request exceeded
    /// its budget.
    #[error(transparent)]
    TunnelTimeout(#[from] TunnelTimeout),

    /// Tunnel protocol failure other than a timeout (transport error,
    /// malformed response, unrecognized message kind).
    #[error("tunnel error: {message}")]
    Tunnel { message: String },
}

impl DeaconError {
    /// True when this error represents an observed cancellation rather than a
    /// genuine failure. Callers on the agent-injection path use this to avoid
    /// reporting cancellation as an error.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, DeaconError::Cancelled)
    }
}

/// Convenience type alias for Results with DeaconError
pub type Result<T> = std::result::Result<T, DeaconError>;

/// Errors raised while discovering, parsing, or merging `devcontainer.json`.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {path}")]
    NotFound { path: String },

    #[error("multiple devcontainer configurations found, pass a selector: {paths:?}")]
    MultipleConfigs { paths: Vec<String> },

    #[error("failed to parse configuration at {path}: {message}")]
    Parsing { path: String, message: String },

    #[error("configuration validation failed: {message}")]
    Validation { message: String },

    #[error("cycle detected while resolving extends chain: {0:?}")]
    ExtendsCycle(Vec<String>),

    #[error("configuration feature not implemented: {0}")]
    NotImplemented(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised by feature fetch, dependency resolution, and ordering
/// (components B and A of the core).
#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("feature not found: {path}")]
    NotFound { path: String },

    #[error("failed to parse feature metadata: {message}")]
    Parsing { message: String },

    #[error("circular dependency detected involving feature {0}")]
    DependencyCycle(String),

    #[error("failed to resolve feature dependencies: {message}")]
    DependencyResolution { message: String },

    #[error("invalid dependency '{dependency}' declared by feature '{feature_id}'")]
    InvalidDependency {
        feature_id: String,
        dependency: String,
    },

    #[error("failed to download feature '{feature_id}': {message}")]
    Download { feature_id: String, message: String },

    #[error("failed to extract feature archive: {message}")]
    Extraction { message: String },

    #[error("feature installation failed: {message}")]
    Installation { message: String },

    #[error("feature '{feature_id}' installation failed: {message}")]
    InstallationFailed { feature_id: String, message: String },

    #[error("feature validation error: {message}")]
    Validation { message: String },

    #[error("feature registry authentication failed: {message}")]
    Authentication { message: String },

    #[error("unauthorized to access feature: {message}")]
    Unauthorized { message: String },

    #[error("access to feature forbidden: {message}")]
    Forbidden { message: String },

    #[error("OCI registry error: {message}")]
    Oci { message: String },

    #[error("feature not implemented: {0}")]
    NotImplemented(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type FeatureResult<T> = std::result::Result<T, FeatureError>;

/// Errors raised by the container runtime driver shim.
#[derive(Error, Debug)]
pub enum DockerError {
    #[error("docker/podman CLI not found on PATH")]
    NotInstalled,

    #[error("container not found: {id}")]
    ContainerNotFound { id: String },

    #[error("command execution failed in container with exit code {code}")]
    ExecFailed { code: i32 },

    #[error("failed to allocate a TTY for exec: {reason}")]
    TTYFailed { reason: String },

    #[error("container runtime CLI returned an error: {0}")]
    CLIError(String),
}

/// Catch-all for invariant violations: conditions the code assumes can never
/// happen. Surfacing these distinctly makes them easy to grep for in bug
/// reports instead of blending into ordinary `Runtime` errors.
#[derive(Error, Debug)]
pub enum InternalError {
    #[error("internal invariant violated: {message}")]
    Generic { message: String },
}

/// Prebuild hasher exceeded the directory-hash file limit (component C).
/// The hash returned alongside this error is still usable (it is a partial
/// hash over the files that were visited); callers may ignore this error or
/// abort depending on policy.
#[derive(Error, Debug)]
#[error("context directory hash exceeded the {limit}-file limit; {counted} files visited")]
pub struct HashLimitExceeded {
    pub limit: usize,
    pub counted: usize,
}

/// A tunnel request exceeded its readiness/response budget (§6, §9).
#[derive(Error, Debug)]
#[error("tunnel operation timed out after {elapsed_ms}ms (budget {budget_ms}ms)")]
pub struct TunnelTimeout {
    pub elapsed_ms: u64,
    pub budget_ms: u64,
}
