//! Error types for the Lakeward deployment engine.
//!
//! This module provides a comprehensive error hierarchy for all operations
//! in the deployment lifecycle: configuration, deployment state, file sync,
//! artifact builds, workspace access, and the IaC engine handoff.

use std::path::PathBuf;
use thiserror::Error;

use crate::dynvalue::Location;

/// The main error type for the Lakeward deployment engine.
#[derive(Debug, Error)]
pub enum LakewardError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Deployment state errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// File sync errors.
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// Artifact build errors.
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    /// Workspace capability errors.
    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    /// IaC engine errors.
    #[error("IaC engine error: {0}")]
    Iac(#[from] IacError),

    /// Policy errors (fatal, never retried).
    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
///
/// These carry source locations whenever the offending node is known, so
/// diagnostics can point back at the original YAML.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The bundle root marker was not found.
    #[error("Bundle root not found (searched upward from {start})")]
    RootNotFound {
        /// Directory the search started from.
        start: PathBuf,
    },

    /// A configuration file was not found.
    #[error("Configuration file not found: {path} ({reason})")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
        /// Why the file is unusable.
        reason: String,
    },

    /// A configuration file could not be parsed.
    #[error("Failed to parse {location}: {message}")]
    ParseError {
        /// Position of the parse failure.
        location: Location,
        /// Description of the parse error.
        message: String,
    },

    /// An `include:` pattern is not a relative path.
    #[error("Include path must be relative: '{pattern}' at {location}")]
    AbsoluteInclude {
        /// The offending pattern.
        pattern: String,
        /// Location of the include entry.
        location: Location,
    },

    /// Values of different kinds cannot be merged.
    #[error("Cannot merge {left_kind} with {right_kind} at {path}")]
    MergeKindMismatch {
        /// Kind of the base value.
        left_kind: String,
        /// Kind of the override value.
        right_kind: String,
        /// Config path of the conflict.
        path: String,
    },

    /// Both `targets` and legacy `environments` are present.
    #[error("Both 'environments' ({environments}) and 'targets' ({targets}) are defined; use 'targets' only")]
    EnvironmentsAndTargets {
        /// Location of the `environments` key.
        environments: Location,
        /// Location of the `targets` key.
        targets: Location,
    },

    /// The selected target does not exist.
    #[error("Target '{name}' is not defined in this bundle")]
    UnknownTarget {
        /// The requested target name.
        name: String,
    },

    /// No target could be selected.
    #[error("No target specified and no default target is defined")]
    NoDefaultTarget,

    /// Duplicate resource key across resource types.
    #[error("Duplicate resource key '{key}' defined at: {}", locations.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
    DuplicateResourceKey {
        /// The duplicated key.
        key: String,
        /// All source locations that define it.
        locations: Vec<Location>,
    },

    /// A referenced variable is not declared.
    #[error("Variable '{name}' is not declared in 'variables'")]
    UndeclaredVariable {
        /// The referenced variable name.
        name: String,
    },

    /// A declared variable has no value after resolution.
    #[error("Variable '{name}' has no value: set --var {name}=..., BUNDLE_VAR_{name}, or a default")]
    UnresolvedVariable {
        /// The variable name.
        name: String,
    },

    /// Interpolation cycle detected.
    #[error("Interpolation cycle detected at {location}: {}", paths.join(" -> "))]
    InterpolationCycle {
        /// The chain of paths forming the cycle.
        paths: Vec<String>,
        /// Location of the reference that closed the cycle.
        location: Location,
    },

    /// A reference points at a path that does not exist in the tree.
    #[error("Reference '${{{reference}}}' at {location} cannot be resolved")]
    UnresolvedReference {
        /// The dotted reference path.
        reference: String,
        /// Location of the referring string.
        location: Location,
    },

    /// A notebook or file path does not resolve locally.
    #[error("Path '{path}' referenced from {location} does not exist locally")]
    PathNotFound {
        /// The unresolvable path.
        path: String,
        /// Location of the reference.
        location: Location,
    },

    /// Typed projection failed.
    #[error("Configuration does not match the expected schema: {message}")]
    SchemaMismatch {
        /// Description of the mismatch.
        message: String,
    },

    /// A script hook failed.
    #[error("Script hook '{hook}' failed with exit code {code}")]
    ScriptFailed {
        /// Hook name (preinit, postinit, ...).
        hook: String,
        /// Process exit code.
        code: i32,
    },
}

/// Deployment state errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State document is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// The remote state was written by a newer CLI.
    #[error("Remote deployment state version {version} was written by CLI {cli_version}; upgrade required")]
    UpgradeRequired {
        /// Remote state schema version.
        version: u64,
        /// CLI version that wrote it.
        cli_version: String,
    },

    /// Lock acquisition failed.
    #[error("Failed to acquire deployment lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// Lock is held by another client.
    #[error("Deployment is locked by {holder} (since {since}); use --force-lock to override")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },
}

/// File sync errors.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A local file could not be read.
    #[error("Failed to read local file {path}: {message}")]
    LocalRead {
        /// Path of the local file.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// A remote operation failed after exhausting retries.
    #[error("Remote {operation} failed for '{remote_path}' after {attempts} attempts: {message}")]
    RemoteFailed {
        /// The logical operation (put, delete, mkdir, rmdir).
        operation: String,
        /// Remote path the operation targeted.
        remote_path: String,
        /// Number of attempts made.
        attempts: u32,
        /// Underlying error message.
        message: String,
    },

    /// The snapshot file is unusable.
    #[error("Sync snapshot is corrupted: {message}")]
    SnapshotCorrupted {
        /// Description of the corruption.
        message: String,
    },
}

/// Artifact build errors.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The build command exited nonzero.
    #[error("Build of artifact '{artifact}' failed (exit code {code})")]
    CommandFailed {
        /// Artifact name.
        artifact: String,
        /// Process exit code.
        code: i32,
        /// Captured stdout.
        stdout: String,
        /// Captured stderr.
        stderr: String,
    },

    /// The build command could not be started.
    #[error("Failed to run build command for artifact '{artifact}': {message}")]
    CommandSpawn {
        /// Artifact name.
        artifact: String,
        /// Description of the failure.
        message: String,
    },

    /// An artifact has no build command and no prebuilt files.
    #[error("Artifact '{artifact}' has no 'build' command and no 'files'")]
    NothingToBuild {
        /// Artifact name.
        artifact: String,
    },
}

/// Workspace capability errors.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// Authentication failed.
    #[error("Workspace authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// Permission denied by the workspace.
    #[error("Workspace permission denied for {operation}: {message}")]
    PermissionDenied {
        /// The logical operation name.
        operation: String,
        /// Error message from the workspace.
        message: String,
    },

    /// The remote object was not found.
    #[error("Workspace object not found: {path}")]
    NotFound {
        /// Remote path.
        path: String,
    },

    /// Transient transport error (retryable).
    #[error("Workspace transport error during {operation}: {message}")]
    Transport {
        /// The logical operation name.
        operation: String,
        /// Description of the transport failure.
        message: String,
    },

    /// A variable lookup returned no match.
    #[error("Lookup for {resource} named '{name}' returned no match")]
    LookupFailed {
        /// Resource kind of the lookup (cluster, warehouse, ...).
        resource: String,
        /// The name being looked up.
        name: String,
    },
}

/// IaC engine errors.
#[derive(Debug, Error)]
pub enum IacError {
    /// The engine invocation failed.
    #[error("IaC {operation} failed: {message}")]
    OperationFailed {
        /// The engine operation (init, plan, apply, destroy).
        operation: String,
        /// Description of the failure.
        message: String,
    },

    /// The engine state document could not be parsed.
    #[error("IaC state document is invalid: {message}")]
    InvalidState {
        /// Description of the problem.
        message: String,
    },
}

/// Policy errors: guard trips and target-mode validation failures.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A declared resource is currently running.
    #[error("{resource_type} '{name}' is running; deploy aborted (deployment.fail_on_active_runs)")]
    ResourceRunning {
        /// Resource type (job, pipeline).
        resource_type: String,
        /// Resource key.
        name: String,
    },

    /// Target mode validation failed.
    #[error("Target mode validation failed: {message}")]
    ModeViolation {
        /// Description of the violation.
        message: String,
    },
}

/// Result type alias for Lakeward operations.
pub type Result<T> = std::result::Result<T, LakewardError>;

// Path and pattern parsers report failures as plain messages.
impl From<String> for LakewardError {
    fn from(message: String) -> Self {
        Self::Internal(message)
    }
}

impl LakewardError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is a transport-layer transient worth
    /// retrying. Business errors (bad request, forbidden, not found) and
    /// policy errors never retry.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Workspace(WorkspaceError::Transport { .. }))
    }

    /// Returns the suggested retry delay in seconds, if applicable.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::Workspace(WorkspaceError::Transport { .. }) => Some(2),
            _ => None,
        }
    }
}

impl ConfigError {
    /// Creates a parse error at a source location.
    #[must_use]
    pub fn parse(location: Location, message: impl Into<String>) -> Self {
        Self::ParseError {
            location,
            message: message.into(),
        }
    }

    /// Creates a schema mismatch error.
    #[must_use]
    pub fn schema(message: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            message: message.into(),
        }
    }
}

impl StateError {
    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Creates a corruption error with the given message.
    #[must_use]
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }
}

impl WorkspaceError {
    /// Creates a transport error for a logical operation.
    #[must_use]
    pub fn transport(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

impl IacError {
    /// Creates an operation failure for a logical engine operation.
    #[must_use]
    pub fn operation(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            message: message.into(),
        }
    }
}
