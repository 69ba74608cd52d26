//! Error types for filer-acl
//!
//! This module defines the error hierarchy that covers:
//! - Root path resolution and registry lookup failures
//! - Role specification and locking failures
//! - Native ACL tool (nfs4_getfacl / nfs4_setfacl) failures
//! - Backend and worker thread errors
//!
//! Validation and locking errors are fatal and surface before any ACL is
//! touched. Tool failures, unresolvable principals and unmanaged paths are
//! per-path failures: the path is logged, counted and skipped.

use crate::acl::role::RolePathMap;
use thiserror::Error;

/// Top-level error type for filer-acl
#[derive(Error, Debug)]
pub enum AclError {
    /// Root path missing or unreadable
    #[error("Path not found or not accessible: '{path}': {reason}")]
    PathNotFound { path: String, reason: String },

    /// Path is not under any registered filer mount
    #[error("No roler registered for path '{path}'")]
    RolerNotFound { path: String },

    /// Self-targeting, duplicate principal, or otherwise unusable role request
    #[error("Invalid role specification: {0}")]
    InvalidRoleSpec(String),

    /// Another run holds the lock file
    #[error("'{path}' is locked by another run ({holder})")]
    AlreadyLocked { path: String, holder: String },

    /// Native ACL tool errors
    #[error("ACL tool error: {0}")]
    Tool(#[from] ToolError),

    /// Principal name that cannot denote a user or group
    #[error("Invalid principal '{0}'")]
    InvalidPrincipal(String),

    /// Backend errors
    #[error("Roler error: {0}")]
    Roler(#[from] RolerError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// I/O errors (lock file, directory reads, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AclError {
    /// Check if this error only affects the path it occurred on
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AclError::Tool(_)
                | AclError::RolerNotFound { .. }
                | AclError::Io(_)
        )
    }
}

/// Errors from the native NFSv4 ACL tooling
#[derive(Error, Debug, Clone)]
pub enum ToolError {
    /// The tool binary could not be started
    #[error("Failed to run '{tool}': {reason}")]
    Spawn { tool: String, reason: String },

    /// The tool exited non-zero
    #[error("'{tool}' failed on '{path}' (exit {code:?}): {stderr}")]
    Failed {
        tool: String,
        path: String,
        code: Option<i32>,
        stderr: String,
    },

    /// An ACE line could not be parsed
    #[error("Malformed ACE '{line}': {reason}")]
    MalformedAce { line: String, reason: String },
}

/// Backend errors
#[derive(Error, Debug, Clone)]
pub enum RolerError {
    /// The backend does not implement the operation
    #[error("{operation} is not implemented for the {backend} backend")]
    NotImplemented {
        backend: &'static str,
        operation: &'static str,
    },

    /// Unknown backend name in a mount specification
    #[error("Unknown backend '{0}' (expected netapp, freenas or cephfs)")]
    UnknownBackend(String),
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid thread count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Set/remove called without any principal
    #[error("No principals given: specify at least one role list")]
    NoPrincipals,

    /// Malformed --mount argument
    #[error("Invalid mount '{spec}': {reason}")]
    InvalidMount { spec: String, reason: String },

    /// Unknown output format
    #[error("Invalid output format '{0}': expected text or json")]
    InvalidFormat(String),
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker panicked
    #[error("Worker {id} panicked: {message}")]
    Panicked { id: usize, message: String },

    /// Worker initialization failed
    #[error("Failed to initialize worker {id}: {reason}")]
    InitFailed { id: usize, reason: String },
}

/// Result type alias for AclError
pub type Result<T> = std::result::Result<T, AclError>;

/// Result type alias for ToolError
pub type ToolResult<T> = std::result::Result<T, ToolError>;

/// Represents the outcome of applying roles to a single path
#[derive(Debug)]
pub enum ApplyOutcome {
    /// Roles were read or written; carries the resulting state
    Applied(RolePathMap),

    /// Skipped because the path is not managed by any roler
    Skipped { path: String, reason: String },

    /// Failed with error
    Failed { path: String, error: AclError },
}

impl ApplyOutcome {
    /// Returns true if this outcome represents success
    pub fn is_success(&self) -> bool {
        matches!(self, ApplyOutcome::Applied(_))
    }

    /// Returns the path associated with this outcome
    pub fn path(&self) -> &str {
        match self {
            ApplyOutcome::Applied(r) => &r.path,
            ApplyOutcome::Skipped { path, .. } => path,
            ApplyOutcome::Failed { path, .. } => path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_error_recoverable() {
        let failed = AclError::Tool(ToolError::Failed {
            tool: "nfs4_setfacl".into(),
            path: "/project/a".into(),
            code: Some(1),
            stderr: "Operation not permitted".into(),
        });
        assert!(failed.is_recoverable());

        let locked = AclError::AlreadyLocked {
            path: "/project/a".into(),
            holder: "alice host 1".into(),
        };
        assert!(!locked.is_recoverable());
        assert!(!AclError::InvalidRoleSpec("dup".into()).is_recoverable());
    }

    #[test]
    fn test_error_conversion() {
        let err = RolerError::NotImplemented {
            backend: "CephFS",
            operation: "GetRoles",
        };
        let acl_err: AclError = err.into();
        assert!(matches!(acl_err, AclError::Roler(_)));
        assert_eq!(
            acl_err.to_string(),
            "Roler error: GetRoles is not implemented for the CephFS backend"
        );
    }

    #[test]
    fn test_outcome_path() {
        let outcome = ApplyOutcome::Skipped {
            path: "/elsewhere/x".into(),
            reason: "unmanaged".into(),
        };
        assert_eq!(outcome.path(), "/elsewhere/x");
        assert!(!outcome.is_success());
    }
}
