//! src/error.rs
//! ============================================================================
//! # `AppError`: Unified Error Type for the File-Operation Engine
//!
//! Every engine operation returns `CoreResult<T>`. Variants carry enough
//! context (offending name, counts) for a caller to build a meaningful
//! notification without inspecting storage again.

use std::io;

use compact_str::CompactString;
use thiserror::Error;

use crate::util::humanize::human_readable_size;

/// Convenient alias carrying the unified error type.
pub type CoreResult<T> = Result<T, AppError>;

/// Unified error type for all engine operations.
#[derive(Debug, Error)]
pub enum AppError {
    /// Standard IO error not covered by a more specific variant.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Requested file or directory does not exist.
    #[error("File or directory not found: {0}")]
    NotFound(CompactString),

    /// A file was found where a directory was expected, or the reverse.
    #[error("Type mismatch for '{name}': expected {expected}")]
    TypeMismatch {
        name: CompactString,
        expected: &'static str,
    },

    /// Target name is already taken by a sibling.
    #[error("'{0}' already exists")]
    AlreadyExists(CompactString),

    /// Empty name, disallowed characters or a reserved name.
    #[error("Invalid name '{name}': {reason}")]
    InvalidName {
        name: CompactString,
        reason: &'static str,
    },

    /// File exceeds the configured size ceiling. Raised before any I/O.
    #[error(
        "'{name}' is too large ({}), limit is {}",
        human_readable_size(*size),
        human_readable_size(*limit)
    )]
    TooLarge {
        name: CompactString,
        size: u64,
        limit: u64,
    },

    /// Permission to the capability was denied or revoked.
    #[error("Permission denied: {0}")]
    PermissionDenied(CompactString),

    /// Another operation holds the concurrency guard.
    #[error("Another operation is in progress ({0})")]
    Busy(&'static str),

    /// Aggregate failure of sub-items inside a recursive operation.
    #[error("{operation} finished with {failed} failed item(s) ({succeeded} succeeded)")]
    PartialFailure {
        operation: &'static str,
        failed: usize,
        succeeded: usize,
    },

    /// Operation cancelled at a confirmation step.
    #[error("Operation was cancelled")]
    Cancelled,

    /// Index outside the valid range (breadcrumb jumps).
    #[error("Index {index} out of range (length {len})")]
    OutOfRange { index: usize, len: usize },

    /// Operation not allowed in the current session state.
    #[error("Invalid state: {0}")]
    InvalidState(CompactString),

    /// TOML config or settings parse error.
    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] toml::ser::Error),

    /// Any other error, with description.
    #[error("Unexpected error: {0}")]
    Other(String),
}

impl AppError {
    #[must_use]
    /// Attach extra context to an error.
    pub fn with_context<S: Into<String>>(self, ctx: S) -> Self {
        Self::Other(format!("{}: {}", ctx.into(), self))
    }

    /// Create a not-found error for a name or path.
    pub fn not_found<S: Into<CompactString>>(what: S) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a type mismatch error.
    pub fn type_mismatch<S: Into<CompactString>>(name: S, expected: &'static str) -> Self {
        Self::TypeMismatch {
            name: name.into(),
            expected,
        }
    }

    /// Create an invalid-name error.
    pub fn invalid_name<S: Into<CompactString>>(name: S, reason: &'static str) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason,
        }
    }

    /// Create a too-large error.
    pub fn too_large<S: Into<CompactString>>(name: S, size: u64, limit: u64) -> Self {
        Self::TooLarge {
            name: name.into(),
            size,
            limit,
        }
    }

    /// Create an invalid-state error.
    pub fn invalid_state<S: Into<CompactString>>(message: S) -> Self {
        Self::InvalidState(message.into())
    }

    /// Map an `io::Error` raised while touching `name` onto the taxonomy.
    pub fn from_io(name: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(CompactString::from(name)),

            io::ErrorKind::PermissionDenied => Self::PermissionDenied(CompactString::from(name)),

            io::ErrorKind::AlreadyExists => Self::AlreadyExists(CompactString::from(name)),

            _ => Self::Io(err),
        }
    }

    /// Whether this error should abort an enclosing recursive walk.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(self, Self::Busy(_))
    }
}

// Manual Clone implementation to handle non-Clone fields
impl Clone for AppError {
    fn clone(&self) -> Self {
        match self {
            Self::Io(e) => Self::Io(io::Error::new(e.kind(), e.to_string())),
            Self::NotFound(name) => Self::NotFound(name.clone()),
            Self::TypeMismatch { name, expected } => Self::TypeMismatch {
                name: name.clone(),
                expected,
            },
            Self::AlreadyExists(name) => Self::AlreadyExists(name.clone()),
            Self::InvalidName { name, reason } => Self::InvalidName {
                name: name.clone(),
                reason,
            },
            Self::TooLarge { name, size, limit } => Self::TooLarge {
                name: name.clone(),
                size: *size,
                limit: *limit,
            },
            Self::PermissionDenied(name) => Self::PermissionDenied(name.clone()),
            Self::Busy(op) => Self::Busy(op),
            Self::PartialFailure {
                operation,
                failed,
                succeeded,
            } => Self::PartialFailure {
                operation,
                failed: *failed,
                succeeded: *succeeded,
            },
            Self::Cancelled => Self::Cancelled,
            Self::OutOfRange { index, len } => Self::OutOfRange {
                index: *index,
                len: *len,
            },
            Self::InvalidState(msg) => Self::InvalidState(msg.clone()),
            Self::Config(e) => Self::Other(format!("Config error: {e}")),
            Self::Serde(e) => Self::Other(format!("Serde error: {e}")),
            Self::Other(msg) => Self::Other(msg.clone()),
        }
    }
}

// Allow conversion from `anyhow::Error` as fallback.
impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        Self::Other(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_errors_map_onto_taxonomy() {
        let err = AppError::from_io("a.txt", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, AppError::NotFound(ref n) if n == "a.txt"));

        let err = AppError::from_io("a.txt", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, AppError::PermissionDenied(_)));

        let err = AppError::from_io("a.txt", io::Error::other("disk on fire"));
        assert!(matches!(err, AppError::Io(_)));
    }

    #[test]
    fn test_too_large_message_is_human_readable() {
        let err = AppError::too_large("big.iso", 2048, 1024);
        let msg = err.to_string();

        assert!(msg.contains("big.iso"));
        assert!(msg.contains("2 KB"));
        assert!(msg.contains("1 KB"));
    }

    #[test]
    fn test_clone_preserves_variant() {
        let err = AppError::PartialFailure {
            operation: "copy",
            failed: 1,
            succeeded: 4,
        };

        assert!(matches!(
            err.clone(),
            AppError::PartialFailure {
                failed: 1,
                succeeded: 4,
                ..
            }
        ));
        assert!(AppError::Busy("rename").clone().is_busy());
    }
}
