//! ``src/controller/guard.rs``
//! ============================================================================
//! # Operation locks: single-flight guard for session operations
//!
//! A coarse `operating` flag plus one flag per operation family. Acquiring
//! needs both clear and sets both; a second caller gets `Busy` at once, no
//! queueing. The returned [`OperationGuard`] clears both flags on drop, so
//! early returns, errors and unwinding all release them.
//!
//! Navigation and reads that replace session snapshots take a guard as well,
//! so a listing cannot be committed while a mutation is running and a
//! mutation cannot start while a listing is in flight.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, trace};

use crate::error::{AppError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Upload,

    Rename,

    Delete,

    Create,

    /// Directory stack changes.
    Navigate,

    /// Listing, search and tree reloads.
    Read,
}

impl OperationKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",

            Self::Rename => "rename",

            Self::Delete => "delete",

            Self::Create => "create",

            Self::Navigate => "navigate",

            Self::Read => "read",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
pub struct OperationLocks {
    operating: AtomicBool,
    uploading: AtomicBool,
    renaming: AtomicBool,
    deleting: AtomicBool,
    creating: AtomicBool,
    navigating: AtomicBool,
    reading: AtomicBool,
}

impl OperationLocks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn flag(&self, kind: OperationKind) -> &AtomicBool {
        match kind {
            OperationKind::Upload => &self.uploading,

            OperationKind::Rename => &self.renaming,

            OperationKind::Delete => &self.deleting,

            OperationKind::Create => &self.creating,

            OperationKind::Navigate => &self.navigating,

            OperationKind::Read => &self.reading,
        }
    }

    /// Takes the coarse flag and the flag of `kind`, or fails with `Busy`.
    pub fn acquire(self: &Arc<Self>, kind: OperationKind) -> CoreResult<OperationGuard> {
        if self
            .operating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(operation = %kind, "Rejected, another operation is running");
            return Err(AppError::Busy(kind.as_str()));
        }

        if self
            .flag(kind)
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.operating.store(false, Ordering::Release);
            debug!(operation = %kind, "Rejected, same operation is running");
            return Err(AppError::Busy(kind.as_str()));
        }

        trace!(operation = %kind, "Operation lock acquired");

        Ok(OperationGuard {
            locks: Arc::clone(self),
            kind,
        })
    }

    pub fn is_busy(&self) -> bool {
        self.operating.load(Ordering::Acquire)
    }

    pub fn is_running(&self, kind: OperationKind) -> bool {
        self.flag(kind).load(Ordering::Acquire)
    }
}

/// Releases its flags when dropped.
#[derive(Debug)]
pub struct OperationGuard {
    locks: Arc<OperationLocks>,
    kind: OperationKind,
}

impl OperationGuard {
    pub fn kind(&self) -> OperationKind {
        self.kind
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.locks.flag(self.kind).store(false, Ordering::Release);
        self.locks.operating.store(false, Ordering::Release);

        trace!(operation = %self.kind, "Operation lock released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_busy() {
        let locks = OperationLocks::new();

        let guard = locks.acquire(OperationKind::Rename).unwrap();
        assert!(locks.is_busy());
        assert!(locks.is_running(OperationKind::Rename));

        assert!(matches!(
            locks.acquire(OperationKind::Delete),
            Err(AppError::Busy("delete"))
        ));
        assert!(!locks.is_running(OperationKind::Delete));

        drop(guard);
        assert!(!locks.is_busy());
        assert!(locks.acquire(OperationKind::Delete).is_ok());
    }

    #[test]
    fn test_guard_released_on_panic() {
        let locks = OperationLocks::new();
        let inner = Arc::clone(&locks);

        let result = std::panic::catch_unwind(move || {
            let _guard = inner.acquire(OperationKind::Upload).unwrap();
            panic!("boom");
        });

        assert!(result.is_err());
        assert!(!locks.is_busy());
        assert!(!locks.is_running(OperationKind::Upload));
    }

    #[test]
    fn test_navigation_and_mutation_exclude_each_other() {
        let locks = OperationLocks::new();

        let nav = locks.acquire(OperationKind::Navigate).unwrap();
        assert!(matches!(
            locks.acquire(OperationKind::Delete),
            Err(AppError::Busy("delete"))
        ));
        drop(nav);

        let _create = locks.acquire(OperationKind::Create).unwrap();
        assert!(matches!(
            locks.acquire(OperationKind::Navigate),
            Err(AppError::Busy("navigate"))
        ));
        assert!(matches!(
            locks.acquire(OperationKind::Read),
            Err(AppError::Busy("read"))
        ));
    }
}
