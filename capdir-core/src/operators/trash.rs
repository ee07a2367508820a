//! ``src/operators/trash.rs``
//! ============================================================================
//! # Trash Manager: soft delete built from copy and remove
//!
//! Deleted entries are relocated into a reserved directory directly under
//! the root, named `YYYYMMDD_HHMMSS_<original name>` in local time. The
//! original is removed only after the relocation copied every item.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{NaiveDateTime, TimeDelta};
use compact_str::{CompactString, format_compact};
use tokio::sync::OnceCell;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{Span, debug, info, instrument, warn};

use crate::error::{AppError, CoreResult};
use crate::model::entry::{Entry, EntryHandle};
use crate::operators::tree_copy::{CopyLimits, CopyProgress, CopyReport, copy_file, copy_tree};
use crate::storage::{ChildEntry, DirRef, EntryKind};
use crate::util::clock::Clock;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const TIMESTAMP_LEN: usize = 15;

/// Default name of the reserved trash directory.
pub const DEFAULT_TRASH_DIR: &str = ".trash";

/// Builds the timestamp-qualified name an entry gets inside the trash.
pub fn trash_name(now: NaiveDateTime, name: &str) -> CompactString {
    format_compact!("{}_{name}", now.format(TIMESTAMP_FORMAT))
}

/// Splits a trash name into its deletion time and original name.
pub fn parse_trash_name(trash_name: &str) -> Option<(NaiveDateTime, &str)> {
    let stamp: &str = trash_name.get(..TIMESTAMP_LEN)?;
    let original: &str = trash_name.get(TIMESTAMP_LEN..)?.strip_prefix('_')?;

    if original.is_empty() {
        return None;
    }

    let deleted_at: NaiveDateTime = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;

    Some((deleted_at, original))
}

/// One entry found in the trash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrashRecord {
    pub trash_name: CompactString,
    pub original_name: CompactString,
    pub deleted_at: NaiveDateTime,
    pub kind: EntryKind,
}

/// Result of a soft delete whose relocation succeeded.
#[derive(Debug, Clone)]
pub enum SoftDeleteOutcome {
    /// Relocated and original removed.
    Trashed { trash_name: CompactString },

    /// Relocated, but the original could not be removed. Both copies exist.
    TrashedOriginalKept {
        trash_name: CompactString,
        reason: AppError,
    },
}

impl SoftDeleteOutcome {
    pub fn trash_name(&self) -> &str {
        match self {
            Self::Trashed { trash_name } | Self::TrashedOriginalKept { trash_name, .. } => {
                trash_name.as_str()
            }
        }
    }

    pub fn original_removed(&self) -> bool {
        matches!(self, Self::Trashed { .. })
    }
}

/// Owns the trash directory of one root.
#[derive(Debug)]
pub struct TrashManager {
    root: DirRef,
    dir_name: CompactString,
    limits: CopyLimits,
    name_attempts: u32,
    clock: Arc<dyn Clock>,
    handle: OnceCell<DirRef>,
}

impl TrashManager {
    pub fn new<S: Into<CompactString>>(
        root: DirRef,
        dir_name: S,
        limits: CopyLimits,
        name_attempts: u32,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            root,
            dir_name: dir_name.into(),
            limits,
            name_attempts: name_attempts.max(1),
            clock,
            handle: OnceCell::new(),
        }
    }

    /// Name of the reserved directory under the root.
    pub fn dir_name(&self) -> &str {
        &self.dir_name
    }

    /// Whether `path` (root-relative) is the trash directory itself.
    pub fn is_trash_path(&self, path: &str) -> bool {
        path == self.dir_name.as_str()
    }

    /// Trash directory handle, created under the root on first use.
    pub async fn trash_dir(&self) -> CoreResult<&DirRef> {
        self.handle
            .get_or_try_init(|| async {
                debug!(name = %self.dir_name, "Opening trash directory");
                self.root.get_directory(&self.dir_name, true).await
            })
            .await
    }

    /// First free trash name for `name`, advancing the timestamp one second
    /// per collision.
    async fn free_trash_name(&self, trash: &DirRef, name: &str) -> CoreResult<CompactString> {
        let existing: HashSet<CompactString> = trash
            .enumerate()
            .await?
            .into_iter()
            .map(|c: ChildEntry| c.name)
            .collect();

        let now: NaiveDateTime = self.clock.now();

        for attempt in 0..self.name_attempts {
            let candidate: CompactString =
                trash_name(now + TimeDelta::seconds(i64::from(attempt)), name);

            if !existing.contains(&candidate) {
                return Ok(candidate);
            }
        }

        Err(AppError::AlreadyExists(trash_name(now, name)))
    }

    /// Copies `entry` into the trash. Returns the trash name.
    ///
    /// Succeeds only when every item was copied. On a partial copy the
    /// trash copy is removed best-effort and `PartialFailure` is returned.
    #[instrument(
        level = "info",
        skip(self, entry, progress),
        fields(name = %entry.name, trash_name = tracing::field::Empty)
    )]
    pub async fn relocate(
        &self,
        entry: &Entry,
        progress: Option<&UnboundedSender<CopyProgress>>,
    ) -> CoreResult<CompactString> {
        let trash: &DirRef = self.trash_dir().await?;
        let target: CompactString = self.free_trash_name(trash, &entry.name).await?;
        Span::current().record("trash_name", tracing::field::display(&target));

        match &entry.handle {
            EntryHandle::File(file) => {
                copy_file(file, trash, &target, &self.limits).await?;
            }

            EntryHandle::Directory(dir) => {
                let dest: DirRef = trash.get_directory(&target, true).await?;
                let report: CopyReport = copy_tree(dir, &dest, &self.limits, progress).await;

                if !report.is_complete() {
                    if let Err(e) = trash.remove(&target, true).await {
                        warn!(trash_name = %target, error = %e, "Could not remove partial trash copy");
                    }

                    return Err(AppError::PartialFailure {
                        operation: "move to trash",
                        failed: report.error_count,
                        succeeded: report.copied_count,
                    });
                }
            }
        }

        Ok(target)
    }

    /// Relocates `entry` into the trash, then removes it from `parent`.
    ///
    /// A failed relocation leaves the original untouched.
    #[instrument(
        name = "soft_delete",
        level = "info",
        skip(self, parent, entry, progress),
        fields(operation_id = tracing::field::Empty, path = %entry.path)
    )]
    pub async fn soft_delete(
        &self,
        parent: &DirRef,
        entry: &Entry,
        progress: Option<&UnboundedSender<CopyProgress>>,
    ) -> CoreResult<SoftDeleteOutcome> {
        let operation_id: String = nanoid::nanoid!();
        Span::current().record("operation_id", tracing::field::display(&operation_id));

        if self.is_trash_path(&entry.path) {
            return Err(AppError::invalid_name(
                entry.name.clone(),
                "the trash directory cannot be deleted",
            ));
        }

        let target: CompactString = self.relocate(entry, progress).await?;

        match parent.remove(&entry.name, entry.is_dir()).await {
            Ok(()) => {
                info!(path = %entry.path, trash_name = %target, "Moved to trash");
                Ok(SoftDeleteOutcome::Trashed { trash_name: target })
            }

            Err(e) => {
                warn!(path = %entry.path, error = %e, "Trashed copy kept, original not removed");
                Ok(SoftDeleteOutcome::TrashedOriginalKept {
                    trash_name: target,
                    reason: e,
                })
            }
        }
    }

    /// Parseable trash entries, newest first. Missing trash means empty.
    pub async fn list_trash(&self) -> CoreResult<Vec<TrashRecord>> {
        let trash: DirRef = match self.root.get_directory(&self.dir_name, false).await {
            Ok(trash) => trash,

            Err(AppError::NotFound(_)) => return Ok(Vec::new()),

            Err(e) => return Err(e),
        };

        let mut records: Vec<TrashRecord> = trash
            .enumerate()
            .await?
            .into_iter()
            .filter_map(|child: ChildEntry| {
                let (deleted_at, original) = parse_trash_name(&child.name)?;

                Some(TrashRecord {
                    original_name: CompactString::from(original),
                    trash_name: child.name.clone(),
                    deleted_at,
                    kind: child.kind,
                })
            })
            .collect();

        records.sort_by(|a: &TrashRecord, b: &TrashRecord| {
            b.deleted_at
                .cmp(&a.deleted_at)
                .then_with(|| a.trash_name.cmp(&b.trash_name))
        });

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::dir_scanner::list_directory;
    use crate::storage::memory::{Fault, MemoryStore};
    use crate::util::clock::FixedClock;

    fn manager(store: &MemoryStore) -> TrashManager {
        let clock = FixedClock::at(2025, 1, 1, 12, 0, 0).unwrap();

        TrashManager::new(
            store.root(),
            DEFAULT_TRASH_DIR,
            CopyLimits::default(),
            5,
            Arc::new(clock),
        )
    }

    async fn entry(store: &MemoryStore, name: &str) -> Entry {
        list_directory(&store.root(), "", true, DEFAULT_TRASH_DIR)
            .await
            .unwrap()
            .into_iter()
            .find(|e| e.name == name)
            .unwrap()
    }

    #[test]
    fn test_trash_name_round_trip() {
        let now = FixedClock::at(2025, 1, 1, 12, 0, 0).unwrap().now();

        assert_eq!(trash_name(now, "b"), "20250101_120000_b");

        let (at, original) = parse_trash_name("20250101_120000_my_file.txt").unwrap();
        assert_eq!(at, now);
        assert_eq!(original, "my_file.txt");

        assert!(parse_trash_name("20250101_120000_").is_none());
        assert!(parse_trash_name("notatimestamp_x").is_none());
        assert!(parse_trash_name("短").is_none());
    }

    #[tokio::test]
    async fn test_soft_delete_directory() {
        let store = MemoryStore::new();
        store.add_file("a.txt", "alpha").add_file("b/c.txt", "gamma");
        let trash = manager(&store);
        let b = entry(&store, "b").await;

        let outcome = trash.soft_delete(&store.root(), &b, None).await.unwrap();

        assert!(outcome.original_removed());
        assert_eq!(outcome.trash_name(), "20250101_120000_b");
        assert_eq!(
            store.file_data(".trash/20250101_120000_b/c.txt").unwrap(),
            "gamma"
        );
        assert!(!store.contains("b"));
        assert_eq!(store.child_names(".trash"), vec!["20250101_120000_b"]);
    }

    #[tokio::test]
    async fn test_name_collision_advances_timestamp() {
        let store = MemoryStore::new();
        store
            .add_file("a.txt", "one")
            .add_file(".trash/20250101_120000_a.txt", "older");
        let trash = manager(&store);
        let a = entry(&store, "a.txt").await;

        let outcome = trash.soft_delete(&store.root(), &a, None).await.unwrap();

        assert_eq!(outcome.trash_name(), "20250101_120001_a.txt");
        assert_eq!(
            store.file_data(".trash/20250101_120000_a.txt").unwrap(),
            "older"
        );
    }

    #[tokio::test]
    async fn test_partial_copy_keeps_original() {
        let store = MemoryStore::new();
        store
            .add_file("b/ok.txt", "fine")
            .add_file("b/bad.txt", "broken");
        store.inject(Fault::Read, "b/bad.txt");
        let trash = manager(&store);
        let b = entry(&store, "b").await;

        let result = trash.soft_delete(&store.root(), &b, None).await;

        assert!(matches!(
            result,
            Err(AppError::PartialFailure {
                failed: 1,
                succeeded: 1,
                ..
            })
        ));
        assert!(store.contains("b/ok.txt"));
        assert!(store.contains("b/bad.txt"));
        assert!(store.child_names(".trash").is_empty());
    }

    #[tokio::test]
    async fn test_failed_original_removal_is_reported() {
        let store = MemoryStore::new();
        store.add_file("a.txt", "alpha");
        store.inject(Fault::Remove, "a.txt");
        let trash = manager(&store);
        let a = entry(&store, "a.txt").await;

        let outcome = trash.soft_delete(&store.root(), &a, None).await.unwrap();

        assert!(matches!(
            outcome,
            SoftDeleteOutcome::TrashedOriginalKept { .. }
        ));
        assert!(store.contains("a.txt"));
        assert!(store.contains(".trash/20250101_120000_a.txt"));
    }

    #[tokio::test]
    async fn test_list_trash_parses_records() {
        let store = MemoryStore::new();
        store
            .add_file(".trash/20250101_120000_a.txt", "a")
            .add_dir(".trash/20250102_080000_b")
            .add_file(".trash/stray.txt", "?");
        let trash = manager(&store);

        let records = trash.list_trash().await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].original_name, "b");
        assert_eq!(records[0].kind, EntryKind::Directory);
        assert_eq!(records[1].original_name, "a.txt");
    }

    #[tokio::test]
    async fn test_list_trash_without_trash_dir() {
        let store = MemoryStore::new();
        let trash = manager(&store);

        assert!(trash.list_trash().await.unwrap().is_empty());
        assert!(!store.contains(DEFAULT_TRASH_DIR));
    }
}
