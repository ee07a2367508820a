//! ``src/operators/rename.rs``
//! ============================================================================
//! # Rename Engine: rename by copy, verify, delete
//!
//! Storage has no rename primitive. A file is copied under its new name and
//! the original removed. A folder goes through [`DirectoryRename`], a small
//! state machine that creates the destination, fills it with the tree copy,
//! and only then removes the source.

use std::cmp::Ordering;

use compact_str::{CompactString, format_compact};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{Span, debug, info, instrument, warn};

use crate::controller::confirm::{Confirmer, PartialCopyChoice};
use crate::error::{AppError, CoreResult};
use crate::model::entry::{Entry, EntryHandle};
use crate::operators::tree_copy::{CopyLimits, CopyProgress, CopyReport, copy_file, copy_tree};
use crate::storage::{ChildEntry, DirRef, FileRef};

/// Characters no entry name may contain.
pub const FORBIDDEN_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Validates a user-supplied name for a new or renamed entry.
///
/// Returns the trimmed name.
pub fn validate_new_name(
    raw: &str,
    at_root: bool,
    trash_dir_name: &str,
) -> CoreResult<CompactString> {
    let name: &str = raw.trim();

    if name.is_empty() {
        return Err(AppError::invalid_name(raw, "name cannot be empty"));
    }

    if name.contains(FORBIDDEN_CHARS) {
        return Err(AppError::invalid_name(
            name,
            r#"name cannot contain any of < > : " / \ | ? *"#,
        ));
    }

    if name == "." || name == ".." {
        return Err(AppError::invalid_name(name, "name is reserved"));
    }

    if at_root && name == trash_dir_name {
        return Err(AppError::invalid_name(
            name,
            "name is reserved for the trash directory",
        ));
    }

    Ok(CompactString::from(name))
}

/// Extension of `name`, without the dot. Leading-dot names have none.
pub fn extension(name: &str) -> Option<&str> {
    match name.rfind('.') {
        Some(0) | None => None,

        Some(idx) => Some(&name[idx + 1..]).filter(|ext: &&str| !ext.is_empty()),
    }
}

/// A bare stem given for a file keeps the file's extension.
pub fn effective_file_name(old_name: &str, new_name: &str) -> CompactString {
    match extension(old_name) {
        Some(ext) if !new_name.contains('.') => format_compact!("{new_name}.{ext}"),

        _ => CompactString::from(new_name),
    }
}

/// Terminal state of a rename.
#[derive(Debug, Clone)]
pub enum RenameOutcome {
    /// Renamed. `changed` is false when the name was already the target.
    /// `copy_errors` counts items lost when the caller chose to delete the
    /// source after a partial folder copy.
    Success {
        new_name: CompactString,
        changed: bool,
        copy_errors: usize,
    },

    /// Declined at confirmation. Nothing changed.
    Cancelled,

    /// Aborted. The destination was rolled back best-effort.
    Failed { reason: AppError },

    /// Both the source and an incomplete destination were kept.
    PartiallyFailed {
        new_name: CompactString,
        copied: usize,
        errors: usize,
    },
}

impl RenameOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Phases of a folder rename, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RenamePhase {
    Pending,

    DestinationCreated,

    Copied,

    SourceRemoved,
}

/// Where a rename happens.
#[derive(Debug, Clone, Copy)]
pub struct RenameContext<'a> {
    /// Directory holding the entry.
    pub parent: &'a DirRef,
    pub at_root: bool,
    pub trash_dir_name: &'a str,
    pub limits: CopyLimits,
}

/// Validates and dispatches a rename of `entry` to `raw_name`.
///
/// Invalid names, name collisions and oversized files are errors and never
/// touch storage. Everything after validation ends in a [`RenameOutcome`].
#[instrument(
    name = "rename_entry",
    level = "info",
    skip(ctx, entry, confirmer, progress),
    fields(operation_id = tracing::field::Empty, path = %entry.path)
)]
pub async fn rename_entry(
    ctx: RenameContext<'_>,
    entry: &Entry,
    raw_name: &str,
    confirmer: &dyn Confirmer,
    progress: Option<&UnboundedSender<CopyProgress>>,
) -> CoreResult<RenameOutcome> {
    let operation_id: String = nanoid::nanoid!();
    Span::current().record("operation_id", tracing::field::display(&operation_id));

    if ctx.at_root && entry.name == ctx.trash_dir_name && entry.is_dir() {
        return Err(AppError::invalid_name(
            entry.name.clone(),
            "the trash directory cannot be renamed",
        ));
    }

    let validated: CompactString = validate_new_name(raw_name, ctx.at_root, ctx.trash_dir_name)?;

    let new_name: CompactString = match entry.handle {
        EntryHandle::File(_) => effective_file_name(&entry.name, &validated),

        EntryHandle::Directory(_) => validated,
    };

    if new_name == entry.name {
        debug!(name = %new_name, "Rename to same name, nothing to do");
        return Ok(RenameOutcome::Success {
            new_name,
            changed: false,
            copy_errors: 0,
        });
    }

    // Re-validate the completed file name against the reserved name
    validate_new_name(&new_name, ctx.at_root, ctx.trash_dir_name)?;

    // Copy then delete would drop the only copy on a case-insensitive disk
    if fold_case(&new_name) == fold_case(&entry.name) {
        return Err(AppError::invalid_name(
            new_name,
            "names differing only in case are not supported",
        ));
    }

    if sibling_collides(ctx.parent, &new_name).await? {
        return Err(AppError::AlreadyExists(new_name));
    }

    match &entry.handle {
        EntryHandle::File(file) => rename_file(ctx, file, &entry.name, new_name).await,

        EntryHandle::Directory(dir) => {
            let mut machine: DirectoryRename<'_> =
                DirectoryRename::new(ctx, dir.clone(), entry.name.clone(), new_name);

            machine.run(confirmer, progress).await
        }
    }
}

fn fold_case(name: &str) -> String {
    name.to_lowercase()
}

/// Whether any sibling already holds `name`, compared without case.
async fn sibling_collides(parent: &DirRef, name: &str) -> CoreResult<bool> {
    let folded: String = fold_case(name);
    let children: Vec<ChildEntry> = parent.enumerate().await?;

    Ok(children
        .iter()
        .any(|c: &ChildEntry| fold_case(&c.name) == folded))
}

/// Copies the file under `new_name`, then removes the original.
async fn rename_file(
    ctx: RenameContext<'_>,
    file: &FileRef,
    old_name: &str,
    new_name: CompactString,
) -> CoreResult<RenameOutcome> {
    let size: u64 = file.size().await?;
    ctx.limits.check(old_name, size)?;

    if let Err(e) = copy_file(file, ctx.parent, &new_name, &ctx.limits).await {
        warn!(old = old_name, new = %new_name, error = %e, "File rename copy failed");
        return Ok(RenameOutcome::Failed { reason: e });
    }

    if let Err(e) = ctx.parent.remove(old_name, false).await {
        warn!(old = old_name, error = %e, "Renamed copy written, original kept");
        return Ok(RenameOutcome::PartiallyFailed {
            new_name,
            copied: 1,
            errors: 1,
        });
    }

    info!(old = old_name, new = %new_name, "File renamed");

    Ok(RenameOutcome::Success {
        new_name,
        changed: true,
        copy_errors: 0,
    })
}

/// Folder rename state machine: `Pending -> DestinationCreated -> Copied ->
/// SourceRemoved`.
#[derive(Debug)]
pub struct DirectoryRename<'a> {
    ctx: RenameContext<'a>,
    source: DirRef,
    old_name: CompactString,
    new_name: CompactString,
    phase: RenamePhase,
    destination: Option<DirRef>,
    report: Option<CopyReport>,
}

impl<'a> DirectoryRename<'a> {
    pub fn new(
        ctx: RenameContext<'a>,
        source: DirRef,
        old_name: CompactString,
        new_name: CompactString,
    ) -> Self {
        Self {
            ctx,
            source,
            old_name,
            new_name,
            phase: RenamePhase::Pending,
            destination: None,
            report: None,
        }
    }

    pub fn phase(&self) -> RenamePhase {
        self.phase
    }

    pub fn report(&self) -> Option<&CopyReport> {
        self.report.as_ref()
    }

    fn advance(&mut self, next: RenamePhase) {
        debug_assert_eq!(self.phase.cmp(&next), Ordering::Less);

        debug!(from = ?self.phase, to = ?next, name = %self.new_name, "Rename phase");
        self.phase = next;
    }

    async fn create_destination(&mut self) -> CoreResult<()> {
        let destination: DirRef = self.ctx.parent.get_directory(&self.new_name, true).await?;

        self.destination = Some(destination);
        self.advance(RenamePhase::DestinationCreated);
        Ok(())
    }

    async fn copy(&mut self, progress: Option<&UnboundedSender<CopyProgress>>) -> CoreResult<()> {
        let destination: &DirRef = self
            .destination
            .as_ref()
            .ok_or_else(|| AppError::invalid_state("rename destination missing"))?;

        let report: CopyReport =
            copy_tree(&self.source, destination, &self.ctx.limits, progress).await;

        self.report = Some(report);
        self.advance(RenamePhase::Copied);
        Ok(())
    }

    async fn remove_source(&mut self) -> CoreResult<()> {
        self.ctx.parent.remove(&self.old_name, true).await?;

        self.advance(RenamePhase::SourceRemoved);
        Ok(())
    }

    /// Removes the destination if the source is still in place.
    async fn rollback(&mut self) {
        if self.phase >= RenamePhase::SourceRemoved {
            return;
        }

        match self.ctx.parent.remove(&self.new_name, true).await {
            Ok(()) => debug!(name = %self.new_name, "Rename destination rolled back"),

            Err(AppError::NotFound(_)) => {}

            Err(e) => warn!(name = %self.new_name, error = %e, "Rollback failed"),
        }

        self.destination = None;
    }

    async fn fail(&mut self, reason: AppError) -> RenameOutcome {
        warn!(
            old = %self.old_name,
            new = %self.new_name,
            phase = ?self.phase,
            error = %reason,
            "Folder rename failed"
        );

        self.rollback().await;
        RenameOutcome::Failed { reason }
    }

    /// Drives the machine to a terminal outcome.
    pub async fn run(
        &mut self,
        confirmer: &dyn Confirmer,
        progress: Option<&UnboundedSender<CopyProgress>>,
    ) -> CoreResult<RenameOutcome> {
        if !confirmer
            .confirm_directory_rename(&self.old_name, &self.new_name)
            .await
        {
            info!(name = %self.old_name, "Folder rename cancelled");
            return Ok(RenameOutcome::Cancelled);
        }

        if let Err(e) = self.create_destination().await {
            return Ok(self.fail(e).await);
        }

        if let Err(e) = self.copy(progress).await {
            return Ok(self.fail(e).await);
        }

        let (copied, errors): (usize, usize) = self
            .report
            .as_ref()
            .map_or((0, 0), |r: &CopyReport| (r.copied_count, r.error_count));

        if errors > 0 {
            let choice: PartialCopyChoice = match self.report.as_ref() {
                Some(report) => {
                    confirmer
                        .resolve_partial_copy(&self.old_name, &self.new_name, report)
                        .await
                }

                None => PartialCopyChoice::KeepBoth,
            };

            if choice == PartialCopyChoice::KeepBoth {
                info!(copied, errors, "Partial folder copy, keeping both");
                return Ok(RenameOutcome::PartiallyFailed {
                    new_name: self.new_name.clone(),
                    copied,
                    errors,
                });
            }
        }

        if let Err(e) = self.remove_source().await {
            // The destination is complete; the source may be half removed
            warn!(name = %self.old_name, error = %e, "Source removal failed, destination kept");
            return Ok(RenameOutcome::PartiallyFailed {
                new_name: self.new_name.clone(),
                copied,
                errors: errors + 1,
            });
        }

        info!(old = %self.old_name, new = %self.new_name, copied, errors, "Folder renamed");

        Ok(RenameOutcome::Success {
            new_name: self.new_name.clone(),
            changed: true,
            copy_errors: errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::confirm::AutoConfirm;
    use crate::fs::dir_scanner::list_directory;
    use crate::storage::memory::{Fault, MemoryStore};
    use tokio::sync::mpsc;

    const TRASH: &str = ".trash";

    async fn entry(store: &MemoryStore, name: &str) -> Entry {
        list_directory(&store.root(), "", true, TRASH)
            .await
            .unwrap()
            .into_iter()
            .find(|e| e.name == name)
            .unwrap()
    }

    fn ctx(root: &DirRef) -> RenameContext<'_> {
        RenameContext {
            parent: root,
            at_root: true,
            trash_dir_name: TRASH,
            limits: CopyLimits::default(),
        }
    }

    #[test]
    fn test_validate_new_name() {
        assert_eq!(validate_new_name("  ok.txt ", true, TRASH).unwrap(), "ok.txt");
        assert!(validate_new_name("   ", true, TRASH).is_err());
        assert!(validate_new_name("a/b", false, TRASH).is_err());
        assert!(validate_new_name("what?", false, TRASH).is_err());
        assert!(validate_new_name(TRASH, true, TRASH).is_err());
        assert!(validate_new_name(TRASH, false, TRASH).is_ok());
    }

    #[test]
    fn test_bare_stem_keeps_extension() {
        assert_eq!(effective_file_name("report.pdf", "final"), "final.pdf");
        assert_eq!(effective_file_name("report.pdf", "final.txt"), "final.txt");
        assert_eq!(effective_file_name("Makefile", "Build"), "Build");
        assert_eq!(effective_file_name(".env", "env2"), "env2");
        assert_eq!(extension("archive.tar.gz"), Some("gz"));
    }

    #[tokio::test]
    async fn test_same_name_is_success_without_io() {
        let store = MemoryStore::new();
        store.add_file("a.txt", "alpha");
        let root = store.root();
        let a = entry(&store, "a.txt").await;
        let (reads, writes, removes) = (store.reads(), store.writes(), store.removes());

        let outcome = rename_entry(ctx(&root), &a, "a", &AutoConfirm::yes(), None)
            .await
            .unwrap();

        assert!(matches!(outcome, RenameOutcome::Success { changed: false, .. }));
        assert_eq!(
            (store.reads(), store.writes(), store.removes()),
            (reads, writes, removes)
        );
    }

    #[tokio::test]
    async fn test_file_rename_and_collision() {
        let store = MemoryStore::new();
        store.add_file("a.txt", "alpha").add_file("b.txt", "beta");
        let root = store.root();
        let a = entry(&store, "a.txt").await;

        assert!(matches!(
            rename_entry(ctx(&root), &a, "b", &AutoConfirm::yes(), None).await,
            Err(AppError::AlreadyExists(_))
        ));

        let outcome = rename_entry(ctx(&root), &a, "c", &AutoConfirm::yes(), None)
            .await
            .unwrap();

        assert!(outcome.is_success());
        assert_eq!(store.file_data("c.txt").unwrap(), "alpha");
        assert!(!store.contains("a.txt"));
    }

    #[tokio::test]
    async fn test_case_only_rename_is_refused() {
        let store = MemoryStore::new();
        store.add_file("A.txt", "alpha").add_file("b/c.txt", "gamma");
        let root = store.root();
        let a = entry(&store, "A.txt").await;
        let b = entry(&store, "b").await;
        let (writes, removes) = (store.writes(), store.removes());

        assert!(matches!(
            rename_entry(ctx(&root), &a, "a", &AutoConfirm::yes(), None).await,
            Err(AppError::InvalidName { .. })
        ));
        assert!(matches!(
            rename_entry(ctx(&root), &b, "B", &AutoConfirm::yes(), None).await,
            Err(AppError::InvalidName { .. })
        ));

        assert_eq!(store.file_data("A.txt").unwrap(), "alpha");
        assert_eq!(store.paths(), vec!["A.txt", "b", "b/c.txt"]);
        assert_eq!((store.writes(), store.removes()), (writes, removes));
    }

    #[tokio::test]
    async fn test_collision_ignores_case() {
        let store = MemoryStore::new();
        store.add_file("a.txt", "alpha").add_file("B.txt", "beta");
        let root = store.root();
        let a = entry(&store, "a.txt").await;

        assert!(matches!(
            rename_entry(ctx(&root), &a, "b", &AutoConfirm::yes(), None).await,
            Err(AppError::AlreadyExists(_))
        ));
        assert_eq!(store.file_data("a.txt").unwrap(), "alpha");
        assert_eq!(store.file_data("B.txt").unwrap(), "beta");
    }

    #[tokio::test]
    async fn test_oversized_file_is_rejected_before_io() {
        let store = MemoryStore::new();
        store.add_file("big.bin", "0123456789");
        let root = store.root();
        let big = entry(&store, "big.bin").await;
        let mut context = ctx(&root);
        context.limits = CopyLimits { max_file_size: 9 };

        let result = rename_entry(context, &big, "small", &AutoConfirm::yes(), None).await;

        assert!(matches!(result, Err(AppError::TooLarge { size: 10, limit: 9, .. })));
        assert_eq!(store.paths(), vec!["big.bin"]);
        assert_eq!(store.reads(), 0);
    }

    #[tokio::test]
    async fn test_folder_rename_moves_tree_with_progress() {
        let store = MemoryStore::new();
        store.add_file("b/c.txt", "gamma").add_file("b/d/e.txt", "eps");
        let root = store.root();
        let b = entry(&store, "b").await;
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = rename_entry(ctx(&root), &b, "renamed", &AutoConfirm::yes(), Some(&tx))
            .await
            .unwrap();

        assert!(matches!(outcome, RenameOutcome::Success { changed: true, copy_errors: 0, .. }));
        assert_eq!(store.file_data("renamed/d/e.txt").unwrap(), "eps");
        assert!(!store.contains("b"));

        drop(tx);
        let mut events = 0;
        while rx.recv().await.is_some() {
            events += 1;
        }
        assert_eq!(events, 2);
    }

    #[tokio::test]
    async fn test_folder_rename_declined() {
        let store = MemoryStore::new();
        store.add_file("b/c.txt", "gamma");
        let root = store.root();
        let b = entry(&store, "b").await;

        let outcome = rename_entry(ctx(&root), &b, "x", &AutoConfirm::no(), None)
            .await
            .unwrap();

        assert!(matches!(outcome, RenameOutcome::Cancelled));
        assert_eq!(store.paths(), vec!["b", "b/c.txt"]);
    }

    #[tokio::test]
    async fn test_partial_folder_copy_choices() {
        let store = MemoryStore::new();
        store.add_file("b/ok.txt", "fine").add_file("b/bad.txt", "broken");
        store.inject(Fault::Read, "b/bad.txt");
        let root = store.root();
        let b = entry(&store, "b").await;

        let outcome = rename_entry(ctx(&root), &b, "keep", &AutoConfirm::yes(), None)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            RenameOutcome::PartiallyFailed { copied: 1, errors: 1, .. }
        ));
        assert!(store.contains("b/bad.txt"));
        assert!(store.contains("keep/ok.txt"));

        let confirm = AutoConfirm::yes().with_partial(PartialCopyChoice::DeleteSource);
        let outcome = rename_entry(ctx(&root), &b, "moved", &confirm, None)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            RenameOutcome::Success { copy_errors: 1, .. }
        ));
        assert!(!store.contains("b"));
        assert!(store.contains("moved/ok.txt"));
    }

    #[tokio::test]
    async fn test_failed_destination_creation_rolls_back() {
        let store = MemoryStore::new();
        store.add_file("b/c.txt", "gamma");
        store.inject(Fault::Create, "x");
        let root = store.root();
        let b = entry(&store, "b").await;

        let outcome = rename_entry(ctx(&root), &b, "x", &AutoConfirm::yes(), None)
            .await
            .unwrap();

        assert!(matches!(outcome, RenameOutcome::Failed { .. }));
        assert_eq!(store.paths(), vec!["b", "b/c.txt"]);
    }

    #[tokio::test]
    async fn test_trash_directory_cannot_be_renamed() {
        let store = MemoryStore::new();
        store.add_dir(TRASH);
        let root = store.root();
        let trash_dir = root.get_directory(TRASH, false).await.unwrap();
        let trash = Entry::directory(TRASH, TRASH, trash_dir);

        assert!(matches!(
            rename_entry(ctx(&root), &trash, "other", &AutoConfirm::yes(), None).await,
            Err(AppError::InvalidName { .. })
        ));
    }
}
