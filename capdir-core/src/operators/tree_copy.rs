//! ``src/operators/tree_copy.rs``
//! ============================================================================
//! # Tree Copy: recursive duplication between directory capabilities
//!
//! Storage offers no move primitive, so trash relocation and folder rename
//! are both built on this copy. Every child succeeds or fails on its own:
//! a failure is tallied and the walk moves on to the next sibling. The
//! source is never modified.
//!
//! No total is known up front. Progress is a stream of `CopyProgress`
//! events, one per copied file, carrying the running count.

use compact_str::CompactString;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{Span, debug, info, instrument, trace, warn};

use crate::error::{AppError, CoreResult};
use crate::model::entry::join_path;
use crate::storage::{ChildEntry, DirRef, EntryKind, FileRef};

/// Default ceiling for any single file read or write: 1 GiB.
pub const MAX_FILE_SIZE: u64 = 1024 * 1024 * 1024;

/// Limits applied to every file touched by a copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyLimits {
    pub max_file_size: u64,
}

impl Default for CopyLimits {
    fn default() -> Self {
        Self {
            max_file_size: MAX_FILE_SIZE,
        }
    }
}

impl CopyLimits {
    /// Fails with `TooLarge` when `size` exceeds the ceiling. Exactly at the
    /// ceiling is accepted.
    pub fn check(&self, name: &str, size: u64) -> CoreResult<()> {
        if size > self.max_file_size {
            return Err(AppError::too_large(name, size, self.max_file_size));
        }

        Ok(())
    }
}

/// Emitted after every copied file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyProgress {
    pub item_name: CompactString,
    /// Files copied so far, this one included.
    pub copied: usize,
}

/// One child that could not be copied.
#[derive(Debug, Clone)]
pub struct CopyFailure {
    /// Path relative to the copied directory.
    pub path: CompactString,
    pub reason: AppError,
}

#[derive(Debug, Clone, Default)]
pub struct CopyReport {
    /// Files copied. Directories are not counted.
    pub copied_count: usize,
    pub error_count: usize,
    pub failures: Vec<CopyFailure>,
}

impl CopyReport {
    pub fn is_complete(&self) -> bool {
        self.error_count == 0
    }

    fn fail(&mut self, path: CompactString, reason: AppError) {
        warn!(path = %path, error = %reason, "Copy item failed");

        self.error_count += 1;
        self.failures.push(CopyFailure { path, reason });
    }
}

/// Copies one file into `dest_dir` under `dest_name`.
///
/// The size ceiling is checked from metadata before any read. A write that
/// fails after the destination was created removes the half-written file
/// best-effort. Returns the number of bytes written.
pub async fn copy_file(
    source: &FileRef,
    dest_dir: &DirRef,
    dest_name: &str,
    limits: &CopyLimits,
) -> CoreResult<u64> {
    let size: u64 = source.size().await?;
    limits.check(source.name(), size)?;

    let data: bytes::Bytes = source.read_all().await?;
    let dest: FileRef = dest_dir.get_file(dest_name, true).await?;

    if let Err(e) = dest.write_all(&data).await {
        if let Err(cleanup) = dest_dir.remove(dest_name, false).await {
            debug!(name = dest_name, error = %cleanup, "Cleanup of partial file failed");
        }

        return Err(e);
    }

    trace!(name = dest_name, bytes = data.len(), "File copied");
    Ok(data.len() as u64)
}

async fn open_pair(src_dir: &DirRef, dst_dir: &DirRef, name: &str) -> CoreResult<(DirRef, DirRef)> {
    let src: DirRef = src_dir.get_directory(name, false).await?;
    let dst: DirRef = dst_dir.get_directory(name, true).await?;

    Ok((src, dst))
}

async fn copy_child_file(
    src_dir: &DirRef,
    dst_dir: &DirRef,
    name: &str,
    limits: &CopyLimits,
) -> CoreResult<u64> {
    let file: FileRef = src_dir.get_file(name, false).await?;

    copy_file(&file, dst_dir, name, limits).await
}

/// Recursively copies the contents of `source` into `destination`.
///
/// Never fails as a whole: every problem, including a source that cannot
/// be enumerated, is counted in the returned report.
#[instrument(
    name = "copy_tree",
    level = "info",
    skip(source, destination, progress),
    fields(
        copy_id = tracing::field::Empty,
        source = %source.name(),
        destination = %destination.name(),
    )
)]
pub async fn copy_tree(
    source: &DirRef,
    destination: &DirRef,
    limits: &CopyLimits,
    progress: Option<&UnboundedSender<CopyProgress>>,
) -> CopyReport {
    let copy_id: String = nanoid::nanoid!();
    Span::current().record("copy_id", tracing::field::display(&copy_id));

    let mut report: CopyReport = CopyReport::default();
    let mut stack: Vec<(DirRef, DirRef, CompactString)> =
        vec![(source.clone(), destination.clone(), CompactString::default())];

    while let Some((src_dir, dst_dir, rel)) = stack.pop() {
        let children: Vec<ChildEntry> = match src_dir.enumerate().await {
            Ok(children) => children,

            Err(e) => {
                report.fail(rel, e);
                continue;
            }
        };

        for child in children {
            let child_rel: CompactString = join_path(&rel, &child.name);

            match child.kind {
                EntryKind::Directory => {
                    match open_pair(&src_dir, &dst_dir, &child.name).await {
                        Ok((src, dst)) => stack.push((src, dst, child_rel)),

                        Err(e) => report.fail(child_rel, e),
                    }
                }

                EntryKind::File => {
                    match copy_child_file(&src_dir, &dst_dir, &child.name, limits).await {
                        Ok(_) => {
                            report.copied_count += 1;

                            if let Some(tx) = progress {
                                // Receiver may be gone
                                let _ = tx.send(CopyProgress {
                                    item_name: child.name.clone(),
                                    copied: report.copied_count,
                                });
                            }
                        }

                        Err(e) => report.fail(child_rel, e),
                    }
                }
            }
        }
    }

    info!(
        copy_id = %copy_id,
        copied = report.copied_count,
        errors = report.error_count,
        "Tree copy finished"
    );

    report
}
