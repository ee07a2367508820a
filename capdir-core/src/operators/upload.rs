//! src/operators/upload.rs
//!
//! Adding files from outside the capability: in-memory bytes or a local
//! file path. Oversized files are rejected from their reported size before
//! any byte is read.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use compact_str::CompactString;
use tokio::fs as TokioFs;
use tracing::{debug, info, instrument, warn};

use crate::controller::confirm::Confirmer;
use crate::error::{AppError, CoreResult};
use crate::operators::rename::validate_new_name;
use crate::operators::tree_copy::CopyLimits;
use crate::storage::{DirRef, EntryKind, FileRef, child_kind};
use crate::util::humanize::plural;

/// A file to add to the current directory.
#[derive(Debug, Clone)]
pub enum UploadSource {
    Bytes { name: CompactString, data: Bytes },

    /// Local file; stored under its file name.
    Path(PathBuf),
}

impl UploadSource {
    pub fn bytes<N: Into<CompactString>, D: Into<Bytes>>(name: N, data: D) -> Self {
        Self::Bytes {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Name the file will be stored under.
    pub fn name(&self) -> CoreResult<CompactString> {
        match self {
            Self::Bytes { name, .. } => Ok(name.clone()),

            Self::Path(path) => path
                .file_name()
                .and_then(|s: &std::ffi::OsStr| s.to_str())
                .map(CompactString::from)
                .ok_or_else(|| {
                    AppError::invalid_name(path.display().to_string(), "path has no file name")
                }),
        }
    }

    async fn size(&self) -> CoreResult<u64> {
        match self {
            Self::Bytes { data, .. } => Ok(data.len() as u64),

            Self::Path(path) => {
                let meta: std::fs::Metadata = TokioFs::metadata(path)
                    .await
                    .map_err(|e| AppError::from_io(&path.display().to_string(), e))?;

                if !meta.is_file() {
                    return Err(AppError::type_mismatch(path.display().to_string(), "file"));
                }

                Ok(meta.len())
            }
        }
    }

    async fn read(&self) -> CoreResult<Bytes> {
        match self {
            Self::Bytes { data, .. } => Ok(data.clone()),

            Self::Path(path) => read_local(path).await,
        }
    }
}

async fn read_local(path: &Path) -> CoreResult<Bytes> {
    let data: Vec<u8> = TokioFs::read(path)
        .await
        .map_err(|e| AppError::from_io(&path.display().to_string(), e))?;

    Ok(Bytes::from(data))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddFileOutcome {
    Added(CompactString),

    Overwritten(CompactString),

    /// Name existed and overwriting was declined.
    Skipped(CompactString),
}

/// Tallies of a batch upload.
#[derive(Debug, Clone, Default)]
pub struct UploadSummary {
    pub added: usize,
    pub overwritten: usize,
    pub skipped: usize,
    pub too_large: Vec<CompactString>,
    pub failed: Vec<(CompactString, AppError)>,
}

impl UploadSummary {
    pub fn record(&mut self, name: CompactString, result: CoreResult<AddFileOutcome>) {
        match result {
            Ok(AddFileOutcome::Added(_)) => self.added += 1,

            Ok(AddFileOutcome::Overwritten(_)) => self.overwritten += 1,

            Ok(AddFileOutcome::Skipped(_)) => self.skipped += 1,

            Err(AppError::TooLarge { .. }) => self.too_large.push(name),

            Err(e) => self.failed.push((name, e)),
        }
    }

    /// Files now stored, new or replaced.
    pub fn succeeded(&self) -> usize {
        self.added + self.overwritten
    }

    pub fn is_clean(&self) -> bool {
        self.too_large.is_empty() && self.failed.is_empty()
    }

    /// One-line human summary, e.g. `2 files added, 1 file skipped`.
    pub fn describe(&self) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(4);

        if self.succeeded() > 0 {
            parts.push(format!("{} added", plural(self.succeeded(), "file")));
        }
        if self.skipped > 0 {
            parts.push(format!("{} skipped", plural(self.skipped, "file")));
        }
        if !self.too_large.is_empty() {
            parts.push(format!("{} too large", plural(self.too_large.len(), "file")));
        }
        if !self.failed.is_empty() {
            parts.push(format!("{} failed", plural(self.failed.len(), "file")));
        }

        if parts.is_empty() {
            "nothing to add".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Stores `source` in `dir`.
///
/// Oversized input fails with `TooLarge` before any read. An existing file
/// is replaced only if the confirmer agrees; an existing directory of the
/// same name is a `TypeMismatch`.
#[instrument(level = "info", skip(dir, limits, source, confirmer), fields(dir = %dir.name()))]
pub async fn add_file(
    dir: &DirRef,
    at_root: bool,
    trash_dir_name: &str,
    limits: &CopyLimits,
    source: &UploadSource,
    confirmer: &dyn Confirmer,
) -> CoreResult<AddFileOutcome> {
    let raw_name: CompactString = source.name()?;
    let name: CompactString = validate_new_name(&raw_name, at_root, trash_dir_name)?;

    let size: u64 = source.size().await?;
    limits.check(&name, size)?;

    let existing: Option<EntryKind> = child_kind(dir, &name).await?;

    if existing == Some(EntryKind::Directory) {
        return Err(AppError::type_mismatch(name, "file"));
    }

    if existing == Some(EntryKind::File) && !confirmer.confirm_overwrite(&name).await {
        debug!(name = %name, "Overwrite declined");
        return Ok(AddFileOutcome::Skipped(name));
    }

    let data: Bytes = source.read().await?;
    // The source may have grown between metadata and read
    limits.check(&name, data.len() as u64)?;

    let file: FileRef = dir.get_file(&name, true).await?;

    if let Err(e) = file.write_all(&data).await {
        if existing.is_none() {
            if let Err(cleanup) = dir.remove(&name, false).await {
                warn!(name = %name, error = %cleanup, "Cleanup of partial upload failed");
            }
        }

        return Err(e);
    }

    info!(name = %name, bytes = data.len(), "File added");

    Ok(if existing.is_some() {
        AddFileOutcome::Overwritten(name)
    } else {
        AddFileOutcome::Added(name)
    })
}
