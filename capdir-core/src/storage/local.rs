//! src/storage/local.rs
//!
//! Directory capability over a real directory, through `tokio::fs`.
//! A handle only ever resolves names that stay inside its own directory.
//! Symbolic links are not part of the capability: enumeration leaves them
//! out and every lookup, creation or removal through one is refused.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use compact_str::CompactString;
use tokio::fs::{self as TokioFs, ReadDir};
use tracing::{debug, trace};

use crate::error::{AppError, CoreResult};
use crate::storage::{
    ChildEntry, DirRef, DirectoryHandle, EntryKind, FileHandle, FileRef, PermissionState,
};

/// Capability over one directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalDirectory {
    name: CompactString,
    path: PathBuf,
}

impl LocalDirectory {
    /// Opens a root capability. The path must be an existing directory.
    pub async fn open<P: Into<PathBuf>>(path: P) -> CoreResult<DirRef> {
        let path: PathBuf = path.into();
        let display: String = path.display().to_string();

        let meta: std::fs::Metadata = TokioFs::metadata(&path)
            .await
            .map_err(|e| AppError::from_io(&display, e))?;

        if !meta.is_dir() {
            return Err(AppError::type_mismatch(display, "directory"));
        }

        let name: CompactString = path
            .file_name()
            .and_then(|s: &std::ffi::OsStr| s.to_str())
            .map_or_else(|| CompactString::from(display.as_str()), CompactString::from);

        debug!(root = %path.display(), "Opened local directory capability");

        Ok(Arc::new(Self { name, path }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn child_path(&self, name: &str) -> CoreResult<PathBuf> {
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains('/')
            || name.contains('\\')
        {
            return Err(AppError::invalid_name(
                name,
                "child names cannot escape the directory",
            ));
        }

        Ok(self.path.join(name))
    }

    /// Kind of the child `name`, without following links.
    async fn probe(&self, name: &str) -> CoreResult<Option<EntryKind>> {
        let path: PathBuf = self.child_path(name)?;

        match TokioFs::symlink_metadata(&path).await {
            Ok(meta) if meta.file_type().is_symlink() => {
                debug!(path = %path.display(), "Refusing symbolic link");
                Err(AppError::PermissionDenied(CompactString::from(name)))
            }

            Ok(meta) if meta.is_dir() => Ok(Some(EntryKind::Directory)),

            Ok(_) => Ok(Some(EntryKind::File)),

            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),

            Err(e) => Err(AppError::from_io(name, e)),
        }
    }
}

#[async_trait]
impl DirectoryHandle for LocalDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    async fn enumerate(&self) -> CoreResult<Vec<ChildEntry>> {
        let mut read_dir: ReadDir = TokioFs::read_dir(&self.path)
            .await
            .map_err(|e| AppError::from_io(&self.name, e))?;

        let mut children: Vec<ChildEntry> = Vec::new();

        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| AppError::from_io(&self.name, e))?
        {
            let Some(name) = entry.file_name().to_str().map(CompactString::from) else {
                trace!(path = %entry.path().display(), "Skipping non UTF-8 name");
                continue;
            };

            let file_type: std::fs::FileType = entry
                .file_type()
                .await
                .map_err(|e| AppError::from_io(&name, e))?;

            if file_type.is_symlink() {
                trace!(path = %entry.path().display(), "Skipping symbolic link");
                continue;
            }

            let kind: EntryKind = if file_type.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            };

            children.push(ChildEntry { name, kind });
        }

        Ok(children)
    }

    async fn get_directory(&self, name: &str, create: bool) -> CoreResult<DirRef> {
        let path: PathBuf = self.child_path(name)?;

        match self.probe(name).await? {
            Some(EntryKind::Directory) => {}

            Some(EntryKind::File) => return Err(AppError::type_mismatch(name, "directory")),

            None if create => {
                TokioFs::create_dir(&path)
                    .await
                    .map_err(|e| AppError::from_io(name, e))?;
            }

            None => return Err(AppError::not_found(name)),
        }

        Ok(Arc::new(Self {
            name: CompactString::from(name),
            path,
        }))
    }

    async fn get_file(&self, name: &str, create: bool) -> CoreResult<FileRef> {
        let path: PathBuf = self.child_path(name)?;

        match self.probe(name).await? {
            Some(EntryKind::File) => {}

            Some(EntryKind::Directory) => return Err(AppError::type_mismatch(name, "file")),

            None if create => {
                TokioFs::File::create(&path)
                    .await
                    .map_err(|e| AppError::from_io(name, e))?;
            }

            None => return Err(AppError::not_found(name)),
        }

        Ok(Arc::new(LocalFile {
            name: CompactString::from(name),
            path,
        }))
    }

    async fn remove(&self, name: &str, recursive: bool) -> CoreResult<()> {
        let path: PathBuf = self.child_path(name)?;

        let result: std::io::Result<()> = match self.probe(name).await? {
            Some(EntryKind::Directory) if recursive => TokioFs::remove_dir_all(&path).await,

            Some(EntryKind::Directory) => TokioFs::remove_dir(&path).await,

            Some(EntryKind::File) => TokioFs::remove_file(&path).await,

            None => return Err(AppError::not_found(name)),
        };

        result.map_err(|e| AppError::from_io(name, e))
    }

    async fn query_permission(&self) -> PermissionState {
        match TokioFs::metadata(&self.path).await {
            Ok(meta) if meta.is_dir() && !meta.permissions().readonly() => {
                PermissionState::Granted
            }

            Ok(_) | Err(_) => PermissionState::Denied,
        }
    }

    // The OS has no interactive grant; asking again just re-checks.
    async fn request_permission(&self) -> PermissionState {
        self.query_permission().await
    }
}

/// Capability over one file on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalFile {
    name: CompactString,
    path: PathBuf,
}

#[async_trait]
impl FileHandle for LocalFile {
    fn name(&self) -> &str {
        &self.name
    }

    async fn size(&self) -> CoreResult<u64> {
        let meta: std::fs::Metadata = TokioFs::symlink_metadata(&self.path)
            .await
            .map_err(|e| AppError::from_io(&self.name, e))?;

        Ok(meta.len())
    }

    async fn read_all(&self) -> CoreResult<Bytes> {
        let data: Vec<u8> = TokioFs::read(&self.path)
            .await
            .map_err(|e| AppError::from_io(&self.name, e))?;

        Ok(Bytes::from(data))
    }

    async fn write_all(&self, data: &[u8]) -> CoreResult<()> {
        TokioFs::write(&self.path, data)
            .await
            .map_err(|e| AppError::from_io(&self.name, e))
    }
}
