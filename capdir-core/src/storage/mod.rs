//! src/storage/mod.rs
//! ============================================================================
//! # Storage Capability: permission-scoped directory and file handles
//!
//! The engine never touches paths directly. Everything goes through a
//! directory capability that can enumerate its children, open or create a
//! named child, and remove a named child. There is no rename or move
//! primitive, so every relocation is built from copy and remove.
//!
//! Two backends ship with the crate:
//! - [`local::LocalDirectory`] maps a capability onto a real directory.
//! - [`memory::MemoryStore`] keeps the whole tree in memory and can inject
//!   faults (failed reads, writes, enumerations, removals, permission
//!   states).

use std::fmt::{self, Debug};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use compact_str::CompactString;

use crate::error::CoreResult;

pub mod local;
pub use local::LocalDirectory;

pub mod memory;
pub use memory::MemoryStore;

/// Shared handle to a directory capability.
pub type DirRef = Arc<dyn DirectoryHandle>;

/// Shared handle to a file capability.
pub type FileRef = Arc<dyn FileHandle>;

/// Kind of a child as reported by enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,

    Directory,
}

impl EntryKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",

            Self::Directory => "directory",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read/write permission state of a capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PermissionState {
    Granted,

    Denied,

    #[default]
    Prompt,
}

/// One enumerated child: name plus kind. No metadata is read here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildEntry {
    pub name: CompactString,
    pub kind: EntryKind,
}

impl ChildEntry {
    pub fn new<S: Into<CompactString>>(name: S, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Directory capability.
///
/// `get_directory` and `get_file` fail with `AppError::NotFound` when the
/// child is missing and `create` is false, and with
/// `AppError::TypeMismatch` when the child exists with the other kind.
#[async_trait]
pub trait DirectoryHandle: Send + Sync + Debug {
    /// Name of this directory as seen from its parent.
    fn name(&self) -> &str;

    /// Direct children, in backend order.
    async fn enumerate(&self) -> CoreResult<Vec<ChildEntry>>;

    async fn get_directory(&self, name: &str, create: bool) -> CoreResult<DirRef>;

    async fn get_file(&self, name: &str, create: bool) -> CoreResult<FileRef>;

    /// Removes a child. Non-empty directories need `recursive`.
    async fn remove(&self, name: &str, recursive: bool) -> CoreResult<()>;

    async fn query_permission(&self) -> PermissionState;

    async fn request_permission(&self) -> PermissionState;
}

/// File capability.
#[async_trait]
pub trait FileHandle: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Size in bytes, read from metadata without touching the contents.
    async fn size(&self) -> CoreResult<u64>;

    async fn read_all(&self) -> CoreResult<Bytes>;

    /// Replaces the whole contents.
    async fn write_all(&self, data: &[u8]) -> CoreResult<()>;
}

/// Checks whether a child of any kind named `name` exists.
pub async fn child_exists(dir: &DirRef, name: &str) -> CoreResult<bool> {
    let children: Vec<ChildEntry> = dir.enumerate().await?;

    Ok(children.iter().any(|c: &ChildEntry| c.name == name))
}

/// Looks up the kind of a direct child, if present.
pub async fn child_kind(dir: &DirRef, name: &str) -> CoreResult<Option<EntryKind>> {
    let children: Vec<ChildEntry> = dir.enumerate().await?;

    Ok(children
        .into_iter()
        .find(|c: &ChildEntry| c.name == name)
        .map(|c: ChildEntry| c.kind))
}
