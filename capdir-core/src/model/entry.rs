//! src/model/entry.rs
//!
//! Immutable snapshot of one listed child. Rebuilt on every reload.

use std::fmt;

use compact_str::CompactString;

use crate::storage::{DirRef, EntryKind, FileRef};

/// Handle of a listed child, tagged by kind.
#[derive(Debug, Clone)]
pub enum EntryHandle {
    File(FileRef),

    Directory(DirRef),
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub name: CompactString,

    /// Bytes for files, `0` for directories.
    pub size: u64,

    /// Root-relative path, `/`-separated, unique within a snapshot.
    pub path: CompactString,

    pub handle: EntryHandle,
}

impl Entry {
    pub fn file<N, P>(name: N, path: P, size: u64, handle: FileRef) -> Self
    where
        N: Into<CompactString>,
        P: Into<CompactString>,
    {
        Self {
            name: name.into(),
            size,
            path: path.into(),
            handle: EntryHandle::File(handle),
        }
    }

    pub fn directory<N, P>(name: N, path: P, handle: DirRef) -> Self
    where
        N: Into<CompactString>,
        P: Into<CompactString>,
    {
        Self {
            name: name.into(),
            size: 0,
            path: path.into(),
            handle: EntryHandle::Directory(handle),
        }
    }

    #[must_use]
    pub fn kind(&self) -> EntryKind {
        match self.handle {
            EntryHandle::File(_) => EntryKind::File,

            EntryHandle::Directory(_) => EntryKind::Directory,
        }
    }

    #[must_use]
    pub fn is_dir(&self) -> bool {
        matches!(self.handle, EntryHandle::Directory(_))
    }

    /// Path of the directory holding this entry (`""` for root children).
    pub fn parent_path(&self) -> &str {
        self.path
            .rsplit_once('/')
            .map_or("", |(parent, _)| parent)
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.handle {
            EntryHandle::Directory(_) => write!(f, "{}/", self.path),

            EntryHandle::File(_) => write!(f, "{}", self.path),
        }
    }
}

/// Joins a base path and a child name the way entry paths are built.
pub fn join_path(base: &str, name: &str) -> CompactString {
    if base.is_empty() {
        CompactString::from(name)
    } else {
        let mut path: CompactString = CompactString::with_capacity(base.len() + name.len() + 1);
        path.push_str(base);
        path.push('/');
        path.push_str(name);
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("", "a.txt"), "a.txt");
        assert_eq!(join_path("b", "c.txt"), "b/c.txt");
        assert_eq!(join_path("b/d", "e"), "b/d/e");
    }
}
