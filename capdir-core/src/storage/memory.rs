//! src/storage/memory.rs
//! ============================================================================
//! # In-memory directory capability
//!
//! The whole tree lives in one flat map keyed by root-relative path (`""` is
//! the root, `"b/c.txt"` a nested file). Handles are cheap `(store, path)`
//! pairs, so a handle to a removed node behaves like a stale browser handle:
//! every call on it fails with `NotFound`.
//!
//! Faults can be injected per rule. A rule matches a node when it equals the
//! node's full path or its last segment, which lets a test fail "every file
//! called `x.bin`" without knowing where a copy will put it.
//!
//! Every operation yields to the runtime once before touching the map so
//! concurrent callers interleave the way they would against real storage.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use compact_str::CompactString;
use parking_lot::RwLock;

use crate::error::{AppError, CoreResult};
use crate::storage::{
    ChildEntry, DirRef, DirectoryHandle, EntryKind, FileHandle, FileRef, PermissionState,
};

#[derive(Debug, Clone)]
enum Node {
    Dir,

    File(Bytes),
}

/// Operation classes that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    Read,

    Write,

    Enumerate,

    Create,

    Remove,
}

#[derive(Debug)]
struct MemoryState {
    nodes: BTreeMap<String, Node>,
    faults: HashSet<(Fault, String)>,
    permission: PermissionState,
    permission_after_request: PermissionState,
}

#[derive(Debug, Default)]
struct Counters {
    reads: AtomicU64,
    writes: AtomicU64,
    removes: AtomicU64,
}

/// Shared in-memory tree. Clones share the same state.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
    counters: Arc<Counters>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

fn last_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn is_direct_child(parent: &str, candidate: &str) -> bool {
    if parent.is_empty() {
        return !candidate.is_empty() && !candidate.contains('/');
    }

    candidate
        .strip_prefix(parent)
        .and_then(|rest: &str| rest.strip_prefix('/'))
        .is_some_and(|rest: &str| !rest.is_empty() && !rest.contains('/'))
}

fn is_descendant(ancestor: &str, candidate: &str) -> bool {
    candidate
        .strip_prefix(ancestor)
        .is_some_and(|rest: &str| rest.starts_with('/'))
}

fn check_name(name: &str) -> CoreResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(AppError::invalid_name(
            name,
            "child names cannot escape the directory",
        ));
    }

    Ok(())
}

impl MemoryStore {
    /// Empty tree with a granted root.
    pub fn new() -> Self {
        let mut nodes: BTreeMap<String, Node> = BTreeMap::new();
        nodes.insert(String::new(), Node::Dir);

        Self {
            state: Arc::new(RwLock::new(MemoryState {
                nodes,
                faults: HashSet::new(),
                permission: PermissionState::Granted,
                permission_after_request: PermissionState::Granted,
            })),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Root capability.
    pub fn root(&self) -> DirRef {
        Arc::new(MemoryDirectory {
            store: self.clone(),
            name: CompactString::const_new("root"),
            path: String::new(),
        })
    }

    /// Creates a directory and any missing parents.
    pub fn add_dir(&self, path: &str) -> &Self {
        let mut state = self.state.write();
        let mut current: String = String::new();

        for segment in path.split('/').filter(|s: &&str| !s.is_empty()) {
            current = join(&current, segment);
            state.nodes.entry(current.clone()).or_insert(Node::Dir);
        }

        self
    }

    /// Creates (or replaces) a file and any missing parent directories.
    pub fn add_file(&self, path: &str, data: impl Into<Bytes>) -> &Self {
        if let Some((parent, _)) = path.rsplit_once('/') {
            self.add_dir(parent);
        }

        self.state
            .write()
            .nodes
            .insert(path.to_string(), Node::File(data.into()));

        self
    }

    pub fn contains(&self, path: &str) -> bool {
        self.state.read().nodes.contains_key(path)
    }

    pub fn is_dir(&self, path: &str) -> bool {
        matches!(self.state.read().nodes.get(path), Some(Node::Dir))
    }

    /// Contents of a file, if `path` is a file.
    pub fn file_data(&self, path: &str) -> Option<Bytes> {
        match self.state.read().nodes.get(path) {
            Some(Node::File(data)) => Some(data.clone()),

            _ => None,
        }
    }

    /// Every path in the tree except the root, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.state
            .read()
            .nodes
            .keys()
            .filter(|p: &&String| !p.is_empty())
            .cloned()
            .collect()
    }

    /// Direct child names of a directory, sorted.
    pub fn child_names(&self, path: &str) -> Vec<String> {
        self.state
            .read()
            .nodes
            .keys()
            .filter(|p: &&String| is_direct_child(path, p))
            .map(|p: &String| last_segment(p).to_string())
            .collect()
    }

    /// Makes every `fault` operation on nodes matching `rule` fail.
    pub fn inject(&self, fault: Fault, rule: &str) -> &Self {
        self.state.write().faults.insert((fault, rule.to_string()));
        self
    }

    pub fn clear_faults(&self) {
        self.state.write().faults.clear();
    }

    /// Sets what `query_permission` reports and what a request resolves to.
    pub fn set_permission(&self, current: PermissionState, after_request: PermissionState) {
        let mut state = self.state.write();
        state.permission = current;
        state.permission_after_request = after_request;
    }

    /// File reads served so far.
    pub fn reads(&self) -> u64 {
        self.counters.reads.load(Ordering::Relaxed)
    }

    /// File writes, directory creations and file creations so far.
    pub fn writes(&self) -> u64 {
        self.counters.writes.load(Ordering::Relaxed)
    }

    pub fn removes(&self) -> u64 {
        self.counters.removes.load(Ordering::Relaxed)
    }

    fn faulted(&self, fault: Fault, path: &str) -> bool {
        let state = self.state.read();

        state.faults.contains(&(fault, path.to_string()))
            || state.faults.contains(&(fault, last_segment(path).to_string()))
    }

    fn fail(fault: Fault, path: &str) -> AppError {
        AppError::Io(std::io::Error::other(format!(
            "injected {fault:?} failure at '{path}'"
        )))
    }

    fn node(&self, path: &str) -> Option<Node> {
        self.state.read().nodes.get(path).cloned()
    }
}

/// Directory handle into a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryDirectory {
    store: MemoryStore,
    name: CompactString,
    path: String,
}

impl MemoryDirectory {
    fn ensure_alive(&self) -> CoreResult<()> {
        match self.store.node(&self.path) {
            Some(Node::Dir) => Ok(()),

            _ => Err(AppError::not_found(self.name.as_str())),
        }
    }

    fn ensure_granted(&self) -> CoreResult<()> {
        match self.store.state.read().permission {
            PermissionState::Granted => Ok(()),

            PermissionState::Denied | PermissionState::Prompt => {
                Err(AppError::PermissionDenied(self.name.clone()))
            }
        }
    }
}

#[async_trait]
impl DirectoryHandle for MemoryDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    async fn enumerate(&self) -> CoreResult<Vec<ChildEntry>> {
        tokio::task::yield_now().await;
        self.ensure_granted()?;
        self.ensure_alive()?;

        if self.store.faulted(Fault::Enumerate, &self.path) {
            return Err(MemoryStore::fail(Fault::Enumerate, &self.path));
        }

        let state = self.store.state.read();
        let children: Vec<ChildEntry> = state
            .nodes
            .iter()
            .filter(|(p, _)| is_direct_child(&self.path, p))
            .map(|(p, node)| {
                let kind: EntryKind = match node {
                    Node::Dir => EntryKind::Directory,

                    Node::File(_) => EntryKind::File,
                };
                ChildEntry::new(last_segment(p), kind)
            })
            .collect();

        Ok(children)
    }

    async fn get_directory(&self, name: &str, create: bool) -> CoreResult<DirRef> {
        tokio::task::yield_now().await;
        self.ensure_granted()?;
        self.ensure_alive()?;
        check_name(name)?;

        let path: String = join(&self.path, name);

        match self.store.node(&path) {
            Some(Node::Dir) => {}

            Some(Node::File(_)) => return Err(AppError::type_mismatch(name, "directory")),

            None if create => {
                if self.store.faulted(Fault::Create, &path) {
                    return Err(MemoryStore::fail(Fault::Create, &path));
                }

                self.store.state.write().nodes.insert(path.clone(), Node::Dir);
                self.store.counters.writes.fetch_add(1, Ordering::Relaxed);
            }

            None => return Err(AppError::not_found(name)),
        }

        Ok(Arc::new(Self {
            store: self.store.clone(),
            name: CompactString::from(name),
            path,
        }))
    }

    async fn get_file(&self, name: &str, create: bool) -> CoreResult<FileRef> {
        tokio::task::yield_now().await;
        self.ensure_granted()?;
        self.ensure_alive()?;
        check_name(name)?;

        let path: String = join(&self.path, name);

        match self.store.node(&path) {
            Some(Node::File(_)) => {}

            Some(Node::Dir) => return Err(AppError::type_mismatch(name, "file")),

            None if create => {
                if self.store.faulted(Fault::Create, &path) {
                    return Err(MemoryStore::fail(Fault::Create, &path));
                }

                self.store
                    .state
                    .write()
                    .nodes
                    .insert(path.clone(), Node::File(Bytes::new()));
                self.store.counters.writes.fetch_add(1, Ordering::Relaxed);
            }

            None => return Err(AppError::not_found(name)),
        }

        Ok(Arc::new(MemoryFile {
            store: self.store.clone(),
            name: CompactString::from(name),
            path,
        }))
    }

    async fn remove(&self, name: &str, recursive: bool) -> CoreResult<()> {
        tokio::task::yield_now().await;
        self.ensure_granted()?;
        self.ensure_alive()?;
        check_name(name)?;

        let path: String = join(&self.path, name);

        if self.store.faulted(Fault::Remove, &path) {
            return Err(MemoryStore::fail(Fault::Remove, &path));
        }

        let mut state = self.store.state.write();

        let is_dir: bool = match state.nodes.get(&path) {
            None => return Err(AppError::not_found(name)),

            Some(node) => matches!(node, Node::Dir),
        };

        if is_dir {
            let has_children: bool = state
                .nodes
                .keys()
                .any(|p: &String| is_descendant(&path, p));

            if has_children && !recursive {
                return Err(AppError::Io(std::io::Error::new(
                    std::io::ErrorKind::DirectoryNotEmpty,
                    format!("directory '{name}' is not empty"),
                )));
            }

            state.nodes.retain(|p: &String, _| !is_descendant(&path, p));
        }

        state.nodes.remove(&path);
        self.store.counters.removes.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }

    async fn query_permission(&self) -> PermissionState {
        tokio::task::yield_now().await;
        self.store.state.read().permission
    }

    async fn request_permission(&self) -> PermissionState {
        tokio::task::yield_now().await;

        let mut state = self.store.state.write();
        state.permission = state.permission_after_request;
        state.permission
    }
}

/// File handle into a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryFile {
    store: MemoryStore,
    name: CompactString,
    path: String,
}

impl MemoryFile {
    fn data(&self) -> CoreResult<Bytes> {
        match self.store.node(&self.path) {
            Some(Node::File(data)) => Ok(data),

            _ => Err(AppError::not_found(self.name.as_str())),
        }
    }
}

#[async_trait]
impl FileHandle for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    async fn size(&self) -> CoreResult<u64> {
        tokio::task::yield_now().await;

        Ok(self.data()?.len() as u64)
    }

    async fn read_all(&self) -> CoreResult<Bytes> {
        tokio::task::yield_now().await;

        if self.store.faulted(Fault::Read, &self.path) {
            return Err(MemoryStore::fail(Fault::Read, &self.path));
        }

        let data: Bytes = self.data()?;
        self.store.counters.reads.fetch_add(1, Ordering::Relaxed);

        Ok(data)
    }

    async fn write_all(&self, data: &[u8]) -> CoreResult<()> {
        tokio::task::yield_now().await;

        if self.store.faulted(Fault::Write, &self.path) {
            return Err(MemoryStore::fail(Fault::Write, &self.path));
        }

        self.data()?;
        self.store
            .state
            .write()
            .nodes
            .insert(self.path.clone(), Node::File(Bytes::copy_from_slice(data)));
        self.store.counters.writes.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }
}
