//! ``src/model/tree.rs``
//!
//! Directory-only tree under the root plus the set of expanded paths.

use std::collections::HashSet;

use compact_str::CompactString;
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{instrument, warn};

use crate::error::CoreResult;
use crate::fs::dir_scanner::compare_names;
use crate::model::entry::join_path;
use crate::storage::{ChildEntry, DirRef, EntryKind};

#[derive(Debug, Clone)]
pub struct TreeNode {
    pub name: CompactString,
    pub path: CompactString,
    pub handle: DirRef,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Finds the node at `path` (`""` is this node).
    pub fn find(&self, path: &str) -> Option<&Self> {
        if self.path == path {
            return Some(self);
        }

        self.children
            .iter()
            .find(|child: &&Self| {
                child.path == path
                    || path
                        .strip_prefix(child.path.as_str())
                        .is_some_and(|rest: &str| rest.starts_with('/'))
            })
            .and_then(|child: &Self| child.find(path))
    }

    /// Total number of nodes, this one included.
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(Self::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Depth-first walk yielding `(depth, node)`, children in sorted order.
    pub fn walk(&self) -> Vec<(usize, &Self)> {
        let mut out: Vec<(usize, &Self)> = Vec::with_capacity(self.len());
        let mut stack: Vec<(usize, &Self)> = vec![(0, self)];

        while let Some((depth, node)) = stack.pop() {
            out.push((depth, node));

            for child in node.children.iter().rev() {
                stack.push((depth + 1, child));
            }
        }

        out
    }
}

/// Builds the directory tree below `root`. The trash directory is left out
/// at the root. A subdirectory that cannot be enumerated shows up without
/// children.
#[instrument(level = "debug", skip(root))]
pub async fn build_tree(root: &DirRef, trash_dir_name: &str) -> CoreResult<TreeNode> {
    let children: Vec<ChildEntry> = root.enumerate().await?;

    let mut node: TreeNode = TreeNode {
        name: CompactString::from(root.name()),
        path: CompactString::default(),
        handle: root.clone(),
        children: Vec::new(),
    };

    for child in children {
        if child.kind != EntryKind::Directory || child.name == trash_dir_name {
            continue;
        }

        match root.get_directory(&child.name, false).await {
            Ok(handle) => {
                let path: CompactString = join_path("", &child.name);
                node.children.push(build_subtree(handle, path).await);
            }

            Err(e) => warn!(name = %child.name, error = %e, "Skipping tree branch"),
        }
    }

    node.children
        .sort_by(|a: &TreeNode, b: &TreeNode| compare_names(&a.name, &b.name));

    Ok(node)
}

fn build_subtree(handle: DirRef, path: CompactString) -> BoxFuture<'static, TreeNode> {
    async move {
        let mut node: TreeNode = TreeNode {
            name: CompactString::from(handle.name()),
            path,
            handle,
            children: Vec::new(),
        };

        let children: Vec<ChildEntry> = match node.handle.enumerate().await {
            Ok(children) => children,

            Err(e) => {
                warn!(path = %node.path, error = %e, "Cannot enumerate tree branch");
                return node;
            }
        };

        for child in children {
            if child.kind != EntryKind::Directory {
                continue;
            }

            match node.handle.get_directory(&child.name, false).await {
                Ok(handle) => {
                    let path: CompactString = join_path(&node.path, &child.name);
                    let subtree: TreeNode = build_subtree(handle, path).await;
                    node.children.push(subtree);
                }

                Err(e) => warn!(name = %child.name, error = %e, "Skipping tree branch"),
            }
        }

        node.children
            .sort_by(|a: &TreeNode, b: &TreeNode| compare_names(&a.name, &b.name));

        node
    }
    .boxed()
}

/// Paths currently rendered expanded.
#[derive(Debug, Clone)]
pub struct ExpandedSet {
    paths: HashSet<CompactString>,
}

impl Default for ExpandedSet {
    fn default() -> Self {
        let mut paths: HashSet<CompactString> = HashSet::new();
        paths.insert(CompactString::default());

        Self { paths }
    }
}

impl ExpandedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_expanded(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    /// Flips the state of `path`. Returns the new state.
    pub fn toggle(&mut self, path: &str) -> bool {
        if self.paths.remove(path) {
            false
        } else {
            self.paths.insert(CompactString::from(path));
            true
        }
    }

    pub fn expand(&mut self, path: &str) {
        self.paths.insert(CompactString::from(path));
    }

    /// Called after every tree build.
    pub fn ensure_root(&mut self) {
        self.paths.insert(CompactString::default());
    }

    /// Drops `path` and everything under it.
    pub fn prune_subtree(&mut self, path: &str) {
        if path.is_empty() {
            return;
        }

        self.paths.retain(|p: &CompactString| {
            p.as_str() != path
                && !p
                    .strip_prefix(path)
                    .is_some_and(|rest: &str| rest.starts_with('/'))
        });
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
