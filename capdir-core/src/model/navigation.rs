//! ``src/model/navigation.rs``
//! ============================================================================
//! # `NavigationState`: directory stack rooted at the granted capability
//!
//! Index 0 is the root; every following handle is a child of the one before
//! it. The current relative path is always derived from the stack, never
//! stored separately, so the two cannot drift apart.

use compact_str::CompactString;
use smallvec::SmallVec;
use tracing::{debug, instrument};

use crate::error::{AppError, CoreResult};
use crate::storage::DirRef;

type Stack = SmallVec<[DirRef; 8]>;

#[derive(Debug, Clone)]
pub struct NavigationState {
    stack: Stack,
}

impl NavigationState {
    pub fn new(root: DirRef) -> Self {
        let mut stack: Stack = SmallVec::new();
        stack.push(root);

        Self { stack }
    }

    pub fn root(&self) -> &DirRef {
        &self.stack[0]
    }

    /// Directory currently shown.
    pub fn current(&self) -> &DirRef {
        &self.stack[self.stack.len() - 1]
    }

    /// Number of stack elements, root included.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn at_root(&self) -> bool {
        self.stack.len() == 1
    }

    /// `/`-joined names of every element after the root. Empty at the root.
    pub fn current_path(&self) -> CompactString {
        let mut path: CompactString = CompactString::default();

        for (i, dir) in self.stack.iter().skip(1).enumerate() {
            if i > 0 {
                path.push('/');
            }
            path.push_str(dir.name());
        }

        path
    }

    /// Names of every stack element, root first.
    pub fn breadcrumbs(&self) -> Vec<CompactString> {
        self.stack
            .iter()
            .map(|dir: &DirRef| CompactString::from(dir.name()))
            .collect()
    }

    /// Pushes the child directory `name` of the current directory.
    #[instrument(level = "debug", skip(self), fields(from = %self.current_path()))]
    pub async fn enter(&mut self, name: &str) -> CoreResult<()> {
        let child: DirRef = self.current().get_directory(name, false).await?;
        self.stack.push(child);

        debug!(path = %self.current_path(), "Entered directory");
        Ok(())
    }

    /// Pops one level. Returns `false` when already at the root.
    pub fn go_up(&mut self) -> bool {
        if self.at_root() {
            return false;
        }

        self.stack.pop();
        true
    }

    /// Truncates the stack to `index + 1` elements.
    pub fn jump_to(&mut self, index: usize) -> CoreResult<()> {
        let len: usize = self.stack.len();

        if index >= len {
            return Err(AppError::OutOfRange { index, len });
        }

        self.stack.truncate(index + 1);
        Ok(())
    }

    /// Rebuilds the stack from the root along `path`.
    ///
    /// The walk happens on a candidate stack; `self` changes only once every
    /// segment resolved.
    #[instrument(level = "debug", skip(self))]
    pub async fn resolve_path(&mut self, path: &str) -> CoreResult<()> {
        let mut candidate: Stack = SmallVec::new();
        candidate.push(self.root().clone());

        for segment in path.split('/').filter(|s: &&str| !s.is_empty()) {
            let parent: &DirRef = &candidate[candidate.len() - 1];
            let child: DirRef = parent.get_directory(segment, false).await?;
            candidate.push(child);
        }

        self.stack = candidate;

        debug!(path = %self.current_path(), "Resolved path");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn sample_store() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .add_file("a.txt", "alpha")
            .add_file("b/c.txt", "gamma")
            .add_dir("b/d/e");
        store
    }

    #[tokio::test]
    async fn test_enter_and_go_up() {
        let store = sample_store();
        let mut nav = NavigationState::new(store.root());

        assert_eq!(nav.current_path(), "");
        assert!(!nav.go_up());

        nav.enter("b").await.unwrap();
        nav.enter("d").await.unwrap();
        assert_eq!(nav.current_path(), "b/d");
        assert_eq!(nav.depth(), 3);

        assert!(nav.go_up());
        assert_eq!(nav.current_path(), "b");
    }

    #[tokio::test]
    async fn test_enter_rejects_missing_and_files() {
        let store = sample_store();
        let mut nav = NavigationState::new(store.root());

        assert!(matches!(nav.enter("zzz").await, Err(AppError::NotFound(_))));
        assert!(matches!(
            nav.enter("a.txt").await,
            Err(AppError::TypeMismatch { .. })
        ));
        assert!(nav.at_root());
    }

    #[tokio::test]
    async fn test_jump_to_breadcrumb() {
        let store = sample_store();
        let mut nav = NavigationState::new(store.root());
        nav.resolve_path("b/d/e").await.unwrap();

        assert_eq!(nav.breadcrumbs(), vec!["root", "b", "d", "e"]);

        assert!(matches!(
            nav.jump_to(4),
            Err(AppError::OutOfRange { index: 4, len: 4 })
        ));

        nav.jump_to(1).unwrap();
        assert_eq!(nav.current_path(), "b");

        nav.jump_to(0).unwrap();
        assert!(nav.at_root());
    }

    #[tokio::test]
    async fn test_resolve_path_failure_leaves_stack_untouched() {
        let store = sample_store();
        let mut nav = NavigationState::new(store.root());
        nav.enter("b").await.unwrap();

        assert!(nav.resolve_path("b/d/missing").await.is_err());
        assert_eq!(nav.current_path(), "b");

        nav.resolve_path("").await.unwrap();
        assert!(nav.at_root());
    }
}
