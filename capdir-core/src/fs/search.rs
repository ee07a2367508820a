//! ``src/fs/search.rs``
//! ============================================================================
//! # Recursive name search over a directory capability
//!
//! Walks the whole subtree with an explicit stack. Directories are results
//! in their own right. A branch that cannot be enumerated is logged and
//! skipped; the rest of the walk carries on.

use compact_str::CompactString;
use tracing::{Span, debug, info, instrument, warn};

use crate::error::CoreResult;
use crate::fs::dir_scanner::{compare_entries, resolve_child};
use crate::model::entry::{Entry, EntryHandle};
use crate::storage::{ChildEntry, DirRef, EntryKind};

#[derive(Debug, Default)]
pub struct SearchReport {
    /// Matches, sorted in listing order.
    pub entries: Vec<Entry>,

    /// Directories below the start whose enumeration failed.
    pub skipped_branches: usize,

    /// Directories visited, the start included.
    pub visited_dirs: usize,
}

/// Case-insensitive substring match. An empty keyword matches everything.
pub fn name_matches(name: &str, keyword_lower: &str) -> bool {
    keyword_lower.is_empty() || name.to_lowercase().contains(keyword_lower)
}

/// Searches everything below `dir` for names containing `keyword`.
///
/// Fails only when `dir` itself cannot be enumerated.
#[instrument(
    level = "info",
    skip(dir),
    fields(search_id = tracing::field::Empty, matches = tracing::field::Empty)
)]
pub async fn search_tree(
    dir: &DirRef,
    base_path: &str,
    keyword: &str,
    at_root: bool,
    trash_dir_name: &str,
) -> CoreResult<SearchReport> {
    let search_id: String = nanoid::nanoid!();
    Span::current().record("search_id", tracing::field::display(&search_id));

    let keyword_lower: String = keyword.to_lowercase();
    let mut report: SearchReport = SearchReport::default();

    let start_children: Vec<ChildEntry> = dir.enumerate().await?;
    let mut stack: Vec<(DirRef, CompactString, Vec<ChildEntry>, bool)> =
        vec![(dir.clone(), CompactString::from(base_path), start_children, at_root)];

    while let Some((current, current_path, children, is_root)) = stack.pop() {
        report.visited_dirs += 1;

        for child in &children {
            if is_root && child.kind == EntryKind::Directory && child.name == trash_dir_name {
                continue;
            }

            let entry: Entry = match resolve_child(&current, &current_path, child).await {
                Ok(entry) => entry,

                Err(e) => {
                    info!(name = %child.name, error = %e, "Skipping unreadable entry");
                    continue;
                }
            };

            if let EntryHandle::Directory(handle) = &entry.handle {
                match handle.enumerate().await {
                    Ok(grandchildren) => {
                        stack.push((handle.clone(), entry.path.clone(), grandchildren, false));
                    }

                    Err(e) => {
                        warn!(path = %entry.path, error = %e, "Search skipped a branch");
                        report.skipped_branches += 1;
                    }
                }
            }

            if name_matches(&entry.name, &keyword_lower) {
                report.entries.push(entry);
            }
        }
    }

    report.entries.sort_by(compare_entries);

    Span::current().record("matches", report.entries.len());
    debug!(
        search_id = %search_id,
        visited = report.visited_dirs,
        skipped = report.skipped_branches,
        "Search finished"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::{Fault, MemoryStore};

    fn sample_store() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .add_file("a.txt", "alpha")
            .add_file("b/c.txt", "gamma")
            .add_file("b/d/Cat.md", "meow")
            .add_file(".trash/20250101_120000_c.txt", "old");
        store
    }

    fn paths(report: &SearchReport) -> Vec<&str> {
        report.entries.iter().map(|e| e.path.as_str()).collect()
    }

    #[tokio::test]
    async fn test_search_finds_nested_matches() {
        let store = sample_store();

        let report = search_tree(&store.root(), "", "c", true, ".trash")
            .await
            .unwrap();

        assert_eq!(paths(&report), vec!["b/c.txt", "b/d/Cat.md"]);
        assert_eq!(report.skipped_branches, 0);
    }

    #[tokio::test]
    async fn test_empty_keyword_equals_full_listing() {
        let store = sample_store();

        let report = search_tree(&store.root(), "", "", true, ".trash")
            .await
            .unwrap();

        assert_eq!(
            paths(&report),
            vec!["b", "b/d", "a.txt", "b/c.txt", "b/d/Cat.md"]
        );
    }

    #[tokio::test]
    async fn test_no_match_is_empty_not_error() {
        let store = sample_store();

        let report = search_tree(&store.root(), "", "nothing-here", true, ".trash")
            .await
            .unwrap();

        assert!(report.entries.is_empty());
    }

    #[tokio::test]
    async fn test_failed_branch_is_skipped() {
        let store = sample_store();
        store.add_file("x/c2.txt", "x");
        store.inject(Fault::Enumerate, "b/d");

        let report = search_tree(&store.root(), "", "c", true, ".trash")
            .await
            .unwrap();

        assert_eq!(paths(&report), vec!["b/c.txt", "x/c2.txt"]);
        assert_eq!(report.skipped_branches, 1);
    }

    #[tokio::test]
    async fn test_search_from_subdirectory_keeps_relative_paths() {
        let store = sample_store();
        let b = store.root().get_directory("b", false).await.unwrap();

        let report = search_tree(&b, "b", "CAT", false, ".trash").await.unwrap();

        assert_eq!(paths(&report), vec!["b/d/Cat.md"]);
    }
}
