//! ``src/fs/dir_scanner.rs``
//!
//! # `Directory Scanner`: Asynchronous Capability Listing
//!
//! Lists the direct children of one directory capability as sorted
//! [`Entry`] snapshots. Ordering is shared with search results and the tree.

use std::cmp::Ordering;
use std::time::{Duration, Instant};

use compact_str::CompactString;
use tracing::{debug, info, instrument};

use crate::error::CoreResult;
use crate::model::entry::{Entry, join_path};
use crate::storage::{ChildEntry, DirRef, EntryKind, FileRef};

/// Case-insensitive name order with deterministic tie breaks.
///
/// Names are compared lowercase-folded first. Names equal under folding put
/// the lowercase spelling first, and anything still equal falls back to the
/// raw string.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    let folded: Ordering = a
        .chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase));

    folded
        .then_with(|| lowercase_first(a, b))
        .then_with(|| a.cmp(b))
}

fn lowercase_first(a: &str, b: &str) -> Ordering {
    for (ca, cb) in a.chars().zip(b.chars()) {
        if ca == cb {
            continue;
        }

        if ca.is_lowercase() && cb.is_uppercase() {
            return Ordering::Less;
        }

        if ca.is_uppercase() && cb.is_lowercase() {
            return Ordering::Greater;
        }
    }

    Ordering::Equal
}

/// Entry order: directories before files, then [`compare_names`], then path.
pub fn compare_entries(a: &Entry, b: &Entry) -> Ordering {
    match (a.is_dir(), b.is_dir()) {
        (true, false) => Ordering::Less,

        (false, true) => Ordering::Greater,

        _ => compare_names(&a.name, &b.name).then_with(|| a.path.cmp(&b.path)),
    }
}

/// Resolves one enumerated child into an entry snapshot.
pub(crate) async fn resolve_child(
    dir: &DirRef,
    base_path: &str,
    child: &ChildEntry,
) -> CoreResult<Entry> {
    let path: CompactString = join_path(base_path, &child.name);

    match child.kind {
        EntryKind::Directory => {
            let handle: DirRef = dir.get_directory(&child.name, false).await?;

            Ok(Entry::directory(child.name.clone(), path, handle))
        }

        EntryKind::File => {
            let handle: FileRef = dir.get_file(&child.name, false).await?;
            let size: u64 = handle.size().await?;

            Ok(Entry::file(child.name.clone(), path, size, handle))
        }
    }
}

/// Lists the direct children of `dir`, sorted.
///
/// # Arguments
/// * `dir` - Directory to list.
/// * `base_path` - Root-relative path of `dir`, used to build entry paths.
/// * `at_root` - Whether `dir` is the root; the trash directory is hidden there.
/// * `trash_dir_name` - Name of the reserved trash directory.
#[instrument(level = "debug", skip(dir), fields(dir = %dir.name()))]
pub async fn list_directory(
    dir: &DirRef,
    base_path: &str,
    at_root: bool,
    trash_dir_name: &str,
) -> CoreResult<Vec<Entry>> {
    let start_time: Instant = Instant::now();

    let children: Vec<ChildEntry> = dir.enumerate().await?;
    let mut entries: Vec<Entry> = Vec::with_capacity(children.len());

    for child in &children {
        if at_root && child.kind == EntryKind::Directory && child.name == trash_dir_name {
            continue;
        }

        match resolve_child(dir, base_path, child).await {
            Ok(entry) => entries.push(entry),

            Err(e) => {
                // Log the error but continue processing other entries
                info!(name = %child.name, error = %e, "Skipping unreadable entry");
            }
        }
    }

    entries.sort_by(compare_entries);

    let duration: Duration = start_time.elapsed();
    debug!(
        marker = "DIRECTORY_LIST",
        entries = entries.len(),
        duration_us = duration.as_micros() as u64,
        "Directory listed"
    );

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::{Fault, MemoryStore};

    fn names(entries: &[Entry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_name_order_is_case_insensitive_and_total() {
        let mut names = vec!["b", "B", "a", "A", "Ab", "ab", "c"];
        names.sort_by(|a, b| compare_names(a, b));

        assert_eq!(names, vec!["a", "A", "ab", "Ab", "b", "B", "c"]);

        for a in &names {
            for b in &names {
                assert_eq!(compare_names(a, b) == Ordering::Equal, a == b);
            }
        }
    }

    #[tokio::test]
    async fn test_directories_first_and_trash_hidden_at_root() {
        let store = MemoryStore::new();
        store
            .add_file("Zed.txt", "z")
            .add_file("apple.txt", "apple")
            .add_dir("zoo")
            .add_dir("Box")
            .add_dir(".trash");

        let entries = list_directory(&store.root(), "", true, ".trash")
            .await
            .unwrap();

        assert_eq!(names(&entries), vec!["Box", "zoo", "apple.txt", "Zed.txt"]);
        assert_eq!(entries[2].size, 5);
        assert_eq!(entries[0].size, 0);
    }

    #[tokio::test]
    async fn test_trash_name_is_listed_below_root() {
        let store = MemoryStore::new();
        store.add_dir("b/.trash");

        let b = store.root().get_directory("b", false).await.unwrap();
        let entries = list_directory(&b, "b", false, ".trash").await.unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "b/.trash");
    }

    #[tokio::test]
    async fn test_enumeration_failure_is_an_error() {
        let store = MemoryStore::new();
        store.add_dir("b");
        store.inject(Fault::Enumerate, "b");

        let b = store.root().get_directory("b", false).await.unwrap();
        assert!(list_directory(&b, "b", false, ".trash").await.is_err());
    }
}
