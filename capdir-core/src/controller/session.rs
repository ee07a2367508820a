//! ``src/controller/session.rs``
//! ============================================================================
//! # `FileSession`: the engine-to-caller surface
//!
//! One session per granted root. It owns the directory stack, the current
//! listing, search results, the folder tree with its expanded set, the
//! operation locks and the trash manager.
//!
//! Methods take `&self`. Mutable state sits behind a `parking_lot::Mutex`
//! that is only ever locked between awaits, never across one. Every call
//! that awaits storage and then writes session state holds an
//! [`OperationGuard`] for its whole run: mutations, navigation and
//! listing/search/tree reloads alike.

use std::sync::Arc;

use compact_str::CompactString;
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{Span, debug, info, instrument, warn};

use crate::config::EngineConfig;
use crate::controller::confirm::Confirmer;
use crate::controller::guard::{OperationGuard, OperationKind, OperationLocks};
use crate::error::{AppError, CoreResult};
use crate::fs::dir_scanner::list_directory;
use crate::fs::search::{SearchReport, search_tree};
use crate::model::entry::{Entry, join_path};
use crate::model::navigation::NavigationState;
use crate::model::pagination::{PageWindow, paginate};
use crate::model::tree::{ExpandedSet, TreeNode, build_tree};
use crate::operators::rename::{RenameContext, RenameOutcome, rename_entry, validate_new_name};
use crate::operators::trash::{SoftDeleteOutcome, TrashManager, TrashRecord};
use crate::operators::tree_copy::{CopyLimits, CopyProgress};
use crate::operators::upload::{self, AddFileOutcome, UploadSource, UploadSummary};
use crate::storage::{DirRef, PermissionState, child_exists};
use crate::util::clock::{Clock, SystemClock};

/// Active search: the keyword and its results.
#[derive(Debug, Clone)]
struct SearchState {
    keyword: CompactString,
    results: Vec<Entry>,
    skipped_branches: usize,
}

#[derive(Debug)]
struct SessionState {
    nav: NavigationState,
    entries: Vec<Entry>,
    search: Option<SearchState>,
    tree: Option<TreeNode>,
    expanded: ExpandedSet,
    page: usize,
    items_per_page: usize,
}

impl SessionState {
    fn displayed(&self) -> &[Entry] {
        match &self.search {
            Some(search) => &search.results,

            None => &self.entries,
        }
    }

    fn window(&self) -> PageWindow {
        paginate(self.displayed(), self.page, self.items_per_page)
    }

    fn clamp_page(&mut self) {
        self.page = self.window().page;
    }

    fn find(&self, path: &str) -> Option<Entry> {
        self.displayed()
            .iter()
            .chain(self.entries.iter())
            .find(|e: &&Entry| e.path == path)
            .cloned()
    }
}

/// Result of deleting every entry on the current page.
#[derive(Debug, Clone, Default)]
pub struct ClearPageSummary {
    /// Trashed and removed: `(name, trash name)`.
    pub deleted: Vec<(CompactString, CompactString)>,

    /// Trashed, but the original could not be removed.
    pub originals_kept: Vec<CompactString>,

    pub failed: Vec<(CompactString, AppError)>,
}

impl ClearPageSummary {
    pub fn is_clean(&self) -> bool {
        self.originals_kept.is_empty() && self.failed.is_empty()
    }
}

pub struct FileSession {
    root: DirRef,
    engine: EngineConfig,
    limits: CopyLimits,
    trash: TrashManager,
    locks: Arc<OperationLocks>,
    confirmer: Arc<dyn Confirmer>,
    progress: Option<UnboundedSender<CopyProgress>>,
    state: Mutex<SessionState>,
}

impl std::fmt::Debug for FileSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSession")
            .field("root", &self.root.name())
            .field("busy", &self.locks.is_busy())
            .finish_non_exhaustive()
    }
}

impl FileSession {
    /// Opens a session on a granted root using the host clock.
    pub async fn open(
        root: DirRef,
        engine: EngineConfig,
        confirmer: Arc<dyn Confirmer>,
    ) -> CoreResult<Self> {
        Self::open_with_clock(root, engine, confirmer, Arc::new(SystemClock)).await
    }

    /// Opens a session: checks (and if needed requests) permission on the
    /// root, then loads the root listing and the folder tree.
    #[instrument(
        name = "session_open",
        level = "info",
        skip(root, engine, confirmer, clock),
        fields(session_id = tracing::field::Empty, root = %root.name())
    )]
    pub async fn open_with_clock(
        root: DirRef,
        engine: EngineConfig,
        confirmer: Arc<dyn Confirmer>,
        clock: Arc<dyn Clock>,
    ) -> CoreResult<Self> {
        let session_id: String = nanoid::nanoid!();
        Span::current().record("session_id", tracing::field::display(&session_id));

        let mut permission: PermissionState = root.query_permission().await;

        if permission != PermissionState::Granted {
            debug!(?permission, "Requesting permission on root");
            permission = root.request_permission().await;
        }

        if permission != PermissionState::Granted {
            warn!(?permission, "Permission on root not granted");
            return Err(AppError::PermissionDenied(CompactString::from(root.name())));
        }

        let limits: CopyLimits = engine.limits();
        let trash: TrashManager = TrashManager::new(
            root.clone(),
            engine.trash_dir_name.as_str(),
            limits,
            engine.trash_name_attempts,
            clock,
        );

        let state: SessionState = SessionState {
            nav: NavigationState::new(root.clone()),
            entries: Vec::new(),
            search: None,
            tree: None,
            expanded: ExpandedSet::new(),
            page: 1,
            items_per_page: engine.default_items_per_page.max(1),
        };

        let session: Self = Self {
            root,
            engine,
            limits,
            trash,
            locks: OperationLocks::new(),
            confirmer,
            progress: None,
            state: Mutex::new(state),
        };

        session.reload_listing().await?;
        session.rebuild_tree().await?;

        info!("Session opened");
        Ok(session)
    }

    /// Sends `CopyProgress` events of folder copies to `tx`.
    #[must_use]
    pub fn with_progress(mut self, tx: UnboundedSender<CopyProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    // ---------------------------------------------------------------------
    // Read accessors
    // ---------------------------------------------------------------------

    pub fn root(&self) -> &DirRef {
        &self.root
    }

    pub fn trash_dir_name(&self) -> &str {
        &self.engine.trash_dir_name
    }

    pub fn current_path(&self) -> CompactString {
        self.state.lock().nav.current_path()
    }

    pub fn breadcrumbs(&self) -> Vec<CompactString> {
        self.state.lock().nav.breadcrumbs()
    }

    /// Search results while searching, the current listing otherwise.
    pub fn displayed_entries(&self) -> Vec<Entry> {
        self.state.lock().displayed().to_vec()
    }

    /// Entries on the current page.
    pub fn page_entries(&self) -> Vec<Entry> {
        let state = self.state.lock();
        let window: PageWindow = state.window();

        window.slice(state.displayed()).to_vec()
    }

    pub fn page(&self) -> PageWindow {
        self.state.lock().window()
    }

    pub fn is_searching(&self) -> bool {
        self.state.lock().search.is_some()
    }

    pub fn search_keyword(&self) -> Option<CompactString> {
        self.state
            .lock()
            .search
            .as_ref()
            .map(|s: &SearchState| s.keyword.clone())
    }

    pub fn tree(&self) -> Option<TreeNode> {
        self.state.lock().tree.clone()
    }

    pub fn is_expanded(&self, path: &str) -> bool {
        self.state.lock().expanded.is_expanded(path)
    }

    pub fn locks(&self) -> &Arc<OperationLocks> {
        &self.locks
    }

    pub fn items_per_page(&self) -> usize {
        self.state.lock().items_per_page
    }

    // ---------------------------------------------------------------------
    // Pagination and tree state
    // ---------------------------------------------------------------------

    /// Moves to `page`, clamped into range.
    pub fn set_page(&self, page: usize) -> PageWindow {
        let mut state = self.state.lock();
        state.page = page;
        state.clamp_page();

        state.window()
    }

    /// Changes the page size and returns to the first page.
    pub fn set_items_per_page(&self, items_per_page: usize) -> PageWindow {
        let mut state = self.state.lock();
        state.items_per_page = items_per_page.max(1);
        state.page = 1;

        state.window()
    }

    /// Flips a tree node. Returns the new state.
    pub fn toggle_expand(&self, path: &str) -> bool {
        self.state.lock().expanded.toggle(path)
    }

    // ---------------------------------------------------------------------
    // Listing, search, tree
    // ---------------------------------------------------------------------

    /// Re-reads the current directory.
    pub async fn list_current(&self) -> CoreResult<Vec<Entry>> {
        let _guard: OperationGuard = self.locks.acquire(OperationKind::Read)?;

        self.reload_listing().await
    }

    /// Searches below the current directory. A blank keyword ends the
    /// search and returns the plain listing.
    #[instrument(level = "info", skip(self))]
    pub async fn search(&self, keyword: &str) -> CoreResult<Vec<Entry>> {
        let _guard: OperationGuard = self.locks.acquire(OperationKind::Read)?;

        let keyword: &str = keyword.trim();
        if keyword.is_empty() {
            self.reset_search();
            return Ok(self.displayed_entries());
        }

        self.run_search(keyword).await
    }

    /// Ends the search mode.
    pub fn reset_search(&self) {
        let mut state = self.state.lock();

        if state.search.take().is_some() {
            state.page = 1;
        }
    }

    /// Number of branches the last search could not read.
    pub fn search_skipped_branches(&self) -> usize {
        self.state
            .lock()
            .search
            .as_ref()
            .map_or(0, |s: &SearchState| s.skipped_branches)
    }

    /// Rebuilds the folder tree under the root.
    pub async fn build_tree(&self) -> CoreResult<TreeNode> {
        let _guard: OperationGuard = self.locks.acquire(OperationKind::Read)?;

        self.rebuild_tree().await
    }

    pub async fn list_trash(&self) -> CoreResult<Vec<TrashRecord>> {
        self.trash.list_trash().await
    }

    // ---------------------------------------------------------------------
    // Navigation
    // ---------------------------------------------------------------------

    /// Opens the child directory `name` of the current directory.
    pub async fn enter(&self, name: &str) -> CoreResult<Vec<Entry>> {
        let _guard: OperationGuard = self.locks.acquire(OperationKind::Navigate)?;

        let mut nav: NavigationState = self.state.lock().nav.clone();
        nav.enter(name).await?;

        self.commit_navigation(nav).await
    }

    /// One level up. `Ok(false)` at the root, with nothing changed.
    pub async fn go_up(&self) -> CoreResult<bool> {
        let _guard: OperationGuard = self.locks.acquire(OperationKind::Navigate)?;

        let mut nav: NavigationState = self.state.lock().nav.clone();
        if !nav.go_up() {
            return Ok(false);
        }

        self.commit_navigation(nav).await?;
        Ok(true)
    }

    /// Jumps to breadcrumb `index` (0 is the root).
    pub async fn jump_to_breadcrumb(&self, index: usize) -> CoreResult<Vec<Entry>> {
        let _guard: OperationGuard = self.locks.acquire(OperationKind::Navigate)?;

        let mut nav: NavigationState = self.state.lock().nav.clone();
        nav.jump_to(index)?;

        self.commit_navigation(nav).await
    }

    /// Opens the directory at root-relative `path` (tree node or search hit).
    pub async fn navigate_to(&self, path: &str) -> CoreResult<Vec<Entry>> {
        let _guard: OperationGuard = self.locks.acquire(OperationKind::Navigate)?;

        let mut nav: NavigationState = self.state.lock().nav.clone();
        nav.resolve_path(path).await?;

        self.commit_navigation(nav).await
    }

    // ---------------------------------------------------------------------
    // Destructive operations
    // ---------------------------------------------------------------------

    /// Creates a folder in the current directory.
    #[instrument(level = "info", skip(self))]
    pub async fn create_folder(&self, name: &str) -> CoreResult<Entry> {
        let _guard: OperationGuard = self.locks.acquire(OperationKind::Create)?;

        let (current, path, at_root): (DirRef, CompactString, bool) = self.current_dir();
        let name: CompactString =
            validate_new_name(name, at_root, &self.engine.trash_dir_name)?;

        if child_exists(&current, &name).await? {
            return Err(AppError::AlreadyExists(name));
        }

        let handle: DirRef = current.get_directory(&name, true).await?;
        let entry: Entry = Entry::directory(
            name.clone(),
            join_path(&path, &name),
            handle,
        );

        info!(path = %entry.path, "Folder created");

        self.refresh(true).await;
        Ok(entry)
    }

    /// Adds one file to the current directory.
    pub async fn add_file(&self, source: UploadSource) -> CoreResult<AddFileOutcome> {
        let _guard: OperationGuard = self.locks.acquire(OperationKind::Upload)?;

        let (current, _, at_root): (DirRef, CompactString, bool) = self.current_dir();
        let outcome: CoreResult<AddFileOutcome> = upload::add_file(
            &current,
            at_root,
            &self.engine.trash_dir_name,
            &self.limits,
            &source,
            self.confirmer.as_ref(),
        )
        .await;

        if outcome.is_ok() {
            self.refresh(false).await;
        }

        outcome
    }

    /// Adds a batch of files under one guard and tallies the results.
    #[instrument(level = "info", skip(self, sources), fields(count = sources.len()))]
    pub async fn add_files(&self, sources: Vec<UploadSource>) -> CoreResult<UploadSummary> {
        let _guard: OperationGuard = self.locks.acquire(OperationKind::Upload)?;

        let (current, _, at_root): (DirRef, CompactString, bool) = self.current_dir();
        let mut summary: UploadSummary = UploadSummary::default();

        for source in &sources {
            let name: CompactString = source
                .name()
                .unwrap_or_else(|_| CompactString::from("?"));

            let result: CoreResult<AddFileOutcome> = upload::add_file(
                &current,
                at_root,
                &self.engine.trash_dir_name,
                &self.limits,
                source,
                self.confirmer.as_ref(),
            )
            .await;

            summary.record(name, result);
        }

        info!(summary = %summary.describe(), "Upload batch finished");

        if summary.succeeded() > 0 {
            self.refresh(false).await;
        }

        Ok(summary)
    }

    /// Renames the displayed entry at `path`.
    pub async fn rename_entry(&self, path: &str, new_name: &str) -> CoreResult<RenameOutcome> {
        let _guard: OperationGuard = self.locks.acquire(OperationKind::Rename)?;

        let entry: Entry = self.find_entry(path)?;
        let parent: DirRef = self.resolve_dir(entry.parent_path()).await?;

        let ctx: RenameContext<'_> = RenameContext {
            parent: &parent,
            at_root: entry.parent_path().is_empty(),
            trash_dir_name: &self.engine.trash_dir_name,
            limits: self.limits,
        };

        let outcome: RenameOutcome = rename_entry(
            ctx,
            &entry,
            new_name,
            self.confirmer.as_ref(),
            self.progress.as_ref(),
        )
        .await?;

        if entry.is_dir() {
            self.state.lock().expanded.prune_subtree(&entry.path);
        }

        self.refresh(entry.is_dir()).await;
        Ok(outcome)
    }

    /// Moves the displayed entry at `path` to the trash.
    pub async fn delete_entry(&self, path: &str) -> CoreResult<SoftDeleteOutcome> {
        let _guard: OperationGuard = self.locks.acquire(OperationKind::Delete)?;

        let entry: Entry = self.find_entry(path)?;
        let parent: DirRef = self.resolve_dir(entry.parent_path()).await?;

        let outcome: SoftDeleteOutcome = self
            .trash
            .soft_delete(&parent, &entry, self.progress.as_ref())
            .await?;

        if entry.is_dir() && outcome.original_removed() {
            self.state.lock().expanded.prune_subtree(&entry.path);
        }

        self.refresh(entry.is_dir()).await;
        Ok(outcome)
    }

    /// Moves every entry on the current page to the trash.
    #[instrument(level = "info", skip(self))]
    pub async fn clear_current_page(&self) -> CoreResult<ClearPageSummary> {
        let _guard: OperationGuard = self.locks.acquire(OperationKind::Delete)?;

        let (entries, current): (Vec<Entry>, DirRef) = {
            let state = self.state.lock();

            if state.search.is_some() {
                return Err(AppError::invalid_state(
                    "clearing a page is not possible while searching",
                ));
            }

            let window: PageWindow = state.window();
            (
                window.slice(&state.entries).to_vec(),
                state.nav.current().clone(),
            )
        };

        let mut summary: ClearPageSummary = ClearPageSummary::default();

        if entries.is_empty() {
            return Ok(summary);
        }

        let mut any_dir: bool = false;

        for entry in &entries {
            match self
                .trash
                .soft_delete(&current, entry, self.progress.as_ref())
                .await
            {
                Ok(SoftDeleteOutcome::Trashed { trash_name }) => {
                    if entry.is_dir() {
                        any_dir = true;
                        self.state.lock().expanded.prune_subtree(&entry.path);
                    }

                    summary.deleted.push((entry.name.clone(), trash_name));
                }

                Ok(SoftDeleteOutcome::TrashedOriginalKept { .. }) => {
                    summary.originals_kept.push(entry.name.clone());
                }

                Err(e) => summary.failed.push((entry.name.clone(), e)),
            }
        }

        info!(
            deleted = summary.deleted.len(),
            kept = summary.originals_kept.len(),
            failed = summary.failed.len(),
            "Page cleared"
        );

        self.refresh(any_dir).await;
        Ok(summary)
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn current_dir(&self) -> (DirRef, CompactString, bool) {
        let state = self.state.lock();

        (
            state.nav.current().clone(),
            state.nav.current_path(),
            state.nav.at_root(),
        )
    }

    fn find_entry(&self, path: &str) -> CoreResult<Entry> {
        self.state
            .lock()
            .find(path)
            .ok_or_else(|| AppError::not_found(path))
    }

    /// Directory handle for a root-relative path. The current directory is
    /// reused when it matches.
    async fn resolve_dir(&self, path: &str) -> CoreResult<DirRef> {
        {
            let state = self.state.lock();

            if state.nav.current_path() == path {
                return Ok(state.nav.current().clone());
            }
        }

        let mut nav: NavigationState = NavigationState::new(self.root.clone());
        nav.resolve_path(path).await?;

        Ok(nav.current().clone())
    }

    async fn commit_navigation(&self, nav: NavigationState) -> CoreResult<Vec<Entry>> {
        let entries: Vec<Entry> = list_directory(
            nav.current(),
            &nav.current_path(),
            nav.at_root(),
            &self.engine.trash_dir_name,
        )
        .await?;

        let mut state = self.state.lock();
        debug!(path = %nav.current_path(), "Navigation committed");

        state.nav = nav;
        state.entries = entries.clone();
        state.search = None;
        state.page = 1;

        Ok(entries)
    }

    async fn reload_listing(&self) -> CoreResult<Vec<Entry>> {
        let (current, path, at_root): (DirRef, CompactString, bool) = self.current_dir();

        let entries: Vec<Entry> =
            list_directory(&current, &path, at_root, &self.engine.trash_dir_name).await?;

        let mut state = self.state.lock();
        state.entries = entries.clone();
        state.clamp_page();

        Ok(entries)
    }

    async fn run_search(&self, keyword: &str) -> CoreResult<Vec<Entry>> {
        let (current, path, at_root): (DirRef, CompactString, bool) = self.current_dir();

        let report: SearchReport = search_tree(
            &current,
            &path,
            keyword,
            at_root,
            &self.engine.trash_dir_name,
        )
        .await?;

        let results: Vec<Entry> = report.entries;

        let mut state = self.state.lock();
        let same_keyword: bool = state
            .search
            .as_ref()
            .is_some_and(|s: &SearchState| s.keyword == keyword);

        state.search = Some(SearchState {
            keyword: CompactString::from(keyword),
            results: results.clone(),
            skipped_branches: report.skipped_branches,
        });

        if same_keyword {
            state.clamp_page();
        } else {
            state.page = 1;
        }

        Ok(results)
    }

    async fn rebuild_tree(&self) -> CoreResult<TreeNode> {
        let tree: TreeNode = build_tree(&self.root, &self.engine.trash_dir_name).await?;

        let mut state = self.state.lock();
        state.tree = Some(tree.clone());
        state.expanded.ensure_root();

        Ok(tree)
    }

    /// Reloads what a mutation may have changed. Failures are logged; the
    /// mutation itself already succeeded.
    async fn refresh(&self, rebuild_tree: bool) {
        if let Err(e) = self.reload_listing().await {
            warn!(error = %e, "Listing refresh failed");
        }

        if let Some(keyword) = self.search_keyword() {
            if let Err(e) = self.run_search(&keyword).await {
                warn!(error = %e, "Search refresh failed");
            }
        }

        if rebuild_tree {
            if let Err(e) = self.rebuild_tree().await {
                warn!(error = %e, "Tree refresh failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::confirm::AutoConfirm;
    use crate::storage::memory::{Fault, MemoryStore};
    use crate::util::clock::FixedClock;

    fn engine() -> EngineConfig {
        EngineConfig {
            max_file_size: 8,
            ..EngineConfig::default()
        }
    }

    async fn open(store: &MemoryStore, confirm: AutoConfirm) -> FileSession {
        let clock = FixedClock::at(2025, 1, 1, 12, 0, 0).unwrap();

        FileSession::open_with_clock(store.root(), engine(), Arc::new(confirm), Arc::new(clock))
            .await
            .unwrap()
    }

    fn scenario_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.add_file("a.txt", "alpha").add_file("b/c.txt", "gamma");
        store
    }

    fn paths(entries: &[Entry]) -> Vec<&str> {
        entries.iter().map(|e| e.path.as_str()).collect()
    }

    #[tokio::test]
    async fn test_search_then_delete_scenario() {
        let store = scenario_store();
        let session = open(&store, AutoConfirm::yes()).await;

        let hits = session.search("c").await.unwrap();
        assert_eq!(paths(&hits), vec!["b/c.txt"]);

        session.reset_search();
        let outcome = session.delete_entry("b").await.unwrap();

        assert_eq!(outcome.trash_name(), "20250101_120000_b");
        assert_eq!(
            store.file_data(".trash/20250101_120000_b/c.txt").unwrap(),
            "gamma"
        );

        let listing = session.list_current().await.unwrap();
        assert_eq!(paths(&listing), vec!["a.txt"]);
        assert!(session.tree().unwrap().find("b").is_none());
    }

    #[tokio::test]
    async fn test_delete_from_search_results() {
        let store = scenario_store();
        let session = open(&store, AutoConfirm::yes()).await;

        session.search("c.txt").await.unwrap();
        session.delete_entry("b/c.txt").await.unwrap();

        assert!(!store.contains("b/c.txt"));
        assert!(session.displayed_entries().is_empty());
        assert!(session.is_searching());
    }

    #[tokio::test]
    async fn test_concurrent_destructive_calls() {
        let store = scenario_store();
        let session = open(&store, AutoConfirm::yes()).await;

        let (deleted, created) =
            tokio::join!(session.delete_entry("a.txt"), session.create_folder("x"));

        assert!(deleted.is_ok());
        assert!(matches!(created, Err(AppError::Busy("create"))));
        assert!(!store.contains("x"));
        assert!(!session.locks().is_busy());
    }

    #[tokio::test]
    async fn test_navigation_refused_while_busy() {
        let store = scenario_store();
        let session = open(&store, AutoConfirm::yes()).await;

        let (renamed, entered) =
            tokio::join!(session.rename_entry("b", "bee"), session.enter("b"));

        assert!(renamed.unwrap().is_success());
        assert!(matches!(entered, Err(AppError::Busy("navigate"))));
        assert_eq!(session.current_path(), "");
        assert!(store.contains("bee/c.txt"));
    }

    #[tokio::test]
    async fn test_delete_refused_while_entering() {
        let store = scenario_store();
        let session = open(&store, AutoConfirm::yes()).await;

        let (entered, deleted) = tokio::join!(session.enter("b"), session.delete_entry("b"));

        assert_eq!(paths(&entered.unwrap()), vec!["b/c.txt"]);
        assert!(matches!(deleted, Err(AppError::Busy("delete"))));
        assert!(store.contains("b/c.txt"));
        assert_eq!(session.current_path(), "b");
        assert_eq!(paths(&session.list_current().await.unwrap()), vec!["b/c.txt"]);
    }

    #[tokio::test]
    async fn test_enter_refused_while_deleting() {
        let store = scenario_store();
        let session = open(&store, AutoConfirm::yes()).await;

        let (deleted, entered) = tokio::join!(session.delete_entry("b"), session.enter("b"));

        assert!(deleted.is_ok());
        assert!(matches!(entered, Err(AppError::Busy("navigate"))));
        assert!(!store.contains("b"));
        assert_eq!(session.current_path(), "");
        assert_eq!(paths(&session.displayed_entries()), vec!["a.txt"]);
    }

    #[tokio::test]
    async fn test_search_and_create_exclude_each_other() {
        let store = scenario_store();
        let session = open(&store, AutoConfirm::yes()).await;

        let (found, created) = tokio::join!(session.search("c"), session.create_folder("c2"));

        assert_eq!(paths(&found.unwrap()), vec!["b/c.txt"]);
        assert!(matches!(created, Err(AppError::Busy("create"))));
        assert!(!store.contains("c2"));
        assert!(!session.locks().is_busy());
    }

    #[tokio::test]
    async fn test_navigation_round_trip() {
        let store = scenario_store();
        store.add_dir("b/d/e");
        let session = open(&store, AutoConfirm::yes()).await;

        session.enter("b").await.unwrap();
        let listing = session.enter("d").await.unwrap();
        assert_eq!(paths(&listing), vec!["b/d/e"]);
        assert_eq!(session.breadcrumbs(), vec!["root", "b", "d"]);

        assert!(session.go_up().await.unwrap());
        assert_eq!(session.current_path(), "b");

        session.jump_to_breadcrumb(0).await.unwrap();
        assert!(!session.go_up().await.unwrap());

        assert!(matches!(
            session.jump_to_breadcrumb(5).await,
            Err(AppError::OutOfRange { .. })
        ));

        session.navigate_to("b/d/e").await.unwrap();
        assert_eq!(session.current_path(), "b/d/e");

        assert!(session.navigate_to("b/zzz").await.is_err());
        assert_eq!(session.current_path(), "b/d/e");
    }

    #[tokio::test]
    async fn test_create_folder_rules() {
        let store = scenario_store();
        let session = open(&store, AutoConfirm::yes()).await;

        assert!(matches!(
            session.create_folder(".trash").await,
            Err(AppError::InvalidName { .. })
        ));
        assert!(matches!(
            session.create_folder("b").await,
            Err(AppError::AlreadyExists(_))
        ));

        session.create_folder("new").await.unwrap();
        assert!(store.is_dir("new"));
        assert!(session.tree().unwrap().find("new").is_some());

        session.enter("b").await.unwrap();
        session.create_folder(".trash").await.unwrap();
        assert!(store.is_dir("b/.trash"));
    }

    #[tokio::test]
    async fn test_size_ceiling_on_upload() {
        let store = scenario_store();
        let session = open(&store, AutoConfirm::yes()).await;

        session
            .add_file(UploadSource::bytes("eight.bin", vec![1u8; 8]))
            .await
            .unwrap();

        let before = store.paths();
        assert!(matches!(
            session
                .add_file(UploadSource::bytes("nine.bin", vec![1u8; 9]))
                .await,
            Err(AppError::TooLarge { .. })
        ));
        assert_eq!(store.paths(), before);
    }

    #[tokio::test]
    async fn test_add_files_summary() {
        let store = scenario_store();
        let session = open(&store, AutoConfirm::no()).await;

        let summary = session
            .add_files(vec![
                UploadSource::bytes("n1.txt", "1"),
                UploadSource::bytes("a.txt", "skip"),
                UploadSource::bytes("big.bin", vec![0u8; 64]),
                UploadSource::bytes("bad|name", "x"),
            ])
            .await
            .unwrap();

        assert_eq!(summary.added, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.too_large.len(), 1);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(store.file_data("a.txt").unwrap(), "alpha");
        assert!(paths(&session.displayed_entries()).contains(&"n1.txt"));
    }

    #[tokio::test]
    async fn test_clear_page() {
        let store = MemoryStore::new();
        store
            .add_dir("d1")
            .add_file("f1.txt", "1")
            .add_file("f2.txt", "2")
            .add_file("f3.txt", "3");
        store.inject(Fault::Read, "f2.txt");
        let session = open(&store, AutoConfirm::yes()).await;
        session.set_items_per_page(3);
        session.toggle_expand("d1");

        let summary = session.clear_current_page().await.unwrap();

        assert_eq!(summary.deleted.len(), 2);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, "f2.txt");
        assert!(!session.is_expanded("d1"));
        assert_eq!(paths(&session.displayed_entries()), vec!["f2.txt", "f3.txt"]);
        assert_eq!(session.list_trash().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_clear_page_rejected_while_searching() {
        let store = scenario_store();
        let session = open(&store, AutoConfirm::yes()).await;

        session.search("a").await.unwrap();

        assert!(matches!(
            session.clear_current_page().await,
            Err(AppError::InvalidState(_))
        ));
        assert!(store.contains("a.txt"));
    }

    #[tokio::test]
    async fn test_rename_folder_prunes_expanded_paths() {
        let store = scenario_store();
        store.add_dir("b/d");
        let session = open(&store, AutoConfirm::yes()).await;
        session.toggle_expand("b");
        session.toggle_expand("b/d");

        let outcome = session.rename_entry("b", "bee").await.unwrap();

        assert!(outcome.is_success());
        assert!(!session.is_expanded("b"));
        assert!(!session.is_expanded("b/d"));
        assert!(session.is_expanded(""));
        assert!(session.tree().unwrap().find("bee/d").is_some());
    }

    #[tokio::test]
    async fn test_pagination_clamps() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store.add_file(&format!("f{i}.txt"), "x");
        }
        let session = open(&store, AutoConfirm::yes()).await;

        let window = session.set_items_per_page(2);
        assert_eq!(window.total_pages, 3);

        let window = session.set_page(10);
        assert_eq!(window.page, 3);
        assert_eq!(paths(&session.page_entries()), vec!["f4.txt"]);
    }

    #[tokio::test]
    async fn test_open_requests_permission() {
        let store = scenario_store();
        store.set_permission(PermissionState::Prompt, PermissionState::Granted);
        assert!(
            FileSession::open(store.root(), engine(), Arc::new(AutoConfirm::yes()))
                .await
                .is_ok()
        );

        let store = scenario_store();
        store.set_permission(PermissionState::Prompt, PermissionState::Denied);
        assert!(matches!(
            FileSession::open(store.root(), engine(), Arc::new(AutoConfirm::yes())).await,
            Err(AppError::PermissionDenied(_))
        ));
    }
}
