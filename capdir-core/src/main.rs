//! src/main.rs
//! Command-line front end: one command per run against a granted root.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tokio::{
    io::{AsyncBufReadExt, BufReader, Lines, Stdin},
    sync::{Mutex, mpsc},
};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use capdir_core::{
    FileSession, Logger, SessionSettings, SettingsStore, TomlSettingsStore,
    config::Config,
    controller::{AutoConfirm, ClearPageSummary, Confirmer, PartialCopyChoice},
    model::{Entry, PageWindow, TreeNode},
    operators::{
        CopyProgress, CopyReport, RenameOutcome, SoftDeleteOutcome, UploadSource, UploadSummary,
    },
    settings::load_or_default,
    storage::{DirRef, local::LocalDirectory},
    util::humanize::human_readable_size,
};

/// File operations inside one granted directory.
#[derive(Debug, Parser)]
#[command(name = "capdir", version, about)]
struct Cli {
    /// Directory the session is granted.
    root: PathBuf,

    /// Root-relative directory to open before running the command.
    #[arg(long = "in", value_name = "DIR", global = true)]
    dir: Option<String>,

    /// Answer yes to every confirmation.
    #[arg(short, long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the directory.
    Ls {
        #[arg(default_value_t = 1)]
        page: usize,
    },

    /// Print the folder tree.
    Tree,

    /// Search names below the directory.
    Find { keyword: String },

    /// Create a folder.
    Mkdir { name: String },

    /// Add local files.
    Put {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Rename a file or folder.
    Mv { path: String, new_name: String },

    /// Move an entry to the trash.
    Rm { path: String },

    /// Move every entry on a page to the trash.
    ClearPage {
        #[arg(default_value_t = 1)]
        page: usize,
    },

    /// List trashed entries.
    Trash,
}

/// Asks on stdin. Anything but `y`/`yes` declines.
#[derive(Debug)]
struct PromptConfirm {
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl PromptConfirm {
    fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }

    async fn ask(&self, question: &str) -> bool {
        eprint!("{question} [y/N] ");

        let mut lines = self.lines.lock().await;
        match lines.next_line().await {
            Ok(Some(answer)) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),

            _ => false,
        }
    }
}

#[async_trait]
impl Confirmer for PromptConfirm {
    async fn confirm_directory_rename(&self, old_name: &str, new_name: &str) -> bool {
        self.ask(&format!(
            "Renaming folder '{old_name}' to '{new_name}' copies its whole contents. Continue?"
        ))
        .await
    }

    async fn resolve_partial_copy(
        &self,
        old_name: &str,
        new_name: &str,
        report: &CopyReport,
    ) -> PartialCopyChoice {
        let delete: bool = self
            .ask(&format!(
                "Copying '{old_name}' to '{new_name}' failed for {} of {} files. Delete '{old_name}' anyway?",
                report.error_count,
                report.error_count + report.copied_count
            ))
            .await;

        if delete {
            PartialCopyChoice::DeleteSource
        } else {
            PartialCopyChoice::KeepBoth
        }
    }

    async fn confirm_overwrite(&self, name: &str) -> bool {
        self.ask(&format!("'{name}' already exists. Overwrite?")).await
    }
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let cli: Cli = Cli::parse();

    let config: Config = Config::load().await.unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {e}");
        Config::default()
    });

    let _log_guard: Option<WorkerGuard> = match config.log_dir() {
        Ok(dir) => Logger::init_tracing(&config.logging, &dir)
            .map_err(|e| eprintln!("Logging disabled: {e:#}"))
            .ok(),

        Err(e) => {
            eprintln!("Logging disabled: {e:#}");
            None
        }
    };

    info!(root = %cli.root.display(), command = ?cli.command, "Starting capdir");

    let result: Result<()> = run(&cli, &config).await;

    if let Err(e) = &result {
        warn!(error = %e, "Command failed");
    }

    result
}

async fn run(cli: &Cli, config: &Config) -> Result<()> {
    let store: Option<TomlSettingsStore> = TomlSettingsStore::default_location()
        .map_err(|e| warn!(error = %e, "No settings location"))
        .ok();

    let mut settings: SessionSettings = match &store {
        Some(store) => load_or_default(store, config.engine.default_items_per_page).await,

        None => SessionSettings::with_items_per_page(config.engine.default_items_per_page),
    };

    let root: DirRef = LocalDirectory::open(&cli.root)
        .await
        .with_context(|| format!("cannot open {}", cli.root.display()))?;

    let confirmer: Arc<dyn Confirmer> = if cli.yes {
        Arc::new(AutoConfirm::yes())
    } else {
        Arc::new(PromptConfirm::new())
    };

    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<CopyProgress>();
    let progress_task = tokio::spawn(async move {
        while let Some(progress) = progress_rx.recv().await {
            eprintln!("  copied {:>5}  {}", progress.copied, progress.item_name);
        }
    });

    let session: FileSession = FileSession::open(root, config.engine.clone(), confirmer)
        .await
        .context("cannot open session")?
        .with_progress(progress_tx);
    session.set_items_per_page(settings.items_per_page);

    if let Some(dir) = &cli.dir {
        session
            .navigate_to(dir.trim_matches('/'))
            .await
            .with_context(|| format!("cannot open directory '{dir}'"))?;
    }

    let outcome: Result<()> = dispatch(cli, &session).await;

    drop(session);
    let _ = progress_task.await;

    if let Some(store) = &store {
        settings.touch(&cli.root);

        if let Err(e) = store.save(&settings).await {
            warn!(error = %e, "Could not save session settings");
        }
    }

    outcome
}

async fn dispatch(cli: &Cli, session: &FileSession) -> Result<()> {
    match &cli.command {
        Command::Ls { page } => {
            let window: PageWindow = session.set_page(*page);
            print_entries(&session.page_entries());
            print_footer(&window);
        }

        Command::Tree => {
            let tree: TreeNode = session.build_tree().await?;
            print_tree(&tree);
        }

        Command::Find { keyword } => {
            let hits: Vec<Entry> = session.search(keyword).await?;

            print_entries(&hits);
            println!("{} match(es)", hits.len());

            let skipped: usize = session.search_skipped_branches();
            if skipped > 0 {
                println!("{skipped} folder(s) could not be read");
            }
        }

        Command::Mkdir { name } => {
            let entry: Entry = session.create_folder(name).await?;
            println!("created {}", entry.path);
        }

        Command::Put { files } => {
            let sources: Vec<UploadSource> = files
                .iter()
                .map(|p: &PathBuf| UploadSource::Path(p.clone()))
                .collect();

            let summary: UploadSummary = session.add_files(sources).await?;
            println!("{}", summary.describe());

            for name in &summary.too_large {
                println!("  too large: {name}");
            }
            for (name, e) in &summary.failed {
                println!("  failed: {name}: {e}");
            }
        }

        Command::Mv { path, new_name } => {
            print_rename(session.rename_entry(path, new_name).await?);
        }

        Command::Rm { path } => match session.delete_entry(path).await? {
            SoftDeleteOutcome::Trashed { trash_name } => {
                println!("moved {path} to trash as {trash_name}");
            }

            SoftDeleteOutcome::TrashedOriginalKept { trash_name, reason } => {
                println!("copied {path} to trash as {trash_name}, but the original stays: {reason}");
            }
        },

        Command::ClearPage { page } => {
            session.set_page(*page);
            print_clear(&session.clear_current_page().await?);
        }

        Command::Trash => {
            for record in session.list_trash().await? {
                println!(
                    "{}  {:<9} {}",
                    record.deleted_at.format("%Y-%m-%d %H:%M:%S"),
                    record.kind.as_str(),
                    record.original_name
                );
            }
        }
    }

    Ok(())
}

fn print_entries(entries: &[Entry]) {
    for entry in entries {
        if entry.is_dir() {
            println!("{:>10}  {}/", "-", entry.path);
        } else {
            println!("{:>10}  {}", human_readable_size(entry.size), entry.path);
        }
    }
}

fn print_footer(window: &PageWindow) {
    println!(
        "page {}/{} ({} item(s))",
        window.page, window.total_pages, window.total_items
    );
}

fn print_tree(tree: &TreeNode) {
    for (depth, node) in tree.walk() {
        let label: &str = if depth == 0 { "." } else { node.name.as_str() };
        println!("{:indent$}{label}", "", indent = depth * 2);
    }
}

fn print_rename(outcome: RenameOutcome) {
    match outcome {
        RenameOutcome::Success {
            new_name,
            changed: false,
            ..
        } => println!("already named {new_name}"),

        RenameOutcome::Success {
            new_name,
            copy_errors: 0,
            ..
        } => println!("renamed to {new_name}"),

        RenameOutcome::Success {
            new_name,
            copy_errors,
            ..
        } => println!("renamed to {new_name}; {copy_errors} item(s) were lost"),

        RenameOutcome::Cancelled => println!("cancelled"),

        RenameOutcome::Failed { reason } => println!("rename failed: {reason}"),

        RenameOutcome::PartiallyFailed {
            new_name,
            copied,
            errors,
        } => println!(
            "partially renamed: {copied} item(s) copied to {new_name}, {errors} failed; both kept"
        ),
    }
}

fn print_clear(summary: &ClearPageSummary) {
    for (name, trash_name) in &summary.deleted {
        println!("trashed {name} as {trash_name}");
    }

    for name in &summary.originals_kept {
        println!("copied {name} to trash, original kept");
    }

    for (name, e) in &summary.failed {
        println!("failed {name}: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["capdir", "/data", "rm", "b/c.txt", "--yes", "--in", "b"])
            .unwrap();

        assert!(cli.yes);
        assert_eq!(cli.dir.as_deref(), Some("b"));
        assert!(matches!(cli.command, Command::Rm { ref path } if path == "b/c.txt"));
    }

    #[test]
    fn test_page_defaults_and_required_args() {
        let cli = Cli::try_parse_from(["capdir", "/data", "ls"]).unwrap();
        assert!(matches!(cli.command, Command::Ls { page: 1 }));

        let cli = Cli::try_parse_from(["capdir", "/data", "clear-page", "3"]).unwrap();
        assert!(matches!(cli.command, Command::ClearPage { page: 3 }));

        assert!(Cli::try_parse_from(["capdir", "/data", "put"]).is_err());
        assert!(Cli::try_parse_from(["capdir", "/data", "mv", "a.txt"]).is_err());
        assert!(Cli::try_parse_from(["capdir", "/data", "ls", "two"]).is_err());
    }
}
