use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bookmarkwatcher_lib::{
    BookmarkConfig, BookmarkEvent, BookmarkStatus, BookmarkWorkspace, DeleteBehavior, Notifier,
    OperationResult,
};

#[derive(Parser)]
#[command(name = "bookmark-cli")]
#[command(about = "Bookmark files and folders into a virtual tree", long_about = None)]
struct Cli {
    /// Workspace root holding the descriptor directory
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List bookmarks with their status
    List,
    /// Bookmark a file or folder
    Add {
        path: PathBuf,
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Remove a bookmark (the original is kept)
    Remove { path: PathBuf },
    /// Rename a bookmark and its original
    Rename { path: PathBuf, new_name: String },
    /// Reconcile one bookmark against the filesystem
    Sync { path: PathBuf },
    /// Check every bookmark for missing originals
    Check,
    /// Copy a file or folder recursively
    Copy { source: PathBuf, target: PathBuf },
    /// Paste items into a directory, replacing same-named entries
    Paste {
        target: PathBuf,
        #[arg(required = true)]
        items: Vec<PathBuf>,
    },
    /// Overwrite bookmarked originals with same-named files
    PasteRoot {
        #[arg(required = true)]
        items: Vec<PathBuf>,
    },
    /// Delete bookmarks according to the configured delete behavior
    Delete {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Create an empty file
    NewFile { parent: PathBuf, name: String },
    /// Create an empty folder
    NewFolder { parent: PathBuf, name: String },
    /// Print bookmark events until interrupted
    Watch,
}

struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn info(&self, message: &str) {
        println!("✅ {message}");
    }

    fn warning(&self, message: &str) {
        println!("⚠️  {message}");
    }

    fn error(&self, message: &str) {
        eprintln!("❌ {message}");
    }

    fn ask_delete_behavior(&self, count: usize) -> Option<DeleteBehavior> {
        print!("Delete {count} bookmark(s): [b]ookmark only, bookmark and [o]riginal, [c]ancel? ");
        std::io::stdout().flush().ok()?;

        let mut answer = String::new();
        std::io::stdin().lock().read_line(&mut answer).ok()?;
        match answer.trim().to_lowercase().as_str() {
            "b" | "bookmark" => Some(DeleteBehavior::BookmarkOnly),
            "o" | "original" => Some(DeleteBehavior::BookmarkAndOriginal),
            _ => None,
        }
    }
}

fn status_icon(status: BookmarkStatus) -> &'static str {
    match status {
        BookmarkStatus::Synced => "✅",
        BookmarkStatus::Modified => "🔄",
        BookmarkStatus::Missing => "❌",
        BookmarkStatus::Error => "⚠️ ",
    }
}

fn print_result(label: &str, result: &OperationResult) {
    println!(
        "📊 {label}: {} succeeded, {} skipped, {} failed",
        result.succeeded,
        result.skipped,
        result.errors.len()
    );
    for error in &result.errors {
        eprintln!("   ⚠️  {:?}: {}", error.path, error.message);
    }
}

fn absolute(path: &Path) -> anyhow::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn absolute_all(paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    paths.iter().map(|p| absolute(p)).collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = match &cli.config {
        Some(path) => BookmarkConfig::load(path)?,
        None => BookmarkConfig::default(),
    };

    let root = absolute(&cli.root)?;
    let workspace = BookmarkWorkspace::open(&root, config, Arc::new(ConsoleNotifier)).await?;
    let outcome = run(&workspace, cli.command).await;
    workspace.shutdown().await;
    outcome
}

async fn run(workspace: &BookmarkWorkspace, command: Command) -> anyhow::Result<()> {
    let engine = workspace.engine();

    match command {
        Command::List => {
            let items = workspace.tree().root_items().await;
            if items.is_empty() {
                println!("No bookmarks in {:?}", engine.descriptor_dir());
                return Ok(());
            }
            println!("{:<4} {:<30} {:<10} PATH", "", "NAME", "STATUS");
            println!("{}", "-".repeat(72));
            for item in items {
                let status = item.status.unwrap_or(BookmarkStatus::Synced);
                println!(
                    "{:<4} {:<30} {:<10} {}",
                    status_icon(status),
                    item.label,
                    status.as_str(),
                    item.path.display()
                );
            }
        }
        Command::Add { path, name } => {
            let meta = engine.add_bookmark(&absolute(&path)?, name.as_deref()).await?;
            println!("🔖 Bookmarked {:?} as '{}'", meta.original_path, meta.bookmark_name);
        }
        Command::Remove { path } => {
            if engine.remove_bookmark(&absolute(&path)?).await? {
                println!("🗑️  Bookmark removed");
            } else {
                println!("Not bookmarked: {path:?}");
            }
        }
        Command::Rename { path, new_name } => {
            let meta = engine.rename_bookmark(&absolute(&path)?, &new_name).await?;
            println!("✏️  Renamed to '{}' ({:?})", meta.bookmark_name, meta.original_path);
        }
        Command::Sync { path } => match engine.sync_bookmark(&absolute(&path)?).await? {
            Some(status) => println!("{} {}", status_icon(status), status.as_str()),
            None => println!("Not bookmarked: {path:?}"),
        },
        Command::Check => {
            println!("🔍 Checking {} bookmark(s)...", engine.bookmark_count().await);
            let missing = workspace.check_all().await;
            if missing.is_empty() {
                println!("✅ All originals present");
            }
            for path in missing {
                println!("   ❌ {path:?}");
            }
        }
        Command::Copy { source, target } => {
            let pb = ProgressBar::new_spinner();
            pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
            pb.enable_steady_tick(Duration::from_millis(100));
            pb.set_message(format!("Copying {source:?}..."));

            match workspace
                .operations()
                .copy_file_or_folder(&absolute(&source)?, &absolute(&target)?)
                .await
            {
                Ok(()) => pb.finish_with_message("✅ Copy complete!"),
                Err(e) => {
                    pb.abandon_with_message("❌ Copy failed!");
                    return Err(e.into());
                }
            }
        }
        Command::Paste { target, items } => {
            let result = workspace
                .paste(&absolute_all(&items)?, &absolute(&target)?)
                .await;
            print_result("Paste", &result);
        }
        Command::PasteRoot { items } => {
            let result = workspace.paste_to_root(&absolute_all(&items)?).await;
            print_result("Paste to root", &result);
        }
        Command::Delete { paths } => match workspace.delete_bookmarks(&absolute_all(&paths)?).await {
            Some(result) => print_result("Delete", &result),
            None => println!("Cancelled"),
        },
        Command::NewFile { parent, name } => {
            if let Some(path) = workspace.create_file(&absolute(&parent)?, &name).await? {
                println!("📄 {path:?}");
            }
        }
        Command::NewFolder { parent, name } => {
            if let Some(path) = workspace.create_folder(&absolute(&parent)?, &name).await? {
                println!("📁 {path:?}");
            }
        }
        Command::Watch => {
            let mut events = engine.subscribe();
            println!(
                "👀 Watching {} bookmark(s), Ctrl+C to stop",
                engine.watcher_count().await
            );
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    event = events.recv() => match event {
                        Ok(BookmarkEvent::StatusChanged { path, status }) => {
                            println!("{} {:<9} {}", status_icon(status), status.as_str(), path.display());
                        }
                        Ok(BookmarkEvent::RefreshRequested) => {
                            tracing::info!("refresh requested");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!("dropped {n} event(s)");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        }
    }

    Ok(())
}
