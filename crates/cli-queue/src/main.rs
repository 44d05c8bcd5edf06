use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use humansize::{format_size, DECIMAL};
use log::{info, warn};
use tagqueue::media::MediaFile;
use tagqueue::scan::{self, ScanResult};
use tagqueue::{
    ActionServices, ItemFactory, ItemId, ItemStatus, Queue, QueueConfig, QueueEvent, QueueEvents, QueueItem,
    QueueStore, RunSummary,
};

/// Media tagging queue
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (JSON or TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add files, or the media files inside folders, to the queue
    Add {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Insert at this position instead of the end
        #[arg(long)]
        at: Option<usize>,
    },
    /// Show the queue
    List {
        /// Print the items as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove items by position
    Remove {
        #[arg(required = true)]
        positions: Vec<usize>,
    },
    /// Move items so they sit before position `--to`
    Move {
        #[arg(required = true)]
        positions: Vec<usize>,
        #[arg(long)]
        to: usize,
    },
    /// Put cancelled items back in line
    Requeue {
        #[arg(required = true)]
        positions: Vec<usize>,
    },
    /// Remove all completed items
    ClearCompleted,
    /// Take an item out of the queue and print its current tags
    Edit { position: usize },
    /// Process ready items until done; Ctrl-C stops after the current action
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins; otherwise info, or debug with --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .init();

    let cfg = QueueConfig::load_config(args.config.as_deref())
        .context("Failed to load configuration")?;
    let (queue, events) = open_queue(&cfg)?;

    match args.command {
        Command::Add { paths, at } => {
            let results = scan::scan_paths(&paths, &cfg);
            for result in &results {
                if let ScanResult::Skipped(path, reason) = result {
                    warn!("Skipping {}: {}", path.display(), reason);
                }
            }
            let sources: Vec<PathBuf> = results
                .into_iter()
                .filter_map(|r| match r {
                    ScanResult::Candidate(path) => Some(path),
                    ScanResult::Skipped(..) => None,
                })
                .collect();
            if sources.is_empty() {
                bail!("No supported media files found");
            }

            let items = ItemFactory::new(&cfg).create_items(&sources);
            let positions = queue
                .add(items, at)
                .context("Failed to add items to the queue")?;
            info!("Added {} item(s) at {:?}", positions.len(), positions);

            if cfg.auto_start {
                run(&queue, events).await?;
            }
        }
        Command::List { json } => {
            let items = queue.snapshot();
            if json {
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else {
                print_items(&items);
            }
        }
        Command::Remove { positions } => {
            let removal = queue.remove(&positions).context("Failed to remove items")?;
            for (position, item) in &removal.removed {
                println!("Removed #{} {}", position, item.file_name());
            }
            for position in &removal.skipped {
                println!("Skipped #{} (busy)", position);
            }
        }
        Command::Move { positions, to } => {
            let ids: Vec<ItemId> = queue
                .items(&positions)
                .context("Invalid positions")?
                .iter()
                .map(|item| item.id)
                .collect();
            let moves = queue.move_items(&ids, to).context("Failed to move items")?;
            info!("Moved {} item(s)", moves.len());
        }
        Command::Requeue { positions } => {
            queue.requeue(&positions).context("Failed to requeue items")?;
            info!("Requeued {} item(s)", positions.len());
        }
        Command::ClearCompleted => {
            let removal = queue
                .remove_completed()
                .context("Failed to remove completed items")?;
            println!("Removed {} completed item(s)", removal.removed.len());
        }
        Command::Edit { position } => {
            let services = cfg.services()?;
            let (item, file) = edit_item(&queue, &services, position)?;
            println!("{}", serde_json::to_string_pretty(&file)?);
            println!("{} was taken out of the queue", item.file_name());
        }
        Command::Run => run(&queue, events).await?,
    }

    Ok(())
}

/// Take the item at `position` out of the queue and open its current tags.
/// The item leaves the queue even when its file cannot be opened.
fn edit_item(queue: &Queue, services: &ActionServices, position: usize) -> Result<(QueueItem, MediaFile)> {
    let item = queue
        .begin_edit(position)
        .with_context(|| format!("Failed to edit item #{}", position))?;
    let opened = services.media.open(&item.source);
    let (_, item) = queue
        .end_edit(item.id)
        .context("Failed to finish editing")?;
    let file = opened.with_context(|| format!("Failed to open {}", item.source.display()))?;
    Ok((item, file))
}

fn open_queue(cfg: &QueueConfig) -> Result<(Queue, QueueEvents)> {
    let store = QueueStore::new(&cfg.queue_file);
    let outcome = store.load();
    if let Some(error) = &outcome.error {
        warn!("Starting with an empty queue: {}", error);
    }
    if let Some(path) = &outcome.quarantined {
        warn!("Previous queue file kept at {}", path.display());
    }
    if outcome.recovered > 0 {
        info!("{} interrupted item(s) are ready again", outcome.recovered);
    }

    let services = cfg.services()?;
    Ok(Queue::new(store, outcome.items, services))
}

async fn run(queue: &Queue, mut events: QueueEvents) -> Result<()> {
    if queue.ready_count() == 0 {
        println!("Nothing to do");
        return Ok(());
    }
    if !queue.start() {
        bail!("Queue is already running");
    }

    let mut listening = true;
    let summary: Option<RunSummary> = loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(QueueEvent::Progress(p)) => {
                    let position = p.item_index.map(|i| format!("#{} ", i)).unwrap_or_default();
                    println!("[{:>3.0}%] {}{}", p.progress * 100.0, position, p.status_text);
                }
                Some(QueueEvent::Completed(summary)) => break Some(summary),
                None => break None,
            },
            result = tokio::signal::ctrl_c(), if listening => match result {
                Ok(()) => {
                    println!("Stopping after the current action...");
                    queue.stop();
                }
                Err(e) => {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                    listening = false;
                }
            },
        }
    };
    queue.wait_idle().await;

    match summary {
        Some(summary) => {
            println!(
                "Done at {}: {} completed, {} failed",
                Local::now().format("%H:%M:%S"),
                summary.completed,
                summary.failed
            );
            Ok(())
        }
        None => bail!("Queue worker went away without finishing"),
    }
}

fn print_items(items: &[QueueItem]) {
    if items.is_empty() {
        println!("Queue is empty");
        return;
    }

    println!("{:>3}  {:<10} {:>10}  {}", "#", "STATUS", "SIZE", "FILE");
    for (position, item) in items.iter().enumerate() {
        let size = std::fs::metadata(&item.source)
            .map(|m| format_size(m.len(), DECIMAL))
            .unwrap_or_else(|_| "-".to_string());
        println!(
            "{:>3}  {:<10} {:>10}  {}",
            position,
            item.status.to_string(),
            size,
            item.file_name()
        );
        if item.destination != item.source {
            println!("{:>27}-> {}", "", item.destination.display());
        }
        if item.status == ItemStatus::Failed {
            if let Some(error) = &item.last_error {
                println!("{:>27}{}", "", error);
            }
        }
    }

    let ready = items.iter().filter(|i| i.status == ItemStatus::Ready).count();
    println!("{} item(s), {} ready", items.len(), ready);
}
