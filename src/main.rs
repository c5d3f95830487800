//! # Knowledge pipeline CLI (`kx`)
//!
//! Runs extractions, manages the extraction queue and inspects stored
//! knowledge items against the configured SQLite database.
//!
//! ## Usage
//!
//! ```bash
//! kx --config ./config/kx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kx init` | Create the SQLite database and run schema migrations |
//! | `kx extract <kind> [id] --project P` | Extract one source record now |
//! | `kx enqueue <source_type> <source_id> --project P` | Queue an extraction |
//! | `kx website <url> --project P` | Queue a website extraction |
//! | `kx process --project P` | Run one queue batch |
//! | `kx queue --project P` | List queue entries |
//! | `kx items --project P` | List knowledge items |
//! | `kx serve` | Start the HTTP API |
//!
//! Log verbosity follows `RUST_LOG` (default `info`); logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use knowledge_pipeline::config::{self, Config};
use knowledge_pipeline::extractor::KnowledgeExtractor;
use knowledge_pipeline::migrate::run_migrations;
use knowledge_pipeline::models::{ItemFilter, KnowledgeItem, SourceType};
use knowledge_pipeline::server;
use knowledge_pipeline::storage::DefaultStorage;
use knowledge_pipeline::store::{SqliteStore, Store};

/// Knowledge pipeline CLI: extract normalized, classified knowledge items
/// from project sources.
#[derive(Parser)]
#[command(
    name = "kx",
    about = "Knowledge extraction pipeline for project sources",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/kx.toml")]
    config: PathBuf,

    /// Project the command operates on.
    #[arg(long, global = true)]
    project: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Extract one source record immediately.
    Extract {
        #[command(subcommand)]
        source: ExtractSource,
    },

    /// Queue an extraction for later processing.
    Enqueue {
        /// Source type tag, e.g. `form_response` or `file_document`.
        source_type: String,

        source_id: String,

        /// Higher runs sooner.
        #[arg(long, default_value_t = 5)]
        priority: i64,

        #[arg(long)]
        url: Option<String>,
    },

    /// Queue a website extraction at the configured website priority.
    Website { url: String },

    /// Process one batch of the extraction queue.
    Process,

    /// List extraction queue entries.
    Queue,

    /// List knowledge items, newest first.
    Items {
        /// Only items of this source type.
        #[arg(long)]
        source_type: Option<String>,

        /// Include superseded items.
        #[arg(long)]
        all: bool,
    },

    /// Start the HTTP API.
    Serve,
}

#[derive(Subcommand)]
enum ExtractSource {
    /// Project metadata for `--project`.
    Project,
    FormResponse { id: String },
    Applet { id: String },
    File { id: String },
    Chat { id: String },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

async fn open_store(cfg: &Config) -> Result<Arc<SqliteStore>> {
    let store = SqliteStore::connect(cfg).await?;
    run_migrations(store.pool()).await?;
    Ok(Arc::new(store))
}

fn require_project(project: Option<String>) -> Result<String> {
    project
        .filter(|p| !p.trim().is_empty())
        .context("--project is required for this command")
}

fn print_items(items: &[KnowledgeItem]) {
    if items.is_empty() {
        println!("No knowledge items.");
        return;
    }
    for item in items {
        let category = item.category.map(|c| c.as_str()).unwrap_or("-");
        let stale = if item.is_current { "" } else { " (stale)" };
        println!(
            "{}/{} [{}] importance={}{}",
            item.source_type, item.source_id, category, item.importance_score, stale
        );
        println!("    {}", item.content_summary);
    }
    println!("{} item(s)", items.len());
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let store = open_store(&cfg).await?;
            store.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        command => {
            let project_id = require_project(cli.project)?;
            let store = open_store(&cfg).await?;
            let storage = Arc::new(DefaultStorage::new(&cfg.storage)?);
            let extractor = KnowledgeExtractor::new(
                project_id.clone(),
                store.clone(),
                storage,
                cfg.extraction.clone(),
            );
            run_project_command(command, &extractor, store.as_ref(), &project_id).await?;
            store.close().await;
        }
    }

    Ok(())
}

async fn run_project_command(
    command: Commands,
    extractor: &KnowledgeExtractor,
    store: &dyn Store,
    project_id: &str,
) -> Result<()> {
    match command {
        Commands::Extract { source } => {
            let items: Vec<KnowledgeItem> = match source {
                ExtractSource::Project => extractor.extract_from_project(None).await?,
                ExtractSource::FormResponse { id } => {
                    extractor.extract_from_form_response(&id).await?
                }
                ExtractSource::Applet { id } => {
                    extractor.extract_from_applet_interaction(&id).await?
                }
                ExtractSource::File { id } => extractor
                    .extract_from_file(&id)
                    .await?
                    .into_iter()
                    .collect(),
                ExtractSource::Chat { id } => extractor.extract_from_chat_message(&id).await?,
            };
            print_items(&items);
        }
        Commands::Enqueue {
            source_type,
            source_id,
            priority,
            url,
        } => {
            let source_type: SourceType = source_type.parse()?;
            let created = extractor
                .enqueue(source_type, &source_id, priority, url)
                .await?;
            if created {
                println!("Queued {}/{} (priority {}).", source_type, source_id, priority);
            } else {
                println!("Already queued: {}/{}.", source_type, source_id);
            }
        }
        Commands::Website { url } => {
            if extractor.queue_website_extraction(&url).await? {
                println!("Queued website extraction for {}.", url.trim());
            } else {
                println!("Website extraction already queued for {}.", url.trim());
            }
        }
        Commands::Process => {
            let report = extractor.process_extraction_queue().await?;
            println!(
                "Processed queue: {} selected, {} completed, {} failed, {} skipped.",
                report.selected, report.completed, report.failed, report.skipped
            );
        }
        Commands::Queue => {
            let entries = store.list_queue(project_id).await?;
            if entries.is_empty() {
                println!("Queue is empty.");
            }
            for entry in &entries {
                print!(
                    "{}/{} priority={} status={} attempts={}",
                    entry.source_type, entry.source_id, entry.priority, entry.status, entry.attempts
                );
                match &entry.error_message {
                    Some(err) => println!(" error={}", err),
                    None => println!(),
                }
            }
        }
        Commands::Items { source_type, all } => {
            let filter = ItemFilter {
                source_type: source_type
                    .as_deref()
                    .map(|s| s.parse::<SourceType>())
                    .transpose()?,
                source_id: None,
                include_stale: all,
            };
            let items = store.list_items(project_id, &filter).await?;
            print_items(&items);
        }
        Commands::Init | Commands::Serve => bail!("command does not operate on a project"),
    }
    Ok(())
}
