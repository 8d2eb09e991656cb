//! mail-search: index messages and run search requests against a mailbox
//!
//! # Usage
//!
//! ```bash
//! # Index raw messages into folder 2 of account alice
//! mail-search index alice 2 inbox/*.eml
//!
//! # Run a JSON-encoded search request
//! mail-search search request.json --calendar calendar.json
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use mail_search::config::{Config, LoggingConfig};
use mail_search::search::{
    CalendarItem, HttpRemoteMailbox, InMemoryCalendarCache, IndexedMessage, MessageIndex,
    MountTableResolver, SearchOrchestrator, SearchRequest, SearchServices,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "mail-search")]
#[command(about = "Index and search a mailbox", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add raw RFC 822 messages to the index
    Index {
        /// Owning account
        account: String,
        /// Folder the messages belong to
        folder_id: u32,
        /// Message files
        files: Vec<PathBuf>,
    },
    /// Run a search request and print the response
    Search {
        /// JSON-encoded search request
        request: PathBuf,
        /// Account to search; defaults to the configured local account
        #[arg(short, long)]
        account: Option<String>,
        /// Account making the request, when searching a delegated mailbox
        #[arg(long)]
        authenticated_as: Option<String>,
        /// JSON list of calendar items to load into the summary cache
        #[arg(long)]
        calendar: Option<PathBuf>,
    },
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("mail_search={}", logging.level).into());

    if logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = if cli.config.exists() {
        Config::from_file(&cli.config)?
    } else {
        Config::default()
    };

    init_logging(&config.logging);
    info!("Index path: {}", config.search.index_path);

    match cli.command {
        Commands::Index {
            account,
            folder_id,
            files,
        } => index_files(&config, &account, folder_id, &files).await,
        Commands::Search {
            request,
            account,
            authenticated_as,
            calendar,
        } => {
            let account = account.unwrap_or_else(|| config.federation.local_account.clone());
            run_search(&config, &account, authenticated_as, &request, calendar.as_deref()).await
        }
    }
}

async fn index_files(config: &Config, account: &str, folder_id: u32, files: &[PathBuf]) -> anyhow::Result<()> {
    let index = MessageIndex::open(Path::new(&config.search.index_path), account)?;
    let mut next_id = index.document_count() as u32 + 1;
    let mut indexed = 0;

    for path in files {
        let content = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        match IndexedMessage::from_eml(account, folder_id, next_id, &content) {
            Some(message) => {
                index.index_message(&message).await?;
                next_id += 1;
                indexed += 1;
            }
            None => warn!("Skipping unparseable message {}", path.display()),
        }
    }

    index.commit().await?;
    println!("Indexed {} message(s) into folder {}", indexed, folder_id);
    Ok(())
}

async fn run_search(
    config: &Config,
    account: &str,
    authenticated_as: Option<String>,
    request_path: &Path,
    calendar_path: Option<&Path>,
) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(request_path)
        .with_context(|| format!("reading {}", request_path.display()))?;
    let mut request: SearchRequest = serde_json::from_str(&content)?;
    if request.limit == 0 {
        request.limit = config.search.default_limit;
    }

    let calendar = Arc::new(InMemoryCalendarCache::new());
    if let Some(path) = calendar_path {
        let items: Vec<CalendarItem> = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        info!("Loading {} calendar item(s) into the summary cache", items.len());
        for item in items {
            calendar.put(item).await;
        }
    }

    let index = Arc::new(MessageIndex::open(Path::new(&config.search.index_path), account)?);
    let services = SearchServices {
        engine: index.clone(),
        calendar,
        folders: Arc::new(MountTableResolver::for_account(account, &config.federation)),
        remote: Arc::new(HttpRemoteMailbox::from_config(&config.federation)),
        mailbox: index,
    };

    let mut orchestrator = SearchOrchestrator::new(services, account)
        .with_calendar_cache(config.search.calendar_cache_enabled);
    if let Some(authenticated) = authenticated_as {
        orchestrator = orchestrator.with_authenticated_account(&authenticated);
    }

    let response = orchestrator.search(&request).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
