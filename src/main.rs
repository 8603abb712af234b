use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use tracing::{error, info};

use animl_watchlist::app::handler::{BatchSummary, QueueEvent};
use animl_watchlist::config::Config;
use animl_watchlist::infra::sqlite_store::SqliteStore;
use animl_watchlist::observability::{self, metrics};
use animl_watchlist::pipeline::{self, Components};

#[derive(Parser)]
#[command(name = "animl")]
#[command(about = "Incremental watchlist crawler")]
#[command(version)]
struct Cli {
    /// Optional TOML config file; environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Keep users and associations in memory instead of SQLite
    #[arg(long, global = true)]
    in_memory: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Gate and crawl the given users
    Crawl {
        #[arg(required = true)]
        users: Vec<String>,
    },
    /// Process a queue delivery ({"Records":[{"body":"<user>"}]}) from a file, or stdin with "-"
    Handle {
        #[arg(long)]
        event: String,
    },
    /// Create the database file and tables, then exit
    InitDb,
}

fn read_event(source: &str) -> anyhow::Result<QueueEvent> {
    let raw = if source == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).context("reading event from stdin")?;
        buf
    } else {
        std::fs::read_to_string(source).with_context(|| format!("reading event file {source}"))?
    };
    serde_json::from_str(&raw).context("event is not a valid queue delivery")
}

async fn run_batch(config: &Config, in_memory: bool, event: QueueEvent) -> anyhow::Result<BatchSummary> {
    let components = Components::from_config(config, in_memory)?;
    let handler = pipeline::build_handler(config, components);
    Ok(handler.handle_batch(event).await)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guard = observability::init_logging();
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    metrics::init_metrics();
    info!(region = %config.region, db = %config.db_path.display(), "configuration loaded");

    let result = match cli.command {
        Commands::Crawl { users } => run_batch(&config, cli.in_memory, QueueEvent::from_user_ids(users))
            .await
            .map(Some),
        Commands::Handle { event } => match read_event(&event) {
            Ok(event) => run_batch(&config, cli.in_memory, event).await.map(Some),
            Err(e) => Err(e),
        },
        Commands::InitDb => {
            SqliteStore::open(&config.db_path, &config.user_table, &config.watched_table)
                .map(|_| {
                    info!(path = %config.db_path.display(), "database initialised");
                    None
                })
                .map_err(anyhow::Error::from)
        }
    };

    metrics::push_if_configured(config.pushgateway_url.as_deref(), &config.namespace, &config.region).await;

    match result {
        Ok(Some(summary)) => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(e) => {
            error!("run failed: {:#}", e);
            Err(e)
        }
    }
}
