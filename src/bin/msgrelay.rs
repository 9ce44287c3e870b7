//! msgrelay CLI - runs the HTTP intake, the TCP ingest server, or both
//!
//! Configuration comes from the environment (and `.env`), optionally
//! overridden by a YAML file and then by command-line flags.

use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use msgrelay::{
    BackupJournal, Database, IngestConfig, IngestServer, IntakeConfig, IntakeService, MemorySink,
    MessageSink, RelayClient, RelayConfig,
};

#[derive(Parser)]
#[command(name = "msgrelay")]
#[command(version, about = "Form message intake with TCP relay to a persisting ingest server", long_about = None)]
struct Cli {
    /// YAML file overriding environment configuration
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP intake service
    Intake {
        /// HTTP listen address
        #[arg(short, long)]
        bind: Option<String>,

        /// Ingest server address to relay to
        #[arg(short, long)]
        ingest_addr: Option<String>,
    },

    /// Run the TCP ingest server
    Ingest {
        /// TCP listen address
        #[arg(short, long)]
        bind: Option<String>,

        /// Backup journal path
        #[arg(short, long)]
        journal: Option<PathBuf>,

        /// Keep records in memory instead of the database
        #[arg(long)]
        memory_sink: bool,
    },

    /// Run intake and ingest in one process
    All {
        /// Keep records in memory instead of the database
        #[arg(long)]
        memory_sink: bool,
    },

    /// Show backup journal contents summary
    Journal {
        /// Backup journal path
        #[arg(short, long)]
        journal: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    run(cli).await.map_err(|e| {
        tracing::error!("{}", e);
        e
    })
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let mut config = RelayConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Intake { bind, ingest_addr } => {
            if let Some(bind) = bind {
                config.intake.bind = bind;
            }
            if let Some(addr) = ingest_addr {
                config.intake.ingest_addr = addr;
            }
            run_intake(config.intake).await?;
        }
        Commands::Ingest { bind, journal, memory_sink } => {
            if let Some(bind) = bind {
                config.ingest.bind = bind;
            }
            if let Some(journal) = journal {
                config.ingest.journal_path = journal;
            }
            run_ingest(config.ingest, memory_sink).await?;
        }
        Commands::All { memory_sink } => {
            tokio::try_join!(
                run_intake(config.intake),
                run_ingest(config.ingest, memory_sink),
            )?;
        }
        Commands::Journal { journal } => {
            let path = journal.unwrap_or(config.ingest.journal_path);
            let records = BackupJournal::new(&path).load();
            println!("{}: {} records", path.display(), records.len());
            if let Some(last) = records.last() {
                println!("{}", serde_json::to_string_pretty(last)?);
            }
        }
    }

    Ok(())
}

async fn run_intake(config: IntakeConfig) -> Result<(), Box<dyn Error>> {
    let intake = IntakeService::new(RelayClient::from_config(&config));
    msgrelay::intake::routes::serve(&config.bind, intake, shutdown_signal()).await?;
    Ok(())
}

async fn run_ingest(config: IngestConfig, memory_sink: bool) -> Result<(), Box<dyn Error>> {
    let sink = open_sink(&config, memory_sink).await?;
    let server = IngestServer::bind(&config, sink).await?;
    server.serve_with_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn open_sink(
    config: &IngestConfig,
    memory_sink: bool,
) -> Result<Arc<dyn MessageSink>, Box<dyn Error>> {
    if memory_sink {
        tracing::warn!("Using in-memory sink; records survive only in the backup journal");
        return Ok(Arc::new(MemorySink::new()));
    }

    // Pool construction and DDL block on network I/O
    let url = config.database_url.clone();
    let database = tokio::task::spawn_blocking(move || {
        let database = Database::new(&url)?;
        database.test_connection()?;
        database.ensure_table()?;
        Ok::<_, msgrelay::SinkError>(database)
    })
    .await??;

    tracing::info!("Connected to database");
    Ok(Arc::new(database))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}
