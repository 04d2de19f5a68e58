use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use glimpse::db;
use glimpse::ingest::{ConsoleProgress, Ingestor};
use glimpse::media::{ImageStore, MediaProcessor};
use glimpse::models::ModelPool;
use glimpse::platform::ExportArchive;
use glimpse::web::ImageServer;
use glimpse::{Config, Daemon};

/// Glimpse - reverse image search bot for Telegram channels
#[derive(Parser)]
#[command(name = "glimpse", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the bot, polling loop and image server (default)
    Run,
    /// Ingest a Telegram Desktop channel export
    Import {
        /// Export directory containing result.json
        dir: PathBuf,
        /// OCR results file ([{"name": ..., "text": ...}])
        #[arg(long)]
        ocr_result: Option<PathBuf>,
    },
    /// Serve stored images only
    Serve,
    /// Print the best matches for a text query
    Search {
        text: String,
        /// Maximum number of results
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "info,glimpse=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load()?;
    tracing::debug!(?config, "loaded configuration");

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            tracing::info!("starting glimpse");
            Daemon::new(config)?.run().await?;
        }
        Command::Import { dir, ocr_result } => import(config, dir, ocr_result).await?,
        Command::Serve => {
            ImageServer::new(config.images_dir(), config.server.host, config.server.port)
                .run()
                .await?;
        }
        Command::Search { text, limit } => search(&config, &text, limit).await?,
    }
    Ok(())
}

async fn import(config: Config, dir: PathBuf, ocr_result: Option<PathBuf>) -> anyhow::Result<()> {
    let pool = db::init(config.db_path())?;
    let models = Arc::new(ModelPool::from_config(&config.models)?);
    let processor = Arc::new(MediaProcessor::new(
        pool.clone(),
        ImageStore::new(config.images_dir()),
        models,
    ));

    let mut archive = ExportArchive::new(&dir);
    if let Some(path) = ocr_result {
        archive = archive.with_ocr_results(path);
    }

    let ingestor = Ingestor::new(pool, Arc::new(archive), processor, config.ingest);
    let summary = ingestor.run(".", Arc::new(ConsoleProgress)).await?;

    println!(
        "imported channel {}: {} queued, {} processed, {} failed, {} skipped",
        summary.channel_id, summary.queued, summary.processed, summary.failed, summary.skipped
    );
    Ok(())
}

async fn search(config: &Config, text: &str, limit: usize) -> anyhow::Result<()> {
    let pool = db::init(config.db_path())?;
    let models = ModelPool::from_config(&config.models)?;
    let vector = models.embed_text(text).await?;

    let conn = db::connect(&pool)?;
    let hits = db::image::search(
        &conn,
        text,
        vector.as_deref(),
        config.search.max_distance,
        limit,
        0,
    )?;

    if hits.is_empty() {
        println!("no matches");
        return Ok(());
    }
    for hit in hits {
        let source = db::channel::find_source(&conn, hit.id)?
            .map_or_else(|| "-".to_string(), |link| link.url());
        println!("{:>6}  {}  {source}", hit.id, hit.phash);
    }
    Ok(())
}
