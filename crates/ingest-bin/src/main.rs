//! Operator CLI for the ingestion pipeline.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use ingest_pipeline::{
    ChannelNotifier, IngestionOrchestrator, MemoryStore, OrchestratorConfig, Resource,
    ResourceStore,
};
use ingest_score::ScoreRegistry;
use ingest_sniff::{detect_encoding, FormatSniffer};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ingest", version, about = "Classify, score and ingest catalog resources")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Detect the format and encoding of a local file.
    Sniff {
        path: PathBuf,
    },
    /// Compute the openness score of a local file.
    Score {
        path: PathBuf,
    },
    /// Run the full three-stage pipeline over a link or local path.
    Run {
        link: String,
        /// Resource title stored alongside the run.
        #[arg(long, default_value = "ad-hoc resource")]
        title: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    match Cli::parse().command {
        Command::Sniff { path } => sniff(&path),
        Command::Score { path } => score(&path),
        Command::Run { link, title } => run(link, title).await,
    }
}

fn sniff(path: &PathBuf) -> anyhow::Result<()> {
    let bytes = fs_err::read(path)?;
    let hint = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let format = FormatSniffer::new().sniff(&bytes, hint.as_deref())?;
    let encoding = detect_encoding(&bytes);
    println!(
        "{}",
        serde_json::json!({
            "format": format.extension(),
            "mimetype": format.mimetype(),
            "encoding": encoding.encoding.name().to_ascii_lowercase(),
            "encoding_confident": encoding.confident,
        })
    );
    Ok(())
}

fn score(path: &PathBuf) -> anyhow::Result<()> {
    let bytes = fs_err::read(path)?;
    let hint = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let format = FormatSniffer::new().sniff(&bytes, hint.as_deref())?;
    let score = ScoreRegistry::new().score_with_hint(&bytes, format, hint.as_deref());
    println!(
        "{}",
        serde_json::json!({
            "format": format.extension(),
            "openness_score": score,
        })
    );
    Ok(())
}

async fn run(link: String, title: String) -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    store.insert_resource(Resource::new(1, title, link)).await?;

    let (notifier, mut events) = ChannelNotifier::channel();
    let orchestrator = IngestionOrchestrator::new(
        Arc::clone(&store),
        Arc::new(notifier),
        OrchestratorConfig::default(),
    )?;

    let outcome = orchestrator.ingest(1).await;
    let resource = store.resource(1).await?;
    let file = store.file_record(1).await?;
    println!(
        "{}",
        serde_json::json!({
            "link_status": resource.link_status,
            "file_status": resource.file_status,
            "data_status": resource.data_status,
            "openness_score": resource.openness_score,
            "file": file,
            "notified": events.try_recv().is_ok(),
        })
    );
    outcome?;
    Ok(())
}
