//! `quickwit-log` management tool.
//!
//! Checks the Quickwit and MinIO endpoints, creates log indexes, pushes
//! local log files into Quickwit or object storage and runs searches.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;

use quickwit_log::client::{CommitMode, IndexStatus, QuickwitClient, SearchRequest};
use quickwit_log::config::QuickwitConfig;
use quickwit_log::index_config::index_config_for;
use quickwit_log::logger::{LogInput, QuickwitLogger};

/// Ship application logs to Quickwit and MinIO.
#[derive(Parser, Debug)]
#[command(name = "quickwit-log")]
#[command(version, about, long_about = None)]
struct Cli {
    /// JSON configuration file. Environment variables are used otherwise.
    #[arg(short, long, env = "QUICKWIT_LOG_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check that Quickwit and MinIO are reachable.
    HealthCheck(HealthCheckArgs),

    /// Create the log index of an application.
    CreateIndexes(CreateIndexesArgs),

    /// Upload, send or inspect local log files.
    Sync(SyncArgs),

    /// Search the log index of an application.
    Search(SearchArgs),
}

#[derive(Args, Debug)]
struct HealthCheckArgs {
    /// Only check Quickwit.
    #[arg(long, conflicts_with = "minio_only")]
    quickwit_only: bool,

    /// Only check MinIO.
    #[arg(long)]
    minio_only: bool,

    /// List indexes and recent objects as well.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Args, Debug)]
struct CreateIndexesArgs {
    /// Application whose index is created. Defaults to the configured app.
    #[arg(long)]
    app_name: Option<String>,

    /// Delete and recreate the index if it already exists.
    #[arg(long)]
    force: bool,

    /// Print the index configuration without creating anything.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args, Debug)]
struct SyncArgs {
    /// Directory holding the log files. Defaults to the configured one.
    #[arg(long)]
    logs_dir: Option<PathBuf>,

    #[arg(long)]
    app_name: Option<String>,

    /// Show what would be done without doing it.
    #[arg(long)]
    dry_run: bool,

    /// Send one JSON log entry to Quickwit.
    #[arg(long, value_name = "JSON")]
    send_log: Option<String>,

    /// Send a JSON array of log entries to Quickwit.
    #[arg(long, value_name = "PATH")]
    send_logs_file: Option<PathBuf>,

    /// Send every entry of a log file to Quickwit.
    #[arg(long, value_name = "PATH")]
    sync_file: Option<PathBuf>,

    /// Parse a log file and print the first entries.
    #[arg(long, value_name = "PATH")]
    parse_file: Option<PathBuf>,

    /// Print logger statistics.
    #[arg(long)]
    stats: bool,
}

#[derive(Args, Debug)]
struct SearchArgs {
    /// Quickwit query string.
    query: String,

    #[arg(long)]
    app_name: Option<String>,

    #[arg(long, default_value_t = 20)]
    max_hits: u64,
}

const PARSE_PREVIEW: usize = 5;
const RECENT_OBJECTS: usize = 5;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::HealthCheck(args) => health_check(&config, &args).await,
        Commands::CreateIndexes(args) => create_indexes(&config, &args).await,
        Commands::Sync(args) => sync(config, args).await,
        Commands::Search(args) => search(&config, &args).await,
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<QuickwitConfig> {
    let config = match path {
        Some(path) => QuickwitConfig::from_json_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => QuickwitConfig::from_env().context("reading configuration from the environment")?,
    };
    config.validate()?;
    Ok(config)
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn health_check(config: &QuickwitConfig, args: &HealthCheckArgs) -> Result<()> {
    let mut healthy = true;

    if !args.minio_only {
        let client = QuickwitClient::new(config)?;
        if client.health_check().await {
            println!("Quickwit: OK ({})", client.server_url());
            if args.verbose {
                print_indexes(&client).await;
            }
        } else {
            println!("Quickwit: UNREACHABLE ({})", client.server_url());
            healthy = false;
        }
    }

    if !args.quickwit_only {
        healthy &= check_minio(config, args.verbose).await;
    }

    if !healthy {
        bail!("health check failed");
    }
    Ok(())
}

async fn print_indexes(client: &QuickwitClient) {
    match client.list_indexes().await {
        Ok(indexes) => {
            println!("  {} index(es)", indexes.len());
            for index in &indexes {
                let Some(id) = index
                    .pointer("/index_config/index_id")
                    .or_else(|| index.get("index_id"))
                    .and_then(Value::as_str)
                else {
                    continue;
                };
                let docs = match client.get_index_stats(id).await {
                    Ok(stats) => stats
                        .get("num_published_docs")
                        .or_else(|| stats.get("num_docs"))
                        .and_then(Value::as_u64)
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| "?".into()),
                    Err(_) => "?".into(),
                };
                println!("  - {id}: {docs} docs");
            }
        }
        Err(e) => println!("  could not list indexes: {e}"),
    }
}

#[cfg(feature = "minio")]
async fn check_minio(config: &QuickwitConfig, verbose: bool) -> bool {
    use quickwit_log::storage::MinioStorage;

    let storage = match MinioStorage::connect(&config.minio).await {
        Ok(storage) => storage,
        Err(e) => {
            println!("MinIO: UNREACHABLE ({e})");
            return false;
        }
    };
    if !storage.health_check().await {
        println!("MinIO: UNREACHABLE ({})", storage.endpoint());
        return false;
    }

    println!("MinIO: OK ({}, bucket {})", storage.endpoint(), storage.bucket());
    if verbose {
        let mut objects = storage.list_objects("logs/").await;
        objects.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        println!("  {} object(s) under logs/", objects.len());
        for object in objects.iter().take(RECENT_OBJECTS) {
            println!("  - {} ({} bytes, {})", object.name, object.size, object.last_modified);
        }
    }
    true
}

#[cfg(not(feature = "minio"))]
async fn check_minio(_config: &QuickwitConfig, _verbose: bool) -> bool {
    println!("MinIO: skipped (built without the `minio` feature)");
    true
}

async fn create_indexes(config: &QuickwitConfig, args: &CreateIndexesArgs) -> Result<()> {
    let app_name = args.app_name.as_deref().unwrap_or(&config.app_name);
    let index_id = config.index_id_for(app_name);

    if args.dry_run {
        println!("Would create index {index_id} with:");
        return print_json(&index_config_for(&index_id, config.index_config.as_ref()));
    }

    let client = QuickwitClient::new(config)?;
    if args.force && client.index_exists(&index_id).await? {
        client
            .delete_index(&index_id)
            .await
            .with_context(|| format!("deleting index {index_id}"))?;
        println!("Deleted index {index_id}");
    }

    match client
        .create_log_index(app_name)
        .await
        .with_context(|| format!("creating index {index_id}"))?
    {
        IndexStatus::Created => println!("Created index {index_id}"),
        IndexStatus::Existing => println!("Index {index_id} already exists (use --force to recreate)"),
    }
    Ok(())
}

async fn sync(config: QuickwitConfig, args: SyncArgs) -> Result<()> {
    let logs_dir = args.logs_dir.clone().unwrap_or_else(|| config.logs_dir.clone());
    let logger = QuickwitLogger::connect(config, args.app_name.clone()).await?;

    if args.stats {
        return print_json(&logger.get_stats().await);
    }

    if let Some(path) = &args.parse_file {
        let entries = logger.parse_log_file(path);
        println!("Parsed {} entries from {}", entries.len(), path.display());
        for entry in entries.iter().take(PARSE_PREVIEW) {
            println!("{}", serde_json::to_string(entry)?);
        }
        return Ok(());
    }

    if let Some(raw) = args.send_log {
        if args.dry_run {
            println!("Would send to {}: {raw}", logger.index_id());
            return Ok(());
        }
        if !logger.send_log(raw, CommitMode::Auto).await {
            bail!("failed to send log entry to {}", logger.index_id());
        }
        println!("Sent 1 entry to {}", logger.index_id());
        return Ok(());
    }

    if let Some(path) = &args.send_logs_file {
        let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let entries: Vec<Value> =
            serde_json::from_str(&raw).with_context(|| format!("{} is not a JSON array", path.display()))?;
        if args.dry_run {
            println!("Would send {} entries to {}", entries.len(), logger.index_id());
            return Ok(());
        }
        let count = entries.len();
        let inputs = entries.into_iter().map(LogInput::from).collect();
        if !logger.send_logs_batch(inputs, CommitMode::Auto).await {
            bail!("failed to send {count} entries to {}", logger.index_id());
        }
        println!("Sent {count} entries to {}", logger.index_id());
        return Ok(());
    }

    if let Some(path) = &args.sync_file {
        if args.dry_run {
            let entries = logger.parse_log_file(path);
            println!("Would send {} entries from {} to {}", entries.len(), path.display(), logger.index_id());
            return Ok(());
        }
        let report = logger.sync_log_file(path, CommitMode::Auto).await;
        print_json(&report)?;
        if !report.success {
            bail!("sync of {} failed", path.display());
        }
        return Ok(());
    }

    if args.dry_run {
        let files = quickwit_log::daily_file::list_log_files(&logs_dir)
            .with_context(|| format!("listing {}", logs_dir.display()))?;
        println!("Would upload {} file(s) from {}", files.len(), logs_dir.display());
        for file in files {
            println!("  - {}", file.display());
        }
        return Ok(());
    }

    let report = logger.upload_logs_to_minio(Some(&logs_dir)).await;
    print_json(&report)?;
    if !report.success {
        bail!("upload of {} failed", logs_dir.display());
    }
    Ok(())
}

async fn search(config: &QuickwitConfig, args: &SearchArgs) -> Result<()> {
    let app_name = args.app_name.as_deref().unwrap_or(&config.app_name);
    let index_id = config.index_id_for(app_name);
    let client = QuickwitClient::new(config)?;

    let mut request = SearchRequest::new(&args.query);
    request.max_hits = Some(args.max_hits);
    let response = client
        .search(&index_id, &request)
        .await
        .with_context(|| format!("searching {index_id}"))?;

    println!(
        "{} hit(s) in {} ({} µs)",
        response.num_hits, index_id, response.elapsed_time_micros
    );
    for hit in &response.hits {
        println!("{}", serde_json::to_string(hit)?);
    }
    Ok(())
}
