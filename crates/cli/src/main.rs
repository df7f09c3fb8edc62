use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use config::InsightConfig;
use insight_indexer::{ArchiveStore, CaptureLedger, CaptureOptions, ResourceDescriptor};
use insight_vector_store::SearchFilter;
use pipeline::{Pipeline, Processing};
use render::SearchResultView;
use serde::Serialize;
use std::path::PathBuf;

mod config;
mod manifest;
mod pipeline;
mod render;

#[derive(Parser)]
#[command(name = "insight")]
#[command(about = "Index captured browser JavaScript for semantic search", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Config file (default: ./insight.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Storage directory for archived scripts, the ledger and the index
    #[arg(long, global = true)]
    storage: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Archive, restore, chunk and index captured scripts
    Capture(CaptureArgs),

    /// Search indexed code with a natural-language query
    Search(SearchArgs),

    /// Find indexed code that hashes, encrypts or signs data
    Crypto(CryptoArgs),

    /// Per-domain counts of captured files and chunks
    Status(OutputArgs),

    /// List captured files
    Files(FilesArgs),

    /// Print an archived script with line numbers
    Read(ReadArgs),

    /// Delete everything captured for a domain
    Purge(PurgeArgs),

    /// Serve the worker protocol on stdin/stdout
    #[command(hide = true)]
    Worker,
}

#[derive(Args)]
struct OutputArgs {
    /// Output JSON format
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct CaptureArgs {
    /// JSON list of {"url", "path", "mapPath"?, "mapUrl"?}
    #[arg(long, conflicts_with = "dir", required_unless_present = "dir")]
    manifest: Option<PathBuf>,

    /// Directory of saved scripts (sibling .map files are picked up)
    #[arg(long, requires = "base_url")]
    dir: Option<PathBuf>,

    /// URL the directory was served from
    #[arg(long)]
    base_url: Option<String>,

    /// Re-index scripts even when their content is already indexed
    #[arg(long)]
    force_refresh: bool,

    /// File every script under this domain instead of its URL host
    #[arg(long)]
    domain: Option<String>,

    /// Restore and chunk inside this process instead of a worker process
    #[arg(long)]
    in_process: bool,

    /// Never fetch source maps over the network
    #[arg(long)]
    offline: bool,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args)]
struct SearchArgs {
    /// Search query
    query: String,

    /// Only search this domain
    #[arg(long)]
    domain: Option<String>,

    /// Maximum number of results
    #[arg(long, short = 'n', default_value_t = 10)]
    limit: usize,

    /// Only return code recovered from source maps
    #[arg(long)]
    restored_only: bool,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args)]
struct CryptoArgs {
    /// Only scan this domain
    #[arg(long)]
    domain: Option<String>,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args)]
struct FilesArgs {
    /// Only list this domain
    #[arg(long)]
    domain: Option<String>,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args)]
struct ReadArgs {
    /// Captured URL to print
    #[arg(long, conflicts_with = "path", required_unless_present = "path")]
    url: Option<String>,

    /// Archived file to print
    #[arg(long)]
    path: Option<PathBuf>,

    /// First line (1-based)
    #[arg(long)]
    start: Option<usize>,

    /// Last line (inclusive)
    #[arg(long)]
    end: Option<usize>,
}

#[derive(Args)]
struct PurgeArgs {
    /// Domain to forget
    #[arg(long)]
    domain: String,

    #[command(flatten)]
    output: OutputArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Error);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let (config_path, storage) = (cli.config, cli.storage);
    let config = move || -> Result<InsightConfig> {
        Ok(InsightConfig::load(config_path.as_deref())?.with_storage_override(storage))
    };

    match cli.command {
        Commands::Worker => std::process::exit(insight_worker::worker_main()),
        Commands::Capture(args) => run_capture(args, &config()?).await,
        Commands::Search(args) => run_search(args, &config()?).await,
        Commands::Crypto(args) => run_crypto(args, &config()?).await,
        Commands::Status(args) => run_status(args, &config()?).await,
        Commands::Files(args) => run_files(args, &config()?).await,
        Commands::Read(args) => run_read(args, &config()?).await,
        Commands::Purge(args) => run_purge(args, &config()?).await,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_capture(args: CaptureArgs, config: &InsightConfig) -> Result<()> {
    let batch: Vec<ResourceDescriptor> = match (&args.manifest, &args.dir, &args.base_url) {
        (Some(manifest), _, _) => manifest::load_manifest(manifest)?,
        (None, Some(dir), Some(base_url)) => manifest::scan_directory(dir, base_url)?,
        _ => bail!("capture needs --manifest or --dir with --base-url"),
    };
    if batch.is_empty() {
        log::warn!("No scripts to capture");
    }

    let mut config = config.clone();
    if args.offline {
        config.pipeline.fetch_maps = false;
    }
    let processing = if args.in_process {
        Processing::InProcess
    } else {
        Processing::Worker
    };

    let pipeline = Pipeline::open(&config, processing).await?;
    let options = CaptureOptions {
        force_refresh: args.force_refresh,
        domain: args.domain,
    };
    let result = pipeline.orchestrator.capture(batch, options).await;
    pipeline.close().await;
    let report = result.context("Capture failed")?;

    if args.output.json {
        print_json(&report)?;
    } else {
        println!("{}", report.summary());
        for failure in &report.failures {
            eprintln!("  failed: {} ({:?}): {}", failure.url, failure.kind, failure.message);
        }
    }
    Ok(())
}

async fn run_search(args: SearchArgs, config: &InsightConfig) -> Result<()> {
    let pipeline = Pipeline::open(config, Processing::InProcess).await?;
    let filter = SearchFilter {
        domain: args.domain,
        restored_only: args.restored_only,
    };
    let hits = pipeline
        .orchestrator
        .search(&args.query, &filter, args.limit)
        .await
        .context("Search failed")?;
    let results = SearchResultView::from_hits(hits);

    if args.output.json {
        print_json(&results)
    } else {
        print!("{}", render::search_results(&args.query, &results));
        Ok(())
    }
}

async fn run_crypto(args: CryptoArgs, config: &InsightConfig) -> Result<()> {
    let pipeline = Pipeline::open(config, Processing::InProcess).await?;
    let scans = pipeline.orchestrator.scan_patterns(args.domain.as_deref()).await;
    if args.output.json {
        print_json(&scans)
    } else {
        print!("{}", render::pattern_scans(&scans));
        Ok(())
    }
}

async fn open_ledger(config: &InsightConfig) -> Result<CaptureLedger> {
    let path = config.pipeline().ledger_path();
    CaptureLedger::open(&path)
        .await
        .with_context(|| format!("Failed to open capture ledger {}", path.display()))
}

async fn run_status(args: OutputArgs, config: &InsightConfig) -> Result<()> {
    let summaries = open_ledger(config).await?.domains();
    if args.json {
        print_json(&summaries)
    } else {
        print!("{}", render::domains(&summaries));
        Ok(())
    }
}

async fn run_files(args: FilesArgs, config: &InsightConfig) -> Result<()> {
    let ledger = open_ledger(config).await?;
    let records: Vec<_> = ledger
        .files(args.domain.as_deref())
        .into_iter()
        .cloned()
        .collect();
    if args.output.json {
        print_json(&records)
    } else {
        print!("{}", render::files(&records));
        Ok(())
    }
}

async fn run_read(args: ReadArgs, config: &InsightConfig) -> Result<()> {
    let path = match (args.url, args.path) {
        (Some(url), _) => open_ledger(config)
            .await?
            .live_for_url(&url)
            .map(|record| record.archived_path.clone())
            .with_context(|| format!("{url} has not been captured"))?,
        (None, Some(path)) => path,
        (None, None) => bail!("read needs --url or --path"),
    };

    let archive = ArchiveStore::new(config.pipeline().storage_dir);
    let text = archive.read_numbered(&path, args.start, args.end).await?;
    print!("{text}");
    Ok(())
}

async fn run_purge(args: PurgeArgs, config: &InsightConfig) -> Result<()> {
    let pipeline = Pipeline::open(config, Processing::InProcess).await?;
    let report = pipeline.orchestrator.purge_domain(&args.domain).await?;
    if args.output.json {
        print_json(&report)
    } else {
        println!(
            "Purged {}: {} files, {} index entries",
            args.domain, report.records, report.index_entries
        );
        Ok(())
    }
}
