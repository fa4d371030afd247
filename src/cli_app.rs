//! Command-line definition and dispatch for `qc-crawl`.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colored::control;
use tracing_subscriber::EnvFilter;

use qc_asset_crawler::core::config::{CliOverrides, RunConfig, SidecarMode};
use qc_asset_crawler::core::errors::{QcError, Result};
use qc_asset_crawler::crawler::engine::CrawlEngine;
use qc_asset_crawler::crawler::interrupt::InterruptFlag;
use qc_asset_crawler::sidecar::schema::QcResult;
use qc_asset_crawler::tracker::Tracker;
use qc_asset_crawler::tracker::http::HttpTracker;

/// QC marker for media on shared storage: walks roots, fingerprints singles
/// and image sequences, and records QC state in JSON sidecars.
#[derive(Debug, Parser)]
#[command(
    name = "qc-crawl",
    version,
    about = "QC asset crawler for media on shared storage",
    long_about = None
)]
pub struct Cli {
    /// Root path(s) to crawl.
    #[arg(value_name = "ROOT", required = true)]
    roots: Vec<PathBuf>,

    /// Hashing worker threads (default: CPU count).
    #[arg(long, value_name = "N")]
    workers: Option<usize>,

    /// Logging level or filter directive (default: LOG_LEVEL env, then info).
    #[arg(long, value_name = "LEVEL")]
    log: Option<String>,

    /// Minimum files to treat as a sequence.
    #[arg(long, value_name = "N")]
    min_seq: Option<usize>,

    /// Where sidecars are written: inline, dot, or subdir (.qc/).
    #[arg(long, value_name = "MODE", value_parser = parse_mode)]
    sidecar_mode: Option<SidecarMode>,

    /// Operator name recorded in sidecars (default: $USER).
    #[arg(long, value_name = "NAME")]
    operator: Option<String>,

    /// Record an operator verdict for all processed assets.
    #[arg(long, value_name = "RESULT", value_parser = parse_result)]
    result: Option<QcResult>,

    /// Operator note stored in the sidecar.
    #[arg(long, value_name = "TEXT")]
    note: Option<String>,

    /// Tracker asset id; repeatable, positionally paired with ROOTs (the
    /// last value covers remaining roots).
    #[arg(long = "asset-id", value_name = "ID")]
    asset_ids: Vec<String>,

    /// Enable tracker integration (requires a tracker URL).
    #[arg(long)]
    trak: bool,

    /// Tracker base URL (default: TRAK_BASE_URL env).
    #[arg(long, value_name = "URL")]
    trak_url: Option<String>,

    /// Tracker bearer token (default: TRAK_ASSET_TRACKER_API_KEY env).
    #[arg(long, value_name = "TOKEN")]
    trak_token: Option<String>,

    /// Disable colored output.
    #[arg(long)]
    no_color: bool,
}

fn parse_mode(raw: &str) -> Result<SidecarMode> {
    raw.parse()
}

fn parse_result(raw: &str) -> Result<QcResult> {
    raw.parse()
}

/// Resolve config, run the crawl, print the summary. Errors map to exit
/// codes in `main`: fatal configuration -> 1, interrupt -> 2.
pub fn run(cli: &Cli) -> Result<()> {
    if cli.no_color || !std::io::stdout().is_terminal() {
        control::set_override(false);
    }
    init_logging(cli.log.as_deref());

    let cfg = RunConfig::resolve(CliOverrides {
        roots: cli.roots.clone(),
        asset_ids: cli.asset_ids.clone(),
        workers: cli.workers,
        min_seq: cli.min_seq,
        sidecar_mode: cli.sidecar_mode,
        result: cli.result,
        operator: cli.operator.clone(),
        note: cli.note.clone(),
        tracker_enabled: cli.trak,
        tracker_url: cli.trak_url.clone(),
        tracker_token: cli.trak_token.clone(),
    })?;

    let tracker: Option<Arc<dyn Tracker>> = cfg
        .tracker
        .as_ref()
        .map(|settings| Arc::new(HttpTracker::new(settings)) as Arc<dyn Tracker>);

    let interrupt = InterruptFlag::registered();
    let engine = CrawlEngine::new(cfg, tracker, interrupt);

    match engine.run() {
        Ok(summary) => {
            print!("{}", summary.render());
            Ok(())
        }
        Err(QcError::Interrupted) => {
            // Completed directories are already persisted; report what ran.
            let summary = engine.summary();
            eprintln!("qc-crawl: interrupted, draining workers");
            print!("{}", summary.render());
            Err(QcError::Interrupted)
        }
        Err(other) => Err(other),
    }
}

/// Logging filter precedence: --log, then LOG_LEVEL, then info.
fn init_logging(cli_level: Option<&str>) {
    let directive = cli_level
        .map(str::to_string)
        .or_else(|| std::env::var("LOG_LEVEL").ok())
        .unwrap_or_else(|| "info".to_string());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
