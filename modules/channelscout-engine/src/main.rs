use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use channelscout_common::events::LogSink;
use channelscout_common::{Config, EngineConfig, RunReport};
use channelscout_engine::clients::{BraveSearcher, HttpPageFetcher, YoutubeChecker};
use channelscout_engine::limiter::RateLimiter;
use channelscout_engine::oracle::LlamaOracle;
use channelscout_engine::orchestrator::Orchestrator;
use channelscout_engine::regions::us_geography_filtered;
use oracle_client::Oracle;

#[derive(Parser, Debug)]
#[command(name = "channelscout", about = "Regional channel discovery runner")]
struct Args {
    /// Restrict the run to these regions (repeatable, case-insensitive).
    #[arg(long)]
    region: Vec<String>,

    /// Override the per-slot wave cap.
    #[arg(long)]
    wave_cap: Option<u32>,

    /// Resume from a report written by an earlier interrupted run.
    #[arg(long)]
    resume: Option<PathBuf>,

    /// Where to write the final run report.
    #[arg(long, default_value = "report.json")]
    out: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("channelscout=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = Config::from_env();
    let mut engine_config = EngineConfig::default();
    if let Some(cap) = args.wave_cap {
        engine_config.wave_cap = cap;
    }

    info!(oracle_url = config.oracle_url, "Channel scout starting");

    let prior = match &args.resume {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading resume report {}", path.display()))?;
            let report: RunReport =
                serde_json::from_str(&raw).context("parsing resume report")?;
            info!(path = %path.display(), "Resuming from prior report");
            Some(report)
        }
        None => None,
    };

    let limiter = Arc::new(RateLimiter::new(&engine_config));
    let searcher = Arc::new(BraveSearcher::new(Arc::clone(&limiter), &engine_config));
    let fetcher = Arc::new(HttpPageFetcher::new(Arc::clone(&limiter), &engine_config));
    let checker = Arc::new(YoutubeChecker::new(Arc::clone(&limiter), &engine_config));
    let oracle = Arc::new(LlamaOracle::new(
        Oracle::new(&config.oracle_url, &config.oracle_model),
        Arc::clone(&limiter),
    ));

    let orchestrator = Orchestrator::new(
        searcher,
        fetcher,
        checker,
        oracle,
        engine_config,
        Arc::new(LogSink),
    );

    // Ctrl-C stops between stages; in-flight slots stay unresolved and the
    // written report supports --resume.
    let stop = orchestrator.stop_signal();
    let limiter_for_signal = Arc::clone(&limiter);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Stop requested, finishing current stage");
            stop.stop();
            limiter_for_signal.shutdown().await;
        }
    });

    let regions = if args.region.is_empty() {
        None
    } else {
        Some(args.region.as_slice())
    };
    let mut geography = us_geography_filtered(regions);

    let report = orchestrator.run(&mut geography, prior.as_ref()).await?;

    let serialized = serde_json::to_string_pretty(&report)?;
    std::fs::write(&args.out, serialized)
        .with_context(|| format!("writing report to {}", args.out.display()))?;
    info!(summary = %report.summary(), out = %args.out.display(), "Report written");

    Ok(())
}
