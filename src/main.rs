//! # harvest_digest
//!
//! Command-line front end: resolves sources and the window from flags,
//! runs the harvest and writes the digest to `OUTPUT_DIR` (or stdout).
//!
//! ## Exit codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | digest produced, possibly with degraded or failed sources |
//! | 1 | every source failed, or an I/O error |
//! | 2 | invalid configuration or usage |

use chrono::{Local, Utc};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

use harvest_digest::cli::{Cli, Command, KeywordArgs, OutputArgs};
use harvest_digest::dedup::SeenSet;
use harvest_digest::error::{HarvestError, Result};
use harvest_digest::models::SourceConfig;
use harvest_digest::orchestrator::Harvester;
use harvest_digest::outputs::write_digest;
use harvest_digest::sources::telegram::ExportTransport;
use harvest_digest::sources::{ChannelTransport, Transports};
use harvest_digest::transport::{HttpFetch, ReqwestFetcher};
use harvest_digest::utils::ensure_writable_dir;
use harvest_digest::window::HarvestWindow;

#[tokio::main]
async fn main() -> ExitCode {
    // .env first so clap's `env` fallbacks see it.
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    // --- Tracing init ---
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    if let Ok(path) = dotenv {
        debug!(path = %path.display(), "Loaded .env");
    }

    let start_time = Instant::now();
    info!(version = env!("CARGO_PKG_VERSION"), "harvest_digest starting up");

    match run(cli).await {
        Ok(()) => {
            let elapsed = start_time.elapsed();
            info!(?elapsed, secs = elapsed.as_secs(), "Execution complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Harvest failed");
            eprintln!("error: {e}");
            if let HarvestError::AllSourcesFailed(reports) = &e {
                for report in reports {
                    eprintln!(
                        "  {}: {}",
                        report.label,
                        report.status.reason().unwrap_or("unknown")
                    );
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let now = Utc::now();
    match cli.command {
        Command::Sites(args) => {
            let window = args.window(now)?;
            let configs = args.source_configs().await?;
            info!(sources = configs.len(), start = %window.start, end = %window.end, "Harvesting sites");

            let http: Arc<dyn HttpFetch> = Arc::new(ReqwestFetcher::new(&args.output.http_config())?);
            // Source files may mix in channels; those go through the web preview.
            let transports = Transports::web(http).with_site_options(args.site_options());
            harvest(transports, &configs, window, &args.keywords, &args.output).await
        }
        Command::Channel(args) => {
            let window = args.window(now)?;
            let source = args.source()?;
            info!(channel = %source.channel, start = %window.start, end = %window.end, "Harvesting channel");

            let http: Arc<dyn HttpFetch> = Arc::new(ReqwestFetcher::new(&args.output.http_config())?);
            let transports = match &args.export {
                Some(path) => {
                    let export: Arc<dyn ChannelTransport> = Arc::new(ExportTransport::open(path).await?);
                    Transports::new(http).with_channel(export)
                }
                None => Transports::web(http),
            };
            let configs = [SourceConfig::Channel(source)];
            harvest(transports, &configs, window, &args.keywords, &args.output).await
        }
    }
}

#[instrument(level = "info", skip_all, fields(sources = configs.len()))]
async fn harvest(
    transports: Transports,
    configs: &[SourceConfig],
    window: HarvestWindow,
    keywords: &KeywordArgs,
    output: &OutputArgs,
) -> Result<()> {
    // Early check: fail before fetching anything if the digest cannot be written.
    if !output.stdout {
        if let Err(e) = ensure_writable_dir(&output.output_dir).await {
            error!(
                path = %output.output_dir.display(),
                error = %e,
                "Output directory is not writable (fix perms or choose a different path)"
            );
            return Err(e.into());
        }
    }

    let seen = match &output.seen_file {
        Some(path) => SeenSet::load(path).await?,
        None => SeenSet::new(),
    };
    let harvester =
        Harvester::new(transports, output.harvest_options(keywords)).with_seen(seen.clone());
    let digest = harvester
        .run(configs, window, &keywords.spec(), output.format)
        .await?;

    for source in digest.incomplete_sources() {
        warn!(
            source = %source.label,
            status = source.status.label(),
            reason = source.status.reason().unwrap_or_default(),
            "Source incomplete"
        );
    }
    if digest.truncated {
        warn!(omitted = digest.omitted, "Digest truncated to the size limit");
    }

    if let Some(path) = &output.seen_file {
        seen.save(path).await?;
    }

    if output.stdout {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(digest.body.as_bytes()).await?;
        stdout.flush().await?;
    } else {
        let path = write_digest(
            &digest,
            &output.output_dir,
            &digest.title,
            Local::now().naive_local(),
        )
        .await?;
        println!("{}", path.display());
    }
    info!(items = digest.items.len(), omitted = digest.omitted, "Digest ready");
    Ok(())
}
