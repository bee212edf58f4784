//! Command-line interface.
//!
//! Two subcommands share the keyword and output flags:
//!
//! ```sh
//! # fintech preset, last 30 days, HTML file in ./output
//! harvest_digest sites --presets --keywords "payments, open banking"
//!
//! # explicit sites and dates, text on stdout
//! harvest_digest sites --sites https://www.finextra.com,https://techcrunch.com \
//!     --start 2025-07-01 --end 2025-08-27 --format text --stdout
//!
//! # one channel through its public web preview
//! harvest_digest channel https://t.me/fintechfutures --period "2025-07-01 2025-08-27"
//! ```
//!
//! `DEFAULT_DAYS`, `RESULTS_LIMIT`, `OUTPUT_DIR` and `HARVEST_USER_AGENT`
//! provide defaults; a `.env` file is honoured.

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use itertools::Itertools;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use crate::error::{HarvestError, Result};
use crate::keywords::{KeywordSpec, MatchMode};
use crate::models::{ChannelSource, DigestFormat, SiteSource, SourceConfig};
use crate::orchestrator::HarvestOptions;
use crate::outputs::RenderOptions;
use crate::presets::{DEFAULT_PRESET, apply_curated, preset_sites};
use crate::sources::SiteOptions;
use crate::sources::channel::parse_channel_identifier;
use crate::transport::{DEFAULT_USER_AGENT, HttpConfig};
use crate::window::{HarvestWindow, UndatedPolicy, parse_ymd};

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Debug-level logging (RUST_LOG still wins when set)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Harvest news sites through their RSS/Atom feeds, with sitemap fallback
    Sites(SitesArgs),
    /// Harvest posts from one Telegram channel
    Channel(ChannelArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SitesArgs {
    /// Comma-separated site URLs
    #[arg(long, value_delimiter = ',')]
    pub sites: Vec<String>,

    /// File with one site URL per line, or a YAML list of sources
    #[arg(long)]
    pub sites_file: Option<PathBuf>,

    /// Add a built-in site set and use curated feeds for known domains
    #[arg(long, num_args = 0..=1, default_missing_value = DEFAULT_PRESET)]
    pub presets: Option<String>,

    /// Look back this many days [default: DEFAULT_DAYS or 30]
    #[arg(long, conflicts_with = "start")]
    pub days: Option<u32>,

    /// Look-back used when neither --days nor --start is given
    #[arg(long, env = "DEFAULT_DAYS", default_value_t = 30, hide = true)]
    pub default_days: u32,

    /// First day (YYYY-MM-DD, UTC)
    #[arg(long)]
    pub start: Option<String>,

    /// Last day, inclusive (YYYY-MM-DD, UTC); defaults to today
    #[arg(long, requires = "start")]
    pub end: Option<String>,

    /// Feed pages to walk per feed (`?paged=N`)
    #[arg(long, default_value_t = 1)]
    pub feed_pages: u32,

    /// Pause between requests to one site
    #[arg(long, default_value_t = 600)]
    pub throttle_ms: u64,

    /// Do not fetch article pages for missing descriptions
    #[arg(long)]
    pub no_describe: bool,

    #[command(flatten)]
    pub keywords: KeywordArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ChannelArgs {
    /// Channel link or username: https://t.me/name, @name or name
    pub channel: String,

    /// Period as free text: "30", "2025-07-01 2025-08-27" or "2025-08-01"
    #[arg(long)]
    pub period: Option<String>,

    /// Look back this many days when no period is given
    #[arg(long, env = "DEFAULT_DAYS", default_value_t = 30)]
    pub days: u32,

    /// Read a Telegram Desktop JSON export instead of the web preview
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Maximum messages inspected
    #[arg(long, env = "RESULTS_LIMIT", default_value_t = 5000)]
    pub scan_limit: usize,

    #[command(flatten)]
    pub keywords: KeywordArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Args, Debug, Clone)]
pub struct KeywordArgs {
    /// Keywords separated by commas, semicolons or newlines; none matches everything
    #[arg(long, short)]
    pub keywords: Option<String>,

    /// Require every keyword instead of any
    #[arg(long)]
    pub all: bool,

    #[arg(long)]
    pub case_sensitive: bool,

    /// Match whole words only
    #[arg(long)]
    pub whole_word: bool,

    /// Keep items without a usable date
    #[arg(long)]
    pub accept_undated: bool,
}

#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    #[arg(long, value_enum, default_value_t = DigestFormat::Html)]
    pub format: DigestFormat,

    /// Cap the digest size; the newest items are dropped first
    #[arg(long)]
    pub max_bytes: Option<usize>,

    /// Paragraphs kept per item (0 keeps everything)
    #[arg(long, default_value_t = 2)]
    pub paragraphs: usize,

    /// Strip indentation and blank lines from HTML
    #[arg(long)]
    pub minify: bool,

    /// Stop fetching after this many seconds and render what was collected
    #[arg(long)]
    pub deadline_secs: Option<u64>,

    /// Stop a source after this many matching items
    #[arg(long)]
    pub max_items: Option<usize>,

    /// JSON file of already-seen items, loaded before and saved after the run
    #[arg(long)]
    pub seen_file: Option<PathBuf>,

    /// Digest title
    #[arg(long)]
    pub title: Option<String>,

    #[arg(long, env = "OUTPUT_DIR", default_value = "output")]
    pub output_dir: PathBuf,

    /// Print the digest instead of writing a file
    #[arg(long)]
    pub stdout: bool,

    #[arg(long, env = "HARVEST_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Skip TLS certificate verification
    #[arg(long)]
    pub insecure: bool,

    /// Extra PEM root certificate
    #[arg(long)]
    pub cafile: Option<PathBuf>,
}

impl KeywordArgs {
    pub fn spec(&self) -> KeywordSpec {
        let spec = KeywordSpec::parse(self.keywords.as_deref().unwrap_or(""), self.case_sensitive)
            .whole_word(self.whole_word);
        if self.all {
            spec.with_mode(MatchMode::All)
        } else {
            spec
        }
    }

    pub fn undated_policy(&self) -> UndatedPolicy {
        if self.accept_undated {
            UndatedPolicy::Include
        } else {
            UndatedPolicy::Exclude
        }
    }
}

impl OutputArgs {
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            max_bytes: self.max_bytes,
            excerpt_paragraphs: self.paragraphs,
            minify: self.minify,
        }
    }

    pub fn harvest_options(&self, keywords: &KeywordArgs) -> HarvestOptions {
        HarvestOptions {
            deadline: self.deadline_secs.map(Duration::from_secs),
            max_items_per_source: self.max_items,
            undated: keywords.undated_policy(),
            render: self.render_options(),
            title: self.title.clone(),
            ..HarvestOptions::default()
        }
    }

    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            user_agent: self.user_agent.clone(),
            insecure: self.insecure,
            ca_file: self.cafile.clone(),
            ..HttpConfig::default()
        }
    }
}

impl SitesArgs {
    pub fn window(&self, now: DateTime<Utc>) -> Result<HarvestWindow> {
        match &self.start {
            Some(start) => {
                let start = parse_ymd(start)?;
                let end = match &self.end {
                    Some(end) => parse_ymd(end)?,
                    None => now.date_naive(),
                };
                HarvestWindow::from_dates(start, end)
            }
            None => HarvestWindow::last_days(self.days.unwrap_or(self.default_days), now),
        }
    }

    pub fn site_options(&self) -> SiteOptions {
        SiteOptions {
            throttle: Duration::from_millis(self.throttle_ms),
            describe_missing: !self.no_describe,
            ..SiteOptions::default()
        }
    }

    /// Sources from `--sites`, `--sites-file` and `--presets`, in that order,
    /// without repeats.
    #[instrument(level = "info", skip_all)]
    pub async fn source_configs(&self) -> Result<Vec<SourceConfig>> {
        let mut configs = Vec::new();
        for raw in &self.sites {
            configs.push(SourceConfig::Site(self.site(raw)?));
        }
        if let Some(path) = &self.sites_file {
            configs.extend(self.read_sites_file(path).await?);
        }
        if let Some(name) = &self.presets {
            for url in preset_sites(name)? {
                configs.push(SourceConfig::Site(self.site(url)?));
            }
            for config in configs.iter_mut() {
                if let SourceConfig::Site(site) = config {
                    apply_curated(site);
                }
            }
        }
        let configs: Vec<SourceConfig> = configs.into_iter().unique_by(|c| c.source_id()).collect();
        if configs.is_empty() {
            return Err(HarvestError::config(
                "no sites given; use --sites, --sites-file or --presets",
            ));
        }
        debug!(sources = configs.len(), "Sources resolved");
        Ok(configs)
    }

    fn site(&self, raw: &str) -> Result<SiteSource> {
        let mut site = SiteSource::new(normalize_site_url(raw)?);
        site.feed_pages = self.feed_pages.max(1);
        Ok(site)
    }

    async fn read_sites_file(&self, path: &Path) -> Result<Vec<SourceConfig>> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            HarvestError::config(format!("cannot read sources file {}: {e}", path.display()))
        })?;
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
        if is_yaml {
            let configs: Vec<SourceConfig> = serde_yaml::from_str(&raw).map_err(|e| {
                HarvestError::config(format!("invalid sources file {}: {e}", path.display()))
            })?;
            return configs
                .into_iter()
                .map(|config| match config {
                    SourceConfig::Site(mut site) => {
                        site.url = normalize_site_url(&site.url)?;
                        Ok(SourceConfig::Site(site))
                    }
                    SourceConfig::Channel(mut channel) => {
                        channel.channel = parse_channel_identifier(&channel.channel)?;
                        Ok(SourceConfig::Channel(channel))
                    }
                })
                .collect();
        }
        raw.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(|l| self.site(l).map(SourceConfig::Site))
            .collect()
    }
}

impl ChannelArgs {
    pub fn window(&self, now: DateTime<Utc>) -> Result<HarvestWindow> {
        match &self.period {
            Some(text) => HarvestWindow::parse_period(text, now, self.days),
            None => HarvestWindow::last_days(self.days, now),
        }
    }

    pub fn source(&self) -> Result<ChannelSource> {
        Ok(ChannelSource {
            channel: parse_channel_identifier(&self.channel)?,
            scan_limit: self.scan_limit,
        })
    }
}

/// `example.com` -> `https://example.com`; anything else must be an http(s) URL.
pub fn normalize_site_url(raw: &str) -> Result<String> {
    let raw = raw.trim();
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    match Url::parse(&candidate) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => {
            Ok(candidate.trim_end_matches('/').to_string())
        }
        _ => Err(HarvestError::config(format!("invalid site URL {raw:?}"))),
    }
}
