//! Data models shared by the harvest pipeline.
//!
//! - [`Item`]: one harvested article or channel post
//! - [`SourceConfig`]: what to harvest, one value per upstream source
//! - [`SourceReport`]: per-source outcome and counters for one run
//! - [`Digest`]: the rendered result handed back to the caller
//!
//! The window and keyword types live in [`crate::window`] and
//! [`crate::keywords`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use url::Url;

use crate::keywords::KeywordSpec;
use crate::window::HarvestWindow;

/// One harvested unit.
///
/// `(source_id, external_id)` identifies an item within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Site domain or channel username.
    pub source_id: String,
    /// Source-native identifier: canonical article link, feed guid or message id.
    pub external_id: String,
    /// Source-reported publish time. `None` when missing or unparseable.
    pub published_at: Option<DateTime<Utc>>,
    pub title: Option<String>,
    /// Text of the item; may contain markup.
    pub body: String,
    pub url: Option<String>,
    pub raw_payload: ItemPayload,
}

/// Source-specific data retained for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemPayload {
    Feed { feed_url: String },
    Sitemap { sitemap_url: String },
    ChannelPost { channel: String, message_id: i64 },
}

impl Item {
    /// Text the keyword matcher runs against.
    pub fn searchable_text(&self) -> String {
        match &self.title {
            Some(title) => format!("{}\n{}", title, self.body),
            None => self.body.clone(),
        }
    }

    /// Total digest order: publish time, then source, then external id.
    /// Undated items sort after every dated one.
    pub fn digest_order(&self, other: &Self) -> Ordering {
        let key = |i: &Self| (i.published_at.is_none(), i.published_at);
        key(self)
            .cmp(&key(other))
            .then_with(|| self.source_id.cmp(&other.source_id))
            .then_with(|| self.external_id.cmp(&other.external_id))
    }
}

/// A site to harvest through its feeds (or sitemaps as a fallback).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteSource {
    /// Homepage URL, e.g. `https://www.finextra.com`.
    pub url: String,
    /// Feed URLs known up front (curated presets or user supplied).
    #[serde(default)]
    pub feeds: Vec<String>,
    /// Probe common feed paths and `<link rel="alternate">` tags.
    #[serde(default = "default_true")]
    pub discover: bool,
    /// Pages to walk per feed with `?paged=N`.
    #[serde(default = "default_feed_pages")]
    pub feed_pages: u32,
}

impl SiteSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            feeds: Vec::new(),
            discover: true,
            feed_pages: default_feed_pages(),
        }
    }
}

/// One channel to scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSource {
    /// Username without `@`.
    pub channel: String,
    /// Upper bound on messages inspected.
    #[serde(default = "default_scan_limit")]
    pub scan_limit: usize,
}

fn default_true() -> bool {
    true
}

fn default_feed_pages() -> u32 {
    1
}

fn default_scan_limit() -> usize {
    5000
}

/// Configuration for one upstream source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    Site(SiteSource),
    Channel(ChannelSource),
}

impl SourceConfig {
    /// Namespace for dedup keys and reports.
    pub fn source_id(&self) -> String {
        match self {
            SourceConfig::Site(site) => domain_of(&site.url),
            SourceConfig::Channel(channel) => channel.channel.clone(),
        }
    }
}

/// Host part of a URL, or the input unchanged when it does not parse.
pub fn domain_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

/// How a source ended up after the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
    Complete,
    /// Partially harvested: rate limit bound exceeded or deadline reached.
    Degraded { reason: String },
    /// Unavailable; anything admitted before the failure is kept.
    Failed { reason: String },
}

impl SourceStatus {
    pub fn label(&self) -> &'static str {
        match self {
            SourceStatus::Complete => "complete",
            SourceStatus::Degraded { .. } => "degraded",
            SourceStatus::Failed { .. } => "failed",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            SourceStatus::Complete => None,
            SourceStatus::Degraded { reason } | SourceStatus::Failed { reason } => Some(reason),
        }
    }
}

/// Outcome and diagnostics for one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReport {
    pub source_id: String,
    /// Human-readable name (channel title, site domain).
    pub label: String,
    /// Serialized inline as `"status"` plus `"reason"` when not complete.
    #[serde(flatten)]
    pub status: SourceStatus,
    pub pages: usize,
    pub fetched: usize,
    pub admitted: usize,
    pub out_of_window: usize,
    pub undated: usize,
    pub unmatched: usize,
    pub duplicates: usize,
    pub malformed: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl SourceReport {
    pub fn new(source_id: impl Into<String>) -> Self {
        let source_id = source_id.into();
        Self {
            label: source_id.clone(),
            source_id,
            status: SourceStatus::Complete,
            pages: 0,
            fetched: 0,
            admitted: 0,
            out_of_window: 0,
            undated: 0,
            unmatched: 0,
            duplicates: 0,
            malformed: 0,
            notes: Vec::new(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, SourceStatus::Failed { .. })
    }
}

/// Output format of a digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DigestFormat {
    Html,
    Text,
    Json,
    Csv,
}

impl DigestFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            DigestFormat::Html => "html",
            DigestFormat::Text => "txt",
            DigestFormat::Json => "json",
            DigestFormat::Csv => "csv",
        }
    }
}

/// The rendered result of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    pub title: String,
    pub format: DigestFormat,
    pub window: HarvestWindow,
    pub keywords: KeywordSpec,
    /// Items present in `body`, in digest order.
    pub items: Vec<Item>,
    /// Tail items dropped to respect the size cap.
    pub omitted: usize,
    pub truncated: bool,
    pub sources: Vec<SourceReport>,
    pub body: String,
    /// Per-source files written next to the digest (CSV only).
    pub parts: Vec<DigestPart>,
}

/// A secondary digest file covering one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestPart {
    /// Source id; becomes the file stem.
    pub name: String,
    pub body: String,
}

impl Digest {
    /// Sources that did not complete.
    pub fn incomplete_sources(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources
            .iter()
            .filter(|s| s.status != SourceStatus::Complete)
    }
}
