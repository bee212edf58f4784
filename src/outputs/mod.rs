//! Digest rendering and output files.
//!
//! [`render`] turns admitted items into a [`Digest`] in one of four formats:
//!
//! - [`html`]: standalone dark-themed page, one card per item
//! - [`text`]: plain text, one block per item
//! - [`json`]: machine-readable, pretty-printed
//! - [`csv`]: one row per item, plus one table per source under `sources/`
//!
//! Bodies are reduced to plain text and cut to the first few paragraphs
//! before rendering. Rendering never reads the clock, so the same input
//! always yields the same bytes.
//!
//! # Size cap
//!
//! With `max_bytes` set, the longest prefix of the ordered items whose
//! rendering fits is kept. The dropped tail is reported in the body and in
//! `Digest::omitted`; interior items are never dropped.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument, warn};

use crate::error::HarvestError;
use crate::keywords::KeywordSpec;
use crate::models::{Digest, DigestFormat, Item, ItemPayload, SourceReport};
use crate::utils::{ensure_writable_dir, excerpt_paragraphs, safe_filename};
use crate::window::HarvestWindow;

pub mod csv;
pub mod html;
pub mod json;
pub mod text;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Upper bound on the body size in bytes.
    pub max_bytes: Option<usize>,
    /// Paragraphs kept per item body; 0 keeps the whole body.
    pub excerpt_paragraphs: usize,
    /// Strip indentation and blank lines from HTML output.
    pub minify: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            max_bytes: None,
            excerpt_paragraphs: 2,
            minify: false,
        }
    }
}

/// Everything shown above the item list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestHeader {
    pub title: String,
    pub window: HarvestWindow,
    pub keywords: KeywordSpec,
    pub sources: Vec<SourceReport>,
}

/// One item prepared for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<'a> {
    pub item: &'a Item,
    /// `2025-08-26 10:00 UTC`, or `undated`.
    pub date: String,
    pub heading: String,
    pub paragraphs: Vec<String>,
}

impl<'a> Entry<'a> {
    fn new(item: &'a Item, paragraphs: usize) -> Self {
        let heading = match (&item.title, &item.raw_payload) {
            (Some(title), _) if !title.trim().is_empty() => title.trim().to_string(),
            (_, ItemPayload::ChannelPost { message_id, .. }) => format!("Post #{message_id}"),
            _ => item.external_id.clone(),
        };
        Self {
            item,
            date: format_date(item.published_at),
            heading,
            paragraphs: excerpt_paragraphs(&item.body, paragraphs),
        }
    }

    /// Link target when the item has an http(s) URL.
    pub fn link(&self) -> Option<&str> {
        self.item
            .url
            .as_deref()
            .filter(|u| u.starts_with("http://") || u.starts_with("https://"))
    }
}

pub fn format_date(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "undated".to_string())
}

/// What a format renderer sees.
#[derive(Debug)]
pub struct View<'a> {
    pub header: &'a DigestHeader,
    pub entries: &'a [Entry<'a>],
    /// Items admitted, rendered or not.
    pub total: usize,
    pub omitted: usize,
}

impl View<'_> {
    /// `2025-07-28 - 2025-08-26`, both days inclusive.
    pub fn period(&self) -> String {
        let (first, last) = self.header.window.display_dates();
        format!("{first} - {last}")
    }

    pub fn incomplete_sources(&self) -> impl Iterator<Item = &SourceReport> {
        self.header.sources.iter().filter(|s| s.status.reason().is_some())
    }

    pub fn omitted_notice(&self) -> Option<String> {
        (self.omitted > 0).then(|| {
            format!(
                "{} more item{} omitted to respect the size limit",
                self.omitted,
                if self.omitted == 1 { "" } else { "s" }
            )
        })
    }
}

fn render_view(format: DigestFormat, view: &View<'_>, options: &RenderOptions) -> String {
    match format {
        DigestFormat::Html => {
            let body = html::render(view);
            if options.minify { html::minify(&body) } else { body }
        }
        DigestFormat::Text => text::render(view),
        DigestFormat::Json => json::render(view),
        DigestFormat::Csv => csv::render(view),
    }
}

/// Render `items` as a digest. Items are ordered by publish time (undated
/// last), ties broken by source then external id.
#[instrument(level = "info", skip_all, fields(format = ?format, items = items.len()))]
pub fn render(
    mut items: Vec<Item>,
    format: DigestFormat,
    header: DigestHeader,
    options: &RenderOptions,
) -> Digest {
    items.sort_by(Item::digest_order);
    let entries: Vec<Entry<'_>> = items
        .iter()
        .map(|item| Entry::new(item, options.excerpt_paragraphs))
        .collect();
    let total = entries.len();

    let render_prefix = |kept: usize| {
        let view = View {
            header: &header,
            entries: &entries[..kept],
            total,
            omitted: total - kept,
        };
        render_view(format, &view, options)
    };

    let mut kept = total;
    let mut body = render_prefix(kept);
    if let Some(max) = options.max_bytes {
        if body.len() > max {
            // Largest prefix that fits; the body grows with every extra item.
            let (mut lo, mut hi) = (0usize, total);
            while lo + 1 < hi {
                let mid = (lo + hi) / 2;
                if render_prefix(mid).len() <= max {
                    lo = mid;
                } else {
                    hi = mid;
                }
            }
            kept = lo;
            body = render_prefix(kept);
            if body.len() > max {
                warn!(max_bytes = max, bytes = body.len(), "Header alone exceeds the size limit");
            }
            info!(kept, omitted = total - kept, "Digest truncated");
        }
    }
    let parts = match format {
        DigestFormat::Csv => csv::split_by_source(&entries[..kept]),
        _ => Vec::new(),
    };
    drop(entries);

    let omitted = total - kept;
    items.truncate(kept);
    Digest {
        title: header.title,
        format,
        window: header.window,
        keywords: header.keywords,
        items,
        omitted,
        truncated: omitted > 0,
        sources: header.sources,
        body,
        parts,
    }
}

/// `<stem>__<first day>_<last day>__<stamp>.<ext>`
pub fn digest_filename(digest: &Digest, stem: &str, stamp: NaiveDateTime) -> String {
    let (first, last) = digest.window.display_dates();
    format!(
        "{}__{}_{}__{}.{}",
        safe_filename(stem),
        first,
        last,
        stamp.format("%Y%m%d_%H%M%S"),
        digest.format.extension()
    )
}

/// Write the digest body into `dir`, creating it if needed. Per-source parts
/// go to `dir/sources/<source>.<ext>`, replacing the previous run's files.
#[instrument(level = "info", skip_all, fields(dir = %dir.as_ref().display(), %stem))]
pub async fn write_digest(
    digest: &Digest,
    dir: impl AsRef<Path>,
    stem: &str,
    stamp: NaiveDateTime,
) -> Result<PathBuf, HarvestError> {
    let dir = dir.as_ref();
    ensure_writable_dir(dir).await?;
    let path = dir.join(digest_filename(digest, stem, stamp));
    fs::write(&path, &digest.body).await?;
    info!(path = %path.display(), bytes = digest.body.len(), items = digest.items.len(), "Wrote digest");

    if !digest.parts.is_empty() {
        let parts_dir = dir.join("sources");
        ensure_writable_dir(&parts_dir).await?;
        for part in &digest.parts {
            let part_path = parts_dir.join(format!(
                "{}.{}",
                safe_filename(&part.name),
                digest.format.extension()
            ));
            fs::write(&part_path, &part.body).await?;
        }
        info!(dir = %parts_dir.display(), files = digest.parts.len(), "Wrote per-source files");
    }
    Ok(path)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::models::SourceStatus;
    use chrono::TimeZone;

    pub fn window() -> HarvestWindow {
        HarvestWindow::between(
            Utc.with_ymd_and_hms(2025, 7, 28, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 8, 27, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    pub fn item(source: &str, id: &str, day: u32, title: &str, body: &str) -> Item {
        Item {
            source_id: source.to_string(),
            external_id: id.to_string(),
            published_at: Some(Utc.with_ymd_and_hms(2025, 8, day, 10, 0, 0).unwrap()),
            title: Some(title.to_string()),
            body: body.to_string(),
            url: Some(format!("https://{source}/{id}")),
            raw_payload: ItemPayload::Feed {
                feed_url: format!("https://{source}/feed"),
            },
        }
    }

    pub fn header(sources: Vec<SourceReport>) -> DigestHeader {
        DigestHeader {
            title: "Fintech digest".to_string(),
            window: window(),
            keywords: KeywordSpec::new(["bank", "payments"]),
            sources,
        }
    }

    pub fn degraded(source: &str) -> SourceReport {
        let mut report = SourceReport::new(source);
        report.status = SourceStatus::Degraded {
            reason: "deadline reached".to_string(),
        };
        report
    }
}
