//! JSON digest for machine consumers.
//!
//! ```text
//! {
//!   "title": "...",
//!   "window": { "start": "...", "end": "..." },
//!   "keywords": { "terms": [...], "mode": "any", ... },
//!   "total": 12, "omitted": 0,
//!   "sources": [ { "source_id": "...", "status": "complete", ... } ],
//!   "items": [ { "source_id": "...", "external_id": "...", "excerpt": [...] } ]
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::error;

use super::View;
use crate::keywords::KeywordSpec;
use crate::models::SourceReport;
use crate::window::HarvestWindow;

#[derive(Debug, Serialize)]
struct JsonDigest<'a> {
    title: &'a str,
    window: &'a HarvestWindow,
    keywords: &'a KeywordSpec,
    total: usize,
    omitted: usize,
    sources: &'a [SourceReport],
    items: Vec<JsonItem<'a>>,
}

#[derive(Debug, Serialize)]
struct JsonItem<'a> {
    source_id: &'a str,
    external_id: &'a str,
    published_at: Option<DateTime<Utc>>,
    title: &'a str,
    url: Option<&'a str>,
    excerpt: &'a [String],
}

pub fn render(view: &View<'_>) -> String {
    let doc = JsonDigest {
        title: &view.header.title,
        window: &view.header.window,
        keywords: &view.header.keywords,
        total: view.total,
        omitted: view.omitted,
        sources: &view.header.sources,
        items: view
            .entries
            .iter()
            .map(|e| JsonItem {
                source_id: &e.item.source_id,
                external_id: &e.item.external_id,
                published_at: e.item.published_at,
                title: &e.heading,
                url: e.item.url.as_deref(),
                excerpt: &e.paragraphs,
            })
            .collect(),
    };
    match serde_json::to_string_pretty(&doc) {
        Ok(json) => json + "\n",
        Err(e) => {
            // Only plain strings and numbers go in; this is not expected.
            error!(error = %e, "Failed to serialize digest");
            String::new()
        }
    }
}
