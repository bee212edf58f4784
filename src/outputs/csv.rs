//! CSV digest: one row per item.
//!
//! | File | Columns |
//! |------|---------|
//! | digest | `source,date_utc,title,link,description` |
//! | `sources/<source>.csv` | `date_utc,title,link,description` |
//!
//! A table has no room for the period line, the incomplete-source list or the
//! size-limit notice. Those stay on [`Digest`](crate::models::Digest) and in
//! the run log.

use chrono::SecondsFormat;
use std::collections::BTreeMap;
use tracing::error;

use super::{Entry, View};
use crate::models::DigestPart;

pub const COLUMNS: [&str; 5] = ["source", "date_utc", "title", "link", "description"];

fn date_utc(entry: &Entry<'_>) -> String {
    entry
        .item
        .published_at
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

fn table<'e, 'i: 'e>(
    with_source: bool,
    entries: impl IntoIterator<Item = &'e Entry<'i>>,
) -> Result<String, ::csv::Error> {
    let mut buf: Vec<u8> = Vec::new();
    {
        let mut wtr = ::csv::Writer::from_writer(&mut buf);
        let columns = if with_source { &COLUMNS[..] } else { &COLUMNS[1..] };
        wtr.write_record(columns)?;
        for entry in entries {
            let date = date_utc(entry);
            let link = entry.link().unwrap_or_default();
            let description = entry.paragraphs.join(" ");
            let row = [
                entry.item.source_id.as_str(),
                date.as_str(),
                entry.heading.as_str(),
                link,
                description.as_str(),
            ];
            let row = if with_source { &row[..] } else { &row[1..] };
            wtr.write_record(row)?;
        }
        wtr.flush()?;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

pub fn render(view: &View<'_>) -> String {
    table(true, view.entries).unwrap_or_else(|e| {
        error!(error = %e, "CSV rendering failed");
        String::new()
    })
}

/// One table per source, sources in id order, rows in digest order.
pub fn split_by_source(entries: &[Entry<'_>]) -> Vec<DigestPart> {
    let mut by_source: BTreeMap<&str, Vec<&Entry<'_>>> = BTreeMap::new();
    for entry in entries {
        by_source
            .entry(entry.item.source_id.as_str())
            .or_default()
            .push(entry);
    }
    by_source
        .into_iter()
        .filter_map(|(source, rows)| match table(false, rows) {
            Ok(body) => Some(DigestPart {
                name: source.to_string(),
                body,
            }),
            Err(e) => {
                error!(%source, error = %e, "CSV rendering failed");
                None
            }
        })
        .collect()
}
