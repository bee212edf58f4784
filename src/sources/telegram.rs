//! Telegram transports for [`ChannelAdapter`](super::ChannelAdapter).
//!
//! | Transport | Reads | Notes |
//! |-----------|-------|-------|
//! | [`WebPreviewTransport`] | `https://t.me/s/<channel>?before=<id>` | public channels only, ~20 posts per page |
//! | [`ExportTransport`] | Telegram Desktop `result.json` | any channel the user could export |

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::channel::{ChannelMessage, ChannelTransport, HistoryPage};
use crate::error::{HarvestError, SourceError};
use crate::transport::HttpFetch;
use crate::utils::{collapse_whitespace, plain_text};

/// Messages served per call by [`ExportTransport`].
pub const EXPORT_CHUNK: usize = 100;

/// Scrapes the public web preview of a channel.
pub struct WebPreviewTransport {
    http: Arc<dyn HttpFetch>,
    base: String,
}

impl WebPreviewTransport {
    pub fn new(http: Arc<dyn HttpFetch>) -> Self {
        Self {
            http,
            base: "https://t.me/s".to_string(),
        }
    }

    fn page_url(&self, channel: &str, before: Option<i64>) -> String {
        match before {
            Some(id) => format!("{}/{channel}?before={id}", self.base),
            None => format!("{}/{channel}", self.base),
        }
    }
}

#[async_trait]
impl ChannelTransport for WebPreviewTransport {
    #[instrument(level = "debug", skip(self))]
    async fn history(&self, channel: &str, before: Option<i64>) -> Result<HistoryPage, SourceError> {
        let url = self.page_url(channel, before);
        let html = self.http.get_text(&url).await?;
        let preview = parse_preview(&html, channel);
        if before.is_none() && preview.messages.is_empty() && !preview.is_channel {
            return Err(SourceError::unavailable(format!(
                "no public preview for {channel}; the channel may be private or not exist"
            )));
        }
        debug!(%url, messages = preview.messages.len(), "Preview page parsed");
        Ok(HistoryPage {
            title: preview.title,
            messages: preview.messages,
        })
    }
}

#[derive(Debug, Default)]
struct Preview {
    title: Option<String>,
    is_channel: bool,
    messages: Vec<ChannelMessage>,
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn first_text(scope: ElementRef<'_>, sel: &Option<Selector>) -> Option<String> {
    let sel = sel.as_ref()?;
    scope
        .select(sel)
        .next()
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|s| !s.is_empty())
}

/// Messages come back oldest first on the page; they are returned newest first.
fn parse_preview(html: &str, channel: &str) -> Preview {
    let doc = Html::parse_document(html);
    let info_sel = selector(".tgme_channel_info");
    let title_sel = selector(".tgme_channel_info_header_title");
    let message_sel = selector("div.tgme_widget_message[data-post]");
    let text_sel = selector(".tgme_widget_message_text");
    let time_sel = selector("time[datetime]");

    let root = doc.root_element();
    let is_channel = info_sel
        .as_ref()
        .is_some_and(|s| root.select(s).next().is_some());
    let title = first_text(root, &title_sel);

    let mut messages = Vec::new();
    if let Some(message_sel) = &message_sel {
        for el in root.select(message_sel) {
            let Some(id) = el
                .value()
                .attr("data-post")
                .and_then(|post| post.rsplit('/').next())
                .and_then(|id| id.parse::<i64>().ok())
            else {
                warn!(%channel, "Preview message without a numeric data-post");
                continue;
            };
            let text = text_sel
                .as_ref()
                .and_then(|s| el.select(s).next())
                .map(|t| plain_text(&t.inner_html()).trim().to_string())
                .unwrap_or_default();
            let date = time_sel
                .as_ref()
                .and_then(|s| el.select(s).next())
                .and_then(|t| t.value().attr("datetime"))
                .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
                .map(|d| d.with_timezone(&Utc));
            messages.push(ChannelMessage { id, date, text });
        }
    }
    messages.sort_by(|a, b| b.id.cmp(&a.id));
    Preview {
        title,
        is_channel,
        messages,
    }
}

/// Serves history from a Telegram Desktop JSON export.
#[derive(Debug)]
pub struct ExportTransport {
    title: Option<String>,
    /// Newest first.
    messages: Vec<ChannelMessage>,
}

#[derive(Debug, Deserialize)]
struct ExportFile {
    name: Option<String>,
    #[serde(default)]
    messages: Vec<ExportMessage>,
}

#[derive(Debug, Deserialize)]
struct ExportMessage {
    id: i64,
    #[serde(rename = "type", default)]
    kind: String,
    date: Option<String>,
    date_unixtime: Option<String>,
    #[serde(default)]
    text: ExportText,
}

/// `text` is either a string or a list of plain strings and styled segments.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExportText {
    Plain(String),
    Segments(Vec<ExportSegment>),
}

impl Default for ExportText {
    fn default() -> Self {
        ExportText::Plain(String::new())
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExportSegment {
    Plain(String),
    Styled { text: String },
}

impl ExportText {
    fn flatten(self) -> String {
        match self {
            ExportText::Plain(s) => s,
            ExportText::Segments(parts) => parts
                .into_iter()
                .map(|p| match p {
                    ExportSegment::Plain(s) => s,
                    ExportSegment::Styled { text } => text,
                })
                .collect(),
        }
    }
}

impl ExportMessage {
    /// `date_unixtime` when present. The bare `date` is the exporter's wall
    /// clock with no offset; it is read in this host's local zone, which is
    /// only right when the export was made on a machine in the same zone.
    fn date(&self) -> Option<DateTime<Utc>> {
        self.date_unixtime
            .as_deref()
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .or_else(|| {
                self.date
                    .as_deref()
                    .and_then(|d| NaiveDateTime::parse_from_str(d, "%Y-%m-%dT%H:%M:%S").ok())
                    .and_then(|d| Local.from_local_datetime(&d).earliest())
                    .map(|d| d.with_timezone(&Utc))
            })
    }
}

impl ExportTransport {
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, HarvestError> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await.map_err(|e| {
            HarvestError::config(format!(
                "cannot read channel export {}: {e}",
                path.as_ref().display()
            ))
        })?;
        let transport = Self::from_json(&raw)?;
        info!(messages = transport.messages.len(), "Export loaded");
        Ok(transport)
    }

    pub fn from_json(raw: &str) -> Result<Self, HarvestError> {
        let file: ExportFile = serde_json::from_str(raw)
            .map_err(|e| HarvestError::config(format!("invalid channel export: {e}")))?;
        let mut messages: Vec<ChannelMessage> = file
            .messages
            .into_iter()
            .filter(|m| m.kind.is_empty() || m.kind == "message")
            .map(|m| ChannelMessage {
                id: m.id,
                date: m.date(),
                text: m.text.flatten(),
            })
            .collect();
        messages.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(Self {
            title: file.name,
            messages,
        })
    }
}

#[async_trait]
impl ChannelTransport for ExportTransport {
    async fn history(&self, _channel: &str, before: Option<i64>) -> Result<HistoryPage, SourceError> {
        let messages = self
            .messages
            .iter()
            .filter(|m| before.is_none_or(|b| m.id < b))
            .take(EXPORT_CHUNK)
            .cloned()
            .collect();
        Ok(HistoryPage {
            title: self.title.clone(),
            messages,
        })
    }
}
