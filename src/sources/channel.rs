//! Channel adapter: walks a channel's history from newest to oldest.
//!
//! The history itself comes from a [`ChannelTransport`]; see
//! [`super::telegram`] for the web preview and desktop export transports.
//! Paging stops at the first page reaching past the window start, after
//! `scan_limit` messages, or when the transport runs dry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info};

use super::{FetchContext, Page, SourceAdapter};
use crate::error::{HarvestError, MalformedItem, SourceError};
use crate::models::{ChannelSource, Item, ItemPayload};

static LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:t\.me/|@)([A-Za-z0-9_]{3,})/?$").unwrap());
static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]{3,}$").unwrap());

/// One post as returned by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    pub id: i64,
    pub date: Option<DateTime<Utc>>,
    pub text: String,
}

/// A batch of history, newest message first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryPage {
    /// Channel display title, when the transport knows it.
    pub title: Option<String>,
    pub messages: Vec<ChannelMessage>,
}

#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Messages strictly older than `before` (the newest ones when `None`).
    async fn history(&self, channel: &str, before: Option<i64>) -> Result<HistoryPage, SourceError>;
}

/// Accepts `@name`, `t.me/name`, `https://t.me/name/` or a bare `name`.
pub fn parse_channel_identifier(raw: &str) -> Result<String, HarvestError> {
    let raw = raw.trim();
    if let Some(caps) = LINK_RE.captures(raw) {
        return Ok(caps[1].to_string());
    }
    if NAME_RE.is_match(raw) {
        return Ok(raw.to_string());
    }
    Err(HarvestError::config(format!(
        "unrecognised channel {raw:?}; expected e.g. https://t.me/fintechfutures or @fintechfutures"
    )))
}

pub fn permalink(channel: &str, id: i64) -> String {
    format!("https://t.me/{channel}/{id}")
}

pub struct ChannelAdapter {
    source: ChannelSource,
    transport: Arc<dyn ChannelTransport>,
    title: Option<String>,
    before: Option<i64>,
    scanned: usize,
    done: bool,
}

impl ChannelAdapter {
    pub fn new(source: ChannelSource, transport: Arc<dyn ChannelTransport>) -> Self {
        Self {
            source,
            transport,
            title: None,
            before: None,
            scanned: 0,
            done: false,
        }
    }

    fn to_item(&self, msg: ChannelMessage) -> Result<Item, MalformedItem> {
        if msg.id <= 0 {
            return Err(MalformedItem::new(format!(
                "message without id in {}",
                self.source.channel
            )));
        }
        Ok(Item {
            source_id: self.source.channel.clone(),
            external_id: msg.id.to_string(),
            published_at: msg.date,
            title: None,
            body: msg.text,
            url: Some(permalink(&self.source.channel, msg.id)),
            raw_payload: ItemPayload::ChannelPost {
                channel: self.source.channel.clone(),
                message_id: msg.id,
            },
        })
    }
}

#[async_trait]
impl SourceAdapter for ChannelAdapter {
    fn source_id(&self) -> &str {
        &self.source.channel
    }

    fn label(&self) -> String {
        self.title
            .clone()
            .unwrap_or_else(|| self.source.channel.clone())
    }

    async fn next_page(&mut self, ctx: &FetchContext) -> Result<Option<Page>, SourceError> {
        if self.done || ctx.is_cancelled() {
            return Ok(None);
        }
        let page = self
            .transport
            .history(&self.source.channel, self.before)
            .await?;
        if self.title.is_none() {
            self.title = page.title.clone();
        }
        if page.messages.is_empty() {
            self.done = true;
            return Ok(None);
        }

        let budget = self.source.scan_limit.saturating_sub(self.scanned);
        let messages: Vec<ChannelMessage> = page.messages.into_iter().take(budget).collect();
        self.scanned += messages.len();
        self.before = messages.iter().map(|m| m.id).min();

        let reached_start = messages
            .iter()
            .filter_map(|m| m.date)
            .any(|d| d < ctx.window.start);
        if reached_start || self.scanned >= self.source.scan_limit {
            info!(
                channel = %self.source.channel,
                scanned = self.scanned,
                reached_start,
                "Channel scan finished"
            );
            self.done = true;
        }

        let entries: Vec<Result<Item, MalformedItem>> = messages
            .into_iter()
            .filter(|m| !m.text.trim().is_empty())
            .map(|m| self.to_item(m))
            .collect();
        debug!(channel = %self.source.channel, entries = entries.len(), before = ?self.before, "History page");
        Ok(Some(Page::new(entries)))
    }
}
