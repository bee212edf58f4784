//! Source adapters: where items come from.
//!
//! Every upstream source is driven through the [`SourceAdapter`] trait, a
//! pull-based lazy sequence of pages. Adapters keep their own cursor; a call
//! that fails leaves the cursor untouched, so the orchestrator can retry the
//! same page after a rate limit.
//!
//! # Implementations
//!
//! | Adapter | Module | Upstream |
//! |---------|--------|----------|
//! | [`SiteAdapter`] | [`site`] | RSS/Atom feeds, sitemap fallback |
//! | [`ChannelAdapter`] | [`channel`] | Telegram channel history via a [`ChannelTransport`] |
//!
//! Adapters never apply the window themselves beyond stopping early once the
//! upstream order proves everything further is too old; the orchestrator's
//! window filter re-checks every item.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{MalformedItem, SourceError};
use crate::models::{Item, SourceConfig};
use crate::transport::HttpFetch;
use crate::window::HarvestWindow;

pub mod channel;
pub mod feed;
pub mod site;
pub mod telegram;

pub use channel::{ChannelAdapter, ChannelMessage, ChannelTransport, HistoryPage};
pub use site::{SiteAdapter, SiteOptions};

/// Per-run context passed into every adapter call.
#[derive(Debug, Clone)]
pub struct FetchContext {
    pub window: HarvestWindow,
    /// Fires on the run deadline. Adapters check it between requests.
    pub cancel: CancellationToken,
}

impl FetchContext {
    pub fn new(window: HarvestWindow, cancel: CancellationToken) -> Self {
        Self { window, cancel }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Sleep for `delay` unless cancelled first. Returns `false` when cancelled.
    pub async fn pause(&self, delay: Duration) -> bool {
        if delay.is_zero() {
            return !self.is_cancelled();
        }
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}

/// One upstream response worth of entries.
#[derive(Debug, Default)]
pub struct Page {
    pub entries: Vec<Result<Item, MalformedItem>>,
    /// Diagnostics worth surfacing in the source report.
    pub notes: Vec<String>,
}

impl Page {
    pub fn new(entries: Vec<Result<Item, MalformedItem>>) -> Self {
        Self {
            entries,
            notes: Vec::new(),
        }
    }
}

#[async_trait]
pub trait SourceAdapter: Send {
    /// Namespace for dedup keys.
    fn source_id(&self) -> &str;

    /// Display name; may improve once the first page is fetched.
    fn label(&self) -> String {
        self.source_id().to_string()
    }

    /// Why an exhausted adapter still missed part of its upstream, if it did.
    fn incomplete(&self) -> Option<String> {
        None
    }

    /// Next page in source-native order, or `None` once upstream is exhausted.
    async fn next_page(&mut self, ctx: &FetchContext) -> Result<Option<Page>, SourceError>;
}

/// Pre-built clients handed to adapters.
#[derive(Clone)]
pub struct Transports {
    pub http: Arc<dyn HttpFetch>,
    /// Required only when channel sources are configured.
    pub channel: Option<Arc<dyn ChannelTransport>>,
    pub site: SiteOptions,
}

impl Transports {
    pub fn new(http: Arc<dyn HttpFetch>) -> Self {
        Self {
            http,
            channel: None,
            site: SiteOptions::default(),
        }
    }

    /// Sites over `http`, channels through their public web preview.
    pub fn web(http: Arc<dyn HttpFetch>) -> Self {
        let preview = Arc::new(telegram::WebPreviewTransport::new(Arc::clone(&http)));
        Self::new(http).with_channel(preview)
    }

    pub fn with_channel(mut self, channel: Arc<dyn ChannelTransport>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_site_options(mut self, site: SiteOptions) -> Self {
        self.site = site;
        self
    }

    /// Build the adapter for one source.
    pub fn adapter_for(
        &self,
        config: &SourceConfig,
    ) -> Result<Box<dyn SourceAdapter>, crate::error::HarvestError> {
        match config {
            SourceConfig::Site(site) => Ok(Box::new(SiteAdapter::new(
                site.clone(),
                Arc::clone(&self.http),
                self.site.clone(),
            ))),
            SourceConfig::Channel(source) => {
                let transport = self.channel.as_ref().ok_or_else(|| {
                    crate::error::HarvestError::config(format!(
                        "no channel transport configured for {}",
                        source.channel
                    ))
                })?;
                Ok(Box::new(ChannelAdapter::new(
                    source.clone(),
                    Arc::clone(transport),
                )))
            }
        }
    }
}

impl std::fmt::Debug for Transports {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transports")
            .field("channel", &self.channel.is_some())
            .field("site", &self.site)
            .finish()
    }
}
