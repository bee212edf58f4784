//! Site adapter: feeds first, sitemaps as a fallback.
//!
//! # Phases
//!
//! 1. **Planning**: curated feeds from the config, then discovery: common
//!    feed paths and `<link rel="alternate">` tags on the homepage.
//! 2. **Feeds**: one page per feed document; `?paged=N` walks older pages
//!    up to `feed_pages` and stops once a page is entirely older than the
//!    window.
//! 3. **Sitemaps**: only when no feed yielded an in-window entry. Sources are
//!    `Sitemap:` lines in `robots.txt` plus `/sitemap.xml`; indexes expand
//!    into their children.
//!
//! Requests are spaced by `SiteOptions::throttle`.
//!
//! A site where no request succeeded at all is `Unavailable`, even with
//! configured feeds. Feeds whose first page could not be fetched are reported
//! through [`SourceAdapter::incomplete`].

use async_trait::async_trait;
use itertools::Itertools;
use scraper::{Html, Selector};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::feed::{looks_like_feed, parse_feed, parse_sitemap, sitemap_item};
use super::{FetchContext, Page, SourceAdapter};
use crate::error::{MalformedItem, SourceError};
use crate::models::{Item, SiteSource, domain_of};
use crate::transport::HttpFetch;
use crate::utils::{collapse_whitespace, truncate_for_log};

/// Paths probed for feeds on every site.
pub const COMMON_FEED_PATHS: &[&str] = &[
    "/feed",
    "/rss",
    "/rss.xml",
    "/feed.xml",
    "/atom.xml",
    "/feeds/posts/default?alt=rss",
];

const DESCRIPTION_MAX_CHARS: usize = 400;

#[derive(Debug, Clone)]
pub struct SiteOptions {
    /// Pause between consecutive requests to one site.
    pub throttle: Duration,
    /// Fetch `<meta name="description">` for in-window entries without a body.
    pub describe_missing: bool,
    pub max_sitemap_urls: usize,
    /// Sitemap documents visited per site, index children included.
    pub max_sitemaps: usize,
}

impl Default for SiteOptions {
    fn default() -> Self {
        Self {
            throttle: Duration::from_millis(600),
            describe_missing: true,
            max_sitemap_urls: 5000,
            max_sitemaps: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FeedPage {
    url: String,
    page: u32,
}

#[derive(Debug)]
enum State {
    Planning,
    Feeds(VecDeque<FeedPage>),
    SitemapPlanning,
    Sitemaps {
        queue: VecDeque<String>,
        visited: HashSet<String>,
        urls: usize,
    },
    Done,
}

pub struct SiteAdapter {
    source: SiteSource,
    source_id: String,
    http: Arc<dyn HttpFetch>,
    options: SiteOptions,
    state: State,
    /// In-window entries seen across all feeds; zero triggers the sitemap fallback.
    in_window: usize,
    requests: usize,
    /// Requests answered with a body, whatever the body was.
    succeeded: usize,
    last_failure: Option<String>,
    feeds_planned: usize,
    failed_feeds: Vec<String>,
}

impl std::fmt::Debug for SiteAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiteAdapter")
            .field("source_id", &self.source_id)
            .field("state", &self.state)
            .field("in_window", &self.in_window)
            .field("succeeded", &self.succeeded)
            .field("failed_feeds", &self.failed_feeds)
            .finish()
    }
}

impl SiteAdapter {
    pub fn new(
        source: SiteSource,
        http: Arc<dyn HttpFetch>,
        options: SiteOptions,
    ) -> Self {
        Self {
            source_id: domain_of(&source.url),
            source,
            http,
            options,
            state: State::Planning,
            in_window: 0,
            requests: 0,
            succeeded: 0,
            last_failure: None,
            feeds_planned: 0,
            failed_feeds: Vec::new(),
        }
    }

    /// GET with throttling. `None` when cancelled while waiting.
    async fn get(
        &mut self,
        ctx: &FetchContext,
        url: &str,
    ) -> Option<Result<String, SourceError>> {
        if self.requests > 0 && !ctx.pause(self.options.throttle).await {
            return None;
        }
        if ctx.is_cancelled() {
            return None;
        }
        self.requests += 1;
        let res = self.http.get_text(url).await;
        match &res {
            Ok(_) => self.succeeded += 1,
            Err(SourceError::Unavailable { reason }) => self.last_failure = Some(reason.clone()),
            Err(SourceError::RateLimited { .. }) => {}
        }
        Some(res)
    }

    #[instrument(level = "info", skip_all, fields(site = %self.source.url))]
    async fn plan_feeds(&mut self, ctx: &FetchContext) -> Result<Vec<String>, SourceError> {
        let mut feeds = self.source.feeds.clone();
        if !self.source.discover {
            return Ok(feeds);
        }

        let base = self.source.url.clone();
        let mut reachable = false;
        let mut last_failure = None;

        for path in COMMON_FEED_PATHS {
            let candidate = join_url(&base, path);
            match self.get(ctx, &candidate).await {
                None => return Ok(feeds),
                Some(Ok(body)) => {
                    reachable = true;
                    if looks_like_feed(&body) {
                        debug!(feed = %candidate, "Feed found");
                        feeds.push(candidate);
                    }
                }
                Some(Err(e @ SourceError::RateLimited { .. })) => return Err(e),
                Some(Err(SourceError::Unavailable { reason })) => last_failure = Some(reason),
            }
        }

        let homepage = homepage_url(&base);
        match self.get(ctx, &homepage).await {
            None => return Ok(feeds),
            Some(Ok(home)) => {
                reachable = true;
                for alt in alternate_feed_links(&home, &homepage) {
                    if feeds.contains(&alt) {
                        continue;
                    }
                    match self.get(ctx, &alt).await {
                        None => break,
                        Some(Ok(body)) if looks_like_feed(&body) => {
                            debug!(feed = %alt, "Alternate feed found");
                            feeds.push(alt);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e @ SourceError::RateLimited { .. })) => return Err(e),
                        Some(Err(SourceError::Unavailable { reason })) => {
                            debug!(feed = %alt, %reason, "Alternate feed unreachable")
                        }
                    }
                }
            }
            Some(Err(e @ SourceError::RateLimited { .. })) => return Err(e),
            Some(Err(SourceError::Unavailable { reason })) => last_failure = Some(reason),
        }

        if !reachable && feeds.is_empty() {
            return Err(SourceError::unavailable(format!(
                "site unreachable: {}",
                last_failure.unwrap_or_else(|| "no response".to_string())
            )));
        }
        Ok(feeds.into_iter().unique().collect())
    }

    async fn plan_sitemaps(&mut self, ctx: &FetchContext) -> Result<VecDeque<String>, SourceError> {
        let base = self.source.url.clone();
        let mut sitemaps = Vec::new();
        match self.get(ctx, &join_url(&base, "/robots.txt")).await {
            Some(Ok(robots)) => sitemaps.extend(sitemaps_from_robots(&robots)),
            Some(Err(e @ SourceError::RateLimited { .. })) => return Err(e),
            Some(Err(_)) | None => {}
        }
        sitemaps.push(join_url(&base, "/sitemap.xml"));
        Ok(sitemaps.into_iter().unique().collect())
    }

    /// Fill empty bodies from the article page's meta description.
    async fn describe(&mut self, ctx: &FetchContext, entries: &mut [Result<Item, MalformedItem>]) {
        if !self.options.describe_missing {
            return;
        }
        for item in entries.iter_mut().flatten() {
            let in_window = item.published_at.is_some_and(|ts| ctx.window.contains(ts));
            if !in_window || !item.body.trim().is_empty() {
                continue;
            }
            let Some(url) = item.url.clone() else {
                continue;
            };
            match self.get(ctx, &url).await {
                None => return,
                Some(Ok(html)) => {
                    if let Some(desc) = meta_description(&html) {
                        item.body = desc;
                    }
                }
                Some(Err(e)) => debug!(%url, error = %e, "Meta description unavailable"),
            }
        }
    }

    fn count_in_window(&mut self, ctx: &FetchContext, entries: &[Result<Item, MalformedItem>]) {
        self.in_window += entries
            .iter()
            .flatten()
            .filter(|i| i.published_at.is_some_and(|ts| ctx.window.contains(ts)))
            .count();
    }
}

#[async_trait]
impl SourceAdapter for SiteAdapter {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn incomplete(&self) -> Option<String> {
        if self.failed_feeds.is_empty() {
            return None;
        }
        Some(format!(
            "{} of {} feeds failed: {}",
            self.failed_feeds.len(),
            self.feeds_planned,
            self.failed_feeds.join(", ")
        ))
    }

    async fn next_page(&mut self, ctx: &FetchContext) -> Result<Option<Page>, SourceError> {
        loop {
            if ctx.is_cancelled() {
                return Ok(None);
            }
            match &mut self.state {
                State::Planning => {
                    let feeds = self.plan_feeds(ctx).await?;
                    info!(site = %self.source_id, feeds = feeds.len(), "Feeds planned");
                    self.feeds_planned = feeds.len();
                    self.state = State::Feeds(
                        feeds
                            .into_iter()
                            .map(|url| FeedPage { url, page: 1 })
                            .collect(),
                    );
                }
                State::Feeds(queue) => {
                    let Some(target) = queue.pop_front() else {
                        self.state = if self.in_window == 0 {
                            info!(site = %self.source_id, "No in-window feed entries; trying sitemaps");
                            State::SitemapPlanning
                        } else {
                            State::Done
                        };
                        continue;
                    };
                    let url = page_url(&target.url, target.page);
                    let body = match self.get(ctx, &url).await {
                        None => return Ok(None),
                        Some(Ok(body)) => body,
                        Some(Err(e @ SourceError::RateLimited { .. })) => {
                            if let State::Feeds(queue) = &mut self.state {
                                queue.push_front(target);
                            }
                            return Err(e);
                        }
                        Some(Err(SourceError::Unavailable { reason })) => {
                            warn!(feed = %url, %reason, "Feed fetch failed");
                            // Older pages running out is the normal end of paging.
                            if target.page == 1 {
                                self.failed_feeds.push(target.url);
                            }
                            return Ok(Some(Page {
                                entries: Vec::new(),
                                notes: vec![format!("feed error {url}: {reason}")],
                            }));
                        }
                    };
                    let mut entries = match parse_feed(&body, &target.url, &self.source_id) {
                        Ok(entries) => entries,
                        Err(malformed) => {
                            warn!(
                                feed = %url,
                                reason = %malformed.reason,
                                head = %truncate_for_log(body.trim_start(), 200),
                                "Feed unparseable"
                            );
                            return Ok(Some(Page {
                                notes: vec![malformed.reason.clone()],
                                entries: vec![Err(malformed)],
                            }));
                        }
                    };
                    self.count_in_window(ctx, &entries);
                    let more = target.page < self.source.feed_pages
                        && !entries.is_empty()
                        && !entirely_before(&entries, ctx.window.start);
                    if more {
                        if let State::Feeds(queue) = &mut self.state {
                            queue.push_front(FeedPage {
                                url: target.url.clone(),
                                page: target.page + 1,
                            });
                        }
                    }
                    self.describe(ctx, &mut entries).await;
                    debug!(feed = %url, entries = entries.len(), "Feed page parsed");
                    return Ok(Some(Page::new(entries)));
                }
                State::SitemapPlanning => {
                    let queue = self.plan_sitemaps(ctx).await?;
                    self.state = State::Sitemaps {
                        queue,
                        visited: HashSet::new(),
                        urls: 0,
                    };
                }
                State::Sitemaps {
                    queue,
                    visited,
                    urls,
                } => {
                    if visited.len() >= self.options.max_sitemaps
                        || *urls >= self.options.max_sitemap_urls
                    {
                        self.state = State::Done;
                        continue;
                    }
                    let Some(sitemap_url) = queue.pop_front() else {
                        self.state = State::Done;
                        continue;
                    };
                    if !visited.insert(sitemap_url.clone()) {
                        continue;
                    }
                    let body = match self.get(ctx, &sitemap_url).await {
                        None => return Ok(None),
                        Some(Ok(body)) => body,
                        Some(Err(e @ SourceError::RateLimited { .. })) => {
                            if let State::Sitemaps { queue, visited, .. } = &mut self.state {
                                visited.remove(&sitemap_url);
                                queue.push_front(sitemap_url);
                            }
                            return Err(e);
                        }
                        Some(Err(SourceError::Unavailable { reason })) => {
                            debug!(sitemap = %sitemap_url, %reason, "Sitemap unavailable");
                            continue;
                        }
                    };
                    let sitemap = match parse_sitemap(&body, &sitemap_url) {
                        Ok(sitemap) => sitemap,
                        Err(malformed) => {
                            return Ok(Some(Page {
                                notes: vec![malformed.reason.clone()],
                                entries: vec![Err(malformed)],
                            }));
                        }
                    };
                    let State::Sitemaps { queue, urls, .. } = &mut self.state else {
                        return Ok(None);
                    };
                    queue.extend(sitemap.children);
                    let budget = self.options.max_sitemap_urls.saturating_sub(*urls);
                    let mut entries: Vec<Result<Item, MalformedItem>> = sitemap
                        .urls
                        .iter()
                        .take(budget)
                        .map(|(loc, lastmod)| {
                            Ok(sitemap_item(&self.source_id, &sitemap_url, loc, *lastmod))
                        })
                        .collect();
                    *urls += entries.len();
                    if entries.is_empty() {
                        continue;
                    }
                    self.describe(ctx, &mut entries).await;
                    return Ok(Some(Page::new(entries)));
                }
                State::Done => {
                    if self.succeeded == 0 && self.requests > 0 {
                        return Err(SourceError::unavailable(format!(
                            "site unreachable: {}",
                            self.last_failure.as_deref().unwrap_or("no response")
                        )));
                    }
                    return Ok(None);
                }
            }
        }
    }
}

/// True when every dated entry predates `start` (and at least one is dated).
fn entirely_before(
    entries: &[Result<Item, MalformedItem>],
    start: chrono::DateTime<chrono::Utc>,
) -> bool {
    let mut dated = entries.iter().flatten().filter_map(|i| i.published_at).peekable();
    dated.peek().is_some() && dated.all(|ts| ts < start)
}

fn join_url(base: &str, path: &str) -> String {
    let base = format!("{}/", base.trim_end_matches('/'));
    Url::parse(&base)
        .and_then(|b| b.join(path))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| format!("{}{}", base, path.trim_start_matches('/')))
}

/// `https://a.example` -> `https://a.example/`; paths are kept.
fn homepage_url(base: &str) -> String {
    Url::parse(base)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| base.to_string())
}

/// WordPress-style paging: page 1 is the feed itself.
fn page_url(feed: &str, page: u32) -> String {
    if page <= 1 {
        return feed.to_string();
    }
    match Url::parse(feed) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair("paged", &page.to_string());
            url.to_string()
        }
        Err(_) => feed.to_string(),
    }
}

/// `<link rel="alternate" type="application/rss+xml" href="...">` targets, resolved.
pub fn alternate_feed_links(html: &str, base: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("link[href]") else {
        return Vec::new();
    };
    let base = Url::parse(base).ok();
    document
        .select(&selector)
        .filter(|el| {
            let rel = el.value().attr("rel").unwrap_or("").to_lowercase();
            let ty = el.value().attr("type").unwrap_or("").to_lowercase();
            rel.contains("alternate")
                && (ty.contains("rss") || ty.contains("atom") || ty.contains("xml"))
        })
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| match &base {
            Some(b) => b.join(href).ok().map(|u| u.to_string()),
            None => Url::parse(href).ok().map(|u| u.to_string()),
        })
        .unique()
        .collect()
}

/// First non-empty `description`, `og:description` or `twitter:description` meta tag.
pub fn meta_description(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("meta[content]").ok()?;
    document
        .select(&selector)
        .find(|el| {
            let key = el
                .value()
                .attr("name")
                .or_else(|| el.value().attr("property"))
                .unwrap_or("")
                .to_lowercase();
            matches!(
                key.as_str(),
                "description" | "og:description" | "twitter:description"
            ) && !el.value().attr("content").unwrap_or("").trim().is_empty()
        })
        .and_then(|el| el.value().attr("content"))
        .map(|c| {
            collapse_whitespace(c)
                .chars()
                .take(DESCRIPTION_MAX_CHARS)
                .collect()
        })
}

/// `Sitemap:` lines from robots.txt, case-insensitive.
pub fn sitemaps_from_robots(robots: &str) -> Vec<String> {
    robots
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case("sitemap")
                .then(|| value.trim().to_string())
        })
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::stub::StubFetcher;
    use crate::window::HarvestWindow;
    use chrono::{TimeZone, Utc};
    use tokio_util::sync::CancellationToken;

    fn ctx() -> FetchContext {
        let now = Utc.with_ymd_and_hms(2025, 8, 27, 12, 0, 0).unwrap();
        FetchContext::new(
            HarvestWindow::last_days(30, now).unwrap(),
            CancellationToken::new(),
        )
    }

    fn options() -> SiteOptions {
        SiteOptions {
            throttle: Duration::ZERO,
            describe_missing: true,
            ..SiteOptions::default()
        }
    }

    fn rss(items: &[(&str, &str, &str)]) -> String {
        let body: String = items
            .iter()
            .map(|(link, date, desc)| {
                format!(
                    "<item><title>T</title><link>{link}</link><pubDate>{date}</pubDate><description>{desc}</description></item>"
                )
            })
            .collect();
        format!("<?xml version=\"1.0\"?><rss version=\"2.0\"><channel>{body}</channel></rss>")
    }

    async fn drain(adapter: &mut SiteAdapter, ctx: &FetchContext) -> (Vec<Item>, usize, Vec<String>) {
        let mut items = Vec::new();
        let mut malformed = 0;
        let mut notes = Vec::new();
        while let Some(page) = adapter.next_page(ctx).await.unwrap() {
            notes.extend(page.notes);
            for entry in page.entries {
                match entry {
                    Ok(item) => items.push(item),
                    Err(_) => malformed += 1,
                }
            }
        }
        (items, malformed, notes)
    }

    #[tokio::test]
    async fn test_discovers_feed_and_fills_description() {
        let feed = rss(&[
            ("https://news.example/a", "Tue, 26 Aug 2025 10:00:00 GMT", "Alpha"),
            ("https://news.example/b", "Mon, 25 Aug 2025 10:00:00 GMT", ""),
        ]);
        let http = Arc::new(
            StubFetcher::new()
                .with("https://news.example/feed", &feed)
                .with(
                    "https://news.example/b",
                    r#"<html><head><meta name="description" content="  Beta   story "></head></html>"#,
                ),
        );
        let mut adapter =
            SiteAdapter::new(SiteSource::new("https://news.example"), http.clone(), options());
        let (items, malformed, _) = drain(&mut adapter, &ctx()).await;
        assert_eq!(malformed, 0);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].source_id, "news.example");
        assert_eq!(items[1].body, "Beta story");
        assert_eq!(http.requested("https://news.example/sitemap.xml"), 0);
    }

    #[tokio::test]
    async fn test_alternate_link_discovery() {
        let home = r#"<html><head>
            <link rel="alternate" type="application/atom+xml" href="/blog/atom">
            <link rel="stylesheet" href="/style.css">
        </head></html>"#;
        let feed = rss(&[("https://site.example/p/1", "Tue, 26 Aug 2025 10:00:00 GMT", "x")]);
        let http = Arc::new(
            StubFetcher::new()
                .with("https://site.example/", home)
                .with("https://site.example/blog/atom", &feed),
        );
        let mut adapter =
            SiteAdapter::new(SiteSource::new("https://site.example"), http, options());
        let (items, _, _) = drain(&mut adapter, &ctx()).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].external_id, "https://site.example/p/1");
    }

    #[tokio::test]
    async fn test_paging_stops_once_older_than_window() {
        let page1 = rss(&[("https://wp.example/1", "Tue, 26 Aug 2025 10:00:00 GMT", "x")]);
        let page2 = rss(&[("https://wp.example/2", "Tue, 01 Jul 2025 10:00:00 GMT", "x")]);
        let http = Arc::new(
            StubFetcher::new()
                .with("https://wp.example/feed", &page1)
                .with("https://wp.example/feed?paged=2", &page2)
                .with("https://wp.example/feed?paged=3", &page1),
        );
        let mut source = SiteSource::new("https://wp.example");
        source.feeds = vec!["https://wp.example/feed".to_string()];
        source.discover = false;
        source.feed_pages = 5;
        let mut adapter = SiteAdapter::new(source, http.clone(), options());
        let (items, _, _) = drain(&mut adapter, &ctx()).await;
        assert_eq!(items.len(), 2);
        assert_eq!(http.requested("https://wp.example/feed?paged=2"), 1);
        assert_eq!(http.requested("https://wp.example/feed?paged=3"), 0);
    }

    #[tokio::test]
    async fn test_sitemap_fallback_when_feeds_empty() {
        let index = r#"<sitemapindex><sitemap><loc>https://plain.example/news.xml</loc></sitemap></sitemapindex>"#;
        let urlset = r#"<urlset>
            <url><loc>https://plain.example/big-news</loc><lastmod>2025-08-20</lastmod></url>
            <url><loc>https://plain.example/old-news</loc><lastmod>2024-01-01</lastmod></url>
        </urlset>"#;
        let http = Arc::new(
            StubFetcher::new()
                .with("https://plain.example/", "<html></html>")
                .with(
                    "https://plain.example/robots.txt",
                    "User-agent: *\nSitemap: https://plain.example/index.xml\n",
                )
                .with("https://plain.example/index.xml", index)
                .with("https://plain.example/news.xml", urlset),
        );
        let mut adapter =
            SiteAdapter::new(SiteSource::new("https://plain.example"), http, options());
        let (items, _, _) = drain(&mut adapter, &ctx()).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title.as_deref(), Some("Big News"));
    }

    #[tokio::test]
    async fn test_unreachable_site_is_unavailable() {
        let http = Arc::new(StubFetcher::new());
        let mut adapter =
            SiteAdapter::new(SiteSource::new("https://down.example"), http, options());
        let err = adapter.next_page(&ctx()).await.unwrap_err();
        assert!(matches!(err, SourceError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_configured_feeds_all_down_is_unavailable() {
        let http = Arc::new(StubFetcher::new());
        let mut source = SiteSource::new("https://gone.example");
        source.feeds = vec!["https://gone.example/rss".to_string()];
        source.discover = false;
        let mut adapter = SiteAdapter::new(source, http.clone(), options());
        let ctx = ctx();

        let mut notes = Vec::new();
        let err = loop {
            match adapter.next_page(&ctx).await {
                Ok(Some(page)) => notes.extend(page.notes),
                Ok(None) => panic!("exhausted although nothing answered"),
                Err(e) => break e,
            }
        };
        assert!(matches!(err, SourceError::Unavailable { .. }));
        assert!(notes.iter().any(|n| n.contains("https://gone.example/rss")));
        assert_eq!(http.requested("https://gone.example/sitemap.xml"), 1);
    }

    #[tokio::test]
    async fn test_one_failed_feed_marks_site_incomplete() {
        let feed = rss(&[("https://half.example/1", "Tue, 26 Aug 2025 10:00:00 GMT", "x")]);
        let http = Arc::new(StubFetcher::new().with("https://half.example/rss", &feed));
        let mut source = SiteSource::new("https://half.example");
        source.feeds = vec![
            "https://half.example/rss".to_string(),
            "https://half.example/markets/rss".to_string(),
        ];
        source.discover = false;
        let mut adapter = SiteAdapter::new(source, http, options());
        assert_eq!(adapter.incomplete(), None);

        let (items, _, _) = drain(&mut adapter, &ctx()).await;
        assert_eq!(items.len(), 1);
        let reason = adapter.incomplete().unwrap();
        assert!(reason.starts_with("1 of 2 feeds failed"));
        assert!(reason.contains("https://half.example/markets/rss"));
    }

    #[tokio::test]
    async fn test_missing_older_feed_page_is_not_a_failure() {
        let page1 = rss(&[("https://wp2.example/1", "Tue, 26 Aug 2025 10:00:00 GMT", "x")]);
        let http = Arc::new(StubFetcher::new().with("https://wp2.example/feed", &page1));
        let mut source = SiteSource::new("https://wp2.example");
        source.feeds = vec!["https://wp2.example/feed".to_string()];
        source.discover = false;
        source.feed_pages = 3;
        let mut adapter = SiteAdapter::new(source, http, options());
        let (items, _, notes) = drain(&mut adapter, &ctx()).await;
        assert_eq!(items.len(), 1);
        assert_eq!(notes.len(), 1);
        assert_eq!(adapter.incomplete(), None);
    }

    #[tokio::test]
    async fn test_rate_limit_keeps_cursor() {
        let feed = rss(&[("https://rl.example/1", "Tue, 26 Aug 2025 10:00:00 GMT", "x")]);
        let http = Arc::new(StubFetcher::new());
        http.push(
            "https://rl.example/feed",
            Err(SourceError::RateLimited {
                retry_after: Duration::from_secs(1),
            }),
        );
        http.push("https://rl.example/feed", Ok(feed));
        let mut source = SiteSource::new("https://rl.example");
        source.feeds = vec!["https://rl.example/feed".to_string()];
        source.discover = false;
        let mut adapter = SiteAdapter::new(source, http, options());
        let ctx = ctx();
        assert!(matches!(
            adapter.next_page(&ctx).await,
            Err(SourceError::RateLimited { .. })
        ));
        let page = adapter.next_page(&ctx).await.unwrap().unwrap();
        assert_eq!(page.entries.len(), 1);
    }

    #[tokio::test]
    async fn test_broken_feed_counts_malformed() {
        let http = Arc::new(StubFetcher::new().with("https://bad.example/feed", "<rss><channel>"));
        let mut source = SiteSource::new("https://bad.example");
        source.feeds = vec!["https://bad.example/feed".to_string()];
        source.discover = false;
        let mut adapter = SiteAdapter::new(source, http, options());
        let (items, malformed, notes) = drain(&mut adapter, &ctx()).await;
        assert!(items.is_empty());
        assert_eq!(malformed, 1);
        assert!(notes.iter().any(|n| n.contains("unparseable feed")));
    }

    #[test]
    fn test_helpers() {
        assert_eq!(join_url("https://a.example", "/feed"), "https://a.example/feed");
        assert_eq!(
            join_url("https://a.example/", "/feeds/posts/default?alt=rss"),
            "https://a.example/feeds/posts/default?alt=rss"
        );
        assert_eq!(page_url("https://a.example/feed/", 1), "https://a.example/feed/");
        assert_eq!(
            page_url("https://a.example/feed/", 2),
            "https://a.example/feed/?paged=2"
        );
        assert_eq!(
            sitemaps_from_robots("sitemap: https://a/s1.xml\nSITEMAP:https://a/s2.xml\nDisallow: /"),
            vec!["https://a/s1.xml", "https://a/s2.xml"]
        );
        assert_eq!(
            meta_description(r#"<meta property="og:description" content="OG text">"#).as_deref(),
            Some("OG text")
        );
        assert_eq!(meta_description("<p>none</p>"), None);
    }
}
