//! Harvest orchestration: one task per source, merged into one digest.
//!
//! # Per-source pipeline
//!
//! Each source runs in its own tokio task and pulls pages from its adapter.
//! Every entry goes through, in order:
//!
//! 1. window check ([`crate::window::classify`])
//! 2. keyword match ([`KeywordMatcher`])
//! 3. dedup against the shared [`SeenSet`]
//!
//! # Failure handling
//!
//! | Adapter error | Outcome |
//! |---------------|---------|
//! | `RateLimited { retry_after }` | wait (capped, plus jitter) and retry the same page; after `max_attempts` failed attempts the source is `Degraded` |
//! | `Unavailable` | source `Failed` at once; items admitted earlier are kept |
//! | exhausted, but [`SourceAdapter::incomplete`] | source `Degraded` |
//! | deadline | token cancelled; sources still running stop between requests and are `Degraded` |
//!
//! The run only errors when every source failed.

use futures::future::join_all;
use rand::{Rng, rng};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::dedup::SeenSet;
use crate::error::{HarvestError, Result, SourceError};
use crate::keywords::{KeywordMatcher, KeywordSpec};
use crate::models::{Digest, DigestFormat, Item, SourceConfig, SourceReport, SourceStatus};
use crate::outputs::{self, DigestHeader, RenderOptions};
use crate::sources::{FetchContext, SourceAdapter, Transports};
use crate::utils::truncate_for_log;
use crate::window::{HarvestWindow, UndatedPolicy, WindowVerdict, classify};

/// Retry bound for rate-limited pages.
///
/// ```text
/// delay = min(retry_after, max_delay) + random_jitter(0..=jitter)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per page, the first one included.
    pub max_attempts: usize,
    pub max_delay: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_delay: Duration::from_secs(60),
            jitter: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    fn delay(&self, retry_after: Duration) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rng().random_range(0..=jitter_ms)
        };
        retry_after.min(self.max_delay) + Duration::from_millis(jitter)
    }
}

#[derive(Debug, Clone)]
pub struct HarvestOptions {
    pub retry: RetryPolicy,
    /// Wall-clock budget for the whole run.
    pub deadline: Option<Duration>,
    /// Stop a source once this many items were admitted from it.
    pub max_items_per_source: Option<usize>,
    pub undated: UndatedPolicy,
    pub render: RenderOptions,
    /// Digest title; defaults to the source label for single-source runs.
    pub title: Option<String>,
}

impl Default for HarvestOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            deadline: None,
            max_items_per_source: None,
            undated: UndatedPolicy::Exclude,
            render: RenderOptions::default(),
            title: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Harvester {
    transports: Transports,
    options: HarvestOptions,
    /// Shared across runs only when injected; otherwise each run starts empty.
    seen: Option<SeenSet>,
}

/// What one source task hands back.
#[derive(Debug)]
struct SourceOutcome {
    report: SourceReport,
    items: Vec<Item>,
}

/// State shared by all source tasks of one run.
#[derive(Clone)]
struct TaskShared {
    ctx: FetchContext,
    matcher: Arc<KeywordMatcher>,
    seen: SeenSet,
    retry: RetryPolicy,
    undated: UndatedPolicy,
    max_items: Option<usize>,
}

impl Harvester {
    pub fn new(transports: Transports, options: HarvestOptions) -> Self {
        Self {
            transports,
            options,
            seen: None,
        }
    }

    /// Use a pre-populated set, e.g. one loaded from disk. Every run then
    /// admits into it.
    pub fn with_seen(mut self, seen: SeenSet) -> Self {
        self.seen = Some(seen);
        self
    }

    /// Harvest `configs` and render the result.
    pub async fn run(
        &self,
        configs: &[SourceConfig],
        window: HarvestWindow,
        keywords: &KeywordSpec,
        format: DigestFormat,
    ) -> Result<Digest> {
        if configs.is_empty() {
            return Err(HarvestError::config("no sources configured"));
        }
        let adapters = configs
            .iter()
            .map(|c| self.transports.adapter_for(c))
            .collect::<Result<Vec<_>>>()?;
        self.run_adapters(adapters, window, keywords, format).await
    }

    /// Harvest pre-built adapters. Every task is awaited before rendering.
    #[instrument(level = "info", skip_all, fields(sources = adapters.len(), start = %window.start, end = %window.end))]
    pub async fn run_adapters(
        &self,
        adapters: Vec<Box<dyn SourceAdapter>>,
        window: HarvestWindow,
        keywords: &KeywordSpec,
        format: DigestFormat,
    ) -> Result<Digest> {
        let t0 = Instant::now();
        let cancel = CancellationToken::new();
        let shared = TaskShared {
            ctx: FetchContext::new(window, cancel.clone()),
            matcher: Arc::new(KeywordMatcher::new(keywords)),
            seen: self.seen.clone().unwrap_or_default(),
            retry: self.options.retry.clone(),
            undated: self.options.undated,
            max_items: self.options.max_items_per_source,
        };

        let deadline_timer = self.options.deadline.map(|deadline| {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                warn!(?deadline, "Run deadline reached; stopping sources");
                cancel.cancel();
            })
        });

        let ids: Vec<String> = adapters.iter().map(|a| a.source_id().to_string()).collect();
        let handles = adapters
            .into_iter()
            .map(|adapter| tokio::spawn(harvest_source(adapter, shared.clone())))
            .collect::<Vec<_>>();
        let joined = join_all(handles).await;
        if let Some(timer) = deadline_timer {
            timer.abort();
        }

        let mut reports = Vec::with_capacity(joined.len());
        let mut items = Vec::new();
        for (id, res) in ids.into_iter().zip(joined) {
            match res {
                Ok(outcome) => {
                    items.extend(outcome.items);
                    reports.push(outcome.report);
                }
                Err(e) => {
                    error!(source = %id, error = %e, "Source task aborted");
                    let mut report = SourceReport::new(id);
                    report.status = SourceStatus::Failed {
                        reason: format!("task aborted: {e}"),
                    };
                    reports.push(report);
                }
            }
        }

        let failed = reports.iter().filter(|r| r.is_failed()).count();
        info!(
            sources = reports.len(),
            failed,
            items = items.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Harvest finished"
        );
        if !reports.is_empty() && failed == reports.len() {
            return Err(HarvestError::AllSourcesFailed(reports));
        }

        let title = self.options.title.clone().unwrap_or_else(|| match reports.as_slice() {
            [only] => format!("{} digest", only.label),
            _ => "Harvest digest".to_string(),
        });
        let header = DigestHeader {
            title,
            window,
            keywords: keywords.clone(),
            sources: reports,
        };
        Ok(outputs::render(items, format, header, &self.options.render))
    }
}

/// Drive one adapter to exhaustion, failure, or the deadline.
#[instrument(level = "info", skip_all, fields(source = %adapter.source_id()))]
async fn harvest_source(mut adapter: Box<dyn SourceAdapter>, shared: TaskShared) -> SourceOutcome {
    let ctx = &shared.ctx;
    let mut report = SourceReport::new(adapter.source_id());
    let mut items = Vec::new();
    let mut failed_attempts = 0usize;

    'pages: loop {
        if ctx.is_cancelled() {
            report.status = SourceStatus::Degraded {
                reason: "deadline reached".to_string(),
            };
            break;
        }

        match adapter.next_page(ctx).await {
            Ok(None) => {
                // A cancelled adapter may stop early and look exhausted.
                if ctx.is_cancelled() {
                    report.status = SourceStatus::Degraded {
                        reason: "deadline reached".to_string(),
                    };
                } else if let Some(reason) = adapter.incomplete() {
                    warn!(%reason, "Source exhausted with gaps");
                    report.status = SourceStatus::Degraded { reason };
                }
                break;
            }
            Ok(Some(page)) => {
                failed_attempts = 0;
                report.pages += 1;
                report.notes.extend(page.notes);
                for entry in page.entries {
                    let item = match entry {
                        Ok(item) => item,
                        Err(malformed) => {
                            debug!(reason = %truncate_for_log(&malformed.reason, 300), "Malformed entry");
                            report.malformed += 1;
                            continue;
                        }
                    };
                    report.fetched += 1;
                    match classify(&item, &ctx.window, shared.undated) {
                        WindowVerdict::Outside => {
                            report.out_of_window += 1;
                            continue;
                        }
                        WindowVerdict::Undated => {
                            report.undated += 1;
                            continue;
                        }
                        WindowVerdict::Inside => {}
                    }
                    if !shared.matcher.matches(&item) {
                        report.unmatched += 1;
                        continue;
                    }
                    if !shared.seen.admit(&item) {
                        report.duplicates += 1;
                        continue;
                    }
                    report.admitted += 1;
                    items.push(item);
                    if shared.max_items.is_some_and(|max| items.len() >= max) {
                        report.notes.push(format!("stopped at {} items", items.len()));
                        break 'pages;
                    }
                }
            }
            Err(SourceError::RateLimited { retry_after }) => {
                failed_attempts += 1;
                if failed_attempts >= shared.retry.max_attempts {
                    warn!(attempts = failed_attempts, "Rate limit retries exhausted");
                    report.status = SourceStatus::Degraded {
                        reason: format!("rate limited {failed_attempts} times in a row"),
                    };
                    break;
                }
                let delay = shared.retry.delay(retry_after);
                warn!(
                    attempt = failed_attempts,
                    max = shared.retry.max_attempts,
                    ?retry_after,
                    ?delay,
                    "Rate limited; backing off"
                );
                if !ctx.pause(delay).await {
                    report.status = SourceStatus::Degraded {
                        reason: "deadline reached".to_string(),
                    };
                    break;
                }
            }
            Err(SourceError::Unavailable { reason }) => {
                warn!(%reason, "Source unavailable");
                report.status = SourceStatus::Failed { reason };
                break;
            }
        }
    }

    report.label = adapter.label();
    info!(
        status = report.status.label(),
        pages = report.pages,
        fetched = report.fetched,
        admitted = report.admitted,
        out_of_window = report.out_of_window,
        undated = report.undated,
        unmatched = report.unmatched,
        duplicates = report.duplicates,
        malformed = report.malformed,
        "Source finished"
    );
    SourceOutcome { report, items }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MalformedItem;
    use crate::models::{ChannelSource, ItemPayload, SiteSource};
    use crate::sources::Page;
    use crate::sources::channel::stub::{StubChannel, msg};
    use crate::transport::stub::StubFetcher;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::VecDeque;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 27, 12, 0, 0).unwrap()
    }

    fn window() -> HarvestWindow {
        HarvestWindow::last_days(30, now()).unwrap()
    }

    fn item(source: &str, id: &str, days_ago: i64, body: &str) -> Item {
        Item {
            source_id: source.to_string(),
            external_id: id.to_string(),
            published_at: Some(now() - chrono::Duration::days(days_ago)),
            title: Some(format!("{source} {id}")),
            body: body.to_string(),
            url: Some(format!("https://{source}/{id}")),
            raw_payload: ItemPayload::Feed {
                feed_url: format!("https://{source}/feed"),
            },
        }
    }

    enum Step {
        Page(Vec<Result<Item, MalformedItem>>),
        Fail(SourceError),
        /// Sleep until cancelled, then report exhaustion.
        Hang,
    }

    struct Scripted {
        id: String,
        steps: VecDeque<Step>,
        calls: Arc<std::sync::Mutex<Vec<tokio::time::Instant>>>,
    }

    impl Scripted {
        fn new(id: &str, steps: Vec<Step>) -> Self {
            Self {
                id: id.to_string(),
                steps: steps.into(),
                calls: Arc::default(),
            }
        }
    }

    #[async_trait]
    impl SourceAdapter for Scripted {
        fn source_id(&self) -> &str {
            &self.id
        }

        async fn next_page(&mut self, ctx: &FetchContext) -> std::result::Result<Option<Page>, SourceError> {
            self.calls.lock().unwrap().push(tokio::time::Instant::now());
            match self.steps.pop_front() {
                None => Ok(None),
                Some(Step::Page(entries)) => Ok(Some(Page::new(entries))),
                Some(Step::Fail(e)) => Err(e),
                Some(Step::Hang) => {
                    ctx.pause(Duration::from_secs(3600)).await;
                    Ok(None)
                }
            }
        }
    }

    fn harvester(options: HarvestOptions) -> Harvester {
        Harvester::new(Transports::new(Arc::new(StubFetcher::new())), options)
    }

    fn no_jitter() -> HarvestOptions {
        HarvestOptions {
            retry: RetryPolicy {
                jitter: Duration::ZERO,
                ..RetryPolicy::default()
            },
            ..HarvestOptions::default()
        }
    }

    fn rate_limited(secs: u64) -> Step {
        Step::Fail(SourceError::RateLimited {
            retry_after: Duration::from_secs(secs),
        })
    }

    #[tokio::test]
    async fn test_two_sources_window_and_duplicates() {
        let a = Scripted::new(
            "a.example",
            vec![Step::Page(vec![
                Ok(item("a.example", "1", 1, "")),
                Ok(item("a.example", "2", 5, "")),
                Ok(item("a.example", "3", 29, "")),
                Ok(item("a.example", "4", 31, "")),
                Ok(item("a.example", "5", 90, "")),
            ])],
        );
        let b = Scripted::new(
            "b.example",
            vec![
                Step::Page(vec![
                    Ok(item("b.example", "1", 2, "")),
                    Ok(item("b.example", "2", 3, "")),
                ]),
                Step::Page(vec![Ok(item("b.example", "1", 2, ""))]),
            ],
        );
        let digest = harvester(HarvestOptions::default())
            .run_adapters(
                vec![Box::new(a), Box::new(b)],
                window(),
                &KeywordSpec::default(),
                DigestFormat::Text,
            )
            .await
            .unwrap();

        assert_eq!(digest.items.len(), 5);
        assert!(digest.items.iter().all(|i| window().contains(i.published_at.unwrap())));
        let ts: Vec<_> = digest.items.iter().map(|i| i.published_at).collect();
        assert!(ts.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(digest.sources[0].out_of_window, 2);
        assert_eq!(digest.sources[1].duplicates, 1);
        assert_eq!(digest.sources[1].pages, 2);
        assert_eq!(digest.incomplete_sources().count(), 0);
    }

    #[tokio::test]
    async fn test_keywords_and_undated_policy() {
        let mut undated = item("a.example", "u", 0, "Election day");
        undated.published_at = None;
        let steps = || {
            vec![Step::Page(vec![
                Ok(item("a.example", "1", 1, "Election results delayed")),
                Ok(item("a.example", "2", 1, "no relevant content")),
                Ok(undated.clone()),
                Err(MalformedItem::new("no id")),
            ])]
        };
        let keywords = KeywordSpec::parse("election", false);

        let digest = harvester(HarvestOptions::default())
            .run_adapters(
                vec![Box::new(Scripted::new("a.example", steps()))],
                window(),
                &keywords,
                DigestFormat::Json,
            )
            .await
            .unwrap();
        assert_eq!(digest.items.len(), 1);
        let report = &digest.sources[0];
        assert_eq!((report.unmatched, report.undated, report.malformed), (1, 1, 1));
        assert_eq!(digest.title, "a.example digest");

        let include = HarvestOptions {
            undated: UndatedPolicy::Include,
            ..HarvestOptions::default()
        };
        let digest = harvester(include)
            .run_adapters(
                vec![Box::new(Scripted::new("a.example", steps()))],
                window(),
                &keywords,
                DigestFormat::Json,
            )
            .await
            .unwrap();
        assert_eq!(digest.items.len(), 2);
        assert_eq!(digest.items[1].external_id, "u");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_within_bound_is_not_degraded() {
        let limited = Scripted::new(
            "slow.example",
            vec![
                rate_limited(2),
                rate_limited(2),
                Step::Page(vec![Ok(item("slow.example", "1", 1, ""))]),
            ],
        );
        let calls = Arc::clone(&limited.calls);
        let other = Scripted::new("ok.example", vec![Step::Page(vec![Ok(item("ok.example", "1", 2, ""))])]);

        let digest = harvester(no_jitter())
            .run_adapters(
                vec![Box::new(limited), Box::new(other)],
                window(),
                &KeywordSpec::default(),
                DigestFormat::Html,
            )
            .await
            .unwrap();

        assert_eq!(digest.items.len(), 2);
        assert_eq!(digest.incomplete_sources().count(), 0);
        assert_eq!(digest.sources[0].status, SourceStatus::Complete);
        let calls = calls.lock().unwrap();
        assert!(calls.len() >= 3);
        assert!(calls[1] - calls[0] >= Duration::from_secs(2));
        assert!(calls[2] - calls[1] >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_bound_exceeded_degrades() {
        let limited = Scripted::new(
            "slow.example",
            vec![
                Step::Page(vec![Ok(item("slow.example", "1", 1, ""))]),
                rate_limited(1),
                rate_limited(1),
                rate_limited(1),
                Step::Page(vec![Ok(item("slow.example", "2", 1, ""))]),
            ],
        );
        let digest = harvester(no_jitter())
            .run_adapters(
                vec![Box::new(limited)],
                window(),
                &KeywordSpec::default(),
                DigestFormat::Text,
            )
            .await
            .unwrap();
        assert_eq!(digest.items.len(), 1);
        assert!(matches!(digest.sources[0].status, SourceStatus::Degraded { .. }));
        assert!(digest.body.contains("degraded"));
    }

    #[tokio::test]
    async fn test_unavailable_source_is_failed_and_listed() {
        let broken = Scripted::new(
            "down.example",
            vec![
                Step::Page(vec![Ok(item("down.example", "1", 1, ""))]),
                Step::Fail(SourceError::unavailable("HTTP 500")),
            ],
        );
        let fine = Scripted::new("ok.example", vec![Step::Page(vec![Ok(item("ok.example", "1", 1, ""))])]);
        let digest = harvester(HarvestOptions::default())
            .run_adapters(
                vec![Box::new(broken), Box::new(fine)],
                window(),
                &KeywordSpec::default(),
                DigestFormat::Text,
            )
            .await
            .unwrap();

        assert!(digest.sources[0].is_failed());
        assert_eq!(digest.items.len(), 2);
        assert!(digest.body.contains("down.example (failed): HTTP 500"));
    }

    #[tokio::test]
    async fn test_all_sources_failed_is_an_error() {
        let a = Scripted::new("a.example", vec![Step::Fail(SourceError::unavailable("dns"))]);
        let b = Scripted::new("b.example", vec![Step::Fail(SourceError::unavailable("tls"))]);
        let err = harvester(HarvestOptions::default())
            .run_adapters(
                vec![Box::new(a), Box::new(b)],
                window(),
                &KeywordSpec::default(),
                DigestFormat::Text,
            )
            .await
            .unwrap_err();
        match err {
            HarvestError::AllSourcesFailed(reports) => assert_eq!(reports.len(), 2),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_degrades_running_sources() {
        let hanging = Scripted::new(
            "hang.example",
            vec![Step::Page(vec![Ok(item("hang.example", "1", 1, ""))]), Step::Hang],
        );
        let quick = Scripted::new("ok.example", vec![Step::Page(vec![Ok(item("ok.example", "1", 1, ""))])]);
        let options = HarvestOptions {
            deadline: Some(Duration::from_secs(10)),
            ..HarvestOptions::default()
        };
        let digest = harvester(options)
            .run_adapters(
                vec![Box::new(hanging), Box::new(quick)],
                window(),
                &KeywordSpec::default(),
                DigestFormat::Text,
            )
            .await
            .unwrap();
        assert_eq!(digest.items.len(), 2);
        assert_eq!(
            digest.sources[0].status,
            SourceStatus::Degraded {
                reason: "deadline reached".to_string()
            }
        );
        assert_eq!(digest.sources[1].status, SourceStatus::Complete);
    }

    #[tokio::test]
    async fn test_max_items_per_source() {
        let a = Scripted::new(
            "a.example",
            vec![
                Step::Page((1..=5).map(|i| Ok(item("a.example", &i.to_string(), 1, ""))).collect()),
                Step::Page(vec![Ok(item("a.example", "6", 1, ""))]),
            ],
        );
        let options = HarvestOptions {
            max_items_per_source: Some(3),
            ..HarvestOptions::default()
        };
        let digest = harvester(options)
            .run_adapters(vec![Box::new(a)], window(), &KeywordSpec::default(), DigestFormat::Text)
            .await
            .unwrap();
        assert_eq!(digest.items.len(), 3);
        assert_eq!(digest.sources[0].pages, 1);
    }

    #[tokio::test]
    async fn test_runs_do_not_share_state_unless_given_a_set() {
        let pages = || {
            vec![Step::Page(vec![
                Ok(item("a.example", "1", 1, "")),
                Ok(item("a.example", "2", 2, "")),
            ])]
        };
        let run = |h: &Harvester| {
            let adapter: Box<dyn SourceAdapter> = Box::new(Scripted::new("a.example", pages()));
            let h = h.clone();
            async move {
                h.run_adapters(vec![adapter], window(), &KeywordSpec::default(), DigestFormat::Text)
                    .await
                    .unwrap()
            }
        };

        let fresh = harvester(HarvestOptions::default());
        assert_eq!(run(&fresh).await.items.len(), 2);
        let second = run(&fresh).await;
        assert_eq!(second.items.len(), 2);
        assert_eq!(second.sources[0].duplicates, 0);

        let seen = SeenSet::new();
        let shared = harvester(HarvestOptions::default()).with_seen(seen.clone());
        assert_eq!(run(&shared).await.items.len(), 2);
        assert_eq!(seen.len(), 2);
        let second = run(&shared).await;
        assert!(second.items.is_empty());
        assert_eq!(second.sources[0].duplicates, 2);
    }

    fn quick_sites() -> crate::sources::SiteOptions {
        crate::sources::SiteOptions {
            throttle: Duration::ZERO,
            ..Default::default()
        }
    }

    fn configured_site(url: &str, feeds: &[&str]) -> SourceConfig {
        let mut site = SiteSource::new(url);
        site.feeds = feeds.iter().map(|f| f.to_string()).collect();
        site.discover = false;
        SourceConfig::Site(site)
    }

    #[tokio::test]
    async fn test_mixed_sources_over_web_transports() {
        let feed = r#"<rss><channel>
            <item><title>Bank news</title><link>https://bank.example/1</link><pubDate>Tue, 26 Aug 2025 10:00:00 GMT</pubDate><description>x</description></item>
        </channel></rss>"#;
        let preview = r#"<html><body>
<div class="tgme_channel_info"><div class="tgme_channel_info_header_title"><span>Bank Chan</span></div></div>
<div class="tgme_widget_message" data-post="bankchan/7">
  <div class="tgme_widget_message_text">bank post</div>
  <time datetime="2025-08-25T10:00:00+00:00"></time>
</div>
</body></html>"#;
        let http = Arc::new(
            StubFetcher::new()
                .with("https://bank.example/rss", feed)
                .with("https://t.me/s/bankchan", preview)
                .with("https://t.me/s/bankchan?before=7", "<html><body></body></html>"),
        );
        let transports = Transports::web(http).with_site_options(quick_sites());
        let configs = vec![
            configured_site("https://bank.example", &["https://bank.example/rss"]),
            SourceConfig::Channel(ChannelSource {
                channel: "bankchan".to_string(),
                scan_limit: 100,
            }),
        ];

        let digest = Harvester::new(transports, HarvestOptions::default())
            .run(&configs, window(), &KeywordSpec::parse("bank", false), DigestFormat::Text)
            .await
            .unwrap();
        assert_eq!(digest.items.len(), 2);
        assert_eq!(digest.sources[1].label, "Bank Chan");
        assert_eq!(digest.incomplete_sources().count(), 0);
    }

    #[tokio::test]
    async fn test_site_feed_failures_reach_the_report() {
        let feed = r#"<rss><channel>
            <item><title>Up</title><link>https://up.example/1</link><pubDate>Tue, 26 Aug 2025 10:00:00 GMT</pubDate><description>x</description></item>
        </channel></rss>"#;
        let http = Arc::new(StubFetcher::new().with("https://up.example/rss", feed));
        let transports = Transports::new(http).with_site_options(quick_sites());
        let harvester = Harvester::new(transports, HarvestOptions::default());

        let configs = vec![
            configured_site(
                "https://up.example",
                &["https://up.example/rss", "https://up.example/markets/rss"],
            ),
            configured_site("https://down.example", &["https://down.example/rss"]),
        ];
        let digest = harvester
            .run(&configs, window(), &KeywordSpec::default(), DigestFormat::Text)
            .await
            .unwrap();
        assert_eq!(digest.items.len(), 1);
        assert!(matches!(digest.sources[0].status, SourceStatus::Degraded { .. }));
        assert!(digest.sources[1].is_failed());

        let err = harvester
            .run(&configs[1..], window(), &KeywordSpec::default(), DigestFormat::Text)
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::AllSourcesFailed(_)));
        assert_eq!(err.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_run_builds_adapters_from_configs() {
        let feed = r#"<rss><channel>
            <item><title>Bank news</title><link>https://bank.example/1</link><pubDate>Tue, 26 Aug 2025 10:00:00 GMT</pubDate><description>x</description></item>
        </channel></rss>"#;
        let http = Arc::new(StubFetcher::new().with("https://bank.example/rss", feed));
        let channel = Arc::new(StubChannel::new(vec![msg(7, "2025-08-25T10:00:00Z", "bank post")]));
        let transports = Transports::new(http)
            .with_channel(channel)
            .with_site_options(crate::sources::SiteOptions {
                throttle: Duration::ZERO,
                ..Default::default()
            });
        let mut site = SiteSource::new("https://bank.example");
        site.feeds = vec!["https://bank.example/rss".to_string()];
        site.discover = false;
        let configs = vec![
            SourceConfig::Site(site),
            SourceConfig::Channel(ChannelSource {
                channel: "bankchan".to_string(),
                scan_limit: 100,
            }),
        ];

        let digest = Harvester::new(transports, HarvestOptions::default())
            .run(&configs, window(), &KeywordSpec::parse("bank", false), DigestFormat::Html)
            .await
            .unwrap();
        assert_eq!(digest.items.len(), 2);
        assert_eq!(digest.items[0].external_id, "7");
        assert!(digest.body.contains("https://t.me/bankchan/7"));

        let empty: Vec<SourceConfig> = Vec::new();
        let err = Harvester::new(Transports::new(Arc::new(StubFetcher::new())), HarvestOptions::default())
            .run(&empty, window(), &KeywordSpec::default(), DigestFormat::Html)
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
