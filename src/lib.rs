//! # harvest_digest
//!
//! Harvests site feeds and Telegram channel posts published inside a time
//! window, keeps the ones matching a keyword list, removes duplicates and
//! renders an HTML, plain-text, JSON or CSV digest.
//!
//! ## Pipeline
//!
//! ```text
//! SourceAdapter pages ─► window filter ─► keyword matcher ─► SeenSet ─┐
//!   (one tokio task per source)                                      │
//!                                     merge + sort ◄─────────────────┘
//!                                          │
//!                                     Digest renderer
//! ```
//!
//! | Module | Role |
//! |--------|------|
//! | [`sources`] | site and channel adapters, feed parsing, Telegram transports |
//! | [`window`] | half-open `[start, end)` time window |
//! | [`keywords`] | any/all, substring/whole-word matching |
//! | [`dedup`] | shared `(source_id, external_id)` set |
//! | [`outputs`] | digest rendering and output files |
//! | [`orchestrator`] | concurrency, retries, deadline, per-source reports |
//! | [`presets`] | built-in site sets and curated feeds |
//! | [`cli`] | command-line definition |
//!
//! ## Example
//!
//! ```ignore
//! let http = Arc::new(ReqwestFetcher::new(&HttpConfig::default())?);
//! let harvester = Harvester::new(Transports::new(http), HarvestOptions::default());
//! let window = HarvestWindow::last_days(30, Utc::now())?;
//! let digest = harvester
//!     .run(&configs, window, &KeywordSpec::parse("payments, bank", false), DigestFormat::Html)
//!     .await?;
//! ```

pub mod cli;
pub mod dedup;
pub mod error;
pub mod keywords;
pub mod models;
pub mod orchestrator;
pub mod outputs;
pub mod presets;
pub mod sources;
pub mod transport;
pub mod utils;
pub mod window;

pub use error::{HarvestError, MalformedItem, SourceError};
pub use keywords::{KeywordMatcher, KeywordSpec, MatchMode};
pub use models::{Digest, DigestFormat, Item, SourceConfig, SourceReport, SourceStatus};
pub use orchestrator::{HarvestOptions, Harvester, RetryPolicy};
pub use window::{HarvestWindow, UndatedPolicy};
