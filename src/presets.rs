//! Built-in source sets and curated feeds.
//!
//! Some sites hide their useful feeds behind category paths that discovery
//! would never find; [`curated_feeds`] lists those per domain. A preset name
//! (see [`preset_sites`]) expands into a list of sites.

use crate::error::HarvestError;
use crate::models::{SiteSource, domain_of};

pub const DEFAULT_PRESET: &str = "fintech";

const PRESETS: &[(&str, &[&str])] = &[(
    "fintech",
    &[
        "https://www.finextra.com",
        "https://techcrunch.com",
        "https://www.pymnts.com",
        "https://www.thepaypers.com",
    ],
)];

const FINEXTRA_FEEDS: &[&str] = &[
    "https://www.finextra.com/rss/allnews.aspx",
    "https://www.finextra.com/rss/payments",
    "https://www.finextra.com/rss/retail",
];

const CURATED_FEEDS: &[(&str, &[&str])] = &[
    ("www.finextra.com", FINEXTRA_FEEDS),
    ("finextra.com", FINEXTRA_FEEDS),
    (
        "techcrunch.com",
        &[
            "https://techcrunch.com/category/fintech/feed/",
            "https://techcrunch.com/tag/payments/feed/",
            "https://techcrunch.com/tag/banking/feed/",
        ],
    ),
    ("www.pymnts.com", &["https://www.pymnts.com/feed/"]),
    ("www.thepaypers.com", &["https://www.thepaypers.com/rss"]),
];

pub fn preset_names() -> impl Iterator<Item = &'static str> {
    PRESETS.iter().map(|(name, _)| *name)
}

/// Sites of a named preset, case-insensitive.
pub fn preset_sites(name: &str) -> Result<&'static [&'static str], HarvestError> {
    PRESETS
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name.trim()))
        .map(|(_, sites)| *sites)
        .ok_or_else(|| {
            HarvestError::config(format!(
                "unknown preset {name:?}; available: {}",
                preset_names().collect::<Vec<_>>().join(", ")
            ))
        })
}

/// Curated feed URLs for the domain of `site_url`, if any.
pub fn curated_feeds(site_url: &str) -> &'static [&'static str] {
    let domain = domain_of(site_url);
    CURATED_FEEDS
        .iter()
        .find(|(d, _)| *d == domain)
        .map(|(_, feeds)| *feeds)
        .unwrap_or(&[])
}

/// Prepend curated feeds to `site`, skipping ones it already lists.
pub fn apply_curated(site: &mut SiteSource) {
    let curated = curated_feeds(&site.url)
        .iter()
        .map(|f| f.to_string())
        .filter(|f| !site.feeds.contains(f))
        .collect::<Vec<_>>();
    if !curated.is_empty() {
        site.feeds.splice(0..0, curated);
    }
}
