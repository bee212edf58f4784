//! RSS, Atom and sitemap parsing.
//!
//! Documents are deserialized with `quick_xml::de`. The root element name is
//! not checked, so one schema covers RSS 2.0 (`<rss><channel><item>`),
//! RSS 1.0 (`<rdf:RDF><item>`) and Atom (`<feed><entry>`).

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use url::Url;

use crate::error::MalformedItem;
use crate::models::{Item, ItemPayload};

/// Element text; attributes are ignored.
#[derive(Debug, Default, Deserialize)]
struct Text {
    #[serde(rename = "$text", default)]
    value: String,
}

fn text(t: &Option<Text>) -> Option<String> {
    t.as_ref()
        .map(|t| t.value.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn first_text(ts: &[Text]) -> Option<String> {
    ts.iter()
        .map(|t| t.value.trim())
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Default, Deserialize)]
struct FeedDoc {
    channel: Option<RssChannel>,
    #[serde(default)]
    item: Vec<RssItem>,
    #[serde(default)]
    entry: Vec<AtomEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct RssChannel {
    #[serde(default)]
    item: Vec<RssItem>,
}

/// Fields are matched on local names, so `media:title` lands in `title` and
/// `atom:link` in `link`; lists keep such repeats from failing the feed.
#[derive(Debug, Default, Deserialize)]
struct RssItem {
    #[serde(default)]
    title: Vec<Text>,
    #[serde(default)]
    link: Vec<Text>,
    guid: Option<Text>,
    #[serde(default)]
    description: Vec<Text>,
    /// `content:encoded`.
    #[serde(default)]
    encoded: Vec<Text>,
    #[serde(rename = "pubDate")]
    pub_date: Option<Text>,
    /// `dc:date`, the only date RSS 1.0 items carry.
    #[serde(default)]
    date: Vec<Text>,
}

#[derive(Debug, Default, Deserialize)]
struct AtomEntry {
    title: Option<Text>,
    id: Option<Text>,
    #[serde(default)]
    link: Vec<AtomLink>,
    summary: Option<Text>,
    content: Option<Text>,
    updated: Option<Text>,
    published: Option<Text>,
}

#[derive(Debug, Default, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SitemapDoc {
    #[serde(default)]
    url: Vec<SitemapEntry>,
    #[serde(default)]
    sitemap: Vec<SitemapEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct SitemapEntry {
    loc: Option<Text>,
    lastmod: Option<Text>,
}

/// A parsed sitemap: page URLs with `lastmod`, plus child sitemaps of an index.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Sitemap {
    pub urls: Vec<(String, Option<DateTime<Utc>>)>,
    pub children: Vec<String>,
}

/// Cheap sniff used during feed discovery.
pub fn looks_like_feed(body: &str) -> bool {
    let head: String = body.chars().take(2048).collect();
    head.contains("<rss") || head.contains("<feed") || head.contains("<rdf:RDF")
}

/// HTML entities that are not valid XML but show up in real feeds.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", "&#160;")
        .replace("&ndash;", "&#8211;")
        .replace("&mdash;", "&#8212;")
        .replace("&ldquo;", "&#8220;")
        .replace("&rdquo;", "&#8221;")
        .replace("&lsquo;", "&#8216;")
        .replace("&rsquo;", "&#8217;")
        .replace("&hellip;", "&#8230;")
}

/// Parse a feed into per-entry results.
///
/// The outer error means the document itself is unreadable; inner errors are
/// entries without any usable identity.
pub fn parse_feed(
    xml: &str,
    feed_url: &str,
    source_id: &str,
) -> Result<Vec<Result<Item, MalformedItem>>, MalformedItem> {
    let doc: FeedDoc = from_str(&scrub_html_entities_for_xml(xml))
        .map_err(|e| MalformedItem::new(format!("unparseable feed {feed_url}: {e}")))?;

    let payload = || ItemPayload::Feed {
        feed_url: feed_url.to_string(),
    };
    let mut out = Vec::new();

    let rss_items = doc
        .channel
        .map(|c| c.item)
        .unwrap_or_default()
        .into_iter()
        .chain(doc.item);
    for it in rss_items {
        let link = first_text(&it.link).map(|l| resolve(feed_url, &l));
        let guid = text(&it.guid);
        let published = text(&it.pub_date)
            .or_else(|| first_text(&it.date))
            .and_then(|s| parse_datetime(&s));
        let body = first_text(&it.description)
            .or_else(|| first_text(&it.encoded))
            .unwrap_or_default();
        out.push(build_item(
            source_id,
            link,
            guid,
            first_text(&it.title),
            body,
            published,
            payload(),
        ));
    }

    for entry in doc.entry {
        let href = entry
            .link
            .iter()
            .filter(|l| matches!(l.rel.as_deref(), None | Some("") | Some("alternate")))
            .filter_map(|l| l.href.as_deref())
            .last()
            .map(|h| resolve(feed_url, h));
        let published = text(&entry.published)
            .or_else(|| text(&entry.updated))
            .and_then(|s| parse_datetime(&s));
        let body = text(&entry.summary)
            .or_else(|| text(&entry.content))
            .unwrap_or_default();
        out.push(build_item(
            source_id,
            href,
            text(&entry.id),
            text(&entry.title),
            body,
            published,
            payload(),
        ));
    }

    Ok(out)
}

fn build_item(
    source_id: &str,
    link: Option<String>,
    guid: Option<String>,
    title: Option<String>,
    body: String,
    published_at: Option<DateTime<Utc>>,
    raw_payload: ItemPayload,
) -> Result<Item, MalformedItem> {
    let external_id = link
        .as_deref()
        .map(canonical_link)
        .or(guid)
        .ok_or_else(|| {
            MalformedItem::new(format!(
                "entry {:?} has neither link nor guid",
                title.as_deref().unwrap_or("<untitled>")
            ))
        })?;
    Ok(Item {
        source_id: source_id.to_string(),
        external_id,
        published_at,
        title,
        body,
        url: link,
        raw_payload,
    })
}

pub fn parse_sitemap(xml: &str, sitemap_url: &str) -> Result<Sitemap, MalformedItem> {
    let doc: SitemapDoc = from_str(xml)
        .map_err(|e| MalformedItem::new(format!("unparseable sitemap {sitemap_url}: {e}")))?;
    let urls = doc
        .url
        .iter()
        .filter_map(|u| {
            let loc = text(&u.loc)?;
            Some((loc, text(&u.lastmod).and_then(|s| parse_datetime(&s))))
        })
        .collect();
    let children = doc.sitemap.iter().filter_map(|s| text(&s.loc)).collect();
    Ok(Sitemap { urls, children })
}

/// Item for a sitemap URL; the title is guessed from the last path segment.
pub fn sitemap_item(
    source_id: &str,
    sitemap_url: &str,
    loc: &str,
    lastmod: Option<DateTime<Utc>>,
) -> Item {
    Item {
        source_id: source_id.to_string(),
        external_id: canonical_link(loc),
        published_at: lastmod,
        title: Some(title_from_slug(loc)),
        body: String::new(),
        url: Some(loc.to_string()),
        raw_payload: ItemPayload::Sitemap {
            sitemap_url: sitemap_url.to_string(),
        },
    }
}

/// `https://x.com/news/big-bank-merger/` -> `Big Bank Merger`.
pub fn title_from_slug(loc: &str) -> String {
    let slug = loc
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(loc);
    let slug = slug.split(['?', '#']).next().unwrap_or(slug);
    let slug = slug
        .trim_end_matches(".html")
        .trim_end_matches(".htm")
        .trim_end_matches(".aspx");
    slug.split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut c = w.chars();
            match c.next() {
                Some(f) => f.to_uppercase().collect::<String>() + &c.as_str().to_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Link with the fragment removed; unparseable links are returned trimmed.
pub fn canonical_link(link: &str) -> String {
    match Url::parse(link.trim()) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => link.trim().to_string(),
    }
}

fn resolve(base: &str, href: &str) -> String {
    Url::parse(base)
        .and_then(|b| b.join(href.trim()))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.trim().to_string())
}

const NAIVE_PATTERNS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

const OFFSET_PATTERNS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// Parse the timestamp formats seen in feeds and sitemaps, normalised to UTC.
///
/// RFC 2822 first, then RFC 3339, then ISO-like variants with or without an
/// offset (naive values are taken as UTC), then a bare date.
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for pat in OFFSET_PATTERNS {
        if let Ok(dt) = DateTime::parse_from_str(s, pat) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    let naive = s.trim_end_matches('Z');
    for pat in NAIVE_PATTERNS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, pat) {
            return Some(dt.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
}
