//! Text and file system helpers.
//!
//! - Markup stripping and paragraph excerpts for digest bodies
//! - String truncation for logging
//! - File name sanitising and output directory checks

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static PARA_SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n+").unwrap());
static BR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static BLOCK_END_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</(p|div|li|h[1-6]|blockquote)>").unwrap());
static SCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<(script|style)\b.*?</(script|style)>").unwrap());
static UNSAFE_FILE_CHARS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\-.\s]").unwrap());

/// Reduce markup to text, keeping line structure.
///
/// `<br>` and closing block tags become newlines; entities are decoded by the
/// HTML parser. Plain text passes through unchanged apart from `\r\n`.
pub fn plain_text(raw: &str) -> String {
    let normalized = raw.replace("\r\n", "\n").replace('\r', "\n");
    if !normalized.contains('<') && !normalized.contains('&') {
        return normalized;
    }
    let without_scripts = SCRIPT_RE.replace_all(&normalized, " ");
    let with_breaks = BR_RE.replace_all(&without_scripts, "\n");
    let with_blocks = BLOCK_END_RE.replace_all(&with_breaks, "$0\n\n");
    let fragment = Html::parse_fragment(&with_blocks);
    fragment.root_element().text().collect::<String>()
}

/// Plain text on one line, whitespace collapsed.
pub fn collapse_whitespace(s: &str) -> String {
    WS_RE.replace_all(s.trim(), " ").into_owned()
}

/// First `n` paragraphs of `raw` as plain text.
///
/// Paragraphs are separated by blank lines; when there are fewer than `n` of
/// those, non-empty lines are used instead. `n == 0` keeps everything.
pub fn excerpt_paragraphs(raw: &str, n: usize) -> Vec<String> {
    let text = plain_text(raw);
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    let paras: Vec<String> = PARA_SPLIT_RE
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    if n == 0 {
        return paras;
    }
    if paras.len() >= n {
        return paras.into_iter().take(n).collect();
    }
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(n)
        .map(str::to_string)
        .collect()
}

/// Truncate a string for logging, respecting char boundaries.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Make `s` usable as a file name stem: anything outside word characters,
/// `-`, `.` and whitespace becomes `_`, whitespace runs become a single `_`.
pub fn safe_filename(s: &str) -> String {
    let replaced = UNSAFE_FILE_CHARS_RE.replace_all(s, "_");
    let trimmed = replaced.trim();
    let out = WS_RE.replace_all(trimmed, "_").into_owned();
    if out.is_empty() { "digest".to_string() } else { out }
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory, then writes and removes a probe file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> std::io::Result<()> {
    fs::create_dir_all(path).await?;
    let probe_path = path.join("..__probe_write__");
    stdfs::File::create(&probe_path)?;
    let _ = stdfs::remove_file(&probe_path);
    info!("Output directory is writable");
    Ok(())
}
