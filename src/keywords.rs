//! Keyword matching over item title and body.

use itertools::Itertools;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::Item;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// At least one term must occur.
    #[default]
    Any,
    /// Every term must occur.
    All,
}

/// Terms plus how to match them. No terms means "match everything".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeywordSpec {
    pub terms: Vec<String>,
    pub mode: MatchMode,
    pub case_sensitive: bool,
    /// Require word boundaries around each term instead of a plain substring hit.
    pub whole_word: bool,
}

impl KeywordSpec {
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            terms: terms.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Split user input on commas, semicolons and newlines, trim, drop blanks,
    /// and remove repeats keeping the first occurrence.
    pub fn parse(text: &str, case_sensitive: bool) -> Self {
        let terms = text
            .split([',', ';', '\n'])
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| {
                if case_sensitive {
                    t.to_string()
                } else {
                    t.to_lowercase()
                }
            })
            .unique()
            .collect();
        Self {
            terms,
            case_sensitive,
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: MatchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn whole_word(mut self, whole_word: bool) -> Self {
        self.whole_word = whole_word;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Pre-compiled form of a [`KeywordSpec`], shared by all source tasks.
#[derive(Debug)]
pub struct KeywordMatcher {
    mode: MatchMode,
    case_sensitive: bool,
    terms: Vec<Term>,
}

#[derive(Debug)]
enum Term {
    Substring(String),
    Word(Regex),
}

impl KeywordMatcher {
    pub fn new(spec: &KeywordSpec) -> Self {
        let terms = spec
            .terms
            .iter()
            .filter(|t| !t.trim().is_empty())
            .map(|t| compile_term(t, spec))
            .collect();
        Self {
            mode: spec.mode,
            case_sensitive: spec.case_sensitive,
            terms,
        }
    }

    pub fn matches(&self, item: &Item) -> bool {
        if self.terms.is_empty() {
            return true;
        }
        let text = item.searchable_text();
        let folded;
        let haystack = if self.case_sensitive {
            text.as_str()
        } else {
            folded = text.to_lowercase();
            folded.as_str()
        };
        let hit = |term: &Term| match term {
            Term::Substring(needle) => haystack.contains(needle.as_str()),
            Term::Word(re) => re.is_match(haystack),
        };
        match self.mode {
            MatchMode::Any => self.terms.iter().any(hit),
            MatchMode::All => self.terms.iter().all(hit),
        }
    }
}

fn compile_term(term: &str, spec: &KeywordSpec) -> Term {
    let term = term.trim();
    let needle = if spec.case_sensitive {
        term.to_string()
    } else {
        term.to_lowercase()
    };
    if !spec.whole_word {
        return Term::Substring(needle);
    }
    let pattern = format!(r"\b{}\b", regex::escape(&needle));
    match RegexBuilder::new(&pattern).build() {
        Ok(re) => Term::Word(re),
        Err(e) => {
            warn!(term = %term, error = %e, "Could not build word matcher; using substring");
            Term::Substring(needle)
        }
    }
}

/// One-shot convenience over [`KeywordMatcher`].
pub fn matches(item: &Item, spec: &KeywordSpec) -> bool {
    KeywordMatcher::new(spec).matches(item)
}
