//! Watermark and boilerplate removal.
//!
//! Exam boards stamp every page with the same footer, header and banner text.
//! OCR faithfully reproduces all of it, so it has to go before segmentation
//! or it ends up glued to question bodies.

use regex::Regex;
use tracing::{debug, warn};

use crate::config::WatermarkConfig;

/// A keyword that only drops a line when its guard pattern matches too.
#[derive(Debug, Clone)]
struct GuardedKeyword {
    keyword: String,
    guard: Regex,
}

/// Compiled form of a profile's watermark vocabulary.
#[derive(Debug, Clone)]
pub struct WatermarkFilter {
    keywords: Vec<String>,
    guarded: Vec<GuardedKeyword>,
    fragments: Vec<Regex>,
    banner_min_chars: usize,
    banner_upper_ratio: f64,
}

/// Lines that survived filtering, plus how many were dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilteredLines<'a> {
    pub lines: Vec<&'a str>,
    pub removed: usize,
}

impl WatermarkFilter {
    /// Compile a profile's patterns. Invalid regexes are skipped with a warning.
    pub fn compile(config: &WatermarkConfig) -> Self {
        let keywords: Vec<String> = config
            .keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();

        let mut guarded = Vec::new();
        for g in &config.guarded_keywords {
            match Regex::new(&g.pattern) {
                Ok(guard) => guarded.push(GuardedKeyword {
                    keyword: g.keyword.trim().to_lowercase(),
                    guard,
                }),
                Err(e) => {
                    warn!(
                        "Skipping invalid guard for keyword '{}' ({}): {}",
                        g.keyword, g.pattern, e
                    );
                }
            }
        }

        let mut fragments = Vec::new();
        for pattern in &config.fragment_patterns {
            match Regex::new(pattern) {
                Ok(regex) => fragments.push(regex),
                Err(e) => warn!("Skipping invalid fragment pattern ({}): {}", pattern, e),
            }
        }

        debug!(
            "Compiled watermark filter: {} keywords, {} guarded, {} fragments",
            keywords.len(),
            guarded.len(),
            fragments.len()
        );

        Self {
            keywords,
            guarded,
            fragments,
            banner_min_chars: config.banner_min_chars,
            banner_upper_ratio: config.banner_upper_ratio,
        }
    }

    /// Drop boilerplate lines, keeping order and blank lines.
    pub fn filter<'a, I>(&self, lines: I) -> FilteredLines<'a>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut out = FilteredLines::default();
        for line in lines {
            if self.is_watermark(line) {
                out.removed += 1;
            } else {
                out.lines.push(line);
            }
        }
        out
    }

    /// Filter a whole text and re-join it with `\n`.
    pub fn filter_text(&self, text: &str) -> (String, usize) {
        let filtered = self.filter(text.lines());
        (filtered.lines.join("\n"), filtered.removed)
    }

    /// Whether a single line is boilerplate. Blank lines never are.
    pub fn is_watermark(&self, line: &str) -> bool {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return false;
        }

        let lower = trimmed.to_lowercase();
        if self.keywords.iter().any(|k| lower.contains(k.as_str())) {
            return true;
        }

        if self
            .guarded
            .iter()
            .any(|g| lower.contains(g.keyword.as_str()) && g.guard.is_match(trimmed))
        {
            return true;
        }

        self.is_banner(trimmed)
    }

    /// All-caps banner: long, letters only (no digits), no lowercase.
    fn is_banner(&self, line: &str) -> bool {
        if line.chars().count() <= self.banner_min_chars {
            return false;
        }

        let mut alnum = 0usize;
        let mut upper = 0usize;
        for c in line.chars() {
            if c.is_lowercase() || c.is_numeric() {
                return false;
            }
            if c.is_alphanumeric() {
                alnum += 1;
                if c.is_uppercase() {
                    upper += 1;
                }
            }
        }

        alnum > 0 && (upper as f64 / alnum as f64) > self.banner_upper_ratio
    }

    /// Remove inline watermark fragments anywhere in `text`.
    pub fn strip_fragments(&self, text: &str) -> String {
        let mut out = text.to_string();
        for regex in &self.fragments {
            if regex.is_match(&out) {
                out = regex.replace_all(&out, "").into_owned();
            }
        }
        out
    }
}

impl Default for WatermarkFilter {
    fn default() -> Self {
        Self::compile(&WatermarkConfig::default())
    }
}
