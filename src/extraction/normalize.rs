//! Line normalization: repairs OCR line breaks and spacing before segmentation.
//!
//! The base repair is the same for every document. What happens afterwards is
//! decided by a [`NormalizeStrategy`]: a lone document only loses stray
//! combined-OCR separators, while a document read alongside siblings also gets
//! a second merge pass and a second watermark filter.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use tracing::debug;

use super::watermark::WatermarkFilter;

/// A line that opens with something shaped like a question number.
static MARKER_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:question\s*)?(?:q\.?\s*)?\d+[.):]").unwrap());

static INLINE_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").unwrap());
static SPACE_BEFORE_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+([,.!?;:])").unwrap());
static SPACED_PUNCT_PAIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([,.!?;:])[ \t]+([,.!?;:])").unwrap());

static BROKEN_QUESTION_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bQ\s+uestion\s+(\d+)").unwrap());
static BROKEN_Q_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bQ[ \t]*\.[ \t]*(\d+)").unwrap());
static BROKEN_MARKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\((\d+)\s*m\s*arks?\)").unwrap());

static RUNAWAY_NEWLINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{4,}").unwrap());

static SEPARATOR_BANNER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:={3,}[^\n]*?)?={3,}").unwrap());
static FILE_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)-{3}\s*FILE:[^\n]*?-{3}[ \t]*").unwrap());

static NUMBERING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)question\s+(\d+)|\bq\.?\s*(\d+)|^([1-9]\d?)[.)]").unwrap()
});

/// Counters produced while normalizing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeStats {
    pub watermark_lines_removed: usize,
    pub lines_merged: usize,
}

/// Whether `next` reads as the continuation of `current`. Both are trimmed.
pub fn continues_on(current: &str, next: &str) -> bool {
    let current_len = current.chars().count();
    if current_len <= 3 || next.is_empty() {
        return false;
    }
    if current.ends_with(['.', '!', '?', ':', ';']) {
        return false;
    }
    if MARKER_START.is_match(next) {
        return false;
    }
    let next_is_capitalized = next.chars().next().map(char::is_uppercase).unwrap_or(false);
    !(next_is_capitalized && current_len > 20)
}

/// How question numbers are written across a batch of documents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NumberingScheme {
    /// `Question 3` style markers.
    pub question_word: usize,
    /// `Q3` / `Q.3` style markers.
    pub q_prefix: usize,
    /// `3.` / `3)` at the start of a line.
    pub numeric: usize,
    pub highest_number: Option<u32>,
}

impl NumberingScheme {
    pub fn scan<S: AsRef<str>>(documents: &[S]) -> Self {
        let mut scheme = Self::default();
        for doc in documents {
            for caps in NUMBERING.captures_iter(doc.as_ref()) {
                let number = if let Some(m) = caps.get(1) {
                    scheme.question_word += 1;
                    m
                } else if let Some(m) = caps.get(2) {
                    scheme.q_prefix += 1;
                    m
                } else if let Some(m) = caps.get(3) {
                    scheme.numeric += 1;
                    m
                } else {
                    continue;
                };
                if let Ok(n) = number.as_str().parse::<u32>() {
                    scheme.highest_number = Some(scheme.highest_number.map_or(n, |h| h.max(n)));
                }
            }
        }
        scheme
    }

    /// Name of the most frequent marker style, if any marker was seen.
    pub fn dominant(&self) -> Option<&'static str> {
        let styles = [
            ("question_word", self.question_word),
            ("q_prefix", self.q_prefix),
            ("numeric", self.numeric),
        ];
        styles
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .max_by_key(|(_, count)| *count)
            .map(|(name, _)| name)
    }
}

/// Remove combined-OCR banners and `--- FILE: name ---` headers.
fn strip_separators(text: &str) -> String {
    let text = SEPARATOR_BANNER.replace_all(text, "");
    FILE_HEADER.replace_all(&text, "").into_owned()
}

/// Split combined-OCR text back into its per-file documents.
///
/// Text without a `--- FILE: name ---` header comes back as one document.
pub fn split_combined(text: &str) -> Vec<String> {
    if !FILE_HEADER.is_match(text) {
        return vec![text.to_string()];
    }
    FILE_HEADER
        .split(text)
        .map(|part| SEPARATOR_BANNER.replace_all(part, "").trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

/// Post-processing applied after the shared line repair.
pub trait NormalizeStrategy {
    fn refine(&self, normalized: String, filter: &WatermarkFilter, stats: &mut NormalizeStats)
        -> String;
}

/// A document read on its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct Standalone;

impl NormalizeStrategy for Standalone {
    fn refine(&self, normalized: String, _: &WatermarkFilter, _: &mut NormalizeStats) -> String {
        if SEPARATOR_BANNER.is_match(&normalized) || FILE_HEADER.is_match(&normalized) {
            return strip_separators(&normalized).trim().to_string();
        }
        normalized
    }
}

/// A document read as one of several uploads of the same paper.
#[derive(Debug, Clone, Default)]
pub struct SiblingContext {
    pub scheme: NumberingScheme,
}

impl SiblingContext {
    pub fn scan<S: AsRef<str>>(documents: &[S]) -> Self {
        let scheme = NumberingScheme::scan(documents);
        debug!(
            "Sibling numbering: {} 'Question N', {} 'QN', {} 'N.' markers, highest {:?}, dominant {:?}",
            scheme.question_word,
            scheme.q_prefix,
            scheme.numeric,
            scheme.highest_number,
            scheme.dominant()
        );
        Self { scheme }
    }
}

impl NormalizeStrategy for SiblingContext {
    fn refine(
        &self,
        normalized: String,
        filter: &WatermarkFilter,
        stats: &mut NormalizeStats,
    ) -> String {
        // Chain adjacent continuation lines, including ones the first pass already joined.
        let mut lines: Vec<String> = Vec::new();
        for raw in normalized.lines() {
            let line = raw.trim();
            if line.is_empty() {
                lines.push(String::new());
                continue;
            }
            if let Some(prev) = lines.last_mut() {
                if !prev.is_empty() && continues_on(prev, line) {
                    prev.push(' ');
                    prev.push_str(line);
                    stats.lines_merged += 1;
                    continue;
                }
            }
            lines.push(line.to_string());
        }

        let text = strip_separators(&lines.join("\n"));

        let (text, removed) = filter.filter_text(&text);
        stats.watermark_lines_removed += removed;

        text.trim().to_string()
    }
}

/// Repairs line structure of raw OCR text.
#[derive(Debug, Clone, Copy)]
pub struct LineNormalizer<'f> {
    filter: &'f WatermarkFilter,
}

impl<'f> LineNormalizer<'f> {
    pub fn new(filter: &'f WatermarkFilter) -> Self {
        Self { filter }
    }

    /// Normalize `text` and let `strategy` refine the result.
    pub fn normalize(
        &self,
        text: &str,
        strategy: &dyn NormalizeStrategy,
        stats: &mut NormalizeStats,
    ) -> String {
        if text.trim().is_empty() {
            return String::new();
        }
        let repaired = self.repair(text, stats);
        strategy.refine(repaired, self.filter, stats)
    }

    fn repair(&self, text: &str, stats: &mut NormalizeStats) -> String {
        let filtered = self.filter.filter(text.lines());
        stats.watermark_lines_removed += filtered.removed;

        let mut lines: Vec<String> = filtered.lines.iter().map(|l| l.trim().to_string()).collect();
        let mut repaired = Vec::with_capacity(lines.len());

        for i in 0..lines.len() {
            let line = std::mem::take(&mut lines[i]);
            if line.is_empty() {
                repaired.push(line);
                continue;
            }

            let joined = match lines.get(i + 1) {
                Some(next) if continues_on(&line, next) => Some(format!("{} {}", line, next)),
                _ => None,
            };
            match joined {
                Some(joined) => {
                    // The consumed line stays behind as a blank.
                    lines[i + 1].clear();
                    stats.lines_merged += 1;
                    repaired.push(joined);
                }
                None => repaired.push(line),
            }
        }

        let text = repaired.join("\n");
        let text = INLINE_SPACE.replace_all(&text, " ");
        let text = SPACE_BEFORE_PUNCT.replace_all(&text, "$1");
        let text = SPACED_PUNCT_PAIR.replace_all(&text, "$1$2");

        let text = BROKEN_QUESTION_WORD.replace_all(&text, "Question $1");
        let text = BROKEN_Q_PREFIX.replace_all(&text, "Q$1");
        let text = BROKEN_MARKS.replace_all(&text, "($1 marks)");

        let text = RUNAWAY_NEWLINES.replace_all(&text, "\n\n\n");
        text.trim().to_string()
    }
}
