//! Multiple-choice option reconstruction.
//!
//! OCR of a two-column option grid usually comes back as one line:
//! `Which is a base unit? A. Time B. Mass C. Length D. Charge`.
//! This splits the stem and options back onto separate lines.

use regex::Regex;
use std::sync::LazyLock;

use super::clean::tidy_punctuation;

/// Option marker `A.`..`D.` or `A)`..`D)` at the start of the text or after whitespace.
static OPTION_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\s)([A-D][.)])").unwrap());

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Fewer markers than this is treated as a stray letter, not an option list.
const MIN_OPTIONS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
struct OptionSpan {
    /// Byte offset of the marker letter.
    start: usize,
    /// Byte offset where the option body begins.
    body_start: usize,
    marker: String,
}

fn find_markers(text: &str) -> Vec<OptionSpan> {
    let mut spans = Vec::new();
    for caps in OPTION_MARKER.captures_iter(text) {
        let Some(m) = caps.get(1) else { continue };
        // The marker must be followed by whitespace, so "A.B" or "D.C." is not an option.
        let rest = &text[m.end()..];
        let Some(first) = rest.chars().next() else { continue };
        if !first.is_whitespace() {
            continue;
        }
        let skipped = rest.len() - rest.trim_start().len();
        spans.push(OptionSpan {
            start: m.start(),
            body_start: m.end() + skipped,
            marker: m.as_str().to_string(),
        });
    }
    spans
}

/// Put the stem and each inline option on their own line.
///
/// Text with fewer than two option markers is returned unchanged.
pub fn reconstruct_options(text: &str) -> String {
    let spans = find_markers(text);
    if spans.len() < MIN_OPTIONS {
        return text.to_string();
    }

    let mut options = Vec::with_capacity(spans.len());
    for (i, span) in spans.iter().enumerate() {
        let end = spans.get(i + 1).map(|next| next.start).unwrap_or(text.len());
        let body = if span.body_start < end {
            &text[span.body_start..end]
        } else {
            ""
        };
        let body = tidy_punctuation(WHITESPACE.replace_all(body, " ").trim());
        let body = body.trim();
        if body.is_empty() {
            continue;
        }
        options.push(format!("{} {}", span.marker, body));
    }

    if options.len() < MIN_OPTIONS {
        return text.to_string();
    }

    let stem = text[..spans[0].start].trim();
    if stem.is_empty() {
        options.join("\n")
    } else {
        format!("{}\n{}", stem, options.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_options_split() {
        let out = reconstruct_options("Which is a base unit? A. Time B. Mass C. Length D. Charge");
        assert_eq!(out, "Which is a base unit?\nA. Time\nB. Mass\nC. Length\nD. Charge");
    }

    #[test]
    fn test_stem_without_question_mark() {
        let out = reconstruct_options("The SI unit of force is A) newton B) joule");
        assert_eq!(out, "The SI unit of force is\nA) newton\nB) joule");
    }

    #[test]
    fn test_options_already_on_lines() {
        let text = "Pick one:\nA. Red\nB. Blue\nC. Green";
        assert_eq!(reconstruct_options(text), text);
    }

    #[test]
    fn test_single_marker_unchanged() {
        let text = "Vitamin C. is found in citrus fruit";
        assert_eq!(reconstruct_options(text), text);
    }

    #[test]
    fn test_marker_needs_whitespace() {
        let text = "Explain why A.B equals B.A for vectors";
        assert_eq!(reconstruct_options(text), text);
    }

    #[test]
    fn test_option_body_tidied() {
        let out = reconstruct_options("Choose A. first  , item B. second !! one");
        assert_eq!(out, "Choose\nA. first, item\nB. second! one");
    }
}
