//! Per-question text cleanup.

use regex::Regex;
use std::sync::LazyLock;

use super::mcq::reconstruct_options;
use super::watermark::WatermarkFilter;

static INLINE_SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\S\n]+").unwrap());
static EXCESS_NEWLINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());
static SPACE_BEFORE_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+([,.!?;:])").unwrap());
static ELLIPSIS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.{3,}").unwrap());

/// Punctuation that is never legitimately doubled. Periods are handled as ellipses.
const COLLAPSIBLE: &[char] = &[',', '!', '?', ';', ':'];

/// Remove the space before punctuation, collapse doubled punctuation and
/// normalize runs of periods to an ellipsis.
pub(crate) fn tidy_punctuation(text: &str) -> String {
    let tightened = SPACE_BEFORE_PUNCT.replace_all(text, "$1");

    let mut collapsed = String::with_capacity(tightened.len());
    let mut prev: Option<char> = None;
    for c in tightened.chars() {
        if COLLAPSIBLE.contains(&c) && prev == Some(c) {
            continue;
        }
        collapsed.push(c);
        prev = Some(c);
    }

    ELLIPSIS.replace_all(&collapsed, "...").into_owned()
}

fn is_pipe_token(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c == '|' || c == '¦')
}

/// Cleans one question's joined text.
#[derive(Debug, Clone, Copy)]
pub struct TextCleaner<'f> {
    filter: &'f WatermarkFilter,
}

impl<'f> TextCleaner<'f> {
    pub fn new(filter: &'f WatermarkFilter) -> Self {
        Self { filter }
    }

    /// Clean raw question text. Applying this to its own output changes nothing.
    pub fn clean(&self, raw: &str) -> String {
        let stripped = self.filter.strip_fragments(raw);

        let spaced: Vec<String> = stripped
            .lines()
            .map(|line| INLINE_SPACE.replace_all(line, " ").trim().to_string())
            .collect();
        let joined = spaced.join("\n");
        let joined = EXCESS_NEWLINES.replace_all(&joined, "\n\n");

        let depiped: Vec<String> = joined
            .lines()
            .map(|line| {
                line.split(' ')
                    .filter(|token| !is_pipe_token(token))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect();

        let tidied = tidy_punctuation(&depiped.join("\n"));

        tidied
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Clean, then split inline multiple-choice options onto their own lines.
    pub fn clean_question(&self, raw: &str) -> String {
        reconstruct_options(&self.clean(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean(raw: &str) -> String {
        let filter = WatermarkFilter::default();
        TextCleaner::new(&filter).clean(raw)
    }

    #[test]
    fn test_collapses_spaces_and_blank_lines() {
        let out = clean("  Define   momentum.\n\n\n\n\tGive   its unit.  ");
        assert_eq!(out, "Define momentum.\nGive its unit.");
    }

    #[test]
    fn test_strips_fragments_next_to_punctuation() {
        let out = clean("State Ohm's law.2025only (3 marks) AKU-EB, Examinations 2025.");
        assert!(!out.contains("2025only"));
        assert!(!out.contains("AKU-EB"));
        assert!(!out.contains("Examinations"));
        assert!(out.starts_with("State Ohm's law."));
        assert!(out.contains("(3 marks)"));
    }

    #[test]
    fn test_removes_pipes_and_tightens_punctuation() {
        let out = clean("Name two gases | found in air ,, and explain ..... why ??");
        assert_eq!(out, "Name two gases found in air, and explain... why?");
    }

    #[test]
    fn test_pipe_inside_word_kept() {
        assert_eq!(clean("Evaluate |x| for x = -3"), "Evaluate |x| for x = -3");
    }

    #[test]
    fn test_clean_is_fixed_point() {
        let samples = [
            "What is 2+2 ? (1 marks)   \n\n\n| A. 3 B. 4",
            "Explain ....  the  term ;; ratio :",
            "AKU-EB\nExaminations 2024 Describe   the process , briefly !!",
        ];
        let filter = WatermarkFilter::default();
        let cleaner = TextCleaner::new(&filter);
        for raw in samples {
            let once = cleaner.clean_question(raw);
            assert_eq!(cleaner.clean(&once), once, "not a fixed point: {raw:?}");
        }
    }

    #[test]
    fn test_clean_question_reconstructs_options() {
        let filter = WatermarkFilter::default();
        let out = TextCleaner::new(&filter)
            .clean_question("Which is a base unit?  A. Time B. Mass C. Length D. Charge");
        assert_eq!(out, "Which is a base unit?\nA. Time\nB. Mass\nC. Length\nD. Charge");
    }
}
