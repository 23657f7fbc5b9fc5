//! Question segmentation.
//!
//! Normalized text is scanned line by line. Each line is tested against an
//! ordered cascade of marker rules; the first rule that matches opens a new
//! question and closes the previous one. Lines in between are the question
//! body. A numbered line the cascade rejected can still open the next
//! question if its number follows on closely from the open one.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use super::clean::TextCleaner;
use super::{preview, RawQuestion};
use crate::config::SegmentationConfig;

static LENIENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([1-9]\d?)[.)]\s+(.{5,})").unwrap());
static QUESTION_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i:question)\s+(\d+)[.):]?\s+[A-Z]").unwrap());
static Q_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i:q)\.?\s*(\d+)[.):]\s+[A-Z]").unwrap());
static NUMBERED_CAPITAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([1-9]\d?)[.)]\s+[A-Z]").unwrap());
static NUMBERED_LOOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([1-9]\d?)[.)]\s*[A-Z]").unwrap());
static BARE_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([1-9]\d?)[.)]$").unwrap());

static OPTION_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-D][.)]\s+").unwrap());
static MARKER_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:question\s*)?(?:q\.?\s*)?\d+[.):]?\s*").unwrap());
/// A number re-captured at the end of a body: on its own final line, or a
/// trailing `Question N` / `QN` token.
static TRAILING_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:\n[ \t]*(?:question[ \t]*)?(?:q\.?[ \t]*)?\d+[.):]?|[ \t]+(?:question|q\.?)[ \t]*\d+[.):]?)\s*$",
    )
    .unwrap()
});
static MARKS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\((\d+)\s*marks?\)").unwrap());

/// Extra condition a numbered marker must pass, judged against the previous non-blank line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Guard {
    None,
    /// Previous line must not end in a digit (`0.5` split across lines).
    Decimal,
    /// As `Decimal`, and a short line after `,` `;` `:` is a list item, not a question.
    DecimalOrListItem,
}

impl Guard {
    fn allows(self, line: &str, prev: Option<&str>) -> bool {
        let Some(prev) = prev else { return true };
        let ends_in_digit = prev.chars().last().map(|c| c.is_ascii_digit()).unwrap_or(false);
        match self {
            Guard::None => true,
            Guard::Decimal => !ends_in_digit,
            Guard::DecimalOrListItem => {
                let continues_list = prev.ends_with([',', ';', ':']) && line.chars().count() < 20;
                !ends_in_digit && !continues_list
            }
        }
    }
}

struct MarkerRule {
    name: &'static str,
    pattern: &'static LazyLock<Regex>,
    guard: Guard,
}

impl MarkerRule {
    fn detect(&self, line: &str, prev: Option<&str>, max_number: u32) -> Option<u32> {
        let caps = self.pattern.captures(line)?;
        let number: u32 = caps.get(1)?.as_str().parse().ok()?;
        if !(1..=max_number).contains(&number) || !self.guard.allows(line, prev) {
            return None;
        }
        Some(number)
    }
}

/// Ordered marker rules; first match wins.
struct Cascade {
    rules: &'static [MarkerRule],
    /// Let a close-following number open the next question from inside a body.
    follow_numbering: bool,
}

static PRIMARY_RULES: [MarkerRule; 6] = [
    MarkerRule { name: "lenient", pattern: &LENIENT, guard: Guard::DecimalOrListItem },
    MarkerRule { name: "question_word", pattern: &QUESTION_WORD, guard: Guard::None },
    MarkerRule { name: "q_prefix", pattern: &Q_PREFIX, guard: Guard::None },
    MarkerRule { name: "numbered_capital", pattern: &NUMBERED_CAPITAL, guard: Guard::DecimalOrListItem },
    MarkerRule { name: "numbered_loose", pattern: &NUMBERED_LOOSE, guard: Guard::None },
    MarkerRule { name: "bare_number", pattern: &BARE_NUMBER, guard: Guard::Decimal },
];

static PERMISSIVE_RULES: [MarkerRule; 4] = [
    MarkerRule { name: "question_word", pattern: &QUESTION_WORD, guard: Guard::None },
    MarkerRule { name: "q_prefix", pattern: &Q_PREFIX, guard: Guard::None },
    MarkerRule { name: "numbered_capital", pattern: &NUMBERED_CAPITAL, guard: Guard::None },
    MarkerRule { name: "lenient", pattern: &LENIENT, guard: Guard::None },
];

static PRIMARY: Cascade = Cascade { rules: &PRIMARY_RULES, follow_numbering: true };
static PERMISSIVE: Cascade = Cascade { rules: &PERMISSIVE_RULES, follow_numbering: false };

/// Which strategy produced the questions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationPass {
    LineBased,
    Permissive,
    Paragraph,
    #[default]
    None,
}

struct OpenQuestion {
    number: u32,
    lines: Vec<String>,
}

impl OpenQuestion {
    fn start(number: u32, first_line: &str) -> Self {
        let first = MARKER_PREFIX.replace(first_line, "");
        let lines = if first.trim().is_empty() {
            Vec::new()
        } else {
            vec![first.trim().to_string()]
        };
        Self { number, lines }
    }
}

/// Splits normalized text into question records.
pub struct Segmenter<'a> {
    cleaner: TextCleaner<'a>,
    settings: &'a SegmentationConfig,
}

impl<'a> Segmenter<'a> {
    pub fn new(cleaner: TextCleaner<'a>, settings: &'a SegmentationConfig) -> Self {
        Self { cleaner, settings }
    }

    /// Segment `text`, falling back to a permissive pass and then to paragraphs.
    pub fn segment(&self, text: &str) -> (Vec<RawQuestion>, SegmentationPass) {
        if text.trim().is_empty() {
            return (Vec::new(), SegmentationPass::None);
        }
        let lines: Vec<&str> = text.lines().collect();

        let questions = self.scan(&lines, &PRIMARY);
        if !questions.is_empty() {
            info!("Line-based segmentation found {} questions", questions.len());
            return (questions, SegmentationPass::LineBased);
        }

        info!("Line-based segmentation found no questions, trying permissive markers");
        let questions = self.scan(&lines, &PERMISSIVE);
        if !questions.is_empty() {
            info!("Permissive segmentation found {} questions", questions.len());
            return (questions, SegmentationPass::Permissive);
        }

        warn!("No question markers found, splitting on paragraphs");
        let questions = self.split_paragraphs(text);
        if questions.is_empty() {
            (questions, SegmentationPass::None)
        } else {
            info!("Paragraph fallback produced {} questions", questions.len());
            (questions, SegmentationPass::Paragraph)
        }
    }

    fn scan(&self, lines: &[&str], cascade: &Cascade) -> Vec<RawQuestion> {
        let mut questions = Vec::new();
        let mut open: Option<OpenQuestion> = None;
        let mut prev: Option<&str> = None;

        for &raw in lines {
            let line = raw.trim();
            if line.is_empty() {
                if let Some(q) = open.as_mut() {
                    q.lines.push(String::new());
                }
                continue;
            }

            if let Some(number) = self.detect_marker(line, prev, cascade) {
                if let Some(q) = open.take() {
                    self.close(q, &mut questions);
                }
                open = Some(OpenQuestion::start(number, line));
            } else if let Some(current) = open.as_ref().map(|q| q.number) {
                match self.next_in_sequence(line, current, cascade) {
                    Some(next) => {
                        debug!("Numbered line continues the sequence as Q{}: '{}'", next, preview(line));
                        if let Some(q) = open.take() {
                            self.close(q, &mut questions);
                        }
                        open = Some(OpenQuestion::start(next, line));
                    }
                    None => {
                        if let Some(q) = open.as_mut() {
                            q.lines.push(line.to_string());
                        }
                    }
                }
            }
            // Lines before the first marker are header text.

            prev = Some(line);
        }

        if let Some(q) = open.take() {
            self.close(q, &mut questions);
        }
        questions
    }

    fn detect_marker(&self, line: &str, prev: Option<&str>, cascade: &Cascade) -> Option<u32> {
        let max = self.settings.max_question_number;
        cascade.rules.iter().find_map(|rule| {
            let number = rule.detect(line, prev, max)?;
            debug!("Marker '{}' opened Q{}: '{}'", rule.name, number, preview(line));
            Some(number)
        })
    }

    /// A numbered line inside a body that should open the next question anyway.
    fn next_in_sequence(&self, line: &str, current: u32, cascade: &Cascade) -> Option<u32> {
        if !cascade.follow_numbering || OPTION_LINE.is_match(line) {
            return None;
        }
        let caps = LENIENT.captures(line)?;
        let number: u32 = caps.get(1)?.as_str().parse().ok()?;
        let in_range = number <= self.settings.max_question_number;
        let follows = number > current && number - current <= self.settings.numbering_window;
        (in_range && follows).then_some(number)
    }

    fn close(&self, question: OpenQuestion, out: &mut Vec<RawQuestion>) {
        let joined = question.lines.join("\n");
        let raw_text = TRAILING_MARKER.replace(joined.trim(), "").trim().to_string();

        let min_chars = self.settings.min_question_chars;
        if raw_text.chars().count() <= min_chars {
            debug!("Dropping Q{}: too short ({:?})", question.number, raw_text);
            return;
        }

        let marks = parse_marks(&raw_text);
        let text = self.cleaner.clean_question(&raw_text);
        if text.chars().count() <= min_chars {
            debug!("Dropping Q{}: too short after cleaning", question.number);
            return;
        }

        let options = text.lines().filter(|l| OPTION_LINE.is_match(l)).count();
        if options > 0 {
            debug!("Extracted Q{} (MCQ with {} options)", question.number, options);
        } else {
            debug!("Extracted Q{}: {}", question.number, preview(&text));
        }

        out.push(RawQuestion {
            question_number: question.number,
            marks,
            text,
            raw_text,
        });
    }

    /// Last resort: every substantial paragraph becomes a question.
    fn split_paragraphs(&self, text: &str) -> Vec<RawQuestion> {
        let mut questions = Vec::new();
        for para in text.split("\n\n").map(str::trim) {
            if para.chars().count() <= self.settings.min_paragraph_chars {
                continue;
            }
            let number = questions.len() as u32 + 1;
            if number > self.settings.max_question_number {
                break;
            }
            let cleaned = self.cleaner.clean_question(para);
            if cleaned.chars().count() <= self.settings.min_question_chars {
                continue;
            }
            questions.push(RawQuestion {
                question_number: number,
                marks: None,
                text: cleaned,
                raw_text: para.to_string(),
            });
        }
        questions
    }
}

/// `(N marks)` anywhere in the text. Unparseable values give `None`.
pub fn parse_marks(text: &str) -> Option<u32> {
    MARKS.captures(text)?.get(1)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::watermark::WatermarkFilter;

    fn segment(text: &str) -> (Vec<RawQuestion>, SegmentationPass) {
        let filter = WatermarkFilter::default();
        let settings = SegmentationConfig::default();
        Segmenter::new(TextCleaner::new(&filter), &settings).segment(text)
    }

    fn numbers(questions: &[RawQuestion]) -> Vec<u32> {
        questions.iter().map(|q| q.question_number).collect()
    }

    #[test]
    fn test_question_word_markers() {
        let (qs, pass) = segment("Question 1: What is 2+2? (1 marks)\nQuestion 2: Name the capital of France.");
        assert_eq!(pass, SegmentationPass::LineBased);
        assert_eq!(numbers(&qs), vec![1, 2]);
        assert_eq!(qs[0].marks, Some(1));
        assert!(qs[0].text.contains("What is 2+2?"));
        assert_eq!(qs[1].marks, None);
        assert_eq!(qs[1].text, "Name the capital of France.");
    }

    #[test]
    fn test_preamble_skipped_and_body_accumulated() {
        let text = "Physics Paper II\nAnswer all questions.\n1. Define acceleration and\nstate its SI unit.\n\n2. State Newton's first law of motion.";
        let (qs, _) = segment(text);
        assert_eq!(numbers(&qs), vec![1, 2]);
        assert_eq!(qs[0].text, "Define acceleration and\nstate its SI unit.");
        assert_eq!(qs[0].raw_text, "Define acceleration and\nstate its SI unit.");
    }

    #[test]
    fn test_bare_number_line_opens_question() {
        let (qs, _) = segment("1.\nWhich is a base unit? A. Time B. Mass C. Length D. Charge");
        assert_eq!(numbers(&qs), vec![1]);
        assert_eq!(qs[0].text, "Which is a base unit?\nA. Time\nB. Mass\nC. Length\nD. Charge");
    }

    #[test]
    fn test_option_lines_stay_in_body() {
        let text = "5. Which gas is needed for respiration?\nA. Oxygen\nB. Nitrogen\nC. Helium\nD. Argon";
        let (qs, _) = segment(text);
        assert_eq!(qs.len(), 1);
        assert_eq!(qs[0].text.lines().count(), 5);
    }

    #[test]
    fn test_decimal_not_a_marker() {
        let text = "1. Consider the following value carefully\n0.012345678 is a small number\nExpress it in standard form.";
        let (qs, _) = segment(text);
        assert_eq!(numbers(&qs), vec![1]);
        assert!(qs[0].text.contains("0.012345678 is a small number"));
    }

    #[test]
    fn test_decimal_guard_after_digit() {
        let text = "3. The ratio was measured as 12\n7. of the total population sample\nExplain the result.";
        let (qs, _) = segment(text);
        assert_eq!(numbers(&qs), vec![3]);
        assert!(qs[0].text.contains("12\n7. of the total"));
    }

    #[test]
    fn test_close_number_opens_next_question() {
        // The guard rejects "4." after a digit, but 4 follows 3 closely enough.
        let text = "3. The ratio was measured as 12\n4. of the total population sample";
        let (qs, _) = segment(text);
        assert_eq!(numbers(&qs), vec![3, 4]);
    }

    #[test]
    fn test_window_edge_opens_question() {
        let text = "3. The ratio was measured as 12\n5. of the total population sample\nExplain the result.";
        let (qs, _) = segment(text);
        assert_eq!(numbers(&qs), vec![3, 5]);
        assert_eq!(qs[1].text, "of the total population sample\nExplain the result.");
    }

    #[test]
    fn test_just_past_window_stays_in_body() {
        let text = "3. The ratio was measured as 12\n6. of the total population sample\nExplain the result.";
        let (qs, _) = segment(text);
        assert_eq!(numbers(&qs), vec![3]);
        assert!(qs[0].text.contains("12\n6. of the total"));
    }

    #[test]
    fn test_option_lines_are_uppercase_only() {
        assert!(OPTION_LINE.is_match("A. Oxygen"));
        assert!(OPTION_LINE.is_match("D) Argon"));
        assert!(!OPTION_LINE.is_match("a. the first reason"));
        assert!(!OPTION_LINE.is_match("b) the second reason"));
    }

    #[test]
    fn test_list_item_guard() {
        let text = "3. Name the following items:\n1. a metal,\n2. a non-metal,\n4. Describe the properties of metals in detail.";
        let (qs, _) = segment(text);
        assert_eq!(numbers(&qs), vec![3, 4]);
        assert_eq!(qs[0].text, "Name the following items:\n1. a metal,\n2. a non-metal,");
    }

    #[test]
    fn test_out_of_window_number_is_body() {
        let text = "2. Explain the water cycle in stage 1\n9) stages are listed in the book\n3. Define condensation clearly.";
        let (qs, _) = segment(text);
        assert_eq!(numbers(&qs), vec![2, 3]);
        assert!(qs[0].text.contains("9) stages are listed"));
    }

    #[test]
    fn test_out_of_range_number_rejected() {
        let text = "Question 1: Describe the solar system.\n99. Planets orbit the sun in ellipses.";
        let (qs, _) = segment(text);
        assert_eq!(numbers(&qs), vec![1]);
        assert!(qs[0].text.contains("99. Planets"));
    }

    #[test]
    fn test_short_questions_dropped() {
        let (qs, _) = segment("1. Too short\n2. This one is long enough to keep.");
        assert_eq!(numbers(&qs), vec![2]);
    }

    #[test]
    fn test_trailing_marker_stripped() {
        let text = "Q1. Explain the term photosynthesis.\nQuestion 2\n\nQ3. Define transpiration in plants.";
        let (qs, _) = segment(text);
        assert_eq!(numbers(&qs), vec![1, 3]);
        assert_eq!(qs[0].raw_text, "Explain the term photosynthesis.");
    }

    #[test]
    fn test_permissive_pass() {
        // Every numbered line follows one ending in a digit, so the guarded rules reject them.
        let text = "Total 100\n1. describe the apparatus used in 1990\n2. explain the results obtained in 2001";
        let (qs, pass) = segment(text);
        assert_eq!(pass, SegmentationPass::Permissive);
        assert_eq!(numbers(&qs), vec![1, 2]);
    }

    #[test]
    fn test_paragraph_fallback() {
        let text = "Discuss the causes of the first world war.\n\nshort\n\nExplain the role of the league of nations.";
        let (qs, pass) = segment(text);
        assert_eq!(pass, SegmentationPass::Paragraph);
        assert_eq!(numbers(&qs), vec![1, 2]);
        assert!(qs.iter().all(|q| q.marks.is_none()));
    }

    #[test]
    fn test_empty_input() {
        let (qs, pass) = segment("   \n  ");
        assert!(qs.is_empty());
        assert_eq!(pass, SegmentationPass::None);
    }

    #[test]
    fn test_parse_marks() {
        assert_eq!(parse_marks("Define it (5 Marks)"), Some(5));
        assert_eq!(parse_marks("Define it (1 mark)"), Some(1));
        assert_eq!(parse_marks("Define it (99999999999 marks)"), None);
        assert_eq!(parse_marks("Define it"), None);
    }
}
