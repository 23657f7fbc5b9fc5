//! Question extraction from OCR text.
//!
//! Raw text goes through watermark filtering, line normalization,
//! segmentation (with per-question cleaning and option reconstruction) and
//! finally deduplication. Nothing here fails: unusable input yields an empty
//! report, which callers surface as "no questions found".

pub mod clean;
pub mod dedup;
pub mod mcq;
pub mod normalize;
pub mod segment;
pub mod watermark;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{ExtractionConfig, SegmentationConfig};

use self::clean::TextCleaner;
use self::dedup::deduplicate;
use self::normalize::{
    split_combined, LineNormalizer, NormalizeStats, NumberingScheme, SiblingContext, Standalone,
};
use self::segment::Segmenter;
use self::watermark::WatermarkFilter;

pub use self::segment::SegmentationPass;

/// One extracted question, before classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawQuestion {
    pub question_number: u32,
    /// From a `(N marks)` annotation; `None` when absent.
    pub marks: Option<u32>,
    pub text: String,
    /// Joined body before cleaning.
    pub raw_text: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    #[default]
    SingleDocument,
    MultiDocument,
}

/// Diagnostics for one extraction run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractionStats {
    pub mode: ExtractionMode,
    pub documents: usize,
    pub normalized_chars: usize,
    pub watermark_lines_removed: usize,
    pub lines_merged: usize,
    pub pass: SegmentationPass,
    /// Questions found before deduplication.
    pub candidates: usize,
    pub duplicate_numbers: usize,
    pub duplicate_texts: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numbering: Option<NumberingScheme>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionReport {
    pub questions: Vec<RawQuestion>,
    pub stats: ExtractionStats,
}

impl ExtractionReport {
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

/// Extraction pipeline compiled for one profile. Holds no per-run state.
#[derive(Debug, Clone)]
pub struct QuestionExtractor {
    filter: WatermarkFilter,
    segmentation: SegmentationConfig,
}

impl QuestionExtractor {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            filter: WatermarkFilter::compile(&config.watermarks),
            segmentation: config.segmentation.clone(),
        }
    }

    /// Extract questions from a single document.
    pub fn extract(&self, text: &str) -> ExtractionReport {
        if text.trim().is_empty() {
            warn!("Empty OCR text provided");
            return ExtractionReport::default();
        }

        let parts = split_combined(text);
        if parts.len() > 1 {
            info!("Text holds {} combined documents, extracting them as siblings", parts.len());
            return self.extract_documents(&parts);
        }

        info!("Extracting questions from text ({} characters)", text.len());
        let mut norm = NormalizeStats::default();
        let normalized = LineNormalizer::new(&self.filter).normalize(text, &Standalone, &mut norm);

        let stats = ExtractionStats {
            mode: ExtractionMode::SingleDocument,
            documents: 1,
            ..ExtractionStats::default()
        };
        self.finish(&normalized, norm, stats)
    }

    /// Extract questions from several documents of the same paper.
    ///
    /// Blank documents are ignored. With a single remaining document this is
    /// the same as [`extract`](Self::extract).
    pub fn extract_documents<S: AsRef<str>>(&self, documents: &[S]) -> ExtractionReport {
        let texts: Vec<&str> = documents
            .iter()
            .map(AsRef::as_ref)
            .filter(|t| !t.trim().is_empty())
            .collect();

        match texts.len() {
            0 => {
                warn!("No document contained any text");
                return ExtractionReport {
                    questions: Vec::new(),
                    stats: ExtractionStats {
                        mode: ExtractionMode::MultiDocument,
                        ..ExtractionStats::default()
                    },
                };
            }
            1 => return self.extract(texts[0]),
            _ => {}
        }

        info!("Using multi-document context: {} documents", texts.len());
        let context = SiblingContext::scan(&texts);
        let normalizer = LineNormalizer::new(&self.filter);

        let mut norm = NormalizeStats::default();
        let normalized: Vec<String> = texts
            .iter()
            .map(|text| normalizer.normalize(text, &context, &mut norm))
            .filter(|text| !text.is_empty())
            .collect();

        let stats = ExtractionStats {
            mode: ExtractionMode::MultiDocument,
            documents: texts.len(),
            numbering: Some(context.scheme),
            ..ExtractionStats::default()
        };
        self.finish(&normalized.join("\n\n"), norm, stats)
    }

    fn finish(&self, normalized: &str, norm: NormalizeStats, mut stats: ExtractionStats) -> ExtractionReport {
        debug!("Normalized text sample: {}", preview(normalized));

        stats.normalized_chars = normalized.len();
        stats.watermark_lines_removed = norm.watermark_lines_removed;
        stats.lines_merged = norm.lines_merged;

        let cleaner = TextCleaner::new(&self.filter);
        let (candidates, pass) = Segmenter::new(cleaner, &self.segmentation).segment(normalized);
        stats.pass = pass;
        stats.candidates = candidates.len();

        let across_documents = stats.mode == ExtractionMode::MultiDocument;
        let (questions, dedup) = deduplicate(candidates, across_documents);
        stats.duplicate_numbers = dedup.duplicate_numbers;
        stats.duplicate_texts = dedup.duplicate_texts;

        info!(
            "Extracted {} unique questions ({} watermark lines removed, {} duplicates dropped)",
            questions.len(),
            stats.watermark_lines_removed,
            stats.duplicate_numbers + stats.duplicate_texts
        );
        if let Some(first) = questions.first() {
            debug!(
                "Sample question: Q{} ({:?} marks) - {}",
                first.question_number,
                first.marks,
                preview(&first.text)
            );
        }

        ExtractionReport { questions, stats }
    }
}

impl Default for QuestionExtractor {
    fn default() -> Self {
        Self::new(&ExtractionConfig::default())
    }
}

/// Extract from one document with the built-in profile.
pub fn extract_questions(text: &str) -> Vec<RawQuestion> {
    QuestionExtractor::default().extract(text).questions
}

/// Extract from several documents with the built-in profile.
pub fn extract_questions_from_documents<S: AsRef<str>>(documents: &[S]) -> Vec<RawQuestion> {
    QuestionExtractor::default().extract_documents(documents).questions
}

/// First 80 characters on one line, for log messages.
pub(crate) fn preview(text: &str) -> String {
    text.chars().take(80).collect::<String>().replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_document_report() {
        let report = QuestionExtractor::default().extract(
            "AKU-EB EXAMINATIONS 2025\nQuestion 1: What is 2+2? (1 marks)\nQuestion 2: Name the capital of France.\nPage 1 of 3",
        );

        assert_eq!(report.questions.len(), 2);
        assert_eq!(report.stats.mode, ExtractionMode::SingleDocument);
        assert_eq!(report.stats.pass, SegmentationPass::LineBased);
        assert_eq!(report.stats.watermark_lines_removed, 2);
        assert_eq!(report.stats.candidates, 2);
        assert!(report.stats.numbering.is_none());
    }

    #[test]
    fn test_combined_text_split_into_documents() {
        let combined = crate::ocr::combine_documents(&[
            ("a.pdf".to_string(), "1. Define the term velocity.".to_string()),
            ("b.pdf".to_string(), "2. Define the term acceleration.".to_string()),
        ]);
        let report = QuestionExtractor::default().extract(&combined);

        assert_eq!(report.stats.mode, ExtractionMode::MultiDocument);
        assert_eq!(report.stats.documents, 2);
        let texts: Vec<&str> = report.questions.iter().map(|q| q.text.as_str()).collect();
        assert_eq!(texts, vec!["Define the term velocity.", "Define the term acceleration."]);
    }

    #[test]
    fn test_blank_documents_ignored() {
        let extractor = QuestionExtractor::default();

        let none = extractor.extract_documents(&["", "  \n "]);
        assert!(none.is_empty());
        assert_eq!(none.stats.documents, 0);

        let one = extractor.extract_documents(&["", "1. Define the term velocity."]);
        assert_eq!(one.stats.mode, ExtractionMode::SingleDocument);
        assert_eq!(one.questions.len(), 1);
    }

    #[test]
    fn test_multi_document_dedup() {
        let docs = [
            "3. Define velocity and give its unit.\n4. State the law of inertia.",
            "3. Define velocity and give its unit.\n5. Describe uniform circular motion.",
        ];
        let report = QuestionExtractor::default().extract_documents(&docs);

        let numbers: Vec<u32> = report.questions.iter().map(|q| q.question_number).collect();
        assert_eq!(numbers, vec![3, 4, 5]);
        assert_eq!(report.stats.mode, ExtractionMode::MultiDocument);
        assert_eq!(report.stats.documents, 2);
        assert_eq!(report.stats.candidates, 4);
        assert_eq!(report.stats.duplicate_numbers, 1);
        assert!(report.stats.numbering.is_some());
    }

    #[test]
    fn test_repeated_text_under_new_number_dropped_across_documents() {
        let docs = [
            "1. Explain the greenhouse effect in detail.",
            "7. Explain the greenhouse   effect in detail.",
        ];
        let report = QuestionExtractor::default().extract_documents(&docs);

        assert_eq!(report.questions.len(), 1);
        assert_eq!(report.questions[0].question_number, 1);
        assert_eq!(report.stats.duplicate_texts, 1);
    }

    #[test]
    fn test_custom_profile() {
        let mut config = ExtractionConfig::default();
        config.watermarks.keywords.push("sample board".to_string());
        config.segmentation.max_question_number = 5;

        let report = QuestionExtractor::new(&config)
            .extract("Sample Board Finals\n1. Define a prime number.\n8. Define a composite number.");

        assert_eq!(report.questions.len(), 1);
        assert!(report.questions[0].text.contains("8. Define a composite number."));
        assert_eq!(report.stats.watermark_lines_removed, 1);
    }

    #[test]
    fn test_preview_truncates() {
        let long = "x".repeat(200);
        assert_eq!(preview(&long).len(), 80);
        assert_eq!(preview("a\nb"), "a\\nb");
    }
}
