//! Analysis orchestrator: OCR, extraction, classification, storage.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::classify::{classify_all, QuestionClassifier, UNKNOWN};
use crate::config::ExtractionConfig;
use crate::error::{AnalysisError, ClassifyError};
use crate::extraction::QuestionExtractor;
use crate::ocr::{OcrChain, OcrInput};
use crate::schema::{now_iso8601, AnalysisReport, ClassifiedQuestion, ProcessedDocument, TopicFrequency};
use crate::store::QuestionStore;

pub const ANALYZER_VERSION: &str = concat!("exam-pulse/", env!("CARGO_PKG_VERSION"));

pub struct Analyzer {
    ocr: OcrChain,
    classifier: Arc<dyn QuestionClassifier>,
    store: QuestionStore,
}

impl Analyzer {
    pub fn new(ocr: OcrChain, classifier: Arc<dyn QuestionClassifier>, store: QuestionStore) -> Self {
        Self {
            ocr,
            classifier,
            store,
        }
    }

    pub fn store(&self) -> &QuestionStore {
        &self.store
    }

    pub fn ocr(&self) -> &OcrChain {
        &self.ocr
    }

    /// Analyze the uploaded documents of one paper with the given profile.
    pub async fn analyze(
        &self,
        documents: Vec<OcrInput>,
        profile: &ExtractionConfig,
    ) -> Result<AnalysisReport, AnalysisError> {
        info!(
            "Analyzing {} documents with profile '{}' (classifier={})",
            documents.len(),
            profile.name,
            self.classifier.name()
        );

        let mut processed_files = Vec::new();
        let mut failed_files = Vec::new();
        let mut texts = Vec::new();

        for input in &documents {
            match self.ocr.run_best(input).await {
                Some(ocr) => {
                    let content_hash = {
                        let mut hasher = Sha256::new();
                        hasher.update(ocr.text.as_bytes());
                        format!("{:x}", hasher.finalize())
                    };
                    processed_files.push(ProcessedDocument {
                        filename: input.filename.clone(),
                        content_hash,
                        chars: ocr.text.len(),
                        total_pages: ocr.total_pages,
                        provider: ocr.provider_name,
                    });
                    texts.push(ocr.text);
                }
                None => failed_files.push(input.filename.clone()),
            }
        }

        if texts.is_empty() {
            return Err(AnalysisError::NoText {
                failed: failed_files,
            });
        }

        let combined_ocr_length: usize = texts.iter().map(String::len).sum();
        let extraction = QuestionExtractor::new(profile).extract_documents(&texts);
        if extraction.is_empty() {
            warn!(
                "No questions found in {} documents ({} chars of text)",
                texts.len(),
                combined_ocr_length
            );
            return Err(AnalysisError::NoQuestions);
        }

        let classified = classify_all(self.classifier.as_ref(), &extraction.questions)
            .await
            .map_err(|e| match e {
                ClassifyError::Authentication => AnalysisError::Authentication,
                other => AnalysisError::Classification(other),
            })?;

        let topic_frequencies = topic_frequencies(&classified);
        let questions: Vec<_> = classified.into_iter().map(|q| self.store.insert(q)).collect();

        info!(
            "Analysis complete: {} questions, {} topics, {} failed files",
            questions.len(),
            topic_frequencies.len(),
            failed_files.len()
        );

        Ok(AnalysisReport {
            id: Uuid::new_v4().to_string(),
            profile: profile.name.clone(),
            analyzed_at: now_iso8601(),
            analyzer_version: ANALYZER_VERSION.to_string(),
            processed_files,
            failed_files,
            combined_ocr_length,
            questions_before_dedup: extraction.stats.candidates,
            total_questions: questions.len(),
            questions,
            topic_frequencies,
            extraction: extraction.stats,
        })
    }
}

/// Count questions per topic, excluding `Unknown`.
///
/// Percentages are relative to all questions, including unknown ones, and
/// rounded to two decimals. Sorted by frequency, then topic name.
pub fn topic_frequencies(questions: &[ClassifiedQuestion]) -> Vec<TopicFrequency> {
    if questions.is_empty() {
        return Vec::new();
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for q in questions.iter().filter(|q| q.topic != UNKNOWN) {
        *counts.entry(q.topic.as_str()).or_default() += 1;
    }

    let total = questions.len() as f64;
    let mut frequencies: Vec<TopicFrequency> = counts
        .into_iter()
        .map(|(topic, frequency)| TopicFrequency {
            topic: topic.to_string(),
            frequency,
            percentage: (frequency as f64 / total * 10_000.0).round() / 100.0,
        })
        .collect();

    frequencies.sort_by(|a, b| b.frequency.cmp(&a.frequency).then_with(|| a.topic.cmp(&b.topic)));
    frequencies
}
