//! Topic and question-type classification.
//!
//! Classification is best-effort: every failure except a rejected API key
//! falls back to a deterministic local guess.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use crate::error::ClassifyError;
use crate::extraction::{preview, RawQuestion};
use crate::openrouter::{json_payload, Message, OpenRouterClient};
use crate::schema::ClassifiedQuestion;

pub const UNKNOWN: &str = "Unknown";
pub const MULTIPLE_CHOICE: &str = "Multiple Choice";

static OPTION_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^[A-D][.)]\s+").unwrap());

const SYSTEM_PROMPT: &str =
    "You are an expert at classifying exam questions. Return only valid JSON.";

/// What a classifier thinks of one question. Missing fields are resolved later.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Classification {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub qtype: Option<String>,
    #[serde(default, deserialize_with = "lenient_marks")]
    pub marks: Option<u32>,
}

/// Accepts `3`, `3.0`, `"3"` or `null`; anything else is treated as absent.
fn lenient_marks<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(marks_from_value))
}

fn marks_from_value(value: &serde_json::Value) -> Option<u32> {
    match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64))
            .and_then(|n| u32::try_from(n).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[async_trait]
pub trait QuestionClassifier: Send + Sync {
    fn name(&self) -> &str;
    async fn classify(&self, question: &RawQuestion) -> Result<Classification, ClassifyError>;
}

/// Classifies through an OpenRouter-hosted model.
pub struct OpenRouterClassifier {
    client: OpenRouterClient,
}

impl OpenRouterClassifier {
    pub fn new(client: OpenRouterClient) -> Self {
        Self { client }
    }

    fn prompt(question: &RawQuestion) -> String {
        let marks = question
            .marks
            .map(|m| m.to_string())
            .unwrap_or_else(|| "null".to_string());
        format!(
            r#"Classify this exam question and return ONLY valid JSON (no markdown, no code blocks, just JSON):
{{
  "topic": "topic name (e.g., Algebra, Geometry, Calculus, Physics, Chemistry, etc.)",
  "qtype": "question type (e.g., Multiple Choice, Short Answer, Essay, Problem Solving, etc.)",
  "marks": {marks},
  "question_number": {number}
}}

Question text:
{text}

Return ONLY valid JSON. Do not include any text outside the JSON."#,
            marks = marks,
            number = question.question_number,
            text = question.text
        )
    }
}

#[async_trait]
impl QuestionClassifier for OpenRouterClassifier {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn classify(&self, question: &RawQuestion) -> Result<Classification, ClassifyError> {
        let messages = vec![Message::system(SYSTEM_PROMPT), Message::user(Self::prompt(question))];
        let response = self.client.chat(messages).await?;
        debug!("Raw classification for Q{}: {}", question.question_number, preview(&response));
        parse_llm_json(&response)
    }
}

/// Classifier used when no model is configured. Always returns the local guess.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClassifier;

#[async_trait]
impl QuestionClassifier for LocalClassifier {
    fn name(&self) -> &str {
        "local"
    }

    async fn classify(&self, question: &RawQuestion) -> Result<Classification, ClassifyError> {
        Ok(fallback_classification(question))
    }
}

/// Deterministic guess: topic unknown, multiple choice when two or more option lines are present.
pub fn fallback_classification(question: &RawQuestion) -> Classification {
    let options = OPTION_LINE.find_iter(&question.text).count();
    let qtype = if options >= 2 { MULTIPLE_CHOICE } else { UNKNOWN };
    Classification {
        topic: Some(UNKNOWN.to_string()),
        qtype: Some(qtype.to_string()),
        marks: None,
    }
}

/// Merge a classification with the extracted question.
///
/// Marks come from the classifier, then the extractor, then default to 0.
/// The question number is always the extractor's.
pub fn resolve(
    question: &RawQuestion,
    classification: Classification,
    error: Option<String>,
) -> ClassifiedQuestion {
    let non_blank = |s: Option<String>| s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    ClassifiedQuestion {
        question_number: question.question_number,
        question_text: question.text.clone(),
        topic: non_blank(classification.topic).unwrap_or_else(|| UNKNOWN.to_string()),
        qtype: non_blank(classification.qtype).unwrap_or_else(|| UNKNOWN.to_string()),
        marks: classification.marks.or(question.marks).unwrap_or(0),
        classification_error: error,
    }
}

/// Classify every question in order.
///
/// The first question doubles as a credentials check: an authentication
/// failure there aborts the run. Any other failure falls back per question.
pub async fn classify_all(
    classifier: &dyn QuestionClassifier,
    questions: &[RawQuestion],
) -> Result<Vec<ClassifiedQuestion>, ClassifyError> {
    info!(
        "Classifying {} questions with {} classifier",
        questions.len(),
        classifier.name()
    );

    let mut classified = Vec::with_capacity(questions.len());
    for (i, question) in questions.iter().enumerate() {
        let resolved = match classifier.classify(question).await {
            Ok(classification) => resolve(question, classification, None),
            Err(ClassifyError::Authentication) if i == 0 => {
                warn!("Classifier rejected the API key on the first question, aborting");
                return Err(ClassifyError::Authentication);
            }
            Err(e) => {
                warn!(
                    "Classification failed for Q{}: {}, using fallback",
                    question.question_number, e
                );
                resolve(question, fallback_classification(question), Some(e.to_string()))
            }
        };
        classified.push(resolved);
    }
    Ok(classified)
}

/// Parse a JSON object out of a model response, tolerating markdown code fences.
pub fn parse_llm_json<T: serde::de::DeserializeOwned>(response: &str) -> Result<T, ClassifyError> {
    let json_str = json_payload(response);

    serde_json::from_str(json_str).map_err(|e| {
        ClassifyError::MalformedResponse(format!(
            "{}: {}",
            e,
            json_str.chars().take(200).collect::<String>()
        ))
    })
}
