//! Error types for the collaborators around the extraction pipeline.
//!
//! The pipeline itself never fails; these cover config loading, the LLM
//! client, classification, analysis, study logs and plan generation.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config directory does not exist: {path}")]
    MissingDirectory { path: String },

    #[error("Failed to read config: {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {path}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("No configs found in {path}")]
    Empty { path: String },
}

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Failed to send request to OpenRouter")]
    Transport(#[from] reqwest::Error),

    #[error("OpenRouter API error ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("OpenRouter returned no choices")]
    EmptyResponse,
}

impl LlmError {
    /// HTTP status returned by the API, when the failure was a rejected request.
    pub fn status(&self) -> Option<u16> {
        match self {
            LlmError::Status { status, .. } => Some(*status),
            LlmError::Transport(e) => e.status().map(|s| s.as_u16()),
            LlmError::EmptyResponse => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("Classifier rejected the API key")]
    Authentication,

    #[error("Classifier rate limit reached")]
    RateLimited,

    #[error("Classification request failed")]
    Request(#[source] LlmError),

    #[error("Malformed classification response: {0}")]
    MalformedResponse(String),
}

impl From<LlmError> for ClassifyError {
    fn from(err: LlmError) -> Self {
        match err.status() {
            Some(401) | Some(403) => ClassifyError::Authentication,
            Some(429) => ClassifyError::RateLimited,
            _ => ClassifyError::Request(err),
        }
    }
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("No OCR text extracted from any files. Failed files: {failed:?}")]
    NoText { failed: Vec<String> },

    #[error("No questions found in any of the provided files")]
    NoQuestions,

    #[error("OpenRouter API key is invalid or expired. Check OPENROUTER_API_KEY")]
    Authentication,

    #[error("Classification failed")]
    Classification(#[source] ClassifyError),
}

/// A rejected study log. Every variant maps to a 400 response.
#[derive(Error, Debug, PartialEq)]
pub enum StudyLogError {
    #[error("topic must not be empty")]
    EmptyTopic,

    #[error("Invalid log_type. Must be one of: text, hours, difficulty, checkbox")]
    InvalidLogType(String),

    #[error("difficulty field is required when log_type is 'difficulty'")]
    MissingDifficulty,

    #[error("Invalid difficulty. Must be one of: easy, medium, hard")]
    InvalidDifficulty(String),

    #[error("hours field is required when log_type is 'hours'")]
    MissingHours,

    #[error("hours must be >= 0")]
    NegativeHours,
}

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("OpenRouter API key is invalid or expired. Check OPENROUTER_API_KEY")]
    Authentication,

    #[error("Plan generation rate limit reached")]
    RateLimited,

    #[error("Plan generation request failed")]
    Request(#[source] LlmError),

    #[error("Malformed plan response: {0}")]
    MalformedResponse(String),
}

impl From<LlmError> for PlanError {
    fn from(err: LlmError) -> Self {
        match err.status() {
            Some(401) | Some(403) => PlanError::Authentication,
            Some(429) => PlanError::RateLimited,
            _ => PlanError::Request(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_maps_to_classify_error() {
        let auth = ClassifyError::from(LlmError::Status {
            status: 401,
            body: "bad key".to_string(),
        });
        assert!(matches!(auth, ClassifyError::Authentication));

        let limited = ClassifyError::from(LlmError::Status {
            status: 429,
            body: String::new(),
        });
        assert!(matches!(limited, ClassifyError::RateLimited));

        let other = ClassifyError::from(LlmError::EmptyResponse);
        assert!(matches!(other, ClassifyError::Request(LlmError::EmptyResponse)));
    }

    #[test]
    fn test_status_maps_to_plan_error() {
        let forbidden = PlanError::from(LlmError::Status {
            status: 403,
            body: String::new(),
        });
        assert!(matches!(forbidden, PlanError::Authentication));

        let upstream = PlanError::from(LlmError::Status {
            status: 500,
            body: "oops".to_string(),
        });
        assert!(matches!(upstream, PlanError::Request(LlmError::Status { status: 500, .. })));
    }
}
