//! Exam Pulse - question extraction and topic analysis for OCR'd exam papers,
//! with study logs and revision planning on top.

pub mod analysis;
pub mod classify;
pub mod config;
pub mod error;
pub mod extraction;
pub mod ocr;
pub mod openrouter;
pub mod plan;
pub mod schema;
pub mod store;
pub mod study;

pub use extraction::{
    extract_questions, extract_questions_from_documents, ExtractionReport, ExtractionStats,
    QuestionExtractor, RawQuestion,
};
