//! Duplicate removal. First occurrence always wins.

use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, warn};

use super::RawQuestion;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DedupStats {
    pub duplicate_numbers: usize,
    pub duplicate_texts: usize,
}

/// Key for text comparison: lowercased with whitespace runs collapsed.
fn text_key(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Drop repeated question numbers and, across documents, repeated question text.
pub fn deduplicate(
    questions: Vec<RawQuestion>,
    across_documents: bool,
) -> (Vec<RawQuestion>, DedupStats) {
    let mut stats = DedupStats::default();

    let mut seen_numbers = HashSet::new();
    let mut unique = Vec::with_capacity(questions.len());
    for q in questions {
        if seen_numbers.insert(q.question_number) {
            unique.push(q);
        } else {
            warn!(
                "Duplicate question number {} found, keeping first occurrence",
                q.question_number
            );
            stats.duplicate_numbers += 1;
        }
    }

    if !across_documents {
        return (unique, stats);
    }

    let mut seen_texts = HashSet::new();
    let before = unique.len();
    unique.retain(|q| {
        let fresh = seen_texts.insert(text_key(&q.text));
        if !fresh {
            info!(
                "Duplicate question text detected (Q{}), keeping first occurrence",
                q.question_number
            );
        }
        fresh
    });
    stats.duplicate_texts = before - unique.len();

    (unique, stats)
}
