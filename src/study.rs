//! Study logs and the dashboard built from them.

use serde::Deserialize;
use std::collections::HashSet;

use crate::classify::UNKNOWN;
use crate::error::StudyLogError;
use crate::schema::{
    parse_iso8601, ClassifiedQuestion, DashboardStats, Difficulty, LogType, StudyEntry, StudyLog,
    StudyLogStats,
};

pub const DEFAULT_DAYS_UNTIL_EXAM: u32 = 30;

const QUESTIONS_PER_PAPER: usize = 10;
const TARGET_STUDY_HOURS: f64 = 100.0;
const DEFAULT_ACCURACY: u32 = 75;

/// A study log as submitted by a client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StudyLogRequest {
    pub topic: String,
    pub log_type: String,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub hours: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl StudyLogRequest {
    /// Check the request and keep only the fields its log type uses.
    pub fn validate(self) -> Result<StudyEntry, StudyLogError> {
        let log_type =
            LogType::parse(&self.log_type).ok_or_else(|| StudyLogError::InvalidLogType(self.log_type.clone()))?;

        let topic = self.topic.trim();
        if topic.is_empty() {
            return Err(StudyLogError::EmptyTopic);
        }

        let difficulty = match log_type {
            LogType::Difficulty => {
                let value = self
                    .difficulty
                    .as_deref()
                    .filter(|d| !d.is_empty())
                    .ok_or(StudyLogError::MissingDifficulty)?;
                Some(Difficulty::parse(value).ok_or_else(|| StudyLogError::InvalidDifficulty(value.to_string()))?)
            }
            _ => None,
        };

        let hours = match log_type {
            LogType::Hours => {
                let hours = self.hours.ok_or(StudyLogError::MissingHours)?;
                if !hours.is_finite() || hours < 0.0 {
                    return Err(StudyLogError::NegativeHours);
                }
                Some(hours)
            }
            _ => None,
        };

        let notes = self
            .notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        Ok(StudyEntry {
            topic: topic.to_string(),
            log_type,
            difficulty,
            hours,
            notes,
        })
    }
}

/// Totals over all logs, and per topic.
pub fn study_log_statistics(logs: &[StudyLog]) -> StudyLogStats {
    let mut stats = StudyLogStats {
        total_logs: logs.len(),
        ..StudyLogStats::default()
    };

    let mut total_hours = 0.0;
    for log in logs {
        let topic = stats.topic_stats.entry(log.entry.topic.clone()).or_default();
        topic.count += 1;
        if let Some(hours) = log.entry.hours {
            topic.total_hours += hours;
            total_hours += hours;
        }
        if let Some(difficulty) = log.entry.difficulty {
            topic.difficulties.push(difficulty);
        }
    }

    stats.total_hours = (total_hours * 100.0).round() / 100.0;
    stats.topics_count = stats.topic_stats.len();
    stats
}

/// Dashboard figures as of `now` (seconds since the epoch).
pub fn dashboard(
    questions: &[ClassifiedQuestion],
    logs: &[StudyLog],
    now: u64,
    days_until_exam: u32,
) -> DashboardStats {
    let topics: HashSet<&str> = questions
        .iter()
        .map(|q| q.topic.as_str())
        .filter(|t| !t.is_empty() && *t != UNKNOWN)
        .collect();

    let total_hours: f64 = logs.iter().filter_map(|l| l.entry.hours).sum();
    let study_progress = ((total_hours / TARGET_STUDY_HOURS * 100.0) as u32).min(100);

    let mut newest_first: Vec<&StudyLog> = logs.iter().collect();
    newest_first.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    DashboardStats {
        total_papers_uploaded: questions.len().div_ceil(QUESTIONS_PER_PAPER),
        topics_analyzed: topics.len(),
        predicted_questions: questions.len(),
        study_progress,
        study_streak: study_streak(&newest_first, now),
        last_activity: last_activity(newest_first.first().copied(), now),
        accuracy_score: accuracy_score(logs),
        days_until_exam,
    }
}

/// Consecutive days with at least one log, ending today. Logs must be newest first.
fn study_streak(newest_first: &[&StudyLog], now: u64) -> u32 {
    let today = (now / 86_400) as i64;
    let mut streak = 0;

    for log in newest_first {
        let Some(created) = parse_iso8601(&log.created_at) else {
            continue;
        };
        let days_ago = today - (created / 86_400) as i64;
        if days_ago == i64::from(streak) {
            streak += 1;
        } else if days_ago > i64::from(streak) {
            break;
        }
    }
    streak
}

fn last_activity(latest: Option<&StudyLog>, now: u64) -> String {
    let Some(latest) = latest else {
        return "No activity yet".to_string();
    };
    let Some(created) = parse_iso8601(&latest.created_at) else {
        return "Recently".to_string();
    };

    let elapsed = now.saturating_sub(created);
    let (days, rest) = (elapsed / 86_400, elapsed % 86_400);
    let ago = |n: u64, unit: &str| format!("{} {}{} ago", n, unit, if n > 1 { "s" } else { "" });
    if days > 0 {
        ago(days, "day")
    } else if rest >= 3600 {
        ago(rest / 3600, "hour")
    } else if rest >= 60 {
        ago(rest / 60, "minute")
    } else {
        "Just now".to_string()
    }
}

/// Weighted share of easy/medium/hard ratings: 0 without logs, 75 when no
/// log carries a difficulty.
fn accuracy_score(logs: &[StudyLog]) -> u32 {
    if logs.is_empty() {
        return 0;
    }
    let rated: Vec<Difficulty> = logs.iter().filter_map(|l| l.entry.difficulty).collect();
    if rated.is_empty() {
        return DEFAULT_ACCURACY;
    }
    let weighted: f64 = rated.iter().map(|d| d.weight()).sum();
    (weighted / rated.len() as f64 * 100.0) as u32
}
