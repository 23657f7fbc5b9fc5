//! Serializable result types returned by the analysis API.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::extraction::ExtractionStats;

/// Current UTC time as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn now_iso8601() -> String {
    format_unix_seconds(now_unix_seconds())
}

pub fn now_unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Parse `YYYY-MM-DD`, optionally followed by `THH:MM:SS` (or a space
/// separator), into seconds since the epoch. Anything after the seconds,
/// such as `Z` or a fraction, is ignored and the time is read as UTC.
pub fn parse_iso8601(text: &str) -> Option<u64> {
    let text = text.trim();
    let date = text.get(..10)?;
    let mut parts = date.split('-');
    let year: i64 = parts.next()?.parse().ok()?;
    let month: u32 = parts.next()?.parse().ok()?;
    let day: u32 = parts.next()?.parse().ok()?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }

    let mut secs = 0;
    if let Some(time) = text.get(11..19).filter(|_| matches!(text.as_bytes()[10], b'T' | b' ')) {
        let mut fields = time.split(':').map(|f| f.parse::<u64>().ok());
        let (h, m, s) = (fields.next()??, fields.next()??, fields.next()??);
        if h > 23 || m > 59 || s > 60 {
            return None;
        }
        secs = h * 3600 + m * 60 + s;
    }

    let days = days_from_civil(year, month, day);
    u64::try_from(days).ok().map(|d| d * 86_400 + secs)
}

pub(crate) fn format_unix_seconds(secs: u64) -> String {
    let days = (secs / 86_400) as i64;
    let rem = secs % 86_400;
    let (year, month, day) = civil_from_days(days);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        year,
        month,
        day,
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60
    )
}

/// Days since 1970-01-01 to a proleptic Gregorian (year, month, day).
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

/// Proleptic Gregorian (year, month, day) to days since 1970-01-01.
fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = year.div_euclid(400);
    let yoe = year.rem_euclid(400);
    let mp = i64::from((month + 9) % 12);
    let doy = (153 * mp + 2) / 5 + i64::from(day) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// A question after classification. `marks` is always resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedQuestion {
    pub question_number: u32,
    pub question_text: String,
    pub topic: String,
    pub qtype: String,
    pub marks: u32,
    /// Set when the classifier failed and the local fallback was used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification_error: Option<String>,
}

/// A classified question as persisted by the question store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredQuestion {
    pub id: String,
    pub created_at: String,
    #[serde(flatten)]
    pub question: ClassifiedQuestion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicFrequency {
    pub topic: String,
    pub frequency: usize,
    /// Share of all questions, rounded to two decimals.
    pub percentage: f64,
}

/// One uploaded document that produced text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedDocument {
    pub filename: String,
    /// SHA-256 of the OCR text, hex encoded.
    pub content_hash: String,
    pub chars: usize,
    pub total_pages: u32,
    pub provider: String,
}

/// Result of analyzing one or more uploaded papers.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub id: String,
    pub profile: String,
    pub analyzed_at: String,
    pub analyzer_version: String,
    pub processed_files: Vec<ProcessedDocument>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_files: Vec<String>,
    pub combined_ocr_length: usize,
    pub questions_before_dedup: usize,
    pub total_questions: usize,
    pub questions: Vec<StoredQuestion>,
    pub topic_frequencies: Vec<TopicFrequency>,
    pub extraction: ExtractionStats,
}

/// Kind of study log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    Text,
    Hours,
    Difficulty,
    Checkbox,
}

impl LogType {
    pub const ALL: [LogType; 4] = [LogType::Text, LogType::Hours, LogType::Difficulty, LogType::Checkbox];

    pub fn as_str(self) -> &'static str {
        match self {
            LogType::Text => "text",
            LogType::Hours => "hours",
            LogType::Difficulty => "difficulty",
            LogType::Checkbox => "checkbox",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.as_str() == value)
    }

    /// Weight of this level in the dashboard accuracy score.
    pub fn weight(self) -> f64 {
        match self {
            Difficulty::Easy => 1.0,
            Difficulty::Medium => 0.7,
            Difficulty::Hard => 0.3,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated study log entry, before it is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyEntry {
    pub topic: String,
    pub log_type: LogType,
    /// Only set for `difficulty` logs.
    pub difficulty: Option<Difficulty>,
    /// Only set for `hours` logs.
    pub hours: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyLog {
    pub id: String,
    pub created_at: String,
    #[serde(flatten)]
    pub entry: StudyEntry,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TopicStudyStats {
    pub count: usize,
    pub total_hours: f64,
    pub difficulties: Vec<Difficulty>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StudyLogStats {
    pub total_logs: usize,
    /// Rounded to two decimals.
    pub total_hours: f64,
    pub topics_count: usize,
    pub topic_stats: BTreeMap<String, TopicStudyStats>,
}

/// Headline numbers for the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    /// Estimated at ten questions per paper.
    pub total_papers_uploaded: usize,
    pub topics_analyzed: usize,
    pub predicted_questions: usize,
    /// Logged hours against a 100 hour target, capped at 100.
    pub study_progress: u32,
    /// Consecutive days with a study log, counting back from today.
    pub study_streak: u32,
    pub last_activity: String,
    pub accuracy_score: u32,
    pub days_until_exam: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionWeek {
    pub week: u32,
    pub focus: String,
    pub tasks: Vec<String>,
    pub hours: f64,
}

/// A revision plan generated from the analyzed questions and study logs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SmartPlan {
    pub priorities: Vec<String>,
    pub weaknesses: Vec<String>,
    pub next_steps: Vec<String>,
    pub revision_plan: Vec<RevisionWeek>,
    /// Always within 0..=100.
    pub confidence_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPlan {
    pub id: String,
    pub created_at: String,
    #[serde(flatten)]
    pub plan: SmartPlan,
}

/// What a plan was generated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanBasis {
    pub total_questions: usize,
    pub total_study_logs: usize,
    pub topics_analyzed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_unix_seconds() {
        assert_eq!(format_unix_seconds(0), "1970-01-01T00:00:00Z");
        // 2000-02-29 (leap day) 12:34:56
        assert_eq!(format_unix_seconds(951_827_696), "2000-02-29T12:34:56Z");
        assert_eq!(format_unix_seconds(1_735_689_599), "2024-12-31T23:59:59Z");
    }

    #[test]
    fn test_parse_iso8601() {
        assert_eq!(parse_iso8601("1970-01-01T00:00:00Z"), Some(0));
        assert_eq!(parse_iso8601("2000-02-29T12:34:56Z"), Some(951_827_696));
        assert_eq!(parse_iso8601("2024-12-31 23:59:59.123+00:00"), Some(1_735_689_599));
        assert_eq!(parse_iso8601("2024-12-31"), Some(1_735_603_200));
        assert_eq!(parse_iso8601("yesterday"), None);
        assert_eq!(parse_iso8601("2024-13-01"), None);
        assert_eq!(parse_iso8601("2024-12-31T25:00:00Z"), None);
    }

    #[test]
    fn test_study_log_serialization() {
        let log = StudyLog {
            id: "log-1".to_string(),
            created_at: "2025-03-01T09:00:00Z".to_string(),
            entry: StudyEntry {
                topic: "Optics".to_string(),
                log_type: LogType::Difficulty,
                difficulty: Some(Difficulty::Hard),
                hours: None,
                notes: None,
            },
        };
        let json = serde_json::to_value(&log).unwrap();

        assert_eq!(json["log_type"], "difficulty");
        assert_eq!(json["difficulty"], "hard");
        assert!(json["hours"].is_null());
        assert_eq!(LogType::parse("checkbox"), Some(LogType::Checkbox));
        assert_eq!(LogType::parse("Hours"), None);
    }

    #[test]
    fn test_stored_question_flattens() {
        let stored = StoredQuestion {
            id: "abc".to_string(),
            created_at: "2025-01-01T00:00:00Z".to_string(),
            question: ClassifiedQuestion {
                question_number: 2,
                question_text: "Define force.".to_string(),
                topic: "Physics".to_string(),
                qtype: "Short Answer".to_string(),
                marks: 3,
                classification_error: None,
            },
        };
        let json = serde_json::to_value(&stored).unwrap();

        assert_eq!(json["id"], "abc");
        assert_eq!(json["topic"], "Physics");
        assert_eq!(json["marks"], 3);
        assert!(json.get("classification_error").is_none());
    }
}
