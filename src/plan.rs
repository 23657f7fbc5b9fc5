//! Revision plan generation from analyzed questions and study logs.

use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{info, warn};

use crate::analysis::topic_frequencies;
use crate::error::PlanError;
use crate::openrouter::{json_payload, Message, OpenRouterClient};
use crate::schema::{ClassifiedQuestion, PlanBasis, RevisionWeek, SmartPlan, StudyLog, TopicFrequency};
use crate::study::study_log_statistics;

const SYSTEM_PROMPT: &str = "You are an expert study planner. Generate personalized, actionable study plans based on exam analysis and study logs. Return only valid JSON.";

/// Topics listed per prompt section.
const PROMPT_TOPICS: usize = 10;

/// Build the planning prompt and describe the data it was built from.
pub fn plan_prompt(questions: &[ClassifiedQuestion], logs: &[StudyLog]) -> (String, PlanBasis) {
    let frequencies = topic_frequencies(questions);
    let basis = PlanBasis {
        total_questions: questions.len(),
        total_study_logs: logs.len(),
        topics_analyzed: frequencies.len(),
    };

    let frequencies_text = frequency_lines(&frequencies);
    let summary_text = study_summary_lines(logs);

    let prompt = format!(
        r#"Generate a personalized Smart Exam Plan based on the following analysis:

TOPIC FREQUENCIES (from analyzed exam papers):
{frequencies}

STUDY LOGS SUMMARY:
{summary}

Generate a study plan that includes:

1. PRIORITIES (3-5 items): topics to focus on, favouring frequent topics with little study time or hard ratings.
2. WEAKNESSES (3-5 items): areas that need improvement, based on difficulty ratings and study time against frequency.
3. NEXT STEPS (3-5 items): immediate, specific study tasks.
4. REVISION PLAN: a weekly plan for 4-6 weeks with the week number, focus topics, tasks and estimated hours.
5. CONFIDENCE PERCENTAGE: a number from 0 to 100 for how well the available data supports this plan.

Return ONLY valid JSON (no markdown, no code blocks) with this exact structure:
{{
  "priorities": ["priority 1", "priority 2"],
  "weaknesses": ["weakness 1", "weakness 2"],
  "next_steps": ["step 1", "step 2"],
  "revision_plan": [
    {{"week": 1, "focus": "topic name", "tasks": ["task 1", "task 2"], "hours": 10}}
  ],
  "confidence_percentage": 75.5
}}"#,
        frequencies = if frequencies_text.is_empty() {
            "No questions analyzed yet."
        } else {
            frequencies_text.as_str()
        },
        summary = if summary_text.is_empty() {
            "No study logs yet."
        } else {
            summary_text.as_str()
        },
    );

    (prompt, basis)
}

fn frequency_lines(frequencies: &[TopicFrequency]) -> String {
    frequencies
        .iter()
        .take(PROMPT_TOPICS)
        .map(|f| format!("- {}: {} questions ({}%)", f.topic, f.frequency, f.percentage))
        .collect::<Vec<_>>()
        .join("\n")
}

fn study_summary_lines(logs: &[StudyLog]) -> String {
    study_log_statistics(logs)
        .topic_stats
        .iter()
        .take(PROMPT_TOPICS)
        .map(|(topic, stats)| {
            let difficulties: BTreeSet<&str> = stats.difficulties.iter().map(|d| d.as_str()).collect();
            let difficulties = if difficulties.is_empty() {
                "none".to_string()
            } else {
                difficulties.into_iter().collect::<Vec<_>>().join(", ")
            };
            format!(
                "- {}: {} logs, {:.1} hours, difficulties: {}",
                topic, stats.count, stats.total_hours, difficulties
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Coerce a model's plan into shape.
///
/// A single string becomes a one-item list, other non-lists become empty,
/// unusable revision weeks are dropped and confidence is clamped to 0..=100.
pub fn normalize_plan(value: &Value) -> SmartPlan {
    let revision_plan = match value.get("revision_plan") {
        Some(Value::Array(weeks)) => weeks
            .iter()
            .enumerate()
            .filter_map(|(i, week)| revision_week(week, i))
            .collect(),
        _ => Vec::new(),
    };

    let confidence = value.get("confidence_percentage").and_then(number).unwrap_or(0.0);

    SmartPlan {
        priorities: string_list(value.get("priorities")),
        weaknesses: string_list(value.get("weaknesses")),
        next_steps: string_list(value.get("next_steps")),
        revision_plan,
        confidence_percentage: confidence.clamp(0.0, 100.0),
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Weeks without a number are numbered by position.
fn revision_week(value: &Value, index: usize) -> Option<RevisionWeek> {
    let week = value.as_object()?;
    Some(RevisionWeek {
        week: week
            .get("week")
            .and_then(number)
            .map(|n| n as u32)
            .unwrap_or(index as u32 + 1),
        focus: match week.get("focus") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Array(_)) => string_list(week.get("focus")).join(", "),
            _ => String::new(),
        },
        tasks: string_list(week.get("tasks")),
        hours: week.get("hours").and_then(number).unwrap_or(0.0).max(0.0),
    })
}

fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    };
    n.filter(|n: &f64| n.is_finite())
}

/// Generates plans through OpenRouter.
pub struct SmartPlanner {
    client: OpenRouterClient,
}

impl SmartPlanner {
    pub fn new(client: OpenRouterClient) -> Self {
        Self { client }
    }

    pub async fn generate(
        &self,
        questions: &[ClassifiedQuestion],
        logs: &[StudyLog],
    ) -> Result<(SmartPlan, PlanBasis), PlanError> {
        let (prompt, basis) = plan_prompt(questions, logs);
        info!(
            "Generating smart plan from {} questions and {} study logs (model={})",
            basis.total_questions,
            basis.total_study_logs,
            self.client.model()
        );

        let response = self
            .client
            .chat(vec![Message::system(SYSTEM_PROMPT), Message::user(prompt)])
            .await?;

        let json_str = json_payload(&response);
        let value: Value = serde_json::from_str(json_str).map_err(|e| {
            warn!("Plan response was not JSON: {}", e);
            PlanError::MalformedResponse(format!(
                "{}: {}",
                e,
                json_str.chars().take(200).collect::<String>()
            ))
        })?;
        if !value.is_object() {
            return Err(PlanError::MalformedResponse(format!(
                "expected a JSON object, got {}",
                json_str.chars().take(200).collect::<String>()
            )));
        }

        Ok((normalize_plan(&value), basis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::UNKNOWN;
    use crate::schema::{Difficulty, LogType, StudyEntry};
    use serde_json::json;

    fn question(topic: &str) -> ClassifiedQuestion {
        ClassifiedQuestion {
            question_number: 1,
            question_text: "State Snell's law of refraction.".to_string(),
            topic: topic.to_string(),
            qtype: "Short Answer".to_string(),
            marks: 2,
            classification_error: None,
        }
    }

    fn log(topic: &str, difficulty: Option<Difficulty>, hours: Option<f64>) -> StudyLog {
        StudyLog {
            id: "log".to_string(),
            created_at: "2025-03-10T12:00:00Z".to_string(),
            entry: StudyEntry {
                topic: topic.to_string(),
                log_type: if hours.is_some() { LogType::Hours } else { LogType::Difficulty },
                difficulty,
                hours,
                notes: None,
            },
        }
    }

    #[test]
    fn test_plan_prompt_lists_data() {
        let questions = vec![question("Optics"), question("Optics"), question("Algebra"), question(UNKNOWN)];
        let logs = vec![
            log("Optics", None, Some(2.0)),
            log("Optics", Some(Difficulty::Hard), None),
            log("Optics", Some(Difficulty::Hard), None),
            log("Algebra", Some(Difficulty::Easy), None),
        ];
        let (prompt, basis) = plan_prompt(&questions, &logs);

        assert!(prompt.contains("- Optics: 2 questions (50%)"));
        assert!(prompt.contains("- Algebra: 1 questions (25%)"));
        assert!(prompt.contains("- Optics: 3 logs, 2.0 hours, difficulties: hard"));
        assert!(prompt.contains("- Algebra: 1 logs, 0.0 hours, difficulties: easy"));
        assert_eq!(
            basis,
            PlanBasis {
                total_questions: 4,
                total_study_logs: 4,
                topics_analyzed: 2,
            }
        );
    }

    #[test]
    fn test_plan_prompt_without_data() {
        let (prompt, basis) = plan_prompt(&[], &[]);

        assert!(prompt.contains("No questions analyzed yet."));
        assert!(prompt.contains("No study logs yet."));
        assert_eq!(basis.topics_analyzed, 0);
    }

    #[test]
    fn test_normalize_plan() {
        let plan = normalize_plan(&json!({
            "priorities": "Optics",
            "weaknesses": ["Refraction", 3],
            "next_steps": {"step": "practice"},
            "revision_plan": [
                {"week": 1, "focus": "Optics", "tasks": ["past papers"], "hours": "6"},
                "rest week",
                {"focus": ["Algebra", "Graphs"], "tasks": "drills"}
            ],
            "confidence_percentage": 140
        }));

        assert_eq!(plan.priorities, vec!["Optics"]);
        assert_eq!(plan.weaknesses, vec!["Refraction", "3"]);
        assert!(plan.next_steps.is_empty());
        assert_eq!(plan.revision_plan.len(), 2);
        assert_eq!(plan.revision_plan[0].hours, 6.0);
        assert_eq!(plan.revision_plan[1].week, 3);
        assert_eq!(plan.revision_plan[1].focus, "Algebra, Graphs");
        assert_eq!(plan.revision_plan[1].tasks, vec!["drills"]);
        assert_eq!(plan.confidence_percentage, 100.0);
    }

    #[test]
    fn test_normalize_plan_defaults() {
        let plan = normalize_plan(&json!({"revision_plan": "week one", "confidence_percentage": -5}));

        assert_eq!(plan, SmartPlan::default());
        assert_eq!(normalize_plan(&json!({"confidence_percentage": "82.5%"})).confidence_percentage, 82.5);
    }
}
