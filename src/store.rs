//! In-memory stores for questions, study logs and generated plans.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::schema::{
    now_iso8601, ClassifiedQuestion, SmartPlan, StoredPlan, StoredQuestion, StudyEntry, StudyLog,
};

/// Append-only list shared between clones.
#[derive(Debug)]
struct Records<T> {
    inner: Arc<RwLock<Vec<T>>>,
}

impl<T> Clone for Records<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Records<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl<T: Clone> Records<T> {
    fn push(&self, record: T) {
        self.write().push(record);
    }

    fn all(&self) -> Vec<T> {
        self.read().clone()
    }

    fn last(&self) -> Option<T> {
        self.read().last().cloned()
    }

    fn len(&self) -> usize {
        self.read().len()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<T>> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<T>> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Shared handle to the classified questions of this process.
///
/// Cloning is cheap; all clones see the same questions.
#[derive(Debug, Clone, Default)]
pub struct QuestionStore {
    records: Records<StoredQuestion>,
}

impl QuestionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a question, assigning it an id and creation time.
    pub fn insert(&self, question: ClassifiedQuestion) -> StoredQuestion {
        let stored = StoredQuestion {
            id: Uuid::new_v4().to_string(),
            created_at: now_iso8601(),
            question,
        };
        self.records.push(stored.clone());
        tracing::debug!(
            "QuestionStore: stored Q{} as {}",
            stored.question.question_number,
            stored.id
        );
        stored
    }

    /// All stored questions in insertion order.
    pub fn all(&self) -> Vec<StoredQuestion> {
        self.records.all()
    }

    /// The classified questions without their store metadata.
    pub fn questions(&self) -> Vec<ClassifiedQuestion> {
        self.records.read().iter().map(|q| q.question.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct StudyLogStore {
    records: Records<StudyLog>,
}

impl StudyLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, entry: StudyEntry) -> StudyLog {
        let log = StudyLog {
            id: Uuid::new_v4().to_string(),
            created_at: now_iso8601(),
            entry,
        };
        self.records.push(log.clone());
        tracing::debug!(
            "StudyLogStore: stored {} log for '{}' as {}",
            log.entry.log_type,
            log.entry.topic,
            log.id
        );
        log
    }

    pub fn all(&self) -> Vec<StudyLog> {
        self.records.all()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlanStore {
    records: Records<StoredPlan>,
}

impl PlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, plan: SmartPlan) -> StoredPlan {
        let stored = StoredPlan {
            id: Uuid::new_v4().to_string(),
            created_at: now_iso8601(),
            plan,
        };
        self.records.push(stored.clone());
        tracing::debug!("PlanStore: stored plan {}", stored.id);
        stored
    }

    pub fn all(&self) -> Vec<StoredPlan> {
        self.records.all()
    }

    /// The most recently generated plan.
    pub fn latest(&self) -> Option<StoredPlan> {
        self.records.last()
    }
}
