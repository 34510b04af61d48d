use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use survey_core::model::{AnswerValue, QuestionId};

/// Host-side input that may hold a value not yet committed to the session.
///
/// `flush` must be synchronous and side-effect free apart from reading the
/// surface; returning `None` means the surface has nothing to offer.
pub trait InputSurface: Send {
    fn flush(&self) -> Option<AnswerValue>;
}

impl<F> InputSurface for F
where
    F: Fn() -> Option<AnswerValue> + Send,
{
    fn flush(&self) -> Option<AnswerValue> {
        self()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitMode {
    /// Store the answer and stay on the current step.
    SaveOnly,
    /// Store the answer and move forward.
    Navigate,
}

impl CommitMode {
    #[must_use]
    pub fn from_save_only(save_only: bool) -> Self {
        if save_only {
            Self::SaveOnly
        } else {
            Self::Navigate
        }
    }
}

#[derive(Debug, Clone)]
struct PendingEdit {
    raw: String,
    edited_at: DateTime<Utc>,
}

/// Debounced free-text edits plus the registered input surfaces.
pub struct AnswerCollector {
    debounce: TimeDelta,
    pending: BTreeMap<QuestionId, PendingEdit>,
    surfaces: HashMap<QuestionId, Box<dyn InputSurface>>,
}

impl fmt::Debug for AnswerCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnswerCollector")
            .field("debounce", &self.debounce)
            .field("pending", &self.pending)
            .field("surfaces", &self.surfaces.len())
            .finish()
    }
}

impl AnswerCollector {
    #[must_use]
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce: TimeDelta::from_std(debounce).unwrap_or(TimeDelta::MAX),
            pending: BTreeMap::new(),
            surfaces: HashMap::new(),
        }
    }

    /// Remember the latest text for `question_id`, restarting its window.
    pub fn record_edit(&mut self, question_id: QuestionId, raw: String, now: DateTime<Utc>) {
        self.pending.insert(
            question_id,
            PendingEdit {
                raw,
                edited_at: now,
            },
        );
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Earliest moment a pending edit becomes due.
    #[must_use]
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.pending
            .values()
            .filter_map(|edit| edit.edited_at.checked_add_signed(self.debounce))
            .min()
    }

    /// Remove and return edits idle for at least the debounce window.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Vec<(QuestionId, String)> {
        let due: Vec<QuestionId> = self
            .pending
            .iter()
            .filter(|(_, edit)| now - edit.edited_at >= self.debounce)
            .map(|(id, _)| id.clone())
            .collect();
        due.into_iter()
            .filter_map(|id| self.pending.remove(&id).map(|edit| (id, edit.raw)))
            .collect()
    }

    /// Remove and return every pending edit regardless of age.
    pub fn take_all(&mut self) -> Vec<(QuestionId, String)> {
        std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(id, edit)| (id, edit.raw))
            .collect()
    }

    /// Drop a pending edit superseded by an explicit commit.
    pub fn discard(&mut self, question_id: &QuestionId) {
        self.pending.remove(question_id);
    }

    pub fn register(&mut self, question_id: QuestionId, surface: Box<dyn InputSurface>) {
        self.surfaces.insert(question_id, surface);
    }

    pub fn unregister(&mut self, question_id: &QuestionId) {
        self.surfaces.remove(question_id);
    }

    /// Last-chance pass over the input surfaces.
    ///
    /// Asks the surface of `current` and every surface whose question has no
    /// committed answer. Results come back in question id order.
    #[must_use]
    pub fn reconcile(
        &self,
        current: Option<&QuestionId>,
        answers: &BTreeMap<QuestionId, AnswerValue>,
    ) -> Vec<(QuestionId, AnswerValue)> {
        let mut found: Vec<(QuestionId, AnswerValue)> = self
            .surfaces
            .iter()
            .filter(|(id, _)| Some(*id) == current || !answers.contains_key(*id))
            .filter_map(|(id, surface)| surface.flush().map(|value| (id.clone(), value)))
            .collect();
        found.sort_by(|a, b| a.0.cmp(&b.0));
        found
    }

    /// Forget pending edits; surfaces stay registered.
    pub fn reset(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use survey_core::time::fixed_now;

    fn q(id: &str) -> QuestionId {
        QuestionId::new(id)
    }

    #[test]
    fn edits_become_due_after_the_window() {
        let mut collector = AnswerCollector::new(Duration::from_secs(1));
        let t0 = fixed_now();
        collector.record_edit(q("a"), "he".into(), t0);
        collector.record_edit(q("a"), "hello".into(), t0 + TimeDelta::milliseconds(600));

        assert!(collector.take_due(t0 + TimeDelta::milliseconds(1200)).is_empty());
        assert_eq!(
            collector.next_deadline(),
            Some(t0 + TimeDelta::milliseconds(1600))
        );

        let due = collector.take_due(t0 + TimeDelta::milliseconds(1600));
        assert_eq!(due, vec![(q("a"), "hello".to_owned())]);
        assert!(!collector.has_pending());
    }

    #[test]
    fn take_all_ignores_the_window() {
        let mut collector = AnswerCollector::new(Duration::from_secs(60));
        collector.record_edit(q("b"), "x".into(), fixed_now());
        collector.record_edit(q("a"), "y".into(), fixed_now());
        collector.discard(&q("b"));
        assert_eq!(collector.take_all(), vec![(q("a"), "y".to_owned())]);
        assert_eq!(collector.next_deadline(), None);
    }

    #[test]
    fn reconcile_asks_current_and_unanswered_surfaces() {
        let mut collector = AnswerCollector::new(Duration::from_secs(1));
        collector.register(q("answered"), Box::new(|| Some(AnswerValue::Text("late".into()))));
        collector.register(q("current"), Box::new(|| Some(AnswerValue::Text("now".into()))));
        collector.register(q("open"), Box::new(|| Some(AnswerValue::Scale(3))));
        collector.register(q("blank"), Box::new(|| None));

        let mut answers = BTreeMap::new();
        answers.insert(q("answered"), AnswerValue::Text("early".into()));
        answers.insert(q("current"), AnswerValue::Text("before".into()));

        let found = collector.reconcile(Some(&q("current")), &answers);
        assert_eq!(
            found,
            vec![
                (q("current"), AnswerValue::Text("now".into())),
                (q("open"), AnswerValue::Scale(3)),
            ]
        );
    }

    #[test]
    fn commit_mode_from_flag() {
        assert_eq!(CommitMode::from_save_only(true), CommitMode::SaveOnly);
        assert_eq!(CommitMode::from_save_only(false), CommitMode::Navigate);
    }
}
