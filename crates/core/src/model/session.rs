use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::answer::AnswerValue;
use crate::model::ids::{IncompleteRecordId, QuestionId, ResponseId, SectionId};

/// Position of a respondent within a survey.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Step {
    #[default]
    Welcome,
    Section(SectionId),
    Question(QuestionId),
    ThankYou,
}

impl Step {
    #[must_use]
    pub fn is_welcome(&self) -> bool {
        matches!(self, Step::Welcome)
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Step::ThankYou)
    }

    #[must_use]
    pub fn question_id(&self) -> Option<&QuestionId> {
        match self {
            Step::Question(id) => Some(id),
            _ => None,
        }
    }
}

/// Everything needed to resume a respondent's run.
///
/// `step` and `answers` are mandatory when decoding; the remaining fields fall
/// back to defaults so older snapshots stay readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub step: Step,
    pub answers: BTreeMap<QuestionId, AnswerValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_record_id: Option<IncompleteRecordId>,
    /// Response to overwrite on submission under replace-mode retakes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_response_id: Option<ResponseId>,
    #[serde(default)]
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub timestamp: DateTime<Utc>,
}

impl SessionState {
    /// Fresh state at `Welcome`.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            step: Step::Welcome,
            answers: BTreeMap::new(),
            remote_record_id: None,
            prior_response_id: None,
            start_time: now,
            end_time: None,
            timestamp: now,
        }
    }

    #[must_use]
    pub fn answer(&self, id: &QuestionId) -> Option<&AnswerValue> {
        self.answers.get(id)
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.timestamp = now;
    }

    /// Replace defaulted timestamps left behind by sparse snapshots.
    pub fn fill_missing_times(&mut self, now: DateTime<Utc>) {
        let unset = DateTime::<Utc>::default();
        if self.start_time == unset {
            self.start_time = now;
        }
        if self.timestamp == unset {
            self.timestamp = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn step_serializes_with_kind_and_id() {
        let json = serde_json::to_string(&Step::Question(QuestionId::new("q1"))).unwrap();
        assert_eq!(json, r#"{"kind":"question","id":"q1"}"#);
        let welcome: Step = serde_json::from_str(r#"{"kind":"welcome"}"#).unwrap();
        assert_eq!(welcome, Step::Welcome);
    }

    #[test]
    fn state_requires_step_and_answers() {
        let missing_answers = r#"{"step":{"kind":"welcome"}}"#;
        assert!(serde_json::from_str::<SessionState>(missing_answers).is_err());

        let minimal = r#"{"step":{"kind":"section","id":"s1"},"answers":{}}"#;
        let mut state: SessionState = serde_json::from_str(minimal).unwrap();
        state.fill_missing_times(fixed_now());
        assert_eq!(state.start_time, fixed_now());
        assert_eq!(state.step, Step::Section(SectionId::new("s1")));
    }

    #[test]
    fn state_round_trips_answers() {
        let mut state = SessionState::new(fixed_now());
        state
            .answers
            .insert(QuestionId::new("q1"), AnswerValue::Scale(3));
        state.remote_record_id = Some(IncompleteRecordId::new("r1"));
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains(r#""remoteRecordId":"r1""#));
        let back: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
