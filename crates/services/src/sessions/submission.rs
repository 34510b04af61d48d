use std::sync::Arc;

use chrono::{DateTime, Utc};
use storage::repository::ResponseRepository;
use survey_core::model::{
    QuestionId, RespondentId, ResponseEntry, ResponseId, RetakePolicy, SessionState,
    SubmissionPayload, SurveyDefinition,
};

/// Result of a submission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Submitted {
        response_id: ResponseId,
        /// Required questions left unanswered; informational only.
        missing_required: Vec<QuestionId>,
    },
    /// A response id was already recorded for this run.
    AlreadySubmitted { response_id: ResponseId },
    Failed { reason: String },
    /// Preview runs build the payload but never send it.
    Preview { payload: SubmissionPayload },
}

/// Assemble the submission body from committed answers.
///
/// Entries follow survey traversal order and only cover answered questions.
#[must_use]
pub fn build_payload(
    definition: &SurveyDefinition,
    respondent_id: &RespondentId,
    state: &SessionState,
    policy: RetakePolicy,
    end_time: DateTime<Utc>,
) -> SubmissionPayload {
    let responses = definition
        .questions()
        .iter()
        .filter_map(|question| {
            state.answer(&question.id).map(|answer| ResponseEntry {
                question_id: question.id.clone(),
                answer: answer.clone(),
                section_id: question.section_id.clone(),
            })
        })
        .collect();

    SubmissionPayload {
        survey_id: definition.id().clone(),
        respondent_id: respondent_id.clone(),
        responses,
        start_time: state.start_time,
        end_time,
        retake_mode: policy.mode(),
        response_id: policy.response_id_for_submission(state.prior_response_id.as_ref()),
    }
}

#[must_use]
pub fn missing_required(definition: &SurveyDefinition, state: &SessionState) -> Vec<QuestionId> {
    definition
        .questions()
        .iter()
        .filter(|q| q.required && state.answer(&q.id).is_none())
        .map(|q| q.id.clone())
        .collect()
}

/// Sends a run's payload at most once.
pub struct SubmissionCoordinator {
    responses: Option<Arc<dyn ResponseRepository>>,
    submitted: Option<ResponseId>,
    last_error: Option<String>,
}

impl SubmissionCoordinator {
    #[must_use]
    pub fn new(responses: Arc<dyn ResponseRepository>) -> Self {
        Self {
            responses: Some(responses),
            submitted: None,
            last_error: None,
        }
    }

    #[must_use]
    pub fn preview() -> Self {
        Self {
            responses: None,
            submitted: None,
            last_error: None,
        }
    }

    #[must_use]
    pub fn submitted(&self) -> Option<&ResponseId> {
        self.submitted.as_ref()
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Outcome of an earlier attempt in this run, if it should be repeated
    /// instead of sending again.
    #[must_use]
    pub fn replay(&self) -> Option<SubmitOutcome> {
        if let Some(response_id) = &self.submitted {
            return Some(SubmitOutcome::AlreadySubmitted {
                response_id: response_id.clone(),
            });
        }
        self.last_error.as_ref().map(|reason| SubmitOutcome::Failed {
            reason: reason.clone(),
        })
    }

    pub async fn submit(
        &mut self,
        payload: SubmissionPayload,
        missing_required: Vec<QuestionId>,
    ) -> SubmitOutcome {
        if let Some(response_id) = &self.submitted {
            return SubmitOutcome::AlreadySubmitted {
                response_id: response_id.clone(),
            };
        }
        let Some(responses) = &self.responses else {
            return SubmitOutcome::Preview { payload };
        };

        match responses.submit(&payload).await {
            Ok(response_id) => {
                tracing::info!(
                    survey = %payload.survey_id,
                    response = %response_id,
                    answers = payload.responses.len(),
                    "response submitted"
                );
                self.submitted = Some(response_id.clone());
                self.last_error = None;
                SubmitOutcome::Submitted {
                    response_id,
                    missing_required,
                }
            }
            Err(err) => {
                tracing::warn!(survey = %payload.survey_id, error = %err, "response submission failed");
                let reason = err.to_string();
                self.last_error = Some(reason.clone());
                SubmitOutcome::Failed { reason }
            }
        }
    }

    /// Forget the previous run's outcome.
    pub fn reset(&mut self) {
        self.submitted = None;
        self.last_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::repository::InMemoryRepository;
    use survey_core::model::{
        AnswerValue, Question, QuestionType, RetakeMode, Section, SectionId,
        SurveyDefinitionDraft, SurveyId,
    };
    use survey_core::time::fixed_now;

    fn definition() -> SurveyDefinition {
        let mut draft = SurveyDefinitionDraft::new(SurveyId::new("sv"));
        draft.sections = vec![
            Section {
                id: SectionId::new("later"),
                name: "Later".into(),
                order: 2,
            },
            Section {
                id: SectionId::new("first"),
                name: "First".into(),
                order: 1,
            },
        ];
        let question = |id: &str, section: &str, required: bool| Question {
            id: QuestionId::new(id),
            section_id: SectionId::new(section),
            order: 1,
            title: id.into(),
            kind: QuestionType::Text { multiline: false },
            required,
        };
        draft.questions = vec![
            question("z", "later", true),
            question("a", "first", true),
        ];
        draft.validate().unwrap()
    }

    #[test]
    fn payload_follows_traversal_order() {
        let def = definition();
        let mut state = SessionState::new(fixed_now());
        state.answers.insert(QuestionId::new("z"), AnswerValue::Text("last".into()));
        state.answers.insert(QuestionId::new("a"), AnswerValue::Text("first".into()));
        state.prior_response_id = Some(ResponseId::new("old"));

        let payload = build_payload(
            &def,
            &RespondentId::new("r"),
            &state,
            RetakePolicy::new(RetakeMode::New),
            fixed_now(),
        );
        let order: Vec<&str> = payload
            .responses
            .iter()
            .map(|e| e.question_id.as_str())
            .collect();
        assert_eq!(order, ["a", "z"]);
        assert_eq!(payload.responses[0].section_id, SectionId::new("first"));
        assert_eq!(payload.response_id, None);

        let replace = build_payload(
            &def,
            &RespondentId::new("r"),
            &state,
            RetakePolicy::new(RetakeMode::Replace),
            fixed_now(),
        );
        assert_eq!(replace.response_id, Some(ResponseId::new("old")));
    }

    #[test]
    fn missing_required_lists_unanswered() {
        let def = definition();
        let mut state = SessionState::new(fixed_now());
        state.answers.insert(QuestionId::new("a"), AnswerValue::Text("x".into()));
        assert_eq!(missing_required(&def, &state), vec![QuestionId::new("z")]);
    }

    #[tokio::test]
    async fn second_submit_short_circuits() {
        let repo = InMemoryRepository::new();
        let mut coordinator = SubmissionCoordinator::new(Arc::new(repo.clone()));
        let def = definition();
        let state = SessionState::new(fixed_now());
        let payload = build_payload(
            &def,
            &RespondentId::new("r"),
            &state,
            RetakePolicy::new(RetakeMode::New),
            fixed_now(),
        );

        let first = coordinator.submit(payload.clone(), Vec::new()).await;
        let SubmitOutcome::Submitted { response_id, .. } = first else {
            panic!("expected submission, got {first:?}");
        };
        let second = coordinator.submit(payload, Vec::new()).await;
        assert_eq!(second, SubmitOutcome::AlreadySubmitted { response_id });
        assert_eq!(repo.list_responses(def.id()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn preview_never_sends() {
        let mut coordinator = SubmissionCoordinator::preview();
        let def = definition();
        let payload = build_payload(
            &def,
            &RespondentId::new("r"),
            &SessionState::new(fixed_now()),
            RetakePolicy::new(RetakeMode::New),
            fixed_now(),
        );
        let outcome = coordinator.submit(payload.clone(), Vec::new()).await;
        assert_eq!(outcome, SubmitOutcome::Preview { payload });
        assert!(coordinator.replay().is_none());
    }
}
