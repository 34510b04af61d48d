use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::answer::AnswerValue;
use crate::model::ids::{
    IncompleteRecordId, QuestionId, RespondentId, ResponseId, SectionId, SurveyId,
};
use crate::model::survey::RetakeMode;

/// One answered question inside a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEntry {
    pub question_id: QuestionId,
    pub answer: AnswerValue,
    pub section_id: SectionId,
}

/// Body sent to the submission endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    pub survey_id: SurveyId,
    pub respondent_id: RespondentId,
    pub responses: Vec<ResponseEntry>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub retake_mode: RetakeMode,
    /// Present only for replace-mode retakes with a known prior response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_id: Option<ResponseId>,
}

/// Stored, completed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedResponse {
    pub response_id: ResponseId,
    pub survey_id: SurveyId,
    pub respondent_id: RespondentId,
    pub responses: Vec<ResponseEntry>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub retake_mode: RetakeMode,
    /// Prior response this one was meant to replace but could not find.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_response_id: Option<ResponseId>,
}

impl SubmittedResponse {
    #[must_use]
    pub fn from_payload(
        response_id: ResponseId,
        payload: &SubmissionPayload,
        link_response_id: Option<ResponseId>,
    ) -> Self {
        Self {
            response_id,
            survey_id: payload.survey_id.clone(),
            respondent_id: payload.respondent_id.clone(),
            responses: payload.responses.clone(),
            start_time: payload.start_time,
            end_time: payload.end_time,
            retake_mode: payload.retake_mode,
            link_response_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncompleteStatus {
    Open,
    Completed,
}

impl IncompleteStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            IncompleteStatus::Open => "open",
            IncompleteStatus::Completed => "completed",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "open" => Some(Self::Open),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncompleteAnswer {
    pub answer: AnswerValue,
    pub section_id: SectionId,
}

/// Server-side partial-progress record for a respondent's run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncompleteResponseRecord {
    pub id: IncompleteRecordId,
    pub survey_id: SurveyId,
    pub respondent_id: RespondentId,
    pub per_question_answers: BTreeMap<QuestionId, IncompleteAnswer>,
    pub status: IncompleteStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IncompleteResponseRecord {
    #[must_use]
    pub fn open(
        survey_id: SurveyId,
        respondent_id: RespondentId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: IncompleteRecordId::generate(),
            survey_id,
            respondent_id,
            per_question_answers: BTreeMap::new(),
            status: IncompleteStatus::Open,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == IncompleteStatus::Open
    }
}
