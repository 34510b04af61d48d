use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use survey_core::Clock;
use survey_core::model::{
    AnswerValue, IncompleteAnswer, IncompleteRecordId, IncompleteResponseRecord,
    IncompleteStatus, QuestionId, RespondentId, ResponseId, SectionId, SubmissionPayload,
    SubmittedResponse, SurveyDefinition, SurveyId,
};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Read side of the survey definition source.
#[async_trait]
pub trait SurveyRepository: Send + Sync {
    /// Fetch a survey definition by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures; a missing survey is `Ok(None)`.
    async fn get_survey(&self, id: &SurveyId) -> Result<Option<SurveyDefinition>, StorageError>;

    /// Persist or replace a survey definition.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the definition cannot be stored.
    async fn upsert_survey(&self, survey: &SurveyDefinition) -> Result<(), StorageError>;
}

/// Durable key/value space for client-side session snapshots.
///
/// Bodies are opaque strings; decoding is the caller's concern so that a
/// malformed body can be discarded instead of failing the read.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn save(&self, key: &str, body: &str) -> Result<(), StorageError>;

    /// Remove the entry. Clearing a missing key is not an error.
    async fn clear(&self, key: &str) -> Result<(), StorageError>;
}

/// Submission endpoint for completed responses.
#[async_trait]
pub trait ResponseRepository: Send + Sync {
    /// Store a completed response and return its id.
    ///
    /// A payload carrying the id of an existing response overwrites that
    /// response and returns the same id. An unknown id yields a fresh
    /// response linked to it.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the response cannot be stored.
    async fn submit(&self, payload: &SubmissionPayload) -> Result<ResponseId, StorageError>;

    async fn get_response(&self, id: &ResponseId)
    -> Result<Option<SubmittedResponse>, StorageError>;

    async fn list_responses(
        &self,
        survey_id: &SurveyId,
    ) -> Result<Vec<SubmittedResponse>, StorageError>;
}

/// Server-side partial-progress records.
#[async_trait]
pub trait IncompleteResponseRepository: Send + Sync {
    /// Open a record for the respondent, or return the one already open.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn start(
        &self,
        survey_id: &SurveyId,
        respondent_id: &RespondentId,
    ) -> Result<IncompleteRecordId, StorageError>;

    /// Record one answer on an open record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for unknown records and
    /// `StorageError::Conflict` for records that are no longer open.
    async fn update(
        &self,
        id: &IncompleteRecordId,
        question_id: &QuestionId,
        answer: &AnswerValue,
        section_id: &SectionId,
    ) -> Result<(), StorageError>;

    /// Flag the record as completed. `Ok(false)` if there was nothing to flag.
    async fn mark_completed(&self, id: &IncompleteRecordId) -> Result<bool, StorageError>;

    /// Delete the record if it is completed. `Ok(false)` otherwise.
    async fn remove_completed(&self, id: &IncompleteRecordId) -> Result<bool, StorageError>;

    /// Delete every record of the respondent for the survey.
    async fn remove_by_survey_and_respondent(
        &self,
        survey_id: &SurveyId,
        respondent_id: &RespondentId,
    ) -> Result<bool, StorageError>;

    /// Wipe the record's answers and reopen it.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for unknown records.
    async fn reset(&self, id: &IncompleteRecordId) -> Result<(), StorageError>;

    async fn get(
        &self,
        id: &IncompleteRecordId,
    ) -> Result<Option<IncompleteResponseRecord>, StorageError>;
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    mutex
        .lock()
        .map_err(|e| StorageError::Connection(e.to_string()))
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    clock: Clock,
    surveys: Arc<Mutex<HashMap<SurveyId, SurveyDefinition>>>,
    snapshots: Arc<Mutex<HashMap<String, String>>>,
    responses: Arc<Mutex<Vec<SubmittedResponse>>>,
    incomplete: Arc<Mutex<HashMap<IncompleteRecordId, IncompleteResponseRecord>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `clock` for record timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}

#[async_trait]
impl SurveyRepository for InMemoryRepository {
    async fn get_survey(&self, id: &SurveyId) -> Result<Option<SurveyDefinition>, StorageError> {
        Ok(lock(&self.surveys)?.get(id).cloned())
    }

    async fn upsert_survey(&self, survey: &SurveyDefinition) -> Result<(), StorageError> {
        lock(&self.surveys)?.insert(survey.id().clone(), survey.clone());
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for InMemoryRepository {
    async fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(lock(&self.snapshots)?.get(key).cloned())
    }

    async fn save(&self, key: &str, body: &str) -> Result<(), StorageError> {
        lock(&self.snapshots)?.insert(key.to_owned(), body.to_owned());
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<(), StorageError> {
        lock(&self.snapshots)?.remove(key);
        Ok(())
    }
}

#[async_trait]
impl ResponseRepository for InMemoryRepository {
    async fn submit(&self, payload: &SubmissionPayload) -> Result<ResponseId, StorageError> {
        let mut guard = lock(&self.responses)?;
        if let Some(requested) = &payload.response_id {
            if let Some(existing) = guard.iter_mut().find(|r| &r.response_id == requested) {
                *existing = SubmittedResponse::from_payload(requested.clone(), payload, None);
                return Ok(requested.clone());
            }
        }
        let id = ResponseId::generate();
        guard.push(SubmittedResponse::from_payload(
            id.clone(),
            payload,
            payload.response_id.clone(),
        ));
        Ok(id)
    }

    async fn get_response(
        &self,
        id: &ResponseId,
    ) -> Result<Option<SubmittedResponse>, StorageError> {
        Ok(lock(&self.responses)?
            .iter()
            .find(|r| &r.response_id == id)
            .cloned())
    }

    async fn list_responses(
        &self,
        survey_id: &SurveyId,
    ) -> Result<Vec<SubmittedResponse>, StorageError> {
        Ok(lock(&self.responses)?
            .iter()
            .filter(|r| &r.survey_id == survey_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl IncompleteResponseRepository for InMemoryRepository {
    async fn start(
        &self,
        survey_id: &SurveyId,
        respondent_id: &RespondentId,
    ) -> Result<IncompleteRecordId, StorageError> {
        let mut guard = lock(&self.incomplete)?;
        if let Some(open) = guard.values().find(|r| {
            r.is_open() && &r.survey_id == survey_id && &r.respondent_id == respondent_id
        }) {
            return Ok(open.id.clone());
        }
        let record = IncompleteResponseRecord::open(
            survey_id.clone(),
            respondent_id.clone(),
            self.clock.now(),
        );
        let id = record.id.clone();
        guard.insert(id.clone(), record);
        Ok(id)
    }

    async fn update(
        &self,
        id: &IncompleteRecordId,
        question_id: &QuestionId,
        answer: &AnswerValue,
        section_id: &SectionId,
    ) -> Result<(), StorageError> {
        let mut guard = lock(&self.incomplete)?;
        let record = guard.get_mut(id).ok_or(StorageError::NotFound)?;
        if !record.is_open() {
            return Err(StorageError::Conflict);
        }
        record.per_question_answers.insert(
            question_id.clone(),
            IncompleteAnswer {
                answer: answer.clone(),
                section_id: section_id.clone(),
            },
        );
        record.updated_at = self.clock.now();
        Ok(())
    }

    async fn mark_completed(&self, id: &IncompleteRecordId) -> Result<bool, StorageError> {
        let mut guard = lock(&self.incomplete)?;
        let Some(record) = guard.get_mut(id) else {
            return Ok(false);
        };
        record.status = IncompleteStatus::Completed;
        record.updated_at = self.clock.now();
        Ok(true)
    }

    async fn remove_completed(&self, id: &IncompleteRecordId) -> Result<bool, StorageError> {
        let mut guard = lock(&self.incomplete)?;
        if guard.get(id).is_some_and(|r| !r.is_open()) {
            guard.remove(id);
            return Ok(true);
        }
        Ok(false)
    }

    async fn remove_by_survey_and_respondent(
        &self,
        survey_id: &SurveyId,
        respondent_id: &RespondentId,
    ) -> Result<bool, StorageError> {
        let mut guard = lock(&self.incomplete)?;
        let before = guard.len();
        guard.retain(|_, r| !(&r.survey_id == survey_id && &r.respondent_id == respondent_id));
        Ok(guard.len() != before)
    }

    async fn reset(&self, id: &IncompleteRecordId) -> Result<(), StorageError> {
        let mut guard = lock(&self.incomplete)?;
        let record = guard.get_mut(id).ok_or(StorageError::NotFound)?;
        record.per_question_answers.clear();
        record.status = IncompleteStatus::Open;
        record.updated_at = self.clock.now();
        Ok(())
    }

    async fn get(
        &self,
        id: &IncompleteRecordId,
    ) -> Result<Option<IncompleteResponseRecord>, StorageError> {
        Ok(lock(&self.incomplete)?.get(id).cloned())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub surveys: Arc<dyn SurveyRepository>,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub responses: Arc<dyn ResponseRepository>,
    pub incomplete: Arc<dyn IncompleteResponseRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::new())
    }

    /// Wire every repository to the same backend.
    #[must_use]
    pub fn from_repository<R>(repo: R) -> Self
    where
        R: SurveyRepository
            + SnapshotStore
            + ResponseRepository
            + IncompleteResponseRepository
            + Clone
            + 'static,
    {
        Self {
            surveys: Arc::new(repo.clone()),
            snapshots: Arc::new(repo.clone()),
            responses: Arc::new(repo.clone()),
            incomplete: Arc::new(repo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use survey_core::model::{RetakeMode, SurveyDefinitionDraft};
    use survey_core::time::fixed_now;

    fn payload(response_id: Option<ResponseId>) -> SubmissionPayload {
        SubmissionPayload {
            survey_id: SurveyId::new("s"),
            respondent_id: RespondentId::new("r"),
            responses: Vec::new(),
            start_time: fixed_now(),
            end_time: fixed_now(),
            retake_mode: RetakeMode::Replace,
            response_id,
        }
    }

    #[tokio::test]
    async fn submit_overwrites_known_response_id() {
        let repo = InMemoryRepository::new();
        let first = repo.submit(&payload(None)).await.unwrap();
        let second = repo.submit(&payload(Some(first.clone()))).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(repo.list_responses(&SurveyId::new("s")).await.unwrap().len(), 1);

        let linked = repo
            .submit(&payload(Some(ResponseId::new("vanished"))))
            .await
            .unwrap();
        let stored = repo.get_response(&linked).await.unwrap().unwrap();
        assert_eq!(stored.link_response_id, Some(ResponseId::new("vanished")));
    }

    #[tokio::test]
    async fn start_returns_the_open_record() {
        let repo = InMemoryRepository::new().with_clock(Clock::fixed(fixed_now()));
        let survey = SurveyId::new("s");
        let who = RespondentId::new("r");
        let first = repo.start(&survey, &who).await.unwrap();
        let again = repo.start(&survey, &who).await.unwrap();
        assert_eq!(first, again);

        assert!(repo.mark_completed(&first).await.unwrap());
        let fresh = repo.start(&survey, &who).await.unwrap();
        assert_ne!(first, fresh);
    }

    #[tokio::test]
    async fn completed_records_reject_updates_until_reset() {
        let repo = InMemoryRepository::new();
        let id = repo
            .start(&SurveyId::new("s"), &RespondentId::new("r"))
            .await
            .unwrap();
        let q = QuestionId::new("q1");
        let sec = SectionId::new("a");
        repo.update(&id, &q, &AnswerValue::Scale(1), &sec).await.unwrap();
        repo.mark_completed(&id).await.unwrap();
        assert!(matches!(
            repo.update(&id, &q, &AnswerValue::Scale(2), &sec).await,
            Err(StorageError::Conflict)
        ));

        repo.reset(&id).await.unwrap();
        let record = repo.get(&id).await.unwrap().unwrap();
        assert!(record.is_open());
        assert!(record.per_question_answers.is_empty());
        assert!(!repo.remove_completed(&id).await.unwrap());
    }

    #[tokio::test]
    async fn snapshots_and_surveys_round_trip() {
        let storage = Storage::in_memory();
        storage.snapshots.save("k", "{}").await.unwrap();
        assert_eq!(storage.snapshots.load("k").await.unwrap().as_deref(), Some("{}"));
        storage.snapshots.clear("k").await.unwrap();
        storage.snapshots.clear("k").await.unwrap();
        assert!(storage.snapshots.load("k").await.unwrap().is_none());

        let def = SurveyDefinitionDraft::new(SurveyId::new("s")).validate().unwrap();
        storage.surveys.upsert_survey(&def).await.unwrap();
        assert_eq!(
            storage.surveys.get_survey(&SurveyId::new("s")).await.unwrap(),
            Some(def)
        );
    }
}
