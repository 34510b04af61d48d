use std::sync::Arc;

use storage::repository::{
    IncompleteResponseRepository, ResponseRepository, SnapshotStore, Storage, SurveyRepository,
};
use survey_core::Clock;
use survey_core::model::{
    RespondentId, SubmittedResponse, SurveyDefinition, SurveyDefinitionDraft, SurveyId,
};

use super::session::{SessionParts, SurveySession};
use super::snapshot::LocalSnapshotStore;
use super::submission::SubmissionCoordinator;
use super::tracker::RemoteTracker;
use crate::config::SessionConfig;
use crate::error::SessionError;

/// Opens survey sessions over a set of repositories.
#[derive(Clone)]
pub struct SurveySessionService {
    clock: Clock,
    config: SessionConfig,
    surveys: Arc<dyn SurveyRepository>,
    snapshots: Arc<dyn SnapshotStore>,
    responses: Arc<dyn ResponseRepository>,
    incomplete: Arc<dyn IncompleteResponseRepository>,
}

impl SurveySessionService {
    #[must_use]
    pub fn new(clock: Clock, storage: &Storage) -> Self {
        Self {
            clock,
            config: SessionConfig::default(),
            surveys: Arc::clone(&storage.surveys),
            snapshots: Arc::clone(&storage.snapshots),
            responses: Arc::clone(&storage.responses),
            incomplete: Arc::clone(&storage.incomplete),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Route submissions and incomplete-record tracking to `remote`.
    #[must_use]
    pub fn with_remote<R>(self, remote: Arc<R>) -> Self
    where
        R: ResponseRepository + IncompleteResponseRepository + 'static,
    {
        Self {
            responses: Arc::clone(&remote) as Arc<dyn ResponseRepository>,
            incomplete: remote,
            ..self
        }
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Load the survey and resume the respondent's run.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::SurveyNotFound` if the survey is unknown, or
    /// `SessionError::Storage` if it cannot be read.
    pub async fn open(
        &self,
        survey_id: &SurveyId,
        respondent_id: RespondentId,
    ) -> Result<SurveySession, SessionError> {
        let definition = self
            .surveys
            .get_survey(survey_id)
            .await?
            .ok_or_else(|| SessionError::SurveyNotFound(survey_id.clone()))?;
        Ok(self
            .open_with_definition(Arc::new(definition), respondent_id)
            .await)
    }

    /// Resume a run for an already loaded definition.
    pub async fn open_with_definition(
        &self,
        definition: Arc<SurveyDefinition>,
        respondent_id: RespondentId,
    ) -> SurveySession {
        let survey_id = definition.id().clone();
        let snapshots =
            LocalSnapshotStore::new(Arc::clone(&self.snapshots), &survey_id, &respondent_id);
        let (tracker, submission) = if self.config.preview {
            (
                RemoteTracker::disabled(survey_id, respondent_id.clone()),
                SubmissionCoordinator::preview(),
            )
        } else {
            (
                RemoteTracker::new(Arc::clone(&self.incomplete), survey_id, respondent_id.clone()),
                SubmissionCoordinator::new(Arc::clone(&self.responses)),
            )
        };

        SurveySession::restore(SessionParts {
            definition,
            respondent_id,
            config: self.config,
            clock: self.clock.clone(),
            snapshots,
            tracker,
            submission,
        })
        .await
    }

    /// Validate and store a survey definition.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Definition` for an invalid draft and
    /// `SessionError::Storage` if it cannot be stored.
    pub async fn import(
        &self,
        draft: SurveyDefinitionDraft,
    ) -> Result<SurveyDefinition, SessionError> {
        let definition = draft.validate()?;
        self.surveys.upsert_survey(&definition).await?;
        tracing::info!(
            survey = %definition.id(),
            questions = definition.question_count(),
            "survey imported"
        );
        Ok(definition)
    }

    /// Submitted responses for a survey.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the responses cannot be read.
    pub async fn responses(
        &self,
        survey_id: &SurveyId,
    ) -> Result<Vec<SubmittedResponse>, SessionError> {
        Ok(self.responses.list_responses(survey_id).await?)
    }
}
