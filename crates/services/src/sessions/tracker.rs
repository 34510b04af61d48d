use std::sync::Arc;
use std::time::Duration;

use storage::repository::IncompleteResponseRepository;
use survey_core::model::{
    AnswerValue, IncompleteRecordId, QuestionId, RemoteRestart, RespondentId, RetakePolicy,
    SectionId, SessionState, SurveyId,
};

use super::tasks::BackgroundTasks;

/// Mirrors a respondent's progress into the server-side incomplete record.
///
/// Every failure is logged and swallowed; the session never waits on the
/// tracker except for `start`, completion and restart bookkeeping.
#[derive(Clone)]
pub struct RemoteTracker {
    remote: Option<Arc<dyn IncompleteResponseRepository>>,
    survey_id: SurveyId,
    respondent_id: RespondentId,
}

impl RemoteTracker {
    #[must_use]
    pub fn new(
        remote: Arc<dyn IncompleteResponseRepository>,
        survey_id: SurveyId,
        respondent_id: RespondentId,
    ) -> Self {
        Self {
            remote: Some(remote),
            survey_id,
            respondent_id,
        }
    }

    /// Tracker with every remote effect suppressed, used for previews.
    #[must_use]
    pub fn disabled(survey_id: SurveyId, respondent_id: RespondentId) -> Self {
        Self {
            remote: None,
            survey_id,
            respondent_id,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.remote.is_some()
    }

    /// Open the incomplete record unless `state` already knows one.
    pub async fn ensure_started(&self, state: &mut SessionState) {
        let Some(remote) = &self.remote else {
            return;
        };
        if state.remote_record_id.is_some() {
            return;
        }
        match remote.start(&self.survey_id, &self.respondent_id).await {
            Ok(id) => {
                tracing::info!(survey = %self.survey_id, record = %id, "incomplete record started");
                state.remote_record_id = Some(id);
            }
            Err(err) => {
                tracing::warn!(survey = %self.survey_id, error = %err, "incomplete record start failed");
            }
        }
    }

    /// Push one committed answer in the background.
    pub fn record(
        &self,
        tasks: &mut BackgroundTasks,
        record_id: IncompleteRecordId,
        question_id: QuestionId,
        answer: AnswerValue,
        section_id: SectionId,
    ) {
        let Some(remote) = self.remote.clone() else {
            return;
        };
        tasks.spawn(async move {
            if let Err(err) = remote
                .update(&record_id, &question_id, &answer, &section_id)
                .await
            {
                tracing::warn!(record = %record_id, question = %question_id, error = %err, "incomplete record update failed");
            }
        });
    }

    /// Retire the record after a successful submission.
    ///
    /// Marks it completed and schedules its removal after `grace`. Without a
    /// known id, or when marking fails, every record for the respondent is
    /// removed right away.
    pub async fn retire(
        &self,
        tasks: &mut BackgroundTasks,
        record_id: Option<IncompleteRecordId>,
        grace: Duration,
    ) {
        let Some(remote) = self.remote.clone() else {
            return;
        };
        if let Some(id) = record_id {
            match remote.mark_completed(&id).await {
                Ok(true) => {
                    tasks.spawn(async move {
                        tokio::time::sleep(grace).await;
                        match remote.remove_completed(&id).await {
                            Ok(removed) => tracing::debug!(record = %id, removed, "completed record cleanup"),
                            Err(err) => tracing::warn!(record = %id, error = %err, "completed record cleanup failed"),
                        }
                    });
                    return;
                }
                Ok(false) => tracing::warn!(record = %id, "incomplete record vanished before completion"),
                Err(err) => tracing::warn!(record = %id, error = %err, "marking incomplete record completed failed"),
            }
        }
        self.remove_all(remote.as_ref()).await;
    }

    /// Apply the retake policy's remote side of a restart.
    pub async fn on_restart(&self, policy: RetakePolicy, record_id: Option<&IncompleteRecordId>) {
        let Some(remote) = &self.remote else {
            return;
        };
        match policy.remote_on_restart() {
            RemoteRestart::Reset => {
                let Some(id) = record_id else {
                    return;
                };
                if let Err(err) = remote.reset(id).await {
                    tracing::warn!(record = %id, error = %err, "incomplete record reset failed");
                }
            }
            RemoteRestart::Retire => self.remove_all(remote.as_ref()).await,
        }
    }

    async fn remove_all(&self, remote: &dyn IncompleteResponseRepository) {
        if let Err(err) = remote
            .remove_by_survey_and_respondent(&self.survey_id, &self.respondent_id)
            .await
        {
            tracing::warn!(survey = %self.survey_id, error = %err, "incomplete record removal failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use storage::repository::{InMemoryRepository, StorageError};
    use survey_core::model::{IncompleteResponseRecord, RetakeMode};
    use survey_core::time::fixed_now;

    /// In-memory records whose completion flag cannot be set.
    struct StuckCompletion {
        inner: InMemoryRepository,
        fail: bool,
    }

    #[async_trait]
    impl IncompleteResponseRepository for StuckCompletion {
        async fn start(
            &self,
            survey_id: &SurveyId,
            respondent_id: &RespondentId,
        ) -> Result<IncompleteRecordId, StorageError> {
            self.inner.start(survey_id, respondent_id).await
        }

        async fn update(
            &self,
            id: &IncompleteRecordId,
            question_id: &QuestionId,
            answer: &AnswerValue,
            section_id: &SectionId,
        ) -> Result<(), StorageError> {
            self.inner.update(id, question_id, answer, section_id).await
        }

        async fn mark_completed(&self, _id: &IncompleteRecordId) -> Result<bool, StorageError> {
            if self.fail {
                Err(StorageError::Connection("unreachable".into()))
            } else {
                Ok(false)
            }
        }

        async fn remove_completed(&self, id: &IncompleteRecordId) -> Result<bool, StorageError> {
            self.inner.remove_completed(id).await
        }

        async fn remove_by_survey_and_respondent(
            &self,
            survey_id: &SurveyId,
            respondent_id: &RespondentId,
        ) -> Result<bool, StorageError> {
            self.inner
                .remove_by_survey_and_respondent(survey_id, respondent_id)
                .await
        }

        async fn reset(&self, id: &IncompleteRecordId) -> Result<(), StorageError> {
            self.inner.reset(id).await
        }

        async fn get(
            &self,
            id: &IncompleteRecordId,
        ) -> Result<Option<IncompleteResponseRecord>, StorageError> {
            self.inner.get(id).await
        }
    }

    fn tracker(repo: &InMemoryRepository) -> RemoteTracker {
        RemoteTracker::new(
            Arc::new(repo.clone()),
            SurveyId::new("s"),
            RespondentId::new("r"),
        )
    }

    #[tokio::test]
    async fn start_happens_once() {
        let repo = InMemoryRepository::new();
        let tracker = tracker(&repo);
        let mut state = SessionState::new(fixed_now());

        tracker.ensure_started(&mut state).await;
        let first = state.remote_record_id.clone().expect("started");
        tracker.ensure_started(&mut state).await;
        assert_eq!(state.remote_record_id, Some(first));
    }

    #[tokio::test]
    async fn disabled_tracker_touches_nothing() {
        let tracker = RemoteTracker::disabled(SurveyId::new("s"), RespondentId::new("r"));
        let mut state = SessionState::new(fixed_now());
        tracker.ensure_started(&mut state).await;
        assert!(state.remote_record_id.is_none());
        assert!(!tracker.is_enabled());
    }

    #[tokio::test]
    async fn retire_marks_then_removes_after_grace() {
        let repo = InMemoryRepository::new();
        let tracker = tracker(&repo);
        let mut tasks = BackgroundTasks::default();
        let mut state = SessionState::new(fixed_now());
        tracker.ensure_started(&mut state).await;
        let id = state.remote_record_id.clone().unwrap();

        tracker
            .retire(&mut tasks, Some(id.clone()), Duration::from_millis(5))
            .await;
        let record = repo.get(&id).await.unwrap().expect("still present");
        assert!(!record.is_open());

        tasks.settle().await;
        assert!(repo.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn restart_under_new_removes_the_open_record() {
        let repo = InMemoryRepository::new();
        let tracker = tracker(&repo);
        let mut state = SessionState::new(fixed_now());
        tracker.ensure_started(&mut state).await;
        let id = state.remote_record_id.clone().unwrap();

        tracker
            .on_restart(RetakePolicy::new(RetakeMode::New), Some(&id))
            .await;
        assert!(repo.get(&id).await.unwrap().is_none());
    }

    async fn retire_falls_back_when_completion_is_refused(fail: bool) {
        let repo = InMemoryRepository::new();
        let tracker = RemoteTracker::new(
            Arc::new(StuckCompletion {
                inner: repo.clone(),
                fail,
            }),
            SurveyId::new("s"),
            RespondentId::new("r"),
        );
        let mut tasks = BackgroundTasks::default();
        let mut state = SessionState::new(fixed_now());
        tracker.ensure_started(&mut state).await;
        let id = state.remote_record_id.clone().unwrap();

        tracker
            .retire(&mut tasks, Some(id.clone()), Duration::from_secs(60))
            .await;
        assert_eq!(tasks.pending(), 0, "no delayed cleanup scheduled");
        assert!(repo.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn retire_removes_everything_when_marking_errors() {
        retire_falls_back_when_completion_is_refused(true).await;
    }

    #[tokio::test]
    async fn retire_removes_everything_when_nothing_was_marked() {
        retire_falls_back_when_completion_is_refused(false).await;
    }

    #[tokio::test]
    async fn retire_without_a_known_id_removes_the_respondents_records() {
        let repo = InMemoryRepository::new();
        let tracker = tracker(&repo);
        let mut tasks = BackgroundTasks::default();
        let orphan = repo
            .start(&SurveyId::new("s"), &RespondentId::new("r"))
            .await
            .unwrap();
        let other = repo
            .start(&SurveyId::new("s"), &RespondentId::new("someone-else"))
            .await
            .unwrap();

        tracker.retire(&mut tasks, None, Duration::ZERO).await;
        assert!(repo.get(&orphan).await.unwrap().is_none());
        assert!(repo.get(&other).await.unwrap().is_some());
    }
}
