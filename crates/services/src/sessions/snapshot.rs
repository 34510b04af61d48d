use std::sync::Arc;

use storage::repository::SnapshotStore;
use survey_core::model::{RespondentId, ResponseId, SessionState, SurveyId};

/// Key of the session snapshot for one respondent.
#[must_use]
pub fn session_key(survey_id: &SurveyId, respondent_id: &RespondentId) -> String {
    format!("survey:{survey_id}:session:{respondent_id}")
}

/// Key holding the last server-issued response id, kept across snapshot clears.
#[must_use]
pub fn response_key(survey_id: &SurveyId, respondent_id: &RespondentId) -> String {
    format!("survey:{survey_id}:response:{respondent_id}")
}

/// Snapshot persistence for one `(survey, respondent)` pair.
///
/// Never fails: storage errors are logged and reads fall back to "nothing
/// stored".
#[derive(Clone)]
pub struct LocalSnapshotStore {
    store: Arc<dyn SnapshotStore>,
    session_key: String,
    response_key: String,
}

impl LocalSnapshotStore {
    #[must_use]
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        survey_id: &SurveyId,
        respondent_id: &RespondentId,
    ) -> Self {
        Self {
            store,
            session_key: session_key(survey_id, respondent_id),
            response_key: response_key(survey_id, respondent_id),
        }
    }

    /// Decoded snapshot, or `None` when absent or malformed.
    pub async fn load(&self) -> Option<SessionState> {
        let body = self.read(&self.session_key).await?;
        match serde_json::from_str(&body) {
            Ok(state) => Some(state),
            Err(err) => {
                tracing::debug!(key = %self.session_key, error = %err, "discarding malformed snapshot");
                None
            }
        }
    }

    pub async fn write(&self, state: &SessionState) {
        let body = match serde_json::to_string(state) {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!(error = %err, "snapshot encode failed");
                return;
            }
        };
        match self.store.save(&self.session_key, &body).await {
            Ok(()) => tracing::debug!(key = %self.session_key, step = ?state.step, "snapshot written"),
            Err(err) => tracing::warn!(key = %self.session_key, error = %err, "snapshot write failed"),
        }
    }

    pub async fn clear(&self) {
        if let Err(err) = self.store.clear(&self.session_key).await {
            tracing::warn!(key = %self.session_key, error = %err, "snapshot clear failed");
        }
    }

    pub async fn load_last_response(&self) -> Option<ResponseId> {
        let raw = self.read(&self.response_key).await?;
        raw.parse().ok()
    }

    pub async fn save_last_response(&self, id: &ResponseId) {
        if let Err(err) = self.store.save(&self.response_key, id.as_str()).await {
            tracing::warn!(key = %self.response_key, error = %err, "response id write failed");
        }
    }

    async fn read(&self, key: &str) -> Option<String> {
        match self.store.load(key).await {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!(key, error = %err, "snapshot read failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::repository::InMemoryRepository;
    use survey_core::model::{AnswerValue, QuestionId, Step};
    use survey_core::time::fixed_now;

    fn local(repo: &InMemoryRepository) -> LocalSnapshotStore {
        LocalSnapshotStore::new(
            Arc::new(repo.clone()),
            &SurveyId::new("s"),
            &RespondentId::new("r"),
        )
    }

    #[test]
    fn keys_are_deterministic_per_respondent() {
        let survey = SurveyId::new("s1");
        assert_eq!(
            session_key(&survey, &RespondentId::new("tok")),
            "survey:s1:session:tok"
        );
        assert_eq!(
            response_key(&survey, &RespondentId::new("tok")),
            "survey:s1:response:tok"
        );
        assert_ne!(
            session_key(&survey, &RespondentId::new("a")),
            session_key(&survey, &RespondentId::new("b"))
        );
    }

    #[tokio::test]
    async fn state_round_trips_and_clears() {
        let repo = InMemoryRepository::new();
        let store = local(&repo);

        let mut state = SessionState::new(fixed_now());
        state.step = Step::Question(QuestionId::new("q1"));
        state.answers.insert(QuestionId::new("q1"), AnswerValue::Scale(4));
        store.write(&state).await;
        assert_eq!(store.load().await, Some(state));

        store.clear().await;
        assert_eq!(store.load().await, None);
    }

    #[tokio::test]
    async fn malformed_bodies_are_ignored() {
        let repo = InMemoryRepository::new();
        let store = local(&repo);
        for body in ["not json", r#"{"step":{"kind":"welcome"}}"#, r#"{"answers":{}}"#] {
            repo.save("survey:s:session:r", body).await.unwrap();
            assert_eq!(store.load().await, None, "{body}");
        }
    }

    #[tokio::test]
    async fn last_response_survives_snapshot_clear() {
        let repo = InMemoryRepository::new();
        let store = local(&repo);
        store.save_last_response(&ResponseId::new("resp-1")).await;
        store.clear().await;
        assert_eq!(store.load_last_response().await, Some(ResponseId::new("resp-1")));
    }
}
