use chrono::{DateTime, Utc};

use crate::model::ids::ResponseId;
use crate::model::session::SessionState;
use crate::model::survey::RetakeMode;

/// What a restart does to the server-side incomplete record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteRestart {
    /// Wipe the retained record's answers and reopen it.
    Reset,
    /// Remove the open record so the next run starts a fresh one.
    Retire,
}

/// Retake behaviour shared by the snapshot store and the remote tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetakePolicy {
    mode: RetakeMode,
}

impl RetakePolicy {
    #[must_use]
    pub fn new(mode: RetakeMode) -> Self {
        Self { mode }
    }

    #[must_use]
    pub fn mode(&self) -> RetakeMode {
        self.mode
    }

    /// Whether a submission should carry the previous response id.
    #[must_use]
    pub fn reuses_response_id(&self) -> bool {
        self.mode == RetakeMode::Replace
    }

    /// Whether a restart deletes the local snapshot outright.
    #[must_use]
    pub fn wipes_snapshot_on_restart(&self) -> bool {
        self.mode == RetakeMode::New
    }

    #[must_use]
    pub fn remote_on_restart(&self) -> RemoteRestart {
        match self.mode {
            RetakeMode::New => RemoteRestart::Retire,
            RetakeMode::Replace => RemoteRestart::Reset,
        }
    }

    /// Response id to send with a submission.
    #[must_use]
    pub fn response_id_for_submission(&self, prior: Option<&ResponseId>) -> Option<ResponseId> {
        if self.reuses_response_id() {
            prior.cloned()
        } else {
            None
        }
    }

    /// State after a restart.
    ///
    /// Answers are always dropped. Replace mode keeps the remote record id and
    /// the prior response id so the next run overwrites instead of adding.
    #[must_use]
    pub fn restart_state(
        &self,
        previous: &SessionState,
        last_response: Option<ResponseId>,
        now: DateTime<Utc>,
    ) -> SessionState {
        let mut fresh = SessionState::new(now);
        if self.mode == RetakeMode::Replace {
            fresh.remote_record_id = previous.remote_record_id.clone();
            fresh.prior_response_id = last_response.or_else(|| previous.prior_response_id.clone());
        }
        fresh
    }
}

impl From<RetakeMode> for RetakePolicy {
    fn from(mode: RetakeMode) -> Self {
        Self::new(mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnswerValue, IncompleteRecordId, QuestionId};
    use crate::time::fixed_now;

    fn in_progress() -> SessionState {
        let mut state = SessionState::new(fixed_now());
        state.answers.insert(QuestionId::new("q1"), AnswerValue::Scale(2));
        state.remote_record_id = Some(IncompleteRecordId::new("rec"));
        state.prior_response_id = Some(ResponseId::new("old"));
        state
    }

    #[test]
    fn replace_keeps_identity_but_not_answers() {
        let policy = RetakePolicy::new(RetakeMode::Replace);
        let next = policy.restart_state(&in_progress(), Some(ResponseId::new("r9")), fixed_now());
        assert!(next.answers.is_empty());
        assert_eq!(next.remote_record_id, Some(IncompleteRecordId::new("rec")));
        assert_eq!(next.prior_response_id, Some(ResponseId::new("r9")));
        assert_eq!(policy.remote_on_restart(), RemoteRestart::Reset);
        assert!(!policy.wipes_snapshot_on_restart());
    }

    #[test]
    fn new_mode_starts_from_scratch() {
        let policy = RetakePolicy::from(RetakeMode::New);
        let next = policy.restart_state(&in_progress(), Some(ResponseId::new("r9")), fixed_now());
        assert_eq!(next, SessionState::new(fixed_now()));
        assert_eq!(policy.response_id_for_submission(Some(&ResponseId::new("r9"))), None);
        assert_eq!(policy.remote_on_restart(), RemoteRestart::Retire);
    }
}
