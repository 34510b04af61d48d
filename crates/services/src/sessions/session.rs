use std::sync::Arc;

use survey_core::model::{
    AnswerValue, QuestionId, RespondentId, ResponseId, RetakePolicy, SectionId, SessionState,
    Step, SurveyDefinition,
};
use survey_core::{Clock, FlowController, Progress};

use super::collector::{AnswerCollector, CommitMode, InputSurface};
use super::snapshot::LocalSnapshotStore;
use super::submission::{SubmissionCoordinator, SubmitOutcome, build_payload, missing_required};
use super::tasks::BackgroundTasks;
use super::tracker::RemoteTracker;
use crate::config::SessionConfig;
use crate::error::SessionError;

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// One respondent's run through one survey.
///
/// Created by `SurveySessionService::open`, which restores any snapshot left
/// by an earlier visit. Host events map onto the `on_*` methods; each returns
/// the step the host should display next.
pub struct SurveySession {
    definition: Arc<SurveyDefinition>,
    respondent_id: RespondentId,
    policy: RetakePolicy,
    config: SessionConfig,
    clock: Clock,
    state: SessionState,
    collector: AnswerCollector,
    snapshots: LocalSnapshotStore,
    tracker: RemoteTracker,
    submission: SubmissionCoordinator,
    updates: BackgroundTasks,
    cleanup: BackgroundTasks,
}

pub(crate) struct SessionParts {
    pub definition: Arc<SurveyDefinition>,
    pub respondent_id: RespondentId,
    pub config: SessionConfig,
    pub clock: Clock,
    pub snapshots: LocalSnapshotStore,
    pub tracker: RemoteTracker,
    pub submission: SubmissionCoordinator,
}

impl SurveySession {
    pub(crate) async fn restore(parts: SessionParts) -> Self {
        let SessionParts {
            definition,
            respondent_id,
            config,
            clock,
            snapshots,
            tracker,
            submission,
        } = parts;
        let now = clock.now();
        let policy = RetakePolicy::from(definition.retake_mode());

        let mut state = match snapshots.load().await {
            Some(mut state) => {
                state.fill_missing_times(now);
                if !FlowController::new(&definition).contains(&state.step) {
                    tracing::warn!(
                        survey = %definition.id(),
                        step = ?state.step,
                        "snapshot points at a step the survey no longer has"
                    );
                    state.step = Step::ThankYou;
                }
                state
            }
            None => SessionState::new(now),
        };
        if policy.reuses_response_id() && state.prior_response_id.is_none() {
            state.prior_response_id = snapshots.load_last_response().await;
        }

        tracing::debug!(
            survey = %definition.id(),
            respondent = %respondent_id,
            step = ?state.step,
            "session opened"
        );

        Self {
            collector: AnswerCollector::new(config.debounce),
            definition,
            respondent_id,
            policy,
            config,
            clock,
            state,
            snapshots,
            tracker,
            submission,
            updates: BackgroundTasks::default(),
            cleanup: BackgroundTasks::default(),
        }
    }

    //
    // ─── ACCESSORS ─────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn definition(&self) -> &SurveyDefinition {
        &self.definition
    }

    #[must_use]
    pub fn respondent_id(&self) -> &RespondentId {
        &self.respondent_id
    }

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub fn step(&self) -> &Step {
        &self.state.step
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn progress(&self) -> Progress {
        survey_core::progress(&self.definition, &self.state.step, &self.state.answers)
    }

    /// Server-issued id of this run's response, once submitted.
    #[must_use]
    pub fn response_id(&self) -> Option<&ResponseId> {
        self.submission.submitted()
    }

    #[must_use]
    pub fn last_submit_error(&self) -> Option<&str> {
        self.submission.last_error()
    }

    /// Whether free-text edits are waiting for their debounce window.
    #[must_use]
    pub fn has_pending_input(&self) -> bool {
        self.collector.has_pending()
    }

    //
    // ─── HOST EVENTS ───────────────────────────────────────────────────────────
    //

    /// Leave `Welcome`, opening the remote incomplete record on first use.
    ///
    /// Resumed sessions stay where they are.
    pub async fn on_start(&mut self) -> Step {
        if !self.state.step.is_welcome() {
            return self.state.step.clone();
        }
        self.tracker.ensure_started(&mut self.state).await;
        let next = self.flow().next(&Step::Welcome, &self.state.answers);
        self.advance(&Step::Welcome, next).await
    }

    pub async fn on_back(&mut self) -> Step {
        if self.state.step.is_welcome() || self.state.step.is_terminal() {
            return self.state.step.clone();
        }
        self.flush().await;
        let from = self.state.step.clone();
        let previous = self.flow().back(&from);
        self.advance(&from, previous).await
    }

    /// # Errors
    ///
    /// Returns `SessionError::Completed` once the run reached `ThankYou`.
    pub async fn on_section_continue(&mut self, section_id: &SectionId) -> Result<Step, SessionError> {
        self.ensure_open()?;
        self.flush().await;
        let from = Step::Section(section_id.clone());
        let next = self.flow().next(&from, &self.state.answers);
        Ok(self.advance(&from, next).await)
    }

    /// Commit an answer, then either stay (`SaveOnly`) or move on (`Navigate`).
    ///
    /// Navigating away from the last question submits the run.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownQuestion` for ids outside the survey,
    /// `SessionError::Answer` when the value does not fit the question, and
    /// `SessionError::Completed` once the run reached `ThankYou`.
    pub async fn on_question_answer(
        &mut self,
        question_id: &QuestionId,
        answer: AnswerValue,
        mode: CommitMode,
    ) -> Result<Step, SessionError> {
        self.ensure_open()?;
        self.commit(question_id, Some(answer)).await?;
        self.collector.discard(question_id);
        if mode == CommitMode::SaveOnly {
            return Ok(self.state.step.clone());
        }
        self.flush().await;
        let from = Step::Question(question_id.clone());
        let next = self.flow().next(&from, &self.state.answers);
        Ok(self.advance(&from, next).await)
    }

    /// Submit the run.
    ///
    /// At `ThankYou` the earlier outcome is repeated instead of sending again.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::SubmitNotAllowed` unless the respondent is on the
    /// last question or the session is a preview, and `SessionError::Completed`
    /// at a `ThankYou` this session never submitted from.
    pub async fn on_submit(&mut self) -> Result<SubmitOutcome, SessionError> {
        match &self.state.step {
            Step::ThankYou => return self.submission.replay().ok_or(SessionError::Completed),
            Step::Question(id) if self.flow().is_last_question(id) => {}
            _ if self.config.preview => {}
            _ => return Err(SessionError::SubmitNotAllowed),
        }
        Ok(self.finalize().await)
    }

    /// Start over from `Welcome` according to the survey's retake mode.
    pub async fn on_restart(&mut self) -> Step {
        let now = self.clock.now();
        let last_response = match self.submission.submitted() {
            Some(id) => Some(id.clone()),
            None if self.policy.reuses_response_id() => self.snapshots.load_last_response().await,
            None => None,
        };
        let record = self.state.remote_record_id.clone();

        self.collector.reset();
        self.submission.reset();
        // Answers still in flight would land on the reset record.
        self.updates.settle().await;
        self.tracker.on_restart(self.policy, record.as_ref()).await;
        self.state = self.policy.restart_state(&self.state, last_response, now);

        if self.policy.wipes_snapshot_on_restart() {
            self.snapshots.clear().await;
        } else {
            self.snapshots.write(&self.state).await;
        }
        tracing::info!(
            survey = %self.definition.id(),
            mode = ?self.policy.mode(),
            "session restarted"
        );
        self.state.step.clone()
    }

    //
    // ─── FREE TEXT ─────────────────────────────────────────────────────────────
    //

    /// Record typed text; it is committed after the debounce window.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownQuestion` for ids outside the survey and
    /// `SessionError::Completed` once the run reached `ThankYou`.
    pub fn input_text(
        &mut self,
        question_id: &QuestionId,
        text: impl Into<String>,
    ) -> Result<(), SessionError> {
        self.ensure_open()?;
        if self.definition.question(question_id).is_none() {
            return Err(SessionError::UnknownQuestion(question_id.clone()));
        }
        self.collector
            .record_edit(question_id.clone(), text.into(), self.clock.now());
        Ok(())
    }

    /// Commit edits whose debounce window has elapsed. Returns how many were
    /// committed.
    pub async fn tick(&mut self) -> usize {
        let due = self.collector.take_due(self.clock.now());
        self.commit_raw(due).await
    }

    /// Sleep through the debounce windows until nothing is pending.
    pub async fn run_debounce(&mut self) -> usize {
        let mut committed = 0;
        while let Some(deadline) = self.collector.next_deadline() {
            let wait = (deadline - self.clock.now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;
            let due = self.collector.take_due(deadline);
            committed += self.commit_raw(due).await;
        }
        committed
    }

    /// Commit every pending edit now.
    pub async fn flush(&mut self) -> usize {
        let pending = self.collector.take_all();
        self.commit_raw(pending).await
    }

    pub fn register_surface(
        &mut self,
        question_id: QuestionId,
        surface: impl InputSurface + 'static,
    ) {
        self.collector.register(question_id, Box::new(surface));
    }

    pub fn unregister_surface(&mut self, question_id: &QuestionId) {
        self.collector.unregister(question_id);
    }

    /// Wait for background remote updates and delayed removals.
    pub async fn settle(&mut self) {
        self.updates.settle().await;
        self.cleanup.settle().await;
    }

    //
    // ─── INTERNALS ─────────────────────────────────────────────────────────────
    //

    fn flow(&self) -> FlowController<'_> {
        FlowController::new(&self.definition)
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.state.step.is_terminal() {
            return Err(SessionError::Completed);
        }
        Ok(())
    }

    /// Move from `from` to `to`. Reaching `ThankYou` submits only when the
    /// run actually walked off the end of the survey.
    async fn advance(&mut self, from: &Step, to: Step) -> Step {
        if to.is_terminal() {
            if self.completes_from(from) {
                self.finalize().await;
            } else {
                tracing::warn!(
                    survey = %self.definition.id(),
                    from = ?from,
                    "reached ThankYou without finishing the survey; nothing submitted"
                );
                self.state.step = Step::ThankYou;
                self.state.touch(self.clock.now());
                self.snapshots.write(&self.state).await;
            }
            return self.state.step.clone();
        }
        tracing::debug!(from = ?self.state.step, to = ?to, "step");
        self.state.step = to;
        self.state.touch(self.clock.now());
        self.snapshots.write(&self.state).await;
        self.state.step.clone()
    }

    /// Leaving a known question or section is the only way to finish a run;
    /// missing ids and an empty survey end it without a response.
    fn completes_from(&self, from: &Step) -> bool {
        matches!(from, Step::Question(_) | Step::Section(_)) && self.flow().contains(from)
    }

    /// Store or clear one answer and mirror it locally and remotely.
    async fn commit(
        &mut self,
        question_id: &QuestionId,
        value: Option<AnswerValue>,
    ) -> Result<(), SessionError> {
        let definition = Arc::clone(&self.definition);
        let question = definition
            .question(question_id)
            .ok_or_else(|| SessionError::UnknownQuestion(question_id.clone()))?;

        match value.and_then(AnswerValue::normalize) {
            Some(value) => {
                value.check(&question.kind)?;
                if let Some(record_id) = self.state.remote_record_id.clone() {
                    self.tracker.record(
                        &mut self.updates,
                        record_id,
                        question_id.clone(),
                        value.clone(),
                        question.section_id.clone(),
                    );
                }
                self.state.answers.insert(question_id.clone(), value);
            }
            None => {
                self.state.answers.remove(question_id);
            }
        }

        self.state.touch(self.clock.now());
        self.snapshots.write(&self.state).await;
        Ok(())
    }

    async fn commit_raw(&mut self, edits: Vec<(QuestionId, String)>) -> usize {
        let mut committed = 0;
        for (question_id, raw) in edits {
            let parsed = match self.definition.question(&question_id) {
                Some(question) => AnswerValue::from_input(&question.kind, &raw),
                None => continue,
            };
            let result = match parsed {
                Ok(value) => self.commit(&question_id, value).await,
                Err(err) => Err(err.into()),
            };
            match result {
                Ok(()) => committed += 1,
                Err(err) => {
                    tracing::warn!(question = %question_id, error = %err, "discarding typed input");
                }
            }
        }
        committed
    }

    async fn reconcile_surfaces(&mut self) {
        let found = self
            .collector
            .reconcile(self.state.step.question_id(), &self.state.answers);
        for (question_id, value) in found {
            if let Err(err) = self.commit(&question_id, Some(value)).await {
                tracing::warn!(question = %question_id, error = %err, "discarding surface value");
            }
        }
    }

    /// Submission path: flush, reconcile, send once, land on `ThankYou`.
    async fn finalize(&mut self) -> SubmitOutcome {
        if let Some(response_id) = self.submission.submitted() {
            let response_id = response_id.clone();
            self.state.step = Step::ThankYou;
            return SubmitOutcome::AlreadySubmitted { response_id };
        }

        self.flush().await;
        self.reconcile_surfaces().await;

        let now = self.clock.now();
        self.state.end_time = Some(now);
        let payload = build_payload(
            &self.definition,
            &self.respondent_id,
            &self.state,
            self.policy,
            now,
        );
        let missing = missing_required(&self.definition, &self.state);
        let outcome = self.submission.submit(payload, missing).await;

        self.state.step = Step::ThankYou;
        self.state.touch(now);

        match &outcome {
            SubmitOutcome::Submitted { response_id, .. } => {
                self.snapshots.save_last_response(response_id).await;
                if self.policy.reuses_response_id() {
                    self.state.prior_response_id = Some(response_id.clone());
                }
                let record = self.state.remote_record_id.take();
                self.updates.settle().await;
                self.tracker
                    .retire(&mut self.cleanup, record, self.config.completed_grace)
                    .await;
                self.snapshots.clear().await;
            }
            SubmitOutcome::Failed { .. } => self.snapshots.write(&self.state).await,
            SubmitOutcome::Preview { .. } => self.snapshots.clear().await,
            SubmitOutcome::AlreadySubmitted { .. } => {}
        }
        outcome
    }
}
