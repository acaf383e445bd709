//! Writing attempt controller.
//!
//! ```text
//! Idle → Starting → Running → Submitting → Done
//!          ↓ (start failed)       ↓ (submit failed)
//!         Idle                  Running
//! Starting | Running | Submitting → Abandoned   (confirmed exit)
//! ```
//!
//! The countdown keeps running across a failed submission: time spent
//! waiting on the service is not given back.
//!
//! Once time is up the essay is locked for good. A failed time-up
//! submission is retried on the following ticks, at most
//! [`TIME_UP_SUBMIT_ATTEMPTS`] times in total, after which the attempt ends
//! in `Done` with a terminal error and no report.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{within, AttemptError};
use crate::guard::SubmissionGuard;
use crate::handoff::ResultHandoff;
use crate::model::{
    count_words, Attempt, AttemptRequest, ClientMeta, ExamModule, Report, ResultMeta,
    ResultPayload, Session, SessionRequest, SubmitReason, WritingSettings, WritingSubmission,
};
use crate::timer::{Countdown, PhaseToken, Tick};
use crate::traits::{
    AttemptObserver, ConfirmPrompt, Confirmation, ExamApi, ExitOutcome, NoopObserver,
};
use crate::transitions::{AttemptState, StateCell, TransitionRecord};

/// Submission tries allowed once the countdown has reached zero.
pub const TIME_UP_SUBMIT_ATTEMPTS: u32 = 3;

/// Phases of a Writing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritingState {
    Idle,
    Starting,
    Running,
    Submitting,
    Done,
    Abandoned,
}

impl WritingState {
    /// Leaving from this state forfeits the attempt.
    pub fn needs_exit_confirmation(self) -> bool {
        matches!(self, Self::Starting | Self::Running | Self::Submitting)
    }
}

impl fmt::Display for WritingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Submitting => "submitting",
            Self::Done => "done",
            Self::Abandoned => "abandoned",
        };
        f.write_str(name)
    }
}

impl AttemptState for WritingState {
    fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Abandoned)
    }

    fn can_transition(self, to: Self) -> bool {
        use WritingState::*;

        if to == Abandoned {
            return self.needs_exit_confirmation();
        }
        matches!(
            (self, to),
            (Idle, Starting)
                | (Starting, Running)
                | (Starting, Idle)
                | (Running, Submitting)
                | (Submitting, Done)
                | (Submitting, Running)
        )
    }
}

/// Drives one Writing attempt.
pub struct WritingController {
    api: Arc<dyn ExamApi>,
    handoff: ResultHandoff,
    observer: Arc<dyn AttemptObserver>,
    settings: WritingSettings,
    state: StateCell<WritingState>,
    session: Option<Session>,
    attempt: Option<Attempt>,
    essay: String,
    token: PhaseToken,
    countdown: Option<Countdown>,
    submit_guard: SubmissionGuard,
    time_up_failures: u32,
    report: Option<Report>,
    last_error: Option<AttemptError>,
}

impl WritingController {
    pub fn new(api: Arc<dyn ExamApi>, handoff: ResultHandoff, settings: WritingSettings) -> Self {
        Self {
            api,
            handoff,
            observer: Arc::new(NoopObserver),
            settings,
            state: StateCell::new(WritingState::Idle),
            session: None,
            attempt: None,
            essay: String::new(),
            token: PhaseToken::default(),
            countdown: None,
            submit_guard: SubmissionGuard::new(),
            time_up_failures: 0,
            report: None,
            last_error: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn AttemptObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn state(&self) -> WritingState {
        self.state.current()
    }

    pub fn history(&self) -> &[TransitionRecord<WritingState>] {
        self.state.history()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn attempt(&self) -> Option<&Attempt> {
        self.attempt.as_ref()
    }

    pub fn essay(&self) -> &str {
        &self.essay
    }

    pub fn word_count(&self) -> u32 {
        count_words(&self.essay)
    }

    pub fn is_editable(&self) -> bool {
        self.state() == WritingState::Running && !self.is_time_up()
    }

    /// The countdown has reached zero.
    pub fn is_time_up(&self) -> bool {
        self.countdown.as_ref().is_some_and(Countdown::is_expired)
    }

    pub fn seconds_left(&self) -> u32 {
        self.countdown.as_ref().map_or(0, Countdown::remaining)
    }

    /// Whether ticks still matter: the countdown is running, or a time-up
    /// submission is waiting to be retried.
    pub fn has_active_timer(&self) -> bool {
        self.countdown.as_ref().is_some_and(Countdown::is_active)
            || (self.state() == WritingState::Running && self.is_time_up())
    }

    /// Token for ticks scheduled now.
    pub fn phase_token(&self) -> PhaseToken {
        self.token
    }

    pub fn report(&self) -> Option<&Report> {
        self.report.as_ref()
    }

    pub fn last_error(&self) -> Option<&AttemptError> {
        self.last_error.as_ref()
    }

    fn advance(&mut self, to: WritingState) {
        let from = self.state.current();
        if self.state.advance(to) {
            self.observer
                .on_transition(ExamModule::Writing, &from.to_string(), &to.to_string());
        }
    }

    fn fail(&mut self, err: AttemptError) -> AttemptError {
        tracing::warn!(state = %self.state(), "{err}");
        self.observer.on_error(ExamModule::Writing, &err);
        self.last_error = Some(err.clone());
        err
    }

    /// Create the session and attempt, then start the countdown.
    ///
    /// Does nothing outside `Idle`.
    #[instrument(skip(self), fields(module = "writing"))]
    pub async fn start(&mut self) -> Result<(), AttemptError> {
        if self.state() != WritingState::Idle {
            tracing::debug!(state = %self.state(), "start ignored");
            return Ok(());
        }
        self.last_error = None;
        self.advance(WritingState::Starting);

        match self.open_attempt().await {
            Ok((session, attempt)) => {
                tracing::info!(session = %session.id, attempt = %attempt.id, "writing attempt opened");
                self.session = Some(session);
                self.attempt = Some(attempt);
                self.token = self.token.next();
                self.countdown = Some(Countdown::start(self.token, self.settings.duration_secs));
                self.advance(WritingState::Running);
                Ok(())
            }
            Err(e) => {
                self.session = None;
                self.attempt = None;
                self.advance(WritingState::Idle);
                Err(self.fail(AttemptError::start(&e)))
            }
        }
    }

    async fn open_attempt(&self) -> anyhow::Result<(Session, Attempt)> {
        let request = SessionRequest {
            module: ExamModule::Writing,
            time_limit_seconds: self.settings.duration_secs,
            prompt_text: self.settings.prompt_text.clone(),
        };
        let created = self.api.create_session(&request).await?;
        let attempt = self
            .api
            .create_attempt(&AttemptRequest {
                session_id: created.session_id.clone(),
            })
            .await?;

        Ok((
            Session {
                id: created.session_id.clone(),
                module: ExamModule::Writing,
                prompt_text: request.prompt_text,
                time_limit_secs: request.time_limit_seconds,
            },
            Attempt {
                id: attempt.attempt_id,
                session_id: created.session_id,
            },
        ))
    }

    /// Replace the essay text. Returns `false` once the essay is read-only.
    pub fn edit(&mut self, text: impl Into<String>) -> bool {
        if !self.is_editable() {
            tracing::debug!(state = %self.state(), "edit rejected, essay is read-only");
            return false;
        }
        self.essay = text.into();
        true
    }

    /// Advance the countdown by one second; at zero the essay is submitted.
    ///
    /// After a failed time-up submission, each further tick retries it.
    pub async fn on_tick(&mut self, token: PhaseToken) -> Result<(), AttemptError> {
        if self.state() != WritingState::Running {
            return Ok(());
        }
        let Some(countdown) = self.countdown.as_mut() else {
            return Ok(());
        };
        if countdown.is_expired() {
            if countdown.token() != token {
                return Ok(());
            }
            tracing::info!(failures = self.time_up_failures, "retrying time-up submission");
            return self.submit(SubmitReason::Timeout).await.map(|_| ());
        }
        match countdown.tick(token) {
            Tick::Running(left) => {
                self.observer.on_tick(ExamModule::Writing, left);
                Ok(())
            }
            Tick::Expired => {
                self.observer.on_tick(ExamModule::Writing, 0);
                tracing::info!("time is up, submitting essay");
                self.submit(SubmitReason::Timeout).await.map(|_| ())
            }
            Tick::Idle => {
                tracing::trace!("stale tick ignored");
                Ok(())
            }
        }
    }

    /// Ask the user to confirm, then submit with reason `manual`.
    ///
    /// Returns `Ok(true)` only if this call submitted successfully. Once time
    /// is up the submission is automatic and nothing is asked.
    pub async fn request_submit(&mut self, prompt: &dyn ConfirmPrompt) -> Result<bool, AttemptError> {
        if self.state() != WritingState::Running
            || self.submit_guard.has_fired()
            || self.is_time_up()
        {
            return Ok(false);
        }
        let question = Confirmation::Submit {
            word_count: self.word_count(),
            min_words: self.settings.min_words,
            seconds_left: self.seconds_left(),
        };
        if !prompt.confirm(&question) {
            tracing::debug!("manual submit declined");
            return Ok(false);
        }
        self.submit(SubmitReason::Manual).await
    }

    /// Submit the essay exactly once.
    ///
    /// Both the manual and the timeout paths land here. Calls that lose the
    /// guard, or arrive outside `Running`, are ignored and return `Ok(false)`.
    #[instrument(skip(self), fields(module = "writing"))]
    pub async fn submit(&mut self, reason: SubmitReason) -> Result<bool, AttemptError> {
        if self.state() != WritingState::Running {
            tracing::debug!(state = %self.state(), %reason, "submit ignored");
            return Ok(false);
        }
        let Some(attempt_id) = self.attempt.as_ref().map(|a| a.id.clone()) else {
            return Ok(false);
        };
        if !self.submit_guard.try_submit() {
            tracing::debug!(%reason, "duplicate submit ignored");
            return Ok(false);
        }
        self.advance(WritingState::Submitting);

        let word_count = self.word_count();
        let submission = WritingSubmission {
            essay_text: self.essay.clone(),
            client_meta: ClientMeta {
                word_count,
                user_agent: self.settings.user_agent.clone(),
            },
        };
        let outcome = within(
            self.settings.submit_timeout,
            self.api.submit_writing(&attempt_id, &submission),
        )
        .await;

        match outcome {
            Ok(report) => {
                if let Some(countdown) = self.countdown.as_mut() {
                    countdown.cancel();
                }
                let payload = ResultPayload {
                    module: ExamModule::Writing,
                    attempt_id,
                    report: report.clone(),
                    meta: ResultMeta {
                        word_count: Some(word_count),
                        audio_mime: None,
                        reason,
                        submitted_at: Utc::now(),
                    },
                };
                if let Err(e) = self.handoff.publish(&payload) {
                    tracing::error!("could not hand off result: {e}");
                }
                self.report = Some(report);
                self.last_error = None;
                self.advance(WritingState::Done);
                self.observer.on_result(&payload);
                Ok(true)
            }
            Err(e) if self.is_time_up() => {
                self.time_up_failures += 1;
                if self.time_up_failures >= TIME_UP_SUBMIT_ATTEMPTS {
                    tracing::error!(attempts = self.time_up_failures, "time-up submission abandoned");
                    self.advance(WritingState::Done);
                    return Err(self.fail(AttemptError::submission(&e, true)));
                }
                self.submit_guard.reset();
                self.advance(WritingState::Running);
                Err(self.fail(AttemptError::submission(&e, false)))
            }
            Err(e) => {
                self.submit_guard.reset();
                self.advance(WritingState::Running);
                Err(self.fail(AttemptError::submission(&e, false)))
            }
        }
    }

    /// Leave the attempt, asking first if it would be forfeited.
    pub fn exit(&mut self, prompt: &dyn ConfirmPrompt) -> ExitOutcome {
        let state = self.state();
        if state.needs_exit_confirmation() {
            let question = Confirmation::Forfeit {
                module: ExamModule::Writing,
                phase: state.to_string(),
            };
            if !prompt.confirm(&question) {
                return ExitOutcome::Stayed;
            }
            self.advance(WritingState::Abandoned);
            self.session = None;
            self.attempt = None;
            self.essay.clear();
            tracing::info!("writing attempt forfeited");
        }
        self.teardown();
        ExitOutcome::Exited
    }

    /// Stop the countdown. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        if let Some(countdown) = self.countdown.as_mut() {
            countdown.cancel();
        }
    }
}

impl Drop for WritingController {
    fn drop(&mut self) {
        self.teardown();
    }
}
