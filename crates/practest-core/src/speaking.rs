//! Speaking attempt controller.
//!
//! ```text
//! Idle → Starting → Prep → Recording → Processing → Done
//!          ↓ (start failed)   ↑   ↓ (mic denied, stay in Prep)
//!         Idle                └───┘
//! Starting | Prep | Recording | Processing → Abandoned   (confirmed exit)
//! ```
//!
//! A Speaking attempt has one take. The capture guard is locked as soon as
//! the device is acquired, and an upload failure ends the attempt because
//! the recording cannot be made again.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{within, AttemptError};
use crate::guard::{CaptureGuard, SubmissionGuard};
use crate::handoff::ResultHandoff;
use crate::model::{
    Attempt, AttemptRequest, Capture, ExamModule, Report, ResultMeta, ResultPayload, Session,
    SessionRequest, SpeakingSettings, SubmitReason,
};
use crate::timer::{Countdown, PhaseToken, Tick};
use crate::traits::{
    ActiveCapture, AttemptObserver, CaptureDevice, ConfirmPrompt, Confirmation, ExamApi,
    ExitOutcome, NoopObserver,
};
use crate::transitions::{AttemptState, StateCell, TransitionRecord};

/// Phases of a Speaking attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakingState {
    Idle,
    Starting,
    Prep,
    Recording,
    Processing,
    Done,
    Abandoned,
}

impl SpeakingState {
    /// Leaving from this state forfeits the attempt.
    pub fn needs_exit_confirmation(self) -> bool {
        matches!(
            self,
            Self::Starting | Self::Prep | Self::Recording | Self::Processing
        )
    }
}

impl fmt::Display for SpeakingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Prep => "prep",
            Self::Recording => "recording",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Abandoned => "abandoned",
        };
        f.write_str(name)
    }
}

impl AttemptState for SpeakingState {
    fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Abandoned)
    }

    fn can_transition(self, to: Self) -> bool {
        use SpeakingState::*;

        if to == Abandoned {
            return self.needs_exit_confirmation();
        }
        matches!(
            (self, to),
            (Idle, Starting)
                | (Starting, Prep)
                | (Starting, Idle)
                | (Prep, Recording)
                | (Recording, Processing)
                | (Processing, Done)
        )
    }
}

/// Drives one Speaking attempt.
pub struct SpeakingController {
    api: Arc<dyn ExamApi>,
    device: Arc<dyn CaptureDevice>,
    handoff: ResultHandoff,
    observer: Arc<dyn AttemptObserver>,
    settings: SpeakingSettings,
    state: StateCell<SpeakingState>,
    session: Option<Session>,
    attempt: Option<Attempt>,
    token: PhaseToken,
    countdown: Option<Countdown>,
    capture_guard: CaptureGuard,
    submit_guard: SubmissionGuard,
    recording: Option<Box<dyn ActiveCapture>>,
    report: Option<Report>,
    last_error: Option<AttemptError>,
}

impl SpeakingController {
    pub fn new(
        api: Arc<dyn ExamApi>,
        device: Arc<dyn CaptureDevice>,
        handoff: ResultHandoff,
        settings: SpeakingSettings,
    ) -> Self {
        Self {
            api,
            device,
            handoff,
            observer: Arc::new(NoopObserver),
            settings,
            state: StateCell::new(SpeakingState::Idle),
            session: None,
            attempt: None,
            token: PhaseToken::default(),
            countdown: None,
            capture_guard: CaptureGuard::new(),
            submit_guard: SubmissionGuard::new(),
            recording: None,
            report: None,
            last_error: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn AttemptObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn state(&self) -> SpeakingState {
        self.state.current()
    }

    pub fn history(&self) -> &[TransitionRecord<SpeakingState>] {
        self.state.history()
    }

    /// How many times the attempt has entered `state`.
    pub fn entries_into(&self, state: SpeakingState) -> usize {
        self.state.entries_into(state)
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn attempt(&self) -> Option<&Attempt> {
        self.attempt.as_ref()
    }

    /// Prompt text, shown read-only during preparation and recording.
    pub fn prompt_text(&self) -> &str {
        &self.settings.prompt_text
    }

    pub fn can_capture(&self) -> bool {
        self.capture_guard.can_capture()
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    pub fn seconds_left(&self) -> u32 {
        self.countdown.as_ref().map_or(0, Countdown::remaining)
    }

    pub fn has_active_timer(&self) -> bool {
        self.countdown.as_ref().is_some_and(Countdown::is_active)
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

    fn advance(&mut self, to: SpeakingState) {
        let from = self.state.current();
        if self.state.advance(to) {
            self.observer
                .on_transition(ExamModule::Speaking, &from.to_string(), &to.to_string());
        }
    }

    fn fail(&mut self, err: AttemptError) -> AttemptError {
        tracing::warn!(state = %self.state(), "{err}");
        self.observer.on_error(ExamModule::Speaking, &err);
        self.last_error = Some(err.clone());
        err
    }

    fn start_phase_clock(&mut self, seconds: u32) {
        if let Some(previous) = self.countdown.as_mut() {
            previous.cancel();
        }
        self.token = self.token.next();
        self.countdown = Some(Countdown::start(self.token, seconds));
    }

    /// Create the session and attempt, then start the preparation window.
    ///
    /// Does nothing outside `Idle`.
    #[instrument(skip(self), fields(module = "speaking"))]
    pub async fn start(&mut self) -> Result<(), AttemptError> {
        if self.state() != SpeakingState::Idle {
            tracing::debug!(state = %self.state(), "start ignored");
            return Ok(());
        }
        self.last_error = None;
        self.advance(SpeakingState::Starting);

        match self.open_attempt().await {
            Ok((session, attempt)) => {
                tracing::info!(session = %session.id, attempt = %attempt.id, "speaking attempt opened");
                self.session = Some(session);
                self.attempt = Some(attempt);
                self.start_phase_clock(self.settings.prep_secs);
                self.advance(SpeakingState::Prep);
                Ok(())
            }
            Err(e) => {
                self.session = None;
                self.attempt = None;
                self.advance(SpeakingState::Idle);
                Err(self.fail(AttemptError::start(&e)))
            }
        }
    }

    async fn open_attempt(&self) -> anyhow::Result<(Session, Attempt)> {
        let request = SessionRequest {
            module: ExamModule::Speaking,
            time_limit_seconds: self.settings.time_limit_secs(),
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
                module: ExamModule::Speaking,
                prompt_text: request.prompt_text,
                time_limit_secs: request.time_limit_seconds,
            },
            Attempt {
                id: attempt.attempt_id,
                session_id: created.session_id,
            },
        ))
    }

    /// Advance the active countdown by one second.
    ///
    /// Preparation running out starts the recording; the speaking window
    /// running out stops it.
    pub async fn on_tick(&mut self, token: PhaseToken) -> Result<(), AttemptError> {
        let state = self.state();
        if !matches!(state, SpeakingState::Prep | SpeakingState::Recording) {
            return Ok(());
        }
        let Some(countdown) = self.countdown.as_mut() else {
            return Ok(());
        };
        match countdown.tick(token) {
            Tick::Running(left) => {
                self.observer.on_tick(ExamModule::Speaking, left);
                Ok(())
            }
            Tick::Expired => {
                self.observer.on_tick(ExamModule::Speaking, 0);
                if state == SpeakingState::Prep {
                    tracing::info!("preparation over, starting recording");
                    self.begin_recording().await.map(|_| ())
                } else {
                    tracing::info!("speaking time over, stopping recording");
                    self.finish_recording(SubmitReason::Timeout).await.map(|_| ())
                }
            }
            Tick::Idle => {
                tracing::trace!("stale tick ignored");
                Ok(())
            }
        }
    }

    /// Acquire the device and start the one permitted recording.
    ///
    /// Returns `Ok(false)` when the call was a no-op (wrong phase or the take
    /// is already used). A denied acquisition leaves the attempt in `Prep`
    /// with the take still available.
    #[instrument(skip(self), fields(module = "speaking"))]
    pub async fn begin_recording(&mut self) -> Result<bool, AttemptError> {
        if self.state() != SpeakingState::Prep {
            tracing::debug!(state = %self.state(), "begin recording ignored");
            return Ok(false);
        }
        if !self.capture_guard.can_capture() {
            tracing::debug!("recording already taken for this attempt");
            return Ok(false);
        }

        match self.device.open().await {
            Ok(handle) => {
                self.capture_guard.lock();
                self.recording = Some(handle);
                self.last_error = None;
                self.start_phase_clock(self.settings.speak_secs);
                self.advance(SpeakingState::Recording);
                Ok(true)
            }
            Err(e) => Err(self.fail(AttemptError::CaptureAcquisition(format!("{e:#}")))),
        }
    }

    /// Stop recording at the user's request.
    pub async fn stop_recording(&mut self) -> Result<bool, AttemptError> {
        self.finish_recording(SubmitReason::Manual).await
    }

    /// Shared stop path for the manual and timeout triggers. Only the first
    /// caller in `Recording` gets through.
    async fn finish_recording(&mut self, reason: SubmitReason) -> Result<bool, AttemptError> {
        if self.state() != SpeakingState::Recording {
            tracing::debug!(state = %self.state(), %reason, "stop ignored");
            return Ok(false);
        }
        if let Some(countdown) = self.countdown.as_mut() {
            countdown.cancel();
        }
        let handle = self.recording.take();
        self.advance(SpeakingState::Processing);

        let capture = match handle.map(|h| h.finish()) {
            Some(Ok(capture)) => capture,
            Some(Err(e)) => {
                return Err(self.end_with(AttemptError::Submission {
                    message: format!("recording could not be finalized: {e:#}"),
                    terminal: true,
                }));
            }
            None => {
                return Err(self.end_with(AttemptError::Submission {
                    message: "no recording was in progress".into(),
                    terminal: true,
                }));
            }
        };
        tracing::info!(bytes = capture.data.len(), %reason, "recording finished");
        self.upload(capture, reason).await
    }

    async fn upload(&mut self, capture: Capture, reason: SubmitReason) -> Result<bool, AttemptError> {
        let Some(attempt_id) = self.attempt.as_ref().map(|a| a.id.clone()) else {
            return Err(self.end_with(AttemptError::Submission {
                message: "attempt was discarded".into(),
                terminal: true,
            }));
        };
        if !self.submit_guard.try_submit() {
            tracing::debug!(%reason, "duplicate upload ignored");
            return Ok(false);
        }

        let outcome = within(
            self.settings.submit_timeout,
            self.api.submit_speaking(&attempt_id, &capture),
        )
        .await;
        let audio_mime = capture.mime_type.clone();
        drop(capture);

        match outcome {
            Ok(report) => {
                let payload = ResultPayload {
                    module: ExamModule::Speaking,
                    attempt_id,
                    report: report.clone(),
                    meta: ResultMeta {
                        word_count: None,
                        audio_mime: Some(audio_mime),
                        reason,
                        submitted_at: Utc::now(),
                    },
                };
                if let Err(e) = self.handoff.publish(&payload) {
                    tracing::error!("could not hand off result: {e}");
                }
                self.report = Some(report);
                self.advance(SpeakingState::Done);
                self.observer.on_result(&payload);
                Ok(true)
            }
            Err(e) => Err(self.end_with(AttemptError::submission(&e, true))),
        }
    }

    /// Terminal failure while processing: the attempt still reaches `Done`.
    fn end_with(&mut self, err: AttemptError) -> AttemptError {
        self.advance(SpeakingState::Done);
        self.fail(err)
    }

    /// Leave the attempt, asking first if it would be forfeited.
    pub fn exit(&mut self, prompt: &dyn ConfirmPrompt) -> ExitOutcome {
        let state = self.state();
        if state.needs_exit_confirmation() {
            let question = Confirmation::Forfeit {
                module: ExamModule::Speaking,
                phase: state.to_string(),
            };
            if !prompt.confirm(&question) {
                return ExitOutcome::Stayed;
            }
            self.advance(SpeakingState::Abandoned);
            self.session = None;
            self.attempt = None;
            tracing::info!("speaking attempt forfeited");
        }
        self.teardown();
        ExitOutcome::Exited
    }

    /// Stop the countdown and release the device. Safe to call repeatedly.
    pub fn teardown(&mut self) {
        if let Some(countdown) = self.countdown.as_mut() {
            countdown.cancel();
        }
        if self.recording.take().is_some() {
            tracing::debug!("capture device released on teardown");
        }
    }
}

impl Drop for SpeakingController {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table() {
        use SpeakingState::*;

        assert!(Starting.can_transition(Prep));
        assert!(Prep.can_transition(Recording));
        assert!(Recording.can_transition(Processing));
        assert!(Processing.can_transition(Done));
        assert!(Recording.can_transition(Abandoned));
        assert!(!Prep.can_transition(Processing));
        assert!(!Processing.can_transition(Recording));
        assert!(!Processing.can_transition(Processing));
        assert!(!Done.can_transition(Abandoned));
    }

    #[test]
    fn exit_confirmation_only_for_live_states() {
        use SpeakingState::*;

        assert!(Prep.needs_exit_confirmation());
        assert!(Recording.needs_exit_confirmation());
        assert!(!Idle.needs_exit_confirmation());
        assert!(!Done.needs_exit_confirmation());
    }
}
