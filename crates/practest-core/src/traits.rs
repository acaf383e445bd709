//! Collaborator traits for the attempt controllers.
//!
//! The exam service, the token store, and the capture device are external to
//! this crate; `practest-client` and `practest-cli` provide implementations.

use async_trait::async_trait;

use crate::error::AttemptError;
use crate::model::{
    AttemptCreated, AttemptRequest, Capture, ExamModule, Report, ResultPayload, SessionCreated,
    SessionRequest, WritingSubmission,
};

// ---------------------------------------------------------------------------
// Exam service
// ---------------------------------------------------------------------------

/// The exam service: session and attempt creation plus grading.
///
/// Implementations return [`crate::error::ApiError`] inside the `anyhow::Error`
/// so controllers can recognise a rejected credential.
#[async_trait]
pub trait ExamApi: Send + Sync {
    async fn create_session(&self, request: &SessionRequest) -> anyhow::Result<SessionCreated>;

    async fn create_attempt(&self, request: &AttemptRequest) -> anyhow::Result<AttemptCreated>;

    async fn submit_writing(
        &self,
        attempt_id: &str,
        submission: &WritingSubmission,
    ) -> anyhow::Result<Report>;

    /// Upload one recording to the attempt-scoped endpoint.
    async fn submit_speaking(&self, attempt_id: &str, capture: &Capture) -> anyhow::Result<Report>;
}

/// Holder of the bearer credential used for every exam service call.
pub trait TokenStore: Send + Sync {
    fn token(&self) -> Option<String>;

    fn set_token(&self, token: String);

    /// Forget the credential. Called when the service answers 401.
    fn clear(&self);
}

// ---------------------------------------------------------------------------
// Capture device
// ---------------------------------------------------------------------------

/// An audio input that can be opened for one recording at a time.
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Request access to the device and start recording.
    ///
    /// An error here means access was not granted; nothing is held.
    async fn open(&self) -> anyhow::Result<Box<dyn ActiveCapture>>;
}

/// A recording in progress. Dropping it releases the device.
pub trait ActiveCapture: Send + Sync {
    /// Stop recording, release the device, and return the recorded blob.
    fn finish(self: Box<Self>) -> anyhow::Result<Capture>;
}

// ---------------------------------------------------------------------------
// User confirmation
// ---------------------------------------------------------------------------

/// A question the controller needs the user to answer before acting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    /// Submit the essay now.
    Submit {
        word_count: u32,
        min_words: u32,
        seconds_left: u32,
    },
    /// Leave the attempt; it will be forfeited.
    Forfeit { module: ExamModule, phase: String },
}

impl Confirmation {
    /// Human-readable question for terminal or UI prompts.
    pub fn message(&self) -> String {
        match self {
            Confirmation::Submit {
                word_count,
                min_words,
                seconds_left,
            } => {
                let mut msg = format!(
                    "Submit your essay now ({word_count} words, {} left)?",
                    crate::timer::format_clock(*seconds_left)
                );
                if word_count < min_words {
                    msg.push_str(&format!(" It is below the {min_words}-word minimum."));
                }
                msg
            }
            Confirmation::Forfeit { module, phase } => format!(
                "Leave the {module} attempt during {phase}? It will be forfeited and cannot be resumed."
            ),
        }
    }
}

/// Asks the user to confirm an irreversible action.
pub trait ConfirmPrompt: Send + Sync {
    fn confirm(&self, request: &Confirmation) -> bool;
}

/// Result of asking to leave an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// State was discarded and control returned to the caller.
    Exited,
    /// The user declined; the attempt continues.
    Stayed,
}

/// Prompt that accepts everything, for non-interactive runs.
pub struct AssumeYes;

impl ConfirmPrompt for AssumeYes {
    fn confirm(&self, _: &Confirmation) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Receives attempt progress for display.
pub trait AttemptObserver: Send + Sync {
    fn on_transition(&self, module: ExamModule, from: &str, to: &str);
    fn on_tick(&self, module: ExamModule, seconds_left: u32);
    fn on_error(&self, module: ExamModule, error: &AttemptError);
    fn on_result(&self, payload: &ResultPayload);
}

/// No-op observer.
pub struct NoopObserver;

impl AttemptObserver for NoopObserver {
    fn on_transition(&self, _: ExamModule, _: &str, _: &str) {}
    fn on_tick(&self, _: ExamModule, _: u32) {}
    fn on_error(&self, _: ExamModule, _: &AttemptError) {}
    fn on_result(&self, _: &ResultPayload) {}
}
