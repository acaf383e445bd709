//! Core data model types for practest.
//!
//! Wire types use camelCase field names to match the exam service.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Exam module an attempt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExamModule {
    Writing,
    Speaking,
}

impl fmt::Display for ExamModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExamModule::Writing => write!(f, "writing"),
            ExamModule::Speaking => write!(f, "speaking"),
        }
    }
}

impl FromStr for ExamModule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "writing" => Ok(ExamModule::Writing),
            "speaking" => Ok(ExamModule::Speaking),
            other => Err(format!("unknown exam module: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Request body for session creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub module: ExamModule,
    pub time_limit_seconds: u32,
    pub prompt_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreated {
    pub session_id: String,
}

/// Request body for attempt creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRequest {
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptCreated {
    pub attempt_id: String,
}

/// Request body for an essay submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WritingSubmission {
    pub essay_text: String,
    pub client_meta: ClientMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMeta {
    pub word_count: u32,
    pub user_agent: String,
}

/// Opaque grading payload returned by the scoring service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Report(pub serde_json::Value);

// ---------------------------------------------------------------------------
// Attempt-owned state
// ---------------------------------------------------------------------------

/// Scheduling context created once per attempt start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub module: ExamModule,
    pub prompt_text: String,
    pub time_limit_secs: u32,
}

/// One graded submission unit, linked 1:1 to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub id: String,
    pub session_id: String,
}

/// A finished recording, held in memory until the upload call returns.
#[derive(Clone, PartialEq, Eq)]
pub struct Capture {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl Capture {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
        }
    }

    /// File name used for the multipart upload, derived from the mime type.
    pub fn file_name(&self) -> String {
        let base = self
            .mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim();
        let ext = match base {
            "audio/webm" => "webm",
            "audio/ogg" => "ogg",
            "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
            "audio/mpeg" => "mp3",
            "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "m4a",
            _ => "bin",
        };
        format!("answer.{ext}")
    }
}

impl fmt::Debug for Capture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capture")
            .field("bytes", &self.data.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

/// What triggered a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmitReason {
    Manual,
    Timeout,
}

impl fmt::Display for SubmitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitReason::Manual => write!(f, "manual"),
            SubmitReason::Timeout => write!(f, "timeout"),
        }
    }
}

/// Graded result carried from the controller to the results view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultPayload {
    pub module: ExamModule,
    pub attempt_id: String,
    pub report: Report,
    pub meta: ResultMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_mime: Option<String>,
    pub reason: SubmitReason,
    pub submitted_at: DateTime<Utc>,
}

/// Count whitespace-separated words.
pub fn count_words(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

// ---------------------------------------------------------------------------
// Controller settings
// ---------------------------------------------------------------------------

/// Settings for a Writing attempt.
#[derive(Debug, Clone)]
pub struct WritingSettings {
    pub prompt_text: String,
    /// Whole-session time budget in seconds.
    pub duration_secs: u32,
    /// Advisory minimum shown in the submit confirmation.
    pub min_words: u32,
    /// Upper bound on a single submission call.
    pub submit_timeout: Duration,
    pub user_agent: String,
}

impl Default for WritingSettings {
    fn default() -> Self {
        Self {
            prompt_text: String::new(),
            duration_secs: 60 * 60,
            min_words: 250,
            submit_timeout: Duration::from_secs(90),
            user_agent: format!("practest/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Settings for a Speaking attempt.
#[derive(Debug, Clone)]
pub struct SpeakingSettings {
    pub prompt_text: String,
    pub prep_secs: u32,
    pub speak_secs: u32,
    /// Upper bound on the upload call.
    pub submit_timeout: Duration,
}

impl SpeakingSettings {
    /// Total time budget reported at session creation.
    pub fn time_limit_secs(&self) -> u32 {
        self.prep_secs.saturating_add(self.speak_secs)
    }
}

impl Default for SpeakingSettings {
    fn default() -> Self {
        Self {
            prompt_text: String::new(),
            prep_secs: 60,
            speak_secs: 120,
            submit_timeout: Duration::from_secs(90),
        }
    }
}
