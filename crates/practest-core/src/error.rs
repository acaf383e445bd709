//! Error types for exam API calls and attempt controllers.
//!
//! `ApiError` is defined here rather than in the client crate so controllers
//! can downcast collaborator failures and recognise a rejected credential
//! without string matching.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when talking to the exam service.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The service rejected the bearer credential (HTTP 401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// No credential was available in the token store.
    #[error("no stored credential, sign in first")]
    MissingCredential,

    /// The service returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    Status { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    Network(String),

    /// The response body could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// Returns `true` if the stored credential is missing or was rejected.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_) | ApiError::MissingCredential)
    }
}

/// Where in the attempt lifecycle a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Start,
    Submission,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureStage::Start => write!(f, "start"),
            FailureStage::Submission => write!(f, "submission"),
        }
    }
}

/// Failures surfaced by an attempt controller.
///
/// Every variant is the result of a handled failure: by the time a caller
/// sees one, the controller has already moved to its recovery state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptError {
    /// Session or attempt creation failed. Retry from `Idle`.
    #[error("could not start the attempt: {0}")]
    Start(String),

    /// Microphone access was denied. The one-take budget is untouched.
    #[error("could not access the microphone: {0}")]
    CaptureAcquisition(String),

    /// The submission or upload failed.
    #[error("submission failed: {message}")]
    Submission { message: String, terminal: bool },

    /// The credential was rejected and has been cleared.
    #[error("unauthorized during {during}, please sign in again")]
    Unauthorized { during: FailureStage, terminal: bool },
}

impl AttemptError {
    /// Classify a failed session/attempt creation.
    pub fn start(err: &anyhow::Error) -> Self {
        if is_unauthorized(err) {
            AttemptError::Unauthorized {
                during: FailureStage::Start,
                terminal: false,
            }
        } else {
            AttemptError::Start(format!("{err:#}"))
        }
    }

    /// Classify a failed submission. `terminal` is set when the attempt has
    /// no way back to an editable phase.
    pub fn submission(err: &anyhow::Error, terminal: bool) -> Self {
        if is_unauthorized(err) {
            AttemptError::Unauthorized {
                during: FailureStage::Submission,
                terminal,
            }
        } else {
            AttemptError::Submission {
                message: format!("{err:#}"),
                terminal,
            }
        }
    }

    /// Returns `true` if the attempt ended because of this error.
    pub fn is_terminal(&self) -> bool {
        match self {
            AttemptError::Start(_) | AttemptError::CaptureAcquisition(_) => false,
            AttemptError::Submission { terminal, .. }
            | AttemptError::Unauthorized { terminal, .. } => *terminal,
        }
    }
}

/// Run a collaborator call, failing with [`ApiError::Timeout`] if it has not
/// answered within `limit`.
pub(crate) async fn within<T, F>(limit: Duration, call: F) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ApiError::Timeout(limit.as_secs()).into()),
    }
}

fn is_unauthorized(err: &anyhow::Error) -> bool {
    err.downcast_ref::<ApiError>()
        .is_some_and(ApiError::is_unauthorized)
}
