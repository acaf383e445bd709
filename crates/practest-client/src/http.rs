//! HTTP implementation of the exam service.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::instrument;

use practest_core::error::ApiError;
use practest_core::model::{
    AttemptCreated, AttemptRequest, Capture, Report, SessionCreated, SessionRequest,
    WritingSubmission,
};
use practest_core::traits::{ExamApi, TokenStore};

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Exam service reached over HTTP with a bearer credential.
pub struct HttpExamApi {
    base_url: String,
    tokens: Arc<dyn TokenStore>,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpExamApi {
    pub fn new(base_url: &str, tokens: Arc<dyn TokenStore>) -> anyhow::Result<Self> {
        Self::with_timeout(base_url, tokens, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(
        base_url: &str,
        tokens: Arc<dyn TokenStore>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
            client,
            timeout_secs: timeout.as_secs(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Attach the credential, send, and map the response.
    ///
    /// A 401 clears the stored credential before reporting `Unauthorized`.
    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, ApiError> {
        let token = self
            .tokens
            .token()
            .filter(|t| !t.is_empty())
            .ok_or(ApiError::MissingCredential)?;

        let response = request.bearer_auth(token).send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Timeout(self.timeout_secs)
            } else {
                ApiError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        if status == 401 {
            self.tokens.clear();
            tracing::warn!("credential rejected, stored token cleared");
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Unauthorized(error_message(&body)));
        }
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status,
                message: error_message(&body),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("failed to parse response: {e}")))
    }
}

#[derive(Deserialize)]
struct SubmissionResponse {
    report: Report,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(alias = "detail", alias = "error")]
    message: String,
}

/// Prefer the service's own message over the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| body.to_string())
}

#[async_trait]
impl ExamApi for HttpExamApi {
    #[instrument(skip(self, request), fields(module = %request.module))]
    async fn create_session(&self, request: &SessionRequest) -> anyhow::Result<SessionCreated> {
        let created = self
            .send(self.client.post(self.url("/sessions")).json(request))
            .await?;
        Ok(created)
    }

    #[instrument(skip(self, request), fields(session = %request.session_id))]
    async fn create_attempt(&self, request: &AttemptRequest) -> anyhow::Result<AttemptCreated> {
        let created = self
            .send(self.client.post(self.url("/attempts")).json(request))
            .await?;
        Ok(created)
    }

    #[instrument(skip(self, submission), fields(words = submission.client_meta.word_count))]
    async fn submit_writing(
        &self,
        attempt_id: &str,
        submission: &WritingSubmission,
    ) -> anyhow::Result<Report> {
        let response: SubmissionResponse = self
            .send(
                self.client
                    .post(self.url(&format!("/attempts/{attempt_id}/writing")))
                    .json(submission),
            )
            .await?;
        Ok(response.report)
    }

    #[instrument(skip(self, capture), fields(bytes = capture.data.len()))]
    async fn submit_speaking(&self, attempt_id: &str, capture: &Capture) -> anyhow::Result<Report> {
        let part = reqwest::multipart::Part::bytes(capture.data.clone())
            .file_name(capture.file_name())
            .mime_str(&capture.mime_type)
            .with_context(|| format!("invalid audio mime type: {}", capture.mime_type))?;
        let form = reqwest::multipart::Form::new().part("audio", part);

        let response: SubmissionResponse = self
            .send(
                self.client
                    .post(self.url(&format!("/attempts/{attempt_id}/speaking")))
                    .multipart(form),
            )
            .await?;
        Ok(response.report)
    }
}
