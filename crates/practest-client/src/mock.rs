//! In-process doubles for driving the attempt controllers without a server
//! or a microphone.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use practest_core::error::{ApiError, AttemptError};
use practest_core::model::{
    AttemptCreated, AttemptRequest, Capture, ExamModule, Report, ResultPayload, SessionCreated,
    SessionRequest, WritingSubmission,
};
use practest_core::traits::{
    ActiveCapture, AttemptObserver, CaptureDevice, ConfirmPrompt, Confirmation, ExamApi,
    TokenStore,
};

/// A failure to inject into the next call of one [`MockExamApi`] operation.
#[derive(Debug, Clone)]
pub enum MockFailure {
    /// Answer as if the service returned 401.
    Unauthorized,
    /// Answer with an error status.
    Status(u16, String),
    /// Answer as if the HTTP client timed out.
    Timeout,
    /// Never answer.
    Hang,
}

impl MockFailure {
    async fn into_error(self, tokens: Option<&Arc<dyn TokenStore>>) -> anyhow::Error {
        match self {
            MockFailure::Unauthorized => {
                if let Some(tokens) = tokens {
                    tokens.clear();
                }
                ApiError::Unauthorized("token expired".into()).into()
            }
            MockFailure::Status(status, message) => ApiError::Status { status, message }.into(),
            MockFailure::Timeout => ApiError::Timeout(30).into(),
            MockFailure::Hang => std::future::pending().await,
        }
    }
}

#[derive(Default)]
struct FailureQueues {
    session: VecDeque<MockFailure>,
    attempt: VecDeque<MockFailure>,
    writing: VecDeque<MockFailure>,
    speaking: VecDeque<MockFailure>,
}

/// A mock exam service.
///
/// Every call succeeds unless a failure was queued for that operation.
/// Session and attempt ids are freshly generated per call.
pub struct MockExamApi {
    report: Report,
    failures: Mutex<FailureQueues>,
    tokens: Option<Arc<dyn TokenStore>>,
    session_calls: AtomicU32,
    attempt_calls: AtomicU32,
    writing_calls: AtomicU32,
    speaking_calls: AtomicU32,
    last_session: Mutex<Option<SessionRequest>>,
    last_writing: Mutex<Option<WritingSubmission>>,
    last_capture: Mutex<Option<Capture>>,
}

impl Default for MockExamApi {
    fn default() -> Self {
        Self::with_report(Report(serde_json::json!({
            "band": 6.5,
            "feedback": "Clear position with some development."
        })))
    }
}

impl MockExamApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock that grades every submission with `report`.
    pub fn with_report(report: Report) -> Self {
        Self {
            report,
            failures: Mutex::new(FailureQueues::default()),
            tokens: None,
            session_calls: AtomicU32::new(0),
            attempt_calls: AtomicU32::new(0),
            writing_calls: AtomicU32::new(0),
            speaking_calls: AtomicU32::new(0),
            last_session: Mutex::new(None),
            last_writing: Mutex::new(None),
            last_capture: Mutex::new(None),
        }
    }

    /// Clear `tokens` whenever an unauthorized answer is injected.
    pub fn with_token_store(mut self, tokens: Arc<dyn TokenStore>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn fail_session(&self, failure: MockFailure) {
        self.queues().session.push_back(failure);
    }

    pub fn fail_attempt(&self, failure: MockFailure) {
        self.queues().attempt.push_back(failure);
    }

    pub fn fail_writing(&self, failure: MockFailure) {
        self.queues().writing.push_back(failure);
    }

    pub fn fail_speaking(&self, failure: MockFailure) {
        self.queues().speaking.push_back(failure);
    }

    pub fn session_calls(&self) -> u32 {
        self.session_calls.load(Ordering::Relaxed)
    }

    pub fn attempt_calls(&self) -> u32 {
        self.attempt_calls.load(Ordering::Relaxed)
    }

    pub fn writing_calls(&self) -> u32 {
        self.writing_calls.load(Ordering::Relaxed)
    }

    pub fn speaking_calls(&self) -> u32 {
        self.speaking_calls.load(Ordering::Relaxed)
    }

    pub fn last_session(&self) -> Option<SessionRequest> {
        lock(&self.last_session).clone()
    }

    pub fn last_writing(&self) -> Option<WritingSubmission> {
        lock(&self.last_writing).clone()
    }

    pub fn last_capture(&self) -> Option<Capture> {
        lock(&self.last_capture).clone()
    }

    fn queues(&self) -> std::sync::MutexGuard<'_, FailureQueues> {
        lock(&self.failures)
    }

    async fn injected(
        &self,
        pick: fn(&mut FailureQueues) -> &mut VecDeque<MockFailure>,
    ) -> anyhow::Result<()> {
        let next = pick(&mut self.queues()).pop_front();
        match next {
            Some(failure) => Err(failure.into_error(self.tokens.as_ref()).await),
            None => Ok(()),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl ExamApi for MockExamApi {
    async fn create_session(&self, request: &SessionRequest) -> anyhow::Result<SessionCreated> {
        let n = self.session_calls.fetch_add(1, Ordering::Relaxed) + 1;
        *lock(&self.last_session) = Some(request.clone());
        self.injected(|q| &mut q.session).await?;
        Ok(SessionCreated {
            session_id: format!("session-{n}-{}", uuid::Uuid::new_v4().simple()),
        })
    }

    async fn create_attempt(&self, _request: &AttemptRequest) -> anyhow::Result<AttemptCreated> {
        let n = self.attempt_calls.fetch_add(1, Ordering::Relaxed) + 1;
        self.injected(|q| &mut q.attempt).await?;
        Ok(AttemptCreated {
            attempt_id: format!("attempt-{n}-{}", uuid::Uuid::new_v4().simple()),
        })
    }

    async fn submit_writing(
        &self,
        _attempt_id: &str,
        submission: &WritingSubmission,
    ) -> anyhow::Result<Report> {
        self.writing_calls.fetch_add(1, Ordering::Relaxed);
        *lock(&self.last_writing) = Some(submission.clone());
        self.injected(|q| &mut q.writing).await?;
        Ok(self.report.clone())
    }

    async fn submit_speaking(&self, _attempt_id: &str, capture: &Capture) -> anyhow::Result<Report> {
        self.speaking_calls.fetch_add(1, Ordering::Relaxed);
        *lock(&self.last_capture) = Some(capture.clone());
        self.injected(|q| &mut q.speaking).await?;
        Ok(self.report.clone())
    }
}

// ---------------------------------------------------------------------------
// Capture device
// ---------------------------------------------------------------------------

/// A microphone double that counts acquisitions and releases.
pub struct MockCaptureDevice {
    audio: Vec<u8>,
    mime_type: String,
    denials: AtomicU32,
    fail_finish: std::sync::atomic::AtomicBool,
    opened: Arc<AtomicU32>,
    released: Arc<AtomicU32>,
}

impl Default for MockCaptureDevice {
    fn default() -> Self {
        Self::new(vec![0x1a, 0x45, 0xdf, 0xa3], "audio/webm")
    }
}

impl MockCaptureDevice {
    pub fn new(audio: Vec<u8>, mime_type: &str) -> Self {
        Self {
            audio,
            mime_type: mime_type.to_string(),
            denials: AtomicU32::new(0),
            fail_finish: std::sync::atomic::AtomicBool::new(false),
            opened: Arc::new(AtomicU32::new(0)),
            released: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Deny access for the next `n` open requests.
    pub fn deny_next(&self, n: u32) {
        self.denials.store(n, Ordering::Relaxed);
    }

    /// Make the next recording fail to produce a blob.
    pub fn fail_finish(&self) {
        self.fail_finish.store(true, Ordering::Relaxed);
    }

    /// Successful acquisitions so far.
    pub fn opened(&self) -> u32 {
        self.opened.load(Ordering::Relaxed)
    }

    /// Releases so far, by finish or by drop.
    pub fn released(&self) -> u32 {
        self.released.load(Ordering::Relaxed)
    }

    /// Acquisitions not yet released.
    pub fn held(&self) -> u32 {
        self.opened().saturating_sub(self.released())
    }
}

#[async_trait]
impl CaptureDevice for MockCaptureDevice {
    async fn open(&self) -> anyhow::Result<Box<dyn ActiveCapture>> {
        let denied = self
            .denials
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        if denied {
            anyhow::bail!("permission denied by user");
        }
        self.opened.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MockRecording {
            capture: Capture::new(self.audio.clone(), self.mime_type.clone()),
            fail: self.fail_finish.swap(false, Ordering::Relaxed),
            released: Arc::clone(&self.released),
        }))
    }
}

struct MockRecording {
    capture: Capture,
    fail: bool,
    released: Arc<AtomicU32>,
}

impl ActiveCapture for MockRecording {
    fn finish(self: Box<Self>) -> anyhow::Result<Capture> {
        if self.fail {
            anyhow::bail!("recorder produced no data");
        }
        Ok(self.capture.clone())
    }
}

impl Drop for MockRecording {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Prompt and observer
// ---------------------------------------------------------------------------

/// A prompt that replays scripted answers, then falls back to a default.
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<bool>>,
    default: bool,
    asked: Mutex<Vec<Confirmation>>,
}

impl ScriptedPrompt {
    pub fn always(answer: bool) -> Self {
        Self::new(Vec::new(), answer)
    }

    pub fn new(answers: Vec<bool>, default: bool) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            default,
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Number of questions asked.
    pub fn asked(&self) -> usize {
        lock(&self.asked).len()
    }

    pub fn questions(&self) -> Vec<Confirmation> {
        lock(&self.asked).clone()
    }
}

impl ConfirmPrompt for ScriptedPrompt {
    fn confirm(&self, request: &Confirmation) -> bool {
        lock(&self.asked).push(request.clone());
        lock(&self.answers).pop_front().unwrap_or(self.default)
    }
}

/// Observer that records everything it is told.
#[derive(Default)]
pub struct RecordingObserver {
    transitions: Mutex<Vec<(ExamModule, String, String)>>,
    ticks: Mutex<Vec<u32>>,
    errors: Mutex<Vec<AttemptError>>,
    results: Mutex<Vec<ResultPayload>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transitions as `from->to` strings.
    pub fn transitions(&self) -> Vec<String> {
        lock(&self.transitions)
            .iter()
            .map(|(_, from, to)| format!("{from}->{to}"))
            .collect()
    }

    pub fn ticks(&self) -> Vec<u32> {
        lock(&self.ticks).clone()
    }

    pub fn errors(&self) -> Vec<AttemptError> {
        lock(&self.errors).clone()
    }

    pub fn results(&self) -> Vec<ResultPayload> {
        lock(&self.results).clone()
    }
}

impl AttemptObserver for RecordingObserver {
    fn on_transition(&self, module: ExamModule, from: &str, to: &str) {
        lock(&self.transitions).push((module, from.to_string(), to.to_string()));
    }

    fn on_tick(&self, _module: ExamModule, seconds_left: u32) {
        lock(&self.ticks).push(seconds_left);
    }

    fn on_error(&self, _module: ExamModule, error: &AttemptError) {
        lock(&self.errors).push(error.clone());
    }

    fn on_result(&self, payload: &ResultPayload) {
        lock(&self.results).push(payload.clone());
    }
}
