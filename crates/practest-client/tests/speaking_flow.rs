//! Speaking attempt flows with a counted capture device.

use std::sync::Arc;
use std::time::Duration;

use practest_client::mock::{
    MockCaptureDevice, MockExamApi, MockFailure, RecordingObserver, ScriptedPrompt,
};
use practest_core::error::AttemptError;
use practest_core::handoff::{ResultHandoff, TabStorage};
use practest_core::model::{ExamModule, SpeakingSettings, SubmitReason};
use practest_core::traits::ExitOutcome;
use practest_core::{SpeakingController, SpeakingState};

struct Harness {
    api: Arc<MockExamApi>,
    device: Arc<MockCaptureDevice>,
    handoff: ResultHandoff,
    observer: Arc<RecordingObserver>,
    speaking: SpeakingController,
}

fn harness(prep_secs: u32, speak_secs: u32) -> Harness {
    let api = Arc::new(MockExamApi::new());
    let device = Arc::new(MockCaptureDevice::new(vec![7u8; 2048], "audio/ogg"));
    let handoff = ResultHandoff::new(TabStorage::new());
    let observer = Arc::new(RecordingObserver::new());
    let settings = SpeakingSettings {
        prompt_text: "Describe a journey.".into(),
        prep_secs,
        speak_secs,
        submit_timeout: Duration::from_secs(5),
    };
    let speaking = SpeakingController::new(api.clone(), device.clone(), handoff.clone(), settings)
        .with_observer(observer.clone());
    Harness {
        api,
        device,
        handoff,
        observer,
        speaking,
    }
}

async fn tick_n(speaking: &mut SpeakingController, n: u32) {
    for _ in 0..n {
        let token = speaking.phase_token();
        let _ = speaking.on_tick(token).await;
    }
}

#[tokio::test]
async fn start_enters_prep_with_prep_clock() {
    let mut h = harness(60, 120);
    h.speaking.start().await.unwrap();

    assert_eq!(h.speaking.state(), SpeakingState::Prep);
    assert_eq!(h.speaking.seconds_left(), 60);
    assert_eq!(h.speaking.prompt_text(), "Describe a journey.");
    let request = h.api.last_session().unwrap();
    assert_eq!(request.module, ExamModule::Speaking);
    assert_eq!(request.time_limit_seconds, 180);
    assert_eq!(h.device.opened(), 0);
}

#[tokio::test]
async fn full_timed_flow_records_and_uploads() {
    let mut h = harness(2, 3);
    h.speaking.start().await.unwrap();

    tick_n(&mut h.speaking, 2).await;
    assert_eq!(h.speaking.state(), SpeakingState::Recording);
    assert_eq!(h.speaking.seconds_left(), 3);
    assert!(h.speaking.is_recording());
    assert!(!h.speaking.can_capture());

    tick_n(&mut h.speaking, 3).await;
    assert_eq!(h.speaking.state(), SpeakingState::Done);
    assert_eq!(h.api.speaking_calls(), 1);
    assert_eq!(h.device.held(), 0);

    let sent = h.api.last_capture().unwrap();
    assert_eq!(sent.data.len(), 2048);
    assert_eq!(sent.mime_type, "audio/ogg");

    let payload = h.handoff.consume().unwrap();
    assert_eq!(payload.meta.reason, SubmitReason::Timeout);
    assert_eq!(payload.meta.audio_mime.as_deref(), Some("audio/ogg"));
    assert_eq!(payload.meta.word_count, None);
    assert_eq!(
        h.observer.transitions(),
        vec![
            "idle->starting",
            "starting->prep",
            "prep->recording",
            "recording->processing",
            "processing->done",
        ]
    );
}

#[tokio::test]
async fn early_begin_skips_rest_of_prep() {
    let mut h = harness(60, 120);
    h.speaking.start().await.unwrap();
    tick_n(&mut h.speaking, 5).await;
    let prep_token = h.speaking.phase_token();

    assert!(h.speaking.begin_recording().await.unwrap());
    assert_eq!(h.speaking.seconds_left(), 120);

    h.speaking.on_tick(prep_token).await.unwrap();
    assert_eq!(h.speaking.seconds_left(), 120);
}

#[tokio::test]
async fn second_begin_is_a_no_op() {
    let mut h = harness(60, 120);
    h.speaking.start().await.unwrap();

    assert!(h.speaking.begin_recording().await.unwrap());
    assert!(!h.speaking.begin_recording().await.unwrap());
    assert_eq!(h.device.opened(), 1);
    assert_eq!(h.speaking.entries_into(SpeakingState::Recording), 1);
}

#[tokio::test]
async fn denied_microphone_stays_in_prep_and_allows_retry() {
    let mut h = harness(1, 10);
    h.device.deny_next(1);
    h.speaking.start().await.unwrap();

    let err = h.speaking.on_tick(h.speaking.phase_token()).await.unwrap_err();
    assert!(matches!(err, AttemptError::CaptureAcquisition(ref msg) if msg.contains("permission denied")));
    assert_eq!(h.speaking.state(), SpeakingState::Prep);
    assert!(h.speaking.can_capture());
    assert!(!h.speaking.is_recording());

    assert!(h.speaking.begin_recording().await.unwrap());
    assert_eq!(h.speaking.state(), SpeakingState::Recording);
    assert!(h.speaking.last_error().is_none());
}

#[tokio::test]
async fn manual_stop_and_expiry_in_same_tick_upload_once() {
    let mut h = harness(1, 2);
    h.speaking.start().await.unwrap();
    h.speaking.begin_recording().await.unwrap();
    tick_n(&mut h.speaking, 1).await;

    let recording_token = h.speaking.phase_token();
    assert!(h.speaking.stop_recording().await.unwrap());
    h.speaking.on_tick(recording_token).await.unwrap();
    assert!(!h.speaking.stop_recording().await.unwrap());

    assert_eq!(h.speaking.entries_into(SpeakingState::Processing), 1);
    assert_eq!(h.api.speaking_calls(), 1);
    assert_eq!(h.handoff.consume().unwrap().meta.reason, SubmitReason::Manual);
}

#[tokio::test]
async fn upload_failure_ends_attempt() {
    let mut h = harness(1, 5);
    h.api.fail_speaking(MockFailure::Status(413, "audio too large".into()));
    h.speaking.start().await.unwrap();
    h.speaking.begin_recording().await.unwrap();

    let err = h.speaking.stop_recording().await.unwrap_err();
    assert!(err.is_terminal());
    assert!(err.to_string().contains("audio too large"));
    assert_eq!(h.speaking.state(), SpeakingState::Done);
    assert!(h.speaking.report().is_none());
    assert!(!h.handoff.is_pending());
    assert!(!h.speaking.can_capture());
    assert!(!h.speaking.begin_recording().await.unwrap());
    assert_eq!(h.device.held(), 0);
}

#[tokio::test]
async fn empty_recording_ends_attempt() {
    let mut h = harness(1, 5);
    h.device.fail_finish();
    h.speaking.start().await.unwrap();
    h.speaking.begin_recording().await.unwrap();

    let err = h.speaking.stop_recording().await.unwrap_err();
    assert!(err.is_terminal());
    assert_eq!(h.speaking.state(), SpeakingState::Done);
    assert_eq!(h.api.speaking_calls(), 0);
    assert_eq!(h.device.held(), 0);
}

#[tokio::test(start_paused = true)]
async fn hung_upload_times_out_and_ends_attempt() {
    let mut h = harness(1, 5);
    h.api.fail_speaking(MockFailure::Hang);
    h.speaking.start().await.unwrap();
    h.speaking.begin_recording().await.unwrap();

    let err = h.speaking.stop_recording().await.unwrap_err();
    assert!(matches!(err, AttemptError::Submission { terminal: true, .. }));
    assert_eq!(h.speaking.state(), SpeakingState::Done);
}

#[tokio::test]
async fn exit_while_recording_releases_device_once() {
    let mut h = harness(60, 120);
    let prompt = ScriptedPrompt::always(true);
    h.speaking.start().await.unwrap();
    h.speaking.begin_recording().await.unwrap();
    assert_eq!(h.device.held(), 1);

    assert_eq!(h.speaking.exit(&prompt), ExitOutcome::Exited);
    assert_eq!(h.speaking.exit(&prompt), ExitOutcome::Exited);

    assert_eq!(prompt.asked(), 1);
    assert_eq!(h.device.released(), 1);
    assert_eq!(h.speaking.state(), SpeakingState::Abandoned);
    assert!(!h.speaking.has_active_timer());
    assert!(h.speaking.attempt().is_none());
    assert_eq!(h.api.speaking_calls(), 0);
}

#[tokio::test]
async fn declined_exit_keeps_recording() {
    let mut h = harness(60, 120);
    let prompt = ScriptedPrompt::always(false);
    h.speaking.start().await.unwrap();
    h.speaking.begin_recording().await.unwrap();

    assert_eq!(h.speaking.exit(&prompt), ExitOutcome::Stayed);
    assert!(h.speaking.is_recording());
    assert_eq!(h.device.held(), 1);
}

#[tokio::test]
async fn dropping_controller_releases_device() {
    let h = harness(60, 120);
    let device = h.device.clone();
    let mut speaking = h.speaking;
    speaking.start().await.unwrap();
    speaking.begin_recording().await.unwrap();
    assert_eq!(device.held(), 1);

    drop(speaking);
    assert_eq!(device.held(), 0);
}
