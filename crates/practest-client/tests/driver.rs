//! Tick loop tests on a paused clock.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use practest_client::mock::{MockCaptureDevice, MockExamApi, MockFailure, ScriptedPrompt};
use practest_core::driver::{drive, SpeakingCommand, WritingCommand};
use practest_core::handoff::{ResultHandoff, TabStorage};
use practest_core::model::{SpeakingSettings, SubmitReason, WritingSettings};
use practest_core::traits::AssumeYes;
use practest_core::writing::TIME_UP_SUBMIT_ATTEMPTS;
use practest_core::{SpeakingController, SpeakingState, WritingController, WritingState};

const TICK: Duration = Duration::from_secs(1);

fn writing(api: &Arc<MockExamApi>, handoff: &ResultHandoff, duration_secs: u32) -> WritingController {
    WritingController::new(
        api.clone(),
        handoff.clone(),
        WritingSettings {
            prompt_text: "Discuss.".into(),
            duration_secs,
            ..WritingSettings::default()
        },
    )
}

fn speaking(
    api: &Arc<MockExamApi>,
    device: &Arc<MockCaptureDevice>,
    handoff: &ResultHandoff,
) -> SpeakingController {
    SpeakingController::new(
        api.clone(),
        device.clone(),
        handoff.clone(),
        SpeakingSettings {
            prompt_text: "Describe.".into(),
            prep_secs: 3,
            speak_secs: 5,
            submit_timeout: Duration::from_secs(10),
        },
    )
}

#[tokio::test(start_paused = true)]
async fn writing_runs_to_timeout_submission() {
    let api = Arc::new(MockExamApi::new());
    let handoff = ResultHandoff::new(TabStorage::new());
    let mut attempt = writing(&api, &handoff, 4);

    let (tx, rx) = mpsc::channel(8);
    tx.send(WritingCommand::Edit("Cities need trains.".into()))
        .await
        .unwrap();
    drop(tx);

    let started = tokio::time::Instant::now();
    let end = drive(&mut attempt, rx, &AssumeYes, TICK).await;

    assert_eq!(end, WritingState::Done);
    assert_eq!(started.elapsed(), Duration::from_secs(4));
    assert_eq!(api.writing_calls(), 1);
    assert_eq!(api.last_writing().unwrap().essay_text, "Cities need trains.");
    assert_eq!(handoff.consume().unwrap().meta.reason, SubmitReason::Timeout);
}

#[tokio::test(start_paused = true)]
async fn writing_manual_submit_stops_early() {
    let api = Arc::new(MockExamApi::new());
    let handoff = ResultHandoff::new(TabStorage::new());
    let mut attempt = writing(&api, &handoff, 3600);

    let (tx, rx) = mpsc::channel(8);
    tx.send(WritingCommand::Edit("short answer".into()))
        .await
        .unwrap();
    tx.send(WritingCommand::Submit).await.unwrap();

    let end = drive(&mut attempt, rx, &AssumeYes, TICK).await;
    drop(tx);

    assert_eq!(end, WritingState::Done);
    assert_eq!(handoff.consume().unwrap().meta.reason, SubmitReason::Manual);
    assert!(!attempt.has_active_timer());
}

#[tokio::test(start_paused = true)]
async fn writing_exit_command_abandons() {
    let api = Arc::new(MockExamApi::new());
    let handoff = ResultHandoff::new(TabStorage::new());
    let mut attempt = writing(&api, &handoff, 3600);
    let prompt = ScriptedPrompt::new(vec![false], true);

    let (tx, rx) = mpsc::channel(8);
    tx.send(WritingCommand::Exit).await.unwrap();
    tx.send(WritingCommand::Exit).await.unwrap();

    let end = drive(&mut attempt, rx, &prompt, TICK).await;
    drop(tx);

    assert_eq!(end, WritingState::Abandoned);
    assert_eq!(prompt.asked(), 2);
    assert_eq!(api.writing_calls(), 0);
    assert!(!handoff.is_pending());
}

#[tokio::test(start_paused = true)]
async fn writing_start_failure_returns_idle() {
    let api = Arc::new(MockExamApi::new());
    api.fail_session(MockFailure::Status(503, "maintenance".into()));
    let handoff = ResultHandoff::new(TabStorage::new());
    let mut attempt = writing(&api, &handoff, 60);

    let (_tx, rx) = mpsc::channel(1);
    let end = drive(&mut attempt, rx, &AssumeYes, TICK).await;

    assert_eq!(end, WritingState::Idle);
    assert!(attempt.last_error().is_some());
}

#[tokio::test(start_paused = true)]
async fn writing_submit_failure_keeps_clock_running() {
    let api = Arc::new(MockExamApi::new());
    api.fail_writing(MockFailure::Status(500, "grader down".into()));
    let handoff = ResultHandoff::new(TabStorage::new());
    let mut attempt = writing(&api, &handoff, 5);

    let (tx, rx) = mpsc::channel(8);
    tx.send(WritingCommand::Submit).await.unwrap();
    drop(tx);

    let end = drive(&mut attempt, rx, &AssumeYes, TICK).await;

    assert_eq!(end, WritingState::Done);
    assert_eq!(api.writing_calls(), 2);
    assert_eq!(handoff.consume().unwrap().meta.reason, SubmitReason::Timeout);
}

#[tokio::test(start_paused = true)]
async fn writing_time_up_failures_end_with_input_still_open() {
    let api = Arc::new(MockExamApi::new());
    for _ in 0..TIME_UP_SUBMIT_ATTEMPTS {
        api.fail_writing(MockFailure::Status(500, "grader down".into()));
    }
    let handoff = ResultHandoff::new(TabStorage::new());
    let mut attempt = writing(&api, &handoff, 2);

    let (tx, rx) = mpsc::channel::<WritingCommand>(8);
    let end = tokio::time::timeout(
        Duration::from_secs(60),
        drive(&mut attempt, rx, &AssumeYes, TICK),
    )
    .await
    .unwrap();
    drop(tx);

    assert_eq!(end, WritingState::Done);
    assert_eq!(api.writing_calls(), TIME_UP_SUBMIT_ATTEMPTS);
    assert!(attempt.report().is_none());
    assert!(attempt.last_error().unwrap().is_terminal());
    assert!(!handoff.is_pending());
}

#[tokio::test(start_paused = true)]
async fn writing_time_up_retry_recovers_with_input_open() {
    let api = Arc::new(MockExamApi::new());
    api.fail_writing(MockFailure::Status(500, "grader down".into()));
    let handoff = ResultHandoff::new(TabStorage::new());
    let mut attempt = writing(&api, &handoff, 2);

    let (tx, rx) = mpsc::channel::<WritingCommand>(8);
    let end = tokio::time::timeout(
        Duration::from_secs(60),
        drive(&mut attempt, rx, &AssumeYes, TICK),
    )
    .await
    .unwrap();
    drop(tx);

    assert_eq!(end, WritingState::Done);
    assert_eq!(api.writing_calls(), 2);
    assert_eq!(handoff.consume().unwrap().meta.reason, SubmitReason::Timeout);
}

#[tokio::test(start_paused = true)]
async fn speaking_runs_unattended() {
    let api = Arc::new(MockExamApi::new());
    let device = Arc::new(MockCaptureDevice::default());
    let handoff = ResultHandoff::new(TabStorage::new());
    let mut attempt = speaking(&api, &device, &handoff);

    let (tx, rx) = mpsc::channel::<SpeakingCommand>(1);
    drop(tx);

    let started = tokio::time::Instant::now();
    let end = drive(&mut attempt, rx, &AssumeYes, TICK).await;

    assert_eq!(end, SpeakingState::Done);
    assert_eq!(started.elapsed(), Duration::from_secs(8));
    assert_eq!(device.opened(), 1);
    assert_eq!(device.held(), 0);
    assert_eq!(api.speaking_calls(), 1);
    assert!(handoff.is_pending());
}

#[tokio::test(start_paused = true)]
async fn speaking_commands_skip_ahead() {
    let api = Arc::new(MockExamApi::new());
    let device = Arc::new(MockCaptureDevice::default());
    let handoff = ResultHandoff::new(TabStorage::new());
    let mut attempt = speaking(&api, &device, &handoff);

    let (tx, rx) = mpsc::channel(8);
    tx.send(SpeakingCommand::BeginRecording).await.unwrap();
    tx.send(SpeakingCommand::BeginRecording).await.unwrap();
    tx.send(SpeakingCommand::StopRecording).await.unwrap();
    drop(tx);

    let started = tokio::time::Instant::now();
    let end = drive(&mut attempt, rx, &AssumeYes, TICK).await;

    assert_eq!(end, SpeakingState::Done);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(device.opened(), 1);
    assert_eq!(attempt.entries_into(SpeakingState::Processing), 1);
    assert_eq!(handoff.consume().unwrap().meta.reason, SubmitReason::Manual);
}

#[tokio::test(start_paused = true)]
async fn speaking_denied_microphone_waits_for_retry() {
    let api = Arc::new(MockExamApi::new());
    let device = Arc::new(MockCaptureDevice::default());
    device.deny_next(1);
    let handoff = ResultHandoff::new(TabStorage::new());
    let mut attempt = speaking(&api, &device, &handoff);

    let (tx, rx) = mpsc::channel(8);
    let retry = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(10)).await;
        tx.send(SpeakingCommand::BeginRecording).await.unwrap();
    });

    let end = drive(&mut attempt, rx, &AssumeYes, TICK).await;
    retry.await.unwrap();

    assert_eq!(end, SpeakingState::Done);
    assert_eq!(device.opened(), 1);
    assert_eq!(api.speaking_calls(), 1);
}
