//! Tick loop that runs an attempt against a real clock.
//!
//! The controllers are plain state machines; this module feeds them
//! one-second ticks and user commands on a single task, so every event is
//! handled to completion before the next one is looked at.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::error::AttemptError;
use crate::speaking::SpeakingController;
use crate::timer::PhaseToken;
use crate::traits::{ConfirmPrompt, ExitOutcome};
use crate::transitions::AttemptState;
use crate::writing::WritingController;

/// User actions during a Writing attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WritingCommand {
    Edit(String),
    Submit,
    Exit,
}

/// User actions during a Speaking attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakingCommand {
    BeginRecording,
    StopRecording,
    Exit,
}

/// What the driver needs from a controller.
#[async_trait]
pub trait TimedAttempt: Send {
    type State: AttemptState + Send;
    type Command: Send;

    fn current_state(&self) -> Self::State;
    fn phase_token(&self) -> PhaseToken;
    fn has_active_timer(&self) -> bool;

    async fn start(&mut self) -> Result<(), AttemptError>;
    async fn on_tick(&mut self, token: PhaseToken) -> Result<(), AttemptError>;

    /// Handle one command. Returns `true` when the driver should stop.
    async fn handle(&mut self, command: Self::Command, prompt: &dyn ConfirmPrompt) -> bool;

    fn teardown(&mut self);
}

/// Run an attempt until it finishes, is abandoned, or can make no progress.
///
/// A start failure returns immediately with the attempt back in its idle
/// state; the caller decides whether to try again.
///
/// Missed ticks are delivered in a burst, so time spent waiting on the
/// service still counts against the clock.
pub async fn drive<A: TimedAttempt>(
    attempt: &mut A,
    mut commands: mpsc::Receiver<A::Command>,
    prompt: &dyn ConfirmPrompt,
    tick: Duration,
) -> A::State {
    if let Err(e) = attempt.start().await {
        tracing::debug!("attempt did not start: {e}");
        attempt.teardown();
        return attempt.current_state();
    }

    let mut ticker = interval_at(Instant::now() + tick, tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
    let mut commands_open = true;

    loop {
        let state = attempt.current_state();
        if state.is_terminal() {
            break;
        }
        if !commands_open && !attempt.has_active_timer() {
            tracing::debug!(%state, "no timer and no input left, stopping");
            break;
        }

        tokio::select! {
            _ = ticker.tick() => {
                let token = attempt.phase_token();
                if let Err(e) = attempt.on_tick(token).await {
                    tracing::debug!("tick handling failed: {e}");
                }
            }
            command = commands.recv(), if commands_open => match command {
                Some(command) => {
                    if attempt.handle(command, prompt).await {
                        break;
                    }
                }
                None => commands_open = false,
            },
        }
    }

    attempt.teardown();
    attempt.current_state()
}

#[async_trait]
impl TimedAttempt for WritingController {
    type State = crate::writing::WritingState;
    type Command = WritingCommand;

    fn current_state(&self) -> Self::State {
        self.state()
    }

    fn phase_token(&self) -> PhaseToken {
        WritingController::phase_token(self)
    }

    fn has_active_timer(&self) -> bool {
        WritingController::has_active_timer(self)
    }

    async fn start(&mut self) -> Result<(), AttemptError> {
        WritingController::start(self).await
    }

    async fn on_tick(&mut self, token: PhaseToken) -> Result<(), AttemptError> {
        WritingController::on_tick(self, token).await
    }

    async fn handle(&mut self, command: WritingCommand, prompt: &dyn ConfirmPrompt) -> bool {
        match command {
            WritingCommand::Edit(text) => {
                self.edit(text);
                false
            }
            WritingCommand::Submit => {
                if let Err(e) = self.request_submit(prompt).await {
                    tracing::debug!("submit failed: {e}");
                }
                false
            }
            WritingCommand::Exit => self.exit(prompt) == ExitOutcome::Exited,
        }
    }

    fn teardown(&mut self) {
        WritingController::teardown(self);
    }
}

#[async_trait]
impl TimedAttempt for SpeakingController {
    type State = crate::speaking::SpeakingState;
    type Command = SpeakingCommand;

    fn current_state(&self) -> Self::State {
        self.state()
    }

    fn phase_token(&self) -> PhaseToken {
        SpeakingController::phase_token(self)
    }

    fn has_active_timer(&self) -> bool {
        SpeakingController::has_active_timer(self)
    }

    async fn start(&mut self) -> Result<(), AttemptError> {
        SpeakingController::start(self).await
    }

    async fn on_tick(&mut self, token: PhaseToken) -> Result<(), AttemptError> {
        SpeakingController::on_tick(self, token).await
    }

    async fn handle(&mut self, command: SpeakingCommand, prompt: &dyn ConfirmPrompt) -> bool {
        let outcome = match command {
            SpeakingCommand::BeginRecording => self.begin_recording().await,
            SpeakingCommand::StopRecording => self.stop_recording().await,
            SpeakingCommand::Exit => return self.exit(prompt) == ExitOutcome::Exited,
        };
        if let Err(e) = outcome {
            tracing::debug!("{command:?} failed: {e}");
        }
        false
    }

    fn teardown(&mut self) {
        SpeakingController::teardown(self);
    }
}
