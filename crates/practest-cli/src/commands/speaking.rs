//! The `practest speaking` command.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use practest_client::config::{create_api, load_config_from};
use practest_core::driver::{drive, SpeakingCommand};
use practest_core::handoff::ResultHandoff;
use practest_core::traits::{AssumeYes, ConfirmPrompt};
use practest_core::{SpeakingController, SpeakingState};

use crate::capture::FileCaptureDevice;
use crate::commands::results;
use crate::commands::writing::forward_interrupts;
use crate::console::{ConsoleObserver, TerminalPrompt};

pub struct SpeakingArgs {
    pub audio: PathBuf,
    pub mime: Option<String>,
    pub skip_prep: bool,
    pub stop_after: Option<u64>,
    pub yes: bool,
    pub config: Option<PathBuf>,
}

pub async fn execute(args: SpeakingArgs) -> Result<()> {
    anyhow::ensure!(
        args.audio.is_file(),
        "audio file not found: {}",
        args.audio.display()
    );
    // Opening an empty source always fails.
    let audio_len = std::fs::metadata(&args.audio)
        .with_context(|| format!("failed to inspect {}", args.audio.display()))?
        .len();
    anyhow::ensure!(audio_len > 0, "audio file is empty: {}", args.audio.display());

    let config = load_config_from(args.config.as_deref())?;
    let settings = config.speaking_settings();
    let api = create_api(&config, config.token_store())?;
    let device = Arc::new(FileCaptureDevice::new(args.audio.clone(), args.mime));
    let handoff = ResultHandoff::default();

    eprintln!(
        "practest v{}: Speaking, {}s preparation then {}s to answer ({})",
        env!("CARGO_PKG_VERSION"),
        settings.prep_secs,
        settings.speak_secs,
        device.mime_type()
    );
    eprintln!("Cue card: {}\n", settings.prompt_text);

    // --stop-after counts from the start of recording.
    let recording_starts = if args.skip_prep { 0 } else { u64::from(settings.prep_secs) };

    let mut controller = SpeakingController::new(api, device, handoff.clone(), settings)
        .with_observer(Arc::new(ConsoleObserver));

    let (tx, rx) = mpsc::channel(8);
    if args.skip_prep {
        tx.send(SpeakingCommand::BeginRecording).await?;
    }
    let stopper = args.stop_after.map(|secs| {
        let tx = tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(recording_starts + secs)).await;
            let _ = tx.send(SpeakingCommand::StopRecording).await;
        })
    });
    let interrupt = tokio::spawn(forward_interrupts(tx, SpeakingCommand::Exit));

    let prompt: &dyn ConfirmPrompt = if args.yes { &AssumeYes } else { &TerminalPrompt };
    let end = drive(&mut controller, rx, prompt, Duration::from_secs(1)).await;
    interrupt.abort();
    if let Some(stopper) = stopper {
        stopper.abort();
    }

    match end {
        SpeakingState::Done if controller.report().is_some() => {
            results::show(&handoff);
            Ok(())
        }
        SpeakingState::Abandoned => {
            eprintln!("Attempt forfeited.");
            Ok(())
        }
        state => match controller.last_error() {
            Some(err) => Err(anyhow::anyhow!(err.clone())),
            None => anyhow::bail!("speaking attempt stopped in state {state}"),
        },
    }
}
