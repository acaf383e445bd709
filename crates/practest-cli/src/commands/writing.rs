//! The `practest writing` command.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use practest_client::config::{create_api, load_config_from};
use practest_core::driver::{drive, WritingCommand};
use practest_core::handoff::ResultHandoff;
use practest_core::model::count_words;
use practest_core::traits::{AssumeYes, ConfirmPrompt};
use practest_core::{WritingController, WritingState};

use crate::commands::results;
use crate::console::{ConsoleObserver, TerminalPrompt};

pub struct WritingArgs {
    pub essay: Option<PathBuf>,
    pub prompt: Option<String>,
    pub duration: Option<u32>,
    pub yes: bool,
    pub wait: bool,
    pub config: Option<PathBuf>,
}

pub async fn execute(args: WritingArgs) -> Result<()> {
    let essay = match &args.essay {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read essay: {}", path.display()))?,
        None => String::new(),
    };

    let config = load_config_from(args.config.as_deref())?;
    let mut settings = config.writing_settings();
    if let Some(prompt) = args.prompt {
        settings.prompt_text = prompt;
    }
    if let Some(duration) = args.duration {
        anyhow::ensure!(duration >= 1, "duration must be at least 1 second");
        settings.duration_secs = duration;
    }

    let api = create_api(&config, config.token_store())?;
    let handoff = ResultHandoff::default();

    eprintln!(
        "practest v{}: Writing, {} words, {}s on the clock",
        env!("CARGO_PKG_VERSION"),
        count_words(&essay),
        settings.duration_secs
    );
    eprintln!("Task: {}\n", settings.prompt_text);

    let mut controller = WritingController::new(api, handoff.clone(), settings)
        .with_observer(Arc::new(ConsoleObserver));

    let (tx, rx) = mpsc::channel(8);
    tx.send(WritingCommand::Edit(essay)).await?;
    if !args.wait {
        tx.send(WritingCommand::Submit).await?;
    }
    let interrupt = tokio::spawn(forward_interrupts(tx, WritingCommand::Exit));

    let prompt: &dyn ConfirmPrompt = if args.yes { &AssumeYes } else { &TerminalPrompt };
    let end = drive(&mut controller, rx, prompt, Duration::from_secs(1)).await;
    interrupt.abort();

    match end {
        WritingState::Done if controller.report().is_some() => {
            results::show(&handoff);
            Ok(())
        }
        WritingState::Abandoned => {
            eprintln!("Attempt forfeited.");
            Ok(())
        }
        state => match controller.last_error() {
            Some(err) => Err(anyhow::anyhow!(err.clone())),
            None => anyhow::bail!("writing attempt stopped in state {state}"),
        },
    }
}

/// Turn each Ctrl-C into an exit request for the driver.
pub(crate) async fn forward_interrupts<C: Clone>(tx: mpsc::Sender<C>, exit: C) {
    while tokio::signal::ctrl_c().await.is_ok() {
        if tx.send(exit.clone()).await.is_err() {
            break;
        }
    }
}
