//! practest CLI: timed Writing and Speaking practice attempts from the terminal.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod capture;
mod commands;
mod console;

#[derive(Parser)]
#[command(name = "practest", version, about = "Timed IELTS-style practice exam client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a timed Writing attempt
    Writing {
        /// File holding the essay to submit
        #[arg(long)]
        essay: Option<PathBuf>,

        /// Override the task prompt
        #[arg(long)]
        prompt: Option<String>,

        /// Override the time limit, in seconds
        #[arg(long)]
        duration: Option<u32>,

        /// Answer yes to every confirmation
        #[arg(long, short)]
        yes: bool,

        /// Do not submit early; let the countdown run out
        #[arg(long)]
        wait: bool,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Run a timed Speaking attempt from a recorded audio file
    Speaking {
        /// Audio file that stands in for the microphone
        #[arg(long)]
        audio: PathBuf,

        /// Audio mime type (guessed from the extension if omitted)
        #[arg(long)]
        mime: Option<String>,

        /// Start recording without waiting for preparation to end
        #[arg(long)]
        skip_prep: bool,

        /// Stop recording after this many seconds
        #[arg(long)]
        stop_after: Option<u64>,

        /// Answer yes to every confirmation
        #[arg(long, short)]
        yes: bool,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the resolved configuration
    Config {
        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create a starter config
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("practest=info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Writing {
            essay,
            prompt,
            duration,
            yes,
            wait,
            config,
        } => {
            commands::writing::execute(commands::writing::WritingArgs {
                essay,
                prompt,
                duration,
                yes,
                wait,
                config,
            })
            .await
        }
        Commands::Speaking {
            audio,
            mime,
            skip_prep,
            stop_after,
            yes,
            config,
        } => {
            commands::speaking::execute(commands::speaking::SpeakingArgs {
                audio,
                mime,
                skip_prep,
                stop_after,
                yes,
                config,
            })
            .await
        }
        Commands::Config { config } => commands::config::execute(config),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
