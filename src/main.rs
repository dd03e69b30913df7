/*
 * Meeting Assistant CLI - Rust Edition
 * Copyright (c) 2024 Meeting Assistant Contributors
 *
 * This work is licensed under the Creative Commons Attribution-NonCommercial 4.0 International License.
 * To view a copy of this license, visit http://creativecommons.org/licenses/by-nc/4.0/
 *
 * You are free to share and adapt this work for non-commercial purposes with attribution.
 * Commercial use is prohibited without explicit written permission.
 *
 * For commercial licensing inquiries, please contact the project maintainers.
 */

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use transcript_orchestrator::config::Config;
use transcript_orchestrator::logging::init_logging;
use transcript_orchestrator::orchestrator::Orchestrator;

#[derive(Parser)]
#[command(name = "transcript-orchestrator")]
#[command(version)]
#[command(about = "Streaming audio-to-transcript orchestrator: ASR, diarization, embedding and speaker-label merge")]
struct Cli {
    /// Overrides OUTPUT_DIR for this invocation.
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a fresh session and record/transcribe until Ctrl-C.
    Run,
    /// Resume an existing session's output directory from where it left off.
    Resume,
    /// Reprocess already-recorded chunks from their segments files, skipping ASR.
    Reprocess,
    /// Print the current progress snapshot as JSON and exit.
    Progress,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging().context("failed to initialize logging")?;

    let cli = Cli::parse();
    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(output_dir) = cli.output_dir {
        std::fs::create_dir_all(&output_dir).context("failed to create --output-dir")?;
        config.output_dir = output_dir;
    }

    match cli.command {
        Command::Run => {
            let orchestrator = Orchestrator::new(config)?;
            orchestrator.start().await?;
            tracing::info!("session running, press Ctrl-C to stop");
            tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
            tracing::info!("ctrl-c received, stopping");
            orchestrator.stop().await?;
        }
        Command::Resume => {
            let orchestrator = Orchestrator::new(config)?;
            orchestrator.prepare_resume()?;
            orchestrator.start().await?;
            tracing::info!("session resumed, press Ctrl-C to stop");
            tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
            tracing::info!("ctrl-c received, stopping");
            orchestrator.stop().await?;
        }
        Command::Reprocess => {
            let orchestrator = Orchestrator::new(config)?;
            orchestrator.reprocess_from_segments().await?;
            tracing::info!("reprocessing queued, press Ctrl-C to stop once drained");
            tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
            orchestrator.stop().await?;
        }
        Command::Progress => {
            let orchestrator = Orchestrator::new(config)?;
            let progress = orchestrator.progress();
            println!("{}", serde_json::to_string_pretty(&progress)?);
        }
    }

    Ok(())
}
