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

//! Structured logging setup, mirroring the teacher's `setup_logging()`.

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initializes a two-layer `tracing` subscriber: a daily-rotating file layer
/// at debug and below, and a compact stderr layer at error and above.
pub fn init_logging() -> Result<()> {
    let log_dir = dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".transcript-orchestrator")
        .join("logs");

    std::fs::create_dir_all(&log_dir).context("failed to create log directory")?;

    let file_appender =
        tracing_appender::rolling::daily(&log_dir, "orchestrator.log");

    let subscriber = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_filter(
                    EnvFilter::from_default_env()
                        .add_directive("transcript_orchestrator=debug".parse()?)
                        .add_directive("debug".parse()?),
                ),
        )
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true)
                .with_target(false)
                .with_thread_ids(false)
                .compact()
                .with_filter(
                    EnvFilter::from_default_env()
                        .add_directive("transcript_orchestrator=error".parse()?)
                        .add_directive("error".parse()?),
                ),
        );

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    tracing::info!(path = %log_dir.display(), "logging initialized");
    Ok(())
}
