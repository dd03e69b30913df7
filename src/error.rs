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

//! Error taxonomy for the orchestrator, per spec section 7.

use thiserror::Error;

/// Errors the orchestrator's public lifecycle API can surface to a caller.
///
/// Per-chunk failures inside a worker are logged and recovered locally; they
/// never reach this type. Only lifecycle failures (illegal state
/// transitions, dependency validation at `start`) and the named pipeline
/// error classes propagate here.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("environment not ready: {0}")]
    EnvNotReady(String),

    #[error("whisper transcriber unavailable: {0}")]
    WhisperUnavailable(String),

    #[error("whisper HTTP transcriber error: {0}")]
    WhisperHttpError(String),

    #[error("whisper CLI transcriber error: {0}")]
    WhisperCliError(String),

    #[error("speaker diarization failed: {0}")]
    PyannoteFailed(String),

    #[error("ffmpeg failed: {0}")]
    FfmpegFailed(String),

    #[error("merge-segments failed: {0}")]
    MergeFailed(String),

    #[error("disk write failed: {0}")]
    DiskFull(String),

    #[error("illegal lifecycle transition: {0}")]
    Lifecycle(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
