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

//! The ASR transcriber abstraction, spec section 4.4.

mod cli;
mod http;
mod mock;

pub use cli::CliTranscriber;
pub use http::HttpTranscriber;
pub use mock::MockTranscriber;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{Config, TranscriberKind};

#[derive(Debug, Clone)]
pub struct TranscribeOptions {
    pub model: String,
    pub language: Option<String>,
    pub temperature: f32,
    pub prompt: Option<String>,
    pub timeout: Duration,
    /// Segment length hint (e.g. "20s"); empty/"0"/"0s" disables
    /// segmentation, per spec section 3.
    pub segments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub segments: Vec<TranscriptSegment>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
}

/// Contract every transcriber implementation satisfies. Spec section 4.4.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        wav_path: &Path,
        options: &TranscribeOptions,
    ) -> anyhow::Result<TranscriptionResult>;

    /// Lightweight probe the health checker polls periodically. Must not
    /// itself run a full transcription.
    async fn health_check(&self) -> anyhow::Result<()>;

    fn name(&self) -> &str;
}

/// Builds the options a worker passes for every chunk: model/temperature
/// from config, a 10-minute deadline (spec section 4.7.1).
pub fn options_from_config(config: &Config) -> TranscribeOptions {
    TranscribeOptions {
        model: config.whisper_model.clone(),
        language: None,
        temperature: config.whisper_temperature,
        prompt: None,
        timeout: Duration::from_secs(10 * 60),
        segments: config.whisper_segments.clone(),
    }
}

/// Constructs the primary transcriber selected by `config.whisper_mode`
/// (spec section 4.4's mode-selection rule, implemented in
/// `Config::transcriber_kind`).
pub fn build_primary(config: &Config) -> anyhow::Result<Box<dyn Transcriber>> {
    Ok(match config.transcriber_kind() {
        TranscriberKind::Http => Box::new(HttpTranscriber::new(config.whisper_api_url.clone())?),
        TranscriberKind::Cli => Box::new(CliTranscriber::new("whisper".to_string())),
    })
}

/// The fallback transcriber is always the mock, per spec section 4.4: it
/// exists purely so the pipeline keeps producing well-formed artifacts when
/// the real ASR is unreachable.
pub fn build_fallback() -> Box<dyn Transcriber> {
    Box::new(MockTranscriber::default())
}
