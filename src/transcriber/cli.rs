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

//! Local CLI transcriber: spawns the Whisper CLI binary directly.
//!
//! Grounded on the teacher's process-spawning idiom in
//! `meeting_recorder.rs::start_ffmpeg_recording` (build argv, pipe stdout,
//! `.output()`/`.wait()`), applied here to a short-lived CLI invocation
//! rather than a long-running capture process.

use std::path::Path;
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

use super::{TranscribeOptions, Transcriber, TranscriptionResult};

pub struct CliTranscriber {
    binary_path: String,
}

impl CliTranscriber {
    pub fn new(binary_path: String) -> Self {
        Self { binary_path }
    }

    /// Normalizes a model name per spec section 4.4: strip a trailing
    /// `.bin`, then add a `ggml-` prefix if it isn't already present.
    pub fn normalize_model_name(model: &str) -> String {
        let stripped = model.strip_suffix(".bin").unwrap_or(model);
        if stripped.starts_with("ggml-") {
            stripped.to_string()
        } else {
            format!("ggml-{stripped}")
        }
    }
}

#[async_trait]
impl Transcriber for CliTranscriber {
    async fn transcribe(
        &self,
        wav_path: &Path,
        options: &TranscribeOptions,
    ) -> Result<TranscriptionResult> {
        let model = Self::normalize_model_name(&options.model);

        let mut cmd = Command::new(&self.binary_path);
        cmd.arg("transcribe")
            .arg(&model)
            .arg(wav_path)
            .arg("--format")
            .arg("json");

        if !matches!(options.segments.as_str(), "" | "0" | "0s") {
            cmd.arg("--segments").arg(&options.segments);
        }
        cmd.arg("--temperature").arg(options.temperature.to_string());

        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let output = tokio::time::timeout(options.timeout, cmd.output())
            .await
            .context("whisper CLI transcriber timed out")?
            .context("failed to spawn whisper CLI transcriber")?;

        if !output.status.success() {
            bail!(
                "whisper CLI transcriber exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            );
        }

        let result: TranscriptionResult = serde_json::from_slice(&output.stdout)
            .context("failed to parse whisper CLI transcriber output")?;
        Ok(result)
    }

    async fn health_check(&self) -> Result<()> {
        let output = Command::new(&self.binary_path)
            .arg("--help")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await
            .context("whisper CLI binary not reachable")?;
        if !output.status.success() {
            bail!("whisper CLI health probe exited with {}", output.status);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "cli"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_model_names() {
        assert_eq!(CliTranscriber::normalize_model_name("base"), "ggml-base");
        assert_eq!(CliTranscriber::normalize_model_name("base.bin"), "ggml-base");
        assert_eq!(
            CliTranscriber::normalize_model_name("ggml-base.bin"),
            "ggml-base"
        );
        assert_eq!(
            CliTranscriber::normalize_model_name("ggml-base"),
            "ggml-base"
        );
    }
}
