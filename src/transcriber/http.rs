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

//! HTTP transcriber: multipart upload to `{whisper_api_url}/transcribe`
//! (spec sections 4.4 and 6).
//!
//! Grounded on the teacher's `ai.rs::OpenAIClient::transcribe_audio`
//! multipart upload shape, generalized from OpenAI's fixed endpoint to a
//! configurable `whisper_api_url` and the richer `TranscriptionResult` body
//! spec section 6 requires.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;

use super::{TranscribeOptions, Transcriber, TranscriptionResult};

pub struct HttpTranscriber {
    client: Client,
    base_url: String,
}

impl HttpTranscriber {
    pub fn new(base_url: String) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("failed to build HTTP client for whisper transcriber")?;
        Ok(Self { client, base_url })
    }

    /// Disables segmentation when the configured hint is empty, "0" or
    /// "0s" (spec section 3).
    fn segments_disabled(segments: &str) -> bool {
        matches!(segments, "" | "0" | "0s")
    }
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(
        &self,
        wav_path: &Path,
        options: &TranscribeOptions,
    ) -> Result<TranscriptionResult> {
        let file_data = tokio::fs::read(wav_path)
            .await
            .context("failed to read wav file for transcription")?;
        let file_name = wav_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("chunk.wav")
            .to_string();

        let mut form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(file_data)
                    .file_name(file_name)
                    .mime_str("audio/wav")?,
            )
            .text("model", options.model.clone())
            .text("response_format", "json");

        if !Self::segments_disabled(&options.segments) {
            form = form.text("segments", options.segments.clone());
        }

        let response = self
            .client
            .post(format!("{}/transcribe", self.base_url.trim_end_matches('/')))
            .timeout(options.timeout)
            .multipart(form)
            .send()
            .await
            .context("whisper HTTP request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("whisper HTTP transcriber returned {status}: {body}");
        }

        let result: TranscriptionResult = response
            .json()
            .await
            .context("failed to parse whisper HTTP transcriber response")?;
        Ok(result)
    }

    async fn health_check(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url.trim_end_matches('/')))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .context("whisper HTTP health probe failed to connect")?;

        if response.status().is_server_error() {
            bail!("whisper HTTP health probe returned {}", response.status());
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcriber::options_from_config;
    use mockito::Server;

    #[tokio::test]
    async fn transcribe_posts_multipart_and_parses_response() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/transcribe")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"segments":[{"start":0.0,"end":1.0,"text":"hello"}],"language":"en"}"#)
            .create_async()
            .await;

        let transcriber = HttpTranscriber::new(server.url()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let wav_path = dir.path().join("chunk_0000.wav");
        std::fs::write(&wav_path, b"RIFF....WAVEfmt ").unwrap();

        let mut cfg = crate::config::tests::test_config();
        cfg.whisper_segments = "".to_string();
        let options = options_from_config(&cfg);

        let result = transcriber.transcribe(&wav_path, &options).await.unwrap();
        assert_eq!(result.segments.len(), 1);
        assert_eq!(result.segments[0].text, "hello");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn transcribe_errors_on_non_success_status() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/transcribe")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let transcriber = HttpTranscriber::new(server.url()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let wav_path = dir.path().join("chunk_0000.wav");
        std::fs::write(&wav_path, b"RIFF....WAVEfmt ").unwrap();

        let cfg = crate::config::tests::test_config();
        let options = options_from_config(&cfg);
        assert!(transcriber.transcribe(&wav_path, &options).await.is_err());
    }
}
