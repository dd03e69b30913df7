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

//! ASR worker, spec section 4.7.1: consumes `AudioChunk`s, calls the
//! currently-active transcriber, writes pretty-printed segments JSON, and
//! forwards an `AsrResult` to the SD queue.

use std::sync::Arc;

use crate::degradation::DegradationController;
use crate::paths::PathManager;
use crate::queue::SafeQueue;
use crate::transcriber::TranscribeOptions;
use crate::types::{AsrResult, AudioChunk, Metrics};

pub async fn run(
    asr_queue: Arc<SafeQueue<AudioChunk>>,
    sd_queue: Arc<SafeQueue<AsrResult>>,
    degradation: Arc<DegradationController>,
    options: TranscribeOptions,
    paths: PathManager,
    metrics: Arc<Metrics>,
) {
    while let Some(chunk) = asr_queue.pop().await {
        let transcriber = degradation.get_transcriber();
        match transcriber.transcribe(&chunk.path, &options).await {
            Ok(result) => {
                let segments_json = paths.segments(chunk.id);
                match serde_json::to_string_pretty(&result) {
                    Ok(serialized) => match tokio::fs::write(&segments_json, serialized).await {
                        Ok(()) => {
                            metrics.asr_success.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                            sd_queue
                                .push(AsrResult {
                                    chunk,
                                    segments_json,
                                })
                                .await;
                        }
                        Err(err) => {
                            metrics.asr_failure.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                            tracing::error!(chunk_id = chunk.id, error = %err, "asr worker failed to write segments json");
                        }
                    },
                    Err(err) => {
                        metrics.asr_failure.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                        tracing::error!(chunk_id = chunk.id, error = %err, "asr worker failed to serialize transcription result");
                    }
                }
            }
            Err(err) => {
                metrics.asr_failure.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                tracing::error!(
                    chunk_id = chunk.id,
                    transcriber = transcriber.name(),
                    error = %err,
                    "asr worker transcription failed, dropping chunk"
                );
            }
        }
    }
    sd_queue.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;
    use crate::degradation::DegradationController;
    use crate::health::HealthChecker;
    use crate::transcriber::{build_fallback, options_from_config, Transcriber, TranscriptSegment, TranscriptionResult};
    use async_trait::async_trait;
    use std::path::Path;
    use std::time::Duration;

    struct FixedTranscriber(&'static str);

    #[async_trait]
    impl Transcriber for FixedTranscriber {
        async fn transcribe(&self, _wav_path: &Path, _options: &TranscribeOptions) -> anyhow::Result<TranscriptionResult> {
            Ok(TranscriptionResult {
                segments: vec![TranscriptSegment {
                    start: 0.0,
                    end: 1.0,
                    text: self.0.to_string(),
                    extra: Default::default(),
                }],
                language: None,
                duration: None,
            })
        }

        async fn health_check(&self) -> anyhow::Result<()> {
            Ok(())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn transcribes_and_forwards_result() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathManager::new(dir.path(), dir.path().join("shared"));
        std::fs::write(paths.wav(0), b"RIFF....WAVEfmt ").unwrap();

        let primary: Arc<dyn Transcriber> = Arc::new(FixedTranscriber("hello"));
        let fallback: Arc<dyn Transcriber> = Arc::from(build_fallback());
        let health = HealthChecker::new(primary.clone(), Duration::from_secs(3600), 3);
        let degradation = Arc::new(DegradationController::new(
            primary,
            fallback,
            health,
            true,
            Metrics::new(),
        ));

        let asr_queue = Arc::new(SafeQueue::new(4));
        let sd_queue = Arc::new(SafeQueue::new(4));
        asr_queue
            .push(AudioChunk {
                id: 0,
                path: paths.wav(0),
                start_time: chrono::Utc::now(),
                end_time: chrono::Utc::now(),
            })
            .await;
        asr_queue.close().await;

        let cfg = test_config();
        let metrics = Metrics::new();
        run(
            asr_queue,
            sd_queue.clone(),
            degradation,
            options_from_config(&cfg),
            paths.clone(),
            metrics.clone(),
        )
        .await;

        let result = sd_queue.pop().await.expect("expected one asr result");
        assert_eq!(result.chunk.id, 0);
        let written = std::fs::read_to_string(&result.segments_json).unwrap();
        assert!(written.contains("hello"));
        assert_eq!(metrics.asr_success.load(std::sync::atomic::Ordering::Relaxed), 1);
        assert!(sd_queue.pop().await.is_none());
    }
}
