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

//! EMB (embedding) worker, spec section 4.7.3: extracts speaker embeddings
//! for a chunk, comparing against the running session's prior embeddings
//! via `VoicePrintState`, then advances that shared state so the next
//! chunk's comparison sees this chunk's output. Runs with concurrency 1 —
//! spec section 9 requires the speaker-continuity invariant be enforced by
//! single-threaded ordering, not locks, so the orchestrator must only ever
//! spawn one instance of this worker.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::dependency::{DependencyExecutor, EmbeddingOpts};
use crate::paths::PathManager;
use crate::queue::SafeQueue;
use crate::types::{EmbeddingResult, Metrics, SdResult, VoicePrintState};

#[derive(Clone)]
pub struct EmbeddingConfig {
    pub device: String,
    pub threshold: f32,
    pub auto_lower_min: f32,
    pub auto_lower_step: f32,
    pub hf_token: String,
    pub enable_offline: bool,
    pub timeout: Duration,
}

pub async fn run(
    emb_queue: Arc<SafeQueue<SdResult>>,
    merge_queue: Arc<SafeQueue<EmbeddingResult>>,
    dependency: Arc<dyn DependencyExecutor>,
    paths: PathManager,
    voiceprint: Arc<VoicePrintState>,
    config: EmbeddingConfig,
    metrics: Arc<Metrics>,
) {
    while let Some(item) = emb_queue.pop().await {
        let chunk_id = item.chunk.id;
        match process_one(&item, &*dependency, &paths, &voiceprint, &config).await {
            Ok(embeddings_json) => {
                voiceprint.set(embeddings_json.clone());
                metrics.emb_success.fetch_add(1, Ordering::Relaxed);
                merge_queue
                    .push(EmbeddingResult {
                        chunk: item.chunk,
                        segments_json: item.segments_json,
                        speakers_json: item.speakers_json,
                        embeddings_json,
                    })
                    .await;
            }
            Err(err) => {
                metrics.emb_failure.fetch_add(1, Ordering::Relaxed);
                tracing::error!(chunk_id, error = %err, "emb worker extraction failed, dropping chunk");
            }
        }
    }
    merge_queue.close().await;
}

async fn process_one(
    item: &SdResult,
    dependency: &dyn DependencyExecutor,
    paths: &PathManager,
    voiceprint: &VoicePrintState,
    config: &EmbeddingConfig,
) -> anyhow::Result<PathBuf> {
    let current_embeddings = voiceprint.current();
    let embeddings_out = paths.embeddings(item.chunk.id);

    let (audio_in, speakers_in, embeddings_target, existing_embeddings) = if dependency.requires_shared_volume() {
        paths.ensure_shared_meeting_dir()?;
        let audio_in = copy_into_shared_if_needed(paths, &item.chunk.path, paths.shared_audio_path(item.chunk.id)).await?;
        let speakers_in =
            copy_into_shared_if_needed(paths, &item.speakers_json, paths.shared_speakers_path(item.chunk.id)).await?;
        let existing = match &current_embeddings {
            Some(p) => Some(
                copy_into_shared_if_needed(paths, p, paths.shared_path(&format!("existing_{}", item.chunk.id)))
                    .await?,
            ),
            None => None,
        };
        (audio_in, speakers_in, paths.shared_embeddings_path(item.chunk.id), existing)
    } else {
        (
            item.chunk.path.clone(),
            item.speakers_json.clone(),
            embeddings_out.clone(),
            current_embeddings,
        )
    };

    dependency
        .run_embeddings(
            &audio_in,
            &speakers_in,
            &embeddings_target,
            &EmbeddingOpts {
                device: config.device.clone(),
                threshold: config.threshold,
                auto_lower_min: config.auto_lower_min,
                auto_lower_step: config.auto_lower_step,
                hf_token: config.hf_token.clone(),
                existing_embeddings,
                enable_offline: config.enable_offline,
                timeout: config.timeout,
            },
        )
        .await?;

    if embeddings_target != embeddings_out {
        tokio::fs::copy(&embeddings_target, &embeddings_out).await?;
    }

    Ok(embeddings_out)
}

async fn copy_into_shared_if_needed(paths: &PathManager, src: &std::path::Path, shared_dst: PathBuf) -> anyhow::Result<PathBuf> {
    if paths.is_under_shared_volume(src) {
        return Ok(src.to_path_buf());
    }
    tokio::fs::copy(src, &shared_dst).await?;
    Ok(shared_dst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency::{CommandRequest, CommandResponse};
    use crate::types::AudioChunk;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;

    struct RecordingExecutor {
        calls: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl DependencyExecutor for RecordingExecutor {
        async fn execute_command(&self, req: &CommandRequest) -> anyhow::Result<CommandResponse> {
            self.calls.lock().unwrap().push(req.args.clone());
            if let Some(out_idx) = req.args.iter().position(|a| a == "--output") {
                let out_path = &req.args[out_idx + 1];
                tokio::fs::write(out_path, b"{}").await?;
            }
            Ok(CommandResponse {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
                duration_seconds: 0.0,
            })
        }

        async fn health_check(&self) -> anyhow::Result<()> {
            Ok(())
        }

        fn python_binary(&self) -> &str {
            "python3"
        }
        fn diarization_script(&self) -> &Path {
            Path::new("diarize.py")
        }
        fn embedding_script(&self) -> &Path {
            Path::new("embed.py")
        }
    }

    #[tokio::test]
    async fn first_chunk_runs_without_existing_embeddings_then_second_chunk_sees_first() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathManager::new(dir.path(), dir.path().join("shared"));
        std::fs::write(paths.wav(0), b"wav-bytes").unwrap();
        std::fs::write(paths.speakers(0), b"{}").unwrap();
        std::fs::write(paths.wav(1), b"wav-bytes").unwrap();
        std::fs::write(paths.speakers(1), b"{}").unwrap();

        let dependency = RecordingExecutor {
            calls: Mutex::new(vec![]),
        };
        let voiceprint = Arc::new(VoicePrintState::new(None));
        let config = EmbeddingConfig {
            device: "cpu".to_string(),
            threshold: 0.7,
            auto_lower_min: 0.5,
            auto_lower_step: 0.05,
            hf_token: "".to_string(),
            enable_offline: false,
            timeout: Duration::from_secs(60),
        };

        let chunk0 = SdResult {
            chunk: AudioChunk {
                id: 0,
                path: paths.wav(0),
                start_time: chrono::Utc::now(),
                end_time: chrono::Utc::now(),
            },
            segments_json: paths.segments(0),
            speakers_json: paths.speakers(0),
        };
        let out0 = process_one(&chunk0, &dependency, &paths, &voiceprint, &config).await.unwrap();
        assert_eq!(out0, paths.embeddings(0));
        assert!(out0.exists());
        voiceprint.set(out0.clone());

        assert!(!dependency.calls.lock().unwrap()[0].iter().any(|a| a == "--existing-embeddings"));

        let chunk1 = SdResult {
            chunk: AudioChunk {
                id: 1,
                path: paths.wav(1),
                start_time: chrono::Utc::now(),
                end_time: chrono::Utc::now(),
            },
            segments_json: paths.segments(1),
            speakers_json: paths.speakers(1),
        };
        process_one(&chunk1, &dependency, &paths, &voiceprint, &config).await.unwrap();
        assert!(dependency.calls.lock().unwrap()[1].iter().any(|a| a == "--existing-embeddings"));
    }
}
