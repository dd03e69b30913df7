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

//! The orchestrator, spec section 4.9: owns the queues, workers, recorder,
//! voice-print state and lifecycle state machine for one session.
//!
//! Grounded on the teacher's `meeting_recorder.rs` lifecycle
//! (`start_recording`/`stop_recording`, `RecordingEvent`) generalized from
//! one-shot meeting capture to the four-stage pipeline spec section 2
//! describes. The `stop()` critical-section shape follows the fix
//! mandated by spec section 9's flagged double-lock: each state transition
//! takes the mutex once, never across an await point.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::degradation::DegradationController;
use crate::dependency::{self, DependencyExecutor};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::health::HealthChecker;
use crate::paths::{ArtifactKind, PathManager};
use crate::queue::SafeQueue;
use crate::recorder::{ContinuousRecorder, FixedRecorder, Recorder};
use crate::transcriber::{self, options_from_config};
use crate::types::{AsrResult, AudioChunk, EmbeddingResult, FileCounts, Metrics, Progress, SdResult, State, VoicePrintState};
use crate::workers;

struct Queues {
    asr: Arc<SafeQueue<AudioChunk>>,
    sd: Arc<SafeQueue<AsrResult>>,
    emb: Arc<SafeQueue<SdResult>>,
    merge: Arc<SafeQueue<EmbeddingResult>>,
}

impl Queues {
    fn new(capacity: usize) -> Self {
        Self {
            asr: Arc::new(SafeQueue::new(capacity)),
            sd: Arc::new(SafeQueue::new(capacity)),
            emb: Arc::new(SafeQueue::new(capacity)),
            merge: Arc::new(SafeQueue::new(capacity)),
        }
    }

    async fn close_all(&self) {
        self.asr.close().await;
        self.sd.close().await;
        self.emb.close().await;
        self.merge.close().await;
    }
}

const QUEUE_CAPACITY: usize = 8;

pub struct Orchestrator {
    config: Config,
    paths: PathManager,
    metrics: Arc<Metrics>,
    state: Mutex<State>,
    voiceprint: Arc<VoicePrintState>,
    start_chunk_id: AtomicU32,
    queues: Mutex<Option<Queues>>,
    recorder: Mutex<Option<Arc<dyn Recorder>>>,
    health_checker: Mutex<Option<Arc<HealthChecker>>>,
    worker_handles: Mutex<Vec<JoinHandle<()>>>,
    reprocess_mode: AtomicBool,
    process_cancel: Mutex<Option<CancellationToken>>,
}

impl Orchestrator {
    /// Creates the output directory, initializes the voice-print state from
    /// `config.initial_embeddings_path`, and sets state to `created` (spec
    /// section 4.9).
    pub fn new(config: Config) -> OrchestratorResult<Arc<Self>> {
        std::fs::create_dir_all(&config.output_dir)?;
        std::fs::create_dir_all(&config.dependency_shared_volume)?;
        let paths = PathManager::new(config.output_dir.clone(), config.dependency_shared_volume.clone());
        let initial_embeddings = config.initial_embeddings_path.clone();

        Ok(Arc::new(Self {
            config,
            paths,
            metrics: Metrics::new(),
            state: Mutex::new(State::Created),
            voiceprint: Arc::new(VoicePrintState::new(initial_embeddings)),
            start_chunk_id: AtomicU32::new(0),
            queues: Mutex::new(None),
            recorder: Mutex::new(None),
            health_checker: Mutex::new(None),
            worker_handles: Mutex::new(Vec::new()),
            reprocess_mode: AtomicBool::new(false),
            process_cancel: Mutex::new(None),
        }))
    }

    pub fn state(&self) -> State {
        *self.state.lock()
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    pub fn paths(&self) -> &PathManager {
        &self.paths
    }

    fn require_state(&self, allowed: &[State], op: &str) -> OrchestratorResult<()> {
        let current = *self.state.lock();
        if allowed.contains(&current) {
            Ok(())
        } else {
            Err(OrchestratorError::Lifecycle(format!(
                "{op} is illegal from state {current:?}"
            )))
        }
    }

    /// Scans `output_dir` for the maximum chunk id found in `chunk_NNNN.wav`
    /// and sets `start_chunk_id` to one past it (or 0). Adopts the highest
    /// `chunk_NNNN_embeddings.json` as the running voice-print path. Reads
    /// the filesystem rather than any in-memory counter, so it is safe to
    /// call after a crash (spec section 9).
    pub fn prepare_resume(self: &Arc<Self>) -> OrchestratorResult<()> {
        self.require_state(&[State::Created, State::Stopped], "prepare_resume")?;

        let max_wav = self.max_chunk_id(ArtifactKind::Wav);
        self.start_chunk_id
            .store(max_wav.map(|id| id + 1).unwrap_or(0), Ordering::SeqCst);

        if let Some(max_emb) = self.max_chunk_id(ArtifactKind::Embeddings) {
            self.voiceprint.set(self.paths.embeddings(max_emb));
        }
        Ok(())
    }

    fn max_chunk_id(&self, kind: ArtifactKind) -> Option<u32> {
        self.chunk_ids_with_kind(kind).into_iter().max()
    }

    fn chunk_ids_with_kind(&self, kind: ArtifactKind) -> Vec<u32> {
        let Ok(entries) = std::fs::read_dir(self.paths.output_dir()) else {
            return Vec::new();
        };
        let mut ids: Vec<u32> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .filter_map(|name| crate::paths::parse_chunk_filename(&name))
            .filter(|(_, k)| *k == kind)
            .map(|(id, _)| id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Starts the pipeline: constructs transcribers, health checker,
    /// degradation controller, dependency executor and the recorder (if
    /// any), then launches the four workers. Legal from `created` or
    /// `stopped` (spec section 4.9).
    pub async fn start(self: &Arc<Self>) -> OrchestratorResult<()> {
        self.require_state(&[State::Created, State::Stopped], "start")?;

        let queues = Queues::new(QUEUE_CAPACITY);
        let process_cancel = CancellationToken::new();

        let primary = transcriber::build_primary(&self.config)
            .map_err(|e| OrchestratorError::EnvNotReady(format!("transcriber: {e}")))?;
        let primary: Arc<dyn transcriber::Transcriber> = Arc::from(primary);
        let fallback: Arc<dyn transcriber::Transcriber> = Arc::from(transcriber::build_fallback());

        let health_checker = HealthChecker::new(
            primary.clone(),
            self.config.health_check_interval,
            self.config.health_check_fail_threshold,
        );
        health_checker.start();
        let degradation = Arc::new(DegradationController::new(
            primary,
            fallback,
            health_checker.clone(),
            self.config.enable_degradation,
            self.metrics.clone(),
        ));

        let dependency_executor: Arc<dyn DependencyExecutor> =
            Arc::from(dependency::build(&self.config, &self.paths, self.metrics.clone()));

        let start_chunk_id = self.start_chunk_id.load(Ordering::SeqCst);
        let recorder: Option<Arc<dyn Recorder>> = if self.config.use_continuous {
            let r = ContinuousRecorder::new(
                self.config.ffmpeg_binary_path.clone(),
                self.config.ffmpeg_device_name.clone(),
                self.config.record_chunk_duration,
                self.paths.clone(),
                start_chunk_id,
            );
            r.clone().start(queues.asr.clone());
            Some(r as Arc<dyn Recorder>)
        } else {
            let r = FixedRecorder::new(
                self.config.ffmpeg_binary_path.clone(),
                self.config.ffmpeg_device_name.clone(),
                self.config.record_chunk_duration,
                self.paths.clone(),
                start_chunk_id,
            );
            r.clone().start(queues.asr.clone());
            Some(r as Arc<dyn Recorder>)
        };

        let mut handles = Vec::new();
        handles.push(tokio::spawn(workers::asr::run(
            queues.asr.clone(),
            queues.sd.clone(),
            degradation,
            options_from_config(&self.config),
            self.paths.clone(),
            self.metrics.clone(),
        )));
        handles.extend(self.spawn_downstream_workers(&queues, dependency_executor));

        *self.queues.lock() = Some(queues);
        *self.recorder.lock() = recorder;
        *self.health_checker.lock() = Some(health_checker);
        *self.worker_handles.lock() = handles;
        *self.process_cancel.lock() = Some(process_cancel);
        self.reprocess_mode.store(false, Ordering::SeqCst);

        *self.state.lock() = State::Running;
        Ok(())
    }

    fn spawn_downstream_workers(
        self: &Arc<Self>,
        queues: &Queues,
        dependency_executor: Arc<dyn DependencyExecutor>,
    ) -> Vec<JoinHandle<()>> {
        let sd_handle = tokio::spawn(workers::sd::run(
            queues.sd.clone(),
            queues.emb.clone(),
            dependency_executor.clone(),
            self.paths.clone(),
            self.config.device_default.clone(),
            self.config.enable_offline,
            self.config.dependency_timeout,
            self.metrics.clone(),
        ));

        let emb_config = workers::emb::EmbeddingConfig {
            device: self.config.embedding_device_default.clone(),
            threshold: self.config.embedding_threshold,
            auto_lower_min: self.config.embedding_auto_lower_min,
            auto_lower_step: self.config.embedding_auto_lower_step,
            hf_token: self.config.hf_token.clone(),
            enable_offline: self.config.enable_offline,
            timeout: self.config.dependency_timeout,
        };
        let emb_handle = tokio::spawn(workers::emb::run(
            queues.emb.clone(),
            queues.merge.clone(),
            dependency_executor,
            self.paths.clone(),
            self.voiceprint.clone(),
            emb_config,
            self.metrics.clone(),
        ));

        let merge_handle = tokio::spawn(workers::merge::run(
            queues.merge.clone(),
            self.paths.clone(),
            self.config.merge_segments_binary_path.clone(),
            self.metrics.clone(),
        ));

        vec![sd_handle, emb_handle, merge_handle]
    }

    /// Legal from `running`. Drains the pipeline (non-reprocess mode waits
    /// for the queue-close wave; reprocess mode abandons in-flight work),
    /// then concatenates per-chunk merged files. Each state transition is
    /// its own short critical section, never held across an `await`.
    pub async fn stop(self: &Arc<Self>) -> OrchestratorResult<()> {
        {
            let mut state = self.state.lock();
            if *state != State::Running {
                return Err(OrchestratorError::Lifecycle(format!(
                    "stop is illegal from state {:?}",
                    *state
                )));
            }
            *state = State::Stopping;
        }

        if let Some(checker) = self.health_checker.lock().take() {
            checker.stop();
        }

        if self.reprocess_mode.load(Ordering::SeqCst) {
            if let Some(cancel) = self.process_cancel.lock().clone() {
                cancel.cancel();
            }
            let queues = self.queues.lock().take();
            if let Some(queues) = queues {
                queues.close_all().await;
            }
        } else if let Some(recorder) = self.recorder.lock().clone() {
            recorder.finalize_and_stop();
        }

        let handles = std::mem::take(&mut *self.worker_handles.lock());
        for handle in handles {
            let _ = handle.await;
        }

        {
            let mut state = self.state.lock();
            *state = State::Draining;
        }

        self.concat_all_merged().await?;

        {
            let mut state = self.state.lock();
            *state = State::Stopped;
        }
        Ok(())
    }

    /// Legal from `created`/`stopped`. Scans for `chunk_NNNN.wav` +
    /// `chunk_NNNN_segments.json` pairs and feeds them directly into the SD
    /// queue, bypassing ASR entirely; starts only the SD/EMB/Merge workers
    /// (spec section 4.9).
    pub async fn reprocess_from_segments(self: &Arc<Self>) -> OrchestratorResult<()> {
        self.require_state(&[State::Created, State::Stopped], "reprocess_from_segments")?;

        for id in self.chunk_ids_with_kind(ArtifactKind::Merged) {
            let _ = std::fs::remove_file(self.paths.merged(id));
        }

        let wav_ids: HashSet<u32> = self.chunk_ids_with_kind(ArtifactKind::Wav).into_iter().collect();
        let mut segment_ids = self.chunk_ids_with_kind(ArtifactKind::Segments);
        segment_ids.retain(|id| wav_ids.contains(id));
        segment_ids.sort_unstable();

        let queues = Queues::new(QUEUE_CAPACITY);
        let dependency_executor: Arc<dyn DependencyExecutor> =
            Arc::from(dependency::build(&self.config, &self.paths, self.metrics.clone()));
        let handles = self.spawn_downstream_workers(&queues, dependency_executor);

        let sd_queue = queues.sd.clone();
        let paths = self.paths.clone();
        let now = chrono::Utc::now();
        tokio::spawn(async move {
            for id in segment_ids {
                sd_queue
                    .push(AsrResult {
                        chunk: AudioChunk {
                            id,
                            path: paths.wav(id),
                            start_time: now,
                            end_time: now,
                        },
                        segments_json: paths.segments(id),
                    })
                    .await;
            }
            sd_queue.close().await;
        });

        *self.queues.lock() = Some(queues);
        *self.worker_handles.lock() = handles;
        *self.recorder.lock() = None;
        self.reprocess_mode.store(true, Ordering::SeqCst);
        *self.process_cancel.lock() = Some(CancellationToken::new());

        *self.state.lock() = State::Running;
        Ok(())
    }

    /// External push path. Auto-starts from `created`. Legal from
    /// `created`/`running`/`stopping`/`draining` (spec section 4.9).
    pub async fn enqueue_audio_chunk(self: &Arc<Self>, id: u32, wav_path: impl AsRef<Path>) -> OrchestratorResult<()> {
        if self.state() == State::Created {
            self.start().await?;
        }
        self.require_state(
            &[State::Running, State::Stopping, State::Draining],
            "enqueue_audio_chunk",
        )?;

        let path = wav_path.as_ref().to_path_buf();
        let mtime = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .map(chrono::DateTime::<chrono::Utc>::from)
            .unwrap_or_else(|_| chrono::Utc::now());

        let asr_queue = self.queues.lock().as_ref().map(|q| q.asr.clone());
        if let Some(asr_queue) = asr_queue {
            asr_queue
                .push(AudioChunk {
                    id,
                    path,
                    start_time: mtime,
                    end_time: chrono::Utc::now(),
                })
                .await;
        }
        Ok(())
    }

    /// Legal only from `running`. Iterates `[start_id, end_id)` and pushes
    /// an `AudioChunk` for each `chunk_NNNN.wav` that already exists (spec
    /// section 4.9).
    pub async fn enqueue_existing_chunks(self: &Arc<Self>, start_id: u32, end_id: u32) -> OrchestratorResult<()> {
        self.require_state(&[State::Running], "enqueue_existing_chunks")?;

        let asr_queue = self.queues.lock().as_ref().map(|q| q.asr.clone());
        let Some(asr_queue) = asr_queue else {
            return Ok(());
        };

        for id in start_id..end_id {
            let wav = self.paths.wav(id);
            if !wav.exists() {
                continue;
            }
            let now = chrono::Utc::now();
            asr_queue
                .push(AudioChunk {
                    id,
                    path: wav,
                    start_time: now,
                    end_time: now,
                })
                .await;
        }
        Ok(())
    }

    /// Recomputes the progress snapshot by scanning the output directory
    /// (spec section 3/4.9) — never trusts in-memory counters.
    pub fn progress(&self) -> Progress {
        let file_counts = FileCounts {
            wav: self.chunk_ids_with_kind(ArtifactKind::Wav).len(),
            segments: self.chunk_ids_with_kind(ArtifactKind::Segments).len(),
            speakers: self.chunk_ids_with_kind(ArtifactKind::Speakers).len(),
            speakers_mapped: self.chunk_ids_with_kind(ArtifactKind::SpeakersMapped).len()
                + self.chunk_ids_with_kind(ArtifactKind::SpeakersMappedGlobal).len(),
            merged: self.chunk_ids_with_kind(ArtifactKind::Merged).len(),
        };

        let current_chunk = [
            ArtifactKind::Wav,
            ArtifactKind::Segments,
            ArtifactKind::Speakers,
            ArtifactKind::Embeddings,
            ArtifactKind::Merged,
        ]
        .iter()
        .filter_map(|kind| self.max_chunk_id(*kind))
        .max();

        let last_embeddings_file = self.max_chunk_id(ArtifactKind::Embeddings).map(|id| {
            self.paths
                .embeddings(id)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default()
        });

        Progress {
            state: self.state(),
            current_chunk,
            file_counts,
            last_embeddings_file,
            updated_at: chrono::Utc::now(),
        }
    }

    /// Enumerates `chunk_NNNN_merged.txt` in numeric id order and writes
    /// them into `merged_all.txt`, each preceded by a `===== Chunk NNNN
    /// =====` header line and a blank line between blocks (spec section
    /// 4.9). Deterministic given the same set of per-chunk files.
    pub async fn concat_all_merged(&self) -> OrchestratorResult<()> {
        let ids = self.chunk_ids_with_kind(ArtifactKind::Merged);
        let mut out = String::new();
        for id in ids {
            let body = tokio::fs::read_to_string(self.paths.merged(id)).await?;
            out.push_str(&format!("===== Chunk {id:04} =====\n"));
            out.push_str(&body);
            out.push('\n');
        }
        tokio::fs::write(self.paths.merged_all(), out).await?;
        Ok(())
    }

    /// Recovery helper: for every chunk id with both segments and speakers
    /// but no merged file, runs the merge CLI and blank-line scrub, then
    /// `concat_all_merged()` (spec section 4.9).
    pub async fn merge_only(&self) -> OrchestratorResult<()> {
        let segments_ids: HashSet<u32> = self.chunk_ids_with_kind(ArtifactKind::Segments).into_iter().collect();
        let speakers_ids: HashSet<u32> = self.chunk_ids_with_kind(ArtifactKind::Speakers).into_iter().collect();
        let merged_ids: HashSet<u32> = self.chunk_ids_with_kind(ArtifactKind::Merged).into_iter().collect();

        let mut pending: Vec<u32> = segments_ids
            .intersection(&speakers_ids)
            .filter(|id| !merged_ids.contains(id))
            .copied()
            .collect();
        pending.sort_unstable();

        for id in pending {
            let speakers_path = self.paths.most_resolved_speakers(id);
            let merged_path = self.paths.merged(id);
            let output = tokio::process::Command::new(&self.config.merge_segments_binary_path)
                .arg("--segments-file")
                .arg(self.paths.segments(id))
                .arg("--speaker-file")
                .arg(&speakers_path)
                .output()
                .await?;
            if !output.status.success() {
                tracing::error!(chunk_id = id, "merge_only: merge-segments failed");
                continue;
            }
            tokio::fs::write(&merged_path, output.stdout).await?;
        }

        self.concat_all_merged().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;

    #[tokio::test]
    async fn prepare_resume_finds_next_chunk_id_and_embeddings_path() {
        let mut config = test_config();
        let dir = tempfile::tempdir().unwrap();
        config.output_dir = dir.path().to_path_buf();
        let orch = Orchestrator::new(config).unwrap();

        std::fs::write(orch.paths().wav(0), b"wav").unwrap();
        std::fs::write(orch.paths().segments(0), b"{}").unwrap();
        std::fs::write(orch.paths().embeddings(0), b"{}").unwrap();

        orch.prepare_resume().unwrap();
        assert_eq!(orch.start_chunk_id.load(Ordering::SeqCst), 1);
        assert_eq!(orch.voiceprint.current(), Some(orch.paths().embeddings(0)));
    }

    #[tokio::test]
    async fn concat_all_merged_is_deterministic_and_headers_each_chunk() {
        let mut config = test_config();
        let dir = tempfile::tempdir().unwrap();
        config.output_dir = dir.path().to_path_buf();
        let orch = Orchestrator::new(config).unwrap();

        std::fs::write(orch.paths().merged(0), "SPEAKER_A: hello\n").unwrap();
        std::fs::write(orch.paths().merged(1), "SPEAKER_A: world\n").unwrap();

        orch.concat_all_merged().await.unwrap();
        let first = std::fs::read_to_string(orch.paths().merged_all()).unwrap();
        orch.concat_all_merged().await.unwrap();
        let second = std::fs::read_to_string(orch.paths().merged_all()).unwrap();

        assert_eq!(first, second);
        assert_eq!(
            first,
            "===== Chunk 0000 =====\nSPEAKER_A: hello\n\n===== Chunk 0001 =====\nSPEAKER_A: world\n\n"
        );
    }

    #[tokio::test]
    async fn stop_is_illegal_outside_running() {
        let mut config = test_config();
        let dir = tempfile::tempdir().unwrap();
        config.output_dir = dir.path().to_path_buf();
        let orch = Orchestrator::new(config).unwrap();
        assert!(orch.stop().await.is_err());
    }

    #[tokio::test]
    async fn enqueue_existing_chunks_illegal_outside_running() {
        let mut config = test_config();
        let dir = tempfile::tempdir().unwrap();
        config.output_dir = dir.path().to_path_buf();
        let orch = Orchestrator::new(config).unwrap();
        assert!(orch.enqueue_existing_chunks(0, 1).await.is_err());
    }
}
