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

//! Fixed-duration recorder strategy: spawn one FFmpeg child process per
//! chunk, each capturing `record_chunk_duration` seconds, spec section 4.3.
//!
//! Grounded on the teacher's `meeting_recorder.rs::start_ffmpeg_recording`
//! (spawn, `.wait()`, rename-on-success idiom) generalized to a
//! chunk-at-a-time loop with a watchdog timer and the partial-finalize
//! rules spec section 4.3 spells out.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::process::Command;

use super::{Recorder, StopControl};
use crate::paths::PathManager;
use crate::queue::SafeQueue;
use crate::types::AudioChunk;

pub struct FixedRecorder {
    ffmpeg_binary_path: String,
    ffmpeg_device_name: String,
    chunk_duration: Duration,
    paths: PathManager,
    next_chunk_id: AtomicU32,
    control: StopControl,
}

impl FixedRecorder {
    pub fn new(
        ffmpeg_binary_path: String,
        ffmpeg_device_name: String,
        chunk_duration: Duration,
        paths: PathManager,
        start_chunk_id: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            ffmpeg_binary_path,
            ffmpeg_device_name,
            chunk_duration,
            paths,
            next_chunk_id: AtomicU32::new(start_chunk_id),
            control: StopControl::new(),
        })
    }

    /// `ffmpeg -y -f avfoundation -i :<device> -t <sec> -ac 1 -ar 16000
    /// <out.wav.partial>`, per spec section 6.
    fn build_command(&self, partial: &PathBuf) -> Command {
        let mut cmd = Command::new(&self.ffmpeg_binary_path);
        cmd.arg("-y")
            .arg("-f")
            .arg("avfoundation")
            .arg("-i")
            .arg(&self.ffmpeg_device_name)
            .arg("-t")
            .arg(self.chunk_duration.as_secs().to_string())
            .arg("-ac")
            .arg("1")
            .arg("-ar")
            .arg("16000")
            .arg(partial)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd
    }

    async fn record_one_chunk(&self, chunk_id: u32, asr_queue: &SafeQueue<AudioChunk>) -> bool {
        let wav = self.paths.wav(chunk_id);
        let partial = self.paths.wav_partial(chunk_id);

        let planned_start = Utc::now();
        let mut child = match self.build_command(&partial).spawn() {
            Ok(child) => child,
            Err(err) => {
                tracing::error!(chunk_id, error = %err, "fixed-duration recorder failed to spawn ffmpeg");
                return false;
            }
        };

        let watchdog = self.chunk_duration + Duration::from_secs(5);

        tokio::select! {
            _ = self.control.cancelled() => {
                let _ = child.kill().await;
                if !self.control.stop_requested() {
                    // Context canceled before the stop flag was latched:
                    // discard the partial, don't enqueue.
                    let _ = tokio::fs::remove_file(&partial).await;
                    return false;
                }
                if self.control.should_finalize_partial() {
                    self.finalize_partial(chunk_id, &partial, &wav, planned_start, Utc::now(), asr_queue).await;
                } else {
                    let _ = tokio::fs::remove_file(&partial).await;
                }
                false
            }
            status = tokio::time::timeout(watchdog, child.wait()) => {
                let planned_end = planned_start + chrono::Duration::from_std(self.chunk_duration).unwrap_or_default();
                let actual_end = Utc::now();
                match status {
                    Ok(Ok(exit_status)) => {
                        if !exit_status.success() {
                            tracing::warn!(chunk_id, "ffmpeg exited non-zero for chunk, treating as early exit");
                        }
                        let early_by = (planned_end - actual_end).num_milliseconds();
                        if early_by > 2000 {
                            tracing::warn!(chunk_id, early_by_ms = early_by, "fixed-duration chunk exited more than 2s early");
                        }
                        self.finalize_partial(chunk_id, &partial, &wav, planned_start, actual_end, asr_queue).await;
                        true
                    }
                    Ok(Err(err)) => {
                        tracing::error!(chunk_id, error = %err, "ffmpeg wait() failed for chunk");
                        let _ = child.kill().await;
                        false
                    }
                    Err(_) => {
                        tracing::warn!(chunk_id, "fixed-duration watchdog fired, force-interrupting ffmpeg");
                        let _ = child.kill().await;
                        self.finalize_partial(chunk_id, &partial, &wav, planned_start, Utc::now(), asr_queue).await;
                        true
                    }
                }
            }
        }
    }

    /// Rename `.partial` to the final name and enqueue, per spec section
    /// 4.3's "stop requested with finalize" rule (also reused for the plain
    /// normal-exit path, whose enqueue semantics are identical).
    async fn finalize_partial(
        &self,
        chunk_id: u32,
        partial: &PathBuf,
        wav: &PathBuf,
        start_time: chrono::DateTime<Utc>,
        end_time: chrono::DateTime<Utc>,
        asr_queue: &SafeQueue<AudioChunk>,
    ) {
        if tokio::fs::metadata(partial).await.is_err() {
            return;
        }

        let final_path = match tokio::fs::rename(partial, wav).await {
            Ok(()) => wav.clone(),
            Err(rename_err) => {
                tracing::warn!(chunk_id, error = %rename_err, "rename of partial chunk failed, falling back to copy");
                match tokio::fs::copy(partial, wav).await {
                    Ok(_) => {
                        let _ = tokio::fs::remove_file(partial).await;
                        wav.clone()
                    }
                    Err(copy_err) => {
                        tracing::error!(chunk_id, error = %copy_err, "copy of partial chunk also failed, enqueueing partial path as-is");
                        partial.clone()
                    }
                }
            }
        };

        asr_queue
            .push(AudioChunk {
                id: chunk_id,
                path: final_path,
                start_time,
                end_time,
            })
            .await;
    }
}

#[async_trait::async_trait]
impl Recorder for FixedRecorder {
    fn start(self: Arc<Self>, asr_queue: Arc<SafeQueue<AudioChunk>>) {
        tokio::spawn(async move {
            loop {
                if self.control.stop_requested() {
                    break;
                }
                let chunk_id = self.next_chunk_id.fetch_add(1, Ordering::SeqCst);
                let recorded = self.record_one_chunk(chunk_id, &asr_queue).await;
                if !recorded || self.control.stop_requested() {
                    break;
                }
            }
            asr_queue.close().await;
        });
    }

    fn request_stop(&self) {
        self.control.request_stop();
    }

    fn finalize_and_stop(&self) {
        self.control.finalize_and_stop();
    }
}
