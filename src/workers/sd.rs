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

//! SD (speaker diarization) worker, spec section 4.7.2: runs diarization
//! through the configured dependency executor, sanitizes the resulting
//! speakers file against the chunk's true audio duration, and forwards an
//! `SdResult` to the EMB queue.

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::dependency::{DependencyExecutor, DiarizationOpts};
use crate::mapping::SpeakersFile;
use crate::paths::PathManager;
use crate::queue::SafeQueue;
use crate::types::{AsrResult, Metrics, SdResult};
use crate::wav;

pub async fn run(
    sd_queue: Arc<SafeQueue<AsrResult>>,
    emb_queue: Arc<SafeQueue<SdResult>>,
    dependency: Arc<dyn DependencyExecutor>,
    paths: PathManager,
    device: String,
    enable_offline: bool,
    timeout: Duration,
    metrics: Arc<Metrics>,
) {
    while let Some(item) = sd_queue.pop().await {
        let chunk_id = item.chunk.id;
        match process_one(&item, &*dependency, &paths, &device, enable_offline, timeout).await {
            Ok(speakers_json) => {
                metrics.sd_success.fetch_add(1, Ordering::Relaxed);
                emb_queue
                    .push(SdResult {
                        chunk: item.chunk,
                        segments_json: item.segments_json,
                        speakers_json,
                    })
                    .await;
            }
            Err(err) => {
                metrics.sd_failure.fetch_add(1, Ordering::Relaxed);
                tracing::error!(chunk_id, error = %err, "sd worker diarization failed, dropping chunk");
            }
        }
    }
    emb_queue.close().await;
}

async fn process_one(
    item: &AsrResult,
    dependency: &dyn DependencyExecutor,
    paths: &PathManager,
    device: &str,
    enable_offline: bool,
    timeout: Duration,
) -> anyhow::Result<PathBuf> {
    let speakers_out = paths.speakers(item.chunk.id);

    let (audio_in, speakers_target) = if dependency.requires_shared_volume() {
        paths.ensure_shared_meeting_dir()?;
        let audio_in = if paths.is_under_shared_volume(&item.chunk.path) {
            item.chunk.path.clone()
        } else {
            let shared_audio = paths.shared_audio_path(item.chunk.id);
            tokio::fs::copy(&item.chunk.path, &shared_audio).await?;
            shared_audio
        };
        (audio_in, paths.shared_speakers_path(item.chunk.id))
    } else {
        (item.chunk.path.clone(), speakers_out.clone())
    };

    dependency
        .run_diarization(
            &audio_in,
            &speakers_target,
            &DiarizationOpts {
                device: device.to_string(),
                enable_offline,
                timeout,
            },
        )
        .await?;

    if speakers_target != speakers_out {
        tokio::fs::copy(&speakers_target, &speakers_out).await?;
    }

    sanitize_speakers_file(&speakers_out, &item.chunk.path)?;
    Ok(speakers_out)
}

/// Clamps every segment whose `end` exceeds the chunk's true audio duration
/// (computed from the WAV header) by more than 0.05s, per spec section
/// 4.7.2. Rewrites the file atomically (`.tmp` then rename) only when at
/// least one clamp occurred; returns whether it clamped anything, which
/// makes the function trivially idempotent — a second pass over an
/// already-clamped file finds nothing left to clamp and performs no write.
pub fn sanitize_speakers_file(speakers_path: &Path, audio_path: &Path) -> anyhow::Result<bool> {
    let (header, file_size) = wav::read_header_from_path(audio_path)?;
    let bytes_per_frame = header.bytes_per_frame() as u64;
    let duration = if bytes_per_frame == 0 || header.sample_rate == 0 {
        0.0
    } else {
        (file_size.saturating_sub(wav::HEADER_LEN)) as f64 / bytes_per_frame as f64 / header.sample_rate as f64
    };

    let raw = std::fs::read_to_string(speakers_path)?;
    let mut file: SpeakersFile = serde_json::from_str(&raw)?;

    let mut clamped_any = false;
    for segment in &mut file.segments {
        if segment.end > duration + 0.05 {
            segment.end = duration;
            if segment.start > segment.end {
                segment.start = (segment.end - 0.01).max(0.0);
            }
            clamped_any = true;
        }
    }

    if clamped_any {
        let serialized = serde_json::to_string_pretty(&file)?;
        let mut tmp_name = speakers_path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);
        std::fs::write(&tmp_path, serialized)?;
        std::fs::rename(&tmp_path, speakers_path)?;
    }

    Ok(clamped_any)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::SpeakerSegment;

    fn write_wav(path: &Path, seconds: f64) {
        let samples = (seconds * 16000.0) as u64;
        let mut data = wav::build_header(16000, 1, 16, (samples * 2) as u32).to_vec();
        data.extend(std::iter::repeat(0u8).take((samples * 2) as usize));
        std::fs::write(path, data).unwrap();
    }

    fn write_speakers(path: &Path, segments: &[(f64, f64, &str)]) {
        let file = SpeakersFile {
            segments: segments
                .iter()
                .map(|(s, e, sp)| SpeakerSegment {
                    start: *s,
                    end: *e,
                    speaker: sp.to_string(),
                    extra: Default::default(),
                })
                .collect(),
            extra: Default::default(),
        };
        std::fs::write(path, serde_json::to_string(&file).unwrap()).unwrap();
    }

    #[test]
    fn clamps_segment_ends_past_true_duration() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("chunk_0000.wav");
        write_wav(&audio, 5.0);
        let speakers = dir.path().join("chunk_0000_speakers.json");
        write_speakers(&speakers, &[(4.9, 60.0, "SPEAKER_00")]);

        let clamped = sanitize_speakers_file(&speakers, &audio).unwrap();
        assert!(clamped);

        let result: SpeakersFile = serde_json::from_str(&std::fs::read_to_string(&speakers).unwrap()).unwrap();
        assert!((result.segments[0].end - 5.0).abs() < 1e-9);
        assert_eq!(result.segments[0].start, 4.9);
    }

    #[test]
    fn sanitization_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("chunk_0000.wav");
        write_wav(&audio, 5.0);
        let speakers = dir.path().join("chunk_0000_speakers.json");
        write_speakers(&speakers, &[(0.0, 60.0, "SPEAKER_00")]);

        sanitize_speakers_file(&speakers, &audio).unwrap();
        let first_pass = std::fs::read(&speakers).unwrap();
        let clamped_again = sanitize_speakers_file(&speakers, &audio).unwrap();
        let second_pass = std::fs::read(&speakers).unwrap();

        assert!(!clamped_again);
        assert_eq!(first_pass, second_pass);
    }

    #[test]
    fn clamp_also_pulls_start_back_when_it_now_exceeds_end() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("chunk_0000.wav");
        write_wav(&audio, 5.0);
        let speakers = dir.path().join("chunk_0000_speakers.json");
        // start already past the true duration, so clamping end to 5.0
        // would otherwise leave start > end.
        write_speakers(&speakers, &[(5.5, 60.0, "SPEAKER_00")]);

        sanitize_speakers_file(&speakers, &audio).unwrap();
        let result: SpeakersFile = serde_json::from_str(&std::fs::read_to_string(&speakers).unwrap()).unwrap();
        assert!(result.segments[0].start <= result.segments[0].end);
    }

    #[test]
    fn leaves_segments_within_tolerance_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("chunk_0000.wav");
        write_wav(&audio, 5.0);
        let speakers = dir.path().join("chunk_0000_speakers.json");
        write_speakers(&speakers, &[(0.0, 5.02, "SPEAKER_00")]);

        let clamped = sanitize_speakers_file(&speakers, &audio).unwrap();
        assert!(!clamped);
        let result: SpeakersFile = serde_json::from_str(&std::fs::read_to_string(&speakers).unwrap()).unwrap();
        assert_eq!(result.segments[0].end, 5.02);
    }
}
