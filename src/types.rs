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

//! Core data model: chunks, stage records, shared voice-print state, the
//! lifecycle state enum, and the progress snapshot — spec section 3.
//!
//! Grounded on the teacher's `continuous_types.rs`, which defines an
//! analogous `AudioChunk` plus `ErrorCounts`/`QueueStatus` status structs
//! this module's `Metrics`/`Progress` generalize to the four named stages.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// A chunk of recorded or uploaded audio flowing through the pipeline.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub id: u32,
    pub path: PathBuf,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// ASR worker output: the chunk plus its segments JSON path.
#[derive(Debug, Clone)]
pub struct AsrResult {
    pub chunk: AudioChunk,
    pub segments_json: PathBuf,
}

/// SD worker output: adds the speakers JSON path.
#[derive(Debug, Clone)]
pub struct SdResult {
    pub chunk: AudioChunk,
    pub segments_json: PathBuf,
    pub speakers_json: PathBuf,
}

/// EMB worker output: adds the embeddings JSON path.
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    pub chunk: AudioChunk,
    pub segments_json: PathBuf,
    pub speakers_json: PathBuf,
    pub embeddings_json: PathBuf,
}

/// Shared, mutex-guarded handle to the session's running embeddings file.
/// Read by the EMB worker before running the embedding script (so the next
/// chunk compares against the running session), and updated by the EMB
/// worker after each success — this is how speaker identity persists across
/// chunks (spec section 3).
#[derive(Debug, Default)]
pub struct VoicePrintState {
    inner: Mutex<Option<PathBuf>>,
}

impl VoicePrintState {
    pub fn new(initial: Option<PathBuf>) -> Self {
        Self {
            inner: Mutex::new(initial),
        }
    }

    pub fn current(&self) -> Option<PathBuf> {
        self.inner.lock().clone()
    }

    pub fn set(&self, path: PathBuf) {
        *self.inner.lock() = Some(path);
    }
}

/// Orchestrator lifecycle state, spec section 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    Created,
    Running,
    Stopping,
    Draining,
    Stopped,
    Completed,
}

/// File counts by artifact kind, part of the progress snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileCounts {
    pub wav: usize,
    pub segments: usize,
    pub speakers: usize,
    pub speakers_mapped: usize,
    pub merged: usize,
}

/// Progress snapshot returned to the external host, recomputed on demand by
/// scanning the output directory (spec section 3/4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Progress {
    pub state: State,
    pub current_chunk: Option<u32>,
    pub file_counts: FileCounts,
    pub last_embeddings_file: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Plain data snapshot of [`Metrics`], safe to serialize.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageCounters {
    pub asr_success: u64,
    pub asr_failure: u64,
    pub sd_success: u64,
    pub sd_failure: u64,
    pub emb_success: u64,
    pub emb_failure: u64,
    pub merge_success: u64,
    pub merge_failure: u64,
    pub degradation_events: u64,
    pub dependency_fallback_events: u64,
}

/// Lightweight in-process counters a metrics layer would scrape (spec
/// section 1's non-goal carve-out: the core names events, it does not ship
/// an exporter). Mirrors the shape of the teacher's `ErrorCounts` /
/// `QueueStatus` in `continuous_types.rs`.
#[derive(Debug, Default)]
pub struct Metrics {
    pub asr_success: AtomicU64,
    pub asr_failure: AtomicU64,
    pub sd_success: AtomicU64,
    pub sd_failure: AtomicU64,
    pub emb_success: AtomicU64,
    pub emb_failure: AtomicU64,
    pub merge_success: AtomicU64,
    pub merge_failure: AtomicU64,
    pub degradation_events: AtomicU64,
    pub dependency_fallback_events: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn snapshot(&self) -> StageCounters {
        StageCounters {
            asr_success: self.asr_success.load(Ordering::Relaxed),
            asr_failure: self.asr_failure.load(Ordering::Relaxed),
            sd_success: self.sd_success.load(Ordering::Relaxed),
            sd_failure: self.sd_failure.load(Ordering::Relaxed),
            emb_success: self.emb_success.load(Ordering::Relaxed),
            emb_failure: self.emb_failure.load(Ordering::Relaxed),
            merge_success: self.merge_success.load(Ordering::Relaxed),
            merge_failure: self.merge_failure.load(Ordering::Relaxed),
            degradation_events: self.degradation_events.load(Ordering::Relaxed),
            dependency_fallback_events: self.dependency_fallback_events.load(Ordering::Relaxed),
        }
    }
}
