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

//! The recorder: produces [`AudioChunk`] values into the ASR queue, spec
//! section 4.3. Two strategies are chosen by `config.use_continuous`:
//! fixed-duration FFmpeg child processes (`fixed.rs`) or a single
//! continuous PCM capture sliced by sample count (`continuous.rs`).
//!
//! Grounded on the teacher's `meeting_recorder.rs` (child-process lifecycle,
//! `RequestStop`/finalize semantics) and `continuous_audio.rs` (streaming a
//! long-lived ffmpeg stdout pipe), generalized from meeting-recording
//! concerns to feeding a bounded queue of dense, id-ordered chunks.

mod continuous;
mod fixed;

pub use continuous::ContinuousRecorder;
pub use fixed::FixedRecorder;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::queue::SafeQueue;
use crate::types::AudioChunk;

/// Shared stop-control surface both recorder strategies implement the same
/// way: `request_stop` aborts mid-chunk as soon as the process notices,
/// `finalize_and_stop` additionally asks the in-flight partial chunk to be
/// enqueued rather than discarded (spec section 4.3).
pub struct StopControl {
    stop_requested: AtomicBool,
    finalize_partial: AtomicBool,
    cancel: CancellationToken,
}

impl StopControl {
    pub fn new() -> Self {
        Self {
            stop_requested: AtomicBool::new(false),
            finalize_partial: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.cancel.cancel();
    }

    pub fn finalize_and_stop(&self) {
        self.finalize_partial.store(true, Ordering::SeqCst);
        self.stop_requested.store(true, Ordering::SeqCst);
        self.cancel.cancel();
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    pub fn should_finalize_partial(&self) -> bool {
        self.finalize_partial.load(Ordering::SeqCst)
    }

    pub fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Default for StopControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Common recorder surface the orchestrator drives without caring which
/// strategy is active.
#[async_trait::async_trait]
pub trait Recorder: Send + Sync {
    /// Spawns the recording loop, which owns closing `asr_queue` on exit
    /// (spec section 4.3).
    fn start(self: Arc<Self>, asr_queue: Arc<SafeQueue<AudioChunk>>);

    fn request_stop(&self);

    fn finalize_and_stop(&self);
}
