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

//! Mock transcriber: the fallback used for graceful ASR degradation (spec
//! section 4.4). Returns a deterministic, non-empty result so the pipeline
//! keeps producing well-formed artifacts when the real ASR is unreachable.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Map;

use super::{TranscribeOptions, Transcriber, TranscriptSegment, TranscriptionResult};

#[derive(Default)]
pub struct MockTranscriber;

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(
        &self,
        _wav_path: &Path,
        _options: &TranscribeOptions,
    ) -> Result<TranscriptionResult> {
        Ok(TranscriptionResult {
            segments: vec![TranscriptSegment {
                start: 0.0,
                end: 0.0,
                text: "[transcription unavailable]".to_string(),
                extra: Map::new(),
            }],
            language: None,
            duration: None,
        })
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
