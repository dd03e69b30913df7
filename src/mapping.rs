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

//! Speaker-label mapping, spec section 4.8: rewrites speaker ids in a
//! diarization speakers file using the optional `local_original_mapping`
//! and `mapping` tables the embedding script's output may carry.
//!
//! This is plain JSON transformation with no teacher precedent (the
//! teacher's diarization plugins speak a different label scheme
//! entirely — see `plugins/advanced_diarization.rs`), so it's built
//! directly from spec section 4.8 using `serde_json`, the teacher's JSON
//! crate throughout.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpeakerSegment {
    pub start: f64,
    pub end: f64,
    pub speaker: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpeakersFile {
    pub segments: Vec<SpeakerSegment>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmbeddingMappings {
    #[serde(default)]
    pub local_original_mapping: HashMap<String, String>,
    #[serde(default)]
    pub mapping: HashMap<String, String>,
}

pub fn read_embedding_mappings(path: &Path) -> anyhow::Result<EmbeddingMappings> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw).unwrap_or_default())
}

fn rewrite_speakers(mut file: SpeakersFile, table: &HashMap<String, String>) -> (SpeakersFile, bool) {
    let mut changed = false;
    for segment in &mut file.segments {
        if let Some(renamed) = table.get(&segment.speaker) {
            if renamed != &segment.speaker {
                segment.speaker = renamed.clone();
                changed = true;
            }
        }
    }
    (file, changed)
}

/// Applies the per-chunk local mapping unconditionally when present,
/// writing `chunk_NNNN_speakers_mapped.json`. Returns the original path
/// untouched when `local_original_mapping` is absent or empty, per spec
/// section 4.8.
pub fn apply_local_mapping(
    speakers_path: &Path,
    mappings: &EmbeddingMappings,
    mapped_out_path: &Path,
) -> anyhow::Result<std::path::PathBuf> {
    if mappings.local_original_mapping.is_empty() {
        return Ok(speakers_path.to_path_buf());
    }

    let raw = std::fs::read_to_string(speakers_path)?;
    let file: SpeakersFile = serde_json::from_str(&raw)?;
    let (mapped, _changed) = rewrite_speakers(file, &mappings.local_original_mapping);
    let serialized = serde_json::to_string_pretty(&mapped)?;
    std::fs::write(mapped_out_path, serialized)?;
    Ok(mapped_out_path.to_path_buf())
}

/// Applies the cross-chunk global mapping on top of the locally-mapped
/// speakers file. Writes `chunk_NNNN_speakers_mapped_global.json` only if
/// at least one label actually changes; otherwise returns the input path
/// unchanged, per spec section 4.8.
pub fn apply_global_mapping(
    locally_mapped_path: &Path,
    mappings: &EmbeddingMappings,
    global_out_path: &Path,
) -> anyhow::Result<std::path::PathBuf> {
    if mappings.mapping.is_empty() {
        return Ok(locally_mapped_path.to_path_buf());
    }

    let raw = std::fs::read_to_string(locally_mapped_path)?;
    let file: SpeakersFile = serde_json::from_str(&raw)?;
    let (mapped, changed) = rewrite_speakers(file, &mappings.mapping);
    if !changed {
        return Ok(locally_mapped_path.to_path_buf());
    }
    let serialized = serde_json::to_string_pretty(&mapped)?;
    std::fs::write(global_out_path, serialized)?;
    Ok(global_out_path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn write_speakers(path: &Path, speakers: &[(&str, f64, f64)]) {
        let segments: Vec<SpeakerSegment> = speakers
            .iter()
            .map(|(s, start, end)| SpeakerSegment {
                start: *start,
                end: *end,
                speaker: s.to_string(),
                extra: Default::default(),
            })
            .collect();
        let file = SpeakersFile {
            segments,
            extra: Default::default(),
        };
        std::fs::write(path, serde_json::to_string(&file).unwrap()).unwrap();
    }

    #[test]
    fn local_mapping_rewrites_speaker_ids_only() {
        let dir = tempfile::tempdir().unwrap();
        let speakers = dir.path().join("chunk_0000_speakers.json");
        write_speakers(&speakers, &[("SPEAKER_00", 0.0, 5.0)]);

        let mut local = HashMap::new();
        local.insert("SPEAKER_00".to_string(), "SPEAKER_A".to_string());
        let mappings = EmbeddingMappings {
            local_original_mapping: local,
            mapping: HashMap::new(),
        };

        let out = dir.path().join("chunk_0000_speakers_mapped.json");
        let result_path = apply_local_mapping(&speakers, &mappings, &out).unwrap();
        assert_eq!(result_path, out);

        let result: SpeakersFile = serde_json::from_str(&std::fs::read_to_string(out).unwrap()).unwrap();
        assert_eq!(result.segments[0].speaker, "SPEAKER_A");
        assert_eq!(result.segments[0].start, 0.0);
        assert_eq!(result.segments[0].end, 5.0);
    }

    #[test]
    fn local_mapping_absent_returns_original_path() {
        let dir = tempfile::tempdir().unwrap();
        let speakers = dir.path().join("chunk_0000_speakers.json");
        write_speakers(&speakers, &[("SPEAKER_00", 0.0, 5.0)]);

        let mappings = EmbeddingMappings::default();
        let out = dir.path().join("chunk_0000_speakers_mapped.json");
        let result_path = apply_local_mapping(&speakers, &mappings, &out).unwrap();
        assert_eq!(result_path, speakers);
        assert!(!out.exists());
    }

    #[test]
    fn global_mapping_writes_only_when_a_label_changes() {
        let dir = tempfile::tempdir().unwrap();
        let mapped = dir.path().join("chunk_0001_speakers_mapped.json");
        write_speakers(&mapped, &[("SPEAKER_B", 0.0, 5.0)]);

        let mut global = HashMap::new();
        global.insert("SPEAKER_B".to_string(), "SPEAKER_A".to_string());
        let mappings = EmbeddingMappings {
            local_original_mapping: HashMap::new(),
            mapping: global,
        };
        let out = dir.path().join("chunk_0001_speakers_mapped_global.json");
        let result_path = apply_global_mapping(&mapped, &mappings, &out).unwrap();
        assert_eq!(result_path, out);
        let result: SpeakersFile = serde_json::from_str(&std::fs::read_to_string(out).unwrap()).unwrap();
        assert_eq!(result.segments[0].speaker, "SPEAKER_A");
    }

    #[test]
    fn global_mapping_empty_returns_prior_path_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let mapped = dir.path().join("chunk_0001_speakers_mapped.json");
        write_speakers(&mapped, &[("SPEAKER_A", 0.0, 5.0)]);

        let mappings = EmbeddingMappings::default();
        let out = dir.path().join("chunk_0001_speakers_mapped_global.json");
        let result_path = apply_global_mapping(&mapped, &mappings, &out).unwrap();
        assert_eq!(result_path, mapped);
        assert!(!out.exists());
    }

    #[test]
    fn mapping_preserves_segment_order_and_start_end() {
        let dir = tempfile::tempdir().unwrap();
        let speakers = dir.path().join("chunk_0000_speakers.json");
        write_speakers(
            &speakers,
            &[("SPEAKER_00", 0.0, 2.0), ("SPEAKER_01", 2.0, 5.0), ("SPEAKER_00", 5.0, 8.0)],
        );
        let mut local = HashMap::new();
        local.insert("SPEAKER_00".to_string(), "SPEAKER_A".to_string());
        local.insert("SPEAKER_01".to_string(), "SPEAKER_B".to_string());
        let mappings = EmbeddingMappings {
            local_original_mapping: local,
            mapping: HashMap::new(),
        };
        let out = dir.path().join("chunk_0000_speakers_mapped.json");
        apply_local_mapping(&speakers, &mappings, &out).unwrap();
        let result: SpeakersFile = serde_json::from_str(&std::fs::read_to_string(out).unwrap()).unwrap();
        assert_eq!(result.segments.len(), 3);
        assert_eq!(
            result.segments.iter().map(|s| (s.start, s.end)).collect::<Vec<_>>(),
            vec![(0.0, 2.0), (2.0, 5.0), (5.0, 8.0)]
        );
        assert_eq!(result.segments[0].speaker, "SPEAKER_A");
        assert_eq!(result.segments[1].speaker, "SPEAKER_B");
        assert_eq!(result.segments[2].speaker, "SPEAKER_A");
    }
}
