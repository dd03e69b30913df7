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

//! `PathManager`: the single place that maps (session id, chunk id, kind)
//! to absolute filesystem paths. Spec section 4.2 requires every filesystem
//! reference in the core to go through here rather than building paths ad
//! hoc — this keeps the filename regex in spec section 6 as the one source
//! of truth for artifact naming.

use std::path::{Path, PathBuf};

use regex::Regex;

use self::once_cell_regex::chunk_regex;

/// Kind of artifact produced for a single chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Wav,
    Segments,
    Speakers,
    SpeakersMapped,
    SpeakersMappedGlobal,
    Embeddings,
    Merged,
}

impl ArtifactKind {
    fn suffix(self) -> &'static str {
        match self {
            ArtifactKind::Wav => "",
            ArtifactKind::Segments => "_segments",
            ArtifactKind::Speakers => "_speakers",
            ArtifactKind::SpeakersMapped => "_speakers_mapped",
            ArtifactKind::SpeakersMappedGlobal => "_speakers_mapped_global",
            ArtifactKind::Embeddings => "_embeddings",
            ArtifactKind::Merged => "_merged",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Wav => "wav",
            ArtifactKind::Merged => "txt",
            _ => "json",
        }
    }
}

/// Zero-pads a chunk id to the mandatory 4-digit width (spec section 3,
/// invariant 1). Ids outside `0..=9999` still format (more digits), which is
/// deliberate: the regex constrains *parsing*, not *writing*, so a runaway
/// session degrades by failing to resume/scan rather than silently
/// truncating an id.
pub fn chunk_stem(chunk_id: u32) -> String {
    format!("chunk_{chunk_id:04}")
}

pub fn chunk_filename(chunk_id: u32, kind: ArtifactKind) -> String {
    format!(
        "{}{}.{}",
        chunk_stem(chunk_id),
        kind.suffix(),
        kind.extension()
    )
}

/// Parses a `chunk_NNNN*.*` filename back into its id and kind, per the
/// regex in spec section 6.
pub fn parse_chunk_filename(name: &str) -> Option<(u32, ArtifactKind)> {
    let caps = chunk_regex().captures(name)?;
    let id: u32 = caps.get(1)?.as_str().parse().ok()?;
    let kind = match caps.get(2).map(|m| m.as_str()) {
        None => ArtifactKind::Wav,
        Some("_segments") => ArtifactKind::Segments,
        Some("_speakers") => ArtifactKind::Speakers,
        Some("_speakers_mapped") => ArtifactKind::SpeakersMapped,
        Some("_speakers_mapped_global") => ArtifactKind::SpeakersMappedGlobal,
        Some("_embeddings") => ArtifactKind::Embeddings,
        Some("_merged") => ArtifactKind::Merged,
        Some(_) => return None,
    };
    Some((id, kind))
}

#[derive(Debug, Clone)]
pub struct PathManager {
    output_dir: PathBuf,
    dependency_shared_volume: PathBuf,
}

impl PathManager {
    pub fn new(output_dir: impl Into<PathBuf>, dependency_shared_volume: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            dependency_shared_volume: dependency_shared_volume.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn session_id(&self) -> String {
        self.output_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "session".to_string())
    }

    fn path(&self, chunk_id: u32, kind: ArtifactKind) -> PathBuf {
        self.output_dir.join(chunk_filename(chunk_id, kind))
    }

    pub fn wav(&self, chunk_id: u32) -> PathBuf {
        self.path(chunk_id, ArtifactKind::Wav)
    }

    pub fn wav_partial(&self, chunk_id: u32) -> PathBuf {
        let mut p = self.wav(chunk_id).into_os_string();
        p.push(".partial");
        PathBuf::from(p)
    }

    pub fn segments(&self, chunk_id: u32) -> PathBuf {
        self.path(chunk_id, ArtifactKind::Segments)
    }

    pub fn speakers(&self, chunk_id: u32) -> PathBuf {
        self.path(chunk_id, ArtifactKind::Speakers)
    }

    pub fn speakers_mapped(&self, chunk_id: u32) -> PathBuf {
        self.path(chunk_id, ArtifactKind::SpeakersMapped)
    }

    pub fn speakers_mapped_global(&self, chunk_id: u32) -> PathBuf {
        self.path(chunk_id, ArtifactKind::SpeakersMappedGlobal)
    }

    pub fn embeddings(&self, chunk_id: u32) -> PathBuf {
        self.path(chunk_id, ArtifactKind::Embeddings)
    }

    pub fn merged(&self, chunk_id: u32) -> PathBuf {
        self.path(chunk_id, ArtifactKind::Merged)
    }

    pub fn merged_all(&self) -> PathBuf {
        self.output_dir.join("merged_all.txt")
    }

    /// Selects the most-resolved speakers file that exists on disk for a
    /// chunk, per spec section 4.8's asymmetric preference order: global >
    /// local-mapped > raw. This helper is the *only* place this selection
    /// should live (spec section 9).
    pub fn most_resolved_speakers(&self, chunk_id: u32) -> PathBuf {
        let global = self.speakers_mapped_global(chunk_id);
        if global.exists() {
            return global;
        }
        let mapped = self.speakers_mapped(chunk_id);
        if mapped.exists() {
            return mapped;
        }
        self.speakers(chunk_id)
    }

    /// Meeting subdirectory inside the dependency shared volume for one
    /// session, created on demand.
    pub fn shared_meeting_dir(&self) -> PathBuf {
        self.dependency_shared_volume.join(self.session_id())
    }

    pub fn ensure_shared_meeting_dir(&self) -> std::io::Result<PathBuf> {
        let dir = self.shared_meeting_dir();
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Path inside the shared volume for a file named like `name` (e.g. an
    /// input WAV or speakers JSON copied in for a remote dependency call).
    pub fn shared_path(&self, name: &str) -> PathBuf {
        self.shared_meeting_dir().join(name)
    }

    pub fn is_under_shared_volume(&self, path: &Path) -> bool {
        path.starts_with(&self.dependency_shared_volume)
    }

    pub fn shared_audio_path(&self, chunk_id: u32) -> PathBuf {
        self.shared_path(&chunk_filename(chunk_id, ArtifactKind::Wav))
    }

    pub fn shared_speakers_path(&self, chunk_id: u32) -> PathBuf {
        self.shared_path(&chunk_filename(chunk_id, ArtifactKind::Speakers))
    }

    pub fn shared_embeddings_path(&self, chunk_id: u32) -> PathBuf {
        self.shared_path(&chunk_filename(chunk_id, ArtifactKind::Embeddings))
    }
}

/// Tiny module so the filename regex is compiled exactly once without
/// pulling in a `lazy_static`/`once_cell` dependency the rest of the crate
/// doesn't otherwise need.
mod once_cell_regex {
    use super::Regex;
    use std::sync::OnceLock;

    pub fn chunk_regex() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| {
            Regex::new(
                r"^chunk_([0-9]{4})(_segments|_speakers(?:_mapped(?:_global)?)?|_embeddings|_merged)?\.(wav|json|txt)$",
            )
            .expect("static regex is valid")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_kind() {
        for (kind, suffix) in [
            (ArtifactKind::Wav, ""),
            (ArtifactKind::Segments, "_segments"),
            (ArtifactKind::Speakers, "_speakers"),
            (ArtifactKind::SpeakersMapped, "_speakers_mapped"),
            (ArtifactKind::SpeakersMappedGlobal, "_speakers_mapped_global"),
            (ArtifactKind::Embeddings, "_embeddings"),
            (ArtifactKind::Merged, "_merged"),
        ] {
            let name = chunk_filename(42, kind);
            assert!(name.contains(suffix) || suffix.is_empty());
            let (id, parsed_kind) = parse_chunk_filename(&name).expect("should parse");
            assert_eq!(id, 42);
            assert_eq!(parsed_kind, kind);
        }
    }

    #[test]
    fn rejects_non_matching_names() {
        assert!(parse_chunk_filename("chunk_42.wav").is_none()); // not zero padded to 4
        assert!(parse_chunk_filename("chunk_0042_other.json").is_none());
        assert!(parse_chunk_filename("not_a_chunk.wav").is_none());
    }

    #[test]
    fn most_resolved_prefers_global_then_mapped_then_raw() {
        let dir = tempfile::tempdir().unwrap();
        let pm = PathManager::new(dir.path(), dir.path().join("shared"));
        std::fs::write(pm.speakers(0), "{}").unwrap();
        assert_eq!(pm.most_resolved_speakers(0), pm.speakers(0));

        std::fs::write(pm.speakers_mapped(0), "{}").unwrap();
        assert_eq!(pm.most_resolved_speakers(0), pm.speakers_mapped(0));

        std::fs::write(pm.speakers_mapped_global(0), "{}").unwrap();
        assert_eq!(pm.most_resolved_speakers(0), pm.speakers_mapped_global(0));
    }

    #[test]
    fn chunk_ids_full_range_round_trip() {
        for id in [0u32, 1, 9999] {
            let name = chunk_filename(id, ArtifactKind::Wav);
            assert_eq!(parse_chunk_filename(&name).unwrap().0, id);
        }
    }
}
