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

//! Merge worker, spec section 4.7.4: applies the local then global
//! speaker-label mapping, runs the `merge-segments` CLI, and scrubs blank
//! lines from its output.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::process::Command;

use crate::mapping::{self, EmbeddingMappings};
use crate::paths::PathManager;
use crate::queue::SafeQueue;
use crate::types::{EmbeddingResult, Metrics};

pub async fn run(
    merge_queue: Arc<SafeQueue<EmbeddingResult>>,
    paths: PathManager,
    merge_binary_path: String,
    metrics: Arc<Metrics>,
) {
    while let Some(item) = merge_queue.pop().await {
        let chunk_id = item.chunk.id;
        match process_one(&item, &paths, &merge_binary_path).await {
            Ok(()) => {
                metrics.merge_success.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                metrics.merge_failure.fetch_add(1, Ordering::Relaxed);
                tracing::error!(chunk_id, error = %err, "merge worker failed, no merged.txt for this chunk");
            }
        }
    }
}

async fn process_one(item: &EmbeddingResult, paths: &PathManager, merge_binary_path: &str) -> anyhow::Result<()> {
    let mappings = mapping::read_embedding_mappings(&item.embeddings_json).unwrap_or_else(|_| EmbeddingMappings::default());

    let mapped_local = mapping::apply_local_mapping(
        &item.speakers_json,
        &mappings,
        &paths.speakers_mapped(item.chunk.id),
    )?;
    let mapped_global = mapping::apply_global_mapping(
        &mapped_local,
        &mappings,
        &paths.speakers_mapped_global(item.chunk.id),
    )?;

    let merged_path = paths.merged(item.chunk.id);
    run_merge_cli(merge_binary_path, &item.segments_json, &mapped_global, &merged_path).await?;
    scrub_blank_lines(&merged_path).await?;
    Ok(())
}

/// `merge-segments --segments-file <segments.json> --speaker-file
/// <speakers.json>`, capturing stdout to `merged_path` (spec section 6).
async fn run_merge_cli(binary_path: &str, segments_json: &Path, speaker_file: &Path, merged_path: &Path) -> anyhow::Result<()> {
    let output = Command::new(binary_path)
        .arg("--segments-file")
        .arg(segments_json)
        .arg("--speaker-file")
        .arg(speaker_file)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        anyhow::bail!(
            "merge-segments exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    tokio::fs::write(merged_path, output.stdout).await?;
    Ok(())
}

/// Drops empty/whitespace-only lines and writes back with a trailing
/// newline; leaves the file untouched if that would make it empty (spec
/// section 4.7.4).
async fn scrub_blank_lines(merged_path: &PathBuf) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(merged_path).await?;
    let kept: Vec<&str> = raw.lines().filter(|line| !line.trim().is_empty()).collect();
    if kept.is_empty() {
        return Ok(());
    }
    let mut scrubbed = kept.join("\n");
    scrubbed.push('\n');
    tokio::fs::write(merged_path, scrubbed).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scrub_drops_blank_lines_and_adds_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("merged.txt");
        tokio::fs::write(&path, "SPEAKER_A: hello\n\n   \nSPEAKER_B: world\n")
            .await
            .unwrap();
        scrub_blank_lines(&path).await.unwrap();
        let result = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(result, "SPEAKER_A: hello\nSPEAKER_B: world\n");
    }

    #[tokio::test]
    async fn scrub_leaves_would_be_empty_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("merged.txt");
        tokio::fs::write(&path, "\n   \n\n").await.unwrap();
        scrub_blank_lines(&path).await.unwrap();
        let result = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(result, "\n   \n\n");
    }
}
