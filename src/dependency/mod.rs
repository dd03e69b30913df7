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

//! `DependencyExecutor`: runs external commands (FFmpeg, diarization
//! script, embedding script) locally, remotely, or with fallback — spec
//! section 4.6.

mod fallback;
mod local;
mod remote;

pub use fallback::FallbackExecutor;
pub use local::LocalExecutor;
pub use remote::RemoteExecutor;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use std::sync::Arc;

use crate::config::{Config, DependencyMode};
use crate::error::OrchestratorError;
use crate::paths::PathManager;
use crate::types::Metrics;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    pub working_dir: Option<PathBuf>,
    pub timeout_seconds: u64,
    pub stdin: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone)]
pub struct DiarizationOpts {
    pub device: String,
    pub enable_offline: bool,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct EmbeddingOpts {
    pub device: String,
    pub threshold: f32,
    pub auto_lower_min: f32,
    pub auto_lower_step: f32,
    pub hf_token: String,
    pub existing_embeddings: Option<PathBuf>,
    pub enable_offline: bool,
    pub timeout: Duration,
}

/// Checks `command` against the configured allow-list, per spec section 4.6
/// ("`command` must be in `allowed_commands`").
pub fn ensure_command_allowed(
    allowed_commands: &std::collections::HashSet<String>,
    command: &str,
) -> Result<()> {
    if allowed_commands.contains(command) {
        Ok(())
    } else {
        bail!("command '{command}' is not in allowed_commands")
    }
}

#[async_trait]
pub trait DependencyExecutor: Send + Sync {
    async fn execute_command(&self, req: &CommandRequest) -> Result<CommandResponse>;

    async fn health_check(&self) -> Result<()>;

    fn python_binary(&self) -> &str;
    fn diarization_script(&self) -> &Path;
    fn embedding_script(&self) -> &Path;

    /// Whether this executor needs its input/output paths to live under
    /// `dependency_shared_volume` before it runs (spec section 4.6's file
    /// sharing discipline). True for remote and fallback executors, false
    /// for local ones — the pipeline workers use this to decide whether a
    /// chunk's files need copying in first.
    fn requires_shared_volume(&self) -> bool {
        false
    }

    /// High-level wrapper constructing the diarization script's argv per
    /// spec section 6: `python <script> --input <wav> --device <device>
    /// [--offline]`, with `HF_HUB_OFFLINE=1` set when offline mode is on.
    async fn run_diarization(
        &self,
        audio_path: &Path,
        output_speakers_path: &Path,
        opts: &DiarizationOpts,
    ) -> Result<()> {
        let mut args = vec![
            self.diarization_script().to_string_lossy().into_owned(),
            "--input".to_string(),
            audio_path.to_string_lossy().into_owned(),
            "--device".to_string(),
            opts.device.clone(),
        ];
        let mut env = HashMap::new();
        if opts.enable_offline {
            args.push("--offline".to_string());
            env.insert("HF_HUB_OFFLINE".to_string(), "1".to_string());
        }

        let req = CommandRequest {
            command: self.python_binary().to_string(),
            args,
            env,
            working_dir: None,
            timeout_seconds: opts.timeout.as_secs(),
            stdin: None,
        };

        let resp = self.execute_command(&req).await?;
        if resp.exit_code != 0 {
            return Err(OrchestratorError::PyannoteFailed(resp.stderr).into());
        }
        tokio::fs::write(output_speakers_path, resp.stdout).await?;
        Ok(())
    }

    /// High-level wrapper constructing the embedding script's argv per spec
    /// section 6.
    async fn run_embeddings(
        &self,
        audio_path: &Path,
        speakers_path: &Path,
        output_embeddings_path: &Path,
        opts: &EmbeddingOpts,
    ) -> Result<()> {
        let mut args = vec![
            self.embedding_script().to_string_lossy().into_owned(),
            "--audio".to_string(),
            audio_path.to_string_lossy().into_owned(),
            "--speakers-json".to_string(),
            speakers_path.to_string_lossy().into_owned(),
            "--output".to_string(),
            output_embeddings_path.to_string_lossy().into_owned(),
            "--device".to_string(),
            opts.device.clone(),
            "--threshold".to_string(),
            opts.threshold.to_string(),
            "--auto-lower-threshold".to_string(),
            "--auto-lower-min".to_string(),
            opts.auto_lower_min.to_string(),
            "--auto-lower-step".to_string(),
            opts.auto_lower_step.to_string(),
            "--hf_token".to_string(),
            opts.hf_token.clone(),
        ];
        if let Some(existing) = &opts.existing_embeddings {
            args.push("--existing-embeddings".to_string());
            args.push(existing.to_string_lossy().into_owned());
        }
        if opts.enable_offline {
            args.push("--offline".to_string());
        }

        let req = CommandRequest {
            command: self.python_binary().to_string(),
            args,
            env: HashMap::new(),
            working_dir: None,
            timeout_seconds: opts.timeout.as_secs(),
            stdin: None,
        };

        let resp = self.execute_command(&req).await?;
        if resp.exit_code != 0 {
            bail!("embedding script failed: {}", resp.stderr);
        }
        // The script itself writes `output_embeddings_path` as a side
        // effect; nothing further to persist here.
        Ok(())
    }
}

/// Builds the configured dependency executor: local, remote, or
/// remote-with-local-fallback, per spec section 4.6.
pub fn build(config: &Config, paths: &PathManager, metrics: Arc<Metrics>) -> Box<dyn DependencyExecutor> {
    let local = || {
        LocalExecutor::new(
            config.python_binary_path.clone(),
            config.diarization_script_path.clone(),
            config.embedding_script_path.clone(),
            config.allowed_commands.clone(),
        )
    };
    let remote = || {
        RemoteExecutor::new(
            config.dependency_service_url.clone(),
            config.python_binary_path.clone(),
            config.diarization_script_path.clone(),
            config.embedding_script_path.clone(),
            paths.clone(),
        )
    };

    match config.dependency_mode {
        DependencyMode::Local => Box::new(local()),
        DependencyMode::Remote => Box::new(remote()),
        DependencyMode::Fallback => Box::new(FallbackExecutor::new(remote(), local(), metrics)),
    }
}
