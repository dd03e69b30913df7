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

//! Local dependency executor: directly spawns the requested process.
//!
//! Grounded on the teacher's `meeting_recorder.rs::start_ffmpeg_recording`
//! process-spawning idiom, generalized from a fixed ffmpeg invocation to an
//! arbitrary allow-listed command with captured stdout/stderr and a
//! cooperative timeout.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{ensure_command_allowed, CommandRequest, CommandResponse, DependencyExecutor};

pub struct LocalExecutor {
    python_binary: String,
    diarization_script: PathBuf,
    embedding_script: PathBuf,
    allowed_commands: HashSet<String>,
}

impl LocalExecutor {
    pub fn new(
        python_binary: String,
        diarization_script: PathBuf,
        embedding_script: PathBuf,
        allowed_commands: HashSet<String>,
    ) -> Self {
        Self {
            python_binary,
            diarization_script,
            embedding_script,
            allowed_commands,
        }
    }
}

#[async_trait]
impl DependencyExecutor for LocalExecutor {
    async fn execute_command(&self, req: &CommandRequest) -> Result<CommandResponse> {
        ensure_command_allowed(&self.allowed_commands, &req.command)?;

        let mut cmd = Command::new(&req.command);
        cmd.args(&req.args);
        for (k, v) in &req.env {
            cmd.env(k, v);
        }
        if let Some(dir) = &req.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let start = Instant::now();
        let mut child = cmd.spawn().context("failed to spawn local dependency command")?;

        if let Some(stdin_data) = &req.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                let _ = stdin.write_all(stdin_data).await;
            }
        } else {
            drop(child.stdin.take());
        }

        let timeout = std::time::Duration::from_secs(req.timeout_seconds.max(1));
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.context("local dependency command failed")?,
            Err(_) => {
                anyhow::bail!("local dependency command '{}' timed out after {:?}", req.command, timeout);
            }
        };

        Ok(CommandResponse {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration_seconds: start.elapsed().as_secs_f64(),
        })
    }

    async fn health_check(&self) -> Result<()> {
        ensure_command_allowed(&self.allowed_commands, &self.python_binary)?;
        let output = Command::new(&self.python_binary)
            .arg("--version")
            .output()
            .await
            .context("local python binary not reachable")?;
        if !output.status.success() {
            anyhow::bail!("local python binary health probe exited with {}", output.status);
        }
        Ok(())
    }

    fn python_binary(&self) -> &str {
        &self.python_binary
    }

    fn diarization_script(&self) -> &Path {
        &self.diarization_script
    }

    fn embedding_script(&self) -> &Path {
        &self.embedding_script
    }
}
