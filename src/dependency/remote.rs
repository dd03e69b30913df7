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

//! Remote dependency executor: POSTs the command request to the dependency
//! service and blocks on its JSON response, per spec sections 4.6 and 6.
//!
//! File-sharing discipline (copying audio/speakers files under
//! `dependency_shared_volume` before a remote call) is the pipeline
//! worker's responsibility, using [`PathManager`] — this executor only
//! speaks the wire protocol.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;

use super::{CommandRequest, CommandResponse, DependencyExecutor};
use crate::paths::PathManager;

pub struct RemoteExecutor {
    client: Client,
    base_url: String,
    python_binary: String,
    diarization_script: PathBuf,
    embedding_script: PathBuf,
    #[allow(dead_code)]
    paths: PathManager,
}

impl RemoteExecutor {
    pub fn new(
        base_url: String,
        python_binary: String,
        diarization_script: PathBuf,
        embedding_script: PathBuf,
        paths: PathManager,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url,
            python_binary,
            diarization_script,
            embedding_script,
            paths,
        }
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), suffix)
    }
}

/// Classifies an error as a remote-side failure the fallback executor
/// should retry locally for, per spec section 4.6: network errors,
/// timeouts, and 5xx responses.
pub fn is_remote_failure(err: &anyhow::Error) -> bool {
    if let Some(reqwest_err) = err.downcast_ref::<reqwest::Error>() {
        return reqwest_err.is_connect() || reqwest_err.is_timeout() || reqwest_err.is_request();
    }
    err.to_string().contains("remote dependency service returned 5")
}

#[async_trait]
impl DependencyExecutor for RemoteExecutor {
    async fn execute_command(&self, req: &CommandRequest) -> Result<CommandResponse> {
        let response = self
            .client
            .post(self.url("/api/v1/execute"))
            .timeout(Duration::from_secs(req.timeout_seconds.max(1)) + Duration::from_secs(10))
            .json(req)
            .send()
            .await
            .context("remote dependency service request failed")?;

        if response.status().is_server_error() {
            bail!("remote dependency service returned {}", response.status());
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("remote dependency service returned {status}: {body}");
        }

        let resp: CommandResponse = response
            .json()
            .await
            .context("failed to parse remote dependency service response")?;
        Ok(resp)
    }

    async fn health_check(&self) -> Result<()> {
        let response = self
            .client
            .get(self.url("/api/v1/health"))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .context("remote dependency service health probe failed to connect")?;
        if !response.status().is_success() {
            bail!("remote dependency service health probe returned {}", response.status());
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

    fn requires_shared_volume(&self) -> bool {
        true
    }
}
