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

//! Fallback dependency executor: tries the remote service, and on a
//! classified remote-side failure retries once locally, per spec section
//! 4.6. The combined outcome is reported as a single success/failure; the
//! fallback event itself is counted for degradation-level metrics.

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::remote::is_remote_failure;
use super::{CommandRequest, CommandResponse, DependencyExecutor, LocalExecutor, RemoteExecutor};
use crate::types::Metrics;

pub struct FallbackExecutor {
    remote: RemoteExecutor,
    local: LocalExecutor,
    metrics: Arc<Metrics>,
}

impl FallbackExecutor {
    pub fn new(remote: RemoteExecutor, local: LocalExecutor, metrics: Arc<Metrics>) -> Self {
        Self {
            remote,
            local,
            metrics,
        }
    }
}

#[async_trait]
impl DependencyExecutor for FallbackExecutor {
    async fn execute_command(&self, req: &CommandRequest) -> Result<CommandResponse> {
        match self.remote.execute_command(req).await {
            Ok(resp) => Ok(resp),
            Err(err) if is_remote_failure(&err) => {
                self.metrics.dependency_fallback_events.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %err, command = %req.command, "remote dependency service failed, retrying locally");
                self.local.execute_command(req).await
            }
            Err(err) => Err(err),
        }
    }

    async fn health_check(&self) -> Result<()> {
        if self.remote.health_check().await.is_ok() {
            return Ok(());
        }
        self.local.health_check().await
    }

    fn python_binary(&self) -> &str {
        self.local.python_binary()
    }

    fn diarization_script(&self) -> &Path {
        self.local.diarization_script()
    }

    fn embedding_script(&self) -> &Path {
        self.local.embedding_script()
    }

    /// The remote leg is attempted first, so inputs still need to live
    /// under the shared volume even though a fallback may run locally.
    fn requires_shared_volume(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::PathManager;
    use mockito::Server;

    #[tokio::test]
    async fn falls_back_to_local_on_connection_failure() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathManager::new(dir.path(), dir.path().join("shared"));

        // Unreachable remote (closed port).
        let remote = RemoteExecutor::new(
            "http://127.0.0.1:1".to_string(),
            "python3".to_string(),
            dir.path().join("diarize.py"),
            dir.path().join("embed.py"),
            paths.clone(),
        );
        let mut allowed = std::collections::HashSet::new();
        allowed.insert("echo".to_string());
        let local = LocalExecutor::new(
            "python3".to_string(),
            dir.path().join("diarize.py"),
            dir.path().join("embed.py"),
            allowed,
        );
        let metrics = Metrics::new();
        let executor = FallbackExecutor::new(remote, local, metrics.clone());

        let req = CommandRequest {
            command: "echo".to_string(),
            args: vec!["hi".to_string()],
            env: Default::default(),
            working_dir: None,
            timeout_seconds: 5,
            stdin: None,
        };
        let resp = executor.execute_command(&req).await.unwrap();
        assert_eq!(resp.exit_code, 0);
        assert!(resp.stdout.contains("hi"));
        assert_eq!(metrics.dependency_fallback_events.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn does_not_fall_back_on_non_remote_failure() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/v1/execute")
            .with_status(400)
            .with_body("bad request")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let paths = PathManager::new(dir.path(), dir.path().join("shared"));
        let remote = RemoteExecutor::new(
            server.url(),
            "python3".to_string(),
            dir.path().join("diarize.py"),
            dir.path().join("embed.py"),
            paths,
        );
        let local = LocalExecutor::new(
            "python3".to_string(),
            dir.path().join("diarize.py"),
            dir.path().join("embed.py"),
            std::collections::HashSet::new(),
        );
        let metrics = Metrics::new();
        let executor = FallbackExecutor::new(remote, local, metrics.clone());

        let req = CommandRequest {
            command: "echo".to_string(),
            args: vec![],
            env: Default::default(),
            working_dir: None,
            timeout_seconds: 5,
            stdin: None,
        };
        assert!(executor.execute_command(&req).await.is_err());
        assert_eq!(metrics.dependency_fallback_events.load(Ordering::Relaxed), 0);
    }
}
