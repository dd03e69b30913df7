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

//! Orchestrator configuration, loaded from the process environment.
//!
//! Follows the teacher's `Config::load()` shape: `dotenv::dotenv().ok()`
//! first, then every field read via `env::var` with an explicit default.

use std::collections::HashSet;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{OrchestratorError, OrchestratorResult};

/// How the configured `whisper_mode` resolves to a concrete transcriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriberKind {
    Http,
    Cli,
}

/// How the dependency executor reaches the diarization/embedding scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyMode {
    Local,
    Remote,
    Fallback,
}

impl DependencyMode {
    fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "remote" => DependencyMode::Remote,
            "fallback" => DependencyMode::Fallback,
            _ => DependencyMode::Local,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub output_dir: PathBuf,
    pub record_chunk_duration: Duration,
    pub use_continuous: bool,
    pub ffmpeg_device_name: String,
    pub ffmpeg_binary_path: String,
    pub python_binary_path: String,

    pub whisper_mode: String,
    pub whisper_api_url: String,
    pub whisper_model: String,
    pub whisper_temperature: f32,
    /// Empty, "0" or "0s" disables segmentation (spec section 3).
    pub whisper_segments: String,

    pub device_default: String,
    pub diarization_script_path: PathBuf,
    pub embedding_script_path: PathBuf,
    pub embedding_device_default: String,
    pub embedding_threshold: f32,
    pub embedding_auto_lower_min: f32,
    pub embedding_auto_lower_step: f32,
    pub initial_embeddings_path: Option<PathBuf>,
    pub hf_token: String,

    pub enable_offline: bool,
    pub enable_degradation: bool,
    pub health_check_interval: Duration,
    pub health_check_fail_threshold: u32,

    pub dependency_mode: DependencyMode,
    pub dependency_service_url: String,
    pub dependency_shared_volume: PathBuf,
    pub dependency_timeout: Duration,
    pub allowed_commands: HashSet<String>,

    pub merge_segments_binary_path: String,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn env_duration_secs(key: &str, default_secs: u64) -> Duration {
    Duration::from_secs(env_parse(key, default_secs))
}

impl Config {
    pub fn load() -> OrchestratorResult<Self> {
        dotenv::dotenv().ok();

        let output_dir = PathBuf::from(env_or("OUTPUT_DIR", "./sessions/default"));
        std::fs::create_dir_all(&output_dir)
            .map_err(|e| OrchestratorError::EnvNotReady(format!("output_dir: {e}")))?;

        let allowed_commands: HashSet<String> = env_or(
            "ALLOWED_COMMANDS",
            "ffmpeg,whisper,faster-whisper,merge-segments",
        )
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

        let dependency_shared_volume =
            PathBuf::from(env_or("DEPENDENCY_SHARED_VOLUME", "./sessions/.shared"));

        Ok(Config {
            output_dir,
            record_chunk_duration: env_duration_secs("RECORD_CHUNK_DURATION_SECS", 30),
            use_continuous: env_bool("USE_CONTINUOUS", false),
            ffmpeg_device_name: env_or("FFMPEG_DEVICE_NAME", ":0"),
            ffmpeg_binary_path: env_or("FFMPEG_BINARY_PATH", "ffmpeg"),
            python_binary_path: env_or("PYTHON_BINARY_PATH", "python3"),

            whisper_mode: env_or("WHISPER_MODE", "http"),
            whisper_api_url: env_or("WHISPER_API_URL", "http://127.0.0.1:8081"),
            whisper_model: env_or("WHISPER_MODEL", "base"),
            whisper_temperature: env_parse("WHISPER_TEMPERATURE", 0.0f32),
            whisper_segments: env_or("WHISPER_SEGMENTS", ""),

            device_default: env_or("DEVICE_DEFAULT", "cpu"),
            diarization_script_path: PathBuf::from(env_or(
                "DIARIZATION_SCRIPT_PATH",
                "./scripts/diarize.py",
            )),
            embedding_script_path: PathBuf::from(env_or(
                "EMBEDDING_SCRIPT_PATH",
                "./scripts/embed.py",
            )),
            embedding_device_default: env_or("EMBEDDING_DEVICE_DEFAULT", "cpu"),
            embedding_threshold: env_parse("EMBEDDING_THRESHOLD", 0.7f32),
            embedding_auto_lower_min: env_parse("EMBEDDING_AUTO_LOWER_MIN", 0.5f32),
            embedding_auto_lower_step: env_parse("EMBEDDING_AUTO_LOWER_STEP", 0.05f32),
            initial_embeddings_path: env::var("INITIAL_EMBEDDINGS_PATH").ok().map(PathBuf::from),
            hf_token: env_or("HF_TOKEN", ""),

            enable_offline: env_bool("ENABLE_OFFLINE", false),
            enable_degradation: env_bool("ENABLE_DEGRADATION", true),
            health_check_interval: env_duration_secs("HEALTH_CHECK_INTERVAL_SECS", 30),
            health_check_fail_threshold: env_parse("HEALTH_CHECK_FAIL_THRESHOLD", 3u32),

            dependency_mode: DependencyMode::parse(&env_or("DEPENDENCY_MODE", "local")),
            dependency_service_url: env_or("DEPENDENCY_SERVICE_URL", "http://127.0.0.1:9090"),
            dependency_shared_volume,
            dependency_timeout: env_duration_secs("DEPENDENCY_TIMEOUT_SECS", 300),
            allowed_commands,

            merge_segments_binary_path: env_or("MERGE_SEGMENTS_BINARY_PATH", "merge-segments"),
        })
    }

    /// Mode selection per spec section 4.4: `http|go-whisper|faster-whisper`
    /// map to the HTTP transcriber, `cli|local-whisper` to the CLI
    /// transcriber, and anything else (including empty) defaults to HTTP.
    pub fn transcriber_kind(&self) -> TranscriberKind {
        match self.whisper_mode.to_ascii_lowercase().as_str() {
            "cli" | "local-whisper" => TranscriberKind::Cli,
            _ => TranscriberKind::Http,
        }
    }

    pub fn session_id(&self) -> String {
        self.output_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "session".to_string())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[test]
    fn transcriber_kind_defaults_to_http() {
        let mut cfg = test_config();
        cfg.whisper_mode = "".to_string();
        assert_eq!(cfg.transcriber_kind(), TranscriberKind::Http);
        cfg.whisper_mode = "bogus".to_string();
        assert_eq!(cfg.transcriber_kind(), TranscriberKind::Http);
        cfg.whisper_mode = "faster-whisper".to_string();
        assert_eq!(cfg.transcriber_kind(), TranscriberKind::Http);
        cfg.whisper_mode = "cli".to_string();
        assert_eq!(cfg.transcriber_kind(), TranscriberKind::Cli);
    }

    #[test]
    fn dependency_mode_parses() {
        assert_eq!(DependencyMode::parse("remote"), DependencyMode::Remote);
        assert_eq!(DependencyMode::parse("FALLBACK"), DependencyMode::Fallback);
        assert_eq!(DependencyMode::parse("whatever"), DependencyMode::Local);
    }

    pub(crate) fn test_config() -> Config {
        let dir = tempfile::tempdir().unwrap().into_path();
        Config {
            output_dir: dir,
            record_chunk_duration: Duration::from_secs(5),
            use_continuous: false,
            ffmpeg_device_name: ":0".to_string(),
            ffmpeg_binary_path: "ffmpeg".to_string(),
            python_binary_path: "python3".to_string(),
            whisper_mode: "http".to_string(),
            whisper_api_url: "http://127.0.0.1:0".to_string(),
            whisper_model: "base".to_string(),
            whisper_temperature: 0.0,
            whisper_segments: "".to_string(),
            device_default: "cpu".to_string(),
            diarization_script_path: PathBuf::from("diarize.py"),
            embedding_script_path: PathBuf::from("embed.py"),
            embedding_device_default: "cpu".to_string(),
            embedding_threshold: 0.7,
            embedding_auto_lower_min: 0.5,
            embedding_auto_lower_step: 0.05,
            initial_embeddings_path: None,
            hf_token: "".to_string(),
            enable_offline: false,
            enable_degradation: true,
            health_check_interval: Duration::from_secs(30),
            health_check_fail_threshold: 3,
            dependency_mode: DependencyMode::Local,
            dependency_service_url: "http://127.0.0.1:0".to_string(),
            dependency_shared_volume: PathBuf::from("/tmp/shared"),
            dependency_timeout: Duration::from_secs(300),
            allowed_commands: ["ffmpeg", "whisper", "merge-segments"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            merge_segments_binary_path: "merge-segments".to_string(),
        }
    }
}
