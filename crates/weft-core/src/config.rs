use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, WeftError};

/// Top-level engine configuration, loaded from `weft.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Event bus capacity (broadcast channel buffer).
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    #[serde(default)]
    pub sandbox: SandboxConfig,

    #[serde(default)]
    pub provider: ProviderConfig,
}

fn default_event_capacity() -> usize {
    256
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_capacity: default_event_capacity(),
            sandbox: SandboxConfig::default(),
            provider: ProviderConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| WeftError::Config(format!("{}: {}", path.display(), e)))?;
        toml::from_str(&raw).map_err(|e| WeftError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Limits for the restricted command sandbox. The whitelist and dangerous
/// patterns are compiled in (see `security`); only resource limits and the
/// working directory are configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default = "default_sandbox_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,

    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,
}

fn default_sandbox_timeout() -> u64 {
    30
}

fn default_max_output_bytes() -> usize {
    1024 * 1024
}

fn default_working_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_sandbox_timeout(),
            max_output_bytes: default_max_output_bytes(),
            working_dir: default_working_dir(),
        }
    }
}

/// How external tool providers are spawned and spoken to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Package runner used for package-named sources.
    #[serde(default = "default_runner")]
    pub runner: String,

    #[serde(default = "default_runner_args")]
    pub runner_args: Vec<String>,

    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_runner() -> String {
    "npx".to_string()
}

fn default_runner_args() -> Vec<String> {
    vec!["-y".to_string()]
}

fn default_handshake_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            runner: default_runner(),
            runner_args: default_runner_args(),
            handshake_timeout_secs: default_handshake_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.event_capacity, 256);
        assert_eq!(config.sandbox.timeout_secs, 30);
        assert_eq!(config.sandbox.max_output_bytes, 1024 * 1024);
        assert_eq!(config.provider.runner, "npx");
        assert_eq!(config.provider.runner_args, vec!["-y"]);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [sandbox]
            timeout_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.sandbox.timeout_secs, 5);
        assert_eq!(config.sandbox.max_output_bytes, 1024 * 1024);
        assert_eq!(config.provider.handshake_timeout_secs, 10);
    }
}
