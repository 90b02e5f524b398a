use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Engine configuration, usually read from `operator.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorConfig {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Memoize successful action outputs. Off by default, since a cache hit
    /// skips the handler and with it any side effects.
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Zero disables the background sweep
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_ttl_secs() -> u64 {
    3600
}

fn default_sweep_interval_secs() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            default_ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

/// What a sequence does after one of its actions fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Finish the current level, then skip everything after it
    #[default]
    Abort,
    /// Keep running actions that do not depend on a failure
    ContinueIndependent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Concurrent actions per level, 0 for unlimited
    #[serde(default)]
    pub max_parallelism: usize,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    #[serde(default)]
    pub default_timeout_secs: Option<u64>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_parallelism: 0,
            failure_policy: FailurePolicy::Abort,
            default_timeout_secs: None,
        }
    }
}

impl ExecutionConfig {
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_secs.map(Duration::from_secs)
    }
}

impl OperatorConfig {
    /// Load from a TOML file, falling back to defaults if it does not exist
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let config_path = config_path.as_ref();

        if !config_path.exists() {
            tracing::info!("Configuration file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read configuration file {}", config_path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid configuration in {}", config_path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse configuration file")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = OperatorConfig::default();
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.default_ttl(), Duration::from_secs(3600));
        assert_eq!(config.cache.sweep_interval(), Some(Duration::from_secs(300)));
        assert_eq!(config.execution.max_parallelism, 0);
        assert_eq!(config.execution.failure_policy, FailurePolicy::Abort);
        assert!(config.execution.default_timeout().is_none());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = OperatorConfig::from_toml_str(
            r#"
            [cache]
            enabled = true
            sweep_interval_secs = 0

            [execution]
            failure_policy = "continue_independent"
            default_timeout_secs = 90
            "#,
        )
        .unwrap();

        assert!(config.cache.enabled);
        assert_eq!(config.cache.default_ttl_secs, 3600);
        assert!(config.cache.sweep_interval().is_none());
        assert_eq!(config.execution.failure_policy, FailurePolicy::ContinueIndependent);
        assert_eq!(config.execution.default_timeout(), Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = OperatorConfig::load(dir.path().join("operator.toml")).unwrap();
        assert_eq!(config, OperatorConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("operator.toml");
        std::fs::write(&path, "[execution]\nmax_parallelism = 4\n").unwrap();

        let config = OperatorConfig::load(&path).unwrap();
        assert_eq!(config.execution.max_parallelism, 4);
    }

    #[test]
    fn test_load_rejects_bad_policy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("operator.toml");
        std::fs::write(&path, "[execution]\nfailure_policy = \"retry\"\n").unwrap();

        let err = OperatorConfig::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("operator.toml"));
    }
}
