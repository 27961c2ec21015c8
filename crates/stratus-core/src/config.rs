use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::location::LocationMode;
use crate::retry::{ExponentialRetry, LinearRetry, RetryStrategy};

/// Which built-in retry policy to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryPolicyKind {
    None,
    Linear,
    #[default]
    Exponential,
}

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub policy: RetryPolicyKind,
    /// Maximum number of retries after the first attempt.
    pub max_attempts: u32,
    /// Backoff step in seconds (e.g. 0.5 = 500ms).
    pub delta_backoff_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            policy: RetryPolicyKind::Exponential,
            max_attempts: 3,
            delta_backoff_secs: 4.0,
        }
    }
}

impl RetryConfig {
    pub fn strategy(&self) -> RetryStrategy {
        let delta = Duration::from_secs_f64(self.delta_backoff_secs.max(0.0));
        match self.policy {
            RetryPolicyKind::None => RetryStrategy::none(),
            RetryPolicyKind::Linear => {
                RetryStrategy::extended(LinearRetry::new(delta, self.max_attempts))
            }
            RetryPolicyKind::Exponential => {
                RetryStrategy::extended(ExponentialRetry::new(delta, self.max_attempts))
            }
        }
    }
}

/// Global configuration loaded from `~/.config/stratus/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StratusConfig {
    /// Primary endpoint, e.g. `https://account.blob.example/`.
    #[serde(default)]
    pub primary_endpoint: Option<String>,
    /// Read-only secondary endpoint of a geo-redundant account.
    #[serde(default)]
    pub secondary_endpoint: Option<String>,
    #[serde(default)]
    pub location_mode: LocationMode,
    /// Server-side timeout per request, in seconds.
    #[serde(default)]
    pub server_timeout_secs: Option<u64>,
    /// Client-side budget for a whole operation including retries, in seconds.
    #[serde(default)]
    pub max_execution_time_secs: Option<u64>,
    /// Optional SAS token appended to every request.
    #[serde(default)]
    pub sas_token: Option<String>,
    #[serde(default)]
    pub disable_content_md5_validation: bool,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("stratus")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<StratusConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = StratusConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from(&path)
}

pub fn load_from(path: &Path) -> Result<StratusConfig> {
    let data =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    let cfg: StratusConfig =
        toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = StratusConfig::default();
        assert!(cfg.primary_endpoint.is_none());
        assert_eq!(cfg.location_mode, LocationMode::PrimaryOnly);
        assert!(cfg.retry.is_none());
        assert!(!cfg.disable_content_md5_validation);
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = StratusConfig {
            primary_endpoint: Some("http://127.0.0.1:10000/acct".into()),
            location_mode: LocationMode::PrimaryThenSecondary,
            retry: Some(RetryConfig::default()),
            ..StratusConfig::default()
        };
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: StratusConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.primary_endpoint, cfg.primary_endpoint);
        assert_eq!(parsed.location_mode, LocationMode::PrimaryThenSecondary);
        assert_eq!(parsed.retry.unwrap().max_attempts, 3);
    }

    #[test]
    fn config_toml_custom_values() {
        let toml = r#"
            primary_endpoint = "https://acct.blob.example/"
            secondary_endpoint = "https://acct-secondary.blob.example/"
            location_mode = "secondary_then_primary"
            server_timeout_secs = 30
            max_execution_time_secs = 120

            [retry]
            policy = "linear"
            max_attempts = 5
            delta_backoff_secs = 0.5
        "#;
        let cfg: StratusConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.location_mode, LocationMode::SecondaryThenPrimary);
        assert_eq!(cfg.server_timeout_secs, Some(30));
        assert_eq!(cfg.max_execution_time_secs, Some(120));
        let retry = cfg.retry.as_ref().unwrap();
        assert_eq!(retry.policy, RetryPolicyKind::Linear);
        assert_eq!(retry.max_attempts, 5);
        assert!((retry.delta_backoff_secs - 0.5).abs() < 1e-9);
        assert!(matches!(retry.strategy(), RetryStrategy::Extended(_)));
    }

    #[test]
    fn retry_policy_defaults_to_exponential() {
        let toml = r#"
            [retry]
            max_attempts = 2
            delta_backoff_secs = 1.0
        "#;
        let cfg: StratusConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.retry.unwrap().policy, RetryPolicyKind::Exponential);
    }

    #[test]
    fn retry_policy_none() {
        let retry = RetryConfig {
            policy: RetryPolicyKind::None,
            ..RetryConfig::default()
        };
        assert!(matches!(retry.strategy(), RetryStrategy::Basic(_)));
    }

    #[test]
    fn load_from_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "location_mode = 7").unwrap();
        let err = load_from(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("config.toml"));
    }
}
