//! Configuration module
//!
//! Settings are layered: built-in defaults, then the config file, then
//! `POKE_*` environment variables, then command-line flags.

mod env;
mod file;

pub use env::{EnvConfig, ENV_PREFIX};
pub use file::ConfigFile;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::executor::ParallelExecutor;
use crate::output::OutputFormat;
use crate::utils::LogLevel;

/// Default per-script deadline
pub const DEFAULT_MAX_SCRIPT_EXEC_TIME: Duration = Duration::from_secs(60);

/// One partial source of settings. Unset fields leave lower layers intact.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ConfigLayer {
    pub threads: Option<usize>,
    pub max_script_exec_time: Option<String>,
    pub fetch_timeout: Option<String>,
    pub log_level: Option<String>,
    pub format: Option<String>,
    pub bail: Option<bool>,
}

/// Resolved application configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    /// Maximum number of scripts running at once
    pub threads: usize,

    /// Deadline for a single script
    pub max_script_exec_time: Duration,

    /// Timeout of one `fetch` request
    pub fetch_timeout: Duration,

    pub log_level: LogLevel,

    pub format: OutputFormat,

    /// Cancel the whole run on the first error-level event
    pub bail: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            threads: ParallelExecutor::default_concurrency(),
            max_script_exec_time: DEFAULT_MAX_SCRIPT_EXEC_TIME,
            fetch_timeout: crate::http::DEFAULT_TIMEOUT,
            log_level: LogLevel::Info,
            format: OutputFormat::Table,
            bail: false,
        }
    }
}

impl AppConfig {
    /// Resolve every layer: defaults, config file, environment, `cli`
    pub fn load(config_path: Option<&Path>, cli: &ConfigLayer) -> Result<Self> {
        let mut config = Self::default();

        let path = match config_path {
            Some(path) => Some(path.to_path_buf()),
            None => ConfigFile::find(),
        };
        if let Some(path) = path {
            debug!("Loading config from {}", path.display());
            let layer = ConfigFile::load(&path)?;
            config
                .apply(&layer)
                .with_context(|| format!("Invalid config file: {}", path.display()))?;
        }

        let env = EnvConfig::load();
        if env.has_any() {
            debug!("Applying {}_* environment overrides", ENV_PREFIX);
            config
                .apply(&env.layer()?)
                .context("Invalid environment configuration")?;
        }
        config.apply(cli)?;

        config.validate()?;
        Ok(config)
    }

    /// Override fields set in `layer`
    pub fn apply(&mut self, layer: &ConfigLayer) -> Result<()> {
        if let Some(threads) = layer.threads {
            self.threads = threads.max(1);
        }
        if let Some(value) = &layer.max_script_exec_time {
            self.max_script_exec_time = parse_duration("max-script-exec-time", value)?;
        }
        if let Some(value) = &layer.fetch_timeout {
            self.fetch_timeout = parse_duration("fetch-timeout", value)?;
        }
        if let Some(value) = &layer.log_level {
            self.log_level = LogLevel::from_str(value)
                .with_context(|| format!("Unknown log level: {value}"))?;
        }
        if let Some(value) = &layer.format {
            self.format = OutputFormat::from_str(value)
                .with_context(|| format!("Unknown output format: {value}"))?;
        }
        if let Some(bail) = layer.bail {
            self.bail = bail;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_script_exec_time.is_zero() {
            bail!("max-script-exec-time must be greater than zero");
        }
        if self.fetch_timeout.is_zero() {
            bail!("fetch-timeout must be greater than zero");
        }
        Ok(())
    }
}

fn parse_duration(name: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value.trim())
        .with_context(|| format!("Invalid duration for {name}: {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.max_script_exec_time, Duration::from_secs(60));
        assert!(config.threads >= 3);
        assert!(!config.bail);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_apply_layer() {
        let mut config = AppConfig::default();
        config
            .apply(&ConfigLayer {
                threads: Some(2),
                max_script_exec_time: Some("1m 30s".to_string()),
                log_level: Some("warning".to_string()),
                format: Some("csv".to_string()),
                bail: Some(true),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(config.threads, 2);
        assert_eq!(config.max_script_exec_time, Duration::from_secs(90));
        assert_eq!(config.log_level, LogLevel::Warn);
        assert_eq!(config.format, OutputFormat::Csv);
        assert!(config.bail);
    }

    #[test]
    fn test_empty_layer_keeps_values() {
        let mut config = AppConfig {
            threads: 7,
            ..Default::default()
        };
        config.apply(&ConfigLayer::default()).unwrap();
        assert_eq!(config.threads, 7);
    }

    #[test]
    fn test_invalid_values() {
        let mut config = AppConfig::default();
        let bad_duration = ConfigLayer {
            max_script_exec_time: Some("soon".to_string()),
            ..Default::default()
        };
        assert!(config.apply(&bad_duration).is_err());

        let bad_format = ConfigLayer {
            format: Some("xml".to_string()),
            ..Default::default()
        };
        assert!(config.apply(&bad_format).is_err());
    }

    #[test]
    fn test_validate_rejects_zero() {
        let config = AppConfig {
            max_script_exec_time: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_threads_clamped_to_one() {
        let mut config = AppConfig::default();
        config
            .apply(&ConfigLayer {
                threads: Some(0),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(config.threads, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_explicit_file_then_cli() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("poke.yaml");
        std::fs::write(&path, "threads: 5\nmax-script-exec-time: 10s\n").unwrap();

        let cli = ConfigLayer {
            threads: Some(1),
            ..Default::default()
        };
        let config = AppConfig::load(Some(&path), &cli).unwrap();

        assert_eq!(config.threads, 1);
        assert_eq!(config.max_script_exec_time, Duration::from_secs(10));
    }
}
