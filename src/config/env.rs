//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

use anyhow::{Context, Result};
use std::env;

use super::ConfigLayer;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "POKE";

/// Environment configuration from environment variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Concurrency width from POKE_THREADS
    pub threads: Option<String>,
    /// Script deadline from POKE_MAX_SCRIPT_EXEC_TIME
    pub max_script_exec_time: Option<String>,
    /// Fetch timeout from POKE_FETCH_TIMEOUT
    pub fetch_timeout: Option<String>,
    /// Log level from POKE_LOG_LEVEL
    pub log_level: Option<String>,
    /// Output format from POKE_FORMAT
    pub format: Option<String>,
    /// Fail-fast from POKE_BAIL
    pub bail: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}_{name}")).filter(|v| !v.trim().is_empty())
        };

        Self {
            threads: get("THREADS"),
            max_script_exec_time: get("MAX_SCRIPT_EXEC_TIME"),
            fetch_timeout: get("FETCH_TIMEOUT"),
            log_level: get("LOG_LEVEL"),
            format: get("FORMAT"),
            bail: get("BAIL"),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.threads.is_some()
            || self.max_script_exec_time.is_some()
            || self.fetch_timeout.is_some()
            || self.log_level.is_some()
            || self.format.is_some()
            || self.bail.is_some()
    }

    /// Typed layer; unparseable numbers or booleans are errors
    pub fn layer(&self) -> Result<ConfigLayer> {
        let threads = self
            .threads
            .as_deref()
            .map(|v| {
                v.trim()
                    .parse::<usize>()
                    .with_context(|| format!("Invalid {ENV_PREFIX}_THREADS: {v}"))
            })
            .transpose()?;

        let bail = self
            .bail
            .as_deref()
            .map(|v| parse_bool(v).with_context(|| format!("Invalid {ENV_PREFIX}_BAIL: {v}")))
            .transpose()?;

        Ok(ConfigLayer {
            threads,
            max_script_exec_time: self.max_script_exec_time.clone(),
            fetch_timeout: self.fetch_timeout.clone(),
            log_level: self.log_level.clone(),
            format: self.format.clone(),
            bail,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}
