//! Configuration file parsing and validation.
//!
//! This module handles loading the optional TOML configuration file and
//! resolving it, together with command-line overrides and the credential,
//! into the explicit [`EngineConfig`] handed to the reconciliation engine.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::constants;
use crate::rate_limit::RetryPolicy;

/// Configuration file structure.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Organization whose secrets and variables are reconciled.
    #[serde(default)]
    pub organization: Option<String>,
    /// REST API base URL, for GitHub Enterprise Server.
    #[serde(default)]
    pub api_url: Option<String>,
    /// Rows applied concurrently.
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// `[retry]` table.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub rate_limit_wait_secs: u64,
    pub max_rate_limit_wait_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: constants::retry::MAX_ATTEMPTS,
            base_delay_ms: constants::retry::BASE_DELAY_MS,
            max_delay_ms: constants::retry::MAX_DELAY_MS,
            rate_limit_wait_secs: constants::retry::RATE_LIMIT_WAIT_SECS,
            max_rate_limit_wait_secs: constants::retry::MAX_RATE_LIMIT_WAIT_SECS,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            rate_limit_wait: Duration::from_secs(self.rate_limit_wait_secs),
            max_rate_limit_wait: Duration::from_secs(self.max_rate_limit_wait_secs),
        }
    }
}

/// Values given on the command line; each one wins over the file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub organization: Option<String>,
    pub api_url: Option<String>,
    pub concurrency: Option<usize>,
}

/// Everything the reconciliation engine needs, resolved and validated.
#[derive(Clone)]
pub struct EngineConfig {
    pub organization: String,
    pub token: String,
    pub api_url: Option<String>,
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("organization", &self.organization)
            .field("token", &"***")
            .field("api_url", &self.api_url)
            .field("concurrency", &self.concurrency)
            .field("retry", &self.retry)
            .finish()
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    /// Load the file if it exists, otherwise use defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Merge command-line overrides and the credential into an [`EngineConfig`].
    pub fn resolve(self, overrides: Overrides, token: String) -> Result<EngineConfig> {
        let organization = overrides
            .organization
            .or(self.organization)
            .context("No organization given (use --org or set `organization` in the config file)")?;
        crate::validation::validate_repo_owner(&organization).context("Invalid organization")?;
        crate::validation::validate_token(&token).context("Invalid GitHub token")?;

        let concurrency = overrides
            .concurrency
            .or(self.concurrency)
            .unwrap_or(constants::engine::DEFAULT_CONCURRENCY);
        if concurrency == 0 {
            anyhow::bail!("Concurrency must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }

        Ok(EngineConfig {
            organization: organization.trim().to_string(),
            token: token.trim().to_string(),
            api_url: overrides.api_url.or(self.api_url),
            concurrency,
            retry: self.retry.policy(),
        })
    }
}
