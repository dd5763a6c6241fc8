//! Configuration for a mirror run.
//!
//! Every setting has a default matching the archive-friendly behaviour
//! (three attempts, 10s initial backoff, 5s pause between assets, one
//! download at a time). A TOML file can override any subset of them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http_client::{ClientOptions, RetryPolicy};

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Settings for a mirror run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Attempts per request before giving up.
    pub max_attempts: u32,
    /// Wait before the first retry; doubled after each failure.
    pub retry_delay_ms: u64,
    /// Per-attempt timeout for the snapshot page.
    pub page_timeout_secs: u64,
    /// Per-attempt timeout for each asset.
    pub asset_timeout_secs: u64,
    pub max_redirects: usize,
    /// Pause after every successful asset download.
    pub asset_pause_ms: u64,
    /// Asset downloads allowed in flight at once.
    pub concurrency: usize,
    /// Strip the archive's injected toolbar and scripts from the page.
    pub sanitize: bool,
    pub user_agent: Option<String>,
    /// Where `<domain>_<timestamp>` is created. Defaults to the working directory.
    pub output_dir: Option<PathBuf>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 10_000,
            page_timeout_secs: 15,
            asset_timeout_secs: 10,
            max_redirects: 5,
            asset_pause_ms: 5_000,
            concurrency: 1,
            sanitize: true,
            user_agent: None,
            output_dir: None,
        }
    }
}

impl MirrorConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    pub fn asset_timeout(&self) -> Duration {
        Duration::from_secs(self.asset_timeout_secs)
    }

    pub fn asset_pause(&self) -> Duration {
        Duration::from_millis(self.asset_pause_ms)
    }

    /// Output root, falling back to the current directory.
    pub fn output_root(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            user_agent: self.user_agent.clone(),
            max_redirects: self.max_redirects,
            retry: RetryPolicy {
                max_attempts: self.max_attempts,
                initial_delay: Duration::from_millis(self.retry_delay_ms),
            },
        }
    }
}
