//! Configuration types for feedvault
//!
//! The service configuration is a small TOML file resolved once at startup.
//! Absence of the file, unparseable contents, or invalid field values are
//! all fatal: the process must not start without a usable configuration.
//!
//! # Example
//!
//! ```toml
//! base_url = "http://api.example.com/"
//! schedule = "daily"
//! output_dir = "/var/backups/feeds"
//! progress_file = "/var/lib/feedvault/progress.json"
//! log_file = "/var/log/feedvault.log"
//! ```

use crate::error::{Error, Result};
use crate::schedule::Schedule;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

/// Service configuration loaded from a TOML file
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// Base address of the feed API (absolute http/https URL)
    pub base_url: Url,

    /// Schedule expression controlling the backup cadence
    /// (e.g. "daily", "hourly", "every 30m")
    #[serde(default)]
    pub schedule: Schedule,

    /// Directory under which dated backup folders are created (default: ".")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Location of the persisted last-backup record
    #[serde(default = "default_progress_file")]
    pub progress_file: PathBuf,

    /// Optional append-mode log file; stderr is used when unset
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_progress_file() -> PathBuf {
    PathBuf::from("feedvault_progress.json")
}

impl Config {
    /// Load and validate the configuration from a TOML file
    ///
    /// Fatal on a missing or unreadable file, TOML syntax errors, a
    /// non-http(s) or non-absolute `base_url`, or an unparseable
    /// `schedule` expression.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {e}", path.display()),
            key: None,
        })?;

        let mut config: Config = toml::from_str(&raw).map_err(|e| Error::Config {
            message: format!("cannot parse {}: {e}", path.display()),
            key: None,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate field values and normalize the base URL
    ///
    /// The base URL gets a trailing slash so that the per-channel path
    /// template can be appended without double or missing separators.
    pub fn validate(&mut self) -> Result<()> {
        match self.base_url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(Error::config(
                    format!("unsupported base_url scheme '{other}'"),
                    "base_url",
                ));
            }
        }
        if self.base_url.cannot_be_a_base() {
            return Err(Error::config(
                "base_url must be an absolute URL",
                "base_url",
            ));
        }
        if !self.base_url.path().ends_with('/') {
            let normalized = format!("{}/", self.base_url.path());
            self.base_url.set_path(&normalized);
        }
        Ok(())
    }
}
