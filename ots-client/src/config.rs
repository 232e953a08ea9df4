//! Client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::client::RetryConfig;
use crate::{ClientError, Result};

/// Comma separated calendar URLs replacing `calendars`
pub const CALENDARS_ENV: &str = "OTS_CALENDARS";

/// Esplora base URL replacing `explorer_url`
pub const EXPLORER_ENV: &str = "OTS_EXPLORER_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Calendars a new timestamp is submitted to
    pub calendars: Vec<String>,

    /// Calendars trusted during upgrade. `*.` in the host matches any
    /// subdomain; a pattern without scheme matches http and https.
    pub whitelist: Vec<String>,

    /// Successful submissions required for a stamp to succeed
    pub min_responses: usize,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Append a random nonce to each digest before aggregation
    pub use_nonce: bool,

    /// Keep pending attestations once their calendar has been resolved
    pub keep_resolved_pending: bool,

    /// Upper bound on upgrade rounds for chained pending attestations
    pub max_upgrade_rounds: usize,

    /// Esplora API for Bitcoin block headers
    pub explorer_url: String,

    /// Esplora-compatible API for Litecoin block headers
    pub litecoin_explorer_url: Option<String>,

    pub retry: RetrySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            calendars: vec![
                "https://a.pool.opentimestamps.org".to_string(),
                "https://b.pool.opentimestamps.org".to_string(),
                "https://a.pool.eternitywall.com".to_string(),
                "https://ots.btc.catallaxy.com".to_string(),
            ],
            whitelist: vec![
                "https://*.calendar.opentimestamps.org".to_string(),
                "https://*.calendar.eternitywall.com".to_string(),
                "https://*.calendar.catallaxy.com".to_string(),
            ],
            min_responses: 2,
            timeout_secs: 5,
            use_nonce: true,
            keep_resolved_pending: true,
            max_upgrade_rounds: 3,
            explorer_url: "https://blockstream.info/api".to_string(),
            litecoin_explorer_url: None,
            retry: RetrySettings::default(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 250,
            max_backoff_ms: 5_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            backoff_multiplier: self.backoff_multiplier,
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let config: ClientConfig = toml::from_str(&contents)
            .map_err(|e| ClientError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &std::path::Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ClientError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)
            .map_err(|e| ClientError::Config(format!("Failed to write {}: {}", path.display(), e)))?;
        Ok(())
    }

    /// Defaults or `path`, then environment overrides
    pub fn load(path: Option<&std::path::Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `OTS_CALENDARS` / `OTS_EXPLORER_URL` as read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(calendars) = lookup(CALENDARS_ENV) {
            self.calendars = calendars
                .split(',')
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(url) = lookup(EXPLORER_ENV) {
            self.explorer_url = url.trim().to_string();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(ClientError::Config("timeout_secs must be positive".to_string()));
        }
        if self.max_upgrade_rounds == 0 {
            return Err(ClientError::Config(
                "max_upgrade_rounds must be positive".to_string(),
            ));
        }
        if let Some(bad) = self
            .calendars
            .iter()
            .find(|url| !url.starts_with("http://") && !url.starts_with("https://"))
        {
            return Err(ClientError::Config(format!("calendar URL without http(s) scheme: {}", bad)));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Submissions needed for a stamp; never more than there are calendars.
    pub fn quorum(&self) -> usize {
        self.min_responses.clamp(1, self.calendars.len().max(1))
    }

    pub fn is_whitelisted(&self, url: &str) -> bool {
        self.whitelist.iter().any(|pattern| url_matches(pattern, url))
    }
}

fn split_url(url: &str) -> (Option<&str>, &str) {
    let (scheme, rest) = match url.split_once("://") {
        Some((scheme, rest)) => (Some(scheme), rest),
        None => (None, url),
    };
    let host = rest.split('/').next().unwrap_or(rest);
    (scheme, host)
}

fn url_matches(pattern: &str, url: &str) -> bool {
    let (pattern_scheme, pattern_host) = split_url(pattern);
    let (url_scheme, url_host) = split_url(url);

    let scheme_ok = match (pattern_scheme, url_scheme) {
        (Some(p), Some(u)) => p.eq_ignore_ascii_case(u),
        (None, Some(u)) => u == "http" || u == "https",
        (_, None) => false,
    };
    if !scheme_ok {
        return false;
    }

    match pattern_host.strip_prefix("*.") {
        Some(suffix) => url_host
            .strip_suffix(suffix)
            .and_then(|prefix| prefix.strip_suffix('.'))
            .map_or(false, |label| !label.is_empty()),
        None => pattern_host.eq_ignore_ascii_case(url_host),
    }
}
