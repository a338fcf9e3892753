//! Session Configuration
//!
//! Timeouts, base URL and logging limits for a [`crate::Session`]. Values can
//! be set through the builder or loaded from YAML, where durations are given in
//! milliseconds:
//!
//! ```yaml
//! base_url: https://demo.example.com/
//! base_retry_timeout_ms: 5000
//! base_retry_interval_ms: 500
//! element_find_timeout_ms: 2000
//! default_visibility: visible
//! ```

use crate::locator::{SearchOptions, Visibility};
use crate::log::DEFAULT_LOG_MAX_ENTRIES;
use crate::result::{PomarError, PomarResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default base retry timeout (5 seconds)
pub const DEFAULT_RETRY_TIMEOUT_MS: u64 = 5_000;

/// Default base retry interval (500ms)
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 500;

/// Timeout and interval pair used by one retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryBudget {
    /// Total time budget
    pub timeout: Duration,
    /// Pause between attempts
    pub interval: Duration,
}

impl RetryBudget {
    /// New budget
    #[must_use]
    pub const fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }
}

/// Session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PomarConfig {
    /// Base URL joined with relative page URLs
    pub base_url: Option<String>,
    /// Base retry timeout (ms)
    pub base_retry_timeout_ms: u64,
    /// Base retry interval (ms)
    pub base_retry_interval_ms: u64,
    /// Element find timeout (ms), defaults to base
    pub element_find_timeout_ms: Option<u64>,
    /// Element find retry interval (ms), defaults to base
    pub element_find_retry_interval_ms: Option<u64>,
    /// Waiting timeout (ms), defaults to base
    pub waiting_timeout_ms: Option<u64>,
    /// Waiting retry interval (ms), defaults to base
    pub waiting_retry_interval_ms: Option<u64>,
    /// Verification timeout (ms), defaults to base
    pub verification_timeout_ms: Option<u64>,
    /// Verification retry interval (ms), defaults to base
    pub verification_retry_interval_ms: Option<u64>,
    /// Visibility used when a component declares none
    pub default_visibility: Visibility,
    /// Journal capacity
    pub log_max_entries: usize,
}

impl Default for PomarConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            base_retry_timeout_ms: DEFAULT_RETRY_TIMEOUT_MS,
            base_retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
            element_find_timeout_ms: None,
            element_find_retry_interval_ms: None,
            waiting_timeout_ms: None,
            waiting_retry_interval_ms: None,
            verification_timeout_ms: None,
            verification_retry_interval_ms: None,
            default_visibility: Visibility::Any,
            log_max_entries: DEFAULT_LOG_MAX_ENTRIES,
        }
    }
}

impl PomarConfig {
    /// Defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate YAML
    pub fn from_yaml_str(yaml: &str) -> PomarResult<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> PomarResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> PomarResult<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Check every value; fails fast with a configuration error
    pub fn validate(&self) -> PomarResult<()> {
        if let Some(base) = &self.base_url {
            let _ = parse_base_url(base)?;
        }
        let intervals = [
            ("base retry interval", Some(self.base_retry_interval_ms)),
            ("element find retry interval", self.element_find_retry_interval_ms),
            ("waiting retry interval", self.waiting_retry_interval_ms),
            ("verification retry interval", self.verification_retry_interval_ms),
        ];
        for (name, value) in intervals {
            if value == Some(0) {
                return Err(PomarError::configuration(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        Ok(())
    }

    /// Base budget
    #[must_use]
    pub const fn base_retry(&self) -> RetryBudget {
        RetryBudget::new(
            Duration::from_millis(self.base_retry_timeout_ms),
            Duration::from_millis(self.base_retry_interval_ms),
        )
    }

    fn budget(&self, timeout: Option<u64>, interval: Option<u64>) -> RetryBudget {
        RetryBudget::new(
            Duration::from_millis(timeout.unwrap_or(self.base_retry_timeout_ms)),
            Duration::from_millis(interval.unwrap_or(self.base_retry_interval_ms)),
        )
    }

    /// Budget for element lookups
    #[must_use]
    pub fn element_find(&self) -> RetryBudget {
        self.budget(self.element_find_timeout_ms, self.element_find_retry_interval_ms)
    }

    /// Budget for waits
    #[must_use]
    pub fn waiting(&self) -> RetryBudget {
        self.budget(self.waiting_timeout_ms, self.waiting_retry_interval_ms)
    }

    /// Budget for verifications
    #[must_use]
    pub fn verification(&self) -> RetryBudget {
        self.budget(self.verification_timeout_ms, self.verification_retry_interval_ms)
    }

    /// Unsafe search options within the element find budget
    #[must_use]
    pub fn element_find_options(&self) -> SearchOptions {
        let budget = self.element_find();
        SearchOptions::within(budget.timeout, budget.interval)
    }

    /// Resolve a page URL against the base URL
    pub fn resolve_url(&self, url: &str) -> PomarResult<String> {
        if let Ok(absolute) = Url::parse(url) {
            return Ok(absolute.to_string());
        }
        let base = self.base_url.as_deref().ok_or_else(|| {
            PomarError::configuration(format!(
                "relative URL \"{url}\" requires a base URL"
            ))
        })?;
        let joined = parse_base_url(base)?
            .join(url)
            .map_err(|e| PomarError::configuration(format!("cannot join \"{url}\": {e}")))?;
        Ok(joined.to_string())
    }
}

/// Parse a base URL, requiring it to be absolute
pub fn parse_base_url(value: &str) -> PomarResult<Url> {
    let url = Url::parse(value).map_err(|e| {
        PomarError::configuration(format!("base URL \"{value}\" is not a valid absolute URL: {e}"))
    })?;
    if url.cannot_be_a_base() {
        return Err(PomarError::configuration(format!(
            "base URL \"{value}\" cannot be used as a base"
        )));
    }
    Ok(url)
}
