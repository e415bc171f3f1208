//! Environment-driven client configuration.
//!
//! Every value is read through a lookup function so callers (and tests) can
//! supply their own source instead of the process environment.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;

use chrono::FixedOffset;
use thiserror::Error;

use crate::retry::RetryPolicy;
use crate::schedule::CalendarRecurrence;
use crate::sync::{HttpRemoteAuthority, SyncProcessorConfig};
use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_OWNER_ID: &str = "local";
const DEFAULT_DEVICE_ID: &str = "default-device";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Sync, retry and scheduling settings for a client
#[derive(Clone, PartialEq)]
pub struct SyncSettings {
    pub api_base_url: Option<String>,
    pub api_token: Option<String>,
    pub owner_id: String,
    pub device_id: String,
    pub batch_size: usize,
    pub submit_timeout: Duration,
    pub retry: RetryPolicy,
    /// Offset used to read `base_at_local` wall-clock anchors
    pub utc_offset: FixedOffset,
}

impl fmt::Debug for SyncSettings {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SyncSettings")
            .field("api_base_url", &self.api_base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("owner_id", &self.owner_id)
            .field("device_id", &self.device_id)
            .field("batch_size", &self.batch_size)
            .field("submit_timeout", &self.submit_timeout)
            .field("retry", &self.retry)
            .field("utc_offset", &self.utc_offset)
            .finish()
    }
}

impl SyncSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_base_url = optional_trimmed(&lookup, "NUDGE_API_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string());
        if let Some(url) = &api_base_url {
            if !is_http_url(url) {
                return Err(ConfigError::Invalid(
                    "NUDGE_API_BASE_URL must start with http:// or https://".to_string(),
                ));
            }
        }

        let batch_size: usize = parse_or(&lookup, "NUDGE_SYNC_BATCH_SIZE", 25)?;
        if batch_size == 0 {
            return Err(ConfigError::Invalid(
                "NUDGE_SYNC_BATCH_SIZE must be >= 1".to_string(),
            ));
        }

        let timeout_secs: u64 = parse_or(&lookup, "NUDGE_SYNC_TIMEOUT_SECS", 15)?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "NUDGE_SYNC_TIMEOUT_SECS must be >= 1".to_string(),
            ));
        }

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: parse_or(&lookup, "NUDGE_RETRY_MAX_ATTEMPTS", defaults.max_attempts)?,
            base_delay: Duration::from_millis(parse_or(
                &lookup,
                "NUDGE_RETRY_BASE_DELAY_MS",
                1000,
            )?),
            max_delay: Duration::from_millis(parse_or(
                &lookup,
                "NUDGE_RETRY_MAX_DELAY_MS",
                60_000,
            )?),
            jitter_ratio: parse_or(&lookup, "NUDGE_RETRY_JITTER_RATIO", defaults.jitter_ratio)?,
        };
        if !(0.0..=1.0).contains(&retry.jitter_ratio) {
            return Err(ConfigError::Invalid(
                "NUDGE_RETRY_JITTER_RATIO must be between 0 and 1".to_string(),
            ));
        }
        if retry.base_delay > retry.max_delay {
            return Err(ConfigError::Invalid(
                "NUDGE_RETRY_BASE_DELAY_MS must not exceed NUDGE_RETRY_MAX_DELAY_MS".to_string(),
            ));
        }

        let offset_minutes: i32 = parse_or(&lookup, "NUDGE_UTC_OFFSET_MINUTES", 0)?;
        let utc_offset = offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                ConfigError::Invalid("NUDGE_UTC_OFFSET_MINUTES is out of range".to_string())
            })?;

        Ok(Self {
            api_base_url,
            api_token: optional_trimmed(&lookup, "NUDGE_API_TOKEN"),
            owner_id: value_or_default(&lookup, "NUDGE_OWNER_ID", DEFAULT_OWNER_ID),
            device_id: value_or_default(&lookup, "NUDGE_DEVICE_ID", DEFAULT_DEVICE_ID),
            batch_size,
            submit_timeout: Duration::from_secs(timeout_secs),
            retry,
            utc_offset,
        })
    }

    pub fn processor_config(&self) -> SyncProcessorConfig {
        SyncProcessorConfig {
            owner_id: self.owner_id.clone(),
            device_id: self.device_id.clone(),
            batch_size: self.batch_size,
            submit_timeout: self.submit_timeout,
        }
    }

    pub const fn recurrence(&self) -> CalendarRecurrence {
        CalendarRecurrence::new(self.utc_offset)
    }

    /// HTTP client for the configured authority
    pub fn remote_authority(&self) -> Result<HttpRemoteAuthority, ConfigError> {
        let base_url = self
            .api_base_url
            .clone()
            .ok_or(ConfigError::MissingVar("NUDGE_API_BASE_URL"))?;
        HttpRemoteAuthority::new(base_url, self.api_token.clone())
            .map_err(|error| ConfigError::Invalid(error.to_string()))
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match optional_trimmed(lookup, name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("{name} has an invalid value '{raw}'"))),
        None => Ok(default),
    }
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    normalize_text_option(lookup(name))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> Result<SyncSettings, ConfigError> {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        SyncSettings::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn defaults_apply_without_environment() {
        let settings = settings(&[]).unwrap();
        assert_eq!(settings.api_base_url, None);
        assert_eq!(settings.owner_id, "local");
        assert_eq!(settings.batch_size, 25);
        assert_eq!(settings.submit_timeout, Duration::from_secs(15));
        assert_eq!(settings.retry, RetryPolicy::default());
        assert_eq!(settings.utc_offset.local_minus_utc(), 0);
    }

    #[test]
    fn values_are_read_and_trimmed() {
        let settings = settings(&[
            ("NUDGE_API_BASE_URL", " http://localhost:8080/ "),
            ("NUDGE_OWNER_ID", "alice"),
            ("NUDGE_DEVICE_ID", "laptop"),
            ("NUDGE_SYNC_BATCH_SIZE", "10"),
            ("NUDGE_RETRY_MAX_ATTEMPTS", "3"),
            ("NUDGE_RETRY_JITTER_RATIO", "0"),
            ("NUDGE_UTC_OFFSET_MINUTES", "-300"),
        ])
        .unwrap();
        assert_eq!(settings.api_base_url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(settings.owner_id, "alice");
        assert_eq!(settings.processor_config().device_id, "laptop");
        assert_eq!(settings.processor_config().batch_size, 10);
        assert_eq!(settings.retry.max_attempts, 3);
        assert!(settings.retry.jitter_ratio.abs() < f64::EPSILON);
        assert_eq!(settings.utc_offset.local_minus_utc(), -300 * 60);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(settings(&[("NUDGE_API_BASE_URL", "localhost")]).is_err());
        assert!(settings(&[("NUDGE_SYNC_BATCH_SIZE", "0")]).is_err());
        assert!(settings(&[("NUDGE_SYNC_TIMEOUT_SECS", "soon")]).is_err());
        assert!(settings(&[("NUDGE_RETRY_JITTER_RATIO", "1.5")]).is_err());
        assert!(settings(&[
            ("NUDGE_RETRY_BASE_DELAY_MS", "5000"),
            ("NUDGE_RETRY_MAX_DELAY_MS", "100"),
        ])
        .is_err());
        assert!(settings(&[("NUDGE_UTC_OFFSET_MINUTES", "100000")]).is_err());
    }

    #[test]
    fn remote_authority_requires_base_url() {
        let err = settings(&[]).unwrap().remote_authority().unwrap_err();
        assert_eq!(err, ConfigError::MissingVar("NUDGE_API_BASE_URL"));
    }

    #[test]
    fn debug_redacts_token() {
        let settings = settings(&[("NUDGE_API_TOKEN", "secret-token")]).unwrap();
        let debug = format!("{settings:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }
}
