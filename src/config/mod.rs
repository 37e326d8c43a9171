//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! Sensitive values wrapped in secrecy::SecretString to prevent log leaks.

pub mod form;

pub use form::FormConfig;

use crate::error::{Error, Result};
use crate::model::AssignmentMode;
use chrono::TimeDelta;
use secrecy::SecretString;
use std::path::PathBuf;

/// Lease length when `ANNOTQ_LEASE_SECS` is not set.
pub const DEFAULT_LEASE_SECS: i64 = 15 * 60;

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    pub mode: AssignmentMode,
    pub lease_duration: TimeDelta,
    pub form: FormConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let mode = match optional_var("ANNOTQ_MODE") {
            Some(raw) => raw.parse()?,
            None => AssignmentMode::default(),
        };

        let lease_secs = match optional_var("ANNOTQ_LEASE_SECS") {
            Some(raw) => raw.trim().parse::<i64>().map_err(|e| {
                Error::Config(format!("ANNOTQ_LEASE_SECS must be whole seconds: {e}"))
            })?,
            None => DEFAULT_LEASE_SECS,
        };

        let form = match optional_var("ANNOTQ_FORM_CONFIG") {
            Some(path) => FormConfig::load(&PathBuf::from(path))?,
            None => FormConfig::default(),
        };

        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            otel_endpoint: optional_var("OTEL_ENDPOINT"),
            log_level: optional_var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            mode,
            lease_duration: lease_duration(lease_secs)?,
            form,
        })
    }
}

/// Leases must be positive; an instantly expiring claim protects nothing.
pub fn lease_duration(secs: i64) -> Result<TimeDelta> {
    if secs <= 0 {
        return Err(Error::Config(format!(
            "lease duration must be positive, got {secs}s"
        )));
    }
    TimeDelta::try_seconds(secs)
        .ok_or_else(|| Error::Config(format!("lease duration {secs}s out of range")))
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_duration_rejects_non_positive() {
        assert!(lease_duration(0).is_err());
        assert!(lease_duration(-5).is_err());
        assert_eq!(lease_duration(90).unwrap(), TimeDelta::seconds(90));
    }
}
