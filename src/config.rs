use std::time::Duration;

use crate::audit::RetryPolicy;
use crate::errors::{AppError, AppResult};

pub const AUDIT_RECORD_READS: &str = "AUDIT_RECORD_READS";
pub const AUDIT_MAX_RETRIES: &str = "AUDIT_MAX_RETRIES";
pub const AUDIT_RETRY_BACKOFF_MS: &str = "AUDIT_RETRY_BACKOFF_MS";

/// Audit behaviour, read from the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditConfig {
    /// Record ordinary reads (task and team views) in addition to the
    /// mandatory actions.
    pub record_reads: bool,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            record_reads: false,
            max_retries: 3,
            retry_backoff: Duration::from_millis(200),
        }
    }
}

impl AuditConfig {
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unset or blank variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let value = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let record_reads = match value(AUDIT_RECORD_READS) {
            Some(raw) => parse_bool(AUDIT_RECORD_READS, &raw)?,
            None => defaults.record_reads,
        };

        let max_retries = match value(AUDIT_MAX_RETRIES) {
            Some(raw) => raw.parse::<u32>().map_err(|e| {
                AppError::configuration(format!("{AUDIT_MAX_RETRIES}={raw}: {e}"))
            })?,
            None => defaults.max_retries,
        };

        let retry_backoff = match value(AUDIT_RETRY_BACKOFF_MS) {
            Some(raw) => raw.parse::<u64>().map(Duration::from_millis).map_err(|e| {
                AppError::configuration(format!("{AUDIT_RETRY_BACKOFF_MS}={raw}: {e}"))
            })?,
            None => defaults.retry_backoff,
        };

        Ok(Self {
            record_reads,
            max_retries,
            retry_backoff,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff: self.retry_backoff,
        }
    }
}

fn parse_bool(key: &str, raw: &str) -> AppResult<bool> {
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::configuration(format!("{key}={raw}: expected a boolean"))),
    }
}

/// Loads `.env` from the working directory, falling back to the crate's own.
pub fn load_env() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let _ = dotenvy::from_path(crate_env);
}
