use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};

use crate::executor::ExecutorConfig;
use crate::housekeeping::DEFAULT_PURGE_SCHEDULE;
use crate::service::DEFAULT_RETENTION_HOURS;

/// Queue tuning loaded from `COMMAND_*` environment variables
#[derive(Debug, Clone, PartialEq)]
pub struct CommandQueueConfig {
    pub workers: usize,
    pub poll_interval: Duration,
    pub error_backoff: Duration,
    pub shutdown_timeout: Duration,
    pub retention: chrono::Duration,
    pub purge_schedule: String,
}

impl Default for CommandQueueConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            poll_interval: Duration::from_millis(500),
            error_backoff: Duration::from_millis(1000),
            shutdown_timeout: Duration::from_secs(30),
            retention: chrono::Duration::hours(DEFAULT_RETENTION_HOURS),
            purge_schedule: DEFAULT_PURGE_SCHEDULE.to_string(),
        }
    }
}

impl CommandQueueConfig {
    /// Load from the process environment. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load using `lookup` in place of the environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let workers: usize = parse_or(&lookup, "COMMAND_WORKERS", defaults.workers)?;
        if workers == 0 {
            anyhow::bail!("COMMAND_WORKERS must be at least 1");
        }

        let retention_hours: i64 =
            parse_or(&lookup, "COMMAND_RETENTION_HOURS", DEFAULT_RETENTION_HOURS)?;
        if retention_hours < 1 {
            anyhow::bail!("COMMAND_RETENTION_HOURS must be at least 1");
        }
        let retention = chrono::Duration::try_hours(retention_hours)
            .ok_or_else(|| anyhow!("COMMAND_RETENTION_HOURS is out of range"))?;

        Ok(Self {
            workers,
            poll_interval: Duration::from_millis(parse_or(
                &lookup,
                "COMMAND_POLL_INTERVAL_MS",
                defaults.poll_interval.as_millis() as u64,
            )?),
            error_backoff: Duration::from_millis(parse_or(
                &lookup,
                "COMMAND_ERROR_BACKOFF_MS",
                defaults.error_backoff.as_millis() as u64,
            )?),
            shutdown_timeout: Duration::from_secs(parse_or(
                &lookup,
                "COMMAND_SHUTDOWN_TIMEOUT_SECS",
                defaults.shutdown_timeout.as_secs(),
            )?),
            retention,
            purge_schedule: lookup("COMMAND_PURGE_SCHEDULE").unwrap_or(defaults.purge_schedule),
        })
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            worker_count: self.workers,
            poll_interval: self.poll_interval,
            error_backoff: self.error_backoff,
            shutdown_timeout: self.shutdown_timeout,
            ..ExecutorConfig::default()
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a valid number")),
        None => Ok(default),
    }
}
