//! Controller configuration loaded from the environment.
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `ARC_CONTROLLER_WORKERS` | 4 | Worker tasks per controller |
//! | `ARC_CONTROLLER_RESYNC_SECS` | 10 | Re-poll interval for unfinished work |
//! | `ARC_CONTROLLER_BACKOFF_BASE_MS` | 200 | First retry delay after an error |
//! | `ARC_CONTROLLER_BACKOFF_MAX_SECS` | 60 | Retry delay ceiling |
//! | `ARC_CONTROLLER_STATUS_RETRIES` | 5 | Status writes attempted on conflicts |
//! | `ARC_CONTROLLER_LOG_TAIL_LINES` | 30 | Log lines kept per failed step |
//! | `ARC_LOG_FORMAT` | `pretty` | `json` or `pretty` |

use std::time::Duration;

use arc_core::observability::LogFormat;

use crate::error::{Error, Result};

const ENV_WORKERS: &str = "ARC_CONTROLLER_WORKERS";
const ENV_RESYNC_SECS: &str = "ARC_CONTROLLER_RESYNC_SECS";
const ENV_BACKOFF_BASE_MS: &str = "ARC_CONTROLLER_BACKOFF_BASE_MS";
const ENV_BACKOFF_MAX_SECS: &str = "ARC_CONTROLLER_BACKOFF_MAX_SECS";
const ENV_STATUS_RETRIES: &str = "ARC_CONTROLLER_STATUS_RETRIES";
const ENV_LOG_TAIL_LINES: &str = "ARC_CONTROLLER_LOG_TAIL_LINES";
const ENV_LOG_FORMAT: &str = "ARC_LOG_FORMAT";

const DEFAULT_WORKERS: usize = 4;
const DEFAULT_RESYNC_SECS: u64 = 10;
const DEFAULT_BACKOFF_BASE_MS: u64 = 200;
const DEFAULT_BACKOFF_MAX_SECS: u64 = 60;
const DEFAULT_STATUS_RETRIES: u32 = 5;
const DEFAULT_LOG_TAIL_LINES: usize = 30;

/// Settings shared by both controllers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Worker tasks per controller.
    pub workers: usize,
    /// Delay before a key that asked for a requeue is reconciled again.
    pub resync_interval: Duration,
    /// First retry delay after a failed reconcile.
    pub backoff_base: Duration,
    /// Upper bound for the retry delay.
    pub backoff_max: Duration,
    /// Attempts for a status write that keeps hitting version conflicts.
    pub status_retries: u32,
    /// Log lines fetched per failed step.
    pub log_tail_lines: usize,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            resync_interval: Duration::from_secs(DEFAULT_RESYNC_SECS),
            backoff_base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
            backoff_max: Duration::from_secs(DEFAULT_BACKOFF_MAX_SECS),
            status_retries: DEFAULT_STATUS_RETRIES,
            log_tail_lines: DEFAULT_LOG_TAIL_LINES,
            log_format: LogFormat::default(),
        }
    }
}

impl ControllerConfig {
    /// Loads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a value is malformed.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Loads the configuration with a custom environment source.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a numeric value is not a positive
    /// integer, exceeds the supported range, or the log format is unknown.
    pub fn from_env_with<F>(get_env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let workers = parse_positive_u64_env(&get_env, ENV_WORKERS, DEFAULT_WORKERS as u64)?;
        let resync_secs = parse_positive_u64_env(&get_env, ENV_RESYNC_SECS, DEFAULT_RESYNC_SECS)?;
        let backoff_base_ms =
            parse_positive_u64_env(&get_env, ENV_BACKOFF_BASE_MS, DEFAULT_BACKOFF_BASE_MS)?;
        let backoff_max_secs =
            parse_positive_u64_env(&get_env, ENV_BACKOFF_MAX_SECS, DEFAULT_BACKOFF_MAX_SECS)?;
        let status_retries =
            parse_positive_u64_env(
                &get_env,
                ENV_STATUS_RETRIES,
                u64::from(DEFAULT_STATUS_RETRIES),
            )?;
        let log_tail_lines =
            parse_positive_u64_env(&get_env, ENV_LOG_TAIL_LINES, DEFAULT_LOG_TAIL_LINES as u64)?;
        let log_format = match get_env(ENV_LOG_FORMAT) {
            Some(raw) => raw.parse::<LogFormat>()?,
            None => LogFormat::default(),
        };

        let backoff_base = Duration::from_millis(backoff_base_ms);
        let backoff_max = Duration::from_secs(backoff_max_secs);
        if backoff_base > backoff_max {
            return Err(Error::configuration(format!(
                "{ENV_BACKOFF_BASE_MS} ({backoff_base_ms}ms) exceeds {ENV_BACKOFF_MAX_SECS} ({backoff_max_secs}s)"
            )));
        }

        Ok(Self {
            workers: to_usize(ENV_WORKERS, workers)?,
            resync_interval: Duration::from_secs(resync_secs),
            backoff_base,
            backoff_max,
            status_retries: u32::try_from(status_retries).map_err(|_| {
                Error::configuration(format!(
                    "{ENV_STATUS_RETRIES} value {status_retries} exceeds supported range"
                ))
            })?,
            log_tail_lines: to_usize(ENV_LOG_TAIL_LINES, log_tail_lines)?,
            log_format,
        })
    }

    /// Retry delay after `failures` consecutive failed reconciles.
    ///
    /// Doubles from `backoff_base` and is capped at `backoff_max`.
    #[must_use]
    pub fn backoff(&self, failures: u32) -> Duration {
        let factor = 1u32.checked_shl(failures.saturating_sub(1)).unwrap_or(u32::MAX);
        self.backoff_base
            .checked_mul(factor)
            .map_or(self.backoff_max, |d| d.min(self.backoff_max))
    }
}

fn to_usize(key: &str, value: u64) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| Error::configuration(format!("{key} value {value} exceeds supported range")))
}

fn parse_positive_u64_env<F>(get_env: &F, key: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = get_env(key) else {
        return Ok(default);
    };

    let parsed = raw.parse::<u64>().map_err(|_| {
        Error::configuration(format!("{key} must be a positive integer, got '{raw}'"))
    })?;
    if parsed == 0 {
        return Err(Error::configuration(format!(
            "{key} must be greater than zero"
        )));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() -> Result<()> {
        let config = ControllerConfig::from_env_with(env(&[]))?;
        assert_eq!(config, ControllerConfig::default());
        Ok(())
    }

    #[test]
    fn default_matches_documented_values() {
        let config = ControllerConfig::default();
        assert_eq!(config.workers, DEFAULT_WORKERS);
        assert_eq!(config.resync_interval, Duration::from_secs(DEFAULT_RESYNC_SECS));
        assert_eq!(config.backoff_base, Duration::from_millis(DEFAULT_BACKOFF_BASE_MS));
        assert_eq!(config.backoff_max, Duration::from_secs(DEFAULT_BACKOFF_MAX_SECS));
        assert_eq!(config.status_retries, DEFAULT_STATUS_RETRIES);
        assert_eq!(config.log_tail_lines, DEFAULT_LOG_TAIL_LINES);
    }

    #[test]
    fn values_are_parsed() -> Result<()> {
        let config = ControllerConfig::from_env_with(env(&[
            (ENV_WORKERS, "8"),
            (ENV_RESYNC_SECS, "3"),
            (ENV_STATUS_RETRIES, "2"),
            (ENV_LOG_TAIL_LINES, "100"),
            (ENV_LOG_FORMAT, "json"),
        ]))?;
        assert_eq!(config.workers, 8);
        assert_eq!(config.resync_interval, Duration::from_secs(3));
        assert_eq!(config.status_retries, 2);
        assert_eq!(config.log_tail_lines, 100);
        assert_eq!(config.log_format, LogFormat::Json);
        Ok(())
    }

    #[test]
    fn zero_and_garbage_are_rejected() {
        let zero = ControllerConfig::from_env_with(env(&[(ENV_WORKERS, "0")]));
        assert!(matches!(zero, Err(e) if e.to_string().contains("greater than zero")));

        let garbage = ControllerConfig::from_env_with(env(&[(ENV_RESYNC_SECS, "soon")]));
        assert!(matches!(garbage, Err(e) if e.to_string().contains("positive integer")));

        let format = ControllerConfig::from_env_with(env(&[(ENV_LOG_FORMAT, "xml")]));
        assert!(format.is_err());
    }

    #[test]
    fn backoff_base_must_not_exceed_ceiling() {
        let config = ControllerConfig::from_env_with(env(&[
            (ENV_BACKOFF_BASE_MS, "5000"),
            (ENV_BACKOFF_MAX_SECS, "1"),
        ]));
        assert!(config.is_err());
    }

    #[test]
    fn backoff_doubles_up_to_ceiling() {
        let config = ControllerConfig::default();
        assert_eq!(config.backoff(1), Duration::from_millis(200));
        assert_eq!(config.backoff(2), Duration::from_millis(400));
        assert_eq!(config.backoff(4), Duration::from_millis(1600));
        assert_eq!(config.backoff(40), Duration::from_secs(60));
    }
}
