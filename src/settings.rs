use chrono::{DateTime, Utc};
use config::{Config, Environment};
use serde::Deserialize;
use std::path::PathBuf;

use crate::error::PollError;
use crate::registry::extract_registry_id;

/// Layout of `LAST_FETCHED_TIME`, e.g. `2024-03-01 09:30:00 +0000 UTC`
///
/// The trailing zone abbreviation is skipped, the numeric offset is what
/// determines the instant. Fractional seconds are optional.
const LAST_FETCHED_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f %z %Z";

/// `0001-01-01 00:00:00 UTC` in Unix seconds, the zero value upstream steps
/// write back when nothing was fetched yet
const ZERO_TIME_UNIX_SECS: i64 = -62_135_596_800;

/// Runtime settings, read from the process environment
///
/// Variable names map to fields by lowercasing (`AWS_REGION` -> `aws_region`).
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// AWS access key id (`ACCESS_KEY`)
    #[serde(default)]
    pub access_key: Option<String>,

    /// AWS secret access key (`SECRET_KEY`)
    #[serde(default)]
    pub secret_key: Option<String>,

    /// Registry endpoint, e.g. "123456789.dkr.ecr.us-east-2.amazonaws.com"
    #[serde(default)]
    pub docker_registry_url: String,

    #[serde(default)]
    pub aws_region: String,

    /// Raw `LAST_FETCHED_TIME`; see [`Settings::last_fetched`]
    #[serde(default)]
    pub last_fetched_time: Option<String>,

    /// Comma-separated repository names (`REPOSITORY`)
    #[serde(default)]
    pub repository: String,

    /// Results document location (default: /output/results.json)
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,

    /// Octal permission mode for a newly created results file (default: 644)
    #[serde(default = "default_output_file_mode")]
    pub output_file_mode: String,

    /// Number of images kept when there is no previous fetch (default: 5)
    #[serde(default = "default_cold_start_limit")]
    pub cold_start_limit: usize,

    /// Keep polling the remaining repositories after one fails
    #[serde(default)]
    pub continue_on_error: bool,
}

fn default_output_path() -> PathBuf {
    PathBuf::from("/output/results.json")
}

fn default_output_file_mode() -> String {
    "644".to_string()
}

fn default_cold_start_limit() -> usize {
    5
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            access_key: None,
            secret_key: None,
            docker_registry_url: String::new(),
            aws_region: String::new(),
            last_fetched_time: None,
            repository: String::new(),
            output_path: default_output_path(),
            output_file_mode: default_output_file_mode(),
            cold_start_limit: default_cold_start_limit(),
            continue_on_error: false,
        }
    }
}

impl Settings {
    /// Load settings from the process environment
    pub fn from_env() -> Result<Self, PollError> {
        Self::load(Environment::default())
    }

    /// Load settings from an explicit set of variables instead of the environment
    #[cfg(test)]
    pub fn from_source(vars: std::collections::HashMap<String, String>) -> Result<Self, PollError> {
        Self::load(Environment::default().source(Some(vars.into_iter().collect())))
    }

    fn load(environment: Environment) -> Result<Self, PollError> {
        let settings: Settings = Config::builder()
            .add_source(environment)
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|e| PollError::Config(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), PollError> {
        if self.repositories().is_empty() {
            return Err(PollError::Config(
                "REPOSITORY must name at least one repository".to_string(),
            ));
        }
        if self.cold_start_limit == 0 {
            return Err(PollError::Config(
                "COLD_START_LIMIT must be greater than zero".to_string(),
            ));
        }
        self.file_mode()?;
        Ok(())
    }

    pub fn access_key(&self) -> Option<&str> {
        non_empty(self.access_key.as_deref())
    }

    pub fn secret_key(&self) -> Option<&str> {
        non_empty(self.secret_key.as_deref())
    }

    /// Repository names from `REPOSITORY`, trimmed, empty entries dropped
    pub fn repositories(&self) -> Vec<&str> {
        self.repository
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .collect()
    }

    /// Registry id derived from `DOCKER_REGISTRY_URL`, `None` when it is unset
    pub fn registry_id(&self) -> Option<&str> {
        let url = self.docker_registry_url.trim();
        let host = url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(url);
        non_empty(Some(extract_registry_id(host)))
    }

    /// Permission mode for a newly created results file
    pub fn file_mode(&self) -> Result<u32, PollError> {
        let raw = self.output_file_mode.trim();
        let digits = raw.strip_prefix("0o").unwrap_or(raw);
        match u32::from_str_radix(digits, 8) {
            Ok(mode) if mode <= 0o7777 => Ok(mode),
            _ => Err(PollError::Config(format!(
                "OUTPUT_FILE_MODE '{}' is not an octal permission mode",
                self.output_file_mode
            ))),
        }
    }

    /// Timestamp of the previous fetch, `None` if there was none
    ///
    /// An absent or unparseable `LAST_FETCHED_TIME` is not an error: it means
    /// the poller starts cold and keeps only the most recent images. The zero
    /// time (`0001-01-01 00:00:00 +0000 UTC`) means the same.
    pub fn last_fetched(&self) -> Option<DateTime<Utc>> {
        let raw = non_empty(self.last_fetched_time.as_deref())?;
        match parse_last_fetched_time(raw) {
            Ok(time) if is_zero_time(&time) => {
                tracing::info!(
                    last_fetched_time = raw,
                    "LAST_FETCHED_TIME is the zero time, treating as no previous fetch"
                );
                None
            }
            Ok(time) => Some(time),
            Err(e) => {
                tracing::warn!(
                    last_fetched_time = raw,
                    error = %e,
                    "Could not parse LAST_FETCHED_TIME, treating as no previous fetch"
                );
                None
            }
        }
    }
}

fn is_zero_time(time: &DateTime<Utc>) -> bool {
    time.timestamp() == ZERO_TIME_UNIX_SECS && time.timestamp_subsec_nanos() == 0
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Parse a `LAST_FETCHED_TIME` value into a UTC instant
///
/// A trailing monotonic clock reading (` m=+0.001`) is ignored.
pub fn parse_last_fetched_time(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let value = match value.find(" m=") {
        Some(idx) => &value[..idx],
        None => value,
    };
    DateTime::parse_from_str(value.trim(), LAST_FETCHED_TIME_FORMAT).map(|t| t.with_timezone(&Utc))
}
