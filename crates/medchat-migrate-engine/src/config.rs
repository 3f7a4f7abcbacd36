//! Run configuration, read from the process environment.

use std::path::PathBuf;

use thiserror::Error;

pub const SOURCE_URI_VAR: &str = "MEDCHAT_SOURCE_URI";
pub const TARGET_DATABASE_VAR: &str = "MEDCHAT_TARGET_DATABASE";
pub const BOOTSTRAP_SCHEMA_VAR: &str = "MEDCHAT_TARGET_BOOTSTRAP_SCHEMA";
pub const AUDIT_LOG_LIMIT_VAR: &str = "MEDCHAT_AUDIT_LOG_LIMIT";
pub const REPORT_PATH_VAR: &str = "MEDCHAT_REPORT_PATH";

pub const DEFAULT_AUDIT_LOG_LIMIT: usize = 1000;

#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum ConfigError {
    #[error("environment variable {0} is required")]
    Missing(&'static str),
    #[error("environment variable {variable} has invalid value `{value}`: {reason}")]
    Invalid { variable: &'static str, value: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationConfig {
    pub source_uri: String,
    pub target_database: PathBuf,
    pub bootstrap_schema: bool,
    pub audit_log_limit: usize,
    pub report_path: Option<PathBuf>,
}

impl MigrationConfig {
    /// # Errors
    /// Returns an error when a required variable is unset or a value cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from any variable lookup. Blank values count as unset.
    ///
    /// # Errors
    /// Returns an error when a required variable is unset or a value cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name).map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
        };

        let source_uri = read(SOURCE_URI_VAR).ok_or(ConfigError::Missing(SOURCE_URI_VAR))?;
        let target_database = read(TARGET_DATABASE_VAR)
            .map(PathBuf::from)
            .ok_or(ConfigError::Missing(TARGET_DATABASE_VAR))?;
        let bootstrap_schema = match read(BOOTSTRAP_SCHEMA_VAR) {
            None => false,
            Some(value) => parse_flag(BOOTSTRAP_SCHEMA_VAR, &value)?,
        };
        let audit_log_limit = match read(AUDIT_LOG_LIMIT_VAR) {
            None => DEFAULT_AUDIT_LOG_LIMIT,
            Some(value) => value.parse::<usize>().map_err(|err| ConfigError::Invalid {
                variable: AUDIT_LOG_LIMIT_VAR,
                reason: err.to_string(),
                value,
            })?,
        };

        Ok(Self {
            source_uri,
            target_database,
            bootstrap_schema,
            audit_log_limit,
            report_path: read(REPORT_PATH_VAR).map(PathBuf::from),
        })
    }
}

fn parse_flag(variable: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            variable,
            value: value.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}
