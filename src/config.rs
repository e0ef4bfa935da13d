//! Warehouse settings, read from `GCP_*` environment variables.

use crate::sink::bigquery::TableRef;
use config::{Config, Environment, Map};
use log::debug;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

const ENV_PREFIX: &str = "GCP";
const DOCKER_ENV: &str = "DOCKER_ENV";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    MissingSetting(&'static str),

    #[error("Failed to load .env file")]
    DotEnv(#[source] dotenvy::Error),

    #[error("Failed to read settings from the environment")]
    Source(#[from] config::ConfigError),
}

/// Destination table and credentials for the BigQuery sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub project_id: String,
    pub dataset_id: String,
    pub table_name: String,
    pub credentials_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct RawSettings {
    project_id: Option<String>,
    dataset_id: Option<String>,
    table_name: Option<String>,
    credentials_path: Option<String>,
}

impl Settings {
    /// Reads settings from the process environment.
    ///
    /// A `.env` file in the working directory is loaded first, without
    /// overriding variables that are already set, unless `DOCKER_ENV=true`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSetting`] naming the first of
    /// `GCP_PROJECT_ID`, `GCP_DATASET_ID`, `GCP_TABLE_NAME` and
    /// `GCP_CREDENTIALS_PATH` that is unset or blank.
    pub fn from_env() -> Result<Self, ConfigError> {
        if std::env::var(DOCKER_ENV).as_deref() == Ok("true") {
            debug!("{DOCKER_ENV}=true, skipping .env");
        } else {
            match dotenvy::dotenv() {
                Ok(path) => debug!("Loaded {}", path.display()),
                Err(e) if e.not_found() => debug!("No .env file found"),
                Err(e) => return Err(ConfigError::DotEnv(e)),
            }
        }
        Self::from_source(Environment::with_prefix(ENV_PREFIX))
    }

    /// Reads settings from `vars` instead of the process environment.
    /// Keys are full variable names, e.g. `GCP_PROJECT_ID`.
    pub fn from_map(vars: Map<String, String>) -> Result<Self, ConfigError> {
        Self::from_source(Environment::with_prefix(ENV_PREFIX).source(Some(vars)))
    }

    fn from_source(source: Environment) -> Result<Self, ConfigError> {
        let raw: RawSettings = Config::builder()
            .add_source(source)
            .build()?
            .try_deserialize()?;

        Ok(Self {
            project_id: required(raw.project_id, "GCP_PROJECT_ID")?,
            dataset_id: required(raw.dataset_id, "GCP_DATASET_ID")?,
            table_name: required(raw.table_name, "GCP_TABLE_NAME")?,
            credentials_path: required(raw.credentials_path, "GCP_CREDENTIALS_PATH")?.into(),
        })
    }

    /// `project.dataset.table`
    pub fn table_path(&self) -> String {
        self.table().to_string()
    }

    pub fn table(&self) -> TableRef {
        TableRef::new(&self.project_id, &self.dataset_id, &self.table_name)
    }
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(ConfigError::MissingSetting(name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Map<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn complete() -> Vec<(&'static str, &'static str)> {
        vec![
            ("GCP_PROJECT_ID", "weather-project"),
            ("GCP_DATASET_ID", "spain"),
            ("GCP_TABLE_NAME", "hourly"),
            ("GCP_CREDENTIALS_PATH", "/secrets/key.json"),
        ]
    }

    #[test]
    fn reads_all_settings() {
        let settings = Settings::from_map(vars(&complete())).unwrap();
        assert_eq!(settings.project_id, "weather-project");
        assert_eq!(settings.dataset_id, "spain");
        assert_eq!(settings.table_name, "hourly");
        assert_eq!(settings.credentials_path, PathBuf::from("/secrets/key.json"));
        assert_eq!(settings.table_path(), "weather-project.spain.hourly");
    }

    #[test]
    fn missing_setting_is_named() {
        let mut pairs = complete();
        pairs.retain(|(k, _)| *k != "GCP_TABLE_NAME");
        let err = Settings::from_map(vars(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSetting("GCP_TABLE_NAME")));
        assert_eq!(err.to_string(), "Missing required setting GCP_TABLE_NAME");
    }

    #[test]
    fn blank_setting_counts_as_missing() {
        let mut pairs = complete();
        pairs[0] = ("GCP_PROJECT_ID", "  ");
        let err = Settings::from_map(vars(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSetting("GCP_PROJECT_ID")));
    }

    #[test]
    fn unrelated_variables_are_ignored() {
        let mut pairs = complete();
        pairs.push(("HOME", "/root"));
        pairs.push(("GCP_REGION", "europe-southwest1"));
        assert!(Settings::from_map(vars(&pairs)).is_ok());
    }
}
