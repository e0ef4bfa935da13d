//! Destinations for shaped weather rows.

pub mod auth;
pub mod bigquery;
pub mod error;
pub mod ndjson;

use crate::config::Settings;
use crate::error::EtlError;
use crate::sink::bigquery::BigQuerySink;
use crate::sink::error::SinkError;
use crate::sink::ndjson::NdjsonFileSink;
use crate::types::weather_frame::WeatherFrame;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// An append-only destination for weather rows.
///
/// Implementations either append every row of a call or fail the whole call.
/// Nothing is deduplicated: appending the same rows twice stores them twice.
#[async_trait]
pub trait RowSink: Send + Sync {
    /// Appends `frame` and returns the number of rows written.
    async fn append(&self, frame: &WeatherFrame) -> Result<usize, SinkError>;

    /// Human readable name of the destination, for logs.
    fn destination(&self) -> String;
}

/// Where a run writes its rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget {
    /// The table named by the `GCP_*` environment variables.
    BigQuery,
    /// A local newline-delimited JSON file.
    NdjsonFile(PathBuf),
}

impl SinkTarget {
    /// Opens the sink. For BigQuery this reads the settings from the
    /// environment and loads the service-account key, without any network
    /// request.
    ///
    /// # Errors
    ///
    /// [`EtlError::Config`] if a setting is missing, [`EtlError::Sink`] if the
    /// credentials cannot be read.
    pub async fn open(&self) -> Result<Arc<dyn RowSink>, EtlError> {
        let sink: Arc<dyn RowSink> = match self {
            SinkTarget::BigQuery => {
                let settings = Settings::from_env()?;
                Arc::new(BigQuerySink::from_settings(&settings).await?)
            }
            SinkTarget::NdjsonFile(path) => Arc::new(NdjsonFileSink::new(path.clone())),
        };
        Ok(sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ndjson_target_opens_file_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.ndjson");

        let sink = SinkTarget::NdjsonFile(path.clone()).open().await.unwrap();
        assert_eq!(sink.destination(), path.display().to_string());
        assert!(!path.exists(), "opening must not create the file");
    }
}
