//! Local file sink, one JSON object per line.

use crate::sink::error::SinkError;
use crate::sink::RowSink;
use crate::types::weather_frame::WeatherFrame;
use async_trait::async_trait;
use log::info;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

/// Appends rows to a newline-delimited JSON file, creating it if needed.
///
/// Rows use the same field names as the BigQuery table, so the file can be
/// loaded later with `bq load --source_format=NEWLINE_DELIMITED_JSON`.
#[derive(Debug, Clone)]
pub struct NdjsonFileSink {
    path: PathBuf,
}

impl NdjsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RowSink for NdjsonFileSink {
    async fn append(&self, frame: &WeatherFrame) -> Result<usize, SinkError> {
        if frame.is_empty() {
            return Ok(0);
        }
        let payload = frame.to_ndjson()?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| SinkError::FileWrite(self.path.clone(), e))?;
        file.write_all(&payload)
            .await
            .map_err(|e| SinkError::FileWrite(self.path.clone(), e))?;
        file.flush()
            .await
            .map_err(|e| SinkError::FileWrite(self.path.clone(), e))?;

        let rows = frame.height();
        info!("Appended {} rows to {}", rows, self.path.display());
        Ok(rows)
    }

    fn destination(&self) -> String {
        self.path.display().to_string()
    }
}
