use polars::error::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to build HTTP client")]
    ClientBuild(#[source] reqwest::Error),

    #[error("Network request failed for {url} after {attempts} attempt(s)")]
    NetworkRequest {
        url: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error(
        "HTTP request failed for {url} with status {status} after {attempts} attempt(s){}",
        api_reason(.reason)
    )]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        attempts: u32,
        reason: Option<String>,
    },

    #[error("Failed to read response body from {url}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to parse archive response from {url}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

fn api_reason(reason: &Option<String>) -> String {
    reason
        .as_ref()
        .map(|r| format!(": {r}"))
        .unwrap_or_default()
}

#[derive(Debug, Error)]
pub enum ShapeError {
    #[error("Hourly column '{column}' has {found} values but 'time' has {expected} for {city}")]
    LengthMismatch {
        city: String,
        column: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Invalid timestamp '{value}' for {city}")]
    InvalidTimestamp {
        city: String,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Failed building frame for {city}: {source}")]
    Frame {
        city: String,
        #[source]
        source: PolarsError,
    },
}
