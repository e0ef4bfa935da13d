use crate::types::weather_frame::NdjsonError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to read credentials file '{0}'")]
    CredentialsRead(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse credentials file '{0}'")]
    CredentialsParse(PathBuf, #[source] serde_json::Error),

    #[error("Failed to sign token request")]
    TokenSigning(#[from] jsonwebtoken::errors::Error),

    #[error("Failed to build HTTP client")]
    ClientBuild(#[source] reqwest::Error),

    #[error("Network request failed for {0}")]
    NetworkRequest(String, #[source] reqwest::Error),

    #[error("HTTP request failed for {url} with status {status}: {body}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Failed to parse response from {url}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Upload session response from {0} had no Location header")]
    MissingUploadLocation(String),

    #[error("Load job {job_id} failed ({reason}): {message}")]
    JobFailed {
        job_id: String,
        reason: String,
        message: String,
    },

    #[error("Load job {job_id} still {state} after {waited:?}")]
    JobTimeout {
        job_id: String,
        state: String,
        waited: std::time::Duration,
    },

    #[error("Failed to encode rows")]
    Encode(#[from] NdjsonError),

    #[error("Failed to write to '{0}'")]
    FileWrite(PathBuf, #[source] std::io::Error),
}
