//! Appends weather rows to a BigQuery table through load jobs.
//!
//! Each [`RowSink::append`] call becomes one load job: the rows are uploaded as
//! newline-delimited JSON through a resumable upload session, then the job is
//! polled until BigQuery reports it done. The job appends to the table, creates
//! it when missing, infers column types, and may add new columns. A load job
//! either commits all of its rows or none of them.

use crate::config::Settings;
use crate::sink::auth::{
    ServiceAccountKey, ServiceAccountTokenSource, TokenSource, BIGQUERY_SCOPE,
};
use crate::sink::error::SinkError;
use crate::sink::RowSink;
use crate::types::weather_frame::WeatherFrame;
use crate::utils::truncate_body;
use crate::weather_data::retry::RetryPolicy;
use async_trait::async_trait;
use bon::bon;
use log::{debug, info, warn};
use reqwest::header::LOCATION;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_API_URL: &str = "https://bigquery.googleapis.com";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(600);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Fully qualified destination table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl TableRef {
    pub fn new(
        project_id: impl Into<String>,
        dataset_id: impl Into<String>,
        table_id: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            dataset_id: dataset_id.into(),
            table_id: table_id.into(),
        }
    }
}

/// Formats as `project.dataset.table`.
impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobRequest<'a> {
    configuration: JobConfiguration<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobConfiguration<'a> {
    load: LoadConfiguration<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoadConfiguration<'a> {
    destination_table: TableReference<'a>,
    source_format: &'static str,
    write_disposition: &'static str,
    create_disposition: &'static str,
    autodetect: bool,
    schema_update_options: [&'static str; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TableReference<'a> {
    project_id: &'a str,
    dataset_id: &'a str,
    table_id: &'a str,
}

impl<'a> JobRequest<'a> {
    fn append_ndjson(table: &'a TableRef) -> Self {
        Self {
            configuration: JobConfiguration {
                load: LoadConfiguration {
                    destination_table: TableReference {
                        project_id: &table.project_id,
                        dataset_id: &table.dataset_id,
                        table_id: &table.table_id,
                    },
                    source_format: "NEWLINE_DELIMITED_JSON",
                    write_disposition: "WRITE_APPEND",
                    create_disposition: "CREATE_IF_NEEDED",
                    autodetect: true,
                    schema_update_options: ["ALLOW_FIELD_ADDITION"],
                },
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Job {
    job_reference: JobReference,
    status: Option<JobStatus>,
    statistics: Option<JobStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    project_id: String,
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    state: String,
    error_result: Option<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    reason: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobStatistics {
    load: Option<LoadStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadStatistics {
    // int64 values travel as JSON strings
    output_rows: Option<String>,
}

impl Job {
    fn state(&self) -> &str {
        self.status.as_ref().map(|s| s.state.as_str()).unwrap_or("PENDING")
    }

    fn is_done(&self) -> bool {
        self.state() == "DONE"
    }

    fn output_rows(&self) -> Option<usize> {
        self.statistics
            .as_ref()?
            .load
            .as_ref()?
            .output_rows
            .as_ref()?
            .parse()
            .ok()
    }
}

/// [`RowSink`] that loads rows into a BigQuery table.
pub struct BigQuerySink {
    client: Client,
    api_url: String,
    table: TableRef,
    tokens: Arc<dyn TokenSource>,
    poll_interval: Duration,
    job_timeout: Duration,
    retry: RetryPolicy,
}

#[bon]
impl BigQuerySink {
    /// Creates a sink for `table`, authenticating every request with `tokens`.
    ///
    /// # Arguments
    ///
    /// * `api_url` - Scheme and host of the BigQuery API. Defaults to [`DEFAULT_API_URL`].
    /// * `poll_interval` - Wait between job status checks. Defaults to [`DEFAULT_POLL_INTERVAL`].
    /// * `job_timeout` - How long to wait for a job before giving up.
    ///   Defaults to [`DEFAULT_JOB_TIMEOUT`].
    /// * `retry` - Retries for job status checks, which are plain reads.
    ///   Defaults to [`RetryPolicy::default`].
    #[builder]
    pub fn new(
        table: TableRef,
        tokens: Arc<dyn TokenSource>,
        api_url: Option<String>,
        poll_interval: Option<Duration>,
        job_timeout: Option<Duration>,
        retry: Option<RetryPolicy>,
    ) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(SinkError::ClientBuild)?;
        Ok(Self {
            client,
            api_url: api_url
                .unwrap_or_else(|| DEFAULT_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            table,
            tokens,
            poll_interval: poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL),
            job_timeout: job_timeout.unwrap_or(DEFAULT_JOB_TIMEOUT),
            retry: retry.unwrap_or_default(),
        })
    }

    /// Creates a sink for the table named in `settings`, authenticated with
    /// the service-account key file it points to.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::CredentialsRead`] or [`SinkError::CredentialsParse`]
    /// if the key file is missing or malformed.
    pub async fn from_settings(settings: &Settings) -> Result<Self, SinkError> {
        let key = ServiceAccountKey::from_file(&settings.credentials_path).await?;
        let auth_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(SinkError::ClientBuild)?;
        let tokens = ServiceAccountTokenSource::new(key, BIGQUERY_SCOPE, auth_client);
        Self::builder()
            .table(settings.table())
            .tokens(Arc::new(tokens))
            .build()
    }

    pub fn table(&self) -> &TableRef {
        &self.table
    }

    /// Opens a resumable upload session for a new load job and returns its URL.
    async fn start_upload(&self, token: &str) -> Result<String, SinkError> {
        let url = format!(
            "{}/upload/bigquery/v2/projects/{}/jobs?uploadType=resumable",
            self.api_url, self.table.project_id
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header("X-Upload-Content-Type", "application/octet-stream")
            .json(&JobRequest::append_ndjson(&self.table))
            .send()
            .await
            .map_err(|e| SinkError::NetworkRequest(url.clone(), e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::HttpStatus {
                url,
                status,
                body: truncate_body(&body),
            });
        }
        response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or(SinkError::MissingUploadLocation(url))
    }

    /// Reads the job's current state. Each attempt asks for a current token,
    /// since a long load can outlive the one used for the upload. Transient
    /// failures are retried.
    async fn job_status(&self, job: &JobReference) -> Result<Job, SinkError> {
        let url = format!(
            "{}/bigquery/v2/projects/{}/jobs/{}",
            self.api_url, job.project_id, job.job_id
        );
        let mut attempt = 0;
        loop {
            attempt += 1;
            let token = self.tokens.access_token().await?;
            let mut request = self.client.get(&url).bearer_auth(&token);
            if let Some(location) = &job.location {
                request = request.query(&[("location", location)]);
            }
            let can_retry = self.retry.has_attempts_left(attempt);

            match request.send().await {
                Ok(response)
                    if can_retry && self.retry.is_retryable_status(response.status()) =>
                {
                    let wait = self.retry.backoff_for_response(attempt, response.headers());
                    warn!(
                        "Status check for job {} returned {}, retrying in {:?}",
                        job.job_id,
                        response.status(),
                        wait
                    );
                    tokio::time::sleep(wait).await;
                }
                Ok(response) => return read_json(url, response).await,
                Err(e) if can_retry && (e.is_timeout() || e.is_connect()) => {
                    let wait = self.retry.backoff(attempt);
                    warn!(
                        "Status check for job {} failed ({}), retrying in {:?}",
                        job.job_id, e, wait
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => return Err(SinkError::NetworkRequest(url, e)),
            }
        }
    }

    async fn wait_for(&self, mut job: Job) -> Result<Job, SinkError> {
        let started = Instant::now();
        while !job.is_done() {
            if started.elapsed() >= self.job_timeout {
                return Err(SinkError::JobTimeout {
                    job_id: job.job_reference.job_id.clone(),
                    state: job.state().to_string(),
                    waited: started.elapsed(),
                });
            }
            debug!("Load job {} is {}", job.job_reference.job_id, job.state());
            tokio::time::sleep(self.poll_interval).await;
            job = self.job_status(&job.job_reference).await?;
        }

        if let Some(error) = job.status.as_ref().and_then(|s| s.error_result.as_ref()) {
            return Err(SinkError::JobFailed {
                job_id: job.job_reference.job_id.clone(),
                reason: error.reason.clone().unwrap_or_else(|| "unknown".into()),
                message: error.message.clone().unwrap_or_default(),
            });
        }
        Ok(job)
    }
}

async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
    url: String,
) -> Result<T, SinkError> {
    let response = request
        .send()
        .await
        .map_err(|e| SinkError::NetworkRequest(url.clone(), e))?;
    read_json(url, response).await
}

async fn read_json<T: DeserializeOwned>(url: String, response: Response) -> Result<T, SinkError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| SinkError::NetworkRequest(url.clone(), e))?;
    if !status.is_success() {
        return Err(SinkError::HttpStatus {
            url,
            status,
            body: truncate_body(&body),
        });
    }
    serde_json::from_str(&body).map_err(|source| SinkError::Decode { url, source })
}

#[async_trait]
impl RowSink for BigQuerySink {
    async fn append(&self, frame: &WeatherFrame) -> Result<usize, SinkError> {
        if frame.is_empty() {
            return Ok(0);
        }
        let payload = frame.to_ndjson()?;
        let token = self.tokens.access_token().await?;

        let session_url = self.start_upload(&token).await?;
        let upload = self
            .client
            .put(&session_url)
            .bearer_auth(&token)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(payload);
        let job: Job = send_json(upload, session_url).await?;
        debug!(
            "Started load job {} into {}",
            job.job_reference.job_id, self.table
        );

        let job = self.wait_for(job).await?;
        let rows = job.output_rows().unwrap_or_else(|| frame.height());
        info!("Loaded {} rows into {}", rows, self.table);
        Ok(rows)
    }

    fn destination(&self) -> String {
        self.table.to_string()
    }
}
