//! HTTP access to the Open-Meteo historical archive.

use crate::types::city::LatLon;
use crate::types::date_window::DateWindow;
use crate::weather_data::error::FetchError;
use crate::weather_data::raw_observation::{ApiErrorBody, RawObservation};
use crate::weather_data::retry::RetryPolicy;
use async_trait::async_trait;
use bon::bon;
use log::{debug, warn};
use reqwest::{Client, Request, Response};
use std::time::Duration;

pub const DEFAULT_ARCHIVE_URL: &str = "https://archive-api.open-meteo.com";
pub const ARCHIVE_PATH: &str = "/v1/archive";
pub const HOURLY_VARIABLES: &str = "temperature_2m,relative_humidity_2m";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Anything that can produce raw hourly observations for a location and window.
#[async_trait]
pub trait ObservationSource: Send + Sync {
    async fn fetch(
        &self,
        location: LatLon,
        window: DateWindow,
    ) -> Result<RawObservation, FetchError>;
}

/// Fetches hourly temperature and relative humidity from the archive API.
///
/// Timestamps are requested in the location's own timezone (`timezone=auto`).
/// Transient failures are retried according to the configured [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct ArchiveFetcher {
    client: Client,
    endpoint: String,
    timeout: Duration,
    retry: RetryPolicy,
}

#[bon]
impl ArchiveFetcher {
    /// Creates a fetcher.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Scheme and host of the API. Defaults to [`DEFAULT_ARCHIVE_URL`].
    /// * `timeout` - Per-attempt timeout. Defaults to [`DEFAULT_TIMEOUT`].
    /// * `retry` - Retry policy. Defaults to [`RetryPolicy::default`].
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use weather_etl::{ArchiveFetcher, FetchError};
    /// # fn main() -> Result<(), FetchError> {
    /// let fetcher = ArchiveFetcher::builder().build()?;
    /// # Ok(())
    /// # }
    /// ```
    #[builder]
    pub fn new(
        base_url: Option<String>,
        timeout: Option<Duration>,
        retry: Option<RetryPolicy>,
    ) -> Result<Self, FetchError> {
        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FetchError::ClientBuild)?;
        let base_url = base_url.unwrap_or_else(|| DEFAULT_ARCHIVE_URL.to_string());
        Ok(Self {
            client,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), ARCHIVE_PATH),
            timeout,
            retry: retry.unwrap_or_default(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Limit on each single attempt, not on the whole retried fetch.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn build_request(&self, location: LatLon, window: DateWindow) -> Result<Request, FetchError> {
        self.client
            .get(&self.endpoint)
            .query(&[
                ("latitude", location.0.to_string()),
                ("longitude", location.1.to_string()),
                ("start_date", window.start().to_string()),
                ("end_date", window.end().to_string()),
                ("hourly", HOURLY_VARIABLES.to_string()),
                ("timezone", "auto".to_string()),
            ])
            .build()
            .map_err(|source| FetchError::NetworkRequest {
                url: self.endpoint.clone(),
                attempts: 0,
                source,
            })
    }

    async fn decode(url: String, response: Response) -> Result<RawObservation, FetchError> {
        let body = response
            .bytes()
            .await
            .map_err(|source| FetchError::Body {
                url: url.clone(),
                source,
            })?;
        serde_json::from_slice(&body).map_err(|source| FetchError::Decode { url, source })
    }

    async fn error_reason(response: Response) -> Option<String> {
        let body = response.bytes().await.ok()?;
        serde_json::from_slice::<ApiErrorBody>(&body)
            .ok()
            .filter(|parsed| parsed.error)
            .and_then(|parsed| parsed.reason)
    }
}

#[async_trait]
impl ObservationSource for ArchiveFetcher {
    async fn fetch(
        &self,
        location: LatLon,
        window: DateWindow,
    ) -> Result<RawObservation, FetchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let request = self.build_request(location, window)?;
            let url = request.url().to_string();
            let can_retry =
                self.retry.allows(request.method()) && self.retry.has_attempts_left(attempt);
            debug!("Requesting {} (attempt {})", url, attempt);

            match self.client.execute(request).await {
                Ok(response) if response.status().is_success() => {
                    return Self::decode(url, response).await;
                }
                Ok(response) => {
                    let status = response.status();
                    if can_retry && self.retry.is_retryable_status(status) {
                        let wait = self.retry.backoff_for_response(attempt, response.headers());
                        warn!(
                            "Archive returned {} for {}, retrying in {:?}",
                            status, url, wait
                        );
                        tokio::time::sleep(wait).await;
                        continue;
                    }
                    let reason = Self::error_reason(response).await;
                    return Err(FetchError::HttpStatus {
                        url,
                        status,
                        attempts: attempt,
                        reason,
                    });
                }
                Err(e) if can_retry && (e.is_timeout() || e.is_connect()) => {
                    let wait = self.retry.backoff(attempt);
                    warn!("Request to {} failed ({}), retrying in {:?}", url, e, wait);
                    tokio::time::sleep(wait).await;
                }
                Err(source) => {
                    return Err(FetchError::NetworkRequest {
                        url,
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }
}
