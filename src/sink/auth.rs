//! OAuth2 access tokens for Google APIs from a service-account key file.

use crate::sink::error::SinkError;
use crate::utils::truncate_body;
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Tokens this close to expiry are refreshed before use.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// The fields of a Google service-account JSON key that token exchange needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub project_id: Option<String>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub async fn from_file(path: &Path) -> Result<Self, SinkError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| SinkError::CredentialsRead(path.to_path_buf(), e))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| SinkError::CredentialsParse(path.to_path_buf(), e))
    }
}

/// Supplies bearer tokens for warehouse requests.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, SinkError>;
}

/// A fixed, externally obtained token.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, SinkError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    ASSERTION_LIFETIME_SECS as u64
}

#[derive(Debug)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + REFRESH_MARGIN < self.expires_at
    }
}

/// Exchanges a signed JWT assertion for an access token and caches it until
/// shortly before it expires.
pub struct ServiceAccountTokenSource {
    key: ServiceAccountKey,
    scope: String,
    client: Client,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountTokenSource {
    pub fn new(key: ServiceAccountKey, scope: impl Into<String>, client: Client) -> Self {
        Self {
            key,
            scope: scope.into(),
            client,
            cached: Mutex::new(None),
        }
    }

    fn assertion(&self) -> Result<String, SinkError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: &self.key.client_email,
            scope: &self.scope,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();
        let signing_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())?;
        Ok(encode(&header, &claims, &signing_key)?)
    }

    async fn request_token(&self) -> Result<CachedToken, SinkError> {
        let url = self.key.token_uri.clone();
        let assertion = self.assertion()?;
        debug!("Requesting access token for {}", self.key.client_email);

        let response = self
            .client
            .post(&url)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| SinkError::NetworkRequest(url.clone(), e))?;
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

        let parsed: TokenResponse =
            serde_json::from_str(&body).map_err(|source| SinkError::Decode { url, source })?;
        Ok(CachedToken {
            token: parsed.access_token,
            expires_at: Instant::now() + Duration::from_secs(parsed.expires_in),
        })
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokenSource {
    async fn access_token(&self) -> Result<String, SinkError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|token| token.is_fresh()) {
            return Ok(token.token.clone());
        }
        let fresh = self.request_token().await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve;
    use axum::extract::State;
    use axum::routing::post;
    use axum::{Form, Json, Router};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const TEST_KEY: &str = include_str!("testdata/test_key.pem");

    fn key(token_uri: String) -> ServiceAccountKey {
        ServiceAccountKey {
            client_email: "etl@test-project.iam.gserviceaccount.com".into(),
            private_key: TEST_KEY.into(),
            private_key_id: Some("key-1".into()),
            token_uri,
            project_id: Some("test-project".into()),
        }
    }

    async fn token_server(expires_in: u64) -> (String, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/token",
                post(
                    move |State(calls): State<Arc<AtomicUsize>>,
                          Form(form): Form<HashMap<String, String>>| async move {
                        assert_eq!(form["grant_type"], JWT_BEARER_GRANT);
                        assert_eq!(form["assertion"].split('.').count(), 3);
                        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                        Json(serde_json::json!({
                            "access_token": format!("token-{n}"),
                            "expires_in": expires_in,
                            "token_type": "Bearer"
                        }))
                    },
                ),
            )
            .with_state(calls.clone());
        (format!("{}/token", serve(app).await), calls)
    }

    #[test]
    fn parses_key_file_json() {
        let json = serde_json::json!({
            "type": "service_account",
            "project_id": "p",
            "private_key_id": "abc",
            "private_key": TEST_KEY,
            "client_email": "etl@p.iam.gserviceaccount.com",
            "client_id": "1"
        });
        let key: ServiceAccountKey = serde_json::from_value(json).unwrap();
        assert_eq!(key.token_uri, DEFAULT_TOKEN_URI);
        assert_eq!(key.project_id.as_deref(), Some("p"));
    }

    #[tokio::test]
    async fn missing_key_file_is_a_credentials_error() {
        let err = ServiceAccountKey::from_file(Path::new("/nonexistent/key.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::CredentialsRead(..)));
    }

    #[test]
    fn assertion_is_signed_jwt_with_kid() {
        let source = ServiceAccountTokenSource::new(
            key(DEFAULT_TOKEN_URI.into()),
            BIGQUERY_SCOPE,
            Client::new(),
        );
        let jwt = source.assertion().unwrap();
        let header = jsonwebtoken::decode_header(&jwt).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
        assert_eq!(header.kid.as_deref(), Some("key-1"));
    }

    #[tokio::test]
    async fn token_is_cached_while_fresh() {
        let (uri, calls) = token_server(3600).await;
        let source = ServiceAccountTokenSource::new(key(uri), BIGQUERY_SCOPE, Client::new());

        assert_eq!(source.access_token().await.unwrap(), "token-1");
        assert_eq!(source.access_token().await.unwrap(), "token-1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn nearly_expired_token_is_refreshed() {
        let (uri, calls) = token_server(30).await;
        let source = ServiceAccountTokenSource::new(key(uri), BIGQUERY_SCOPE, Client::new());

        assert_eq!(source.access_token().await.unwrap(), "token-1");
        assert_eq!(source.access_token().await.unwrap(), "token-2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rejected_exchange_is_http_error() {
        let app = Router::new().route(
            "/token",
            post(|| async {
                (
                    axum::http::StatusCode::BAD_REQUEST,
                    r#"{"error":"invalid_grant"}"#,
                )
            }),
        );
        let uri = format!("{}/token", serve(app).await);
        let source = ServiceAccountTokenSource::new(key(uri), BIGQUERY_SCOPE, Client::new());

        let err = source.access_token().await.unwrap_err();
        assert!(matches!(
            err,
            SinkError::HttpStatus { ref body, .. } if body.contains("invalid_grant")
        ));
    }
}
