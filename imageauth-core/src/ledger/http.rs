//! JSON-over-HTTP client for a ledger gateway, with retry and backoff.
//!
//! The gateway owns the signing keys and the chain connection:
//!
//! - `POST {base}/register` with `{hash, metadata, phash, feature_summary, is_morph}`
//!   answers `{tx_hash, timestamp}` once the transaction is mined.
//! - `GET {base}/verify/{hash}` answers `{verified, timestamp, tx_hash, metadata, is_morph}`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use backoff::{future::retry_notify, ExponentialBackoff};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::{Ledger, LedgerReceipt, LedgerRegistration, LedgerVerification};
use crate::content::ContentHash;
use crate::error::{ImageAuthError, Result};

#[derive(Debug, Clone)]
pub struct HttpLedgerConfig {
    /// Gateway base URL, without trailing slash.
    pub base_url: String,
    /// Per-request timeout. Registration waits for mining, so keep it generous.
    pub timeout: Duration,
    /// Maximum retry attempts for transient errors.
    pub max_retries: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    /// Refuse plain-HTTP gateways.
    pub require_https: bool,
}

impl HttpLedgerConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(60),
            max_retries: 3,
            initial_interval: Duration::from_millis(200),
            max_interval: Duration::from_secs(5),
            require_https: false,
        }
    }
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    hash: String,
    metadata: &'a str,
    phash: &'a str,
    feature_summary: &'a str,
    is_morph: bool,
}

#[derive(Deserialize)]
struct RegisterResponse {
    tx_hash: String,
    timestamp: i64,
}

#[derive(Deserialize)]
struct VerifyResponse {
    verified: bool,
    #[serde(default)]
    timestamp: i64,
    #[serde(default)]
    tx_hash: String,
    #[serde(default)]
    metadata: String,
    #[serde(default)]
    is_morph: bool,
}

/// Ledger reached through an HTTP gateway.
pub struct HttpLedger {
    client: Client,
    config: HttpLedgerConfig,
}

impl HttpLedger {
    pub fn new(config: HttpLedgerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .https_only(config.require_https)
            .build()
            .map_err(|e| ImageAuthError::Ledger(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    fn build_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.config.initial_interval,
            max_interval: self.config.max_interval,
            max_elapsed_time: Some(self.config.timeout * self.config.max_retries),
            ..Default::default()
        }
    }

    /// Send one request and decode the JSON body.
    ///
    /// `connect_only` restricts retries to failures where the request never
    /// reached the gateway, for non-idempotent calls.
    async fn send_once<R: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        connect_only: bool,
    ) -> std::result::Result<R, backoff::Error<ImageAuthError>> {
        let start = Instant::now();

        let response = request.send().await.map_err(|e| {
            let latency_ms = start.elapsed().as_millis() as u64;
            let retry = if connect_only {
                e.is_connect()
            } else {
                is_transient_error(&e)
            };
            if retry {
                warn!(error = %e, latency_ms, "Transient ledger error, will retry");
                backoff::Error::transient(ImageAuthError::Ledger(format!(
                    "Transient error (will retry): {e}"
                )))
            } else {
                warn!(error = %e, latency_ms, "Ledger request failed");
                backoff::Error::permanent(ImageAuthError::Ledger(format!(
                    "Ledger request failed: {e}"
                )))
            }
        })?;

        let status = response.status();
        debug!(status = %status, "Received ledger response");

        if !status.is_success() {
            let latency_ms = start.elapsed().as_millis() as u64;
            let err = ImageAuthError::Ledger(format!("Ledger gateway returned status: {status}"));
            return if !connect_only && is_transient_status(status) {
                warn!(status = %status, latency_ms, "Transient HTTP status, will retry");
                Err(backoff::Error::transient(err))
            } else {
                warn!(status = %status, latency_ms, "Permanent HTTP error");
                Err(backoff::Error::permanent(err))
            };
        }

        let parsed = response.json::<R>().await.map_err(|e| {
            warn!(error = %e, "Failed to parse ledger response");
            backoff::Error::permanent(ImageAuthError::Ledger(format!(
                "Failed to parse ledger response: {e}"
            )))
        })?;

        debug!(
            latency_ms = start.elapsed().as_millis() as u64,
            "Ledger request completed"
        );
        Ok(parsed)
    }

    async fn send_with_retry<R, F>(&self, build: F, connect_only: bool) -> Result<R>
    where
        R: DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder + Send + Sync,
    {
        retry_notify(
            self.build_backoff(),
            || {
                let request = build();
                async move { self.send_once::<R>(request, connect_only).await }
            },
            |err: ImageAuthError, duration: Duration| {
                warn!(
                    error = %err,
                    retry_after_ms = duration.as_millis() as u64,
                    "Retry scheduled"
                );
            },
        )
        .await
    }
}

#[async_trait]
impl Ledger for HttpLedger {
    #[instrument(skip_all, fields(content_hash = %registration.content_hash.short()))]
    async fn register(&self, registration: &LedgerRegistration) -> Result<LedgerReceipt> {
        let url = format!("{}/register", self.config.base_url);
        let body = RegisterRequest {
            hash: registration.content_hash.to_hex(),
            metadata: &registration.metadata,
            phash: &registration.perceptual_hash,
            feature_summary: &registration.feature_summary,
            is_morph: registration.is_morph,
        };

        let response: RegisterResponse = self
            .send_with_retry(|| self.client.post(&url).json(&body), true)
            .await?;

        Ok(LedgerReceipt {
            reference: response.tx_hash,
            timestamp: response.timestamp,
        })
    }

    #[instrument(skip_all, fields(content_hash = %content_hash.short()))]
    async fn verify(&self, content_hash: &ContentHash) -> Result<LedgerVerification> {
        let url = format!("{}/verify/{}", self.config.base_url, content_hash.to_hex());

        let response: VerifyResponse = self
            .send_with_retry(|| self.client.get(&url), false)
            .await?;

        if !response.verified {
            return Ok(LedgerVerification::not_found());
        }
        Ok(LedgerVerification {
            verified: true,
            timestamp: response.timestamp,
            reference: response.tx_hash,
            metadata: response.metadata,
            is_morph: response.is_morph,
        })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Check if a reqwest error is transient and should be retried.
pub fn is_transient_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

/// Check if an HTTP status code indicates a transient error.
pub fn is_transient_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
            | StatusCode::BAD_GATEWAY
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_status_codes() {
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_transient_status(StatusCode::GATEWAY_TIMEOUT));
        assert!(is_transient_status(StatusCode::BAD_GATEWAY));
        assert!(!is_transient_status(StatusCode::NOT_FOUND));
        assert!(!is_transient_status(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = HttpLedgerConfig::new("http://localhost:8545/gateway/");
        assert_eq!(config.base_url, "http://localhost:8545/gateway");
    }

    #[test]
    fn test_register_request_wire_format() {
        let body = RegisterRequest {
            hash: "ab".repeat(32),
            metadata: "m",
            phash: "0011223344556677",
            feature_summary: "",
            is_morph: true,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["phash"], "0011223344556677");
        assert_eq!(json["is_morph"], true);
        assert_eq!(json["hash"].as_str().unwrap().len(), 64);
    }

    #[test]
    fn test_verify_response_defaults() {
        let parsed: VerifyResponse = serde_json::from_str(r#"{"verified": false}"#).unwrap();
        assert!(!parsed.verified);
        assert_eq!(parsed.timestamp, 0);
        assert!(parsed.metadata.is_empty());
        assert!(parsed.tx_hash.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_ledger_error() {
        let mut config = HttpLedgerConfig::new("http://127.0.0.1:9");
        config.timeout = Duration::from_millis(200);
        config.max_retries = 1;
        config.initial_interval = Duration::from_millis(10);
        config.max_interval = Duration::from_millis(20);
        let ledger = HttpLedger::new(config).unwrap();

        let err = ledger
            .verify(&ContentHash::from_bytes(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ImageAuthError::Ledger(_)));
    }
}
