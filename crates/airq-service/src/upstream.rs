//! Upstream air-quality provider.
//!
//! [`AirQualityProvider`] abstracts the remote API so the query path can be
//! tested without network access. [`OpenWeatherClient`] is the production
//! implementation; see [`crate::mock::MockProvider`] for tests.

use std::time::Duration;

use airq_types::{AirQualityResponse, Coordinate};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::config::UpstreamConfig;

/// Errors from the upstream provider.
///
/// None of these reach API clients; the query path falls back to synthetic
/// data instead.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// Connection or transport failure.
    #[error("Network error: {0}")]
    Network(String),
    /// The request did not complete within the configured timeout.
    #[error("Request timed out")]
    Timeout,
    /// The provider answered with a non-success status.
    #[error("Upstream returned HTTP {0}")]
    Status(u16),
    /// The body was not a valid air pollution envelope.
    #[error("Failed to decode response: {0}")]
    Decode(String),
    /// No API key is configured, so no request was made.
    #[error("Upstream API key not configured")]
    NotConfigured,
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            UpstreamError::Timeout
        } else if e.is_decode() {
            UpstreamError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            UpstreamError::Status(status.as_u16())
        } else {
            UpstreamError::Network(e.to_string())
        }
    }
}

/// A source of live air-quality data.
///
/// An `Ok` response with an empty `list` is a valid answer and is distinct
/// from an error.
#[async_trait]
pub trait AirQualityProvider: Send + Sync {
    /// Current conditions at `coord`.
    async fn current(&self, coord: Coordinate) -> Result<AirQualityResponse, UpstreamError>;

    /// Hourly forecast for the next four days.
    async fn forecast(&self, coord: Coordinate) -> Result<AirQualityResponse, UpstreamError>;

    /// Historical samples with `start <= dt <= end` (Unix seconds).
    async fn history(
        &self,
        coord: Coordinate,
        start: i64,
        end: i64,
    ) -> Result<AirQualityResponse, UpstreamError>;

    /// Cheap availability probe.
    async fn ping(&self) -> Result<(), UpstreamError>;
}

/// Coordinate used by [`OpenWeatherClient::ping`] (London).
const PING_COORD: (f64, f64) = (51.5074, -0.1278);

/// Client for the OpenWeatherMap air pollution API.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenWeatherClient {
    /// Build a client from configuration.
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| UpstreamError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Whether an API key is available.
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch(
        &self,
        path: &str,
        coord: Coordinate,
        range: Option<(i64, i64)>,
    ) -> Result<AirQualityResponse, UpstreamError> {
        let api_key = self.api_key.as_deref().ok_or(UpstreamError::NotConfigured)?;
        let url = format!("{}{}", self.base_url, path);

        let mut params = vec![
            ("lat", coord.lat().to_string()),
            ("lon", coord.lon().to_string()),
            ("appid", api_key.to_string()),
        ];
        if let Some((start, end)) = range {
            params.push(("start", start.to_string()));
            params.push(("end", end.to_string()));
        }

        debug!("GET {} for {}", url, coord);
        let response = self.client.get(&url).query(&params).send().await?;

        let status = response.status();
        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                debug!("Upstream rejected the API key");
            }
            return Err(UpstreamError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let envelope: AirQualityResponse =
            serde_json::from_str(&body).map_err(|e| UpstreamError::Decode(e.to_string()))?;

        debug!("Upstream returned {} entries for {}", envelope.list.len(), coord);
        Ok(envelope)
    }
}

#[async_trait]
impl AirQualityProvider for OpenWeatherClient {
    async fn current(&self, coord: Coordinate) -> Result<AirQualityResponse, UpstreamError> {
        self.fetch("", coord, None).await
    }

    async fn forecast(&self, coord: Coordinate) -> Result<AirQualityResponse, UpstreamError> {
        self.fetch("/forecast", coord, None).await
    }

    async fn history(
        &self,
        coord: Coordinate,
        start: i64,
        end: i64,
    ) -> Result<AirQualityResponse, UpstreamError> {
        self.fetch("/history", coord, Some((start, end))).await
    }

    async fn ping(&self) -> Result<(), UpstreamError> {
        let coord = Coordinate::new(PING_COORD.0, PING_COORD.1)
            .map_err(|e| UpstreamError::Decode(e.to_string()))?;
        self.current(coord).await.map(|_| ())
    }
}
