//! Mock upstream provider for testing.
//!
//! [`MockProvider`] implements [`AirQualityProvider`] without network access.
//!
//! # Features
//!
//! - **Failure injection**: fail every call, or only the next N calls
//! - **Latency simulation**: delay responses to exercise timeouts
//! - **Call counters**: assert how often each operation was hit

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use airq_types::{AirQualityResponse, Components, Coordinate, Sample, Source};
use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::upstream::{AirQualityProvider, UpstreamError};

/// Kind of error an injected failure produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// [`UpstreamError::Network`].
    Network,
    /// [`UpstreamError::Timeout`].
    Timeout,
    /// [`UpstreamError::Status`] with the given code.
    Status(u16),
    /// [`UpstreamError::Decode`].
    Decode,
    /// [`UpstreamError::NotConfigured`].
    NotConfigured,
}

impl MockFailure {
    fn to_error(self) -> UpstreamError {
        match self {
            MockFailure::Network => UpstreamError::Network("mock network failure".to_string()),
            MockFailure::Timeout => UpstreamError::Timeout,
            MockFailure::Status(code) => UpstreamError::Status(code),
            MockFailure::Decode => UpstreamError::Decode("mock decode failure".to_string()),
            MockFailure::NotConfigured => UpstreamError::NotConfigured,
        }
    }
}

/// A scripted upstream provider.
///
/// ```
/// use airq_service::mock::{MockFailure, MockProvider};
/// use airq_service::AirQualityProvider;
/// use airq_types::Coordinate;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let provider = MockProvider::new();
/// let nyc = Coordinate::new(40.7128, -74.0060).unwrap();
///
/// assert_eq!(provider.current(nyc).await.unwrap().list.len(), 1);
///
/// provider.set_failure(Some(MockFailure::Timeout)).await;
/// assert!(provider.current(nyc).await.is_err());
/// assert_eq!(provider.current_calls(), 2);
/// # }
/// ```
#[derive(Debug)]
pub struct MockProvider {
    components: RwLock<Components>,
    history: RwLock<Vec<Sample>>,
    should_fail: AtomicBool,
    failure: RwLock<MockFailure>,
    remaining_failures: AtomicU32,
    latency_ms: AtomicU64,
    current_calls: AtomicU32,
    forecast_calls: AtomicU32,
    history_calls: AtomicU32,
    ping_calls: AtomicU32,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// A provider that answers every call successfully.
    pub fn new() -> Self {
        Self {
            components: RwLock::new(Self::default_components()),
            history: RwLock::new(Vec::new()),
            should_fail: AtomicBool::new(false),
            failure: RwLock::new(MockFailure::Network),
            remaining_failures: AtomicU32::new(0),
            latency_ms: AtomicU64::new(0),
            current_calls: AtomicU32::new(0),
            forecast_calls: AtomicU32::new(0),
            history_calls: AtomicU32::new(0),
            ping_calls: AtomicU32::new(0),
        }
    }

    /// A provider whose every call fails with `failure`.
    pub fn failing(failure: MockFailure) -> Self {
        Self {
            should_fail: AtomicBool::new(true),
            failure: RwLock::new(failure),
            ..Self::new()
        }
    }

    fn default_components() -> Components {
        Components {
            co: 230.31,
            no: 0.12,
            no2: 12.0,
            o3: 68.66,
            so2: 3.2,
            pm2_5: 11.4,
            pm10: 15.9,
            nh3: 0.8,
        }
    }

    /// Fail every call with `failure`, or stop failing with `None`.
    pub async fn set_failure(&self, failure: Option<MockFailure>) {
        if let Some(kind) = failure {
            *self.failure.write().await = kind;
        }
        self.should_fail.store(failure.is_some(), Ordering::Relaxed);
    }

    /// Fail the next `count` calls with a network error, then succeed.
    pub fn set_transient_failures(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::Relaxed);
    }

    /// Delay every response by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Components returned by `current` and `forecast`.
    pub async fn set_components(&self, components: Components) {
        *self.components.write().await = components;
    }

    /// Samples served by `history` (filtered by range).
    pub async fn set_history(&self, samples: Vec<Sample>) {
        *self.history.write().await = samples;
    }

    /// Number of `current` calls.
    pub fn current_calls(&self) -> u32 {
        self.current_calls.load(Ordering::Relaxed)
    }

    /// Number of `forecast` calls.
    pub fn forecast_calls(&self) -> u32 {
        self.forecast_calls.load(Ordering::Relaxed)
    }

    /// Number of `history` calls.
    pub fn history_calls(&self) -> u32 {
        self.history_calls.load(Ordering::Relaxed)
    }

    /// Number of `ping` calls.
    pub fn ping_calls(&self) -> u32 {
        self.ping_calls.load(Ordering::Relaxed)
    }

    async fn check_should_fail(&self) -> Result<(), UpstreamError> {
        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        // Transient failures take precedence
        if self.remaining_failures.load(Ordering::Relaxed) > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(MockFailure::Network.to_error());
        }

        if self.should_fail.load(Ordering::Relaxed) {
            Err(self.failure.read().await.to_error())
        } else {
            Ok(())
        }
    }

    async fn envelope(
        &self,
        coord: Coordinate,
        timestamps: impl Iterator<Item = i64> + Send,
    ) -> AirQualityResponse {
        let components = *self.components.read().await;
        let samples: Vec<Sample> = timestamps
            .map(|ts| Sample::from_components(coord, ts, components))
            .collect();
        AirQualityResponse::from_samples(coord, &samples, Source::Upstream)
    }
}

#[async_trait]
impl AirQualityProvider for MockProvider {
    async fn current(&self, coord: Coordinate) -> Result<AirQualityResponse, UpstreamError> {
        self.current_calls.fetch_add(1, Ordering::Relaxed);
        self.check_should_fail().await?;

        let now = OffsetDateTime::now_utc().unix_timestamp();
        Ok(self.envelope(coord, std::iter::once(now)).await)
    }

    async fn forecast(&self, coord: Coordinate) -> Result<AirQualityResponse, UpstreamError> {
        self.forecast_calls.fetch_add(1, Ordering::Relaxed);
        self.check_should_fail().await?;

        let now = OffsetDateTime::now_utc().unix_timestamp();
        let hour = now - now.rem_euclid(3600);
        Ok(self
            .envelope(coord, (1..=96).map(|h| hour + h * 3600))
            .await)
    }

    async fn history(
        &self,
        coord: Coordinate,
        start: i64,
        end: i64,
    ) -> Result<AirQualityResponse, UpstreamError> {
        self.history_calls.fetch_add(1, Ordering::Relaxed);
        self.check_should_fail().await?;

        let history = self.history.read().await;
        let matching: Vec<&Sample> = history
            .iter()
            .filter(|s| s.coord.bucket_key() == coord.bucket_key())
            .filter(|s| (start..=end).contains(&s.timestamp))
            .collect();
        Ok(AirQualityResponse::from_samples(coord, matching, Source::Upstream))
    }

    async fn ping(&self) -> Result<(), UpstreamError> {
        self.ping_calls.fetch_add(1, Ordering::Relaxed);
        self.check_should_fail().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nyc() -> Coordinate {
        Coordinate::new(40.7128, -74.0060).unwrap()
    }

    #[tokio::test]
    async fn test_mock_current() {
        let provider = MockProvider::new();
        let response = provider.current(nyc()).await.unwrap();

        assert_eq!(response.list.len(), 1);
        assert_eq!(response.coord, nyc());
        assert_eq!(response.list[0].components, MockProvider::default_components());
        assert_eq!(provider.current_calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_forecast_is_hourly() {
        let response = MockProvider::new().forecast(nyc()).await.unwrap();
        assert_eq!(response.list.len(), 96);
        assert!(response.list.windows(2).all(|w| w[1].dt - w[0].dt == 3600));
    }

    #[tokio::test]
    async fn test_mock_failing() {
        let provider = MockProvider::failing(MockFailure::Status(503));
        assert!(matches!(
            provider.current(nyc()).await,
            Err(UpstreamError::Status(503))
        ));
        assert!(matches!(provider.ping().await, Err(UpstreamError::Status(503))));
        assert_eq!(provider.ping_calls(), 1);

        provider.set_failure(None).await;
        assert!(provider.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_transient_failures() {
        let provider = MockProvider::new();
        provider.set_transient_failures(2);

        assert!(provider.forecast(nyc()).await.is_err());
        assert!(provider.forecast(nyc()).await.is_err());
        assert!(provider.forecast(nyc()).await.is_ok());
        assert_eq!(provider.forecast_calls(), 3);
    }

    #[tokio::test]
    async fn test_mock_history_filters_range_and_bucket() {
        let provider = MockProvider::new();
        let london = Coordinate::new(51.5074, -0.1278).unwrap();
        let components = Components::default();
        provider
            .set_history(vec![
                Sample::from_components(nyc(), 100, components),
                Sample::from_components(nyc(), 200, components),
                Sample::from_components(nyc(), 300, components),
                Sample::from_components(london, 200, components),
            ])
            .await;

        let response = provider.history(nyc(), 150, 300).await.unwrap();
        let times: Vec<i64> = response.list.iter().map(|e| e.dt).collect();
        assert_eq!(times, vec![200, 300]);
        assert_eq!(provider.history_calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_history_empty_is_ok() {
        let response = MockProvider::new().history(nyc(), 0, 10).await.unwrap();
        assert!(response.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_latency() {
        let provider = MockProvider::new();
        provider.set_latency(Duration::from_secs(30));

        let result = tokio::time::timeout(Duration::from_secs(1), provider.ping()).await;
        assert!(result.is_err());
    }
}
