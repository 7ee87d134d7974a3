//! Query path for current, forecast and historical data.
//!
//! Each operation tries the upstream provider first and substitutes
//! synthetic data when it cannot answer. Historical queries are served from
//! the local store when it already holds samples for the range.

use std::sync::Arc;

use airq_store::{Store, StoredSample};
use airq_types::{AirQualityResponse, Coordinate, Sample, Source, ValidationError};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::macros::{format_description, time};
use time::{Date, OffsetDateTime, Time};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{CityConfig, city_near};
use crate::generator::{HOUR, SyntheticGenerator};
use crate::upstream::AirQualityProvider;

/// Number of forecast slots generated when the provider is unavailable.
pub const FORECAST_SLOTS: usize = 32;
/// Spacing of generated forecast slots.
pub const FORECAST_STEP: i64 = 3 * HOUR;
/// Longest range a historical query may cover.
pub const MAX_HISTORY_RANGE_DAYS: u32 = 366;

/// Errors from the query path.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// Caller input was rejected before any store access.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The sample store failed.
    #[error("Storage error: {0}")]
    Store(#[from] airq_store::Error),
}

/// Reachability of the upstream provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamStatus {
    Available,
    Unavailable,
}

/// Serves air-quality queries.
pub struct QueryService {
    provider: Arc<dyn AirQualityProvider>,
    generator: SyntheticGenerator,
    store: Arc<Mutex<Store>>,
    cities: Vec<CityConfig>,
    persist_backfill: bool,
}

impl QueryService {
    /// Create a query service.
    pub fn new(
        provider: Arc<dyn AirQualityProvider>,
        store: Arc<Mutex<Store>>,
        cities: Vec<CityConfig>,
        persist_backfill: bool,
    ) -> Self {
        Self {
            provider,
            generator: SyntheticGenerator::new(),
            store,
            cities,
            persist_backfill,
        }
    }

    /// Current conditions as a single-entry envelope.
    ///
    /// Never writes to the store.
    pub async fn current(&self, coord: Coordinate) -> AirQualityResponse {
        let (sample, source) = self.current_sample(coord).await;
        AirQualityResponse::from_samples(coord, [&sample], source)
            .with_location_name(self.location_name(&coord))
    }

    /// Current sample for `coord`, from upstream or synthetic.
    ///
    /// Any upstream failure, including an empty answer, falls back to the
    /// generator.
    pub async fn current_sample(&self, coord: Coordinate) -> (Sample, Source) {
        match self.provider.current(coord).await {
            Ok(response) => {
                if let Some(entry) = response.list.first() {
                    return (entry.into_sample(coord), Source::Upstream);
                }
                warn!("Upstream returned no current data for {}, using fallback", coord);
            }
            Err(e) => warn!("Upstream current failed for {}: {}, using fallback", coord, e),
        }

        let sample = self.generator.generate(coord, now_unix());
        (sample, Source::Synthetic)
    }

    /// Four-day forecast.
    ///
    /// Falls back to [`FORECAST_SLOTS`] generated slots every
    /// [`FORECAST_STEP`] seconds starting one step after the current hour.
    pub async fn forecast(&self, coord: Coordinate) -> AirQualityResponse {
        let location_name = self.location_name(&coord);

        match self.provider.forecast(coord).await {
            Ok(mut response) if !response.is_empty() => {
                response.list.sort_by_key(|e| e.dt);
                response.coord = coord;
                response.source = Some(Source::Upstream);
                return response.with_location_name(location_name);
            }
            Ok(_) => warn!("Upstream returned an empty forecast for {}, using fallback", coord),
            Err(e) => warn!("Upstream forecast failed for {}: {}, using fallback", coord, e),
        }

        let now = now_unix();
        let start = now - now.rem_euclid(HOUR) + FORECAST_STEP;
        let samples = self
            .generator
            .generate_trend(coord, start, FORECAST_SLOTS, FORECAST_STEP);

        AirQualityResponse::from_samples(coord, &samples, Source::Synthetic)
            .with_location_name(location_name)
    }

    /// Samples for `coord` between `start` and `end`, oldest first.
    ///
    /// Dates are `YYYY-MM-DD` (start of day / end of day, UTC) or RFC 3339
    /// instants. Input is validated before the store is touched.
    ///
    /// When the store has nothing for the range, upstream history is tried,
    /// then hourly synthetic samples across the whole window. Backfilled rows
    /// are persisted unless disabled, so the same query is afterwards served
    /// from the store.
    pub async fn historical(
        &self,
        coord: Coordinate,
        start: &str,
        end: &str,
    ) -> Result<AirQualityResponse, QueryError> {
        let (start, end) = parse_range(start, end)?;
        let location_name = self.location_name(&coord);

        let stored = {
            let store = self.store.lock().await;
            store.query_range(coord, start, end)?
        };
        if !stored.is_empty() {
            return Ok(from_store(coord, &stored).with_location_name(location_name));
        }

        let (samples, source) = match self.upstream_history(coord, start, end).await {
            Some(samples) => (samples, Source::Upstream),
            None => {
                let samples = self.generator.generate_series(coord, start, end, HOUR);
                (samples, Source::Synthetic)
            }
        };

        if self.persist_backfill && !samples.is_empty() {
            let store = self.store.lock().await;

            // A concurrent request may have filled the range while upstream was queried
            let stored = store.query_range(coord, start, end)?;
            if !stored.is_empty() {
                return Ok(from_store(coord, &stored).with_location_name(location_name));
            }

            match store.append_batch(&samples, source, location_name.as_deref()) {
                Ok(count) => info!("Backfilled {} samples for {} ({})", count, coord, source),
                Err(e) => warn!("Failed to persist backfill for {}: {}", coord, e),
            }
        }

        Ok(AirQualityResponse::from_samples(coord, &samples, source)
            .with_location_name(location_name))
    }

    async fn upstream_history(
        &self,
        coord: Coordinate,
        start: i64,
        end: i64,
    ) -> Option<Vec<Sample>> {
        match self.provider.history(coord, start, end).await {
            Ok(response) => {
                let mut samples: Vec<Sample> = response
                    .samples(coord)
                    .into_iter()
                    .filter(|s| (start..=end).contains(&s.timestamp))
                    .collect();
                if samples.is_empty() {
                    debug!("Upstream history empty for {}", coord);
                    return None;
                }
                samples.sort_by_key(|s| s.timestamp);
                Some(samples)
            }
            Err(e) => {
                warn!("Upstream history failed for {}: {}, using fallback", coord, e);
                None
            }
        }
    }

    /// Probe the upstream provider.
    pub async fn upstream_status(&self) -> UpstreamStatus {
        match self.provider.ping().await {
            Ok(()) => UpstreamStatus::Available,
            Err(e) => {
                debug!("Upstream probe failed: {}", e);
                UpstreamStatus::Unavailable
            }
        }
    }

    /// Name of a configured city near `coord`.
    pub fn location_name(&self, coord: &Coordinate) -> Option<String> {
        city_near(&self.cities, coord).map(|city| city.name.clone())
    }
}

/// Parse a historical range into inclusive Unix timestamps.
///
/// ```
/// use airq_service::query::parse_range;
///
/// let (start, end) = parse_range("2025-06-25", "2025-07-02").unwrap();
/// assert_eq!(end - start + 1, 8 * 86_400);
/// assert!(parse_range("2025-07-02", "2025-06-25").is_err());
/// ```
pub fn parse_range(start: &str, end: &str) -> Result<(i64, i64), ValidationError> {
    let start = parse_date("start", start, Time::MIDNIGHT)?;
    let end = parse_date("end", end, time!(23:59:59))?;

    if start > end {
        return Err(ValidationError::InvertedRange { start, end });
    }
    if end - start >= i64::from(MAX_HISTORY_RANGE_DAYS) * 24 * HOUR {
        return Err(ValidationError::RangeTooLong {
            max_days: MAX_HISTORY_RANGE_DAYS,
        });
    }

    Ok((start, end))
}

fn parse_date(field: &'static str, value: &str, time_of_day: Time) -> Result<i64, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::MissingParameter(field));
    }

    if let Ok(date) = Date::parse(value, format_description!("[year]-[month]-[day]")) {
        return Ok(date.with_time(time_of_day).assume_utc().unix_timestamp());
    }

    OffsetDateTime::parse(value, &Rfc3339)
        .map(|dt| dt.unix_timestamp())
        .map_err(|_| ValidationError::InvalidDate {
            field,
            value: value.to_string(),
        })
}

fn from_store(coord: Coordinate, stored: &[StoredSample]) -> AirQualityResponse {
    debug!("Serving {} stored samples for {}", stored.len(), coord);
    let samples: Vec<Sample> = stored.iter().map(StoredSample::to_sample).collect();
    AirQualityResponse::from_samples(coord, &samples, Source::LocalDatabase)
}

fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}
