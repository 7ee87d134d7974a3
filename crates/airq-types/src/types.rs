//! Core types for air-quality samples.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Number of decimal places kept when bucketing coordinates.
///
/// Two decimals is roughly 1.1 km of latitude, which groups requests for the
/// same city without merging neighbouring ones.
pub const BUCKET_DECIMALS: i32 = 2;

const BUCKET_SCALE: f64 = 100.0;

/// Round a latitude or longitude to bucket precision.
///
/// Uses half-away-from-zero rounding so that the bucket of `-x` is the
/// negation of the bucket of `x`.
///
/// ```
/// use airq_types::round_coordinate;
///
/// assert_eq!(round_coordinate(40.7128), 40.71);
/// assert_eq!(round_coordinate(-74.0060), -74.01);
/// assert_eq!(round_coordinate(2.3522), 2.35);
/// ```
#[must_use]
pub fn round_coordinate(value: f64) -> f64 {
    (value * BUCKET_SCALE).round() / BUCKET_SCALE
}

fn bucket_component(value: f64) -> i32 {
    (value * BUCKET_SCALE).round() as i32
}

/// Integer key identifying a coordinate bucket.
///
/// Stored alongside each sample so lookups never depend on float equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey {
    /// Latitude in hundredths of a degree.
    pub lat: i32,
    /// Longitude in hundredths of a degree.
    pub lon: i32,
}

/// A validated geographic coordinate.
///
/// Construction rejects non-finite values and values outside the valid
/// latitude/longitude ranges, so every `Coordinate` in the system is usable
/// as a store key.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "RawCoordinate"))]
pub struct Coordinate {
    lat: f64,
    lon: f64,
}

#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct RawCoordinate {
    lat: f64,
    lon: f64,
}

#[cfg(feature = "serde")]
impl TryFrom<RawCoordinate> for Coordinate {
    type Error = ValidationError;

    fn try_from(raw: RawCoordinate) -> Result<Self, Self::Error> {
        Coordinate::new(raw.lat, raw.lon)
    }
}

impl Coordinate {
    /// Create a coordinate, validating both axes.
    ///
    /// ```
    /// use airq_types::Coordinate;
    ///
    /// assert!(Coordinate::new(40.7128, -74.0060).is_ok());
    /// assert!(Coordinate::new(91.0, 0.0).is_err());
    /// assert!(Coordinate::new(0.0, f64::NAN).is_err());
    /// ```
    pub fn new(lat: f64, lon: f64) -> Result<Self, ValidationError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(ValidationError::InvalidLatitude(lat));
        }
        if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
            return Err(ValidationError::InvalidLongitude(lon));
        }
        Ok(Self { lat, lon })
    }

    /// Latitude in degrees.
    #[must_use]
    pub fn lat(&self) -> f64 {
        self.lat
    }

    /// Longitude in degrees.
    #[must_use]
    pub fn lon(&self) -> f64 {
        self.lon
    }

    /// The coordinate rounded to bucket precision.
    ///
    /// Rounding cannot leave the valid range, so the result is always a
    /// valid coordinate.
    #[must_use]
    pub fn bucket(&self) -> Self {
        Self {
            lat: round_coordinate(self.lat),
            lon: round_coordinate(self.lon),
        }
    }

    /// Integer bucket key for storage lookups.
    #[must_use]
    pub fn bucket_key(&self) -> BucketKey {
        BucketKey {
            lat: bucket_component(self.lat),
            lon: bucket_component(self.lon),
        }
    }

    /// Whether `other` lies within `tolerance` degrees on both axes.
    #[must_use]
    pub fn is_near(&self, other: &Coordinate, tolerance: f64) -> bool {
        (self.lat - other.lat).abs() < tolerance && (self.lon - other.lon).abs() < tolerance
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.lat, self.lon)
    }
}

/// Upper bounds (exclusive) of PM2.5 bands for AQI 1-4, in µg/m³.
pub const PM2_5_BANDS: [f64; 4] = [10.0, 25.0, 50.0, 75.0];

/// Upper bounds (exclusive) of PM10 bands for AQI 1-4, in µg/m³.
pub const PM10_BANDS: [f64; 4] = [20.0, 50.0, 100.0, 200.0];

/// Air Quality Index on the 1-5 ordinal scale.
///
/// `1` is good and `5` is very poor. Ordering follows severity.
///
/// ```
/// use airq_types::AqiIndex;
///
/// assert!(AqiIndex::VERY_POOR > AqiIndex::GOOD);
/// assert_eq!(AqiIndex::try_from(3).unwrap().value(), 3);
/// assert!(AqiIndex::try_from(0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "u8", into = "u8"))]
pub struct AqiIndex(u8);

impl AqiIndex {
    /// Good.
    pub const GOOD: Self = Self(1);
    /// Fair.
    pub const FAIR: Self = Self(2);
    /// Moderate.
    pub const MODERATE: Self = Self(3);
    /// Poor.
    pub const POOR: Self = Self(4);
    /// Very poor.
    pub const VERY_POOR: Self = Self(5);

    /// The ordinal value (1-5).
    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }

    /// Derive the index from particulate concentrations.
    ///
    /// Each pollutant is mapped to a band using [`PM2_5_BANDS`] and
    /// [`PM10_BANDS`]; the worse of the two wins. Non-finite or negative
    /// inputs are treated as zero.
    ///
    /// ```
    /// use airq_types::AqiIndex;
    ///
    /// assert_eq!(AqiIndex::from_particulates(5.0, 10.0), AqiIndex::GOOD);
    /// assert_eq!(AqiIndex::from_particulates(30.0, 10.0), AqiIndex::MODERATE);
    /// assert_eq!(AqiIndex::from_particulates(5.0, 250.0), AqiIndex::VERY_POOR);
    /// ```
    #[must_use]
    pub fn from_particulates(pm2_5: f64, pm10: f64) -> Self {
        band(pm2_5, &PM2_5_BANDS).max(band(pm10, &PM10_BANDS))
    }

    /// Short label for the level.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self.0 {
            1 => "Good",
            2 => "Fair",
            3 => "Moderate",
            4 => "Poor",
            _ => "Very Poor",
        }
    }
}

fn band(value: f64, bounds: &[f64; 4]) -> AqiIndex {
    let value = if value.is_finite() { value.max(0.0) } else { 0.0 };
    let position = bounds.iter().position(|&upper| value < upper);
    AqiIndex(position.map_or(5, |i| i as u8 + 1))
}

impl TryFrom<u8> for AqiIndex {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (1..=5).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ValidationError::InvalidAqi(value))
        }
    }
}

impl From<AqiIndex> for u8 {
    fn from(index: AqiIndex) -> Self {
        index.0
    }
}

impl fmt::Display for AqiIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.label())
    }
}

/// Pollutant concentrations in µg/m³.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Components {
    /// Carbon monoxide.
    pub co: f64,
    /// Nitrogen monoxide.
    pub no: f64,
    /// Nitrogen dioxide.
    pub no2: f64,
    /// Ozone.
    pub o3: f64,
    /// Sulphur dioxide.
    pub so2: f64,
    /// Fine particulate matter.
    pub pm2_5: f64,
    /// Coarse particulate matter.
    pub pm10: f64,
    /// Ammonia.
    pub nh3: f64,
}

impl Components {
    /// Field names in wire order.
    pub const NAMES: [&'static str; 8] = ["co", "no", "no2", "o3", "so2", "pm2_5", "pm10", "nh3"];

    /// Values in the same order as [`Components::NAMES`].
    #[must_use]
    pub fn values(&self) -> [f64; 8] {
        [
            self.co, self.no, self.no2, self.o3, self.so2, self.pm2_5, self.pm10, self.nh3,
        ]
    }

    /// Whether every concentration is finite and non-negative.
    #[must_use]
    pub fn is_physical(&self) -> bool {
        self.values().iter().all(|v| v.is_finite() && *v >= 0.0)
    }

    /// Replace negative or non-finite concentrations with zero.
    #[must_use]
    pub fn clamped(self) -> Self {
        let fix = |v: f64| if v.is_finite() { v.max(0.0) } else { 0.0 };
        Self {
            co: fix(self.co),
            no: fix(self.no),
            no2: fix(self.no2),
            o3: fix(self.o3),
            so2: fix(self.so2),
            pm2_5: fix(self.pm2_5),
            pm10: fix(self.pm10),
            nh3: fix(self.nh3),
        }
    }
}

/// One timestamped air-quality observation for a coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Sample {
    /// Location the sample describes.
    pub coord: Coordinate,
    /// Observation time, Unix seconds.
    pub timestamp: i64,
    /// AQI ordinal.
    pub aqi: AqiIndex,
    /// Pollutant concentrations.
    pub components: Components,
}

impl Sample {
    /// Build a sample whose AQI is derived from its particulates.
    #[must_use]
    pub fn from_components(coord: Coordinate, timestamp: i64, components: Components) -> Self {
        Self {
            coord,
            timestamp,
            aqi: AqiIndex::from_particulates(components.pm2_5, components.pm10),
            components,
        }
    }
}

/// Which path produced a response or a stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Source {
    /// Live data from the upstream provider.
    #[cfg_attr(feature = "serde", serde(rename = "OpenWeatherMap API"))]
    Upstream,
    /// Generated because the upstream provider was unavailable.
    #[cfg_attr(feature = "serde", serde(rename = "Synthetic Fallback"))]
    Synthetic,
    /// Read back from the local sample store.
    #[cfg_attr(feature = "serde", serde(rename = "Local Database"))]
    LocalDatabase,
}

impl Source {
    /// Wire and storage label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Upstream => "OpenWeatherMap API",
            Source::Synthetic => "Synthetic Fallback",
            Source::LocalDatabase => "Local Database",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OpenWeatherMap API" => Ok(Source::Upstream),
            "Synthetic Fallback" => Ok(Source::Synthetic),
            "Local Database" => Ok(Source::LocalDatabase),
            other => Err(ValidationError::UnknownSource(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_bounds() {
        assert!(Coordinate::new(90.0, 180.0).is_ok());
        assert!(Coordinate::new(-90.0, -180.0).is_ok());
        assert_eq!(
            Coordinate::new(-90.5, 0.0),
            Err(ValidationError::InvalidLatitude(-90.5))
        );
        assert_eq!(
            Coordinate::new(0.0, 180.01),
            Err(ValidationError::InvalidLongitude(180.01))
        );
        assert!(Coordinate::new(f64::INFINITY, 0.0).is_err());
    }

    #[test]
    fn test_bucket_rounds_both_axes() {
        let coord = Coordinate::new(48.8566, 2.3522).unwrap();
        let bucket = coord.bucket();
        assert_eq!(bucket.lat(), 48.86);
        assert_eq!(bucket.lon(), 2.35);
        assert_eq!(coord.bucket_key(), BucketKey { lat: 4886, lon: 235 });
    }

    #[test]
    fn test_bucket_key_groups_nearby_points() {
        let a = Coordinate::new(40.7128, -74.0060).unwrap();
        let b = Coordinate::new(40.7149, -74.0051).unwrap();
        let c = Coordinate::new(40.7300, -74.0060).unwrap();
        assert_eq!(a.bucket_key(), b.bucket_key());
        assert_ne!(a.bucket_key(), c.bucket_key());
    }

    #[test]
    fn test_bucket_key_matches_bucket() {
        let coord = Coordinate::new(-33.8688, 151.2093).unwrap();
        assert_eq!(coord.bucket().bucket_key(), coord.bucket_key());
    }

    #[test]
    fn test_is_near() {
        let a = Coordinate::new(39.9042, 116.4074).unwrap();
        let b = Coordinate::new(39.95, 116.35).unwrap();
        assert!(a.is_near(&b, 0.1));
        assert!(!a.is_near(&b, 0.01));
    }

    #[test]
    fn test_aqi_band_edges() {
        assert_eq!(AqiIndex::from_particulates(9.99, 0.0), AqiIndex::GOOD);
        assert_eq!(AqiIndex::from_particulates(10.0, 0.0), AqiIndex::FAIR);
        assert_eq!(AqiIndex::from_particulates(74.9, 0.0), AqiIndex::POOR);
        assert_eq!(AqiIndex::from_particulates(75.0, 0.0), AqiIndex::VERY_POOR);
        assert_eq!(AqiIndex::from_particulates(0.0, 99.0), AqiIndex::MODERATE);
        assert_eq!(AqiIndex::from_particulates(0.0, 200.0), AqiIndex::VERY_POOR);
    }

    #[test]
    fn test_aqi_ignores_bad_inputs() {
        assert_eq!(AqiIndex::from_particulates(-3.0, f64::NAN), AqiIndex::GOOD);
    }

    #[test]
    fn test_aqi_display() {
        assert_eq!(format!("{}", AqiIndex::MODERATE), "3 (Moderate)");
    }

    #[test]
    fn test_components_clamped() {
        let components = Components {
            co: -1.0,
            no2: f64::NAN,
            pm2_5: 12.0,
            ..Default::default()
        };
        assert!(!components.is_physical());
        let fixed = components.clamped();
        assert!(fixed.is_physical());
        assert_eq!(fixed.co, 0.0);
        assert_eq!(fixed.no2, 0.0);
        assert_eq!(fixed.pm2_5, 12.0);
    }

    #[test]
    fn test_sample_from_components() {
        let coord = Coordinate::new(51.5074, -0.1278).unwrap();
        let sample = Sample::from_components(
            coord,
            1_700_000_000,
            Components {
                pm2_5: 30.0,
                pm10: 40.0,
                ..Default::default()
            },
        );
        assert_eq!(sample.aqi, AqiIndex::MODERATE);
    }

    #[test]
    fn test_source_labels_round_trip() {
        for source in [Source::Upstream, Source::Synthetic, Source::LocalDatabase] {
            assert_eq!(source.as_str().parse::<Source>().unwrap(), source);
        }
        assert!("somewhere".parse::<Source>().is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_source_serializes_to_label() {
        let json = serde_json::to_string(&Source::Synthetic).unwrap();
        assert_eq!(json, "\"Synthetic Fallback\"");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_coordinate_deserialize_validates() {
        let ok: Coordinate = serde_json::from_str(r#"{"lon": -74.006, "lat": 40.7128}"#).unwrap();
        assert_eq!(ok.lat(), 40.7128);
        assert!(serde_json::from_str::<Coordinate>(r#"{"lon": 0.0, "lat": 123.0}"#).is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_aqi_deserialize_validates() {
        assert_eq!(serde_json::from_str::<AqiIndex>("4").unwrap(), AqiIndex::POOR);
        assert!(serde_json::from_str::<AqiIndex>("6").is_err());
    }
}
