//! Data models for stored samples.

use serde::Serialize;
use time::OffsetDateTime;

use airq_types::{AqiIndex, Components, Coordinate, Sample, Source};

/// A sample row as stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredSample {
    /// Database row ID.
    pub id: i64,
    /// Observation time, Unix seconds.
    pub timestamp: i64,
    /// Bucketed coordinate the row is keyed by.
    pub coord: Coordinate,
    /// AQI ordinal.
    pub aqi: AqiIndex,
    /// Pollutant concentrations.
    pub components: Components,
    /// City name, when the row came from a configured location.
    pub location_name: Option<String>,
    /// Which path produced the row.
    pub source: Source,
    /// When the row was inserted.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl StoredSample {
    /// Convert to a [`Sample`].
    pub fn to_sample(&self) -> Sample {
        Sample {
            coord: self.coord,
            timestamp: self.timestamp,
            aqi: self.aqi,
            components: self.components,
        }
    }
}
