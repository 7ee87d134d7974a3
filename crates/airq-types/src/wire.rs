//! JSON envelope shared by the upstream provider and the HTTP API.
//!
//! The shape follows the OpenWeatherMap air pollution response:
//!
//! ```json
//! {
//!   "coord": {"lat": 40.7128, "lon": -74.006},
//!   "list": [
//!     {"dt": 1719273600, "main": {"aqi": 2},
//!      "components": {"co": 230.3, "no": 0.1, "no2": 12.0, "o3": 68.7,
//!                     "so2": 3.2, "pm2_5": 11.4, "pm10": 15.9, "nh3": 0.8}}
//!   ],
//!   "source": "OpenWeatherMap API"
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::types::{AqiIndex, Components, Coordinate, Sample, Source};

/// `main` block of a list entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MainBlock {
    /// AQI ordinal.
    pub aqi: AqiIndex,
}

/// One timestamped entry of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Observation time, Unix seconds.
    pub dt: i64,
    /// AQI block.
    pub main: MainBlock,
    /// Pollutant concentrations.
    pub components: Components,
}

impl Entry {
    /// Attach a coordinate to turn this entry into a [`Sample`].
    #[must_use]
    pub fn into_sample(self, coord: Coordinate) -> Sample {
        Sample {
            coord,
            timestamp: self.dt,
            aqi: self.main.aqi,
            components: self.components,
        }
    }
}

impl From<&Sample> for Entry {
    fn from(sample: &Sample) -> Self {
        Self {
            dt: sample.timestamp,
            main: MainBlock { aqi: sample.aqi },
            components: sample.components,
        }
    }
}

/// Air-quality response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirQualityResponse {
    /// Coordinate the response describes.
    pub coord: Coordinate,
    /// Entries in ascending time order.
    #[serde(default)]
    pub list: Vec<Entry>,
    /// Which path produced the data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    /// Friendly name when the coordinate matches a known city.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_name: Option<String>,
}

impl AirQualityResponse {
    /// Build an envelope from samples, tagging it with `source`.
    pub fn from_samples<'a, I>(coord: Coordinate, samples: I, source: Source) -> Self
    where
        I: IntoIterator<Item = &'a Sample>,
    {
        Self {
            coord,
            list: samples.into_iter().map(Entry::from).collect(),
            source: Some(source),
            location_name: None,
        }
    }

    /// Attach a location name.
    #[must_use]
    pub fn with_location_name(mut self, name: Option<String>) -> Self {
        self.location_name = name;
        self
    }

    /// Convert entries to samples for `coord`.
    #[must_use]
    pub fn samples(&self, coord: Coordinate) -> Vec<Sample> {
        self.list.iter().map(|e| e.into_sample(coord)).collect()
    }

    /// Whether the envelope carries no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UPSTREAM_BODY: &str = r#"{
        "coord": {"lon": -0.1278, "lat": 51.5074},
        "list": [{
            "main": {"aqi": 2},
            "components": {"co": 201.94, "no": 0.02, "no2": 0.77, "o3": 68.66,
                           "so2": 0.64, "pm2_5": 0.5, "pm10": 0.54, "nh3": 0.12},
            "dt": 1719273600
        }]
    }"#;

    #[test]
    fn test_decode_upstream_body() {
        let response: AirQualityResponse = serde_json::from_str(UPSTREAM_BODY).unwrap();
        assert_eq!(response.coord.lat(), 51.5074);
        assert_eq!(response.list.len(), 1);
        assert_eq!(response.list[0].main.aqi, AqiIndex::FAIR);
        assert_eq!(response.list[0].components.o3, 68.66);
        assert!(response.source.is_none());
    }

    #[test]
    fn test_decode_empty_list() {
        let response: AirQualityResponse =
            serde_json::from_str(r#"{"coord": {"lon": 1.0, "lat": 2.0}, "list": []}"#).unwrap();
        assert!(response.is_empty());
    }

    #[test]
    fn test_encode_has_all_component_keys() {
        let coord = Coordinate::new(40.7128, -74.006).unwrap();
        let sample = Sample::from_components(coord, 100, Components::default());
        let response = AirQualityResponse::from_samples(coord, [&sample], Source::Synthetic);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["coord"]["lat"], 40.7128);
        assert_eq!(json["coord"]["lon"], -74.006);
        assert_eq!(json["source"], "Synthetic Fallback");
        assert_eq!(json["list"][0]["dt"], 100);
        assert_eq!(json["list"][0]["main"]["aqi"], 1);
        for name in Components::NAMES {
            assert!(json["list"][0]["components"][name].is_number(), "missing {name}");
        }
        assert!(json.get("location_name").is_none());
    }

    #[test]
    fn test_samples_round_trip_through_entries() {
        let coord = Coordinate::new(35.6762, 139.6503).unwrap();
        let response: AirQualityResponse = serde_json::from_str(UPSTREAM_BODY).unwrap();
        let samples = response.samples(coord);
        assert_eq!(samples[0].coord, coord);
        assert_eq!(samples[0].timestamp, 1719273600);
        assert_eq!(Entry::from(&samples[0]), response.list[0]);
    }
}
