//! Shared types for air-quality samples.
//!
//! This crate provides the data model used by both the sample store
//! (`airq-store`) and the service (`airq-service`).
//!
//! # Features
//!
//! - Validated coordinates and the bucket rounding rule used for storage keys
//! - AQI ordinal (1-5) with a particulate threshold mapping
//! - Pollutant components and timestamped samples
//! - The JSON envelope shared by the upstream provider and the HTTP API
//!
//! # Example
//!
//! ```
//! use airq_types::{AqiIndex, Components, Coordinate, Sample};
//!
//! let coord = Coordinate::new(48.8566, 2.3522)?;
//! let sample = Sample::from_components(
//!     coord,
//!     1_719_273_600,
//!     Components { pm2_5: 18.0, pm10: 22.0, ..Default::default() },
//! );
//! assert_eq!(sample.aqi, AqiIndex::FAIR);
//! assert_eq!(coord.bucket().lat(), 48.86);
//! # Ok::<(), airq_types::ValidationError>(())
//! ```

pub mod error;
pub mod types;
#[cfg(feature = "serde")]
pub mod wire;

pub use error::{ValidationError, ValidationResult};
pub use types::{
    AqiIndex, BUCKET_DECIMALS, BucketKey, Components, Coordinate, PM2_5_BANDS, PM10_BANDS,
    Sample, Source, round_coordinate,
};
#[cfg(feature = "serde")]
pub use wire::{AirQualityResponse, Entry, MainBlock};
