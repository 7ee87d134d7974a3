//! Air-quality caching service.
//!
//! This crate provides a service that:
//! - Answers current, forecast and historical air-quality queries
//! - Falls back to synthetic data whenever the upstream provider fails
//! - Polls configured cities on a schedule and stores the samples
//! - Seeds missing history for configured cities at startup
//! - Requires an API key on every route except the basic health check
//!
//! # REST API Endpoints
//!
//! - `GET /api/health` - Service health check (no auth required)
//! - `GET /api/health/detailed` - Database, upstream and collector diagnostics
//! - `GET /api/status` - Collector state and per-city statistics
//! - `GET /api/current?lat&lon` - Current conditions
//! - `GET /api/forecast?lat&lon` - Four-day forecast
//! - `GET /api/historical?lat&lon&start&end` - Samples within a date range
//!
//! Every data response carries a `source` of `OpenWeatherMap API`,
//! `Synthetic Fallback` or `Local Database`.
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/airq/server.toml`:
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:5000"
//!
//! [storage]
//! path = "~/.local/share/airq/aqi_data.db"
//!
//! [upstream]
//! api_key = "your-openweathermap-key"
//! timeout_secs = 10
//!
//! [security]
//! api_key = "shared-secret"
//!
//! [collector]
//! interval_secs = 900
//!
//! [[cities]]
//! name = "Paris"
//! lat = 48.8566
//! lon = 2.3522
//! ```
//!
//! `OPENWEATHER_API_KEY` and `API_SECRET_KEY` override the two keys.

pub mod api;
pub mod collector;
pub mod config;
pub mod generator;
pub mod middleware;
pub mod mock;
pub mod query;
pub mod seed;
pub mod state;
pub mod upstream;

pub use collector::Collector;
pub use config::{
    CityConfig, CollectorConfig, Config, ConfigError, HistoryConfig, SecurityConfig, ServerConfig,
    StorageConfig, UpstreamConfig,
};
pub use generator::SyntheticGenerator;
pub use query::{QueryError, QueryService, UpstreamStatus};
pub use state::AppState;
pub use upstream::{AirQualityProvider, OpenWeatherClient, UpstreamError};
