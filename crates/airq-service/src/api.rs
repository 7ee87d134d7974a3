//! REST API endpoints.
//!
//! # Lock Acquisition
//!
//! - **`state.store`** (Mutex): held for one SQLite call at a time, never
//!   across an upstream request.
//! - **`state.collector.city_stats`** (RwLock): read by status endpoints.
//!
//! When both are needed, acquire `store` first.
//!
//! # Error Handling
//!
//! All endpoints return structured JSON errors via [`AppError`]. Invalid
//! input returns HTTP 400 and store errors return HTTP 500. Upstream failures
//! never surface here; the query path falls back to synthetic data.

use std::sync::Arc;

use airq_types::{AirQualityResponse, Coordinate, ValidationError};
use axum::{
    Json, Router,
    extract::{Query, State, rejection::QueryRejection},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::get,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::middleware::api_key_auth;
use crate::query::{QueryError, UpstreamStatus};
use crate::state::{AppState, CollectorPhase, CollectorSnapshot};

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        // Health and status
        .route("/api/health", get(health))
        .route("/api/health/detailed", get(health_detailed))
        .route("/api/status", get(get_status))
        // Data endpoints
        .route("/api/current", get(get_current))
        .route("/api/forecast", get(get_forecast))
        .route("/api/historical", get(get_historical))
}

/// The complete application: routes, authentication, tracing and CORS.
pub fn app(state: Arc<AppState>) -> Router {
    let security = Arc::new(state.config.security.clone());

    router()
        .layer(middleware::from_fn_with_state(security, api_key_auth))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
    })
}

/// Detailed health check response with diagnostics.
#[derive(Debug, Serialize)]
pub struct DetailedHealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Database health status
    pub database: DatabaseHealth,
    /// Upstream provider reachability
    pub upstream: UpstreamStatus,
    /// Collector health status
    pub collector: CollectorHealth,
    /// Days of history seeded at startup
    pub history_days: u32,
}

/// Database health information.
#[derive(Debug, Serialize)]
pub struct DatabaseHealth {
    /// Whether the database is accessible
    pub ok: bool,
    /// Number of stored samples
    pub sample_count: u64,
    /// Error message if database is not ok
    pub error: Option<String>,
}

/// Collector health information.
#[derive(Debug, Serialize)]
pub struct CollectorHealth {
    pub running: bool,
    pub phase: CollectorPhase,
    pub cycles: u64,
    pub configured_cities: usize,
    /// Cities polled successfully within three intervals
    pub healthy_cities: usize,
    /// Cities whose last poll failed
    pub failing_cities: usize,
}

/// Detailed health check endpoint.
///
/// Probes the upstream provider, so prefer `/api/health` for frequent
/// monitoring.
async fn health_detailed(State(state): State<Arc<AppState>>) -> Json<DetailedHealthResponse> {
    let database = {
        let store = state.store.lock().await;
        match store.count_samples(None) {
            Ok(count) => DatabaseHealth {
                ok: true,
                sample_count: count,
                error: None,
            },
            Err(e) => DatabaseHealth {
                ok: false,
                sample_count: 0,
                error: Some(e.to_string()),
            },
        }
    };

    let upstream = state.query.upstream_status().await;

    let collector = {
        let interval = state.config.collector.interval_secs as i64;
        let stats = state.collector.city_stats.read().await;
        let now = OffsetDateTime::now_utc();

        let healthy_cities = stats
            .iter()
            .filter(|s| {
                s.last_poll_at
                    .is_some_and(|t| (now - t).whole_seconds() < interval * 3)
            })
            .count();
        let failing_cities = stats.iter().filter(|s| s.consecutive_failures > 0).count();

        CollectorHealth {
            running: state.collector.is_running(),
            phase: state.collector.phase(),
            cycles: state.collector.cycles(),
            configured_cities: state.config.cities.len(),
            healthy_cities,
            failing_cities,
        }
    };

    let status = if !database.ok {
        "unhealthy"
    } else if upstream == UpstreamStatus::Available
        && (collector.running || !state.config.collector.enabled)
    {
        "ok"
    } else {
        "degraded"
    };

    Json(DetailedHealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
        database,
        upstream,
        collector,
        history_days: state.config.history.days,
    })
}

/// Service status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Seconds between collection cycles
    pub interval_secs: u64,
    pub collector: CollectorSnapshot,
}

/// Collector state and per-city statistics.
async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
        interval_secs: state.config.collector.interval_secs,
        collector: state.collector.snapshot().await,
    })
}

/// Query parameters for coordinate endpoints.
#[derive(Debug, Deserialize)]
pub struct LocationQuery {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl LocationQuery {
    /// Validate into a coordinate.
    pub fn coordinate(&self) -> Result<Coordinate, ValidationError> {
        let lat = self.lat.ok_or(ValidationError::MissingParameter("lat"))?;
        let lon = self.lon.ok_or(ValidationError::MissingParameter("lon"))?;
        Coordinate::new(lat, lon)
    }
}

/// Query parameters for `/api/historical`.
#[derive(Debug, Deserialize)]
pub struct HistoricalQuery {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    /// `YYYY-MM-DD` or RFC 3339
    pub start: Option<String>,
    /// `YYYY-MM-DD` or RFC 3339
    pub end: Option<String>,
}

/// Current conditions.
///
/// Falls back to synthetic data when the upstream provider is unavailable.
async fn get_current(
    State(state): State<Arc<AppState>>,
    query: Result<Query<LocationQuery>, QueryRejection>,
) -> Result<Json<AirQualityResponse>, AppError> {
    let Query(params) = query?;
    let coord = params.coordinate()?;
    Ok(Json(state.query.current(coord).await))
}

/// Four-day forecast.
async fn get_forecast(
    State(state): State<Arc<AppState>>,
    query: Result<Query<LocationQuery>, QueryRejection>,
) -> Result<Json<AirQualityResponse>, AppError> {
    let Query(params) = query?;
    let coord = params.coordinate()?;
    Ok(Json(state.query.forecast(coord).await))
}

/// Historical samples, oldest first.
///
/// # Errors
///
/// - Returns [`AppError::Validation`] for a missing/invalid coordinate or
///   date, or if `start` is after `end`
/// - Returns [`AppError::Store`] if the database query fails
async fn get_historical(
    State(state): State<Arc<AppState>>,
    query: Result<Query<HistoricalQuery>, QueryRejection>,
) -> Result<Json<AirQualityResponse>, AppError> {
    let Query(params) = query?;
    let coord = LocationQuery {
        lat: params.lat,
        lon: params.lon,
    }
    .coordinate()?;
    let start = params
        .start
        .as_deref()
        .ok_or(ValidationError::MissingParameter("start"))?;
    let end = params
        .end
        .as_deref()
        .ok_or(ValidationError::MissingParameter("end"))?;

    Ok(Json(state.query.historical(coord, start, end).await?))
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    Validation(ValidationError),
    BadRequest(String),
    Store(airq_store::Error),
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        AppError::Validation(e)
    }
}

impl From<QueryRejection> for AppError {
    fn from(e: QueryRejection) -> Self {
        AppError::BadRequest(e.body_text())
    }
}

impl From<QueryError> for AppError {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::Validation(e) => AppError::Validation(e),
            QueryError::Store(e) => AppError::Store(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::Validation(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Store(e) => {
                tracing::error!("Store error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::mock::{MockFailure, MockProvider};

    fn create_test_state(provider: MockProvider) -> Arc<AppState> {
        let store = airq_store::Store::open_in_memory().unwrap();
        AppState::new(store, Config::default(), Arc::new(provider))
    }

    async fn response_body(response: axum::response::Response) -> String {
        let body = response.into_body();
        let bytes = body.collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn get_json(state: Arc<AppState>, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router()
            .with_state(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response_body(response).await;
        (status, serde_json::from_str(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (status, json) = get_json(create_test_state(MockProvider::new()), "/api/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert!(json["version"].is_string());
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_health_detailed_endpoint() {
        let state = create_test_state(MockProvider::failing(MockFailure::Network));
        let (status, json) = get_json(state, "/api/health/detailed").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["database"]["ok"], true);
        assert_eq!(json["database"]["sample_count"], 0);
        assert_eq!(json["upstream"], "unavailable");
        assert_eq!(json["collector"]["running"], false);
        assert_eq!(json["collector"]["configured_cities"], 5);
        assert_eq!(json["history_days"], 30);
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let (status, json) = get_json(create_test_state(MockProvider::new()), "/api/status").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["interval_secs"], 900);
        assert_eq!(json["collector"]["phase"], "idle");
        assert_eq!(json["collector"]["cities"][3]["name"], "Beijing");
    }

    #[tokio::test]
    async fn test_current_upstream() {
        let (status, json) = get_json(
            create_test_state(MockProvider::new()),
            "/api/current?lat=51.5074&lon=-0.1278",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["source"], "OpenWeatherMap API");
        assert_eq!(json["location_name"], "London");
        assert_eq!(json["list"][0]["main"]["aqi"], 2);
    }

    #[tokio::test]
    async fn test_current_fallback_has_all_components() {
        let (status, json) = get_json(
            create_test_state(MockProvider::failing(MockFailure::Timeout)),
            "/api/current?lat=-33.8688&lon=151.2093",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["source"], "Synthetic Fallback");
        assert!(json.get("location_name").is_none());
        let components = json["list"][0]["components"].as_object().unwrap();
        for name in airq_types::Components::NAMES {
            assert!(components[name].as_f64().unwrap() >= 0.0, "{}", name);
        }
    }

    #[tokio::test]
    async fn test_current_missing_parameter() {
        let (status, json) =
            get_json(create_test_state(MockProvider::new()), "/api/current?lat=10").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("lon"));
    }

    #[tokio::test]
    async fn test_current_out_of_range() {
        let (status, json) = get_json(
            create_test_state(MockProvider::new()),
            "/api/current?lat=95&lon=0",
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("latitude"));
    }

    #[tokio::test]
    async fn test_current_non_numeric() {
        let (status, json) = get_json(
            create_test_state(MockProvider::new()),
            "/api/current?lat=north&lon=0",
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn test_forecast_fallback() {
        let (status, json) = get_json(
            create_test_state(MockProvider::failing(MockFailure::Status(502))),
            "/api/forecast?lat=35.6762&lon=139.6503",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["source"], "Synthetic Fallback");
        assert_eq!(json["location_name"], "Tokyo");
        assert_eq!(json["list"].as_array().unwrap().len(), 32);
    }

    #[tokio::test]
    async fn test_historical_missing_dates() {
        let (status, json) = get_json(
            create_test_state(MockProvider::new()),
            "/api/historical?lat=48.8566&lon=2.3522&start=2025-06-25",
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Missing required parameter: end");
    }

    #[tokio::test]
    async fn test_historical_bad_date() {
        let (status, json) = get_json(
            create_test_state(MockProvider::new()),
            "/api/historical?lat=48.8566&lon=2.3522&start=25/06/2025&end=2025-07-02",
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("start"));
    }

    #[tokio::test]
    async fn test_historical_ascending_within_range() {
        let (status, json) = get_json(
            create_test_state(MockProvider::failing(MockFailure::Network)),
            "/api/historical?lat=48.8566&lon=2.3522\
             &start=2025-06-25T12:00:00Z&end=2025-06-26T11:59:59Z",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let times: Vec<i64> = json["list"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["dt"].as_i64().unwrap())
            .collect();
        assert_eq!(times.len(), 24);
        assert!(times.windows(2).all(|w| w[0] < w[1]));
        assert!(times.iter().all(|t| (1_750_852_800..=1_750_939_199).contains(t)));
    }

    #[tokio::test]
    async fn test_app_requires_key() {
        let mut config = Config::default();
        config.security.api_key = Some("secret".to_string());
        let state = AppState::new(
            airq_store::Store::open_in_memory().unwrap(),
            config,
            Arc::new(MockProvider::new()),
        );

        let response = app(state)
            .oneshot(
                Request::builder()
                    .uri("/api/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_app_error_status_codes() {
        let response =
            AppError::Validation(ValidationError::MissingParameter("lat")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let store_error = airq_store::Error::CorruptRow {
            id: 1,
            reason: "bad aqi".to_string(),
        };
        let response = AppError::Store(store_error).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
