//! Application state shared across handlers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

use airq_store::Store;
use airq_types::Source;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock, watch};

use crate::config::{CityConfig, Config};
use crate::query::QueryService;
use crate::upstream::AirQualityProvider;

/// Shared application state.
pub struct AppState {
    /// The sample store. Locked for one SQLite call or transaction at a time.
    pub store: Arc<Mutex<Store>>,
    /// Configuration, fixed after startup.
    pub config: Config,
    /// Query path used by handlers and the collector.
    pub query: QueryService,
    /// Collector control state.
    pub collector: CollectorState,
}

impl AppState {
    /// Create new application state around `provider`.
    pub fn new(store: Store, config: Config, provider: Arc<dyn AirQualityProvider>) -> Arc<Self> {
        let store = Arc::new(Mutex::new(store));
        let query = QueryService::new(
            provider,
            Arc::clone(&store),
            config.cities.clone(),
            config.history.persist_backfill,
        );
        let collector = CollectorState::with_cities(&config.cities);

        Arc::new(Self {
            store,
            config,
            query,
            collector,
        })
    }
}

/// What the collector is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectorPhase {
    /// Waiting for the next tick.
    Idle,
    /// Polling cities.
    Collecting,
}

/// State for tracking and controlling the collector.
pub struct CollectorState {
    running: AtomicBool,
    /// When the collector was started (Unix timestamp).
    started_at: AtomicU64,
    phase: AtomicU8,
    cycles: AtomicU64,
    /// End of the last completed cycle (Unix timestamp).
    last_cycle_at: AtomicU64,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
    /// Per-city collection stats, in config order.
    pub city_stats: RwLock<Vec<CityCollectionStats>>,
}

impl CollectorState {
    /// Create a collector state with no cities.
    pub fn new() -> Self {
        Self::with_cities(&[])
    }

    /// Create a collector state with empty stats for each city.
    pub fn with_cities(cities: &[CityConfig]) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            running: AtomicBool::new(false),
            started_at: AtomicU64::new(0),
            phase: AtomicU8::new(0),
            cycles: AtomicU64::new(0),
            last_cycle_at: AtomicU64::new(0),
            stop_tx,
            stop_rx,
            city_stats: RwLock::new(cities.iter().map(CityCollectionStats::new).collect()),
        }
    }

    /// Check if the collector is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Mark the collector as started or stopped.
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
        if running {
            self.started_at.store(now_secs(), Ordering::SeqCst);
        } else {
            self.set_phase(CollectorPhase::Idle);
        }
    }

    /// Get the collector start time.
    pub fn started_at(&self) -> Option<OffsetDateTime> {
        from_secs(self.started_at.load(Ordering::SeqCst))
    }

    /// Current phase.
    pub fn phase(&self) -> CollectorPhase {
        match self.phase.load(Ordering::SeqCst) {
            0 => CollectorPhase::Idle,
            _ => CollectorPhase::Collecting,
        }
    }

    pub(crate) fn set_phase(&self, phase: CollectorPhase) {
        let value = match phase {
            CollectorPhase::Idle => 0,
            CollectorPhase::Collecting => 1,
        };
        self.phase.store(value, Ordering::SeqCst);
    }

    /// Number of completed cycles.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    /// When the last cycle finished.
    pub fn last_cycle_at(&self) -> Option<OffsetDateTime> {
        from_secs(self.last_cycle_at.load(Ordering::SeqCst))
    }

    pub(crate) fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::SeqCst);
        self.last_cycle_at.store(now_secs(), Ordering::SeqCst);
    }

    /// Get a receiver for the stop signal.
    pub fn subscribe_stop(&self) -> watch::Receiver<bool> {
        self.stop_rx.clone()
    }

    /// Signal the collector task to stop.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(true);
        self.running.store(false, Ordering::SeqCst);
    }

    /// Reset the stop signal (for restarting).
    pub fn reset_stop(&self) {
        let _ = self.stop_tx.send(false);
    }

    /// Snapshot for status endpoints.
    pub async fn snapshot(&self) -> CollectorSnapshot {
        CollectorSnapshot {
            running: self.is_running(),
            phase: self.phase(),
            started_at: self.started_at(),
            cycles: self.cycles(),
            last_cycle_at: self.last_cycle_at(),
            cities: self.city_stats.read().await.clone(),
        }
    }
}

impl Default for CollectorState {
    fn default() -> Self {
        Self::new()
    }
}

fn now_secs() -> u64 {
    OffsetDateTime::now_utc().unix_timestamp() as u64
}

fn from_secs(ts: u64) -> Option<OffsetDateTime> {
    if ts == 0 {
        None
    } else {
        OffsetDateTime::from_unix_timestamp(ts as i64).ok()
    }
}

/// Point-in-time view of the collector.
#[derive(Debug, Clone, Serialize)]
pub struct CollectorSnapshot {
    pub running: bool,
    pub phase: CollectorPhase,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    pub cycles: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_cycle_at: Option<OffsetDateTime>,
    pub cities: Vec<CityCollectionStats>,
}

/// Collection statistics for a single city.
#[derive(Debug, Clone, Serialize)]
pub struct CityCollectionStats {
    /// City name.
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    /// Time of last successful poll.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_poll_at: Option<OffsetDateTime>,
    /// Where the last stored sample came from.
    pub last_source: Option<Source>,
    /// Time of last failed poll.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_error_at: Option<OffsetDateTime>,
    /// Last error message.
    pub last_error: Option<String>,
    /// Total successful polls.
    pub success_count: u64,
    /// Total failed polls.
    pub failure_count: u64,
    /// Failures since the last success.
    pub consecutive_failures: u32,
}

impl CityCollectionStats {
    /// Empty stats for `city`.
    pub fn new(city: &CityConfig) -> Self {
        Self {
            name: city.name.clone(),
            lat: city.lat,
            lon: city.lon,
            last_poll_at: None,
            last_source: None,
            last_error_at: None,
            last_error: None,
            success_count: 0,
            failure_count: 0,
            consecutive_failures: 0,
        }
    }

    pub(crate) fn record_success(&mut self, source: Source) {
        self.last_poll_at = Some(OffsetDateTime::now_utc());
        self.last_source = Some(source);
        self.success_count += 1;
        self.consecutive_failures = 0;
    }

    pub(crate) fn record_failure(&mut self, error: &str) {
        self.last_error_at = Some(OffsetDateTime::now_utc());
        self.last_error = Some(error.to_string());
        self.failure_count += 1;
        self.consecutive_failures += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_cities;
    use crate::mock::MockProvider;

    fn test_state() -> Arc<AppState> {
        AppState::new(
            Store::open_in_memory().unwrap(),
            Config::default(),
            Arc::new(MockProvider::new()),
        )
    }

    #[tokio::test]
    async fn test_app_state_new() {
        let state = test_state();
        assert_eq!(state.config.server.bind, "127.0.0.1:5000");
        assert_eq!(state.collector.city_stats.read().await.len(), 5);
    }

    #[tokio::test]
    async fn test_app_state_shares_store_with_query() {
        let state = test_state();
        let paris = airq_types::Coordinate::new(48.8566, 2.3522).unwrap();

        state.query.historical(paris, "2025-06-25", "2025-06-25").await.unwrap();
        assert_eq!(state.store.lock().await.count_samples(None).unwrap(), 24);
    }

    #[test]
    fn test_collector_state() {
        let collector = CollectorState::new();
        assert!(!collector.is_running());
        assert!(collector.started_at().is_none());
        assert_eq!(collector.phase(), CollectorPhase::Idle);

        collector.set_running(true);
        assert!(collector.is_running());
        assert!(collector.started_at().is_some());

        collector.signal_stop();
        assert!(!collector.is_running());
    }

    #[test]
    fn test_collector_phase_and_cycles() {
        let collector = CollectorState::new();
        collector.set_phase(CollectorPhase::Collecting);
        assert_eq!(collector.phase(), CollectorPhase::Collecting);

        collector.record_cycle();
        collector.record_cycle();
        assert_eq!(collector.cycles(), 2);
        assert!(collector.last_cycle_at().is_some());

        collector.set_running(false);
        assert_eq!(collector.phase(), CollectorPhase::Idle);
    }

    #[test]
    fn test_collector_state_stop_and_reset() {
        let collector = CollectorState::new();
        let rx = collector.subscribe_stop();
        assert!(!*rx.borrow());

        collector.signal_stop();
        assert!(*rx.borrow());

        collector.reset_stop();
        assert!(!*rx.borrow());
    }

    #[test]
    fn test_city_stats_counters() {
        let mut stats = CityCollectionStats::new(&default_cities()[1]);
        assert_eq!(stats.name, "London");

        stats.record_failure("timeout");
        stats.record_failure("timeout");
        assert_eq!(stats.consecutive_failures, 2);
        assert_eq!(stats.last_error.as_deref(), Some("timeout"));

        stats.record_success(Source::Synthetic);
        assert_eq!(stats.consecutive_failures, 0);
        assert_eq!(stats.success_count, 1);
        assert_eq!(stats.failure_count, 2);
        assert_eq!(stats.last_source, Some(Source::Synthetic));
    }

    #[tokio::test]
    async fn test_snapshot_serialization() {
        let collector = CollectorState::with_cities(&default_cities());
        let json = serde_json::to_value(collector.snapshot().await).unwrap();

        assert_eq!(json["running"], false);
        assert_eq!(json["phase"], "idle");
        assert_eq!(json["cities"].as_array().unwrap().len(), 5);
        assert_eq!(json["cities"][0]["name"], "New York");
        assert!(json["started_at"].is_null());
    }
}
