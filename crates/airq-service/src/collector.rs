//! Background data collector.
//!
//! A single task polls every configured city once per interval and appends
//! the result to the store. A city that fails is logged and counted; the
//! rest of the cycle proceeds.

use std::sync::Arc;
use std::time::Duration;

use airq_types::{Source, ValidationError};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::config::CityConfig;
use crate::state::{AppState, CollectorPhase};

/// How long [`Collector::stop`] waits for the task before aborting it.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Background collector that polls cities on a fixed interval.
pub struct Collector {
    state: Arc<AppState>,
    handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Collector {
    /// Create a new collector.
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            handle: std::sync::Mutex::new(None),
        }
    }

    /// Start collecting in the background.
    ///
    /// Returns immediately. The first cycle runs right away, then once per
    /// `collector.interval_secs`. Calling `start` while running does nothing.
    pub fn start(&self) {
        let Ok(mut handle) = self.handle.lock() else {
            error!("Collector handle lock poisoned");
            return;
        };
        if handle.is_some() {
            debug!("Collector already running");
            return;
        }

        let cities = &self.state.config.cities;
        if cities.is_empty() {
            info!("No cities configured for collection");
            return;
        }

        let period = Duration::from_secs(self.state.config.collector.interval_secs);
        info!(
            "Starting collector for {} city(ies), interval {}s",
            cities.len(),
            period.as_secs()
        );

        self.state.collector.reset_stop();
        self.state.collector.set_running(true);

        let state = Arc::clone(&self.state);
        *handle = Some(tokio::spawn(run(state, period)));
    }

    /// Signal the task to stop and wait for it.
    ///
    /// A cycle in progress is allowed to finish. After [`STOP_TIMEOUT`] the
    /// task is aborted.
    pub async fn stop(&self) {
        let handle = match self.handle.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        self.state.collector.signal_stop();

        let Some(mut handle) = handle else {
            return;
        };

        match tokio::time::timeout(STOP_TIMEOUT, &mut handle).await {
            Ok(_) => info!("Collector stopped"),
            Err(_) => {
                warn!("Collector did not stop within {:?}, aborting", STOP_TIMEOUT);
                handle.abort();
            }
        }
        self.state.collector.set_running(false);
    }
}

async fn run(state: Arc<AppState>, period: Duration) {
    let mut stop_rx = state.collector.subscribe_stop();
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = timer.tick() => {
                run_cycle(&state).await;
            }
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    debug!("Collector received stop signal");
                    break;
                }
            }
        }
    }

    state.collector.set_running(false);
}

/// Outcome of one collection cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// Poll every configured city once.
pub async fn run_cycle(state: &AppState) -> CycleSummary {
    state.collector.set_phase(CollectorPhase::Collecting);
    let mut summary = CycleSummary::default();

    for (index, city) in state.config.cities.iter().enumerate() {
        let result = collect_city(state, city).await;

        let mut stats = state.collector.city_stats.write().await;
        let Some(entry) = stats.get_mut(index) else {
            continue;
        };

        match result {
            Ok(source) => {
                summary.succeeded += 1;
                entry.record_success(source);
                debug!("Collected {} ({})", city.name, source);
            }
            Err(e) => {
                summary.failed += 1;
                entry.record_failure(&e.to_string());
                let attempts = entry.consecutive_failures;
                if attempts <= 3 {
                    warn!("Failed to collect {}: {} (attempt {})", city.name, e, attempts);
                } else if attempts == 4 {
                    error!(
                        "Failed to collect {} after {} attempts, will continue trying silently",
                        city.name, attempts
                    );
                }
            }
        }
    }

    state.collector.record_cycle();
    state.collector.set_phase(CollectorPhase::Idle);
    info!(
        "Collection cycle complete: {} ok, {} failed",
        summary.succeeded, summary.failed
    );
    summary
}

/// Fetch and store the current sample for one city.
async fn collect_city(state: &AppState, city: &CityConfig) -> Result<Source, CollectorError> {
    let coord = city.coordinate().map_err(CollectorError::InvalidCity)?;

    // Upstream is queried without holding the store lock
    let (sample, source) = state.query.current_sample(coord).await;

    let store = state.store.lock().await;
    store
        .append(&sample, source, Some(&city.name))
        .map_err(CollectorError::Store)?;

    Ok(source)
}

/// Collector errors.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Invalid city coordinate: {0}")]
    InvalidCity(ValidationError),
    #[error("Failed to store: {0}")]
    Store(airq_store::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::mock::{MockFailure, MockProvider};
    use airq_store::Store;
    use airq_types::Coordinate;

    fn state_with(provider: MockProvider, cities: Vec<CityConfig>) -> Arc<AppState> {
        let config = Config {
            cities,
            ..Default::default()
        };
        AppState::new(Store::open_in_memory().unwrap(), config, Arc::new(provider))
    }

    #[tokio::test]
    async fn test_cycle_stores_one_sample_per_city() {
        let state = state_with(MockProvider::new(), crate::config::default_cities());

        let summary = run_cycle(&state).await;
        assert_eq!(summary, CycleSummary { succeeded: 5, failed: 0 });

        let store = state.store.lock().await;
        assert_eq!(store.count_samples(None).unwrap(), 5);

        let tokyo = Config::default().cities[2].coordinate().unwrap();
        let latest = store.latest_sample(tokyo).unwrap().unwrap();
        assert_eq!(latest.location_name.as_deref(), Some("Tokyo"));
        assert_eq!(latest.source, Source::Upstream);
    }

    #[tokio::test]
    async fn test_cycle_falls_back_when_upstream_fails() {
        let state = state_with(
            MockProvider::failing(MockFailure::Timeout),
            vec![CityConfig::new("London", 51.5074, -0.1278)],
        );

        run_cycle(&state).await;

        let stats = state.collector.city_stats.read().await;
        assert_eq!(stats[0].success_count, 1);
        assert_eq!(stats[0].last_source, Some(Source::Synthetic));
        assert_eq!(state.collector.cycles(), 1);
        assert_eq!(state.collector.phase(), CollectorPhase::Idle);
    }

    #[tokio::test]
    async fn test_invalid_city_does_not_stop_cycle() {
        let state = state_with(
            MockProvider::new(),
            vec![
                CityConfig::new("Nowhere", 123.0, 0.0),
                CityConfig::new("London", 51.5074, -0.1278),
            ],
        );

        let summary = run_cycle(&state).await;
        assert_eq!(summary, CycleSummary { succeeded: 1, failed: 1 });

        let stats = state.collector.city_stats.read().await;
        assert_eq!(stats[0].failure_count, 1);
        assert!(stats[0].last_error.as_deref().unwrap().contains("latitude"));
        assert_eq!(stats[1].success_count, 1);
    }

    #[tokio::test]
    async fn test_store_failure_does_not_stop_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.db");
        let store = Store::open(&path).unwrap();

        // Reject inserts for one city only
        rusqlite::Connection::open(&path)
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_london BEFORE INSERT ON aqi_samples \
                 WHEN NEW.location_name = 'London' \
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();

        let config = Config {
            cities: vec![
                CityConfig::new("London", 51.5074, -0.1278),
                CityConfig::new("Tokyo", 35.6762, 139.6503),
            ],
            ..Default::default()
        };
        let state = AppState::new(store, config, Arc::new(MockProvider::new()));

        let summary = run_cycle(&state).await;
        assert_eq!(summary, CycleSummary { succeeded: 1, failed: 1 });

        let stats = state.collector.city_stats.read().await;
        assert_eq!(stats[0].failure_count, 1);
        assert!(stats[0].last_error.as_deref().unwrap().contains("Failed to store"));
        assert_eq!(stats[1].success_count, 1);
        drop(stats);

        let store = state.store.lock().await;
        assert_eq!(store.count_samples(None).unwrap(), 1);
        let tokyo = Coordinate::new(35.6762, 139.6503).unwrap();
        assert_eq!(
            store.latest_sample(tokyo).unwrap().unwrap().location_name.as_deref(),
            Some("Tokyo")
        );
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let state = state_with(
            MockProvider::new(),
            vec![CityConfig::new("Tokyo", 35.6762, 139.6503)],
        );
        let collector = Collector::new(Arc::clone(&state));

        collector.start();
        assert!(state.collector.is_running());

        // First tick fires immediately
        for _ in 0..100 {
            if state.collector.cycles() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(state.collector.cycles() >= 1);

        collector.stop().await;
        assert!(!state.collector.is_running());
        assert_eq!(state.collector.phase(), CollectorPhase::Idle);
    }

    #[tokio::test]
    async fn test_start_without_cities_is_noop() {
        let state = state_with(MockProvider::new(), Vec::new());
        let collector = Collector::new(Arc::clone(&state));

        collector.start();
        assert!(!state.collector.is_running());
        collector.stop().await;
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let state = state_with(MockProvider::new(), crate::config::default_cities());
        Collector::new(state).stop().await;
    }
}
