//! Startup seeding of historical data for configured cities.

use airq_types::Source;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::config::CityConfig;
use crate::generator::{HOUR, SyntheticGenerator};
use crate::state::AppState;

/// Fraction of expected hourly points below which a city is reseeded.
pub const SEED_THRESHOLD: f64 = 0.8;

/// Outcome of a seeding pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    /// Cities that received synthetic history.
    pub seeded: usize,
    /// Cities that already had enough data.
    pub skipped: usize,
    /// Cities that could not be seeded.
    pub failed: usize,
    /// Rows inserted across all cities.
    pub inserted: usize,
}

/// Fill in hourly history for every configured city that lacks it.
///
/// Covers the last `history.days` days ending at the current hour. Errors
/// are logged per city and never abort the pass.
pub async fn seed_history(state: &AppState) -> SeedSummary {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    seed_history_at(state, now - now.rem_euclid(HOUR)).await
}

/// [`seed_history`] with the window ending at `end`.
pub async fn seed_history_at(state: &AppState, end: i64) -> SeedSummary {
    let days = i64::from(state.config.history.days);
    let start = end - days * 24 * HOUR + HOUR;
    let expected = (days * 24) as usize;
    let generator = SyntheticGenerator::new();

    let mut summary = SeedSummary::default();
    for city in &state.config.cities {
        match seed_city(state, &generator, city, start, end, expected).await {
            Ok(0) => summary.skipped += 1,
            Ok(inserted) => {
                summary.seeded += 1;
                summary.inserted += inserted;
            }
            Err(e) => {
                summary.failed += 1;
                warn!("Failed to seed history for {}: {}", city.name, e);
            }
        }
    }

    info!(
        "History seeding complete: {} seeded, {} already populated, {} failed ({} rows)",
        summary.seeded, summary.skipped, summary.failed, summary.inserted
    );
    summary
}

async fn seed_city(
    state: &AppState,
    generator: &SyntheticGenerator,
    city: &CityConfig,
    start: i64,
    end: i64,
    expected: usize,
) -> Result<usize, SeedError> {
    let coord = city.coordinate()?;
    let store = state.store.lock().await;

    let existing = store.query_range(coord, start, end)?.len();
    if existing as f64 >= expected as f64 * SEED_THRESHOLD {
        debug!("{} has {}/{} samples, skipping", city.name, existing, expected);
        return Ok(0);
    }

    let samples = generator.generate_series(coord, start, end, HOUR);
    let inserted = store.append_batch(&samples, Source::Synthetic, Some(&city.name))?;
    info!("Seeded {} hourly samples for {}", inserted, city.name);
    Ok(inserted)
}

#[derive(Debug, thiserror::Error)]
enum SeedError {
    #[error(transparent)]
    Coordinate(#[from] airq_types::ValidationError),
    #[error(transparent)]
    Store(#[from] airq_store::Error),
}
