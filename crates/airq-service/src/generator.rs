//! Synthetic air-quality data.
//!
//! Used whenever the upstream provider cannot answer. Output is plausible
//! rather than accurate: each location gets a stable baseline pollution
//! level, modulated by time of day and a small random jitter.

use airq_types::{BucketKey, Components, Coordinate, Sample};
use rand::Rng;

/// One hour in seconds.
pub const HOUR: i64 = 3600;

const SECONDS_PER_DAY: i64 = 86_400;

/// Baseline pollution level range for an ordinary location.
const BASELINE_MIN: f64 = 0.3;
const BASELINE_MAX: f64 = 0.8;

/// Maximum relative jitter applied to a single sample.
pub const JITTER: f64 = 0.15;

/// Maximum relative change between consecutive trend slots.
pub const TREND_DRIFT: f64 = 0.10;

/// Pollution level at which every component reaches the top of its band.
const LEVEL_CEILING: f64 = 2.0;
const LEVEL_FLOOR: f64 = 0.05;

/// Cities with a known pollution boost, and the factor applied within 1°.
const HOTSPOTS: [(f64, f64, f64); 2] = [
    (39.9042, 116.4074, 1.5), // Beijing
    (31.2304, 121.4737, 1.3), // Shanghai
];
const HOTSPOT_RADIUS: f64 = 1.0;

/// Component bands (low, high) in µg/m³, in [`Components::NAMES`] order.
pub const COMPONENT_BANDS: [(f64, f64); 8] = [
    (150.0, 1100.0), // co
    (0.0, 15.0),     // no
    (0.0, 75.0),     // no2
    (40.0, 160.0),   // o3
    (0.0, 30.0),     // so2
    (0.0, 150.0),    // pm2_5
    (0.0, 300.0),    // pm10
    (0.0, 15.0),     // nh3
];

/// Generator for synthetic samples.
///
/// Stateless; randomness is supplied by the caller through the `*_with`
/// variants, or taken from the thread RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntheticGenerator;

impl SyntheticGenerator {
    /// Create a generator.
    pub fn new() -> Self {
        Self
    }

    /// Generate one sample for `coord` at `timestamp`.
    pub fn generate(&self, coord: Coordinate, timestamp: i64) -> Sample {
        self.generate_with(&mut rand::rng(), coord, timestamp)
    }

    /// Generate one sample using `rng` for jitter.
    pub fn generate_with<R: Rng>(
        &self,
        rng: &mut R,
        coord: Coordinate,
        timestamp: i64,
    ) -> Sample {
        let jitter = 1.0 + rng.random_range(-JITTER..=JITTER);
        let level = expected_level(coord, timestamp) * jitter;
        Sample::from_components(coord, timestamp, components_for_level(level))
    }

    /// One sample every `step` seconds from `start` while `<= end`.
    ///
    /// Returns an empty series when `step <= 0` or `start > end`.
    pub fn generate_series(
        &self,
        coord: Coordinate,
        start: i64,
        end: i64,
        step: i64,
    ) -> Vec<Sample> {
        self.generate_series_with(&mut rand::rng(), coord, start, end, step)
    }

    /// [`generate_series`](Self::generate_series) with an explicit RNG.
    pub fn generate_series_with<R: Rng>(
        &self,
        rng: &mut R,
        coord: Coordinate,
        start: i64,
        end: i64,
        step: i64,
    ) -> Vec<Sample> {
        if step <= 0 || start > end {
            return Vec::new();
        }

        let mut samples = Vec::with_capacity(((end - start) / step + 1) as usize);
        let mut timestamp = start;
        while timestamp <= end {
            samples.push(self.generate_with(rng, coord, timestamp));
            timestamp += step;
        }
        samples
    }

    /// `slots` samples spaced `step` seconds apart starting at `start`.
    ///
    /// The first slot is an ordinary sample. Every later slot moves the
    /// pollution level by at most [`TREND_DRIFT`] relative to the previous
    /// slot, which gives forecasts a smooth shape.
    pub fn generate_trend(
        &self,
        coord: Coordinate,
        start: i64,
        slots: usize,
        step: i64,
    ) -> Vec<Sample> {
        self.generate_trend_with(&mut rand::rng(), coord, start, slots, step)
    }

    /// [`generate_trend`](Self::generate_trend) with an explicit RNG.
    pub fn generate_trend_with<R: Rng>(
        &self,
        rng: &mut R,
        coord: Coordinate,
        start: i64,
        slots: usize,
        step: i64,
    ) -> Vec<Sample> {
        let mut samples = Vec::with_capacity(slots);
        let mut level = expected_level(coord, start) * (1.0 + rng.random_range(-JITTER..=JITTER));

        for slot in 0..slots {
            if slot > 0 {
                let drift = 1.0 + rng.random_range(-TREND_DRIFT..=TREND_DRIFT);
                level = (level * drift).clamp(LEVEL_FLOOR, LEVEL_CEILING);
            }
            let timestamp = start + step * slot as i64;
            samples.push(Sample::from_components(
                coord,
                timestamp,
                components_for_level(level),
            ));
        }
        samples
    }
}

/// Pollution level for `coord` at `timestamp` before jitter.
pub fn expected_level(coord: Coordinate, timestamp: i64) -> f64 {
    baseline(coord) * diurnal_factor(coord.lon(), timestamp)
}

/// Stable baseline for a location, boosted near known hotspots.
pub fn baseline(coord: Coordinate) -> f64 {
    let unit = unit_interval(coord.bucket_key());
    let base = BASELINE_MIN + (BASELINE_MAX - BASELINE_MIN) * unit;

    let boost = HOTSPOTS
        .iter()
        .find_map(|&(lat, lon, factor)| {
            let hotspot = Coordinate::new(lat, lon).ok()?;
            hotspot.is_near(&coord, HOTSPOT_RADIUS).then_some(factor)
        })
        .unwrap_or(1.0);

    base * boost
}

/// Time-of-day multiplier: 1.0 at solar noon, 1.3 at solar midnight.
pub fn diurnal_factor(lon: f64, timestamp: i64) -> f64 {
    let utc_hour = timestamp.rem_euclid(SECONDS_PER_DAY) as f64 / HOUR as f64;
    let solar_hour = (utc_hour + lon / 15.0).rem_euclid(24.0);
    1.0 + 0.3 * (solar_hour - 12.0).abs() / 12.0
}

/// Map a bucket key onto [0, 1) with a splitmix64 finalizer.
fn unit_interval(key: BucketKey) -> f64 {
    let mut x = ((key.lat as u32 as u64) << 32) | key.lon as u32 as u64;
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^= x >> 31;
    (x >> 11) as f64 / (1u64 << 53) as f64
}

fn components_for_level(level: f64) -> Components {
    let scale = (level / LEVEL_CEILING).clamp(0.0, 1.0);
    let value = |i: usize| {
        let (low, high) = COMPONENT_BANDS[i];
        round2(low + (high - low) * scale)
    };

    Components {
        co: value(0),
        no: value(1),
        no2: value(2),
        o3: value(3),
        so2: value(4),
        pm2_5: value(5),
        pm10: value(6),
        nh3: value(7),
    }
    .clamped()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
