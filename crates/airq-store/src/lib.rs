//! Local persistence for air-quality samples.
//!
//! This crate provides an append-only SQLite table of timestamped pollutant
//! samples keyed by coordinate bucket.
//!
//! # Features
//!
//! - Append single samples or whole batches (one transaction)
//! - Range queries by coordinate bucket and time, oldest first
//! - Source and location name recorded per row
//!
//! # Example
//!
//! ```no_run
//! use airq_store::Store;
//! use airq_types::Coordinate;
//!
//! let store = Store::open_default()?;
//! let nyc = Coordinate::new(40.7128, -74.0060).unwrap();
//!
//! let rows = store.query_range(nyc, 1_719_273_600, 1_719_964_799)?;
//! println!("{} samples", rows.len());
//! # Ok::<(), airq_store::Error>(())
//! ```

mod error;
mod models;
mod queries;
mod schema;
mod store;

pub use error::{Error, Result};
pub use models::StoredSample;
pub use queries::SampleQuery;
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/airq/aqi_data.db`
/// - macOS: `~/Library/Application Support/airq/aqi_data.db`
/// - Windows: `C:\Users\<user>\AppData\Local\airq\aqi_data.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("airq")
        .join("aqi_data.db")
}
