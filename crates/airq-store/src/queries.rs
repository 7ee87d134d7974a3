//! Query builder for stored samples.
//!
//! [`SampleQuery`] follows the builder pattern. Filters are optional and can
//! be chained in any order.
//!
//! # Example
//!
//! ```
//! use airq_store::{Store, SampleQuery};
//! use airq_types::Coordinate;
//!
//! let store = Store::open_in_memory()?;
//! let paris = Coordinate::new(48.8566, 2.3522).unwrap();
//!
//! let query = SampleQuery::new()
//!     .location(paris)
//!     .since(1_719_273_600)
//!     .until(1_719_964_799)
//!     .limit(100);
//!
//! let samples = store.query(&query)?;
//! assert!(samples.is_empty());
//! # Ok::<(), airq_store::Error>(())
//! ```

use airq_types::{BucketKey, Coordinate};

/// Fluent query builder for samples.
///
/// By default, results are ordered by timestamp ascending (oldest first),
/// which is the order historical responses use.
#[derive(Debug, Default, Clone)]
pub struct SampleQuery {
    /// Filter by coordinate bucket.
    pub bucket: Option<BucketKey>,
    /// Only samples at or after this Unix timestamp.
    pub since: Option<i64>,
    /// Only samples at or before this Unix timestamp.
    pub until: Option<i64>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Order by timestamp descending.
    pub newest_first: bool,
}

impl SampleQuery {
    /// Create a query with no filters, oldest first.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter to the bucket containing `coord`.
    ///
    /// The coordinate is rounded with the same rule used on insert.
    pub fn location(mut self, coord: Coordinate) -> Self {
        self.bucket = Some(coord.bucket_key());
        self
    }

    /// Filter to samples at or after `timestamp`.
    pub fn since(mut self, timestamp: i64) -> Self {
        self.since = Some(timestamp);
        self
    }

    /// Filter to samples at or before `timestamp`.
    pub fn until(mut self, timestamp: i64) -> Self {
        self.until = Some(timestamp);
        self
    }

    /// Limit the number of results.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Return newest samples first.
    pub fn newest_first(mut self) -> Self {
        self.newest_first = true;
        self
    }

    /// Build the SQL WHERE clause and parameters.
    pub(crate) fn build_where(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(bucket) = self.bucket {
            conditions.push("bucket_lat = ? AND bucket_lon = ?");
            params.push(Box::new(bucket.lat));
            params.push(Box::new(bucket.lon));
        }

        if let Some(since) = self.since {
            conditions.push("timestamp >= ?");
            params.push(Box::new(since));
        }

        if let Some(until) = self.until {
            conditions.push("timestamp <= ?");
            params.push(Box::new(until));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    /// Build the full SQL query.
    ///
    /// Ties on timestamp are broken by row id so insertion order is kept.
    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        let order = if self.newest_first { "DESC" } else { "ASC" };

        let mut sql = format!(
            "SELECT id, timestamp, latitude, longitude, aqi, co, no, no2, o3, so2, \
             pm2_5, pm10, nh3, location_name, source, created_at \
             FROM aqi_samples {} ORDER BY timestamp {order}, id {order}",
            where_clause
        );

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        sql
    }
}
