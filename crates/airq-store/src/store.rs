//! Main store implementation.

use std::path::Path;

use rusqlite::{Connection, Row};
use time::OffsetDateTime;
use tracing::{debug, info};

use airq_types::{AqiIndex, Components, Coordinate, Sample, Source};

use crate::error::{Error, Result};
use crate::models::StoredSample;
use crate::queries::SampleQuery;
use crate::schema;

const INSERT_SQL: &str = "INSERT INTO aqi_samples (timestamp, latitude, longitude, bucket_lat, \
     bucket_lon, aqi, co, no, no2, o3, so2, pm2_5, pm10, nh3, location_name, source, created_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)";

/// SQLite-based append-only store for air-quality samples.
///
/// Rows are keyed by coordinate bucket (see [`Coordinate::bucket_key`]).
/// There are no update or delete operations.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        // WAL mode for better write performance
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }
}

// Write operations
impl Store {
    /// Append one sample.
    ///
    /// The sample's coordinate is rounded to its bucket before insert.
    /// Returns the new row id.
    pub fn append(
        &self,
        sample: &Sample,
        source: Source,
        location_name: Option<&str>,
    ) -> Result<i64> {
        let created_at = OffsetDateTime::now_utc().unix_timestamp();
        insert_row(&self.conn, sample, source, location_name, created_at)?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Append many samples in a single transaction.
    ///
    /// Either every sample is stored or none is. Returns the number of rows
    /// inserted.
    pub fn append_batch(
        &self,
        samples: &[Sample],
        source: Source,
        location_name: Option<&str>,
    ) -> Result<usize> {
        let created_at = OffsetDateTime::now_utc().unix_timestamp();
        let tx = self.conn.unchecked_transaction()?;

        let mut inserted = 0;
        for sample in samples {
            inserted += insert_row(&tx, sample, source, location_name, created_at)?;
        }

        tx.commit()?;
        debug!("Appended {} samples ({})", inserted, source);
        Ok(inserted)
    }
}

fn insert_row(
    conn: &Connection,
    sample: &Sample,
    source: Source,
    location_name: Option<&str>,
    created_at: i64,
) -> Result<usize> {
    let bucket = sample.coord.bucket();
    let key = sample.coord.bucket_key();
    let c = &sample.components;

    let rows = conn.execute(
        INSERT_SQL,
        rusqlite::params![
            sample.timestamp,
            bucket.lat(),
            bucket.lon(),
            key.lat,
            key.lon,
            sample.aqi.value(),
            c.co,
            c.no,
            c.no2,
            c.o3,
            c.so2,
            c.pm2_5,
            c.pm10,
            c.nh3,
            location_name,
            source.as_str(),
            created_at,
        ],
    )?;
    Ok(rows)
}

// Read operations
impl Store {
    /// Samples in the bucket of `coord` with `start <= timestamp <= end`,
    /// oldest first.
    ///
    /// An empty result is not an error.
    pub fn query_range(
        &self,
        coord: Coordinate,
        start: i64,
        end: i64,
    ) -> Result<Vec<StoredSample>> {
        let query = SampleQuery::new().location(coord).since(start).until(end);
        self.query(&query)
    }

    /// Query samples with filters.
    pub fn query(&self, query: &SampleQuery) -> Result<Vec<StoredSample>> {
        let sql = query.build_sql();
        let (_, params) = query.build_where();

        debug!("Executing query: {}", sql);

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_ref.as_slice(), RawRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter().map(RawRow::into_stored).collect()
    }

    /// The most recent sample in the bucket of `coord`.
    pub fn latest_sample(&self, coord: Coordinate) -> Result<Option<StoredSample>> {
        let query = SampleQuery::new().location(coord).newest_first().limit(1);
        let mut samples = self.query(&query)?;
        Ok(samples.pop())
    }

    /// Count samples, optionally restricted to the bucket of `coord`.
    pub fn count_samples(&self, coord: Option<Coordinate>) -> Result<u64> {
        let count: i64 = match coord {
            Some(coord) => {
                let key = coord.bucket_key();
                self.conn.query_row(
                    "SELECT COUNT(*) FROM aqi_samples WHERE bucket_lat = ? AND bucket_lon = ?",
                    [key.lat, key.lon],
                    |row| row.get(0),
                )?
            }
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM aqi_samples", [], |row| row.get(0))?,
        };

        Ok(count as u64)
    }
}

/// Column values as read from SQLite, before domain validation.
struct RawRow {
    id: i64,
    timestamp: i64,
    latitude: f64,
    longitude: f64,
    aqi: i64,
    components: Components,
    location_name: Option<String>,
    source: String,
    created_at: i64,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            latitude: row.get(2)?,
            longitude: row.get(3)?,
            aqi: row.get(4)?,
            components: Components {
                co: row.get(5)?,
                no: row.get(6)?,
                no2: row.get(7)?,
                o3: row.get(8)?,
                so2: row.get(9)?,
                pm2_5: row.get(10)?,
                pm10: row.get(11)?,
                nh3: row.get(12)?,
            },
            location_name: row.get(13)?,
            source: row.get(14)?,
            created_at: row.get(15)?,
        })
    }

    fn into_stored(self) -> Result<StoredSample> {
        let id = self.id;
        let corrupt = |reason: String| Error::CorruptRow { id, reason };

        let coord =
            Coordinate::new(self.latitude, self.longitude).map_err(|e| corrupt(e.to_string()))?;
        let aqi = u8::try_from(self.aqi)
            .map_err(|_| corrupt(format!("aqi {} out of range", self.aqi)))
            .and_then(|v| AqiIndex::try_from(v).map_err(|e| corrupt(e.to_string())))?;
        let source = self
            .source
            .parse::<Source>()
            .map_err(|e| corrupt(e.to_string()))?;
        let created_at = OffsetDateTime::from_unix_timestamp(self.created_at)
            .map_err(|e| corrupt(e.to_string()))?;

        Ok(StoredSample {
            id,
            timestamp: self.timestamp,
            coord,
            aqi,
            components: self.components,
            location_name: self.location_name,
            source,
            created_at,
        })
    }
}
