// src/database.rs
use std::path::Path;

use chrono::{DateTime, TimeDelta, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use tracing::{debug, info, warn};

use crate::{
    config::DatabaseConfig,
    errors::RecorderError,
    models::{total_occupancy, FacilityRecord},
};

pub mod models;
pub mod types;

pub use models::{
    DailyRollup, FetchLogRow, LatestReading, LocationRow, ReadingRow, Stats, TableCounts,
};
pub use types::{InsertOutcome, OnConflict};

/// Storage for locations, readings, snapshots and the fetch log
///
/// The handle owns a connection pool; clones share it. Every statement runs
/// in autocommit mode, so rows written before a crash stay committed.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    snapshot_interval: TimeDelta,
}

impl Database {
    /// Open or create the database file and apply pending migrations
    pub async fn open(config: &DatabaseConfig) -> Result<Self, RecorderError> {
        config.validate()?;

        info!(
            "Opening database: path={}, snapshot_interval={:?}",
            config.path.display(),
            config.snapshot_interval
        );

        let pool = Self::connect(&config.path).await?;
        let snapshot_interval = TimeDelta::from_std(config.snapshot_interval).map_err(|e| {
            RecorderError::ConfigurationError {
                message: format!("Snapshot interval out of range: {}", e),
            }
        })?;

        Self::new(pool, snapshot_interval).await
    }

    /// Wrap an existing pool, applying pending migrations
    pub async fn new(pool: SqlitePool, snapshot_interval: TimeDelta) -> Result<Self, RecorderError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self {
            pool,
            snapshot_interval,
        })
    }

    async fn connect(path: &Path) -> Result<SqlitePool, RecorderError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("temp_store", "MEMORY");

        SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| RecorderError::DatabaseOpenError {
                url: path.display().to_string(),
                origin: e.to_string(),
            })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close all connections. Calling this more than once is harmless.
    pub async fn close(&self) {
        if !self.pool.is_closed() {
            info!("Closing database");
        }
        self.pool.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Insert a location or overwrite every field of an existing one
    pub async fn upsert_location(
        &self,
        record: &FacilityRecord,
        now: DateTime<Utc>,
    ) -> Result<(), RecorderError> {
        sqlx::query(
            "INSERT INTO locations (
                location_id, name, total_capacity, facility_id, facility_name,
                min_capacity_range, max_capacity_range, min_color, max_color,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
            ON CONFLICT(location_id) DO UPDATE SET
                name = excluded.name,
                total_capacity = excluded.total_capacity,
                facility_id = excluded.facility_id,
                facility_name = excluded.facility_name,
                min_capacity_range = excluded.min_capacity_range,
                max_capacity_range = excluded.max_capacity_range,
                min_color = excluded.min_color,
                max_color = excluded.max_color,
                updated_at = excluded.updated_at",
        )
        .bind(record.location_id)
        .bind(record.location_name.trim())
        .bind(record.total_capacity)
        .bind(record.facility_id)
        .bind(record.facility_name.as_deref())
        .bind(record.min_capacity_range)
        .bind(record.max_capacity_range)
        .bind(record.min_color.as_deref())
        .bind(record.max_color.as_deref())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a reading keyed by (location, source timestamp)
    ///
    /// Call [`Database::upsert_location`] for the same record first.
    pub async fn insert_reading(
        &self,
        record: &FacilityRecord,
        fetched_at: DateTime<Utc>,
        on_conflict: OnConflict,
    ) -> Result<InsertOutcome, RecorderError> {
        let sql = match on_conflict {
            OnConflict::Skip => {
                "INSERT INTO readings (
                    location_id, count, capacity, percentage, is_closed, last_updated, fetched_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(location_id, last_updated) DO NOTHING"
            }
            OnConflict::Fail => {
                "INSERT INTO readings (
                    location_id, count, capacity, percentage, is_closed, last_updated, fetched_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
            }
        };

        let result = sqlx::query(sql)
            .bind(record.location_id)
            .bind(record.last_count)
            .bind(record.total_capacity)
            .bind(record.percentage())
            .bind(record.is_closed)
            .bind(record.last_updated_date_and_time)
            .bind(fetched_at)
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) if done.rows_affected() > 0 => Ok(InsertOutcome::Inserted),
            Ok(_) => {
                debug!(
                    "Reading for location {} at {} already stored",
                    record.location_id, record.last_updated_date_and_time
                );
                Ok(InsertOutcome::Skipped)
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(RecorderError::DuplicateReading {
                    location_id: record.location_id,
                    timestamp: record.last_updated_date_and_time.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Store the whole batch as one snapshot row
    pub async fn save_snapshot(
        &self,
        records: &[FacilityRecord],
        fetched_at: DateTime<Utc>,
    ) -> Result<(), RecorderError> {
        let payload = serde_json::to_string(records)?;

        sqlx::query(
            "INSERT INTO snapshots (fetched_at, payload, location_count, total_occupancy)
            VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(fetched_at)
        .bind(payload)
        .bind(records.len() as i64)
        .bind(total_occupancy(records))
        .execute(&self.pool)
        .await?;

        info!("Saved snapshot of {} locations", records.len());
        Ok(())
    }

    /// True when no snapshot exists or the latest one is older than the interval
    pub async fn should_save_snapshot(&self, now: DateTime<Utc>) -> Result<bool, RecorderError> {
        let last: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT fetched_at FROM snapshots ORDER BY id DESC LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;

        Ok(match last {
            None => true,
            Some(last) => now - last > self.snapshot_interval,
        })
    }

    /// Append a fetch attempt to the log. Failures are logged and dropped.
    pub async fn log_fetch_attempt(
        &self,
        fetched_at: DateTime<Utc>,
        success: bool,
        locations_fetched: usize,
        new_readings: usize,
        error_message: Option<&str>,
    ) {
        let result = sqlx::query(
            "INSERT INTO fetch_log (
                fetched_at, success, locations_fetched, new_readings, error_message
            ) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(fetched_at)
        .bind(success)
        .bind(locations_fetched as i64)
        .bind(new_readings as i64)
        .bind(error_message)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            warn!("Failed to write fetch log entry: {}", e);
        }
    }

    pub async fn get_location(&self, location_id: i64) -> Result<Option<LocationRow>, RecorderError> {
        let row = sqlx::query_as::<_, LocationRow>(
            "SELECT location_id, name, total_capacity, facility_id, facility_name,
                min_capacity_range, max_capacity_range, min_color, max_color,
                created_at, updated_at
            FROM locations WHERE location_id = ?1",
        )
        .bind(location_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Most recent reading of each location, busiest first
    pub async fn latest_readings(&self) -> Result<Vec<LatestReading>, RecorderError> {
        let rows = sqlx::query_as::<_, LatestReading>(
            "SELECT
                r.location_id,
                COALESCE(l.name, 'Location ' || r.location_id) AS name,
                l.facility_name,
                r.count,
                r.capacity,
                r.percentage,
                r.is_closed,
                l.min_capacity_range,
                l.max_capacity_range,
                l.min_color,
                l.max_color,
                r.last_updated,
                r.fetched_at
            FROM readings r
            LEFT JOIN locations l ON l.location_id = r.location_id
            WHERE r.id IN (SELECT MAX(id) FROM readings GROUP BY location_id)
            ORDER BY r.percentage DESC, r.location_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn stats(&self) -> Result<Stats, RecorderError> {
        let stats = sqlx::query_as::<_, Stats>(
            "SELECT
                (SELECT COUNT(*) FROM readings) AS total_readings,
                (SELECT COUNT(DISTINCT location_id) FROM readings) AS locations_tracked,
                (SELECT MIN(last_updated) FROM readings) AS first_reading,
                (SELECT MAX(last_updated) FROM readings) AS last_reading,
                (SELECT COUNT(*) FROM snapshots) AS total_snapshots,
                (SELECT COUNT(*) FROM fetch_log WHERE success = 1) AS successful_fetches,
                (SELECT COUNT(*) FROM fetch_log WHERE success = 0) AS failed_fetches",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(stats)
    }

    /// Readings of one location ingested within the last `hours`, oldest first
    pub async fn recent_readings(
        &self,
        location_id: i64,
        hours: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReadingRow>, RecorderError> {
        let cutoff = window_start(now, TimeDelta::try_hours(hours), "hours", hours)?;
        let rows = sqlx::query_as::<_, ReadingRow>(
            "SELECT id, location_id, count, capacity, percentage, is_closed, last_updated, fetched_at
            FROM readings
            WHERE location_id = ?1 AND fetched_at >= ?2
            ORDER BY last_updated, id",
        )
        .bind(location_id)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Per-location daily averages of open readings ingested in the last `days`
    pub async fn daily_rollups(
        &self,
        days: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<DailyRollup>, RecorderError> {
        let cutoff = window_start(now, TimeDelta::try_days(days), "days", days)?;
        let rows = sqlx::query_as::<_, DailyRollup>(
            "SELECT
                date(r.last_updated) AS day,
                r.location_id,
                COALESCE(l.name, 'Location ' || r.location_id) AS name,
                COUNT(*) AS readings,
                ROUND(AVG(r.percentage), 1) AS avg_percentage,
                MAX(r.percentage) AS peak_percentage,
                CAST(ROUND(AVG(r.count)) AS INTEGER) AS avg_count
            FROM readings r
            LEFT JOIN locations l ON l.location_id = r.location_id
            WHERE r.is_closed = 0 AND r.fetched_at >= ?1
            GROUP BY day, r.location_id
            ORDER BY day DESC, r.location_id",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn recent_fetch_log(&self, limit: i64) -> Result<Vec<FetchLogRow>, RecorderError> {
        let rows = sqlx::query_as::<_, FetchLogRow>(
            "SELECT id, fetched_at, success, locations_fetched, new_readings, error_message
            FROM fetch_log ORDER BY id DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn table_counts(&self) -> Result<TableCounts, RecorderError> {
        let counts = sqlx::query_as::<_, TableCounts>(
            "SELECT
                (SELECT COUNT(*) FROM locations) AS locations,
                (SELECT COUNT(*) FROM readings) AS readings,
                (SELECT COUNT(*) FROM snapshots) AS snapshots,
                (SELECT COUNT(*) FROM fetch_log) AS fetch_log,
                (SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size())
                    AS size_bytes",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(counts)
    }

    /// Rebuild the database file to reclaim free pages
    pub async fn compact(&self) -> Result<(), RecorderError> {
        info!("Compacting database");
        sqlx::query("VACUUM").execute(&self.pool).await?;
        // In WAL mode, this truncates the write-ahead log after the rebuild
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Start of a look-back window ending at `now`
fn window_start(
    now: DateTime<Utc>,
    span: Option<TimeDelta>,
    unit: &str,
    value: i64,
) -> Result<DateTime<Utc>, RecorderError> {
    span.filter(|span| *span >= TimeDelta::zero())
        .and_then(|span| now.checked_sub_signed(span))
        .ok_or_else(|| RecorderError::ConfigurationError {
            message: format!("Look-back window of {} {} is out of range", value, unit),
        })
}
