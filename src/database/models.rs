// src/database/models.rs
use chrono::{DateTime, NaiveDateTime, Utc};

use crate::models::SourceTimestamp;

/// Most recent reading of one location, joined with its location details
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LatestReading {
    pub location_id: i64,
    pub name: String,
    pub facility_name: Option<String>,
    pub count: i64,
    pub capacity: i64,
    pub percentage: i64,
    pub is_closed: bool,
    pub min_capacity_range: Option<i64>,
    pub max_capacity_range: Option<i64>,
    pub min_color: Option<String>,
    pub max_color: Option<String>,
    pub last_updated: SourceTimestamp,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LocationRow {
    pub location_id: i64,
    pub name: String,
    pub total_capacity: i64,
    pub facility_id: Option<i64>,
    pub facility_name: Option<String>,
    pub min_capacity_range: Option<i64>,
    pub max_capacity_range: Option<i64>,
    pub min_color: Option<String>,
    pub max_color: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ReadingRow {
    pub id: i64,
    pub location_id: i64,
    pub count: i64,
    pub capacity: i64,
    pub percentage: i64,
    pub is_closed: bool,
    pub last_updated: SourceTimestamp,
    pub fetched_at: DateTime<Utc>,
}

/// Totals over the whole store
#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct Stats {
    pub total_readings: i64,
    pub locations_tracked: i64,
    pub first_reading: Option<NaiveDateTime>,
    pub last_reading: Option<NaiveDateTime>,
    pub total_snapshots: i64,
    pub successful_fetches: i64,
    pub failed_fetches: i64,
}

/// One location's readings on one (facility-local) calendar day
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DailyRollup {
    /// Day as `YYYY-MM-DD`
    pub day: String,
    pub location_id: i64,
    pub name: String,
    pub readings: i64,
    pub avg_percentage: f64,
    pub peak_percentage: i64,
    pub avg_count: i64,
}

/// Row counts per table plus the on-disk size
#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct TableCounts {
    pub locations: i64,
    pub readings: i64,
    pub snapshots: i64,
    pub fetch_log: i64,
    pub size_bytes: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FetchLogRow {
    pub id: i64,
    pub fetched_at: DateTime<Utc>,
    pub success: bool,
    pub locations_fetched: i64,
    pub new_readings: i64,
    pub error_message: Option<String>,
}
