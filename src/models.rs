//! Data models.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::RecorderError;
use serde_helpers::*;

/// Timestamp reported by the occupancy feed for a location's current count.
///
/// The feed publishes the facility's local wall-clock time. When an offset is
/// present it is dropped after parsing, so that day-of-week and hour buckets
/// always follow the facility's own clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, sqlx::Type)]
#[sqlx(transparent)]
pub struct SourceTimestamp(pub NaiveDateTime);

const NAIVE_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

impl FromStr for SourceTimestamp {
    type Err = RecorderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(Self(dt.naive_local()));
        }
        if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z") {
            return Ok(Self(dt.naive_local()));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
            .map(Self)
            .ok_or_else(|| RecorderError::InvalidTimestamp(s.to_string()))
    }
}

impl fmt::Display for SourceTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%dT%H:%M:%S%.f"))
    }
}

impl Serialize for SourceTimestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SourceTimestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Current state of one location, as published by the occupancy feed
///
/// Field names follow the feed's PascalCase JSON keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FacilityRecord {
    pub location_id: i64,
    pub location_name: String,
    /// Total capacity, 0 if not published (null)
    #[serde(default, deserialize_with = "deserialize_null_as_zero")]
    pub total_capacity: i64,
    /// Current occupant count, 0 if not published (null)
    #[serde(default, deserialize_with = "deserialize_null_as_zero")]
    pub last_count: i64,
    #[serde(default, deserialize_with = "deserialize_null_as_false")]
    pub is_closed: bool,
    #[serde(default)]
    pub facility_id: Option<i64>,
    #[serde(default)]
    pub facility_name: Option<String>,
    /// Percentage below which the location is considered quiet
    #[serde(default)]
    pub min_capacity_range: Option<i64>,
    /// Percentage above which the location is considered busy
    #[serde(default)]
    pub max_capacity_range: Option<i64>,
    #[serde(default)]
    pub min_color: Option<String>,
    #[serde(default)]
    pub max_color: Option<String>,
    pub last_updated_date_and_time: SourceTimestamp,
}

impl FacilityRecord {
    /// Occupancy percentage of this record
    pub fn percentage(&self) -> i64 {
        occupancy_percentage(self.last_count, self.total_capacity)
    }
}

/// Occupancy as a whole percentage, `round(count / capacity * 100)`.
///
/// A capacity of zero or less means the capacity is unknown and yields 0.
/// Counts over capacity are not clamped.
pub fn occupancy_percentage(count: i64, capacity: i64) -> i64 {
    if capacity <= 0 {
        return 0;
    }
    (count as f64 / capacity as f64 * 100.0).round() as i64
}

/// Sum of occupant counts over all open locations
pub fn total_occupancy(records: &[FacilityRecord]) -> i64 {
    records
        .iter()
        .filter(|r| !r.is_closed)
        .map(|r| r.last_count)
        .sum()
}

/// Custom deserializers
mod serde_helpers {
    use serde::{self, Deserialize, Deserializer};

    pub fn deserialize_null_as_zero<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<i64>::deserialize(deserializer)?.unwrap_or(0))
    }

    pub fn deserialize_null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
    }
}
