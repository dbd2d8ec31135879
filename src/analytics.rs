//! Busiest and quietest times, aggregated from stored readings.
//!
//! Readings are bucketed by the facility-local day of week (0 = Sunday) and
//! hour of day of their source timestamp. Closed readings are ignored.

use crate::{database::Database, errors::RecorderError};

/// Fewest readings a (location, day, hour) bucket needs to be ranked
pub const MIN_SAMPLES: i64 = 2;

pub const DEFAULT_OPTIMAL_LIMIT: i64 = 20;

const DAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

/// Occupancy of one location in one weekly hour slot
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct HourlyAverage {
    pub location_name: String,
    pub day_of_week: i64,
    pub hour: i64,
    /// Mean percentage, one decimal
    pub avg_percentage: f64,
    pub avg_count: i64,
    pub min_percentage: i64,
    pub max_percentage: i64,
    pub samples: i64,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct OptimalTime {
    pub location_id: i64,
    pub location_name: String,
    pub day_of_week: i64,
    pub hour: i64,
    pub avg_percentage: f64,
    pub avg_count: i64,
    pub samples: i64,
}

/// Hourly averages per location name, optionally restricted to names
/// containing `location_filter` (case-insensitive)
pub async fn hourly_averages(
    db: &Database,
    location_filter: Option<&str>,
) -> Result<Vec<HourlyAverage>, RecorderError> {
    let rows = sqlx::query_as::<_, HourlyAverage>(
        "SELECT
            l.name AS location_name,
            CAST(strftime('%w', r.last_updated) AS INTEGER) AS day_of_week,
            CAST(strftime('%H', r.last_updated) AS INTEGER) AS hour,
            ROUND(AVG(r.percentage), 1) AS avg_percentage,
            CAST(ROUND(AVG(r.count)) AS INTEGER) AS avg_count,
            MIN(r.percentage) AS min_percentage,
            MAX(r.percentage) AS max_percentage,
            COUNT(*) AS samples
        FROM readings r
        JOIN locations l ON l.location_id = r.location_id
        WHERE r.is_closed = 0
            AND (?1 IS NULL OR instr(lower(l.name), lower(?1)) > 0)
        GROUP BY l.name, day_of_week, hour
        ORDER BY l.name, day_of_week, hour",
    )
    .bind(location_filter)
    .fetch_all(db.pool())
    .await?;

    Ok(rows)
}

/// Quietest weekly hour slots, quietest first
///
/// Slots with fewer than [`MIN_SAMPLES`] readings are left out.
pub async fn optimal_times(
    db: &Database,
    location_filter: Option<&str>,
    limit: i64,
) -> Result<Vec<OptimalTime>, RecorderError> {
    let rows = sqlx::query_as::<_, OptimalTime>(
        "SELECT
            r.location_id,
            l.name AS location_name,
            CAST(strftime('%w', r.last_updated) AS INTEGER) AS day_of_week,
            CAST(strftime('%H', r.last_updated) AS INTEGER) AS hour,
            ROUND(AVG(r.percentage), 1) AS avg_percentage,
            CAST(ROUND(AVG(r.count)) AS INTEGER) AS avg_count,
            COUNT(*) AS samples
        FROM readings r
        JOIN locations l ON l.location_id = r.location_id
        WHERE r.is_closed = 0
            AND (?1 IS NULL OR instr(lower(l.name), lower(?1)) > 0)
        GROUP BY r.location_id, day_of_week, hour
        HAVING COUNT(*) >= ?2
        ORDER BY avg_percentage, r.location_id, day_of_week, hour
        LIMIT ?3",
    )
    .bind(location_filter)
    .bind(MIN_SAMPLES)
    .bind(limit)
    .fetch_all(db.pool())
    .await?;

    Ok(rows)
}

/// 7x24 grid of average percentages, indexed `[day_of_week][hour]`
pub type Heatmap = [[Option<f64>; 24]; 7];

/// Fold hourly averages into a day/hour grid
///
/// When `rows` covers several locations, a slot keeps the sample-weighted mean.
pub fn heatmap(rows: &[HourlyAverage]) -> Heatmap {
    let mut sums = [[(0.0f64, 0i64); 24]; 7];
    for row in rows {
        let (Ok(day), Ok(hour)) = (usize::try_from(row.day_of_week), usize::try_from(row.hour))
        else {
            continue;
        };
        if day < 7 && hour < 24 {
            let slot = &mut sums[day][hour];
            slot.0 += row.avg_percentage * row.samples as f64;
            slot.1 += row.samples;
        }
    }

    let mut grid: Heatmap = [[None; 24]; 7];
    for (day, hours) in sums.iter().enumerate() {
        for (hour, &(sum, samples)) in hours.iter().enumerate() {
            if samples > 0 {
                grid[day][hour] = Some((sum / samples as f64 * 10.0).round() / 10.0);
            }
        }
    }
    grid
}

/// Name of a day of week, 0 = Sunday
pub fn day_name(day_of_week: i64) -> &'static str {
    usize::try_from(day_of_week)
        .ok()
        .and_then(|d| DAY_NAMES.get(d))
        .copied()
        .unwrap_or("Unknown")
}

/// Hour of day as a 12-hour clock label, e.g. `6 AM`
pub fn hour_label(hour: i64) -> String {
    match hour {
        0 => "12 AM".to_string(),
        1..=11 => format!("{} AM", hour),
        12 => "12 PM".to_string(),
        13..=23 => format!("{} PM", hour - 12),
        _ => format!("{}:00", hour),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(day: i64, hour: i64, avg: f64, samples: i64) -> HourlyAverage {
        HourlyAverage {
            location_name: "Gym".to_string(),
            day_of_week: day,
            hour,
            avg_percentage: avg,
            avg_count: 0,
            min_percentage: 0,
            max_percentage: 0,
            samples,
        }
    }

    #[test]
    fn test_day_name() {
        assert_eq!(day_name(0), "Sunday");
        assert_eq!(day_name(6), "Saturday");
        assert_eq!(day_name(7), "Unknown");
        assert_eq!(day_name(-1), "Unknown");
    }

    #[test]
    fn test_hour_label() {
        assert_eq!(hour_label(0), "12 AM");
        assert_eq!(hour_label(6), "6 AM");
        assert_eq!(hour_label(12), "12 PM");
        assert_eq!(hour_label(23), "11 PM");
    }

    #[test]
    fn test_heatmap_places_rows() {
        let grid = heatmap(&[row(1, 6, 12.5, 3), row(6, 23, 80.0, 1)]);

        assert_eq!(grid[1][6], Some(12.5));
        assert_eq!(grid[6][23], Some(80.0));
        assert_eq!(grid[0][0], None);
    }

    #[test]
    fn test_heatmap_weights_by_samples() {
        let grid = heatmap(&[row(2, 10, 10.0, 1), row(2, 10, 40.0, 3)]);

        assert_eq!(grid[2][10], Some(32.5));
    }

    #[test]
    fn test_heatmap_ignores_out_of_range() {
        let grid = heatmap(&[row(7, 0, 10.0, 1), row(0, 24, 10.0, 1)]);

        assert!(grid.iter().flatten().all(Option::is_none));
    }
}
