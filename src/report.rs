//! Plain-text rendering of query results

use crate::{
    analytics::{day_name, hour_label, Heatmap, OptimalTime},
    database::{DailyRollup, FetchLogRow, LatestReading, ReadingRow, Stats, TableCounts},
};

/// Busy level of a location, from its own published cut points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyLevel {
    Closed,
    Quiet,
    Moderate,
    Busy,
}

impl BusyLevel {
    /// Cut points default to 50% and 80% when the feed leaves them out
    pub fn of(reading: &LatestReading) -> Self {
        if reading.is_closed {
            return BusyLevel::Closed;
        }
        let moderate = reading.min_capacity_range.unwrap_or(50);
        let busy = reading.max_capacity_range.unwrap_or(80);
        match reading.percentage {
            p if p >= busy => BusyLevel::Busy,
            p if p >= moderate => BusyLevel::Moderate,
            _ => BusyLevel::Quiet,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            BusyLevel::Closed => "closed",
            BusyLevel::Quiet => "quiet",
            BusyLevel::Moderate => "moderate",
            BusyLevel::Busy => "busy",
        }
    }
}

pub fn latest(rows: &[LatestReading]) -> String {
    if rows.is_empty() {
        return "No readings stored yet.\n".to_string();
    }

    let mut out = format!(
        "{:<32} {:>6} {:>8} {:>5}  {:<8}  {}\n",
        "Location", "Count", "Capacity", "%", "Level", "Updated"
    );
    for r in rows {
        out.push_str(&format!(
            "{:<32} {:>6} {:>8} {:>4}%  {:<8}  {}\n",
            truncate(&r.name, 32),
            r.count,
            r.capacity,
            r.percentage,
            BusyLevel::of(r).label(),
            r.last_updated
        ));
    }
    out
}

pub fn optimal(rows: &[OptimalTime]) -> String {
    if rows.is_empty() {
        return "Not enough data yet to rank visiting times.\n".to_string();
    }

    let mut out = format!(
        "{:>3}  {:<32} {:<10} {:>6} {:>7} {:>7}\n",
        "#", "Location", "Day", "Hour", "Avg %", "Samples"
    );
    for (i, r) in rows.iter().enumerate() {
        out.push_str(&format!(
            "{:>3}  {:<32} {:<10} {:>6} {:>6.1}% {:>7}\n",
            i + 1,
            truncate(&r.location_name, 32),
            day_name(r.day_of_week),
            hour_label(r.hour),
            r.avg_percentage,
            r.samples
        ));
    }
    out
}

/// Day rows by hour columns; blank cells have no data
pub fn heatmap(location: &str, grid: &Heatmap) -> String {
    let header: String = (0..24).map(|hour| format!("{:>4}", hour)).collect();
    let mut out = format!("{}\n{:<4}{}\n", location, "", header);

    for (day, hours) in grid.iter().enumerate() {
        let cells: String = hours
            .iter()
            .map(|cell| match cell {
                Some(avg) => format!("{:>4}", avg.round() as i64),
                None => format!("{:>4}", "."),
            })
            .collect();
        out.push_str(&format!("{:<4}{}\n", &day_name(day as i64)[..3], cells));
    }
    out
}

pub fn stats(stats: &Stats, counts: &TableCounts, fetches: &[FetchLogRow]) -> String {
    let fmt_time = |t: Option<chrono::NaiveDateTime>| {
        t.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string())
    };

    let lines = [
        format!("Readings:           {}", stats.total_readings),
        format!("Locations tracked:  {}", stats.locations_tracked),
        format!("First reading:      {}", fmt_time(stats.first_reading)),
        format!("Last reading:       {}", fmt_time(stats.last_reading)),
        format!("Snapshots:          {}", stats.total_snapshots),
        format!(
            "Fetches:            {} ok, {} failed",
            stats.successful_fetches, stats.failed_fetches
        ),
        format!(
            "Rows:               {} locations, {} readings, {} snapshots, {} fetch log",
            counts.locations, counts.readings, counts.snapshots, counts.fetch_log
        ),
        format!(
            "Database size:      {:.1} KiB",
            counts.size_bytes as f64 / 1024.0
        ),
    ];
    let mut out = lines.join("\n");
    out.push('\n');

    if !fetches.is_empty() {
        out.push_str("\nRecent fetches:\n");
        for f in fetches {
            let outcome = if f.success {
                format!("ok, {} locations, {} new", f.locations_fetched, f.new_readings)
            } else {
                format!("failed: {}", f.error_message.as_deref().unwrap_or("unknown"))
            };
            out.push_str(&format!(
                "  {}  {}\n",
                f.fetched_at.format("%Y-%m-%d %H:%M:%S"),
                outcome
            ));
        }
    }
    out
}

pub fn daily(rows: &[DailyRollup]) -> String {
    if rows.is_empty() {
        return "No readings in this period.\n".to_string();
    }

    let mut out = format!(
        "{:<10}  {:<32} {:>8} {:>7} {:>6} {:>9}\n",
        "Day", "Location", "Readings", "Avg %", "Peak", "Avg count"
    );
    for r in rows {
        out.push_str(&format!(
            "{:<10}  {:<32} {:>8} {:>6.1}% {:>5}% {:>9}\n",
            r.day,
            truncate(&r.name, 32),
            r.readings,
            r.avg_percentage,
            r.peak_percentage,
            r.avg_count
        ));
    }
    out
}

pub fn history(rows: &[ReadingRow]) -> String {
    if rows.is_empty() {
        return "No readings in this period.\n".to_string();
    }

    rows.iter()
        .map(|r| {
            let state = if r.is_closed { " (closed)" } else { "" };
            format!(
                "{}  {:>4}/{:<4} {:>4}%{}\n",
                r.last_updated.0.format("%a %Y-%m-%d %H:%M"),
                r.count,
                r.capacity,
                r.percentage,
                state
            )
        })
        .collect()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut t: String = s.chars().take(max - 1).collect();
        t.push('…');
        t
    }
}
