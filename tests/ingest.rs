use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use occupancy_recorder::{
    config::DatabaseConfig,
    database::Database,
    errors::RecorderError,
    fetch::{parse_payload, FacilitySource},
    ingest::{IngestSummary, Ingestor},
    models::FacilityRecord,
};

async fn setup_test_db() -> (TempDir, Database) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = DatabaseConfig {
        path: dir.path().join("occupancy.db"),
        snapshot_interval: Duration::from_secs(3600),
    };
    let db = Database::open(&config).await.expect("Failed to open database");
    (dir, db)
}

fn batch(timestamp: &str, counts: [i64; 3]) -> Vec<FacilityRecord> {
    let payload = format!(
        r#"[
            {{
                "LocationId": 101,
                "LocationName": "Weight Room",
                "TotalCapacity": 80,
                "LastCount": {},
                "IsClosed": false,
                "FacilityId": 1,
                "FacilityName": "Rec Center",
                "MinCapacityRange": 50,
                "MaxCapacityRange": 80,
                "MinColor": "green",
                "MaxColor": "red",
                "LastUpdatedDateAndTime": "{ts}"
            }},
            {{
                "LocationId": 102,
                "LocationName": "Cardio Deck",
                "TotalCapacity": 40,
                "LastCount": {},
                "IsClosed": false,
                "FacilityId": 1,
                "FacilityName": "Rec Center",
                "MinCapacityRange": 50,
                "MaxCapacityRange": 80,
                "MinColor": "green",
                "MaxColor": "red",
                "LastUpdatedDateAndTime": "{ts}"
            }},
            {{
                "LocationId": 103,
                "LocationName": "Outdoor Pool",
                "TotalCapacity": 0,
                "LastCount": {},
                "IsClosed": true,
                "FacilityId": 2,
                "FacilityName": "Aquatics",
                "MinCapacityRange": null,
                "MaxCapacityRange": null,
                "MinColor": null,
                "MaxColor": null,
                "LastUpdatedDateAndTime": "{ts}"
            }}
        ]"#,
        counts[0],
        counts[1],
        counts[2],
        ts = timestamp
    );
    parse_payload(payload.as_bytes()).expect("Failed to parse batch")
}

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, hour, minute, 0).unwrap()
}

/// Returns a fixed result on every fetch
struct StubSource {
    result: Mutex<Option<Result<Vec<FacilityRecord>, RecorderError>>>,
}

impl StubSource {
    fn new(result: Result<Vec<FacilityRecord>, RecorderError>) -> Self {
        Self {
            result: Mutex::new(Some(result)),
        }
    }
}

#[async_trait]
impl FacilitySource for StubSource {
    async fn fetch(&self) -> Result<Vec<FacilityRecord>, RecorderError> {
        self.result
            .lock()
            .unwrap()
            .take()
            .unwrap_or(Err(RecorderError::EmptyBatch))
    }
}

#[tokio::test]
async fn test_end_to_end_ingestion() {
    let (_dir, db) = setup_test_db().await;
    let ingestor = Ingestor::new(&db);

    let summary = ingestor
        .ingest(batch("2024-03-04T10:00:00", [20, 10, 0]), at(15, 0))
        .await
        .unwrap();
    assert_eq!(
        summary,
        IngestSummary {
            locations: 3,
            new_readings: 3,
            snapshot_saved: true,
        }
    );
    let closed_pct: i64 =
        sqlx::query_scalar("SELECT percentage FROM readings WHERE location_id = 103")
            .fetch_one(db.pool())
            .await
            .unwrap();
    assert_eq!(closed_pct, 0);

    // Same source timestamp again: nothing new
    let summary = ingestor
        .ingest(batch("2024-03-04T10:00:00", [20, 10, 0]), at(15, 5))
        .await
        .unwrap();
    assert_eq!(summary.locations, 3);
    assert_eq!(summary.new_readings, 0);
    assert!(!summary.snapshot_saved);
    assert_eq!(db.table_counts().await.unwrap().readings, 3);

    let summary = ingestor
        .ingest(batch("2024-03-04T10:15:00", [60, 30, 0]), at(15, 15))
        .await
        .unwrap();
    assert_eq!(summary.new_readings, 3);

    let latest = db.latest_readings().await.unwrap();
    assert_eq!(latest.len(), 3);
    assert_eq!(latest[0].location_id, 101);
    assert_eq!(latest[0].count, 60);
    assert_eq!(latest[0].percentage, 75);
    assert_eq!(latest[1].location_id, 102);
    assert_eq!(latest[1].count, 30);
    assert!(latest[2].is_closed);
    assert!(latest
        .iter()
        .all(|r| r.last_updated.to_string() == "2024-03-04T10:15:00"));

    let counts = db.table_counts().await.unwrap();
    assert_eq!(counts.locations, 3);
    assert_eq!(counts.readings, 6);
    assert_eq!(counts.snapshots, 1);
    assert_eq!(counts.fetch_log, 3);

    let stats = db.stats().await.unwrap();
    assert_eq!(stats.successful_fetches, 3);
    assert_eq!(stats.failed_fetches, 0);
}

#[tokio::test]
async fn test_snapshot_saved_after_interval() {
    let (_dir, db) = setup_test_db().await;
    let ingestor = Ingestor::new(&db);

    let first = ingestor
        .ingest(batch("2024-03-04T10:00:00", [1, 1, 0]), at(10, 0))
        .await
        .unwrap();
    let second = ingestor
        .ingest(batch("2024-03-04T10:30:00", [2, 2, 0]), at(10, 30))
        .await
        .unwrap();
    let third = ingestor
        .ingest(batch("2024-03-04T11:05:00", [3, 3, 0]), at(11, 5))
        .await
        .unwrap();

    assert!(first.snapshot_saved);
    assert!(!second.snapshot_saved);
    assert!(third.snapshot_saved);
    assert_eq!(db.stats().await.unwrap().total_snapshots, 2);
}

#[tokio::test]
async fn test_empty_batch_is_rejected() {
    let (_dir, db) = setup_test_db().await;

    let err = Ingestor::new(&db)
        .ingest(Vec::new(), at(10, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, RecorderError::EmptyBatch));

    let counts = db.table_counts().await.unwrap();
    assert_eq!(counts.locations, 0);
    assert_eq!(counts.readings, 0);
    assert_eq!(counts.snapshots, 0);

    let log = db.recent_fetch_log(1).await.unwrap();
    assert_eq!(log.len(), 1);
    assert!(!log[0].success);
    assert_eq!(log[0].locations_fetched, 0);
    assert!(log[0].error_message.is_some());
}

#[tokio::test]
async fn test_run_cycle_with_source() {
    let (_dir, db) = setup_test_db().await;
    let source = StubSource::new(Ok(batch("2024-03-04T10:00:00", [5, 5, 0])));

    let summary = Ingestor::new(&db).run_cycle(&source).await.unwrap();

    assert_eq!(summary.locations, 3);
    assert_eq!(summary.new_readings, 3);
    let log = db.recent_fetch_log(1).await.unwrap();
    assert!(log[0].success);
    assert_eq!(log[0].locations_fetched, 3);
    assert_eq!(log[0].new_readings, 3);
}

#[tokio::test]
async fn test_failed_fetch_is_logged_and_returned() {
    let (_dir, db) = setup_test_db().await;
    let source = StubSource::new(Err(RecorderError::HttpStatus(503)));

    let err = Ingestor::new(&db).run_cycle(&source).await.unwrap_err();
    assert!(matches!(err, RecorderError::HttpStatus(503)));

    let stats = db.stats().await.unwrap();
    assert_eq!(stats.failed_fetches, 1);
    assert_eq!(stats.successful_fetches, 0);
    let log = db.recent_fetch_log(1).await.unwrap();
    assert_eq!(
        log[0].error_message.as_deref(),
        Some("Unexpected HTTP status 503")
    );

    // The next cycle still works
    let source = StubSource::new(Ok(batch("2024-03-04T10:00:00", [5, 5, 0])));
    assert!(Ingestor::new(&db).run_cycle(&source).await.is_ok());
}

#[tokio::test]
async fn test_failed_log_does_not_mask_error() {
    let (_dir, db) = setup_test_db().await;
    db.close().await;
    let source = StubSource::new(Err(RecorderError::InvalidPayload("not an array".into())));

    let err = Ingestor::new(&db).run_cycle(&source).await.unwrap_err();
    assert!(matches!(err, RecorderError::InvalidPayload(_)));
}
