//! Ingestion cycle: fetch, store, snapshot, log

use chrono::{DateTime, SubsecRound, Utc};
use tracing::{error, info};

use crate::{
    database::{Database, OnConflict},
    errors::RecorderError,
    fetch::FacilitySource,
    models::FacilityRecord,
};

/// Outcome of one successful ingestion cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestSummary {
    pub locations: usize,
    pub new_readings: usize,
    pub snapshot_saved: bool,
}

/// Drives one ingestion cycle at a time against a database
pub struct Ingestor<'a> {
    db: &'a Database,
}

impl<'a> Ingestor<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Fetch the current batch from `source` and ingest it
    ///
    /// A failed fetch is recorded in the fetch log and returned.
    pub async fn run_cycle<S>(&self, source: &S) -> Result<IngestSummary, RecorderError>
    where
        S: FacilitySource + ?Sized,
    {
        let fetched_at = Utc::now().trunc_subsecs(0);
        match source.fetch().await {
            Ok(records) => self.ingest(records, fetched_at).await,
            Err(e) => {
                self.log_failure(fetched_at, &e).await;
                Err(e)
            }
        }
    }

    /// Store one fetched batch and record the attempt in the fetch log
    pub async fn ingest(
        &self,
        records: Vec<FacilityRecord>,
        fetched_at: DateTime<Utc>,
    ) -> Result<IngestSummary, RecorderError> {
        match self.store_batch(&records, fetched_at).await {
            Ok(summary) => {
                self.db
                    .log_fetch_attempt(
                        fetched_at,
                        true,
                        records.len(),
                        summary.new_readings,
                        None,
                    )
                    .await;
                info!(
                    locations = summary.locations,
                    new_readings = summary.new_readings,
                    snapshot_saved = summary.snapshot_saved,
                    "Ingestion cycle complete"
                );
                Ok(summary)
            }
            Err(e) => {
                self.log_failure(fetched_at, &e).await;
                Err(e)
            }
        }
    }

    async fn store_batch(
        &self,
        records: &[FacilityRecord],
        fetched_at: DateTime<Utc>,
    ) -> Result<IngestSummary, RecorderError> {
        if records.is_empty() {
            return Err(RecorderError::EmptyBatch);
        }

        let mut summary = IngestSummary::default();
        for record in records {
            self.db.upsert_location(record, fetched_at).await?;
            let outcome = self
                .db
                .insert_reading(record, fetched_at, OnConflict::Skip)
                .await?;
            if outcome.is_inserted() {
                summary.new_readings += 1;
            }
            summary.locations += 1;
        }

        if self.db.should_save_snapshot(fetched_at).await? {
            self.db.save_snapshot(records, fetched_at).await?;
            summary.snapshot_saved = true;
        }

        Ok(summary)
    }

    async fn log_failure(&self, fetched_at: DateTime<Utc>, e: &RecorderError) {
        error!("Ingestion cycle failed: {}", e);
        self.db
            .log_fetch_attempt(fetched_at, false, 0, 0, Some(&e.to_string()))
            .await;
    }
}
