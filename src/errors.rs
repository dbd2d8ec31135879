//! Errors for occupancy recorder
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Serialization error")]
    SerdeError(#[from] serde_json::Error),

    #[error("Configuration error")]
    ConfigError(#[from] config::ConfigError),

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {0}")]
    HttpStatus(u16),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Empty batch, nothing to ingest")]
    EmptyBatch,

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Duplicate reading for location {location_id} at {timestamp}")]
    DuplicateReading { location_id: i64, timestamp: String },

    #[error("Could not open database {url}: {origin}")]
    DatabaseOpenError { url: String, origin: String },

    #[error("Database migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}
