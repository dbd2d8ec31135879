//! Facility occupancy recorder
//!
//! Polls an occupancy feed, keeps an append-only history of readings in
//! SQLite and ranks the quietest times to visit each location.

pub mod analytics;
pub mod config;
pub mod database;
pub mod errors;
pub mod fetch;
pub mod ingest;
pub mod models;
pub mod report;
