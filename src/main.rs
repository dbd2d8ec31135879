//! Occupancy recorder utility

use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use occupancy_recorder::{
    analytics::{self, DEFAULT_OPTIMAL_LIMIT},
    config::AppConfig,
    database::Database,
    errors::RecorderError,
    fetch::HttpFacilitySource,
    ingest::Ingestor,
    report,
};

#[derive(Parser)]
#[command(name = "occupancy-recorder")]
#[command(about = "Record facility occupancy and find the quietest times to visit", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the feed once and store new readings
    Fetch,
    /// Fetch the feed on a fixed interval until interrupted
    Watch {
        /// Seconds between fetches, overrides the configured interval
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Show totals, table sizes and recent fetch attempts
    Status,
    /// Show the latest reading of every location
    Latest,
    /// Rank the quietest day/hour slots
    Optimal {
        /// Only locations whose name contains this text
        #[arg(short, long)]
        location: Option<String>,

        /// Number of slots to show
        #[arg(short = 'n', long, default_value_t = DEFAULT_OPTIMAL_LIMIT)]
        limit: i64,
    },
    /// Show average occupancy by day and hour
    Heatmap {
        /// Only locations whose name contains this text
        #[arg(short, long)]
        location: Option<String>,
    },
    /// Show recent readings of one location
    History {
        #[arg(long)]
        location_id: i64,

        #[arg(long, default_value_t = 24)]
        hours: i64,
    },
    /// Show per-day averages
    Daily {
        #[arg(short, long, default_value_t = 7)]
        days: i64,
    },
    /// Reclaim unused space in the database file
    Compact,
}

#[tokio::main]
async fn main() -> Result<(), RecorderError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load()?;

    let db = Database::open(&config.database).await?;
    let result = run(cli.command, &config, &db).await;
    db.close().await;

    if let Err(e) = &result {
        error!("{}", e);
    }
    result
}

async fn run(command: Commands, config: &AppConfig, db: &Database) -> Result<(), RecorderError> {
    match command {
        Commands::Fetch => {
            let source = HttpFacilitySource::from_config(&config.api)?;
            let summary = Ingestor::new(db).run_cycle(&source).await?;
            println!(
                "Fetched {} locations, {} new readings{}",
                summary.locations,
                summary.new_readings,
                if summary.snapshot_saved {
                    ", snapshot saved"
                } else {
                    ""
                }
            );
        }
        Commands::Watch { interval } => {
            let period = match interval {
                Some(secs) => Duration::from_secs(secs),
                None => {
                    config.scheduler.validate()?;
                    config.scheduler.interval
                }
            };
            if period.is_zero() {
                return Err(RecorderError::ConfigurationError {
                    message: "Interval must be greater than zero".to_string(),
                });
            }
            let source = HttpFacilitySource::from_config(&config.api)?;

            tokio::select! {
                _ = run_scheduler(db, &source, period) => {}
                _ = signal::ctrl_c() => {
                    info!("Received shutdown signal");
                }
            }
        }
        Commands::Status => {
            let stats = db.stats().await?;
            let counts = db.table_counts().await?;
            let fetches = db.recent_fetch_log(5).await?;
            print!("{}", report::stats(&stats, &counts, &fetches));
        }
        Commands::Latest => {
            let rows = db.latest_readings().await?;
            print!("{}", report::latest(&rows));
        }
        Commands::Optimal { location, limit } => {
            let rows = analytics::optimal_times(db, location.as_deref(), limit).await?;
            print!("{}", report::optimal(&rows));
        }
        Commands::Heatmap { location } => {
            let rows = analytics::hourly_averages(db, location.as_deref()).await?;
            if rows.is_empty() {
                println!("No readings stored yet.");
            }
            let mut names: Vec<&str> = rows.iter().map(|r| r.location_name.as_str()).collect();
            names.dedup();
            for name in names {
                let location_rows: Vec<_> = rows
                    .iter()
                    .filter(|r| r.location_name == name)
                    .cloned()
                    .collect();
                println!(
                    "{}",
                    report::heatmap(name, &analytics::heatmap(&location_rows))
                );
            }
        }
        Commands::History { location_id, hours } => {
            let rows = db.recent_readings(location_id, hours, Utc::now()).await?;
            print!("{}", report::history(&rows));
        }
        Commands::Daily { days } => {
            let rows = db.daily_rollups(days, Utc::now()).await?;
            print!("{}", report::daily(&rows));
        }
        Commands::Compact => {
            let before = db.table_counts().await?;
            db.compact().await?;
            let after = db.table_counts().await?;
            println!(
                "Compacted database: {} -> {} bytes",
                before.size_bytes, after.size_bytes
            );
        }
    }

    Ok(())
}

/// Run ingestion cycles back to back on a fixed period
///
/// Each cycle completes before the next tick is awaited; ticks missed while a
/// cycle overruns are skipped. Cycle failures are logged and never end the loop.
async fn run_scheduler(db: &Database, source: &HttpFacilitySource, period: Duration) {
    info!("Fetching every {:?}", period);
    let ingestor = Ingestor::new(db);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if let Err(e) = ingestor.run_cycle(source).await {
            warn!("Cycle failed, waiting for next tick: {}", e);
        }
    }
}
