//! Imports meter readings from a spreadsheet exported as CSV.

use anyhow::{bail, Result};
use std::env;
use std::fs::File;
use utility_billing_api::config::{database_url_from_env, grace_days_from_env};
use utility_billing_api::db::Database;
use utility_billing_api::db_storage::BillingStorage;
use utility_billing_api::import;
use utility_billing_api::periods::PeriodNaming;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(file_path) = args.iter().find(|a| !a.starts_with("--")) else {
        bail!("usage: import_readings <file.csv> [--per-date]");
    };
    let naming = if args.iter().any(|a| a == "--per-date") {
        PeriodNaming::ReadingDate
    } else {
        PeriodNaming::Quarter
    };

    let rows = import::read_rows(File::open(file_path)?);
    tracing::info!("Read {} rows from {} ({:?} periods)", rows.len(), file_path, naming);

    let grace_days = grace_days_from_env()?;
    let db = Database::with_max_connections(&database_url_from_env()?, 5).await?;
    let storage = BillingStorage::new(db.pool.clone());

    let summary = import::import_readings(&storage, rows, naming, grace_days).await?;

    tracing::info!("Import complete.");
    tracing::info!("Imported: {}", summary.imported);
    tracing::info!("Skipped (already present): {}", summary.duplicates);
    tracing::info!("Skipped (unparseable): {}", summary.parse_errors);
    tracing::info!("Skipped (unknown household): {}", summary.unknown_households);
    tracing::info!("Skipped (unknown service): {}", summary.unknown_services);
    tracing::info!("Periods created: {}", summary.periods_created);
    tracing::info!("Meters created: {}", summary.meters_created);

    Ok(())
}
