//! Removes billing periods dated before a cutoff (default 2000-01-01),
//! typically produced by spreadsheet cells parsed with the wrong format.

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use std::env;
use utility_billing_api::config::database_url_from_env;
use utility_billing_api::db::Database;
use utility_billing_api::maintenance;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cutoff = match env::args().nth(1) {
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map_err(|e| anyhow!("cutoff must be YYYY-MM-DD: {}", e))?,
        None => maintenance::default_cleanup_cutoff(),
    };

    let db = Database::with_max_connections(&database_url_from_env()?, 5).await?;
    tracing::info!(
        "Connected to database. Removing periods dated before {}...",
        cutoff
    );

    let total = maintenance::cleanup_invalid_periods(&db.pool, cutoff).await?;

    tracing::info!(
        "Cleanup complete. Deleted {} periods, {} household readings, {} main meter readings, {} bills.",
        total.periods_deleted,
        total.readings_deleted,
        total.main_readings_deleted,
        total.bills_deleted
    );

    Ok(())
}
