//! Wipes all billing data while keeping user accounts.

use anyhow::{bail, Result};
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

    if !env::args().skip(1).any(|arg| arg == "--yes") {
        bail!("reset_all_data deletes every household, meter, reading, period and bill; re-run with --yes to confirm");
    }

    let db = Database::with_max_connections(&database_url_from_env()?, 5).await?;
    tracing::warn!("Connected to database. Resetting all billing data...");

    let summary = maintenance::reset_all_data(&db.pool).await?;

    tracing::info!("Reset complete.");
    for (table, rows) in &summary.deleted {
        tracing::info!("{}: {} rows deleted", table, rows);
    }
    tracing::info!(
        "Users kept: {} detached from their household",
        summary.users_detached
    );

    Ok(())
}
