//! Deletes one billing period and every row that references it.

use anyhow::{bail, Result};
use std::env;
use utility_billing_api::config::database_url_from_env;
use utility_billing_api::db::Database;
use utility_billing_api::maintenance;
use utility_billing_api::models::parse_uuid;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: delete_billing_period <period-id>");
    }
    let period_id = parse_uuid(&args[1], "period id")?;

    let db = Database::with_max_connections(&database_url_from_env()?, 5).await?;
    tracing::info!("Connected to database. Deleting billing period {}...", period_id);

    let deletion = maintenance::delete_billing_period(&db.pool, period_id).await?;

    tracing::info!("Deletion complete.");
    tracing::info!("Payments deleted: {}", deletion.payments_deleted);
    tracing::info!("Bills deleted: {}", deletion.bills_deleted);
    tracing::info!("Household readings deleted: {}", deletion.readings_deleted);
    tracing::info!("Main meter readings deleted: {}", deletion.main_readings_deleted);
    tracing::info!("Periods deleted: {}", deletion.periods_deleted);

    Ok(())
}
