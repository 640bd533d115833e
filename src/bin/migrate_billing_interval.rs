//! Switches utility services from one billing interval to another (e.g.
//! quarterly to tertiary) and creates the new periods for a year.

use anyhow::{anyhow, bail, Result};
use std::env;
use utility_billing_api::config::{database_url_from_env, grace_days_from_env};
use utility_billing_api::db::Database;
use utility_billing_api::db_storage::BillingStorage;
use utility_billing_api::maintenance;
use utility_billing_api::models::BillingInterval;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() < 3 {
        bail!("usage: migrate_billing_interval <from> <to> <year>");
    }
    let from: BillingInterval = args[0].parse()?;
    let to: BillingInterval = args[1].parse()?;
    let year: i32 = args[2]
        .parse()
        .map_err(|_| anyhow!("year must be a number, got '{}'", args[2]))?;

    let grace_days = grace_days_from_env()?;
    let db = Database::with_max_connections(&database_url_from_env()?, 5).await?;
    let storage = BillingStorage::new(db.pool.clone());
    tracing::info!("Migrating services from {} to {} for {}...", from, to, year);

    let migration =
        maintenance::migrate_billing_interval(&storage, from, to, year, grace_days).await?;

    tracing::info!("Migration complete.");
    tracing::info!("Services updated: {}", migration.services_updated);
    tracing::info!("Periods created: {}", migration.periods_created);
    tracing::info!("Periods already present: {}", migration.periods_reused);

    Ok(())
}
