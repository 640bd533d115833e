//! Inserts the default notification templates without touching existing ones.

use anyhow::Result;
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

    let db = Database::with_max_connections(&database_url_from_env()?, 5).await?;
    tracing::info!("Connected to database. Seeding notification templates...");

    let inserted = maintenance::seed_notification_templates(&db.pool).await?;
    let total = maintenance::default_notification_templates().len();

    tracing::info!(
        "Seeding complete. Inserted {} of {} templates ({} already present).",
        inserted,
        total,
        total as u64 - inserted
    );

    Ok(())
}
