//! Adds a reading after the fact, e.g. when a meter was replaced and the new
//! meter starts at zero.

use anyhow::{anyhow, bail, Result};
use chrono::NaiveDate;
use std::env;
use utility_billing_api::config::database_url_from_env;
use utility_billing_api::db::Database;
use utility_billing_api::db_storage::BillingStorage;
use utility_billing_api::import::parse_amount;
use utility_billing_api::maintenance::{self, BackfillOutcome, BackfillRequest};
use utility_billing_api::models::parse_uuid;

const USAGE: &str =
    "usage: backfill_reading <meter-id> <period-id> <reading> <YYYY-MM-DD> [consumption] [note...]";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() < 4 {
        bail!(USAGE);
    }

    let meter_id = parse_uuid(&args[0], "meter id")?;
    let period_id = parse_uuid(&args[1], "period id")?;
    let meter_reading =
        parse_amount(&args[2]).ok_or_else(|| anyhow!("invalid reading '{}'", args[2]))?;
    let reading_date = NaiveDate::parse_from_str(&args[3], "%Y-%m-%d")
        .map_err(|e| anyhow!("reading date must be YYYY-MM-DD: {}", e))?;
    let raw_consumption = match args.get(4) {
        Some(raw) => {
            Some(parse_amount(raw).ok_or_else(|| anyhow!("invalid consumption '{}'", raw))?)
        }
        None => None,
    };
    let note = if args.len() > 5 {
        args[5..].join(" ")
    } else {
        "Backfilled reading: meter replaced, new meter starts at zero, consumption estimated"
            .to_string()
    };

    let db = Database::with_max_connections(&database_url_from_env()?, 5).await?;
    let storage = BillingStorage::new(db.pool.clone());

    let outcome = maintenance::backfill_reading(
        &storage,
        BackfillRequest {
            meter_id,
            period_id,
            meter_reading,
            raw_consumption,
            reading_date,
            note,
        },
    )
    .await?;

    match outcome {
        BackfillOutcome::Inserted(id) => tracing::info!("Inserted reading {}", id),
        BackfillOutcome::AlreadyPresent(id) => {
            tracing::info!("Reading {} already exists for this meter and period; nothing to do", id)
        }
    }

    Ok(())
}
