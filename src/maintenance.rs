//! One-shot administrative operations.
//!
//! Deletions run in a single transaction. Dependent rows are removed before
//! their parents (payments, bills, readings, then periods/meters, then
//! households/services), and any store error rolls the whole run back.
//! Backfill and interval migration are idempotent and safe to re-run instead.

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::db_storage::BillingStorage;
use crate::errors::{AppError, ResultExt};
use crate::models::{BillingInterval, NewReading, NotificationTemplate};
use crate::periods;

/// Periods dated before this are artefacts of bad spreadsheet parses.
pub fn default_cleanup_cutoff() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Rows removed while deleting one or more billing periods.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PeriodDeletion {
    pub payments_deleted: u64,
    pub bills_deleted: u64,
    pub readings_deleted: u64,
    pub main_readings_deleted: u64,
    pub periods_deleted: u64,
}

impl PeriodDeletion {
    fn absorb(&mut self, other: PeriodDeletion) {
        self.payments_deleted += other.payments_deleted;
        self.bills_deleted += other.bills_deleted;
        self.readings_deleted += other.readings_deleted;
        self.main_readings_deleted += other.main_readings_deleted;
        self.periods_deleted += other.periods_deleted;
    }
}

async fn delete_period_rows(
    conn: &mut PgConnection,
    period_id: Uuid,
) -> Result<PeriodDeletion, AppError> {
    let payments = sqlx::query(
        "DELETE FROM payments WHERE bill_id IN (SELECT id FROM bills WHERE billing_period_id = $1)",
    )
    .bind(period_id)
    .execute(&mut *conn)
    .await
    .context("deleting payments")?;

    let bills = sqlx::query("DELETE FROM bills WHERE billing_period_id = $1")
        .bind(period_id)
        .execute(&mut *conn)
        .await
        .context("deleting bills")?;

    let readings = sqlx::query("DELETE FROM household_meter_readings WHERE billing_period_id = $1")
        .bind(period_id)
        .execute(&mut *conn)
        .await
        .context("deleting household readings")?;

    let main_readings = sqlx::query("DELETE FROM main_meter_readings WHERE billing_period_id = $1")
        .bind(period_id)
        .execute(&mut *conn)
        .await
        .context("deleting main meter readings")?;

    let period = sqlx::query("DELETE FROM billing_periods WHERE id = $1")
        .bind(period_id)
        .execute(&mut *conn)
        .await
        .context("deleting billing period")?;

    Ok(PeriodDeletion {
        payments_deleted: payments.rows_affected(),
        bills_deleted: bills.rows_affected(),
        readings_deleted: readings.rows_affected(),
        main_readings_deleted: main_readings.rows_affected(),
        periods_deleted: period.rows_affected(),
    })
}

/// Deletes a billing period together with everything that references it.
pub async fn delete_billing_period(
    pool: &PgPool,
    period_id: Uuid,
) -> Result<PeriodDeletion, AppError> {
    let mut tx = pool.begin().await?;

    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM billing_periods WHERE id = $1)")
            .bind(period_id)
            .fetch_one(&mut *tx)
            .await?;
    if !exists {
        return Err(AppError::NotFound(format!(
            "Billing period {} not found",
            period_id
        )));
    }

    let deletion = delete_period_rows(&mut tx, period_id).await?;
    tx.commit().await?;

    tracing::info!(
        "Deleted period {} ({} readings, {} bills)",
        period_id,
        deletion.readings_deleted,
        deletion.bills_deleted
    );
    Ok(deletion)
}

/// Deletes every period starting or ending before `cutoff`.
pub async fn cleanup_invalid_periods(
    pool: &PgPool,
    cutoff: NaiveDate,
) -> Result<PeriodDeletion, AppError> {
    let mut tx = pool.begin().await?;

    let targets: Vec<(Uuid, String)> = sqlx::query_as(
        "SELECT id, period_name FROM billing_periods WHERE start_date < $1 OR end_date < $1 ORDER BY start_date",
    )
    .bind(cutoff)
    .fetch_all(&mut *tx)
    .await?;

    tracing::info!("Found {} periods dated before {}", targets.len(), cutoff);

    let mut total = PeriodDeletion::default();
    for (id, name) in targets {
        let deletion = delete_period_rows(&mut tx, id)
            .await
            .with_context(|| format!("deleting period {}", name))?;
        tracing::info!(
            "Deleted period {} with {} readings",
            name,
            deletion.readings_deleted
        );
        total.absorb(deletion);
    }

    tx.commit().await?;
    Ok(total)
}

/// Tables cleared by [`reset_all_data`], in deletion order.
pub const RESET_ORDER: [&str; 9] = [
    "payments",
    "bills",
    "household_meter_readings",
    "main_meter_readings",
    "household_meters",
    "main_meters",
    "households",
    "billing_periods",
    "utility_services",
];

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResetSummary {
    /// (table, rows deleted) in deletion order.
    pub deleted: Vec<(String, u64)>,
    /// Users whose household link was cleared.
    pub users_detached: u64,
}

/// Removes all billing data. User accounts survive with their household link cleared.
pub async fn reset_all_data(pool: &PgPool) -> Result<ResetSummary, AppError> {
    let mut tx = pool.begin().await?;
    let mut summary = ResetSummary::default();

    for table in RESET_ORDER {
        if table == "households" {
            let detached = sqlx::query(
                "UPDATE users SET household_id = NULL WHERE household_id IS NOT NULL",
            )
            .execute(&mut *tx)
            .await
            .context("detaching users from households")?;
            summary.users_detached = detached.rows_affected();
        }

        // Table names come from the fixed list above.
        let result = sqlx::query(&format!("DELETE FROM {}", table))
            .execute(&mut *tx)
            .await
            .with_context(|| format!("clearing {}", table))?;

        tracing::info!("Cleared {}: {} rows", table, result.rows_affected());
        summary.deleted.push((table.to_string(), result.rows_affected()));
    }

    tx.commit().await?;
    Ok(summary)
}

/// A reading entered after the fact, e.g. for a replaced meter.
#[derive(Debug, Clone)]
pub struct BackfillRequest {
    pub meter_id: Uuid,
    pub period_id: Uuid,
    pub meter_reading: BigDecimal,
    pub raw_consumption: Option<BigDecimal>,
    pub reading_date: NaiveDate,
    /// Why the value was backfilled.
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackfillOutcome {
    Inserted(Uuid),
    /// The pair already had a reading; nothing was written.
    AlreadyPresent(Uuid),
}

pub async fn backfill_reading(
    storage: &BillingStorage,
    request: BackfillRequest,
) -> Result<BackfillOutcome, AppError> {
    if let Some(existing) = storage
        .find_reading(request.meter_id, request.period_id)
        .await?
    {
        tracing::warn!(
            "Meter {} already has reading {} for period {}; skipping",
            request.meter_id,
            existing.id,
            request.period_id
        );
        return Ok(BackfillOutcome::AlreadyPresent(existing.id));
    }

    let note = request.note.trim();
    let reading = NewReading {
        household_meter_id: request.meter_id,
        billing_period_id: request.period_id,
        meter_reading: request.meter_reading,
        raw_consumption: request.raw_consumption,
        reading_date: request.reading_date,
        notes: (!note.is_empty()).then(|| note.to_string()),
    };

    let stored = storage.record_reading(&reading).await?;
    Ok(BackfillOutcome::Inserted(stored.id))
}

/// Templates seeded into a fresh installation.
pub fn default_notification_templates() -> Vec<NotificationTemplate> {
    let template = |key: &str, subject: &str, body: &str| NotificationTemplate {
        template_key: key.to_string(),
        subject: subject.to_string(),
        body: body.to_string(),
    };

    vec![
        template(
            "reading_reminder",
            "Meter reading due for {{periodName}}",
            "Dear {{ownerName}},\n\nplease submit the meter readings for household {{householdNumber}} \
             for the period {{periodName}} by {{readingDeadline}}.",
        ),
        template(
            "reading_deadline_passed",
            "Missing meter readings for {{periodName}}",
            "Dear {{ownerName}},\n\nwe have not received readings for {{missingServices}} \
             (household {{householdNumber}}). The deadline was {{readingDeadline}}.",
        ),
        template(
            "invoice_issued",
            "Invoice for {{periodName}}",
            "Dear {{ownerName}},\n\nyour invoice for household {{householdNumber}} \
             covering {{periodName}} is attached. Amount due: {{totalAmount}}.",
        ),
        template(
            "payment_received",
            "Payment received",
            "Dear {{ownerName}},\n\nwe received your payment of {{amount}} \
             for household {{householdNumber}}. Thank you.",
        ),
    ]
}

/// Inserts the default templates, leaving existing keys untouched.
/// Returns the number of templates inserted.
pub async fn seed_notification_templates(pool: &PgPool) -> Result<u64, AppError> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0;

    for template in default_notification_templates() {
        let result = sqlx::query(
            r#"
            INSERT INTO notification_templates (template_key, subject, body)
            VALUES ($1, $2, $3)
            ON CONFLICT (template_key) DO NOTHING
            "#,
        )
        .bind(&template.template_key)
        .bind(&template.subject)
        .bind(&template.body)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("seeding template {}", template.template_key))?;

        if result.rows_affected() > 0 {
            tracing::info!("Seeded template {}", template.template_key);
        } else {
            tracing::debug!("Template {} already present", template.template_key);
        }
        inserted += result.rows_affected();
    }

    tx.commit().await?;
    Ok(inserted)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntervalMigration {
    pub services_updated: u64,
    pub periods_created: u64,
    pub periods_reused: u64,
}

/// Moves every service billed on `from` to `to` and makes sure the `to`
/// periods of `year` exist.
pub async fn migrate_billing_interval(
    storage: &BillingStorage,
    from: BillingInterval,
    to: BillingInterval,
    year: i32,
    grace_days: u32,
) -> Result<IntervalMigration, AppError> {
    if from == to {
        return Err(AppError::Validation(format!(
            "Source and target interval are both {}",
            from
        )));
    }
    let drafts = periods::periods_for_year(year, to, grace_days)?;

    let mut migration = IntervalMigration::default();
    for draft in &drafts {
        let (_, created) = storage.find_or_create_period(draft).await?;
        if created {
            migration.periods_created += 1;
        } else {
            migration.periods_reused += 1;
        }
    }

    // Periods first, so services never point at an interval without periods.
    let updated = sqlx::query(
        "UPDATE utility_services SET billing_interval = $2 WHERE billing_interval = $1",
    )
    .bind(from.as_str())
    .bind(to.as_str())
    .execute(storage.pool())
    .await
    .context("updating service billing intervals")?;
    migration.services_updated = updated.rows_affected();

    tracing::info!(
        "Moved {} services from {} to {}; {} periods created, {} reused",
        migration.services_updated,
        from,
        to,
        migration.periods_created,
        migration.periods_reused
    );
    Ok(migration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_order_respects_foreign_keys() {
        let pos = |table: &str| RESET_ORDER.iter().position(|t| *t == table).unwrap();

        assert!(pos("payments") < pos("bills"));
        assert!(pos("bills") < pos("households"));
        assert!(pos("household_meter_readings") < pos("household_meters"));
        assert!(pos("household_meter_readings") < pos("billing_periods"));
        assert!(pos("main_meter_readings") < pos("main_meters"));
        assert!(pos("household_meters") < pos("households"));
        assert!(pos("household_meters") < pos("utility_services"));
        assert!(pos("main_meters") < pos("utility_services"));
        assert!(!RESET_ORDER.contains(&"users"));
        assert!(!RESET_ORDER.contains(&"notification_templates"));
    }

    #[test]
    fn test_default_templates_have_unique_keys() {
        let templates = default_notification_templates();
        let mut keys: Vec<&str> = templates.iter().map(|t| t.template_key.as_str()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), templates.len());
        assert!(keys.contains(&"reading_reminder"));
    }

    #[test]
    fn test_deletion_totals_accumulate() {
        let mut total = PeriodDeletion::default();
        total.absorb(PeriodDeletion {
            readings_deleted: 5,
            periods_deleted: 1,
            ..Default::default()
        });
        total.absorb(PeriodDeletion {
            readings_deleted: 2,
            periods_deleted: 1,
            ..Default::default()
        });
        assert_eq!(total.readings_deleted, 7);
        assert_eq!(total.periods_deleted, 2);
    }

    #[test]
    fn test_cleanup_cutoff() {
        assert_eq!(
            default_cleanup_cutoff(),
            NaiveDate::from_ymd_opt(2000, 1, 1).unwrap()
        );
    }
}
