use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::errors::{AppError, ResultExt};
use crate::models::{
    BillingPeriod, Household, HouseholdMeter, HouseholdMeterReading, MainMeter, NewReading,
    PeriodDraft, UtilityService,
};
use crate::readiness::{HouseholdSnapshot, MeterSnapshot};

const PERIOD_COLUMNS: &str = "id, period_name, period_type, start_date, end_date, \
     reading_deadline, is_official_billing, is_billing_enabled";

const READING_COLUMNS: &str = "id, household_meter_id, billing_period_id, meter_reading, \
     raw_consumption, reading_date, notes";

/// One (household, meter) row of the readiness query. Households without
/// active meters come back once with `meter_id = NULL`.
#[derive(Debug, Clone, FromRow)]
pub struct HouseholdMeterRow {
    pub household_id: Uuid,
    pub household_number: String,
    pub owner_name: String,
    pub meter_id: Option<Uuid>,
    pub service_name: Option<String>,
    pub reading_count: i64,
}

/// Folds rows ordered by household into per-household snapshots.
pub fn group_household_rows(rows: Vec<HouseholdMeterRow>) -> Vec<HouseholdSnapshot> {
    let mut snapshots: Vec<HouseholdSnapshot> = Vec::new();

    for row in rows {
        let needs_new = snapshots
            .last()
            .map(|last| last.household_id != row.household_id)
            .unwrap_or(true);

        if needs_new {
            snapshots.push(HouseholdSnapshot {
                household_id: row.household_id,
                household_number: row.household_number.clone(),
                owner_name: row.owner_name.clone(),
                meters: Vec::new(),
            });
        }

        if let (Some(meter_id), Some(current)) = (row.meter_id, snapshots.last_mut()) {
            current.meters.push(MeterSnapshot {
                meter_id,
                service_name: row.service_name.unwrap_or_default(),
                readings_for_period: row.reading_count,
            });
        }
    }

    snapshots
}

/// Database access for periods, the household/meter registry and the reading ledger.
#[derive(Clone)]
pub struct BillingStorage {
    pool: PgPool,
}

impl BillingStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ============ Periods ============

    pub async fn find_period(&self, id: Uuid) -> Result<Option<BillingPeriod>, AppError> {
        let query = format!("SELECT {} FROM billing_periods WHERE id = $1", PERIOD_COLUMNS);
        let period = sqlx::query_as::<_, BillingPeriod>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(period)
    }

    pub async fn find_period_by_name(&self, name: &str) -> Result<Option<BillingPeriod>, AppError> {
        let query = format!(
            "SELECT {} FROM billing_periods WHERE period_name = $1",
            PERIOD_COLUMNS
        );
        let period = sqlx::query_as::<_, BillingPeriod>(&query)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(period)
    }

    /// All periods, most recent first.
    pub async fn list_periods(&self) -> Result<Vec<BillingPeriod>, AppError> {
        let query = format!(
            "SELECT {} FROM billing_periods ORDER BY start_date DESC, period_name ASC",
            PERIOD_COLUMNS
        );
        let periods = sqlx::query_as::<_, BillingPeriod>(&query)
            .fetch_all(&self.pool)
            .await?;
        Ok(periods)
    }

    /// Returns the period named `draft.period_name`, creating it when absent.
    ///
    /// The insert relies on the unique index on `period_name`, so concurrent
    /// callers converge on a single row. The flag is `true` when this call
    /// created the period.
    pub async fn find_or_create_period(
        &self,
        draft: &PeriodDraft,
    ) -> Result<(BillingPeriod, bool), AppError> {
        draft.validate()?;

        let insert = format!(
            r#"
            INSERT INTO billing_periods (period_name, period_type, start_date, end_date, reading_deadline)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (period_name) DO NOTHING
            RETURNING {}
            "#,
            PERIOD_COLUMNS
        );

        let created = sqlx::query_as::<_, BillingPeriod>(&insert)
            .bind(&draft.period_name)
            .bind(draft.period_type.as_str())
            .bind(draft.start_date)
            .bind(draft.end_date)
            .bind(draft.reading_deadline)
            .fetch_optional(&self.pool)
            .await
            .context(format!("creating period {}", draft.period_name))?;

        if let Some(period) = created {
            tracing::info!(
                "Created billing period {} ({} to {})",
                period.period_name,
                period.start_date,
                period.end_date
            );
            return Ok((period, true));
        }

        let existing = self
            .find_period_by_name(&draft.period_name)
            .await?
            .ok_or_else(|| {
                AppError::InternalError(format!(
                    "Period {} vanished after insert conflict",
                    draft.period_name
                ))
            })?;

        tracing::debug!("Reusing billing period {}", existing.period_name);
        Ok((existing, false))
    }

    // ============ Registry ============

    pub async fn find_household_by_number(
        &self,
        household_number: &str,
    ) -> Result<Option<Household>, AppError> {
        let household = sqlx::query_as::<_, Household>(
            "SELECT id, household_number, owner_name, address, is_active \
             FROM households WHERE household_number = $1",
        )
        .bind(household_number.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(household)
    }

    /// Case-insensitive lookup by service name.
    pub async fn find_service_by_name(&self, name: &str) -> Result<Option<UtilityService>, AppError> {
        let service = sqlx::query_as::<_, UtilityService>(
            "SELECT id, name, unit, billing_interval FROM utility_services WHERE lower(name) = lower($1)",
        )
        .bind(name.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(service)
    }

    pub async fn find_meter(&self, id: Uuid) -> Result<Option<HouseholdMeter>, AppError> {
        let meter = sqlx::query_as::<_, HouseholdMeter>(
            "SELECT id, household_id, service_id, meter_number, is_active FROM household_meters WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(meter)
    }

    /// Returns the household's active meter for `service_id`, creating one when absent.
    pub async fn find_or_create_meter(
        &self,
        household_id: Uuid,
        service_id: Uuid,
    ) -> Result<(HouseholdMeter, bool), AppError> {
        let existing = sqlx::query_as::<_, HouseholdMeter>(
            r#"
            SELECT id, household_id, service_id, meter_number, is_active
            FROM household_meters
            WHERE household_id = $1 AND service_id = $2 AND is_active
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(household_id)
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(meter) = existing {
            return Ok((meter, false));
        }

        let meter = sqlx::query_as::<_, HouseholdMeter>(
            r#"
            INSERT INTO household_meters (household_id, service_id)
            VALUES ($1, $2)
            RETURNING id, household_id, service_id, meter_number, is_active
            "#,
        )
        .bind(household_id)
        .bind(service_id)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            "Created meter {} for household {} (service {})",
            meter.id,
            household_id,
            service_id
        );
        Ok((meter, true))
    }

    /// Main meters sorted by service name, then meter number.
    pub async fn list_main_meters(
        &self,
        service_id: Option<Uuid>,
    ) -> Result<Vec<MainMeter>, AppError> {
        let meters = sqlx::query_as::<_, MainMeter>(
            r#"
            SELECT m.id, m.service_id, s.name AS service_name, m.meter_number, m.location, m.is_active
            FROM main_meters m
            JOIN utility_services s ON s.id = m.service_id
            WHERE ($1::uuid IS NULL OR m.service_id = $1)
            ORDER BY s.name ASC, m.meter_number ASC
            "#,
        )
        .bind(service_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(meters)
    }

    /// Active households ordered by household number, each with its active
    /// meters and their reading counts for `period_id`.
    ///
    /// Numbers sort by length first so that "2" comes before "10".
    pub async fn load_household_snapshots(
        &self,
        period_id: Uuid,
    ) -> Result<Vec<HouseholdSnapshot>, AppError> {
        let rows = sqlx::query_as::<_, HouseholdMeterRow>(
            r#"
            SELECT h.id AS household_id,
                   h.household_number,
                   h.owner_name,
                   m.id AS meter_id,
                   s.name AS service_name,
                   COUNT(r.id) AS reading_count
            FROM households h
            LEFT JOIN household_meters m
                   ON m.household_id = h.id AND m.is_active
            LEFT JOIN utility_services s
                   ON s.id = m.service_id
            LEFT JOIN household_meter_readings r
                   ON r.household_meter_id = m.id AND r.billing_period_id = $1
            WHERE h.is_active
            GROUP BY h.id, h.household_number, h.owner_name, m.id, s.name
            ORDER BY length(h.household_number) ASC, h.household_number ASC, s.name ASC, m.id ASC
            "#,
        )
        .bind(period_id)
        .fetch_all(&self.pool)
        .await
        .context("loading households for readiness check")?;

        Ok(group_household_rows(rows))
    }

    // ============ Reading Ledger ============

    pub async fn find_reading(
        &self,
        meter_id: Uuid,
        period_id: Uuid,
    ) -> Result<Option<HouseholdMeterReading>, AppError> {
        let query = format!(
            "SELECT {} FROM household_meter_readings \
             WHERE household_meter_id = $1 AND billing_period_id = $2",
            READING_COLUMNS
        );
        let reading = sqlx::query_as::<_, HouseholdMeterReading>(&query)
            .bind(meter_id)
            .bind(period_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(reading)
    }

    pub async fn count_readings_for_period(&self, period_id: Uuid) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM household_meter_readings WHERE billing_period_id = $1",
        )
        .bind(period_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Records a reading, refusing a second one for the same (meter, period).
    pub async fn record_reading(
        &self,
        reading: &NewReading,
    ) -> Result<HouseholdMeterReading, AppError> {
        reading.validate()?;

        if self.find_meter(reading.household_meter_id).await?.is_none() {
            return Err(AppError::NotFound(format!(
                "Meter {} not found",
                reading.household_meter_id
            )));
        }
        if self.find_period(reading.billing_period_id).await?.is_none() {
            return Err(AppError::NotFound(format!(
                "Billing period {} not found",
                reading.billing_period_id
            )));
        }
        if let Some(existing) = self
            .find_reading(reading.household_meter_id, reading.billing_period_id)
            .await?
        {
            return Err(AppError::Conflict(format!(
                "Meter {} already has reading {} for this period",
                reading.household_meter_id, existing.id
            )));
        }

        let insert = format!(
            r#"
            INSERT INTO household_meter_readings
                (household_meter_id, billing_period_id, meter_reading, raw_consumption, reading_date, notes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            READING_COLUMNS
        );

        // The unique index still guards against a concurrent insert; that
        // violation maps to Conflict.
        let stored = sqlx::query_as::<_, HouseholdMeterReading>(&insert)
            .bind(reading.household_meter_id)
            .bind(reading.billing_period_id)
            .bind(&reading.meter_reading)
            .bind(&reading.raw_consumption)
            .bind(reading.reading_date)
            .bind(&reading.notes)
            .fetch_one(&self.pool)
            .await?;

        tracing::info!(
            "Recorded reading {} for meter {} in period {}",
            stored.id,
            stored.household_meter_id,
            stored.billing_period_id
        );
        Ok(stored)
    }
}
