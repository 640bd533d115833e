//! Billing readiness: has every active household submitted every required
//! meter reading for a period?

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::db_storage::BillingStorage;
use crate::errors::AppError;
use crate::models::BillingPeriod;

/// An active meter and how many readings it has for the period being checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeterSnapshot {
    pub meter_id: Uuid,
    pub service_name: String,
    pub readings_for_period: i64,
}

impl MeterSnapshot {
    /// A meter is satisfied by exactly one reading for the period.
    pub fn is_satisfied(&self) -> bool {
        self.readings_for_period == 1
    }
}

/// An active household together with its active meters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HouseholdSnapshot {
    pub household_id: Uuid,
    pub household_number: String,
    pub owner_name: String,
    pub meters: Vec<MeterSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HouseholdReadiness {
    pub household_id: Uuid,
    pub household_number: String,
    pub owner_name: String,
    pub is_ready: bool,
    /// Service names of meters still lacking a reading, without duplicates.
    pub missing_services: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessReport {
    pub billing_period_id: Uuid,
    pub period_name: String,
    pub is_complete: bool,
    pub total_households: usize,
    pub ready_households: usize,
    pub not_ready_households: usize,
    /// Not-ready households only, in household-number order.
    pub households: Vec<HouseholdReadiness>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadinessResponse {
    pub success: bool,
    pub data: ReadinessReport,
}

/// Readiness of a single household.
pub fn household_readiness(household: &HouseholdSnapshot) -> HouseholdReadiness {
    let mut missing_services: Vec<String> = Vec::new();
    for meter in household.meters.iter().filter(|m| !m.is_satisfied()) {
        if !missing_services.contains(&meter.service_name) {
            missing_services.push(meter.service_name.clone());
        }
    }

    HouseholdReadiness {
        household_id: household.household_id,
        household_number: household.household_number.clone(),
        owner_name: household.owner_name.clone(),
        is_ready: household.meters.iter().all(MeterSnapshot::is_satisfied),
        missing_services,
    }
}

/// Aggregates household readiness for `period` in a single pass.
pub fn evaluate(period: &BillingPeriod, households: &[HouseholdSnapshot]) -> ReadinessReport {
    let mut ready_households = 0;
    let mut not_ready = Vec::new();

    for household in households {
        let readiness = household_readiness(household);
        if readiness.is_ready {
            ready_households += 1;
        } else {
            not_ready.push(readiness);
        }
    }

    ReadinessReport {
        billing_period_id: period.id,
        period_name: period.period_name.clone(),
        is_complete: not_ready.is_empty(),
        total_households: households.len(),
        ready_households,
        not_ready_households: not_ready.len(),
        households: not_ready,
    }
}

/// Checks whether all readings for `period_id` are in.
///
/// The administrator check happens before any store access.
pub async fn check_readiness(
    auth: &AuthContext,
    storage: &BillingStorage,
    period_id: Uuid,
) -> Result<ReadinessReport, AppError> {
    auth.require_admin()?;

    let period = storage
        .find_period(period_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Billing period {} not found", period_id)))?;

    let households = storage.load_household_snapshots(period_id).await?;
    let report = evaluate(&period, &households);

    tracing::info!(
        "Readiness for period {}: {}/{} households ready",
        report.period_name,
        report.ready_households,
        report.total_households
    );

    Ok(report)
}
