use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

// ============ Enums ============

/// How often a utility service is billed. A billing period's type is also one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BillingInterval {
    Monthly,
    Quarterly,
    /// Three four-month periods per year.
    Tertiary,
    Annual,
}

impl BillingInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingInterval::Monthly => "monthly",
            BillingInterval::Quarterly => "quarterly",
            BillingInterval::Tertiary => "tertiary",
            BillingInterval::Annual => "annual",
        }
    }

    /// Number of calendar months covered by one period of this interval.
    pub fn months(&self) -> u32 {
        match self {
            BillingInterval::Monthly => 1,
            BillingInterval::Quarterly => 3,
            BillingInterval::Tertiary => 4,
            BillingInterval::Annual => 12,
        }
    }
}

impl fmt::Display for BillingInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIntervalError(pub String);

impl fmt::Display for ParseIntervalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown billing interval '{}' (expected monthly, quarterly, tertiary or annual)",
            self.0
        )
    }
}

impl std::error::Error for ParseIntervalError {}

impl FromStr for BillingInterval {
    type Err = ParseIntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monthly" => Ok(BillingInterval::Monthly),
            "quarterly" => Ok(BillingInterval::Quarterly),
            "tertiary" => Ok(BillingInterval::Tertiary),
            "annual" | "yearly" => Ok(BillingInterval::Annual),
            _ => Err(ParseIntervalError(s.to_string())),
        }
    }
}

impl TryFrom<String> for BillingInterval {
    type Error = ParseIntervalError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ============ Database Models ============

/// A dated interval against which readings and invoices are grouped.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BillingPeriod {
    pub id: Uuid,
    /// Unique display label, e.g. `2025-Q3`.
    pub period_name: String,
    #[sqlx(try_from = "String")]
    pub period_type: BillingInterval,
    /// Inclusive.
    pub start_date: NaiveDate,
    /// Inclusive.
    pub end_date: NaiveDate,
    pub reading_deadline: NaiveDate,
    pub is_official_billing: bool,
    pub is_billing_enabled: bool,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Household {
    pub id: Uuid,
    /// Human-facing, unique.
    pub household_number: String,
    pub owner_name: String,
    pub address: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UtilityService {
    pub id: Uuid,
    pub name: String,
    pub unit: String,
    #[sqlx(try_from = "String")]
    pub billing_interval: BillingInterval,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HouseholdMeter {
    pub id: Uuid,
    pub household_id: Uuid,
    pub service_id: Uuid,
    pub meter_number: Option<String>,
    pub is_active: bool,
}

/// At most one exists per (meter, period).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HouseholdMeterReading {
    pub id: Uuid,
    pub household_meter_id: Uuid,
    pub billing_period_id: Uuid,
    /// Cumulative meter value.
    #[schema(value_type = String)]
    pub meter_reading: BigDecimal,
    /// Consumption since the previous reading, when known.
    #[schema(value_type = Option<String>)]
    pub raw_consumption: Option<BigDecimal>,
    pub reading_date: NaiveDate,
    pub notes: Option<String>,
}

/// Building-level meter joined with the name of the service it measures.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MainMeter {
    pub id: Uuid,
    pub service_id: Uuid,
    pub service_name: String,
    pub meter_number: String,
    pub location: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct NotificationTemplate {
    pub template_key: String,
    pub subject: String,
    pub body: String,
}

// ============ Write Models ============

/// A billing period that may not exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodDraft {
    pub period_name: String,
    pub period_type: BillingInterval,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reading_deadline: NaiveDate,
}

impl PeriodDraft {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.period_name.trim().is_empty() {
            return Err(AppError::Validation(
                "Period name cannot be empty".to_string(),
            ));
        }
        if self.start_date > self.end_date {
            return Err(AppError::Validation(format!(
                "Period '{}' starts on {} after it ends on {}",
                self.period_name, self.start_date, self.end_date
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewReading {
    pub household_meter_id: Uuid,
    pub billing_period_id: Uuid,
    #[schema(value_type = String)]
    pub meter_reading: BigDecimal,
    #[schema(value_type = Option<String>)]
    pub raw_consumption: Option<BigDecimal>,
    pub reading_date: NaiveDate,
    /// Free-text rationale, e.g. why a value was estimated.
    pub notes: Option<String>,
}

impl NewReading {
    pub fn validate(&self) -> Result<(), AppError> {
        let zero = BigDecimal::from(0);
        if self.meter_reading < zero {
            return Err(AppError::Validation(
                "Meter reading cannot be negative".to_string(),
            ));
        }
        if let Some(consumption) = &self.raw_consumption {
            if *consumption < zero {
                return Err(AppError::Validation(
                    "Consumption cannot be negative".to_string(),
                ));
            }
        }
        Ok(())
    }
}

// ============ API Models ============

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodQueryParams {
    pub for_meter_readings: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MainMeterQueryParams {
    pub service_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PeriodListResponse {
    pub success: bool,
    pub data: Vec<BillingPeriod>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MainMeterListResponse {
    pub success: bool,
    pub data: Vec<MainMeter>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadingResponse {
    pub success: bool,
    pub data: HouseholdMeterReading,
}

/// Parses a path or query identifier, rejecting anything that is not a UUID.
pub fn parse_uuid(raw: &str, what: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::Validation(format!("Invalid {} '{}': expected a UUID", what, raw)))
}
