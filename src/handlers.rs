use crate::auth::AuthContext;
use crate::config::Config;
use crate::db_storage::BillingStorage;
use crate::errors::AppError;
use crate::models::*;
use crate::periods;
use crate::readiness::{self, ReadinessResponse};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: PgPool,
    /// Application configuration.
    pub config: Config,
}

impl AppState {
    pub fn storage(&self) -> BillingStorage {
        BillingStorage::new(self.db.clone())
    }
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "utility-billing-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// GET /api/billing/check-readiness/:billingPeriodId
///
/// Reports whether every active household has submitted a reading for each
/// of its active meters in the period. Administrators only.
#[utoipa::path(
    get,
    path = "/api/billing/check-readiness/{billing_period_id}",
    params(("billing_period_id" = String, Path, description = "Billing period UUID")),
    responses(
        (status = 200, description = "Readiness report", body = ReadinessResponse),
        (status = 400, description = "Malformed period id"),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Caller is not an administrator"),
        (status = 404, description = "Unknown billing period")
    ),
    security(("bearer" = []))
)]
pub async fn check_readiness(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Path(billing_period_id): Path<String>,
) -> Result<Json<ReadinessResponse>, AppError> {
    tracing::info!(
        "GET /billing/check-readiness/{} by {}",
        billing_period_id,
        auth.user_id
    );

    auth.require_admin()?;
    let period_id = parse_uuid(&billing_period_id, "billing period id")?;
    let report = readiness::check_readiness(&auth, &state.storage(), period_id).await?;

    Ok(Json(ReadinessResponse {
        success: true,
        data: report,
    }))
}

/// GET /api/billing/periods[?forMeterReadings=true]
///
/// With the flag, only periods that have ended, are in progress, or start
/// within the next 30 days are returned.
#[utoipa::path(
    get,
    path = "/api/billing/periods",
    params(("forMeterReadings" = Option<bool>, Query, description = "Restrict to the current reading cycle")),
    responses(
        (status = 200, description = "Billing periods, most recent first", body = PeriodListResponse),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer" = []))
)]
pub async fn list_billing_periods(
    State(state): State<Arc<AppState>>,
    _auth: AuthContext,
    Query(params): Query<PeriodQueryParams>,
) -> Result<Json<PeriodListResponse>, AppError> {
    let all = state.storage().list_periods().await?;

    let today = chrono::Utc::now().date_naive();
    let data = periods::select_periods(all, params.for_meter_readings.unwrap_or(false), today);

    tracing::debug!("Returning {} billing periods", data.len());
    Ok(Json(PeriodListResponse {
        success: true,
        data,
    }))
}

/// GET /api/main-meters[?serviceId=<uuid>]
#[utoipa::path(
    get,
    path = "/api/main-meters",
    params(("serviceId" = Option<String>, Query, description = "Only meters of this service")),
    responses(
        (status = 200, description = "Main meters sorted by service name, then meter number", body = MainMeterListResponse),
        (status = 400, description = "Malformed service id"),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer" = []))
)]
pub async fn list_main_meters(
    State(state): State<Arc<AppState>>,
    _auth: AuthContext,
    Query(params): Query<MainMeterQueryParams>,
) -> Result<Json<MainMeterListResponse>, AppError> {
    let service_id = params
        .service_id
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| parse_uuid(s, "service id"))
        .transpose()?;

    let data = state.storage().list_main_meters(service_id).await?;

    Ok(Json(MainMeterListResponse {
        success: true,
        data,
    }))
}

/// POST /api/readings
///
/// Records one reading for a (meter, period) pair. Administrators only.
#[utoipa::path(
    post,
    path = "/api/readings",
    request_body = NewReading,
    responses(
        (status = 201, description = "Reading stored", body = ReadingResponse),
        (status = 400, description = "Invalid reading"),
        (status = 403, description = "Caller is not an administrator"),
        (status = 404, description = "Unknown meter or period"),
        (status = 409, description = "Meter already has a reading for the period")
    ),
    security(("bearer" = []))
)]
pub async fn record_reading(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    Json(payload): Json<NewReading>,
) -> Result<(StatusCode, Json<ReadingResponse>), AppError> {
    auth.require_admin()?;
    tracing::info!(
        "POST /readings - meter {} period {}",
        payload.household_meter_id,
        payload.billing_period_id
    );

    let stored = state.storage().record_reading(&payload).await?;

    Ok((
        StatusCode::CREATED,
        Json(ReadingResponse {
            success: true,
            data: stored,
        }),
    ))
}
