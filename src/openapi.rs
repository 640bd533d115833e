use axum::{http::StatusCode, response::IntoResponse, Json};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::models::{
    BillingInterval, BillingPeriod, HouseholdMeterReading, MainMeter, MainMeterListResponse,
    NewReading, PeriodListResponse, ReadingResponse,
};
use crate::readiness::{HouseholdReadiness, ReadinessReport, ReadinessResponse};

#[derive(OpenApi)]
#[openapi(
    info(title = "Utility Billing API"),
    paths(
        crate::handlers::check_readiness,
        crate::handlers::list_billing_periods,
        crate::handlers::list_main_meters,
        crate::handlers::record_reading,
    ),
    components(schemas(
        BillingInterval,
        BillingPeriod,
        HouseholdMeterReading,
        MainMeter,
        NewReading,
        PeriodListResponse,
        MainMeterListResponse,
        ReadingResponse,
        HouseholdReadiness,
        ReadinessReport,
        ReadinessResponse,
    )),
    modifiers(&BearerAuth)
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Serves the generated OpenAPI document.
pub async fn serve_openapi_spec() -> impl IntoResponse {
    (StatusCode::OK, Json(ApiDoc::openapi()))
}

/// Serves a Swagger UI page that loads the document from `/api-docs/openapi.json`.
pub async fn serve_swagger_ui() -> impl IntoResponse {
    let html = r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Utility Billing API - Swagger UI</title>
    <link rel="stylesheet" type="text/css" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css">
    <style>
        body { margin: 0; padding: 0; }
    </style>
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
    <script>
        window.onload = function() {
            window.ui = SwaggerUIBundle({
                url: "/api-docs/openapi.json",
                dom_id: '#swagger-ui',
                deepLinking: true
            });
        };
    </script>
</body>
</html>
"#;
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/html; charset=utf-8")],
        html,
    )
}
