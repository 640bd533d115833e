use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::handlers::{self, AppState};
use crate::openapi;

/// Builds the application router.
///
/// With `rate_limited`, the API routes get a 10 req/s per-IP limit (burst 20);
/// the server must then be started with connect info so peer addresses are known.
/// `/health` is never rate limited.
pub fn build_router(state: Arc<AppState>, rate_limited: bool) -> anyhow::Result<Router> {
    let mut api_routes = Router::new()
        .route("/docs", get(openapi::serve_swagger_ui))
        .route("/api-docs/openapi.json", get(openapi::serve_openapi_spec))
        .route(
            "/api/billing/check-readiness/:billing_period_id",
            get(handlers::check_readiness),
        )
        .route("/api/billing/periods", get(handlers::list_billing_periods))
        .route("/api/main-meters", get(handlers::list_main_meters))
        .route("/api/readings", post(handlers::record_reading))
        .layer(RequestBodyLimitLayer::new(1024 * 1024));

    if rate_limited {
        let governor_conf = Arc::new(
            GovernorConfigBuilder::default()
                .per_second(10)
                .burst_size(20)
                .key_extractor(SmartIpKeyExtractor)
                .finish()
                .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
        );
        api_routes = api_routes.layer(GovernorLayer {
            config: governor_conf,
        });
    }

    Ok(Router::new()
        .route("/health", get(handlers::health))
        .merge(api_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()))
}
