//! API routes

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method,
    },
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::auth::{auth_middleware, AppState};
use crate::handlers::{health, outreach, sequences, settings, templates};
use crate::openapi::create_openapi_routes;

/// Create the API router
pub fn create_router(state: AppState, cors_origins: &[String]) -> Router {
    let state = Arc::new(state);

    // Health check routes (no auth required)
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness))
        .route("/detailed", get(health::health_detailed))
        .with_state(state.clone());

    // Sequence routes
    let sequence_routes = Router::new()
        .route(
            "/",
            get(sequences::list_sequences).post(sequences::create_sequence),
        )
        .route(
            "/:id",
            get(sequences::get_sequence)
                .patch(sequences::update_sequence)
                .delete(sequences::delete_sequence),
        )
        .route(
            "/:id/enrollments",
            get(sequences::list_enrollments).post(sequences::enroll_contact),
        );

    // Template routes
    let template_routes = Router::new()
        .route(
            "/",
            get(templates::list_templates).post(templates::create_template),
        )
        .route(
            "/:id",
            get(templates::get_template).patch(templates::update_template),
        );

    // Outreach routes
    let outreach_routes = Router::new()
        .nest("/sequences", sequence_routes)
        .nest("/templates", template_routes)
        .route("/replies", post(outreach::record_reply))
        .route(
            "/opt-outs",
            get(outreach::list_opt_outs).post(outreach::add_opt_out),
        )
        .route("/sends/:id/delivery", post(outreach::record_delivery))
        .route("/stats", get(outreach::get_stats));

    // Prospecting routes
    let prospecting_routes = Router::new()
        .route(
            "/filters",
            get(settings::get_prospect_filters).post(settings::save_prospect_filters),
        )
        .route(
            "/sync",
            get(settings::list_sync_runs).post(settings::start_sync),
        );

    // Admin routes with authentication
    let admin = Router::new()
        .nest("/outreach", outreach_routes)
        .nest("/prospecting", prospecting_routes)
        .route(
            "/ai-settings",
            get(settings::get_ai_settings).put(settings::put_ai_settings),
        )
        .route(
            "/integrations",
            get(settings::list_integrations).post(settings::upsert_integration),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state.clone());

    // OpenAPI documentation routes
    let openapi_routes = create_openapi_routes();

    let router = Router::new()
        .nest("/health", health_routes)
        .nest("/api/admin", admin)
        .merge(openapi_routes);

    match build_cors_layer(cors_origins) {
        Some(cors) => router.layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        ),
        None => router.layer(TraceLayer::new_for_http()),
    }
}

/// CORS layer for the dashboard origins; `None` when none are configured
pub fn build_cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
            ])
            .allow_headers([
                CONTENT_TYPE,
                AUTHORIZATION,
                HeaderName::from_static("x-api-key"),
            ])
            .max_age(Duration::from_secs(3600)),
    )
}
