//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API and OpenAPI documentation.

use crate::{
    handlers,
    models::{
        AnalyzePayload, ErrorResponse, HealthResponse, QueryPayload, QueryResponse,
        RunAgentPayload, RunAgentResponse,
    },
    state::AppState,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::run_agent,
        handlers::query,
        handlers::analyze,
    ),
    components(
        schemas(RunAgentPayload, RunAgentResponse, QueryPayload, QueryResponse, AnalyzePayload, HealthResponse, ErrorResponse)
    ),
    tags(
        (name = "TheraVoice API", description = "Conversational therapist backed by hosted agent, speech and vector services")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/health", get(handlers::health))
        .route("/run_agent", post(handlers::run_agent))
        .route("/query", post(handlers::query))
        .route("/analyze", post(handlers::analyze))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
        .layer(TraceLayer::new_for_http())
}
