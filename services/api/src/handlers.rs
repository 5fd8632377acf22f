//! Axum Handlers for the REST API
//!
//! This module contains the logic for handling HTTP requests.
//! It uses `utoipa` doc comments to generate OpenAPI documentation.

use axum::{
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::{Map, Value};
use std::sync::Arc;
use theravoice_core::{
    UpstreamError,
    insights::InsightsError,
    therapist::TurnRequest,
    types::{SessionToken, TurnReply},
    vector_store::{compose_contextual_response, insert_text},
};
use tracing::{error, info, warn};

use crate::{
    models::{
        AnalyzePayload, ErrorResponse, HealthResponse, QueryPayload, QueryResponse,
        RunAgentPayload, RunAgentResponse,
    },
    state::AppState,
};

#[derive(Debug)]
pub enum ApiError {
    InvalidInput(String),
    Upstream(UpstreamError),
    NotConfigured(&'static str),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::InvalidInput(error) => (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error,
                    kind: "invalid_input",
                }),
            )
                .into_response(),
            ApiError::NotConfigured(feature) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: format!("{} is not configured on this server", feature),
                    kind: "not_configured",
                }),
            )
                .into_response(),
            ApiError::Upstream(err) => {
                error!(error = %err, kind = err.kind(), "Upstream call failed");
                let status = match err {
                    UpstreamError::Unavailable { .. } => StatusCode::BAD_GATEWAY,
                    UpstreamError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                    UpstreamError::Protocol { .. } | UpstreamError::Unauthorized { .. } => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                // Upstream bodies stay in the log.
                let message = match &err {
                    UpstreamError::Unavailable { service, .. } => {
                        format!("{service} is unavailable")
                    }
                    UpstreamError::Protocol { service, .. } => {
                        format!("{service} returned an unexpected payload")
                    }
                    other => other.to_string(),
                };
                (
                    status,
                    Json(ErrorResponse {
                        error: message,
                        kind: err.kind(),
                    }),
                )
                    .into_response()
            }
        }
    }
}

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        Self::Upstream(err)
    }
}

impl From<InsightsError> for ApiError {
    fn from(err: InsightsError) -> Self {
        match err {
            InsightsError::InvalidData(message) => Self::InvalidInput(message),
            InsightsError::Upstream(e) => Self::Upstream(e),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidInput(rejection.body_text())
    }
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Run one therapist turn, starting or continuing a remote session.
#[utoipa::path(
    post,
    path = "/run_agent",
    request_body = RunAgentPayload,
    responses(
        (status = 200, description = "Agent reply", body = RunAgentResponse),
        (status = 400, description = "Missing or malformed user_query", body = ErrorResponse),
        (status = 500, description = "Agent platform error", body = ErrorResponse),
        (status = 502, description = "Agent platform unavailable", body = ErrorResponse),
        (status = 504, description = "Agent platform timed out", body = ErrorResponse)
    )
)]
pub async fn run_agent(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RunAgentPayload>, JsonRejection>,
) -> Result<Json<RunAgentResponse>, ApiError> {
    let Json(payload) = payload?;

    let user_query = payload
        .user_query
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ApiError::InvalidInput("user_query is required".to_string()))?;
    let session = SessionToken::from_client(payload.session_id);
    let audio = payload.audio.unwrap_or(false);

    info!(continuing = session.is_some(), audio, "Running therapist turn");
    let reply = state
        .therapist
        .run_turn(TurnRequest {
            user_query,
            session,
            audio,
        })
        .await?;
    info!(
        session_id = %reply.response().session,
        with_audio = matches!(reply, TurnReply::TextWithAudio { .. }),
        "Therapist turn answered"
    );

    Ok(Json(RunAgentResponse::from(reply)))
}

/// Answer from the nearest stored texts, then store the new text.
#[utoipa::path(
    post,
    path = "/query",
    request_body = QueryPayload,
    responses(
        (status = 200, description = "Contextual response, empty when nothing matched", body = QueryResponse),
        (status = 400, description = "Missing text", body = ErrorResponse),
        (status = 503, description = "Vector store not configured", body = ErrorResponse)
    )
)]
pub async fn query(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<QueryPayload>, JsonRejection>,
) -> Result<Json<QueryResponse>, ApiError> {
    let Json(payload) = payload?;
    let text = payload
        .text
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::InvalidInput("text is required".to_string()))?;
    let store = state
        .vector_store
        .as_ref()
        .ok_or(ApiError::NotConfigured("vector store"))?;

    let matches = match store.query(&text, state.vector_top_k).await {
        Ok(matches) => matches,
        Err(e) => {
            warn!(error = %e, "Vector query failed, responding without context");
            Vec::new()
        }
    };

    match insert_text(store.as_ref(), &text).await {
        Ok(id) => info!(id = %id, matches = matches.len(), "Stored query text"),
        Err(e) => warn!(error = %e, "Vector upsert failed, text not stored"),
    }

    Ok(Json(QueryResponse {
        response: compose_contextual_response(&matches),
    }))
}

/// Summarize heart-rate and sleep trends into a structured insight object.
#[utoipa::path(
    post,
    path = "/analyze",
    request_body = AnalyzePayload,
    responses(
        (status = 200, description = "Insight object produced by the model", body = Object),
        (status = 400, description = "Missing or malformed health data", body = ErrorResponse),
        (status = 500, description = "Insights model error", body = ErrorResponse),
        (status = 503, description = "Insights model not configured", body = ErrorResponse)
    )
)]
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AnalyzePayload>, JsonRejection>,
) -> Result<Json<Map<String, Value>>, ApiError> {
    let Json(payload) = payload?;
    let (Some(heart_rate), Some(sleep)) = (payload.heart_rate, payload.sleep) else {
        return Err(ApiError::InvalidInput(
            "Both 'heart_rate' and 'sleep' data are required.".to_string(),
        ));
    };
    let insights = state
        .insights
        .as_ref()
        .ok_or(ApiError::NotConfigured("health insights"))?;

    let insight = insights.analyze(&heart_rate, &sleep).await?;
    Ok(Json(insight))
}
