// src/api/handlers.rs

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::analysis::{SessionStatus, StartOutcome};
use crate::api::{types::*, ApiState};
use crate::infra::config::SourceConfig;
use crate::infra::errors::SurfwatchError;

pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Content type of the proxied relay stream.
pub const RELAY_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

/// Map a core error onto an HTTP status and JSON body.
pub fn error_response(err: &SurfwatchError) -> ApiError {
    let status = match err {
        SurfwatchError::NotFound { .. } => StatusCode::NOT_FOUND,
        SurfwatchError::Unreachable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        SurfwatchError::PortConflict { .. }
        | SurfwatchError::PortsExhausted { .. }
        | SurfwatchError::Stopping { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, err.to_string())
}

/// The `source` query parameter, or 400 when it is missing or blank.
fn requested_source(query: &SourceQuery) -> Result<&str, ApiError> {
    match query.source.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err(api_error(StatusCode::BAD_REQUEST, "No source selected")),
    }
}

fn configured_source<'a>(state: &'a ApiState, id: &str) -> Result<&'a SourceConfig, ApiError> {
    state
        .catalog
        .get(id)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Source not available"))
}

/// Label reported to status callers. A call that created the session says
/// `Starting`; until the first result arrives a healthy session says
/// `Initializing`.
pub fn status_label(outcome: &StartOutcome) -> String {
    let snapshot = &outcome.snapshot;
    if outcome.created {
        return SessionStatus::Starting.label().to_string();
    }
    let status = snapshot.status;
    if snapshot.result.observed_at.is_none()
        && !status.is_failure()
        && status != SessionStatus::Stopped
    {
        return "Initializing".to_string();
    }
    status.label().to_string()
}

/// GET /api/analysis-status?source=<id> — Start analysis if needed and
/// report the latest count.
pub async fn analysis_status(
    State(state): State<ApiState>,
    Query(query): Query<SourceQuery>,
) -> Result<Json<AnalysisStatus>, ApiError> {
    let id = requested_source(&query)?;
    let source = configured_source(&state, id)?;

    let outcome = state.registry.start_or_get(source).await.map_err(|e| {
        tracing::warn!("Could not start analysis for '{}': {}", id, e);
        error_response(&e)
    })?;

    let message = outcome
        .created
        .then(|| format!("Analysis started for {}", source.display_name));

    Ok(Json(AnalysisStatus {
        source_id: source.id.clone(),
        display_name: source.display_name.clone(),
        count: outcome.snapshot.result.count,
        status: status_label(&outcome),
        last_observed_at: outcome.snapshot.result.observed_at,
        message,
    }))
}

/// DELETE /api/analysis?source=<id> — Stop an active session.
pub async fn stop_analysis(
    State(state): State<ApiState>,
    Query(query): Query<SourceQuery>,
) -> Result<Json<StopResponse>, ApiError> {
    let id = requested_source(&query)?;

    state
        .registry
        .stop(id)
        .await
        .map_err(|e| error_response(&e))?;

    Ok(Json(StopResponse {
        message: format!("Analysis stopped for {id}"),
    }))
}

/// GET /api/relay?source=<id> — Stream the session's local MJPEG relay.
pub async fn relay(
    State(state): State<ApiState>,
    Query(query): Query<SourceQuery>,
) -> Result<Response, ApiError> {
    let id = requested_source(&query)?;
    let url = state
        .registry
        .relay_url(id)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Source not active"))?;

    let relay_down = |message: String| {
        let err = SurfwatchError::Unreachable {
            source_id: id.to_string(),
            message,
        };
        tracing::warn!("{}", err);
        error_response(&err)
    };

    let upstream = state
        .http
        .get(&url)
        .send()
        .await
        .map_err(|e| relay_down(e.to_string()))?;
    if !upstream.status().is_success() {
        return Err(relay_down(format!("relay answered {}", upstream.status())));
    }

    tracing::debug!("Proxying relay {} for '{}'", url, id);
    let body = Body::from_stream(upstream.bytes_stream());
    Ok(([(header::CONTENT_TYPE, RELAY_CONTENT_TYPE)], body).into_response())
}

/// GET /api/sources — Configured sources and whether each is being analysed.
pub async fn list_sources(State(state): State<ApiState>) -> Json<Vec<SourceSummary>> {
    let sources = state
        .catalog
        .iter()
        .map(|source| {
            let snapshot = state.registry.get(&source.id);
            SourceSummary {
                id: source.id.clone(),
                display_name: source.display_name.clone(),
                location: source.location.clone(),
                active: snapshot.is_some(),
                count: snapshot.map(|s| s.result.count),
            }
        })
        .collect();
    Json(sources)
}

/// GET /api/health — Health check.
pub async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        active_sessions: state.registry.active_count(),
    })
}
