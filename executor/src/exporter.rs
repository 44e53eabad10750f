//! Operator HTTP endpoints
//!
//! - `GET /metrics` - Prometheus text exposition of the runtime's registry
//! - `GET /events?from=N&limit=M` - Transfer events in commit order, one JSON
//!   object per line

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;

use crate::{actor::RuntimeHandle, metrics::Metrics, Error};

/// Page size when `/events` is called without `limit`
pub const DEFAULT_EVENT_PAGE: usize = 1_000;

/// Largest page `/events` will return
pub const MAX_EVENT_PAGE: usize = 10_000;

#[derive(Debug, Clone)]
struct ExporterState {
    metrics: Metrics,
    runtime: RuntimeHandle,
}

/// Query string of `/events`
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// First sequence number to return
    pub from: Option<u64>,
    /// Maximum number of records
    pub limit: Option<usize>,
}

/// Failed export request
#[derive(Debug)]
pub struct ExportError(Error);

impl From<Error> for ExportError {
    fn from(err: Error) -> Self {
        ExportError(err)
    }
}

impl IntoResponse for ExportError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            Error::Concurrency(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::error!(error = %self.0, status = %status, "Export request failed");

        (
            status,
            Json(serde_json::json!({
                "error": self.0.to_string(),
                "timestamp": Utc::now(),
            })),
        )
            .into_response()
    }
}

/// Build the operator router over a runtime's metrics and actor handle
pub fn router(metrics: Metrics, runtime: RuntimeHandle) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/events", get(events_handler))
        .with_state(ExporterState { metrics, runtime })
}

async fn metrics_handler(State(state): State<ExporterState>) -> Result<Response, ExportError> {
    let body = state.metrics.export().map_err(Error::from)?;
    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response())
}

async fn events_handler(
    State(state): State<ExporterState>,
    Query(query): Query<EventsQuery>,
) -> Result<Response, ExportError> {
    let from = query.from.unwrap_or(0);
    let limit = query.limit.unwrap_or(DEFAULT_EVENT_PAGE).min(MAX_EVENT_PAGE);
    let records = state.runtime.events_since(from, limit).await?;

    let mut body = Vec::new();
    for record in &records {
        serde_json::to_writer(&mut body, record).map_err(Error::from)?;
        body.push(b'\n');
    }

    tracing::debug!(from, limit, returned = records.len(), "Served event page");
    Ok(([(header::CONTENT_TYPE, "application/x-ndjson")], body).into_response())
}
