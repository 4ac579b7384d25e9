use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use idler_core::{EventOutcome, MetricsBackend};
use idler_model::{JobEvent, RunnerRequest, StartOutcome, StopOutcome};
use idler_prometheus::PrometheusMetrics;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::{
    error::ApiError,
    handler::{ApiHandler, ServiceInfo},
    signature::{secrets_match, verify_signature},
};

const SIGNATURE_HEADER: &str = "x-hub-signature-256";
const EVENT_HEADER: &str = "x-github-event";
const RUNNER_SECRET_HEADER: &str = "x-runner-secret";
const WORKFLOW_JOB: &str = "workflow_job";
/// Action label for workflow job payloads that could not be decoded.
const INVALID_PAYLOAD: &str = "invalid";

/// HTTP API service builder.
pub struct HttpApi<H> {
    handler: Arc<H>,
    secret: Arc<str>,
    metrics: Option<PrometheusMetrics>,
}

impl<H> HttpApi<H>
where
    H: ApiHandler,
{
    /// Create new HTTP API with the given handler and shared secret.
    ///
    /// The secret keys webhook signatures and is the expected `X-Runner-Secret` value.
    pub fn new(handler: Arc<H>, secret: impl Into<String>) -> Self {
        Self {
            handler,
            secret: Arc::from(secret.into()),
            metrics: None,
        }
    }

    /// Serve `GET /metrics` from the given registry.
    pub fn with_metrics(mut self, metrics: PrometheusMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build axum router with mounted endpoints.
    ///
    /// Routes:
    /// - POST /events, /github/webhook - Job-lifecycle webhook
    /// - POST /runner/start, /runner/stop, /runner/cancel-stop - Runner control
    /// - GET /health, /, /metrics
    pub fn router(self) -> Router {
        let state = AppState {
            handler: self.handler,
            secret: self.secret,
            metrics: self.metrics,
        };
        Router::new()
            .route("/", get(index::<H>))
            .route("/health", get(health))
            .route("/metrics", get(metrics::<H>))
            .route("/events", post(events::<H>))
            .route("/github/webhook", post(events::<H>))
            .route("/runner/start", post(start_runner::<H>))
            .route("/runner/stop", post(stop_runner::<H>))
            .route("/runner/cancel-stop", post(cancel_stop::<H>))
            .with_state(state)
    }
}

struct AppState<H> {
    handler: Arc<H>,
    secret: Arc<str>,
    metrics: Option<PrometheusMetrics>,
}

impl<H> Clone for AppState<H> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            secret: self.secret.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize)]
struct StatusBody {
    status: &'static str,
}

const OK: StatusBody = StatusBody { status: "ok" };

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn authorize<H>(state: &AppState<H>, headers: &HeaderMap) -> Result<(), ApiError> {
    let provided = header(headers, RUNNER_SECRET_HEADER)
        .ok_or_else(|| ApiError::Unauthorized("missing X-Runner-Secret header".into()))?;
    if !secrets_match(&state.secret, provided) {
        warn!("invalid runner control secret");
        return Err(ApiError::Unauthorized("invalid secret".into()));
    }
    Ok(())
}

fn runner_request(body: &[u8]) -> Result<RunnerRequest, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::InvalidRequest(e.to_string()))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /events
async fn events<H>(
    State(state): State<AppState<H>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<StatusBody>, ApiError>
where
    H: ApiHandler,
{
    if let Err(e) = verify_signature(
        state.secret.as_bytes(),
        &body,
        header(&headers, SIGNATURE_HEADER),
    ) {
        warn!(error = %e, "webhook rejected");
        return Err(e.into());
    }

    let kind = header(&headers, EVENT_HEADER).unwrap_or_default();
    if kind != WORKFLOW_JOB {
        debug!(event = kind, "event acknowledged without action");
        return Ok(Json(OK));
    }

    let event: JobEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "workflow job payload not understood, skipping");
            if let Some(metrics) = &state.metrics {
                metrics.record_event(INVALID_PAYLOAD, EventOutcome::Failed);
            }
            return Ok(Json(OK));
        }
    };
    info!(repo = %event.repo(), action = %event.action.as_str(), "workflow job received");

    if let Err(e) = state.handler.job_event(event).await {
        error!(error = %e, "job event side effect failed");
    }
    Ok(Json(OK))
}

/// POST /runner/start
async fn start_runner<H>(
    State(state): State<AppState<H>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<StartOutcome>, ApiError>
where
    H: ApiHandler,
{
    authorize(&state, &headers)?;
    let req = runner_request(&body)?;
    Ok(Json(state.handler.start(req).await?))
}

/// POST /runner/stop
async fn stop_runner<H>(
    State(state): State<AppState<H>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<StopOutcome>, ApiError>
where
    H: ApiHandler,
{
    authorize(&state, &headers)?;
    let req = runner_request(&body)?;
    Ok(Json(state.handler.stop(req).await?))
}

/// POST /runner/cancel-stop
async fn cancel_stop<H>(
    State(state): State<AppState<H>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<StatusBody>, ApiError>
where
    H: ApiHandler,
{
    authorize(&state, &headers)?;
    let req = runner_request(&body)?;
    let status = if state.handler.cancel_stop(req).await? {
        "cancelled"
    } else {
        "not_pending"
    };
    Ok(Json(StatusBody { status }))
}

/// GET /health
async fn health() -> Json<StatusBody> {
    Json(StatusBody { status: "healthy" })
}

/// GET /
async fn index<H>(State(state): State<AppState<H>>) -> Json<ServiceInfo>
where
    H: ApiHandler,
{
    Json(state.handler.describe())
}

/// GET /metrics
async fn metrics<H>(State(state): State<AppState<H>>) -> Result<Response, ApiError>
where
    H: ApiHandler,
{
    let metrics = state.metrics.as_ref().ok_or(ApiError::NotFound)?;
    let body = metrics
        .render()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(([(CONTENT_TYPE, metrics.content_type())], body).into_response())
}
