//! HTTP ingestion surface
//!
//! Endpoints:
//!   POST {ingest_path}  - envelope body, tenant in the API-key header
//!   GET  /healthz       - liveness (200 while the process runs)
//!   GET  /metrics       - Prometheus text format (when enabled)

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use enigma_core::config::GatewayConfig;
use enigma_core::EnigmaError;
use enigma_crypto::Envelope;
use enigma_receiver::Receiver;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::metrics::IngestMetrics;

/// Destination for decrypted payloads.
pub trait IngestSink: Send + Sync {
    fn accept(&self, app_key: &str, envelope: &Envelope, payload: Value);
}

/// Logs each accepted payload's metadata. The payload itself is dropped.
#[derive(Debug, Default)]
pub struct TracingSink;

impl IngestSink for TracingSink {
    fn accept(&self, app_key: &str, envelope: &Envelope, payload: Value) {
        let fields = payload.as_object().map(|o| o.len()).unwrap_or(0);
        tracing::info!(
            app_key = %app_key,
            key_date = %envelope.key_date,
            secret_version = %envelope.secret_version,
            fields,
            "payload ingested"
        );
    }
}

#[derive(Clone)]
pub struct GatewayState {
    pub receiver: Arc<Receiver>,
    pub sink: Arc<dyn IngestSink>,
    pub metrics: Arc<IngestMetrics>,
    pub api_key_header: HeaderName,
}

pub fn router(config: &GatewayConfig, state: GatewayState) -> Router {
    let mut app = Router::new()
        .route(&config.ingest_path, post(ingest_handler))
        .route("/healthz", get(healthz_handler));
    if config.metrics {
        app = app.route("/metrics", get(metrics_handler));
    }
    app.layer(DefaultBodyLimit::max(config.max_body_bytes))
        .with_state(state)
}

async fn ingest_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(app_key) = headers
        .get(&state.api_key_header)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    else {
        state.metrics.record_request("unauthorized");
        return error_response(StatusCode::UNAUTHORIZED, "unauthorized");
    };

    match state.receiver.open_body(app_key, &body) {
        Ok((envelope, payload)) => {
            state.metrics.record_request("accepted");
            let response = json!({
                "status": "accepted",
                "keyDate": envelope.key_date.to_string(),
                "secretVersion": envelope.secret_version.get(),
                "bytes": body.len(),
            });
            state.sink.accept(app_key, &envelope, payload);
            (StatusCode::ACCEPTED, Json(response)).into_response()
        }
        Err(e) => {
            let (status, code) = rejection(&e);
            state.metrics.record_request(code);
            if status.is_server_error() {
                tracing::error!(app_key = %app_key, error = %e, "ingest failed");
            }
            error_response(status, code)
        }
    }
}

/// Map a receiver error to the HTTP status and body code. Unknown tenants
/// look exactly like a missing credential.
pub fn rejection(err: &EnigmaError) -> (StatusCode, &'static str) {
    match err {
        EnigmaError::UnknownTenant => (StatusCode::UNAUTHORIZED, "unauthorized"),
        EnigmaError::UnknownSecretVersion { .. } => (StatusCode::CONFLICT, err.code()),
        EnigmaError::MalformedEnvelope(_)
        | EnigmaError::AuthenticationFailed
        | EnigmaError::InvalidPayload(_)
        | EnigmaError::KeyDateOutOfWindow { .. } => (StatusCode::BAD_REQUEST, err.code()),
        EnigmaError::InvalidKeyMaterial(_)
        | EnigmaError::InvalidContext(_)
        | EnigmaError::Encryption(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    }
}

fn error_response(status: StatusCode, code: &str) -> Response {
    (status, Json(json!({ "error": code }))).into_response()
}

async fn healthz_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn metrics_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => {
            tracing::error!("metrics encode failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                e.to_string(),
            )
        }
    }
}
