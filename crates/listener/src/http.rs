//! Axum router and server.
//!
//! Routes:
//! - `POST /payload`: GitHub webhook deliveries
//! - `POST /gc`: run one reaper scan; the body is the shared GC secret
//! - `GET /healthz`: liveness

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use controller::{Reaper, WebhookRouter};
use fleet::{RawDelivery, ReapReport, RouteOutcome, RouteState, Timestamp};
use github::{constant_time_eq, DELIVERY_HEADER, EVENT_HEADER, SIGNATURE_HEADER, TOKEN_HEADER};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{ApiError, ListenerError};

/// Shared handler state. Everything in it is immutable.
#[derive(Clone)]
pub struct AppState {
    router: Arc<WebhookRouter>,
    reaper: Arc<Reaper>,
    gc_secret: Arc<SecretString>,
}

impl AppState {
    /// Bundles the router, the reaper and the `/gc` secret.
    pub fn new(router: Arc<WebhookRouter>, reaper: Arc<Reaper>, gc_secret: SecretString) -> Self {
        Self {
            router,
            reaper,
            gc_secret: Arc::new(gc_secret),
        }
    }
}

/// Builds the router with request tracing.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/payload", post(payload))
        .route("/gc", post(gc))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds `addr` and serves until `shutdown` resolves.
///
/// # Errors
///
/// Returns [`ListenerError`] if the address cannot be bound or the server
/// fails.
pub async fn serve(
    addr: SocketAddr,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ListenerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ListenerError::Bind {
            addr: addr.to_string(),
            source,
        })?;
    let local = listener.local_addr().map_err(ListenerError::Serve)?;
    info!(addr = %local, "listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(ListenerError::Serve)
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn raw_delivery(headers: &HeaderMap, body: Bytes) -> RawDelivery {
    RawDelivery {
        event_type: header(headers, EVENT_HEADER),
        delivery_id: header(headers, DELIVERY_HEADER),
        signature: header(headers, SIGNATURE_HEADER),
        token: header(headers, TOKEN_HEADER),
        body: body.to_vec(),
    }
}

#[derive(Debug, Serialize)]
struct PayloadResponse {
    state: RouteState,
    #[serde(skip_serializing_if = "Option::is_none")]
    instance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl From<&RouteOutcome> for PayloadResponse {
    fn from(outcome: &RouteOutcome) -> Self {
        let (instance, reason) = match outcome {
            RouteOutcome::Ignored(reason) => (None, Some(reason.to_string())),
            RouteOutcome::Provisioned { instance, outcome } => {
                (Some(instance.to_string()), Some(format!("{outcome:?}")))
            }
            RouteOutcome::Terminated { instance, outcome } => {
                (Some(instance.to_string()), Some(format!("{outcome:?}")))
            }
        };
        Self {
            state: outcome.state(),
            instance,
            reason,
        }
    }
}

/// POST /payload
async fn payload(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let delivery = raw_delivery(&headers, body);
    let outcome = state
        .router
        .handle(&delivery)
        .await
        .map_err(ApiError::Delivery)?;
    Ok(Json(PayloadResponse::from(&outcome)))
}

/// POST /gc
async fn gc(State(state): State<AppState>, body: Bytes) -> Result<Json<ReapReport>, ApiError> {
    if !constant_time_eq(&body, state.gc_secret.expose_secret().as_bytes()) {
        return Err(ApiError::GcUnauthorized);
    }
    let report = state
        .reaper
        .reap(Timestamp::now())
        .await
        .map_err(ApiError::Reap)?;
    Ok(Json(report))
}

/// GET /healthz
async fn healthz() -> &'static str {
    "ok"
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
