//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fleet::FleetError;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// Errors a handler can answer with.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A webhook delivery failed; the status depends on the variant.
    #[error(transparent)]
    Delivery(FleetError),

    /// The reaper trigger body did not match the shared secret.
    #[error("invalid gc token")]
    GcUnauthorized,

    /// The reaper could not list instances.
    #[error(transparent)]
    Reap(FleetError),
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Delivery(err) if err.is_authenticity() => StatusCode::UNAUTHORIZED,
            Self::Delivery(_) | Self::GcUnauthorized => StatusCode::BAD_REQUEST,
            Self::Reap(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Delivery(err) if err.is_external() => {
                error!(error = %err, status = status.as_u16(), "webhook handling failed")
            }
            Self::Reap(err) => error!(error = %err, "reaper scan failed"),
            other => warn!(error = %other, status = status.as_u16(), "request rejected"),
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Errors starting or running the HTTP server.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}
