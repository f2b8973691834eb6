//! HTTP surface of the runner fleet.
//!
//! | Route | Purpose | Responses |
//! |-------|---------|-----------|
//! | `POST /payload` | GitHub `workflow_job` / `ping` deliveries | `200` handled or ignored, `400` invalid or failed, `401` not authentic |
//! | `POST /gc` | one reaper scan; body is the GC secret | `200` + JSON report, `400` wrong secret, `500` listing failed |
//! | `GET /healthz` | liveness | `200 ok` |
//!
//! Failures are never retried here. A non-`2xx` answer makes GitHub show the
//! delivery as failed, and redelivering it is safe because instance names
//! are derived from the job id.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Header extraction, status mapping and request tracing
//! live here; all decisions are made by [`controller`].

pub mod error;
pub mod http;

pub use error::{ApiError, ListenerError};
pub use http::{build_router, serve, AppState};
