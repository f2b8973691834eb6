//! Compute Engine infrastructure adapter.
//!
//! Implements the [`fleet::ComputeProvider`] port with the Compute Engine v1
//! REST API:
//!
//! | Port method | REST call | Benign failure |
//! |-------------|-----------|----------------|
//! | `create_instance` | `POST .../zones/{zone}/instances` | `409` → [`fleet::ComputeError::AlreadyExists`] |
//! | `delete_instance` | `DELETE .../zones/{zone}/instances/{name}` | `404` → [`fleet::ComputeError::NotFound`] |
//! | `list_instances` | `GET .../aggregated/instances` (all pages) | none |
//!
//! Requests are authorized with an OAuth access token from a service account
//! key file or the metadata server (see [`auth`]).
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Resource URLs, JSON field names and OAuth plumbing live
//! here. The controller sees only [`fleet::ComputeProvider`].

pub mod auth;
pub mod error;
pub mod model;
pub mod provider;

pub use auth::{Credentials, ServiceAccount, TokenSource, COMPUTE_SCOPE, METADATA_TOKEN_URL};
pub use error::GceAuthError;
pub use provider::{GceComputeProvider, DEFAULT_COMPUTE_BASE_URL, STARTUP_SCRIPT_KEY};
