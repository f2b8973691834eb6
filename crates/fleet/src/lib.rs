//! Core domain for the ephemeral runner fleet.
//!
//! This crate holds every domain concept used by the controller: job events
//! decoded from GitHub webhooks, the deterministic instance naming scheme,
//! the immutable process configuration, the boot script contract, and the
//! port traits that infrastructure crates implement.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! It defines *what* is needed; the `github` and `gce` crates define *how*.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`JobId`, `RepositoryId`, `InstanceName`, etc.) |
//! | [`types`] | Events, instances, outcomes and the routing state machine |
//! | [`errors`] | [`FleetError`] and the adapter-facing error types |
//! | [`config`] | Immutable configuration built once at startup |
//! | [`allowlist`] | The repository allow-list filter |
//! | [`bootstrap`] | Boot script rendering for runner VMs |
//! | [`ports`] | Traits implemented by the infrastructure crates |

pub mod allowlist;
pub mod bootstrap;
pub mod config;
pub mod errors;
pub mod identifiers;
pub mod ports;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use allowlist::AllowedRepoSet;
pub use bootstrap::{
    render_startup_script, RunnerBundle, DEFAULT_RUNNER_BUNDLE_SHA256, DEFAULT_RUNNER_BUNDLE_URL,
};
pub use config::{
    FleetConfig, GcConfig, InstanceTemplate, DEFAULT_GC_TTL, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_RUNNER_LABEL,
};
pub use errors::{ComputeError, FleetError, TokenIssueError};
pub use identifiers::{
    DeliveryId, InstanceName, InstancePrefix, JobId, RepositoryId, RunnerLabel, ZoneName,
};
pub use ports::{ComputeProvider, RegistrationTokenIssuer, WebhookDecoder};
pub use types::{
    IgnoreReason, InboundEvent, InstanceSpec, JobAction, JobEvent, ManagedInstance,
    ProvisionOutcome, RawDelivery, ReapReport, RegistrationToken, RouteOutcome, RouteState,
    TeardownOutcome, Timestamp,
};
