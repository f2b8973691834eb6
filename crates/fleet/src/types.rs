//! Shared value types for the runner fleet domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! whole events, provider records and operation outcomes. The routing state
//! machine ([`RouteState`]) is defined here too, so the HTTP surface and the
//! controller agree on which states are terminal.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::{DeliveryId, InstanceName, JobId, RepositoryId, RunnerLabel, ZoneName};

// ---------------------------------------------------------------------------
// Inbound deliveries
// ---------------------------------------------------------------------------

/// One webhook delivery exactly as received, before any validation.
///
/// The HTTP surface copies the relevant headers into this value; the
/// [`crate::WebhookDecoder`] decides whether it is authentic.
#[derive(Debug, Clone, Default)]
pub struct RawDelivery {
    /// `X-GitHub-Event` header.
    pub event_type: Option<String>,
    /// `X-GitHub-Delivery` header.
    pub delivery_id: Option<String>,
    /// `X-Hub-Signature-256` header.
    pub signature: Option<String>,
    /// Shared-token header for deployments that do not sign payloads.
    pub token: Option<String>,
    /// Raw request body. Signatures are computed over these exact bytes.
    pub body: Vec<u8>,
}

impl RawDelivery {
    /// The delivery GUID, if the header is present and well formed.
    pub fn parsed_delivery_id(&self) -> Option<DeliveryId> {
        self.delivery_id.as_deref().and_then(DeliveryId::parse)
    }
}

/// The lifecycle action carried by a `workflow_job` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobAction {
    /// The job is waiting for a runner.
    Queued,
    /// The job finished (successfully or not).
    Completed,
    /// Any other action (`in_progress`, `waiting`, ...). Never actionable.
    Other(String),
}

impl JobAction {
    /// Maps the wire value of the `action` field.
    pub fn from_wire(value: &str) -> Self {
        match value {
            "queued" => Self::Queued,
            "completed" => Self::Completed,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for JobAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Completed => write!(f, "completed"),
            Self::Other(action) => write!(f, "{action}"),
        }
    }
}

/// A decoded `workflow_job` event. Constructed once per request, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobEvent {
    /// Repository the job runs in.
    pub repository: RepositoryId,
    /// Lifecycle action.
    pub action: JobAction,
    /// Job id. Always present for `queued` and `completed` after decoding.
    pub job_id: Option<JobId>,
    /// Labels from the job's `runs-on`.
    pub labels: BTreeSet<String>,
    /// Name of the runner that picked the job up; set on `completed`.
    pub runner_name: Option<String>,
}

impl JobEvent {
    /// Returns `true` if the job declares `label`. GitHub matches runner
    /// labels case-insensitively, and so does this.
    pub fn has_label(&self, label: &RunnerLabel) -> bool {
        self.labels
            .iter()
            .any(|l| l.eq_ignore_ascii_case(label.as_str()))
    }
}

/// Every event the webhook endpoint accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// GitHub's `ping`, sent when the hook is created or tested.
    Ping,
    /// A `workflow_job` lifecycle event.
    WorkflowJob(JobEvent),
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// A single-use runner registration token.
///
/// Consumed by the boot script of exactly one VM. The value never appears in
/// `Debug` output or logs.
#[derive(Debug, Clone)]
pub struct RegistrationToken {
    value: SecretString,
    expires_at: Option<Timestamp>,
}

impl RegistrationToken {
    /// Wraps a token value returned by GitHub.
    pub fn new(value: impl Into<String>, expires_at: Option<Timestamp>) -> Self {
        Self {
            value: SecretString::from(value.into()),
            expires_at,
        }
    }

    /// Returns the secret value. Only the boot script renderer should call this.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    /// When GitHub says the token stops being accepted, if reported.
    pub fn expires_at(&self) -> Option<Timestamp> {
        self.expires_at
    }
}

// ---------------------------------------------------------------------------
// Instances
// ---------------------------------------------------------------------------

/// A VM as reported by the provider's listing.
///
/// `creation_timestamp` is kept as the provider's raw string: a value that
/// fails to parse must be skipped by the reaper, not treated as stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedInstance {
    /// Instance name.
    pub name: InstanceName,
    /// Zone the instance lives in.
    pub zone: ZoneName,
    /// RFC 3339 creation timestamp as reported by the provider.
    pub creation_timestamp: String,
}

impl ManagedInstance {
    /// Parses the creation timestamp. `None` if the provider value is not
    /// valid RFC 3339.
    pub fn created_at(&self) -> Option<Timestamp> {
        Timestamp::parse_rfc3339(&self.creation_timestamp)
    }
}

/// Everything the provider needs to create one runner VM.
#[derive(Clone, PartialEq, Eq)]
pub struct InstanceSpec {
    /// Deterministic instance name derived from the job id.
    pub name: InstanceName,
    /// Zone to create the instance in.
    pub zone: ZoneName,
    /// Human-readable description attached to the instance.
    pub description: String,
    /// Machine type short name (e.g. `"n1-standard-4"`).
    pub machine_type: String,
    /// Boot disk source image URL.
    pub source_image: String,
    /// Boot disk size.
    pub disk_size_gb: u32,
    /// Boot disk type short name (e.g. `"pd-balanced"`).
    pub disk_type: String,
    /// VPC network short name.
    pub network: String,
    /// Rendered `startup-script` metadata value. Contains the registration token.
    pub startup_script: String,
    /// Provider labels attached to the instance.
    pub labels: BTreeMap<String, String>,
}

impl std::fmt::Debug for InstanceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceSpec")
            .field("name", &self.name)
            .field("zone", &self.zone)
            .field("machine_type", &self.machine_type)
            .field("source_image", &self.source_image)
            .field("disk_size_gb", &self.disk_size_gb)
            .field("disk_type", &self.disk_type)
            .field("network", &self.network)
            .field("startup_script", &"[REDACTED]")
            .field("labels", &self.labels)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of a provisioning call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionOutcome {
    /// The instance was created.
    Created,
    /// An instance with the derived name already existed: a redelivered
    /// `queued` event for the same job.
    AlreadyExists,
}

/// Result of a teardown call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownOutcome {
    /// The instance was deleted.
    Deleted,
    /// The instance was already gone (reaped, self-terminated, or never created).
    AlreadyGone,
}

/// Why an authentic event produced no side effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// A `ping` delivery.
    Ping,
    /// A `workflow_job` action other than `queued` or `completed`.
    UnhandledAction(String),
    /// The job does not ask for a self-managed runner.
    MissingLabel,
    /// The repository is not on the allow-list.
    RepositoryNotAllowed(RepositoryId),
}

impl std::fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ping => write!(f, "ping"),
            Self::UnhandledAction(action) => write!(f, "unhandled action '{action}'"),
            Self::MissingLabel => write!(f, "job does not require a self-hosted runner"),
            Self::RepositoryNotAllowed(repo) => write!(f, "repository {repo} is not allowed"),
        }
    }
}

/// Successful result of routing one authentic delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The event was valid but required no action.
    Ignored(IgnoreReason),
    /// A `queued` event was handled.
    Provisioned {
        /// The derived instance name.
        instance: InstanceName,
        /// Whether the instance was new.
        outcome: ProvisionOutcome,
    },
    /// A `completed` event was handled.
    Terminated {
        /// The instance that was targeted.
        instance: InstanceName,
        /// Whether the instance still existed.
        outcome: TeardownOutcome,
    },
}

impl RouteOutcome {
    /// The terminal [`RouteState`] this outcome corresponds to.
    pub fn state(&self) -> RouteState {
        match self {
            Self::Ignored(_) => RouteState::Ignored,
            Self::Provisioned { .. } | Self::Terminated { .. } => RouteState::Completed,
        }
    }
}

/// States of one delivery as it moves through the router.
///
/// ```text
/// Unvalidated → Rejected | Validated
/// Validated   → Ignored  | Routed
/// Routed      → Provisioning | Terminating
/// Provisioning, Terminating → Completed | Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteState {
    /// Received; authenticity not yet checked.
    Unvalidated,
    /// Failed the authenticity check.
    Rejected,
    /// Authentic and parsed.
    Validated,
    /// Authentic but not actionable.
    Ignored,
    /// Passed every gate; dispatch pending.
    Routed,
    /// Creating the runner VM.
    Provisioning,
    /// Deleting the runner VM.
    Terminating,
    /// The external call succeeded or was already satisfied.
    Completed,
    /// A token issue or provider call failed, or the deadline expired.
    Failed,
}

impl RouteState {
    /// Returns `true` if no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Rejected | Self::Ignored | Self::Completed | Self::Failed
        )
    }

    /// Returns `true` if moving from `self` to `next` is a legal transition.
    ///
    /// `Validated → Failed` is legal for well-signed payloads that turn out to
    /// be malformed.
    pub fn can_transition_to(self, next: RouteState) -> bool {
        use RouteState::*;
        matches!(
            (self, next),
            (Unvalidated, Rejected)
                | (Unvalidated, Validated)
                | (Validated, Ignored)
                | (Validated, Routed)
                | (Validated, Failed)
                | (Routed, Provisioning)
                | (Routed, Terminating)
                | (Provisioning, Completed)
                | (Provisioning, Failed)
                | (Terminating, Completed)
                | (Terminating, Failed)
        )
    }
}

impl std::fmt::Display for RouteState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unvalidated => "unvalidated",
            Self::Rejected => "rejected",
            Self::Validated => "validated",
            Self::Ignored => "ignored",
            Self::Routed => "routed",
            Self::Provisioning => "provisioning",
            Self::Terminating => "terminating",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Summary of one reaper scan.
///
/// Per-instance failures are listed in `failed`; the scan itself still
/// succeeded if a report was produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReapReport {
    /// Instances returned by the provider listing.
    pub scanned: usize,
    /// Instances without the fleet prefix. Never touched.
    pub unmanaged: usize,
    /// Managed instances younger than the TTL.
    pub fresh: usize,
    /// Stale instances deleted by this scan.
    pub deleted: Vec<InstanceName>,
    /// Stale instances that were gone by the time the delete was issued.
    pub already_gone: Vec<InstanceName>,
    /// Stale instances whose deletion failed.
    pub failed: Vec<InstanceName>,
    /// Managed instances with an unparsable creation timestamp.
    pub skipped: Vec<InstanceName>,
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly; the underlying representation can change without affecting the
/// domain API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Parses an RFC 3339 timestamp with any UTC offset.
    pub fn parse_rfc3339(value: &str) -> Option<Self> {
        DateTime::parse_from_rfc3339(value.trim())
            .ok()
            .map(|dt| Self(dt.with_timezone(&Utc)))
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }

    /// Time elapsed between `self` and `now`. Zero if `self` is in the future
    /// (clock skew between the provider and this host).
    pub fn age_at(self, now: Timestamp) -> Duration {
        (now.0 - self.0).to_std().unwrap_or(Duration::ZERO)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod tests;
