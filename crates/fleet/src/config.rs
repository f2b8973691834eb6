//! Immutable process configuration.
//!
//! The `cli` crate reads flags and environment variables once, validates them
//! into a [`FleetConfig`], and passes the pieces into each component's
//! constructor. Nothing in the workspace reads the environment after startup.

use std::time::Duration;

use secrecy::SecretString;

use crate::{AllowedRepoSet, InstancePrefix, RunnerBundle, RunnerLabel, ZoneName};

/// Label a job must declare to be served by this fleet.
pub const DEFAULT_RUNNER_LABEL: &str = "self-hosted";

/// Default time-to-live for runner VMs before the reaper deletes them.
pub const DEFAULT_GC_TTL: Duration = Duration::from_secs(2 * 60 * 60);

/// Default deadline for handling one webhook delivery.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fixed shape of every runner VM. Nothing here depends on the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceTemplate {
    /// Prefix of every managed instance name.
    pub prefix: InstancePrefix,
    /// Zone new instances are created in.
    pub zone: ZoneName,
    /// Machine type short name.
    pub machine_type: String,
    /// Boot disk source image.
    pub source_image: String,
    /// Boot disk size in GB.
    pub disk_size_gb: u32,
    /// Boot disk type short name.
    pub disk_type: String,
    /// VPC network short name.
    pub network: String,
}

/// Settings for the stale instance reaper and its trigger endpoint.
#[derive(Debug, Clone)]
pub struct GcConfig {
    /// Instances older than this are deleted.
    pub ttl: Duration,
    /// Shared secret the trigger request body must equal.
    pub auth_token: SecretString,
}

/// Everything the controller needs, validated once at startup.
#[derive(Debug, Clone)]
pub struct FleetConfig {
    /// Repositories allowed to trigger provisioning.
    pub allowed_repos: AllowedRepoSet,
    /// Label identifying jobs that need a self-managed runner.
    pub runner_label: RunnerLabel,
    /// Shape of runner VMs.
    pub instance: InstanceTemplate,
    /// Runner agent release.
    pub bundle: RunnerBundle,
    /// Reaper settings.
    pub gc: GcConfig,
    /// Deadline applied to each webhook delivery.
    pub request_timeout: Duration,
}
