//! Stale Instance Reaper.
//!
//! The liveness backstop for lost `completed` events, crashed VMs and failed
//! boot scripts. Staleness is always derived from the provider's own creation
//! timestamp; nothing is cached between scans.

use std::sync::Arc;
use std::time::Duration;

use fleet::{
    ComputeError, ComputeProvider, FleetError, InstancePrefix, ReapReport, Timestamp,
};
use tracing::{debug, error, info, instrument, warn};

/// Deletes managed instances older than a TTL.
pub struct Reaper {
    compute: Arc<dyn ComputeProvider>,
    prefix: InstancePrefix,
    ttl: Duration,
}

impl Reaper {
    /// Reaps instances named with `prefix` once they are older than `ttl`.
    pub fn new(compute: Arc<dyn ComputeProvider>, prefix: InstancePrefix, ttl: Duration) -> Self {
        Self {
            compute,
            prefix,
            ttl,
        }
    }

    /// The configured time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Runs one full scan, treating `now` as the current time.
    ///
    /// Only instances named with the fleet prefix are considered. An instance
    /// is stale when its age is strictly greater than the TTL. Instances with
    /// an unparsable creation timestamp are skipped, never deleted. A failed
    /// delete is recorded in the report and the scan moves on.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Compute`] only if the listing itself fails.
    #[instrument(skip(self), fields(ttl_secs = self.ttl.as_secs()))]
    pub async fn reap(&self, now: Timestamp) -> Result<ReapReport, FleetError> {
        let instances = self
            .compute
            .list_instances()
            .await
            .map_err(|source| FleetError::Compute {
                operation: "list",
                instance: "*".to_string(),
                source,
            })?;

        let mut report = ReapReport {
            scanned: instances.len(),
            ..ReapReport::default()
        };

        for instance in instances {
            if !self.prefix.owns(instance.name.as_str()) {
                report.unmanaged += 1;
                continue;
            }

            let Some(created_at) = instance.created_at() else {
                warn!(
                    instance = %instance.name,
                    creation_timestamp = %instance.creation_timestamp,
                    "skipping instance with unparsable creation timestamp"
                );
                report.skipped.push(instance.name);
                continue;
            };

            let age = created_at.age_at(now);
            if age <= self.ttl {
                debug!(instance = %instance.name, age_secs = age.as_secs(), "instance within ttl");
                report.fresh += 1;
                continue;
            }

            match self
                .compute
                .delete_instance(&instance.zone, &instance.name)
                .await
            {
                Ok(()) => {
                    info!(instance = %instance.name, zone = %instance.zone, age_secs = age.as_secs(), "reaped stale instance");
                    report.deleted.push(instance.name);
                }
                Err(ComputeError::NotFound { .. }) => {
                    debug!(instance = %instance.name, "stale instance already gone");
                    report.already_gone.push(instance.name);
                }
                Err(err) => {
                    error!(instance = %instance.name, zone = %instance.zone, error = %err, "failed to reap stale instance");
                    report.failed.push(instance.name);
                }
            }
        }

        info!(
            scanned = report.scanned,
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "reaper scan finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
#[path = "reaper_tests.rs"]
mod tests;
