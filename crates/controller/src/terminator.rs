//! Instance Terminator: deletes a job's VM once the job completes.
//!
//! The terminator races the reaper and the VM's own `shutdown -h now`, so a
//! VM that is already gone counts as success.

use std::sync::Arc;

use fleet::{
    ComputeError, ComputeProvider, FleetError, InstanceName, InstancePrefix, JobId,
    TeardownOutcome, ZoneName,
};
use tracing::{debug, info, instrument};

/// Deletes runner VMs by their derived name.
pub struct Terminator {
    compute: Arc<dyn ComputeProvider>,
    prefix: InstancePrefix,
    zone: ZoneName,
}

impl Terminator {
    /// Deletes instances named with `prefix` in `zone`.
    pub fn new(compute: Arc<dyn ComputeProvider>, prefix: InstancePrefix, zone: ZoneName) -> Self {
        Self {
            compute,
            prefix,
            zone,
        }
    }

    /// Works out which instance a `completed` event refers to.
    ///
    /// The name is recomputed from the job id whenever one is present. The
    /// runner name reported by GitHub is only used as a fallback, and only if
    /// it carries the fleet prefix, so a forged or foreign runner name can
    /// never target an instance the fleet does not own.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Validation`] if neither source yields a managed
    /// instance name.
    pub fn resolve(
        &self,
        job_id: Option<JobId>,
        runner_name: Option<&str>,
    ) -> Result<InstanceName, FleetError> {
        if let Some(job_id) = job_id {
            return Ok(InstanceName::for_job(&self.prefix, job_id));
        }

        match runner_name {
            Some(name) if self.prefix.owns(name) => {
                InstanceName::new(name).ok_or_else(|| FleetError::Validation {
                    message: "runner name is empty".to_string(),
                })
            }
            Some(name) => Err(FleetError::Validation {
                message: format!("runner '{name}' is not managed by prefix '{}'", self.prefix),
            }),
            None => Err(FleetError::Validation {
                message: "completed event carries neither a job id nor a runner name".to_string(),
            }),
        }
    }

    /// Deletes the instance for a completed job.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Validation`] if no instance can be resolved and
    /// [`FleetError::Compute`] if the provider rejects the delete.
    #[instrument(skip(self))]
    pub async fn terminate(
        &self,
        job_id: Option<JobId>,
        runner_name: Option<&str>,
    ) -> Result<(InstanceName, TeardownOutcome), FleetError> {
        let name = self.resolve(job_id, runner_name)?;

        match self.compute.delete_instance(&self.zone, &name).await {
            Ok(()) => {
                info!(instance = %name, "deleted runner instance");
                Ok((name, TeardownOutcome::Deleted))
            }
            Err(ComputeError::NotFound { .. }) => {
                debug!(instance = %name, "runner instance already gone");
                Ok((name, TeardownOutcome::AlreadyGone))
            }
            Err(source) => Err(FleetError::Compute {
                operation: "delete",
                instance: name.to_string(),
                source,
            }),
        }
    }
}
