//! Instance Provisioner: one VM per queued job.

use std::collections::BTreeMap;
use std::sync::Arc;

use fleet::{
    render_startup_script, ComputeError, ComputeProvider, FleetError, InstanceName, InstanceSpec,
    InstanceTemplate, JobId, ProvisionOutcome, RegistrationToken, RepositoryId, RunnerBundle,
};
use tracing::{info, instrument, warn};

/// Provider label marking an instance as owned by the fleet.
pub const MANAGED_BY_LABEL: &str = "managed-by";

/// Provider label carrying the job id an instance was created for.
pub const JOB_ID_LABEL: &str = "job-id";

/// Creates runner VMs from the fixed [`InstanceTemplate`].
pub struct Provisioner {
    compute: Arc<dyn ComputeProvider>,
    template: InstanceTemplate,
    bundle: RunnerBundle,
}

impl Provisioner {
    /// Creates instances from `template`, booting the runner from `bundle`.
    pub fn new(
        compute: Arc<dyn ComputeProvider>,
        template: InstanceTemplate,
        bundle: RunnerBundle,
    ) -> Self {
        Self {
            compute,
            template,
            bundle,
        }
    }

    /// The instance name a job maps to.
    pub fn instance_name(&self, job_id: JobId) -> InstanceName {
        InstanceName::for_job(&self.template.prefix, job_id)
    }

    /// Builds the full create request for a job.
    pub fn instance_spec(
        &self,
        job_id: JobId,
        token: &RegistrationToken,
        repository: &RepositoryId,
    ) -> InstanceSpec {
        let name = self.instance_name(job_id);
        let startup_script = render_startup_script(&self.bundle, repository, token, &name);

        let mut labels = BTreeMap::new();
        labels.insert(
            MANAGED_BY_LABEL.to_string(),
            self.template.prefix.to_string(),
        );
        labels.insert(JOB_ID_LABEL.to_string(), job_id.to_string());

        InstanceSpec {
            description: format!("Ephemeral GitHub Actions runner for {repository} job {job_id}"),
            zone: self.template.zone.clone(),
            machine_type: self.template.machine_type.clone(),
            source_image: self.template.source_image.clone(),
            disk_size_gb: self.template.disk_size_gb,
            disk_type: self.template.disk_type.clone(),
            network: self.template.network.clone(),
            startup_script,
            labels,
            name,
        }
    }

    /// Creates the VM for `job_id`.
    ///
    /// A name collision means the same `queued` event was delivered twice and
    /// the first delivery already created the VM; it is reported as
    /// [`ProvisionOutcome::AlreadyExists`], not as an error.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Compute`] for every other provider failure.
    #[instrument(skip(self, token), fields(instance = tracing::field::Empty))]
    pub async fn provision(
        &self,
        job_id: JobId,
        token: &RegistrationToken,
        repository: &RepositoryId,
    ) -> Result<(InstanceName, ProvisionOutcome), FleetError> {
        let spec = self.instance_spec(job_id, token, repository);
        tracing::Span::current().record("instance", spec.name.as_str());

        match self.compute.create_instance(&spec).await {
            Ok(()) => {
                info!(instance = %spec.name, zone = %spec.zone, "created runner instance");
                Ok((spec.name, ProvisionOutcome::Created))
            }
            Err(ComputeError::AlreadyExists { .. }) => {
                warn!(instance = %spec.name, "runner instance already exists; duplicate queued delivery");
                Ok((spec.name, ProvisionOutcome::AlreadyExists))
            }
            Err(source) => Err(FleetError::Compute {
                operation: "create",
                instance: spec.name.to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
#[path = "provisioner_tests.rs"]
mod tests;
