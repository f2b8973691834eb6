//! Port traits implemented by the infrastructure crates.
//!
//! | Trait | Implemented by |
//! |-------|----------------|
//! | [`WebhookDecoder`] | `github::GitHubWebhookDecoder` |
//! | [`RegistrationTokenIssuer`] | `github::GitHubAppTokenIssuer` |
//! | [`ComputeProvider`] | `gce::GceComputeProvider` |
//!
//! All async traits use `async_trait` so they can be held as
//! `Arc<dyn Trait>` by the controller.

use async_trait::async_trait;

use crate::{
    ComputeError, FleetError, InboundEvent, InstanceName, InstanceSpec, ManagedInstance,
    RawDelivery, RegistrationToken, RepositoryId, TokenIssueError, ZoneName,
};

/// Authenticates and parses one raw webhook delivery.
///
/// Implementations must verify authenticity before looking at the body and
/// return [`FleetError::Authenticity`] on any failure; a malformed but
/// authentic body is [`FleetError::Validation`].
pub trait WebhookDecoder: Send + Sync {
    /// Turns a raw delivery into an event.
    fn decode(&self, delivery: &RawDelivery) -> Result<InboundEvent, FleetError>;
}

/// Issues single-use runner registration tokens.
#[async_trait]
pub trait RegistrationTokenIssuer: Send + Sync {
    /// Requests a registration token scoped to `repository`.
    async fn issue_registration_token(
        &self,
        repository: &RepositoryId,
    ) -> Result<RegistrationToken, TokenIssueError>;
}

/// Creates, deletes and lists VMs in the managed project.
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    /// Creates one instance. A name collision is
    /// [`ComputeError::AlreadyExists`].
    async fn create_instance(&self, spec: &InstanceSpec) -> Result<(), ComputeError>;

    /// Deletes one instance. A missing instance is [`ComputeError::NotFound`].
    async fn delete_instance(
        &self,
        zone: &ZoneName,
        name: &InstanceName,
    ) -> Result<(), ComputeError>;

    /// Lists every instance in the project, across all zones.
    async fn list_instances(&self) -> Result<Vec<ManagedInstance>, ComputeError>;
}
