//! Webhook Router: the per-delivery state machine.
//!
//! ```text
//! Unvalidated ──decode──▶ Rejected            (authenticity failure)
//!      │
//!      ▼
//!  Validated ──gates──▶ Ignored               (ping, other action, no label, repo not allowed)
//!      │
//!      ▼
//!   Routed ──queued────▶ Provisioning ──▶ Completed | Failed
//!          └─completed─▶ Terminating  ──▶ Completed | Failed
//! ```
//!
//! Token issuance happens only after every gate has passed.

use std::sync::Arc;
use std::time::Duration;

use fleet::{
    AllowedRepoSet, ComputeProvider, FleetConfig, FleetError, IgnoreReason, InboundEvent,
    JobAction, JobEvent, RawDelivery, RegistrationTokenIssuer, RouteOutcome, RouteState,
    RunnerLabel, WebhookDecoder,
};
use tracing::{debug, field, info, instrument, warn, Span};

use crate::{Provisioner, Terminator};

/// Routes authentic deliveries to the provisioner or terminator.
pub struct WebhookRouter {
    decoder: Arc<dyn WebhookDecoder>,
    issuer: Arc<dyn RegistrationTokenIssuer>,
    provisioner: Provisioner,
    terminator: Terminator,
    allowed_repos: AllowedRepoSet,
    runner_label: RunnerLabel,
    request_timeout: Duration,
}

impl WebhookRouter {
    /// Wires the router and its provisioner/terminator from one configuration.
    pub fn new(
        config: &FleetConfig,
        decoder: Arc<dyn WebhookDecoder>,
        issuer: Arc<dyn RegistrationTokenIssuer>,
        compute: Arc<dyn ComputeProvider>,
    ) -> Self {
        let provisioner = Provisioner::new(
            compute.clone(),
            config.instance.clone(),
            config.bundle.clone(),
        );
        let terminator = Terminator::new(
            compute,
            config.instance.prefix.clone(),
            config.instance.zone.clone(),
        );

        Self {
            decoder,
            issuer,
            provisioner,
            terminator,
            allowed_repos: config.allowed_repos.clone(),
            runner_label: config.runner_label.clone(),
            request_timeout: config.request_timeout,
        }
    }

    /// Handles one raw delivery end to end.
    ///
    /// Returns `Ok` for every terminal state that should be acknowledged
    /// (`Ignored` and `Completed`) and `Err` for `Rejected` and `Failed`.
    /// Everything after authentication runs under the per-request deadline;
    /// when it fires, the in-flight provider call is dropped.
    ///
    /// # Errors
    ///
    /// - [`FleetError::Authenticity`] if the delivery is not authentic.
    /// - [`FleetError::Validation`] if the payload is malformed.
    /// - [`FleetError::TokenIssue`] / [`FleetError::Compute`] if an external
    ///   call fails.
    /// - [`FleetError::DeadlineExceeded`] if handling outlives the deadline.
    #[instrument(skip_all, fields(event = delivery.event_type.as_deref().unwrap_or("-"), delivery = field::Empty))]
    pub async fn handle(&self, delivery: &RawDelivery) -> Result<RouteOutcome, FleetError> {
        match delivery.parsed_delivery_id() {
            Some(id) => {
                Span::current().record("delivery", field::display(id));
            }
            None if delivery.delivery_id.is_some() => debug!("delivery id is not a GUID"),
            None => {}
        }

        let event = match self.decoder.decode(delivery) {
            Ok(event) => event,
            Err(err) => {
                let terminal = if err.is_authenticity() {
                    transition(RouteState::Unvalidated, RouteState::Rejected);
                    RouteState::Rejected
                } else {
                    transition(RouteState::Unvalidated, RouteState::Validated);
                    transition(RouteState::Validated, RouteState::Failed);
                    RouteState::Failed
                };
                warn!(error = %err, state = %terminal, "delivery not accepted");
                return Err(err);
            }
        };
        transition(RouteState::Unvalidated, RouteState::Validated);

        match tokio::time::timeout(self.request_timeout, self.route(event)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(deadline = ?self.request_timeout, state = %RouteState::Failed, "request deadline exceeded");
                Err(FleetError::DeadlineExceeded {
                    after: self.request_timeout,
                })
            }
        }
    }

    /// Routes an already-authenticated event.
    ///
    /// # Errors
    ///
    /// See [`WebhookRouter::handle`]; authenticity errors cannot occur here.
    pub async fn route(&self, event: InboundEvent) -> Result<RouteOutcome, FleetError> {
        let job = match event {
            InboundEvent::Ping => return Ok(self.ignore(IgnoreReason::Ping)),
            InboundEvent::WorkflowJob(job) => job,
        };

        let queued = match &job.action {
            JobAction::Queued => true,
            JobAction::Completed => false,
            JobAction::Other(action) => {
                return Ok(self.ignore(IgnoreReason::UnhandledAction(action.clone())));
            }
        };
        if !job.has_label(&self.runner_label) {
            return Ok(self.ignore(IgnoreReason::MissingLabel));
        }
        if !self.allowed_repos.is_allowed(&job.repository) {
            return Ok(self.ignore(IgnoreReason::RepositoryNotAllowed(
                job.repository.clone(),
            )));
        }
        transition(RouteState::Validated, RouteState::Routed);

        let result = if queued {
            transition(RouteState::Routed, RouteState::Provisioning);
            self.provision(&job).await
        } else {
            transition(RouteState::Routed, RouteState::Terminating);
            self.terminate(&job).await
        };

        match &result {
            Ok(outcome) => {
                info!(repository = %job.repository, job_id = ?job.job_id, outcome = ?outcome, state = %RouteState::Completed, "job event handled");
            }
            Err(err) => {
                warn!(repository = %job.repository, job_id = ?job.job_id, error = %err, state = %RouteState::Failed, "job event failed");
            }
        }
        result
    }

    async fn provision(&self, job: &JobEvent) -> Result<RouteOutcome, FleetError> {
        let job_id = job.job_id.ok_or_else(|| FleetError::Validation {
            message: "queued event has no job id".to_string(),
        })?;

        let token = self
            .issuer
            .issue_registration_token(&job.repository)
            .await
            .map_err(|source| FleetError::TokenIssue {
                repository: job.repository.to_string(),
                source,
            })?;

        let (instance, outcome) = self
            .provisioner
            .provision(job_id, &token, &job.repository)
            .await?;
        Ok(RouteOutcome::Provisioned { instance, outcome })
    }

    async fn terminate(&self, job: &JobEvent) -> Result<RouteOutcome, FleetError> {
        let (instance, outcome) = self
            .terminator
            .terminate(job.job_id, job.runner_name.as_deref())
            .await?;
        Ok(RouteOutcome::Terminated { instance, outcome })
    }

    fn ignore(&self, reason: IgnoreReason) -> RouteOutcome {
        transition(RouteState::Validated, RouteState::Ignored);
        debug!(%reason, "event ignored");
        RouteOutcome::Ignored(reason)
    }
}

fn transition(from: RouteState, to: RouteState) {
    debug_assert!(from.can_transition_to(to), "illegal transition {from} -> {to}");
    debug!(%from, %to, "route state");
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
