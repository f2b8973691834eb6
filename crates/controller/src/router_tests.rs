use std::sync::Arc;
use std::time::Duration;

use fleet::{
    InboundEvent, JobAction, JobEvent, JobId, ProvisionOutcome, RawDelivery, RepositoryId,
    TeardownOutcome,
};

use super::*;
use crate::testing::{test_config, FakeCompute, FakeIssuer, StaticDecoder};

struct Harness {
    compute: Arc<FakeCompute>,
    issuer: Arc<FakeIssuer>,
}

impl Harness {
    fn new() -> Self {
        Self {
            compute: Arc::new(FakeCompute::new()),
            issuer: Arc::new(FakeIssuer::new()),
        }
    }

    fn router_for(&self, decoded: Result<InboundEvent, fn() -> FleetError>) -> WebhookRouter {
        self.router_with(decoded, test_config())
    }

    fn router_with(
        &self,
        decoded: Result<InboundEvent, fn() -> FleetError>,
        config: FleetConfig,
    ) -> WebhookRouter {
        WebhookRouter::new(
            &config,
            Arc::new(StaticDecoder(decoded)),
            self.issuer.clone(),
            self.compute.clone(),
        )
    }

    async fn handle(&self, event: InboundEvent) -> Result<RouteOutcome, FleetError> {
        self.router_for(Ok(event))
            .handle(&RawDelivery::default())
            .await
    }
}

fn job(action: JobAction, repo: &str, labels: &[&str], id: Option<u64>) -> InboundEvent {
    InboundEvent::WorkflowJob(JobEvent {
        repository: RepositoryId::parse(repo).unwrap(),
        action,
        job_id: id.map(JobId::new),
        labels: labels.iter().map(|l| l.to_string()).collect(),
        runner_name: None,
    })
}

fn queued(id: u64) -> InboundEvent {
    job(JobAction::Queued, "brb/cilium", &["self-hosted", "linux"], Some(id))
}

fn completed(id: u64) -> InboundEvent {
    job(JobAction::Completed, "brb/cilium", &["self-hosted"], Some(id))
}

#[tokio::test]
async fn queued_job_provisions_exactly_one_instance() {
    let h = Harness::new();

    let outcome = h.handle(queued(42)).await.unwrap();

    assert_eq!(
        outcome,
        RouteOutcome::Provisioned {
            instance: fleet::InstanceName::new("gh-runner-42").unwrap(),
            outcome: ProvisionOutcome::Created,
        }
    );
    assert_eq!(h.issuer.calls(), 1);
    assert_eq!(h.compute.created().len(), 1);
}

#[tokio::test]
async fn redelivered_queued_event_reuses_the_same_name() {
    let h = Harness::new();

    h.handle(queued(42)).await.unwrap();
    let second = h.handle(queued(42)).await.unwrap();

    let names: Vec<_> = h.compute.created().into_iter().map(|s| s.name).collect();
    assert_eq!(names.len(), 2);
    assert_eq!(names[0], names[1]);
    assert_eq!(h.compute.live_names().len(), 1);
    assert!(matches!(
        second,
        RouteOutcome::Provisioned {
            outcome: ProvisionOutcome::AlreadyExists,
            ..
        }
    ));
}

#[tokio::test]
async fn completed_job_deletes_the_name_queued_created() {
    let h = Harness::new();

    h.handle(queued(42)).await.unwrap();
    let outcome = h.handle(completed(42)).await.unwrap();

    assert_eq!(
        h.compute.deleted_names(),
        vec![h.compute.created()[0].name.to_string()]
    );
    assert!(matches!(
        outcome,
        RouteOutcome::Terminated {
            outcome: TeardownOutcome::Deleted,
            ..
        }
    ));
    assert!(h.compute.live_names().is_empty());
}

#[tokio::test]
async fn completed_without_job_id_uses_runner_name() {
    let h = Harness::new();
    h.compute
        .insert("gh-runner-8", "europe-west1-b", "2024-01-01T00:00:00Z");
    let event = InboundEvent::WorkflowJob(JobEvent {
        repository: RepositoryId::parse("brb/cilium").unwrap(),
        action: JobAction::Completed,
        job_id: None,
        labels: ["self-hosted".to_string()].into_iter().collect(),
        runner_name: Some("gh-runner-8".to_string()),
    });

    h.handle(event).await.unwrap();

    assert_eq!(h.compute.deleted_names(), vec!["gh-runner-8".to_string()]);
}

#[tokio::test]
async fn non_allowed_repository_is_ignored_without_side_effects() {
    let h = Harness::new();

    let outcome = h
        .handle(job(JobAction::Queued, "evil/fork", &["self-hosted"], Some(1)))
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        RouteOutcome::Ignored(IgnoreReason::RepositoryNotAllowed(_))
    ));
    assert_eq!(h.issuer.calls(), 0);
    assert!(h.compute.calls().is_empty());
}

#[tokio::test]
async fn job_without_qualifying_label_is_ignored() {
    let h = Harness::new();

    for repo in ["brb/cilium", "evil/fork"] {
        for action in [JobAction::Queued, JobAction::Completed] {
            let outcome = h
                .handle(job(action, repo, &["ubuntu-latest"], Some(1)))
                .await
                .unwrap();
            assert_eq!(outcome, RouteOutcome::Ignored(IgnoreReason::MissingLabel));
        }
    }
    assert_eq!(h.issuer.calls(), 0);
    assert!(h.compute.calls().is_empty());
}

#[tokio::test]
async fn ping_is_acknowledged_without_side_effects() {
    let h = Harness::new();

    let outcome = h.handle(InboundEvent::Ping).await.unwrap();

    assert_eq!(outcome, RouteOutcome::Ignored(IgnoreReason::Ping));
    assert_eq!(outcome.state(), RouteState::Ignored);
    assert!(h.compute.calls().is_empty());
}

#[tokio::test]
async fn other_actions_are_ignored() {
    let h = Harness::new();

    let outcome = h
        .handle(job(
            JobAction::Other("in_progress".into()),
            "brb/cilium",
            &["self-hosted"],
            Some(1),
        ))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        RouteOutcome::Ignored(IgnoreReason::UnhandledAction("in_progress".into()))
    );
    assert!(h.compute.calls().is_empty());
}

fn signature_mismatch() -> FleetError {
    FleetError::Authenticity {
        reason: "signature mismatch".into(),
    }
}

#[tokio::test]
async fn rejected_delivery_has_no_side_effects() {
    let h = Harness::new();
    let router = h.router_for(Err(signature_mismatch as fn() -> FleetError));

    let err = router.handle(&RawDelivery::default()).await.unwrap_err();

    assert!(err.is_authenticity());
    assert_eq!(h.issuer.calls(), 0);
    assert!(h.compute.calls().is_empty());
}

#[tokio::test]
async fn token_failure_stops_before_provisioning() {
    let h = Harness::new();
    h.issuer.fail();

    let err = h.handle(queued(3)).await.unwrap_err();

    assert!(matches!(err, FleetError::TokenIssue { .. }));
    assert!(h.compute.calls().is_empty());
}

#[tokio::test]
async fn queued_without_job_id_is_a_validation_error() {
    let h = Harness::new();

    let err = h
        .handle(job(JobAction::Queued, "brb/cilium", &["self-hosted"], None))
        .await
        .unwrap_err();

    assert!(matches!(err, FleetError::Validation { .. }));
    assert_eq!(h.issuer.calls(), 0);
}

#[tokio::test]
async fn slow_provider_hits_the_request_deadline() {
    let h = Harness::new();
    h.compute.slow_down(Duration::from_secs(30));
    let mut config = test_config();
    config.request_timeout = Duration::from_millis(20);
    let router = h.router_with(Ok(queued(1)), config);

    let err = router.handle(&RawDelivery::default()).await.unwrap_err();

    assert!(matches!(err, FleetError::DeadlineExceeded { .. }));
    // The create was cancelled before it took effect.
    assert!(h.compute.calls().is_empty());
}
