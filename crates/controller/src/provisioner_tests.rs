use std::sync::Arc;

use fleet::{JobId, RegistrationToken, RepositoryId};

use super::*;
use crate::testing::{test_config, FakeCompute};

fn provisioner(compute: Arc<FakeCompute>) -> Provisioner {
    let config = test_config();
    Provisioner::new(compute, config.instance, config.bundle)
}

fn repo() -> RepositoryId {
    RepositoryId::parse("brb/cilium").unwrap()
}

#[tokio::test]
async fn creates_one_instance_named_after_the_job() {
    let compute = Arc::new(FakeCompute::new());
    let token = RegistrationToken::new("TOKEN", None);

    let (name, outcome) = provisioner(compute.clone())
        .provision(JobId::new(1234), &token, &repo())
        .await
        .unwrap();

    assert_eq!(name.as_str(), "gh-runner-1234");
    assert_eq!(outcome, ProvisionOutcome::Created);
    let created = compute.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].name, name);
    assert_eq!(created[0].zone.as_str(), "europe-west1-b");
    assert_eq!(created[0].machine_type, "n1-standard-4");
    assert_eq!(created[0].labels.get(JOB_ID_LABEL).map(String::as_str), Some("1234"));
    assert_eq!(
        created[0].labels.get(MANAGED_BY_LABEL).map(String::as_str),
        Some("gh-runner")
    );
    assert!(created[0].startup_script.contains("RUNNER_TOKEN=TOKEN\n"));
    assert!(created[0].startup_script.contains("RUNNER_NAME=gh-runner-1234\n"));
}

#[tokio::test]
async fn duplicate_delivery_is_an_idempotent_success() {
    let compute = Arc::new(FakeCompute::new());
    let provisioner = provisioner(compute.clone());
    let token = RegistrationToken::new("TOKEN", None);

    let first = provisioner.provision(JobId::new(9), &token, &repo()).await.unwrap();
    let second = provisioner.provision(JobId::new(9), &token, &repo()).await.unwrap();

    assert_eq!(first.0, second.0);
    assert_eq!(first.1, ProvisionOutcome::Created);
    assert_eq!(second.1, ProvisionOutcome::AlreadyExists);
    assert_eq!(compute.live_names(), vec!["gh-runner-9".to_string()]);
}

#[tokio::test]
async fn provider_failures_are_errors() {
    let compute = Arc::new(FakeCompute::new());
    compute.fail_creates();

    let err = provisioner(compute)
        .provision(JobId::new(5), &RegistrationToken::new("T", None), &repo())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        FleetError::Compute { operation: "create", ref instance, .. } if instance == "gh-runner-5"
    ));
}
