use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use super::*;

const PROJECT: &str = "runner-fleet-test";

#[derive(Clone, Default)]
struct MockGce {
    live: Arc<Mutex<HashSet<String>>>,
    inserted: Arc<Mutex<Vec<Value>>>,
    fail_with: Option<u16>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        == Some("Bearer test-token")
}

fn google_error(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (
        status,
        Json(json!({ "error": { "code": status.as_u16(), "message": message } })),
    )
}

async fn insert(
    State(mock): State<MockGce>,
    Path((project, zone)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return google_error(StatusCode::UNAUTHORIZED, "Invalid Credentials");
    }
    if let Some(status) = mock.fail_with {
        return google_error(StatusCode::from_u16(status).unwrap(), "Quota exceeded");
    }
    let name = body["name"].as_str().unwrap_or_default().to_string();
    mock.inserted.lock().unwrap().push(body);
    if !mock.live.lock().unwrap().insert(name.clone()) {
        return google_error(
            StatusCode::CONFLICT,
            &format!("The resource 'projects/{project}/zones/{zone}/instances/{name}' already exists"),
        );
    }
    (StatusCode::OK, Json(json!({ "kind": "compute#operation", "status": "RUNNING" })))
}

async fn remove(
    State(mock): State<MockGce>,
    Path((_project, _zone, name)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return google_error(StatusCode::UNAUTHORIZED, "Invalid Credentials");
    }
    if !mock.live.lock().unwrap().remove(&name) {
        return google_error(StatusCode::NOT_FOUND, "was not found");
    }
    (StatusCode::OK, Json(json!({ "kind": "compute#operation" })))
}

async fn aggregated(
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return google_error(StatusCode::UNAUTHORIZED, "Invalid Credentials");
    }
    let zone_url = |z: &str| {
        format!("https://www.googleapis.com/compute/v1/projects/{PROJECT}/zones/{z}")
    };
    let page = match query.get("pageToken").map(String::as_str) {
        None => json!({
            "items": {
                "zones/europe-west1-b": { "instances": [
                    { "name": "gh-runner-1", "zone": zone_url("europe-west1-b"),
                      "creationTimestamp": "2024-01-01T00:00:00.000-08:00" },
                    { "name": "db-primary", "zone": zone_url("europe-west1-b"),
                      "creationTimestamp": "2023-01-01T00:00:00.000-08:00" },
                ]},
                "zones/us-east1-c": { "warning": { "code": "NO_RESULTS_ON_PAGE" } },
            },
            "nextPageToken": "page-2",
        }),
        Some("page-2") => json!({
            "items": {
                "zones/us-central1-a": { "instances": [
                    { "name": "gh-runner-2", "zone": zone_url("us-central1-a"),
                      "creationTimestamp": "2024-01-02T00:00:00.000-08:00" },
                ]},
            },
        }),
        Some(_) => return google_error(StatusCode::BAD_REQUEST, "bad page token"),
    };
    (StatusCode::OK, Json(page))
}

async fn spawn_mock(mock: MockGce) -> String {
    let app = Router::new()
        .route("/projects/{project}/zones/{zone}/instances", post(insert))
        .route(
            "/projects/{project}/zones/{zone}/instances/{name}",
            delete(remove),
        )
        .route("/projects/{project}/aggregated/instances", get(aggregated))
        .with_state(mock);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn provider(base: &str) -> GceComputeProvider {
    GceComputeProvider::new(
        PROJECT,
        Credentials::AccessToken("test-token".to_string().into()),
    )
    .with_base_url(base)
}

fn spec(name: &str) -> InstanceSpec {
    let mut labels = BTreeMap::new();
    labels.insert("managed-by".to_string(), "gh-runner".to_string());
    InstanceSpec {
        name: InstanceName::new(name).unwrap(),
        zone: ZoneName::new("europe-west1-b").unwrap(),
        description: "Ephemeral GitHub Actions runner".to_string(),
        machine_type: "n1-standard-4".to_string(),
        source_image: "projects/ubuntu-os-cloud/global/images/ubuntu-2204-jammy-v20220810"
            .to_string(),
        disk_size_gb: 30,
        disk_type: "pd-balanced".to_string(),
        network: "default".to_string(),
        startup_script: "#!/bin/sh\necho hi\n".to_string(),
        labels,
    }
}

#[test]
fn insert_body_expands_short_names() {
    let body = serde_json::to_value(provider("http://unused").insert_body(&spec("gh-runner-7")))
        .unwrap();

    assert_eq!(body["name"], "gh-runner-7");
    assert_eq!(body["machineType"], "zones/europe-west1-b/machineTypes/n1-standard-4");
    let disk = &body["disks"][0];
    assert_eq!(disk["boot"], true);
    assert_eq!(disk["autoDelete"], true);
    assert_eq!(disk["type"], "PERSISTENT");
    assert_eq!(disk["initializeParams"]["diskName"], "gh-runner-7");
    assert_eq!(
        disk["initializeParams"]["diskType"],
        "projects/runner-fleet-test/zones/europe-west1-b/diskTypes/pd-balanced"
    );
    assert_eq!(disk["initializeParams"]["diskSizeGb"], "30");
    let nic = &body["networkInterfaces"][0];
    assert_eq!(nic["network"], "projects/runner-fleet-test/global/networks/default");
    assert_eq!(nic["accessConfigs"][0]["type"], "ONE_TO_ONE_NAT");
    assert_eq!(body["metadata"]["items"][0]["key"], "startup-script");
    assert_eq!(body["labels"]["managed-by"], "gh-runner");
}

#[test]
fn insert_body_passes_full_resource_paths_through() {
    let mut spec = spec("gh-runner-7");
    spec.network = "projects/shared-vpc/global/networks/runners".to_string();
    let body = provider("http://unused").insert_body(&spec);
    assert_eq!(
        body.network_interfaces[0].network,
        "projects/shared-vpc/global/networks/runners"
    );
}

#[tokio::test]
async fn create_then_duplicate_create_reports_already_exists() {
    let mock = MockGce::default();
    let gce = provider(&spawn_mock(mock.clone()).await);

    gce.create_instance(&spec("gh-runner-1")).await.unwrap();
    let err = gce.create_instance(&spec("gh-runner-1")).await.unwrap_err();

    assert!(matches!(err, ComputeError::AlreadyExists { ref name } if name == "gh-runner-1"));
    assert_eq!(mock.inserted.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn delete_of_missing_instance_is_not_found() {
    let mock = MockGce::default();
    let gce = provider(&spawn_mock(mock.clone()).await);
    gce.create_instance(&spec("gh-runner-1")).await.unwrap();
    let zone = ZoneName::new("europe-west1-b").unwrap();
    let name = InstanceName::new("gh-runner-1").unwrap();

    gce.delete_instance(&zone, &name).await.unwrap();
    let err = gce.delete_instance(&zone, &name).await.unwrap_err();

    assert!(matches!(err, ComputeError::NotFound { .. }));
    assert!(mock.live.lock().unwrap().is_empty());
}

#[tokio::test]
async fn api_failures_carry_status_and_message() {
    let mock = MockGce {
        fail_with: Some(403),
        ..MockGce::default()
    };
    let gce = provider(&spawn_mock(mock).await);

    let err = gce.create_instance(&spec("gh-runner-1")).await.unwrap_err();

    match err {
        ComputeError::Api { status, message } => {
            assert_eq!(status, 403);
            assert_eq!(message, "Quota exceeded");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn bad_token_is_an_authentication_error() {
    let base = spawn_mock(MockGce::default()).await;
    let gce = GceComputeProvider::new(PROJECT, Credentials::AccessToken("stale".to_string().into()))
        .with_base_url(base);

    let err = gce.list_instances().await.unwrap_err();

    assert!(matches!(err, ComputeError::Authentication { .. }));
}

#[tokio::test]
async fn list_follows_pages_and_extracts_zones() {
    let gce = provider(&spawn_mock(MockGce::default()).await);

    let mut listed = gce.list_instances().await.unwrap();
    listed.sort_by(|a, b| a.name.as_str().cmp(b.name.as_str()));

    let summary: Vec<_> = listed
        .iter()
        .map(|i| (i.name.as_str(), i.zone.as_str()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("db-primary", "europe-west1-b"),
            ("gh-runner-1", "europe-west1-b"),
            ("gh-runner-2", "us-central1-a"),
        ]
    );
    assert!(listed[1].created_at().is_some());
}
