//! [`ComputeProvider`] over the Compute Engine v1 REST API.
//!
//! `insert` and `delete` return as soon as GCE accepts the operation; the
//! controller does not wait for the VM to reach a final state.

use async_trait::async_trait;
use fleet::{
    ComputeError, ComputeProvider, InstanceName, InstanceSpec, ManagedInstance, ZoneName,
};
use reqwest::{RequestBuilder, Response, StatusCode};
use secrecy::ExposeSecret;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::auth::{Credentials, TokenSource};
use crate::model::{
    AccessConfig, AttachedDisk, DiskInitializeParams, ErrorEnvelope, InstanceAggregatedList,
    InstanceInsert, Metadata, MetadataItem, NetworkInterface,
};

/// Compute Engine v1 API root.
pub const DEFAULT_COMPUTE_BASE_URL: &str = "https://compute.googleapis.com/compute/v1";

/// Metadata key GCE runs at boot.
pub const STARTUP_SCRIPT_KEY: &str = "startup-script";

const HTTP_TIMEOUT: Duration = Duration::from_secs(20);

/// Compute Engine adapter for one project.
#[derive(Debug)]
pub struct GceComputeProvider {
    project: String,
    base_url: String,
    tokens: TokenSource,
    http: reqwest::Client,
}

impl GceComputeProvider {
    /// Adapter for `project` against the public Compute Engine API.
    pub fn new(project: impl Into<String>, credentials: Credentials) -> Self {
        let http = reqwest::Client::new();
        Self {
            project: project.into(),
            base_url: DEFAULT_COMPUTE_BASE_URL.to_string(),
            tokens: TokenSource::new(credentials, http.clone()),
            http,
        }
    }

    /// Points the provider at a different API root (tests, private endpoints).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// The project instances are created in.
    pub fn project(&self) -> &str {
        &self.project
    }

    fn zone_url(&self, zone: &ZoneName) -> String {
        format!(
            "{}/projects/{}/zones/{}/instances",
            self.base_url, self.project, zone
        )
    }

    /// Expands short names into the resource paths `instances.insert` wants.
    /// Values that already contain a `/` are passed through.
    pub(crate) fn insert_body(&self, spec: &InstanceSpec) -> InstanceInsert {
        let zone = spec.zone.as_str();
        let expand = |value: &str, full: String| {
            if value.contains('/') {
                value.to_string()
            } else {
                full
            }
        };

        InstanceInsert {
            name: spec.name.to_string(),
            description: spec.description.clone(),
            machine_type: expand(
                &spec.machine_type,
                format!("zones/{zone}/machineTypes/{}", spec.machine_type),
            ),
            disks: vec![AttachedDisk {
                kind: "PERSISTENT".to_string(),
                boot: true,
                auto_delete: true,
                initialize_params: DiskInitializeParams {
                    disk_name: spec.name.to_string(),
                    disk_type: expand(
                        &spec.disk_type,
                        format!(
                            "projects/{}/zones/{zone}/diskTypes/{}",
                            self.project, spec.disk_type
                        ),
                    ),
                    source_image: spec.source_image.clone(),
                    disk_size_gb: spec.disk_size_gb.to_string(),
                },
            }],
            network_interfaces: vec![NetworkInterface {
                network: expand(
                    &spec.network,
                    format!("projects/{}/global/networks/{}", self.project, spec.network),
                ),
                access_configs: vec![AccessConfig {
                    kind: "ONE_TO_ONE_NAT".to_string(),
                    name: "External NAT".to_string(),
                }],
            }],
            metadata: Metadata {
                items: vec![MetadataItem {
                    key: STARTUP_SCRIPT_KEY.to_string(),
                    value: spec.startup_script.clone(),
                }],
            },
            labels: spec.labels.clone(),
        }
    }

    /// Authenticates and sends a request. Non-success statuses are left to the
    /// caller.
    async fn send(&self, request: RequestBuilder) -> Result<Response, ComputeError> {
        let token = self.tokens.access_token().await?;
        request
            .bearer_auth(token.expose_secret())
            .timeout(HTTP_TIMEOUT)
            .send()
            .await
            .map_err(|e| ComputeError::Transport {
                message: e.to_string(),
            })
    }
}

/// Reads the error message out of a failed response.
async fn error_message(response: Response) -> String {
    let body = response.text().await.unwrap_or_default();
    serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|envelope| envelope.error.message)
        .unwrap_or(body)
}

async fn status_error(response: Response) -> ComputeError {
    let status = response.status();
    let message = error_message(response).await;
    if status == StatusCode::UNAUTHORIZED {
        ComputeError::Authentication { message }
    } else {
        ComputeError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl ComputeProvider for GceComputeProvider {
    #[instrument(skip_all, fields(instance = %spec.name, zone = %spec.zone))]
    async fn create_instance(&self, spec: &InstanceSpec) -> Result<(), ComputeError> {
        let body = self.insert_body(spec);
        let response = self
            .send(self.http.post(self.zone_url(&spec.zone)).json(&body))
            .await?;

        match response.status() {
            status if status.is_success() => {
                debug!("insert accepted");
                Ok(())
            }
            StatusCode::CONFLICT => Err(ComputeError::AlreadyExists {
                name: spec.name.to_string(),
            }),
            _ => Err(status_error(response).await),
        }
    }

    #[instrument(skip_all, fields(instance = %name, zone = %zone))]
    async fn delete_instance(
        &self,
        zone: &ZoneName,
        name: &InstanceName,
    ) -> Result<(), ComputeError> {
        let url = format!("{}/{}", self.zone_url(zone), name);
        let response = self.send(self.http.delete(url)).await?;

        match response.status() {
            status if status.is_success() => {
                debug!("delete accepted");
                Ok(())
            }
            StatusCode::NOT_FOUND => Err(ComputeError::NotFound {
                name: name.to_string(),
            }),
            _ => Err(status_error(response).await),
        }
    }

    #[instrument(skip_all, fields(project = %self.project))]
    async fn list_instances(&self) -> Result<Vec<ManagedInstance>, ComputeError> {
        let url = format!(
            "{}/projects/{}/aggregated/instances",
            self.base_url, self.project
        );
        let mut instances = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.http.get(&url);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let response = self.send(request).await?;
            if !response.status().is_success() {
                return Err(status_error(response).await);
            }
            let page: InstanceAggregatedList =
                response.json().await.map_err(|e| ComputeError::Transport {
                    message: e.to_string(),
                })?;

            for instance in page.items.into_values().flat_map(|scoped| scoped.instances) {
                let name = InstanceName::new(&instance.name);
                let zone = ZoneName::from_resource(&instance.zone);
                match (name, zone) {
                    (Some(name), Some(zone)) => instances.push(ManagedInstance {
                        name,
                        zone,
                        creation_timestamp: instance.creation_timestamp,
                    }),
                    _ => warn!(instance = %instance.name, "listed instance without name or zone"),
                }
            }

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        debug!(count = instances.len(), "listed instances");
        Ok(instances)
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
