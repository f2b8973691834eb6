//! In-memory port fakes.
//!
//! [`FakeCompute`] behaves like a tiny project: creates collide on name,
//! deletes of missing instances report not-found, and listings return what is
//! currently "running". Every call is recorded so tests can assert on exactly
//! which provider calls a request produced.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use fleet::{
    ComputeError, ComputeProvider, FleetError, InboundEvent, InstanceName, InstanceSpec,
    ManagedInstance, RawDelivery, RegistrationToken, RegistrationTokenIssuer, RepositoryId,
    Timestamp, TokenIssueError, WebhookDecoder, ZoneName,
};

/// One recorded provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComputeCall {
    Create(InstanceSpec),
    Delete { zone: String, name: String },
    List,
}

/// Compute provider backed by a map of live instances.
#[derive(Debug, Default)]
pub struct FakeCompute {
    live: Mutex<BTreeMap<String, ManagedInstance>>,
    calls: Mutex<Vec<ComputeCall>>,
    failing_deletes: Mutex<HashSet<String>>,
    fail_create: Mutex<bool>,
    fail_list: Mutex<bool>,
    delay: Mutex<Option<Duration>>,
}

impl FakeCompute {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a running instance.
    pub fn insert(&self, name: &str, zone: &str, creation_timestamp: &str) {
        let instance = ManagedInstance {
            name: InstanceName::new(name).expect("non-empty name"),
            zone: ZoneName::new(zone).expect("non-empty zone"),
            creation_timestamp: creation_timestamp.to_string(),
        };
        self.live
            .lock()
            .unwrap()
            .insert(name.to_string(), instance);
    }

    /// Makes every delete of `name` fail with a 500.
    pub fn fail_delete_of(&self, name: &str) {
        self.failing_deletes
            .lock()
            .unwrap()
            .insert(name.to_string());
    }

    /// Makes every create fail with a quota error.
    pub fn fail_creates(&self) {
        *self.fail_create.lock().unwrap() = true;
    }

    /// Makes listing fail.
    pub fn fail_listing(&self) {
        *self.fail_list.lock().unwrap() = true;
    }

    /// Delays every call by `delay` before it takes effect.
    pub fn slow_down(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<ComputeCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn created(&self) -> Vec<InstanceSpec> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ComputeCall::Create(spec) => Some(spec),
                _ => None,
            })
            .collect()
    }

    pub fn deleted_names(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ComputeCall::Delete { name, .. } => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn live_names(&self) -> Vec<String> {
        self.live.lock().unwrap().keys().cloned().collect()
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ComputeProvider for FakeCompute {
    async fn create_instance(&self, spec: &InstanceSpec) -> Result<(), ComputeError> {
        self.pause().await;
        self.calls
            .lock()
            .unwrap()
            .push(ComputeCall::Create(spec.clone()));
        if *self.fail_create.lock().unwrap() {
            return Err(ComputeError::Api {
                status: 403,
                message: "QUOTA_EXCEEDED".to_string(),
            });
        }
        let mut live = self.live.lock().unwrap();
        if live.contains_key(spec.name.as_str()) {
            return Err(ComputeError::AlreadyExists {
                name: spec.name.to_string(),
            });
        }
        live.insert(
            spec.name.to_string(),
            ManagedInstance {
                name: spec.name.clone(),
                zone: spec.zone.clone(),
                creation_timestamp: Timestamp::now().to_string(),
            },
        );
        Ok(())
    }

    async fn delete_instance(
        &self,
        zone: &ZoneName,
        name: &InstanceName,
    ) -> Result<(), ComputeError> {
        self.pause().await;
        self.calls.lock().unwrap().push(ComputeCall::Delete {
            zone: zone.to_string(),
            name: name.to_string(),
        });
        if self.failing_deletes.lock().unwrap().contains(name.as_str()) {
            return Err(ComputeError::Api {
                status: 500,
                message: "backend error".to_string(),
            });
        }
        match self.live.lock().unwrap().remove(name.as_str()) {
            Some(_) => Ok(()),
            None => Err(ComputeError::NotFound {
                name: name.to_string(),
            }),
        }
    }

    async fn list_instances(&self) -> Result<Vec<ManagedInstance>, ComputeError> {
        self.pause().await;
        self.calls.lock().unwrap().push(ComputeCall::List);
        if *self.fail_list.lock().unwrap() {
            return Err(ComputeError::Transport {
                message: "connection reset".to_string(),
            });
        }
        Ok(self.live.lock().unwrap().values().cloned().collect())
    }
}

/// Token issuer that hands out numbered tokens.
#[derive(Debug, Default)]
pub struct FakeIssuer {
    issued: AtomicUsize,
    failing: Mutex<bool>,
}

impl FakeIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self) {
        *self.failing.lock().unwrap() = true;
    }

    /// Number of issuance calls made, failed ones included.
    pub fn calls(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistrationTokenIssuer for FakeIssuer {
    async fn issue_registration_token(
        &self,
        _repository: &RepositoryId,
    ) -> Result<RegistrationToken, TokenIssueError> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        if *self.failing.lock().unwrap() {
            return Err(TokenIssueError::Rejected {
                status: 403,
                message: "Resource not accessible by integration".to_string(),
            });
        }
        Ok(RegistrationToken::new(format!("TOKEN{n}"), None))
    }
}

/// Decoder that skips authentication and returns a fixed event.
pub struct StaticDecoder(pub Result<InboundEvent, fn() -> FleetError>);

impl WebhookDecoder for StaticDecoder {
    fn decode(&self, _delivery: &RawDelivery) -> Result<InboundEvent, FleetError> {
        match &self.0 {
            Ok(event) => Ok(event.clone()),
            Err(make) => Err(make()),
        }
    }
}

/// Configuration used across controller and listener tests: prefix
/// `gh-runner`, zone `europe-west1-b`, TTL two hours, GC secret `gc-secret`,
/// and `brb/cilium` as the only allowed repository.
pub fn test_config() -> fleet::FleetConfig {
    use fleet::{
        AllowedRepoSet, FleetConfig, GcConfig, InstancePrefix, InstanceTemplate, RunnerBundle,
        RunnerLabel, DEFAULT_GC_TTL,
    };

    FleetConfig {
        allowed_repos: AllowedRepoSet::parse_list("brb/cilium").expect("valid list"),
        runner_label: RunnerLabel::new("self-hosted").expect("non-empty label"),
        instance: InstanceTemplate {
            prefix: InstancePrefix::new("gh-runner").expect("valid prefix"),
            zone: ZoneName::new("europe-west1-b").expect("non-empty zone"),
            machine_type: "n1-standard-4".to_string(),
            source_image: "projects/ubuntu-os-cloud/global/images/ubuntu-2204-jammy-v20220810"
                .to_string(),
            disk_size_gb: 30,
            disk_type: "pd-balanced".to_string(),
            network: "default".to_string(),
        },
        bundle: RunnerBundle::default(),
        gc: GcConfig {
            ttl: DEFAULT_GC_TTL,
            auth_token: "gc-secret".to_string().into(),
        },
        request_timeout: Duration::from_secs(5),
    }
}
