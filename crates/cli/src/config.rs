//! Command-line flags and environment variables.
//!
//! Every flag falls back to an environment variable so the binary can run
//! unchanged as a container. Values are validated once, here, into the
//! immutable [`FleetConfig`] and adapter settings.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use fleet::{
    AllowedRepoSet, FleetConfig, FleetError, GcConfig, InstancePrefix, InstanceTemplate,
    RunnerBundle, RunnerLabel, ZoneName, DEFAULT_RUNNER_BUNDLE_SHA256, DEFAULT_RUNNER_BUNDLE_URL,
    DEFAULT_RUNNER_LABEL,
};
use github::WebhookAuth;
use secrecy::SecretString;

/// How webhook deliveries are authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AuthMode {
    /// `X-Hub-Signature-256` HMAC of the body.
    Signature,
    /// Fixed `X-Webhook-Token` header.
    Token,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Ephemeral GitHub Actions runners on Compute Engine.
#[derive(Debug, Parser)]
#[command(name = "runner-fleet", version, about)]
pub struct Args {
    /// Repositories (`owner/name`, comma or space separated) allowed to
    /// trigger provisioning.
    #[arg(long, env = "ALLOWED_REPOS")]
    pub allowed_repos: String,

    /// Webhook secret (HMAC key, or the shared token in `token` mode).
    #[arg(long, env = "GH_WEBHOOK_SECRET", hide_env_values = true)]
    pub webhook_secret: String,

    #[arg(long, env = "GH_WEBHOOK_AUTH_MODE", value_enum, default_value_t = AuthMode::Signature)]
    pub webhook_auth_mode: AuthMode,

    #[arg(long, env = "GH_APP_ID")]
    pub app_id: u64,

    #[arg(long, env = "GH_APP_INSTALLATION_ID")]
    pub app_installation_id: u64,

    /// PEM file with the GitHub App private key.
    #[arg(long, env = "GH_APP_INSTALLATION_PRIV_KEY_PATH")]
    pub app_private_key_path: PathBuf,

    #[arg(long, env = "GH_API_URL", default_value = github::DEFAULT_API_BASE_URL)]
    pub github_api_url: String,

    #[arg(long, env = "GCP_PROJECT")]
    pub gcp_project: String,

    #[arg(long, env = "GCP_ZONE", default_value = "europe-west1-b")]
    pub gcp_zone: String,

    /// Service account key file. The metadata server is used when unset.
    #[arg(long, env = "GCP_CREDENTIALS_PATH")]
    pub gcp_credentials_path: Option<PathBuf>,

    /// Body the `POST /gc` trigger must carry.
    #[arg(long, env = "GC_AUTH_TOKEN", hide_env_values = true)]
    pub gc_auth_token: String,

    #[arg(long, env = "GC_TTL_SECS", default_value_t = 7200)]
    pub gc_ttl_secs: u64,

    #[arg(long, env = "RUNNER_LABEL", default_value = DEFAULT_RUNNER_LABEL)]
    pub runner_label: String,

    #[arg(long, env = "INSTANCE_PREFIX", default_value = "gh-runner")]
    pub instance_prefix: String,

    #[arg(long, env = "RUNNER_BUNDLE_URL", default_value = DEFAULT_RUNNER_BUNDLE_URL)]
    pub runner_bundle_url: String,

    #[arg(long, env = "RUNNER_BUNDLE_SHA256", default_value = DEFAULT_RUNNER_BUNDLE_SHA256)]
    pub runner_bundle_sha256: String,

    #[arg(long, env = "MACHINE_TYPE", default_value = "n1-standard-4")]
    pub machine_type: String,

    #[arg(
        long,
        env = "SOURCE_IMAGE",
        default_value = "projects/ubuntu-os-cloud/global/images/ubuntu-2204-jammy-v20220810"
    )]
    pub source_image: String,

    #[arg(long, env = "DISK_SIZE_GB", default_value_t = 30)]
    pub disk_size_gb: u32,

    #[arg(long, env = "DISK_TYPE", default_value = "pd-balanced")]
    pub disk_type: String,

    #[arg(long, env = "NETWORK", default_value = "default")]
    pub network: String,

    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8090")]
    pub listen_addr: SocketAddr,

    /// Deadline for handling one webhook delivery.
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
}

fn configuration(message: impl Into<String>) -> FleetError {
    FleetError::Configuration {
        message: message.into(),
    }
}

impl Args {
    /// Validates the controller settings.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Configuration`] naming the first invalid value.
    pub fn fleet_config(&self) -> Result<FleetConfig, FleetError> {
        if self.gc_auth_token.is_empty() {
            return Err(configuration("GC_AUTH_TOKEN must not be empty"));
        }
        if self.gc_ttl_secs == 0 {
            return Err(configuration("GC_TTL_SECS must be positive"));
        }
        if self.request_timeout_secs == 0 {
            return Err(configuration("REQUEST_TIMEOUT_SECS must be positive"));
        }
        if self.disk_size_gb == 0 {
            return Err(configuration("DISK_SIZE_GB must be positive"));
        }

        Ok(FleetConfig {
            allowed_repos: AllowedRepoSet::parse_list(&self.allowed_repos)?,
            runner_label: RunnerLabel::new(self.runner_label.trim())
                .ok_or_else(|| configuration("RUNNER_LABEL must not be empty"))?,
            instance: InstanceTemplate {
                prefix: InstancePrefix::new(&self.instance_prefix)?,
                zone: ZoneName::new(&self.gcp_zone)
                    .ok_or_else(|| configuration("GCP_ZONE must not be empty"))?,
                machine_type: self.machine_type.clone(),
                source_image: self.source_image.clone(),
                disk_size_gb: self.disk_size_gb,
                disk_type: self.disk_type.clone(),
                network: self.network.clone(),
            },
            bundle: RunnerBundle::new(&self.runner_bundle_url, &self.runner_bundle_sha256)?,
            gc: GcConfig {
                ttl: Duration::from_secs(self.gc_ttl_secs),
                auth_token: SecretString::from(self.gc_auth_token.clone()),
            },
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        })
    }

    /// Webhook authentication for the configured mode.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Configuration`] if the secret is empty.
    pub fn webhook_auth(&self) -> Result<WebhookAuth, FleetError> {
        if self.webhook_secret.is_empty() {
            return Err(configuration("GH_WEBHOOK_SECRET must not be empty"));
        }
        let secret = SecretString::from(self.webhook_secret.clone());
        Ok(match self.webhook_auth_mode {
            AuthMode::Signature => WebhookAuth::Signature(secret),
            AuthMode::Token => WebhookAuth::SharedToken(secret),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: &[&str] = &[
        "runner-fleet",
        "--allowed-repos",
        "brb/cilium",
        "--webhook-secret",
        "s3cret",
        "--app-id",
        "1",
        "--app-installation-id",
        "2",
        "--app-private-key-path",
        "/etc/runner-fleet/app.pem",
        "--gcp-project",
        "cilium-dev",
        "--gc-auth-token",
        "gc-secret",
    ];

    fn parse(extra: &[&str]) -> Args {
        Args::try_parse_from(REQUIRED.iter().chain(extra)).unwrap()
    }

    #[test]
    fn defaults_describe_the_stock_runner_vm() {
        let args = parse(&[]);
        let config = args.fleet_config().unwrap();

        assert_eq!(config.instance.prefix.as_str(), "gh-runner");
        assert_eq!(config.instance.zone.as_str(), "europe-west1-b");
        assert_eq!(config.instance.machine_type, "n1-standard-4");
        assert_eq!(config.instance.disk_size_gb, 30);
        assert_eq!(config.runner_label.as_str(), "self-hosted");
        assert_eq!(config.gc.ttl, Duration::from_secs(7200));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.bundle.url(), DEFAULT_RUNNER_BUNDLE_URL);
        assert_eq!(args.listen_addr.port(), 8090);
        assert!(matches!(args.webhook_auth().unwrap(), WebhookAuth::Signature(_)));
    }

    #[test]
    fn token_mode_uses_shared_token() {
        let args = parse(&["--webhook-auth-mode", "token"]);
        assert!(matches!(args.webhook_auth().unwrap(), WebhookAuth::SharedToken(_)));
    }

    #[test]
    fn invalid_values_are_configuration_errors() {
        for extra in [
            &["--instance-prefix", "Bad_Prefix"][..],
            &["--gc-ttl-secs", "0"],
            &["--runner-bundle-sha256", "abc"],
            &["--runner-bundle-url", "http://example.com/runner.tar.gz"],
        ] {
            let err = parse(extra).fleet_config().unwrap_err();
            assert!(
                matches!(err, FleetError::Configuration { .. }),
                "{extra:?}: {err}"
            );
        }
    }

    #[test]
    fn empty_secrets_are_rejected() {
        let mut args = parse(&[]);
        args.gc_auth_token.clear();
        assert!(args.fleet_config().is_err());

        let mut args = parse(&[]);
        args.webhook_secret.clear();
        assert!(args.webhook_auth().is_err());
    }

    #[test]
    fn missing_required_flag_is_rejected() {
        assert!(Args::try_parse_from(["runner-fleet"]).is_err());
    }
}
