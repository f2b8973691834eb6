//! Boot script rendered into each runner VM's `startup-script` metadata.
//!
//! Contract of the script:
//!
//! 1. download the runner bundle from a fixed URL,
//! 2. verify its SHA-256 checksum (always enforced; a mismatch powers the VM
//!    off without registering),
//! 3. register an ephemeral runner for the repository with the single-use
//!    token, named after the instance,
//! 4. run exactly one job,
//! 5. power the host off.
//!
//! Every substituted value is escaped for `/bin/sh` with `shell-escape`, so
//! nothing from a webhook payload can break out of its assignment.

use shell_escape::unix::escape;

use crate::{FleetError, InstanceName, RegistrationToken, RepositoryId};

/// Default runner release, matching the version the fleet was first deployed with.
pub const DEFAULT_RUNNER_BUNDLE_URL: &str = "https://github.com/actions/runner/releases/download/v2.295.0/actions-runner-linux-x64-2.295.0.tar.gz";

/// SHA-256 of [`DEFAULT_RUNNER_BUNDLE_URL`].
pub const DEFAULT_RUNNER_BUNDLE_SHA256: &str =
    "a80c1ab58be3cd4920ac2e51948723af33c2248b434a8a20bd9b3891ca4000b6";

/// The runner agent release installed on every VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerBundle {
    url: String,
    sha256: String,
}

impl RunnerBundle {
    /// Validates a bundle URL and its lowercase hex SHA-256.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Configuration`] if the URL is not `https://` or
    /// the checksum is not 64 hex characters.
    pub fn new(url: impl Into<String>, sha256: impl Into<String>) -> Result<Self, FleetError> {
        let url = url.into();
        let sha256 = sha256.into().to_ascii_lowercase();
        if !url.starts_with("https://") {
            return Err(FleetError::Configuration {
                message: format!("runner bundle URL '{url}' must use https"),
            });
        }
        if sha256.len() != 64 || !sha256.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(FleetError::Configuration {
                message: "runner bundle checksum must be a 64 character hex SHA-256".to_string(),
            });
        }
        Ok(Self { url, sha256 })
    }

    /// Download URL of the bundle.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Expected SHA-256 of the bundle.
    pub fn sha256(&self) -> &str {
        &self.sha256
    }
}

impl Default for RunnerBundle {
    fn default() -> Self {
        Self {
            url: DEFAULT_RUNNER_BUNDLE_URL.to_string(),
            sha256: DEFAULT_RUNNER_BUNDLE_SHA256.to_string(),
        }
    }
}

const SCRIPT_TEMPLATE: &str = r#"#!/bin/sh
set -eu
LOG_FILE=/tmp/action-runner.log
RUNNER_URL=@RUNNER_URL@
RUNNER_SHA256=@RUNNER_SHA256@
REPOSITORY=@REPOSITORY@
RUNNER_TOKEN=@RUNNER_TOKEN@
RUNNER_NAME=@RUNNER_NAME@

fail() {
    echo "gh-failed: $1" >> "${LOG_FILE}"
    shutdown -h now
    exit 1
}

mkdir -p /opt/actions-runner && cd /opt/actions-runner
echo "gh-starting" >> "${LOG_FILE}"
curl -fsSL -o actions-runner.tar.gz "${RUNNER_URL}" >> "${LOG_FILE}" 2>&1 || fail download
echo "gh-downloaded" >> "${LOG_FILE}"
echo "${RUNNER_SHA256}  actions-runner.tar.gz" | sha256sum -c - >> "${LOG_FILE}" 2>&1 || fail checksum
tar xzf ./actions-runner.tar.gz || fail extract
echo "gh-configuring" >> "${LOG_FILE}"
RUNNER_ALLOW_RUNASROOT=1 ./config.sh --url "https://github.com/${REPOSITORY}" --token "${RUNNER_TOKEN}" --name "${RUNNER_NAME}" --ephemeral --unattended >> "${LOG_FILE}" 2>&1 || fail configure
echo "gh-configured" >> "${LOG_FILE}"
RUNNER_ALLOW_RUNASROOT=1 ./run.sh >> "${LOG_FILE}" 2>&1 || true
echo "gh-done" >> "${LOG_FILE}"
shutdown -h now
"#;

/// Renders the boot script for one runner VM.
pub fn render_startup_script(
    bundle: &RunnerBundle,
    repository: &RepositoryId,
    token: &RegistrationToken,
    runner_name: &InstanceName,
) -> String {
    SCRIPT_TEMPLATE
        .replace("@RUNNER_URL@", &escape(bundle.url().into()))
        .replace("@RUNNER_SHA256@", &escape(bundle.sha256().into()))
        .replace("@REPOSITORY@", &escape(repository.as_str().into()))
        .replace("@RUNNER_TOKEN@", &escape(token.expose().into()))
        .replace("@RUNNER_NAME@", &escape(runner_name.as_str().into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(token: &str) -> String {
        render_startup_script(
            &RunnerBundle::default(),
            &RepositoryId::parse("brb/cilium").unwrap(),
            &RegistrationToken::new(token, None),
            &InstanceName::new("gh-runner-42").unwrap(),
        )
    }

    #[test]
    fn script_substitutes_every_placeholder() {
        let script = render("AABBCC");
        assert!(!script.contains('@'));
        assert!(script.contains(&format!("RUNNER_URL='{DEFAULT_RUNNER_BUNDLE_URL}'")));
        assert!(script.contains("REPOSITORY=brb/cilium\n"));
        assert!(script.contains("RUNNER_TOKEN=AABBCC\n"));
        assert!(script.contains("RUNNER_NAME=gh-runner-42\n"));
        assert!(script.contains(&format!("RUNNER_SHA256={DEFAULT_RUNNER_BUNDLE_SHA256}\n")));
    }

    #[test]
    fn script_enforces_checksum_and_ephemeral_registration() {
        let script = render("AABBCC");
        assert!(script.contains("sha256sum -c - >> \"${LOG_FILE}\" 2>&1 || fail checksum"));
        assert!(script.contains("--ephemeral --unattended"));
        assert!(script.trim_end().ends_with("shutdown -h now"));
    }

    #[test]
    fn quoted_values_cannot_escape() {
        let script = render("x'; reboot; echo '");
        assert!(script.contains("RUNNER_TOKEN='x'\\''; reboot; echo '\\'''\n"));

        let script = render("$(reboot) `id`");
        assert!(script.contains("RUNNER_TOKEN='$(reboot) `id`'\n"));

        let script = render("");
        assert!(script.contains("RUNNER_TOKEN=''\n"));
    }

    #[test]
    fn bundle_validation() {
        assert!(RunnerBundle::new(DEFAULT_RUNNER_BUNDLE_URL, DEFAULT_RUNNER_BUNDLE_SHA256).is_ok());
        assert!(RunnerBundle::new("http://example.com/r.tgz", DEFAULT_RUNNER_BUNDLE_SHA256).is_err());
        assert!(RunnerBundle::new(DEFAULT_RUNNER_BUNDLE_URL, "abc").is_err());
        assert!(RunnerBundle::new(DEFAULT_RUNNER_BUNDLE_URL, "z".repeat(64)).is_err());
    }

    #[test]
    fn checksum_is_normalised_to_lowercase() {
        let bundle =
            RunnerBundle::new(DEFAULT_RUNNER_BUNDLE_URL, DEFAULT_RUNNER_BUNDLE_SHA256.to_uppercase())
                .unwrap();
        assert_eq!(bundle.sha256(), DEFAULT_RUNNER_BUNDLE_SHA256);
    }
}
