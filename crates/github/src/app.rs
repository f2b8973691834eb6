//! GitHub App authentication and runner registration tokens.
//!
//! Issuing a registration token takes two calls:
//!
//! 1. A short-lived RS256 JWT signed with the App's private key is exchanged
//!    for an installation access token
//!    (`POST /app/installations/{id}/access_tokens`).
//! 2. The installation token requests a registration token for the
//!    repository (`POST /repos/{owner}/{repo}/actions/runners/registration-token`).
//!
//! Installation tokens are not cached: every queued job mints a fresh one.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use fleet::{RegistrationToken, RegistrationTokenIssuer, RepositoryId, Timestamp, TokenIssueError};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::GitHubError;

/// Public GitHub REST API root.
pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

const ACCEPT: &str = "application/vnd.github+json";
const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = "runner-fleet";
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// JWTs are backdated to tolerate clock drift between us and GitHub.
const JWT_BACKDATE_SECS: i64 = 60;
/// GitHub rejects App JWTs that live longer than ten minutes.
const JWT_LIFETIME_SECS: i64 = 540;

/// Identity of a GitHub App installation plus its signing key.
#[derive(Clone)]
pub struct GitHubAppCredentials {
    app_id: u64,
    installation_id: u64,
    key: EncodingKey,
}

impl GitHubAppCredentials {
    /// Builds credentials from an RSA private key in PEM form.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::Jwt`] when the PEM is not an RSA private key.
    pub fn from_pem(app_id: u64, installation_id: u64, pem: &[u8]) -> Result<Self, GitHubError> {
        let key = EncodingKey::from_rsa_pem(pem).map_err(|error| GitHubError::Jwt {
            message: error.to_string(),
        })?;
        Ok(Self {
            app_id,
            installation_id,
            key,
        })
    }

    /// Reads the private key from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::KeyFile`] if the file cannot be read, or
    /// [`GitHubError::Jwt`] if its content is not an RSA private key.
    pub fn from_pem_file(
        app_id: u64,
        installation_id: u64,
        path: impl AsRef<Path>,
    ) -> Result<Self, GitHubError> {
        let path = path.as_ref();
        let pem = std::fs::read(path).map_err(|source| GitHubError::KeyFile {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_pem(app_id, installation_id, &pem)
    }

    /// The GitHub App id.
    pub fn app_id(&self) -> u64 {
        self.app_id
    }

    /// The installation tokens are minted for.
    pub fn installation_id(&self) -> u64 {
        self.installation_id
    }

    /// Signs an App JWT valid from `now - 60s` to `now + 9m`.
    pub(crate) fn app_jwt(&self, now: i64) -> Result<String, GitHubError> {
        #[derive(Debug, Serialize)]
        struct Claims {
            iat: i64,
            exp: i64,
            iss: String,
        }

        let claims = Claims {
            iat: now - JWT_BACKDATE_SECS,
            exp: now + JWT_LIFETIME_SECS,
            iss: self.app_id.to_string(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.key).map_err(
            |error| GitHubError::Jwt {
                message: error.to_string(),
            },
        )
    }
}

impl fmt::Debug for GitHubAppCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubAppCredentials")
            .field("app_id", &self.app_id)
            .field("installation_id", &self.installation_id)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct RegistrationTokenResponse {
    token: String,
    expires_at: Option<String>,
}

/// [`RegistrationTokenIssuer`] backed by a GitHub App installation.
#[derive(Debug, Clone)]
pub struct GitHubAppTokenIssuer {
    credentials: GitHubAppCredentials,
    api_base_url: String,
    http: reqwest::Client,
}

impl GitHubAppTokenIssuer {
    /// Issuer against `api.github.com`.
    pub fn new(credentials: GitHubAppCredentials) -> Self {
        Self {
            credentials,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Points the issuer at a different API root (GitHub Enterprise, tests).
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    async fn installation_token(&self) -> Result<String, GitHubError> {
        let jwt = self.credentials.app_jwt(chrono::Utc::now().timestamp())?;
        let endpoint = format!(
            "{}/app/installations/{}/access_tokens",
            self.api_base_url, self.credentials.installation_id
        );
        let response: AccessTokenResponse = self.post(&endpoint, &jwt).await?;
        Ok(response.token)
    }

    async fn post<T: DeserializeOwned>(&self, endpoint: &str, bearer: &str) -> Result<T, GitHubError> {
        let response = self
            .http
            .post(endpoint)
            .header("Accept", ACCEPT)
            .header("User-Agent", USER_AGENT)
            .header("X-GitHub-Api-Version", API_VERSION)
            .bearer_auth(bearer)
            .timeout(HTTP_TIMEOUT)
            .send()
            .await
            .map_err(|error| GitHubError::Http {
                status: None,
                message: error.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".to_string());
            return Err(GitHubError::Http {
                status: Some(status.as_u16()),
                message,
            });
        }

        response.json().await.map_err(|error| GitHubError::Decode {
            message: error.to_string(),
        })
    }
}

#[async_trait]
impl RegistrationTokenIssuer for GitHubAppTokenIssuer {
    #[instrument(skip_all, fields(repository = %repository))]
    async fn issue_registration_token(
        &self,
        repository: &RepositoryId,
    ) -> Result<RegistrationToken, TokenIssueError> {
        let installation_token = self.installation_token().await?;
        debug!(
            installation_id = self.credentials.installation_id,
            "obtained installation token"
        );

        let endpoint = format!(
            "{}/repos/{}/{}/actions/runners/registration-token",
            self.api_base_url,
            repository.owner(),
            repository.name()
        );
        let response: RegistrationTokenResponse =
            self.post(&endpoint, &installation_token).await?;

        let expires_at = response
            .expires_at
            .as_deref()
            .and_then(Timestamp::parse_rfc3339);
        debug!(expires_at = ?expires_at, "issued runner registration token");

        Ok(RegistrationToken::new(response.token, expires_at))
    }
}

#[cfg(test)]
#[path = "app_tests.rs"]
mod tests;
