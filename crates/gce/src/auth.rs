//! OAuth access tokens for the Compute Engine API.
//!
//! Three credential sources are supported:
//!
//! - [`Credentials::ServiceAccount`]: a JSON key file. A self-signed RS256
//!   assertion is exchanged at the key's `token_uri` using the JWT-bearer
//!   grant.
//! - [`Credentials::Metadata`]: the GCE metadata server, for a controller
//!   that itself runs on Google Cloud.
//! - [`Credentials::AccessToken`]: a fixed bearer token (local testing).
//!
//! Tokens are cached until shortly before they expire.

use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::GceAuthError;

/// OAuth scope granting read/write access to Compute Engine.
pub const COMPUTE_SCOPE: &str = "https://www.googleapis.com/auth/compute";

/// Token endpoint of the metadata server.
pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const REFRESH_MARGIN: Duration = Duration::from_secs(60);
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
struct ServiceAccountKeyFile {
    #[serde(rename = "type")]
    kind: Option<String>,
    client_email: String,
    private_key: String,
    token_uri: String,
}

/// A parsed service account key.
#[derive(Clone)]
pub struct ServiceAccount {
    client_email: String,
    token_uri: String,
    key: EncodingKey,
}

impl ServiceAccount {
    /// Parses the JSON key downloaded from the Cloud console.
    ///
    /// # Errors
    ///
    /// Returns [`GceAuthError::InvalidCredentials`] if the JSON is not a
    /// service account key or its private key cannot be loaded.
    pub fn from_json(json: &[u8]) -> Result<Self, GceAuthError> {
        let file: ServiceAccountKeyFile =
            serde_json::from_slice(json).map_err(|e| GceAuthError::InvalidCredentials {
                message: e.to_string(),
            })?;
        if let Some(kind) = file.kind.as_deref() {
            if kind != "service_account" {
                return Err(GceAuthError::InvalidCredentials {
                    message: format!("expected a service_account key, got {kind}"),
                });
            }
        }
        let key = EncodingKey::from_rsa_pem(file.private_key.as_bytes()).map_err(|e| {
            GceAuthError::InvalidCredentials {
                message: e.to_string(),
            }
        })?;
        Ok(Self {
            client_email: file.client_email,
            token_uri: file.token_uri,
            key,
        })
    }

    /// Reads and parses a key file.
    ///
    /// # Errors
    ///
    /// See [`ServiceAccount::from_json`]; additionally returns
    /// [`GceAuthError::CredentialsFile`] if the file cannot be read.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, GceAuthError> {
        let path = path.as_ref();
        let json = std::fs::read(path).map_err(|source| GceAuthError::CredentialsFile {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// The service account's email, used as the assertion issuer.
    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    /// Overrides the token endpoint.
    pub fn with_token_uri(mut self, uri: impl Into<String>) -> Self {
        self.token_uri = uri.into();
        self
    }

    pub(crate) fn assertion(&self, now: i64) -> Result<String, GceAuthError> {
        #[derive(Serialize)]
        struct Claims<'a> {
            iss: &'a str,
            scope: &'a str,
            aud: &'a str,
            iat: i64,
            exp: i64,
        }

        let claims = Claims {
            iss: &self.client_email,
            scope: COMPUTE_SCOPE,
            aud: &self.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.key).map_err(|e| {
            GceAuthError::InvalidCredentials {
                message: e.to_string(),
            }
        })
    }
}

impl fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Where access tokens come from.
#[derive(Debug, Clone)]
pub enum Credentials {
    ServiceAccount(ServiceAccount),
    Metadata {
        /// Metadata server token endpoint, normally [`METADATA_TOKEN_URL`].
        token_url: String,
    },
    AccessToken(SecretString),
}

impl Credentials {
    /// Ambient credentials of the VM or Cloud Run service we run on.
    pub fn metadata() -> Self {
        Self::Metadata {
            token_url: METADATA_TOKEN_URL.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<u64>,
}

struct CachedToken {
    value: SecretString,
    refresh_at: Instant,
}

/// Hands out access tokens, refreshing them when needed.
pub struct TokenSource {
    credentials: Credentials,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenSource {
    /// Fetches tokens for `credentials` over `http`.
    pub fn new(credentials: Credentials, http: reqwest::Client) -> Self {
        Self {
            credentials,
            http,
            cached: Mutex::new(None),
        }
    }

    /// Returns a valid access token, fetching a new one if the cached token
    /// is missing or about to expire.
    ///
    /// # Errors
    ///
    /// Returns [`GceAuthError`] if a new token cannot be obtained.
    pub async fn access_token(&self) -> Result<SecretString, GceAuthError> {
        if let Credentials::AccessToken(token) = &self.credentials {
            return Ok(SecretString::from(token.expose_secret().to_owned()));
        }

        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(SecretString::from(token.value.expose_secret().to_owned()));
            }
        }

        let response = self.fetch().await?;
        let lifetime = Duration::from_secs(response.expires_in.unwrap_or(0));
        debug!(expires_in_secs = lifetime.as_secs(), "fetched compute access token");

        let value = response.access_token;
        *cached = Some(CachedToken {
            value: SecretString::from(value.clone()),
            refresh_at: Instant::now() + lifetime.saturating_sub(REFRESH_MARGIN),
        });
        Ok(SecretString::from(value))
    }

    async fn fetch(&self) -> Result<TokenResponse, GceAuthError> {
        let request = match &self.credentials {
            Credentials::ServiceAccount(account) => {
                let assertion = account.assertion(chrono::Utc::now().timestamp())?;
                self.http
                    .post(&account.token_uri)
                    .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            }
            Credentials::Metadata { token_url } => {
                self.http.get(token_url).header("Metadata-Flavor", "Google")
            }
            Credentials::AccessToken(_) => {
                return Err(GceAuthError::InvalidCredentials {
                    message: "static access tokens are not fetched".to_string(),
                })
            }
        };

        let response = request
            .timeout(HTTP_TIMEOUT)
            .send()
            .await
            .map_err(|e| GceAuthError::TokenRequest {
                status: None,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GceAuthError::TokenRequest {
                status: Some(status.as_u16()),
                message,
            });
        }

        response.json().await.map_err(|e| GceAuthError::TokenRequest {
            status: Some(status.as_u16()),
            message: e.to_string(),
        })
    }
}

impl fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSource")
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
