//! Error types for the GitHub adapter.

use fleet::{FleetError, TokenIssueError};
use thiserror::Error;

/// Errors produced while authenticating or parsing a webhook delivery.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// The `X-Hub-Signature-256` header is missing.
    #[error("missing signature header")]
    MissingSignature,

    /// The signature header is not `sha256=<hex>`.
    #[error("invalid signature format")]
    InvalidSignatureFormat,

    /// HMAC verification failed.
    #[error("invalid signature")]
    InvalidSignature,

    /// The shared-token header is missing.
    #[error("missing webhook token header")]
    MissingToken,

    /// The shared token does not match.
    #[error("invalid webhook token")]
    InvalidToken,

    /// The `X-GitHub-Event` header is missing.
    #[error("missing event type header")]
    MissingEventType,

    /// The event type is not one the fleet handles.
    #[error("unsupported event type: {0}")]
    UnsupportedEventType(String),

    /// The body is not a valid payload for its event type.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

impl WebhookError {
    /// Returns `true` for failures of the authenticity check.
    pub fn is_authenticity(&self) -> bool {
        matches!(
            self,
            Self::MissingSignature
                | Self::InvalidSignatureFormat
                | Self::InvalidSignature
                | Self::MissingToken
                | Self::InvalidToken
        )
    }
}

impl From<WebhookError> for FleetError {
    fn from(err: WebhookError) -> Self {
        if err.is_authenticity() {
            FleetError::Authenticity {
                reason: err.to_string(),
            }
        } else {
            FleetError::Validation {
                message: err.to_string(),
            }
        }
    }
}

/// Errors produced by the GitHub App token issuer.
#[derive(Debug, Error)]
pub enum GitHubError {
    /// The private key file could not be read.
    #[error("failed to read GitHub App private key from {path}: {source}")]
    KeyFile {
        /// Path that was read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The private key is not a usable RSA PEM, or JWT signing failed.
    #[error("GitHub App JWT error: {message}")]
    Jwt {
        /// Description of the failure.
        message: String,
    },

    /// A GitHub API call failed.
    #[error("GitHub API error (status {status:?}): {message}")]
    Http {
        /// HTTP status, if a response was received.
        status: Option<u16>,
        /// Response body or transport error.
        message: String,
    },

    /// A GitHub API response could not be decoded.
    #[error("failed to decode GitHub API response: {message}")]
    Decode {
        /// Description of the decoding failure.
        message: String,
    },
}

impl From<GitHubError> for TokenIssueError {
    fn from(err: GitHubError) -> Self {
        match err {
            GitHubError::KeyFile { .. } | GitHubError::Jwt { .. } => {
                TokenIssueError::Authentication {
                    message: err.to_string(),
                }
            }
            GitHubError::Http {
                status: Some(status),
                message,
            } => TokenIssueError::Rejected { status, message },
            GitHubError::Http {
                status: None,
                message,
            } => TokenIssueError::Transport { message },
            GitHubError::Decode { message } => TokenIssueError::Transport { message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authenticity_failures_map_to_authenticity() {
        for err in [
            WebhookError::MissingSignature,
            WebhookError::InvalidSignatureFormat,
            WebhookError::InvalidSignature,
            WebhookError::MissingToken,
            WebhookError::InvalidToken,
        ] {
            assert!(FleetError::from(err).is_authenticity());
        }
    }

    #[test]
    fn payload_failures_map_to_validation() {
        for err in [
            WebhookError::MissingEventType,
            WebhookError::UnsupportedEventType("push".into()),
            WebhookError::InvalidPayload("eof".into()),
        ] {
            assert!(matches!(
                FleetError::from(err),
                FleetError::Validation { .. }
            ));
        }
    }

    #[test]
    fn http_errors_keep_their_status() {
        let err: TokenIssueError = GitHubError::Http {
            status: Some(404),
            message: "Not Found".into(),
        }
        .into();
        assert!(matches!(err, TokenIssueError::Rejected { status: 404, .. }));

        let err: TokenIssueError = GitHubError::Http {
            status: None,
            message: "timed out".into(),
        }
        .into();
        assert!(matches!(err, TokenIssueError::Transport { .. }));
    }
}
