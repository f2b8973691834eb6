//! Error types for the Compute Engine adapter.

use fleet::ComputeError;
use thiserror::Error;

/// Failure to obtain an OAuth access token for the Compute API.
#[derive(Debug, Error)]
pub enum GceAuthError {
    /// The service account key file could not be read.
    #[error("failed to read credentials file {path}: {source}")]
    CredentialsFile {
        /// Path that was read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The key file is not a service account key, or its private key is
    /// not a usable RSA PEM.
    #[error("invalid service account credentials: {message}")]
    InvalidCredentials {
        /// Description of the problem.
        message: String,
    },

    /// The token endpoint (OAuth server or metadata server) failed.
    #[error("token request failed (status {status:?}): {message}")]
    TokenRequest {
        /// HTTP status, if a response was received.
        status: Option<u16>,
        /// Response body or transport error.
        message: String,
    },
}

impl From<GceAuthError> for ComputeError {
    fn from(err: GceAuthError) -> Self {
        ComputeError::Authentication {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_become_compute_authentication_errors() {
        let err: ComputeError = GceAuthError::TokenRequest {
            status: Some(400),
            message: "invalid_grant".into(),
        }
        .into();
        match err {
            ComputeError::Authentication { message } => assert!(message.contains("invalid_grant")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
