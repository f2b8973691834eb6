//! Error types for the runner fleet domain.
//!
//! [`FleetError`] is the error every controller operation returns. Each
//! variant is scoped to a single request (or a single instance within a
//! reaper scan); none of them is fatal to the process.
//!
//! [`TokenIssueError`] and [`ComputeError`] are the error types of the two
//! port traits in [`crate::ports`]. Adapters map their transport failures into
//! these so the controller can tell a benign idempotency collision
//! ([`ComputeError::AlreadyExists`], [`ComputeError::NotFound`]) from a real
//! failure.

use std::time::Duration;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Port errors
// ---------------------------------------------------------------------------

/// Failure to obtain a runner registration token from GitHub.
///
/// Never retried inside the controller; GitHub's own redelivery governs the
/// next attempt.
#[derive(Debug, Error)]
pub enum TokenIssueError {
    /// The GitHub App credentials could not be turned into a signed JWT.
    #[error("GitHub App authentication failed: {message}")]
    Authentication {
        /// Description of the signing failure.
        message: String,
    },

    /// GitHub answered with a non-success status.
    #[error("GitHub API returned {status}: {message}")]
    Rejected {
        /// HTTP status returned by GitHub.
        status: u16,
        /// Response body or a summary of it.
        message: String,
    },

    /// The request never produced a usable response.
    #[error("GitHub API request failed: {message}")]
    Transport {
        /// Description of the transport or decoding failure.
        message: String,
    },
}

/// Failure reported by the compute provider.
#[derive(Debug, Error)]
pub enum ComputeError {
    /// An instance with the requested name already exists.
    #[error("instance already exists: {name}")]
    AlreadyExists {
        /// Name of the conflicting instance.
        name: String,
    },

    /// The instance does not exist (already deleted, or never created).
    #[error("instance not found: {name}")]
    NotFound {
        /// Name of the missing instance.
        name: String,
    },

    /// Credentials could not be loaded or exchanged for an access token.
    #[error("compute authentication failed: {message}")]
    Authentication {
        /// Description of the credential failure.
        message: String,
    },

    /// The provider API answered with a non-success status.
    #[error("compute API returned {status}: {message}")]
    Api {
        /// HTTP status returned by the provider.
        status: u16,
        /// Provider error message.
        message: String,
    },

    /// The request never produced a usable response.
    #[error("compute request failed: {message}")]
    Transport {
        /// Description of the transport or decoding failure.
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Controller errors
// ---------------------------------------------------------------------------

/// Errors returned by controller operations.
///
/// The HTTP surface maps each variant to a status code; see
/// [`FleetError::is_authenticity`] for the one variant that is not a `400`.
#[derive(Debug, Error)]
pub enum FleetError {
    /// The request's signature or shared token did not verify.
    ///
    /// Nothing in the request was parsed and no side effect occurred.
    #[error("Authenticity check failed: {reason}")]
    Authenticity {
        /// Why the check failed (missing header, bad format, mismatch).
        reason: String,
    },

    /// The payload is malformed or semantically invalid.
    #[error("Validation error: {message}")]
    Validation {
        /// Description of the problem.
        message: String,
    },

    /// GitHub token issuance failed.
    #[error("Token issuance failed for {repository}: {source}")]
    TokenIssue {
        /// Repository the token was requested for.
        repository: String,
        /// Underlying adapter error.
        #[source]
        source: TokenIssueError,
    },

    /// A compute provider call failed.
    #[error("Compute operation '{operation}' failed for {instance}: {source}")]
    Compute {
        /// Operation that failed (`create`, `delete`, `list`).
        operation: &'static str,
        /// Instance name, or the project for listings.
        instance: String,
        /// Underlying adapter error.
        #[source]
        source: ComputeError,
    },

    /// Handling did not finish within the per-request deadline.
    ///
    /// In-flight provider calls were cancelled when the deadline fired.
    #[error("Request deadline of {after:?} exceeded")]
    DeadlineExceeded {
        /// The deadline that elapsed.
        after: Duration,
    },

    /// The process configuration is invalid.
    ///
    /// Produced at startup; the controller never starts with an invalid config.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },
}

impl FleetError {
    /// Returns `true` for [`FleetError::Authenticity`].
    pub fn is_authenticity(&self) -> bool {
        matches!(self, Self::Authenticity { .. })
    }

    /// Returns `true` if the failure came from an external API (GitHub or the
    /// compute provider).
    pub fn is_external(&self) -> bool {
        matches!(self, Self::TokenIssue { .. } | Self::Compute { .. })
    }
}
