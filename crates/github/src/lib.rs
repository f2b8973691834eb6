//! GitHub infrastructure adapter.
//!
//! Implements two of the ports defined in the [`fleet`] crate:
//!
//! - [`GitHubWebhookDecoder`] ([`fleet::WebhookDecoder`]): authenticates a
//!   delivery with either an HMAC-SHA256 signature or a shared token, then
//!   parses `ping` and `workflow_job` payloads into [`fleet::InboundEvent`].
//! - [`GitHubAppTokenIssuer`] ([`fleet::RegistrationTokenIssuer`]): signs a
//!   GitHub App JWT, exchanges it for an installation token, and requests a
//!   runner registration token for one repository.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** This crate must not contain domain rules. Header
//! names, payload shapes, JWT claims and REST endpoints live here; the
//! controller sees only the port traits.

pub mod app;
pub mod error;
pub mod webhook;

pub use app::{GitHubAppCredentials, GitHubAppTokenIssuer, DEFAULT_API_BASE_URL};
pub use error::{GitHubError, WebhookError};
pub use webhook::{
    constant_time_eq, GitHubWebhookDecoder, WebhookAuth, DELIVERY_HEADER, EVENT_HEADER,
    SIGNATURE_HEADER, TOKEN_HEADER,
};
