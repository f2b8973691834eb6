//! Webhook authentication and payload parsing.
//!
//! Authenticity is always checked before the body is looked at. Two
//! deployment variants are supported:
//!
//! | Variant | Header | Check |
//! |---------|--------|-------|
//! | [`WebhookAuth::Signature`] | `X-Hub-Signature-256` | HMAC-SHA256 of the raw body |
//! | [`WebhookAuth::SharedToken`] | `X-Webhook-Token` | exact match with the secret |
//!
//! Both comparisons are constant time.

use std::collections::BTreeSet;

use fleet::{
    FleetError, InboundEvent, JobAction, JobEvent, JobId, RawDelivery, RepositoryId,
    WebhookDecoder,
};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::WebhookError;

type HmacSha256 = Hmac<Sha256>;

/// Header naming the event type (`ping`, `workflow_job`, ...).
pub const EVENT_HEADER: &str = "x-github-event";
/// Header carrying the delivery GUID.
pub const DELIVERY_HEADER: &str = "x-github-delivery";
/// Header carrying `sha256=<hex>`.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
/// Header carrying the shared token in [`WebhookAuth::SharedToken`] deployments.
pub const TOKEN_HEADER: &str = "x-webhook-token";

const SIGNATURE_PREFIX: &str = "sha256=";

/// How deliveries prove they come from GitHub.
#[derive(Debug, Clone)]
pub enum WebhookAuth {
    /// GitHub signs every payload with the hook secret.
    Signature(SecretString),
    /// A proxy in front of the controller forwards a fixed token.
    SharedToken(SecretString),
}

impl WebhookAuth {
    /// Verifies a delivery.
    ///
    /// # Errors
    ///
    /// Returns an authenticity [`WebhookError`] if the header is missing,
    /// malformed, or does not match.
    pub fn verify(&self, delivery: &RawDelivery) -> Result<(), WebhookError> {
        match self {
            Self::Signature(secret) => {
                let header = delivery
                    .signature
                    .as_deref()
                    .ok_or(WebhookError::MissingSignature)?;
                verify_signature(secret.expose_secret().as_bytes(), header, &delivery.body)
            }
            Self::SharedToken(secret) => {
                let token = delivery
                    .token
                    .as_deref()
                    .ok_or(WebhookError::MissingToken)?;
                if constant_time_eq(token.as_bytes(), secret.expose_secret().as_bytes()) {
                    Ok(())
                } else {
                    Err(WebhookError::InvalidToken)
                }
            }
        }
    }
}

fn verify_signature(secret: &[u8], header: &str, body: &[u8]) -> Result<(), WebhookError> {
    let hex_signature = header
        .trim()
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or(WebhookError::InvalidSignatureFormat)?;
    let signature = hex::decode(hex_signature).map_err(|_| WebhookError::InvalidSignatureFormat)?;

    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| WebhookError::InvalidSignature)?;
    mac.update(body);
    mac.verify_slice(&signature)
        .map_err(|_| WebhookError::InvalidSignature)
}

/// Compares two secrets in constant time. Lengths are not secret.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WorkflowJobPayload {
    action: String,
    workflow_job: Option<WorkflowJob>,
    repository: Option<Repository>,
}

#[derive(Debug, Deserialize)]
struct WorkflowJob {
    id: Option<u64>,
    #[serde(default)]
    labels: Vec<String>,
    runner_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Repository {
    full_name: String,
}

/// Parses an authentic body according to its event type.
///
/// # Errors
///
/// Returns [`WebhookError::UnsupportedEventType`] for event types other than
/// `ping` and `workflow_job`, and [`WebhookError::InvalidPayload`] when the
/// body does not carry the fields the action needs.
pub fn parse_event(event_type: &str, body: &[u8]) -> Result<InboundEvent, WebhookError> {
    match event_type {
        "ping" => {
            let value: serde_json::Value = serde_json::from_slice(body)
                .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;
            if !value.is_object() {
                return Err(WebhookError::InvalidPayload(
                    "ping body is not an object".to_string(),
                ));
            }
            Ok(InboundEvent::Ping)
        }
        "workflow_job" => parse_workflow_job(body).map(InboundEvent::WorkflowJob),
        other => Err(WebhookError::UnsupportedEventType(other.to_string())),
    }
}

fn parse_workflow_job(body: &[u8]) -> Result<JobEvent, WebhookError> {
    let payload: WorkflowJobPayload = serde_json::from_slice(body)
        .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;

    let repository = payload
        .repository
        .ok_or_else(|| WebhookError::InvalidPayload("missing repository".to_string()))?;
    let repository = RepositoryId::parse(&repository.full_name)
        .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;

    let action = JobAction::from_wire(&payload.action);
    let job = payload.workflow_job;
    let job_id = job.as_ref().and_then(|j| j.id).map(JobId::new);
    let runner_name = job
        .as_ref()
        .and_then(|j| j.runner_name.clone())
        .filter(|name| !name.is_empty());

    match action {
        JobAction::Queued if job_id.is_none() => {
            return Err(WebhookError::InvalidPayload(
                "queued workflow_job has no id".to_string(),
            ));
        }
        JobAction::Completed if job_id.is_none() && runner_name.is_none() => {
            return Err(WebhookError::InvalidPayload(
                "completed workflow_job has neither id nor runner_name".to_string(),
            ));
        }
        _ => {}
    }

    let labels: BTreeSet<String> = job.map(|j| j.labels).unwrap_or_default().into_iter().collect();

    Ok(JobEvent {
        repository,
        action,
        job_id,
        labels,
        runner_name,
    })
}

/// [`WebhookDecoder`] for GitHub deliveries.
#[derive(Debug, Clone)]
pub struct GitHubWebhookDecoder {
    auth: WebhookAuth,
}

impl GitHubWebhookDecoder {
    /// Builds a decoder that authenticates with `auth`.
    pub fn new(auth: WebhookAuth) -> Self {
        Self { auth }
    }
}

impl WebhookDecoder for GitHubWebhookDecoder {
    fn decode(&self, delivery: &RawDelivery) -> Result<InboundEvent, FleetError> {
        self.auth.verify(delivery)?;

        let event_type = delivery
            .event_type
            .as_deref()
            .ok_or(WebhookError::MissingEventType)?;
        Ok(parse_event(event_type, &delivery.body)?)
    }
}

#[cfg(test)]
#[path = "webhook_tests.rs"]
mod tests;
