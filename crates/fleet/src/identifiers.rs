//! Newtype domain identifiers.
//!
//! Every domain concept that has an identity is represented as a distinct newtype
//! wrapping a primitive. This prevents accidentally interchanging, for example,
//! a [`ZoneName`] with an [`InstanceName`] even though both are strings under
//! the hood.
//!
//! The instance naming scheme lives here as well: [`InstanceName::for_job`] is
//! the idempotency key that ties a VM to the job it was created for.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::FleetError;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: GitHub integer backed
// ---------------------------------------------------------------------------

/// Identifies a single GitHub Actions job (`workflow_job.id`).
///
/// GitHub assigns a fresh id to every job attempt, so the id is stable across
/// redeliveries of the same `queued` or `completed` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(u64);

impl JobId {
    /// Creates a new identifier from a raw integer.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the underlying integer value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identifiers: UUID backed
// ---------------------------------------------------------------------------

/// The `X-GitHub-Delivery` GUID of one webhook delivery.
///
/// Redeliveries keep the original GUID, so it is carried on log spans to
/// correlate a failed request with its retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryId(Uuid);

impl DeliveryId {
    /// Parses a delivery id header value. Returns `None` for anything that is
    /// not a UUID.
    pub fn parse(value: &str) -> Option<Self> {
        Uuid::parse_str(value.trim()).ok().map(Self)
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Repository identifier
// ---------------------------------------------------------------------------

/// A GitHub repository in `"owner/name"` format.
///
/// The value is validated on construction: exactly one `/`, both halves
/// non-empty, and only the characters GitHub permits in owner and repository
/// names. The validation also guarantees the value is safe to interpolate into
/// API paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryId(String);

impl RepositoryId {
    /// Parses an `owner/name` string.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Validation`] if the value is not a well-formed
    /// repository identifier.
    pub fn parse(value: &str) -> Result<Self, FleetError> {
        let value = value.trim();
        let (owner, name) = value.split_once('/').ok_or_else(|| FleetError::Validation {
            message: format!("repository '{value}' is not in owner/name form"),
        })?;

        let valid_part = |part: &str| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };
        if !valid_part(owner) || !valid_part(name) {
            return Err(FleetError::Validation {
                message: format!("repository '{value}' contains invalid characters"),
            });
        }

        Ok(Self(value.to_string()))
    }

    /// Returns the owning user or organisation.
    pub fn owner(&self) -> &str {
        self.0.split_once('/').map_or("", |(owner, _)| owner)
    }

    /// Returns the repository name without the owner.
    pub fn name(&self) -> &str {
        self.0.split_once('/').map_or("", |(_, name)| name)
    }

    /// Returns the full `owner/name` form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Instance naming
// ---------------------------------------------------------------------------

/// Longest prefix accepted. Leaves room for `-` plus a 20 digit job id inside
/// the 63 character Compute Engine name limit.
const MAX_PREFIX_LEN: usize = 40;

/// The fixed prefix of every VM the fleet manages (e.g. `"gh-runner"`).
///
/// Must be a valid Compute Engine name fragment: a lowercase letter first,
/// then lowercase letters, digits or `-`, and no trailing `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstancePrefix(String);

impl InstancePrefix {
    /// Validates and wraps a prefix.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Configuration`] if the prefix is not a valid
    /// Compute Engine name fragment.
    pub fn new(value: impl Into<String>) -> Result<Self, FleetError> {
        let value = value.into();
        let starts_ok = value.chars().next().is_some_and(|c| c.is_ascii_lowercase());
        let chars_ok = value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !starts_ok || !chars_ok || value.ends_with('-') || value.len() > MAX_PREFIX_LEN {
            return Err(FleetError::Configuration {
                message: format!(
                    "instance prefix '{value}' must match [a-z][-a-z0-9]* (max {MAX_PREFIX_LEN} chars, no trailing '-')"
                ),
            });
        }
        Ok(Self(value))
    }

    /// Returns `true` if `name` has the shape [`InstanceName::for_job`]
    /// produces for this prefix: `{prefix}-` followed by decimal digits only.
    /// Names that merely start with the prefix (`gh-runner-arm-7`,
    /// `gh-runner-cache`) belong to someone else.
    pub fn owns(&self, name: &str) -> bool {
        name.strip_prefix(self.0.as_str())
            .and_then(|rest| rest.strip_prefix('-'))
            .is_some_and(|suffix| !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()))
    }

    /// Returns the prefix as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InstancePrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

string_id! {
    /// The name of a Compute Engine instance.
    ///
    /// Names of fleet VMs come from [`InstanceName::for_job`]; names read back
    /// from the provider listing may belong to anything in the project.
    InstanceName
}

impl InstanceName {
    /// Derives the instance name for a job: `"{prefix}-{job_id}"`.
    ///
    /// This is the idempotency key of the fleet. Every redelivery of the same
    /// `queued` event maps to the same name, so the provider's uniqueness
    /// constraint rejects the duplicate create.
    pub fn for_job(prefix: &InstancePrefix, job_id: JobId) -> Self {
        Self(format!("{prefix}-{job_id}"))
    }
}

string_id! {
    /// A Compute Engine zone (e.g. `"europe-west1-b"`).
    ZoneName
}

impl ZoneName {
    /// Extracts the zone from either a bare zone name or a resource URL such
    /// as `https://.../projects/p/zones/europe-west1-b`.
    pub fn from_resource(value: &str) -> Option<Self> {
        let last = value.trim_end_matches('/').rsplit('/').next().unwrap_or(value);
        Self::new(last)
    }
}

string_id! {
    /// A runner label declared by a job's `runs-on` (e.g. `"self-hosted"`).
    RunnerLabel
}

#[cfg(test)]
#[path = "identifiers_tests.rs"]
mod tests;
