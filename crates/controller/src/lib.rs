//! Ephemeral runner lifecycle controller.
//!
//! This crate sequences calls between the domain rules in [`fleet`] and the
//! port traits implemented by the infrastructure crates:
//!
//! - [`WebhookRouter`]: authenticates a delivery, applies the label and
//!   allow-list gates, and dispatches `queued`/`completed` jobs.
//! - [`Provisioner`]: creates the one VM a job is entitled to.
//! - [`Terminator`]: deletes a job's VM, treating "already gone" as success.
//! - [`Reaper`]: deletes VMs older than the TTL, one failure at a time.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** Components hold only immutable configuration and
//! `Arc`s to ports, so one instance of each is shared by every request
//! without locking. The provider's instance listing is the only state.

pub mod provisioner;
pub mod reaper;
pub mod router;
pub mod terminator;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use provisioner::Provisioner;
pub use reaper::Reaper;
pub use router::WebhookRouter;
pub use terminator::Terminator;
