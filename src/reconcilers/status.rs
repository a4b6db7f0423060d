// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status condition helpers for `VaultServer` resources.
//!
//! Everything here is a pure function over [`VaultServerStatus`]. The reconciler
//! and the health monitor build status mutators out of these helpers and hand
//! them to `ClusterClient::update_status`, which re-applies them against the
//! latest persisted status on every optimistic-concurrency retry.
//!
//! # Condition Format
//!
//! Kubernetes conditions follow a standard format:
//! - `type`: The aspect of the resource being reported (e.g., "Failure", "Unsealed")
//! - `status`: "True", "False", or "Unknown"
//! - `reason`: A programmatic identifier (CamelCase)
//! - `message`: A human-readable explanation
//! - `lastTransitionTime`: RFC3339 timestamp when the condition changed
//!
//! # Example
//!
//! ```rust,no_run
//! use vault_operator::reconcilers::status::create_condition;
//!
//! let condition = create_condition(
//!     "Failure",
//!     "True",
//!     "FailedToCreateVaultConfig",
//!     "configmaps is forbidden"
//! );
//! ```

use crate::crd::{Condition, VaultServer, VaultServerStatus};
use crate::status_reasons::{
    is_monitor_condition, CONDITION_STATUS_TRUE, CONDITION_TYPE_FAILURE,
};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

/// Number of hex characters of the spec hash kept in the fingerprint
const FINGERPRINT_HASH_LEN: usize = 16;

/// Create a new Kubernetes condition with the current timestamp.
///
/// # Example
///
/// ```rust,no_run
/// # use vault_operator::reconcilers::status::create_condition;
/// let condition = create_condition("Unsealed", "True", "AllUnsealed", "3 of 3 pods unsealed");
/// assert_eq!(condition.r#type, "Unsealed");
/// assert_eq!(condition.status, "True");
/// ```
#[must_use]
pub fn create_condition(
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) -> Condition {
    Condition {
        r#type: condition_type.to_string(),
        status: status.to_string(),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        last_transition_time: Some(Utc::now().to_rfc3339()),
    }
}

/// Check if a condition has changed compared to an existing one.
///
/// A condition is considered changed if its type, status, reason or message
/// differ. `lastTransitionTime` is not compared.
#[must_use]
pub fn condition_changed(existing: Option<&Condition>, new_condition: &Condition) -> bool {
    existing.is_none_or(|current| {
        current.r#type != new_condition.r#type
            || current.status != new_condition.status
            || current.reason != new_condition.reason
            || current.message != new_condition.message
    })
}

/// Find a condition by type in a list of conditions.
#[must_use]
pub fn find_condition<'a>(
    conditions: &'a [Condition],
    condition_type: &str,
) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == condition_type)
}

/// Insert or replace a condition by type, in memory.
///
/// The existing `lastTransitionTime` is kept when status and reason are unchanged,
/// so rewriting an identical condition leaves the list byte-identical.
pub fn set_condition(conditions: &mut Vec<Condition>, mut new_condition: Condition) {
    match conditions
        .iter_mut()
        .find(|c| c.r#type == new_condition.r#type)
    {
        Some(existing) => {
            if existing.status == new_condition.status && existing.reason == new_condition.reason
            {
                new_condition
                    .last_transition_time
                    .clone_from(&existing.last_transition_time);
            }
            *existing = new_condition;
        }
        None => conditions.push(new_condition),
    }
}

/// Status after a failed reconcile step.
///
/// Every reconciler-owned condition is replaced by a single `Failure` condition.
/// Monitor-owned conditions and fields are left untouched.
#[must_use]
pub fn failure_status(mut status: VaultServerStatus, reason: &str, message: &str) -> VaultServerStatus {
    let previous = find_condition(&status.conditions, CONDITION_TYPE_FAILURE).cloned();
    status
        .conditions
        .retain(|c| is_monitor_condition(&c.r#type));

    let mut failure = create_condition(CONDITION_TYPE_FAILURE, CONDITION_STATUS_TRUE, reason, message);
    if let Some(previous) = previous {
        if previous.status == failure.status && previous.reason == failure.reason {
            failure.last_transition_time = previous.last_transition_time;
        }
    }
    status.conditions.push(failure);
    status
}

/// Status after a fully converged pass.
///
/// Reconciler-owned conditions are cleared and the fingerprint is recorded.
#[must_use]
pub fn converged_status(mut status: VaultServerStatus, fingerprint: &str) -> VaultServerStatus {
    status
        .conditions
        .retain(|c| is_monitor_condition(&c.r#type));
    status.observed_generation = Some(fingerprint.to_string());
    status
}

/// Observed-generation fingerprint: `<generation>$<spec hash prefix>`.
///
/// The hash covers the serialized spec, so it changes whenever the spec does
/// even if the generation is not bumped.
#[must_use]
pub fn fingerprint(vs: &VaultServer) -> String {
    let generation = vs.metadata.generation.unwrap_or_default();
    let spec = serde_json::to_vec(&vs.spec).unwrap_or_default();
    let digest = Sha256::digest(&spec);
    let mut hash = String::with_capacity(FINGERPRINT_HASH_LEN);
    for byte in digest.iter().take(FINGERPRINT_HASH_LEN / 2) {
        let _ = write!(hash, "{byte:02x}");
    }
    format!("{generation}${hash}")
}

/// Whether the recorded fingerprint matches the current spec.
#[must_use]
pub fn is_converged(vs: &VaultServer) -> bool {
    vs.status
        .as_ref()
        .and_then(|s| s.observed_generation.as_deref())
        == Some(fingerprint(vs).as_str())
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod status_tests;
