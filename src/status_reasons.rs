// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Standard Kubernetes status condition types and reasons for `VaultServer` resources.
//!
//! Reasons are programmatic identifiers in CamelCase that explain why a condition has
//! a particular status.
//!
//! # Condition Ownership
//!
//! Two writers touch `status.conditions`, and each owns a disjoint set of types:
//!
//! - **Reconciler** → `type: Failure`, written when a reconcile step fails and
//!   removed once a pass fully converges
//! - **Health monitor** → `type: Unsealed`, rewritten on every poll
//!
//! Each writer replaces only the types it owns, so neither clobbers the other.
//!
//! # Example Status
//!
//! ```yaml
//! status:
//!   conditions:
//!     - type: Failure
//!       status: "True"
//!       reason: FailedToCreateVaultConfig
//!       message: "ConfigMap vault-system/vault-1-vault-config: forbidden"
//!     - type: Unsealed
//!       status: "False"
//!       reason: SomeSealed
//!       message: "1 of 3 pods sealed"
//! ```

// ============================================================================
// Condition Types
// ============================================================================

/// Condition type written by the reconciler when a step fails.
pub const CONDITION_TYPE_FAILURE: &str = "Failure";

/// Condition type written by the health monitor.
pub const CONDITION_TYPE_UNSEALED: &str = "Unsealed";

/// Condition status values.
pub const CONDITION_STATUS_TRUE: &str = "True";
pub const CONDITION_STATUS_FALSE: &str = "False";
pub const CONDITION_STATUS_UNKNOWN: &str = "Unknown";

// ============================================================================
// Reconciler Reasons
// ============================================================================

/// The spec could not be turned into a deployment plan.
///
/// Raised when no storage backend is selected, when more than one backend or
/// unsealer mode is populated, or when a selected variant is malformed.
pub const REASON_INVALID_SPEC: &str = "InvalidVaultServerSpec";

/// The TLS `Secret` could not be issued, found, or converged.
pub const REASON_FAILED_TLS_SECRET: &str = "FailedToCreateVaultTLSSecret";

/// The Vault configuration `ConfigMap` could not be converged.
pub const REASON_FAILED_CONFIG: &str = "FailedToCreateVaultConfig";

/// One of the workload resources could not be converged.
///
/// Covers the `ServiceAccount`, `Deployment`, `Service`, and unsealer RBAC.
pub const REASON_FAILED_DEPLOY: &str = "FailedToDeployVault";

// ============================================================================
// Health Monitor Reasons
// ============================================================================

/// Every running pod reports Vault unsealed.
pub const REASON_ALL_UNSEALED: &str = "AllUnsealed";

/// At least one running pod reports Vault sealed.
pub const REASON_SOME_SEALED: &str = "SomeSealed";

/// No running pod reports Vault initialized.
///
/// The unsealer sidecar initializes Vault on first start; this is expected
/// briefly after creation.
pub const REASON_NOT_INITIALIZED: &str = "NotInitialized";

/// The workload has no running pods to probe.
pub const REASON_NO_RUNNING_PODS: &str = "NoRunningPods";

/// Pods could not be listed or probed.
pub const REASON_HEALTH_CHECK_FAILED: &str = "HealthCheckFailed";

/// Whether a condition type is written by the health monitor.
///
/// The reconciler preserves these types untouched when it rewrites its own conditions.
#[must_use]
pub fn is_monitor_condition(condition_type: &str) -> bool {
    condition_type == CONDITION_TYPE_UNSEALED
}

#[cfg(test)]
#[path = "status_reasons_tests.rs"]
mod status_reasons_tests;
