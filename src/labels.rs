// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common label and annotation constants used across all reconcilers.
//!
//! This module defines standard Kubernetes labels and operator-specific labels
//! to ensure consistency across all resources created by the controller.

// ============================================================================
// Kubernetes Standard Labels
// https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
// ============================================================================

/// Standard label for the component name within the architecture
pub const K8S_COMPONENT: &str = "app.kubernetes.io/component";

/// Standard label for the tool being used to manage the operation of an application
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Standard label for the name of the application (e.g., "vault")
pub const K8S_NAME: &str = "app.kubernetes.io/name";

/// Standard label for a unique name identifying the instance of an application
pub const K8S_INSTANCE: &str = "app.kubernetes.io/instance";

/// Standard label for the name of a higher-level application this one is part of
pub const K8S_PART_OF: &str = "app.kubernetes.io/part-of";

// ============================================================================
// Kubernetes Standard Label Values
// ============================================================================

/// Value for `app.kubernetes.io/name`
pub const APP_NAME_VAULT: &str = "vault";

/// Component value for Vault server workloads
pub const COMPONENT_VAULT_SERVER: &str = "vault-server";

/// Value for `app.kubernetes.io/managed-by`
pub const MANAGED_BY_VAULT_OPERATOR: &str = "vault-operator";

/// Value for `app.kubernetes.io/part-of`
pub const PART_OF_KUBEVAULT: &str = "kubevault";

// ============================================================================
// Operator-Specific Labels
// ============================================================================

/// Label carrying the owning `VaultServer` name (used in pod selectors)
pub const VAULT_SERVER_LABEL: &str = "kubevault.com/vault-server";
