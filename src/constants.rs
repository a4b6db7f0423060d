// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the Vault operator.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group for the `VaultServer` CRD
pub const API_GROUP: &str = "kubevault.com";

/// API version for the `VaultServer` CRD
pub const API_VERSION: &str = "v1alpha1";

/// Fully qualified API version (group/version)
pub const API_GROUP_VERSION: &str = "kubevault.com/v1alpha1";

/// Kind name for `VaultServer` resource
pub const KIND_VAULT_SERVER: &str = "VaultServer";

/// Field manager used for every write the operator performs
pub const FIELD_MANAGER: &str = "vault-operator";

// ============================================================================
// Vault Network Constants
// ============================================================================

/// Port the Vault API listens on (TLS)
pub const VAULT_CLIENT_PORT: u16 = 8200;

/// Port used for Vault cluster (request forwarding) traffic
pub const VAULT_CLUSTER_PORT: u16 = 8201;

/// Service port name for client traffic
pub const VAULT_CLIENT_PORT_NAME: &str = "client";

/// Service port name for cluster traffic
pub const VAULT_CLUSTER_PORT_NAME: &str = "cluster";

// ============================================================================
// Container Constants
// ============================================================================

/// Name of the Vault server container
pub const CONTAINER_NAME_VAULT: &str = "vault";

/// Name of the unsealer sidecar container
pub const CONTAINER_NAME_UNSEALER: &str = "vault-unsealer";

/// Default Vault image repository (tag comes from `spec.version`)
pub const DEFAULT_VAULT_IMAGE_REPOSITORY: &str = "hashicorp/vault";

/// Default unsealer sidecar image
pub const DEFAULT_UNSEALER_IMAGE: &str = "kubevault/vault-unsealer:0.2.0";

/// Default image pull policy for operator-managed containers
pub const DEFAULT_IMAGE_PULL_POLICY: &str = "IfNotPresent";

/// Default replica count when `spec.replicas` is not set
pub const DEFAULT_REPLICAS: i32 = 1;

// ============================================================================
// Vault Configuration Paths
// ============================================================================

/// Directory the Vault configuration `ConfigMap` is mounted into
pub const VAULT_CONFIG_PATH: &str = "/etc/vault/config";

/// Key of the Vault configuration file inside the `ConfigMap`
pub const VAULT_CONFIG_FILENAME: &str = "vault.hcl";

/// Directory the TLS `Secret` is mounted into
pub const VAULT_TLS_PATH: &str = "/etc/vault/tls";

/// Volume name for the configuration `ConfigMap`
pub const VOLUME_VAULT_CONFIG: &str = "vault-config";

/// Volume name for the TLS `Secret`
pub const VOLUME_VAULT_TLS: &str = "vault-tls-secret";

// ============================================================================
// TLS Secret Keys
// ============================================================================

/// CA certificate key in the TLS `Secret`
pub const TLS_CA_CERT_KEY: &str = "ca.crt";

/// Server certificate key in the TLS `Secret`
pub const TLS_SERVER_CERT_KEY: &str = "server.crt";

/// Server private key key in the TLS `Secret`
pub const TLS_SERVER_KEY_KEY: &str = "server.key";

/// Common name of the self-signed CA issued for each Vault server
pub const TLS_CA_COMMON_NAME: &str = "vault";

// ============================================================================
// Unsealer Defaults
// ============================================================================

/// Default number of unseal key shares
pub const DEFAULT_SECRET_SHARES: i64 = 5;

/// Default number of shares required to unseal
pub const DEFAULT_SECRET_THRESHOLD: i64 = 3;

/// Interval the unsealer waits between unseal attempts
pub const UNSEALER_RETRY_PERIOD: &str = "10s";

// ============================================================================
// Controller Timing Constants
// ============================================================================

/// Default number of concurrent reconcile workers
pub const DEFAULT_WORKERS: usize = 2;

/// Default number of times a failing key is requeued before it is dropped
pub const DEFAULT_MAX_REQUEUES: u32 = 5;

/// Default interval between health monitor polls (seconds)
pub const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 10;

/// Timeout for a single Vault health request (seconds)
pub const HEALTH_PROBE_TIMEOUT_SECS: u64 = 5;

/// Maximum number of conflicting status writes retried before giving up
pub const STATUS_UPDATE_MAX_CONFLICTS: u32 = 5;

/// Default listen address of the health and metrics server
pub const DEFAULT_HEALTH_ADDR: &str = "0.0.0.0:8080";

// ============================================================================
// Status Values
// ============================================================================

/// Status phase published once the health monitor observes the server
pub const PHASE_RUNNING: &str = "Running";
