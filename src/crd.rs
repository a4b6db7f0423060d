// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definition for managed Vault servers.
//!
//! This module defines the `VaultServer` custom resource used by the operator
//! to declare the desired state of one clustered HashiCorp Vault deployment.
//!
//! # Resource Types
//!
//! - [`VaultServer`] - A Vault server deployment with its storage backend,
//!   unsealer strategy, TLS policy, and pod/service overrides
//!
//! # Example: Declaring a Vault server
//!
//! ```rust,no_run
//! use vault_operator::crd::{
//!     BackendStorageSpec, InmemSpec, KubernetesSecretSpec, ModeSpec, UnsealerSpec,
//!     VaultServerSpec,
//! };
//!
//! let spec = VaultServerSpec {
//!     replicas: Some(1),
//!     version: "1.15.4".to_string(),
//!     image: None,
//!     backend: BackendStorageSpec {
//!         inmem: Some(InmemSpec::default()),
//!         ..Default::default()
//!     },
//!     unsealer: Some(UnsealerSpec {
//!         mode: ModeSpec {
//!             kubernetes_secret: Some(KubernetesSecretSpec {
//!                 secret_name: "vault-1-keys".to_string(),
//!             }),
//!             ..Default::default()
//!         },
//!         ..Default::default()
//!     }),
//!     tls: None,
//!     pod_template: None,
//!     service_template: None,
//! };
//! ```

use crate::constants::{
    DEFAULT_REPLICAS, DEFAULT_SECRET_SHARES, DEFAULT_SECRET_THRESHOLD, KIND_VAULT_SERVER,
};
use crate::labels::{
    APP_NAME_VAULT, COMPONENT_VAULT_SERVER, K8S_COMPONENT, K8S_INSTANCE, K8S_MANAGED_BY,
    K8S_NAME, K8S_PART_OF, MANAGED_BY_VAULT_OPERATOR, PART_OF_KUBEVAULT, VAULT_SERVER_LABEL,
};
use k8s_openapi::api::core::v1::{
    Affinity, PodSecurityContext, ResourceRequirements, ServiceSpec, Toleration,
};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Condition represents an observation of a resource's current state.
///
/// Conditions are used in status subresources to communicate the state of
/// a resource to users and controllers.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition. The reconciler reports `Failure`; the health monitor reports `Unsealed`.
    pub r#type: String,

    /// Status of the condition: True, False, or Unknown.
    pub status: String,

    /// Brief CamelCase reason for the condition's last transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message indicating details about the transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the condition transitioned from one status to another (RFC3339 format).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// `VaultServer` represents one clustered Vault deployment managed by the operator.
///
/// For each `VaultServer` the operator converges a TLS `Secret`, a configuration
/// `ConfigMap`, a `ServiceAccount`, a `Deployment`, a `Service`, and the RBAC
/// `Role`/`RoleBinding` pairs required by the selected unsealer.
///
/// # Example
///
/// ```yaml
/// apiVersion: kubevault.com/v1alpha1
/// kind: VaultServer
/// metadata:
///   name: vault-1
///   namespace: vault-system
/// spec:
///   replicas: 1
///   version: "1.15.4"
///   backend:
///     inmem: {}
///   unsealer:
///     secretShares: 5
///     secretThreshold: 3
///     mode:
///       kubernetesSecret:
///         secretName: vault-1-keys
/// ```
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "kubevault.com",
    version = "v1alpha1",
    kind = "VaultServer",
    namespaced,
    shortname = "vs",
    doc = "VaultServer declares a HashiCorp Vault deployment. The operator converges its TLS material, configuration, workload, service, and unsealer RBAC, and monitors the seal status of its pods."
)]
#[kube(status = "VaultServerStatus")]
#[kube(printcolumn = r#"{"name":"Replicas","type":"integer","jsonPath":".spec.replicas"}"#)]
#[kube(printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#)]
#[kube(printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#)]
#[serde(rename_all = "camelCase")]
pub struct VaultServerSpec {
    /// Number of Vault pods. Defaults to 1.
    #[serde(default)]
    #[schemars(range(min = 0, max = 100))]
    pub replicas: Option<i32>,

    /// Vault version, used as the image tag of the default Vault image.
    ///
    /// Example: "1.15.4"
    pub version: String,

    /// Full Vault image reference. Overrides the image derived from `version`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Storage backend. Exactly one backend must be configured.
    pub backend: BackendStorageSpec,

    /// Unsealer sidecar configuration. No unsealer is deployed when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsealer: Option<UnsealerSpec>,

    /// TLS policy for the Vault listener.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsPolicy>,

    /// Pod template overrides applied on top of the generated pod template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_template: Option<PodTemplateOverrides>,

    /// Service overrides applied on top of the generated `Service`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_template: Option<ServiceTemplate>,
}

/// Storage backend selection. The populated field selects the backend.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackendStorageSpec {
    /// In-memory storage. Data is lost when the pod restarts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inmem: Option<InmemSpec>,

    /// Filesystem storage on a volume mounted into the Vault container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileSpec>,

    /// etcd (v3 API) storage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etcd: Option<EtcdSpec>,
}

/// In-memory storage backend (no options).
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
pub struct InmemSpec {}

/// Filesystem storage backend.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileSpec {
    /// Absolute directory Vault stores its data in.
    pub path: String,

    /// `PersistentVolumeClaim` backing `path`. An `emptyDir` is used when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_claim_name: Option<String>,
}

/// etcd storage backend.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EtcdSpec {
    /// Comma-separated list of etcd endpoints.
    ///
    /// Example: "<https://etcd-0.etcd:2379>"
    pub address: String,

    /// Key prefix Vault stores its data under. Defaults to "/vault/".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// `Secret` holding `ca.crt`, `client.crt` and `client.key` for etcd client TLS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_secret_name: Option<String>,
}

/// Unsealer sidecar configuration.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UnsealerSpec {
    /// Number of key shares generated when Vault is initialized. Defaults to 5.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_shares: Option<i64>,

    /// Number of key shares required to unseal. Defaults to 3.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_threshold: Option<i64>,

    /// Overwrite previously stored unseal keys and root token.
    #[serde(default)]
    pub overwrite_existing: bool,

    /// Store the root token alongside the unseal keys.
    #[serde(default)]
    pub store_root_token: bool,

    /// Where unseal keys are stored. Exactly one mode must be configured.
    pub mode: ModeSpec,
}

impl UnsealerSpec {
    /// Key shares with the default applied.
    #[must_use]
    pub fn secret_shares(&self) -> i64 {
        self.secret_shares.unwrap_or(DEFAULT_SECRET_SHARES)
    }

    /// Unseal threshold with the default applied.
    #[must_use]
    pub fn secret_threshold(&self) -> i64 {
        self.secret_threshold.unwrap_or(DEFAULT_SECRET_THRESHOLD)
    }
}

/// Unsealer mode selection. The populated field selects the mode.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ModeSpec {
    /// Store unseal keys in a Kubernetes `Secret`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes_secret: Option<KubernetesSecretSpec>,

    /// Store unseal keys in AWS SSM Parameter Store, encrypted with AWS KMS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_kms_ssm: Option<AwsKmsSsmSpec>,
}

/// Kubernetes `Secret` unsealer mode.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesSecretSpec {
    /// Name of the `Secret` the unseal keys are written to.
    pub secret_name: String,
}

/// AWS KMS + SSM unsealer mode.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AwsKmsSsmSpec {
    /// KMS key used to encrypt the unseal keys.
    pub kms_key_id: String,

    /// Prefix prepended to SSM parameter names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssm_key_prefix: Option<String>,

    /// AWS region of the KMS key and SSM parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// `Secret` with `access_key` and `secret_key` entries. Pod identity is used when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_secret: Option<String>,
}

/// TLS policy for the Vault listener.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TlsPolicy {
    /// Existing `Secret` with `ca.crt`, `server.crt` and `server.key`.
    ///
    /// When set the operator uses it as-is instead of issuing its own certificates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_secret: Option<String>,
}

/// Pod template overrides. Each set field replaces the generated value for that field only.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodTemplateOverrides {
    /// Extra annotations added to the pod template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,

    /// Node selector for Vault pods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,

    /// Tolerations for Vault pods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerations: Option<Vec<Toleration>>,

    /// Affinity rules for Vault pods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,

    /// Pod-level security context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<PodSecurityContext>,

    /// Image pull policy applied to every operator-managed container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,

    /// Names of image pull secrets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_secrets: Option<Vec<String>>,

    /// Scheduler name for Vault pods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler_name: Option<String>,

    /// Priority class name for Vault pods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_class_name: Option<String>,

    /// Pod priority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,

    /// Compute resources for the Vault container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
}

/// Service overrides for the generated Vault `Service`.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTemplate {
    /// Annotations added to the `Service`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,

    /// Partial `ServiceSpec` merged field-by-field onto the generated spec.
    ///
    /// The selector is never overridden.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<ServiceSpec>,
}

/// Seal status of the Vault pods as observed by the health monitor.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VaultStatus {
    /// Pod currently serving as the active node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<String>,

    /// Pods running in standby mode.
    #[serde(default)]
    pub standby: Vec<String>,

    /// Pods that are sealed.
    #[serde(default)]
    pub sealed: Vec<String>,

    /// Pods that are unsealed.
    #[serde(default)]
    pub unsealed: Vec<String>,
}

/// `VaultServer` status
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VaultServerStatus {
    /// Conditions. `Failure` is written by the reconciler, `Unsealed` by the health monitor.
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Fingerprint `<generation>$<spec hash>` of the last fully converged spec.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<String>,

    /// Phase reported by the health monitor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    /// Whether at least one pod reported Vault as initialized.
    #[serde(default)]
    pub initialized: bool,

    /// Name of the `Service` fronting the Vault pods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,

    /// Client port exposed by the `Service`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_port: Option<i32>,

    /// Per-pod seal status.
    #[serde(default)]
    pub vault_status: VaultStatus,
}

impl VaultServer {
    /// Reconciliation key `namespace/name`, shared by the work queue and the monitor registry.
    #[must_use]
    pub fn key(&self) -> String {
        format!(
            "{}/{}",
            self.namespace().unwrap_or_default(),
            self.name_any()
        )
    }

    /// Replica count with the default applied.
    #[must_use]
    pub fn replicas(&self) -> i32 {
        self.spec.replicas.unwrap_or(DEFAULT_REPLICAS)
    }

    /// Labels selecting this server's pods.
    #[must_use]
    pub fn selector_labels(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert(K8S_NAME.into(), APP_NAME_VAULT.into());
        labels.insert(VAULT_SERVER_LABEL.into(), self.name_any());
        labels
    }

    /// Labels put on every dependent resource.
    #[must_use]
    pub fn offshoot_labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.selector_labels();
        labels.insert(K8S_INSTANCE.into(), self.name_any());
        labels.insert(K8S_COMPONENT.into(), COMPONENT_VAULT_SERVER.into());
        labels.insert(K8S_MANAGED_BY.into(), MANAGED_BY_VAULT_OPERATOR.into());
        labels.insert(K8S_PART_OF.into(), PART_OF_KUBEVAULT.into());
        labels
    }

    /// Name of the TLS `Secret` mounted into the Vault container.
    #[must_use]
    pub fn tls_secret_name(&self) -> String {
        self.spec
            .tls
            .as_ref()
            .and_then(|tls| tls.tls_secret.clone())
            .unwrap_or_else(|| format!("{}-vault-tls", self.name_any()))
    }

    /// Whether the TLS `Secret` is supplied by the user rather than issued by the operator.
    #[must_use]
    pub fn uses_external_tls(&self) -> bool {
        self.spec
            .tls
            .as_ref()
            .is_some_and(|tls| tls.tls_secret.is_some())
    }

    /// Name of the Vault configuration `ConfigMap`.
    #[must_use]
    pub fn config_map_name(&self) -> String {
        format!("{}-vault-config", self.name_any())
    }

    /// Name of the `ServiceAccount` the Vault pods run as.
    #[must_use]
    pub fn service_account_name(&self) -> String {
        self.name_any()
    }

    /// Human-readable identity used in logs and errors.
    #[must_use]
    pub fn display_identity(&self) -> String {
        format!("{KIND_VAULT_SERVER} {}", self.key())
    }
}
