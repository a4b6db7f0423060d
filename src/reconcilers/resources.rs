// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Convergence of dependent resources.
//!
//! One `ensure_*` operation per dependent kind. Each goes through
//! [`ClusterClient::create_or_patch`] with a mutator built from a pure `merge_*`
//! function, so the merge policy can be tested without a cluster.
//!
//! # Merge Policy
//!
//! - **Metadata**: labels and annotations are merged; keys the operator does not
//!   set are preserved. The `VaultServer` owner reference is inserted if absent.
//! - **Structure**: replicas, selectors, pod templates, volumes, ports, data and
//!   RBAC rules are overwritten from the desired descriptor.
//! - **API-assigned fields**: service `clusterIP` and node ports already assigned
//!   by the API server are kept when the desired descriptor leaves them unset.
//!
//! # Example
//!
//! ```rust,no_run
//! use vault_operator::client::KubeClusterClient;
//! use vault_operator::crd::VaultServer;
//! use vault_operator::reconcilers::resources::ensure_config_map;
//! use k8s_openapi::api::core::v1::ConfigMap;
//!
//! async fn example(
//!     client: &KubeClusterClient,
//!     vs: &VaultServer,
//!     cm: ConfigMap,
//! ) -> Result<(), vault_operator::errors::ConvergeError> {
//!     ensure_config_map(client, vs, cm).await?;
//!     Ok(())
//! }
//! ```

use crate::client::{ClusterClient, ManagedResource};
use crate::crd::VaultServer;
use crate::errors::ConvergeError;
use crate::metrics;
use crate::vault_resources::build_owner_reference;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use std::collections::BTreeMap;
use tracing::debug;

/// Merge desired metadata into live metadata.
///
/// Labels and annotations are unioned with desired values winning on key
/// collisions. The owner reference is added unless one with the same UID
/// exists. A reference left behind by an earlier object of the same name, or
/// any other controller reference, is replaced: only one owner may be the
/// controller.
pub fn merge_metadata(live: &mut ObjectMeta, desired: &ObjectMeta, owner: &OwnerReference) {
    merge_string_map(&mut live.labels, desired.labels.as_ref());
    merge_string_map(&mut live.annotations, desired.annotations.as_ref());

    let owners = live.owner_references.get_or_insert_with(Vec::new);
    if owners.iter().any(|o| o.uid == owner.uid) {
        return;
    }
    let is_controller = owner.controller == Some(true);
    owners.retain(|o| {
        let same_parent =
            o.kind == owner.kind && o.api_version == owner.api_version && o.name == owner.name;
        !same_parent && !(is_controller && o.controller == Some(true))
    });
    owners.push(owner.clone());
}

fn merge_string_map(
    live: &mut Option<BTreeMap<String, String>>,
    desired: Option<&BTreeMap<String, String>>,
) {
    if let Some(desired) = desired.filter(|d| !d.is_empty()) {
        live.get_or_insert_with(BTreeMap::new)
            .extend(desired.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
}

/// Overwrite secret payload. The type is only set on creation (it is immutable).
pub fn merge_secret(live: &mut Secret, desired: &Secret) {
    if live.type_.is_none() {
        live.type_.clone_from(&desired.type_);
    }
    live.data.clone_from(&desired.data);
    live.string_data.clone_from(&desired.string_data);
}

pub fn merge_config_map(live: &mut ConfigMap, desired: &ConfigMap) {
    live.data.clone_from(&desired.data);
    live.binary_data.clone_from(&desired.binary_data);
}

pub fn merge_service_account(live: &mut ServiceAccount, desired: &ServiceAccount) {
    if desired.automount_service_account_token.is_some() {
        live.automount_service_account_token = desired.automount_service_account_token;
    }
}

/// Overwrite replicas, selector and pod template.
///
/// Template labels and annotations are merged like object metadata. Other
/// deployment spec fields (strategy, revision history) keep their live values.
pub fn merge_deployment(live: &mut Deployment, desired: &Deployment) {
    let Some(desired_spec) = desired.spec.as_ref() else {
        return;
    };
    let spec = live.spec.get_or_insert_with(Default::default);
    spec.replicas = desired_spec.replicas;
    spec.selector = desired_spec.selector.clone();

    let live_meta = spec.template.metadata.take().unwrap_or_default();
    let mut template = desired_spec.template.clone();
    let mut meta = template.metadata.take().unwrap_or_default();
    let mut labels = live_meta.labels;
    merge_string_map(&mut labels, meta.labels.as_ref());
    let mut annotations = live_meta.annotations;
    merge_string_map(&mut annotations, meta.annotations.as_ref());
    meta.labels = labels;
    meta.annotations = annotations;
    template.metadata = Some(meta);
    spec.template = template;
}

/// Overwrite service structure while keeping API-assigned addresses and node ports.
pub fn merge_service(live: &mut Service, desired: &Service) {
    let Some(desired_spec) = desired.spec.as_ref() else {
        return;
    };
    let live_spec = live.spec.take().unwrap_or_default();
    let mut spec = desired_spec.clone();

    if spec.cluster_ip.is_none() {
        spec.cluster_ip = live_spec.cluster_ip;
        spec.cluster_ips = live_spec.cluster_ips;
    }
    if spec.ip_families.is_none() {
        spec.ip_families = live_spec.ip_families;
        spec.ip_family_policy = live_spec.ip_family_policy;
    }
    if spec.health_check_node_port.is_none() {
        spec.health_check_node_port = live_spec.health_check_node_port;
    }
    if let (Some(ports), Some(live_ports)) = (spec.ports.as_mut(), live_spec.ports.as_ref()) {
        for port in ports.iter_mut().filter(|p| p.node_port.is_none()) {
            port.node_port = live_ports
                .iter()
                .find(|lp| lp.name == port.name)
                .and_then(|lp| lp.node_port);
        }
    }
    live.spec = Some(spec);
}

pub fn merge_role(live: &mut Role, desired: &Role) {
    live.rules.clone_from(&desired.rules);
}

pub fn merge_role_binding(live: &mut RoleBinding, desired: &RoleBinding) {
    live.role_ref = desired.role_ref.clone();
    live.subjects.clone_from(&desired.subjects);
}

/// Create or patch `desired`, owned by `owner`, using `merge` for the structure.
async fn ensure<C, K>(
    client: &C,
    owner: &VaultServer,
    desired: K,
    merge: fn(&mut K, &K),
) -> Result<K, ConvergeError>
where
    C: ClusterClient,
    K: ManagedResource + k8s_openapi::Resource,
{
    let namespace = desired.meta().namespace.clone().unwrap_or_default();
    let name = desired.meta().name.clone().unwrap_or_default();
    let owner_ref = build_owner_reference(owner);

    debug!(kind = K::KIND, %namespace, %name, "Converging dependent resource");
    let (object, verb) = client
        .create_or_patch(&namespace, &name, move |mut live: K| {
            merge(&mut live, &desired);
            merge_metadata(live.meta_mut(), desired.meta(), &owner_ref);
            live
        })
        .await
        .map_err(|source| ConvergeError {
            kind: K::KIND,
            namespace: namespace.clone(),
            name: name.clone(),
            source,
        })?;

    metrics::record_resource_converged(K::KIND, verb.as_str());
    debug!(kind = K::KIND, %namespace, %name, verb = verb.as_str(), "Dependent resource converged");
    Ok(object)
}

/// Converge a TLS `Secret`.
///
/// # Errors
///
/// Returns a [`ConvergeError`] carrying the API error.
pub async fn ensure_secret<C: ClusterClient>(
    client: &C,
    owner: &VaultServer,
    desired: Secret,
) -> Result<Secret, ConvergeError> {
    ensure(client, owner, desired, merge_secret).await
}

/// Converge the configuration `ConfigMap`.
///
/// # Errors
///
/// Returns a [`ConvergeError`] carrying the API error.
pub async fn ensure_config_map<C: ClusterClient>(
    client: &C,
    owner: &VaultServer,
    desired: ConfigMap,
) -> Result<ConfigMap, ConvergeError> {
    ensure(client, owner, desired, merge_config_map).await
}

/// Converge the Vault `ServiceAccount`.
///
/// # Errors
///
/// Returns a [`ConvergeError`] carrying the API error.
pub async fn ensure_service_account<C: ClusterClient>(
    client: &C,
    owner: &VaultServer,
    desired: ServiceAccount,
) -> Result<ServiceAccount, ConvergeError> {
    ensure(client, owner, desired, merge_service_account).await
}

/// Converge the Vault `Deployment`.
///
/// # Errors
///
/// Returns a [`ConvergeError`] carrying the API error.
pub async fn ensure_deployment<C: ClusterClient>(
    client: &C,
    owner: &VaultServer,
    desired: Deployment,
) -> Result<Deployment, ConvergeError> {
    ensure(client, owner, desired, merge_deployment).await
}

/// Converge the Vault `Service`.
///
/// # Errors
///
/// Returns a [`ConvergeError`] carrying the API error.
pub async fn ensure_service<C: ClusterClient>(
    client: &C,
    owner: &VaultServer,
    desired: Service,
) -> Result<Service, ConvergeError> {
    ensure(client, owner, desired, merge_service).await
}

/// Converge a plugin `Role` and its `RoleBinding`, role first.
///
/// # Errors
///
/// Returns a [`ConvergeError`] for whichever of the two failed.
pub async fn ensure_role_and_role_binding<C: ClusterClient>(
    client: &C,
    owner: &VaultServer,
    role: Role,
    binding: RoleBinding,
) -> Result<(), ConvergeError> {
    ensure(client, owner, role, merge_role).await?;
    ensure(client, owner, binding, merge_role_binding).await?;
    Ok(())
}

#[cfg(test)]
#[path = "resources_tests.rs"]
mod resources_tests;
