// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cluster access seam.
//!
//! Reconciliation and health monitoring only talk to the API server through
//! [`ClusterClient`]. The production implementation, [`KubeClusterClient`],
//! wraps a `kube::Client`; tests use an in-memory fake.
//!
//! # Write Semantics
//!
//! - [`ClusterClient::create_or_patch`] reads the live object, runs the caller's
//!   mutator, and writes only if the result differs. Updates carry the live
//!   `resourceVersion`, so a concurrent writer causes a 409 instead of a lost update.
//! - [`ClusterClient::update_status`] re-reads the latest `VaultServer` and
//!   re-applies the status mutator on every conflict, up to
//!   [`STATUS_UPDATE_MAX_CONFLICTS`] attempts.

use crate::constants::{FIELD_MANAGER, STATUS_UPDATE_MAX_CONFLICTS};
use crate::crd::{VaultServer, VaultServerStatus};
use crate::reconcilers::retry::{conflict_backoff, is_conflict, retry_api_call};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::core::NamespaceResourceScope;
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt::Debug;
use tracing::{debug, info, warn};

/// Namespaced resource kinds the operator converges.
pub trait ManagedResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Default
    + Send
    + Sync
    + 'static
{
}

impl<T> ManagedResource for T where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Default
        + Send
        + Sync
        + 'static
{
}

/// What a `create_or_patch` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpVerb {
    Created,
    Patched,
    Unchanged,
}

impl OpVerb {
    /// Metrics/log label for the verb.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Patched => "patched",
            Self::Unchanged => "unchanged",
        }
    }
}

/// Operations the operator needs from the API server.
#[async_trait]
pub trait ClusterClient: Send + Sync + 'static {
    /// Get a namespaced object, `None` if it does not exist.
    async fn get<K: ManagedResource>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K>, kube::Error>;

    /// Create the object from `K::default()` or patch the live one.
    ///
    /// `mutate` receives the live object (or a default one carrying only name and
    /// namespace) and returns the desired merged object.
    async fn create_or_patch<K, F>(
        &self,
        namespace: &str,
        name: &str,
        mutate: F,
    ) -> Result<(K, OpVerb), kube::Error>
    where
        K: ManagedResource,
        F: FnOnce(K) -> K + Send + 'static;

    /// Read-modify-write of the `VaultServer` status.
    ///
    /// `mutate` maps the latest persisted status to the desired one. It may run
    /// several times. No write happens when it returns the status unchanged.
    async fn update_status<F>(&self, vs: &VaultServer, mutate: F) -> Result<VaultServer, kube::Error>
    where
        F: Fn(VaultServerStatus) -> VaultServerStatus + Send + Sync + 'static;

    /// List pods in `namespace` matching every label in `selector`.
    async fn list_pods(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>, kube::Error>;
}

/// Render a label map as a label selector string.
#[must_use]
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// [`ClusterClient`] backed by a `kube::Client`.
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get<K: ManagedResource>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<K>, kube::Error> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let operation = format!("get {} {namespace}/{name}", K::kind(&()));
        retry_api_call(|| api.get_opt(name), &operation).await
    }

    async fn create_or_patch<K, F>(
        &self,
        namespace: &str,
        name: &str,
        mutate: F,
    ) -> Result<(K, OpVerb), kube::Error>
    where
        K: ManagedResource,
        F: FnOnce(K) -> K + Send + 'static,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        let kind = K::kind(&());
        let operation = format!("get {kind} {namespace}/{name}");

        match retry_api_call(|| api.get_opt(name), &operation).await? {
            None => {
                debug!(%kind, %namespace, %name, "Resource does not exist, creating");
                let mut fresh = K::default();
                fresh.meta_mut().name = Some(name.to_string());
                fresh.meta_mut().namespace = Some(namespace.to_string());
                let desired = mutate(fresh);
                let created = api.create(&Self::post_params(), &desired).await?;
                info!("Created {} {}/{}", kind, namespace, name);
                Ok((created, OpVerb::Created))
            }
            Some(live) => {
                let before = serde_json::to_value(&live).map_err(kube::Error::SerdeError)?;
                let desired = mutate(live);
                let after = serde_json::to_value(&desired).map_err(kube::Error::SerdeError)?;
                if before == after {
                    debug!(%kind, %namespace, %name, "Resource already converged");
                    return Ok((desired, OpVerb::Unchanged));
                }
                let replaced = api.replace(name, &Self::post_params(), &desired).await?;
                info!("Patched {} {}/{}", kind, namespace, name);
                Ok((replaced, OpVerb::Patched))
            }
        }
    }

    async fn update_status<F>(&self, vs: &VaultServer, mutate: F) -> Result<VaultServer, kube::Error>
    where
        F: Fn(VaultServerStatus) -> VaultServerStatus + Send + Sync + 'static,
    {
        let namespace = vs.namespace().unwrap_or_default();
        let name = vs.name_any();
        let api: Api<VaultServer> = Api::namespaced(self.client.clone(), &namespace);
        let mut backoff = conflict_backoff();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let latest = api.get(&name).await?;
            let current = latest.status.clone().unwrap_or_default();
            let desired = mutate(current.clone());
            if desired == current {
                debug!(%namespace, %name, "Status unchanged, skipping update");
                return Ok(latest);
            }

            let status = status_merge_patch(&current, &desired).map_err(kube::Error::SerdeError)?;
            let patch = json!({
                "metadata": { "resourceVersion": latest.resource_version() },
                "status": status,
            });
            let params = PatchParams {
                field_manager: Some(FIELD_MANAGER.to_string()),
                ..Default::default()
            };
            match api.patch_status(&name, &params, &Patch::Merge(&patch)).await {
                Ok(updated) => return Ok(updated),
                Err(e) if is_conflict(&e) && attempt < STATUS_UPDATE_MAX_CONFLICTS => {
                    let delay = backoff.next_backoff().unwrap_or_default();
                    warn!(
                        %namespace,
                        %name,
                        attempt,
                        retry_after = ?delay,
                        "Status update conflicted, re-reading latest status"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>, kube::Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(&label_selector(selector));
        let operation = format!("list pods in {namespace}");
        let pods = retry_api_call(|| api.list(&params), &operation).await?;
        Ok(pods.items)
    }
}

/// JSON merge patch (RFC 7386) turning `current` into `desired`.
///
/// Fields dropped from `desired` are sent as explicit `null`s; unchanged
/// fields are left out.
///
/// # Errors
///
/// Returns an error if either status fails to serialize.
pub fn status_merge_patch(
    current: &VaultServerStatus,
    desired: &VaultServerStatus,
) -> Result<Value, serde_json::Error> {
    Ok(merge_diff(
        &serde_json::to_value(current)?,
        &serde_json::to_value(desired)?,
    ))
}

fn merge_diff(current: &Value, desired: &Value) -> Value {
    let (Value::Object(current), Value::Object(desired)) = (current, desired) else {
        return desired.clone();
    };
    let mut patch = Map::new();
    for key in current.keys().filter(|k| !desired.contains_key(*k)) {
        patch.insert(key.clone(), Value::Null);
    }
    for (key, value) in desired {
        match current.get(key) {
            Some(old) if old == value => {}
            Some(old) if old.is_object() && value.is_object() => {
                patch.insert(key.clone(), merge_diff(old, value));
            }
            _ => {
                patch.insert(key.clone(), value.clone());
            }
        }
    }
    Value::Object(patch)
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod client_tests;
