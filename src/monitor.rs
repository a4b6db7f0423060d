// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Per-`VaultServer` health monitoring.
//!
//! - [`MonitorRegistry`] owns one cancellable task per reconciliation key. The
//!   reconciler starts monitors, the dispatcher stops them; the tasks never touch
//!   the registry themselves.
//! - [`HealthMonitor`] polls the running Vault pods through a [`SealStatusProbe`]
//!   and publishes the seal state into the `VaultServer` status. It only writes
//!   monitor-owned fields and the `Unsealed` condition.

use crate::client::ClusterClient;
use crate::constants::{
    HEALTH_PROBE_TIMEOUT_SECS, PHASE_RUNNING, TLS_CA_CERT_KEY, VAULT_CLIENT_PORT,
};
use crate::crd::{VaultServer, VaultServerStatus, VaultStatus};
use crate::errors::{ObservationError, ProbeError};
use crate::metrics;
use crate::reconcilers::status::{create_condition, set_condition};
use crate::status_reasons::{
    CONDITION_STATUS_FALSE, CONDITION_STATUS_TRUE, CONDITION_STATUS_UNKNOWN,
    CONDITION_TYPE_UNSEALED, REASON_ALL_UNSEALED, REASON_HEALTH_CHECK_FAILED,
    REASON_NOT_INITIALIZED, REASON_NO_RUNNING_PODS, REASON_SOME_SEALED,
};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use serde::Deserialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ============================================================================
// Registry
// ============================================================================

struct MonitorHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Table of live health monitor tasks, keyed by `namespace/name`.
///
/// At most one live task exists per key. Every task runs with a child of the
/// registry's root token, so [`MonitorRegistry::shutdown`] stops all of them.
pub struct MonitorRegistry {
    root: CancellationToken,
    monitors: Mutex<HashMap<String, MonitorHandle>>,
}

impl Default for MonitorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MonitorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorRegistry")
            .field("monitors", &self.len())
            .finish_non_exhaustive()
    }
}

impl MonitorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
            monitors: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, MonitorHandle>> {
        self.monitors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a monitor for `key` unless a live one already exists.
    ///
    /// `start` receives the task's cancellation token and returns the monitor
    /// future. Returns `true` if a new task was spawned. A finished task left
    /// behind in the table is replaced.
    pub fn ensure_started<F, Fut>(&self, key: &str, start: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut monitors = self.lock();
        if monitors.get(key).is_some_and(|m| !m.task.is_finished()) {
            debug!(key, "Health monitor already running");
            return false;
        }

        let token = self.root.child_token();
        let task = tokio::spawn(start(token.clone()));
        monitors.insert(key.to_string(), MonitorHandle { token, task });
        metrics::set_active_monitors(monitors.len());
        info!(key, "Started health monitor");
        true
    }

    /// Cancel and remove the monitor for `key`.
    ///
    /// Returns `false` if no monitor was registered, which is not an error.
    pub fn stop(&self, key: &str) -> bool {
        let mut monitors = self.lock();
        let Some(handle) = monitors.remove(key) else {
            debug!(key, "No health monitor to stop");
            return false;
        };
        handle.token.cancel();
        metrics::set_active_monitors(monitors.len());
        info!(key, "Stopped health monitor");
        true
    }

    /// Whether a live (not yet finished) monitor exists for `key`.
    #[must_use]
    pub fn is_running(&self, key: &str) -> bool {
        self.lock().get(key).is_some_and(|m| !m.task.is_finished())
    }

    /// Number of registered monitors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancel every monitor and wait for the tasks to finish.
    pub async fn shutdown(&self) {
        self.root.cancel();
        let handles: Vec<MonitorHandle> = self.lock().drain().map(|(_, h)| h).collect();
        metrics::set_active_monitors(0);
        for handle in handles {
            if let Err(e) = handle.task.await {
                warn!(error = %e, "Health monitor task ended abnormally");
            }
        }
    }
}

// ============================================================================
// Seal status probing
// ============================================================================

/// Seal state reported by one Vault node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SealStatus {
    pub initialized: bool,
    pub sealed: bool,
    #[serde(default)]
    pub standby: bool,
}

/// One pod to probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    pub pod_name: String,
    pub pod_ip: String,
    pub namespace: String,
    /// PEM bundle of the CA that signed the Vault server certificate
    pub ca_pem: String,
}

/// Reads the seal state of a single Vault node.
#[async_trait]
pub trait SealStatusProbe: Send + Sync + std::fmt::Debug {
    async fn probe(&self, target: &ProbeTarget) -> Result<SealStatus, ProbeError>;
}

/// Query string that makes `/v1/sys/health` answer 200 in every seal state.
const HEALTH_QUERY: &str = "standbyok=true&sealedcode=200&uninitcode=200&perfstandbyok=true";

/// [`SealStatusProbe`] that calls Vault's health endpoint over HTTP(S).
///
/// In production the pod is addressed through its `<dashed-ip>.<ns>.pod` DNS
/// name, which the issued server certificate covers.
#[derive(Debug, Clone)]
pub struct HttpSealProbe {
    scheme: &'static str,
    port: u16,
    timeout: Duration,
    pod_dns: bool,
}

impl Default for HttpSealProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpSealProbe {
    /// HTTPS probe on the Vault client port, trusting the per-server CA.
    #[must_use]
    pub fn new() -> Self {
        Self {
            scheme: "https",
            port: VAULT_CLIENT_PORT,
            timeout: Duration::from_secs(HEALTH_PROBE_TIMEOUT_SECS),
            pod_dns: true,
        }
    }

    /// Plain HTTP probe addressing the pod IP directly on `port`.
    #[must_use]
    pub fn plain_http(port: u16) -> Self {
        Self {
            scheme: "http",
            port,
            timeout: Duration::from_secs(HEALTH_PROBE_TIMEOUT_SECS),
            pod_dns: false,
        }
    }

    /// Health URL for `target`.
    #[must_use]
    pub fn health_url(&self, target: &ProbeTarget) -> String {
        let host = if self.pod_dns {
            format!("{}.{}.pod", target.pod_ip.replace('.', "-"), target.namespace)
        } else {
            target.pod_ip.clone()
        };
        format!(
            "{}://{host}:{}/v1/sys/health?{HEALTH_QUERY}",
            self.scheme, self.port
        )
    }

    fn client(&self, target: &ProbeTarget) -> Result<reqwest::Client, ProbeError> {
        let mut builder = reqwest::Client::builder().timeout(self.timeout);
        if self.scheme == "https" {
            let ca = reqwest::Certificate::from_pem(target.ca_pem.as_bytes())
                .map_err(ProbeError::InvalidCa)?;
            builder = builder.add_root_certificate(ca);
        }
        builder.build().map_err(ProbeError::Client)
    }
}

#[async_trait]
impl SealStatusProbe for HttpSealProbe {
    async fn probe(&self, target: &ProbeTarget) -> Result<SealStatus, ProbeError> {
        let url = self.health_url(target);
        let client = self.client(target)?;
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|source| ProbeError::Request {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::UnexpectedStatus {
                url,
                status: status.as_u16(),
            });
        }

        response
            .json::<SealStatus>()
            .await
            .map_err(|source| ProbeError::Request { url, source })
    }
}

// ============================================================================
// Monitor task
// ============================================================================

/// Seal state of a whole `VaultServer`, as published into its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub vault_status: VaultStatus,
    pub initialized: bool,
    pub unsealed: crate::crd::Condition,
}

/// Background poller for one `VaultServer`.
pub struct HealthMonitor<C: ClusterClient> {
    client: Arc<C>,
    probe: Arc<dyn SealStatusProbe>,
    vs: VaultServer,
    interval: Duration,
}

impl<C: ClusterClient> HealthMonitor<C> {
    #[must_use]
    pub fn new(
        client: Arc<C>,
        probe: Arc<dyn SealStatusProbe>,
        vs: VaultServer,
        interval: Duration,
    ) -> Self {
        Self {
            client,
            probe,
            vs,
            interval,
        }
    }

    /// Poll until `token` is cancelled.
    pub async fn run(self, token: CancellationToken) {
        let key = self.vs.key();
        debug!(key = %key, interval = ?self.interval, "Health monitor loop started");
        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {}
            }
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                () = self.tick() => {}
            }
        }
        debug!(key = %key, "Health monitor loop exited");
    }

    async fn tick(&self) {
        if let Err(e) = self.observe_once().await {
            warn!(key = %self.vs.key(), error = %e, "Failed to publish Vault health status");
        }
    }

    /// Run one observation and publish it.
    ///
    /// Observation failures are published as an `Unsealed` condition with
    /// status `Unknown`; they are never returned.
    ///
    /// # Errors
    ///
    /// Returns the API error if the status cannot be written.
    pub async fn observe_once(&self) -> Result<(), kube::Error> {
        let observation = match self.observe().await {
            Ok(observation) => observation,
            Err(e) => {
                warn!(key = %self.vs.key(), error = %e, "Vault health observation failed");
                Observation {
                    vault_status: VaultStatus::default(),
                    initialized: false,
                    unsealed: create_condition(
                        CONDITION_TYPE_UNSEALED,
                        CONDITION_STATUS_UNKNOWN,
                        REASON_HEALTH_CHECK_FAILED,
                        &e.to_string(),
                    ),
                }
            }
        };
        self.publish(observation).await
    }

    /// Probe every running pod and summarize the seal state.
    ///
    /// # Errors
    ///
    /// Returns an [`ObservationError`] if pods cannot be listed, the CA bundle
    /// cannot be read, or every probe fails.
    pub async fn observe(&self) -> Result<Observation, ObservationError> {
        let namespace = self.vs.namespace().unwrap_or_default();
        let pods = self
            .client
            .list_pods(&namespace, &self.vs.selector_labels())
            .await
            .map_err(ObservationError::ListPods)?;

        let running: Vec<(String, String)> = pods
            .iter()
            .filter(|p| {
                p.metadata.deletion_timestamp.is_none()
                    && p.status.as_ref().and_then(|s| s.phase.as_deref()) == Some("Running")
            })
            .filter_map(|p| {
                let ip = p.status.as_ref()?.pod_ip.clone()?;
                Some((p.name_any(), ip))
            })
            .collect();

        if running.is_empty() {
            return Ok(Observation {
                vault_status: VaultStatus::default(),
                initialized: false,
                unsealed: create_condition(
                    CONDITION_TYPE_UNSEALED,
                    CONDITION_STATUS_FALSE,
                    REASON_NO_RUNNING_PODS,
                    "no running Vault pods",
                ),
            });
        }

        let ca_pem = self.ca_bundle(&namespace).await?;
        let mut results = Vec::with_capacity(running.len());
        let mut last_error = None;
        for (pod_name, pod_ip) in running.iter().cloned() {
            let target = ProbeTarget {
                pod_name,
                pod_ip,
                namespace: namespace.clone(),
                ca_pem: ca_pem.clone(),
            };
            match self.probe.probe(&target).await {
                Ok(seal) => {
                    metrics::record_seal_probe(if seal.sealed { "sealed" } else { "unsealed" });
                    results.push((target.pod_name, seal));
                }
                Err(e) => {
                    debug!(pod = %target.pod_name, error = %e, "Seal status probe failed");
                    metrics::record_seal_probe("error");
                    last_error = Some(e);
                }
            }
        }

        if results.is_empty() {
            if let Some(last) = last_error {
                return Err(ObservationError::AllProbesFailed {
                    count: running.len(),
                    last,
                });
            }
        }

        Ok(summarize(&results))
    }

    async fn ca_bundle(&self, namespace: &str) -> Result<String, ObservationError> {
        let secret_name = self.vs.tls_secret_name();
        let secret: Secret = self
            .client
            .get(namespace, &secret_name)
            .await
            .map_err(|e| ObservationError::CaBundle(e.to_string()))?
            .ok_or_else(|| {
                ObservationError::CaBundle(format!("secret {namespace}/{secret_name} not found"))
            })?;
        secret
            .data
            .as_ref()
            .and_then(|d| d.get(TLS_CA_CERT_KEY))
            .and_then(|v| String::from_utf8(v.0.clone()).ok())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ObservationError::CaBundle(format!(
                    "secret {namespace}/{secret_name} has no {TLS_CA_CERT_KEY}"
                ))
            })
    }

    async fn publish(&self, observation: Observation) -> Result<(), kube::Error> {
        let service_name = self.vs.name_any();
        self.client
            .update_status(&self.vs, move |status| {
                apply_observation(status, &observation, &service_name)
            })
            .await?;
        Ok(())
    }
}

/// Write an observation into the monitor-owned part of a status.
#[must_use]
pub fn apply_observation(
    mut status: VaultServerStatus,
    observation: &Observation,
    service_name: &str,
) -> VaultServerStatus {
    status.vault_status = observation.vault_status.clone();
    status.initialized = observation.initialized;
    status.phase = Some(PHASE_RUNNING.to_string());
    status.service_name = Some(service_name.to_string());
    status.client_port = Some(i32::from(VAULT_CLIENT_PORT));
    set_condition(&mut status.conditions, observation.unsealed.clone());
    status
}

/// Summarize per-pod seal states. Pod lists are sorted by name.
#[must_use]
pub fn summarize(results: &[(String, SealStatus)]) -> Observation {
    let mut sorted: Vec<&(String, SealStatus)> = results.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut vault_status = VaultStatus::default();
    for (pod, seal) in sorted {
        if seal.sealed {
            vault_status.sealed.push(pod.clone());
            continue;
        }
        vault_status.unsealed.push(pod.clone());
        if seal.standby {
            vault_status.standby.push(pod.clone());
        } else if seal.initialized && vault_status.active.is_none() {
            vault_status.active = Some(pod.clone());
        }
    }

    let initialized = results.iter().any(|(_, s)| s.initialized);
    let total = results.len();
    let unsealed = if !initialized {
        create_condition(
            CONDITION_TYPE_UNSEALED,
            CONDITION_STATUS_FALSE,
            REASON_NOT_INITIALIZED,
            "Vault is not initialized",
        )
    } else if vault_status.sealed.is_empty() {
        create_condition(
            CONDITION_TYPE_UNSEALED,
            CONDITION_STATUS_TRUE,
            REASON_ALL_UNSEALED,
            &format!("{total} of {total} pods unsealed"),
        )
    } else {
        create_condition(
            CONDITION_TYPE_UNSEALED,
            CONDITION_STATUS_FALSE,
            REASON_SOME_SEALED,
            &format!("{} of {total} pods sealed", vault_status.sealed.len()),
        )
    };

    Observation {
        vault_status,
        initialized,
        unsealed,
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod monitor_tests;
