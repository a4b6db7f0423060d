// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `VaultServer` reconciliation logic.
//!
//! One pass converges every dependent resource in a fixed order and records the
//! outcome in status:
//!
//! ```text
//! Plan -> Pending -TLS secret-> SecurityReady -config map-> ConfigReady
//!      -service account, deployment, service, RBAC-> Converged
//! ```
//!
//! Any failing step stops the pass. Status then carries a single `Failure`
//! condition whose reason names the step; resources converged by earlier steps
//! are left in place for the next pass to build on. On full success the
//! reconciler-owned conditions are cleared, the spec fingerprint is recorded and
//! a health monitor is started if none is running for the key.

use crate::client::ClusterClient;
use crate::context::Context;
use crate::crd::VaultServer;
use crate::errors::{CertificateError, ConvergeError, ReconcileError, StepError};
use crate::metrics;
use crate::monitor::HealthMonitor;
use crate::pki::{TlsMaterial, TlsRequest};
use crate::plugin::VaultPlan;
use crate::reconcilers::resources::{
    ensure_config_map, ensure_deployment, ensure_role_and_role_binding, ensure_secret,
    ensure_service, ensure_service_account,
};
use crate::reconcilers::status::{converged_status, failure_status, fingerprint, is_converged};
use crate::status_reasons::{
    REASON_FAILED_CONFIG, REASON_FAILED_DEPLOY, REASON_FAILED_TLS_SECRET, REASON_INVALID_SPEC,
};
use crate::vault_resources::{DesiredState, DesiredStateBuilder};
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

const RESOURCE_TYPE: &str = "VaultServer";

/// A step of the reconcile pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileStep {
    /// Strategy selection and descriptor building
    Plan,
    /// TLS secret
    TlsSecret,
    /// Vault configuration `ConfigMap`
    Config,
    /// Service account, deployment, service and RBAC
    Deploy,
}

impl ReconcileStep {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::TlsSecret => "tls-secret",
            Self::Config => "config",
            Self::Deploy => "deploy",
        }
    }

    /// Reason recorded on the `Failure` condition when this step fails.
    #[must_use]
    pub fn failure_reason(self) -> &'static str {
        match self {
            Self::Plan => REASON_INVALID_SPEC,
            Self::TlsSecret => REASON_FAILED_TLS_SECRET,
            Self::Config => REASON_FAILED_CONFIG,
            Self::Deploy => REASON_FAILED_DEPLOY,
        }
    }
}

impl std::fmt::Display for ReconcileStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of a reconcile pass once the plan has been built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending,
    SecurityReady,
    ConfigReady,
    Converged,
}

impl Stage {
    /// The step that moves this stage forward, `None` once converged.
    #[must_use]
    pub fn next_step(self) -> Option<ReconcileStep> {
        match self {
            Self::Pending => Some(ReconcileStep::TlsSecret),
            Self::SecurityReady => Some(ReconcileStep::Config),
            Self::ConfigReady => Some(ReconcileStep::Deploy),
            Self::Converged => None,
        }
    }

    /// The stage reached after `next_step` succeeds.
    #[must_use]
    pub fn advance(self) -> Self {
        match self {
            Self::Pending => Self::SecurityReady,
            Self::SecurityReady => Self::ConfigReady,
            Self::ConfigReady | Self::Converged => Self::Converged,
        }
    }
}

/// Reconcile one `VaultServer`.
///
/// `vs` is a private copy; the cached object is never mutated.
///
/// # Errors
///
/// Returns [`ReconcileError::Step`] when a step fails (after recording it in
/// status) or [`ReconcileError::StatusUpdate`] when status cannot be written.
pub async fn reconcile_vault_server<C: ClusterClient>(
    ctx: &Arc<Context<C>>,
    vs: VaultServer,
) -> Result<(), ReconcileError> {
    let start = Instant::now();
    let key = vs.key();
    info!("Reconciling VaultServer: {}", key);
    if is_converged(&vs) {
        debug!(key = %key, "Spec unchanged since last convergence, checking for drift");
    }

    let result = run_pipeline(ctx, &vs).await;
    match &result {
        Ok(()) => {
            metrics::record_reconciliation_success(RESOURCE_TYPE, start.elapsed());
            info!("Successfully reconciled VaultServer: {}", key);
        }
        Err(e) => {
            metrics::record_reconciliation_error(RESOURCE_TYPE, start.elapsed());
            metrics::record_error(RESOURCE_TYPE, e.error_type());
            error!("Failed to reconcile VaultServer {}: {}", key, e);
        }
    }
    result
}

async fn run_pipeline<C: ClusterClient>(
    ctx: &Arc<Context<C>>,
    vs: &VaultServer,
) -> Result<(), ReconcileError> {
    let plan = match VaultPlan::from_spec(vs) {
        Ok(plan) => plan,
        Err(e) => return fail(ctx, vs, ReconcileStep::Plan, e.into()).await,
    };
    let builder = match DesiredStateBuilder::new(vs, &plan, &ctx.images) {
        Ok(builder) => builder,
        Err(e) => return fail(ctx, vs, ReconcileStep::Plan, e.into()).await,
    };
    let desired = match builder.build_all() {
        Ok(desired) => desired,
        Err(e) => return fail(ctx, vs, ReconcileStep::Plan, e.into()).await,
    };

    let mut stage = Stage::Pending;
    while let Some(step) = stage.next_step() {
        debug!(key = %vs.key(), ?stage, %step, "Running reconcile step");
        let outcome = match step {
            ReconcileStep::TlsSecret => converge_tls(ctx, vs, &builder).await,
            ReconcileStep::Config => converge_config(ctx, vs, &desired).await,
            ReconcileStep::Deploy => converge_workload(ctx, vs, &desired).await,
            ReconcileStep::Plan => Ok(()),
        };
        if let Err(source) = outcome {
            return fail(ctx, vs, step, source).await;
        }
        stage = stage.advance();
    }

    succeed(ctx, vs).await
}

async fn converge_tls<C: ClusterClient>(
    ctx: &Context<C>,
    vs: &VaultServer,
    builder: &DesiredStateBuilder<'_>,
) -> Result<(), StepError> {
    let namespace = vs.namespace().unwrap_or_default();
    let name = vs.tls_secret_name();
    let existing: Option<Secret> =
        ctx.client
            .get(&namespace, &name)
            .await
            .map_err(|source| ConvergeError {
                kind: "Secret",
                namespace: namespace.clone(),
                name: name.clone(),
                source,
            })?;

    if vs.uses_external_tls() {
        let secret = existing.ok_or_else(|| CertificateError::SecretNotFound {
            namespace: namespace.clone(),
            name: name.clone(),
        })?;
        TlsMaterial::from_secret_data(secret.data.as_ref()).map_err(|key| {
            CertificateError::MissingKey {
                namespace,
                name,
                key,
            }
        })?;
        debug!(key = %vs.key(), "Using user-supplied TLS secret");
        return Ok(());
    }

    let reusable = existing
        .as_ref()
        .and_then(|s| TlsMaterial::from_secret_data(s.data.as_ref()).ok());
    let material = match reusable {
        Some(material) => material,
        None => {
            info!(key = %vs.key(), secret = %name, "Issuing TLS material for VaultServer");
            ctx.issuer.issue(&TlsRequest {
                name: vs.name_any(),
                namespace: namespace.clone(),
            })?
        }
    };

    ensure_secret(ctx.client.as_ref(), vs, builder.build_tls_secret(&material)).await?;
    Ok(())
}

async fn converge_config<C: ClusterClient>(
    ctx: &Context<C>,
    vs: &VaultServer,
    desired: &DesiredState,
) -> Result<(), StepError> {
    ensure_config_map(ctx.client.as_ref(), vs, desired.config_map.clone()).await?;
    Ok(())
}

async fn converge_workload<C: ClusterClient>(
    ctx: &Context<C>,
    vs: &VaultServer,
    desired: &DesiredState,
) -> Result<(), StepError> {
    let client = ctx.client.as_ref();
    ensure_service_account(client, vs, desired.service_account.clone()).await?;
    ensure_deployment(client, vs, desired.deployment.clone()).await?;
    ensure_service(client, vs, desired.service.clone()).await?;
    for (role, binding) in &desired.rbac {
        ensure_role_and_role_binding(client, vs, role.clone(), binding.clone()).await?;
    }
    Ok(())
}

/// Record a failed step in status and build the error to return.
async fn fail<C: ClusterClient>(
    ctx: &Context<C>,
    vs: &VaultServer,
    step: ReconcileStep,
    source: StepError,
) -> Result<(), ReconcileError> {
    let key = vs.key();
    let reason = step.failure_reason();
    let message = source.to_string();
    let failure = ReconcileError::Step {
        step,
        key: key.clone(),
        source,
    };

    match ctx
        .client
        .update_status(vs, move |status| failure_status(status, reason, &message))
        .await
    {
        Ok(_) => Err(failure),
        Err(status_err) => {
            warn!(key = %key, error = %status_err, "Failed to record reconcile failure in status");
            Err(ReconcileError::StatusUpdate {
                key,
                source: status_err,
                cause: Some(Box::new(failure)),
            })
        }
    }
}

/// Record convergence and make sure a health monitor is running.
async fn succeed<C: ClusterClient>(
    ctx: &Context<C>,
    vs: &VaultServer,
) -> Result<(), ReconcileError> {
    let key = vs.key();
    let fingerprint = fingerprint(vs);
    ctx.client
        .update_status(vs, move |status| converged_status(status, &fingerprint))
        .await
        .map_err(|source| ReconcileError::StatusUpdate {
            key: key.clone(),
            source,
            cause: None,
        })?;

    let monitor = HealthMonitor::new(
        Arc::clone(&ctx.client),
        Arc::clone(&ctx.probe),
        vs.clone(),
        ctx.monitor_interval,
    );
    ctx.registry
        .ensure_started(&key, move |token| monitor.run(token));
    Ok(())
}

#[cfg(test)]
#[path = "vaultserver_tests.rs"]
mod vaultserver_tests;
