// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for the Vault operator.
//!
//! Errors are layered the same way reconciliation is:
//!
//! - [`BuildError`] - the spec cannot be turned into a plan or descriptors
//! - [`CertificateError`] - TLS material could not be issued or is unusable
//! - [`ConvergeError`] - a dependent resource could not be created or patched
//! - [`StepError`] - any of the above, as raised by one pipeline step
//! - [`ReconcileError`] - a step failure or a status persistence failure, tagged
//!   with the failing step and the resource key
//! - [`DispatchError`] - what a queue worker sees for one key
//! - [`ProbeError`] / [`ObservationError`] - health monitor failures, which are
//!   reported as conditions and never reach the reconciler

use crate::reconcilers::vaultserver::ReconcileStep;
use thiserror::Error;

/// Errors raised while selecting plugins or building desired-state descriptors.
///
/// These are fatal for the current reconcile pass. They are reported as a
/// `Failure` condition and the key is requeued like any other failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// No storage backend field is populated.
    #[error("no storage backend selected")]
    MissingBackend,

    /// More than one storage backend field is populated.
    #[error("exactly one storage backend must be selected, found: {selected}")]
    MultipleBackends {
        /// Comma-separated list of the populated backend fields
        selected: String,
    },

    /// The unsealer is configured but no mode field is populated.
    #[error("no unsealer mode selected")]
    MissingUnsealerMode,

    /// More than one unsealer mode field is populated.
    #[error("exactly one unsealer mode must be selected, found: {selected}")]
    MultipleUnsealerModes {
        /// Comma-separated list of the populated mode fields
        selected: String,
    },

    /// A selected plugin has an unusable configuration.
    #[error("invalid {plugin} configuration: {reason}")]
    InvalidPluginConfig {
        /// Plugin name (e.g. `file`, `kubernetes-secret`)
        plugin: String,
        /// What is wrong with the configuration
        reason: String,
    },

    /// A plugin tried to mutate a container that is not in the pod template.
    #[error("container '{container}' not found in pod template")]
    ContainerNotFound {
        /// Name of the missing container
        container: String,
    },

    /// The `VaultServer` has no namespace or name.
    #[error("VaultServer is missing metadata.{field}")]
    MissingMetadata {
        /// `namespace` or `name`
        field: &'static str,
    },
}

/// Errors raised while producing or validating TLS material.
#[derive(Error, Debug)]
pub enum CertificateError {
    /// rcgen failed to generate a key or sign a certificate.
    #[error("failed to generate {what}: {source}")]
    Generation {
        /// What was being generated (e.g. `CA certificate`)
        what: &'static str,
        /// Underlying rcgen error
        #[source]
        source: rcgen::Error,
    },

    /// A user-supplied TLS secret does not exist.
    #[error("TLS secret {namespace}/{name} not found")]
    SecretNotFound {
        /// Secret namespace
        namespace: String,
        /// Secret name
        name: String,
    },

    /// A TLS secret exists but lacks one of the required keys.
    #[error("TLS secret {namespace}/{name} is missing key '{key}'")]
    MissingKey {
        /// Secret namespace
        namespace: String,
        /// Secret name
        name: String,
        /// Missing data key
        key: &'static str,
    },
}

/// Failure to create or patch one dependent resource.
///
/// Carries the resource kind and identity verbatim so the reconciler can
/// surface exactly which object failed and why.
#[derive(Error, Debug)]
#[error("failed to converge {kind} {namespace}/{name}: {source}")]
pub struct ConvergeError {
    /// Kubernetes kind of the dependent resource
    pub kind: &'static str,
    /// Namespace of the dependent resource
    pub namespace: String,
    /// Name of the dependent resource
    pub name: String,
    /// Underlying API error
    #[source]
    pub source: kube::Error,
}

/// Failure of one reconcile pipeline step.
#[derive(Error, Debug)]
pub enum StepError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Certificate(#[from] CertificateError),

    #[error(transparent)]
    Converge(#[from] ConvergeError),
}

/// Errors returned by one reconcile pass.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// A pipeline step failed. The failure was recorded in status.
    #[error("reconcile of {key} failed at step {step}: {source}")]
    Step {
        /// Step that failed
        step: ReconcileStep,
        /// Reconciliation key `namespace/name`
        key: String,
        /// Step failure
        #[source]
        source: StepError,
    },

    /// Writing status back failed.
    ///
    /// When the write was reporting a step failure, that failure is kept in `cause`.
    #[error("failed to update status of {key}: {source}")]
    StatusUpdate {
        /// Reconciliation key `namespace/name`
        key: String,
        /// Underlying API error
        #[source]
        source: kube::Error,
        /// Step failure the status write was reporting, if any
        cause: Option<Box<ReconcileError>>,
    },
}

impl ReconcileError {
    /// Metrics label for the error category.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Step {
                source: StepError::Build(_),
                ..
            } => "build_error",
            Self::Step {
                source: StepError::Certificate(_),
                ..
            } => "certificate_error",
            Self::Step {
                source: StepError::Converge(_),
                ..
            } => "converge_error",
            Self::StatusUpdate { .. } => "status_update_error",
        }
    }

    /// The step that failed, looking through a status update failure to its cause.
    #[must_use]
    pub fn failed_step(&self) -> Option<ReconcileStep> {
        match self {
            Self::Step { step, .. } => Some(*step),
            Self::StatusUpdate { cause, .. } => cause.as_ref().and_then(|c| c.failed_step()),
        }
    }
}

/// Errors returned by the dispatcher for one key.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The key is not of the form `namespace/name`.
    #[error("invalid reconciliation key '{key}': expected namespace/name")]
    InvalidKey {
        /// The offending key
        key: String,
    },

    /// The object cache could not be read.
    #[error("cache lookup for {key} failed: {reason}")]
    Cache {
        /// Reconciliation key
        key: String,
        /// Why the lookup failed
        reason: String,
    },

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

/// Errors from a single Vault health probe.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// The CA certificate could not be loaded into the HTTP client.
    #[error("invalid CA certificate: {0}")]
    InvalidCa(#[source] reqwest::Error),

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// The request failed or timed out.
    #[error("health request to {url} failed: {source}")]
    Request {
        /// Requested URL
        url: String,
        /// Underlying HTTP error
        #[source]
        source: reqwest::Error,
    },

    /// Vault answered with a status code outside its documented health codes.
    #[error("unexpected health response {status} from {url}")]
    UnexpectedStatus {
        /// Requested URL
        url: String,
        /// HTTP status code
        status: u16,
    },
}

/// Errors from one health monitor observation.
///
/// These never propagate to the reconciler. The monitor reports them as an
/// `Unsealed` condition with reason `HealthCheckFailed`.
#[derive(Error, Debug)]
pub enum ObservationError {
    /// Pods could not be listed.
    #[error("failed to list pods: {0}")]
    ListPods(#[source] kube::Error),

    /// The CA bundle could not be read from the TLS secret.
    #[error("failed to read CA bundle: {0}")]
    CaBundle(String),

    /// Every pod probe failed.
    #[error("all {count} pod probes failed, last error: {last}")]
    AllProbesFailed {
        /// Number of probed pods
        count: usize,
        /// Last probe error
        #[source]
        last: ProbeError,
    },
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
