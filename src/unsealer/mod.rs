// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unsealer mode plugins.
//!
//! The unsealer sidecar initializes Vault, stores the unseal keys, and unseals
//! the server after every restart. The mode decides where the keys are stored.
//! Mode plugins append their flags to the `vault-unsealer` container and declare
//! any RBAC the sidecar needs.

pub mod aws_kms_ssm;
pub mod kubernetes_secret;

use crate::crd::UnsealerSpec;
use crate::errors::BuildError;
use crate::plugin::Plugin;

/// Select the unsealer plugin for an unsealer spec.
///
/// # Errors
///
/// Returns [`BuildError::MissingUnsealerMode`] when no mode is populated and
/// [`BuildError::MultipleUnsealerModes`] when more than one is.
pub fn from_spec(unsealer: &UnsealerSpec) -> Result<Box<dyn Plugin>, BuildError> {
    let mode = &unsealer.mode;
    match (&mode.kubernetes_secret, &mode.aws_kms_ssm) {
        (Some(k8s), None) => Ok(Box::new(kubernetes_secret::KubernetesSecret::new(k8s)?)),
        (None, Some(aws)) => Ok(Box::new(aws_kms_ssm::AwsKmsSsm::new(aws)?)),
        (None, None) => Err(BuildError::MissingUnsealerMode),
        (Some(_), Some(_)) => Err(BuildError::MultipleUnsealerModes {
            selected: "kubernetesSecret, awsKmsSsm".to_string(),
        }),
    }
}
