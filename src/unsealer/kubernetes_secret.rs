// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Store unseal keys and the root token in a Kubernetes `Secret`.
//!
//! The sidecar writes the secret itself, so it needs create/get/update/patch
//! on secrets in the server's namespace.

use crate::constants::CONTAINER_NAME_UNSEALER;
use crate::crd::KubernetesSecretSpec;
use crate::errors::BuildError;
use crate::plugin::{append_args, find_container_mut, Plugin};
use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::api::rbac::v1::PolicyRule;

pub const MODE_KUBERNETES_SECRET: &str = "kubernetes-secret";

#[derive(Debug, Clone)]
pub struct KubernetesSecret {
    secret_name: String,
}

impl KubernetesSecret {
    /// # Errors
    ///
    /// Returns [`BuildError::InvalidPluginConfig`] if no secret name is given.
    pub fn new(spec: &KubernetesSecretSpec) -> Result<Self, BuildError> {
        if spec.secret_name.is_empty() {
            return Err(BuildError::InvalidPluginConfig {
                plugin: MODE_KUBERNETES_SECRET.to_string(),
                reason: "secretName must not be empty".to_string(),
            });
        }
        Ok(Self {
            secret_name: spec.secret_name.clone(),
        })
    }
}

impl Plugin for KubernetesSecret {
    fn name(&self) -> &'static str {
        MODE_KUBERNETES_SECRET
    }

    fn mutate_pod_template(&self, template: &mut PodTemplateSpec) -> Result<(), BuildError> {
        let unsealer = find_container_mut(template, CONTAINER_NAME_UNSEALER)?;
        append_args(
            unsealer,
            [
                format!("--mode={MODE_KUBERNETES_SECRET}"),
                format!("--k8s.secret-name={}", self.secret_name),
            ],
        );
        Ok(())
    }

    fn required_policy_rules(&self, _namespace: &str) -> Vec<PolicyRule> {
        vec![PolicyRule {
            api_groups: Some(vec![String::new()]),
            resources: Some(vec!["secrets".to_string()]),
            verbs: ["create", "get", "update", "patch"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            ..Default::default()
        }]
    }
}
