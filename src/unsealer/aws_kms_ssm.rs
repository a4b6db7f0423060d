// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Store unseal keys in AWS SSM Parameter Store, encrypted with a KMS key.
//!
//! Credentials come from the referenced secret when given, otherwise from the
//! pod's AWS identity. No Kubernetes API access is needed.

use crate::constants::CONTAINER_NAME_UNSEALER;
use crate::crd::AwsKmsSsmSpec;
use crate::errors::BuildError;
use crate::plugin::{append_args, find_container_mut, upsert_env, Plugin};
use k8s_openapi::api::core::v1::{EnvVar, EnvVarSource, PodTemplateSpec, SecretKeySelector};

pub const MODE_AWS_KMS_SSM: &str = "aws-kms-ssm";

/// Key of the access key id in the credential secret
pub const CREDENTIAL_ACCESS_KEY: &str = "access_key";

/// Key of the secret access key in the credential secret
pub const CREDENTIAL_SECRET_KEY: &str = "secret_key";

#[derive(Debug, Clone)]
pub struct AwsKmsSsm {
    spec: AwsKmsSsmSpec,
}

impl AwsKmsSsm {
    /// # Errors
    ///
    /// Returns [`BuildError::InvalidPluginConfig`] if no KMS key id is given.
    pub fn new(spec: &AwsKmsSsmSpec) -> Result<Self, BuildError> {
        if spec.kms_key_id.is_empty() {
            return Err(BuildError::InvalidPluginConfig {
                plugin: MODE_AWS_KMS_SSM.to_string(),
                reason: "kmsKeyId must not be empty".to_string(),
            });
        }
        Ok(Self { spec: spec.clone() })
    }
}

fn secret_env(name: &str, secret: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.to_string(),
                key: key.to_string(),
                optional: Some(false),
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

impl Plugin for AwsKmsSsm {
    fn name(&self) -> &'static str {
        MODE_AWS_KMS_SSM
    }

    fn mutate_pod_template(&self, template: &mut PodTemplateSpec) -> Result<(), BuildError> {
        let unsealer = find_container_mut(template, CONTAINER_NAME_UNSEALER)?;

        let mut args = vec![
            format!("--mode={MODE_AWS_KMS_SSM}"),
            format!("--aws.kms-key-id={}", self.spec.kms_key_id),
        ];
        if let Some(prefix) = &self.spec.ssm_key_prefix {
            args.push(format!("--aws.ssm-key-prefix={prefix}"));
        }
        append_args(unsealer, args);

        if let Some(region) = &self.spec.region {
            upsert_env(
                unsealer,
                EnvVar {
                    name: "AWS_REGION".to_string(),
                    value: Some(region.clone()),
                    ..Default::default()
                },
            );
        }
        if let Some(secret) = &self.spec.credential_secret {
            upsert_env(
                unsealer,
                secret_env("AWS_ACCESS_KEY_ID", secret, CREDENTIAL_ACCESS_KEY),
            );
            upsert_env(
                unsealer,
                secret_env("AWS_SECRET_ACCESS_KEY", secret, CREDENTIAL_SECRET_KEY),
            );
        }
        Ok(())
    }
}
