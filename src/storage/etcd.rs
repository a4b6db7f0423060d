// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! etcd (v3 API) storage with optional client TLS.

use crate::constants::CONTAINER_NAME_VAULT;
use crate::crd::EtcdSpec;
use crate::errors::BuildError;
use crate::plugin::{find_container_mut, hcl_string, upsert_volume, upsert_volume_mount, Plugin};
use k8s_openapi::api::core::v1::{PodTemplateSpec, SecretVolumeSource, Volume, VolumeMount};
use std::fmt::Write as _;

/// Volume holding etcd client TLS material
pub const VOLUME_ETCD_TLS: &str = "vault-etcd-tls";

/// Mount path of the etcd client TLS secret
pub const ETCD_TLS_PATH: &str = "/etc/vault/storage/etcd/tls";

const DEFAULT_ETCD_PATH: &str = "/vault/";

#[derive(Debug, Clone)]
pub struct EtcdStorage {
    address: String,
    path: String,
    tls_secret_name: Option<String>,
}

impl EtcdStorage {
    /// # Errors
    ///
    /// Returns [`BuildError::InvalidPluginConfig`] if no address is given.
    pub fn new(spec: &EtcdSpec) -> Result<Self, BuildError> {
        if spec.address.trim().is_empty() {
            return Err(BuildError::InvalidPluginConfig {
                plugin: "etcd".to_string(),
                reason: "address must not be empty".to_string(),
            });
        }
        Ok(Self {
            address: spec.address.clone(),
            path: spec
                .path
                .clone()
                .unwrap_or_else(|| DEFAULT_ETCD_PATH.to_string()),
            tls_secret_name: spec.tls_secret_name.clone(),
        })
    }
}

impl Plugin for EtcdStorage {
    fn name(&self) -> &'static str {
        "etcd"
    }

    fn contribute_config(&self) -> Result<String, BuildError> {
        let mut config = String::from("storage \"etcd\" {\n");
        let _ = writeln!(config, "  address = {}", hcl_string(&self.address));
        config.push_str("  etcd_api = \"v3\"\n");
        let _ = writeln!(config, "  path = {}", hcl_string(&self.path));
        config.push_str("  ha_enabled = \"true\"\n");
        if self.tls_secret_name.is_some() {
            let _ = writeln!(config, "  tls_ca_file = \"{ETCD_TLS_PATH}/ca.crt\"");
            let _ = writeln!(config, "  tls_cert_file = \"{ETCD_TLS_PATH}/client.crt\"");
            let _ = writeln!(config, "  tls_key_file = \"{ETCD_TLS_PATH}/client.key\"");
        }
        config.push_str("}\n");
        Ok(config)
    }

    fn mutate_pod_template(&self, template: &mut PodTemplateSpec) -> Result<(), BuildError> {
        let Some(secret_name) = &self.tls_secret_name else {
            return Ok(());
        };
        upsert_volume(
            template,
            Volume {
                name: VOLUME_ETCD_TLS.to_string(),
                secret: Some(SecretVolumeSource {
                    secret_name: Some(secret_name.clone()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        let vault = find_container_mut(template, CONTAINER_NAME_VAULT)?;
        upsert_volume_mount(
            vault,
            VolumeMount {
                name: VOLUME_ETCD_TLS.to_string(),
                mount_path: ETCD_TLS_PATH.to_string(),
                read_only: Some(true),
                ..Default::default()
            },
        );
        Ok(())
    }
}
