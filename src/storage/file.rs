// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Filesystem storage on a volume mounted into the Vault container.
//!
//! The volume is backed by the configured `PersistentVolumeClaim`, or by an
//! `emptyDir` when no claim is given.

use crate::constants::CONTAINER_NAME_VAULT;
use crate::crd::FileSpec;
use crate::errors::BuildError;
use crate::plugin::{find_container_mut, hcl_string, upsert_volume, upsert_volume_mount, Plugin};
use k8s_openapi::api::core::v1::{
    EmptyDirVolumeSource, PersistentVolumeClaimVolumeSource, PodTemplateSpec, Volume, VolumeMount,
};

/// Volume holding Vault file storage
pub const VOLUME_FILE_STORAGE: &str = "vault-file-storage";

#[derive(Debug, Clone)]
pub struct FileStorage {
    path: String,
    volume_claim_name: Option<String>,
}

impl FileStorage {
    /// # Errors
    ///
    /// Returns [`BuildError::InvalidPluginConfig`] if `path` is not absolute.
    pub fn new(spec: &FileSpec) -> Result<Self, BuildError> {
        if !spec.path.starts_with('/') {
            return Err(BuildError::InvalidPluginConfig {
                plugin: "file".to_string(),
                reason: format!("path '{}' must be absolute", spec.path),
            });
        }
        Ok(Self {
            path: spec.path.clone(),
            volume_claim_name: spec.volume_claim_name.clone(),
        })
    }

    fn volume(&self) -> Volume {
        match &self.volume_claim_name {
            Some(claim) => Volume {
                name: VOLUME_FILE_STORAGE.to_string(),
                persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                    claim_name: claim.clone(),
                    read_only: Some(false),
                }),
                ..Default::default()
            },
            None => Volume {
                name: VOLUME_FILE_STORAGE.to_string(),
                empty_dir: Some(EmptyDirVolumeSource::default()),
                ..Default::default()
            },
        }
    }
}

impl Plugin for FileStorage {
    fn name(&self) -> &'static str {
        "file"
    }

    fn contribute_config(&self) -> Result<String, BuildError> {
        Ok(format!(
            "storage \"file\" {{\n  path = {}\n}}\n",
            hcl_string(&self.path)
        ))
    }

    fn mutate_pod_template(&self, template: &mut PodTemplateSpec) -> Result<(), BuildError> {
        upsert_volume(template, self.volume());
        let vault = find_container_mut(template, CONTAINER_NAME_VAULT)?;
        upsert_volume_mount(
            vault,
            VolumeMount {
                name: VOLUME_FILE_STORAGE.to_string(),
                mount_path: self.path.clone(),
                ..Default::default()
            },
        );
        Ok(())
    }
}
