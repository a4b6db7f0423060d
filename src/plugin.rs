// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Strategy plugins for storage backends and unsealer modes.
//!
//! A [`VaultPlan`] is selected once per reconcile pass from the `VaultServer`
//! spec. It holds exactly one storage plugin and at most one unsealer plugin.
//! The desired-state builder asks each plugin for:
//!
//! - a Vault configuration fragment ([`Plugin::contribute_config`])
//! - additive changes to the pod template ([`Plugin::mutate_pod_template`])
//! - RBAC rules its container needs ([`Plugin::required_policy_rules`])
//!
//! Plugins never perform I/O.

use crate::crd::VaultServer;
use crate::errors::BuildError;
use crate::{storage, unsealer};
use k8s_openapi::api::core::v1::{Container, EnvVar, PodTemplateSpec, Volume, VolumeMount};
use k8s_openapi::api::rbac::v1::PolicyRule;

/// Capability set shared by storage backends and unsealer modes.
pub trait Plugin: Send + Sync + std::fmt::Debug {
    /// Stable plugin name, used in role names and error messages.
    fn name(&self) -> &'static str;

    /// Vault configuration fragment appended to `vault.hcl`.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::InvalidPluginConfig`] if the plugin's settings cannot be rendered.
    fn contribute_config(&self) -> Result<String, BuildError> {
        Ok(String::new())
    }

    /// Apply additive changes to the pod template.
    ///
    /// Implementations append container arguments or upsert named containers,
    /// volumes, mounts and env vars. They never remove anything.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::ContainerNotFound`] when a container the plugin
    /// targets is not present.
    fn mutate_pod_template(&self, _template: &mut PodTemplateSpec) -> Result<(), BuildError> {
        Ok(())
    }

    /// RBAC rules required in `namespace`. Empty when the plugin needs no API access.
    fn required_policy_rules(&self, _namespace: &str) -> Vec<PolicyRule> {
        Vec::new()
    }
}

/// The plugins selected for one `VaultServer`.
#[derive(Debug)]
pub struct VaultPlan {
    /// Active storage backend
    pub storage: Box<dyn Plugin>,
    /// Active unsealer mode, if an unsealer is configured
    pub unsealer: Option<Box<dyn Plugin>>,
}

impl VaultPlan {
    /// Select plugins from the spec discriminants.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] when no backend is selected, when more than one
    /// backend or unsealer mode is populated, or when a selected variant is invalid.
    pub fn from_spec(vs: &VaultServer) -> Result<Self, BuildError> {
        let storage = storage::from_spec(&vs.spec.backend)?;
        let unsealer = vs
            .spec
            .unsealer
            .as_ref()
            .map(unsealer::from_spec)
            .transpose()?;
        Ok(Self { storage, unsealer })
    }

    /// Plugins in application order: storage first, then the unsealer.
    pub fn plugins(&self) -> impl Iterator<Item = &dyn Plugin> {
        std::iter::once(self.storage.as_ref()).chain(self.unsealer.as_deref())
    }
}

/// Find a container by name in a pod template.
///
/// # Errors
///
/// Returns [`BuildError::ContainerNotFound`] if the template has no such container.
pub fn find_container_mut<'a>(
    template: &'a mut PodTemplateSpec,
    name: &str,
) -> Result<&'a mut Container, BuildError> {
    template
        .spec
        .as_mut()
        .and_then(|spec| spec.containers.iter_mut().find(|c| c.name == name))
        .ok_or_else(|| BuildError::ContainerNotFound {
            container: name.to_string(),
        })
}

/// Append arguments to a container, skipping any already present.
pub fn append_args<I>(container: &mut Container, args: I)
where
    I: IntoIterator<Item = String>,
{
    let existing = container.args.get_or_insert_with(Vec::new);
    for arg in args {
        if !existing.contains(&arg) {
            existing.push(arg);
        }
    }
}

/// Insert or replace a volume by name.
pub fn upsert_volume(template: &mut PodTemplateSpec, volume: Volume) {
    let volumes = template
        .spec
        .get_or_insert_with(Default::default)
        .volumes
        .get_or_insert_with(Vec::new);
    match volumes.iter_mut().find(|v| v.name == volume.name) {
        Some(existing) => *existing = volume,
        None => volumes.push(volume),
    }
}

/// Insert or replace a volume mount by name.
pub fn upsert_volume_mount(container: &mut Container, mount: VolumeMount) {
    let mounts = container.volume_mounts.get_or_insert_with(Vec::new);
    match mounts.iter_mut().find(|m| m.name == mount.name) {
        Some(existing) => *existing = mount,
        None => mounts.push(mount),
    }
}

/// Insert or replace an environment variable by name.
pub fn upsert_env(container: &mut Container, var: EnvVar) {
    let env = container.env.get_or_insert_with(Vec::new);
    match env.iter_mut().find(|e| e.name == var.name) {
        Some(existing) => *existing = var,
        None => env.push(var),
    }
}

/// Quote a string as an HCL string literal.
#[must_use]
pub fn hcl_string(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

#[cfg(test)]
#[path = "plugin_tests.rs"]
mod plugin_tests;
