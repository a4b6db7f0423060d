// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Desired-state builders for `VaultServer` dependent resources.
//!
//! Every function here is pure: the same `VaultServer`, plan and image settings
//! always produce identical descriptors. Nothing in this module talks to the
//! API server.
//!
//! Built resources, all owned by the `VaultServer`:
//!
//! - TLS `Secret` (`<name>-vault-tls`, unless the user supplies one)
//! - Configuration `ConfigMap` (`<name>-vault-config`) with `vault.hcl`
//! - `ServiceAccount` (`<name>`)
//! - `Deployment` (`<name>`) running Vault plus the unsealer sidecar
//! - `Service` (`<name>`) exposing the client and cluster ports
//! - One `Role` + `RoleBinding` per plugin that needs API access

use crate::constants::{
    API_GROUP_VERSION, CONTAINER_NAME_UNSEALER, CONTAINER_NAME_VAULT, DEFAULT_IMAGE_PULL_POLICY,
    DEFAULT_VAULT_IMAGE_REPOSITORY, KIND_VAULT_SERVER, TLS_CA_CERT_KEY, TLS_SERVER_CERT_KEY,
    TLS_SERVER_KEY_KEY, UNSEALER_RETRY_PERIOD, VAULT_CLIENT_PORT, VAULT_CLIENT_PORT_NAME,
    VAULT_CLUSTER_PORT, VAULT_CLUSTER_PORT_NAME, VAULT_CONFIG_FILENAME, VAULT_CONFIG_PATH,
    VAULT_TLS_PATH, VOLUME_VAULT_CONFIG, VOLUME_VAULT_TLS,
};
use crate::crd::{PodTemplateOverrides, VaultServer};
use crate::errors::BuildError;
use crate::pki::TlsMaterial;
use crate::plugin::VaultPlan;
use k8s_openapi::api::{
    apps::v1::{Deployment, DeploymentSpec},
    core::v1::{
        Capabilities, ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, EnvVar,
        EnvVarSource, HTTPGetAction, LocalObjectReference, ObjectFieldSelector, PodSpec,
        PodTemplateSpec, Probe, Secret, SecretVolumeSource, SecurityContext, Service,
        ServiceAccount, ServicePort, ServiceSpec, VolumeMount,
    },
    rbac::v1::{Role, RoleBinding, RoleRef, Subject},
};
use k8s_openapi::apimachinery::pkg::{
    apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference},
    util::intstr::IntOrString,
};
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::debug;

const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// Health endpoint used for the readiness probe. Standby and sealed nodes are
/// not ready, so the `Service` only routes to the active node.
const READINESS_PATH: &str = "/v1/sys/health";
const READINESS_PERIOD_SECS: i32 = 10;
const READINESS_TIMEOUT_SECS: i32 = 5;

/// Images used for operator-managed containers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSettings {
    /// Unsealer sidecar image
    pub unsealer_image: String,
}

/// Descriptors for everything except the TLS secret.
///
/// The TLS secret is built separately by [`DesiredStateBuilder::build_tls_secret`]
/// because its content depends on material that may already exist in the cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredState {
    pub config_map: ConfigMap,
    pub service_account: ServiceAccount,
    pub deployment: Deployment,
    pub service: Service,
    pub rbac: Vec<(Role, RoleBinding)>,
}

/// Builds dependent-resource descriptors for one `VaultServer`.
#[derive(Debug)]
pub struct DesiredStateBuilder<'a> {
    vs: &'a VaultServer,
    plan: &'a VaultPlan,
    images: &'a ImageSettings,
    name: String,
    namespace: String,
}

/// Builds the owner reference that ties a dependent resource to its `VaultServer`.
#[must_use]
pub fn build_owner_reference(vs: &VaultServer) -> OwnerReference {
    OwnerReference {
        api_version: API_GROUP_VERSION.to_string(),
        kind: KIND_VAULT_SERVER.to_string(),
        name: vs.name_any(),
        uid: vs.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

impl<'a> DesiredStateBuilder<'a> {
    /// # Errors
    ///
    /// Returns [`BuildError::MissingMetadata`] if the `VaultServer` has no name or namespace.
    pub fn new(
        vs: &'a VaultServer,
        plan: &'a VaultPlan,
        images: &'a ImageSettings,
    ) -> Result<Self, BuildError> {
        let name = vs
            .metadata
            .name
            .clone()
            .ok_or(BuildError::MissingMetadata { field: "name" })?;
        let namespace = vs
            .metadata
            .namespace
            .clone()
            .ok_or(BuildError::MissingMetadata { field: "namespace" })?;
        Ok(Self {
            vs,
            plan,
            images,
            name,
            namespace,
        })
    }

    fn metadata(&self, name: String) -> ObjectMeta {
        ObjectMeta {
            name: Some(name),
            namespace: Some(self.namespace.clone()),
            labels: Some(self.vs.offshoot_labels()),
            owner_references: Some(vec![build_owner_reference(self.vs)]),
            ..Default::default()
        }
    }

    /// Builds every descriptor except the TLS secret.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] if a plugin cannot render its configuration or
    /// mutate the pod template.
    pub fn build_all(&self) -> Result<DesiredState, BuildError> {
        Ok(DesiredState {
            config_map: self.build_config_map()?,
            service_account: self.build_service_account(),
            deployment: self.build_deployment()?,
            service: self.build_service(),
            rbac: self.build_rbac(),
        })
    }

    /// Builds the TLS `Secret` holding `material`.
    #[must_use]
    pub fn build_tls_secret(&self, material: &TlsMaterial) -> Secret {
        Secret {
            metadata: self.metadata(self.vs.tls_secret_name()),
            type_: Some("Opaque".to_string()),
            data: Some(material.to_secret_data()),
            ..Default::default()
        }
    }

    /// Renders `vault.hcl`: the TLS listener followed by the storage stanza.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] if the storage plugin cannot render its configuration.
    pub fn build_vault_config(&self) -> Result<String, BuildError> {
        let listener = format!(
            "listener \"tcp\" {{\n  address = \"0.0.0.0:{VAULT_CLIENT_PORT}\"\n  cluster_address = \"0.0.0.0:{VAULT_CLUSTER_PORT}\"\n  tls_cert_file = \"{VAULT_TLS_PATH}/{TLS_SERVER_CERT_KEY}\"\n  tls_key_file = \"{VAULT_TLS_PATH}/{TLS_SERVER_KEY_KEY}\"\n}}\n"
        );
        let mut config = listener;
        for plugin in self.plan.plugins() {
            let fragment = plugin.contribute_config()?;
            if !fragment.is_empty() {
                config.push('\n');
                config.push_str(&fragment);
            }
        }
        Ok(config)
    }

    /// Builds the configuration `ConfigMap`.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] if the configuration cannot be rendered.
    pub fn build_config_map(&self) -> Result<ConfigMap, BuildError> {
        let mut data = BTreeMap::new();
        data.insert(VAULT_CONFIG_FILENAME.to_string(), self.build_vault_config()?);
        Ok(ConfigMap {
            metadata: self.metadata(self.vs.config_map_name()),
            data: Some(data),
            ..Default::default()
        })
    }

    /// Builds the `ServiceAccount` Vault pods run as.
    #[must_use]
    pub fn build_service_account(&self) -> ServiceAccount {
        ServiceAccount {
            metadata: self.metadata(self.vs.service_account_name()),
            ..Default::default()
        }
    }

    fn vault_image(&self) -> String {
        self.vs.spec.image.clone().unwrap_or_else(|| {
            format!(
                "{DEFAULT_VAULT_IMAGE_REPOSITORY}:{}",
                self.vs.spec.version
            )
        })
    }

    fn vault_container(&self) -> Container {
        let pod_ip_env = EnvVar {
            name: "POD_IP".to_string(),
            value_from: Some(EnvVarSource {
                field_ref: Some(ObjectFieldSelector {
                    field_path: "status.podIP".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        Container {
            name: CONTAINER_NAME_VAULT.to_string(),
            image: Some(self.vault_image()),
            args: Some(vec![
                "server".to_string(),
                format!("-config={VAULT_CONFIG_PATH}/{VAULT_CONFIG_FILENAME}"),
            ]),
            ports: Some(vec![
                ContainerPort {
                    name: Some(VAULT_CLIENT_PORT_NAME.to_string()),
                    container_port: i32::from(VAULT_CLIENT_PORT),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                },
                ContainerPort {
                    name: Some(VAULT_CLUSTER_PORT_NAME.to_string()),
                    container_port: i32::from(VAULT_CLUSTER_PORT),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                },
            ]),
            env: Some(vec![
                pod_ip_env,
                EnvVar {
                    name: "VAULT_API_ADDR".to_string(),
                    value: Some(format!("https://$(POD_IP):{VAULT_CLIENT_PORT}")),
                    ..Default::default()
                },
                EnvVar {
                    name: "VAULT_CLUSTER_ADDR".to_string(),
                    value: Some(format!("https://$(POD_IP):{VAULT_CLUSTER_PORT}")),
                    ..Default::default()
                },
            ]),
            volume_mounts: Some(vec![
                VolumeMount {
                    name: VOLUME_VAULT_CONFIG.to_string(),
                    mount_path: VAULT_CONFIG_PATH.to_string(),
                    read_only: Some(true),
                    ..Default::default()
                },
                VolumeMount {
                    name: VOLUME_VAULT_TLS.to_string(),
                    mount_path: VAULT_TLS_PATH.to_string(),
                    read_only: Some(true),
                    ..Default::default()
                },
            ]),
            readiness_probe: Some(Probe {
                http_get: Some(HTTPGetAction {
                    path: Some(READINESS_PATH.to_string()),
                    port: IntOrString::Int(i32::from(VAULT_CLIENT_PORT)),
                    scheme: Some("HTTPS".to_string()),
                    ..Default::default()
                }),
                period_seconds: Some(READINESS_PERIOD_SECS),
                timeout_seconds: Some(READINESS_TIMEOUT_SECS),
                ..Default::default()
            }),
            security_context: Some(SecurityContext {
                capabilities: Some(Capabilities {
                    add: Some(vec!["IPC_LOCK".to_string()]),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn unsealer_container(&self) -> Option<Container> {
        let unsealer = self.vs.spec.unsealer.as_ref()?;
        Some(Container {
            name: CONTAINER_NAME_UNSEALER.to_string(),
            image: Some(self.images.unsealer_image.clone()),
            args: Some(vec![
                "run".to_string(),
                format!("--secret-shares={}", unsealer.secret_shares()),
                format!("--secret-threshold={}", unsealer.secret_threshold()),
                format!("--vault.address=https://127.0.0.1:{VAULT_CLIENT_PORT}"),
                format!("--vault.ca-cert={VAULT_TLS_PATH}/{TLS_CA_CERT_KEY}"),
                format!("--overwrite-existing={}", unsealer.overwrite_existing),
                format!("--store-root-token={}", unsealer.store_root_token),
                format!("--retry-period={UNSEALER_RETRY_PERIOD}"),
            ]),
            volume_mounts: Some(vec![VolumeMount {
                name: VOLUME_VAULT_TLS.to_string(),
                mount_path: VAULT_TLS_PATH.to_string(),
                read_only: Some(true),
                ..Default::default()
            }]),
            ..Default::default()
        })
    }

    /// Builds the pod template: base containers, then plugin mutations, then overrides.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] if a plugin cannot mutate the template.
    pub fn build_pod_template(&self) -> Result<PodTemplateSpec, BuildError> {
        let mut containers = vec![self.vault_container()];
        containers.extend(self.unsealer_container());

        let mut template = PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(self.vs.offshoot_labels()),
                ..Default::default()
            }),
            spec: Some(PodSpec {
                containers,
                volumes: Some(vec![
                    k8s_openapi::api::core::v1::Volume {
                        name: VOLUME_VAULT_CONFIG.to_string(),
                        config_map: Some(ConfigMapVolumeSource {
                            name: self.vs.config_map_name(),
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                    k8s_openapi::api::core::v1::Volume {
                        name: VOLUME_VAULT_TLS.to_string(),
                        secret: Some(SecretVolumeSource {
                            secret_name: Some(self.vs.tls_secret_name()),
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                ]),
                service_account_name: Some(self.vs.service_account_name()),
                ..Default::default()
            }),
        };

        for plugin in self.plan.plugins() {
            debug!(plugin = plugin.name(), "Applying plugin pod template mutation");
            plugin.mutate_pod_template(&mut template)?;
        }

        apply_pod_overrides(&mut template, self.vs.spec.pod_template.as_ref());
        Ok(template)
    }

    /// Builds the Vault `Deployment`.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] if the pod template cannot be built.
    pub fn build_deployment(&self) -> Result<Deployment, BuildError> {
        debug!(
            name = %self.name,
            namespace = %self.namespace,
            replicas = self.vs.replicas(),
            "Building Deployment for VaultServer"
        );
        Ok(Deployment {
            metadata: self.metadata(self.name.clone()),
            spec: Some(DeploymentSpec {
                replicas: Some(self.vs.replicas()),
                selector: LabelSelector {
                    match_labels: Some(self.vs.selector_labels()),
                    ..Default::default()
                },
                template: self.build_pod_template()?,
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    /// Builds the Vault `Service`, with the user's service template merged on top.
    #[must_use]
    pub fn build_service(&self) -> Service {
        let mut spec = ServiceSpec {
            selector: Some(self.vs.selector_labels()),
            ports: Some(vec![
                ServicePort {
                    name: Some(VAULT_CLIENT_PORT_NAME.to_string()),
                    port: i32::from(VAULT_CLIENT_PORT),
                    target_port: Some(IntOrString::Int(i32::from(VAULT_CLIENT_PORT))),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                },
                ServicePort {
                    name: Some(VAULT_CLUSTER_PORT_NAME.to_string()),
                    port: i32::from(VAULT_CLUSTER_PORT),
                    target_port: Some(IntOrString::Int(i32::from(VAULT_CLUSTER_PORT))),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                },
            ]),
            type_: Some("ClusterIP".to_string()),
            ..Default::default()
        };

        let mut metadata = self.metadata(self.name.clone());
        if let Some(template) = &self.vs.spec.service_template {
            if let Some(custom) = &template.spec {
                merge_service_spec(&mut spec, custom);
            }
            metadata.annotations.clone_from(&template.annotations);
        }

        Service {
            metadata,
            spec: Some(spec),
            ..Default::default()
        }
    }

    /// Builds one `Role` and `RoleBinding` per plugin that requires API access.
    ///
    /// Both are named `<server>-<plugin>` and the binding grants the role to the
    /// Vault `ServiceAccount`.
    #[must_use]
    pub fn build_rbac(&self) -> Vec<(Role, RoleBinding)> {
        self.plan
            .plugins()
            .filter_map(|plugin| {
                let rules = plugin.required_policy_rules(&self.namespace);
                if rules.is_empty() {
                    return None;
                }
                let role_name = format!("{}-{}", self.name, plugin.name());
                let role = Role {
                    metadata: self.metadata(role_name.clone()),
                    rules: Some(rules),
                };
                let binding = RoleBinding {
                    metadata: self.metadata(role_name.clone()),
                    role_ref: RoleRef {
                        api_group: RBAC_API_GROUP.to_string(),
                        kind: "Role".to_string(),
                        name: role_name,
                    },
                    subjects: Some(vec![Subject {
                        kind: "ServiceAccount".to_string(),
                        name: self.vs.service_account_name(),
                        namespace: Some(self.namespace.clone()),
                        ..Default::default()
                    }]),
                };
                Some((role, binding))
            })
            .collect()
    }
}

/// Applies pod template overrides field by field.
///
/// Only fields set in `overrides` change; everything else keeps the generated value.
fn apply_pod_overrides(template: &mut PodTemplateSpec, overrides: Option<&PodTemplateOverrides>) {
    let pull_policy = overrides
        .and_then(|o| o.image_pull_policy.clone())
        .unwrap_or_else(|| DEFAULT_IMAGE_PULL_POLICY.to_string());

    if let Some(spec) = template.spec.as_mut() {
        for container in &mut spec.containers {
            container.image_pull_policy = Some(pull_policy.clone());
        }
    }

    let Some(overrides) = overrides else {
        return;
    };

    if let Some(annotations) = &overrides.annotations {
        let meta = template.metadata.get_or_insert_with(Default::default);
        meta.annotations
            .get_or_insert_with(BTreeMap::new)
            .extend(annotations.clone());
    }

    let spec = template.spec.get_or_insert_with(Default::default);
    if let Some(node_selector) = &overrides.node_selector {
        spec.node_selector = Some(node_selector.clone());
    }
    if let Some(tolerations) = &overrides.tolerations {
        spec.tolerations = Some(tolerations.clone());
    }
    if let Some(affinity) = &overrides.affinity {
        spec.affinity = Some(affinity.clone());
    }
    if let Some(security_context) = &overrides.security_context {
        spec.security_context = Some(security_context.clone());
    }
    if let Some(secrets) = &overrides.image_pull_secrets {
        spec.image_pull_secrets = Some(
            secrets
                .iter()
                .map(|s| LocalObjectReference { name: s.clone() })
                .collect(),
        );
    }
    if let Some(scheduler) = overrides.scheduler_name.as_ref().filter(|s| !s.is_empty()) {
        spec.scheduler_name = Some(scheduler.clone());
    }
    if let Some(class) = &overrides.priority_class_name {
        spec.priority_class_name = Some(class.clone());
    }
    if let Some(priority) = overrides.priority {
        spec.priority = Some(priority);
    }
    if let Some(resources) = &overrides.resources {
        if let Some(vault) = spec
            .containers
            .iter_mut()
            .find(|c| c.name == CONTAINER_NAME_VAULT)
        {
            vault.resources = Some(resources.clone());
        }
    }
}

/// Merge custom service spec fields into the default spec
///
/// Only updates fields that are explicitly specified in the custom spec.
/// Custom ports are merged by name onto the default ports. The `selector`
/// is never overridden so the service always routes to the Vault pods.
pub fn merge_service_spec(default: &mut ServiceSpec, custom: &ServiceSpec) {
    if let Some(ref type_) = custom.type_ {
        default.type_ = Some(type_.clone());
    }
    if let Some(ref cluster_ip) = custom.cluster_ip {
        default.cluster_ip = Some(cluster_ip.clone());
    }
    if let Some(ref lb_ip) = custom.load_balancer_ip {
        default.load_balancer_ip = Some(lb_ip.clone());
    }
    if let Some(ref ranges) = custom.load_balancer_source_ranges {
        default.load_balancer_source_ranges = Some(ranges.clone());
    }
    if let Some(ref class) = custom.load_balancer_class {
        default.load_balancer_class = Some(class.clone());
    }
    if let Some(ref ips) = custom.external_ips {
        default.external_ips = Some(ips.clone());
    }
    if let Some(ref policy) = custom.external_traffic_policy {
        default.external_traffic_policy = Some(policy.clone());
    }
    if let Some(ref policy) = custom.internal_traffic_policy {
        default.internal_traffic_policy = Some(policy.clone());
    }
    if let Some(port) = custom.health_check_node_port.filter(|p| *p > 0) {
        default.health_check_node_port = Some(port);
    }
    if let Some(ref affinity) = custom.session_affinity {
        default.session_affinity = Some(affinity.clone());
    }
    if let Some(publish) = custom.publish_not_ready_addresses {
        default.publish_not_ready_addresses = Some(publish);
    }
    if let Some(ref custom_ports) = custom.ports {
        let ports = default.ports.get_or_insert_with(Vec::new);
        for custom_port in custom_ports {
            match ports.iter_mut().find(|p| p.name == custom_port.name) {
                Some(existing) => *existing = custom_port.clone(),
                None => ports.push(custom_port.clone()),
            }
        }
    }
}

#[cfg(test)]
#[path = "vault_resources_tests.rs"]
mod vault_resources_tests;
