// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for the reconciler and the dispatcher.
//!
//! Every worker receives an `Arc<Context<C>>` that contains:
//! - The cluster client used for every API call
//! - The health monitor registry
//! - The TLS certificate issuer and the seal status probe
//! - Operator settings (images, monitor interval)

use crate::client::ClusterClient;
use crate::monitor::{MonitorRegistry, SealStatusProbe};
use crate::pki::CertificateIssuer;
use crate::vault_resources::ImageSettings;
use std::sync::Arc;
use std::time::Duration;

/// Shared state passed to every reconciliation.
pub struct Context<C: ClusterClient> {
    /// Cluster client for API operations
    pub client: Arc<C>,

    /// Live health monitors, one per `VaultServer`
    pub registry: Arc<MonitorRegistry>,

    /// Issues TLS material for servers without a user-supplied secret
    pub issuer: Arc<dyn CertificateIssuer>,

    /// Probe handed to every health monitor
    pub probe: Arc<dyn SealStatusProbe>,

    /// Images for operator-managed containers
    pub images: ImageSettings,

    /// Interval between health monitor polls
    pub monitor_interval: Duration,
}

impl<C: ClusterClient> Clone for Context<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            registry: Arc::clone(&self.registry),
            issuer: Arc::clone(&self.issuer),
            probe: Arc::clone(&self.probe),
            images: self.images.clone(),
            monitor_interval: self.monitor_interval,
        }
    }
}

impl<C: ClusterClient> std::fmt::Debug for Context<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("registry", &self.registry)
            .field("issuer", &self.issuer)
            .field("probe", &self.probe)
            .field("images", &self.images)
            .field("monitor_interval", &self.monitor_interval)
            .finish_non_exhaustive()
    }
}
