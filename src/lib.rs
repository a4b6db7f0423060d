// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#![allow(unexpected_cfgs)]

//! # Vault Operator - HashiCorp Vault for Kubernetes
//!
//! A Kubernetes operator that turns `VaultServer` resources into running, TLS
//! secured Vault clusters and keeps their seal status visible in the resource
//! status.
//!
//! ## Overview
//!
//! - An event pump feeds a deduplicating work queue from a `VaultServer` watch.
//! - Workers reconcile one key at a time: the desired state of every dependent
//!   resource is built by pure functions, then converged against the cluster in
//!   a fixed order (TLS secret, configuration, workload).
//! - Storage backends and unseal modes are plugins that contribute configuration,
//!   pod template mutations and RBAC rules.
//! - One health monitor per converged server polls the Vault pods and publishes
//!   their seal state.
//!
//! ## Modules
//!
//! - [`crd`] - the `VaultServer` custom resource
//! - [`dispatcher`] and [`queue`] - event dispatch and the work queue
//! - [`reconcilers`] - the reconcile pipeline and the convergence layer
//! - [`vault_resources`] - desired-state builders
//! - [`plugin`], [`storage`], [`unsealer`] - strategy plugins
//! - [`monitor`] - health monitors and their registry
//! - [`pki`] - self-signed TLS material
//!
//! ## Example
//!
//! ```rust,no_run
//! use vault_operator::crd::{BackendStorageSpec, InmemSpec, VaultServerSpec};
//!
//! let spec = VaultServerSpec {
//!     replicas: Some(1),
//!     version: "1.15.4".to_string(),
//!     image: None,
//!     backend: BackendStorageSpec {
//!         inmem: Some(InmemSpec {}),
//!         ..Default::default()
//!     },
//!     unsealer: None,
//!     tls: None,
//!     pod_template: None,
//!     service_template: None,
//! };
//! ```

pub mod client;
pub mod config;
pub mod constants;
pub mod context;
pub mod crd;
pub mod dispatcher;
pub mod errors;
pub mod health;
pub mod labels;
pub mod metrics;
pub mod monitor;
pub mod pki;
pub mod plugin;
pub mod queue;
pub mod reconcilers;
pub mod status_reasons;
pub mod storage;
pub mod unsealer;
pub mod vault_resources;

#[cfg(test)]
mod test_support;

#[cfg(test)]
mod crd_tests;
