// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation logic for `VaultServer` resources.
//!
//! - [`vaultserver`] - the reconcile pipeline
//! - [`resources`] - create-or-update convergence of dependent resources
//! - [`status`] - condition ownership and status transitions
//! - [`retry`] - backoff for API calls and requeues

pub mod resources;
pub mod retry;
pub mod status;
pub mod vaultserver;

pub use vaultserver::reconcile_vault_server;
