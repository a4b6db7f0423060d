// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Operator command line and environment configuration.
//!
//! Every flag can also be set through the environment variable named next to it.

use crate::constants::{
    DEFAULT_HEALTH_ADDR, DEFAULT_MAX_REQUEUES, DEFAULT_MONITOR_INTERVAL_SECS,
    DEFAULT_UNSEALER_IMAGE, DEFAULT_WORKERS,
};
use crate::vault_resources::ImageSettings;
use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::time::Duration;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable compact lines
    Text,
    /// One JSON object per line
    Json,
}

/// Vault operator - converges `VaultServer` resources into running Vault clusters
#[derive(Parser, Debug, Clone)]
#[command(name = "vault-operator", version, about, long_about = None)]
pub struct OperatorConfig {
    /// Number of concurrent reconcile workers
    #[arg(long, env = "VAULT_OPERATOR_WORKERS", default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,

    /// Requeues of a failing key before it is dropped
    #[arg(long, env = "VAULT_OPERATOR_MAX_REQUEUES", default_value_t = DEFAULT_MAX_REQUEUES)]
    pub max_requeues: u32,

    /// Seconds between health monitor polls
    #[arg(long, env = "VAULT_OPERATOR_MONITOR_INTERVAL", default_value_t = DEFAULT_MONITOR_INTERVAL_SECS)]
    pub monitor_interval_secs: u64,

    /// Image of the unsealer sidecar
    #[arg(long, env = "VAULT_OPERATOR_UNSEALER_IMAGE", default_value = DEFAULT_UNSEALER_IMAGE)]
    pub unsealer_image: String,

    /// Listen address of the health and metrics server
    #[arg(long, env = "VAULT_OPERATOR_HEALTH_ADDR", default_value = DEFAULT_HEALTH_ADDR)]
    pub health_addr: SocketAddr,

    /// Log output format
    #[arg(long, env = "RUST_LOG_FORMAT", value_enum, ignore_case = true, default_value = "text")]
    pub log_format: LogFormat,
}

impl OperatorConfig {
    /// Worker count, never below one.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.max(1)
    }

    /// Monitor poll interval, never below one second.
    #[must_use]
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs.max(1))
    }

    #[must_use]
    pub fn image_settings(&self) -> ImageSettings {
        ImageSettings {
            unsealer_image: self.unsealer_image.clone(),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
