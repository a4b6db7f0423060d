// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics served on `/metrics`.
//!
//! | Metric                                        | Type      | Labels                        |
//! |-----------------------------------------------|-----------|-------------------------------|
//! | `vault_operator_reconciliations_total`        | counter   | `resource_type`, `status`     |
//! | `vault_operator_reconciliation_duration_seconds` | histogram | `resource_type`            |
//! | `vault_operator_requeues_total`               | counter   | `resource_type`, `reason`     |
//! | `vault_operator_resources_converged_total`    | counter   | `kind`, `verb`                |
//! | `vault_operator_active_monitors`              | gauge     |                               |
//! | `vault_operator_seal_probes_total`            | counter   | `result`                      |
//! | `vault_operator_errors_total`                 | counter   | `resource_type`, `error_type` |

use prometheus::core::Collector;
use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

const PREFIX: &str = "vault_operator";

const DURATION_BUCKETS: &[f64] = &[0.005, 0.025, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 15.0, 60.0];

pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Registers `metric` with [`METRICS_REGISTRY`].
fn registered<M: Collector + Clone + 'static>(metric: M) -> M {
    METRICS_REGISTRY
        .register(Box::new(metric.clone()))
        .expect("metric names are unique");
    metric
}

fn counter_vec(name: &str, help: &str, labels: &[&str]) -> CounterVec {
    let opts = Opts::new(format!("{PREFIX}_{name}"), help);
    registered(CounterVec::new(opts, labels).expect("valid counter definition"))
}

pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter_vec(
        "reconciliations_total",
        "Reconciliation passes by resource type and outcome",
        &["resource_type", "status"],
    )
});

pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{PREFIX}_reconciliation_duration_seconds"),
        "Wall time of one reconciliation pass",
    )
    .buckets(DURATION_BUCKETS.to_vec());
    registered(HistogramVec::new(opts, &["resource_type"]).expect("valid histogram definition"))
});

pub static REQUEUE_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter_vec(
        "requeues_total",
        "Keys handed back to the work queue with a delay",
        &["resource_type", "reason"],
    )
});

/// `verb` is `created` or `patched`.
pub static RESOURCES_CONVERGED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter_vec(
        "resources_converged_total",
        "Dependent resources written to the cluster",
        &["kind", "verb"],
    )
});

pub static ACTIVE_MONITORS: LazyLock<Gauge> = LazyLock::new(|| {
    registered(
        Gauge::new(
            format!("{PREFIX}_active_monitors"),
            "Health monitors currently running",
        )
        .expect("valid gauge definition"),
    )
});

/// `result` is `sealed`, `unsealed` or `error`.
pub static SEAL_PROBES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter_vec(
        "seal_probes_total",
        "Vault seal status probes by result",
        &["result"],
    )
});

pub static ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    counter_vec(
        "errors_total",
        "Reconciliation errors by resource type and category",
        &["resource_type", "error_type"],
    )
});

fn record_pass(resource_type: &str, status: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, status])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[resource_type])
        .observe(duration.as_secs_f64());
}

pub fn record_reconciliation_success(resource_type: &str, duration: Duration) {
    record_pass(resource_type, "success", duration);
}

pub fn record_reconciliation_error(resource_type: &str, duration: Duration) {
    record_pass(resource_type, "error", duration);
}

/// Counts a requeue both as a reconciliation outcome and by reason.
pub fn record_reconciliation_requeue(resource_type: &str, reason: &str) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, "requeue"])
        .inc();
    REQUEUE_TOTAL.with_label_values(&[resource_type, reason]).inc();
}

pub fn record_resource_converged(kind: &str, verb: &str) {
    RESOURCES_CONVERGED_TOTAL
        .with_label_values(&[kind, verb])
        .inc();
}

pub fn set_active_monitors(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    ACTIVE_MONITORS.set(count as f64);
}

pub fn record_seal_probe(result: &str) {
    SEAL_PROBES_TOTAL.with_label_values(&[result]).inc();
}

pub fn record_error(resource_type: &str, error_type: &str) {
    ERRORS_TOTAL
        .with_label_values(&[resource_type, error_type])
        .inc();
}

/// Encodes every registered metric in the Prometheus text format.
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&METRICS_REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod metrics_tests;
