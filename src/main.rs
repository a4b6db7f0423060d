// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::Result;
use clap::Parser;
use kube::runtime::reflector;
use kube::{Api, Client};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vault_operator::{
    client::KubeClusterClient,
    config::{LogFormat, OperatorConfig},
    context::Context,
    crd::VaultServer,
    dispatcher::{watch_vault_servers, Dispatcher},
    health::{run_health_server, HealthState},
    monitor::{HttpSealProbe, MonitorRegistry},
    pki::SelfSignedIssuer,
    queue::WorkQueue,
};

fn main() -> Result<()> {
    let config = OperatorConfig::parse();

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .thread_name("vault-operator")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(config))
}

/// Initialize logging.
///
/// Respects `RUST_LOG` if set, otherwise defaults to INFO level.
/// Example: `RUST_LOG=vault_operator=debug RUST_LOG_FORMAT=json vault-operator`
fn init_tracing(format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main(config: OperatorConfig) -> Result<()> {
    init_tracing(config.log_format);
    info!("Starting Vault operator");
    debug!(?config, "Loaded configuration");

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;
    debug!("Kubernetes client initialized successfully");

    let ctx = Arc::new(Context {
        client: Arc::new(KubeClusterClient::new(client.clone())),
        registry: Arc::new(MonitorRegistry::new()),
        issuer: Arc::new(SelfSignedIssuer),
        probe: Arc::new(HttpSealProbe::new()),
        images: config.image_settings(),
        monitor_interval: config.monitor_interval(),
    });

    let shutdown = CancellationToken::new();
    let health = Arc::new(HealthState::new());
    let health_task = tokio::spawn(run_health_server(
        config.health_addr,
        Arc::clone(&health),
        shutdown.clone(),
    ));

    let queue = Arc::new(WorkQueue::new());
    let (reader, writer) = reflector::store::<VaultServer>();
    let mut watch_task = tokio::spawn(watch_vault_servers(
        Api::all(client),
        writer,
        Arc::clone(&queue),
    ));

    // Workers only start once the cache reflects the cluster, so a missing
    // object always means it was deleted.
    info!("Waiting for VaultServer cache to sync");
    tokio::select! {
        ready = reader.wait_until_ready() => ready?,
        () = shutdown_signal() => {
            info!("Shutdown requested before cache sync");
            shutdown.cancel();
            return Ok(());
        }
    }
    health.set_ready(true);

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&ctx),
        reader,
        Arc::clone(&queue),
        config.max_requeues,
    ));
    let workers: Vec<_> = (0..config.worker_count())
        .map(|id| tokio::spawn(Arc::clone(&dispatcher).run_worker(id)))
        .collect();
    info!(workers = workers.len(), "Controller running");

    let result = tokio::select! {
        () = shutdown_signal() => {
            info!("Shutdown signal received");
            Ok(())
        }
        joined = &mut watch_task => {
            error!("CRITICAL: VaultServer watch exited unexpectedly: {:?}", joined);
            Err(anyhow::anyhow!("VaultServer watch exited unexpectedly"))
        }
    };

    health.set_ready(false);
    queue.shut_down();
    for worker in workers {
        if let Err(e) = worker.await {
            warn!(error = %e, "Worker ended abnormally");
        }
    }
    ctx.registry.shutdown().await;
    watch_task.abort();
    shutdown.cancel();
    match health_task.await {
        Ok(Err(e)) => warn!(error = %e, "Health server failed"),
        Err(e) => warn!(error = %e, "Health server task ended abnormally"),
        Ok(Ok(())) => {}
    }

    info!("Vault operator stopped");
    result
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
