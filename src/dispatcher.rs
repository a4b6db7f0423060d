// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Event dispatch for `VaultServer` resources.
//!
//! The event pump ([`watch_vault_servers`]) feeds a reflector store and pushes
//! keys onto the [`WorkQueue`]. Workers ([`Dispatcher::run_worker`]) pull keys,
//! look the object up in the store and either reconcile it or, when it is gone,
//! stop its health monitor. Failed keys are requeued with backoff up to a cap.

use crate::client::ClusterClient;
use crate::context::Context;
use crate::crd::VaultServer;
use crate::errors::DispatchError;
use crate::metrics;
use crate::queue::WorkQueue;
use crate::reconcilers::vaultserver::reconcile_vault_server;
use futures::{Stream, StreamExt};
use kube::runtime::reflector::{ObjectRef, Store};
use kube::runtime::watcher;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Read access to the current state of `VaultServer` objects by key.
pub trait ObjectCache: Send + Sync + 'static {
    /// Look up `namespace/name`. `Ok(None)` means the object does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidKey`] for malformed keys.
    fn get_by_key(&self, key: &str) -> Result<Option<Arc<VaultServer>>, DispatchError>;
}

/// Split `namespace/name`.
///
/// # Errors
///
/// Returns [`DispatchError::InvalidKey`] unless both parts are non-empty.
pub fn parse_key(key: &str) -> Result<(&str, &str), DispatchError> {
    match key.split_once('/') {
        Some((namespace, name)) if !namespace.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((namespace, name))
        }
        _ => Err(DispatchError::InvalidKey {
            key: key.to_string(),
        }),
    }
}

impl ObjectCache for Store<VaultServer> {
    fn get_by_key(&self, key: &str) -> Result<Option<Arc<VaultServer>>, DispatchError> {
        let (namespace, name) = parse_key(key)?;
        Ok(self.get(&ObjectRef::new(name).within(namespace)))
    }
}

/// Pulls keys from the queue and drives reconciliation.
pub struct Dispatcher<C: ClusterClient, S: ObjectCache> {
    ctx: Arc<Context<C>>,
    cache: S,
    queue: Arc<WorkQueue>,
    max_requeues: u32,
}

impl<C: ClusterClient, S: ObjectCache> Dispatcher<C, S> {
    #[must_use]
    pub fn new(ctx: Arc<Context<C>>, cache: S, queue: Arc<WorkQueue>, max_requeues: u32) -> Self {
        Self {
            ctx,
            cache,
            queue,
            max_requeues,
        }
    }

    #[must_use]
    pub fn context(&self) -> &Arc<Context<C>> {
        &self.ctx
    }

    #[must_use]
    pub fn cache(&self) -> &S {
        &self.cache
    }

    /// Handle one key: reconcile the object, or stop its monitor if it is gone.
    ///
    /// # Errors
    ///
    /// Returns the cache or reconcile error unchanged; retry is the caller's job.
    pub async fn handle(&self, key: &str) -> Result<(), DispatchError> {
        match self.cache.get_by_key(key)? {
            None => {
                info!(key, "VaultServer no longer exists, stopping its health monitor");
                self.ctx.registry.stop(key);
                Ok(())
            }
            Some(cached) => {
                let vs = VaultServer::clone(&cached);
                reconcile_vault_server(&self.ctx, vs).await?;
                Ok(())
            }
        }
    }

    /// Process one key from the queue. Returns `false` once the queue is shut down.
    pub async fn process_next(&self) -> bool {
        let Some(key) = self.queue.get().await else {
            return false;
        };

        match self.handle(&key).await {
            Ok(()) => self.queue.forget(&key),
            Err(e) => {
                let requeues = self.queue.num_requeues(&key);
                if requeues < self.max_requeues {
                    warn!(key = %key, requeues, error = %e, "Reconcile failed, requeueing");
                    metrics::record_reconciliation_requeue("VaultServer", "error");
                    self.queue.add_rate_limited(&key);
                } else {
                    error!(key = %key, requeues, error = %e, "Reconcile failed too often, dropping key");
                    metrics::record_reconciliation_requeue("VaultServer", "dropped");
                    self.queue.forget(&key);
                }
            }
        }
        self.queue.done(&key);
        true
    }

    /// Worker loop; returns when the queue is shut down.
    pub async fn run_worker(self: Arc<Self>, id: usize) {
        debug!(worker = id, "Worker started");
        while self.process_next().await {}
        debug!(worker = id, "Worker stopped");
    }
}

/// Decides which watch events enqueue a key.
///
/// Status-only updates do not change `metadata.generation` and are ignored, so
/// the reconciler's and monitor's own status writes never trigger a pass. An
/// object recreated under the same name has a new uid and is always enqueued.
///
/// A relist (`Init` .. `InitDone`) carries no `Delete` for objects removed
/// while the watch was down. Keys known before `Init` and not replayed by
/// `InitApply` are enqueued at `InitDone` so the dispatcher sees them absent.
#[derive(Debug, Default)]
pub struct EventFilter {
    seen: HashMap<String, (Option<String>, Option<i64>)>,
    relist_missing: Option<HashSet<String>>,
}

impl EventFilter {
    /// Returns the keys to enqueue for `event`.
    pub fn keys_for(&mut self, event: &watcher::Event<VaultServer>) -> Vec<String> {
        match event {
            watcher::Event::Apply(vs) | watcher::Event::InitApply(vs) => {
                let key = vs.key();
                if let Some(missing) = self.relist_missing.as_mut() {
                    missing.remove(&key);
                }
                let version = (vs.metadata.uid.clone(), vs.metadata.generation);
                let changed = self.seen.insert(key.clone(), version.clone()) != Some(version);
                if changed || vs.metadata.deletion_timestamp.is_some() {
                    vec![key]
                } else {
                    Vec::new()
                }
            }
            watcher::Event::Delete(vs) => {
                let key = vs.key();
                self.seen.remove(&key);
                vec![key]
            }
            watcher::Event::Init => {
                self.relist_missing = Some(self.seen.keys().cloned().collect());
                Vec::new()
            }
            watcher::Event::InitDone => {
                let mut gone: Vec<String> = self
                    .relist_missing
                    .take()
                    .unwrap_or_default()
                    .into_iter()
                    .collect();
                gone.sort();
                for key in &gone {
                    self.seen.remove(key);
                }
                gone
            }
        }
    }
}

/// Drain a reflector event stream into the work queue.
///
/// Watch errors are logged and skipped; the watcher's backoff handles reconnects.
pub async fn pump_events<St>(events: St, queue: Arc<WorkQueue>)
where
    St: Stream<Item = Result<watcher::Event<VaultServer>, watcher::Error>>,
{
    let mut filter = EventFilter::default();
    futures::pin_mut!(events);
    while let Some(event) = events.next().await {
        match event {
            Ok(event) => {
                for key in filter.keys_for(&event) {
                    debug!(key = %key, "Enqueueing VaultServer");
                    queue.add(&key);
                }
            }
            Err(e) => warn!(error = %e, "VaultServer watch error"),
        }
    }
    info!("VaultServer watch stream ended");
}

/// Watch every `VaultServer`, keeping `writer`'s store current and feeding `queue`.
pub async fn watch_vault_servers(
    api: kube::Api<VaultServer>,
    writer: kube::runtime::reflector::store::Writer<VaultServer>,
    queue: Arc<WorkQueue>,
) {
    use kube::runtime::WatchStreamExt;
    let events = kube::runtime::reflector(writer, watcher(api, watcher::Config::default()))
        .default_backoff();
    pump_events(events, queue).await;
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod dispatcher_tests;
