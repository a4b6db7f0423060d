// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Deduplicating work queue for reconciliation keys.
//!
//! Semantics follow the classic controller work queue:
//!
//! - A key is queued at most once, however many events arrive for it.
//! - A key handed out by [`WorkQueue::get`] is *processing* until
//!   [`WorkQueue::done`]. Adds that arrive meanwhile mark it dirty and it is
//!   queued again on `done`, so one key is never handled by two workers at once.
//! - [`WorkQueue::add_rate_limited`] re-adds a key after an exponential delay
//!   that grows with the number of requeues since the last [`WorkQueue::forget`].

use crate::reconcilers::retry::rate_limit_delay;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::debug;

#[derive(Debug, Default)]
struct QueueState {
    queue: VecDeque<String>,
    dirty: HashSet<String>,
    processing: HashSet<String>,
    requeues: HashMap<String, u32>,
    shutting_down: bool,
}

/// Shared work queue. Clone the surrounding `Arc` to share it between workers.
#[derive(Debug, Default)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl WorkQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `key` unless it is already queued. Ignored after shutdown.
    pub fn add(&self, key: &str) {
        let mut state = self.lock();
        if state.shutting_down || !state.dirty.insert(key.to_string()) {
            return;
        }
        if state.processing.contains(key) {
            debug!(key, "Key is being processed, will be requeued when done");
            return;
        }
        state.queue.push_back(key.to_string());
        drop(state);
        self.notify.notify_one();
    }

    /// Wait for the next key. Returns `None` once the queue is shut down and drained.
    pub async fn get(&self) -> Option<String> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Mark `key` as no longer processing. Re-queues it if it was added meanwhile.
    pub fn done(&self, key: &str) {
        let mut state = self.lock();
        state.processing.remove(key);
        if state.dirty.contains(key) {
            state.queue.push_back(key.to_string());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Re-add `key` after a delay that doubles with every requeue.
    pub fn add_rate_limited(self: &Arc<Self>, key: &str) {
        let attempt = {
            let mut state = self.lock();
            let count = state.requeues.entry(key.to_string()).or_insert(0);
            let attempt = *count;
            *count += 1;
            attempt
        };
        let delay = rate_limit_delay(attempt);
        debug!(key, attempt, delay = ?delay, "Requeueing with backoff");

        let queue = Arc::clone(self);
        let key = key.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(&key);
        });
    }

    /// Reset the requeue counter for `key`.
    pub fn forget(&self, key: &str) {
        self.lock().requeues.remove(key);
    }

    /// Number of rate-limited requeues of `key` since the last `forget`.
    #[must_use]
    pub fn num_requeues(&self, key: &str) -> u32 {
        self.lock().requeues.get(key).copied().unwrap_or(0)
    }

    /// Number of keys waiting to be handed out.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting keys and wake every waiting worker.
    ///
    /// Keys already queued are still handed out.
    pub fn shut_down(&self) {
        self.lock().shutting_down = true;
        self.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod queue_tests;
