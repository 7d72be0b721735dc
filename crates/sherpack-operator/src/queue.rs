//! Delayed work queue for reconcile requests
//!
//! Semantics follow the usual controller work queue:
//!
//! - An item is queued at most once, however many times it is added
//! - An item being processed is not handed out again until [`WorkQueue::done`];
//!   adds during processing are replayed on `done`
//! - [`WorkQueue::add_rate_limited`] schedules a retry with per-item
//!   exponential backoff and counts it; [`WorkQueue::forget`] resets the count

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;

use crate::config::BackoffConfig;
use crate::event::ReconcileRequest;

/// The queue surface handlers enqueue into
pub trait RequestQueue: Send + Sync {
    /// Queue a request for reconciliation
    fn add(&self, request: ReconcileRequest);

    /// Number of retries currently scheduled or performed for a request
    fn num_requeues(&self, request: &ReconcileRequest) -> u32;
}

struct QueueState<T> {
    queue: VecDeque<T>,
    dirty: HashSet<T>,
    processing: HashSet<T>,
    requeues: HashMap<T, u32>,
    shutting_down: bool,
}

impl<T> Default for QueueState<T> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            dirty: HashSet::new(),
            processing: HashSet::new(),
            requeues: HashMap::new(),
            shutting_down: false,
        }
    }
}

struct Shared<T> {
    state: Mutex<QueueState<T>>,
    notify: Notify,
    backoff: BackoffConfig,
}

/// Deduplicating delayed work queue
pub struct WorkQueue<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Default for WorkQueue<T>
where
    T: Clone + Eq + Hash + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T>
where
    T: Clone + Eq + Hash + Send + 'static,
{
    /// Create a queue with the default backoff
    pub fn new() -> Self {
        Self::with_backoff(BackoffConfig::default())
    }

    /// Create a queue with a custom retry backoff
    pub fn with_backoff(backoff: BackoffConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                notify: Notify::new(),
                backoff,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState<T>> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue an item unless it is already queued
    pub fn add(&self, item: T) {
        let mut state = self.state();
        if state.shutting_down || !state.dirty.insert(item.clone()) {
            return;
        }
        if state.processing.contains(&item) {
            return;
        }
        state.queue.push_back(item);
        drop(state);
        self.shared.notify.notify_one();
    }

    /// Queue an item after a delay
    ///
    /// Must be called from within a Tokio runtime when `delay` is non-zero.
    pub fn add_after(&self, item: T, delay: Duration) {
        if delay.is_zero() {
            self.add(item);
            return;
        }

        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(item);
        });
    }

    /// Schedule a retry for an item, backing off per item
    pub fn add_rate_limited(&self, item: T) {
        let attempt = {
            let mut state = self.state();
            let count = state.requeues.entry(item.clone()).or_insert(0);
            let attempt = *count;
            *count += 1;
            attempt
        };
        let delay = self.shared.backoff.delay_for(attempt);
        self.add_after(item, delay);
    }

    /// Stop tracking retries for an item
    pub fn forget(&self, item: &T) {
        self.state().requeues.remove(item);
    }

    /// Number of retries recorded for an item
    pub fn num_requeues(&self, item: &T) -> u32 {
        self.state().requeues.get(item).copied().unwrap_or(0)
    }

    /// Wait for the next item
    ///
    /// Returns `None` once the queue is shut down and drained.
    pub async fn get(&self) -> Option<T> {
        loop {
            let notified = self.shared.notify.notified();
            {
                let mut state = self.state();
                if let Some(item) = state.queue.pop_front() {
                    state.dirty.remove(&item);
                    state.processing.insert(item.clone());
                    return Some(item);
                }
                if state.shutting_down {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Mark an item as processed
    pub fn done(&self, item: &T) {
        let mut state = self.state();
        state.processing.remove(item);
        if state.dirty.contains(item) {
            state.queue.push_back(item.clone());
            drop(state);
            self.shared.notify.notify_one();
        }
    }

    /// Number of items waiting to be processed
    pub fn len(&self) -> usize {
        self.state().queue.len()
    }

    /// Check if no items are waiting
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting items and wake all waiters
    pub fn shut_down(&self) {
        self.state().shutting_down = true;
        self.shared.notify.notify_waiters();
    }

    /// Check if the queue is shutting down
    pub fn is_shutting_down(&self) -> bool {
        self.state().shutting_down
    }
}

impl RequestQueue for WorkQueue<ReconcileRequest> {
    fn add(&self, request: ReconcileRequest) {
        WorkQueue::add(self, request);
    }

    fn num_requeues(&self, request: &ReconcileRequest) -> u32 {
        WorkQueue::num_requeues(self, request)
    }
}
