//! Collapse concurrent identical requests into one upstream call.
//!
//! The first caller for a fingerprint becomes the leader and runs the
//! computation; later callers park on a oneshot channel and receive a clone
//! of the leader's result, in the order they registered.

use super::cache::Fingerprint;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;

type Waiters<T> = Vec<oneshot::Sender<T>>;
type InFlight<T> = Arc<Mutex<HashMap<Fingerprint, Waiters<T>>>>;

/// In-flight request registry keyed by [`Fingerprint`].
#[derive(Debug)]
pub struct RequestDeduplicator<T> {
    in_flight: InFlight<T>,
    executions: AtomicU64,
}

/// Outcome of [`RequestDeduplicator::register`].
#[derive(Debug)]
pub enum Registration<T> {
    /// No identical request was in flight; the caller must do the work and
    /// hand the result to [`LeaderTicket::finish`].
    Leader(LeaderTicket<T>),
    /// Another caller is already working on it. A receive error means that
    /// leader went away without a result; register again.
    Follower(oneshot::Receiver<T>),
}

impl<T: Clone> RequestDeduplicator<T> {
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            executions: AtomicU64::new(0),
        }
    }

    /// Claim `key` or queue behind the caller that already holds it.
    pub fn register(&self, key: Fingerprint) -> Registration<T> {
        let mut in_flight = lock(&self.in_flight);
        if let Some(waiters) = in_flight.get_mut(&key) {
            let (tx, rx) = oneshot::channel();
            waiters.push(tx);
            tracing::debug!(key = %key, "joined in-flight request");
            return Registration::Follower(rx);
        }
        in_flight.insert(key.clone(), Vec::new());
        self.executions.fetch_add(1, Ordering::Relaxed);
        Registration::Leader(LeaderTicket {
            in_flight: Arc::clone(&self.in_flight),
            key: Some(key),
        })
    }

    /// Run `compute` unless an identical request is already in flight.
    ///
    /// Every caller sharing `key` observes the same value, including the same
    /// error. If a leader is dropped before finishing, its followers
    /// re-register and one of them takes over.
    pub async fn execute_once<F, Fut>(&self, key: Fingerprint, compute: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let ticket = loop {
            match self.register(key.clone()) {
                Registration::Leader(ticket) => break ticket,
                Registration::Follower(receiver) => match receiver.await {
                    Ok(value) => return value,
                    Err(_) => tracing::debug!(key = %key, "in-flight leader went away; retrying"),
                },
            }
        };
        let value = compute().await;
        ticket.finish(&value);
        value
    }

    /// Number of computations actually started (leaders).
    pub fn executions(&self) -> u64 {
        self.executions.load(Ordering::Relaxed)
    }

    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }
}

impl<T: Clone> Default for RequestDeduplicator<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Proof of leadership for one key. Owns its slot, so it can outlive the
/// call that registered it (a streamed reply finishes long after
/// `send_streaming` returns). Dropping it unfinished clears the slot and
/// wakes followers with a receive error.
#[derive(Debug)]
pub struct LeaderTicket<T> {
    in_flight: InFlight<T>,
    key: Option<Fingerprint>,
}

impl<T: Clone> LeaderTicket<T> {
    /// Release the key and deliver `value` to every follower, in the order
    /// they registered.
    pub fn finish(mut self, value: &T) {
        let Some(key) = self.key.take() else {
            return;
        };
        let waiters = lock(&self.in_flight).remove(&key).unwrap_or_default();
        for waiter in waiters {
            let _ = waiter.send(value.clone());
        }
    }
}

impl<T> Drop for LeaderTicket<T> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            lock(&self.in_flight).remove(&key);
        }
    }
}

fn lock<T>(in_flight: &InFlight<T>) -> MutexGuard<'_, HashMap<Fingerprint, Waiters<T>>> {
    in_flight
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
