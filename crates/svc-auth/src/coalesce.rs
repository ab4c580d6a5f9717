//! Single-flight request coalescing.
//!
//! [`Coalescer::run`] guarantees that for a given key at most one producer
//! future is executing at any instant. Callers that arrive while it runs
//! attach to its pending outcome instead of starting their own; when the
//! producer finishes, every attached caller receives a clone of the same
//! `Ok` value or the same error, and the pending entry is removed so the next
//! call starts a fresh producer.
//!
//! The pending table lives apart from any value cache, so waiting on one key
//! never blocks reads or fetches for another.
//!
//! If the caller driving a producer is dropped before it completes, its
//! pending entry is removed and one of the attached callers takes over with
//! its own producer.

use crate::error::AuthError;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, trace};

/// Shared outcome of one producer run; `None` while it is still running.
type Outcome<V> = Option<Result<V, AuthError>>;

type InFlightMap<V> = HashMap<String, watch::Receiver<Outcome<V>>>;

/// Deduplicates concurrent fetches per key.
#[derive(Debug)]
pub struct Coalescer<V> {
    in_flight: Mutex<InFlightMap<V>>,
}

impl<V> Default for Coalescer<V> {
    fn default() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
        }
    }
}

/// Removes the pending entry for a key when the leading caller finishes or is
/// dropped.
struct InFlightGuard<'a, V> {
    in_flight: &'a Mutex<InFlightMap<V>>,
    key: &'a str,
}

impl<V> Drop for InFlightGuard<'_, V> {
    fn drop(&mut self) {
        lock(self.in_flight).remove(self.key);
    }
}

fn lock<V>(in_flight: &Mutex<InFlightMap<V>>) -> MutexGuard<'_, InFlightMap<V>> {
    // The map is only touched in short, non-panicking sections.
    in_flight.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<V: Clone> Coalescer<V> {
    /// Create a coalescer with no fetches in flight.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `producer` for `key` unless a run for the same key is in flight,
    /// in which case wait for and return that run's outcome.
    ///
    /// # Errors
    ///
    /// Returns whatever error the shared producer run returned.
    pub async fn run<F, Fut>(&self, key: &str, producer: F) -> Result<V, AuthError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, AuthError>>,
    {
        let sender = loop {
            let pending = {
                let mut in_flight = lock(&self.in_flight);
                if let Some(receiver) = in_flight.get(key) {
                    receiver.clone()
                } else {
                    let (sender, receiver) = watch::channel(None);
                    in_flight.insert(key.to_string(), receiver);
                    break sender;
                }
            };

            trace!(target: "svc_auth.coalesce", key = %key, "Joining in-flight fetch");
            if let Some(outcome) = Self::wait(pending).await {
                return outcome;
            }
            debug!(target: "svc_auth.coalesce", key = %key, "In-flight fetch abandoned, taking over");
        };

        let guard = InFlightGuard {
            in_flight: &self.in_flight,
            key,
        };
        let outcome = producer().await;
        drop(guard);

        sender.send_replace(Some(outcome.clone()));
        outcome
    }

    /// Number of keys with a fetch currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Wait for a pending outcome; `None` if its producer was abandoned.
    async fn wait(mut pending: watch::Receiver<Outcome<V>>) -> Outcome<V> {
        match pending.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).clone(),
            Err(_) => None,
        }
    }
}
