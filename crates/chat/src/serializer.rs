//! At most one in-flight exchange per session id.
//!
//! The first caller for an id spawns the producer and leaves a marker behind;
//! later callers find the marker and wait on the same outcome instead of
//! starting a second exchange. The producer runs on its own task, so a caller
//! going away neither cancels the exchange nor strands the marker.

use chatbridge_core::{Error, Result};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

type Outcome<T> = Option<Result<T>>;

struct Marker<T> {
    rx: watch::Receiver<Outcome<T>>,
    created: Instant,
    generation: u64,
}

type Markers<T> = Arc<Mutex<HashMap<String, Marker<T>>>>;

fn lock<T>(markers: &Markers<T>) -> MutexGuard<'_, HashMap<String, Marker<T>>> {
    markers.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes its marker when the producer task ends, however it ends.
struct MarkerGuard<T> {
    markers: Markers<T>,
    id: String,
    generation: u64,
}

impl<T> Drop for MarkerGuard<T> {
    fn drop(&mut self) {
        let mut markers = lock(&self.markers);
        // A pruned marker may already have been replaced by a newer exchange.
        if markers.get(&self.id).map(|m| m.generation) == Some(self.generation) {
            markers.remove(&self.id);
        }
    }
}

pub struct RequestSerializer<T> {
    markers: Markers<T>,
    next_generation: AtomicU64,
}

impl<T> RequestSerializer<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            markers: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Run `producer` for `id`, or join the exchange already running for it.
    /// Joiners get a clone of the very same result, failures included.
    pub async fn admit_or_join<F>(&self, id: &str, producer: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let mut rx = {
            let mut markers = lock(&self.markers);
            match markers.get(id) {
                Some(marker) => {
                    debug!(session = %id, "Joining in-flight exchange");
                    marker.rx.clone()
                }
                None => {
                    let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
                    let (tx, rx) = watch::channel(None);
                    markers.insert(
                        id.to_string(),
                        Marker {
                            rx: rx.clone(),
                            created: Instant::now(),
                            generation,
                        },
                    );
                    let guard = MarkerGuard {
                        markers: self.markers.clone(),
                        id: id.to_string(),
                        generation,
                    };
                    tokio::spawn(async move {
                        let result = producer.await;
                        drop(guard);
                        let _ = tx.send(Some(result));
                    });
                    rx
                }
            }
        };

        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(value) => (*value).clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| {
            Err(Error::Other(format!(
                "Exchange for session {} ended without a result",
                id
            )))
        })
    }

    /// Drop markers older than `max_age` even if never resolved. Callers
    /// already waiting on them still get the eventual result.
    pub fn prune_stale(&self, max_age: Duration) -> usize {
        let mut markers = lock(&self.markers);
        let before = markers.len();
        markers.retain(|id, marker| {
            let keep = marker.created.elapsed() <= max_age;
            if !keep {
                warn!(session = %id, age = ?marker.created.elapsed(), "Pruning stale in-flight marker");
            }
            keep
        });
        before - markers.len()
    }

    pub fn in_flight(&self) -> usize {
        lock(&self.markers).len()
    }

    pub fn is_in_flight(&self, id: &str) -> bool {
        lock(&self.markers).contains_key(id)
    }
}

impl<T> Default for RequestSerializer<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
