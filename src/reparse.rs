//! Debounced, per-key serialised re-indexing.
//!
//! Every request for a key supersedes the ones still waiting out their delay.
//! Once a run has started it is left to finish; the next run for the same key
//! waits for it. Different keys never wait on each other. A key's lane is
//! dropped once its latest request has finished.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::config::DEFAULT_REPARSE_DELAY_MS;

#[derive(Default)]
struct Lane {
    /// Set by every request; only the holder of the latest value may run.
    generation: u64,
    running: Arc<tokio::sync::Mutex<()>>,
}

type Lanes<K> = Arc<Mutex<HashMap<K, Lane>>>;

pub struct ReparseCoordinator<K> {
    delay_ms: AtomicU64,
    /// Shared by all lanes so a re-created lane never reuses a stale value.
    next_generation: AtomicU64,
    lanes: Lanes<K>,
}

impl<K> Default for ReparseCoordinator<K>
where
    K: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static,
{
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_REPARSE_DELAY_MS))
    }
}

impl<K> ReparseCoordinator<K>
where
    K: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static,
{
    pub fn new(delay: Duration) -> Self {
        ReparseCoordinator {
            delay_ms: AtomicU64::new(delay.as_millis() as u64),
            next_generation: AtomicU64::new(0),
            lanes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms.load(Ordering::Relaxed))
    }

    /// Applies to requests made from now on.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms
            .store(delay.as_millis() as u64, Ordering::Relaxed);
    }

    /// Keys with a request waiting or running.
    pub fn pending(&self) -> usize {
        self.lanes.lock().len()
    }

    /// Schedule `task` for `key` after the debounce delay.
    ///
    /// The returned handle completes once the request has either run or been
    /// superseded.
    pub fn run<F, Fut>(&self, key: K, task: F) -> JoinHandle<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (generation, running) = {
            let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
            let mut lanes = self.lanes.lock();
            let lane = lanes.entry(key.clone()).or_default();
            lane.generation = generation;
            (generation, Arc::clone(&lane.running))
        };

        let lanes = Arc::clone(&self.lanes);
        let delay = self.delay();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !is_latest(&lanes, &key, generation) {
                trace!("Reparse of {key:?} superseded");
                return;
            }

            let _running = running.lock().await;
            // superseded while the previous run finished
            if !is_latest(&lanes, &key, generation) {
                trace!("Reparse of {key:?} superseded");
                return;
            }

            trace!("Reparsing {key:?}");
            task().await;

            let mut lanes = lanes.lock();
            if lanes.get(&key).is_some_and(|lane| lane.generation == generation) {
                lanes.remove(&key);
            }
        })
    }
}

fn is_latest<K: Eq + Hash>(lanes: &Lanes<K>, key: &K, generation: u64) -> bool {
    lanes
        .lock()
        .get(key)
        .is_some_and(|lane| lane.generation == generation)
}
