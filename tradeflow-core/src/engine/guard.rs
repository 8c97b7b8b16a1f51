//! Re-entrancy & Cancellation Guard
//!
//! A monotonically increasing pass generation is the single mechanism that
//! prevents lost updates and stale overwrites. Every pass gets a fresh
//! generation; every commit (and every side-write harvest) first checks that
//! its generation is still current. In-flight computations from a superseded
//! pass are allowed to finish, since the underlying network calls may not be
//! cancelable, but their late results fail the check and are dropped.
//!
//! The guard also tracks deliberately fire-and-forget background work (for
//! example transaction submission) so nothing runs untagged and tests can
//! await completion.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

/// Pass-generation bookkeeping plus tracked background tasks.
pub struct PassGuard {
    generation: AtomicU64,
    background: Mutex<Vec<(u64, JoinHandle<()>)>>,
}

impl PassGuard {
    pub fn new() -> Self {
        Self {
            generation: AtomicU64::new(0),
            background: Mutex::new(Vec::new()),
        }
    }

    /// The generation of the most recently started pass.
    pub fn current(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Start a new pass, superseding any pass still in flight.
    pub fn begin_pass(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(generation, "pass generation advanced");
        generation
    }

    /// Whether a result tagged with `generation` may still commit.
    pub fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }

    /// Spawn a background task tagged with the current generation.
    ///
    /// The tag makes the task's provenance visible when draining; the task
    /// itself is responsible for generation-checking any writes it performs
    /// (it goes through the engine's batched write path like everyone else).
    pub fn track<F>(&self, future: F) -> u64
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = self.current();
        let handle = tokio::spawn(future);
        self.background.lock().push((generation, handle));
        generation
    }

    /// Await every tracked background task spawned so far.
    pub async fn await_background(&self) {
        let tasks = std::mem::take(&mut *self.background.lock());
        for (generation, handle) in tasks {
            if handle.await.is_err() {
                debug!(generation, "background task panicked or was cancelled");
            }
        }
    }
}

impl Default for PassGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    #[test]
    fn generations_are_monotonic() {
        let guard = PassGuard::new();
        assert_eq!(guard.current(), 0);

        let first = guard.begin_pass();
        let second = guard.begin_pass();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(guard.current(), 2);
    }

    #[test]
    fn only_the_latest_generation_is_current() {
        let guard = PassGuard::new();
        let first = guard.begin_pass();
        assert!(guard.is_current(first));

        let second = guard.begin_pass();
        assert!(!guard.is_current(first));
        assert!(guard.is_current(second));
    }

    #[tokio::test]
    async fn background_tasks_are_tracked_to_completion() {
        let guard = PassGuard::new();
        let done = Arc::new(AtomicBool::new(false));

        let done_clone = done.clone();
        guard.track(async move {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            done_clone.store(true, Ordering::SeqCst);
        });

        guard.await_background().await;
        assert!(done.load(Ordering::SeqCst));
    }
}
