//! Tracks which lane worker is executing a task right now, per key.

use dashmap::DashMap;
use std::{
    fmt,
    future::Future,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
};

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    static CURRENT_WORKER: WorkerId;
}

/// Process-unique identity of a lane worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(u64);

impl WorkerId {
    pub(crate) fn next() -> Self {
        Self(NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Id of the lane worker running the calling task, if any.
    ///
    /// Also resolves inside blocking closures submitted to a lane.
    pub fn current() -> Option<Self> {
        CURRENT_WORKER.try_with(|id| *id).ok()
    }

    pub(crate) async fn scope<F: Future>(self, fut: F) -> F::Output {
        CURRENT_WORKER.scope(self, fut).await
    }

    pub(crate) fn sync_scope<R>(self, f: impl FnOnce() -> R) -> R {
        CURRENT_WORKER.sync_scope(self, f)
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lane-worker-{}", self.0)
    }
}

/// Key → worker currently executing under that key.
#[derive(Debug, Default)]
pub(crate) struct ActiveWorkers {
    running: DashMap<String, WorkerId>,
}

impl ActiveWorkers {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records `worker` as running under `key` until the guard drops.
    ///
    /// Returns `None` once `detached` is set: a lane that lost its key keeps
    /// running queued work but no longer speaks for that key.
    pub(crate) fn enter<'a>(&'a self, key: &'a str, worker: WorkerId, detached: &AtomicBool) -> Option<ActiveGuard<'a>> {
        // Checked under the shard lock, so it cannot interleave with `exit`.
        let entry = self.running.entry(key.to_owned());
        if detached.load(Ordering::SeqCst) {
            return None;
        }
        entry.insert(worker);
        Some(ActiveGuard {
            index: self,
            key,
            worker,
        })
    }

    pub(crate) fn is_current(&self, key: &str, worker: WorkerId) -> bool {
        self.running
            .get(key)
            .map(|entry| *entry.value() == worker)
            .unwrap_or(false)
    }

    pub(crate) fn exit(&self, key: &str, worker: WorkerId) {
        // A replacement lane for the same key may already have registered.
        self.running.remove_if(key, |_, current| *current == worker);
    }
}

/// Removes the index entry when the task finishes, also on panic or drop.
pub(crate) struct ActiveGuard<'a> {
    index: &'a ActiveWorkers,
    key: &'a str,
    worker: WorkerId,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.index.exit(self.key, self.worker);
    }
}
