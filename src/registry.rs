//! # Lane registry
//!
//! Maps a string key to its [`Lane`], creating lanes lazily on first use:
//! - work submitted under one key runs in submission order, never overlapping
//! - different keys run concurrently, one worker per key
//! - `shutdown` drains a key deterministically; `remove` forgets it
//!
//! Alongside the lanes the registry keeps the active-worker index, so a task
//! can ask whether it is already running inside a given lane.

use super::{
    active::{ActiveWorkers, WorkerId},
    errors::ExecError,
    handle::JoinHandle,
    lane::Lane,
    model::{LaneShutdown, LaneState},
    result::ExecResult,
};
use dashmap::DashMap;
use std::{future::Future, sync::Arc};
use tokio::time::Duration;
use tracing::{debug, error, warn};

#[derive(Default)]
pub struct LaneRegistry {
    lanes: DashMap<String, Arc<Lane>>,
    active: Arc<ActiveWorkers>,
}

impl LaneRegistry {
    pub fn new() -> Self {
        Self {
            lanes: DashMap::new(),
            active: Arc::new(ActiveWorkers::new()),
        }
    }

    fn lane(&self, key: &str) -> Arc<Lane> {
        if let Some(lane) = self.lanes.get(key).map(|entry| entry.value().clone()) {
            return lane;
        }
        self.lanes
            .entry(key.to_owned())
            .or_insert_with(|| Lane::spawn(key, self.active.clone()))
            .value()
            .clone()
    }

    /// Queues `fut` on the lane for `key`, creating the lane if needed.
    ///
    /// Never waits. Must be called from within a tokio runtime.
    pub fn submit<T, F>(&self, key: &str, fut: F) -> JoinHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        self.lane(key).submit(fut)
    }

    /// Queues a blocking closure on the lane for `key`.
    pub fn submit_blocking<T, F>(&self, key: &str, f: F) -> JoinHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        self.lane(key).submit_blocking(f)
    }

    /// Submits and waits for the result.
    ///
    /// Dropping the returned future does not cancel the task.
    pub async fn await_submit<T, F>(&self, key: &str, fut: F) -> ExecResult<T>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        self.check_reentrant(key)?;
        let handle = self.submit(key, fut);
        Self::log_failure(key, handle.await)
    }

    pub async fn await_submit_blocking<T, F>(&self, key: &str, f: F) -> ExecResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        self.check_reentrant(key)?;
        let handle = self.submit_blocking(key, f);
        Self::log_failure(key, handle.await)
    }

    fn check_reentrant(&self, key: &str) -> ExecResult<()> {
        if self.is_current_lane(key) {
            error!(key = %key, "Waiting on a lane from one of its own tasks would deadlock");
            return Err(ExecError::Reentrant(key.to_owned()));
        }
        Ok(())
    }

    fn log_failure<T>(key: &str, result: ExecResult<T>) -> ExecResult<T> {
        if let Err(e) = &result {
            error!(key = %key, error = %e, "Exception while awaiting lane task");
        }
        result
    }

    /// Drains the lane for `key`, waiting at most `timeout` (forever if `None`)
    /// before cancelling what is left.
    ///
    /// The key is always gone from the registry afterwards, also when this
    /// future is dropped mid-wait, in which case the lane is cancelled.
    pub async fn shutdown(&self, key: &str, timeout: Option<Duration>) -> LaneShutdown {
        let Some(lane) = self.lanes.get(key).map(|entry| entry.value().clone()) else {
            warn!(key = %key, "Lane not found for shutdown");
            return LaneShutdown::NotFound;
        };
        self.shutdown_lane(lane, timeout).await
    }

    async fn shutdown_lane(&self, lane: Arc<Lane>, timeout: Option<Duration>) -> LaneShutdown {
        let key = lane.key().to_owned();
        lane.begin_drain();

        if self.is_current_lane(&key) {
            warn!(key = %key, "Lane shutdown requested from inside the lane, not waiting");
            self.detach(&key, &lane);
            return LaneShutdown::Detached;
        }

        let _detach = Detach { registry: self, key: &key, lane: &lane };
        let kill_on_drop = lane.kill_guard();

        let drained = match timeout {
            Some(limit) => tokio::time::timeout(limit, lane.terminated()).await.is_ok(),
            None => {
                lane.terminated().await;
                true
            }
        };

        if drained {
            let _ = kill_on_drop.disarm();
            debug!(key = %key, "Lane drained");
            LaneShutdown::Drained
        } else {
            warn!(key = %key, timeout = ?timeout, "Lane did not terminate in time, cancelling remaining tasks");
            drop(kill_on_drop);
            LaneShutdown::Forced
        }
    }

    /// Shuts down every registered lane, one after another.
    ///
    /// Returns `(drained, forced)` counts.
    pub async fn shutdown_all(&self, timeout: Option<Duration>) -> (usize, usize) {
        let lanes: Vec<Arc<Lane>> = self.lanes.iter().map(|entry| entry.value().clone()).collect();
        let mut drained = 0;
        let mut forced = 0;

        for lane in lanes {
            match self.shutdown_lane(lane, timeout).await {
                LaneShutdown::Forced => forced += 1,
                LaneShutdown::Drained | LaneShutdown::Detached => drained += 1,
                LaneShutdown::NotFound => {}
            }
        }
        (drained, forced)
    }

    /// Forgets `key` without waiting. The lane, if any, finishes what it
    /// already queued and then exits.
    pub fn remove(&self, key: &str) -> bool {
        match self.lanes.remove(key) {
            Some((_, lane)) => {
                lane.detach(&self.active);
                lane.begin_drain();
                true
            }
            None => false,
        }
    }

    fn detach(&self, key: &str, lane: &Arc<Lane>) {
        lane.detach(&self.active);
        self.lanes.remove_if(key, |_, current| Arc::ptr_eq(current, lane));
    }

    /// True iff `worker` is executing a task under `key` right now.
    pub fn is_current_worker(&self, key: &str, worker: WorkerId) -> bool {
        self.active.is_current(key, worker)
    }

    /// True iff the caller is a task running on the lane for `key`.
    pub fn is_current_lane(&self, key: &str) -> bool {
        WorkerId::current()
            .map(|worker| self.is_current_worker(key, worker))
            .unwrap_or(false)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lanes.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lanes.iter().map(|entry| entry.key().clone()).collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    pub fn state(&self, key: &str) -> Option<LaneState> {
        self.lanes.get(key).map(|entry| entry.value().state())
    }

    /// Tasks queued on the lane for `key` and not yet started.
    pub fn pending(&self, key: &str) -> Option<usize> {
        self.lanes.get(key).map(|entry| entry.value().pending())
    }
}

/// Drops the registry entries for a lane on every exit path of a shutdown.
struct Detach<'a> {
    registry: &'a LaneRegistry,
    key: &'a str,
    lane: &'a Arc<Lane>,
}

impl Drop for Detach<'_> {
    fn drop(&mut self) {
        self.registry.detach(self.key, self.lane);
    }
}
