//! A lane: one worker draining one unbounded FIFO queue, one task at a time.

use super::{
    active::{ActiveWorkers, WorkerId},
    errors::ExecError,
    handle::{wrap_async, wrap_blocking, JoinHandle, Task},
    model::{AtomicLaneState, LaneState},
};
use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, trace, warn};

pub(crate) struct Lane {
    key: String,
    worker: WorkerId,
    sender: mpsc::UnboundedSender<Task>,
    state: AtomicLaneState,
    queued: AtomicUsize,
    detached: AtomicBool,
    drain_token: CancellationToken,
    kill_token: CancellationToken,
    finished: CancellationToken,
}

impl Lane {
    /// Creates the lane and starts its worker on the current runtime.
    pub(crate) fn spawn(key: &str, active: Arc<ActiveWorkers>) -> Arc<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let lane = Arc::new(Self {
            key: key.to_owned(),
            worker: WorkerId::next(),
            sender,
            state: AtomicLaneState::new(LaneState::Active),
            queued: AtomicUsize::new(0),
            detached: AtomicBool::new(false),
            drain_token: CancellationToken::new(),
            kill_token: CancellationToken::new(),
            finished: CancellationToken::new(),
        });

        debug!(key = %lane.key, worker = %lane.worker, "Starting lane");
        tokio::spawn(lane.clone().run(receiver, active));
        lane
    }

    async fn run(self: Arc<Self>, mut receiver: mpsc::UnboundedReceiver<Task>, active: Arc<ActiveWorkers>) {
        let finished = self.finished.clone().drop_guard();
        let mut draining = false;

        loop {
            let task = tokio::select! {
                biased;
                _ = self.kill_token.cancelled() => break,
                _ = self.drain_token.cancelled(), if !draining => {
                    // Buffered tasks are still delivered after close.
                    receiver.close();
                    draining = true;
                    continue;
                }
                next = receiver.recv() => match next {
                    Some(task) => task,
                    None => break,
                },
            };

            self.queued.fetch_sub(1, Ordering::Relaxed);
            let _running = active.enter(&self.key, self.worker, &self.detached);
            let outcome = self.worker.scope(task).await;
            trace!(key = %self.key, ?outcome, "Lane task finished");
        }

        self.state.advance(LaneState::Terminated);

        // Unstarted tasks resolve their handles to `Cancelled`.
        let dropped = self.queued.swap(0, Ordering::Relaxed);
        drop(receiver);
        if dropped > 0 {
            warn!(key = %self.key, dropped, "Lane terminated with queued tasks");
        } else {
            debug!(key = %self.key, "Lane terminated");
        }
        drop(finished);
    }

    #[inline]
    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    #[inline]
    pub(crate) fn state(&self) -> LaneState {
        self.state.load()
    }

    #[inline]
    pub(crate) fn pending(&self) -> usize {
        self.queued.load(Ordering::Relaxed)
    }

    pub(crate) fn submit<T, F>(&self, fut: F) -> JoinHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        if self.state() != LaneState::Active {
            return self.rejected();
        }
        let (task, handle) = wrap_async(fut, &self.kill_token);
        self.enqueue(task, handle)
    }

    pub(crate) fn submit_blocking<T, F>(&self, f: F) -> JoinHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        if self.state() != LaneState::Active {
            return self.rejected();
        }
        let (task, handle) = wrap_blocking(f, &self.kill_token);
        self.enqueue(task, handle)
    }

    fn enqueue<T>(&self, task: Task, handle: JoinHandle<T>) -> JoinHandle<T> {
        self.queued.fetch_add(1, Ordering::Relaxed);
        if self.sender.send(task).is_err() {
            self.queued.fetch_sub(1, Ordering::Relaxed);
            return self.rejected();
        }
        handle
    }

    fn rejected<T>(&self) -> JoinHandle<T> {
        warn!(key = %self.key, state = ?self.state(), "Rejecting task for closed lane");
        JoinHandle::rejected(ExecError::Closed(format!("lane {}", self.key)))
    }

    /// Stops accepting work; the worker exits once the queue is empty.
    pub(crate) fn begin_drain(&self) {
        self.state.advance(LaneState::Draining);
        self.drain_token.cancel();
    }

    /// Drops this lane's claim on its key in `active`; tasks it still runs
    /// are no longer reported as running under the key.
    pub(crate) fn detach(&self, active: &ActiveWorkers) {
        self.detached.store(true, Ordering::SeqCst);
        active.exit(&self.key, self.worker);
    }

    /// Cancels the running task and drops everything queued.
    pub(crate) fn kill(&self) {
        self.state.advance(LaneState::Draining);
        self.kill_token.cancel();
    }

    /// Kills the lane when dropped unless disarmed.
    pub(crate) fn kill_guard(&self) -> DropGuard {
        self.kill_token.clone().drop_guard()
    }

    /// Resolves once the worker has exited.
    pub(crate) async fn terminated(&self) {
        self.finished.cancelled().await;
    }
}
