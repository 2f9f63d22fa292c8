use super::{
    errors::ExecError,
    handle::{
        wrap_async,
        wrap_blocking,
        JoinHandle,
        Outcome,
        Task,
    },
    model::PoolMetrics,
};
use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};
use crossbeam::deque::Injector;
use tokio::{
    sync::Notify,
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};


/// Default size of the shared pool.
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Configuration of a single worker pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub num_threads: usize,
    pub name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            num_threads: DEFAULT_POOL_SIZE,
            name: "shared-pool".to_owned(),
        }
    }
}

impl PoolConfig {
    pub fn new(num_threads: usize, name: impl Into<String>) -> Self {
        Self {
            num_threads: num_threads.max(1),
            name: name.into(),
        }
    }
}


pub type ThreadPool = Arc<WorkerPool>;

/// Fixed set of workers pulling from one shared FIFO queue.
///
/// Used both as the process-wide shared pool and as the transient pool of a batch.
pub struct WorkerPool {
    inject: Injector<Task>,
    global_notify: Notify,
    cancellation_token: CancellationToken,
    closed: AtomicBool,
    /// Queued plus running tasks.
    pending_tasks: AtomicUsize,
    all_tasks_completed: Notify,
    running_tasks: AtomicUsize,
    total_spawned: AtomicUsize,
    completed_tasks: AtomicUsize,
    failed_tasks: AtomicUsize,
    idle_workers: AtomicUsize,
    queued_tasks: AtomicUsize,
    live_workers: AtomicUsize,
    config: PoolConfig,
}

impl WorkerPool {
    pub fn new(num_threads: usize) -> ThreadPool {
        Self::with_config(PoolConfig {
            num_threads,
            ..Default::default()
        })
    }

    /// Starts the workers. Must be called inside a tokio runtime.
    pub fn with_config(config: PoolConfig) -> ThreadPool {
        let config = PoolConfig::new(config.num_threads, config.name);

        let pool = Arc::new(WorkerPool {
            inject: Injector::new(),
            global_notify: Notify::new(),
            cancellation_token: CancellationToken::new(),
            closed: AtomicBool::new(false),
            pending_tasks: AtomicUsize::new(0),
            all_tasks_completed: Notify::new(),
            running_tasks: AtomicUsize::new(0),
            total_spawned: AtomicUsize::new(0),
            completed_tasks: AtomicUsize::new(0),
            failed_tasks: AtomicUsize::new(0),
            idle_workers: AtomicUsize::new(0),
            queued_tasks: AtomicUsize::new(0),
            live_workers: AtomicUsize::new(config.num_threads),
            config,
        });

        debug!(pool = %pool.config.name, workers = pool.config.num_threads, "Starting worker pool");

        for _ in 0..pool.config.num_threads {
            let pool_clone = pool.clone();
            tokio::spawn(async move {
                pool_clone.worker_loop().await;
                pool_clone.live_workers.fetch_sub(1, Ordering::AcqRel);
            });
        }

        pool
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    #[inline]
    pub fn num_threads(&self) -> usize {
        self.config.num_threads
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of worker loops that have not exited yet.
    #[inline]
    pub fn live_workers(&self) -> usize {
        self.live_workers.load(Ordering::Acquire)
    }

    /// Claims a pending slot before the task exists. Paired with the store in
    /// `shutdown`/`terminate`, a submission either sees `closed` here or is
    /// counted by `join_all` and drained with the rest.
    fn admit(&self) -> bool {
        self.pending_tasks.fetch_add(1, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            self.finish_one();
            return false;
        }
        true
    }

    fn push_task(&self, task: Task) {
        self.total_spawned.fetch_add(1, Ordering::Relaxed);
        self.queued_tasks.fetch_add(1, Ordering::Relaxed);
        self.inject.push(task);
        self.global_notify.notify_one();

        // Lost a race with termination: nobody is left to run it.
        if self.cancellation_token.is_cancelled() {
            self.terminate();
        }
    }

    fn rejected<T>(&self) -> JoinHandle<T> {
        warn!(pool = %self.config.name, "Rejecting task submitted after shutdown");
        JoinHandle::rejected(ExecError::Closed(self.config.name.clone()))
    }

    /// Enqueues a future. After shutdown the handle resolves to [`ExecError::Closed`].
    pub fn spawn<T, F>(&self, fut: F) -> JoinHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        if !self.admit() {
            return self.rejected();
        }
        let (task, handle) = wrap_async(fut, &self.cancellation_token);
        self.push_task(task);
        handle
    }

    /// Enqueues a blocking closure; it occupies one worker while it runs.
    pub fn spawn_blocking<T, F>(&self, f: F) -> JoinHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        if !self.admit() {
            return self.rejected();
        }
        let (task, handle) = wrap_blocking(f, &self.cancellation_token);
        self.push_task(task);
        handle
    }

    pub fn spawn_many<T, F, I>(&self, futs: I) -> Vec<JoinHandle<T>>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
        I: IntoIterator<Item = F>,
    {
        futs.into_iter().map(|fut| self.spawn(fut)).collect()
    }

    async fn worker_loop(&self) {
        loop {
            if self.cancellation_token.is_cancelled() {
                break;
            }

            let task = loop {
                let steal = self.inject.steal();
                if !steal.is_retry() {
                    break steal.success();
                }
            };

            if let Some(task) = task {
                self.queued_tasks.fetch_sub(1, Ordering::Relaxed);
                self.running_tasks.fetch_add(1, Ordering::Relaxed);

                match task.await {
                    Outcome::Completed => self.completed_tasks.fetch_add(1, Ordering::Relaxed),
                    Outcome::Failed | Outcome::Cancelled => self.failed_tasks.fetch_add(1, Ordering::Relaxed),
                };

                self.running_tasks.fetch_sub(1, Ordering::Relaxed);
                self.finish_one();
            } else {
                self.idle_workers.fetch_add(1, Ordering::Relaxed);

                tokio::select! {
                    _ = self.global_notify.notified() => {}
                    _ = self.cancellation_token.cancelled() => {
                        self.idle_workers.fetch_sub(1, Ordering::Relaxed);
                        break;
                    }
                }

                self.idle_workers.fetch_sub(1, Ordering::Relaxed);
            }
        }
    }

    fn finish_one(&self) {
        if self.pending_tasks.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.all_tasks_completed.notify_waiters();
        }
    }

    #[inline]
    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            workers: self.config.num_threads,
            running_tasks: self.running_tasks.load(Ordering::Relaxed),
            idle_workers: self.idle_workers.load(Ordering::Relaxed),
            queued_tasks: self.queued_tasks.load(Ordering::Relaxed),
            total_spawned: self.total_spawned.load(Ordering::Relaxed),
            completed_tasks: self.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
        }
    }

    /// Waits until every queued and running task has finished.
    pub async fn join_all(&self) {
        loop {
            let notified = self.all_tasks_completed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.pending_tasks.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub async fn join_all_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.join_all()).await.is_ok()
    }

    /// Stops accepting work, drains the queue, then stops the workers.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.join_all().await;
        self.cancellation_token.cancel();
    }

    /// Like [`shutdown`](Self::shutdown) but gives up after `timeout` and
    /// cancels what is left. Returns `true` if the pool drained in time.
    pub async fn shutdown_timeout(&self, timeout: Duration) -> bool {
        self.closed.store(true, Ordering::SeqCst);
        if !self.join_all_timeout(timeout).await {
            warn!(
                pool = %self.config.name,
                timeout = ?timeout,
                pending = self.pending_tasks.load(Ordering::Relaxed),
                "Pool did not drain in time, cancelling remaining tasks"
            );
            self.terminate();
            return false;
        }
        self.cancellation_token.cancel();
        true
    }

    /// Forced cancellation: rejects new work, cancels running tasks and
    /// drops queued ones. Safe to call repeatedly.
    pub fn terminate(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.cancellation_token.cancel();

        let mut dropped = 0usize;
        loop {
            let steal = self.inject.steal();
            if steal.is_retry() {
                continue;
            }
            match steal.success() {
                Some(task) => {
                    // Dropping the task resolves its handle to `Cancelled`.
                    drop(task);
                    dropped += 1;
                    self.queued_tasks.fetch_sub(1, Ordering::Relaxed);
                    self.failed_tasks.fetch_add(1, Ordering::Relaxed);
                    self.finish_one();
                }
                None => break,
            }
        }

        if dropped > 0 {
            debug!(pool = %self.config.name, dropped, "Dropped queued tasks on termination");
        }
    }
}
