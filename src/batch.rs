//! Bounded-concurrency batch runner.
//!
//! A [`Batch`] runs a collection of futures on a transient [`WorkerPool`]
//! sized to `min(max_concurrency, tasks)`. The call returns once all tasks
//! succeeded, the first one failed, or the deadline passed. The pool never
//! outlives the call: it is terminated on every exit path, including the
//! caller dropping the `run` future.

use super::{
    errors::ExecError,
    pool::{PoolConfig, ThreadPool, WorkerPool},
    result::ExecResult,
};
use std::{fmt::Display, future::Future};
use futures::{
    FutureExt,
    stream::{FuturesUnordered, StreamExt},
};
use tokio::time::{Duration, Instant};
use tracing::{debug, error, warn};


pub struct Batch<F> {
    tasks: Vec<F>,
    max_concurrency: Option<usize>,
    timeout: Option<Duration>,
}

impl<F> Batch<F> {
    pub fn new<I>(tasks: I) -> Self
    where
        I: IntoIterator<Item = F>,
    {
        Self {
            tasks: tasks.into_iter().collect(),
            max_concurrency: None,
            timeout: None,
        }
    }

    /// Caps how many tasks run at once. Defaults to the number of tasks.
    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = Some(max_concurrency);
        self
    }

    /// Deadline for the whole batch, measured from the start of `run`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout_opt(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn workers(&self) -> usize {
        let total = self.tasks.len();
        match self.max_concurrency {
            Some(0) => {
                warn!(tasks = total, "Batch concurrency cap of 0, running one task at a time");
                1
            }
            Some(cap) => cap.min(total),
            None => total,
        }
    }
}

impl<T, F> Batch<F>
where
    T: Send + 'static,
    F: Future<Output = T> + Send + 'static,
{
    /// Runs every task; results come back in submission order.
    pub async fn run(self) -> ExecResult<Vec<T>> {
        let Batch { tasks, max_concurrency, timeout } = self;
        Batch {
            tasks: tasks.into_iter().map(|fut| fut.map(Ok::<T, String>)).collect(),
            max_concurrency,
            timeout,
        }
        .execute()
        .await
    }
}

impl<T, E, F> Batch<F>
where
    T: Send + 'static,
    E: Display + 'static,
    F: Future<Output = Result<T, E>> + Send + 'static,
{
    /// Like [`run`](Self::run) for fallible tasks: the first `Err` fails the batch.
    pub async fn try_run(self) -> ExecResult<Vec<T>> {
        let Batch { tasks, max_concurrency, timeout } = self;
        Batch {
            tasks: tasks
                .into_iter()
                .map(|fut| fut.map(|res| res.map_err(|e| e.to_string())))
                .collect(),
            max_concurrency,
            timeout,
        }
        .execute()
        .await
    }
}

impl<T, F> Batch<F>
where
    T: Send + 'static,
    F: Future<Output = Result<T, String>> + Send + 'static,
{
    async fn execute(self) -> ExecResult<Vec<T>> {
        if self.tasks.is_empty() {
            return Ok(Vec::new());
        }

        let workers = self.workers();
        let total = self.tasks.len();
        let started = Instant::now();
        let deadline = self.timeout.map(|t| started + t);

        let pool = WorkerPool::with_config(PoolConfig::new(workers, "batch"));
        let _teardown = Teardown(pool.clone());
        debug!(tasks = total, workers, timeout = ?self.timeout, "Running batch");

        let mut pending: FuturesUnordered<_> = pool
            .spawn_many(self.tasks)
            .into_iter()
            .enumerate()
            .map(|(idx, handle)| async move { (idx, handle.await) })
            .collect();

        let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None).take(total).collect();

        let collect = async {
            while let Some((idx, result)) = pending.next().await {
                match result {
                    Ok(Ok(value)) => slots[idx] = Some(value),
                    Ok(Err(msg)) => return Err(ExecError::TaskFailed(msg)),
                    Err(e) => return Err(e),
                }
            }
            Ok(())
        };

        let outcome = match (deadline, self.timeout) {
            (Some(deadline), Some(limit)) => tokio::time::timeout_at(deadline, collect)
                .await
                .unwrap_or(Err(ExecError::Timeout(limit))),
            _ => collect.await,
        };

        if let Err(e) = outcome {
            error!(tasks = total, elapsed = ?started.elapsed(), error = %e, "Exception while awaiting batch");
            return Err(e);
        }

        Ok(slots.into_iter().flatten().collect())
    }
}

/// Terminates the batch pool when the call ends, however it ends.
struct Teardown(ThreadPool);

impl Drop for Teardown {
    fn drop(&mut self) {
        self.0.terminate();
    }
}


/// Runs `tasks` with at most `max_concurrency` in flight and an optional deadline.
pub async fn run_all<T, F, I>(tasks: I, max_concurrency: usize, timeout: Option<Duration>) -> ExecResult<Vec<T>>
where
    T: Send + 'static,
    F: Future<Output = T> + Send + 'static,
    I: IntoIterator<Item = F>,
{
    Batch::new(tasks)
        .max_concurrency(max_concurrency)
        .timeout_opt(timeout)
        .run()
        .await
}

/// Fallible form of [`run_all`].
pub async fn try_run_all<T, E, F, I>(tasks: I, max_concurrency: usize, timeout: Option<Duration>) -> ExecResult<Vec<T>>
where
    T: Send + 'static,
    E: Display + 'static,
    F: Future<Output = Result<T, E>> + Send + 'static,
    I: IntoIterator<Item = F>,
{
    Batch::new(tasks)
        .max_concurrency(max_concurrency)
        .timeout_opt(timeout)
        .try_run()
        .await
}
