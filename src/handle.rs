use super::{
    active::WorkerId,
    errors::ExecError,
    result::ExecResult,
};
use std::{
    any::Any,
    future::Future,
    panic::AssertUnwindSafe,
    pin::Pin,
    task::{Context, Poll}
};
use futures::FutureExt;
use tokio::{
    sync::oneshot,
    time::{Duration, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::debug;


/// How a wrapped task ended, as seen by the worker that ran it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Completed,
    Failed,
    Cancelled,
}

pub(crate) type Task = Pin<Box<dyn Future<Output = Outcome> + Send + 'static>>;


/// Handle to a submitted task's eventual outcome.
///
/// Dropping the handle detaches the task: it keeps running and its result is discarded.
pub struct JoinHandle<T> {
    cancel_token: CancellationToken,
    receiver: oneshot::Receiver<ExecResult<T>>,
}

impl<T> JoinHandle<T> {

    pub(crate) fn new
    (
        cancel_token: CancellationToken,
        receiver: oneshot::Receiver<ExecResult<T>>,
    ) -> Self {
        Self {
            cancel_token,
            receiver
        }
    }

    /// Handle that is already resolved with `err`.
    pub(crate) fn rejected(err: ExecError) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(err));
        Self::new(CancellationToken::new(), rx)
    }

    /// Requests cancellation. A task that has not started yet never runs;
    /// a running async task stops at its next await point.
    #[inline]
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Waits at most `timeout`. On timeout the task is left running.
    pub async fn await_timeout(self, timeout: Duration) -> ExecResult<T> {
        self.await_deadline_with(Instant::now() + timeout, timeout).await
    }

    /// Waits until `deadline`. On timeout the task is left running.
    pub async fn await_deadline(self, deadline: Instant) -> ExecResult<T> {
        let budget = deadline.saturating_duration_since(Instant::now());
        self.await_deadline_with(deadline, budget).await
    }

    async fn await_deadline_with(self, deadline: Instant, budget: Duration) -> ExecResult<T> {
        match tokio::time::timeout_at(deadline, self.receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ExecError::Cancelled),
            Err(_) => Err(ExecError::Timeout(budget)),
        }
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = ExecResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            // The worker dropped the task without running it.
            Poll::Ready(res) => Poll::Ready(res.unwrap_or(Err(ExecError::Cancelled))),
            Poll::Pending => Poll::Pending,
        }
    }
}


pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "task panicked with a non-string payload".to_owned()
    }
}

fn report<T>(tx: oneshot::Sender<ExecResult<T>>, result: ExecResult<T>) -> Outcome {
    let outcome = match &result {
        Ok(_) => Outcome::Completed,
        Err(ExecError::TaskFailed(msg)) => {
            debug!(error = %msg, "Task failed");
            Outcome::Failed
        }
        Err(_) => Outcome::Cancelled,
    };
    let _ = tx.send(result);
    outcome
}

/// Wraps a future into a queueable task and the handle observing it.
///
/// The task gets a child of `parent`, the owning worker's token, so that
/// forced cancellation reaches every task.
pub(crate) fn wrap_async<T, F>(fut: F, parent: &CancellationToken) -> (Task, JoinHandle<T>)
where
    T: Send + 'static,
    F: Future<Output = T> + Send + 'static,
{
    let (tx, rx) = oneshot::channel::<ExecResult<T>>();
    let cancel_token = parent.child_token();
    let ct = cancel_token.clone();

    let task: Task = Box::pin(async move {
        let result: ExecResult<T> = tokio::select! {
            biased;
            _ = ct.cancelled() => Err(ExecError::Cancelled),
            res = AssertUnwindSafe(fut).catch_unwind() => {
                res.map_err(|panic| ExecError::TaskFailed(panic_message(&*panic)))
            }
        };
        report(tx, result)
    });

    (task, JoinHandle::new(cancel_token, rx))
}

/// Like [`wrap_async`], but runs `f` on tokio's blocking threads.
///
/// The lane identity of the submitting worker is carried over to the
/// blocking thread. A closure that already started cannot be interrupted:
/// cancelling the handle resolves it at once, but the task keeps its worker
/// until the closure returns. Only cancellation of `parent` releases the
/// worker early.
pub(crate) fn wrap_blocking<T, F>(f: F, parent: &CancellationToken) -> (Task, JoinHandle<T>)
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = oneshot::channel::<ExecResult<T>>();
    let cancel_token = parent.child_token();
    let ct = cancel_token.clone();
    let parent = parent.clone();

    let task: Task = Box::pin(async move {
        if ct.is_cancelled() {
            return report(tx, Err(ExecError::Cancelled));
        }

        let worker = WorkerId::current();
        let mut blocking = tokio::task::spawn_blocking(move || {
            std::panic::catch_unwind(AssertUnwindSafe(move || match worker {
                Some(id) => id.sync_scope(f),
                None => f(),
            }))
        });

        let joined = tokio::select! {
            biased;
            _ = ct.cancelled() => None,
            joined = &mut blocking => Some(joined),
        };

        let Some(joined) = joined else {
            let outcome = report(tx, Err(ExecError::Cancelled));
            tokio::select! {
                biased;
                _ = parent.cancelled() => {}
                _ = blocking => {}
            }
            return outcome;
        };

        let result: ExecResult<T> = match joined {
            Ok(Ok(val)) => Ok(val),
            Ok(Err(panic)) => Err(ExecError::TaskFailed(panic_message(&*panic))),
            Err(join_err) if join_err.is_panic() => {
                Err(ExecError::TaskFailed(join_err.to_string()))
            }
            Err(_) => Err(ExecError::Interrupted),
        };
        report(tx, result)
    });

    (task, JoinHandle::new(cancel_token, rx))
}
