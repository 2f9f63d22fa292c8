//! # Executors
//!
//! Process-scoped owner of the lane registry and the shared pool.
//!
//! One value is created at startup and handed to whoever needs to submit
//! work. At exit [`Executors::shutdown_all`] drains every lane, then the
//! shared pool, escalating to cancellation when the pool does not finish
//! within [`Config::pool_shutdown_timeout`].
//!
//! ```text
//! Executors
//!   ├─► lanes(): LaneRegistry   key → Lane (one worker each)
//!   ├─► submit_to_pool(..)      shared WorkerPool, created on first use
//!   ├─► shutdown_all()          lanes first, then the pool
//!   └─► run_until_exit(main)    main, then shutdown_all on return or signal
//! ```

use super::{
    config::Config,
    errors::ExecError,
    handle::JoinHandle,
    model::{PoolMetrics, ShutdownReport},
    pool::{PoolConfig, ThreadPool, WorkerPool},
    registry::LaneRegistry,
    signals::wait_for_shutdown_signal,
};
use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, OnceLock,
    },
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

const SHARED_POOL_NAME: &str = "shared-pool";

pub struct Executors {
    config: Config,
    lanes: LaneRegistry,
    pool: OnceLock<ThreadPool>,
    closed: AtomicBool,
    hook_installed: AtomicBool,
    shutdown_serial: Mutex<()>,
}

impl Executors {
    pub fn new(config: Config) -> Arc<Self> {
        Arc::new(Self {
            config,
            lanes: LaneRegistry::new(),
            pool: OnceLock::new(),
            closed: AtomicBool::new(false),
            hook_installed: AtomicBool::new(false),
            shutdown_serial: Mutex::new(()),
        })
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn lanes(&self) -> &LaneRegistry {
        &self.lanes
    }

    #[inline]
    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn shared_pool(&self) -> Option<&ThreadPool> {
        if self.is_shut_down() {
            return None;
        }
        let pool = self.pool.get_or_init(|| {
            WorkerPool::with_config(PoolConfig::new(self.config.pool_size, SHARED_POOL_NAME))
        });
        // Created while shutdown_all was running: it will never be drained.
        if self.is_shut_down() {
            pool.terminate();
            return None;
        }
        Some(pool)
    }

    fn pool_closed<T>() -> JoinHandle<T> {
        warn!(pool = SHARED_POOL_NAME, "Rejecting task submitted after shutdown");
        JoinHandle::rejected(ExecError::Closed(SHARED_POOL_NAME.to_owned()))
    }

    /// Queues `fut` on the shared pool.
    pub fn submit_to_pool<T, F>(&self, fut: F) -> JoinHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        match self.shared_pool() {
            Some(pool) => pool.spawn(fut),
            None => Self::pool_closed(),
        }
    }

    pub fn submit_blocking_to_pool<T, F>(&self, f: F) -> JoinHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        match self.shared_pool() {
            Some(pool) => pool.spawn_blocking(f),
            None => Self::pool_closed(),
        }
    }

    pub fn submit_many_to_pool<T, F, I>(&self, futs: I) -> Vec<JoinHandle<T>>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
        I: IntoIterator<Item = F>,
    {
        match self.shared_pool() {
            Some(pool) => pool.spawn_many(futs),
            None => futs.into_iter().map(|_| Self::pool_closed()).collect(),
        }
    }

    /// `None` until the shared pool has been used.
    pub fn pool_metrics(&self) -> Option<PoolMetrics> {
        self.pool.get().map(|pool| pool.metrics())
    }

    /// Drains every lane, then the shared pool.
    ///
    /// Safe to call more than once and concurrently; later calls only pick
    /// up lanes created since.
    pub async fn shutdown_all(&self) -> ShutdownReport {
        let _serial = self.shutdown_serial.lock().await;

        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(lanes = self.lanes.len(), "Shutting down executors");
        } else {
            debug!(lanes = self.lanes.len(), "Executors already shut down, sweeping remaining lanes");
        }

        let (lanes_drained, lanes_forced) = self.lanes.shutdown_all(self.config.lane_shutdown_timeout).await;

        let pool_clean = match self.pool.get() {
            Some(pool) => pool.shutdown_timeout(self.config.pool_shutdown_timeout).await,
            None => true,
        };

        let report = ShutdownReport {
            lanes_drained,
            lanes_forced,
            pool_clean,
        };
        info!(
            lanes_drained = report.lanes_drained,
            lanes_forced = report.lanes_forced,
            pool_clean = report.pool_clean,
            "Executors shut down"
        );
        report
    }

    /// Runs `main`, then [`shutdown_all`](Self::shutdown_all), whether `main`
    /// returned normally or a termination signal cut it short.
    ///
    /// The output is `None` when a signal interrupted `main`.
    pub async fn run_until_exit<F: Future>(&self, main: F) -> (Option<F::Output>, ShutdownReport) {
        let signal = async {
            if let Err(e) = wait_for_shutdown_signal().await {
                error!(error = %e, "Failed to listen for termination signals");
                std::future::pending::<()>().await;
            }
        };

        let output = tokio::select! {
            out = main => Some(out),
            _ = signal => {
                info!("Termination signal received");
                None
            }
        };
        (output, self.shutdown_all().await)
    }

    /// Runs [`shutdown_all`](Self::shutdown_all) once the process receives a
    /// termination signal.
    ///
    /// Signals only: a process that returns from `main` normally never fires
    /// the hook. Use [`run_until_exit`](Self::run_until_exit) to cover both.
    /// Only the first call installs the hook; later calls return `None`.
    pub fn install_shutdown_hook(self: &Arc<Self>) -> Option<tokio::task::JoinHandle<Option<ShutdownReport>>> {
        if self.hook_installed.swap(true, Ordering::AcqRel) {
            debug!("Shutdown hook already installed");
            return None;
        }

        let executors = Arc::clone(self);
        Some(tokio::spawn(async move {
            if let Err(e) = wait_for_shutdown_signal().await {
                error!(error = %e, "Failed to listen for termination signals");
                return None;
            }
            info!("Termination signal received");
            Some(executors.shutdown_all().await)
        }))
    }
}
