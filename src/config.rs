use super::pool::DEFAULT_POOL_SIZE;
use tokio::time::Duration;

/// Default bound on draining the shared pool at shutdown.
pub const DEFAULT_POOL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration of an [`Executors`](crate::Executors) instance
#[derive(Debug, Clone)]
pub struct Config {
    /// Worker count of the shared pool, fixed for its lifetime.
    pub pool_size: usize,
    /// How long `shutdown_all` waits for the shared pool before cancelling it.
    pub pool_shutdown_timeout: Duration,
    /// How long `shutdown_all` waits for each lane; `None` waits forever.
    pub lane_shutdown_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            pool_shutdown_timeout: DEFAULT_POOL_SHUTDOWN_TIMEOUT,
            lane_shutdown_timeout: None,
        }
    }
}

impl Config {
    pub fn cpu_bound() -> Self {
        Self {
            pool_size: num_cpus::get(),
            ..Default::default()
        }
    }

    pub fn io_bound() -> Self {
        Self {
            pool_size: num_cpus::get() * 2, // workers mostly wait on I/O
            ..Default::default()
        }
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }

    pub fn with_pool_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.pool_shutdown_timeout = timeout;
        self
    }

    pub fn with_lane_shutdown_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lane_shutdown_timeout = timeout;
        self
    }
}
