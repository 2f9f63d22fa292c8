use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone)]
pub struct PoolMetrics {
    pub workers: usize,
    pub running_tasks: usize,
    pub idle_workers: usize,
    pub queued_tasks: usize,
    pub total_spawned: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
}

impl PoolMetrics {
    pub fn utilization(&self) -> f64 {
        if self.workers == 0 {
            return 0.0;
        }
        self.running_tasks as f64 / self.workers as f64
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.completed_tasks + self.failed_tasks;
        if total == 0 {
            return 1.0;
        }
        self.completed_tasks as f64 / total as f64
    }
}

/// Lifecycle of a single lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LaneState {
    /// Accepting and running work.
    Active = 0,
    /// No longer accepting work, finishing what is queued.
    Draining = 1,
    /// Worker has exited.
    Terminated = 2,
}

impl LaneState {
    #[inline]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Active,
            1 => Self::Draining,
            _ => Self::Terminated,
        }
    }
}

/// Lock-free cell holding a [`LaneState`].
#[derive(Debug)]
pub(crate) struct AtomicLaneState(AtomicU8);

impl AtomicLaneState {
    pub(crate) fn new(state: LaneState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    #[inline]
    pub(crate) fn load(&self) -> LaneState {
        LaneState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves forward only; a terminated lane never becomes draining again.
    pub(crate) fn advance(&self, to: LaneState) -> LaneState {
        LaneState::from_u8(self.0.fetch_max(to as u8, Ordering::AcqRel))
    }
}

/// How a lane shutdown ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneShutdown {
    /// Queued and in-flight work finished within the timeout.
    Drained,
    /// The timeout elapsed and remaining work was cancelled.
    Forced,
    /// No lane was registered under the key.
    NotFound,
    /// Requested from inside the lane; draining started without waiting.
    Detached,
}

/// Summary returned by `Executors::shutdown_all`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub lanes_drained: usize,
    pub lanes_forced: usize,
    pub pool_clean: bool,
}
