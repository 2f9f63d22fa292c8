//! In-process executors with named sequential lanes.
//!
//! # Features
//! - Per-key lanes: strict FIFO, one task at a time, lazily created
//! - Re-entrancy detection through the active-worker index
//! - Shared fixed-size pool for untagged background work
//! - Bounded-concurrency batches with a deadline and fail-fast cancellation
//! - Coordinated shutdown with timeouts, escalating to cancellation

pub mod active;
pub mod batch;
pub mod config;
pub mod errors;
pub mod executors;
pub mod handle;
mod lane;
pub mod model;
pub mod pool;
pub mod registry;
pub mod result;
pub mod signals;

pub use active::WorkerId;
pub use batch::{run_all, try_run_all, Batch};
pub use config::Config;
pub use errors::ExecError;
pub use executors::Executors;
pub use handle::JoinHandle;
pub use model::{LaneShutdown, LaneState, PoolMetrics, ShutdownReport};
pub use pool::{PoolConfig, ThreadPool, WorkerPool};
pub use registry::LaneRegistry;
pub use result::ExecResult;
