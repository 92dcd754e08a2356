//! Vidra Worker Library
//!
//! Durable job queue abstraction and the bounded worker pool that drives
//! video processing jobs through retries, backoff, and timeouts.

pub mod context;
pub mod pool;
pub mod queue;

pub use context::JobHandlerContext;
pub use pool::{WorkerPool, WorkerPoolConfig};
pub use queue::{compute_retry_backoff_secs, InMemoryJobQueue, JobQueue, MAX_RETRY_BACKOFF_SECS};
