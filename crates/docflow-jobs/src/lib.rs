//! Docflow Jobs - Deferred execution for the lifecycle runtime
//!
//! Work that should not block a lifecycle transition is submitted here:
//! - Named queues with distinct timeout classes (short/standard/long)
//! - Independent worker pools per queue, so long items never starve short ones
//! - Tickets for status polling; failures (including timeouts) are recorded,
//!   never dropped
//! - Explicit backpressure policy per queue: reject new or block the caller
//! - At most one attempt by default; bounded retry on request

#![warn(unreachable_pub)]

pub mod error;
pub mod handler;
pub mod queue;
pub mod types;

pub use error::JobError;
pub use handler::JobHandler;
pub use queue::{JobQueue, JobQueueBuilder};
pub use types::{
    BackpressurePolicy, CancelOutcome, JobContext, JobRequest, JobStatus, QueueConfig, QueueStats,
    Ticket,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
