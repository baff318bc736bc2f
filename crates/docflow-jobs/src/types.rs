//! Job queue data types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use ulid::Ulid;

/// Handle referencing a submitted job, used to poll its status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ticket(Ulid);

impl Ticket {
    /// Generate a fresh ticket
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for Ticket {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a job item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Accepted, waiting for a worker
    Pending,
    /// A worker is executing it
    Running,
    /// Finished successfully
    Done,
    /// Finished unsuccessfully; the reason is never dropped
    Failed {
        /// Human-readable failure reason (includes timeouts)
        reason: String,
    },
    /// Cancelled while still pending
    Cancelled,
}

impl JobStatus {
    /// Whether the job has reached a terminal state
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed { .. } | Self::Cancelled)
    }
}

/// What happens when a named queue is at capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackpressurePolicy {
    /// `enqueue` fails immediately with a queue-full error
    RejectNew,
    /// `enqueue` waits until capacity frees up
    BlockCaller,
}

/// Configuration of one named queue
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Queue name
    pub name: String,
    /// Maximum number of pending items
    pub capacity: usize,
    /// Per-item execution timeout, enforced by the queue
    pub timeout: Duration,
    /// Number of parallel workers
    pub workers: usize,
    /// Capacity policy, chosen explicitly
    pub backpressure: BackpressurePolicy,
}

impl QueueConfig {
    /// Queue for short-lived items (30s timeout)
    #[must_use]
    pub fn short(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capacity: 1000,
            timeout: Duration::from_secs(30),
            workers: 4,
            backpressure: BackpressurePolicy::RejectNew,
        }
    }

    /// General-purpose queue (300s timeout)
    #[must_use]
    pub fn standard(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capacity: 1000,
            timeout: Duration::from_secs(300),
            workers: 2,
            backpressure: BackpressurePolicy::RejectNew,
        }
    }

    /// Queue for long-running items (1500s timeout)
    #[must_use]
    pub fn long(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capacity: 100,
            timeout: Duration::from_secs(1500),
            workers: 1,
            backpressure: BackpressurePolicy::RejectNew,
        }
    }

    /// With pending capacity
    #[inline]
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// With per-item timeout
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// With worker count
    #[inline]
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// With backpressure policy
    #[inline]
    #[must_use]
    pub fn with_backpressure(mut self, policy: BackpressurePolicy) -> Self {
        self.backpressure = policy;
        self
    }
}

/// A request to run a handler on a named queue
#[derive(Debug, Clone)]
pub struct JobRequest {
    /// Registered handler name
    pub handler: String,
    /// Named queue to run on
    pub queue: String,
    /// JSON payload handed to the handler
    pub payload: Value,
    /// Higher runs earlier within the queue
    pub priority: u8,
    /// Override of the queue's timeout, if any
    pub timeout: Option<Duration>,
    /// Total attempts allowed (1 = no retry)
    pub max_attempts: u32,
    /// Whether a timed-out attempt counts toward retry; off by default, so
    /// timed-out items are never silently retried
    pub retry_on_timeout: bool,
    /// Submitting context (user or system)
    pub submitted_by: String,
}

impl JobRequest {
    /// Create a request with defaults: priority 0, one attempt, no timeout
    /// override
    #[must_use]
    pub fn new(handler: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            queue: queue.into(),
            payload: Value::Null,
            priority: 0,
            timeout: None,
            max_attempts: 1,
            retry_on_timeout: false,
            submitted_by: "system".to_string(),
        }
    }

    /// With JSON payload
    #[inline]
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// With priority (higher runs earlier)
    #[inline]
    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// With an explicit timeout, overriding the queue's class
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// With bounded retry: total attempts allowed
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Opt in to retrying timed-out attempts
    #[inline]
    #[must_use]
    pub fn with_retry_on_timeout(mut self) -> Self {
        self.retry_on_timeout = true;
        self
    }

    /// With the submitting context
    #[inline]
    #[must_use]
    pub fn submitted_by(mut self, who: impl Into<String>) -> Self {
        self.submitted_by = who.into();
        self
    }
}

/// Execution context handed to a handler
///
/// Cancellation of a running job is cooperative: the handler observes
/// [`JobContext::is_cancelled`] at its own checkpoints. Nothing is preempted.
#[derive(Debug, Clone)]
pub struct JobContext {
    ticket: Ticket,
    payload: Value,
    cancelled: Arc<AtomicBool>,
}

impl JobContext {
    pub(crate) fn new(ticket: Ticket, payload: Value, cancelled: Arc<AtomicBool>) -> Self {
        Self {
            ticket,
            payload,
            cancelled,
        }
    }

    /// Ticket of the job being executed
    #[inline]
    #[must_use]
    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    /// Payload supplied at enqueue time
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Cooperative cancellation checkpoint
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Counters for one named queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Jobs waiting for a worker
    pub pending: usize,
    /// Jobs currently executing
    pub running: usize,
    /// Jobs finished successfully
    pub done: usize,
    /// Jobs finished unsuccessfully
    pub failed: usize,
    /// Jobs cancelled while pending
    pub cancelled: usize,
}

/// Outcome of a cancellation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Item was pending and is now cancelled
    Cancelled,
    /// Item is running; the cooperative flag was set (best-effort)
    SignalledRunning,
}
