//! Named queues and worker pools
//!
//! [`JobQueue`] owns a set of named queues, each with its own capacity,
//! timeout class, backpressure policy, and worker pool. Pools are
//! independent, so a long-running item can never starve a short queue.
//! Submission returns a [`Ticket`] immediately; execution is asynchronous
//! with respect to the submitting context.

use crate::error::JobError;
use crate::handler::JobHandler;
use crate::types::{
    BackpressurePolicy, CancelOutcome, JobContext, JobRequest, JobStatus, QueueConfig, QueueStats,
    Ticket,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::JoinHandle;

/// A queued reference to a job record
///
/// Holds the capacity permit; dropping the item (when a worker pops it)
/// frees one slot in the queue.
struct PendingItem {
    priority: u8,
    seq: u64,
    ticket: Ticket,
    _permit: OwnedSemaphorePermit,
}

impl PartialEq for PendingItem {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for PendingItem {}

impl PartialOrd for PendingItem {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingItem {
    // Max-heap: higher priority first, then FIFO within a priority
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct QueueState {
    config: QueueConfig,
    pending: Mutex<BinaryHeap<PendingItem>>,
    capacity: Arc<Semaphore>,
    notify: Notify,
}

struct JobRecord {
    request: JobRequest,
    status: JobStatus,
    attempts: u32,
    result: Option<Value>,
    cancel_flag: Arc<AtomicBool>,
    finished_at: Option<DateTime<Utc>>,
}

/// Builder for [`JobQueue`]
///
/// Queues and handlers are declared up front; after [`build`] the set is
/// immutable, mirroring the hook registry's init-once lifecycle.
///
/// [`build`]: JobQueueBuilder::build
#[derive(Default)]
pub struct JobQueueBuilder {
    queues: Vec<QueueConfig>,
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl JobQueueBuilder {
    /// Declare a named queue
    #[must_use]
    pub fn queue(mut self, config: QueueConfig) -> Self {
        self.queues.push(config);
        self
    }

    /// Register a handler by name
    #[must_use]
    pub fn handler(mut self, name: impl Into<String>, handler: Arc<dyn JobHandler>) -> Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    /// Build the queue and spawn its worker pools
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn build(self) -> Arc<JobQueue> {
        let queues: HashMap<String, Arc<QueueState>> = self
            .queues
            .into_iter()
            .map(|config| {
                let state = Arc::new(QueueState {
                    capacity: Arc::new(Semaphore::new(config.capacity)),
                    pending: Mutex::new(BinaryHeap::new()),
                    notify: Notify::new(),
                    config,
                });
                (state.config.name.clone(), state)
            })
            .collect();

        let queue = Arc::new(JobQueue {
            queues,
            handlers: self.handlers,
            records: DashMap::new(),
            seq: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
            shutdown_notify: Notify::new(),
            workers: Mutex::new(Vec::new()),
        });

        let mut handles = Vec::new();
        for state in queue.queues.values() {
            for _ in 0..state.config.workers.max(1) {
                handles.push(tokio::spawn(worker_loop(
                    Arc::clone(&queue),
                    Arc::clone(state),
                )));
            }
        }
        *queue.workers.lock() = handles;
        queue
    }
}

/// Deferred work broker: named queues, priorities, timeouts, tickets
pub struct JobQueue {
    queues: HashMap<String, Arc<QueueState>>,
    handlers: HashMap<String, Arc<dyn JobHandler>>,
    records: DashMap<Ticket, JobRecord>,
    seq: AtomicU64,
    shutdown: AtomicBool,
    shutdown_notify: Notify,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl JobQueue {
    /// Start declaring queues and handlers
    #[inline]
    #[must_use]
    pub fn builder() -> JobQueueBuilder {
        JobQueueBuilder::default()
    }

    /// Submit a job, returning its ticket
    ///
    /// Returns as soon as the item is accepted; the only wait is capacity
    /// backpressure under the [`BackpressurePolicy::BlockCaller`] policy.
    ///
    /// # Errors
    /// - [`JobError::UnknownQueue`] / [`JobError::UnknownHandler`]
    /// - [`JobError::QueueFull`] under the reject-new policy
    /// - [`JobError::Shutdown`] after shutdown began
    pub async fn enqueue(&self, request: JobRequest) -> Result<Ticket, JobError> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(JobError::Shutdown);
        }
        let state = self
            .queues
            .get(&request.queue)
            .ok_or_else(|| JobError::UnknownQueue(request.queue.clone()))?;
        if !self.handlers.contains_key(&request.handler) {
            return Err(JobError::UnknownHandler(request.handler.clone()));
        }

        let permit = match state.config.backpressure {
            BackpressurePolicy::RejectNew => Arc::clone(&state.capacity)
                .try_acquire_owned()
                .map_err(|e| match e {
                    TryAcquireError::Closed => JobError::Shutdown,
                    TryAcquireError::NoPermits => JobError::QueueFull {
                        queue: state.config.name.clone(),
                        capacity: state.config.capacity,
                    },
                })?,
            // The semaphore is closed on shutdown, which fails blocked
            // callers here instead of leaving them waiting forever
            BackpressurePolicy::BlockCaller => Arc::clone(&state.capacity)
                .acquire_owned()
                .await
                .map_err(|_| JobError::Shutdown)?,
        };

        let ticket = Ticket::new();
        let priority = request.priority;
        tracing::debug!(%ticket, queue = %request.queue, handler = %request.handler, "job enqueued");

        self.records.insert(
            ticket,
            JobRecord {
                request,
                status: JobStatus::Pending,
                attempts: 0,
                result: None,
                cancel_flag: Arc::new(AtomicBool::new(false)),
                finished_at: None,
            },
        );
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        state.pending.lock().push(PendingItem {
            priority,
            seq,
            ticket,
            _permit: permit,
        });
        state.notify.notify_one();
        Ok(ticket)
    }

    /// Current status of a job
    #[must_use]
    pub fn status(&self, ticket: Ticket) -> Option<JobStatus> {
        self.records.get(&ticket).map(|r| r.status.clone())
    }

    /// Result value of a finished job
    #[must_use]
    pub fn result(&self, ticket: Ticket) -> Option<Value> {
        self.records.get(&ticket).and_then(|r| r.result.clone())
    }

    /// Number of attempts made so far
    #[must_use]
    pub fn attempts(&self, ticket: Ticket) -> Option<u32> {
        self.records.get(&ticket).map(|r| r.attempts)
    }

    /// Cancel a job
    ///
    /// Pending items are cancelled outright. For a running item the
    /// cooperative flag is set and the handler decides when (or whether) to
    /// stop. Best-effort, never preemptive.
    ///
    /// # Errors
    /// - [`JobError::NotFound`] for an unknown ticket
    /// - [`JobError::AlreadyFinished`] for a terminal job
    pub fn cancel(&self, ticket: Ticket) -> Result<CancelOutcome, JobError> {
        let mut record = self
            .records
            .get_mut(&ticket)
            .ok_or(JobError::NotFound(ticket))?;
        match record.status {
            JobStatus::Pending => {
                record.status = JobStatus::Cancelled;
                record.finished_at = Some(Utc::now());
                tracing::debug!(%ticket, "pending job cancelled");
                Ok(CancelOutcome::Cancelled)
            }
            JobStatus::Running => {
                record.cancel_flag.store(true, Ordering::Relaxed);
                tracing::debug!(%ticket, "running job signalled for cooperative cancel");
                Ok(CancelOutcome::SignalledRunning)
            }
            _ => Err(JobError::AlreadyFinished(ticket)),
        }
    }

    /// Counters for one named queue
    ///
    /// # Errors
    /// [`JobError::UnknownQueue`] when the queue does not exist.
    pub fn stats(&self, queue: &str) -> Result<QueueStats, JobError> {
        if !self.queues.contains_key(queue) {
            return Err(JobError::UnknownQueue(queue.to_string()));
        }
        let mut stats = QueueStats::default();
        for record in self.records.iter() {
            if record.request.queue != queue {
                continue;
            }
            match record.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Done => stats.done += 1,
                JobStatus::Failed { .. } => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }
        Ok(stats)
    }

    /// Drop records of jobs in a terminal state, returning how many
    pub fn prune_terminal(&self) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| !record.status.is_terminal());
        before - self.records.len()
    }

    /// Stop accepting work and wait for workers to drain
    ///
    /// Enqueuers blocked on capacity backpressure fail with
    /// [`JobError::Shutdown`] rather than waiting forever.
    pub async fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for state in self.queues.values() {
            state.capacity.close();
        }
        self.shutdown_notify.notify_waiters();
        let handles: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }

    async fn process(&self, state: &QueueState, ticket: Ticket) {
        // Snapshot under the map guard; never hold it across an await
        let snapshot = {
            let mut record = match self.records.get_mut(&ticket) {
                Some(record) => record,
                None => return,
            };
            if record.status != JobStatus::Pending {
                // Cancelled while pending
                return;
            }
            record.status = JobStatus::Running;
            (
                record.request.handler.clone(),
                record.request.payload.clone(),
                record.request.timeout.unwrap_or(state.config.timeout),
                record.request.max_attempts,
                record.request.retry_on_timeout,
                Arc::clone(&record.cancel_flag),
            )
        };
        let (handler_name, payload, timeout, max_attempts, retry_on_timeout, cancel_flag) = snapshot;

        let Some(handler) = self.handlers.get(&handler_name) else {
            // Validated at enqueue; unreachable unless records were tampered with
            self.finish(ticket, 0, Err(format!("handler '{handler_name}' missing")));
            return;
        };

        let ctx = JobContext::new(ticket, payload, cancel_flag);
        let mut attempts = 0u32;
        let outcome = loop {
            attempts += 1;
            match tokio::time::timeout(timeout, handler.execute(&ctx)).await {
                Ok(Ok(value)) => break Ok(value),
                Ok(Err(err)) => {
                    if attempts < max_attempts {
                        tracing::warn!(%ticket, attempt = attempts, error = %err, "job attempt failed, retrying");
                        continue;
                    }
                    break Err(format!("{err:#}"));
                }
                Err(_) => {
                    let reason = format!("timed out after {timeout:?}");
                    if retry_on_timeout && attempts < max_attempts {
                        tracing::warn!(%ticket, attempt = attempts, "job attempt timed out, retry requested");
                        continue;
                    }
                    break Err(reason);
                }
            }
        };
        self.finish(ticket, attempts, outcome);
    }

    fn finish(&self, ticket: Ticket, attempts: u32, outcome: Result<Value, String>) {
        let Some(mut record) = self.records.get_mut(&ticket) else {
            return;
        };
        record.attempts = attempts;
        record.finished_at = Some(Utc::now());
        match outcome {
            Ok(value) => {
                tracing::debug!(%ticket, "job done");
                record.status = JobStatus::Done;
                record.result = Some(value);
            }
            Err(reason) => {
                tracing::warn!(%ticket, %reason, "job failed");
                record.status = JobStatus::Failed { reason };
            }
        }
    }
}

async fn worker_loop(queue: Arc<JobQueue>, state: Arc<QueueState>) {
    loop {
        let item = state.pending.lock().pop();
        match item {
            Some(item) => {
                let ticket = item.ticket;
                drop(item); // release the capacity permit before executing
                queue.process(&state, ticket).await;
            }
            None => {
                if queue.shutdown.load(Ordering::SeqCst) {
                    break;
                }
                tokio::select! {
                    () = state.notify.notified() => {}
                    () = queue.shutdown_notify.notified() => {}
                }
            }
        }
    }
}
