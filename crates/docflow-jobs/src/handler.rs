//! Job handlers

use crate::types::JobContext;
use async_trait::async_trait;
use serde_json::Value;

/// Deferred work executed by a queue worker
///
/// Handlers are registered by name when the queue is built (init-once,
/// mirroring the hook registry) and referenced by that name at enqueue time.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Execute the job
    ///
    /// The queue enforces the timeout; the handler body does not need its
    /// own deadline. Long-running handlers should poll
    /// [`JobContext::is_cancelled`] at convenient checkpoints.
    async fn execute(&self, ctx: &JobContext) -> anyhow::Result<Value>;
}
