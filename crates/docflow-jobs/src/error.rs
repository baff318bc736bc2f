//! Job queue errors

use crate::types::Ticket;

/// Errors raised at the job queue boundary
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Named queue does not exist
    #[error("unknown queue: {0}")]
    UnknownQueue(String),

    /// Handler name was never registered
    #[error("unknown handler: {0}")]
    UnknownHandler(String),

    /// Queue at capacity under the reject-new policy
    #[error("queue '{queue}' is full (capacity {capacity})")]
    QueueFull {
        /// Queue that rejected the submission
        queue: String,
        /// Its configured capacity
        capacity: usize,
    },

    /// No job known for the ticket
    #[error("no job for ticket {0}")]
    NotFound(Ticket),

    /// Job already reached a terminal state
    #[error("job {0} is already finished")]
    AlreadyFinished(Ticket),

    /// Queue is shutting down
    #[error("job queue is shut down")]
    Shutdown,
}
