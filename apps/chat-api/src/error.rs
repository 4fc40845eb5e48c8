use std::fmt;

/// Failures in the message pipeline.
///
/// Nothing in here ever reaches a connected client as an error: the
/// user-visible contract is "your message was delivered live", and
/// durability is enforced internally by retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// Client-caused: empty or oversized message text. Rejected at the
    /// gateway before the message enters the pipeline.
    InvalidMessage(String),
    /// The buffer store could not be reached or refused the operation.
    BufferUnavailable(String),
    /// A durable append failed after the room's buffer was already drained.
    FlushExecution(String),
    /// The flush scheduler could not accept a job request.
    SchedulerUnavailable(String),
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatError::InvalidMessage(msg) => write!(f, "invalid message: {msg}"),
            ChatError::BufferUnavailable(msg) => write!(f, "buffer store unavailable: {msg}"),
            ChatError::FlushExecution(msg) => write!(f, "flush execution failed: {msg}"),
            ChatError::SchedulerUnavailable(msg) => write!(f, "flush scheduler unavailable: {msg}"),
        }
    }
}

impl std::error::Error for ChatError {}
