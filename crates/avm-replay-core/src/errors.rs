//! Replay error types.
//!
//! Two kinds of condition can stop the replay engine:
//!
//! - [`ReplayError::MalformedInput`]: the trace or a source descriptor
//!   cannot be replayed at all. Raised at load time, when a program frame is
//!   built, or at the exact opcode unit that breaks an invariant.
//! - [`ReplayError::Lookup`]: an on-demand query named an app, account or frame
//!   that does not exist. Only that query fails.
//!
//! A recorded transaction failure is not an error. It surfaces as
//! [`StepResult::Exception`](crate::StepResult::Exception) when the cursor
//! reaches it.

/// Error raised by the replay engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplayError {
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("lookup failed: {0}")]
    Lookup(String),
}

impl ReplayError {
    pub fn malformed(message: impl Into<String>) -> Self {
        ReplayError::MalformedInput(message.into())
    }

    pub fn lookup(message: impl Into<String>) -> Self {
        ReplayError::Lookup(message.into())
    }

    /// Whether this error ends the session rather than a single query.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ReplayError::MalformedInput(_))
    }
}

pub type ReplayResult<T> = Result<T, ReplayError>;
