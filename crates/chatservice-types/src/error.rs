use thiserror::Error;

/// Errors raised by the chat aggregate and its value objects.
///
/// None of these leave the aggregate in a modified state: every check runs
/// before the first mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("chat is ended, no more messages allowed")]
    Ended,

    #[error("message needs {required} tokens but the model window is {max_tokens}")]
    Capacity { required: u32, max_tokens: u32 },
}

impl ChatError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        ChatError::Validation(msg.into())
    }
}

/// Errors from repository operations (used by trait definitions in chatservice-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("entity already exists: {0}")]
    AlreadyExists(String),

    #[error("conflict: {0}")]
    Conflict(String),
}
