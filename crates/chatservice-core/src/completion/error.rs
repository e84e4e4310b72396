//! Errors surfaced by the chat completion use case.

use chatservice_types::error::{ChatError, RepositoryError};
use chatservice_types::llm::LlmError;
use thiserror::Error;

/// Why a completion exchange did not produce a persisted answer.
///
/// Each variant has a stable machine-readable [`code`](CompletionError::code)
/// that transports expose to clients.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("error creating new chat: {0}")]
    ChatCreationFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("error fetching existing chat: {0}")]
    ChatLookupFailed(#[source] RepositoryError),

    #[error("invalid message: {0}")]
    InvalidMessage(#[source] ChatError),

    #[error("chat is ended, no more messages allowed")]
    ChatEnded,

    #[error("message needs {required} tokens but the model window is {max_tokens}")]
    CapacityExceeded { required: u32, max_tokens: u32 },

    #[error("generation failed: {0}")]
    GenerationFailed(#[source] LlmError),

    #[error("error persisting chat: {0}")]
    PersistenceFailed(#[source] RepositoryError),

    #[error("request cancelled")]
    Cancelled,
}

impl CompletionError {
    pub fn code(&self) -> &'static str {
        match self {
            CompletionError::ChatCreationFailed(_) => "chat_creation_failed",
            CompletionError::ChatLookupFailed(_) => "chat_lookup_failed",
            CompletionError::InvalidMessage(_) => "invalid_message",
            CompletionError::ChatEnded => "chat_ended",
            CompletionError::CapacityExceeded { .. } => "capacity_exceeded",
            CompletionError::GenerationFailed(_) => "generation_failed",
            CompletionError::PersistenceFailed(_) => "persistence_failed",
            CompletionError::Cancelled => "cancelled",
        }
    }

    pub(crate) fn creation(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        CompletionError::ChatCreationFailed(Box::new(err))
    }
}

/// Classify an aggregate rejection of a new message.
impl From<ChatError> for CompletionError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Ended => CompletionError::ChatEnded,
            ChatError::Capacity {
                required,
                max_tokens,
            } => CompletionError::CapacityExceeded {
                required,
                max_tokens,
            },
            validation @ ChatError::Validation(_) => CompletionError::InvalidMessage(validation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_errors_are_classified() {
        assert_eq!(
            CompletionError::from(ChatError::Ended).code(),
            "chat_ended"
        );
        assert_eq!(
            CompletionError::from(ChatError::Capacity {
                required: 10,
                max_tokens: 5
            })
            .code(),
            "capacity_exceeded"
        );
        assert_eq!(
            CompletionError::from(ChatError::Validation("content is empty".into())).code(),
            "invalid_message"
        );
    }

    #[test]
    fn creation_keeps_cause_in_message() {
        let err = CompletionError::creation(RepositoryError::AlreadyExists("c1".into()));
        assert_eq!(err.code(), "chat_creation_failed");
        assert!(err.to_string().contains("entity already exists: c1"));
    }
}
