//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use chatservice_core::completion::CompletionError;
use chatservice_types::error::RepositoryError;

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Completion exchange errors.
    Completion(CompletionError),
    /// Direct repository errors (chat lookup, end).
    Repository(RepositoryError),
    /// Authentication failure.
    Unauthorized(String),
    /// Validation error.
    Validation(String),
    /// Generic internal error.
    Internal(String),
}

impl From<CompletionError> for AppError {
    fn from(e: CompletionError) -> Self {
        AppError::Completion(e)
    }
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        AppError::Repository(e)
    }
}

/// HTTP status for a completion failure.
pub fn completion_status(err: &CompletionError) -> StatusCode {
    match err {
        CompletionError::InvalidMessage(_) => StatusCode::BAD_REQUEST,
        CompletionError::ChatEnded => StatusCode::CONFLICT,
        CompletionError::CapacityExceeded { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        CompletionError::GenerationFailed(_) => StatusCode::BAD_GATEWAY,
        CompletionError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        CompletionError::ChatCreationFailed(_)
        | CompletionError::ChatLookupFailed(_)
        | CompletionError::PersistenceFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl AppError {
    /// Status, machine-readable code and message for this error.
    pub fn parts(&self) -> (StatusCode, String, String) {
        match self {
            AppError::Completion(e) => (completion_status(e), e.code().to_uppercase(), e.to_string()),
            AppError::Repository(RepositoryError::NotFound) => (
                StatusCode::NOT_FOUND,
                "CHAT_NOT_FOUND".to_string(),
                "Chat not found".to_string(),
            ),
            AppError::Repository(e @ RepositoryError::Conflict(_)) => {
                (StatusCode::CONFLICT, "CONFLICT".to_string(), e.to_string())
            }
            AppError::Repository(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "REPOSITORY_ERROR".to_string(),
                e.to_string(),
            ),
            AppError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED".to_string(), msg.clone())
            }
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR".to_string(), msg.clone())
            }
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR".to_string(),
                msg.clone(),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            tracing::error!(code = %code, "{message}");
        }

        let body = ApiResponse::error(&code, &message, String::new(), 0);
        let body = serde_json::to_string(&body).unwrap_or_else(|_| {
            r#"{"errors":[{"code":"SERIALIZATION_ERROR","message":"Failed to serialize response"}]}"#.to_string()
        });

        (
            status,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatservice_types::error::ChatError;
    use chatservice_types::llm::LlmError;

    #[test]
    fn completion_errors_map_to_status() {
        let cases = [
            (
                CompletionError::InvalidMessage(ChatError::Validation("empty".into())),
                StatusCode::BAD_REQUEST,
                "INVALID_MESSAGE",
            ),
            (CompletionError::ChatEnded, StatusCode::CONFLICT, "CHAT_ENDED"),
            (
                CompletionError::CapacityExceeded {
                    required: 10,
                    max_tokens: 5,
                },
                StatusCode::PAYLOAD_TOO_LARGE,
                "CAPACITY_EXCEEDED",
            ),
            (
                CompletionError::GenerationFailed(LlmError::EmptyResponse),
                StatusCode::BAD_GATEWAY,
                "GENERATION_FAILED",
            ),
            (
                CompletionError::PersistenceFailed(RepositoryError::Connection),
                StatusCode::INTERNAL_SERVER_ERROR,
                "PERSISTENCE_FAILED",
            ),
            (
                CompletionError::Cancelled,
                StatusCode::SERVICE_UNAVAILABLE,
                "CANCELLED",
            ),
        ];

        for (err, status, code) in cases {
            let (got_status, got_code, _) = AppError::from(err).parts();
            assert_eq!(got_status, status);
            assert_eq!(got_code, code);
        }
    }

    #[test]
    fn missing_chat_is_not_found() {
        let (status, code, _) = AppError::from(RepositoryError::NotFound).parts();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(code, "CHAT_NOT_FOUND");
    }

    #[test]
    fn into_response_uses_status() {
        let resp = AppError::Unauthorized("nope".into()).into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
