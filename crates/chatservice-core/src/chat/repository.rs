//! ChatRepository trait definition.
//!
//! Persists the whole `Chat` aggregate: both message sequences, status,
//! token usage and configuration. Uses native async fn in traits (RPITIT).

use chatservice_types::chat::Chat;
use chatservice_types::error::RepositoryError;

/// Repository trait for chat aggregate persistence.
///
/// Implementations live in chatservice-infra (e.g., `SqliteChatRepository`).
pub trait ChatRepository: Send + Sync {
    /// Insert a never-persisted chat at its current version.
    ///
    /// Returns `AlreadyExists` when a chat with the same id is stored.
    fn create_chat(
        &self,
        chat: &Chat,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Load a chat by id. Returns `NotFound` when no such chat exists.
    fn find_chat_by_id(
        &self,
        chat_id: &str,
    ) -> impl std::future::Future<Output = Result<Chat, RepositoryError>> + Send;

    /// Write back a loaded chat.
    ///
    /// Fails with `Conflict` when the stored version no longer matches
    /// `chat.version()`, and bumps the chat's version on success.
    fn save_chat(
        &self,
        chat: &mut Chat,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
