//! Chat aggregate, message, and configuration types.
//!
//! A [`Chat`] owns a bounded context window: the active messages that are sent
//! to the model on every exchange, plus the history of messages that were
//! evicted to keep the window inside the model's token capacity.
//!
//! Every mutation goes through [`Chat::add_message`] or [`Chat::end`], so the
//! token accounting below always matches the active window:
//! `token_usage == sum(active_messages[*].token_count)`.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Re-export MessageRole from llm module (it's used in both chat and llm contexts).
pub use crate::llm::MessageRole;

use crate::error::ChatError;
use crate::llm::Message;
use crate::model::Model;

/// Lifecycle status of a chat. Only ever moves `Active -> Ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatStatus {
    #[default]
    Active,
    Ended,
}

impl fmt::Display for ChatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatStatus::Active => write!(f, "active"),
            ChatStatus::Ended => write!(f, "ended"),
        }
    }
}

impl FromStr for ChatStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(ChatStatus::Active),
            "ended" => Ok(ChatStatus::Ended),
            other => Err(format!("invalid chat status: '{other}'")),
        }
    }
}

/// A single immutable message within a chat.
///
/// The token count is computed once, when the message is built, and never
/// recomputed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    id: String,
    role: MessageRole,
    content: String,
    token_count: u32,
    created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(
        id: impl Into<String>,
        role: MessageRole,
        content: impl Into<String>,
        token_count: u32,
        created_at: DateTime<Utc>,
    ) -> Result<Self, ChatError> {
        let id = id.into();
        let content = content.into();

        if id.is_empty() {
            return Err(ChatError::validation("message id is empty"));
        }
        if content.is_empty() {
            return Err(ChatError::validation("content is empty"));
        }
        // A zero/epoch timestamp means the clock could not provide a real time.
        if created_at.timestamp() <= 0 {
            return Err(ChatError::validation("invalid created at"));
        }

        Ok(Self {
            id,
            role,
            content,
            token_count,
            created_at,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> MessageRole {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn token_count(&self) -> u32 {
        self.token_count
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Project into the role/content pair a provider consumes.
    pub fn to_llm_message(&self) -> Message {
        Message {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// Model and sampling parameters fixed for the lifetime of a chat.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatConfig {
    pub model: Model,
    /// 0.0 to 2.0.
    pub temperature: f32,
    /// 0.0 to 1.0.
    pub top_p: f32,
    /// Number of choices to generate.
    pub n: u8,
    pub stop: Vec<String>,
    /// Number of tokens to generate per completion.
    pub max_tokens: u32,
    /// -2.0 to 2.0.
    pub presence_penalty: f32,
    /// -2.0 to 2.0.
    pub frequency_penalty: f32,
}

impl ChatConfig {
    /// Check every sampling parameter against its documented range.
    pub fn validate(&self) -> Result<(), ChatError> {
        check_range("temperature", self.temperature, 0.0, 2.0)?;
        check_range("top_p", self.top_p, 0.0, 1.0)?;
        check_range("presence_penalty", self.presence_penalty, -2.0, 2.0)?;
        check_range("frequency_penalty", self.frequency_penalty, -2.0, 2.0)?;
        if self.n == 0 {
            return Err(ChatError::validation("n must be at least 1"));
        }
        if self.stop.iter().any(|s| s.is_empty()) {
            return Err(ChatError::validation("stop sequences must not be empty"));
        }
        Ok(())
    }
}

fn check_range(name: &str, value: f32, min: f32, max: f32) -> Result<(), ChatError> {
    if !value.is_finite() || value < min || value > max {
        return Err(ChatError::Validation(format!(
            "invalid {name}: {value} (expected {min} to {max})"
        )));
    }
    Ok(())
}

/// Persisted state of a chat, used by repositories to rebuild the aggregate.
#[derive(Debug, Clone)]
pub struct ChatRecord {
    pub id: String,
    pub user_id: String,
    pub active_messages: Vec<ChatMessage>,
    pub erased_messages: Vec<ChatMessage>,
    pub status: ChatStatus,
    pub config: ChatConfig,
    pub version: u64,
}

/// A conversation between a user and a model, bounded by the model's window.
#[derive(Debug, Clone, Serialize)]
pub struct Chat {
    id: String,
    user_id: String,
    active_messages: VecDeque<ChatMessage>,
    erased_messages: Vec<ChatMessage>,
    status: ChatStatus,
    token_usage: u32,
    config: ChatConfig,
    version: u64,
}

impl Chat {
    /// Create an active chat seeded with its system message.
    ///
    /// The system message goes through [`Chat::add_message`], so a system
    /// prompt larger than the model window fails with [`ChatError::Capacity`].
    pub fn new(
        id: impl Into<String>,
        user_id: impl Into<String>,
        initial_system_message: ChatMessage,
        config: ChatConfig,
    ) -> Result<Self, ChatError> {
        let id = id.into();
        let user_id = user_id.into();

        if id.is_empty() {
            return Err(ChatError::validation("chat id is empty"));
        }
        if user_id.trim().is_empty() {
            return Err(ChatError::validation("user id is empty"));
        }
        config.validate()?;
        if initial_system_message.role() != MessageRole::System {
            return Err(ChatError::Validation(format!(
                "initial message must have the system role, got '{}'",
                initial_system_message.role()
            )));
        }

        let mut chat = Self {
            id,
            user_id,
            active_messages: VecDeque::new(),
            erased_messages: Vec::new(),
            status: ChatStatus::Active,
            token_usage: 0,
            config,
            version: 0,
        };
        chat.add_message(initial_system_message)?;
        Ok(chat)
    }

    /// Rebuild a chat from its persisted state.
    ///
    /// Token usage is recomputed from the active window rather than trusted
    /// from storage.
    pub fn restore(record: ChatRecord) -> Result<Self, ChatError> {
        if record.user_id.trim().is_empty() {
            return Err(ChatError::validation("user id is empty"));
        }
        record.config.validate()?;
        if record.status == ChatStatus::Active && record.active_messages.is_empty() {
            return Err(ChatError::validation("active chat has no messages"));
        }

        let mut chat = Self {
            id: record.id,
            user_id: record.user_id,
            active_messages: record.active_messages.into(),
            erased_messages: record.erased_messages,
            status: record.status,
            token_usage: 0,
            config: record.config,
            version: record.version,
        };
        chat.refresh_token_usage();

        if chat.token_usage > chat.config.model.max_tokens() {
            return Err(ChatError::Validation(format!(
                "stored window uses {} tokens, model allows {}",
                chat.token_usage,
                chat.config.model.max_tokens()
            )));
        }
        Ok(chat)
    }

    /// Append a message, evicting the oldest active messages until it fits.
    ///
    /// Returns how many messages were evicted. Fails without touching the
    /// window when the chat is ended or when the message alone is larger than
    /// the model's capacity.
    pub fn add_message(&mut self, message: ChatMessage) -> Result<usize, ChatError> {
        if self.status == ChatStatus::Ended {
            return Err(ChatError::Ended);
        }

        let max_tokens = self.config.model.max_tokens();
        if message.token_count() > max_tokens {
            return Err(ChatError::Capacity {
                required: message.token_count(),
                max_tokens,
            });
        }

        let mut evicted = 0;
        while u64::from(self.token_usage) + u64::from(message.token_count())
            > u64::from(max_tokens)
        {
            let Some(oldest) = self.active_messages.pop_front() else {
                break;
            };
            self.erased_messages.push(oldest);
            self.refresh_token_usage();
            evicted += 1;
        }

        self.active_messages.push_back(message);
        self.refresh_token_usage();
        Ok(evicted)
    }

    /// Mark the chat as ended. Ending an ended chat is a no-op.
    pub fn end(&mut self) {
        self.status = ChatStatus::Ended;
    }

    fn refresh_token_usage(&mut self) {
        self.token_usage = self
            .active_messages
            .iter()
            .fold(0u32, |acc, m| acc.saturating_add(m.token_count()));
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Active window, oldest first.
    pub fn active_messages(&self) -> &VecDeque<ChatMessage> {
        &self.active_messages
    }

    /// Evicted messages in eviction order.
    pub fn erased_messages(&self) -> &[ChatMessage] {
        &self.erased_messages
    }

    pub fn status(&self) -> ChatStatus {
        self.status
    }

    pub fn is_ended(&self) -> bool {
        self.status == ChatStatus::Ended
    }

    pub fn token_usage(&self) -> u32 {
        self.token_usage
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn model(&self) -> &Model {
        &self.config.model
    }

    /// Optimistic concurrency version; 0 until first persisted.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Record the version a repository assigned on a successful write.
    pub fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    /// Role/content pairs for the active window, oldest first.
    pub fn llm_messages(&self) -> Vec<Message> {
        self.active_messages
            .iter()
            .map(ChatMessage::to_llm_message)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn msg(id: &str, role: MessageRole, tokens: u32) -> ChatMessage {
        ChatMessage::new(id, role, format!("content of {id}"), tokens, ts()).unwrap()
    }

    fn config(max_tokens: u32) -> ChatConfig {
        ChatConfig {
            model: Model::new("gpt-3.5-turbo", max_tokens).unwrap(),
            temperature: 0.7,
            top_p: 1.0,
            n: 1,
            stop: vec![],
            max_tokens: 256,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
        }
    }

    fn chat(max_tokens: u32, system_tokens: u32) -> Chat {
        Chat::new(
            "chat-1",
            "user-1",
            msg("sys", MessageRole::System, system_tokens),
            config(max_tokens),
        )
        .unwrap()
    }

    fn ids<'a>(messages: impl IntoIterator<Item = &'a ChatMessage>) -> Vec<String> {
        messages.into_iter().map(|m| m.id().to_string()).collect()
    }

    fn assert_usage_consistent(chat: &Chat) {
        let sum: u32 = chat.active_messages().iter().map(|m| m.token_count()).sum();
        assert_eq!(chat.token_usage(), sum);
    }

    #[test]
    fn test_chat_status_roundtrip() {
        for status in [ChatStatus::Active, ChatStatus::Ended] {
            let parsed: ChatStatus = status.to_string().parse().unwrap();
            assert_eq!(status, parsed);
        }
        assert!("archived".parse::<ChatStatus>().is_err());
    }

    #[test]
    fn test_message_rejects_empty_content() {
        let err = ChatMessage::new("m1", MessageRole::User, "", 0, ts()).unwrap_err();
        assert_eq!(err, ChatError::Validation("content is empty".to_string()));
    }

    #[test]
    fn test_message_rejects_epoch_timestamp() {
        let err = ChatMessage::new("m1", MessageRole::User, "hi", 1, DateTime::UNIX_EPOCH)
            .unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
    }

    #[test]
    fn test_new_chat_seeds_system_message() {
        let chat = chat(100, 10);
        assert_eq!(chat.status(), ChatStatus::Active);
        assert_eq!(chat.active_messages().len(), 1);
        assert_eq!(chat.active_messages()[0].role(), MessageRole::System);
        assert_eq!(chat.token_usage(), 10);
        assert!(chat.erased_messages().is_empty());
        assert_eq!(chat.version(), 0);
    }

    #[test]
    fn test_new_chat_rejects_empty_user() {
        let err = Chat::new("c", " ", msg("sys", MessageRole::System, 1), config(10))
            .unwrap_err();
        assert_eq!(err, ChatError::Validation("user id is empty".to_string()));
    }

    #[test]
    fn test_new_chat_rejects_temperature_out_of_range() {
        for temperature in [-0.1, 2.1, f32::NAN] {
            let mut cfg = config(100);
            cfg.temperature = temperature;
            let err = Chat::new("c", "u", msg("sys", MessageRole::System, 1), cfg).unwrap_err();
            assert!(matches!(err, ChatError::Validation(ref m) if m.contains("temperature")));
        }
    }

    #[test]
    fn test_new_chat_rejects_other_params_out_of_range() {
        let mut cfg = config(100);
        cfg.top_p = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = config(100);
        cfg.presence_penalty = -2.5;
        assert!(cfg.validate().is_err());

        let mut cfg = config(100);
        cfg.frequency_penalty = 3.0;
        assert!(cfg.validate().is_err());

        let mut cfg = config(100);
        cfg.n = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = config(100);
        cfg.temperature = 2.0;
        cfg.presence_penalty = -2.0;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_new_chat_requires_system_role() {
        let err = Chat::new("c", "u", msg("m", MessageRole::User, 1), config(10)).unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
    }

    #[test]
    fn test_scenario_system_message_evicted_by_large_user_message() {
        let mut chat = chat(50, 10);
        let evicted = chat
            .add_message(msg("user", MessageRole::User, 45))
            .unwrap();

        assert_eq!(evicted, 1);
        assert_eq!(ids(chat.erased_messages()), vec!["sys"]);
        assert_eq!(ids(chat.active_messages()), vec!["user"]);
        assert_eq!(chat.token_usage(), 45);
    }

    #[test]
    fn test_add_message_without_eviction() {
        let mut chat = chat(100, 10);
        let evicted = chat.add_message(msg("u1", MessageRole::User, 20)).unwrap();
        assert_eq!(evicted, 0);
        assert_eq!(ids(chat.active_messages()), vec!["sys", "u1"]);
        assert_eq!(chat.token_usage(), 30);
        assert_usage_consistent(&chat);
    }

    #[test]
    fn test_message_filling_window_exactly_fits() {
        let mut chat = chat(30, 10);
        chat.add_message(msg("u1", MessageRole::User, 20)).unwrap();
        assert_eq!(chat.token_usage(), 30);
        assert!(chat.erased_messages().is_empty());
    }

    #[test]
    fn test_eviction_preserves_order_in_both_sequences() {
        let mut chat = chat(40, 10);
        chat.add_message(msg("u1", MessageRole::User, 10)).unwrap();
        chat.add_message(msg("a1", MessageRole::Assistant, 10)).unwrap();
        chat.add_message(msg("u2", MessageRole::User, 10)).unwrap();
        assert_eq!(chat.token_usage(), 40);

        // Needs 25 free tokens: sys, u1 and a1 must go, oldest first.
        chat.add_message(msg("a2", MessageRole::Assistant, 25)).unwrap();
        assert_eq!(ids(chat.erased_messages()), vec!["sys", "u1", "a1"]);
        assert_eq!(ids(chat.active_messages()), vec!["u2", "a2"]);
        assert_eq!(chat.token_usage(), 35);

        chat.add_message(msg("u3", MessageRole::User, 10)).unwrap();
        assert_eq!(ids(chat.erased_messages()), vec!["sys", "u1", "a1", "u2"]);
        assert_eq!(ids(chat.active_messages()), vec!["a2", "u3"]);
        assert_usage_consistent(&chat);
    }

    #[test]
    fn test_usage_consistent_after_every_add() {
        let mut chat = chat(64, 7);
        for (i, tokens) in [3u32, 19, 40, 1, 64, 0, 12, 33].into_iter().enumerate() {
            chat.add_message(msg(&format!("m{i}"), MessageRole::User, tokens))
                .unwrap();
            assert_usage_consistent(&chat);
            assert!(chat.token_usage() <= 64);
            assert!(!chat.active_messages().is_empty());
        }
    }

    #[test]
    fn test_oversized_message_is_capacity_error_and_leaves_window() {
        let mut chat = chat(50, 10);
        chat.add_message(msg("u1", MessageRole::User, 5)).unwrap();

        let err = chat
            .add_message(msg("huge", MessageRole::User, 51))
            .unwrap_err();
        assert_eq!(
            err,
            ChatError::Capacity {
                required: 51,
                max_tokens: 50
            }
        );
        assert_eq!(ids(chat.active_messages()), vec!["sys", "u1"]);
        assert!(chat.erased_messages().is_empty());
        assert_eq!(chat.token_usage(), 15);
    }

    #[test]
    fn test_oversized_system_message_fails_chat_creation() {
        let err = Chat::new("c", "u", msg("sys", MessageRole::System, 11), config(10))
            .unwrap_err();
        assert!(matches!(err, ChatError::Capacity { .. }));
    }

    #[test]
    fn test_add_message_to_ended_chat_changes_nothing() {
        let mut chat = chat(50, 10);
        chat.add_message(msg("u1", MessageRole::User, 30)).unwrap();
        chat.end();

        let before_active = ids(chat.active_messages());
        let before_erased = ids(chat.erased_messages());
        let before_usage = chat.token_usage();

        let err = chat.add_message(msg("u2", MessageRole::User, 40)).unwrap_err();
        assert_eq!(err, ChatError::Ended);
        assert_eq!(ids(chat.active_messages()), before_active);
        assert_eq!(ids(chat.erased_messages()), before_erased);
        assert_eq!(chat.token_usage(), before_usage);
    }

    #[test]
    fn test_end_is_idempotent() {
        let mut once = chat(50, 10);
        once.end();
        let mut twice = chat(50, 10);
        twice.end();
        twice.end();

        assert_eq!(once.status(), twice.status());
        assert!(twice.is_ended());
        assert_eq!(ids(once.active_messages()), ids(twice.active_messages()));
        assert_eq!(once.token_usage(), twice.token_usage());
    }

    #[test]
    fn test_llm_messages_projection() {
        let mut chat = chat(100, 10);
        chat.add_message(msg("u1", MessageRole::User, 5)).unwrap();
        let messages = chat.llm_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::System);
        assert_eq!(messages[1].role, MessageRole::User);
        assert_eq!(messages[1].content, "content of u1");
    }

    #[test]
    fn test_restore_recomputes_usage() {
        let record = ChatRecord {
            id: "c".to_string(),
            user_id: "u".to_string(),
            active_messages: vec![
                msg("u1", MessageRole::User, 4),
                msg("a1", MessageRole::Assistant, 6),
            ],
            erased_messages: vec![msg("sys", MessageRole::System, 3)],
            status: ChatStatus::Active,
            config: config(20),
            version: 7,
        };
        let chat = Chat::restore(record).unwrap();
        assert_eq!(chat.token_usage(), 10);
        assert_eq!(chat.version(), 7);
        assert_eq!(ids(chat.erased_messages()), vec!["sys"]);
    }

    #[test]
    fn test_restore_rejects_window_over_capacity() {
        let record = ChatRecord {
            id: "c".to_string(),
            user_id: "u".to_string(),
            active_messages: vec![msg("u1", MessageRole::User, 30)],
            erased_messages: vec![],
            status: ChatStatus::Active,
            config: config(20),
            version: 1,
        };
        assert!(matches!(
            Chat::restore(record),
            Err(ChatError::Validation(_))
        ));
    }

    #[test]
    fn test_chat_serializes_window() {
        let chat = chat(100, 10);
        let json = serde_json::to_value(&chat).unwrap();
        assert_eq!(json["status"], "active");
        assert_eq!(json["token_usage"], 10);
        assert_eq!(json["active_messages"][0]["role"], "system");
    }
}
