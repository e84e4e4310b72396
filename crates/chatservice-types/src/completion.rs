//! Input and output types for the chat completion use case.
//!
//! `ChatCompletionConfig` doubles as the `[completion]` section of the
//! service configuration file, so every field carries a serde default.

use serde::{Deserialize, Serialize};

use crate::chat::ChatConfig;
use crate::error::ChatError;
use crate::model::Model;

/// Settings used when a new chat has to be created for a request.
///
/// Existing chats keep the configuration they were created with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionConfig {
    #[serde(default = "default_model")]
    pub model: String,

    /// Context window of `model`, in tokens.
    #[serde(default = "default_model_max_tokens")]
    pub model_max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_n")]
    pub n: u8,

    #[serde(default)]
    pub stop: Vec<String>,

    /// Tokens to generate per completion.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub presence_penalty: f32,

    #[serde(default)]
    pub frequency_penalty: f32,

    #[serde(default = "default_initial_system_message")]
    pub initial_system_message: String,
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_model_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.1
}

fn default_top_p() -> f32 {
    1.0
}

fn default_n() -> u8 {
    1
}

fn default_max_tokens() -> u32 {
    300
}

fn default_initial_system_message() -> String {
    "You are a helpful assistant. Answer concisely and say so when you do not know something."
        .to_string()
}

impl Default for ChatCompletionConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            model_max_tokens: default_model_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            n: default_n(),
            stop: Vec::new(),
            max_tokens: default_max_tokens(),
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            initial_system_message: default_initial_system_message(),
        }
    }
}

impl ChatCompletionConfig {
    /// Build the validated model and chat configuration.
    pub fn to_chat_config(&self) -> Result<ChatConfig, ChatError> {
        let config = ChatConfig {
            model: Model::new(self.model.clone(), self.model_max_tokens)?,
            temperature: self.temperature,
            top_p: self.top_p,
            n: self.n,
            stop: self.stop.clone(),
            max_tokens: self.max_tokens,
            presence_penalty: self.presence_penalty,
            frequency_penalty: self.frequency_penalty,
        };
        config.validate()?;
        Ok(config)
    }
}

/// One user turn submitted to the completion service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionInput {
    /// Existing chat to continue. A fresh chat is created when absent or
    /// unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    pub user_id: String,
    pub user_message: String,
    #[serde(default)]
    pub config: ChatCompletionConfig,
}

/// Result of one completed exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionOutput {
    pub chat_id: String,
    pub user_id: String,
    pub content: String,
}
