//! Generation model descriptor.

use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// A generation model and the size of its context window.
///
/// Immutable once constructed; the window size bounds the total token count
/// of the active messages in any chat configured with this model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    name: String,
    max_tokens: u32,
}

impl Model {
    pub fn new(name: impl Into<String>, max_tokens: u32) -> Result<Self, ChatError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ChatError::validation("model name is empty"));
        }
        if max_tokens == 0 {
            return Err(ChatError::validation("model max tokens must be positive"));
        }
        Ok(Self { name, max_tokens })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }
}
