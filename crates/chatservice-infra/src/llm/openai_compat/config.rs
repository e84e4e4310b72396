//! Connection settings for OpenAI-compatible endpoints.

use secrecy::SecretString;

/// Official OpenAI API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Configuration for an OpenAI-compatible provider.
///
/// Used to construct an [`super::OpenAiCompatibleProvider`].
pub struct OpenAiCompatConfig {
    /// Human-readable provider name (e.g., "openai", "local").
    pub provider_name: String,
    /// Base URL for the API (e.g., "https://api.openai.com/v1").
    pub base_url: String,
    /// API key for authentication. Local servers often accept any value.
    pub api_key: SecretString,
    /// Model used when a request leaves its model name empty.
    pub default_model: String,
}

/// OpenAI default configuration.
pub fn openai_defaults(api_key: SecretString, default_model: &str) -> OpenAiCompatConfig {
    OpenAiCompatConfig {
        provider_name: "openai".into(),
        base_url: OPENAI_BASE_URL.into(),
        api_key,
        default_model: default_model.into(),
    }
}
