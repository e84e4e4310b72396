//! LLM provider implementations.
//!
//! Contains the OpenAI-compatible implementation of the [`LlmProvider`]
//! trait defined in `chatservice-core`, and a provider factory
//! ([`create_provider`]) that builds it from [`ProviderSettings`].
//!
//! [`LlmProvider`]: chatservice_core::llm::provider::LlmProvider

pub mod openai_compat;

use secrecy::SecretString;

use chatservice_core::llm::box_provider::BoxLlmProvider;
use chatservice_types::config::ProviderSettings;
use chatservice_types::llm::LlmError;

use self::openai_compat::OpenAiCompatibleProvider;
use self::openai_compat::config::{OPENAI_BASE_URL, OpenAiCompatConfig};

/// Create a [`BoxLlmProvider`] from provider settings.
///
/// - `openai`: requires an API key; `base_url` optionally overrides the
///   official endpoint (proxies, Azure-style gateways).
/// - any other name: a self-hosted OpenAI-compatible server. Requires
///   `base_url`; the API key is optional.
///
/// `default_model` is used for requests that leave the model name empty.
pub fn create_provider(
    settings: &ProviderSettings,
    api_key: Option<SecretString>,
    default_model: &str,
) -> Result<BoxLlmProvider, LlmError> {
    let config = match settings.name.as_str() {
        "openai" => {
            let api_key = api_key.ok_or(LlmError::AuthenticationFailed)?;
            OpenAiCompatConfig {
                provider_name: settings.name.clone(),
                base_url: settings
                    .base_url
                    .clone()
                    .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
                api_key,
                default_model: default_model.to_string(),
            }
        }
        other => {
            let base_url = settings.base_url.clone().ok_or_else(|| {
                LlmError::InvalidRequest(format!("provider '{other}' requires a base_url"))
            })?;
            OpenAiCompatConfig {
                provider_name: other.to_string(),
                base_url,
                api_key: api_key.unwrap_or_else(|| SecretString::from("")),
                default_model: default_model.to_string(),
            }
        }
    };

    tracing::debug!(
        provider = %config.provider_name,
        base_url = %config.base_url,
        "Creating LLM provider"
    );
    Ok(BoxLlmProvider::new(OpenAiCompatibleProvider::new(config)))
}
