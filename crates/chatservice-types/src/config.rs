//! Service configuration types.
//!
//! `ServiceConfig` represents the top-level `config.toml` in the data
//! directory. Every field has a default so an empty or missing file is valid.

use serde::{Deserialize, Serialize};

use crate::completion::ChatCompletionConfig;

/// Top-level configuration for the chat service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Defaults applied when a request creates a new chat.
    #[serde(default)]
    pub completion: ChatCompletionConfig,

    #[serde(default)]
    pub provider: ProviderSettings,

    #[serde(default)]
    pub server: ServerSettings,

    /// SQLite connection URL. Defaults to `chatservice.db` in the data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
}

/// Generation provider connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Provider kind, e.g. "openai" or "openai_compatible".
    #[serde(default = "default_provider_name")]
    pub name: String,

    /// Override for the API base URL (required for custom compatible servers).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// API key. `OPENAI_API_KEY` takes precedence when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_provider_name() -> String {
    "openai".to_string()
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            base_url: None,
            api_key: None,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Static token expected in the `Authorization` header. When unset the
    /// API accepts unauthenticated requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            auth_token: None,
        }
    }
}
