//! Service configuration loader.
//!
//! Reads `config.toml` from the data directory (`~/.chatservice/` by default)
//! and deserializes it into [`ServiceConfig`]. Falls back to defaults when the
//! file is missing or malformed. Secrets may come from the environment and
//! are wrapped in [`SecretString`] as soon as they are resolved.

use std::path::{Path, PathBuf};

use secrecy::SecretString;

use chatservice_types::config::ServiceConfig;

use crate::sqlite::pool::default_database_url;

/// Overrides the data directory.
pub const DATA_DIR_ENV: &str = "CHATSERVICE_DATA_DIR";
/// Overrides `[provider].api_key`.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
/// Overrides `[server].auth_token`.
pub const AUTH_TOKEN_ENV: &str = "CHATSERVICE_AUTH_TOKEN";

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `CHATSERVICE_DATA_DIR` environment variable
/// 2. `~/.chatservice`
/// 3. `.chatservice` in the current directory
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".chatservice");
    }

    PathBuf::from(".chatservice")
}

/// Load service configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`ServiceConfig::default()`].
/// - If the file exists but fails to read or parse, logs a warning and returns the default.
pub async fn load_service_config(data_dir: &Path) -> ServiceConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return ServiceConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return ServiceConfig::default();
        }
    };

    match toml::from_str::<ServiceConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            ServiceConfig::default()
        }
    }
}

/// Credentials resolved from the environment and the config file.
pub struct Secrets {
    pub api_key: Option<SecretString>,
    pub auth_token: Option<SecretString>,
}

/// Resolve secrets, preferring environment values over the config file.
///
/// `env` looks up a variable by name; pass `|k| std::env::var(k).ok()` in
/// production. Empty values count as unset.
pub fn resolve_secrets(config: &ServiceConfig, env: impl Fn(&str) -> Option<String>) -> Secrets {
    let pick = |var: &str, file: &Option<String>| {
        env(var)
            .filter(|v| !v.is_empty())
            .or_else(|| file.clone().filter(|v| !v.is_empty()))
            .map(SecretString::from)
    };

    Secrets {
        api_key: pick(API_KEY_ENV, &config.provider.api_key),
        auth_token: pick(AUTH_TOKEN_ENV, &config.server.auth_token),
    }
}

/// The configured database URL, or `chatservice.db` in the data directory.
pub fn resolve_database_url(config: &ServiceConfig, data_dir: &Path) -> String {
    config
        .database_url
        .clone()
        .unwrap_or_else(|| default_database_url(data_dir))
}
