//! Application state wiring the completion service together.
//!
//! AppState holds the concrete service instance used by both CLI and REST API.
//! `ChatCompletionService` is generic over repository/provider traits, but
//! AppState pins it to the concrete infra implementations.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use chatservice_core::completion::ChatCompletionService;
use chatservice_core::llm::box_provider::BoxLlmProvider;
use chatservice_core::llm::provider::{LlmEventStream, LlmProvider};
use chatservice_infra::config::{
    load_service_config, resolve_data_dir, resolve_database_url, resolve_secrets,
};
use chatservice_infra::llm::create_provider;
use chatservice_infra::sqlite::chat::SqliteChatRepository;
use chatservice_infra::sqlite::pool::DatabasePool;
use chatservice_types::config::ServiceConfig;
use chatservice_types::llm::{CompletionRequest, CompletionResponse, LlmError, StreamEvent};

/// Completion service pinned to SQLite storage and a boxed provider.
pub type ConcreteCompletionService = ChatCompletionService<SqliteChatRepository, BoxLlmProvider>;

/// Shared application state.
///
/// Used by both CLI commands and REST API handlers.
#[derive(Clone)]
pub struct AppState {
    pub completion_service: Arc<ConcreteCompletionService>,
    pub config: Arc<ServiceConfig>,
    /// SHA-256 (lowercase hex) of the configured API token, if any.
    pub auth_token_hash: Option<Arc<str>>,
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
    /// Cancelled on server shutdown; in-flight exchanges use child tokens.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Initialize the application state: load config, connect to DB, build
    /// the provider, wire the service.
    ///
    /// With `needs_provider` false, a missing or broken provider setup is
    /// tolerated and generation requests fail instead.
    pub async fn init(needs_provider: bool) -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("creating data directory {}", data_dir.display()))?;

        let config = load_service_config(&data_dir).await;
        let secrets = resolve_secrets(&config, |name| std::env::var(name).ok());

        let db_url = resolve_database_url(&config, &data_dir);
        let db_pool = DatabasePool::new(&db_url)
            .await
            .with_context(|| format!("opening database {db_url}"))?;

        let provider = build_provider(&config, secrets.api_key, &data_dir, needs_provider)?;

        let repository = SqliteChatRepository::new(db_pool.clone());
        let service = ChatCompletionService::new(repository, provider);

        Ok(Self::from_parts(
            service,
            config,
            secrets.auth_token.as_ref(),
            data_dir,
            db_pool,
        ))
    }

    /// Assemble state from already-built parts.
    pub fn from_parts(
        service: ConcreteCompletionService,
        config: ServiceConfig,
        auth_token: Option<&SecretString>,
        data_dir: PathBuf,
        db_pool: DatabasePool,
    ) -> Self {
        Self {
            completion_service: Arc::new(service),
            config: Arc::new(config),
            auth_token_hash: auth_token.map(|t| hash_token(t.expose_secret()).into()),
            data_dir,
            db_pool,
            shutdown: CancellationToken::new(),
        }
    }
}

fn build_provider(
    config: &ServiceConfig,
    api_key: Option<SecretString>,
    data_dir: &Path,
    needs_provider: bool,
) -> anyhow::Result<BoxLlmProvider> {
    match create_provider(&config.provider, api_key, &config.completion.model) {
        Ok(provider) => Ok(provider),
        Err(e) if !needs_provider => {
            tracing::debug!(provider = %config.provider.name, error = %e, "Provider not configured");
            Ok(BoxLlmProvider::new(UnconfiguredProvider {
                reason: format!("provider '{}' is not configured: {e}", config.provider.name),
            }))
        }
        Err(e) => Err(anyhow::Error::new(e)).with_context(|| {
            format!(
                "configuring provider '{}' (set OPENAI_API_KEY or [provider] in {})",
                config.provider.name,
                data_dir.join("config.toml").display()
            )
        }),
    }
}

/// Stand-in for commands that only read or end chats.
struct UnconfiguredProvider {
    reason: String,
}

impl LlmProvider for UnconfiguredProvider {
    fn name(&self) -> &str {
        "unconfigured"
    }

    fn complete(
        &self,
        _request: &CompletionRequest,
    ) -> impl Future<Output = Result<CompletionResponse, LlmError>> + Send {
        let message = self.reason.clone();
        async move { Err(LlmError::Provider { message }) }
    }

    fn stream(&self, _request: CompletionRequest) -> LlmEventStream {
        let message = self.reason.clone();
        Box::pin(tokio_stream::once(Err::<StreamEvent, _>(LlmError::Provider {
            message,
        })))
    }
}

/// Compute SHA-256 hash of a token (lowercase hex).
pub fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    format!("{:x}", digest)
}
