//! Chat completion use case.
//!
//! `ChatCompletionService` runs one user turn end to end: locate or create the
//! chat, append the user message (evicting old context as needed), ask the
//! provider for an answer, append the answer, and persist the chat.
//!
//! Every exchange on a given chat id runs under that chat's lock from
//! [`ChatLocks`], so concurrent requests to one chat are applied one after the
//! other. The repository's version check catches writers outside this process.

use std::sync::Arc;

use chatservice_types::chat::{Chat, ChatMessage, MessageRole};
use chatservice_types::completion::{ChatCompletionInput, ChatCompletionOutput};
use chatservice_types::error::{ChatError, RepositoryError};
use chatservice_types::llm::{CompletionRequest, LlmError, StreamEvent};
use chatservice_types::model::Model;
use futures_util::StreamExt;
use tokio::sync::{OwnedMutexGuard, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chat::locks::ChatLocks;
use crate::chat::repository::ChatRepository;
use crate::clock::{Clock, IdGenerator, SystemClock, UuidGenerator};
use crate::llm::provider::LlmProvider;
use crate::tokenizer::{HeuristicTokenizer, Tokenizer};

use super::error::CompletionError;

/// Orchestrates chat completion exchanges.
///
/// Generic over `ChatRepository` and `LlmProvider` so the core never depends
/// on chatservice-infra.
pub struct ChatCompletionService<R: ChatRepository, P: LlmProvider> {
    repository: R,
    provider: P,
    tokenizer: Arc<dyn Tokenizer>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    locks: ChatLocks,
}

impl<R: ChatRepository, P: LlmProvider> ChatCompletionService<R, P> {
    /// Create a service with the heuristic tokenizer, wall clock and UUID v7 ids.
    pub fn new(repository: R, provider: P) -> Self {
        Self {
            repository,
            provider,
            tokenizer: Arc::new(HeuristicTokenizer),
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidGenerator),
            locks: ChatLocks::new(),
        }
    }

    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Run one exchange and return the full assistant answer.
    pub async fn execute(
        &self,
        input: ChatCompletionInput,
        cancel: &CancellationToken,
    ) -> Result<ChatCompletionOutput, CompletionError> {
        let chat_id = self.resolve_chat_id(&input);
        let result = {
            match self.lock_chat(&chat_id, cancel).await {
                Ok(_guard) => self.execute_locked(chat_id, &input, cancel).await,
                Err(e) => Err(e),
            }
        };
        self.locks.prune();
        result
    }

    /// Run one exchange, forwarding answer fragments to `fragments` as they
    /// arrive.
    ///
    /// Each fragment is sent as a `ChatCompletionOutput` whose `content` is
    /// the new text only. The returned output carries the assembled answer,
    /// which is the only content persisted. A closed receiver does not stop
    /// the exchange.
    pub async fn execute_stream(
        &self,
        input: ChatCompletionInput,
        fragments: mpsc::Sender<ChatCompletionOutput>,
        cancel: &CancellationToken,
    ) -> Result<ChatCompletionOutput, CompletionError> {
        let chat_id = self.resolve_chat_id(&input);
        let result = {
            match self.lock_chat(&chat_id, cancel).await {
                Ok(_guard) => {
                    self.execute_stream_locked(chat_id, &input, fragments, cancel)
                        .await
                }
                Err(e) => Err(e),
            }
        };
        self.locks.prune();
        result
    }

    /// Load a chat for display.
    pub async fn find_chat(&self, chat_id: &str) -> Result<Chat, RepositoryError> {
        self.repository.find_chat_by_id(chat_id).await
    }

    /// End a chat so it accepts no further messages. Ending twice is a no-op.
    pub async fn end_chat(&self, chat_id: &str) -> Result<Chat, RepositoryError> {
        let result = {
            let _guard = self.locks.acquire(chat_id).await;
            let mut chat = self.repository.find_chat_by_id(chat_id).await?;
            if !chat.is_ended() {
                chat.end();
                self.repository.save_chat(&mut chat).await?;
                info!(chat_id = %chat_id, "Chat ended");
            }
            Ok(chat)
        };
        self.locks.prune();
        result
    }

    /// Wait for the chat's lock unless the exchange is cancelled first.
    async fn lock_chat(
        &self,
        chat_id: &str,
        cancel: &CancellationToken,
    ) -> Result<OwnedMutexGuard<()>, CompletionError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(CompletionError::Cancelled),
            guard = self.locks.acquire(chat_id) => Ok(guard),
        }
    }

    fn resolve_chat_id(&self, input: &ChatCompletionInput) -> String {
        match input.chat_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => self.ids.new_id(),
        }
    }

    async fn execute_locked(
        &self,
        chat_id: String,
        input: &ChatCompletionInput,
        cancel: &CancellationToken,
    ) -> Result<ChatCompletionOutput, CompletionError> {
        let mut chat = self.prepare(chat_id, input, cancel).await?;

        check_cancelled(cancel)?;
        let request = completion_request(&chat, false);
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(CompletionError::Cancelled),
            response = self.provider.complete(&request) => response,
        }
        .map_err(CompletionError::GenerationFailed)?;

        debug!(
            chat_id = %chat.id(),
            response_id = %response.id,
            stop_reason = %response.stop_reason,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "Completion received"
        );

        self.finish(&mut chat, response.content, &input.user_id, cancel)
            .await
    }

    async fn execute_stream_locked(
        &self,
        chat_id: String,
        input: &ChatCompletionInput,
        fragments: mpsc::Sender<ChatCompletionOutput>,
        cancel: &CancellationToken,
    ) -> Result<ChatCompletionOutput, CompletionError> {
        let mut chat = self.prepare(chat_id, input, cancel).await?;

        check_cancelled(cancel)?;
        let mut stream = self.provider.stream(completion_request(&chat, true));
        let mut fragments = Some(fragments);
        let mut content = String::new();

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => return Err(CompletionError::Cancelled),
                event = stream.next() => event,
            };

            match event {
                Some(Ok(StreamEvent::Done)) => break,
                None => {
                    return Err(CompletionError::GenerationFailed(LlmError::Stream(
                        "stream ended without end marker".to_string(),
                    )));
                }
                Some(Ok(StreamEvent::TextDelta { text })) => {
                    content.push_str(&text);
                    let Some(tx) = fragments.as_ref() else {
                        continue;
                    };
                    let fragment = ChatCompletionOutput {
                        chat_id: chat.id().to_string(),
                        user_id: input.user_id.clone(),
                        content: text,
                    };
                    let sent = tokio::select! {
                        _ = cancel.cancelled() => return Err(CompletionError::Cancelled),
                        sent = tx.send(fragment) => sent,
                    };
                    if sent.is_err() {
                        debug!(chat_id = %chat.id(), "Fragment receiver dropped, accumulating only");
                        fragments = None;
                    }
                }
                Some(Ok(StreamEvent::MessageDelta { stop_reason })) => {
                    debug!(chat_id = %chat.id(), %stop_reason, "Stream finishing");
                }
                Some(Ok(StreamEvent::Usage(usage))) => {
                    debug!(
                        chat_id = %chat.id(),
                        input_tokens = usage.input_tokens,
                        output_tokens = usage.output_tokens,
                        "Stream usage"
                    );
                }
                Some(Ok(StreamEvent::Connected)) => {}
                Some(Err(e)) => return Err(CompletionError::GenerationFailed(e)),
            }
        }

        self.finish(&mut chat, content, &input.user_id, cancel)
            .await
    }

    /// Locate or create the chat and append the user's message.
    async fn prepare(
        &self,
        chat_id: String,
        input: &ChatCompletionInput,
        cancel: &CancellationToken,
    ) -> Result<Chat, CompletionError> {
        check_cancelled(cancel)?;

        let supplied = input
            .chat_id
            .as_deref()
            .is_some_and(|id| !id.trim().is_empty());

        let existing = if supplied {
            match self.repository.find_chat_by_id(&chat_id).await {
                Ok(chat) => Some(chat),
                Err(RepositoryError::NotFound) => {
                    debug!(chat_id = %chat_id, "Chat not found, creating it");
                    None
                }
                Err(e) => return Err(CompletionError::ChatLookupFailed(e)),
            }
        } else {
            None
        };

        let (mut chat, fresh) = match existing {
            Some(chat) => (chat, false),
            None => (self.new_chat(chat_id, input)?, true),
        };

        if chat.user_id() != input.user_id {
            warn!(
                chat_id = %chat.id(),
                owner = %chat.user_id(),
                user_id = %input.user_id,
                "Message from a user other than the chat owner"
            );
        }

        // A new chat is stored only once the user message fits into it.
        let message = self.build_message(MessageRole::User, &input.user_message, chat.model())?;
        let pristine = fresh.then(|| chat.clone());
        let evicted = chat.add_message(message)?;
        if let Some(pristine) = pristine {
            self.store_new_chat(&pristine, cancel).await?;
        }
        if evicted > 0 {
            info!(
                chat_id = %chat.id(),
                evicted,
                token_usage = chat.token_usage(),
                "Evicted messages to fit the context window"
            );
        }
        Ok(chat)
    }

    fn new_chat(&self, chat_id: String, input: &ChatCompletionInput) -> Result<Chat, CompletionError> {
        let config = input
            .config
            .to_chat_config()
            .map_err(CompletionError::creation)?;
        let system = self
            .build_message(
                MessageRole::System,
                &input.config.initial_system_message,
                &config.model,
            )
            .map_err(CompletionError::creation)?;
        Chat::new(chat_id, input.user_id.clone(), system, config).map_err(CompletionError::creation)
    }

    async fn store_new_chat(
        &self,
        chat: &Chat,
        cancel: &CancellationToken,
    ) -> Result<(), CompletionError> {
        check_cancelled(cancel)?;
        self.repository
            .create_chat(chat)
            .await
            .map_err(CompletionError::creation)?;

        info!(
            chat_id = %chat.id(),
            user_id = %chat.user_id(),
            model = %chat.model().name(),
            "Chat created"
        );
        Ok(())
    }

    /// Append the assistant answer and persist the chat.
    async fn finish(
        &self,
        chat: &mut Chat,
        content: String,
        user_id: &str,
        cancel: &CancellationToken,
    ) -> Result<ChatCompletionOutput, CompletionError> {
        if content.is_empty() {
            return Err(CompletionError::GenerationFailed(LlmError::EmptyResponse));
        }

        let message = self.build_message(MessageRole::Assistant, &content, chat.model())?;
        let evicted = chat.add_message(message)?;

        check_cancelled(cancel)?;
        self.repository
            .save_chat(chat)
            .await
            .map_err(CompletionError::PersistenceFailed)?;

        info!(
            chat_id = %chat.id(),
            user_id = %user_id,
            evicted,
            token_usage = chat.token_usage(),
            version = chat.version(),
            "Exchange completed"
        );

        Ok(ChatCompletionOutput {
            chat_id: chat.id().to_string(),
            user_id: user_id.to_string(),
            content,
        })
    }

    fn build_message(
        &self,
        role: MessageRole,
        content: &str,
        model: &Model,
    ) -> Result<ChatMessage, ChatError> {
        let token_count = self.tokenizer.count_tokens(model.name(), content);
        ChatMessage::new(
            self.ids.new_id(),
            role,
            content,
            token_count,
            self.clock.now(),
        )
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), CompletionError> {
    if cancel.is_cancelled() {
        return Err(CompletionError::Cancelled);
    }
    Ok(())
}

/// Project the active window and sampling parameters into a provider request.
fn completion_request(chat: &Chat, stream: bool) -> CompletionRequest {
    let config = chat.config();
    CompletionRequest {
        model: config.model.name().to_string(),
        messages: chat.llm_messages(),
        temperature: config.temperature,
        top_p: config.top_p,
        n: config.n,
        stop: config.stop.clone(),
        max_tokens: config.max_tokens,
        presence_penalty: config.presence_penalty,
        frequency_penalty: config.frequency_penalty,
        stream,
    }
}
