//! Chat completion HTTP handlers.
//!
//! Endpoints:
//! - POST /api/v1/chat              - Run one exchange, return the full answer
//! - POST /api/v1/chat/stream       - Run one exchange, stream the answer as SSE
//! - GET  /api/v1/chats/{id}        - Get a chat with its active and erased messages
//! - POST /api/v1/chats/{id}/end    - End a chat
//!
//! SSE event types:
//! - `text_delta` - answer fragment: `{ "chat_id": "...", "text": "..." }`
//! - `done` - exchange persisted: `{ "chat_id": "...", "user_id": "...", "content": "..." }`
//! - `error` - exchange failed: `{ "code": "...", "message": "..." }`, codes as in
//!   the JSON error envelope

use std::convert::Infallible;
use std::time::{Duration, Instant};

use axum::Json;
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::Stream;
use uuid::Uuid;

use chatservice_types::chat::Chat;
use chatservice_types::completion::{
    ChatCompletionConfig, ChatCompletionInput, ChatCompletionOutput,
};

use crate::http::error::AppError;
use crate::http::extractors::auth::Authenticated;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Buffered fragments between the exchange task and the SSE response.
const FRAGMENT_BUFFER: usize = 32;

/// Request body for both completion endpoints.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// Existing chat to continue; if absent, a new chat is created.
    #[serde(default)]
    pub chat_id: Option<String>,
    pub user_id: String,
    pub message: String,
    /// Sampling overrides for a new chat. Server defaults apply when absent.
    #[serde(default)]
    pub config: Option<SamplingOverrides>,
}

/// Sampling parameters a client may choose for a new chat.
///
/// Model, context size and system message always come from the server
/// config; a body naming them is rejected.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SamplingOverrides {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub n: Option<u8>,
    pub stop: Option<Vec<String>>,
    pub max_tokens: Option<u32>,
    pub presence_penalty: Option<f32>,
    pub frequency_penalty: Option<f32>,
}

impl SamplingOverrides {
    fn apply(self, defaults: &ChatCompletionConfig) -> ChatCompletionConfig {
        let mut config = defaults.clone();
        if let Some(temperature) = self.temperature {
            config.temperature = temperature;
        }
        if let Some(top_p) = self.top_p {
            config.top_p = top_p;
        }
        if let Some(n) = self.n {
            config.n = n;
        }
        if let Some(stop) = self.stop {
            config.stop = stop;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.max_tokens = max_tokens;
        }
        if let Some(presence_penalty) = self.presence_penalty {
            config.presence_penalty = presence_penalty;
        }
        if let Some(frequency_penalty) = self.frequency_penalty {
            config.frequency_penalty = frequency_penalty;
        }
        config
    }
}

impl ChatRequest {
    fn into_input(self, defaults: &ChatCompletionConfig) -> Result<ChatCompletionInput, AppError> {
        if self.user_id.trim().is_empty() {
            return Err(AppError::Validation("user_id must not be empty".to_string()));
        }
        Ok(ChatCompletionInput {
            chat_id: self.chat_id.filter(|id| !id.trim().is_empty()),
            user_id: self.user_id,
            user_message: self.message,
            config: self.config.unwrap_or_default().apply(defaults),
        })
    }
}

/// POST /api/v1/chat - Run one exchange.
pub async fn complete_chat(
    State(state): State<AppState>,
    _auth: Authenticated,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ApiResponse<ChatCompletionOutput>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let input = body.into_input(&state.config.completion)?;
    let cancel = state.shutdown.child_token();
    let output = state.completion_service.execute(input, &cancel).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let chat_link = format!("/api/v1/chats/{}", output.chat_id);
    let resp = ApiResponse::success(output, request_id, elapsed).with_link("chat", &chat_link);

    Ok(Json(resp))
}

/// POST /api/v1/chat/stream - SSE streaming exchange.
///
/// The exchange runs in its own task, so a client that disconnects mid-answer
/// does not prevent the chat from being persisted.
pub async fn stream_chat(
    State(state): State<AppState>,
    _auth: Authenticated,
    Json(body): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let input = body.into_input(&state.config.completion)?;

    let (tx, mut rx) = mpsc::channel::<ChatCompletionOutput>(FRAGMENT_BUFFER);
    let service = state.completion_service.clone();
    let cancel = state.shutdown.child_token();
    let exchange =
        tokio::spawn(async move { service.execute_stream(input, tx, &cancel).await });

    let sse_stream = async_stream::stream! {
        while let Some(fragment) = rx.recv().await {
            let data = serde_json::json!({
                "chat_id": fragment.chat_id,
                "text": fragment.content,
            });
            yield Ok::<_, Infallible>(Event::default().event("text_delta").data(data.to_string()));
        }

        match exchange.await {
            Ok(Ok(output)) => {
                let data = serde_json::to_string(&output).unwrap_or_default();
                yield Ok(Event::default().event("done").data(data));
            }
            Ok(Err(e)) => yield Ok(error_event(&AppError::from(e))),
            Err(join_err) => {
                tracing::error!(error = %join_err, "Streaming exchange task failed");
                yield Ok(error_event(&AppError::Internal("exchange task failed".to_string())));
            }
        }
    };

    Ok(Sse::new(sse_stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

fn error_event(err: &AppError) -> Event {
    let (_, code, message) = err.parts();
    let data = serde_json::json!({ "code": code, "message": message });
    Event::default().event("error").data(data.to_string())
}

/// GET /api/v1/chats/{id} - Get a chat by ID.
pub async fn get_chat(
    State(state): State<AppState>,
    _auth: Authenticated,
    Path(chat_id): Path<String>,
) -> Result<Json<ApiResponse<Chat>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let chat = state.completion_service.find_chat(&chat_id).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let self_link = format!("/api/v1/chats/{}", chat.id());
    let end_link = format!("/api/v1/chats/{}/end", chat.id());
    let resp = ApiResponse::success(chat, request_id, elapsed)
        .with_link("self", &self_link)
        .with_link("end", &end_link);

    Ok(Json(resp))
}

/// POST /api/v1/chats/{id}/end - End a chat. Ending an ended chat succeeds.
pub async fn end_chat(
    State(state): State<AppState>,
    _auth: Authenticated,
    Path(chat_id): Path<String>,
) -> Result<Json<ApiResponse<Chat>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let chat = state.completion_service.end_chat(&chat_id).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let self_link = format!("/api/v1/chats/{}", chat.id());
    let resp = ApiResponse::success(chat, request_id, elapsed).with_link("self", &self_link);

    Ok(Json(resp))
}
