//! OpenAI SSE stream to [`StreamEvent`] adapter.
//!
//! Maps `async-openai`'s [`ChatCompletionResponseStream`] events to the
//! provider-agnostic [`StreamEvent`] enum defined in `chatservice-types`.
//! Only the first choice contributes text; requests asking for `n > 1`
//! choices still produce a single answer.

use futures_util::StreamExt;

use async_openai::types::chat::{ChatCompletionResponseStream, FinishReason};

use chatservice_core::llm::provider::LlmEventStream;
use chatservice_types::llm::{LlmError, StopReason, StreamEvent, Usage};

use super::map_openai_error;

/// Map an async-openai [`ChatCompletionResponseStream`] to a stream of [`StreamEvent`]s.
///
/// The returned stream emits events in this order:
/// 1. `Connected` -- immediately on entry
/// 2. `TextDelta` -- for each non-empty content chunk of the first choice
/// 3. `MessageDelta` -- with the stop reason when finish_reason appears
/// 4. `Usage` -- token usage (requires `stream_options.include_usage = true` on request)
/// 5. `Done` -- at the end of the stream
///
/// A stream that ends before any finish_reason was seen is truncated; it
/// ends with `LlmError::Stream` instead of `Done`.
pub fn map_openai_stream(stream: ChatCompletionResponseStream) -> LlmEventStream {
    Box::pin(async_stream::try_stream! {
        yield StreamEvent::Connected;

        let mut stream = stream;
        let mut finished = false;

        while let Some(result) = stream.next().await {
            let chunk = result.map_err(map_openai_error)?;

            for choice in chunk.choices.iter().filter(|c| c.index == 0) {
                if let Some(text) = choice.delta.content.as_ref().filter(|t| !t.is_empty()) {
                    yield StreamEvent::TextDelta { text: text.clone() };
                }

                if let Some(finish_reason) = choice.finish_reason.as_ref() {
                    finished = true;
                    yield StreamEvent::MessageDelta {
                        stop_reason: map_finish_reason(finish_reason),
                    };
                }
            }

            // The final chunk carries usage with an empty choices array.
            if let Some(usage) = chunk.usage.as_ref() {
                yield StreamEvent::Usage(Usage {
                    input_tokens: usage.prompt_tokens,
                    output_tokens: usage.completion_tokens,
                });
            }
        }

        if !finished {
            Err::<(), _>(LlmError::Stream(
                "stream ended without a finish reason".to_string(),
            ))?;
        }

        yield StreamEvent::Done;
    })
}

/// Map an OpenAI finish reason onto [`StopReason`].
pub(crate) fn map_finish_reason(reason: &FinishReason) -> StopReason {
    match reason {
        FinishReason::Stop => StopReason::EndTurn,
        FinishReason::Length => StopReason::MaxTokens,
        FinishReason::ContentFilter => StopReason::ContentFilter,
        FinishReason::ToolCalls | FinishReason::FunctionCall => StopReason::EndTurn,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_openai::error::OpenAIError;
    use async_openai::types::chat::CreateChatCompletionStreamResponse;

    fn chunk(json: serde_json::Value) -> Result<CreateChatCompletionStreamResponse, OpenAIError> {
        Ok(serde_json::from_value(json).unwrap())
    }

    fn delta(index: u32, content: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "created": 1_760_000_000,
            "model": "gpt-4o-mini",
            "choices": [{
                "index": index,
                "delta": { "content": content },
                "finish_reason": null
            }]
        })
    }

    #[tokio::test]
    async fn test_stream_maps_chunks_in_order() {
        let finish = serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "created": 1_760_000_000,
            "model": "gpt-4o-mini",
            "choices": [{ "index": 0, "delta": {}, "finish_reason": "stop" }]
        });
        let usage = serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "created": 1_760_000_000,
            "model": "gpt-4o-mini",
            "choices": [],
            "usage": { "prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15 }
        });

        let source: ChatCompletionResponseStream = Box::pin(futures_util::stream::iter(vec![
            chunk(delta(0, "Hel")),
            chunk(delta(1, "ignored")),
            chunk(delta(0, "")),
            chunk(delta(0, "lo")),
            chunk(finish),
            chunk(usage),
        ]));

        let events: Vec<StreamEvent> = map_openai_stream(source)
            .map(|e| e.unwrap())
            .collect()
            .await;

        assert_eq!(
            events,
            vec![
                StreamEvent::Connected,
                StreamEvent::TextDelta { text: "Hel".into() },
                StreamEvent::TextDelta { text: "lo".into() },
                StreamEvent::MessageDelta {
                    stop_reason: StopReason::EndTurn
                },
                StreamEvent::Usage(Usage {
                    input_tokens: 12,
                    output_tokens: 3
                }),
                StreamEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_stream_error_ends_stream() {
        let source: ChatCompletionResponseStream = Box::pin(futures_util::stream::iter(vec![
            chunk(delta(0, "partial")),
            Err(OpenAIError::InvalidArgument("connection reset".into())),
            chunk(delta(0, "never")),
        ]));

        let events: Vec<_> = map_openai_stream(source).collect().await;
        assert_eq!(events.len(), 3);
        assert!(matches!(events[1], Ok(StreamEvent::TextDelta { .. })));
        assert!(matches!(events[2], Err(LlmError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_stream_without_finish_reason_is_an_error() {
        let source: ChatCompletionResponseStream = Box::pin(futures_util::stream::iter(vec![
            chunk(delta(0, "The answer is")),
        ]));

        let events: Vec<_> = map_openai_stream(source).collect().await;
        assert_eq!(events.len(), 3);
        assert!(matches!(events[1], Ok(StreamEvent::TextDelta { .. })));
        assert!(matches!(events[2], Err(LlmError::Stream(_))));
    }

    #[test]
    fn test_finish_reason_mapping() {
        assert_eq!(map_finish_reason(&FinishReason::Stop), StopReason::EndTurn);
        assert_eq!(map_finish_reason(&FinishReason::Length), StopReason::MaxTokens);
        assert_eq!(
            map_finish_reason(&FinishReason::ContentFilter),
            StopReason::ContentFilter
        );
    }
}
