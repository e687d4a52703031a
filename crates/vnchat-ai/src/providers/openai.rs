//! OpenAI-compatible Chat Completions provider (llama.cpp server, LM Studio, vLLM)

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};

use super::LlmProvider;
use crate::{
    error::{Error, Result},
    stream::{TextEvent, TextEventStream},
    types::{CompletionRequest, Model, StopReason, Usage},
};

/// OpenAI-compatible API client
pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl OpenAIProvider {
    /// Create a provider. Local servers usually accept any key or none.
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }

    fn build_request(&self, model: &Model, request: &CompletionRequest) -> ChatRequest {
        let mut messages = Vec::new();

        if let Some(ref system) = request.system {
            messages.push(ChatMessage {
                role: "system",
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: request.prompt.clone(),
        });

        let opts = &request.options;
        ChatRequest {
            model: model.id.clone(),
            messages,
            stream: true,
            max_tokens: opts.max_tokens.or(Some(model.max_tokens)),
            temperature: opts.temperature,
            stop: if opts.stop_sequences.is_empty() {
                None
            } else {
                Some(opts.stop_sequences.clone())
            },
        }
    }

    fn headers(&self, model: &Model) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(ref key) = self.api_key {
            if let Ok(value) = format!("Bearer {key}").parse() {
                headers.insert(reqwest::header::AUTHORIZATION, value);
            }
        }

        for (key, value) in &model.headers {
            if let (Ok(name), Ok(val)) = (
                key.parse::<reqwest::header::HeaderName>(),
                value.parse::<reqwest::header::HeaderValue>(),
            ) {
                headers.insert(name, val);
            }
        }
        headers
    }
}

#[async_trait]
impl LlmProvider for OpenAIProvider {
    async fn stream(
        &self,
        model: &Model,
        request: &CompletionRequest,
    ) -> Result<TextEventStream> {
        let body = self.build_request(model, request);
        let url = format!("{}/chat/completions", model.base_url);
        tracing::debug!(model = %model.id, %url, "opening chat completion stream");

        let request_builder = self
            .client
            .post(&url)
            .headers(self.headers(model))
            .json(&body);

        let mut event_source = EventSource::new(request_builder)
            .map_err(|e| Error::Stream(format!("failed to create event source: {e}")))?;

        // Surface connection and status failures before handing out the stream
        match event_source.next().await {
            Some(Ok(Event::Open)) => {}
            Some(Ok(Event::Message(_))) => {
                return Err(Error::UnexpectedResponse(
                    "message received before stream opened".to_string(),
                ));
            }
            Some(Err(e)) => {
                event_source.close();
                return Err(open_error(e).await);
            }
            None => return Err(Error::Stream("stream closed before opening".to_string())),
        }

        Ok(Box::pin(create_stream(event_source, model.id.clone())))
    }
}

async fn open_error(err: reqwest_eventsource::Error) -> Error {
    match err {
        reqwest_eventsource::Error::Transport(e) => Error::Http(e),
        reqwest_eventsource::Error::InvalidStatusCode(status, response) => {
            if status == reqwest::StatusCode::NOT_FOUND {
                let body = response.text().await.unwrap_or_default();
                if body.to_lowercase().contains("model") {
                    return Error::api("http_404", body);
                }
                return Error::api("http_404", "endpoint not found");
            }
            super::status_error(response).await
        }
        other => Error::Stream(other.to_string()),
    }
}

fn create_stream(
    mut event_source: EventSource,
    model_id: String,
) -> impl futures::Stream<Item = TextEvent> {
    stream! {
        let mut finish_reason: Option<String> = None;
        let mut usage = Usage::default();

        yield TextEvent::Start { model: model_id };

        while let Some(event) = event_source.next().await {
            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(msg)) => {
                    if msg.data == "[DONE]" {
                        break;
                    }

                    match serde_json::from_str::<StreamChunk>(&msg.data) {
                        Ok(chunk) => {
                            for choice in &chunk.choices {
                                if let Some(ref content) = choice.delta.content {
                                    if !content.is_empty() {
                                        yield TextEvent::Delta { delta: content.clone() };
                                    }
                                }
                                if let Some(ref reason) = choice.finish_reason {
                                    finish_reason = Some(reason.clone());
                                }
                            }
                            if let Some(ref stream_usage) = chunk.usage {
                                usage.input = stream_usage.prompt_tokens;
                                usage.output = stream_usage.completion_tokens;
                            }
                        }
                        Err(e) => {
                            event_source.close();
                            yield TextEvent::Error {
                                message: format!("failed to parse chunk: {e}"),
                            };
                            return;
                        }
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => break,
                Err(e) => {
                    event_source.close();
                    yield TextEvent::Error { message: format!("SSE error: {e}") };
                    return;
                }
            }
        }
        event_source.close();

        yield TextEvent::Done {
            stop_reason: finish_reason
                .as_deref()
                .and_then(StopReason::from_wire)
                .or(Some(StopReason::Stop)),
            usage,
        };
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<StreamUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Api, models::local_model};

    #[test]
    fn test_build_request_single_turn() {
        let provider = OpenAIProvider::new(None);
        let model = local_model(Api::OpenAICompletions, "mistral", None);
        let request = CompletionRequest::new("Continue the scene").with_system("Be brief");
        let body = serde_json::to_value(provider.build_request(&model, &request)).unwrap();

        assert_eq!(body["model"], "mistral");
        assert_eq!(body["stream"], true);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"], "Continue the scene");
        assert_eq!(body["max_tokens"], model.max_tokens);
        assert!(body.get("stop").is_none());
    }

    #[test]
    fn test_headers_include_bearer_when_keyed() {
        let model = local_model(Api::OpenAICompletions, "mistral", None);
        let keyed = OpenAIProvider::new(Some("secret".into()));
        assert_eq!(
            keyed.headers(&model)[reqwest::header::AUTHORIZATION],
            "Bearer secret"
        );
        let anonymous = OpenAIProvider::new(None);
        assert!(anonymous.headers(&model).get(reqwest::header::AUTHORIZATION).is_none());
    }

    #[test]
    fn test_stream_chunk_decoding() {
        let chunk: StreamChunk = serde_json::from_str(
            r#"{"choices":[{"delta":{"content":"Hi"},"finish_reason":null}]}"#,
        )
        .unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Hi"));

        let last: StreamChunk = serde_json::from_str(
            r#"{"choices":[{"delta":{},"finish_reason":"stop"}],"usage":{"prompt_tokens":5,"completion_tokens":7}}"#,
        )
        .unwrap();
        assert_eq!(last.choices[0].finish_reason.as_deref(), Some("stop"));
        assert_eq!(last.usage.map(|u| u.completion_tokens), Some(7));
    }
}
