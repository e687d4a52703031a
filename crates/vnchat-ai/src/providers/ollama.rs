//! Ollama `/api/generate` provider

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use super::{LlmProvider, status_error};
use crate::{
    error::{Error, Result},
    stream::{TextEvent, TextEventStream},
    types::{CompletionRequest, Model, StopReason, Usage},
};

/// Ollama API client
pub struct OllamaProvider {
    client: reqwest::Client,
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl OllamaProvider {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn build_request(&self, model: &Model, request: &CompletionRequest) -> GenerateRequest {
        let opts = &request.options;
        GenerateRequest {
            model: model.id.clone(),
            prompt: request.prompt.clone(),
            system: request.system.clone(),
            stream: true,
            options: GenerateOptions {
                temperature: opts.temperature,
                num_predict: opts.max_tokens,
                stop: if opts.stop_sequences.is_empty() {
                    None
                } else {
                    Some(opts.stop_sequences.clone())
                },
            },
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn stream(
        &self,
        model: &Model,
        request: &CompletionRequest,
    ) -> Result<TextEventStream> {
        let body = self.build_request(model, request);
        let url = format!("{}/api/generate", model.base_url);
        tracing::debug!(model = %model.id, %url, "opening generate stream");

        let mut builder = self.client.post(&url).json(&body);
        for (key, value) in &model.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::ModelNotFound(model.id.clone()));
        }
        if !status.is_success() {
            return Err(status_error(response).await);
        }

        Ok(Box::pin(create_stream(response, model.id.clone())))
    }
}

fn create_stream(
    response: reqwest::Response,
    model_id: String,
) -> impl futures::Stream<Item = TextEvent> {
    stream! {
        let mut bytes = response.bytes_stream();
        let mut decoder = LineDecoder::default();

        yield TextEvent::Start { model: model_id };

        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield TextEvent::Error { message: format!("stream read failed: {e}") };
                    return;
                }
            };

            for line in decoder.push(&chunk) {
                match parse_line(&line) {
                    Ok(Some(event)) => {
                        let terminal = event.is_terminal();
                        yield event;
                        if terminal {
                            return;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        yield TextEvent::Error { message: e.to_string() };
                        return;
                    }
                }
            }
        }

        // The server closed without a done marker
        if let Some(line) = decoder.finish() {
            if let Ok(Some(event)) = parse_line(&line) {
                let terminal = event.is_terminal();
                yield event;
                if terminal {
                    return;
                }
            }
        }
        yield TextEvent::Error { message: "stream ended before completion".to_string() };
    }
}

/// Splits a byte stream into complete newline-terminated lines
#[derive(Debug, Default)]
struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line).trim().to_string();
            if !text.is_empty() {
                lines.push(text);
            }
        }
        lines
    }

    fn finish(&mut self) -> Option<String> {
        let rest = String::from_utf8_lossy(&self.buffer).trim().to_string();
        self.buffer.clear();
        (!rest.is_empty()).then_some(rest)
    }
}

/// Decode one NDJSON line into an event. Empty fragments yield nothing.
fn parse_line(line: &str) -> Result<Option<TextEvent>> {
    let chunk: GenerateChunk = serde_json::from_str(line)
        .map_err(|e| Error::Stream(format!("failed to parse chunk: {e}")))?;

    if let Some(message) = chunk.error {
        return Ok(Some(TextEvent::Error { message }));
    }

    if chunk.done {
        return Ok(Some(TextEvent::Done {
            stop_reason: chunk
                .done_reason
                .as_deref()
                .and_then(StopReason::from_wire)
                .or(Some(StopReason::Stop)),
            usage: Usage {
                input: chunk.prompt_eval_count.unwrap_or(0),
                output: chunk.eval_count.unwrap_or(0),
            },
        }));
    }

    match chunk.response {
        Some(delta) if !delta.is_empty() => Ok(Some(TextEvent::Delta { delta })),
        _ => Ok(None),
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StreamOptions;

    #[test]
    fn test_line_decoder_handles_split_chunks() {
        let mut decoder = LineDecoder::default();
        assert!(decoder.push(b"{\"response\":\"He").is_empty());
        let lines = decoder.push(b"llo\"}\n{\"response\":\" there\"}\n{\"done\"");
        assert_eq!(
            lines,
            vec![r#"{"response":"Hello"}"#, r#"{"response":" there"}"#]
        );
        assert_eq!(decoder.finish().as_deref(), Some(r#"{"done""#));
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_parse_delta_line() {
        let event = parse_line(r#"{"model":"llama3","response":"Hi","done":false}"#).unwrap();
        assert!(matches!(event, Some(TextEvent::Delta { ref delta }) if delta == "Hi"));
    }

    #[test]
    fn test_parse_empty_fragment_is_skipped() {
        let event = parse_line(r#"{"response":"","done":false}"#).unwrap();
        assert!(event.is_none());
    }

    #[test]
    fn test_parse_done_line() {
        let event = parse_line(
            r#"{"response":"","done":true,"done_reason":"length","prompt_eval_count":12,"eval_count":40}"#,
        )
        .unwrap();
        match event {
            Some(TextEvent::Done { stop_reason, usage }) => {
                assert_eq!(stop_reason, Some(StopReason::Length));
                assert_eq!(usage.input, 12);
                assert_eq!(usage.output, 40);
            }
            other => panic!("expected Done, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_error_line() {
        let event = parse_line(r#"{"error":"model runner crashed"}"#).unwrap();
        assert!(matches!(event, Some(TextEvent::Error { ref message }) if message == "model runner crashed"));
    }

    #[test]
    fn test_parse_garbage_line() {
        assert!(parse_line("not json").is_err());
    }

    #[test]
    fn test_build_request_maps_options() {
        let provider = OllamaProvider::new();
        let model = crate::models::local_model(crate::Api::Ollama, "llama3", None);
        let request = CompletionRequest::new("Say hi").with_options(StreamOptions {
            max_tokens: Some(64),
            temperature: Some(0.7),
            stop_sequences: vec!["User:".into()],
        });
        let body = serde_json::to_value(provider.build_request(&model, &request)).unwrap();
        assert_eq!(body["model"], "llama3");
        assert_eq!(body["prompt"], "Say hi");
        assert_eq!(body["stream"], true);
        assert_eq!(body["options"]["num_predict"], 64);
        assert_eq!(body["options"]["stop"][0], "User:");
        assert!(body.get("system").is_none());
    }
}
