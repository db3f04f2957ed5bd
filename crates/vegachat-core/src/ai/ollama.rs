use std::fmt;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{status_error, ChatTransport, EventStream, ProviderError, StreamEvent};
use crate::state::{ChatMessage, ChatRole};

pub const DEFAULT_URL: &str = "http://localhost:11434";

/// Upper bound for a `/api/tags` call.
const LIST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct OllamaMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
}

#[derive(Deserialize, Default)]
struct OllamaChunkMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct OllamaChunk {
    #[serde(default)]
    message: Option<OllamaChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

#[derive(Deserialize)]
struct OllamaModelsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self.client.get(&url).timeout(LIST_TIMEOUT).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("Failed to list models: {}", response.status()));
        }

        let models_response: OllamaModelsResponse = response.json().await?;
        let model_names: Vec<String> = models_response
            .models
            .into_iter()
            .map(|model| model.name)
            .collect();

        Ok(model_names)
    }
}

fn build_request<'a>(model: &'a str, messages: &'a [ChatMessage]) -> OllamaRequest<'a> {
    OllamaRequest {
        model,
        messages: messages
            .iter()
            .map(|m| OllamaMessage {
                role: match m.role {
                    ChatRole::Developer => "system",
                    other => other.as_str(),
                },
                content: &m.content,
            })
            .collect(),
        stream: true,
    }
}

/// Ollama streams one JSON object per line.
#[derive(Default)]
struct OllamaDecoder {
    pending: Vec<u8>,
    text: String,
}

impl OllamaDecoder {
    fn push(&mut self, chunk: &[u8]) -> Result<Vec<StreamEvent>, ProviderError> {
        self.pending.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.decode_line(&line, &mut events)?;
        }
        Ok(events)
    }

    fn finish(&mut self) -> Result<Vec<StreamEvent>, ProviderError> {
        let line = std::mem::take(&mut self.pending);
        let mut events = Vec::new();
        self.decode_line(&line, &mut events)?;
        Ok(events)
    }

    fn decode_line(&mut self, line: &[u8], events: &mut Vec<StreamEvent>) -> Result<(), ProviderError> {
        let line = String::from_utf8_lossy(line);
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }
        let chunk: OllamaChunk = serde_json::from_str(line)?;
        if let Some(error) = chunk.error {
            return Err(ProviderError::Provider(format!("Ollama error: {}", error)));
        }
        let content = chunk.message.unwrap_or_default().content;
        if !content.is_empty() {
            self.text.push_str(&content);
            events.push(StreamEvent::Delta(content));
        }
        if chunk.done {
            events.push(StreamEvent::Done(std::mem::take(&mut self.text)));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn open_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<EventStream, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);
        let request = build_request(model, messages);

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            return Err(status_error("Ollama", response).await);
        }

        Ok(ndjson_stream(response.bytes_stream()))
    }
}

/// Decode a newline-delimited `/api/chat` body into stream events.
fn ndjson_stream<S, B, E>(mut bytes: S) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send,
    E: fmt::Display + Send,
{
    let stream = try_stream! {
        let mut decoder = OllamaDecoder::default();
        while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(|e| ProviderError::Stream(e.to_string()))?;
            for event in decoder.push(chunk.as_ref())? {
                yield event;
            }
        }
        for event in decoder.finish()? {
            yield event;
        }
    };
    stream.boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = OllamaClient::new("http://localhost:11434/");
        assert_eq!(client.base_url, "http://localhost:11434");
        assert_eq!(client.name(), "ollama");
    }

    #[test]
    fn developer_role_maps_to_system() {
        let messages = vec![ChatMessage::developer("rules"), ChatMessage::user("hi")];
        let json = serde_json::to_value(build_request("llama3.2", &messages)).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
    }

    #[test]
    fn decodes_split_lines_and_done() {
        let mut decoder = OllamaDecoder::default();
        let mut events = decoder
            .push(b"{\"message\":{\"role\":\"assistant\",\"content\":\"Hi\"},\"done\":false}\n{\"message\":{\"con")
            .unwrap();
        events.extend(
            decoder
                .push(b"tent\":\" there\"},\"done\":false}\n{\"message\":{\"content\":\"\"},\"done\":true}\n")
                .unwrap(),
        );

        assert_eq!(
            events,
            vec![
                StreamEvent::Delta("Hi".to_string()),
                StreamEvent::Delta(" there".to_string()),
                StreamEvent::Done("Hi there".to_string()),
            ]
        );
        assert!(decoder.finish().unwrap().is_empty());
    }

    #[tokio::test]
    async fn body_failure_mid_reply_is_stream_error() {
        let chunks: Vec<Result<&'static [u8], String>> = vec![
            Ok(b"{\"message\":{\"content\":\"Hi\"},\"done\":false}\n".as_slice()),
            Err("connection reset".to_string()),
        ];
        let events: Vec<_> = ndjson_stream(futures_util::stream::iter(chunks)).collect().await;

        assert_eq!(events[0].as_ref().unwrap(), &StreamEvent::Delta("Hi".to_string()));
        assert!(matches!(events[1], Err(ProviderError::Stream(ref m)) if m == "connection reset"));
    }

    #[test]
    fn error_line_is_provider_error() {
        let mut decoder = OllamaDecoder::default();
        let err = decoder.push(b"{\"error\":\"model 'x' not found\"}\n").unwrap_err();
        assert_eq!(err.to_string(), "Ollama error: model 'x' not found");
    }
}
