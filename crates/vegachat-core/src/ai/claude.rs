use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::sse::{self, SseFrame};
use super::{status_error, ChatTransport, EventStream, ProviderError, StreamEvent};
use crate::state::{ChatMessage, ChatRole};

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";

#[derive(Serialize)]
struct ClaudeMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ClaudeRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ClaudeMessage<'a>>,
    stream: bool,
}

#[derive(Deserialize)]
struct ClaudeDelta {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ClaudeErrorBody {
    message: String,
}

#[derive(Deserialize)]
struct ClaudeStreamEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    delta: Option<ClaudeDelta>,
    #[serde(default)]
    error: Option<ClaudeErrorBody>,
}

#[derive(Clone)]
pub struct ClaudeClient {
    client: Client,
    api_key: String,
}

impl ClaudeClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
        }
    }

    pub fn list_models() -> Vec<String> {
        vec![
            "claude-sonnet-4-20250514".to_string(),
            "claude-3-5-sonnet-20241022".to_string(),
            "claude-3-5-haiku-20241022".to_string(),
        ]
    }
}

/// Claude takes instructions in a separate `system` field.
fn build_request<'a>(model: &'a str, messages: &'a [ChatMessage]) -> ClaudeRequest<'a> {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == ChatRole::Developer)
        .map(|m| m.content.as_str())
        .collect();

    ClaudeRequest {
        model,
        max_tokens: 4096,
        system: if system.is_empty() {
            None
        } else {
            Some(system.join("\n\n"))
        },
        messages: messages
            .iter()
            .filter(|m| m.role != ChatRole::Developer)
            .map(|m| ClaudeMessage {
                role: m.role.as_str(),
                content: &m.content,
            })
            .collect(),
        stream: true,
    }
}

/// Claude never sends the full text, so the decoder keeps its own copy to
/// put in the `Done` event.
#[derive(Default)]
struct ClaudeDecoder {
    text: String,
}

impl ClaudeDecoder {
    fn decode(&mut self, frame: &SseFrame) -> Result<Option<StreamEvent>, ProviderError> {
        if frame.data.is_empty() {
            return Ok(None);
        }
        let event: ClaudeStreamEvent = serde_json::from_str(&frame.data)?;
        match event.kind.as_str() {
            "content_block_delta" => match event.delta {
                Some(ClaudeDelta {
                    kind,
                    text: Some(text),
                }) if kind == "text_delta" => {
                    self.text.push_str(&text);
                    Ok(Some(StreamEvent::Delta(text)))
                }
                _ => Ok(None),
            },
            "message_stop" => Ok(Some(StreamEvent::Done(std::mem::take(&mut self.text)))),
            "error" => Err(ProviderError::Provider(format!(
                "Claude stream error: {}",
                event
                    .error
                    .map(|e| e.message)
                    .unwrap_or_else(|| "unknown error".to_string())
            ))),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl ChatTransport for ClaudeClient {
    fn name(&self) -> &str {
        "claude"
    }

    async fn open_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<EventStream, ProviderError> {
        let request = build_request(model, messages);

        let response = self
            .client
            .post(MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error("Claude", response).await);
        }

        let mut decoder = ClaudeDecoder::default();
        Ok(sse::event_stream(response.bytes_stream(), move |frame| decoder.decode(frame)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(data: &str) -> SseFrame {
        SseFrame {
            event: None,
            data: data.to_string(),
        }
    }

    #[test]
    fn developer_message_moves_to_system() {
        let messages = vec![
            ChatMessage::developer("draw charts"),
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
        ];
        let request = build_request("claude-sonnet-4-20250514", &messages);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["system"], "draw charts");
        assert_eq!(json["messages"].as_array().unwrap().len(), 2);
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn done_carries_accumulated_text() {
        let mut decoder = ClaudeDecoder::default();
        let frames = [
            r#"{"type":"message_start","message":{}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hel"}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"lo"}}"#,
            r#"{"type":"message_stop"}"#,
        ];
        let events: Vec<StreamEvent> = frames
            .iter()
            .filter_map(|data| decoder.decode(&frame(data)).unwrap())
            .collect();

        assert_eq!(
            events,
            vec![
                StreamEvent::Delta("Hel".to_string()),
                StreamEvent::Delta("lo".to_string()),
                StreamEvent::Done("Hello".to_string()),
            ]
        );
    }

    #[test]
    fn error_event_is_provider_error() {
        let mut decoder = ClaudeDecoder::default();
        let err = decoder
            .decode(&frame(r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#))
            .unwrap_err();
        assert_eq!(err.to_string(), "Claude stream error: Overloaded");
    }
}
