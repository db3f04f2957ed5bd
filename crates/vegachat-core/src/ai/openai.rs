use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::sse::{self, SseFrame};
use super::{status_error, ChatTransport, EventStream, ProviderError, StreamEvent};
use crate::state::ChatMessage;

const RESPONSES_URL: &str = "https://api.openai.com/v1/responses";

#[derive(Serialize)]
struct OpenAIMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    input: Vec<OpenAIMessage<'a>>,
    stream: bool,
}

/// The subset of Responses API stream events we act on
#[derive(Deserialize)]
struct OpenAIStreamEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    delta: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    response: Option<serde_json::Value>,
}

#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    api_key: String,
    url: String,
}

impl OpenAIClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            url: RESPONSES_URL.to_string(),
        }
    }

    pub fn list_models() -> Vec<String> {
        vec![
            "gpt-4o".to_string(),
            "gpt-4o-mini".to_string(),
            "gpt-4.1".to_string(),
            "gpt-4.1-mini".to_string(),
        ]
    }
}

fn build_request<'a>(model: &'a str, messages: &'a [ChatMessage]) -> OpenAIRequest<'a> {
    OpenAIRequest {
        model,
        input: messages
            .iter()
            .map(|m| OpenAIMessage {
                role: m.role.as_str(),
                content: &m.content,
            })
            .collect(),
        stream: true,
    }
}

/// Map one SSE frame to a stream event; `Ok(None)` for events we ignore.
fn decode_frame(frame: &SseFrame) -> Result<Option<StreamEvent>, ProviderError> {
    if frame.data.is_empty() || frame.is_done_marker() {
        return Ok(None);
    }
    let event: OpenAIStreamEvent = serde_json::from_str(&frame.data)?;
    match event.kind.as_str() {
        "response.output_text.delta" => Ok(event.delta.map(StreamEvent::Delta)),
        "response.output_text.done" => Ok(Some(StreamEvent::Done(event.text.unwrap_or_default()))),
        "error" => Err(ProviderError::Provider(format!(
            "OpenAI stream error: {}",
            event.message.unwrap_or_else(|| "unknown error".to_string())
        ))),
        "response.failed" => {
            let message = event
                .response
                .as_ref()
                .and_then(|r| r["error"]["message"].as_str())
                .unwrap_or("response failed")
                .to_string();
            Err(ProviderError::Provider(format!("OpenAI stream error: {}", message)))
        }
        _ => Ok(None),
    }
}

#[async_trait]
impl ChatTransport for OpenAIClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn open_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<EventStream, ProviderError> {
        let request = build_request(model, messages);

        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error("OpenAI", response).await);
        }

        Ok(sse::event_stream(response.bytes_stream(), decode_frame))
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
    fn decodes_delta_and_done() {
        let delta = decode_frame(&frame(
            r#"{"type":"response.output_text.delta","item_id":"msg_1","delta":"Hel"}"#,
        ))
        .unwrap();
        assert_eq!(delta, Some(StreamEvent::Delta("Hel".to_string())));

        let done = decode_frame(&frame(
            r#"{"type":"response.output_text.done","item_id":"msg_1","text":"Hello"}"#,
        ))
        .unwrap();
        assert_eq!(done, Some(StreamEvent::Done("Hello".to_string())));
    }

    #[test]
    fn ignores_lifecycle_events() {
        let event = decode_frame(&frame(r#"{"type":"response.created","response":{}}"#)).unwrap();
        assert_eq!(event, None);
        assert_eq!(decode_frame(&frame("[DONE]")).unwrap(), None);
    }

    #[test]
    fn failed_response_becomes_provider_error() {
        let err = decode_frame(&frame(
            r#"{"type":"response.failed","response":{"error":{"message":"rate limited"}}}"#,
        ))
        .unwrap_err();
        assert_eq!(err.to_string(), "OpenAI stream error: rate limited");
    }

    #[test]
    fn malformed_event_is_json_error() {
        let err = decode_frame(&frame("{not json")).unwrap_err();
        assert!(matches!(err, ProviderError::Json(_)));
    }

    #[test]
    fn request_keeps_developer_role() {
        let messages = vec![ChatMessage::developer("rules"), ChatMessage::user("hi")];
        let request = build_request("gpt-4o", &messages);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["input"][0]["role"], "developer");
        assert_eq!(json["stream"], true);
    }
}
