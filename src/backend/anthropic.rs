//! Streaming client for the Anthropic Messages API.
//!
//! Issues one `POST /v1/messages` with `stream: true` per generation and
//! translates the server-sent events into [`BackendEvent`]s.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource, RequestBuilderExt};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use super::{BackendError, BackendEvent, BackendStream, GenerationRequest, TextStreamBackend, Usage};
use crate::config::BackendConfig;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const EVENT_BUFFER_SIZE: usize = 64;

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub api_key: String,
    pub timeout: Duration,
}

impl AnthropicConfig {
    /// Resolve the runtime settings, taking the API key from the config file
    /// or the `ANTHROPIC_API_KEY` environment variable.
    pub fn from_backend_config(config: &BackendConfig) -> Result<Self, BackendError> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or(BackendError::MissingApiKey)?;
        Ok(Self {
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            api_key,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }
}

pub struct AnthropicBackend {
    config: AnthropicConfig,
    client: reqwest::Client,
}

impl AnthropicBackend {
    pub fn new(config: AnthropicConfig) -> Result<Self, BackendError> {
        if config.api_key.trim().is_empty() {
            return Err(BackendError::MissingApiKey);
        }
        // The timeout caps the whole request, streaming included.
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| BackendError::Transport(err.to_string()))?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl TextStreamBackend for AnthropicBackend {
    async fn stream(&self, request: GenerationRequest) -> Result<BackendStream, BackendError> {
        let body = build_request_body(&self.config, &request);
        let es = self
            .client
            .post(self.config.messages_url())
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .eventsource()
            .map_err(|err| BackendError::Transport(err.to_string()))?;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER_SIZE);
        tokio::spawn(pump_events(es, tx));
        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

fn build_request_body(config: &AnthropicConfig, request: &GenerationRequest) -> Value {
    json!({
        "model": config.model,
        "max_tokens": config.max_tokens,
        "stream": true,
        "system": request.system,
        "messages": [{ "role": "user", "content": request.prompt }],
    })
}

/// Forward translated wire events until the message stops, the receiver goes
/// away or the connection fails. Closing the source also suppresses the
/// automatic SSE reconnect, which would re-submit the generation.
async fn pump_events(mut es: EventSource, tx: mpsc::Sender<Result<BackendEvent, BackendError>>) {
    let mut usage = Usage::default();
    while let Some(next) = es.next().await {
        match next {
            Ok(Event::Open) => {
                debug!("messages stream open");
            }
            Ok(Event::Message(msg)) => {
                match translate_wire_event(&msg.event, &msg.data, &mut usage) {
                    Ok(Some(event)) => {
                        let last = matches!(event, BackendEvent::Completed { .. });
                        if tx.send(Ok(event)).await.is_err() || last {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(err) => {
                        let _ = tx.send(Err(err)).await;
                        break;
                    }
                }
            }
            Err(reqwest_eventsource::Error::StreamEnded) => break,
            Err(err) => {
                let _ = tx.send(Err(map_eventsource_error(err).await)).await;
                break;
            }
        }
    }
    es.close();
}

/// Map one named SSE event to at most one backend event, accumulating token
/// usage along the way. Unknown event names pass through as markers so new
/// upstream events never break a generation.
fn translate_wire_event(
    event: &str,
    data: &str,
    usage: &mut Usage,
) -> Result<Option<BackendEvent>, BackendError> {
    let value: Value = serde_json::from_str(data).map_err(|err| {
        BackendError::Protocol(format!("invalid JSON in `{event}` event: {err}"))
    })?;

    match event {
        "content_block_delta" => {
            let delta = value.get("delta");
            if delta.and_then(|d| d.get("type")).and_then(|t| t.as_str()) == Some("text_delta") {
                let text = delta
                    .and_then(|d| d.get("text"))
                    .and_then(|t| t.as_str())
                    .unwrap_or_default();
                return Ok(Some(BackendEvent::TextDelta {
                    text: text.to_string(),
                }));
            }
            Ok(Some(BackendEvent::Marker {
                kind: event.to_string(),
            }))
        }
        "message_start" => {
            if let Some(tokens) = value
                .get("message")
                .and_then(|m| m.get("usage"))
                .and_then(|u| u.get("input_tokens"))
                .and_then(|t| t.as_u64())
            {
                usage.input_tokens = tokens;
            }
            Ok(Some(BackendEvent::Marker {
                kind: event.to_string(),
            }))
        }
        "message_delta" => {
            if let Some(tokens) = value
                .get("usage")
                .and_then(|u| u.get("output_tokens"))
                .and_then(|t| t.as_u64())
            {
                usage.output_tokens = tokens;
            }
            Ok(Some(BackendEvent::Marker {
                kind: event.to_string(),
            }))
        }
        "message_stop" => Ok(Some(BackendEvent::Completed {
            usage: Some(*usage),
        })),
        "error" => {
            let message = value
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("backend reported an unspecified error");
            Err(BackendError::Api(message.to_string()))
        }
        _ => Ok(Some(BackendEvent::Marker {
            kind: event.to_string(),
        })),
    }
}

async fn map_eventsource_error(err: reqwest_eventsource::Error) -> BackendError {
    use reqwest_eventsource::Error as EsError;
    match err {
        EsError::InvalidStatusCode(status, response) => {
            let body = response.text().await.unwrap_or_default();
            let message = api_error_message(&body).unwrap_or_else(|| {
                if body.trim().is_empty() {
                    status
                        .canonical_reason()
                        .unwrap_or("request failed")
                        .to_string()
                } else {
                    body.trim().to_string()
                }
            });
            BackendError::Http {
                status: status.as_u16(),
                message,
            }
        }
        EsError::Transport(err) => BackendError::Transport(err.to_string()),
        other => BackendError::Protocol(other.to_string()),
    }
}

/// Pull `error.message` out of an API error body, if it is one.
fn api_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<Value>(body)
        .ok()?
        .get("error")?
        .get("message")?
        .as_str()
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AnthropicConfig {
        AnthropicConfig {
            base_url: "https://api.anthropic.com".to_string(),
            model: "claude-sonnet-4-5".to_string(),
            max_tokens: 4096,
            api_key: "sk-test".to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn request_body_matches_the_messages_schema() {
        let request = GenerationRequest {
            system: "you build apps".to_string(),
            prompt: "a kanban board".to_string(),
        };
        let body = build_request_body(&test_config(), &request);

        assert_eq!(body["model"], "claude-sonnet-4-5");
        assert_eq!(body["max_tokens"], 4096);
        assert_eq!(body["stream"], true);
        assert_eq!(body["system"], "you build apps");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "a kanban board");
    }

    #[test]
    fn messages_url_tolerates_a_trailing_slash() {
        let mut config = test_config();
        config.base_url = "http://localhost:9999/".to_string();
        assert_eq!(config.messages_url(), "http://localhost:9999/v1/messages");
    }

    #[test]
    fn empty_api_key_is_rejected() {
        let mut config = test_config();
        config.api_key = "  ".to_string();
        assert!(matches!(
            AnthropicBackend::new(config),
            Err(BackendError::MissingApiKey)
        ));
    }

    #[test]
    fn explicit_api_key_wins_over_the_environment() {
        let backend_config = BackendConfig {
            api_key: Some("sk-from-file".to_string()),
            ..BackendConfig::default()
        };
        let config = AnthropicConfig::from_backend_config(&backend_config).unwrap();
        assert_eq!(config.api_key, "sk-from-file");
    }

    #[test]
    fn text_delta_translates_to_a_text_event() {
        let mut usage = Usage::default();
        let data = r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hello"}}"#;
        let event = translate_wire_event("content_block_delta", data, &mut usage).unwrap();
        assert_eq!(
            event,
            Some(BackendEvent::TextDelta {
                text: "Hello".to_string()
            })
        );
    }

    #[test]
    fn non_text_delta_passes_through_as_a_marker() {
        let mut usage = Usage::default();
        let data = r#"{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{}"}}"#;
        let event = translate_wire_event("content_block_delta", data, &mut usage).unwrap();
        assert_eq!(
            event,
            Some(BackendEvent::Marker {
                kind: "content_block_delta".to_string()
            })
        );
    }

    #[test]
    fn usage_is_accumulated_across_the_message() {
        let mut usage = Usage::default();

        let start = r#"{"type":"message_start","message":{"id":"msg_1","usage":{"input_tokens":25,"output_tokens":1}}}"#;
        let event = translate_wire_event("message_start", start, &mut usage).unwrap();
        assert_eq!(
            event,
            Some(BackendEvent::Marker {
                kind: "message_start".to_string()
            })
        );
        assert_eq!(usage.input_tokens, 25);

        let delta = r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":512}}"#;
        translate_wire_event("message_delta", delta, &mut usage).unwrap();
        assert_eq!(usage.output_tokens, 512);

        let stop = r#"{"type":"message_stop"}"#;
        let event = translate_wire_event("message_stop", stop, &mut usage).unwrap();
        assert_eq!(
            event,
            Some(BackendEvent::Completed {
                usage: Some(Usage {
                    input_tokens: 25,
                    output_tokens: 512,
                    cost_usd: None,
                })
            })
        );
    }

    #[test]
    fn error_event_fails_the_stream() {
        let mut usage = Usage::default();
        let data = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        let err = translate_wire_event("error", data, &mut usage).unwrap_err();
        assert!(matches!(err, BackendError::Api(message) if message == "Overloaded"));
    }

    #[test]
    fn ping_passes_through_as_a_marker() {
        let mut usage = Usage::default();
        let event = translate_wire_event("ping", r#"{"type":"ping"}"#, &mut usage).unwrap();
        assert_eq!(
            event,
            Some(BackendEvent::Marker {
                kind: "ping".to_string()
            })
        );
    }

    #[test]
    fn malformed_payload_is_a_protocol_error() {
        let mut usage = Usage::default();
        let err = translate_wire_event("message_start", "not json", &mut usage).unwrap_err();
        assert!(matches!(err, BackendError::Protocol(_)));
    }

    #[test]
    fn api_error_message_is_extracted_from_json_bodies() {
        let body = r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#;
        assert_eq!(
            api_error_message(body),
            Some("invalid x-api-key".to_string())
        );
        assert_eq!(api_error_message("<html>502</html>"), None);
    }
}
