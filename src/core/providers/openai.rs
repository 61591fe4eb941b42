//! Chunk producer for OpenAI-compatible streaming chat completions.

use futures_util::stream::{self, StreamExt};
use memchr::memchr;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::{ChatRequest, ChatResponse};
use crate::core::error::ProducerError;
use crate::core::generation::{ChunkProducer, ChunkStream};
use crate::core::message::ChatMessage;
use crate::core::providers::ProviderSession;
use crate::utils::url::chat_completions_url;

type ChunkSender = mpsc::UnboundedSender<Result<String, ProducerError>>;

#[derive(Debug, PartialEq, Eq)]
enum SseLine {
    Chunk(String),
    Done,
    Error(String),
    Ignore,
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

fn parse_data_payload(payload: &str) -> SseLine {
    if payload == "[DONE]" {
        return SseLine::Done;
    }

    match serde_json::from_str::<ChatResponse>(payload) {
        Ok(response) => response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|content| !content.is_empty())
            .map(SseLine::Chunk)
            .unwrap_or(SseLine::Ignore),
        Err(_) if payload.trim().is_empty() => SseLine::Ignore,
        Err(_) => SseLine::Error(format_api_error(payload)),
    }
}

fn parse_sse_line(line: &str) -> SseLine {
    extract_data_payload(line)
        .map(parse_data_payload)
        .unwrap_or(SseLine::Ignore)
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Render an error body as Markdown for the error frame.
pub fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();

    if trimmed.is_empty() {
        return "API Error:\n```\n<empty>\n```".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Ok(pretty_json) = serde_json::to_string_pretty(&json_value) {
            return match extract_error_summary(&json_value).filter(|s| !s.is_empty()) {
                Some(summary) => format!("API Error: {summary}\n```json\n{pretty_json}\n```"),
                None => format!("API Error:\n```json\n{pretty_json}\n```"),
            };
        }
    }

    if trimmed.starts_with('<') && trimmed.ends_with('>') {
        format!("API Error:\n```xml\n{trimmed}\n```")
    } else {
        format!("API Error:\n```\n{trimmed}\n```")
    }
}

/// Streams `chat/completions` deltas from an OpenAI-compatible endpoint.
///
/// Each [`ChunkProducer::open`] starts one request on a background task.
/// Dropping the returned stream cancels the request.
#[derive(Clone)]
pub struct OpenAiProducer {
    client: reqwest::Client,
    session: ProviderSession,
}

impl OpenAiProducer {
    pub fn new(session: ProviderSession) -> Self {
        Self {
            client: reqwest::Client::new(),
            session,
        }
    }

    pub fn session(&self) -> &ProviderSession {
        &self.session
    }
}

impl ChunkProducer for OpenAiProducer {
    fn open(&self, messages: &[ChatMessage]) -> ChunkStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let guard = cancel.clone().drop_guard();

        let client = self.client.clone();
        let session = self.session.clone();
        let messages = messages.to_vec();
        tokio::spawn(async move {
            tokio::select! {
                _ = stream_completion(client, session, messages, &tx) => {}
                _ = cancel.cancelled() => debug!("completion request dropped"),
            }
        });

        stream::unfold((rx, guard), |(mut rx, guard)| async move {
            let item = rx.recv().await?;
            Some((item, (rx, guard)))
        })
        .boxed()
    }
}

async fn stream_completion(
    client: reqwest::Client,
    session: ProviderSession,
    messages: Vec<ChatMessage>,
    tx: &ChunkSender,
) {
    let request = ChatRequest {
        model: &session.model,
        messages: &messages,
        stream: true,
    };
    let chat_url = chat_completions_url(&session.base_url);
    debug!(url = %chat_url, model = %session.model, "opening completion stream");

    let response = match client
        .post(chat_url)
        .header("Content-Type", "application/json")
        .bearer_auth(&session.api_key)
        .json(&request)
        .send()
        .await
    {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, "completion request failed");
            let _ = tx.send(Err(ProducerError::new(format_api_error(&err.to_string()))));
            return;
        }
    };

    if !response.status().is_success() {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        warn!(%status, "completion request rejected");
        let _ = tx.send(Err(ProducerError::new(format_api_error(&body))));
        return;
    }

    let mut stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk_bytes = match chunk {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, "completion stream broke");
                let _ = tx.send(Err(ProducerError::new(format!("Stream error: {err}"))));
                return;
            }
        };
        buffer.extend_from_slice(&chunk_bytes);

        while let Some(newline_pos) = memchr(b'\n', &buffer) {
            let line: Vec<u8> = buffer.drain(..=newline_pos).collect();
            let Ok(line) = std::str::from_utf8(&line) else {
                debug!("skipping SSE line with invalid UTF-8");
                continue;
            };
            match parse_sse_line(line.trim()) {
                SseLine::Chunk(content) => {
                    if tx.send(Ok(content)).is_err() {
                        return;
                    }
                }
                SseLine::Done => return,
                SseLine::Error(message) => {
                    let _ = tx.send(Err(ProducerError::new(message)));
                    return;
                }
                SseLine::Ignore => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_lines_handle_spacing_variants() {
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#),
            SseLine::Chunk("Hello".into())
        );
        assert_eq!(
            parse_sse_line(r#"data:{"choices":[{"delta":{"content":"World"}}]}"#),
            SseLine::Chunk("World".into())
        );
        assert_eq!(parse_sse_line("data: [DONE]"), SseLine::Done);
        assert_eq!(parse_sse_line("data:[DONE]"), SseLine::Done);
    }

    #[test]
    fn non_data_lines_and_empty_deltas_are_ignored() {
        assert_eq!(parse_sse_line(": keep-alive"), SseLine::Ignore);
        assert_eq!(parse_sse_line("event: message"), SseLine::Ignore);
        assert_eq!(parse_sse_line("data: "), SseLine::Ignore);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            SseLine::Ignore
        );
    }

    #[test]
    fn stream_errors_are_formatted() {
        let expected = r#"API Error: internal server error
```json
{
  "error": {
    "message": "internal server error"
  }
}
```"#;
        assert_eq!(
            parse_sse_line(r#"data: {"error":{"message":"internal server error"}}"#),
            SseLine::Error(expected.to_string())
        );
    }

    #[test]
    fn format_api_error_handles_json_without_summary() {
        let expected = "API Error:\n```json\n{\n  \"status\": \"failed\"\n}\n```";
        assert_eq!(format_api_error(r#"{"status":"failed"}"#), expected);
    }

    #[test]
    fn format_api_error_handles_xml_plaintext_and_empty() {
        assert_eq!(
            format_api_error("<error>bad</error>"),
            "API Error:\n```xml\n<error>bad</error>\n```"
        );
        assert_eq!(
            format_api_error("api failure"),
            "API Error:\n```\napi failure\n```"
        );
        assert_eq!(format_api_error("  "), "API Error:\n```\n<empty>\n```");
    }

    #[tokio::test]
    async fn unreachable_endpoint_surfaces_producer_error() {
        let producer = OpenAiProducer::new(ProviderSession {
            api_key: "sk-test".into(),
            base_url: "http://127.0.0.1:9".into(),
            model: "test".into(),
            provider_display_name: "OpenAI-compatible".into(),
        });

        let mut stream = producer.open(&[ChatMessage::user("hi")]);
        let first = stream.next().await.expect("one item");
        let err = first.expect_err("connection refused");
        assert!(err.message().starts_with("API Error:"));
        assert!(stream.next().await.is_none());
    }
}
