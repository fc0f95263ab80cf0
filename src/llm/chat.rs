//! Reply generation traits and the streaming [`ChatClient`].
//!
//! `ChatClient` calls any OpenAI-compatible `/v1/chat/completions` endpoint
//! with `"stream": true` (Ollama, OpenAI, Groq, LM Studio, vLLM, …) and
//! yields the visible text of each delta as it arrives.
//!
//! ```text
//! bytes_stream ─▶ SseDecoder ─▶ choices[0].delta.content ─▶ ThinkFilter ─▶ chunk
//! ```

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::LlmConfig;

use super::sse::{SseData, SseDecoder};
use super::think::ThinkFilter;

// ---------------------------------------------------------------------------
// LlmError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// HTTP transport or connection error.
    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("LLM request timed out")]
    Timeout,

    #[error("LLM service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// A stream event could not be parsed as the expected JSON.
    #[error("failed to parse LLM response: {0}")]
    Parse(String),

    /// The service reported an error inside the stream.
    #[error("LLM service error: {0}")]
    Api(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// One chat-completions message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Ordered, finite sequence of reply fragments.
pub type ReplyStream = BoxStream<'static, Result<String, LlmError>>;

/// Turns user text into a streamed reply.  This is what the controller talks
/// to.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn stream_reply(&self, text: &str) -> Result<ReplyStream, LlmError>;
}

/// Streams a reply for a full message list.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<ReplyStream, LlmError>;
}

// ---------------------------------------------------------------------------
// ChatClient
// ---------------------------------------------------------------------------

/// Streaming OpenAI-compatible chat client.
///
/// All connection details come from [`LlmConfig`]; nothing is hardcoded.
pub struct ChatClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl ChatClient {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            client: crate::http_client(config.timeout_secs),
            config: config.clone(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn request_body(&self, messages: &[ChatMessage]) -> serde_json::Value {
        serde_json::json!({
            "model":       self.config.model,
            "messages":    messages,
            "stream":      true,
            "temperature": self.config.temperature,
            "max_tokens":  self.config.max_tokens,
        })
    }
}

#[async_trait]
impl ChatBackend for ChatClient {
    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<ReplyStream, LlmError> {
        let request = self
            .client
            .post(self.endpoint())
            .json(&self.request_body(&messages));
        let response = crate::with_bearer(request, self.config.api_key.as_deref())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        log::debug!("llm: streaming reply from {}", self.config.model);
        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(LlmError::from))
            .boxed();
        Ok(decode_stream(bytes))
    }
}

#[async_trait]
impl ReplyGenerator for ChatClient {
    /// Single-turn reply without conversation memory.
    async fn stream_reply(&self, text: &str) -> Result<ReplyStream, LlmError> {
        self.stream_chat(vec![ChatMessage::user(text)]).await
    }
}

// ---------------------------------------------------------------------------
// Stream decoding
// ---------------------------------------------------------------------------

struct DecodeState {
    bytes: BoxStream<'static, Result<Vec<u8>, LlmError>>,
    decoder: SseDecoder,
    filter: ThinkFilter,
    ready: VecDeque<Result<String, LlmError>>,
    done: bool,
}

impl DecodeState {
    fn accept(&mut self, data: SseData) {
        if self.done {
            return;
        }
        match data {
            SseData::Done => self.close(),
            SseData::Json(json) => match parse_delta(&json) {
                Ok(Some(content)) => {
                    let visible = self.filter.push(&content);
                    if !visible.is_empty() {
                        self.ready.push_back(Ok(visible));
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    self.ready.push_back(Err(e));
                    self.done = true;
                }
            },
        }
    }

    fn close(&mut self) {
        if self.done {
            return;
        }
        let rest = self.filter.finish();
        if !rest.is_empty() {
            self.ready.push_back(Ok(rest));
        }
        self.done = true;
    }
}

/// Turn a raw SSE byte stream into visible reply fragments.
///
/// The stream ends after `[DONE]`, at end of body, or right after the first
/// error.
pub fn decode_stream(bytes: BoxStream<'static, Result<Vec<u8>, LlmError>>) -> ReplyStream {
    let state = DecodeState {
        bytes,
        decoder: SseDecoder::new(),
        filter: ThinkFilter::new(),
        ready: VecDeque::new(),
        done: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.ready.pop_front() {
                return Some((item, state));
            }
            if state.done {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    for data in state.decoder.push(&chunk) {
                        state.accept(data);
                    }
                }
                Some(Err(e)) => {
                    state.ready.push_back(Err(e));
                    state.done = true;
                }
                None => {
                    if let Some(data) = state.decoder.finish() {
                        state.accept(data);
                    }
                    state.close();
                }
            }
        }
    })
    .boxed()
}

/// `choices[0].delta.content` of one stream event, if any.
fn parse_delta(json: &str) -> Result<Option<String>, LlmError> {
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| LlmError::Parse(e.to_string()))?;

    if let Some(error) = value.get("error") {
        let message = error["message"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(LlmError::Api(message));
    }

    Ok(value["choices"][0]["delta"]["content"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config(api_key: Option<&str>) -> LlmConfig {
        LlmConfig {
            base_url: "http://localhost:11434/".into(),
            api_key: api_key.map(str::to_string),
            ..LlmConfig::default()
        }
    }

    fn delta(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({ "choices": [{ "delta": { "content": content } }] })
        )
    }

    fn byte_stream(chunks: Vec<String>) -> BoxStream<'static, Result<Vec<u8>, LlmError>> {
        futures::stream::iter(chunks.into_iter().map(|c| Ok(c.into_bytes()))).boxed()
    }

    async fn collect(stream: ReplyStream) -> Vec<Result<String, LlmError>> {
        stream.collect().await
    }

    // ---- ChatClient ---

    #[test]
    fn endpoint_and_body() {
        let client = ChatClient::from_config(&make_config(None));
        assert_eq!(client.endpoint(), "http://localhost:11434/v1/chat/completions");

        let body = client.request_body(&[ChatMessage::user("hi")]);
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hi");
        assert_eq!(body["max_tokens"], 512);
    }

    #[test]
    fn client_is_object_safe_for_both_traits() {
        let _a: Box<dyn ReplyGenerator> = Box::new(ChatClient::from_config(&make_config(None)));
        let _b: Box<dyn ChatBackend> =
            Box::new(ChatClient::from_config(&make_config(Some("sk-test"))));
    }

    #[tokio::test]
    async fn unreachable_service_is_a_request_error() {
        let client = ChatClient::from_config(&LlmConfig {
            base_url: "http://127.0.0.1:9".into(),
            timeout_secs: 2,
            ..LlmConfig::default()
        });
        let err = client.stream_reply("hi").await.err().unwrap();
        assert!(matches!(err, LlmError::Request(_) | LlmError::Timeout));
    }

    // ---- decode_stream ---

    #[tokio::test]
    async fn yields_deltas_in_order() {
        let chunks = vec![delta("Hel"), delta("lo"), "data: [DONE]\n\n".into()];
        let out: Vec<String> = collect(decode_stream(byte_stream(chunks)))
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(out, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn events_split_across_chunks() {
        let whole = format!("{}{}data: [DONE]\n", delta("one"), delta("two"));
        let (a, b) = whole.split_at(17);
        let out: String = collect(decode_stream(byte_stream(vec![a.into(), b.into()])))
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(out, "onetwo");
    }

    #[tokio::test]
    async fn think_blocks_are_hidden() {
        let chunks = vec![
            delta("<think>"),
            delta("reasoning"),
            delta("</think>"),
            delta("Answer"),
        ];
        let out: String = collect(decode_stream(byte_stream(chunks)))
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(out, "Answer");
    }

    #[tokio::test]
    async fn role_only_and_empty_deltas_are_skipped() {
        let chunks = vec![
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n".into(),
            delta(""),
            delta("x"),
        ];
        let out = collect(decode_stream(byte_stream(chunks))).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref().unwrap(), "x");
    }

    #[tokio::test]
    async fn stream_error_event_ends_stream() {
        let chunks = vec![
            delta("partial"),
            "data: {\"error\":{\"message\":\"overloaded\"}}\n".into(),
            delta("never"),
        ];
        let out = collect(decode_stream(byte_stream(chunks))).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref().unwrap(), "partial");
        assert!(matches!(&out[1], Err(LlmError::Api(m)) if m == "overloaded"));
    }

    #[tokio::test]
    async fn malformed_json_is_a_parse_error() {
        let out = collect(decode_stream(byte_stream(vec!["data: {oops\n".into()]))).await;
        assert!(matches!(out.as_slice(), [Err(LlmError::Parse(_))]));
    }

    #[tokio::test]
    async fn transport_error_ends_stream() {
        let bytes = futures::stream::iter(vec![
            Ok(delta("a").into_bytes()),
            Err(LlmError::Timeout),
            Ok(delta("b").into_bytes()),
        ])
        .boxed();
        let out = collect(decode_stream(bytes)).await;
        assert_eq!(out.len(), 2);
        assert!(matches!(out[1], Err(LlmError::Timeout)));
    }

    #[tokio::test]
    async fn body_without_done_marker_still_terminates() {
        let out = collect(decode_stream(byte_stream(vec![delta("end")]))).await;
        assert_eq!(out.len(), 1);
    }
}
