use std::collections::VecDeque;
use std::fmt;
use std::io::Read;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures::stream::BoxStream;
use futures::{Stream, StreamExt, TryStreamExt, future};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

use crate::rchain::ai::{AIMessage, Usage};
use crate::rchain::chat_runtime::{
    RequestFailure, RetryConfig, send_chat_request_blocking, send_chat_request_with_retry,
};
use crate::rchain::messages::{ChatMessage, ChatRequest};
use crate::rchain::prompt::PromptError;
use crate::rchain::registry::RegistryError;
use crate::rchain::sse::{SseDecoder, SseEvent, StreamChunk};
use crate::rchain::tools::{ToolDefinition, parse_tool_calls};

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error("chat request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("chat API error {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("response did not contain message content")]
    EmptyResponse,
    #[error("failed to decode chat response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("stream interrupted: {0}")]
    Stream(String),
    #[error("could not coerce response into '{schema}': {reason}")]
    Schema { schema: String, reason: String },
}

impl From<RequestFailure> for ChatError {
    fn from(failure: RequestFailure) -> Self {
        match failure {
            RequestFailure::Request(source) => Self::Request(source),
            RequestFailure::Api { status, body } => Self::Api { status, body },
        }
    }
}

/// Sampling and transport settings sent with every call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientSettings {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: None,
            timeout_secs: None,
            retries: 0,
            retry_delay_ms: 500,
        }
    }
}

/// Tool binding attached to a request (structured output).
#[derive(Debug, Clone, Default)]
pub(crate) struct ToolBinding {
    pub tools: Vec<Value>,
    pub tool_choice: Option<Value>,
}

impl ToolBinding {
    pub fn forced(tool: &ToolDefinition) -> Self {
        Self {
            tools: vec![tool.to_json()],
            tool_choice: Some(tool.forced_choice()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<Value>,
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [Value],
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'a Value>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Value,
    finish_reason: Option<String>,
}

fn no_tools(tools: &&[Value]) -> bool {
    tools.is_empty()
}

/// Request body exactly as it is sent to `/chat/completions`.
pub fn chat_payload(
    model: &str,
    settings: &ClientSettings,
    request: &ChatRequest,
    stream: bool,
) -> Value {
    let body = build_request(model, settings, request.messages(), stream, None);
    serde_json::to_value(&body).unwrap_or(Value::Null)
}

fn build_request<'a>(
    model: &'a str,
    settings: &ClientSettings,
    messages: &'a [ChatMessage],
    stream: bool,
    binding: Option<&'a ToolBinding>,
) -> ChatCompletionRequest<'a> {
    ChatCompletionRequest {
        model,
        messages,
        temperature: settings.temperature,
        max_tokens: settings.max_tokens,
        stream,
        stream_options: stream.then(|| json!({ "include_usage": true })),
        tools: binding.map(|binding| binding.tools.as_slice()).unwrap_or(&[]),
        tool_choice: binding.and_then(|binding| binding.tool_choice.as_ref()),
    }
}

/// Handle to an OpenAI-compatible chat-completions endpoint.
///
/// Blocking methods (`invoke`, `batch`, `stream`) must not be called from
/// an async worker thread; use the `a*` variants there or move the call to
/// `tokio::task::spawn_blocking`.
#[derive(Clone)]
pub struct ChatOpenAI {
    model: String,
    api_key: String,
    base_url: String,
    settings: ClientSettings,
    client: reqwest::Client,
}

impl fmt::Debug for ChatOpenAI {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatOpenAI")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl ChatOpenAI {
    pub fn new(
        model: impl Into<String>,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: base_url.into(),
            settings: ClientSettings::default(),
            client: reqwest::Client::new(),
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.settings.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.settings.max_tokens = Some(max_tokens);
        self
    }

    pub fn timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.settings.timeout_secs = Some(timeout_secs);
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.settings.retries = retries;
        self
    }

    pub fn retry_delay_ms(mut self, retry_delay_ms: u64) -> Self {
        self.settings.retry_delay_ms = retry_delay_ms;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            timeout_secs: self.settings.timeout_secs,
            retries: self.settings.retries,
            retry_delay_ms: self.settings.retry_delay_ms,
        }
    }

    /// Single blocking call.
    pub fn invoke(&self, request: impl Into<ChatRequest>) -> Result<AIMessage, ChatError> {
        self.complete_blocking(&request.into(), None)
    }

    /// Single async call.
    pub async fn ainvoke(&self, request: impl Into<ChatRequest>) -> Result<AIMessage, ChatError> {
        self.complete(&request.into(), None).await
    }

    /// Blocking calls in order; stops at the first failure.
    pub fn batch<R: Into<ChatRequest>>(
        &self,
        requests: impl IntoIterator<Item = R>,
    ) -> Result<Vec<AIMessage>, ChatError> {
        requests
            .into_iter()
            .map(|request| self.invoke(request))
            .collect()
    }

    /// Async calls whose results keep the input order; fails on the first error.
    pub async fn abatch<R: Into<ChatRequest>>(
        &self,
        requests: impl IntoIterator<Item = R>,
    ) -> Result<Vec<AIMessage>, ChatError> {
        let requests = requests.into_iter().map(Into::into).collect::<Vec<ChatRequest>>();
        future::try_join_all(requests.iter().map(|request| self.complete(request, None))).await
    }

    /// Blocking token stream.
    pub fn stream(&self, request: impl Into<ChatRequest>) -> Result<TokenIter, ChatError> {
        let request = request.into();
        let body = build_request(
            &self.model,
            &self.settings,
            request.messages(),
            true,
            None,
        );
        let client = reqwest::blocking::Client::new();
        let response = send_chat_request_blocking(
            &client,
            &self.endpoint(),
            &self.api_key,
            &body,
            self.retry_config(),
        )?;
        Ok(TokenIter {
            response,
            state: StreamState::default(),
        })
    }

    /// Async token stream; each item is one non-empty content delta.
    pub async fn astream(&self, request: impl Into<ChatRequest>) -> Result<TokenStream, ChatError> {
        let request = request.into();
        let body = build_request(
            &self.model,
            &self.settings,
            request.messages(),
            true,
            None,
        );
        let response = send_chat_request_with_retry(
            &self.client,
            &self.endpoint(),
            &self.api_key,
            &body,
            self.retry_config(),
        )
        .await?;

        let chunks = response
            .bytes_stream()
            .map_ok(|bytes| bytes.to_vec())
            .boxed();
        Ok(TokenStream {
            chunks,
            state: StreamState::default(),
        })
    }

    pub(crate) fn complete_blocking(
        &self,
        request: &ChatRequest,
        binding: Option<&ToolBinding>,
    ) -> Result<AIMessage, ChatError> {
        let body = build_request(
            &self.model,
            &self.settings,
            request.messages(),
            false,
            binding,
        );
        let client = reqwest::blocking::Client::new();
        let response = send_chat_request_blocking(
            &client,
            &self.endpoint(),
            &self.api_key,
            &body,
            self.retry_config(),
        )?;
        let text = response.text()?;
        parse_completion(&text)
    }

    pub(crate) async fn complete(
        &self,
        request: &ChatRequest,
        binding: Option<&ToolBinding>,
    ) -> Result<AIMessage, ChatError> {
        let body = build_request(
            &self.model,
            &self.settings,
            request.messages(),
            false,
            binding,
        );
        let response = send_chat_request_with_retry(
            &self.client,
            &self.endpoint(),
            &self.api_key,
            &body,
            self.retry_config(),
        )
        .await?;
        let text = response.text().await?;
        parse_completion(&text)
    }
}

fn parse_completion(text: &str) -> Result<AIMessage, ChatError> {
    let body: ChatCompletionResponse = serde_json::from_str(text)?;
    let choice = body.choices.into_iter().next().ok_or(ChatError::EmptyResponse)?;
    let content = choice.message["content"].as_str().unwrap_or("").to_string();
    let tool_calls = parse_tool_calls(&choice.message);
    if content.is_empty() && tool_calls.is_empty() {
        return Err(ChatError::EmptyResponse);
    }
    debug!(
        finish_reason = choice.finish_reason.as_deref().unwrap_or("unknown"),
        tool_calls = tool_calls.len(),
        "chat completion received"
    );
    Ok(AIMessage {
        content,
        tool_calls,
        usage: body.usage,
        finish_reason: choice.finish_reason,
    })
}

#[derive(Debug, Default)]
struct StreamState {
    decoder: SseDecoder,
    pending: VecDeque<String>,
    usage: Option<Usage>,
    finish_reason: Option<String>,
    failure: Option<ChatError>,
    done: bool,
    reported: bool,
}

impl StreamState {
    /// Tokens decoded before a failure are yielded ahead of it.
    fn take_ready(&mut self) -> Option<Result<String, ChatError>> {
        if let Some(token) = self.pending.pop_front() {
            return Some(Ok(token));
        }
        self.failure.take().map(Err)
    }

    /// True once nothing is left to yield; logs the stream summary once.
    fn exhausted(&mut self) -> bool {
        if !self.done {
            return false;
        }
        if !self.reported {
            self.reported = true;
            debug!(
                finish_reason = self.finish_reason.as_deref().unwrap_or("unknown"),
                total_tokens = self.usage.and_then(|usage| usage.total_tokens),
                "chat stream finished"
            );
        }
        true
    }

    fn record(&mut self, step: Result<(), ChatError>) {
        if let Err(err) = step {
            self.failure = Some(err);
            self.done = true;
        }
    }

    fn feed(&mut self, chunk: &[u8]) -> Result<(), ChatError> {
        let events = self.decoder.push(chunk);
        self.absorb(events)
    }

    fn close(&mut self) -> Result<(), ChatError> {
        let tail = self.decoder.finish();
        self.done = true;
        self.absorb(tail.into_iter().collect())
    }

    fn absorb(&mut self, events: Vec<SseEvent>) -> Result<(), ChatError> {
        for event in events {
            match event {
                SseEvent::Done => self.done = true,
                SseEvent::Data(payload) => {
                    let chunk: StreamChunk = serde_json::from_str(&payload)?;
                    if let Some(error) = chunk.error {
                        return Err(ChatError::Stream(error.describe()));
                    }
                    if let Some(text) = chunk.text() {
                        self.pending.push_back(text.to_string());
                    }
                    if let Some(reason) = chunk.finish_reason() {
                        self.finish_reason = Some(reason.to_string());
                    }
                    if let Some(usage) = chunk.usage {
                        self.usage = Some(usage);
                    }
                }
            }
        }
        if self.decoder.is_finished() {
            self.done = true;
        }
        Ok(())
    }
}

/// Blocking iterator over content fragments. Finite and forward-only.
pub struct TokenIter {
    response: reqwest::blocking::Response,
    state: StreamState,
}

impl TokenIter {
    /// Usage reported in the final chunk; available once the stream is drained.
    pub fn usage(&self) -> Option<Usage> {
        self.state.usage
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.state.finish_reason.as_deref()
    }
}

impl Iterator for TokenIter {
    type Item = Result<String, ChatError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.state.take_ready() {
                return Some(item);
            }
            if self.state.exhausted() {
                return None;
            }
            let mut buffer = [0u8; 4096];
            let step = match self.response.read(&mut buffer) {
                Ok(0) => self.state.close(),
                Ok(read) => self.state.feed(&buffer[..read]),
                Err(err) => Err(ChatError::Stream(err.to_string())),
            };
            self.state.record(step);
        }
    }
}

/// Async stream of content fragments, the counterpart of [`TokenIter`].
pub struct TokenStream {
    chunks: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    state: StreamState,
}

impl TokenStream {
    /// Usage reported in the final chunk; available once the stream is drained.
    pub fn usage(&self) -> Option<Usage> {
        self.state.usage
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.state.finish_reason.as_deref()
    }
}

impl Stream for TokenStream {
    type Item = Result<String, ChatError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(item) = this.state.take_ready() {
                return Poll::Ready(Some(item));
            }
            if this.state.exhausted() {
                return Poll::Ready(None);
            }
            let step = match ready!(this.chunks.poll_next_unpin(cx)) {
                Some(Ok(bytes)) => this.state.feed(&bytes),
                Some(Err(source)) => Err(ChatError::Request(source)),
                None => this.state.close(),
            };
            this.state.record(step);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ChatError, ChatOpenAI, ClientSettings, StreamState, chat_payload, parse_completion};
    use crate::rchain::messages::ChatRequest;
    use serde_json::json;

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        let client = ChatOpenAI::new("m", "k", "http://localhost:8080/v1/");
        assert_eq!(client.endpoint(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn debug_output_hides_the_api_key() {
        let client = ChatOpenAI::new("m", "sk-very-secret", "http://x");
        assert!(!format!("{client:?}").contains("sk-very-secret"));
    }

    #[test]
    fn payload_omits_unset_fields() {
        let payload = chat_payload(
            "qwen-plus",
            &ClientSettings::default(),
            &ChatRequest::from("Hi there!"),
            false,
        );
        assert_eq!(
            payload,
            json!({
                "model": "qwen-plus",
                "messages": [{"role": "user", "content": "Hi there!"}],
                "temperature": 0.0
            })
        );
    }

    #[test]
    fn streaming_payload_requests_usage() {
        let settings = ClientSettings {
            max_tokens: Some(32),
            ..ClientSettings::default()
        };
        let payload = chat_payload("m", &settings, &ChatRequest::from("Bye!"), true);
        assert_eq!(payload["stream"], json!(true));
        assert_eq!(payload["stream_options"]["include_usage"], json!(true));
        assert_eq!(payload["max_tokens"], json!(32));
    }

    #[test]
    fn completion_without_content_or_tools_is_empty() {
        let err = parse_completion(r#"{"choices":[{"message":{"content":""}}]}"#).unwrap_err();
        assert!(matches!(err, ChatError::EmptyResponse));
        let err = parse_completion(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, ChatError::EmptyResponse));
    }

    #[test]
    fn completion_reads_content_and_usage() {
        let message = parse_completion(
            r#"{"choices":[{"message":{"role":"assistant","content":"Hi!"},"finish_reason":"stop"}],
                "usage":{"prompt_tokens":3,"completion_tokens":2,"total_tokens":5}}"#,
        )
        .expect("completion parses");
        assert_eq!(message.content, "Hi!");
        assert_eq!(message.finish_reason.as_deref(), Some("stop"));
        assert_eq!(message.usage.and_then(|usage| usage.total_tokens), Some(5));
    }

    #[test]
    fn stream_state_collects_tokens_and_usage() {
        let mut state = StreamState::default();
        state
            .feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"Good\"}}]}\n\n")
            .expect("first chunk");
        state
            .feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"bye\"},\"finish_reason\":\"stop\"}]}\n\ndata: {\"choices\":[],\"usage\":{\"total_tokens\":9}}\n\ndata: [DONE]\n\n")
            .expect("second chunk");

        assert!(state.done);
        assert_eq!(state.pending, ["Good", "bye"]);
        assert_eq!(state.usage.and_then(|usage| usage.total_tokens), Some(9));
        assert_eq!(state.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn exhausted_only_after_pending_tokens_drain() {
        let mut state = StreamState::default();
        state
            .feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n\n")
            .expect("chunk");
        assert!(!state.exhausted());

        state.close().expect("close");
        assert!(state.exhausted());
        assert!(state.reported);
        assert_eq!(state.finish_reason, None);
    }

    #[test]
    fn tokens_before_a_failure_come_out_first() {
        let mut state = StreamState::default();
        let step = state.feed(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"par\"}}]}\n\ndata: {\"error\":{\"message\":\"overloaded\"}}\n\n",
        );
        state.record(step);

        assert_eq!(state.take_ready().and_then(Result::ok).as_deref(), Some("par"));
        assert!(matches!(state.take_ready(), Some(Err(ChatError::Stream(_)))));
        assert!(state.take_ready().is_none());
        assert!(state.done);
    }

    #[test]
    fn stream_error_payload_surfaces() {
        let mut state = StreamState::default();
        let err = state
            .feed(b"data: {\"error\":{\"message\":\"quota\",\"type\":\"rate_limit\"}}\n")
            .expect_err("error payload");
        assert_eq!(err.to_string(), "stream interrupted: rate_limit: quota");
    }
}
