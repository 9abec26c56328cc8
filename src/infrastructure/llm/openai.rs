use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

use crate::domain::{
    ports::{LlmProvider, TokenStream},
    DomainError, PromptContext,
};
use crate::infrastructure::config::LlmConfig;
use crate::infrastructure::embedding::API_KEY_ENV;

/// Streaming chat completions against an OpenAI-compatible endpoint.
pub struct OpenAiChat {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
    api_key: String,
}

impl OpenAiChat {
    pub fn from_config(config: &LlmConfig) -> Result<Self, DomainError> {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| DomainError::validation(format!("{API_KEY_ENV} is not set")))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| DomainError::internal(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            api_key,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LlmProvider for OpenAiChat {
    async fn stream(&self, prompt: &PromptContext) -> Result<TokenStream, DomainError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "stream": true,
            "messages": [
                { "role": "system", "content": prompt.system },
                { "role": "user", "content": prompt.human },
            ],
        });

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| DomainError::generation(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(DomainError::generation(format!(
                "chat completion failed with {status}: {text}"
            )));
        }

        debug!(model = %self.model, "chat completion stream opened");

        let bytes = res
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|b| b.to_vec())
                    .map_err(|e| DomainError::generation(e.to_string()))
            });
        Ok(sse_tokens(bytes))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Token(String),
    Done,
    Ignore,
}

/// Parses one server-sent-events line of a chat completion stream.
pub fn parse_sse_line(line: &str) -> Result<SseEvent, DomainError> {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseEvent::Ignore);
    };

    let data = data.trim();
    if data == "[DONE]" {
        return Ok(SseEvent::Done);
    }

    let json: Value = serde_json::from_str(data)
        .map_err(|e| DomainError::generation(format!("malformed stream chunk: {e}")))?;

    if let Some(error) = json.get("error") {
        let message = error["message"].as_str().unwrap_or("unknown provider error");
        return Err(DomainError::generation(message.to_string()));
    }

    match json["choices"][0]["delta"]["content"].as_str() {
        Some(content) if !content.is_empty() => Ok(SseEvent::Token(content.to_string())),
        _ => Ok(SseEvent::Ignore),
    }
}

struct SseState {
    bytes: BoxStream<'static, Result<Vec<u8>, DomainError>>,
    buffer: Vec<u8>,
    pending: VecDeque<String>,
    finished: bool,
}

impl SseState {
    /// Consumes complete lines from the buffer. Returns `Err` on a provider
    /// fault; sets `finished` on `[DONE]`.
    fn drain_lines(&mut self) -> Result<(), DomainError> {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            match parse_sse_line(&String::from_utf8_lossy(&line))? {
                SseEvent::Token(token) => self.pending.push_back(token),
                SseEvent::Done => {
                    self.finished = true;
                    self.buffer.clear();
                    return Ok(());
                }
                SseEvent::Ignore => {}
            }
        }
        Ok(())
    }

    fn fail(mut self, error: DomainError) -> Option<(Result<String, DomainError>, Self)> {
        self.finished = true;
        self.pending.clear();
        Some((Err(error), self))
    }
}

/// Turns a raw byte stream of server-sent events into a token stream.
///
/// A stream that ends without the `[DONE]` marker is reported as a
/// generation error so truncated answers are never taken as complete.
pub fn sse_tokens<S>(bytes: S) -> TokenStream
where
    S: Stream<Item = Result<Vec<u8>, DomainError>> + Send + 'static,
{
    let state = SseState {
        bytes: bytes.boxed(),
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(token) = st.pending.pop_front() {
                return Some((Ok(token), st));
            }
            if st.finished {
                return None;
            }

            match st.bytes.next().await {
                Some(Ok(chunk)) => {
                    st.buffer.extend_from_slice(&chunk);
                    if let Err(e) = st.drain_lines() {
                        return st.fail(e);
                    }
                }
                Some(Err(e)) => return st.fail(e),
                None => {
                    st.buffer.push(b'\n');
                    if let Err(e) = st.drain_lines() {
                        return st.fail(e);
                    }
                    if !st.finished {
                        return st.fail(DomainError::generation(
                            "stream ended before completion",
                        ));
                    }
                }
            }
        }
    })
    .boxed()
}
