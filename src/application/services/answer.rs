use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::domain::{
    ports::{LlmProvider, TokenStream},
    Answer, Conversation, DomainError, MessageRole, PromptContext, SearchResult,
};

/// Shared cancellation flag for an in-flight answer.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`CancelHandle::cancel`] has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationState {
    Idle,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug)]
pub enum AnswerEvent {
    Token(String),
    Completed(Answer),
    Failed(DomainError),
    Cancelled,
}

pub struct AnswerGenerator {
    llm: Arc<dyn LlmProvider>,
}

impl AnswerGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Prepares a stream for `prompt`. Nothing is requested from the provider
    /// until the first call to [`AnswerStream::next`].
    pub fn generate<'a>(
        &self,
        prompt: PromptContext,
        sources: Vec<SearchResult>,
        conversation: &'a mut Conversation,
        cancel: CancelHandle,
    ) -> AnswerStream<'a> {
        AnswerStream {
            llm: self.llm.clone(),
            prompt,
            sources,
            conversation,
            cancel,
            upstream: None,
            buffer: String::new(),
            tokens: 0,
            state: GenerationState::Idle,
        }
    }
}

/// Pull-based token stream for one answer.
///
/// Yields `Token` events followed by exactly one terminal event. Only
/// `Completed` appends to the conversation; failed, cancelled or dropped
/// streams leave it untouched.
pub struct AnswerStream<'a> {
    llm: Arc<dyn LlmProvider>,
    prompt: PromptContext,
    sources: Vec<SearchResult>,
    conversation: &'a mut Conversation,
    cancel: CancelHandle,
    upstream: Option<TokenStream>,
    buffer: String,
    tokens: usize,
    state: GenerationState,
}

impl AnswerStream<'_> {
    pub fn state(&self) -> GenerationState {
        self.state
    }

    /// Text received so far.
    pub fn partial(&self) -> &str {
        &self.buffer
    }

    pub async fn next(&mut self) -> Option<AnswerEvent> {
        match self.state {
            GenerationState::Completed | GenerationState::Failed | GenerationState::Cancelled => {
                return None
            }
            GenerationState::Idle => {
                if self.cancel.is_cancelled() {
                    return Some(self.cancelled());
                }

                let opened = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => None,
                    opened = self.llm.stream(&self.prompt) => Some(opened),
                };

                match opened {
                    None => return Some(self.cancelled()),
                    Some(Err(e)) => return Some(self.failed(e)),
                    Some(Ok(upstream)) => {
                        debug!("answer stream opened");
                        self.upstream = Some(upstream);
                        self.state = GenerationState::Streaming;
                    }
                }
            }
            GenerationState::Streaming => {}
        }

        let item = match self.upstream.as_mut() {
            Some(upstream) => tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                item = upstream.next() => Some(item),
            },
            None => {
                return Some(self.failed(DomainError::internal("stream opened without upstream")))
            }
        };

        match item {
            None => Some(self.cancelled()),
            Some(None) => Some(self.completed()),
            Some(Some(Ok(token))) => {
                self.tokens += 1;
                self.buffer.push_str(&token);
                Some(AnswerEvent::Token(token))
            }
            Some(Some(Err(e))) => Some(self.failed(e)),
        }
    }

    /// Drains the stream, discarding tokens.
    pub async fn collect(mut self) -> Result<Answer, DomainError> {
        while let Some(event) = self.next().await {
            match event {
                AnswerEvent::Token(_) => {}
                AnswerEvent::Completed(answer) => return Ok(answer),
                AnswerEvent::Failed(e) => return Err(e),
                AnswerEvent::Cancelled => {
                    return Err(DomainError::generation("answer cancelled"))
                }
            }
        }
        Err(DomainError::internal("answer stream already finished"))
    }

    fn completed(&mut self) -> AnswerEvent {
        self.state = GenerationState::Completed;
        self.upstream = None;

        let text = std::mem::take(&mut self.buffer);
        self.conversation.add_message(MessageRole::Ai, text.clone());

        let answer = Answer::new(text, std::mem::take(&mut self.sources));
        info!(
            tokens = self.tokens,
            provenance = answer.provenance.as_str(),
            "answer completed"
        );
        AnswerEvent::Completed(answer)
    }

    fn failed(&mut self, error: DomainError) -> AnswerEvent {
        self.state = GenerationState::Failed;
        self.upstream = None;
        self.buffer.clear();

        let error = match error {
            DomainError::Generation(_) => error,
            other => DomainError::generation(other.to_string()),
        };
        warn!(tokens = self.tokens, error = %error, "answer generation failed");
        AnswerEvent::Failed(error)
    }

    fn cancelled(&mut self) -> AnswerEvent {
        self.state = GenerationState::Cancelled;
        self.upstream = None;
        self.buffer.clear();
        info!(tokens = self.tokens, "answer cancelled");
        AnswerEvent::Cancelled
    }
}
