use std::path::Path;
use tracing::{info, instrument, warn};

use crate::application::services::answer::{AnswerGenerator, AnswerStream, CancelHandle};
use crate::application::services::indexing::{IndexingService, KnowledgeBase};
use crate::domain::{Conversation, Document, DomainError, Message, MessageRole, PromptTemplate};

pub const GREETING: &str = "I'm ready! Ask away!";

/// Per-user chat state and the request/response cycle over it.
///
/// A session holds at most one knowledge base and runs one answer at a time;
/// [`ChatSession::ask`] borrows the session mutably for the life of the
/// returned stream.
pub struct ChatSession {
    indexing: IndexingService,
    generator: AnswerGenerator,
    template: PromptTemplate,
    knowledge: Option<KnowledgeBase>,
    conversation: Conversation,
}

impl ChatSession {
    pub fn new(
        indexing: IndexingService,
        generator: AnswerGenerator,
        template: PromptTemplate,
    ) -> Self {
        Self {
            indexing,
            generator,
            template,
            knowledge: None,
            conversation: Conversation::new(),
        }
    }

    pub fn knowledge(&self) -> Option<&KnowledgeBase> {
        self.knowledge.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.knowledge.is_some()
    }

    pub fn history(&self) -> &[Message] {
        self.conversation.messages()
    }

    /// Banner shown once a document is loaded. Not recorded in the history.
    pub fn greeting(&self) -> Option<&'static str> {
        self.knowledge.as_ref().map(|_| GREETING)
    }

    #[instrument(skip(self, documents), fields(documents = documents.len()))]
    pub async fn load(&mut self, documents: Vec<Document>) -> Result<&KnowledgeBase, DomainError> {
        match self.indexing.build(documents).await {
            Ok(knowledge) => Ok(self.install(knowledge)),
            Err(e) => {
                warn!(error = %e, "failed to build knowledge base");
                self.unload();
                Err(e)
            }
        }
    }

    pub async fn load_paths<P: AsRef<Path>>(
        &mut self,
        paths: &[P],
    ) -> Result<&KnowledgeBase, DomainError> {
        match self.indexing.build_from_paths(paths).await {
            Ok(knowledge) => Ok(self.install(knowledge)),
            Err(e) => {
                warn!(error = %e, "failed to build knowledge base");
                self.unload();
                Err(e)
            }
        }
    }

    /// Drops the loaded document and clears the conversation.
    pub fn unload(&mut self) {
        self.knowledge = None;
        self.conversation.clear();
    }

    pub async fn ask(&mut self, question: &str) -> Result<AnswerStream<'_>, DomainError> {
        self.ask_with_cancel(question, CancelHandle::new()).await
    }

    /// Records the question, retrieves context and returns the answer stream.
    #[instrument(skip(self, question, cancel))]
    pub async fn ask_with_cancel(
        &mut self,
        question: &str,
        cancel: CancelHandle,
    ) -> Result<AnswerStream<'_>, DomainError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(DomainError::validation("question is empty"));
        }

        let knowledge = self
            .knowledge
            .as_ref()
            .ok_or_else(|| DomainError::validation("no document loaded"))?;

        let results = knowledge.retrieve(question).await?;
        self.conversation.add_message(MessageRole::Human, question);

        let prompt = self.template.assemble(&results, question);

        Ok(self
            .generator
            .generate(prompt, results, &mut self.conversation, cancel))
    }

    fn install(&mut self, knowledge: KnowledgeBase) -> &KnowledgeBase {
        let replaced = self
            .knowledge
            .as_ref()
            .is_some_and(|current| current.namespace() != knowledge.namespace());
        if replaced {
            self.conversation.clear();
        }

        info!(
            namespace = knowledge.namespace(),
            chunks = knowledge.chunk_count(),
            "knowledge base ready"
        );
        self.knowledge.insert(knowledge)
    }
}
