use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::document::SearchResult;

pub const CONTEXT_ONLY_SYSTEM: &str = "Answer the question using ONLY the following context. \
If you don't know the answer just say you don't know. DON'T make anything up.\n\nContext: {context}";

pub const CONTEXT_ONLY_HUMAN: &str = "{question}";

pub const PROVENANCE_SYSTEM: &str = "You are a helpful, knowledgeable AI assistant.
You have two sources of knowledge:
1) The context from the user-provided documents.
2) Your own general knowledge (pre-trained model).

Instruction:
- First, check if the question can be answered from the given context.
- If the context is relevant and contains the answer, prioritize it.
- If the context does NOT contain the information, then rely on your own knowledge.
- When you produce your final answer, explicitly indicate which source of knowledge you used:
  * If the needed information was found in the context, say \"Source: Official Documents.\"
  * If the context didn't contain the information but you answered from your general knowledge, say \"Source: LLM knowledge.\"
  * If you're not certain at all, say \"I don't know.\"";

pub const PROVENANCE_HUMAN: &str = "Context:\n{context}\n\nQuestion:\n{question}";

/// Rendered two-part prompt handed to the language model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptContext {
    pub system: String,
    pub human: String,
}

/// Instruction template with `{context}` and `{question}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub system: String,
    pub human: String,
}

impl PromptTemplate {
    pub fn new(system: impl Into<String>, human: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            human: human.into(),
        }
    }

    pub fn context_only() -> Self {
        Self::new(CONTEXT_ONLY_SYSTEM, CONTEXT_ONLY_HUMAN)
    }

    pub fn provenance() -> Self {
        Self::new(PROVENANCE_SYSTEM, PROVENANCE_HUMAN)
    }

    /// Binds retrieved chunks (most similar first) and the question into the
    /// template.
    pub fn assemble(&self, results: &[SearchResult], question: &str) -> PromptContext {
        let context = format_context(results);
        let vars = [("context", context.as_str()), ("question", question)];

        PromptContext {
            system: render(&self.system, &vars),
            human: render(&self.human, &vars),
        }
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::context_only()
    }
}

pub fn format_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|r| r.chunk.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Single-pass placeholder substitution. Substituted values are copied
/// verbatim and never scanned for further placeholders; unknown placeholders
/// are left as-is.
fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let substituted = after.find('}').and_then(|close| {
            let name = &after[..close];
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });

        match substituted {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Where an answer's information came from, as declared by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Context,
    GeneralKnowledge,
    Unknown,
    Unspecified,
}

impl Provenance {
    pub fn classify(answer: &str) -> Self {
        let lower = answer.to_lowercase();
        if lower.contains("source: official documents") {
            Self::Context
        } else if lower.contains("source: llm knowledge") {
            Self::GeneralKnowledge
        } else if lower.contains("i don't know") || lower.contains("i don\u{2019}t know") {
            Self::Unknown
        } else {
            Self::Unspecified
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Context => "context",
            Self::GeneralKnowledge => "general knowledge",
            Self::Unknown => "unknown",
            Self::Unspecified => "unspecified",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub provenance: Provenance,
    pub sources: Vec<SearchResult>,
}

impl Answer {
    pub fn new(text: String, sources: Vec<SearchResult>) -> Self {
        let provenance = Provenance::classify(&text);
        Self {
            text,
            provenance,
            sources,
        }
    }

    /// Names of the documents the answer drew on, most relevant first, each
    /// listed once.
    pub fn source_names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.sources
            .iter()
            .map(|s| s.chunk.source.as_str())
            .filter(|name| seen.insert(*name))
            .collect()
    }
}
