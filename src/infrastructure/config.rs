use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::domain::{DomainError, PromptTemplate, TextSplitter};

pub const CONFIG_PATH_ENV: &str = "DOCCHAT_CONFIG";
pub const PROMPTS_PATH_ENV: &str = "DOCCHAT_PROMPTS";
const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";
const DEFAULT_PROMPTS_PATH: &str = "config/prompts.yaml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] DomainError),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub chunking: ChunkingConfig,
    pub rag: RagConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
    pub base_url: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            temperature: 0.1,
            timeout_seconds: 120,
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimension: usize,
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-ada-002".to_string(),
            dimension: 1536,
            batch_size: 64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub separator: String,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 600,
            chunk_overlap: 100,
            separator: "\n".to_string(),
        }
    }
}

impl ChunkingConfig {
    pub fn splitter(&self) -> Result<TextSplitter, DomainError> {
        TextSplitter::new(self.chunk_size, self.chunk_overlap, self.separator.clone())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMode {
    /// Answer strictly from retrieved context.
    #[default]
    ContextOnly,
    /// Prefer context, fall back to model knowledge and say which was used.
    Provenance,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub top_k: usize,
    pub answer_mode: AnswerMode,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            answer_mode: AnswerMode::ContextOnly,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub embeddings_dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            embeddings_dir: PathBuf::from(".cache/embeddings"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    pub context_only: PromptTemplate,
    pub provenance: PromptTemplate,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            context_only: PromptTemplate::context_only(),
            provenance: PromptTemplate::provenance(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub config: Config,
    pub prompts: PromptsConfig,
}

impl AppConfig {
    /// Loads both files, falling back to defaults for any file that does not
    /// exist. Paths come from `DOCCHAT_CONFIG` / `DOCCHAT_PROMPTS` when set.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        let prompts_path = std::env::var(PROMPTS_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_PROMPTS_PATH));

        Self::from_files(&config_path, &prompts_path)
    }

    pub fn from_files(config_path: &Path, prompts_path: &Path) -> Result<Self, ConfigError> {
        let app = Self {
            config: read_yaml(config_path)?.unwrap_or_default(),
            prompts: read_yaml(prompts_path)?.unwrap_or_default(),
        };
        app.validate()?;
        Ok(app)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.config.chunking.splitter()?;
        if self.config.rag.top_k == 0 {
            return Err(DomainError::validation("rag.top_k must be positive").into());
        }
        Ok(())
    }

    pub fn template(&self) -> &PromptTemplate {
        match self.config.rag.answer_mode {
            AnswerMode::ContextOnly => &self.prompts.context_only,
            AnswerMode::Provenance => &self.prompts.provenance,
        }
    }
}

fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_yaml::from_str(&contents)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}
