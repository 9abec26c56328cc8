mod openai;

pub use openai::{OpenAiEmbedding, API_KEY_ENV};
