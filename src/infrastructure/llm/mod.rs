mod openai;

pub use openai::{parse_sse_line, sse_tokens, OpenAiChat, SseEvent};
