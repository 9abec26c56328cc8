//! Retrieval-augmented question answering over user documents.
//!
//! Documents are split into overlapping chunks, embedded through a
//! content-addressed cache and indexed once; each question retrieves the
//! closest chunks and streams an answer from a language model grounded in
//! them.

pub mod application;
pub mod domain;
pub mod infrastructure;
