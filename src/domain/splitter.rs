//! Separator-based text splitting with overlapping windows.
//!
//! Text is cut on a separator into units. Units are merged into a chunk until
//! the next unit (plus a separator) would push it past `chunk_size`; the next
//! chunk then starts from the trailing units that fit in `chunk_overlap`.
//! Lengths are counted in characters.

use std::collections::VecDeque;
use std::str::MatchIndices;

use tracing::warn;

use crate::domain::errors::DomainError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separator: String,
}

impl TextSplitter {
    pub fn new(
        chunk_size: usize,
        chunk_overlap: usize,
        separator: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let separator = separator.into();

        if chunk_size == 0 {
            return Err(DomainError::validation("chunk_size must be positive"));
        }
        if chunk_overlap > chunk_size {
            return Err(DomainError::validation(format!(
                "chunk_overlap ({chunk_overlap}) is larger than chunk_size ({chunk_size})"
            )));
        }
        if separator.is_empty() {
            return Err(DomainError::validation("separator must not be empty"));
        }

        Ok(Self {
            chunk_size,
            chunk_overlap,
            separator,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Lazily splits `text`. Calling `split` again restarts from the top.
    pub fn split<'a>(&'a self, text: &'a str) -> Chunks<'a> {
        Chunks {
            splitter: self,
            text,
            units: Units::new(text, &self.separator),
            window: VecDeque::new(),
            total: 0,
            separator_len: self.separator.chars().count(),
        }
    }
}

/// A chunk produced by [`TextSplitter::split`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub text: String,
    /// Byte offset of the chunk's first character in the source text.
    pub offset: usize,
}

#[derive(Debug, Clone, Copy)]
struct Unit {
    start: usize,
    end: usize,
    len: usize,
}

/// Non-empty separator-delimited pieces of the text, with byte ranges.
#[derive(Clone)]
struct Units<'a> {
    text: &'a str,
    separators: MatchIndices<'a, &'a str>,
    cursor: usize,
    done: bool,
}

impl<'a> Units<'a> {
    fn new(text: &'a str, separator: &'a str) -> Self {
        Self {
            text,
            separators: text.match_indices(separator),
            cursor: 0,
            done: false,
        }
    }
}

impl Iterator for Units<'_> {
    type Item = Unit;

    fn next(&mut self) -> Option<Unit> {
        while !self.done {
            let (start, end) = match self.separators.next() {
                Some((at, sep)) => {
                    let range = (self.cursor, at);
                    self.cursor = at + sep.len();
                    range
                }
                None => {
                    self.done = true;
                    (self.cursor, self.text.len())
                }
            };

            if start < end {
                return Some(Unit {
                    start,
                    end,
                    len: self.text[start..end].chars().count(),
                });
            }
        }
        None
    }
}

#[derive(Clone)]
pub struct Chunks<'a> {
    splitter: &'a TextSplitter,
    text: &'a str,
    units: Units<'a>,
    window: VecDeque<Unit>,
    total: usize,
    separator_len: usize,
}

impl Chunks<'_> {
    fn joined_len(&self, extra: usize) -> usize {
        let sep = if self.window.is_empty() {
            0
        } else {
            self.separator_len
        };
        self.total + extra + sep
    }

    fn emit(&self) -> Option<TextChunk> {
        let first = self.window.front()?;

        let joined = self
            .window
            .iter()
            .map(|u| &self.text[u.start..u.end])
            .collect::<Vec<_>>()
            .join(&self.splitter.separator);

        if self.total > self.splitter.chunk_size {
            warn!(
                length = self.total,
                chunk_size = self.splitter.chunk_size,
                "Created a chunk longer than the configured size"
            );
        }

        let leading = joined.len() - joined.trim_start().len();
        let trimmed = joined.trim();
        if trimmed.is_empty() {
            return None;
        }

        Some(TextChunk {
            text: trimmed.to_string(),
            offset: first.start + leading,
        })
    }

    fn pop_front(&mut self) {
        if let Some(unit) = self.window.pop_front() {
            let sep = if self.window.is_empty() {
                0
            } else {
                self.separator_len
            };
            self.total -= unit.len + sep;
        }
    }
}

impl Iterator for Chunks<'_> {
    type Item = TextChunk;

    fn next(&mut self) -> Option<TextChunk> {
        loop {
            let Some(unit) = self.units.next() else {
                let chunk = self.emit();
                self.window.clear();
                self.total = 0;
                return chunk;
            };

            let mut emitted = None;
            if !self.window.is_empty() && self.joined_len(unit.len) > self.splitter.chunk_size {
                emitted = self.emit();
                while self.total > self.splitter.chunk_overlap
                    || (self.total > 0 && self.joined_len(unit.len) > self.splitter.chunk_size)
                {
                    self.pop_front();
                }
            }

            self.total = self.joined_len(unit.len);
            self.window.push_back(unit);

            if emitted.is_some() {
                return emitted;
            }
        }
    }
}
