//! Reassembly of line-delimited JSON completion streams.
//!
//! A streaming completion arrives as arbitrary byte chunks. [`LineBuffer`]
//! cuts them into complete lines, [`parse_fragment`] decodes one line, and
//! [`AnswerBuilder`] concatenates fragments in arrival order and trims the
//! result once the stream closes.

use serde::Deserialize;

use crate::error::{RagError, Result};

/// One line of a streamed completion.
#[derive(Debug, Deserialize)]
struct StreamLine {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Decode one stream line into its text fragment.
///
/// Blank lines and lines without a `response` field yield `None`. A line
/// carrying an `error` field, or one that is not JSON, fails the whole
/// generation.
pub fn parse_fragment(line: &str) -> Result<Option<String>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let parsed: StreamLine = serde_json::from_str(line)
        .map_err(|e| RagError::GenerationFailed(format!("malformed stream line: {}", e)))?;
    if let Some(err) = parsed.error {
        return Err(RagError::GenerationFailed(err));
    }
    Ok(parsed.response)
}

/// Accumulates raw bytes and yields complete `\n`-terminated lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every complete line it finishes.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line[..line.len() - 1]).into_owned());
        }
        lines
    }

    /// Whatever remains after the stream closed without a trailing newline.
    pub fn finish(self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.pending).into_owned())
        }
    }
}

/// Concatenates fragments and trims the final answer.
#[derive(Debug, Default)]
pub struct AnswerBuilder {
    answer: String,
    fragments: usize,
}

impl AnswerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: &str) {
        self.answer.push_str(fragment);
        self.fragments += 1;
    }

    pub fn fragments(&self) -> usize {
        self.fragments
    }

    pub fn finish(self) -> String {
        self.answer.trim().to_string()
    }
}
