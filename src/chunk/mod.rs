//! Text chunking
//!
//! Splits raw text into overlapping, boundary-aware chunks:
//! - Lengths and offsets are counted in characters, never bytes
//! - A chunk ends on the last sentence, line or paragraph boundary inside
//!   its window, if that boundary lies past half the window; otherwise
//!   it is cut at the size limit
//! - Output is a pure function of `(text, chunk_size, overlap)`

mod boundaries;

pub use boundaries::*;

use crate::config::ChunkConfig;
use crate::error::{Error, Result};
use blake3::Hasher;
use serde::{Deserialize, Serialize};

/// A text chunk with its position in the source text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    /// Chunk index (0-based, contiguous)
    pub index: usize,

    /// Whitespace-trimmed chunk text
    pub text: String,

    /// Char offset of the first character of `text`
    pub start_offset: usize,

    /// Char offset one past the last character of `text`
    pub end_offset: usize,

    /// Boundary the chunk window ended on
    pub boundary: BreakKind,

    /// Blake3 hash of `text`
    pub hash: String,
}

/// Split `text` into chunk texts
pub fn chunk(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    Ok(chunk_text(text, chunk_size, overlap)?
        .into_iter()
        .map(|c| c.text)
        .collect())
}

/// Split `text` using chunking configuration
pub fn chunk_with_config(text: &str, config: &ChunkConfig) -> Result<Vec<TextChunk>> {
    chunk_text(text, config.chunk_size, config.overlap)
}

/// Split `text` into positioned chunks
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<TextChunk>> {
    if chunk_size == 0 {
        return Err(Error::Validation("chunk_size must be > 0".to_string()));
    }

    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    let mut chunks = Vec::new();

    if total == 0 {
        return Ok(chunks);
    }

    let break_points = find_break_points(&chars);
    let mut start = 0;
    // window end of the chunk before the current one
    let mut prev_end = 0;

    while start < total {
        let limit = start + chunk_size;

        let (end, boundary) = if limit >= total {
            (total, BreakKind::End)
        } else {
            match last_break_before(&break_points, start, limit, start + chunk_size / 2) {
                Some(point) => (point.position, point.kind),
                None => (limit, BreakKind::Hard),
            }
        };

        if let Some(chunk) = trimmed_chunk(&chars, start, end, chunks.len(), boundary) {
            chunks.push(chunk);
        }

        if end >= total {
            break;
        }

        // overlap only the current chunk: never reach back past the end of
        // the one before it, and drop the overlap when it would stall
        let next = end.saturating_sub(overlap).max(prev_end);
        prev_end = end;
        start = if next > start { next } else { end };
    }

    Ok(chunks)
}

fn trimmed_chunk(
    chars: &[char],
    start: usize,
    end: usize,
    index: usize,
    boundary: BreakKind,
) -> Option<TextChunk> {
    let window = &chars[start..end];
    let leading = window.iter().take_while(|c| c.is_whitespace()).count();
    if leading == window.len() {
        return None;
    }
    let trailing = window.iter().rev().take_while(|c| c.is_whitespace()).count();

    let start_offset = start + leading;
    let end_offset = end - trailing;
    let text: String = chars[start_offset..end_offset].iter().collect();
    let hash = compute_text_hash(&text);

    Some(TextChunk {
        index,
        text,
        start_offset,
        end_offset,
        boundary,
        hash,
    })
}

/// Compute a stable hash for document content
pub fn compute_content_hash(content: &[u8]) -> String {
    let mut hasher = Hasher::new();
    hasher.update(content);
    hasher.finalize().to_hex().to_string()
}

/// Compute a stable hash for a string
pub fn compute_text_hash(text: &str) -> String {
    compute_content_hash(text.as_bytes())
}
