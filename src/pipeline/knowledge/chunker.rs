//! Fixed-size sliding-window chunking.

/// A piece of a knowledge document.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub content: String,
    pub chunk_index: usize,
    /// Offset of the first character, in chars.
    pub char_offset: usize,
}

/// Chunking strategy trait
pub trait Chunker: Send + Sync {
    fn chunk(&self, text: &str) -> Vec<TextChunk>;
}

pub const DEFAULT_CHUNK_CHARS: usize = 800;
pub const DEFAULT_OVERLAP_CHARS: usize = 200;

/// Windows of `size` chars advancing by `size - overlap`. A window end is
/// pulled back to the last whitespace in its final quarter so words stay whole.
pub struct SlidingWindowChunker {
    size: usize,
    overlap: usize,
}

impl SlidingWindowChunker {
    pub fn new(size: usize, overlap: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            overlap: overlap.min(size - 1),
        }
    }
}

impl Default for SlidingWindowChunker {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_CHARS, DEFAULT_OVERLAP_CHARS)
    }
}

impl Chunker for SlidingWindowChunker {
    fn chunk(&self, text: &str) -> Vec<TextChunk> {
        let chars: Vec<char> = text.chars().collect();
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let hard_end = (start + self.size).min(chars.len());
            let end = if hard_end < chars.len() {
                let floor = hard_end - self.size / 4;
                (floor..hard_end)
                    .rev()
                    .find(|&i| chars[i].is_whitespace())
                    .unwrap_or(hard_end)
            } else {
                hard_end
            };

            let content: String = chars[start..end].iter().collect();
            let trimmed = content.trim();
            if !trimmed.is_empty() {
                chunks.push(TextChunk {
                    content: trimmed.to_string(),
                    chunk_index: chunks.len(),
                    char_offset: start,
                });
            }

            if end >= chars.len() {
                break;
            }
            let next = end.saturating_sub(self.overlap);
            start = if next > start { next } else { end };
        }

        chunks
    }
}
