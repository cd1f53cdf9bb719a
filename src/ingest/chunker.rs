//! Sliding-window chunking with sentence-boundary snapping

use crate::config::IngestConfig;
use crate::ingest::types::Chunk;
use uuid::Uuid;

/// Splits normalized document text into overlapping, sequence-indexed chunks
pub struct ContentChunker {
    chunk_size: usize,
    overlap: usize,
}

impl ContentChunker {
    pub fn new(config: &IngestConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            overlap: config.chunk_overlap,
        }
    }

    /// Chunk `text` belonging to `document_id` into character-range chunks
    ///
    /// Boundaries snap to the nearest sentence terminator (`.`, `!`, `?`)
    /// within 50 characters of the target window end; otherwise they snap to
    /// the nearest whitespace; otherwise the window is split exactly.
    pub fn chunk_text(&self, text: &str, document_id: Uuid) -> Vec<Chunk> {
        if text.is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();

        if len <= self.chunk_size {
            return vec![Chunk {
                id: Uuid::new_v4(),
                document_id,
                sequence: 0,
                text: text.to_string(),
                start_char: 0,
                end_char: len,
            }];
        }

        let mut chunks = Vec::new();
        let mut start = 0usize;
        let mut sequence = 0usize;

        while start < len {
            let target_end = (start + self.chunk_size).min(len);
            let end = if target_end < len {
                self.snap_boundary(&chars, start, target_end)
            } else {
                target_end
            };

            if end > start {
                let chunk_text: String = chars[start..end].iter().collect();
                chunks.push(Chunk {
                    id: Uuid::new_v4(),
                    document_id,
                    sequence,
                    text: chunk_text,
                    start_char: start,
                    end_char: end,
                });
                sequence += 1;
            }

            let advance = (end.saturating_sub(start)).saturating_sub(self.overlap).max(1);
            start += advance;
        }

        chunks
    }

    /// Search backward from `target_end` for a sentence terminator within 50
    /// characters, then whitespace, then give up and return `target_end`.
    fn snap_boundary(&self, chars: &[char], start: usize, target_end: usize) -> usize {
        let search_floor = target_end.saturating_sub(50).max(start);

        for i in (search_floor..target_end).rev() {
            if matches!(chars[i], '.' | '!' | '?') {
                return i + 1;
            }
        }

        for i in (search_floor..target_end).rev() {
            if chars[i].is_whitespace() {
                return i;
            }
        }

        target_end
    }
}
