//! Recursive character chunking with overlap
//!
//! Text is split on the coarsest separator present (paragraph, line, word,
//! then single characters), pieces longer than the chunk size are split
//! again with the next separator, and the resulting pieces are merged
//! greedily into chunks of at most `chunk_size` characters. After a chunk is
//! emitted, pieces are dropped from its front until no more than `overlap`
//! characters remain, so consecutive chunks share context across the
//! boundary.

use std::collections::VecDeque;
use tracing::{debug, info};

use crag_core::{Chunk, ChunkingConfig, Error, Record, Result};

/// Separators tried in order of decreasing structural granularity
pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// Chunks produced from a batch of records
#[derive(Debug, Clone, Default)]
pub struct ChunkingOutcome {
    pub chunks: Vec<Chunk>,
    /// Records skipped because their narrative was blank
    pub skipped_records: usize,
}

#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    overlap: usize,
    separators: Vec<String>,
}

impl RecursiveChunker {
    /// Create a chunker; requires `0 <= overlap < chunk_size`
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidInput("chunk size must be positive".to_string()));
        }
        if overlap >= chunk_size {
            return Err(Error::InvalidInput(format!(
                "overlap ({}) must be less than chunk size ({})",
                overlap, chunk_size
            )));
        }

        Ok(Self {
            chunk_size,
            overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split one narrative into chunks of at most `chunk_size` characters
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    /// Chunk every record with a non-blank narrative, tagging each chunk
    /// with its record's provenance
    pub fn chunk_records(&self, records: &[Record]) -> ChunkingOutcome {
        let mut outcome = ChunkingOutcome::default();

        for record in records {
            if !record.has_narrative() {
                outcome.skipped_records += 1;
                continue;
            }

            let pieces = self.split_text(&record.narrative);
            debug!(record_id = %record.id, chunks = pieces.len(), "chunked record");
            outcome
                .chunks
                .extend(pieces.into_iter().map(|text| Chunk::from_record(record, text)));
        }

        info!(
            records = records.len(),
            skipped = outcome.skipped_records,
            chunks = outcome.chunks.len(),
            chunk_size = self.chunk_size,
            overlap = self.overlap,
            "chunking complete"
        );
        outcome
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut separator = "";
        let mut finer: &[String] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                break;
            }
            if text.contains(candidate.as_str()) {
                separator = candidate.as_str();
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }

            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting));
                fitting.clear();
            }

            if finer.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    chunks.push(trimmed.to_string());
                }
            } else {
                chunks.extend(self.split_recursive(piece, finer));
            }
        }

        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting));
        }

        chunks
    }

    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0;

        for &piece in pieces {
            let len = char_len(piece);

            if total + len > self.chunk_size && !current.is_empty() {
                if let Some(chunk) = join_trimmed(&current) {
                    chunks.push(chunk);
                }

                while total > self.overlap || (total + len > self.chunk_size && total > 0) {
                    match current.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }

            current.push_back(piece);
            total += len;
        }

        if let Some(chunk) = join_trimmed(&current) {
            chunks.push(chunk);
        }

        chunks
    }
}

impl Default for RecursiveChunker {
    fn default() -> Self {
        let config = ChunkingConfig::default();
        Self {
            chunk_size: config.chunk_size,
            overlap: config.chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn join_trimmed(pieces: &VecDeque<&str>) -> Option<String> {
    let joined: String = pieces.iter().copied().collect();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Split `text` on `separator`, attaching each separator to the start of
/// the piece that follows it. An empty separator splits into characters.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (index, _) in text.match_indices(separator) {
        if index > start {
            pieces.push(&text[start..index]);
        }
        start = index;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}
