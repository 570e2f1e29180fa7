//! Build-time indexing pipeline for complaint RAG
//!
//! Turns cleaned complaint records into a persisted vector index:
//! stratified sampling, recursive chunking with overlap, embedding, and an
//! exact cosine-similarity index saved as a single artifact.

mod chunker;
mod embedding;
mod indexer;
mod records;
mod sampler;
mod vector_index;

#[cfg(test)]
mod tests;

pub use chunker::{ChunkingOutcome, DEFAULT_SEPARATORS, RecursiveChunker};
#[cfg(feature = "fastembed")]
pub use embedding::FastEmbedder;
pub use embedding::{HASHING_MODEL_ID, HashingEmbedder, normalize};
pub use indexer::{BuiltIndex, IndexBuilder};
pub use records::{load_records, parse_csv, parse_json_lines};
pub use sampler::stratified_sample;
pub use vector_index::{INDEX_FILE_NAME, IndexEntry, VectorIndex};

// Re-export core types for convenience
pub use crag_core::{
    Chunk, ChunkingConfig, Embedder, Error, IndexingConfig, IndexingReport, ModelFingerprint,
    Record, Result, SamplingConfig, ScoredChunk,
};
