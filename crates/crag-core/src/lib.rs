//! Core traits and types for complaint RAG
//!
//! This crate defines the types shared by the build-time indexing pipeline and
//! the query-time answering pipeline: source records and chunks, queries and
//! retrieval results, the error taxonomy, configuration, and the capability
//! traits for embedding and generation models.

pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod rag;


pub use config::{ChunkingConfig, IndexingConfig, RagConfig, SamplingConfig};
pub use document::{Chunk, IndexingReport, Record};
pub use embedding::{Embedder, ModelFingerprint};
pub use error::{Error, Result};
pub use llm::{FragmentSink, GenerationConfig, GenerationResult, LLMProvider};
pub use rag::{Answer, Prompt, Query, RetrievalResult, ScoredChunk};
