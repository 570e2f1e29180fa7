//! Query-time pipeline for complaint RAG
//!
//! Expands a question, retrieves the nearest complaint excerpts from the
//! persisted index, assembles the grounded prompt and generates an answer,
//! either in one piece or as a stream of fragments. The evaluator runs a
//! fixed question set through the same path and writes a Markdown report.

mod engine;
mod evaluator;
mod expander;
mod generator;
mod local_model;
mod prompt;
mod retriever;


pub use engine::{EngineState, RagEngine, StreamingAnswer};
pub use evaluator::{
    DEFAULT_QUESTIONS, EvaluationFailure, EvaluationReport, EvaluationRow, Evaluator,
    MISSING_SOURCE,
};
pub use expander::{AcronymTable, QueryExpander};
pub use generator::{DEFAULT_STREAM_CAPACITY, GenerationStream, generate_blocking, spawn_stream};
pub use local_model::{LOCAL_MODEL_ID, LocalModel};
pub use prompt::{
    EMPTY_CONTEXT, EMPTY_HISTORY, INSUFFICIENT_CONTEXT_POLICY, InsufficientContextPolicy,
    NO_MATCH_DISCLAIMER, PromptTemplate, build_context,
};
pub use retriever::Retriever;

// Re-export core types for convenience
pub use crag_core::{
    Answer, Error, GenerationConfig, GenerationResult, LLMProvider, Prompt, Query, RagConfig,
    Result, RetrievalResult, ScoredChunk,
};
