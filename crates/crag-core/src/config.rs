//! Pipeline configuration

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use crate::{Error, GenerationConfig, Result};

/// Stratified sampling settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplingConfig {
    pub sample_size: usize,
    pub seed: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            sample_size: 12_000,
            seed: 42,
        }
    }
}

/// Chunk size and overlap, both in characters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }
}

/// Configuration for an index build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexingConfig {
    pub sampling: SamplingConfig,
    pub chunking: ChunkingConfig,
    pub batch_size: usize,
    pub embedding_dimension: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            sampling: SamplingConfig::default(),
            chunking: ChunkingConfig::default(),
            batch_size: 64,
            embedding_dimension: 384,
        }
    }
}

/// Top-level configuration shared by the build and query pipelines
///
/// Constructed once at startup and passed by reference; nothing in the
/// pipeline mutates it afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    pub index_path: PathBuf,
    pub top_k: usize,
    /// Bound of the fragment channel used for streamed answers
    pub stream_capacity: usize,
    pub indexing: IndexingConfig,
    pub generation: GenerationConfig,
    pub report_path: PathBuf,
    /// JSON file replacing the built-in acronym table
    pub acronyms_path: Option<PathBuf>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            index_path: PathBuf::from("vector_store/complaints_index"),
            top_k: 5,
            stream_capacity: 16,
            indexing: IndexingConfig::default(),
            generation: GenerationConfig::default(),
            report_path: PathBuf::from("reports/evaluation.md"),
            acronyms_path: None,
        }
    }
}

impl RagConfig {
    /// Create configuration from environment variables (and `.env`)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup, falling back to
    /// defaults for absent keys
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let indexing = &defaults.indexing;
        let generation = &defaults.generation;

        let config = Self {
            index_path: lookup("CRAG_INDEX_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.index_path.clone()),
            top_k: parse_var(&lookup, "CRAG_TOP_K", defaults.top_k)?,
            stream_capacity: parse_var(&lookup, "CRAG_STREAM_CAPACITY", defaults.stream_capacity)?,
            indexing: IndexingConfig {
                sampling: SamplingConfig {
                    sample_size: parse_var(&lookup, "CRAG_SAMPLE_SIZE", indexing.sampling.sample_size)?,
                    seed: parse_var(&lookup, "CRAG_SAMPLE_SEED", indexing.sampling.seed)?,
                },
                chunking: ChunkingConfig {
                    chunk_size: parse_var(&lookup, "CRAG_CHUNK_SIZE", indexing.chunking.chunk_size)?,
                    chunk_overlap: parse_var(
                        &lookup,
                        "CRAG_CHUNK_OVERLAP",
                        indexing.chunking.chunk_overlap,
                    )?,
                },
                batch_size: parse_var(&lookup, "CRAG_EMBED_BATCH_SIZE", indexing.batch_size)?,
                embedding_dimension: parse_var(
                    &lookup,
                    "CRAG_EMBED_DIMENSION",
                    indexing.embedding_dimension,
                )?,
            },
            generation: GenerationConfig {
                model_id: lookup("CRAG_MODEL_ID")
                    .filter(|id| !id.trim().is_empty())
                    .or_else(|| generation.model_id.clone()),
                max_new_tokens: parse_var(&lookup, "CRAG_MAX_NEW_TOKENS", generation.max_new_tokens)?,
                min_new_tokens: parse_var(&lookup, "CRAG_MIN_NEW_TOKENS", generation.min_new_tokens)?,
                temperature: match lookup("CRAG_TEMPERATURE") {
                    Some(raw) => Some(parse_value::<f32>("CRAG_TEMPERATURE", &raw)?),
                    None => generation.temperature,
                },
                repetition_penalty: parse_var(
                    &lookup,
                    "CRAG_REPETITION_PENALTY",
                    generation.repetition_penalty,
                )?,
                ..generation.clone()
            },
            report_path: lookup("CRAG_REPORT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.report_path.clone()),
            acronyms_path: lookup("CRAG_ACRONYMS_PATH").map(PathBuf::from),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(Error::Configuration("top_k must be at least 1".to_string()));
        }
        if self.stream_capacity == 0 {
            return Err(Error::Configuration(
                "stream_capacity must be at least 1".to_string(),
            ));
        }
        let chunking = &self.indexing.chunking;
        if chunking.chunk_size == 0 || chunking.chunk_overlap >= chunking.chunk_size {
            return Err(Error::Configuration(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                chunking.chunk_overlap, chunking.chunk_size
            )));
        }
        if self.indexing.batch_size == 0 || self.indexing.embedding_dimension == 0 {
            return Err(Error::Configuration(
                "embedding batch size and dimension must be positive".to_string(),
            ));
        }
        if self.generation.min_new_tokens > self.generation.max_new_tokens {
            return Err(Error::Configuration(format!(
                "min_new_tokens ({}) exceeds max_new_tokens ({})",
                self.generation.min_new_tokens, self.generation.max_new_tokens
            )));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim().parse::<T>().map_err(|e| {
        Error::Configuration(format!("{} has invalid value '{}': {}", key, raw, e))
    })
}
