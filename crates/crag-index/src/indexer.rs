//! Build-time pipeline: sample, chunk, embed, persist

use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::chunker::RecursiveChunker;
use crate::sampler::stratified_sample;
use crate::vector_index::VectorIndex;
use crag_core::{Embedder, Error, IndexingConfig, IndexingReport, Record, Result};

/// Builds a vector index from a corpus of records
///
/// Every step runs before anything is written: a failure anywhere aborts the
/// build and leaves any previously saved index untouched.
pub struct IndexBuilder {
    embedder: Arc<dyn Embedder>,
    config: IndexingConfig,
}

/// An index built in memory, with the counts gathered along the way
pub struct BuiltIndex {
    pub index: VectorIndex,
    pub records_total: usize,
    pub records_sampled: usize,
    pub records_skipped: usize,
}

impl IndexBuilder {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            config: IndexingConfig::default(),
        }
    }

    /// Create with custom configuration
    pub fn with_config(embedder: Arc<dyn Embedder>, config: IndexingConfig) -> Self {
        Self { embedder, config }
    }

    pub fn config(&self) -> &IndexingConfig {
        &self.config
    }

    /// Sample, chunk and embed `records` into an in-memory index
    pub fn build_in_memory(&self, records: &[Record]) -> Result<BuiltIndex> {
        if self.config.batch_size == 0 {
            return Err(Error::Configuration(
                "embedding batch size must be positive".to_string(),
            ));
        }

        let sample = stratified_sample(records, &self.config.sampling)?;
        let chunker = RecursiveChunker::from_config(&self.config.chunking)?;
        let outcome = chunker.chunk_records(&sample);

        if outcome.chunks.is_empty() {
            return Err(Error::Data(
                "No chunks produced: every sampled narrative was blank".to_string(),
            ));
        }

        let mut index = VectorIndex::new(self.embedder.fingerprint());
        let total_batches = outcome.chunks.len().div_ceil(self.config.batch_size);

        for (batch_no, batch) in outcome.chunks.chunks(self.config.batch_size).enumerate() {
            let texts: Vec<&str> = batch.iter().map(|chunk| chunk.text.as_str()).collect();
            let vectors = self.embedder.embed(&texts)?;
            if vectors.len() != batch.len() {
                return Err(Error::Model(format!(
                    "Embedding model returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                )));
            }

            for (chunk, vector) in batch.iter().zip(vectors) {
                index.insert(chunk.clone(), vector)?;
            }
            debug!(batch = batch_no + 1, of = total_batches, "embedded batch");
        }

        info!(
            chunks = index.len(),
            model = %index.fingerprint(),
            "embedding complete"
        );

        Ok(BuiltIndex {
            index,
            records_total: records.len(),
            records_sampled: sample.len(),
            records_skipped: outcome.skipped_records,
        })
    }

    /// Build the index and persist it under `destination`
    pub fn build(&self, records: &[Record], destination: impl AsRef<Path>) -> Result<IndexingReport> {
        let built = self.build_in_memory(records)?;
        let path = built.index.save(destination.as_ref())?;

        Ok(IndexingReport {
            records_total: built.records_total,
            records_sampled: built.records_sampled,
            records_skipped: built.records_skipped,
            chunks_indexed: built.index.len(),
            model_id: built.index.fingerprint().model_id.clone(),
            dimension: built.index.fingerprint().dimension,
            index_path: path.display().to_string(),
        })
    }
}
