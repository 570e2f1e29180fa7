//! Nearest-neighbour retrieval over the persisted index

use std::sync::Arc;
use tracing::debug;

use crag_core::{Embedder, Error, Result, ScoredChunk};
use crag_index::VectorIndex;

/// Read-only search over a loaded index
///
/// Shares the index by `Arc`, so any number of concurrent queries can run
/// against it without locking.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
}

impl Retriever {
    /// Pair an index with the embedder that must have produced it
    pub fn new(index: Arc<VectorIndex>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let expected = embedder.fingerprint();
        if index.fingerprint() != &expected {
            return Err(Error::Artifact(format!(
                "Index was built with {} but the query embedder is {}",
                index.fingerprint(),
                expected
            )));
        }
        Ok(Self { index, embedder })
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Return up to `k` chunks most similar to `query`, best first
    ///
    /// Fewer than `k` chunks come back when the index is smaller than `k`.
    pub fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Err(Error::InvalidInput(
                "number of neighbours (k) must be at least 1".to_string(),
            ));
        }

        let embedding = self.embedder.embed_one(query)?;
        let hits = self.index.search(&embedding, k)?;

        debug!(k, returned = hits.len(), "retrieved chunks");
        Ok(hits)
    }
}
