//! Embedding model trait and identity

use serde::{Deserialize, Serialize};

use crate::Result;

/// Identity of the embedding model an index was built with
///
/// Stored inside the persisted index and compared on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelFingerprint {
    pub model_id: String,
    pub dimension: usize,
}

impl std::fmt::Display for ModelFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} dims)", self.model_id, self.dimension)
    }
}

/// Trait for embedding models (text to fixed-dimension vector)
///
/// Implementations are stateless from the caller's point of view: the same
/// text always maps to the same vector, and every vector has `dimension()`
/// components.
pub trait Embedder: Send + Sync {
    /// Stable identifier of the model configuration
    fn model_id(&self) -> &str;

    /// Output dimension
    fn dimension(&self) -> usize;

    /// Embed a batch of texts, one vector per input in input order
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text
    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text])?
            .pop()
            .ok_or_else(|| crate::Error::Model("Embedding model returned no vector".to_string()))
    }

    fn fingerprint(&self) -> ModelFingerprint {
        ModelFingerprint {
            model_id: self.model_id().to_string(),
            dimension: self.dimension(),
        }
    }
}
