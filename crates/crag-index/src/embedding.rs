//! Embedding model implementations

use crag_core::{Embedder, Error, Result};

/// Model id of the feature-hashing embedder
pub const HASHING_MODEL_ID: &str = "hashing-bow-v1";

/// Deterministic feature-hashing embedder
///
/// Each lowercase alphanumeric token is spread over three md5-derived slots
/// and each adjacent token pair adds a bigram feature; the result is
/// L2-normalised. Needs no model download and produces the same vector for
/// the same text on every platform.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::InvalidInput(
                "embedding dimension must be positive".to_string(),
            ));
        }
        Ok(Self { dimension })
    }

    fn tokens(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
            .map(String::from)
            .collect()
    }

    fn slots(&self, feature: &str) -> [usize; 3] {
        let digest = md5::compute(feature.as_bytes()).0;
        let word = |i: usize| {
            u32::from_le_bytes([digest[i], digest[i + 1], digest[i + 2], digest[i + 3]]) as usize
        };
        [
            word(0) % self.dimension,
            word(4) % self.dimension,
            word(8) % self.dimension,
        ]
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let tokens = Self::tokens(text);
        let mut embedding = vec![0.0f32; self.dimension];

        for token in &tokens {
            let [a, b, c] = self.slots(token);
            embedding[a] += 1.0;
            embedding[b] += 0.7;
            embedding[c] += 0.5;
        }

        for pair in tokens.windows(2) {
            let [slot, _, _] = self.slots(&format!("{} {}", pair[0], pair[1]));
            embedding[slot] += 0.8;
        }

        normalize(&mut embedding);
        embedding
    }
}

impl Embedder for HashingEmbedder {
    fn model_id(&self) -> &str {
        HASHING_MODEL_ID
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

/// Scale `vector` to unit length; zero vectors are left untouched
pub fn normalize(vector: &mut [f32]) {
    let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in vector.iter_mut() {
            *value /= magnitude;
        }
    }
}

#[cfg(feature = "fastembed")]
pub use self::fast::FastEmbedder;

#[cfg(feature = "fastembed")]
mod fast {
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::sync::Mutex;
    use tracing::info;

    use crag_core::{Embedder, Error, Result};

    /// Sentence-transformer embeddings through ONNX Runtime
    pub struct FastEmbedder {
        model: Mutex<TextEmbedding>,
        model_id: String,
        dimension: usize,
    }

    impl FastEmbedder {
        /// The `all-MiniLM-L6-v2` sentence transformer (384 dims)
        pub fn all_minilm_l6_v2() -> Result<Self> {
            Self::with_model(
                EmbeddingModel::AllMiniLML6V2,
                "sentence-transformers/all-MiniLM-L6-v2",
            )
        }

        pub fn with_model(model: EmbeddingModel, model_id: &str) -> Result<Self> {
            let mut text_model =
                TextEmbedding::try_new(InitOptions::new(model).with_show_download_progress(true))
                    .map_err(|e| Error::Model(format!("Failed to load {}: {}", model_id, e)))?;

            let sample = text_model
                .embed(vec!["dimension check"], None)
                .map_err(|e| Error::Model(e.to_string()))?;
            let dimension = sample
                .first()
                .map(Vec::len)
                .ok_or_else(|| Error::Model("Embedding model returned no vector".to_string()))?;

            info!(model = model_id, dimension, "embedding model loaded");
            Ok(Self {
                model: Mutex::new(text_model),
                model_id: model_id.to_string(),
                dimension,
            })
        }
    }

    impl Embedder for FastEmbedder {
        fn model_id(&self) -> &str {
            &self.model_id
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            let mut model = self
                .model
                .lock()
                .map_err(|_| Error::Model("Embedding model lock poisoned".to_string()))?;
            model
                .embed(texts.to_vec(), None)
                .map_err(|e| Error::Model(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(HashingEmbedder::new(0).is_err());
    }

    #[test]
    fn test_vectors_are_unit_length_and_fixed_dimension() {
        let embedder = HashingEmbedder::new(384).unwrap();
        let vectors = embedder
            .embed(&["My credit card was charged twice", "late fee"])
            .unwrap();

        assert_eq!(vectors.len(), 2);
        for vector in &vectors {
            assert_eq!(vector.len(), 384);
            let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_same_text_same_vector() {
        let embedder = HashingEmbedder::new(128).unwrap();
        let a = embedder.embed_one("Wire transfer never arrived").unwrap();
        let b = embedder.embed_one("wire transfer, never arrived!").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_related_text_scores_higher() {
        let embedder = HashingEmbedder::new(384).unwrap();
        let query = embedder.embed_one("credit card double charge").unwrap();
        let card = embedder.embed_one("My credit card was charged twice").unwrap();
        let savings = embedder
            .embed_one("Savings account interest rate is too low")
            .unwrap();

        assert!(cosine(&query, &card) > cosine(&query, &savings));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(16).unwrap();
        let vector = embedder.embed_one("  ...  ").unwrap();
        assert!(vector.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_fingerprint_reports_identity() {
        let embedder = HashingEmbedder::new(64).unwrap();
        let fingerprint = embedder.fingerprint();
        assert_eq!(fingerprint.model_id, HASHING_MODEL_ID);
        assert_eq!(fingerprint.dimension, 64);
    }
}
