//! Request-scoped query, retrieval and answer types

use serde::{Deserialize, Serialize};

use crate::Chunk;

/// A question to answer over the indexed corpus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub question: String,
    /// Free-text conversation history; bounding it is the caller's job
    pub history: Option<String>,
    /// Requested neighbour count
    pub k: usize,
}

impl Query {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            history: None,
            k: 5,
        }
    }

    pub fn with_history(mut self, history: impl Into<String>) -> Self {
        let history = history.into();
        self.history = if history.trim().is_empty() {
            None
        } else {
            Some(history)
        };
        self
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }
}

/// A chunk paired with its similarity to the query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Chunks retrieved for one query, best match first
///
/// May hold fewer than `k` chunks when the index is smaller than `k`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub question: String,
    pub expanded_query: String,
    pub chunks: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Source record ids in rank order
    pub fn record_ids(&self) -> Vec<&str> {
        self.chunks
            .iter()
            .map(|hit| hit.chunk.record_id.as_str())
            .collect()
    }
}

/// Model input assembled from the template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub text: String,
}

impl Prompt {
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// Generated text together with the chunks it was grounded on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub sources: RetrievalResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_builder() {
        let query = Query::new("What goes wrong with money transfers?")
            .with_history("   ")
            .with_k(3);
        assert_eq!(query.k, 3);
        assert!(query.history.is_none());

        let query = query.with_history("User: hi\nAssistant: hello");
        assert!(query.history.is_some());
    }

    #[test]
    fn test_record_ids_in_rank_order() {
        let hit = |id: &str, score: f32| ScoredChunk {
            chunk: Chunk {
                text: format!("text {}", id),
                record_id: id.to_string(),
                category: "Credit card".to_string(),
                sub_category: String::new(),
            },
            score,
        };

        let result = RetrievalResult {
            question: "q".to_string(),
            expanded_query: "q".to_string(),
            chunks: vec![hit("9", 0.9), hit("4", 0.5)],
        };

        assert_eq!(result.record_ids(), vec!["9", "4"]);
        assert_eq!(result.len(), 2);
    }
}
