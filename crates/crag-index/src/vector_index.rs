//! Persisted nearest-neighbour index over chunk embeddings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

use crate::embedding::normalize;
use crag_core::{Chunk, Error, ModelFingerprint, Result, ScoredChunk};

/// File holding the index inside the index directory
pub const INDEX_FILE_NAME: &str = "index.json";

const FORMAT_VERSION: u32 = 1;

/// A chunk and its unit-length embedding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

#[derive(Serialize, Deserialize)]
struct IndexFile {
    format_version: u32,
    fingerprint: ModelFingerprint,
    built_at: DateTime<Utc>,
    entries: Vec<IndexEntry>,
}

/// Exact cosine-similarity index
///
/// Built once, saved whole, and loaded read-only at query time. Entries keep
/// their insertion order, which breaks ties between equal scores.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    fingerprint: ModelFingerprint,
    built_at: DateTime<Utc>,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Create an empty index for embeddings produced by `fingerprint`'s model
    pub fn new(fingerprint: ModelFingerprint) -> Self {
        Self {
            fingerprint,
            built_at: Utc::now(),
            entries: Vec::new(),
        }
    }

    pub fn fingerprint(&self) -> &ModelFingerprint {
        &self.fingerprint
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Append a chunk with its embedding
    pub fn insert(&mut self, chunk: Chunk, mut embedding: Vec<f32>) -> Result<()> {
        if embedding.len() != self.fingerprint.dimension {
            return Err(Error::Model(format!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.fingerprint.dimension,
                embedding.len()
            )));
        }
        normalize(&mut embedding);
        self.entries.push(IndexEntry { chunk, embedding });
        Ok(())
    }

    /// Return the `k` most similar chunks, best first
    ///
    /// Returns every chunk when `k` exceeds the index size.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if query.len() != self.fingerprint.dimension {
            return Err(Error::InvalidInput(format!(
                "Query dimension mismatch: expected {}, got {}",
                self.fingerprint.dimension,
                query.len()
            )));
        }

        let mut query = query.to_vec();
        normalize(&mut query);

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, dot(&query, &entry.embedding)))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                chunk: self.entries[i].chunk.clone(),
                score,
            })
            .collect())
    }

    /// Write the index to `<dir>/index.json`, creating `dir` if needed
    ///
    /// The file is written to a temporary sibling and renamed into place, so
    /// an interrupted save never leaves a partial index behind.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| {
            Error::Artifact(format!("Cannot create index directory {}: {}", dir.display(), e))
        })?;

        let file = IndexFile {
            format_version: FORMAT_VERSION,
            fingerprint: self.fingerprint.clone(),
            built_at: self.built_at,
            entries: self.entries.clone(),
        };

        let artifact_err = |reason: String| {
            Error::Artifact(format!("Cannot write index to {}: {}", dir.display(), reason))
        };

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| artifact_err(e.to_string()))?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer(&mut writer, &file).map_err(|e| artifact_err(e.to_string()))?;
            writer.flush().map_err(|e| artifact_err(e.to_string()))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| artifact_err(e.to_string()))?;

        let path = dir.join(INDEX_FILE_NAME);
        tmp.persist(&path)
            .map_err(|e| artifact_err(e.error.to_string()))?;

        info!(
            path = %path.display(),
            entries = self.entries.len(),
            model = %self.fingerprint,
            "index saved"
        );
        Ok(path)
    }

    /// Load an index and check it was built with the `expected` model
    pub fn load(dir: impl AsRef<Path>, expected: &ModelFingerprint) -> Result<Self> {
        let index = Self::load_unchecked(dir)?;
        if &index.fingerprint != expected {
            return Err(Error::Artifact(format!(
                "Index was built with {} but the query embedder is {}",
                index.fingerprint, expected
            )));
        }
        Ok(index)
    }

    /// Load an index without checking its embedding model
    pub fn load_unchecked(dir: impl AsRef<Path>) -> Result<Self> {
        let path = dir.as_ref().join(INDEX_FILE_NAME);
        let file = fs::File::open(&path).map_err(|e| {
            Error::Artifact(format!("Index not found at {}: {}", path.display(), e))
        })?;

        let stored: IndexFile = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            Error::Artifact(format!("Index at {} is unreadable: {}", path.display(), e))
        })?;

        if stored.format_version != FORMAT_VERSION {
            return Err(Error::Artifact(format!(
                "Index format version {} is not supported (expected {})",
                stored.format_version, FORMAT_VERSION
            )));
        }

        let dimension = stored.fingerprint.dimension;
        if let Some(bad) = stored
            .entries
            .iter()
            .position(|entry| entry.embedding.len() != dimension)
        {
            return Err(Error::Artifact(format!(
                "Index entry {} has dimension {}, expected {}",
                bad,
                stored.entries[bad].embedding.len(),
                dimension
            )));
        }

        info!(
            path = %path.display(),
            entries = stored.entries.len(),
            model = %stored.fingerprint,
            "index loaded"
        );
        Ok(Self {
            fingerprint: stored.fingerprint,
            built_at: stored.built_at,
            entries: stored.entries,
        })
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
