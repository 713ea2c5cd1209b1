//! In-memory corpus with dot-product similarity scan.
//!
//! The corpus is built once and never mutated afterwards, so it can be shared
//! across request handlers without locking.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::semantic::embeddings::{embed_checked, Embedder, EmbeddingError};
use crate::semantic::preprocess::normalize;

/// An entry in the corpus.
#[derive(Debug, Clone)]
pub struct CorpusEntry {
    pub id: String,
    pub title: Option<String>,
    pub body: String,
    pub embedding: Vec<f32>,
}

/// A ranked match, constructed per search call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub title: Option<String>,
    pub body: String,
    /// Dot product (higher is closer) or L2 distance (lower is closer),
    /// depending on which scan produced the hit.
    pub score: f32,
}

/// Immutable, insertion-ordered set of embedded documents.
#[derive(Debug, Clone)]
pub struct Corpus {
    entries: Vec<CorpusEntry>,
    dimensions: usize,
}

impl Corpus {
    /// Create an empty corpus accepting vectors of `dimensions` length.
    pub fn new(dimensions: usize) -> Self {
        Self {
            entries: Vec::new(),
            dimensions,
        }
    }

    /// Build a corpus from pre-computed entries, rejecting wrong-length vectors.
    pub fn from_entries(dimensions: usize, entries: Vec<CorpusEntry>) -> Result<Self, IndexError> {
        for entry in &entries {
            check_dimensions(dimensions, &entry.embedding)?;
        }

        Ok(Self {
            entries,
            dimensions,
        })
    }

    /// Embed `(id, title, body)` documents with `embedder` and build a corpus.
    pub fn embed_documents<I>(embedder: &dyn Embedder, documents: I) -> Result<Self, IndexError>
    where
        I: IntoIterator<Item = (String, Option<String>, String)>,
    {
        let entries = documents
            .into_iter()
            .map(|(id, title, body)| -> Result<CorpusEntry, IndexError> {
                let embedding = embed_checked(embedder, &normalize(&body))?;
                Ok(CorpusEntry {
                    id,
                    title,
                    body,
                    embedding,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::from_entries(embedder.dimensions(), entries)
    }

    /// Get the expected embedding dimensions.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CorpusEntry> {
        self.entries.iter()
    }

    /// Score every entry by dot product against `query` and return the best `top_k`.
    ///
    /// Results are sorted by score descending; ties keep insertion order.
    /// Scores are unnormalized and not bounded to [-1, 1].
    pub fn search(&self, query: &[f32], top_k: i64) -> Result<Vec<SearchHit>, IndexError> {
        check_dimensions(self.dimensions, query)?;

        if top_k <= 0 {
            return Ok(vec![]);
        }

        let mut results: Vec<SearchHit> = self
            .entries
            .iter()
            .map(|entry| SearchHit {
                id: entry.id.clone(),
                title: entry.title.clone(),
                body: entry.body.clone(),
                score: dot_product(query, &entry.embedding),
            })
            .collect();

        // stable
        results.sort_by(|a, b| descending(a.score, b.score));
        truncate_top_k(&mut results, top_k);

        Ok(results)
    }
}

/// Refuse to compare vectors of differing length.
pub fn check_dimensions(expected: usize, vector: &[f32]) -> Result<(), IndexError> {
    if vector.len() != expected {
        return Err(IndexError::DimensionMismatch {
            expected,
            got: vector.len(),
        });
    }
    Ok(())
}

/// Unnormalized dot product. Callers check lengths first.
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Euclidean distance. Callers check lengths first.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Ordering for higher-is-better scores. NaN sorts last.
pub fn descending(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

/// Ordering for lower-is-better distances. NaN sorts last.
pub fn ascending(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Keep at most `top_k` results; `top_k <= 0` keeps none.
pub fn truncate_top_k<T>(results: &mut Vec<T>, top_k: i64) {
    let limit = usize::try_from(top_k).unwrap_or(0);
    results.truncate(limit);
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
}
