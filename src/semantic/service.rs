//! Search service tying normalization, embedding and ranking together.
//!
//! Provides a high-level interface for similarity search:
//! - Normalizes and embeds query text with the configured `Embedder`
//! - Ranks against either the in-memory corpus or the content store
//! - Checks at construction that every component agrees on the dimension

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::contents::{Content, ContentCreate, ContentStore, StoreError};
use crate::semantic::embeddings::{embed_checked, Embedder, EmbeddingError};
use crate::semantic::index::{Corpus, IndexError, SearchHit};
use crate::semantic::preprocess::{analyze, normalize, Analysis};

/// Errors that can occur during search operations.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Which corpus a search ranks against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Fixed in-memory corpus, dot product, higher is closer
    Memory,
    /// Content store, L2 distance, lower is closer
    #[default]
    Store,
}

impl SearchMode {
    pub fn metric(self) -> Metric {
        match self {
            SearchMode::Memory => Metric::DotProduct,
            SearchMode::Store => Metric::L2Distance,
        }
    }
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(SearchMode::Memory),
            "store" => Ok(SearchMode::Store),
            other => Err(format!("unknown search mode '{other}', expected 'memory' or 'store'")),
        }
    }
}

/// Meaning of `SearchHit::score` in a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    DotProduct,
    L2Distance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub metric: Metric,
}

/// Corpus handed to [`rank`] at call time.
pub enum CorpusSource<'a> {
    Memory(&'a Corpus),
    Store(&'a dyn ContentStore),
}

/// Rank `query` against `source`, returning at most `top_k` hits.
pub fn rank(query: &[f32], top_k: i64, source: CorpusSource<'_>) -> Result<Vec<SearchHit>, SearchError> {
    match source {
        CorpusSource::Memory(corpus) => Ok(corpus.search(query, top_k)?),
        CorpusSource::Store(store) => Ok(store.similar(query, top_k)?),
    }
}

/// Service for embedding text and searching stored content.
///
/// Every component is read-only or internally synchronized, so one instance is
/// shared across request handlers behind an `Arc`.
pub struct SearchService {
    embedder: Arc<dyn Embedder>,
    corpus: Arc<Corpus>,
    store: Arc<dyn ContentStore>,
    mode: SearchMode,
}

impl SearchService {
    /// Wire the service, refusing components of differing dimensions.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        corpus: Arc<Corpus>,
        store: Arc<dyn ContentStore>,
        mode: SearchMode,
    ) -> Result<Self, SearchError> {
        let expected = embedder.dimensions();
        for got in [corpus.dimensions(), store.dimensions()] {
            if got != expected {
                return Err(IndexError::DimensionMismatch { expected, got }.into());
            }
        }

        log::info!(
            "search service ready: embedder '{}' ({} dims), mode {:?}, {} corpus documents",
            embedder.name(),
            expected,
            mode,
            corpus.len()
        );

        Ok(Self {
            embedder,
            corpus,
            store,
            mode,
        })
    }

    /// Get the configured default mode.
    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    pub fn dimensions(&self) -> usize {
        self.embedder.dimensions()
    }

    pub fn store(&self) -> &dyn ContentStore {
        self.store.as_ref()
    }

    /// Normalize then embed `text`.
    pub fn embed(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        Ok(embed_checked(self.embedder.as_ref(), &normalize(text))?)
    }

    /// Analysis report for `text`, including the embedding dimension.
    pub fn analyze(&self, text: &str) -> Analysis {
        analyze(text, Some(self.embedder.as_ref()))
    }

    /// Store a record together with the embedding of its normalized body.
    ///
    /// The body is expected to be validated and trimmed by the caller.
    pub fn create_content(&self, create: ContentCreate) -> Result<Content, SearchError> {
        let embedding = self.embed(&create.body)?;
        Ok(self.store.create(create, Some(embedding))?)
    }

    /// Search using the configured mode.
    pub fn search(&self, query: &str, top_k: i64) -> Result<SearchResponse, SearchError> {
        self.search_with_mode(query, top_k, self.mode)
    }

    /// Search against an explicitly chosen corpus.
    pub fn search_with_mode(
        &self,
        query: &str,
        top_k: i64,
        mode: SearchMode,
    ) -> Result<SearchResponse, SearchError> {
        let query_embedding = self.embed(query)?;

        let source = match mode {
            SearchMode::Memory => CorpusSource::Memory(&self.corpus),
            SearchMode::Store => CorpusSource::Store(self.store.as_ref()),
        };
        let results = rank(&query_embedding, top_k, source)?;

        log::debug!("search mode {mode:?} top_k {top_k}: {} hits", results.len());

        Ok(SearchResponse {
            results,
            metric: mode.metric(),
        })
    }
}
