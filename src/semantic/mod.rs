//! Similarity search core for stored content.
//!
//! This module turns text into fixed-length vectors and ranks stored vectors
//! against a query vector.
//!
//! # Architecture
//!
//! - `preprocess`: Whitespace normalization and the analysis helper
//! - `embeddings`: `Embedder` trait and the deterministic hash-seeded embedder
//! - `index`: Immutable in-memory corpus with dot-product scan
//! - `storage`: Binary file I/O for vectors.bin persistence
//! - `service`: High-level search service selecting a corpus per mode

pub mod embeddings;
pub mod index;
mod preprocess;
pub mod service;
pub mod storage;

pub use embeddings::{HashEmbedder, DEFAULT_EMBEDDING_DIM};
pub use index::Corpus;
pub use preprocess::{analyze, normalize, Analysis};
pub use service::{SearchError, SearchMode, SearchResponse, SearchService};
pub use storage::{VectorStorage, VectorStorageError};
