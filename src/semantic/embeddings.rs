//! Text embedding strategies.
//!
//! Provides a replaceable interface for generating embeddings:
//! - `Embedder` trait, the seam a model-backed client plugs into
//! - `HashEmbedder`, a deterministic hash-seeded generator used by default
//!
//! The hash embedder is not semantically meaningful. Identical input always yields
//! a bit-identical vector, on any host and across restarts.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIM: usize = 1536;

/// Name reported by [`HashEmbedder`]
const HASH_EMBEDDER_NAME: &str = "sha256-seeded-uniform";

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Embedder produced {got} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Maps text to a fixed-length vector.
pub trait Embedder: Send + Sync {
    /// Identifier of the strategy or model
    fn name(&self) -> &str;

    /// Length of every vector this embedder produces
    fn dimensions(&self) -> usize;

    /// Generate an embedding for a single (already normalized) text.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// SHA-256 of [`Embedder::name`], stamped into persisted vector files.
    fn model_id(&self) -> [u8; 32] {
        Sha256::digest(self.name().as_bytes()).into()
    }
}

/// Deterministic mock embedder seeded from the SHA-256 digest of the text.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// First 8 digest bytes, big-endian.
    fn seed(text: &str) -> u64 {
        let digest = Sha256::digest(text.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(prefix)
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIM)
    }
}

impl Embedder for HashEmbedder {
    fn name(&self) -> &str {
        HASH_EMBEDDER_NAME
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut rng = StdRng::seed_from_u64(Self::seed(text));

        Ok((0..self.dimensions)
            .map(|_| rng.random_range(-1.0f32..=1.0f32))
            .collect())
    }
}

/// Embed `text` and check the result against the embedder's declared dimension.
///
/// A mismatched vector is an error, never passed through truncated or padded.
pub fn embed_checked(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    let vector = embedder.embed(text)?;

    if vector.len() != embedder.dimensions() {
        return Err(EmbeddingError::DimensionMismatch {
            expected: embedder.dimensions(),
            got: vector.len(),
        });
    }

    Ok(vector)
}
