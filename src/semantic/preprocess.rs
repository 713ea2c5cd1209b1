//! Text preprocessing shared by embedding and analysis.
//!
//! Prepares raw content for embedding:
//! 1. Trim leading/trailing whitespace
//! 2. Collapse internal whitespace runs to a single space
//!
//! The analysis helper reuses the same normalization and reports a short preview.

use serde::Serialize;

use crate::semantic::embeddings::Embedder;

/// Maximum preview length (characters, not bytes)
const PREVIEW_LENGTH: usize = 30;

/// Ellipsis suffix when the preview is truncated
const TRUNCATION_SUFFIX: &str = "...";

/// Normalize whitespace in raw text.
///
/// Total and idempotent: `normalize(normalize(s)) == normalize(s)`.
pub fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Report produced by [`analyze`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Analysis {
    /// Character count of the normalized text
    pub length: usize,
    pub preview: String,
    pub normalized_text: String,
    /// Embedding dimension, when an embedder was supplied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_dim: Option<usize>,
}

/// Normalize `text` and describe it.
///
/// When `embedder` is given, the normalized text is embedded and the resulting
/// dimension is reported. Embedding failures are not fatal for a debug report;
/// the dimension is simply omitted.
pub fn analyze(text: &str, embedder: Option<&dyn Embedder>) -> Analysis {
    let normalized_text = normalize(text);
    let length = normalized_text.chars().count();

    let embedding_dim = embedder.and_then(|embedder| match embedder.embed(&normalized_text) {
        Ok(vector) => Some(vector.len()),
        Err(err) => {
            log::warn!("analyze: embedding failed: {err}");
            None
        }
    });

    Analysis {
        length,
        preview: preview(&normalized_text),
        normalized_text,
        embedding_dim,
    }
}

/// First `PREVIEW_LENGTH` characters, with an ellipsis only if something was cut.
fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_LENGTH).collect();

    if chars.next().is_some() {
        format!("{}{}", head, TRUNCATION_SUFFIX)
    } else {
        head
    }
}
