//! End-to-end tests for the semantic module: normalize, embed, persist, rank.

use crate::semantic::{
    analyze,
    embeddings::Embedder,
    index::CorpusEntry,
    normalize,
    service::{rank, CorpusSource},
    Corpus, HashEmbedder, VectorStorage, DEFAULT_EMBEDDING_DIM,
};

const ML_ID: &str = "01HV8Z4A6Q3M1T7XK2C9RDE5WB";
const RUST_ID: &str = "01HV8Z4A6Q3M1T7XK2C9RDE5WC";
const DL_ID: &str = "01HV8Z4A6Q3M1T7XK2C9RDE5WD";
const WEB_ID: &str = "01HV8Z4A6Q3M1T7XK2C9RDE5WE";

// Ids must be ULID width to fit a vectors.bin entry.
const DOCUMENTS: [(&str, &str); 4] = [
    (ML_ID, "An introduction to machine learning algorithms"),
    (RUST_ID, "Learn the Rust programming language with examples"),
    (DL_ID, "Build neural networks using deep learning"),
    (WEB_ID, "HTML, CSS, and JavaScript fundamentals"),
];

/// Embed -> save -> load -> rebuild corpus -> search.
#[test]
fn test_embedding_storage_search_flow() {
    let tmp = tempfile::tempdir().unwrap();
    let embedder = HashEmbedder::default();
    assert_eq!(embedder.dimensions(), DEFAULT_EMBEDDING_DIM);

    let embedded: Vec<(String, Vec<f32>)> = DOCUMENTS
        .iter()
        .map(|(id, body)| (id.to_string(), embedder.embed(&normalize(body)).unwrap()))
        .collect();

    let storage = VectorStorage::new(tmp.path().join("vectors.bin"));
    storage
        .save(
            &embedder.model_id(),
            embedder.dimensions(),
            embedded.iter().map(|(id, v)| (id.as_str(), v.as_slice())),
        )
        .unwrap();

    let loaded = storage
        .load(&embedder.model_id(), embedder.dimensions())
        .unwrap();
    assert_eq!(loaded, embedded);

    let entries = loaded
        .into_iter()
        .zip(DOCUMENTS)
        .map(|((id, embedding), (_, body))| CorpusEntry {
            id,
            title: None,
            body: body.to_string(),
            embedding,
        })
        .collect();
    let corpus = Corpus::from_entries(embedder.dimensions(), entries).unwrap();

    let query = embedder
        .embed(&normalize("  Learn the Rust   programming language with examples "))
        .unwrap();
    let hits = rank(&query, 2, CorpusSource::Memory(&corpus)).unwrap();

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, RUST_ID);
    assert!(hits[0].score >= hits[1].score);
}

#[test]
fn test_embeddings_stable_across_instances() {
    let a = HashEmbedder::new(64);
    let b = HashEmbedder::new(64);

    for (_, body) in DOCUMENTS {
        assert_eq!(a.embed(body).unwrap(), b.embed(body).unwrap());
    }
}

#[test]
fn test_distinct_texts_distinct_embeddings() {
    let embedder = HashEmbedder::new(64);
    let first = embedder.embed(DOCUMENTS[0].1).unwrap();
    let second = embedder.embed(DOCUMENTS[1].1).unwrap();

    assert_ne!(first, second);
}

#[test]
fn test_analyze_matches_normalize() {
    let text = "  Quarterly\tsales \n report  ";
    let analysis = analyze(text, None);

    assert_eq!(analysis.normalized_text, "Quarterly sales report");
    assert_eq!(analysis.length, 22);
    assert_eq!(analysis.preview, "Quarterly sales report");
    assert!(analysis.embedding_dim.is_none());
}

#[test]
fn test_document_ids_fit_vector_storage() {
    for (id, _) in DOCUMENTS {
        assert_eq!(id.len(), crate::semantic::storage::ID_WIDTH);
    }
}
