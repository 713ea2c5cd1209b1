use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Instant,
};

use crate::{
    eid::Eid,
    semantic::{
        index::{ascending, check_dimensions, l2_distance, truncate_top_k, IndexError, SearchHit},
        VectorStorage, VectorStorageError,
    },
};

/// A stored piece of text. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub id: Eid,
    pub title: Option<String>,
    pub body: String,
    /// Absent until computed; never serialized over the wire.
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

impl Content {
    /// Copy without the embedding, for listings.
    pub fn without_embedding(&self) -> Self {
        Self {
            embedding: None,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ContentCreate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("vector storage error: {0}")]
    Vectors(#[from] VectorStorageError),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("store lock poisoned")]
    Poisoned,
}

impl From<IndexError> for StoreError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::DimensionMismatch { expected, got } => {
                StoreError::DimensionMismatch { expected, got }
            }
            other => StoreError::Corrupt(other.to_string()),
        }
    }
}

/// Persistence contract for content records and their embeddings.
pub trait ContentStore: Send + Sync {
    /// Insert a record, generating its id and creation timestamp.
    fn create(
        &self,
        create: ContentCreate,
        embedding: Option<Vec<f32>>,
    ) -> Result<Content, StoreError>;

    /// Look a record up by id. A missing record is `Ok(None)`.
    fn get(&self, id: &Eid) -> Result<Option<Content>, StoreError>;

    /// All records, newest first, embeddings omitted.
    fn list(&self) -> Result<Vec<Content>, StoreError>;

    /// Rank records with an embedding by L2 distance to `query`, closest first.
    fn similar(&self, query: &[f32], top_k: i64) -> Result<Vec<SearchHit>, StoreError>;

    fn total(&self) -> Result<usize, StoreError>;

    /// Embedding length this store accepts.
    fn dimensions(&self) -> usize;
}

fn new_content(
    create: ContentCreate,
    embedding: Option<Vec<f32>>,
    dimensions: usize,
) -> Result<Content, StoreError> {
    if let Some(ref embedding) = embedding {
        check_dimensions(dimensions, embedding)?;
    }

    Ok(Content {
        id: Eid::new(),
        title: create.title.filter(|title| !title.is_empty()),
        body: create.body,
        embedding,
        created_at: Utc::now(),
    })
}

fn list_newest_first(rows: &[Content]) -> Vec<Content> {
    // reversed first so equal timestamps list the later insert first
    let mut listed: Vec<Content> = rows.iter().rev().map(Content::without_embedding).collect();
    listed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    listed
}

fn rank_by_distance(
    rows: &[Content],
    query: &[f32],
    top_k: i64,
    dimensions: usize,
) -> Result<Vec<SearchHit>, StoreError> {
    check_dimensions(dimensions, query)?;

    if top_k <= 0 {
        return Ok(vec![]);
    }

    let mut hits = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(ref embedding) = row.embedding else {
            continue;
        };
        check_dimensions(dimensions, embedding)?;

        hits.push(SearchHit {
            id: row.id.to_string(),
            title: row.title.clone(),
            body: row.body.clone(),
            score: l2_distance(query, embedding),
        });
    }

    // stable
    hits.sort_by(|a, b| ascending(a.score, b.score));
    truncate_top_k(&mut hits, top_k);

    Ok(hits)
}

/// Non-persistent store, used for tests and `storage: memory`.
#[derive(Debug, Default)]
pub struct BackendMemory {
    list: RwLock<Vec<Content>>,
    dimensions: usize,
}

impl BackendMemory {
    pub fn new(dimensions: usize) -> Self {
        Self {
            list: RwLock::new(Vec::new()),
            dimensions,
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<Content>>, StoreError> {
        self.list.read().map_err(|_| StoreError::Poisoned)
    }
}

impl ContentStore for BackendMemory {
    fn create(
        &self,
        create: ContentCreate,
        embedding: Option<Vec<f32>>,
    ) -> Result<Content, StoreError> {
        let content = new_content(create, embedding, self.dimensions)?;

        self.list
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .push(content.clone());

        Ok(content)
    }

    fn get(&self, id: &Eid) -> Result<Option<Content>, StoreError> {
        Ok(self.read()?.iter().find(|c| &c.id == id).cloned())
    }

    fn list(&self) -> Result<Vec<Content>, StoreError> {
        Ok(list_newest_first(&self.read()?))
    }

    fn similar(&self, query: &[f32], top_k: i64) -> Result<Vec<SearchHit>, StoreError> {
        rank_by_distance(&self.read()?, query, top_k, self.dimensions)
    }

    fn total(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.len())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

const CSV_FILE: &str = "contents.csv";
const VECTORS_FILE: &str = "vectors.bin";

const CSV_HEADERS: [&str; 4] = ["id", "title", "body", "created_at"];

/// Store persisted as `contents.csv` plus `vectors.bin` in one directory.
pub struct BackendCsv {
    list: RwLock<Vec<Content>>,
    csv_path: PathBuf,
    vectors: VectorStorage,
    model_id: [u8; 32],
    dimensions: usize,
}

impl BackendCsv {
    /// Open the store in `dir`, creating it when missing. `model_id` identifies the
    /// embedder; vectors written by another one are refused.
    pub fn load(dir: &Path, model_id: [u8; 32], dimensions: usize) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;

        let csv_path = dir.join(CSV_FILE);
        let vectors = VectorStorage::new(dir.join(VECTORS_FILE));

        if let Err(err) = std::fs::metadata(&csv_path) {
            match err.kind() {
                ErrorKind::NotFound => {
                    log::info!("Creating new content database at {}", csv_path.display());
                    let mut csv_wrt = csv::Writer::from_path(&csv_path)?;
                    csv_wrt.write_record(CSV_HEADERS)?;
                    csv_wrt.flush()?;
                }
                _ => Err(err)?,
            }
        }

        let now = Instant::now();

        let mut embeddings: HashMap<String, Vec<f32>> = if vectors.exists() {
            vectors.load(&model_id, dimensions)?.into_iter().collect()
        } else {
            HashMap::new()
        };

        let mut csv_reader = csv::Reader::from_path(&csv_path)?;
        let mut rows = vec![];
        for record in csv_reader.records() {
            let record = record?;
            let field = |idx: usize, name: &str| {
                record
                    .get(idx)
                    .map(str::to_string)
                    .ok_or_else(|| StoreError::Corrupt(format!("couldnt get record {name}")))
            };

            let id = field(0, "id")?;
            let title = field(1, "title")?;
            let body = field(2, "body")?;
            let created_at = DateTime::parse_from_rfc3339(&field(3, "created_at")?)
                .map_err(|err| StoreError::Corrupt(format!("bad created_at for {id}: {err}")))?
                .with_timezone(&Utc);

            rows.push(Content {
                embedding: embeddings.remove(&id),
                id: Eid::from(id),
                title: if title.is_empty() { None } else { Some(title) },
                body,
                created_at,
            });
        }

        if !embeddings.is_empty() {
            log::warn!(
                "ignoring {} stored embeddings without a content record",
                embeddings.len()
            );
        }

        log::debug!(
            "took {}ms to read {} contents",
            now.elapsed().as_micros() as f64 / 1000.0,
            rows.len()
        );

        Ok(BackendCsv {
            list: RwLock::new(rows),
            csv_path,
            vectors,
            model_id,
            dimensions,
        })
    }

    fn save(&self, rows: &[Content]) -> Result<(), StoreError> {
        let temp_path = self.csv_path.with_extension("csv-tmp");
        let mut csv_wrt = csv::Writer::from_path(&temp_path)?;
        csv_wrt.write_record(CSV_HEADERS)?;
        for content in rows {
            csv_wrt.write_record([
                content.id.as_str(),
                content.title.as_deref().unwrap_or_default(),
                content.body.as_str(),
                content.created_at.to_rfc3339().as_str(),
            ])?;
        }
        csv_wrt.flush()?;
        drop(csv_wrt);

        let saved = self.vectors.save(
            &self.model_id,
            self.dimensions,
            rows.iter().filter_map(|content| {
                content
                    .embedding
                    .as_deref()
                    .map(|embedding| (content.id.as_str(), embedding))
            }),
        );
        if let Err(err) = saved {
            let _ = std::fs::remove_file(&temp_path);
            return Err(err.into());
        }

        std::fs::rename(&temp_path, &self.csv_path)?;

        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<Content>>, StoreError> {
        self.list.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<Content>>, StoreError> {
        self.list.write().map_err(|_| StoreError::Poisoned)
    }
}

impl ContentStore for BackendCsv {
    fn create(
        &self,
        create: ContentCreate,
        embedding: Option<Vec<f32>>,
    ) -> Result<Content, StoreError> {
        let content = new_content(create, embedding, self.dimensions)?;

        let mut rows = self.write()?;
        rows.push(content.clone());

        if let Err(err) = self.save(&rows) {
            rows.pop();
            return Err(err);
        }

        Ok(content)
    }

    fn get(&self, id: &Eid) -> Result<Option<Content>, StoreError> {
        Ok(self.read()?.iter().find(|c| &c.id == id).cloned())
    }

    fn list(&self) -> Result<Vec<Content>, StoreError> {
        Ok(list_newest_first(&self.read()?))
    }

    fn similar(&self, query: &[f32], top_k: i64) -> Result<Vec<SearchHit>, StoreError> {
        rank_by_distance(&self.read()?, query, top_k, self.dimensions)
    }

    fn total(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.len())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
