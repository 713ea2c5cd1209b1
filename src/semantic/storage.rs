//! Binary storage for content embeddings.
//!
//! File format: vectors.bin
//!
//! Header (47 bytes):
//! - version: u8 (1)
//! - model_id: [u8; 32] (SHA-256 of the embedder name)
//! - dimensions: u16 (little-endian)
//! - entry_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Entries (repeated, in insertion order):
//! - content_id: [u8; 26] (ULID, ASCII)
//! - embedding: [f32; dimensions] (little-endian)

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// Header size in bytes: version(1) + model_id(32) + dimensions(2) + entry_count(8) + checksum(4)
const HEADER_SIZE: usize = 47;

/// Bytes covered by the header checksum
const CHECKSUM_OFFSET: usize = HEADER_SIZE - 4;

/// Width of a stored content id
pub const ID_WIDTH: usize = 26;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum VectorStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    #[error("Model mismatch: vectors were written by a different embedder")]
    ModelMismatch,

    #[error("Dimension mismatch: expected {expected}, file has {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// A stored (content id, embedding) pair.
pub type VectorRecord = (String, Vec<f32>);

/// Storage manager for content embeddings.
pub struct VectorStorage {
    path: PathBuf,
}

impl VectorStorage {
    /// Create a new storage manager for the given path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Get the storage file path.
    #[cfg(test)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the storage file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load all records, validating the header against the embedder that will
    /// consume them.
    pub fn load(
        &self,
        expected_model_id: &[u8; 32],
        expected_dimensions: usize,
    ) -> Result<Vec<VectorRecord>, VectorStorageError> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);

        let header = Self::read_header(&mut reader)?;
        if header.model_id != *expected_model_id {
            return Err(VectorStorageError::ModelMismatch);
        }
        if header.dimensions as usize != expected_dimensions {
            return Err(VectorStorageError::DimensionMismatch {
                expected: expected_dimensions,
                got: header.dimensions as usize,
            });
        }

        let mut records = Vec::new();
        for _ in 0..header.entry_count {
            records.push(Self::read_entry(&mut reader, expected_dimensions)?);
        }

        let mut trailing = [0u8; 1];
        if reader.read(&mut trailing)? != 0 {
            return Err(VectorStorageError::InvalidFormat(
                "trailing bytes after last entry".to_string(),
            ));
        }

        Ok(records)
    }

    /// Save records to storage.
    ///
    /// Uses atomic write: temp file -> fsync -> rename
    pub fn save<'a, I>(
        &self,
        model_id: &[u8; 32],
        dimensions: usize,
        records: I,
    ) -> Result<(), VectorStorageError>
    where
        I: IntoIterator<Item = (&'a str, &'a [f32])>,
    {
        let dimensions = u16::try_from(dimensions).map_err(|_| {
            VectorStorageError::InvalidFormat(format!("{dimensions} dimensions do not fit in u16"))
        })?;

        let temp_path = self.path.with_extension("tmp");

        let result = Self::write_to_file(&temp_path, model_id, dimensions, records);

        if result.is_err() {
            // Clean up temp file on error
            let _ = std::fs::remove_file(&temp_path);
            return result;
        }

        std::fs::rename(&temp_path, &self.path)?;

        Ok(())
    }

    fn write_to_file<'a, I>(
        path: &Path,
        model_id: &[u8; 32],
        dimensions: u16,
        records: I,
    ) -> Result<(), VectorStorageError>
    where
        I: IntoIterator<Item = (&'a str, &'a [f32])>,
    {
        let records: Vec<(&str, &[f32])> = records.into_iter().collect();

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        let header = Header {
            model_id: *model_id,
            dimensions,
            entry_count: records.len() as u64,
        };
        Self::write_header(&mut writer, &header)?;

        for (id, embedding) in records {
            Self::write_entry(&mut writer, id, embedding, dimensions as usize)?;
        }

        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        file.sync_all()?;

        Ok(())
    }

    fn read_header(reader: &mut impl Read) -> Result<Header, VectorStorageError> {
        let mut header_bytes = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header_bytes)?;

        let version = header_bytes[0];

        // Version check first
        if version > FORMAT_VERSION {
            return Err(VectorStorageError::VersionMismatch(version, FORMAT_VERSION));
        }

        let mut model_id = [0u8; 32];
        model_id.copy_from_slice(&header_bytes[1..33]);
        let dimensions = u16::from_le_bytes([header_bytes[33], header_bytes[34]]);
        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&header_bytes[35..43]);
        let entry_count = u64::from_le_bytes(count_bytes);
        let stored_checksum = u32::from_le_bytes([
            header_bytes[43],
            header_bytes[44],
            header_bytes[45],
            header_bytes[46],
        ]);

        if stored_checksum != crc32fast::hash(&header_bytes[..CHECKSUM_OFFSET]) {
            return Err(VectorStorageError::ChecksumMismatch);
        }

        Ok(Header {
            model_id,
            dimensions,
            entry_count,
        })
    }

    fn write_header(writer: &mut impl Write, header: &Header) -> Result<(), VectorStorageError> {
        let mut header_bytes = [0u8; HEADER_SIZE];

        header_bytes[0] = FORMAT_VERSION;
        header_bytes[1..33].copy_from_slice(&header.model_id);
        header_bytes[33..35].copy_from_slice(&header.dimensions.to_le_bytes());
        header_bytes[35..43].copy_from_slice(&header.entry_count.to_le_bytes());

        let checksum = crc32fast::hash(&header_bytes[..CHECKSUM_OFFSET]);
        header_bytes[CHECKSUM_OFFSET..].copy_from_slice(&checksum.to_le_bytes());

        writer.write_all(&header_bytes)?;
        Ok(())
    }

    fn read_entry(reader: &mut impl Read, dimensions: usize) -> Result<VectorRecord, VectorStorageError> {
        let mut id_bytes = [0u8; ID_WIDTH];
        reader.read_exact(&mut id_bytes)?;
        let id = std::str::from_utf8(&id_bytes)
            .map_err(|_| VectorStorageError::InvalidFormat("content id is not utf8".to_string()))?
            .to_string();

        let mut embedding = Vec::with_capacity(dimensions);
        for _ in 0..dimensions {
            let mut float_bytes = [0u8; 4];
            reader.read_exact(&mut float_bytes)?;
            embedding.push(f32::from_le_bytes(float_bytes));
        }

        Ok((id, embedding))
    }

    fn write_entry(
        writer: &mut impl Write,
        id: &str,
        embedding: &[f32],
        dimensions: usize,
    ) -> Result<(), VectorStorageError> {
        if id.len() != ID_WIDTH {
            return Err(VectorStorageError::InvalidFormat(format!(
                "content id {id:?} is not {ID_WIDTH} bytes"
            )));
        }
        if embedding.len() != dimensions {
            return Err(VectorStorageError::DimensionMismatch {
                expected: dimensions,
                got: embedding.len(),
            });
        }

        writer.write_all(id.as_bytes())?;
        for &value in embedding {
            writer.write_all(&value.to_le_bytes())?;
        }

        Ok(())
    }
}

#[derive(Debug)]
struct Header {
    model_id: [u8; 32],
    dimensions: u16,
    entry_count: u64,
}
