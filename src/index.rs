/// Flat inner-product vector index with file persistence.
///
/// Vectors are stored row-major; over L2-normalized rows the inner product
/// equals cosine similarity. Row `i` of the index corresponds exactly to
/// `metadata[i]`; the two files are written together and the pair loader
/// refuses to serve a mismatched pair.
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, RetrievalError};

/// On-disk header: dims (u32 LE) + row count (u64 LE), then f32 LE rows.
const HEADER_LEN: usize = 4 + 8;

/// Metadata record aligned with one row of the vector index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub source_document: String,
    pub chunk_index: usize,
    pub text: String,
    pub char_count: usize,
}

/// A chunk returned from vector search, with its similarity score.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub meta: ChunkMeta,
    pub similarity: f32,
}

#[derive(Debug)]
pub struct FlatIndex {
    dims: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    #[must_use]
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            data: Vec::new(),
        }
    }

    #[must_use]
    pub fn dims(&self) -> usize {
        self.dims
    }

    #[must_use]
    pub fn len(&self) -> usize {
        if self.dims == 0 {
            0
        } else {
            self.data.len() / self.dims
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append rows to the index. Every vector must match the index dims.
    pub fn add(&mut self, vectors: &[Vec<f32>]) {
        for vector in vectors {
            assert_eq!(
                vector.len(),
                self.dims,
                "vector dimension mismatch: expected {}, got {}",
                self.dims,
                vector.len()
            );
            self.data.extend_from_slice(vector);
        }
    }

    /// Top-k rows by inner product with `query`, highest score first.
    /// Returned ids are row positions, indexing into the aligned metadata.
    #[must_use]
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(f32, usize)> {
        assert_eq!(
            query.len(),
            self.dims,
            "query dimension mismatch: expected {}, got {}",
            self.dims,
            query.len()
        );

        let mut scored: Vec<(f32, usize)> = (0..self.len())
            .map(|i| {
                let row = &self.data[i * self.dims..(i + 1) * self.dims];
                let score: f32 = row.iter().zip(query).map(|(a, b)| a * b).sum();
                (score, i)
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }

    /// Persist the index as a little-endian binary blob, atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        bytes.extend_from_slice(&(self.dims as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.len() as u64).to_le_bytes());
        for value in &self.data {
            bytes.extend_from_slice(&value.to_le_bytes());
        }

        write_atomic(path, &bytes)?;
        info!(rows = self.len(), path = %path.display(), "saved vector index");
        Ok(())
    }

    /// Load a persisted index. A missing file maps to `IndexNotFound`;
    /// a truncated or inconsistent blob maps to `CorruptIndex`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RetrievalError::IndexNotFound {
                path: path.to_path_buf(),
            });
        }

        let bytes = fs::read(path)?;
        if bytes.len() < HEADER_LEN {
            return Err(RetrievalError::CorruptIndex {
                reason: format!("{} is shorter than the index header", path.display()),
            });
        }

        let dims = u32::from_le_bytes(bytes[0..4].try_into().expect("4-byte slice")) as usize;
        let count = u64::from_le_bytes(bytes[4..12].try_into().expect("8-byte slice")) as usize;

        let body = &bytes[HEADER_LEN..];
        let expected = count
            .checked_mul(dims)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| RetrievalError::CorruptIndex {
                reason: "index header declares an impossible row count".to_string(),
            })?;
        if body.len() != expected {
            return Err(RetrievalError::CorruptIndex {
                reason: format!(
                    "{}: expected {} data bytes for {} rows x {} dims, found {}",
                    path.display(),
                    expected,
                    count,
                    dims,
                    body.len()
                ),
            });
        }

        let data: Vec<f32> = body
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes(b.try_into().expect("4-byte chunk")))
            .collect();
        info!(rows = count, dims, path = %path.display(), "loaded vector index");
        Ok(Self { dims, data })
    }
}

/// Locations of the persisted index blob and its aligned metadata file.
#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub index: PathBuf,
    pub metadata: PathBuf,
}

impl IndexPaths {
    #[must_use]
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        Self {
            index: dir.join("vector_index.bin"),
            metadata: dir.join("metadata.json"),
        }
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.index.exists() && self.metadata.exists()
    }
}

/// Persist index and metadata together, each via atomic write-then-rename,
/// so readers never observe one file updated without the other.
pub fn save_pair(paths: &IndexPaths, index: &FlatIndex, metadata: &[ChunkMeta]) -> Result<()> {
    assert_eq!(
        index.len(),
        metadata.len(),
        "index rows and metadata length mismatch"
    );

    index.save(&paths.index)?;

    let json =
        serde_json::to_vec_pretty(metadata).map_err(|e| RetrievalError::CorruptIndex {
            reason: format!("failed to serialize metadata: {e}"),
        })?;
    write_atomic(&paths.metadata, &json)?;
    info!(entries = metadata.len(), path = %paths.metadata.display(), "saved chunk metadata");
    Ok(())
}

/// Load the index/metadata pair and verify positional alignment.
pub fn load_pair(paths: &IndexPaths) -> Result<(FlatIndex, Vec<ChunkMeta>)> {
    let index = FlatIndex::load(&paths.index)?;

    if !paths.metadata.exists() {
        return Err(RetrievalError::IndexNotFound {
            path: paths.metadata.clone(),
        });
    }
    let bytes = fs::read(&paths.metadata)?;
    let metadata: Vec<ChunkMeta> =
        serde_json::from_slice(&bytes).map_err(|e| RetrievalError::CorruptIndex {
            reason: format!("failed to parse {}: {e}", paths.metadata.display()),
        })?;

    if index.len() != metadata.len() {
        return Err(RetrievalError::CorruptIndex {
            reason: format!(
                "index has {} rows but metadata has {} entries",
                index.len(),
                metadata.len()
            ),
        });
    }

    Ok((index, metadata))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn meta(doc: &str, i: usize, text: &str) -> ChunkMeta {
        ChunkMeta {
            source_document: doc.to_string(),
            chunk_index: i,
            text: text.to_string(),
            char_count: text.chars().count(),
        }
    }

    #[test]
    fn test_search_orders_by_inner_product() {
        let mut index = FlatIndex::new(3);
        index.add(&[
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.7, 0.7, 0.0],
        ]);

        let results = index.search(&[1.0, 0.0, 0.0], 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].1, 0);
        assert!((results[0].0 - 1.0).abs() < 1e-6);
        assert_eq!(results[1].1, 2);
    }

    #[test]
    fn test_search_k_larger_than_index() {
        let mut index = FlatIndex::new(2);
        index.add(&[vec![1.0, 0.0]]);
        assert_eq!(index.search(&[1.0, 0.0], 10).len(), 1);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("idx.bin");

        let mut index = FlatIndex::new(4);
        index.add(&[vec![0.1, 0.2, 0.3, 0.4], vec![-1.0, 0.5, 0.0, 2.0]]);
        index.save(&path).unwrap();

        let loaded = FlatIndex::load(&path).unwrap();
        assert_eq!(loaded.dims(), 4);
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.data, index.data);
    }

    #[test]
    fn test_load_missing_is_index_not_found() {
        let dir = tempdir().unwrap();
        let err = FlatIndex::load(&dir.path().join("absent.bin")).unwrap_err();
        assert!(matches!(err, RetrievalError::IndexNotFound { .. }));
    }

    #[test]
    fn test_load_truncated_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("idx.bin");

        let mut index = FlatIndex::new(4);
        index.add(&[vec![0.1, 0.2, 0.3, 0.4]]);
        index.save(&path).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        bytes.truncate(bytes.len() - 3);
        fs::write(&path, &bytes).unwrap();

        let err = FlatIndex::load(&path).unwrap_err();
        assert!(matches!(err, RetrievalError::CorruptIndex { .. }));
    }

    #[test]
    fn test_pair_roundtrip_and_alignment_check() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());

        let mut index = FlatIndex::new(2);
        index.add(&[vec![1.0, 0.0], vec![0.0, 1.0]]);
        let metadata = vec![meta("a.md", 0, "first"), meta("a.md", 1, "second")];

        save_pair(&paths, &index, &metadata).unwrap();
        assert!(paths.exists());

        let (loaded, loaded_meta) = load_pair(&paths).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded_meta, metadata);

        // Shorten the metadata file behind the index's back.
        let json = serde_json::to_vec(&metadata[..1]).unwrap();
        fs::write(&paths.metadata, json).unwrap();
        let err = load_pair(&paths).unwrap_err();
        assert!(matches!(err, RetrievalError::CorruptIndex { .. }));
    }

    #[test]
    fn test_pair_missing_metadata_is_not_found() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());

        let mut index = FlatIndex::new(2);
        index.add(&[vec![1.0, 0.0]]);
        index.save(&paths.index).unwrap();

        let err = load_pair(&paths).unwrap_err();
        assert!(matches!(err, RetrievalError::IndexNotFound { .. }));
    }
}
