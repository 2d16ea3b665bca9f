/// Error taxonomy for the retrieval pipeline.
///
/// Pipeline-level failures propagate as typed variants; per-item failures
/// (a document that fails extraction, a usage increment that fails) are
/// logged and skipped at the call site instead of surfacing here.
use std::path::PathBuf;

use thiserror::Error;

use crate::embedder::EmbedderError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("vector index not found at {}: run `dualrag index` to build it", .path.display())]
    IndexNotFound { path: PathBuf },

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedderError),

    #[error("no usable text extracted from any document")]
    NoContentExtracted,

    #[error("query is empty after normalization")]
    InvalidQuery,

    #[error("{stage} did not complete within {secs}s")]
    Timeout { stage: &'static str, secs: u64 },

    #[error("contribution store error: {0}")]
    Store(#[from] StoreError),

    #[error("persisted index is unusable: {reason}")]
    CorruptIndex { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RetrievalError>;
