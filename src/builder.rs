/// Batch indexing pipeline: extract -> chunk -> embed -> index -> persist.
///
/// Linear, no retries across stages. Per-document extraction failures are
/// logged and skipped; a build that yields zero chunks overall fails with
/// `NoContentExtracted`. Persistence is all-or-nothing: an existing index
/// is left untouched unless forced or absent.
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::chunker;
use crate::embedder::{Embedder, EmbedderError, normalize_rows};
use crate::error::{Result, RetrievalError};
use crate::extract;
use crate::index::{ChunkMeta, FlatIndex, IndexPaths, save_pair};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub rebuilt: bool,
    pub documents: usize,
    pub skipped_documents: usize,
    pub chunks: usize,
}

pub struct IndexBuilder<'a, E: Embedder + ?Sized> {
    embedder: &'a E,
    chunk_size: usize,
    overlap: usize,
    batch_size: usize,
}

impl<'a, E: Embedder + ?Sized> IndexBuilder<'a, E> {
    pub fn new(embedder: &'a E, chunk_size: usize, overlap: usize, batch_size: usize) -> Self {
        Self {
            embedder,
            chunk_size,
            overlap,
            batch_size: batch_size.max(1),
        }
    }

    pub fn build<P: AsRef<Path>>(
        &self,
        docs_dir: P,
        paths: &IndexPaths,
        force_rebuild: bool,
    ) -> Result<BuildReport> {
        let docs_dir = docs_dir.as_ref();

        if paths.exists() && !force_rebuild {
            info!(
                "index already exists at {}, skipping build (use force to rebuild)",
                paths.index.display()
            );
            return Ok(BuildReport::default());
        }

        let files = discover_documents(docs_dir);
        info!(files = files.len(), dir = %docs_dir.display(), "starting index build");

        let mut report = BuildReport {
            rebuilt: true,
            ..BuildReport::default()
        };
        let mut texts: Vec<String> = Vec::new();
        let mut metadata: Vec<ChunkMeta> = Vec::new();

        for file in files {
            let text = match extract::extract_text(&file) {
                Ok(text) => text,
                Err(e) => {
                    warn!("skipping {}: {e:#}", file.display());
                    report.skipped_documents += 1;
                    continue;
                }
            };

            let chunks = chunker::chunk_text(&text, self.chunk_size, self.overlap);
            if chunks.is_empty() {
                warn!("no text content in {}, skipping", file.display());
                report.skipped_documents += 1;
                continue;
            }

            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.display().to_string());
            for (chunk_index, chunk) in chunks.into_iter().enumerate() {
                metadata.push(ChunkMeta {
                    source_document: name.clone(),
                    chunk_index,
                    char_count: chunk.chars().count(),
                    text: chunk.clone(),
                });
                texts.push(chunk);
            }
            report.documents += 1;
        }

        if texts.is_empty() {
            return Err(RetrievalError::NoContentExtracted);
        }
        report.chunks = texts.len();

        let vectors = self.embed_corpus(&texts)?;

        let mut index = FlatIndex::new(self.embedder.dimensions());
        index.add(&vectors);
        save_pair(paths, &index, &metadata)?;

        info!(
            documents = report.documents,
            chunks = report.chunks,
            "index build complete"
        );
        Ok(report)
    }

    /// Embed all chunks in fixed-size batches (memory bounding only), then
    /// normalize once across the whole corpus so similarity scales stay
    /// consistent between batches.
    fn embed_corpus(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let bar = ProgressBar::new(texts.len() as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("  {bar:40.cyan/blue} {pos}/{len} chunks")
                .expect("valid template"),
        );

        let dims = self.embedder.dimensions();
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let refs: Vec<&str> = batch.iter().map(String::as_str).collect();
            let batch_vectors = self.embedder.embed_batch(&refs)?;

            if batch_vectors.len() != refs.len() {
                return Err(RetrievalError::Embedding(EmbedderError::ShapeMismatch {
                    expected: refs.len(),
                    got: batch_vectors.len(),
                }));
            }
            for vector in &batch_vectors {
                if vector.len() != dims {
                    return Err(RetrievalError::Embedding(
                        EmbedderError::DimensionMismatch {
                            expected: dims,
                            got: vector.len(),
                        },
                    ));
                }
            }

            vectors.extend(batch_vectors);
            bar.inc(refs.len() as u64);
        }
        bar.finish_and_clear();

        normalize_rows(&mut vectors);
        Ok(vectors)
    }
}

fn discover_documents(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkBuilder::new(dir)
        .hidden(false)
        .build()
        .filter_map(|e| e.ok())
        .map(ignore::DirEntry::into_path)
        .filter(|p| p.is_file() && extract::is_supported(p))
        .collect();
    // Deterministic chunk ordering across rebuilds.
    files.sort();
    files
}
