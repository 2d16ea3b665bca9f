/// Retrieval entry point: embeds the query, searches the vector index and
/// the contribution store, scores both result sets, and composes the
/// blended context.
///
/// Collaborators are injected at construction; nothing here owns global
/// state. The lexical scan runs concurrently with the embed + vector-search
/// chain (they touch disjoint resources) and both finish before quality
/// assessment.
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::composer::{self, RenderMode, SourceRef};
use crate::embedder::{Embedder, EmbedderError, normalize_rows};
use crate::error::{Result, RetrievalError};
use crate::index::{ChunkMeta, FlatIndex, ScoredChunk};
use crate::matcher::{self, ContributionMatch, LexicalMatcher};
use crate::quality;
use crate::store::ContributionStore;

#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    pub top_k: usize,
    pub similarity_threshold: f32,
    pub contribution_limit: usize,
    pub min_rating: f32,
    pub include_contributions: bool,
    /// Deadline for the embedding call; expiry fails the request.
    pub embed_timeout: Duration,
    /// Deadline for the lexical scan; expiry degrades to no contributions.
    pub scan_timeout: Duration,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            similarity_threshold: 0.0,
            contribution_limit: 5,
            min_rating: 0.0,
            include_contributions: true,
            embed_timeout: Duration::from_secs(30),
            scan_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalMetadata {
    pub vector_count: usize,
    pub contribution_count: usize,
    pub vector_quality: f32,
    pub contribution_quality: f32,
    pub mode: RenderMode,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct RetrievalResult {
    pub vector_results: Vec<ScoredChunk>,
    pub contribution_results: Vec<ContributionMatch>,
    /// Blended context text; empty means "no context available".
    pub context: String,
    pub sources: Vec<SourceRef>,
    pub metadata: RetrievalMetadata,
}

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<FlatIndex>,
    chunk_meta: Arc<Vec<ChunkMeta>>,
    store: Arc<dyn ContributionStore>,
    options: RetrievalOptions,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("index", &self.index)
            .field("chunk_meta", &self.chunk_meta)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: FlatIndex,
        chunk_meta: Vec<ChunkMeta>,
        store: Arc<dyn ContributionStore>,
        options: RetrievalOptions,
    ) -> Result<Self> {
        if index.dims() != embedder.dimensions() {
            return Err(RetrievalError::CorruptIndex {
                reason: format!(
                    "index dimensionality {} does not match embedder dimensionality {}",
                    index.dims(),
                    embedder.dimensions()
                ),
            });
        }

        Ok(Self {
            embedder,
            index: Arc::new(index),
            chunk_meta: Arc::new(chunk_meta),
            store,
            options,
        })
    }

    /// Answer a question with a blended context from both sources.
    ///
    /// Finding nothing above threshold is a success with empty result sets
    /// and an explanatory message, not an error.
    pub async fn retrieve(&self, question: &str) -> Result<RetrievalResult> {
        if matcher::normalize_text(question).is_empty() {
            return Err(RetrievalError::InvalidQuery);
        }

        // The lexical scan does not depend on the embedding; start it first
        // and collect it after the vector side finishes.
        let lexical_handle = {
            let store = Arc::clone(&self.store);
            let query = question.to_string();
            let limit = self.options.contribution_limit;
            let min_rating = self.options.min_rating;
            let include = self.options.include_contributions;
            tokio::task::spawn_blocking(move || {
                if !include {
                    return Ok(Vec::new());
                }
                LexicalMatcher::new(store).search(&query, limit, min_rating)
            })
        };

        let query_vector = self.embed_query(question).await?;
        let vector_results = self.vector_search(&query_vector);

        let scan_secs = self.options.scan_timeout.as_secs();
        let contribution_results = match timeout(self.options.scan_timeout, lexical_handle).await {
            Err(_) => {
                warn!("lexical scan did not finish within {scan_secs}s, continuing without contributions");
                Vec::new()
            }
            Ok(Err(join_error)) => {
                warn!("lexical scan task failed: {join_error}");
                Vec::new()
            }
            Ok(Ok(Err(store_error))) => {
                warn!("contribution search failed: {store_error}");
                Vec::new()
            }
            Ok(Ok(Ok(matches))) => matches,
        };

        let vector_quality = quality::vector_quality(&vector_results);
        let contribution_quality = quality::contribution_quality(&contribution_results);
        let mode = composer::decide_mode(
            vector_quality,
            contribution_quality,
            !contribution_results.is_empty(),
        );
        let composed = composer::compose(&vector_results, &contribution_results, mode);

        info!(
            vector = vector_results.len(),
            contributions = contribution_results.len(),
            vector_quality,
            contribution_quality,
            ?mode,
            "retrieval complete"
        );

        Ok(RetrievalResult {
            metadata: RetrievalMetadata {
                vector_count: vector_results.len(),
                contribution_count: contribution_results.len(),
                vector_quality,
                contribution_quality,
                mode,
                message: recommendation(vector_results.len(), contribution_results.len()),
            },
            context: composed.text,
            sources: composed.sources,
            vector_results,
            contribution_results,
        })
    }

    async fn embed_query(&self, question: &str) -> Result<Vec<f32>> {
        let embedder = Arc::clone(&self.embedder);
        let text = question.to_string();
        let handle = tokio::task::spawn_blocking(move || {
            let mut rows = vec![embedder.embed(&text)?];
            normalize_rows(&mut rows);
            Ok::<_, EmbedderError>(rows.remove(0))
        });

        let secs = self.options.embed_timeout.as_secs();
        match timeout(self.options.embed_timeout, handle).await {
            Err(_) => Err(RetrievalError::Timeout {
                stage: "embedding",
                secs,
            }),
            Ok(Err(join_error)) => Err(RetrievalError::Embedding(EmbedderError::RequestFailed(
                format!("embedding task failed: {join_error}"),
            ))),
            Ok(Ok(result)) => result.map_err(RetrievalError::from),
        }
    }

    fn vector_search(&self, query_vector: &[f32]) -> Vec<ScoredChunk> {
        let hits = self.index.search(query_vector, self.options.top_k);

        let mut results = Vec::new();
        for (score, id) in hits {
            // Never dereference an id the metadata cannot account for;
            // it would mean the index and metadata are out of sync.
            if id >= self.chunk_meta.len() {
                warn!(id, "vector index returned id beyond metadata range, discarding");
                continue;
            }
            if score >= self.options.similarity_threshold {
                results.push(ScoredChunk {
                    meta: self.chunk_meta[id].clone(),
                    similarity: score,
                });
            }
        }
        results
    }
}

fn recommendation(vector_count: usize, contribution_count: usize) -> String {
    match (vector_count > 0, contribution_count > 0) {
        (false, false) => "No relevant information found. Consider rephrasing your question or adding more specific keywords.".to_string(),
        (true, true) => "Found both original documentation and user contributions for comprehensive answers.".to_string(),
        (true, false) => "Found relevant information in the original documentation.".to_string(),
        (false, true) => "Found user contributions that may help answer your question.".to_string(),
    }
}
