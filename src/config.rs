/// Configuration module.
///
/// Handles loading, validating, and providing default configuration values
/// for the indexing and retrieval pipelines.
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::index::IndexPaths;
use crate::retrieval::RetrievalOptions;

// ── Default value functions ──────────────────────────────────────────

fn default_docs_dir() -> String {
    "./documents".to_string()
}

fn default_index_dir() -> String {
    "./indexes".to_string()
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_batch_size() -> usize {
    100
}

fn default_search_top_k() -> usize {
    5
}

fn default_similarity_threshold() -> f32 {
    0.0
}

fn default_contribution_limit() -> usize {
    5
}

fn default_min_rating() -> f32 {
    0.0
}

fn default_store_backend() -> StoreBackend {
    StoreBackend::Sqlite
}

fn default_db_path() -> String {
    "./contributions.db".to_string()
}

fn default_embedder_backend() -> EmbedderBackend {
    EmbedderBackend::Http
}

fn default_model_name() -> String {
    "all-MiniLM-L6-v2".to_string()
}

fn default_dimensions() -> usize {
    384
}

fn default_endpoint() -> String {
    "http://localhost:8080/v1".to_string()
}

fn default_embed_timeout_secs() -> u64 {
    30
}

fn default_scan_timeout_secs() -> u64 {
    10
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_docs_dir")]
    pub docs_dir: String,

    #[serde(default = "default_index_dir")]
    pub index_dir: String,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_search_top_k")]
    pub search_top_k: usize,

    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    #[serde(default = "default_contribution_limit")]
    pub contribution_limit: usize,

    #[serde(default = "default_min_rating")]
    pub min_rating: f32,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// Contribution store backend, chosen once at startup. There is no runtime
/// fallback between backends.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_backend")]
    pub backend: StoreBackend,

    #[serde(default = "default_db_path")]
    pub db_path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderBackend {
    /// OpenAI-compatible embeddings endpoint.
    Http,
    /// Deterministic hash embedder, offline smoke runs only.
    Mock,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_embedder_backend")]
    pub backend: EmbedderBackend,

    #[serde(default = "default_model_name")]
    pub name: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TimeoutConfig {
    #[serde(default = "default_embed_timeout_secs")]
    pub embed_secs: u64,

    #[serde(default = "default_scan_timeout_secs")]
    pub lexical_scan_secs: u64,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            docs_dir: default_docs_dir(),
            index_dir: default_index_dir(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            batch_size: default_batch_size(),
            search_top_k: default_search_top_k(),
            similarity_threshold: default_similarity_threshold(),
            contribution_limit: default_contribution_limit(),
            min_rating: default_min_rating(),
            store: StoreConfig::default(),
            model: ModelConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            db_path: default_db_path(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: default_embedder_backend(),
            name: default_model_name(),
            dimensions: default_dimensions(),
            endpoint: default_endpoint(),
            api_key: None,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            embed_secs: default_embed_timeout_secs(),
            lexical_scan_secs: default_scan_timeout_secs(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"config.json"`.
    /// If the file does not exist, returns a default config and generates
    /// a template file for the default path.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            "config.json"
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == "config.json" {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config {path}: {e}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)
            .map_err(|e| anyhow::anyhow!("failed to write config {path}: {e}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.chunk_size > 0, "chunk_size must be positive");
        anyhow::ensure!(self.batch_size > 0, "batch_size must be positive");
        anyhow::ensure!(self.search_top_k > 0, "search_top_k must be positive");
        anyhow::ensure!(
            self.model.dimensions > 0,
            "model.dimensions must be positive"
        );
        anyhow::ensure!(!self.docs_dir.is_empty(), "docs_dir must be set");
        anyhow::ensure!(
            (0.0..=5.0).contains(&self.min_rating),
            "min_rating must be within [0, 5]"
        );
        anyhow::ensure!(
            self.similarity_threshold <= 1.0,
            "similarity_threshold above 1.0 can never match"
        );
        Ok(())
    }

    #[must_use]
    pub fn index_paths(&self) -> IndexPaths {
        IndexPaths::new(PathBuf::from(&self.index_dir))
    }

    #[must_use]
    pub fn retrieval_options(&self) -> RetrievalOptions {
        RetrievalOptions {
            top_k: self.search_top_k,
            similarity_threshold: self.similarity_threshold,
            contribution_limit: self.contribution_limit,
            min_rating: self.min_rating,
            include_contributions: true,
            embed_timeout: Duration::from_secs(self.timeouts.embed_secs),
            scan_timeout: Duration::from_secs(self.timeouts.lexical_scan_secs),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
