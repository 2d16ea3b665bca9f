use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use dualrag::builder::IndexBuilder;
use dualrag::config::{Config, EmbedderBackend, StoreBackend};
use dualrag::embedder::http::HttpEmbedder;
use dualrag::embedder::mock::MockEmbedder;
use dualrag::embedder::Embedder;
use dualrag::index;
use dualrag::retrieval::Retriever;
use dualrag::store::memory::MemoryStore;
use dualrag::store::sqlite::SqliteStore;
use dualrag::store::{ApprovalState, ContributionStore, NewContribution};

#[derive(Parser)]
#[command(name = "dualrag", version, about = "Hybrid document + contribution retrieval")]
struct Cli {
    /// Path to the config file
    #[arg(short, long, default_value = "config.json")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the vector index from the document corpus
    Index {
        /// Rebuild even if a persisted index already exists
        #[arg(long)]
        force: bool,
        /// Override the configured documents directory
        #[arg(long)]
        docs_dir: Option<String>,
        /// Override the configured embedding batch size
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Retrieve a blended context for a question
    Query {
        question: String,
        /// Max vector results
        #[arg(long)]
        top_k: Option<usize>,
        /// Minimum similarity for vector results
        #[arg(long)]
        threshold: Option<f32>,
        /// Max contribution results
        #[arg(long)]
        limit: Option<usize>,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Submit a contribution (enters moderation as pending)
    Contribute {
        #[arg(long)]
        question: String,
        #[arg(long)]
        answer: String,
        #[arg(long, default_value = "general")]
        question_type: String,
        #[arg(long, default_value_t = 0.0)]
        rating: f32,
    },
    /// List contributions awaiting moderation
    Pending,
    /// Approve or reject a pending contribution
    Moderate {
        id: i64,
        #[arg(value_enum)]
        action: ModerateAction,
    },
    /// Show contribution store statistics
    Stats,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModerateAction {
    Approve,
    Reject,
}

fn build_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    match config.model.backend {
        EmbedderBackend::Mock => Ok(Arc::new(MockEmbedder::new(config.model.dimensions))),
        EmbedderBackend::Http => {
            let embedder = HttpEmbedder::new(
                &config.model.endpoint,
                &config.model.name,
                config.model.dimensions,
                config.model.api_key.as_deref(),
                Duration::from_secs(config.timeouts.embed_secs),
            )
            .context("failed to build embedding client")?;
            Ok(Arc::new(embedder))
        }
    }
}

fn open_store(config: &Config) -> Result<Arc<dyn ContributionStore>> {
    match config.store.backend {
        StoreBackend::Sqlite => {
            let store = SqliteStore::open(&config.store.db_path)
                .context("failed to open contribution store")?;
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    config.validate()?;

    match cli.command {
        Command::Index {
            force,
            docs_dir,
            batch_size,
        } => {
            let embedder = build_embedder(&config)?;
            let builder = IndexBuilder::new(
                embedder.as_ref(),
                config.chunk_size,
                config.chunk_overlap,
                batch_size.unwrap_or(config.batch_size),
            );
            let docs_dir = docs_dir.unwrap_or_else(|| config.docs_dir.clone());

            let report = builder.build(&docs_dir, &config.index_paths(), force)?;
            if report.rebuilt {
                println!(
                    "Indexed {} documents into {} chunks ({} skipped)",
                    report.documents, report.chunks, report.skipped_documents
                );
            } else {
                println!("Index already exists; pass --force to rebuild");
            }
        }

        Command::Query {
            question,
            top_k,
            threshold,
            limit,
            json,
        } => {
            let (flat_index, chunk_meta) = index::load_pair(&config.index_paths())?;
            let embedder = build_embedder(&config)?;
            let store = open_store(&config)?;

            let mut options = config.retrieval_options();
            if let Some(k) = top_k {
                options.top_k = k;
            }
            if let Some(t) = threshold {
                options.similarity_threshold = t;
            }
            if let Some(l) = limit {
                options.contribution_limit = l;
            }

            let retriever = Retriever::new(embedder, flat_index, chunk_meta, store, options)?;
            let result = retriever.retrieve(&question).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else if result.context.is_empty() {
                println!("{}", result.metadata.message);
            } else {
                println!("{}", result.context);
                println!();
                println!(
                    "-- {} document chunks, {} contributions | quality {:.2} / {:.2} | mode: {:?}",
                    result.metadata.vector_count,
                    result.metadata.contribution_count,
                    result.metadata.vector_quality,
                    result.metadata.contribution_quality,
                    result.metadata.mode
                );
            }
        }

        Command::Contribute {
            question,
            answer,
            question_type,
            rating,
        } => {
            let store = open_store(&config)?;
            let contribution = store.create(NewContribution {
                question,
                answer,
                question_type,
                rating,
            })?;
            println!(
                "Stored contribution {} (pending moderation)",
                contribution.id
            );
        }

        Command::Pending => {
            let store = open_store(&config)?;
            let pending = store.list_pending()?;
            if pending.is_empty() {
                println!("No contributions awaiting moderation");
            }
            for c in pending {
                println!("#{} [{}] {}", c.id, c.question_type, c.question);
            }
        }

        Command::Moderate { id, action } => {
            let store = open_store(&config)?;
            let state = match action {
                ModerateAction::Approve => ApprovalState::Approved,
                ModerateAction::Reject => ApprovalState::Rejected,
            };
            let updated = store.update_approval(id, state)?;
            println!("Contribution {} is now {}", updated.id, updated.approval);
        }

        Command::Stats => {
            let store = open_store(&config)?;
            let stats = store.stats()?;
            println!(
                "{} contributions: {} approved, {} pending, {} rejected (avg rating {:.2})",
                stats.total, stats.approved, stats.pending, stats.rejected, stats.average_rating
            );
            let top = store.top_rated(3)?;
            if !top.is_empty() {
                println!("Top rated:");
                for c in top {
                    println!(
                        "  #{} {:.1}/5.0 ({} uses) {}",
                        c.id, c.rating, c.usage_count, c.question
                    );
                }
            }
        }
    }

    Ok(())
}
