/// End-to-end integration tests for the hybrid retrieval pipeline.
///
/// Tests the complete flow:
///   build index -> load pair -> contribution store -> retrieve -> blend
use std::fs;
use std::sync::Arc;

use tempfile::tempdir;

use dualrag::builder::IndexBuilder;
use dualrag::embedder::mock::MockEmbedder;
use dualrag::error::RetrievalError;
use dualrag::index::{self, IndexPaths};
use dualrag::retrieval::{RetrievalOptions, Retriever};
use dualrag::store::memory::MemoryStore;
use dualrag::store::sqlite::SqliteStore;
use dualrag::store::{ApprovalState, ContributionStore, NewContribution};

fn write_corpus(dir: &std::path::Path) {
    fs::write(
        dir.join("steaming.md"),
        "# Milk Steaming\n\nStretch the milk for the first few seconds, then \
         submerge the tip and spin the milk into a whirlpool until it reaches \
         about 60 degrees.\n\nWipe and purge the wand immediately after use.",
    )
    .unwrap();
    fs::write(
        dir.join("espresso.md"),
        "# Dialing In\n\nStart from an 18 gram dose and a 36 gram yield in \
         about 28 seconds. Adjust the grind finer if the shot runs fast.",
    )
    .unwrap();
    fs::write(
        dir.join("maintenance.txt"),
        "Backflush the group head weekly with detergent. Descale monthly when \
         using hard water.",
    )
    .unwrap();
}

fn seed_contribution(
    store: &dyn ContributionStore,
    question: &str,
    answer: &str,
    rating: f32,
    approve: bool,
) -> i64 {
    let c = store
        .create(NewContribution {
            question: question.to_string(),
            answer: answer.to_string(),
            question_type: "technique".to_string(),
            rating,
        })
        .unwrap();
    if approve {
        store.update_approval(c.id, ApprovalState::Approved).unwrap();
    }
    c.id
}

/// Full pipeline: corpus -> index build -> retrieve with contributions.
#[tokio::test]
async fn test_full_pipeline() {
    let docs = tempdir().unwrap();
    let out = tempdir().unwrap();
    write_corpus(docs.path());

    let embedder = Arc::new(MockEmbedder::new(64));
    let paths = IndexPaths::new(out.path());

    let report = IndexBuilder::new(embedder.as_ref(), 200, 40, 100)
        .build(docs.path(), &paths, false)
        .unwrap();
    assert!(report.rebuilt);
    assert_eq!(report.documents, 3);
    assert!(report.chunks >= 3);

    let (flat_index, chunk_meta) = index::load_pair(&paths).unwrap();
    assert_eq!(flat_index.len(), chunk_meta.len());

    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let top_id = seed_contribution(
        &*store,
        "How to steam milk for a flat white?",
        "Use less stretch than for a cappuccino and aim for a glossy texture.",
        4.5,
        true,
    );
    seed_contribution(
        &*store,
        "Steam wand squeals",
        "The tip is too deep; raise it slightly.",
        3.5,
        true,
    );
    let pending_id = seed_contribution(&*store, "How to steam milk fast", "Crank it.", 5.0, false);

    let retriever = Retriever::new(
        embedder,
        flat_index,
        chunk_meta,
        Arc::clone(&store) as Arc<dyn ContributionStore>,
        RetrievalOptions::default(),
    )
    .unwrap();

    let result = retriever.retrieve("how to steam milk").await.unwrap();

    // Both sources contributed evidence.
    assert!(result.metadata.vector_count > 0);
    assert!(result.metadata.contribution_count > 0);
    assert!(!result.context.is_empty());

    // Pending contributions are never served.
    assert!(
        result
            .contribution_results
            .iter()
            .all(|m| m.contribution.id != pending_id)
    );

    // Contributions render before document chunks, regardless of mode.
    let contribution_pos = result.context.find("USER CONTRIBUTION").unwrap();
    let document_pos = result.context.find("DOCUMENT #1").unwrap();
    assert!(contribution_pos < document_pos);

    // Mode agrees with the quality comparison.
    let emphasized = result.metadata.contribution_quality > result.metadata.vector_quality;
    assert_eq!(
        result.context.contains("USER CONTRIBUTIONS (PRIORITIZED):"),
        emphasized
    );

    // Quality scores stay in range.
    assert!((0.0..=1.0).contains(&result.metadata.vector_quality));
    assert!((0.0..=1.0).contains(&result.metadata.contribution_quality));

    // The top match got its usage counted.
    assert!(store.get(top_id).unwrap().usage_count > 0);

    // Sources cover both kinds.
    assert!(result.sources.iter().any(|s| s.contribution_id.is_some()));
    assert!(result.sources.iter().any(|s| s.contribution_id.is_none()));
}

/// Querying without a persisted index surfaces a remediation hint.
#[test]
fn test_missing_index_is_actionable() {
    let out = tempdir().unwrap();
    let err = index::load_pair(&IndexPaths::new(out.path())).unwrap_err();
    assert!(matches!(err, RetrievalError::IndexNotFound { .. }));
    assert!(err.to_string().contains("dualrag index"));
}

/// Zero hits from both sources is a success, not an error.
#[tokio::test]
async fn test_empty_results_are_success() {
    let docs = tempdir().unwrap();
    let out = tempdir().unwrap();
    write_corpus(docs.path());

    let embedder = Arc::new(MockEmbedder::new(64));
    let paths = IndexPaths::new(out.path());
    IndexBuilder::new(embedder.as_ref(), 200, 40, 100)
        .build(docs.path(), &paths, false)
        .unwrap();
    let (flat_index, chunk_meta) = index::load_pair(&paths).unwrap();

    // A threshold nothing can reach, and an empty store.
    let options = RetrievalOptions {
        similarity_threshold: 2.0,
        ..RetrievalOptions::default()
    };
    let retriever = Retriever::new(
        embedder,
        flat_index,
        chunk_meta,
        Arc::new(MemoryStore::new()),
        options,
    )
    .unwrap();

    let result = retriever.retrieve("how to steam milk").await.unwrap();
    assert_eq!(result.context, "");
    assert_eq!(result.metadata.vector_count, 0);
    assert_eq!(result.metadata.contribution_count, 0);
    assert!(result.metadata.message.contains("No relevant information"));
}

/// Whitespace-only queries are rejected before touching any collaborator.
#[tokio::test]
async fn test_invalid_query() {
    let embedder = Arc::new(MockEmbedder::new(16));
    let retriever = Retriever::new(
        embedder,
        dualrag::index::FlatIndex::new(16),
        Vec::new(),
        Arc::new(MemoryStore::new()),
        RetrievalOptions::default(),
    )
    .unwrap();

    let err = retriever.retrieve(" \t ").await.unwrap_err();
    assert!(matches!(err, RetrievalError::InvalidQuery));
}

/// Contribution lifecycle against the SQLite backend on disk.
#[test]
fn test_sqlite_store_persists_across_reopen() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("contributions.db");

    let id = {
        let store = SqliteStore::open(&db_path).unwrap();
        let id = seed_contribution(
            &store,
            "How long to rest fresh beans?",
            "Five to ten days after roast for espresso.",
            4.0,
            true,
        );
        store.increment_usage(id).unwrap();
        id
    };

    let store = SqliteStore::open(&db_path).unwrap();
    let contribution = store.get(id).unwrap();
    assert_eq!(contribution.approval, ApprovalState::Approved);
    assert_eq!(contribution.usage_count, 1);
    assert!(!contribution.keywords.is_empty());

    // Moderation outcomes stay terminal across reopen.
    assert!(store.update_approval(id, ApprovalState::Rejected).is_err());
}

/// Rebuild semantics: untouched without force, replaced wholesale with it.
#[test]
fn test_rebuild_replaces_wholesale() {
    let docs = tempdir().unwrap();
    let out = tempdir().unwrap();
    write_corpus(docs.path());

    let embedder = MockEmbedder::new(32);
    let paths = IndexPaths::new(out.path());
    let builder = IndexBuilder::new(&embedder, 200, 40, 100);

    builder.build(docs.path(), &paths, false).unwrap();
    let (first, _) = index::load_pair(&paths).unwrap();

    // Shrink the corpus, rebuild with force; the pair reflects only the
    // remaining documents.
    fs::remove_file(docs.path().join("espresso.md")).unwrap();
    fs::remove_file(docs.path().join("maintenance.txt")).unwrap();
    let report = builder.build(docs.path(), &paths, true).unwrap();
    assert!(report.rebuilt);
    assert_eq!(report.documents, 1);

    let (second, meta) = index::load_pair(&paths).unwrap();
    assert!(second.len() < first.len());
    assert!(meta.iter().all(|m| m.source_document == "steaming.md"));
}
