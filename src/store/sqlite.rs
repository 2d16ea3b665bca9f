/// SQLite-backed contribution store.
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;

use super::{
    ApprovalState, Contribution, ContributionStore, NewContribution, StoreError, StoreStats,
    check_transition, clamp_rating, derive_keywords, question_hash,
};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS contributions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    question TEXT NOT NULL,
    answer TEXT NOT NULL,
    question_type TEXT NOT NULL DEFAULT 'general',
    rating REAL NOT NULL DEFAULT 0.0,
    usage_count INTEGER NOT NULL DEFAULT 0,
    approval TEXT NOT NULL DEFAULT 'pending',
    keywords TEXT NOT NULL DEFAULT '[]',
    content_hash TEXT NOT NULL,
    created_at DATETIME NOT NULL,
    updated_at DATETIME NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_contrib_approval ON contributions(approval);
CREATE INDEX IF NOT EXISTS idx_contrib_rating ON contributions(rating);
CREATE INDEX IF NOT EXISTS idx_contrib_hash ON contributions(content_hash);

CREATE VIRTUAL TABLE IF NOT EXISTS contributions_fts USING fts5(
    question, answer, content='contributions', content_rowid='id'
);

CREATE TRIGGER IF NOT EXISTS contributions_ai AFTER INSERT ON contributions BEGIN
    INSERT INTO contributions_fts(rowid, question, answer)
    VALUES (new.id, new.question, new.answer);
END;

CREATE TRIGGER IF NOT EXISTS contributions_ad AFTER DELETE ON contributions BEGIN
    INSERT INTO contributions_fts(contributions_fts, rowid, question, answer)
    VALUES ('delete', old.id, old.question, old.answer);
END;

CREATE TRIGGER IF NOT EXISTS contributions_au AFTER UPDATE ON contributions BEGIN
    INSERT INTO contributions_fts(contributions_fts, rowid, question, answer)
    VALUES ('delete', old.id, old.question, old.answer);
    INSERT INTO contributions_fts(rowid, question, answer)
    VALUES (new.id, new.question, new.answer);
END;
"#;

const CONTRIBUTION_COLUMNS: &str = "id, question, answer, question_type, rating, usage_count, \
     approval, keywords, content_hash, created_at, updated_at";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

fn map_contribution_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Contribution> {
    let approval_str: String = row.get(6)?;
    let approval = ApprovalState::parse(&approval_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            rusqlite::types::Type::Text,
            format!("unknown approval state: {approval_str}").into(),
        )
    })?;

    let keywords_json: String = row.get(7)?;
    let keywords: Vec<String> = serde_json::from_str(&keywords_json).unwrap_or_default();

    Ok(Contribution {
        id: row.get(0)?,
        question: row.get(1)?,
        answer: row.get(2)?,
        question_type: row.get(3)?,
        rating: row.get::<_, f64>(4)? as f32,
        usage_count: row.get::<_, i64>(5)? as u64,
        approval,
        keywords,
        content_hash: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

/// Strip FTS5 operators from a raw query: each whitespace token is reduced
/// to its alphanumeric characters and quoted, joined with OR.
fn fts_match_expr(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|t| t.chars().filter(|c| c.is_alphanumeric()).collect::<String>())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

impl SqliteStore {
    /// Open (or create) the store at the given path and initialize the schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        info!("opening contribution store: {}", path.display());
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an in-memory store (used in tests).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection mutex poisoned".to_string()))
    }
}

impl ContributionStore for SqliteStore {
    fn create(&self, new: NewContribution) -> Result<Contribution, StoreError> {
        let now = Utc::now();
        let keywords = derive_keywords(&new.question);
        let keywords_json = serde_json::to_string(&keywords)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let hash = question_hash(&new.question);
        let rating = clamp_rating(new.rating);

        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO contributions
                (question, answer, question_type, rating, usage_count, approval,
                 keywords, content_hash, created_at, updated_at)
            VALUES (?, ?, ?, ?, 0, 'pending', ?, ?, ?, ?)
            "#,
            params![
                new.question,
                new.answer,
                new.question_type,
                rating as f64,
                keywords_json,
                hash,
                now,
                now
            ],
        )?;
        let id = conn.last_insert_rowid();

        Ok(Contribution {
            id,
            question: new.question,
            answer: new.answer,
            question_type: new.question_type,
            rating,
            usage_count: 0,
            approval: ApprovalState::Pending,
            keywords,
            content_hash: hash,
            created_at: now,
            updated_at: now,
        })
    }

    fn get(&self, id: i64) -> Result<Contribution, StoreError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {CONTRIBUTION_COLUMNS} FROM contributions WHERE id = ?"),
            params![id],
            map_contribution_row,
        )
        .optional()?
        .ok_or(StoreError::NotFound(id))
    }

    fn list_approved(&self, min_rating: f32) -> Result<Vec<Contribution>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CONTRIBUTION_COLUMNS} FROM contributions \
             WHERE approval = 'approved' AND rating >= ? \
             ORDER BY rating DESC, usage_count DESC"
        ))?;
        let rows = stmt.query_map(params![min_rating as f64], map_contribution_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn list_pending(&self) -> Result<Vec<Contribution>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CONTRIBUTION_COLUMNS} FROM contributions \
             WHERE approval = 'pending' ORDER BY created_at ASC"
        ))?;
        let rows = stmt.query_map([], map_contribution_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn update_approval(
        &self,
        id: i64,
        state: ApprovalState,
    ) -> Result<Contribution, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let current: Option<String> = tx
            .query_row(
                "SELECT approval FROM contributions WHERE id = ?",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let current = current.ok_or(StoreError::NotFound(id))?;
        let from = ApprovalState::parse(&current)
            .ok_or_else(|| StoreError::Database(format!("unknown approval state: {current}")))?;

        check_transition(from, state)?;

        tx.execute(
            "UPDATE contributions SET approval = ?, updated_at = ? WHERE id = ?",
            params![state.as_str(), Utc::now(), id],
        )?;
        let updated = tx.query_row(
            &format!("SELECT {CONTRIBUTION_COLUMNS} FROM contributions WHERE id = ?"),
            params![id],
            map_contribution_row,
        )?;
        tx.commit()?;
        Ok(updated)
    }

    fn increment_usage(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.conn()?;
        // Single UPDATE so concurrent identical queries never lose increments.
        let rows = conn.execute(
            "UPDATE contributions \
             SET usage_count = usage_count + 1, updated_at = ? WHERE id = ?",
            params![Utc::now(), id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    fn supports_full_text(&self) -> bool {
        true
    }

    fn full_text_search(&self, query: &str, limit: usize) -> Result<Vec<Contribution>, StoreError> {
        let Some(expr) = fts_match_expr(query) else {
            return Ok(Vec::new());
        };

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CONTRIBUTION_COLUMNS} FROM contributions \
             WHERE id IN (SELECT rowid FROM contributions_fts WHERE contributions_fts MATCH ?) \
             AND approval = 'approved' \
             LIMIT ?"
        ))?;
        let rows = stmt.query_map(params![expr, limit as i64], map_contribution_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn top_rated(&self, limit: usize) -> Result<Vec<Contribution>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CONTRIBUTION_COLUMNS} FROM contributions \
             WHERE approval = 'approved' \
             ORDER BY rating DESC, usage_count DESC LIMIT ?"
        ))?;
        let rows = stmt.query_map(params![limit as i64], map_contribution_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn stats(&self) -> Result<StoreStats, StoreError> {
        let conn = self.conn()?;
        let stats = conn.query_row(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(CASE WHEN approval = 'approved' THEN 1 ELSE 0 END), 0),
                   COALESCE(SUM(CASE WHEN approval = 'pending' THEN 1 ELSE 0 END), 0),
                   COALESCE(SUM(CASE WHEN approval = 'rejected' THEN 1 ELSE 0 END), 0),
                   COALESCE(AVG(rating), 0.0)
            FROM contributions
            "#,
            [],
            |row| {
                Ok(StoreStats {
                    total: row.get::<_, i64>(0)? as u64,
                    approved: row.get::<_, i64>(1)? as u64,
                    pending: row.get::<_, i64>(2)? as u64,
                    rejected: row.get::<_, i64>(3)? as u64,
                    average_rating: row.get::<_, f64>(4)? as f32,
                })
            },
        )?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(question: &str, answer: &str, rating: f32) -> NewContribution {
        NewContribution {
            question: question.to_string(),
            answer: answer.to_string(),
            question_type: "general".to_string(),
            rating,
        }
    }

    #[test]
    fn test_create_starts_pending_with_derived_fields() {
        let store = SqliteStore::open_in_memory().unwrap();
        let contrib = store
            .create(sample("How to steam milk?", "Use 60-65C steam.", 4.0))
            .unwrap();

        assert_eq!(contrib.approval, ApprovalState::Pending);
        assert_eq!(contrib.usage_count, 0);
        assert!(contrib.keywords.contains(&"steam".to_string()));
        assert_eq!(contrib.content_hash.len(), 64);

        let fetched = store.get(contrib.id).unwrap();
        assert_eq!(fetched.question, "How to steam milk?");
    }

    #[test]
    fn test_pending_excluded_from_approved_listing() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store.create(sample("q1", "a1", 3.0)).unwrap();
        let _b = store.create(sample("q2", "a2", 5.0)).unwrap();

        assert!(store.list_approved(0.0).unwrap().is_empty());

        store.update_approval(a.id, ApprovalState::Approved).unwrap();
        let approved = store.list_approved(0.0).unwrap();
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].id, a.id);
    }

    #[test]
    fn test_listing_ordered_by_rating_then_usage() {
        let store = SqliteStore::open_in_memory().unwrap();
        let low = store.create(sample("low", "a", 2.0)).unwrap();
        let high = store.create(sample("high", "a", 4.5)).unwrap();
        let busy = store.create(sample("busy", "a", 4.5)).unwrap();
        for c in [&low, &high, &busy] {
            store.update_approval(c.id, ApprovalState::Approved).unwrap();
        }
        store.increment_usage(busy.id).unwrap();

        let approved = store.list_approved(0.0).unwrap();
        let ids: Vec<i64> = approved.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![busy.id, high.id, low.id]);

        // min_rating filters the tail.
        assert_eq!(store.list_approved(3.0).unwrap().len(), 2);
    }

    #[test]
    fn test_terminal_transitions_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        let c = store.create(sample("q", "a", 0.0)).unwrap();
        store.update_approval(c.id, ApprovalState::Rejected).unwrap();

        let err = store
            .update_approval(c.id, ApprovalState::Approved)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
        assert_eq!(store.get(c.id).unwrap().approval, ApprovalState::Rejected);
    }

    #[test]
    fn test_increment_usage_missing_record() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(matches!(
            store.increment_usage(99).unwrap_err(),
            StoreError::NotFound(99)
        ));
    }

    #[test]
    fn test_increment_usage_accumulates() {
        let store = SqliteStore::open_in_memory().unwrap();
        let c = store.create(sample("q", "a", 1.0)).unwrap();
        store.increment_usage(c.id).unwrap();
        store.increment_usage(c.id).unwrap();
        assert_eq!(store.get(c.id).unwrap().usage_count, 2);
    }

    #[test]
    fn test_full_text_search_approved_only() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.supports_full_text());

        let visible = store
            .create(sample("Portafilter cleaning", "Soak in cafiza.", 4.0))
            .unwrap();
        let _hidden = store
            .create(sample("Portafilter sizing", "58mm standard.", 4.0))
            .unwrap();
        store
            .update_approval(visible.id, ApprovalState::Approved)
            .unwrap();

        let hits = store.full_text_search("portafilter", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, visible.id);

        // Operator characters must not break the query.
        assert!(store.full_text_search("\"(AND OR*", 10).is_ok());
    }

    #[test]
    fn test_stats() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store.create(sample("a", "x", 4.0)).unwrap();
        let b = store.create(sample("b", "x", 2.0)).unwrap();
        let _c = store.create(sample("c", "x", 3.0)).unwrap();
        store.update_approval(a.id, ApprovalState::Approved).unwrap();
        store.update_approval(b.id, ApprovalState::Rejected).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.approved, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.rejected, 1);
        assert!((stats.average_rating - 3.0).abs() < 1e-6);
    }
}
