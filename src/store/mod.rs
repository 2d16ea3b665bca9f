/// Contribution store: moderated user-submitted Q&A records used as
/// retrieval evidence.
///
/// Two interchangeable backends implement [`ContributionStore`], SQLite
/// and in-memory, selected once at startup by configuration.
pub mod memory;
pub mod sqlite;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::matcher;

/// Keywords stored per contribution, derived from its question on create.
const CONTRIBUTION_KEYWORD_LIMIT: usize = 10;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("contribution {0} not found")]
    NotFound(i64),

    #[error("invalid approval transition: {from} -> {to}")]
    InvalidTransition {
        from: ApprovalState,
        to: ApprovalState,
    },

    #[error("database error: {0}")]
    Database(String),
}

/// Moderation state machine: `Pending -> Approved | Rejected`.
/// Both outcomes are terminal; there is no path back to pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalState {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for ApprovalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A moderated user-contributed question/answer record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contribution {
    pub id: i64,
    pub question: String,
    pub answer: String,
    pub question_type: String,
    /// Caller-supplied rating, clamped into [0, 5] on create.
    pub rating: f32,
    pub usage_count: u64,
    pub approval: ApprovalState,
    pub keywords: Vec<String>,
    /// SHA-256 of the normalized question. Advisory duplicate-detection
    /// metadata; uniqueness is not enforced.
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields a caller submits; the store assigns everything else.
#[derive(Debug, Clone)]
pub struct NewContribution {
    pub question: String,
    pub answer: String,
    pub question_type: String,
    pub rating: f32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub total: u64,
    pub approved: u64,
    pub pending: u64,
    pub rejected: u64,
    pub average_rating: f32,
}

pub trait ContributionStore: Send + Sync {
    /// Insert a new contribution in the pending state, deriving keywords
    /// and content hash from the question text.
    fn create(&self, new: NewContribution) -> Result<Contribution, StoreError>;

    fn get(&self, id: i64) -> Result<Contribution, StoreError>;

    /// Approved contributions with `rating >= min_rating`, ordered by
    /// rating descending then usage count descending.
    fn list_approved(&self, min_rating: f32) -> Result<Vec<Contribution>, StoreError>;

    /// Contributions awaiting moderation, oldest first.
    fn list_pending(&self) -> Result<Vec<Contribution>, StoreError>;

    /// Apply a moderation transition. Only `Pending -> Approved` and
    /// `Pending -> Rejected` are legal; returns the updated record.
    fn update_approval(&self, id: i64, state: ApprovalState) -> Result<Contribution, StoreError>;

    /// Atomic per-record usage-count increment.
    fn increment_usage(&self, id: i64) -> Result<(), StoreError>;

    /// Whether `full_text_search` is backed by a real text index.
    fn supports_full_text(&self) -> bool {
        false
    }

    /// Approved records matching `query` via the backend's text index.
    /// Backends without one return an empty list.
    fn full_text_search(&self, _query: &str, _limit: usize) -> Result<Vec<Contribution>, StoreError> {
        Ok(Vec::new())
    }

    /// Highest-rated approved contributions.
    fn top_rated(&self, limit: usize) -> Result<Vec<Contribution>, StoreError>;

    fn stats(&self) -> Result<StoreStats, StoreError>;
}

pub(crate) fn derive_keywords(question: &str) -> Vec<String> {
    matcher::extract_keywords(question, CONTRIBUTION_KEYWORD_LIMIT)
}

pub(crate) fn question_hash(question: &str) -> String {
    let normalized = matcher::normalize_text(question);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub(crate) fn clamp_rating(rating: f32) -> f32 {
    rating.clamp(0.0, 5.0)
}

pub(crate) fn check_transition(
    from: ApprovalState,
    to: ApprovalState,
) -> Result<(), StoreError> {
    if from == ApprovalState::Pending && to != ApprovalState::Pending {
        Ok(())
    } else {
        Err(StoreError::InvalidTransition { from, to })
    }
}
