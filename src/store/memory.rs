/// In-memory contribution store.
///
/// The second backend selectable at startup; also the test double. Keeps
/// records behind a single mutex, so per-record updates are atomic.
use std::cmp::Ordering;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use super::{
    ApprovalState, Contribution, ContributionStore, NewContribution, StoreError, StoreStats,
    check_transition, clamp_rating, derive_keywords, question_hash,
};

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    rows: Vec<Contribution>,
}

fn rank(rows: &mut [Contribution]) {
    rows.sort_by(|a, b| {
        b.rating
            .partial_cmp(&a.rating)
            .unwrap_or(Ordering::Equal)
            .then(b.usage_count.cmp(&a.usage_count))
    });
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Database("store mutex poisoned".to_string()))
    }
}

impl ContributionStore for MemoryStore {
    fn create(&self, new: NewContribution) -> Result<Contribution, StoreError> {
        let now = Utc::now();
        let mut inner = self.inner()?;
        inner.next_id += 1;

        let contribution = Contribution {
            id: inner.next_id,
            keywords: derive_keywords(&new.question),
            content_hash: question_hash(&new.question),
            rating: clamp_rating(new.rating),
            question: new.question,
            answer: new.answer,
            question_type: new.question_type,
            usage_count: 0,
            approval: ApprovalState::Pending,
            created_at: now,
            updated_at: now,
        };
        inner.rows.push(contribution.clone());
        Ok(contribution)
    }

    fn get(&self, id: i64) -> Result<Contribution, StoreError> {
        let inner = self.inner()?;
        inner
            .rows
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    fn list_approved(&self, min_rating: f32) -> Result<Vec<Contribution>, StoreError> {
        let inner = self.inner()?;
        let mut approved: Vec<Contribution> = inner
            .rows
            .iter()
            .filter(|c| c.approval == ApprovalState::Approved && c.rating >= min_rating)
            .cloned()
            .collect();
        rank(&mut approved);
        Ok(approved)
    }

    fn list_pending(&self) -> Result<Vec<Contribution>, StoreError> {
        let inner = self.inner()?;
        let mut pending: Vec<Contribution> = inner
            .rows
            .iter()
            .filter(|c| c.approval == ApprovalState::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|c| c.created_at);
        Ok(pending)
    }

    fn update_approval(
        &self,
        id: i64,
        state: ApprovalState,
    ) -> Result<Contribution, StoreError> {
        let mut inner = self.inner()?;
        let row = inner
            .rows
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(StoreError::NotFound(id))?;
        check_transition(row.approval, state)?;
        row.approval = state;
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    fn increment_usage(&self, id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner()?;
        let row = inner
            .rows
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(StoreError::NotFound(id))?;
        row.usage_count += 1;
        row.updated_at = Utc::now();
        Ok(())
    }

    fn top_rated(&self, limit: usize) -> Result<Vec<Contribution>, StoreError> {
        let mut approved = self.list_approved(0.0)?;
        approved.truncate(limit);
        Ok(approved)
    }

    fn stats(&self) -> Result<StoreStats, StoreError> {
        let inner = self.inner()?;
        let mut stats = StoreStats {
            total: inner.rows.len() as u64,
            ..StoreStats::default()
        };
        for row in &inner.rows {
            match row.approval {
                ApprovalState::Approved => stats.approved += 1,
                ApprovalState::Pending => stats.pending += 1,
                ApprovalState::Rejected => stats.rejected += 1,
            }
        }
        if !inner.rows.is_empty() {
            stats.average_rating =
                inner.rows.iter().map(|c| c.rating).sum::<f32>() / inner.rows.len() as f32;
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(question: &str, rating: f32) -> NewContribution {
        NewContribution {
            question: question.to_string(),
            answer: format!("answer to {question}"),
            question_type: "general".to_string(),
            rating,
        }
    }

    #[test]
    fn test_lifecycle_matches_sqlite_semantics() {
        let store = MemoryStore::new();
        let c = store.create(sample("How to steam milk?", 4.0)).unwrap();
        assert_eq!(c.approval, ApprovalState::Pending);
        assert!(store.list_approved(0.0).unwrap().is_empty());

        store.update_approval(c.id, ApprovalState::Approved).unwrap();
        assert_eq!(store.list_approved(0.0).unwrap().len(), 1);

        store.increment_usage(c.id).unwrap();
        assert_eq!(store.get(c.id).unwrap().usage_count, 1);

        let err = store
            .update_approval(c.id, ApprovalState::Rejected)
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[test]
    fn test_no_full_text_capability() {
        let store = MemoryStore::new();
        assert!(!store.supports_full_text());
        assert!(store.full_text_search("anything", 5).unwrap().is_empty());
    }

    #[test]
    fn test_ranking_and_min_rating() {
        let store = MemoryStore::new();
        let ids: Vec<i64> = [("a", 2.0), ("b", 4.0), ("c", 4.0)]
            .iter()
            .map(|(q, r)| {
                let c = store.create(sample(q, *r)).unwrap();
                store.update_approval(c.id, ApprovalState::Approved).unwrap();
                c.id
            })
            .collect();
        store.increment_usage(ids[2]).unwrap();

        let approved = store.list_approved(0.0).unwrap();
        assert_eq!(approved[0].id, ids[2]);
        assert_eq!(approved[1].id, ids[1]);
        assert_eq!(approved[2].id, ids[0]);

        assert_eq!(store.list_approved(3.0).unwrap().len(), 2);
        assert_eq!(store.top_rated(1).unwrap().len(), 1);
    }
}
