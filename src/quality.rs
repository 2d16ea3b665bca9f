/// Request-scoped quality heuristics for result sets.
///
/// Scores estimate how relevant each source's results are; the blender
/// compares them to pick a rendering mode. Never persisted.
use crate::index::ScoredChunk;
use crate::matcher::ContributionMatch;

/// `avg(similarity) + min(count/5, 0.2)`, capped at 1.0. Empty set is 0.0.
#[must_use]
pub fn vector_quality(results: &[ScoredChunk]) -> f32 {
    if results.is_empty() {
        return 0.0;
    }

    let avg_similarity =
        results.iter().map(|r| r.similarity).sum::<f32>() / results.len() as f32;
    let count_bonus = (results.len() as f32 / 5.0).min(0.2);

    (avg_similarity + count_bonus).min(1.0)
}

/// `avg(similarity) + (avg(rating)/5)*0.3 + min(count/3, 0.2)`, capped at
/// 1.0. Empty set is 0.0.
#[must_use]
pub fn contribution_quality(results: &[ContributionMatch]) -> f32 {
    if results.is_empty() {
        return 0.0;
    }

    let count = results.len() as f32;
    let avg_similarity = results.iter().map(|r| r.similarity).sum::<f32>() / count;
    let avg_rating = results.iter().map(|r| r.contribution.rating).sum::<f32>() / count;
    let rating_bonus = (avg_rating / 5.0) * 0.3;
    let count_bonus = (count / 3.0).min(0.2);

    (avg_similarity + rating_bonus + count_bonus).min(1.0)
}
