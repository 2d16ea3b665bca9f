/// Lexical similarity scoring over the contribution store.
///
/// Scores a query against contribution text with a weighted blend of
/// token-set overlap, substring overlap, and phrase containment, then runs
/// an ordered three-strategy candidate search with cross-strategy dedup.
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::warn;

use crate::store::{ApprovalState, Contribution, ContributionStore, StoreError};

/// Minimum similarity for a candidate to be accepted by strategies 1 and 2.
const SIMILARITY_FLOOR: f32 = 0.05;

/// Fixed score assigned to results found only by the full-text fallback.
const FULL_TEXT_DEFAULT_SCORE: f32 = 0.5;

/// Usage count is incremented for this many of the returned results.
const USAGE_INCREMENT_TOP_N: usize = 3;

/// Keywords extracted from the query for strategy 2.
const QUERY_KEYWORD_LIMIT: usize = 15;

const JACCARD_WEIGHT: f32 = 0.6;
const SUBSTRING_WEIGHT: f32 = 0.3;
const PHRASE_WEIGHT: f32 = 0.1;

static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("valid pattern"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid pattern"));

static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
        "is", "are", "was", "were", "be", "been", "have", "has", "had", "do", "does", "did",
        "will", "would", "could", "should", "may", "might", "can", "what", "how", "when", "where",
        "why", "who", "this", "that", "these", "those", "i", "you", "he", "she", "it", "we",
        "they", "me", "him", "her", "us", "them", "my", "your", "his", "its", "our", "their",
        "am", "not", "so", "if", "then", "than", "as", "up", "down", "out", "off", "over",
        "under", "again", "further", "once", "here", "there", "all", "any", "both", "each",
        "few", "more", "most", "other", "some", "such", "no", "nor", "only", "own", "same",
        "too", "very", "just", "now", "get", "got", "go", "goes", "went", "come", "came", "see",
        "saw", "know", "knew", "think", "thought", "take", "took", "give", "gave", "make",
        "made", "find", "found", "tell", "told", "ask", "asked", "work", "worked", "seem",
        "seemed", "feel", "felt", "try", "tried", "leave", "left", "call", "called",
    ]
    .into_iter()
    .collect()
});

/// Lowercase, strip punctuation, collapse whitespace.
#[must_use]
pub fn normalize_text(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped = NON_WORD.replace_all(&lowered, " ");
    WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}

/// Stop-word-filtered keywords (longer than 2 chars), deduplicated in
/// order of first appearance, capped at `limit`.
#[must_use]
pub fn extract_keywords(text: &str, limit: usize) -> Vec<String> {
    let normalized = normalize_text(text);
    let mut seen = HashSet::new();
    let mut keywords = Vec::new();
    for word in normalized.split_whitespace() {
        if word.chars().count() <= 2 || STOP_WORDS.contains(word) {
            continue;
        }
        if seen.insert(word.to_string()) {
            keywords.push(word.to_string());
            if keywords.len() >= limit {
                break;
            }
        }
    }
    keywords
}

fn jaccard(a: &HashSet<&str>, b: &HashSet<&str>) -> f32 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f32 / union as f32
}

/// For tokens longer than 3 chars, count pairs where one token contains the
/// other; each token of `a` matches at most once.
fn substring_overlap(a: &HashSet<&str>, b: &HashSet<&str>) -> f32 {
    let denominator = a.len().max(b.len());
    if denominator == 0 {
        return 0.0;
    }

    let mut matches = 0usize;
    for &word_a in a {
        if word_a.chars().count() <= 3 {
            continue;
        }
        for &word_b in b {
            if word_b.chars().count() <= 3 {
                continue;
            }
            if word_a.contains(word_b) || word_b.contains(word_a) {
                matches += 1;
                break;
            }
        }
    }

    matches as f32 / denominator as f32
}

/// 0.5 for whole containment, 0.3 if any >10-char window of the shorter
/// text appears in the longer, else 0. Only applies to multi-word texts.
fn phrase_containment(a: &str, b: &str) -> f32 {
    if a.split_whitespace().count() < 2 || b.split_whitespace().count() < 2 {
        return 0.0;
    }
    if a.contains(b) || b.contains(a) {
        return 0.5;
    }

    let (shorter, longer) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };
    let chars: Vec<char> = shorter.chars().collect();
    const WINDOW: usize = 11;
    if chars.len() >= WINDOW {
        for window in chars.windows(WINDOW) {
            let phrase: String = window.iter().collect();
            if longer.contains(&phrase) {
                return 0.3;
            }
        }
    }
    0.0
}

/// Weighted similarity of two normalized texts, in [0, 1].
#[must_use]
pub fn text_similarity(a: &str, b: &str) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let tokens_a: HashSet<&str> = a.split_whitespace().collect();
    let tokens_b: HashSet<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let score = jaccard(&tokens_a, &tokens_b) * JACCARD_WEIGHT
        + substring_overlap(&tokens_a, &tokens_b) * SUBSTRING_WEIGHT
        + phrase_containment(a, b) * PHRASE_WEIGHT;

    score.min(1.0)
}

/// Which search strategy produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    Direct,
    Keyword,
    FullText,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ContributionMatch {
    pub contribution: Contribution,
    pub similarity: f32,
    pub question_similarity: f32,
    pub answer_similarity: f32,
    pub strategy: MatchStrategy,
}

pub struct LexicalMatcher {
    store: Arc<dyn ContributionStore>,
}

impl LexicalMatcher {
    #[must_use]
    pub fn new(store: Arc<dyn ContributionStore>) -> Self {
        Self { store }
    }

    /// Search approved contributions for lexical matches to `query`.
    ///
    /// Strategies run in order (direct similarity, keyword overlap,
    /// full-text fallback), each only consuming ids the previous ones have
    /// not claimed, stopping once `limit` candidates are collected. The
    /// combined list is ranked by (similarity, rating, usage_count)
    /// descending and the top results get a best-effort usage increment.
    pub fn search(
        &self,
        query: &str,
        limit: usize,
        min_rating: f32,
    ) -> Result<Vec<ContributionMatch>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let normalized_query = normalize_text(query);
        let query_keywords = extract_keywords(query, QUERY_KEYWORD_LIMIT);
        let approved = self.store.list_approved(min_rating)?;

        let mut results: Vec<ContributionMatch> = Vec::new();
        let mut seen: HashSet<i64> = HashSet::new();

        // Strategy 1: direct similarity against question and answer text.
        for contribution in &approved {
            if results.len() >= limit {
                break;
            }
            let question_similarity =
                text_similarity(&normalized_query, &normalize_text(&contribution.question));
            let answer_similarity =
                text_similarity(&normalized_query, &normalize_text(&contribution.answer));
            let similarity = question_similarity.max(answer_similarity);

            if similarity > SIMILARITY_FLOOR {
                seen.insert(contribution.id);
                results.push(ContributionMatch {
                    contribution: contribution.clone(),
                    similarity,
                    question_similarity,
                    answer_similarity,
                    strategy: MatchStrategy::Direct,
                });
            }
        }

        // Strategy 2: keyword overlap over the not-yet-seen remainder.
        if results.len() < limit && !query_keywords.is_empty() {
            for contribution in &approved {
                if results.len() >= limit {
                    break;
                }
                if seen.contains(&contribution.id) {
                    continue;
                }
                let haystack = normalize_text(&format!(
                    "{} {}",
                    contribution.question, contribution.answer
                ));
                let matched = query_keywords
                    .iter()
                    .filter(|k| haystack.contains(k.as_str()))
                    .count();
                if matched == 0 {
                    continue;
                }
                let ratio = matched as f32 / query_keywords.len() as f32;
                if ratio > SIMILARITY_FLOOR {
                    seen.insert(contribution.id);
                    results.push(ContributionMatch {
                        contribution: contribution.clone(),
                        similarity: ratio,
                        question_similarity: 0.0,
                        answer_similarity: 0.0,
                        strategy: MatchStrategy::Keyword,
                    });
                }
            }
        }

        // Strategy 3: store full-text fallback, fixed default score.
        if results.len() < limit && self.store.supports_full_text() {
            match self.store.full_text_search(query, limit - results.len()) {
                Ok(found) => {
                    for contribution in found {
                        if seen.contains(&contribution.id)
                            || contribution.approval != ApprovalState::Approved
                        {
                            continue;
                        }
                        seen.insert(contribution.id);
                        results.push(ContributionMatch {
                            contribution,
                            similarity: FULL_TEXT_DEFAULT_SCORE,
                            question_similarity: 0.0,
                            answer_similarity: 0.0,
                            strategy: MatchStrategy::FullText,
                        });
                    }
                }
                Err(e) => warn!("full-text search failed, continuing without it: {e}"),
            }
        }

        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    b.contribution
                        .rating
                        .partial_cmp(&a.contribution.rating)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then(b.contribution.usage_count.cmp(&a.contribution.usage_count))
        });
        results.truncate(limit);

        for matched in results.iter().take(USAGE_INCREMENT_TOP_N) {
            if let Err(e) = self.store.increment_usage(matched.contribution.id) {
                warn!(
                    id = matched.contribution.id,
                    "failed to increment usage count: {e}"
                );
            }
        }

        Ok(results)
    }
}
