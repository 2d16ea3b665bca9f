/// Blender and context composer.
///
/// Decides the rendering mode and assembles the combined context string
/// plus structured source records for the answer-generation collaborator.
/// Contribution evidence always renders before document chunks; the mode
/// only changes the labels that hint at how heavily to weight it.
use serde::Serialize;

use crate::index::ScoredChunk;
use crate::matcher::ContributionMatch;

const PREVIEW_LIMIT: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    Standard,
    Emphasized,
}

/// Emphasized mode iff contributions scored strictly better than the
/// vector results and the contribution set is non-empty.
#[must_use]
pub fn decide_mode(
    vector_quality: f32,
    contribution_quality: f32,
    has_contributions: bool,
) -> RenderMode {
    if contribution_quality > vector_quality && has_contributions {
        RenderMode::Emphasized
    } else {
        RenderMode::Standard
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Document,
    Contribution,
}

/// One evidence source in the composed context, for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub kind: SourceKind,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contribution_id: Option<i64>,
    pub similarity: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_count: Option<u64>,
    pub preview: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComposedContext {
    pub text: String,
    pub mode: RenderMode,
    pub sources: Vec<SourceRef>,
}

fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_LIMIT {
        return text.to_string();
    }
    let mut out: String = text.chars().take(PREVIEW_LIMIT).collect();
    out.push_str("...");
    out
}

fn render_contributions(contributions: &[ContributionMatch], mode: RenderMode) -> String {
    let (section_label, entry_label) = match mode {
        RenderMode::Emphasized => (
            "USER CONTRIBUTIONS (PRIORITIZED):",
            "HIGHLY RELEVANT USER CONTRIBUTION",
        ),
        RenderMode::Standard => ("USER CONTRIBUTIONS AND ENHANCEMENTS:", "USER CONTRIBUTION"),
    };

    let entries: Vec<String> = contributions
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let mut entry = format!("{entry_label} #{}:\n", i + 1);
            if !m.contribution.question.is_empty() {
                entry.push_str(&format!("Question: {}\n", m.contribution.question));
            }
            entry.push_str(&format!("Answer: {}\n", m.contribution.answer));
            entry.push_str(&format!(
                "Rating: {:.1}/5.0 (Similarity: {:.2})",
                m.contribution.rating, m.similarity
            ));
            entry
        })
        .collect();

    format!("{section_label}\n{}", entries.join("\n\n"))
}

fn render_documents(chunks: &[ScoredChunk], mode: RenderMode) -> String {
    let section_label = match mode {
        RenderMode::Emphasized => "SUPPLEMENTARY DOCUMENTATION:",
        RenderMode::Standard => "ORIGINAL KNOWLEDGE BASE:",
    };

    let entries: Vec<String> = chunks
        .iter()
        .enumerate()
        .map(|(i, c)| {
            format!(
                "DOCUMENT #{} (from {}):\n{}\n(Similarity: {:.2})",
                i + 1,
                c.meta.source_document,
                c.meta.text,
                c.similarity
            )
        })
        .collect();

    format!("{section_label}\n{}", entries.join("\n\n"))
}

/// Assemble the combined context. Empty sections are omitted; when both
/// result sets are empty the context text is an empty string, which the
/// caller treats as "no context available", not an error.
#[must_use]
pub fn compose(
    chunks: &[ScoredChunk],
    contributions: &[ContributionMatch],
    mode: RenderMode,
) -> ComposedContext {
    let mut sections = Vec::new();
    if !contributions.is_empty() {
        sections.push(render_contributions(contributions, mode));
    }
    if !chunks.is_empty() {
        sections.push(render_documents(chunks, mode));
    }

    let mut sources = Vec::new();
    let mut seen_chunks = std::collections::HashSet::new();
    for chunk in chunks {
        if seen_chunks.insert((chunk.meta.source_document.clone(), chunk.meta.chunk_index)) {
            sources.push(SourceRef {
                kind: SourceKind::Document,
                name: chunk.meta.source_document.clone(),
                contribution_id: None,
                similarity: chunk.similarity,
                rating: None,
                usage_count: None,
                preview: preview(&chunk.meta.text),
            });
        }
    }
    for m in contributions {
        sources.push(SourceRef {
            kind: SourceKind::Contribution,
            name: "user contribution".to_string(),
            contribution_id: Some(m.contribution.id),
            similarity: m.similarity,
            rating: Some(m.contribution.rating),
            usage_count: Some(m.contribution.usage_count),
            preview: preview(&m.contribution.answer),
        });
    }

    ComposedContext {
        text: sections.join("\n\n"),
        mode,
        sources,
    }
}
