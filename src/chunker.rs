/// Sliding-window text chunker.
///
/// Splits raw extracted text into overlapping windows of `chunk_size`
/// characters. Operates on char boundaries so multibyte text never splits
/// mid-codepoint.
use tracing::warn;

/// Split `text` into overlapping, trimmed, non-empty chunks.
///
/// Empty or whitespace-only input yields an empty vector. An `overlap`
/// of `chunk_size` or more is clamped to `chunk_size / 2` before
/// processing; the window start advances by at least one character per
/// iteration, so the scan always terminates.
pub fn chunk_text(text: &str, chunk_size: usize, mut overlap: usize) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    if overlap >= chunk_size {
        warn!(
            overlap,
            chunk_size,
            "overlap >= chunk_size, clamping to chunk_size / 2"
        );
        overlap = chunk_size / 2;
    }

    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < total {
        let end = (start + chunk_size).min(total);
        let window: String = chars[start..end].iter().collect();
        let trimmed = window.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }

        if end >= total {
            break;
        }
        // Strictly non-decreasing cursor: never move backwards even when
        // the overlap would reach before the previous start.
        start = (start + 1).max(end.saturating_sub(overlap));
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text() {
        assert_eq!(chunk_text("", 100, 20), Vec::<String>::new());
    }

    #[test]
    fn test_whitespace_only() {
        assert_eq!(chunk_text("   \n\t  \n", 100, 20), Vec::<String>::new());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_text("hello world", 100, 20);
        assert_eq!(chunks, vec!["hello world"]);
    }

    #[test]
    fn test_chunks_are_trimmed_and_non_empty() {
        let text = "word ".repeat(200);
        let chunks = chunk_text(&text, 50, 10);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(!chunk.is_empty());
            assert_eq!(chunk, chunk.trim());
        }
    }

    #[test]
    fn test_overlap_windows_share_text() {
        let text: String = ('a'..='z').cycle().take(300).collect();
        let chunks = chunk_text(&text, 100, 20);
        assert!(chunks.len() >= 2);
        // The tail of each chunk reappears at the head of the next.
        let tail: String = chunks[0].chars().rev().take(20).collect::<Vec<_>>().into_iter().rev().collect();
        assert!(chunks[1].starts_with(&tail));
    }

    #[test]
    fn test_overlap_ge_chunk_size_terminates() {
        let text = "abcdefghij".repeat(50);
        // overlap equal to and larger than chunk_size must both be corrected.
        let equal = chunk_text(&text, 10, 10);
        let larger = chunk_text(&text, 10, 25);
        assert!(!equal.is_empty());
        assert_eq!(equal, larger);
    }

    #[test]
    fn test_multibyte_boundaries() {
        let text = "日本語のテキスト。".repeat(40);
        let chunks = chunk_text(&text, 30, 5);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 30);
        }
    }

    #[test]
    fn test_full_coverage_no_overlap() {
        let text = "0123456789".repeat(5);
        let chunks = chunk_text(&text, 10, 0);
        assert_eq!(chunks.len(), 5);
        assert_eq!(chunks.concat(), text);
    }
}
