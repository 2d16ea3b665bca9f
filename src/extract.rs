/// Document text extraction for the indexing pipeline.
///
/// Markdown and plain text are read directly; PDFs go through lopdf with
/// per-page recovery, so one bad page never discards a whole document.
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::warn;

const SUPPORTED_EXTENSIONS: &[&str] = &["md", "markdown", "txt", "pdf"];

#[must_use]
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Extract the raw text of a single document.
pub fn extract_text(path: &Path) -> Result<String> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "md" | "markdown" | "txt" => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        "pdf" => extract_pdf(path),
        other => bail!("unsupported file type: {other:?}"),
    }
}

fn extract_pdf(path: &Path) -> Result<String> {
    let doc = lopdf::Document::load(path)
        .with_context(|| format!("failed to load PDF {}", path.display()))?;

    let pages = doc.get_pages();
    if pages.is_empty() {
        warn!("PDF has no pages: {}", path.display());
        return Ok(String::new());
    }

    let mut parts = Vec::with_capacity(pages.len());
    for &number in pages.keys() {
        match doc.extract_text(&[number]) {
            Ok(text) => parts.push(text),
            Err(e) => warn!(
                page = number,
                "failed to extract text from page of {}: {e}",
                path.display()
            ),
        }
    }

    Ok(parts.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn test_is_supported() {
        assert!(is_supported(&PathBuf::from("notes.md")));
        assert!(is_supported(&PathBuf::from("manual.PDF")));
        assert!(is_supported(&PathBuf::from("readme.txt")));
        assert!(!is_supported(&PathBuf::from("image.png")));
        assert!(!is_supported(&PathBuf::from("Makefile")));
    }

    #[test]
    fn test_extract_plain_text() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("guide.txt");
        fs::write(&path, "Purge the steam wand before use.").unwrap();

        let text = extract_text(&path).unwrap();
        assert_eq!(text, "Purge the steam wand before use.");
    }

    #[test]
    fn test_extract_unsupported_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(&path, "a,b,c").unwrap();

        assert!(extract_text(&path).is_err());
    }

    #[test]
    fn test_extract_missing_file() {
        assert!(extract_text(&PathBuf::from("/nonexistent/file.md")).is_err());
    }
}
