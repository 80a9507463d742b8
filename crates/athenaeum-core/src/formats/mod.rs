//! Format-specific metadata and cover extraction (C2). Each format is a
//! variant with a common capability surface; dispatch is a plain `match` on
//! the extension-derived `FileType` rather than dynamic dispatch, since the
//! set of formats is closed.

pub mod djvu;
pub mod epub;
pub mod fb2;
pub mod pdf;
pub mod tools;

use std::path::Path;

use crate::error::Result;
use crate::models::FileType;

/// Extracted metadata for one book file. Fields the source didn't carry are
/// left `None`/empty; the ingest pipeline decides fallback behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedMetadata {
    pub author: String,
    pub title: String,
    pub annotation: String,
    pub isbn: Option<String>,
    pub year: Option<String>,
    pub publisher: Option<String>,
    pub series: String,
    pub series_number: Option<i64>,
}

impl ExtractedMetadata {
    pub fn has_title(&self) -> bool {
        !self.title.trim().is_empty()
    }
}

/// Extract metadata for `path`, dispatching on its declared `FileType`.
pub fn extract_metadata(path: &Path, file_type: FileType) -> Result<ExtractedMetadata> {
    match file_type {
        FileType::Fb2 => fb2::extract(path),
        FileType::Fb2Zip => fb2::extract_from_zip(path),
        FileType::Epub => epub::extract(path),
        FileType::Pdf => pdf::extract(path),
        FileType::Djvu => djvu::extract(path),
    }
}

/// Extract a cover image (raw encoded bytes, not yet resized) for `path`.
/// Returns `None` when the source carries no discoverable cover.
pub fn extract_cover(path: &Path, file_type: FileType) -> Result<Option<Vec<u8>>> {
    match file_type {
        FileType::Fb2 => fb2::extract_cover(path),
        FileType::Fb2Zip => fb2::extract_cover_from_zip(path),
        FileType::Epub => epub::extract_cover(path),
        FileType::Pdf => pdf::extract_cover(path),
        FileType::Djvu => djvu::extract_cover(path),
    }
}

/// Filename-heuristic fallback when an extractor produces no title: split on
/// the first " - " into (author, title); otherwise the whole stem becomes
/// the title with an empty author.
pub fn title_from_filename(path: &Path) -> ExtractedMetadata {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    if let Some((author, title)) = stem.split_once(" - ") {
        ExtractedMetadata {
            author: author.trim().to_string(),
            title: title.trim().to_string(),
            ..Default::default()
        }
    } else {
        ExtractedMetadata {
            title: stem.trim().to_string(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn filename_heuristic_splits_author_and_title() {
        let meta = title_from_filename(&PathBuf::from("Frank Herbert - Dune.epub"));
        assert_eq!(meta.author, "Frank Herbert");
        assert_eq!(meta.title, "Dune");
    }

    #[test]
    fn filename_heuristic_falls_back_to_stem_as_title() {
        let meta = title_from_filename(&PathBuf::from("dune.epub"));
        assert_eq!(meta.author, "");
        assert_eq!(meta.title, "dune");
    }
}
