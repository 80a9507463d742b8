use serde::{Deserialize, Serialize};

/// Format tag for an ingested file, driving extractor dispatch, MIME choice
/// on acquisition links, and identicon-free artifact naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Fb2,
    #[serde(rename = "fb2.zip")]
    Fb2Zip,
    Epub,
    Pdf,
    Djvu,
}

impl FileType {
    pub fn extension(&self) -> &'static str {
        match self {
            FileType::Fb2 => "fb2",
            FileType::Fb2Zip => "fb2.zip",
            FileType::Epub => "epub",
            FileType::Pdf => "pdf",
            FileType::Djvu => "djvu",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            FileType::Fb2 => "application/fb2+xml",
            FileType::Fb2Zip => "application/fb2+zip",
            FileType::Epub => "application/epub+zip",
            FileType::Pdf => "application/pdf",
            FileType::Djvu => "image/vnd.djvu",
        }
    }

    /// Parse from a file extension (case-insensitive, leading dot optional).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "fb2" => Some(FileType::Fb2),
            "zip" => Some(FileType::Fb2Zip),
            "epub" => Some(FileType::Epub),
            "pdf" => Some(FileType::Pdf),
            "djvu" | "djv" => Some(FileType::Djvu),
            _ => None,
        }
    }
}

/// A catalog entry for one physical file. See data model invariants in
/// SPEC_FULL.md §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub title_lower: String,
    pub series: String,
    pub series_lower: String,
    pub series_number: Option<i64>,
    pub published: Option<String>,
    pub isbn: Option<String>,
    pub year: Option<String>,
    pub publisher: Option<String>,
    pub file_url: String,
    pub file_type: FileType,
    pub file_hash: String,
    pub file_size: i64,
    pub over18: bool,
    pub ipfs_cid: Option<String>,
}

/// Fields required to insert a new book row; the case-folded mirrors and the
/// surrogate id are derived/assigned by the catalog store.
#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub series: String,
    pub series_number: Option<i64>,
    pub published: Option<String>,
    pub isbn: Option<String>,
    pub year: Option<String>,
    pub publisher: Option<String>,
    pub file_url: String,
    pub file_type: FileType,
    pub file_hash: String,
    pub file_size: i64,
    pub over18: bool,
    pub ipfs_cid: Option<String>,
}

impl NewBook {
    pub fn title_lower(&self) -> String {
        self.title.to_lowercase()
    }

    pub fn series_lower(&self) -> String {
        self.series.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_type_extension_roundtrips_through_parser() {
        for ft in [FileType::Fb2, FileType::Epub, FileType::Pdf, FileType::Djvu] {
            let ext = ft.extension();
            assert_eq!(FileType::from_extension(ext), Some(ft));
        }
    }

    #[test]
    fn fb2_zip_extension_parses_from_zip() {
        assert_eq!(FileType::from_extension("zip"), Some(FileType::Fb2Zip));
        assert_eq!(FileType::from_extension(".ZIP"), Some(FileType::Fb2Zip));
    }

    #[test]
    fn mime_matches_acquisition_link_expectations() {
        assert_eq!(FileType::Fb2Zip.mime(), "application/fb2+zip");
        assert_eq!(FileType::Djvu.mime(), "image/vnd.djvu");
    }
}
