use serde::{Deserialize, Serialize};

use super::book::FileType;

/// A book request published to the Nostr network; persisted locally so the
/// HTTP surface can show live responses against it and so expired requests
/// can be purged (revision engine phase 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NostrRequest {
    pub event_id: String,
    pub pubkey: String,
    pub author: String,
    pub series: String,
    pub title: String,
    pub file_hash: String,
    pub created_at: i64,
    pub sent: bool,
}

/// The wire payload of a request event's content field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContent {
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub series: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub file_hash: String,
}

impl RequestContent {
    /// At least one field must be meaningfully populated; title/series must
    /// be at least 4 characters when supplied, file_hash must be exactly 16
    /// lowercase hex characters when supplied.
    pub fn is_valid(&self) -> bool {
        let title_ok = self.title.is_empty() || self.title.chars().count() >= 4;
        let series_ok = self.series.is_empty() || self.series.chars().count() >= 4;
        let hash_ok = self.file_hash.is_empty() || is_file_hash(&self.file_hash);
        let any_present = !self.author.is_empty()
            || !self.series.is_empty()
            || !self.title.is_empty()
            || !self.file_hash.is_empty();
        title_ok && series_ok && hash_ok && any_present
    }
}

fn is_file_hash(s: &str) -> bool {
    s.len() == 16 && s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}

/// One incoming response event, received in answer to a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NostrResponse {
    pub id: i64,
    pub request_event_id: String,
    pub responder_pubkey: String,
    pub received_at: i64,
    pub raw_content: String,
}

/// One offered book inside a response event's content array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseBook {
    pub id: i64,
    pub response_id: i64,
    pub title: String,
    pub authors: Vec<String>,
    pub series: Option<String>,
    pub series_number: Option<i64>,
    pub file_type: FileType,
    pub file_hash: String,
    pub file_size: i64,
    pub ipfs_cid: String,
    pub raw_json: String,
}

/// The wire payload of one element of a response event's content array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseBookWire {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    pub authors: Vec<String>,
    #[serde(default)]
    pub series: Option<String>,
    #[serde(default)]
    pub series_number: Option<i64>,
    pub file_type: FileType,
    pub file_hash: String,
    pub file_size: i64,
    #[serde(default)]
    pub ipfs_cid: Option<String>,
}

impl ResponseBookWire {
    pub fn is_valid(&self) -> bool {
        !self.title.is_empty() && !self.authors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_content_requires_at_least_one_field() {
        assert!(!RequestContent::default().is_valid());
        let req = RequestContent {
            title: "Dune".to_string(),
            ..Default::default()
        };
        assert!(req.is_valid());
    }

    #[test]
    fn request_content_rejects_short_title() {
        let req = RequestContent {
            title: "abc".to_string(),
            ..Default::default()
        };
        assert!(!req.is_valid());
    }

    #[test]
    fn request_content_validates_file_hash_shape() {
        let mut req = RequestContent {
            file_hash: "0123456789abcdef".to_string(),
            ..Default::default()
        };
        assert!(req.is_valid());
        req.file_hash = "NOTHEX".to_string();
        assert!(!req.is_valid());
    }

    #[test]
    fn response_book_wire_requires_title_and_authors() {
        let wire = ResponseBookWire {
            id: None,
            title: String::new(),
            authors: vec!["A".to_string()],
            series: None,
            series_number: None,
            file_type: FileType::Epub,
            file_hash: "0123456789abcdef".to_string(),
            file_size: 10,
            ipfs_cid: None,
        };
        assert!(!wire.is_valid());
    }
}
