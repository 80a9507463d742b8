//! Event kinds and content (de)serialization for the book-exchange protocol.

use athenaeum_core::{RequestContent, ResponseBookWire};
use nostr::{Event, EventBuilder, Keys, Kind, Tag};

use crate::error::{NostrError, Result};

pub const REQUEST_KIND: u16 = 8698;
pub const RESPONSE_KIND: u16 = 8699;

/// Builds and signs a request event for `content`. Caller has already
/// validated `content.is_valid()`.
pub fn build_request_event(keys: &Keys, content: &RequestContent) -> Result<Event> {
    let json = serde_json::to_string(content)?;
    let event = EventBuilder::new(Kind::Custom(REQUEST_KIND), json, [])
        .to_event(keys)
        .map_err(NostrError::Event)?;
    Ok(event)
}

/// Builds and signs a response event replying to `request_event_id`.
pub fn build_response_event(keys: &Keys, request_event_id: &str, books: &[ResponseBookWire]) -> Result<Event> {
    let json = serde_json::to_string(books)?;
    let reply_tag = Tag::event(
        nostr::EventId::from_hex(request_event_id).map_err(|e| NostrError::MalformedContent(e.to_string()))?,
    );
    let event = EventBuilder::new(Kind::Custom(RESPONSE_KIND), json, [reply_tag])
        .to_event(keys)
        .map_err(NostrError::Event)?;
    Ok(event)
}

/// Parses a response event's content. Tolerates a single bare object in
/// place of an array, per the wire-format note in the system's external
/// interfaces section.
pub fn parse_response_content(raw_content: &str) -> Result<Vec<ResponseBookWire>> {
    if let Ok(array) = serde_json::from_str::<Vec<ResponseBookWire>>(raw_content) {
        return Ok(array);
    }
    let single: ResponseBookWire =
        serde_json::from_str(raw_content).map_err(|e| NostrError::MalformedContent(e.to_string()))?;
    Ok(vec![single])
}

/// The `e`-tag request id a response event replies to, preferring one marked
/// `reply` per NIP-10 when more than one `e` tag is present.
pub fn request_event_id_of(event: &Event) -> Option<String> {
    let mut fallback = None;
    for tag in event.tags.iter() {
        if let Some(nostr::TagStandard::Event { event_id, marker, .. }) = tag.as_standardized() {
            if matches!(marker, Some(nostr::Marker::Reply)) {
                return Some(event_id.to_hex());
            }
            fallback.get_or_insert(event_id.to_hex());
        }
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_response_content_accepts_array() {
        let raw = r#"[{"title":"Dune","authors":["Frank Herbert"],"file_type":"epub","file_hash":"0123456789abcdef","file_size":10}]"#;
        let books = parse_response_content(raw).unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].title, "Dune");
    }

    #[test]
    fn parse_response_content_falls_back_to_single_object() {
        let raw = r#"{"title":"Dune","authors":["Frank Herbert"],"file_type":"epub","file_hash":"0123456789abcdef","file_size":10}"#;
        let books = parse_response_content(raw).unwrap();
        assert_eq!(books.len(), 1);
    }

    #[test]
    fn build_request_event_roundtrips_through_signing() {
        let keys = Keys::generate();
        let content = RequestContent {
            title: "Dune".to_string(),
            ..Default::default()
        };
        let event = build_request_event(&keys, &content).unwrap();
        assert_eq!(event.kind, Kind::Custom(REQUEST_KIND));
        assert!(event.verify().is_ok());
    }
}
