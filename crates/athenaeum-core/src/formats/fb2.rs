use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use regex::Regex;

use crate::error::{Error, Result};

use super::ExtractedMetadata;

/// Decode FB2 bytes to a UTF-8 string, transcoding `windows-1251`/`koi8-r`
/// declared encodings first (charset recovery, spec §4.2 boundary scenario).
fn decode_fb2(bytes: &[u8]) -> String {
    let declared = declared_encoding(bytes);
    match declared.as_deref() {
        Some("windows-1251") => encoding_rs::WINDOWS_1251.decode(bytes).0.into_owned(),
        Some("koi8-r") => encoding_rs::KOI8_R.decode(bytes).0.into_owned(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

fn declared_encoding(bytes: &[u8]) -> Option<String> {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(256)]);
    let re = Regex::new(r#"encoding="([^"]+)""#).ok()?;
    re.captures(&head)
        .map(|c| c[1].to_ascii_lowercase().trim().to_string())
}

pub fn extract(path: &Path) -> Result<ExtractedMetadata> {
    let bytes = std::fs::read(path)?;
    extract_bytes(&bytes)
}

pub fn extract_bytes(bytes: &[u8]) -> Result<ExtractedMetadata> {
    let text = decode_fb2(bytes);
    match extract_strict(&text) {
        Ok(meta) if meta.has_title() => Ok(meta),
        _ => Ok(extract_tolerant(&text)),
    }
}

/// Extract from the canonical (ZIP-wrapped) form produced during ingest
/// canonicalization: the archive contains exactly one `.fb2` entry.
pub fn extract_from_zip(path: &Path) -> Result<ExtractedMetadata> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| Error::IngestSkip(e.to_string()))?;
    let fb2_bytes = read_first_fb2_entry(&mut archive)?;
    extract_bytes(&fb2_bytes)
}

fn read_first_fb2_entry<R: Read + std::io::Seek>(archive: &mut zip::ZipArchive<R>) -> Result<Vec<u8>> {
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| Error::IngestSkip(e.to_string()))?;
        if entry.name().to_ascii_lowercase().ends_with(".fb2") {
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf)?;
            return Ok(buf);
        }
    }
    Err(Error::IngestSkip("fb2.zip contains no .fb2 entry".to_string()))
}

/// Strict XML-walk extractor: reads `description/title-info` fields off the
/// quick-xml event stream.
fn extract_strict(text: &str) -> Result<ExtractedMetadata> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut meta = ExtractedMetadata::default();
    let mut path: Vec<String> = Vec::new();
    let mut authors = Vec::new();
    let mut current_author_parts: Vec<(String, String)> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                path.push(local_name(&e));
            }
            Ok(Event::End(_)) => {
                if path.last().map(String::as_str) == Some("author") {
                    let first = current_author_parts
                        .iter()
                        .find(|(tag, _)| tag == "first-name")
                        .map(|(_, v)| v.clone())
                        .unwrap_or_default();
                    let last = current_author_parts
                        .iter()
                        .find(|(tag, _)| tag == "last-name")
                        .map(|(_, v)| v.clone())
                        .unwrap_or_default();
                    let full = [first, last].into_iter().filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" ");
                    if !full.is_empty() {
                        authors.push(full);
                    }
                    current_author_parts.clear();
                }
                path.pop();
            }
            Ok(Event::Empty(e)) => {
                if local_name(&e) == "sequence" && in_title_info(&path) {
                    for attr in e.attributes().flatten() {
                        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
                        let value = String::from_utf8_lossy(&attr.value).to_string();
                        match key.as_str() {
                            "name" => meta.series = value,
                            "number" => meta.series_number = value.parse().ok(),
                            _ => {}
                        }
                    }
                }
            }
            Ok(Event::Text(t)) => {
                let text = t.unescape().unwrap_or_default().into_owned();
                if text.trim().is_empty() {
                    buf.clear();
                    continue;
                }
                match path.last().map(String::as_str) {
                    Some("book-title") if in_title_info(&path) => meta.title = text,
                    Some("annotation") if in_title_info(&path) => {
                        meta.annotation = format!("{}{text} ", meta.annotation);
                    }
                    Some("first-name") | Some("last-name") if in_author(&path) => {
                        current_author_parts.push((path.last().unwrap().clone(), text));
                    }
                    Some("publisher") => meta.publisher = Some(text),
                    Some("isbn") => meta.isbn = Some(text),
                    Some("year") | Some("date") => meta.year = Some(first_year(&text)),
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::IngestSkip(format!("fb2 xml parse error: {e}"))),
            _ => {}
        }
        buf.clear();
    }

    meta.author = authors.join(", ");
    meta.annotation = meta.annotation.trim().to_string();
    Ok(meta)
}

fn in_title_info(path: &[String]) -> bool {
    path.iter().any(|p| p == "title-info")
}

fn in_author(path: &[String]) -> bool {
    path.iter().any(|p| p == "author") && in_title_info(path)
}

fn local_name(e: &quick_xml::events::BytesStart) -> String {
    let raw = String::from_utf8_lossy(e.name().as_ref()).to_string();
    raw.rsplit(':').next().unwrap_or(&raw).to_string()
}

fn first_year(text: &str) -> String {
    let re = Regex::new(r"\d{4}").unwrap();
    re.find(text).map(|m| m.as_str().to_string()).unwrap_or_else(|| text.to_string())
}

/// Tolerant pattern-based fallback used when strict XML parsing fails or
/// yields no title (malformed FB2 in the wild is common).
fn extract_tolerant(text: &str) -> ExtractedMetadata {
    let mut meta = ExtractedMetadata::default();

    if let Some(title) = capture(text, r"<book-title>\s*([^<]+?)\s*</book-title>") {
        meta.title = title;
    }
    if let Some(annotation) = capture(text, r"(?s)<annotation>(.*?)</annotation>") {
        let strip_tags = Regex::new(r"<[^>]+>").unwrap();
        meta.annotation = strip_tags.replace_all(&annotation, "").trim().to_string();
    }
    if let Some(isbn) = capture(text, r"<isbn>\s*([^<]+?)\s*</isbn>") {
        meta.isbn = Some(isbn);
    }
    if let Some(publisher) = capture(text, r"<publisher>\s*([^<]+?)\s*</publisher>") {
        meta.publisher = Some(publisher);
    }
    if let Some(year) = capture(text, r"<year>\s*([^<]+?)\s*</year>") {
        meta.year = Some(first_year(&year));
    }

    let re_first = Regex::new(r"<first-name>\s*([^<]+?)\s*</first-name>").unwrap();
    let re_last = Regex::new(r"<last-name>\s*([^<]+?)\s*</last-name>").unwrap();
    let firsts: Vec<&str> = re_first.captures_iter(text).map(|c| c.get(1).unwrap().as_str()).collect();
    let lasts: Vec<&str> = re_last.captures_iter(text).map(|c| c.get(1).unwrap().as_str()).collect();
    let authors: Vec<String> = firsts
        .iter()
        .zip(lasts.iter().chain(std::iter::repeat(&"")))
        .map(|(f, l)| [*f, *l].into_iter().filter(|s| !s.is_empty()).collect::<Vec<_>>().join(" "))
        .filter(|s| !s.is_empty())
        .collect();
    meta.author = authors.join(", ");

    meta
}

fn capture(text: &str, pattern: &str) -> Option<String> {
    Regex::new(pattern).ok()?.captures(text).map(|c| c[1].to_string())
}

pub fn extract_cover(path: &Path) -> Result<Option<Vec<u8>>> {
    let bytes = std::fs::read(path)?;
    extract_cover_bytes(&bytes)
}

pub fn extract_cover_from_zip(path: &Path) -> Result<Option<Vec<u8>>> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| Error::IngestSkip(e.to_string()))?;
    let fb2_bytes = read_first_fb2_entry(&mut archive)?;
    extract_cover_bytes(&fb2_bytes)
}

fn extract_cover_bytes(bytes: &[u8]) -> Result<Option<Vec<u8>>> {
    let text = decode_fb2(bytes);

    let href_re = Regex::new(r#"<coverpage>\s*<image[^/]*(?:l:href|href)="#?([^"]+)"[^/]*/>"#).unwrap();
    let Some(href_caps) = href_re.captures(&text) else {
        return Ok(None);
    };
    let href = href_caps[1].to_string();

    let binary_re = Regex::new(&format!(
        r#"<binary[^>]*id="{}"[^>]*content-type="image/[^"]*"[^>]*>([^<]+)</binary>"#,
        regex::escape(&href)
    ))
    .unwrap();
    let Some(binary_caps) = binary_re.captures(&text) else {
        return Ok(None);
    };
    let b64: String = binary_caps[1].chars().filter(|c| !c.is_whitespace()).collect();
    let decoded = decode_base64(&b64)?;
    Ok(Some(decoded))
}

fn decode_base64(s: &str) -> Result<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(s)
        .map_err(|e| Error::IngestSkip(format!("invalid base64 cover: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<FictionBook>
  <description>
    <title-info>
      <author><first-name>Frank</first-name><last-name>Herbert</last-name></author>
      <book-title>Dune</book-title>
      <annotation><p>A desert planet.</p></annotation>
      <sequence name="Dune Saga" number="1"/>
    </title-info>
    <publish-info>
      <publisher>Chilton</publisher>
      <year>1965</year>
    </publish-info>
  </description>
</FictionBook>"#;

    #[test]
    fn strict_extractor_reads_core_fields() {
        let meta = extract_strict(SAMPLE).unwrap();
        assert_eq!(meta.title, "Dune");
        assert_eq!(meta.author, "Frank Herbert");
        assert_eq!(meta.series, "Dune Saga");
        assert_eq!(meta.series_number, Some(1));
        assert!(meta.annotation.contains("desert planet"));
    }

    #[test]
    fn tolerant_extractor_handles_malformed_xml() {
        let malformed = "<book-title>Dune</book-title><first-name>Frank</first-name><last-name>Herbert</last-name> & unescaped";
        let meta = extract_tolerant(malformed);
        assert_eq!(meta.title, "Dune");
        assert_eq!(meta.author, "Frank Herbert");
    }

    #[test]
    fn windows_1251_declared_encoding_is_recognized() {
        let declared = declared_encoding(br#"<?xml version="1.0" encoding="windows-1251"?>"#);
        assert_eq!(declared.as_deref(), Some("windows-1251"));
    }

    #[test]
    fn extract_falls_back_to_tolerant_when_strict_yields_no_title() {
        let broken = b"<FictionBook><description><title-info><book-title>Unterminated";
        let meta = extract_bytes(broken).unwrap();
        assert_eq!(meta.title, "Unterminated");
    }
}
