use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use zip::ZipArchive;

use crate::error::{Error, Result};

use super::ExtractedMetadata;

fn open_archive(path: &Path) -> Result<ZipArchive<std::fs::File>> {
    let file = std::fs::File::open(path)?;
    ZipArchive::new(file).map_err(|e| Error::IngestSkip(format!("not a valid epub zip: {e}")))
}

/// Locate the OPF package document via `META-INF/container.xml`'s
/// `rootfile[full-path]`, the only reliable entry point EPUB guarantees.
fn opf_path(archive: &mut ZipArchive<std::fs::File>) -> Result<String> {
    let mut container = archive
        .by_name("META-INF/container.xml")
        .map_err(|e| Error::IngestSkip(format!("missing container.xml: {e}")))?;
    let mut xml = String::new();
    container.read_to_string(&mut xml)?;
    drop(container);

    let mut reader = Reader::from_str(&xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(e)) | Ok(Event::Start(e)) => {
                if e.name().as_ref() == b"rootfile" {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"full-path" {
                            return Ok(String::from_utf8_lossy(&attr.value).into_owned());
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::IngestSkip(format!("container.xml parse error: {e}"))),
            _ => {}
        }
        buf.clear();
    }
    Err(Error::IngestSkip("container.xml has no rootfile".to_string()))
}

fn read_entry(archive: &mut ZipArchive<std::fs::File>, name: &str) -> Result<String> {
    let mut entry = archive
        .by_name(name)
        .map_err(|e| Error::IngestSkip(format!("missing entry {name}: {e}")))?;
    let mut text = String::new();
    entry.read_to_string(&mut text)?;
    Ok(text)
}

fn read_entry_bytes(archive: &mut ZipArchive<std::fs::File>, name: &str) -> Result<Vec<u8>> {
    let mut entry = archive
        .by_name(name)
        .map_err(|e| Error::IngestSkip(format!("missing entry {name}: {e}")))?;
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes)?;
    Ok(bytes)
}

struct Opf {
    meta: ExtractedMetadata,
    cover_id: Option<String>,
    manifest: Vec<(String, String)>,
}

fn parse_opf(xml: &str) -> Result<Opf> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut meta = ExtractedMetadata::default();
    let mut cover_id = None;
    let mut manifest = Vec::new();
    let mut authors = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                path.push(local_name(e.name().as_ref()));
            }
            Ok(Event::End(_)) => {
                path.pop();
            }
            Ok(Event::Empty(e)) => {
                let name = local_name(e.name().as_ref());
                if name == "meta" {
                    let mut attr_name = None;
                    let mut attr_content = None;
                    for attr in e.attributes().flatten() {
                        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
                        let val = String::from_utf8_lossy(&attr.value).to_string();
                        match key.as_str() {
                            "name" => attr_name = Some(val),
                            "content" => attr_content = Some(val),
                            _ => {}
                        }
                    }
                    if attr_name.as_deref() == Some("cover") {
                        cover_id = attr_content;
                    }
                } else if name == "item" {
                    let mut id = None;
                    let mut href = None;
                    let mut properties = String::new();
                    for attr in e.attributes().flatten() {
                        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
                        let val = String::from_utf8_lossy(&attr.value).to_string();
                        match key.as_str() {
                            "id" => id = Some(val),
                            "href" => href = Some(val),
                            "properties" => properties = val,
                            _ => {}
                        }
                    }
                    if let (Some(id), Some(href)) = (id.clone(), href.clone()) {
                        manifest.push((id.clone(), href));
                        if properties.contains("cover-image") {
                            cover_id = Some(id);
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
                    Some("title") => meta.title = text,
                    Some("creator") => authors.push(text),
                    Some("publisher") => meta.publisher = Some(text),
                    Some("date") => meta.year = Some(first_year(&text)),
                    Some("description") => meta.annotation = text,
                    Some("identifier") if text.to_ascii_lowercase().contains("isbn") => {
                        meta.isbn = Some(text)
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::IngestSkip(format!("opf parse error: {e}"))),
            _ => {}
        }
        buf.clear();
    }

    meta.author = authors.join(", ");
    Ok(Opf { meta, cover_id, manifest })
}

fn local_name(raw: &[u8]) -> String {
    let s = String::from_utf8_lossy(raw).to_string();
    s.rsplit(':').next().unwrap_or(&s).to_string()
}

fn first_year(text: &str) -> String {
    text.chars().take(4).collect()
}

pub fn extract(path: &Path) -> Result<ExtractedMetadata> {
    let mut archive = open_archive(path)?;
    let opf_name = opf_path(&mut archive)?;
    let xml = read_entry(&mut archive, &opf_name)?;
    Ok(parse_opf(&xml)?.meta)
}

pub fn extract_cover(path: &Path) -> Result<Option<Vec<u8>>> {
    let mut archive = open_archive(path)?;
    let opf_name = opf_path(&mut archive)?;
    let xml = read_entry(&mut archive, &opf_name)?;
    let opf = parse_opf(&xml)?;

    let opf_dir = Path::new(&opf_name)
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();

    let href = match opf.cover_id {
        Some(id) => opf.manifest.iter().find(|(i, _)| *i == id).map(|(_, h)| h.clone()),
        None => opf
            .manifest
            .iter()
            .find(|(_, h)| {
                let lower = h.to_ascii_lowercase();
                lower.contains("cover") && (lower.ends_with(".jpg") || lower.ends_with(".jpeg") || lower.ends_with(".png"))
            })
            .map(|(_, h)| h.clone()),
    };

    let Some(href) = href else { return Ok(None) };
    let full_path = if opf_dir.is_empty() {
        href
    } else {
        format!("{opf_dir}/{href}")
    };

    match read_entry_bytes(&mut archive, &full_path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPF: &str = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Dune</dc:title>
    <dc:creator>Frank Herbert</dc:creator>
    <dc:publisher>Chilton</dc:publisher>
    <dc:date>1965-01-01</dc:date>
    <meta name="cover" content="cover-img"/>
  </metadata>
  <manifest>
    <item id="cover-img" href="images/cover.jpg" media-type="image/jpeg"/>
    <item id="chap1" href="text/chap1.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
</package>"#;

    #[test]
    fn parses_title_author_and_cover_meta() {
        let opf = parse_opf(OPF).unwrap();
        assert_eq!(opf.meta.title, "Dune");
        assert_eq!(opf.meta.author, "Frank Herbert");
        assert_eq!(opf.cover_id.as_deref(), Some("cover-img"));
        assert_eq!(
            opf.manifest.iter().find(|(id, _)| id == "cover-img").map(|(_, h)| h.as_str()),
            Some("images/cover.jpg")
        );
    }

    #[test]
    fn falls_back_to_properties_cover_image_when_no_meta_cover() {
        let opf_epub3 = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Dune</dc:title>
  </metadata>
  <manifest>
    <item id="cover" href="cover.jpg" media-type="image/jpeg" properties="cover-image"/>
  </manifest>
</package>"#;
        let opf = parse_opf(opf_epub3).unwrap();
        assert_eq!(opf.cover_id.as_deref(), Some("cover"));
    }
}
