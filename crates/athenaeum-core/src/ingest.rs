//! Ingest pipeline (C6): the fixed 11-step sequence that turns one file path
//! into a catalog row, placed artifact, optional IPFS pin, author links,
//! cover, and annotation.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::artifact::{self, PlaceMode, PlaceOutcome};
use crate::config::RenamePolicy;
use crate::error::{Error, Result};
use crate::formats::{self, ExtractedMetadata};
use crate::hash::content_hash_file;
use crate::models::{split_author_names, FileType, NewBook};
use crate::storage::repositories::{AuthorRepository, BookRepository};

const COVER_TARGET_HEIGHT: u32 = 600;
const COVER_JPEG_QUALITY: u8 = 85;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestMode {
    Stay,
    Copy,
    Move,
}

/// Sink for pinning a placed book file to IPFS. Implemented by the IPFS
/// client crate; kept as a small trait here so the pipeline stays testable
/// without a running daemon.
pub trait IpfsPinner {
    fn pin(&self, path: &Path) -> Result<String>;
}

pub struct IngestOutcome {
    pub book_id: i64,
    pub file_hash: String,
    pub deduped: bool,
}

/// Run the full ingest pipeline for `source`. `book_repo`/`author_repo` must
/// share the same underlying connection as the caller's transaction scope.
pub fn ingest_file(
    book_repo: &dyn BookRepository,
    author_repo: &dyn AuthorRepository,
    source: &Path,
    mode: IngestMode,
    books_dir: &Path,
    covers_dir: &Path,
    notes_dir: &Path,
    rename_policy: RenamePolicy,
    ipfs: Option<&dyn IpfsPinner>,
) -> Result<IngestOutcome> {
    let declared_type = accept_gate(source)
        .ok_or_else(|| Error::IngestSkip(format!("unsupported file: {}", source.display())))?;

    let (canonical, file_type) = canonicalize(source, declared_type, mode)?;
    let _cleanup = TempGuard(canonical.temp_path());
    let hash_source: &Path = canonical.path(source);

    let final_hash = content_hash_file(hash_source)?;

    if let Some(existing) = book_repo.find_by_hash(&final_hash)? {
        return Ok(IngestOutcome {
            book_id: existing.id,
            file_hash: final_hash,
            deduped: true,
        });
    }

    let mut meta = formats::extract_metadata(hash_source, file_type).unwrap_or_default();
    if !meta.has_title() {
        meta = formats::title_from_filename(source);
    }
    if !meta.has_title() {
        return Err(Error::IngestSkip(format!(
            "no title could be determined for {}",
            source.display()
        )));
    }

    let authors = split_author_names(&meta.author);

    let (file_url, placed_path) = place(
        source,
        &canonical,
        mode,
        books_dir,
        rename_policy,
        &authors,
        &meta,
        &final_hash,
        file_type,
    )?;

    let file_size = std::fs::metadata(&placed_path)?.len() as i64;

    let new_book = NewBook {
        title: meta.title.clone(),
        series: meta.series.clone(),
        series_number: meta.series_number,
        published: None,
        isbn: meta.isbn.clone(),
        year: meta.year.clone(),
        publisher: meta.publisher.clone(),
        file_url,
        file_type,
        file_hash: final_hash.clone(),
        file_size,
        over18: false,
        ipfs_cid: None,
    };
    let book_id = book_repo.insert(&new_book)?;

    if let Some(pinner) = ipfs {
        if let Ok(cid) = pinner.pin(&placed_path) {
            let _ = book_repo.set_ipfs_cid(book_id, &cid);
        }
    }

    for author_name in &authors {
        let author = author_repo.upsert(author_name)?;
        author_repo.link_book(book_id, author.id)?;
    }

    let cover_target = artifact::cover_path(covers_dir, &final_hash);
    if !cover_target.exists() {
        if let Ok(Some(raw_cover)) = formats::extract_cover(hash_source, file_type) {
            if let Ok(resized) = resize_cover(&raw_cover) {
                if let Some(parent) = cover_target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&cover_target, resized)?;
            }
        }
    }

    if !meta.annotation.trim().is_empty() {
        let note_target = artifact::note_path(notes_dir, &final_hash);
        if let Some(parent) = note_target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&note_target, meta.annotation.as_bytes())?;
    }

    Ok(IngestOutcome {
        book_id,
        file_hash: final_hash,
        deduped: false,
    })
}

/// Extension must be one of the supported formats, or a `.zip` whose stem
/// ends in `.fb2` (a raw FB2 already wrapped for exchange).
fn accept_gate(path: &Path) -> Option<FileType> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "fb2" => Some(FileType::Fb2),
        "epub" => Some(FileType::Epub),
        "pdf" => Some(FileType::Pdf),
        "djvu" | "djv" => Some(FileType::Djvu),
        "zip" => {
            let stem = path.file_stem()?.to_str()?.to_ascii_lowercase();
            stem.ends_with(".fb2").then_some(FileType::Fb2Zip)
        }
        _ => None,
    }
}

enum Canonical {
    /// Use the original source path and declared type directly.
    Direct,
    /// A raw `.fb2` wrapped into a temporary ZIP so `.fb2`/`.fb2.zip` share
    /// content identity; the wrapped type becomes `Fb2Zip`.
    Wrapped(PathBuf),
}

impl Canonical {
    fn path<'a>(&'a self, source: &'a Path) -> &'a Path {
        match self {
            Canonical::Direct => source,
            Canonical::Wrapped(p) => p,
        }
    }

    fn temp_path(&self) -> Option<PathBuf> {
        match self {
            Canonical::Direct => None,
            Canonical::Wrapped(p) => Some(p.clone()),
        }
    }
}

fn canonicalize(source: &Path, declared_type: FileType, mode: IngestMode) -> Result<(Canonical, FileType)> {
    if declared_type == FileType::Fb2 && mode != IngestMode::Stay {
        let temp_path = temp_zip_path();
        wrap_fb2_in_zip(source, &temp_path)?;
        Ok((Canonical::Wrapped(temp_path), FileType::Fb2Zip))
    } else {
        Ok((Canonical::Direct, declared_type))
    }
}

fn temp_zip_path() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    std::env::temp_dir().join(format!("athenaeum-ingest-{}-{nanos}.zip", std::process::id()))
}

fn wrap_fb2_in_zip(source: &Path, target: &Path) -> Result<()> {
    let entry_name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "book.fb2".to_string());

    let bytes = std::fs::read(source)?;
    let file = std::fs::File::create(target)?;
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    writer
        .start_file(entry_name, options)
        .map_err(|e| Error::IngestSkip(format!("failed to start zip entry: {e}")))?;
    writer.write_all(&bytes)?;
    writer
        .finish()
        .map_err(|e| Error::IngestSkip(format!("failed to finalize zip: {e}")))?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn place(
    source: &Path,
    canonical: &Canonical,
    mode: IngestMode,
    books_dir: &Path,
    rename_policy: RenamePolicy,
    authors: &[String],
    meta: &ExtractedMetadata,
    final_hash: &str,
    file_type: FileType,
) -> Result<(String, PathBuf)> {
    if mode == IngestMode::Stay {
        let path = canonical.path(source).to_path_buf();
        return Ok((path.to_string_lossy().into_owned(), path));
    }

    let original_filename = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let target = artifact::target_path(
        books_dir,
        rename_policy,
        &original_filename,
        authors,
        &meta.title,
        final_hash,
        file_type,
    );

    let (place_source, place_mode): (&Path, PlaceMode) = match canonical {
        // The wrapped zip is always a temporary we created; it is always
        // consumed into the target regardless of the requested ingest mode.
        Canonical::Wrapped(temp) => (temp, PlaceMode::Move),
        Canonical::Direct => (
            source,
            if mode == IngestMode::Move {
                PlaceMode::Move
            } else {
                PlaceMode::Copy
            },
        ),
    };

    let outcome = artifact::place_file(place_source, &target, place_mode)?;

    if matches!(canonical, Canonical::Wrapped(_)) && mode == IngestMode::Move {
        let _ = std::fs::remove_file(source);
    }

    let placed_path = match outcome {
        PlaceOutcome::Placed | PlaceOutcome::ReusedExisting => target,
        PlaceOutcome::Skipped => place_source.to_path_buf(),
    };
    Ok((placed_path.to_string_lossy().into_owned(), placed_path))
}

/// Resamples to a fixed height of 600px (aspect preserved, Lanczos3) and
/// encodes as JPEG quality 85.
pub fn resize_cover(bytes: &[u8]) -> Result<Vec<u8>> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| Error::IngestSkip(format!("invalid cover image: {e}")))?;
    let resized = img.resize(u32::MAX, COVER_TARGET_HEIGHT, image::imageops::FilterType::Lanczos3);
    let mut buf = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, COVER_JPEG_QUALITY);
    encoder
        .encode_image(&resized)
        .map_err(|e| Error::IngestSkip(format!("cover encode failed: {e}")))?;
    Ok(buf)
}

/// Removes a temporary file on drop, regardless of which exit path the
/// pipeline took.
struct TempGuard(Option<PathBuf>);

impl Drop for TempGuard {
    fn drop(&mut self) {
        if let Some(path) = &self.0 {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::open_in_memory;
    use crate::storage::repositories::{SqliteAuthorRepository, SqliteBookRepository};
    use tempfile::TempDir;

    const SAMPLE_FB2: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<FictionBook>
  <description>
    <title-info>
      <author><first-name>Frank</first-name><last-name>Herbert</last-name></author>
      <book-title>Dune</book-title>
    </title-info>
  </description>
</FictionBook>"#;

    #[test]
    fn accept_gate_recognizes_fb2_zip_by_stem() {
        assert_eq!(accept_gate(Path::new("book.fb2.zip")), Some(FileType::Fb2Zip));
        assert_eq!(accept_gate(Path::new("book.zip")), None);
        assert_eq!(accept_gate(Path::new("book.epub")), Some(FileType::Epub));
        assert_eq!(accept_gate(Path::new("book.txt")), None);
    }

    #[test]
    fn ingest_stay_mode_inserts_book_without_moving_source() {
        let pool = open_in_memory().unwrap();
        let conn = pool.get_connection();
        let book_repo = SqliteBookRepository::new(&conn);
        let author_repo = SqliteAuthorRepository::new(&conn);

        let dir = TempDir::new().unwrap();
        let source = dir.path().join("Frank Herbert - Dune.fb2");
        std::fs::write(&source, SAMPLE_FB2).unwrap();

        let outcome = ingest_file(
            &book_repo,
            &author_repo,
            &source,
            IngestMode::Stay,
            &dir.path().join("books"),
            &dir.path().join("covers"),
            &dir.path().join("notes"),
            RenamePolicy::No,
            None,
        )
        .unwrap();

        assert!(!outcome.deduped);
        assert!(source.exists());
        let book = book_repo.find_by_hash(&outcome.file_hash).unwrap().unwrap();
        assert_eq!(book.title, "Dune");
    }

    #[test]
    fn ingest_copy_mode_wraps_raw_fb2_into_zip_and_keeps_source() {
        let pool = open_in_memory().unwrap();
        let conn = pool.get_connection();
        let book_repo = SqliteBookRepository::new(&conn);
        let author_repo = SqliteAuthorRepository::new(&conn);

        let dir = TempDir::new().unwrap();
        let source = dir.path().join("Frank Herbert - Dune.fb2");
        std::fs::write(&source, SAMPLE_FB2).unwrap();
        let books_dir = dir.path().join("books");

        let outcome = ingest_file(
            &book_repo,
            &author_repo,
            &source,
            IngestMode::Copy,
            &books_dir,
            &dir.path().join("covers"),
            &dir.path().join("notes"),
            RenamePolicy::No,
            None,
        )
        .unwrap();

        assert!(source.exists());
        let book = book_repo.find_by_hash(&outcome.file_hash).unwrap().unwrap();
        assert_eq!(book.file_type, FileType::Fb2Zip);
        assert!(book.file_url.ends_with(".fb2.zip"));
        assert!(Path::new(&book.file_url).exists());
    }

    #[test]
    fn ingest_dedups_identical_content_by_hash() {
        let pool = open_in_memory().unwrap();
        let conn = pool.get_connection();
        let book_repo = SqliteBookRepository::new(&conn);
        let author_repo = SqliteAuthorRepository::new(&conn);

        let dir = TempDir::new().unwrap();
        let source = dir.path().join("Frank Herbert - Dune.fb2");
        std::fs::write(&source, SAMPLE_FB2).unwrap();
        let source2 = dir.path().join("copy.fb2");
        std::fs::write(&source2, SAMPLE_FB2).unwrap();

        let first = ingest_file(
            &book_repo,
            &author_repo,
            &source,
            IngestMode::Stay,
            &dir.path().join("books"),
            &dir.path().join("covers"),
            &dir.path().join("notes"),
            RenamePolicy::No,
            None,
        )
        .unwrap();
        assert!(!first.deduped);

        let second = ingest_file(
            &book_repo,
            &author_repo,
            &source2,
            IngestMode::Stay,
            &dir.path().join("books"),
            &dir.path().join("covers"),
            &dir.path().join("notes"),
            RenamePolicy::No,
            None,
        )
        .unwrap();
        assert!(second.deduped);
        assert_eq!(second.book_id, first.book_id);
    }

    #[test]
    fn ingest_rejects_unsupported_extension() {
        let pool = open_in_memory().unwrap();
        let conn = pool.get_connection();
        let book_repo = SqliteBookRepository::new(&conn);
        let author_repo = SqliteAuthorRepository::new(&conn);

        let dir = TempDir::new().unwrap();
        let source = dir.path().join("notes.txt");
        std::fs::write(&source, b"hello").unwrap();

        let result = ingest_file(
            &book_repo,
            &author_repo,
            &source,
            IngestMode::Stay,
            &dir.path().join("books"),
            &dir.path().join("covers"),
            &dir.path().join("notes"),
            RenamePolicy::No,
            None,
        );
        assert!(matches!(result, Err(Error::IngestSkip(_))));
    }
}
