//! Artifact store (C3): flat `books/`, `covers/`, `notes/` layout under the
//! app directory, filename sanitization, rename-policy placement, and
//! cross-device move semantics.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::config::RenamePolicy;
use crate::error::Result;
use crate::hash::content_hash_file;
use crate::models::FileType;

const FORBIDDEN_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
const MAX_BODY_LEN: usize = 150;
const MAX_TOTAL_LEN: usize = 200;

/// Replace characters invalid in a path component with `_`, trim trailing
/// dots/spaces, and cap length so the result is always a safe filename.
pub fn sanitize_filename(name: &str) -> String {
    let mut cleaned: String = name
        .chars()
        .map(|c| {
            if FORBIDDEN_CHARS.contains(&c) || (c as u32) < 32 {
                '_'
            } else {
                c
            }
        })
        .collect();

    while cleaned.ends_with('.') || cleaned.ends_with(' ') {
        cleaned.pop();
    }

    if cleaned.chars().count() > MAX_BODY_LEN {
        cleaned = cleaned.chars().take(MAX_BODY_LEN).collect();
    }
    if cleaned.len() > MAX_TOTAL_LEN {
        let mut boundary = MAX_TOTAL_LEN;
        while !cleaned.is_char_boundary(boundary) {
            boundary -= 1;
        }
        cleaned.truncate(boundary);
    }
    cleaned
}

/// Computes the filename body used for the `autit` rename policy: a single
/// author name becomes `<author>-<title>`; more than one collapses to the
/// "Коллектив_авторов" (collective of authors) marker.
pub fn autit_stem(authors: &[String], title: &str) -> String {
    let author_part = match authors {
        [] => "Unknown".to_string(),
        [single] => single.clone(),
        _ => "Коллектив_авторов".to_string(),
    };
    format!("{author_part}-{title}")
}

/// Compute the target path under `books_dir` for placing a book, given the
/// active rename policy. Does not touch the filesystem.
pub fn target_path(
    books_dir: &Path,
    policy: RenamePolicy,
    original_filename: &str,
    authors: &[String],
    title: &str,
    file_hash: &str,
    file_type: FileType,
) -> PathBuf {
    let ext = file_type.extension();
    let filename = match policy {
        RenamePolicy::No => sanitize_filename(original_filename),
        RenamePolicy::Autit => {
            let stem = sanitize_filename(&autit_stem(authors, title));
            format!("{stem}.{ext}")
        }
        RenamePolicy::Hash => format!("{file_hash}.{ext}"),
    };
    books_dir.join(filename)
}

pub fn cover_path(covers_dir: &Path, file_hash: &str) -> PathBuf {
    covers_dir.join(format!("{file_hash}.jpg"))
}

pub fn note_path(notes_dir: &Path, file_hash: &str) -> PathBuf {
    notes_dir.join(format!("{file_hash}.txt"))
}

/// Outcome of placing a source file at a computed target path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceOutcome {
    /// Source moved/copied into `target`.
    Placed,
    /// `target` already held identical content; source was removed and the
    /// existing file reused.
    ReusedExisting,
    /// `target` existed with different content; caller should keep the
    /// source at its original location instead.
    Skipped,
}

/// Places `source` at `target` per cross-device move semantics: if `target`
/// already exists, compare content hashes; on exact collision, delete
/// `source` and keep the existing file. On mismatch, do nothing (skip).
/// Otherwise perform a rename, falling back to copy+remove on EXDEV.
pub fn place_file(source: &Path, target: &Path, mode: PlaceMode) -> Result<PlaceOutcome> {
    if target.exists() {
        let source_hash = content_hash_file(source)?;
        let target_hash = content_hash_file(target)?;
        if source_hash == target_hash {
            if mode == PlaceMode::Move {
                std::fs::remove_file(source)?;
            }
            return Ok(PlaceOutcome::ReusedExisting);
        }
        return Ok(PlaceOutcome::Skipped);
    }

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }

    match mode {
        PlaceMode::Copy => {
            std::fs::copy(source, target)?;
        }
        PlaceMode::Move => move_cross_device(source, target)?,
    }
    Ok(PlaceOutcome::Placed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceMode {
    Copy,
    Move,
}

/// Move `source` to `target`, attempting a plain rename first and falling
/// back to copy-then-remove on cross-device errors (`EXDEV`). A remove
/// failure after a successful copy is logged but not raised.
fn move_cross_device(source: &Path, target: &Path) -> Result<()> {
    const EXDEV: i32 = 18;
    match std::fs::rename(source, target) {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(EXDEV) => {
            std::fs::copy(source, target)?;
            if let Err(remove_err) = std::fs::remove_file(source) {
                warn!(
                    source = %source.display(),
                    error = %remove_err,
                    "failed to remove source after cross-device copy"
                );
            }
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn sanitize_replaces_forbidden_characters() {
        let cleaned = sanitize_filename(r#"a<b>c:d"e/f\g|h?i*j"#);
        assert!(!cleaned.chars().any(|c| FORBIDDEN_CHARS.contains(&c)));
    }

    #[test]
    fn sanitize_trims_trailing_dots_and_spaces() {
        let cleaned = sanitize_filename("Dune.. ");
        assert_eq!(cleaned, "Dune");
    }

    #[test]
    fn sanitize_caps_length() {
        let long = "a".repeat(500);
        let cleaned = sanitize_filename(&long);
        assert!(cleaned.len() <= MAX_TOTAL_LEN);
    }

    #[test]
    fn autit_stem_uses_collective_marker_for_multiple_authors() {
        let authors = vec!["A".to_string(), "B".to_string()];
        let stem = autit_stem(&authors, "Title");
        assert_eq!(stem, "Коллектив_авторов-Title");
    }

    #[test]
    fn autit_stem_uses_single_author_name() {
        let authors = vec!["Frank Herbert".to_string()];
        let stem = autit_stem(&authors, "Dune");
        assert_eq!(stem, "Frank Herbert-Dune");
    }

    #[test]
    fn target_path_hash_policy_uses_file_hash() {
        let books_dir = Path::new("/books");
        let target = target_path(
            books_dir,
            RenamePolicy::Hash,
            "original.epub",
            &["Frank Herbert".to_string()],
            "Dune",
            "0123456789abcdef",
            FileType::Epub,
        );
        assert_eq!(target, Path::new("/books/0123456789abcdef.epub"));
    }

    #[test]
    fn place_file_moves_when_target_absent() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.txt");
        std::fs::write(&source, b"hello").unwrap();
        let target = dir.path().join("sub/target.txt");

        let outcome = place_file(&source, &target, PlaceMode::Move).unwrap();
        assert_eq!(outcome, PlaceOutcome::Placed);
        assert!(!source.exists());
        assert!(target.exists());
    }

    #[test]
    fn place_file_reuses_existing_identical_target() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.txt");
        let target = dir.path().join("target.txt");
        std::fs::write(&source, b"hello").unwrap();
        std::fs::write(&target, b"hello").unwrap();

        let outcome = place_file(&source, &target, PlaceMode::Move).unwrap();
        assert_eq!(outcome, PlaceOutcome::ReusedExisting);
        assert!(!source.exists());
        assert!(target.exists());
    }

    #[test]
    fn place_file_skips_on_content_mismatch() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.txt");
        let target = dir.path().join("target.txt");
        std::fs::write(&source, b"hello").unwrap();
        std::fs::write(&target, b"different").unwrap();

        let outcome = place_file(&source, &target, PlaceMode::Move).unwrap();
        assert_eq!(outcome, PlaceOutcome::Skipped);
        assert!(source.exists());
        assert!(target.exists());
    }

    #[test]
    fn place_file_copy_mode_keeps_source() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.txt");
        let target = dir.path().join("target.txt");
        std::fs::write(&source, b"hello").unwrap();

        let outcome = place_file(&source, &target, PlaceMode::Copy).unwrap();
        assert_eq!(outcome, PlaceOutcome::Placed);
        assert!(source.exists());
        assert!(target.exists());
    }
}
