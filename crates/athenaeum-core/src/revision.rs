//! Revision engine (C7): a single-run, non-interruptible-per-phase
//! reconciliation pass over the catalog and the files under `books_dir`.
//! Progress is published to a shared struct readers can snapshot.

use std::path::Path;
use std::sync::RwLock;

use rusqlite::Connection;
use tracing::warn;

use crate::artifact::{self, PlaceMode};
use crate::config::RenamePolicy;
use crate::error::{Error, Result};
use crate::formats;
use crate::ingest::{self, IngestMode, IpfsPinner};
use crate::models::FileType;
use crate::storage::database::backfill_case_folded_mirrors;
use crate::storage::repositories::{AuthorRepository, BookRepository, BookSearch, NostrRepository, Repository, TagRepository};

const PHASE_WEIGHTS: [u8; 10] = [5, 10, 25, 10, 5, 5, 15, 10, 10, 5];
const NOSTR_REQUEST_MAX_AGE_SECS: i64 = 24 * 3600;
const LOCK_RETRY_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionStatus {
    Idle,
    Running,
    Done,
}

#[derive(Debug, Clone)]
pub struct Progress {
    pub status: RevisionStatus,
    pub progress: u8,
    pub message: String,
    pub error: Option<String>,
    pub started: bool,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            status: RevisionStatus::Idle,
            progress: 0,
            message: String::new(),
            error: None,
            started: false,
        }
    }
}

pub fn snapshot(progress: &RwLock<Progress>) -> Progress {
    progress.read().expect("progress lock poisoned").clone()
}

#[derive(Debug, Default)]
pub struct RevisionSummary {
    pub deleted_missing: usize,
    pub ingested_new: usize,
    pub renamed: usize,
    pub orphan_authors_removed: usize,
    pub orphan_tags_removed: usize,
    pub covers_generated: usize,
    pub annotations_generated: usize,
    pub pinned: usize,
    pub deleted_untracked_files: usize,
}

#[allow(clippy::too_many_arguments)]
pub fn run(
    conn: &Connection,
    book_repo: &dyn BookRepository,
    author_repo: &dyn AuthorRepository,
    tag_repo: &dyn TagRepository,
    nostr_repo: &dyn NostrRepository,
    books_dir: &Path,
    covers_dir: &Path,
    notes_dir: &Path,
    rename_policy: RenamePolicy,
    ipfs: Option<&dyn IpfsPinner>,
    now: i64,
    progress: &RwLock<Progress>,
) -> RevisionSummary {
    {
        let mut guard = progress.write().expect("progress lock poisoned");
        guard.status = RevisionStatus::Running;
        guard.started = true;
        guard.progress = 0;
        guard.error = None;
        guard.message = "starting".to_string();
    }

    let mut summary = RevisionSummary::default();
    let mut cumulative = 0u8;

    cumulative += PHASE_WEIGHTS[0];
    run_phase(progress, cumulative, "backfilling case-folded mirrors", || {
        backfill_case_folded_mirrors(conn).map(|_| ())
    });

    cumulative += PHASE_WEIGHTS[1];
    run_phase(progress, cumulative, "pruning rows with missing files", || {
        phase_delete_missing(book_repo, covers_dir, notes_dir, &mut summary)
    });

    cumulative += PHASE_WEIGHTS[2];
    run_phase(progress, cumulative, "scanning books directory for new files", || {
        phase_scan_new(book_repo, author_repo, books_dir, covers_dir, notes_dir, rename_policy, ipfs, &mut summary)
    });

    cumulative += PHASE_WEIGHTS[3];
    run_phase(progress, cumulative, "applying rename policy", || {
        phase_apply_rename_policy(book_repo, author_repo, books_dir, rename_policy, &mut summary)
    });

    cumulative += PHASE_WEIGHTS[4];
    run_phase(progress, cumulative, "cleaning up orphan links", || {
        summary.orphan_authors_removed = author_repo.delete_orphans()?;
        summary.orphan_tags_removed = tag_repo.delete_orphans()?;
        Ok(())
    });

    cumulative += PHASE_WEIGHTS[5];
    run_phase(progress, cumulative, "purging expired Nostr data", || {
        phase_purge_nostr(nostr_repo, now)
    });

    cumulative += PHASE_WEIGHTS[6];
    run_phase(progress, cumulative, "generating missing covers", || {
        phase_generate_covers(book_repo, covers_dir, &mut summary)
    });

    cumulative += PHASE_WEIGHTS[7];
    run_phase(progress, cumulative, "generating missing annotations", || {
        phase_generate_annotations(book_repo, notes_dir, &mut summary)
    });

    cumulative += PHASE_WEIGHTS[8];
    run_phase(progress, cumulative, "pinning unpinned books", || {
        phase_pin_unpinned(book_repo, ipfs, &mut summary)
    });

    cumulative += PHASE_WEIGHTS[9];
    run_phase(progress, cumulative, "deleting untracked files", || {
        phase_delete_untracked(book_repo, books_dir, &mut summary)
    });

    {
        let mut guard = progress.write().expect("progress lock poisoned");
        guard.status = RevisionStatus::Done;
        guard.progress = 100;
        guard.message = "done".to_string();
    }

    summary
}

/// Runs one phase, logging (not aborting on) failure, and unconditionally
/// advances the published progress counter afterward.
fn run_phase(progress: &RwLock<Progress>, cumulative: u8, label: &str, phase: impl FnOnce() -> Result<()>) {
    if let Err(e) = phase() {
        warn!(phase = label, error = %e, "revision phase reported an error");
        let mut guard = progress.write().expect("progress lock poisoned");
        guard.error = Some(format!("{label}: {e}"));
    }
    let mut guard = progress.write().expect("progress lock poisoned");
    guard.progress = cumulative;
    guard.message = label.to_string();
}

fn all_books(book_repo: &dyn BookRepository) -> Result<Vec<crate::models::Book>> {
    book_repo.search(&BookSearch {
        query_lower: None,
        over18_allowed: true,
        limit: 1_000_000,
        offset: 0,
    })
}

fn phase_delete_missing(
    book_repo: &dyn BookRepository,
    covers_dir: &Path,
    notes_dir: &Path,
    summary: &mut RevisionSummary,
) -> Result<()> {
    for (id, url) in book_repo.all_file_urls()? {
        if !Path::new(&url).exists() {
            if let Some(book) = book_repo.find_by_id(&id)? {
                let _ = std::fs::remove_file(artifact::cover_path(covers_dir, &book.file_hash));
                let _ = std::fs::remove_file(artifact::note_path(notes_dir, &book.file_hash));
            }
            book_repo.delete(&id)?;
            summary.deleted_missing += 1;
        }
    }
    Ok(())
}

fn phase_scan_new(
    book_repo: &dyn BookRepository,
    author_repo: &dyn AuthorRepository,
    books_dir: &Path,
    covers_dir: &Path,
    notes_dir: &Path,
    rename_policy: RenamePolicy,
    ipfs: Option<&dyn IpfsPinner>,
    summary: &mut RevisionSummary,
) -> Result<()> {
    if !books_dir.exists() {
        return Ok(());
    }
    for entry in walkdir::WalkDir::new(books_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        match ingest::ingest_file(
            book_repo,
            author_repo,
            entry.path(),
            IngestMode::Stay,
            books_dir,
            covers_dir,
            notes_dir,
            rename_policy,
            ipfs,
        ) {
            Ok(outcome) if !outcome.deduped => summary.ingested_new += 1,
            Ok(_) => {}
            Err(Error::IngestSkip(_)) => {}
            Err(e) => warn!(path = %entry.path().display(), error = %e, "scan ingest failed"),
        }
    }
    Ok(())
}

fn phase_apply_rename_policy(
    book_repo: &dyn BookRepository,
    author_repo: &dyn AuthorRepository,
    books_dir: &Path,
    rename_policy: RenamePolicy,
    summary: &mut RevisionSummary,
) -> Result<()> {
    for book in all_books(book_repo)? {
        let current = Path::new(&book.file_url);
        if !current.starts_with(books_dir) || !current.exists() {
            continue;
        }
        let authors = author_repo
            .list_for_book(book.id)
            .map(|authors| authors.into_iter().map(|a| a.full_name).collect::<Vec<_>>())
            .unwrap_or_default();
        let original_filename = current
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let target = artifact::target_path(
            books_dir,
            rename_policy,
            &original_filename,
            &authors,
            &book.title,
            &book.file_hash,
            book.file_type,
        );
        if target == current {
            continue;
        }
        if let Ok(outcome) = artifact::place_file(current, &target, PlaceMode::Move) {
            if matches!(outcome, artifact::PlaceOutcome::Placed | artifact::PlaceOutcome::ReusedExisting) {
                book_repo.rename_file_url(book.id, &target.to_string_lossy())?;
                summary.renamed += 1;
            }
        }
    }
    Ok(())
}

fn phase_purge_nostr(nostr_repo: &dyn NostrRepository, now: i64) -> Result<()> {
    nostr_repo.purge_expired_requests(now, NOSTR_REQUEST_MAX_AGE_SECS)?;
    nostr_repo.delete_orphan_responses()?;
    nostr_repo.delete_orphan_response_books()?;
    if nostr_repo.active_requests()?.is_empty() {
        nostr_repo.truncate_all()?;
    }
    Ok(())
}

fn phase_generate_covers(book_repo: &dyn BookRepository, covers_dir: &Path, summary: &mut RevisionSummary) -> Result<()> {
    for book in all_books(book_repo)? {
        let target = artifact::cover_path(covers_dir, &book.file_hash);
        if target.exists() {
            continue;
        }
        let source = Path::new(&book.file_url);
        if !source.exists() {
            continue;
        }
        if let Ok(Some(raw)) = formats::extract_cover(source, book.file_type) {
            if let Ok(resized) = ingest::resize_cover(&raw) {
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&target, resized)?;
                summary.covers_generated += 1;
            }
        }
    }
    Ok(())
}

fn phase_generate_annotations(book_repo: &dyn BookRepository, notes_dir: &Path, summary: &mut RevisionSummary) -> Result<()> {
    for book in all_books(book_repo)? {
        let target = artifact::note_path(notes_dir, &book.file_hash);
        if target.exists() {
            continue;
        }
        let source = Path::new(&book.file_url);
        if !source.exists() {
            continue;
        }
        if let Ok(meta) = formats::extract_metadata(source, book.file_type) {
            if !meta.annotation.trim().is_empty() {
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&target, meta.annotation.as_bytes())?;
                summary.annotations_generated += 1;
            }
        }
    }
    Ok(())
}

fn phase_pin_unpinned(book_repo: &dyn BookRepository, ipfs: Option<&dyn IpfsPinner>, summary: &mut RevisionSummary) -> Result<()> {
    let Some(pinner) = ipfs else { return Ok(()) };
    for book in all_books(book_repo)? {
        if book.ipfs_cid.is_some() {
            continue;
        }
        let source = Path::new(&book.file_url);
        if !source.exists() {
            continue;
        }
        if let Ok(cid) = pinner.pin(source) {
            set_ipfs_cid_with_retry(book_repo, book.id, &cid)?;
            summary.pinned += 1;
        }
    }
    Ok(())
}

/// Retries an `ipfs_cid` update on lock contention: up to 5 attempts with
/// backoff of 200ms times the attempt number.
fn set_ipfs_cid_with_retry(book_repo: &dyn BookRepository, book_id: i64, cid: &str) -> Result<()> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match book_repo.set_ipfs_cid(book_id, cid) {
            Ok(()) => return Ok(()),
            Err(e) if e.is_lock_contention() && attempt < LOCK_RETRY_ATTEMPTS => {
                std::thread::sleep(std::time::Duration::from_millis(200 * attempt as u64));
            }
            Err(e) if e.is_lock_contention() => {
                return Err(Error::LockContention { attempts: attempt });
            }
            Err(e) => return Err(e),
        }
    }
}

fn phase_delete_untracked(book_repo: &dyn BookRepository, books_dir: &Path, summary: &mut RevisionSummary) -> Result<()> {
    if !books_dir.exists() {
        return Ok(());
    }
    let known: std::collections::HashSet<String> = book_repo
        .all_file_urls()?
        .into_iter()
        .map(|(_, url)| url)
        .collect();

    for entry in walkdir::WalkDir::new(books_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path_str = entry.path().to_string_lossy().into_owned();
        if !known.contains(&path_str) && FileType::from_extension(entry.path().extension().and_then(|e| e.to_str()).unwrap_or("")).is_some() {
            if std::fs::remove_file(entry.path()).is_ok() {
                summary.deleted_untracked_files += 1;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::open_in_memory;
    use crate::storage::repositories::{SqliteAuthorRepository, SqliteBookRepository, SqliteNostrRepository, SqliteTagRepository};
    use tempfile::TempDir;

    #[test]
    fn run_completes_all_phases_and_reports_done() {
        let pool = open_in_memory().unwrap();
        let conn = pool.get_connection();
        let book_repo = SqliteBookRepository::new(&conn);
        let author_repo = SqliteAuthorRepository::new(&conn);
        let tag_repo = SqliteTagRepository::new(&conn);
        let nostr_repo = SqliteNostrRepository::new(&conn);

        let dir = TempDir::new().unwrap();
        let progress = RwLock::new(Progress::default());

        let summary = run(
            &conn,
            &book_repo,
            &author_repo,
            &tag_repo,
            &nostr_repo,
            &dir.path().join("books"),
            &dir.path().join("covers"),
            &dir.path().join("notes"),
            RenamePolicy::No,
            None,
            0,
            &progress,
        );

        assert_eq!(summary.deleted_missing, 0);
        let snap = snapshot(&progress);
        assert_eq!(snap.status, RevisionStatus::Done);
        assert_eq!(snap.progress, 100);
    }

    #[test]
    fn phase_delete_missing_removes_rows_with_absent_files() {
        let pool = open_in_memory().unwrap();
        let conn = pool.get_connection();
        let book_repo = SqliteBookRepository::new(&conn);
        book_repo
            .insert(&crate::models::NewBook {
                title: "Ghost".to_string(),
                series: String::new(),
                series_number: None,
                published: None,
                isbn: None,
                year: None,
                publisher: None,
                file_url: "/nonexistent/ghost.epub".to_string(),
                file_type: FileType::Epub,
                file_hash: "0123456789abcdef".to_string(),
                file_size: 10,
                over18: false,
                ipfs_cid: None,
            })
            .unwrap();

        let dir = TempDir::new().unwrap();
        let mut summary = RevisionSummary::default();
        phase_delete_missing(&book_repo, &dir.path().join("covers"), &dir.path().join("notes"), &mut summary).unwrap();

        assert_eq!(summary.deleted_missing, 1);
        assert!(book_repo.find_by_hash("0123456789abcdef").unwrap().is_none());
    }
}
