//! Admin field edits and deletion.

use std::sync::Arc;

use athenaeum_core::{
    artifact, AuthorRepository, BookRepository, Repository, SqliteAuthorRepository,
    SqliteBookRepository,
};
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;

use crate::auth::is_admin;
use crate::state::AppState;

pub const MAX_COVER_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct BookEdit {
    pub title: Option<String>,
    pub series: Option<String>,
    pub over18: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct AuthorEdit {
    pub full_name: String,
}

#[derive(Debug, Deserialize)]
pub struct SeriesEdit {
    pub series: String,
}

/// `POST /delete/book/{id}` — removes the catalog row, its placed file,
/// cover, and note, and unpins from IPFS when configured to do so.
pub async fn delete_book(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    if !is_admin(&jar, &state.config.read().unwrap().password_hash) {
        return StatusCode::UNAUTHORIZED;
    }

    let conn = state.pool.get_connection();
    let repo = SqliteBookRepository::new(&conn);
    let book = match repo.find_by_id(&id) {
        Ok(Some(book)) => book,
        Ok(None) => return StatusCode::NOT_FOUND,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR,
    };

    let _ = std::fs::remove_file(state.books_dir.join(&book.file_url));
    let _ = std::fs::remove_file(artifact::cover_path(&state.covers_dir, &book.file_hash));
    let _ = std::fs::remove_file(artifact::note_path(&state.notes_dir, &book.file_hash));

    if state.config.read().unwrap().remove_from_ipfs_on_delete {
        if let (Some(ipfs), Some(cid)) = (&state.ipfs, &book.ipfs_cid) {
            let _ = ipfs.unpin(cid);
        }
    }

    match repo.delete(&id) {
        Ok(true) => StatusCode::OK,
        Ok(false) => StatusCode::NOT_FOUND,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// `POST /save/book/{id}` — title/series/over18 field edits.
pub async fn save_book(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(id): Path<i64>,
    axum::Json(edit): axum::Json<BookEdit>,
) -> impl IntoResponse {
    if !is_admin(&jar, &state.config.read().unwrap().password_hash) {
        return StatusCode::UNAUTHORIZED;
    }

    let conn = state.pool.get_connection();
    let repo = SqliteBookRepository::new(&conn);
    let Ok(Some(existing)) = repo.find_by_id(&id) else {
        return StatusCode::NOT_FOUND;
    };

    let title = edit.title.unwrap_or(existing.title);
    let series = edit.series.unwrap_or(existing.series);
    let over18 = edit.over18.unwrap_or(existing.over18);

    match repo.update_metadata(id, &title, &series, over18) {
        Ok(true) => StatusCode::OK,
        Ok(false) => StatusCode::NOT_FOUND,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// `POST /save/author/{id}` — renames an author's display name, keeping
/// the case-folded mirror columns in sync.
pub async fn save_author(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(id): Path<i64>,
    axum::Json(edit): axum::Json<AuthorEdit>,
) -> impl IntoResponse {
    if !is_admin(&jar, &state.config.read().unwrap().password_hash) {
        return StatusCode::UNAUTHORIZED;
    }

    let conn = state.pool.get_connection();
    let repo = SqliteAuthorRepository::new(&conn);
    match repo.rename(id, &edit.full_name) {
        Ok(true) => StatusCode::OK,
        Ok(false) => StatusCode::NOT_FOUND,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// `POST /save/series/{name}` — renames a series across every book that
/// carries it. `name` is the series' current, case-folded form.
pub async fn save_series(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(name): Path<String>,
    axum::Json(edit): axum::Json<SeriesEdit>,
) -> impl IntoResponse {
    if !is_admin(&jar, &state.config.read().unwrap().password_hash) {
        return StatusCode::UNAUTHORIZED;
    }

    let conn = state.pool.get_connection();
    let repo = SqliteBookRepository::new(&conn);
    match repo.rename_series(&name.to_lowercase(), &edit.series) {
        Ok(0) => StatusCode::NOT_FOUND,
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// `POST /save/book/{id}/cover` — replaces a book's cover image with an
/// uploaded one, resized through the same pipeline ingest uses.
pub async fn save_book_cover(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    if !is_admin(&jar, &state.config.read().unwrap().password_hash) {
        return StatusCode::UNAUTHORIZED;
    }

    let conn = state.pool.get_connection();
    let repo = SqliteBookRepository::new(&conn);
    let book = match repo.find_by_id(&id) {
        Ok(Some(book)) => book,
        Ok(None) => return StatusCode::NOT_FOUND,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR,
    };

    let Ok(Some(field)) = multipart.next_field().await else {
        return StatusCode::BAD_REQUEST;
    };
    let bytes = match field.bytes().await {
        Ok(b) if b.len() <= MAX_COVER_BYTES => b,
        Ok(_) => return StatusCode::PAYLOAD_TOO_LARGE,
        Err(_) => return StatusCode::BAD_REQUEST,
    };

    let resized = match athenaeum_core::resize_cover(&bytes) {
        Ok(resized) => resized,
        Err(_) => return StatusCode::BAD_REQUEST,
    };

    match std::fs::write(artifact::cover_path(&state.covers_dir, &book.file_hash), resized) {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
