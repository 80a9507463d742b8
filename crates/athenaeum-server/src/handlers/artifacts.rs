//! Artifact serving: covers, notes, acquisition downloads, and identicons.

use std::sync::Arc;

use athenaeum_core::{artifact, BookRepository, Repository, SqliteBookRepository};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::identicon;
use crate::state::AppState;

const CACHE_FOREVER: &str = "public, max-age=31536000";

pub async fn cover(State(state): State<Arc<AppState>>, Path(hash): Path<String>) -> impl IntoResponse {
    let hash = hash.trim_end_matches(".jpg");
    serve_file(artifact::cover_path(&state.covers_dir, hash), "image/jpeg").await
}

pub async fn note(State(state): State<Arc<AppState>>, Path(hash): Path<String>) -> impl IntoResponse {
    let hash = hash.trim_end_matches(".txt");
    serve_file(artifact::note_path(&state.notes_dir, hash), "text/plain; charset=utf-8").await
}

/// `GET /opds-download/{id}/{filename}` — the human-readable filename is
/// cosmetic; the artifact is resolved by the catalog row's `file_url`.
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path((id, _filename)): Path<(i64, String)>,
) -> impl IntoResponse {
    let conn = state.pool.get_connection();
    let repo = SqliteBookRepository::new(&conn);
    let book = match repo.find_by_id(&id) {
        Ok(Some(book)) => book,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };
    drop(repo);
    serve_file_with_mime(state.books_dir.join(&book.file_url), book.file_type.mime()).await
}

pub async fn identicon_png(Path(segment): Path<String>) -> impl IntoResponse {
    let raw_segment = segment.trim_end_matches(".png");
    match identicon::render(raw_segment.as_bytes()) {
        Ok(png) => Response::builder()
            .header(header::CONTENT_TYPE, "image/png")
            .header(header::CACHE_CONTROL, CACHE_FOREVER)
            .body(Bytes::from(png).into())
            .unwrap(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn serve_file(path: std::path::PathBuf, mime: &str) -> Response {
    serve_file_with_mime(path, mime).await
}

async fn serve_file_with_mime(path: std::path::PathBuf, mime: &str) -> Response {
    match tokio::fs::read(&path).await {
        Ok(bytes) => Response::builder()
            .header(header::CONTENT_TYPE, mime)
            .header(header::CACHE_CONTROL, CACHE_FOREVER)
            .body(Bytes::from(bytes).into())
            .unwrap(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}
