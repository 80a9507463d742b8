//! `POST /revision` — starts a background revision run; `GET /progress`
//! returns the shared progress snapshot.

use std::sync::Arc;

use athenaeum_core::{
    snapshot_progress, IpfsPinner, SqliteAuthorRepository, SqliteBookRepository,
    SqliteNostrRepository, SqliteTagRepository,
};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum_extra::extract::cookie::CookieJar;

use crate::auth::is_admin;
use crate::state::AppState;

/// Starts the revision engine on a background task if one isn't already
/// running, and returns immediately. Concurrency is bounded by
/// `AppState::revision_lock`: a second request while one is in flight gets
/// 409 rather than queuing behind it.
pub async fn start_revision(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    if !is_admin(&jar, &state.config.read().unwrap().password_hash) {
        return StatusCode::UNAUTHORIZED;
    }
    if state.revision_lock.try_lock().is_err() {
        return StatusCode::CONFLICT;
    }

    tokio::spawn(async move {
        let _permit = state.revision_lock.lock().await;
        let conn = state.pool.get_connection();
        let book_repo = SqliteBookRepository::new(&conn);
        let author_repo = SqliteAuthorRepository::new(&conn);
        let tag_repo = SqliteTagRepository::new(&conn);
        let nostr_repo = SqliteNostrRepository::new(&conn);
        let config = state.config.read().unwrap().clone();
        let ipfs: Option<&dyn IpfsPinner> = state.ipfs.as_ref().map(|p| p as &dyn IpfsPinner);
        let now = chrono::Utc::now().timestamp();

        athenaeum_core::run_revision(
            &conn,
            &book_repo,
            &author_repo,
            &tag_repo,
            &nostr_repo,
            &state.books_dir,
            &state.covers_dir,
            &state.notes_dir,
            config.rename_book,
            ipfs,
            now,
            &state.progress,
        );
    });

    StatusCode::OK
}

pub async fn progress(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(snapshot_progress(&state.progress))
}
