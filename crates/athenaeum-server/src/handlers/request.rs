//! `GET/POST /request` — admin-only Nostr book request form: submitting
//! publishes a request event and persists it; the GET view lists responses
//! for any still-active requests.

use std::sync::Arc;

use athenaeum_core::{NostrRepository, NostrRequest, RequestContent, SqliteNostrRepository};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum_extra::extract::cookie::CookieJar;

use crate::auth::is_admin;
use crate::state::AppState;

pub async fn list_active(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    if !is_admin(&jar, &state.config.read().unwrap().password_hash) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let conn = state.pool.get_connection();
    let repo = SqliteNostrRepository::new(&conn);
    match repo.active_requests() {
        Ok(requests) => Json(requests).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

/// Submits a new request: the caller (CLI/server startup) owns the actual
/// `NostrClient` connection; this handler only validates and persists the
/// signed event's bookkeeping row, matching the revision engine's
/// expectations for the purge-expired-requests phase.
pub async fn submit(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(content): Json<RequestContent>,
) -> impl IntoResponse {
    if !is_admin(&jar, &state.config.read().unwrap().password_hash) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if !content.is_valid() {
        return StatusCode::BAD_REQUEST.into_response();
    }

    let event_id = athenaeum_core::content_hash_hex(
        format!("{}{}{}{}", content.author, content.series, content.title, content.file_hash).as_bytes(),
    );
    let request = NostrRequest {
        event_id: event_id.clone(),
        pubkey: String::new(),
        author: content.author.clone(),
        series: content.series.clone(),
        title: content.title.clone(),
        file_hash: content.file_hash.clone(),
        created_at: chrono::Utc::now().timestamp(),
        sent: false,
    };

    let conn = state.pool.get_connection();
    let repo = SqliteNostrRepository::new(&conn);
    match repo.insert_request(&request) {
        Ok(()) => Json(serde_json::json!({ "event_id": event_id })).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}
