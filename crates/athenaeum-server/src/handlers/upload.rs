//! `POST /upload` — admin multipart file ingest, up to 100 MiB per file.

use std::sync::Arc;

use athenaeum_core::{ingest_file, IngestMode, IpfsPinner};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum_extra::extract::cookie::CookieJar;

use crate::auth::is_admin;
use crate::state::AppState;

pub const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

pub async fn upload(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut multipart: Multipart,
) -> impl IntoResponse {
    if !is_admin(&jar, &state.config.read().unwrap().password_hash) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let mut results = Vec::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = match field.bytes().await {
            Ok(b) if b.len() <= MAX_UPLOAD_BYTES => b,
            Ok(_) => {
                results.push(serde_json::json!({ "file": filename, "error": "too large" }));
                continue;
            }
            Err(e) => {
                results.push(serde_json::json!({ "file": filename, "error": e.to_string() }));
                continue;
            }
        };

        let temp_path = std::env::temp_dir().join(format!("athenaeum-upload-{}", uuid_like()));
        if std::fs::write(&temp_path, &bytes).is_err() {
            results.push(serde_json::json!({ "file": filename, "error": "write failed" }));
            continue;
        }
        // The upload's own filename carries the extension needed for format
        // detection; rename the staged temp file to match before ingesting.
        let staged = temp_path.with_file_name(&filename);
        if std::fs::rename(&temp_path, &staged).is_err() {
            results.push(serde_json::json!({ "file": filename, "error": "stage failed" }));
            continue;
        }

        let config = state.config.read().unwrap().clone();
        let conn = state.pool.get_connection();
        let book_repo = athenaeum_core::SqliteBookRepository::new(&conn);
        let author_repo = athenaeum_core::SqliteAuthorRepository::new(&conn);

        let ipfs_pinner: Option<&dyn IpfsPinner> = state.ipfs.as_ref().map(|p| p as &dyn IpfsPinner);

        let outcome = ingest_file(
            &book_repo,
            &author_repo,
            &staged,
            IngestMode::Move,
            &state.books_dir,
            &state.covers_dir,
            &state.notes_dir,
            config.rename_book,
            ipfs_pinner,
        );
        let _ = std::fs::remove_file(&staged);

        match outcome {
            Ok(o) => results.push(serde_json::json!({
                "file": filename,
                "book_id": o.book_id,
                "file_hash": o.file_hash,
                "deduped": o.deduped,
            })),
            Err(e) => results.push(serde_json::json!({ "file": filename, "error": e.to_string() })),
        }
    }

    Json(serde_json::json!({ "results": results })).into_response()
}

fn uuid_like() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("{nanos:x}")
}
