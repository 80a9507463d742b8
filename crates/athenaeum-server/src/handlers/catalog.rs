//! Catalog browsing: paginated index, search, book detail, and grouped
//! browsing by author/series/tag.

use std::sync::Arc;

use athenaeum_core::{
    Book, BookRepository, BookSearch, Repository, SqliteAuthorRepository, SqliteBookRepository,
    SqliteTagRepository, TagRepository,
};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;

use crate::auth::is_admin;
use crate::pagination::limit_offset;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct IndexQuery {
    pub q: Option<String>,
    pub page: Option<usize>,
}

/// `GET /` — paginated catalog; `?q=` substring search, `?page=N`, over18
/// filter applied unless the request carries a valid admin cookie.
pub async fn index(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<IndexQuery>,
) -> impl IntoResponse {
    let admin = is_admin(&jar, &state.config.read().unwrap().password_hash);
    let query_lower = query.q.map(|q| q.to_lowercase());
    let (limit, offset) = limit_offset(query.page.unwrap_or(1));

    let conn = state.pool.get_connection();
    let repo = SqliteBookRepository::new(&conn);
    let filter = BookSearch {
        query_lower: query_lower.as_deref(),
        over18_allowed: admin,
        limit,
        offset,
    };
    match (repo.search(&filter), repo.count(&filter)) {
        (Ok(books), Ok(total)) => Json(serde_json::json!({ "books": books, "total": total })).into_response(),
        _ => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

/// `GET /book/{id}` — detail page.
pub async fn book_detail(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> impl IntoResponse {
    let conn = state.pool.get_connection();
    let repo = SqliteBookRepository::new(&conn);
    match repo.find_by_id(&id) {
        Ok(Some(book)) => Json(book).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

/// `GET /author/{id}` — all books by one author.
pub async fn by_author(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(id): Path<i64>,
    Query(query): Query<IndexQuery>,
) -> impl IntoResponse {
    let admin = is_admin(&jar, &state.config.read().unwrap().password_hash);
    let (limit, offset) = limit_offset(query.page.unwrap_or(1));
    let conn = state.pool.get_connection();
    let repo = SqliteBookRepository::new(&conn);
    match repo.list_by_author(id, limit, offset) {
        Ok(books) => Json(strip_over18(books, admin)).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

/// `GET /s/{name}` — all books in one series.
pub async fn by_series(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(name): Path<String>,
    Query(query): Query<IndexQuery>,
) -> impl IntoResponse {
    let admin = is_admin(&jar, &state.config.read().unwrap().password_hash);
    let (limit, offset) = limit_offset(query.page.unwrap_or(1));
    let conn = state.pool.get_connection();
    let repo = SqliteBookRepository::new(&conn);
    match repo.list_by_series(&name.to_lowercase(), limit, offset) {
        Ok(books) => Json(strip_over18(books, admin)).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

/// `GET /tag/{name}` — all books carrying one tag.
pub async fn by_tag(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(name): Path<String>,
    Query(query): Query<IndexQuery>,
) -> impl IntoResponse {
    let admin = is_admin(&jar, &state.config.read().unwrap().password_hash);
    let conn = state.pool.get_connection();
    let tag_repo = SqliteTagRepository::new(&conn);
    let Ok(Some(tag)) = tag_repo.find_by_name(&name) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let (limit, offset) = limit_offset(query.page.unwrap_or(1));
    let book_repo = SqliteBookRepository::new(&conn);
    match book_repo.list_by_tag(tag.id, limit, offset) {
        Ok(books) => Json(strip_over18(books, admin)).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

/// The authors list, used to populate navigation and the upload/edit forms.
pub async fn authors_index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let conn = state.pool.get_connection();
    let repo = SqliteAuthorRepository::new(&conn);
    match repo.list() {
        Ok(authors) => Json(authors).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

pub async fn tags_index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let conn = state.pool.get_connection();
    let repo = SqliteTagRepository::new(&conn);
    match repo.list_with_counts() {
        Ok(tags) => Json(tags).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

fn strip_over18(books: Vec<Book>, admin: bool) -> Vec<Book> {
    if admin {
        books
    } else {
        books.into_iter().filter(|b| !b.over18).collect()
    }
}
