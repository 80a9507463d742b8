//! OPDS Atom feed routes. The navigation-vs-acquisition and alphabet-index
//! decisions live in `crate::opds`; this module only wires them to the
//! catalog repositories and emits the minimal well-formed Atom envelope a
//! reader client needs. Full OPDS 1.1 XML grammar is out of scope.

use std::sync::Arc;

use athenaeum_core::{
    AuthorRepository, Book, BookRepository, BookSearch, SqliteAuthorRepository, SqliteBookRepository,
    SqliteTagRepository, TagRepository,
};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::auth::is_admin;
use crate::opds::{alphabet_buckets, bucket_for_title, needs_alphabet_index, DEFAULT_PAGINATION_THRESHOLD};
use crate::state::AppState;

const FEED_MIME: &str = "application/atom+xml;charset=utf-8";
/// Large enough to stand in for "no limit" against a personal library; the
/// subcategory listings this backs are bucketed by the alphabet index well
/// before a real catalog would approach it.
const UNBOUNDED: usize = 1_000_000;

#[derive(Debug, Deserialize, Default)]
pub struct LetterQuery {
    pub letter: Option<String>,
}

/// `GET /opds` — root navigation feed.
pub async fn root() -> impl IntoResponse {
    let entries = [
        ("By author", "/opds/authors"),
        ("By series", "/opds/series"),
        ("By tag", "/opds/tags"),
        ("All books", "/opds/all"),
    ]
    .into_iter()
    .map(|(title, href)| (title.to_string(), href.to_string()));
    xml(navigation_feed("Athenaeum", "/opds", entries))
}

/// `GET /opds/authors` — navigation feed listing every author.
pub async fn authors(State(state): State<Arc<AppState>>) -> Response {
    let conn = state.pool.get_connection();
    let repo = SqliteAuthorRepository::new(&conn);
    let authors = match repo.list() {
        Ok(a) => a,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };
    let entries = authors
        .into_iter()
        .map(|a| (a.full_name, format!("/opds/author/{}", a.id)));
    xml(navigation_feed("Authors", "/opds/authors", entries))
}

/// `GET /opds/tags` — navigation feed listing every tag with its book count.
pub async fn tags(State(state): State<Arc<AppState>>) -> Response {
    let conn = state.pool.get_connection();
    let repo = SqliteTagRepository::new(&conn);
    let tags = match repo.list_with_counts() {
        Ok(t) => t,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };
    let entries = tags
        .into_iter()
        .map(|(tag, count)| (format!("{} ({})", tag.name, count), format!("/opds/tag/{}", tag.name)));
    xml(navigation_feed("Tags", "/opds/tags", entries))
}

/// `GET /opds/series` — navigation feed listing every non-empty series name.
pub async fn series(State(state): State<Arc<AppState>>) -> Response {
    let conn = state.pool.get_connection();
    let names = (|| -> rusqlite::Result<Vec<String>> {
        let mut stmt = conn
            .prepare("SELECT series FROM books WHERE series != '' GROUP BY series_lower ORDER BY series_lower")?;
        stmt.query_map([], |row| row.get::<_, String>(0))?.collect()
    })();
    let names = match names {
        Ok(n) => n,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };
    let entries = names.into_iter().map(|name| {
        let href = format!("/opds/s/{}", name);
        (name, href)
    });
    xml(navigation_feed("Series", "/opds/series", entries))
}

/// `GET /opds/author/{id}` — that author's books, alphabet-indexed if the
/// count exceeds the configured threshold.
pub async fn by_author(
    State(state): State<Arc<AppState>>,
    jar: axum_extra::extract::cookie::CookieJar,
    Path(id): Path<i64>,
    Query(query): Query<LetterQuery>,
) -> Response {
    let admin = is_admin(&jar, &state.config.read().unwrap().password_hash);
    let conn = state.pool.get_connection();
    let repo = SqliteBookRepository::new(&conn);
    let books = match repo.list_by_author(id, UNBOUNDED, 0) {
        Ok(b) => b,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };
    let base = format!("/opds/author/{}", id);
    listing_response("Author", &base, books, admin, query.letter.as_deref())
}

/// `GET /opds/s/{name}` — that series' books.
pub async fn by_series(
    State(state): State<Arc<AppState>>,
    jar: axum_extra::extract::cookie::CookieJar,
    Path(name): Path<String>,
    Query(query): Query<LetterQuery>,
) -> Response {
    let admin = is_admin(&jar, &state.config.read().unwrap().password_hash);
    let conn = state.pool.get_connection();
    let repo = SqliteBookRepository::new(&conn);
    let books = match repo.list_by_series(&name.to_lowercase(), UNBOUNDED, 0) {
        Ok(b) => b,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };
    let base = format!("/opds/s/{}", name);
    listing_response("Series", &base, books, admin, query.letter.as_deref())
}

/// `GET /opds/tag/{name}` — books carrying one tag.
pub async fn by_tag(
    State(state): State<Arc<AppState>>,
    jar: axum_extra::extract::cookie::CookieJar,
    Path(name): Path<String>,
    Query(query): Query<LetterQuery>,
) -> Response {
    let admin = is_admin(&jar, &state.config.read().unwrap().password_hash);
    let conn = state.pool.get_connection();
    let tag_repo = SqliteTagRepository::new(&conn);
    let Ok(Some(tag)) = tag_repo.find_by_name(&name) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let book_repo = SqliteBookRepository::new(&conn);
    let books = match book_repo.list_by_tag(tag.id, UNBOUNDED, 0) {
        Ok(b) => b,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };
    let base = format!("/opds/tag/{}", name);
    listing_response("Tag", &base, books, admin, query.letter.as_deref())
}

/// `GET /opds/all` — the whole catalog, alphabet-indexed once it grows past
/// the pagination threshold.
pub async fn all_books(
    State(state): State<Arc<AppState>>,
    jar: axum_extra::extract::cookie::CookieJar,
    Query(query): Query<LetterQuery>,
) -> Response {
    let admin = is_admin(&jar, &state.config.read().unwrap().password_hash);
    let conn = state.pool.get_connection();
    let repo = SqliteBookRepository::new(&conn);
    let filter = BookSearch { query_lower: None, over18_allowed: true, limit: UNBOUNDED, offset: 0 };
    let books = match repo.search(&filter) {
        Ok(b) => b,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };
    listing_response("All books", "/opds/all", books, admin, query.letter.as_deref())
}

/// Shared threshold/alphabet-index decision for any subcategory listing:
/// strips over18 for non-admins, then either narrows to one bucket's
/// acquisition feed (`letter` set), emits the alphabet-index navigation feed
/// (count over threshold, no bucket chosen yet), or the full acquisition feed.
fn listing_response(title: &str, base: &str, books: Vec<Book>, admin: bool, letter: Option<&str>) -> Response {
    let books: Vec<Book> = if admin { books } else { books.into_iter().filter(|b| !b.over18).collect() };

    if let Some(letter) = letter {
        let bucket = letter.chars().next().unwrap_or('#');
        let filtered: Vec<Book> = books.into_iter().filter(|b| bucket_for_title(&b.title) == bucket).collect();
        return xml(acquisition_feed(&format!("{} — {}", title, bucket), base, &filtered));
    }

    if needs_alphabet_index(books.len(), DEFAULT_PAGINATION_THRESHOLD) {
        let entries = alphabet_buckets().into_iter().map(|ch| (ch.to_string(), format!("{}?letter={}", base, ch)));
        xml(navigation_feed(title, base, entries))
    } else {
        xml(acquisition_feed(title, base, &books))
    }
}

fn xml(body: String) -> Response {
    Response::builder()
        .header(header::CONTENT_TYPE, FEED_MIME)
        .body(body.into())
        .unwrap()
}

fn navigation_feed(title: &str, self_href: &str, entries: impl Iterator<Item = (String, String)>) -> String {
    let mut body = String::new();
    body.push_str(&feed_header(title, self_href));
    for (name, href) in entries {
        body.push_str(&format!(
            "<entry><title>{}</title><id>{}</id><link rel=\"subsection\" href=\"{}\" type=\"application/atom+xml;profile=opds-catalog;kind=navigation\"/></entry>",
            escape(&name),
            escape(&href),
            escape(&href),
        ));
    }
    body.push_str("</feed>");
    body
}

fn acquisition_feed(title: &str, self_href: &str, books: &[Book]) -> String {
    let mut body = String::new();
    body.push_str(&feed_header(title, self_href));
    for book in books {
        let download_url = format!("/opds-download/{}/{}.{}", book.id, slugify(&book.title), book.file_type.extension());
        body.push_str(&format!(
            "<entry><title>{}</title><id>urn:athenaeum:book:{}</id><link rel=\"http://opds-spec.org/acquisition\" href=\"{}\" type=\"{}\"/></entry>",
            escape(&book.title),
            book.id,
            escape(&download_url),
            book.file_type.mime(),
        ));
    }
    body.push_str("</feed>");
    body
}

fn feed_header(title: &str, self_href: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><feed xmlns=\"http://www.w3.org/2005/Atom\" xmlns:opds=\"http://opds-spec.org/2010/catalog\"><title>{}</title><id>urn:athenaeum:{}</id><link rel=\"self\" href=\"{}\" type=\"{}\"/>",
        escape(title),
        escape(self_href),
        escape(self_href),
        FEED_MIME,
    )
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}

fn slugify(title: &str) -> String {
    title
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(id: i64, title: &str, over18: bool) -> Book {
        Book {
            id,
            title: title.to_string(),
            title_lower: title.to_lowercase(),
            series: String::new(),
            series_lower: String::new(),
            series_number: None,
            published: None,
            isbn: None,
            year: None,
            publisher: None,
            file_url: "x.fb2".to_string(),
            file_type: athenaeum_core::FileType::Fb2,
            file_hash: "h".to_string(),
            file_size: 1,
            over18,
            ipfs_cid: None,
        }
    }

    #[test]
    fn listing_response_strips_over18_for_non_admin() {
        let books = vec![book(1, "Dune", false), book(2, "Adult Title", true)];
        let resp = listing_response("t", "/opds/all", books, false, None);
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn feed_entries_escape_reserved_xml_characters() {
        let feed = acquisition_feed("t", "/opds/all", &[book(1, "A & B <Title>", false)]);
        assert!(feed.contains("A &amp; B &lt;Title&gt;"));
    }
}
