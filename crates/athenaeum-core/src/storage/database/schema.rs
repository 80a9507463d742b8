use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: u32 = 1;

pub fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        ",
    )?;
    Ok(())
}

pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS books (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            title          TEXT NOT NULL,
            title_lower    TEXT NOT NULL,
            series         TEXT NOT NULL DEFAULT '',
            series_lower   TEXT NOT NULL DEFAULT '',
            series_number  INTEGER,
            published      TEXT,
            isbn           TEXT,
            year           TEXT,
            publisher      TEXT,
            file_url       TEXT NOT NULL,
            file_type      TEXT NOT NULL,
            file_hash      TEXT NOT NULL UNIQUE,
            file_size      INTEGER NOT NULL DEFAULT 0,
            over18         INTEGER NOT NULL DEFAULT 0,
            ipfs_cid       TEXT
        );

        CREATE TABLE IF NOT EXISTS authors (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            full_name       TEXT NOT NULL UNIQUE,
            full_name_lower TEXT NOT NULL,
            last_name_lower TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS book_authors (
            book_id   INTEGER NOT NULL REFERENCES books(id) ON DELETE CASCADE,
            author_id INTEGER NOT NULL REFERENCES authors(id) ON DELETE CASCADE,
            PRIMARY KEY (book_id, author_id)
        );

        CREATE TABLE IF NOT EXISTS tags (
            id   INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS book_tags (
            book_id INTEGER NOT NULL REFERENCES books(id) ON DELETE CASCADE,
            tag_id  INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
            PRIMARY KEY (book_id, tag_id)
        );

        CREATE TABLE IF NOT EXISTS nostr_book_requests (
            event_id   TEXT PRIMARY KEY,
            pubkey     TEXT NOT NULL,
            author     TEXT NOT NULL DEFAULT '',
            series     TEXT NOT NULL DEFAULT '',
            title      TEXT NOT NULL DEFAULT '',
            file_hash  TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL,
            sent       INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS nostr_responses (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            request_event_id  TEXT NOT NULL,
            responder_pubkey  TEXT NOT NULL,
            received_at       INTEGER NOT NULL,
            raw_content       TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS nostr_response_books (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            response_id   INTEGER NOT NULL REFERENCES nostr_responses(id) ON DELETE CASCADE,
            title         TEXT NOT NULL,
            authors_json  TEXT NOT NULL,
            series        TEXT,
            series_number INTEGER,
            file_type     TEXT NOT NULL,
            file_hash     TEXT NOT NULL,
            file_size     INTEGER NOT NULL,
            ipfs_cid      TEXT NOT NULL UNIQUE,
            raw_json      TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

pub fn create_indexes(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_books_title_lower    ON books(title_lower);
        CREATE INDEX IF NOT EXISTS idx_books_series_lower   ON books(series_lower);
        CREATE INDEX IF NOT EXISTS idx_books_file_hash       ON books(file_hash);
        CREATE INDEX IF NOT EXISTS idx_authors_full_name_lower ON authors(full_name_lower);
        CREATE INDEX IF NOT EXISTS idx_authors_last_name_lower ON authors(last_name_lower);
        CREATE INDEX IF NOT EXISTS idx_book_authors_author    ON book_authors(author_id);
        CREATE INDEX IF NOT EXISTS idx_book_tags_tag          ON book_tags(tag_id);
        CREATE INDEX IF NOT EXISTS idx_nostr_requests_created ON nostr_book_requests(created_at);
        CREATE INDEX IF NOT EXISTS idx_nostr_responses_request ON nostr_responses(request_event_id);
        CREATE INDEX IF NOT EXISTS idx_nostr_response_books_response ON nostr_response_books(response_id);
        ",
    )?;
    Ok(())
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    create_tables(conn)?;
    create_indexes(conn)?;
    Ok(())
}

/// Recompute case-folded mirror columns for rows that predate an import or a
/// direct write that bypassed the repository layer (revision engine phase 1,
/// and the one-shot startup migration's population step).
pub fn backfill_case_folded_mirrors(conn: &Connection) -> Result<usize> {
    let mut touched = 0usize;

    // SQL LOWER() only folds ASCII under bundled SQLite (no ICU), so the
    // comparison and the replacement value are both computed in Rust with
    // `str::to_lowercase`, same as `last_name_lower` below.
    let mut stmt = conn.prepare("SELECT id, title, title_lower FROM books")?;
    let mut to_fix = Vec::new();
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;
    for row in rows {
        let (id, title, title_lower) = row?;
        let expected = title.to_lowercase();
        if expected != title_lower {
            to_fix.push((id, expected));
        }
    }
    drop(stmt);
    for (id, expected) in to_fix {
        conn.execute(
            "UPDATE books SET title_lower = ?1 WHERE id = ?2",
            rusqlite::params![expected, id],
        )?;
        touched += 1;
    }

    let mut stmt = conn.prepare("SELECT id, series, series_lower FROM books")?;
    let mut to_fix = Vec::new();
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;
    for row in rows {
        let (id, series, series_lower) = row?;
        let expected = series.to_lowercase();
        if expected != series_lower {
            to_fix.push((id, expected));
        }
    }
    drop(stmt);
    for (id, expected) in to_fix {
        conn.execute(
            "UPDATE books SET series_lower = ?1 WHERE id = ?2",
            rusqlite::params![expected, id],
        )?;
        touched += 1;
    }

    let mut stmt = conn.prepare("SELECT id, full_name, full_name_lower, last_name_lower FROM authors")?;
    let mut to_fix = Vec::new();
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;
    for row in rows {
        let (id, full_name, full_name_lower, last_name_lower) = row?;
        let expected_lower = full_name.to_lowercase();
        let expected_last = crate::models::author::Author::last_name_lower_of(&full_name);
        if expected_lower != full_name_lower || expected_last != last_name_lower {
            to_fix.push((id, expected_lower, expected_last));
        }
    }
    drop(stmt);
    for (id, expected_lower, expected_last) in to_fix {
        conn.execute(
            "UPDATE authors SET full_name_lower = ?1, last_name_lower = ?2 WHERE id = ?3",
            rusqlite::params![expected_lower, expected_last, id],
        )?;
        touched += 1;
    }

    Ok(touched)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_schema_creates_expected_tables() {
        let conn = Connection::open_in_memory().unwrap();
        apply_pragmas(&conn).unwrap();
        init_schema(&conn).unwrap();

        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap();
        let names: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        for expected in [
            "authors",
            "book_authors",
            "book_tags",
            "books",
            "nostr_book_requests",
            "nostr_response_books",
            "nostr_responses",
            "schema_migrations",
            "tags",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing table {expected}");
        }
    }

    #[test]
    fn backfill_fixes_stale_mirrors() {
        let conn = Connection::open_in_memory().unwrap();
        apply_pragmas(&conn).unwrap();
        init_schema(&conn).unwrap();

        conn.execute(
            "INSERT INTO books (title, title_lower, file_url, file_type, file_hash) VALUES ('Dune', 'stale', 'x', 'epub', 'h')",
            [],
        )
        .unwrap();

        let touched = backfill_case_folded_mirrors(&conn).unwrap();
        assert!(touched >= 1);

        let lower: String = conn
            .query_row("SELECT title_lower FROM books WHERE title = 'Dune'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(lower, "dune");
    }
}
